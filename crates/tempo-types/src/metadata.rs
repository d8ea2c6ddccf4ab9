use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, EnvelopeId};

/// Routing metadata extracted from an inbound envelope at subscription
/// entry and passed explicitly to workflows.
///
/// `correlation_id` ties all messages of one business transaction
/// together; `causation_id` points at the envelope that directly caused
/// this work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub correlation_id: Option<CorrelationId>,
    pub causation_id: Option<EnvelopeId>,
}

impl MessageMetadata {
    pub fn new(correlation_id: Option<CorrelationId>, causation_id: Option<EnvelopeId>) -> Self {
        Self {
            correlation_id,
            causation_id,
        }
    }

    /// Metadata with neither correlation nor causation set.
    pub fn none() -> Self {
        Self::default()
    }
}
