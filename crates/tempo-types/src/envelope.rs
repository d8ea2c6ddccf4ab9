use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, EnvelopeId, TenantId};
use crate::message::TimerMessage;
use crate::metadata::MessageMetadata;

/// Routing and metadata wrapper around a typed payload — the unit of
/// publication and subscription.
///
/// `message_type` always equals `payload.name()`; constructors enforce
/// this so the envelope-level discriminant never drifts from the payload
/// tag. `aggregate_id` is the broker's per-aggregate FIFO ordering key;
/// for timers it is always the service call id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: EnvelopeId,
    #[serde(rename = "type")]
    pub message_type: String,
    pub tenant_id: TenantId,
    pub aggregate_id: Option<String>,
    pub timestamp_ms: DateTime<Utc>,
    pub correlation_id: Option<CorrelationId>,
    pub causation_id: Option<EnvelopeId>,
    pub payload: TimerMessage,
}

impl MessageEnvelope {
    /// Wrap `payload` with a fresh time-ordered envelope id and no
    /// correlation/causation metadata.
    pub fn new(payload: TimerMessage, timestamp_ms: DateTime<Utc>) -> Self {
        Self {
            id: EnvelopeId::generate(),
            message_type: payload.name().to_string(),
            tenant_id: payload.tenant_id(),
            aggregate_id: Some(payload.key().service_call_id.to_string()),
            timestamp_ms,
            correlation_id: None,
            causation_id: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<CorrelationId>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_causation(mut self, causation_id: Option<EnvelopeId>) -> Self {
        self.causation_id = causation_id;
        self
    }

    /// The metadata a downstream workflow should propagate: this
    /// envelope's correlation, and this envelope's id as the cause.
    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata::new(self.correlation_id, Some(self.id))
    }
}
