use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ServiceCallId, TenantId, TimerKey};

/// The two messages the timer module exchanges with the rest of the
/// pipeline. `ScheduleTimer` is consumed from the command topic,
/// `DueTimeReached` is produced on the event topic.
///
/// Serialized with an internal `type` tag matching the variant name, so
/// the wire payload carries its own discriminant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimerMessage {
    /// Arm (or re-arm) the timer for a service call.
    #[serde(rename_all = "camelCase")]
    ScheduleTimer {
        tenant_id: TenantId,
        service_call_id: ServiceCallId,
        due_at: DateTime<Utc>,
    },
    /// The due moment arrived; delivered at-least-once.
    #[serde(rename_all = "camelCase")]
    DueTimeReached {
        tenant_id: TenantId,
        service_call_id: ServiceCallId,
        reached_at: DateTime<Utc>,
    },
}

impl TimerMessage {
    /// Returns the variant name as a static string for envelope typing
    /// and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScheduleTimer { .. } => "ScheduleTimer",
            Self::DueTimeReached { .. } => "DueTimeReached",
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::ScheduleTimer { tenant_id, .. } => *tenant_id,
            Self::DueTimeReached { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn key(&self) -> TimerKey {
        match self {
            Self::ScheduleTimer {
                tenant_id,
                service_call_id,
                ..
            }
            | Self::DueTimeReached {
                tenant_id,
                service_call_id,
                ..
            } => TimerKey::new(*tenant_id, *service_call_id),
        }
    }
}
