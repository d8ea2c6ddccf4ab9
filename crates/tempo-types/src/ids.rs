use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Isolation unit for multi-tenancy. Every persisted row and every
/// published envelope carries exactly one tenant.
///
/// Generated as UUID v7, so values sort by creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

/// Identifies the service call a timer is armed for. Owned by the
/// orchestration module; the timer service treats it as opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCallId(Uuid);

/// Unique, time-ordered identity of a single message envelope.
/// Broker adapters deduplicate on this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(Uuid);

/// Ties every message of one business transaction together across
/// modules. Propagated, never derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            /// Fresh time-ordered (v7) identifier.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| DomainError::MalformedId {
                        kind: stringify!($name),
                        value: s.to_string(),
                    })
            }
        }
    };
}

uuid_id!(TenantId);
uuid_id!(ServiceCallId);
uuid_id!(EnvelopeId);
uuid_id!(CorrelationId);

/// Primary identity of a timer: at most one timer exists per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerKey {
    pub tenant_id: TenantId,
    pub service_call_id: ServiceCallId,
}

impl TimerKey {
    pub fn new(tenant_id: TenantId, service_call_id: ServiceCallId) -> Self {
        Self {
            tenant_id,
            service_call_id,
        }
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.service_call_id)
    }
}
