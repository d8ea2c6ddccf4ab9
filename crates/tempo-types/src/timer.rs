use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, ServiceCallId, TenantId, TimerKey};

/// A timer waiting for its due moment.
///
/// `due_at` may lie before `registered_at`: past-dated timers are legal
/// and fire on the next poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTimer {
    pub tenant_id: TenantId,
    pub service_call_id: ServiceCallId,
    pub due_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub correlation_id: Option<CorrelationId>,
}

/// Terminal state: the due moment was observed and the event published.
/// `reached_at` never changes once set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachedTimer {
    pub tenant_id: TenantId,
    pub service_call_id: ServiceCallId,
    pub due_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub correlation_id: Option<CorrelationId>,
    pub reached_at: DateTime<Utc>,
}

impl ScheduledTimer {
    /// Arm a timer for `key` at `due_at`.
    pub fn schedule(
        key: TimerKey,
        due_at: DateTime<Utc>,
        registered_at: DateTime<Utc>,
        correlation_id: Option<CorrelationId>,
    ) -> Self {
        Self {
            tenant_id: key.tenant_id,
            service_call_id: key.service_call_id,
            due_at,
            registered_at,
            correlation_id,
        }
    }

    /// Transition to the terminal state, preserving every header field.
    pub fn mark_reached(self, reached_at: DateTime<Utc>) -> ReachedTimer {
        ReachedTimer {
            tenant_id: self.tenant_id,
            service_call_id: self.service_call_id,
            due_at: self.due_at,
            registered_at: self.registered_at,
            correlation_id: self.correlation_id,
            reached_at,
        }
    }

    /// Inclusive comparison: a timer due exactly at `now` is due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    pub fn key(&self) -> TimerKey {
        TimerKey::new(self.tenant_id, self.service_call_id)
    }
}

impl ReachedTimer {
    pub fn key(&self) -> TimerKey {
        TimerKey::new(self.tenant_id, self.service_call_id)
    }
}

/// The timer aggregate: exactly one state at a time per [`TimerKey`].
///
/// The only transition is `Scheduled → Reached`; `Reached` is terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timer {
    Scheduled(ScheduledTimer),
    Reached(ReachedTimer),
}

impl Timer {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, Self::Reached(_))
    }

    pub fn key(&self) -> TimerKey {
        match self {
            Self::Scheduled(t) => t.key(),
            Self::Reached(t) => t.key(),
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::Scheduled(t) => t.correlation_id,
            Self::Reached(t) => t.correlation_id,
        }
    }

    /// Returns the variant name as a static string for storage and logging.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Scheduled(_) => "Scheduled",
            Self::Reached(_) => "Reached",
        }
    }

    pub fn as_scheduled(&self) -> Option<&ScheduledTimer> {
        match self {
            Self::Scheduled(t) => Some(t),
            Self::Reached(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn key() -> TimerKey {
        TimerKey::new(TenantId::generate(), ServiceCallId::generate())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn is_due_is_inclusive() {
        let timer = ScheduledTimer::schedule(key(), at(10), at(0), None);

        assert!(!timer.is_due(at(9)));
        assert!(timer.is_due(at(10)));
        assert!(timer.is_due(at(11)));
    }

    #[test]
    fn past_dated_timers_are_legal_and_due() {
        let timer = ScheduledTimer::schedule(key(), at(-60), at(0), None);
        assert!(timer.is_due(at(0)));
    }

    #[test]
    fn mark_reached_preserves_header_fields() {
        let correlation = Some(CorrelationId::generate());
        let scheduled = ScheduledTimer::schedule(key(), at(10), at(0), correlation);
        let before = scheduled.clone();

        let reached = scheduled.mark_reached(at(12));

        assert_eq!(reached.tenant_id, before.tenant_id);
        assert_eq!(reached.service_call_id, before.service_call_id);
        assert_eq!(reached.due_at, before.due_at);
        assert_eq!(reached.registered_at, before.registered_at);
        assert_eq!(reached.correlation_id, correlation);
        assert_eq!(reached.reached_at, at(12));
    }

    #[test]
    fn state_predicates_discriminate_variants() {
        let scheduled = ScheduledTimer::schedule(key(), at(10), at(0), None);
        let reached = scheduled.clone().mark_reached(at(10));

        let a = Timer::Scheduled(scheduled);
        let b = Timer::Reached(reached);

        assert!(a.is_scheduled() && !a.is_reached());
        assert!(b.is_reached() && !b.is_scheduled());
        assert_eq!(a.state_name(), "Scheduled");
        assert_eq!(b.state_name(), "Reached");
        assert!(a.as_scheduled().is_some());
        assert!(b.as_scheduled().is_none());
    }
}
