use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_store::{StoreError, TimerStore};
use tempo_types::{MessageEnvelope, MessageMetadata, ScheduledTimer, TimerKey, TimerMessage};
use tracing::{instrument, warn};

use crate::bus::EnvelopeHandler;
use crate::clock::Clock;
use crate::error::HandlerError;
use crate::retry::RetryPolicy;

/// Ingest one `ScheduleTimer` command: stamp `registered_at` from the
/// clock, attach the correlation id carried by the envelope, and upsert.
///
/// Duplicate keys are legal; the later command wins on every header
/// field, including dropping the correlation id back to `None`.
#[instrument(
    name = "Timer.ScheduleTimer",
    skip_all,
    fields(
        tenant_id = %key.tenant_id,
        service_call_id = %key.service_call_id,
        due_at = %due_at,
        correlation_id = ?metadata.correlation_id,
        causation_id = ?metadata.causation_id,
    )
)]
pub async fn run_schedule_timer(
    store: &dyn TimerStore,
    clock: &dyn Clock,
    key: TimerKey,
    due_at: DateTime<Utc>,
    metadata: MessageMetadata,
) -> Result<(), StoreError> {
    let registered_at = clock.now();
    let timer = ScheduledTimer::schedule(key, due_at, registered_at, metadata.correlation_id);
    store.save(&timer).await
}

/// Subscription-side adapter for the command topic.
///
/// Wraps the workflow in the configured retry policy; only an exhausted
/// retry escapes as a nak. Non-command payloads are acked and dropped —
/// redelivering them could never succeed.
pub struct ScheduleTimerHandler {
    store: Arc<dyn TimerStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ScheduleTimerHandler {
    pub fn new(store: Arc<dyn TimerStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }
}

#[async_trait]
impl EnvelopeHandler for ScheduleTimerHandler {
    async fn handle(&self, envelope: MessageEnvelope) -> Result<(), HandlerError> {
        let metadata = envelope.metadata();
        match envelope.payload {
            TimerMessage::ScheduleTimer {
                tenant_id,
                service_call_id,
                due_at,
            } => {
                let key = TimerKey::new(tenant_id, service_call_id);
                self.retry
                    .run(|| run_schedule_timer(self.store.as_ref(), self.clock.as_ref(), key, due_at, metadata))
                    .await
                    .map_err(HandlerError::from)
            }
            other => {
                warn!(message_type = other.name(), "dropping non-command payload on the command topic");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::TimeZone;
    use tempo_store::{MemoryTimerStore, StoreOperation};
    use tempo_types::{CorrelationId, EnvelopeId, ServiceCallId, TenantId, Timer};

    use crate::clock::ManualClock;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn key() -> TimerKey {
        TimerKey::new(TenantId::generate(), ServiceCallId::generate())
    }

    fn command_envelope(key: TimerKey, due_at: DateTime<Utc>) -> MessageEnvelope {
        MessageEnvelope::new(
            TimerMessage::ScheduleTimer {
                tenant_id: key.tenant_id,
                service_call_id: key.service_call_id,
                due_at,
            },
            due_at,
        )
    }

    /// Store wrapper that fails the first `fail_first` saves.
    struct FlakySaveStore {
        inner: MemoryTimerStore,
        failures_left: AtomicU32,
    }

    impl FlakySaveStore {
        fn new(fail_first: u32) -> Self {
            Self {
                inner: MemoryTimerStore::new(),
                failures_left: AtomicU32::new(fail_first),
            }
        }
    }

    #[async_trait]
    impl TimerStore for FlakySaveStore {
        async fn save(&self, timer: &ScheduledTimer) -> Result<(), StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::new(StoreOperation::Save, "injected fault"));
            }
            self.inner.save(timer).await
        }

        async fn find(&self, key: TimerKey) -> Result<Option<Timer>, StoreError> {
            self.inner.find(key).await
        }

        async fn find_scheduled(
            &self,
            key: TimerKey,
        ) -> Result<Option<ScheduledTimer>, StoreError> {
            self.inner.find_scheduled(key).await
        }

        async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTimer>, StoreError> {
            self.inner.find_due(now).await
        }

        async fn mark_fired(
            &self,
            key: TimerKey,
            reached_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.mark_fired(key, reached_at).await
        }

        async fn delete(&self, key: TimerKey) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn persists_a_scheduled_timer_with_registration_time_from_the_clock() {
        let store = MemoryTimerStore::new();
        let clock = ManualClock::starting_at(at(3));
        let key = key();

        run_schedule_timer(&store, &clock, key, at(300), MessageMetadata::none())
            .await
            .unwrap();

        let timer = store.find_scheduled(key).await.unwrap().unwrap();
        assert_eq!(timer.due_at, at(300));
        assert_eq!(timer.registered_at, at(3));
        assert_eq!(timer.correlation_id, None);
    }

    #[tokio::test]
    async fn correlation_id_from_the_envelope_reaches_the_store() {
        let store = MemoryTimerStore::new();
        let clock = ManualClock::starting_at(at(0));
        let key = key();
        let correlation = CorrelationId::generate();
        let metadata = MessageMetadata::new(Some(correlation), Some(EnvelopeId::generate()));

        run_schedule_timer(&store, &clock, key, at(300), metadata)
            .await
            .unwrap();

        let timer = store.find_scheduled(key).await.unwrap().unwrap();
        assert_eq!(timer.correlation_id, Some(correlation));
    }

    #[tokio::test]
    async fn handler_schedules_from_a_command_envelope() {
        let store = Arc::new(MemoryTimerStore::new());
        let clock = Arc::new(ManualClock::starting_at(at(0)));
        let key = key();
        let handler =
            ScheduleTimerHandler::new(store.clone(), clock, RetryPolicy::default());

        let correlation = CorrelationId::generate();
        let envelope = command_envelope(key, at(300)).with_correlation(Some(correlation));
        handler.handle(envelope).await.unwrap();

        let timer = store.find_scheduled(key).await.unwrap().unwrap();
        assert_eq!(timer.due_at, at(300));
        assert_eq!(timer.correlation_id, Some(correlation));
    }

    #[tokio::test]
    async fn handler_acks_and_drops_non_command_payloads() {
        let store = Arc::new(MemoryTimerStore::new());
        let clock = Arc::new(ManualClock::starting_at(at(0)));
        let handler =
            ScheduleTimerHandler::new(store.clone(), clock, RetryPolicy::default());

        let stray = MessageEnvelope::new(
            TimerMessage::DueTimeReached {
                tenant_id: TenantId::generate(),
                service_call_id: ServiceCallId::generate(),
                reached_at: at(0),
            },
            at(0),
        );

        handler.handle(stray).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_retries_transient_store_faults_before_acking() {
        let store = Arc::new(FlakySaveStore::new(2));
        let clock = Arc::new(ManualClock::starting_at(at(0)));
        let key = key();
        let handler = ScheduleTimerHandler::new(store.clone(), clock, RetryPolicy::default());

        handler.handle(command_envelope(key, at(300))).await.unwrap();

        assert!(store.find_scheduled(key).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_naks_once_retries_are_exhausted() {
        let store = Arc::new(FlakySaveStore::new(3));
        let clock = Arc::new(ManualClock::starting_at(at(0)));
        let key = key();
        let handler = ScheduleTimerHandler::new(store.clone(), clock, RetryPolicy::default());

        let result = handler.handle(command_envelope(key, at(300))).await;

        assert!(result.is_err());
        assert!(store.find_scheduled(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_commands_upsert_with_the_later_call_winning() {
        let store = Arc::new(MemoryTimerStore::new());
        let clock = Arc::new(ManualClock::starting_at(at(0)));
        let key = key();
        let handler =
            ScheduleTimerHandler::new(store.clone(), clock, RetryPolicy::default());

        let first = command_envelope(key, at(300)).with_correlation(Some(CorrelationId::generate()));
        handler.handle(first).await.unwrap();
        handler.handle(command_envelope(key, at(600))).await.unwrap();

        assert_eq!(store.len().await, 1);
        let timer = store.find_scheduled(key).await.unwrap().unwrap();
        assert_eq!(timer.due_at, at(600));
        assert_eq!(timer.correlation_id, None);
    }
}
