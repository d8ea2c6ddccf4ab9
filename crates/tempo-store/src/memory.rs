use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_types::{ScheduledTimer, Timer, TimerKey};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::TimerStore;

/// In-memory implementation of [`TimerStore`] for tests and ephemeral
/// deployments.
///
/// Carries the same contract as the relational adapter: keyed upsert,
/// monotone `mark_fired`, global inclusive `find_due`.
#[derive(Default)]
pub struct MemoryTimerStore {
    timers: RwLock<HashMap<TimerKey, Timer>>,
}

impl MemoryTimerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored timers, in any state.
    pub async fn len(&self) -> usize {
        self.timers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.timers.read().await.is_empty()
    }
}

#[async_trait]
impl TimerStore for MemoryTimerStore {
    async fn save(&self, timer: &ScheduledTimer) -> Result<(), StoreError> {
        let mut timers = self.timers.write().await;
        match timers.get_mut(&timer.key()) {
            // Terminal state is never rewound; only the header follows
            // last-write-wins.
            Some(Timer::Reached(existing)) => {
                existing.due_at = timer.due_at;
                existing.registered_at = timer.registered_at;
                existing.correlation_id = timer.correlation_id;
            }
            _ => {
                timers.insert(timer.key(), Timer::Scheduled(timer.clone()));
            }
        }
        Ok(())
    }

    async fn find(&self, key: TimerKey) -> Result<Option<Timer>, StoreError> {
        let timers = self.timers.read().await;
        Ok(timers.get(&key).cloned())
    }

    async fn find_scheduled(&self, key: TimerKey) -> Result<Option<ScheduledTimer>, StoreError> {
        let timers = self.timers.read().await;
        Ok(timers.get(&key).and_then(|t| t.as_scheduled()).cloned())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTimer>, StoreError> {
        let timers = self.timers.read().await;
        let mut due: Vec<ScheduledTimer> = timers
            .values()
            .filter_map(Timer::as_scheduled)
            .filter(|t| t.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.due_at);
        Ok(due)
    }

    async fn mark_fired(&self, key: TimerKey, reached_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut timers = self.timers.write().await;
        if let Some(timer) = timers.get_mut(&key) {
            if let Timer::Scheduled(scheduled) = timer {
                *timer = Timer::Reached(scheduled.clone().mark_reached(reached_at));
            }
        }
        Ok(())
    }

    async fn delete(&self, key: TimerKey) -> Result<(), StoreError> {
        let mut timers = self.timers.write().await;
        timers.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempo_types::{CorrelationId, ServiceCallId, TenantId};

    use super::*;

    fn key() -> TimerKey {
        TimerKey::new(TenantId::generate(), ServiceCallId::generate())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn scheduled(key: TimerKey, due_secs: i64) -> ScheduledTimer {
        ScheduledTimer::schedule(key, at(due_secs), at(0), None)
    }

    #[tokio::test]
    async fn save_is_an_upsert_keeping_one_row_per_key() {
        let store = MemoryTimerStore::new();
        let key = key();

        store.save(&scheduled(key, 10)).await.unwrap();
        store.save(&scheduled(key, 20)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_scheduled(key).await.unwrap().unwrap();
        assert_eq!(found.due_at, at(20));
    }

    #[tokio::test]
    async fn later_save_wins_on_correlation_id_including_none() {
        let store = MemoryTimerStore::new();
        let key = key();

        let first = ScheduledTimer::schedule(key, at(10), at(0), Some(CorrelationId::generate()));
        store.save(&first).await.unwrap();
        store.save(&scheduled(key, 10)).await.unwrap();

        let found = store.find_scheduled(key).await.unwrap().unwrap();
        assert_eq!(found.correlation_id, None);
    }

    #[tokio::test]
    async fn mark_fired_keeps_the_first_reached_at() {
        let store = MemoryTimerStore::new();
        let key = key();
        store.save(&scheduled(key, 10)).await.unwrap();

        store.mark_fired(key, at(11)).await.unwrap();
        store.mark_fired(key, at(42)).await.unwrap();

        match store.find(key).await.unwrap().unwrap() {
            Timer::Reached(t) => assert_eq!(t.reached_at, at(11)),
            Timer::Scheduled(_) => panic!("timer should have fired"),
        }
    }

    #[tokio::test]
    async fn mark_fired_is_a_no_op_for_missing_keys() {
        let store = MemoryTimerStore::new();
        store.mark_fired(key(), at(1)).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn save_over_reached_updates_header_but_not_state() {
        let store = MemoryTimerStore::new();
        let key = key();
        store.save(&scheduled(key, 10)).await.unwrap();
        store.mark_fired(key, at(11)).await.unwrap();

        let rearmed = ScheduledTimer::schedule(key, at(99), at(50), Some(CorrelationId::generate()));
        store.save(&rearmed).await.unwrap();

        match store.find(key).await.unwrap().unwrap() {
            Timer::Reached(t) => {
                assert_eq!(t.reached_at, at(11));
                assert_eq!(t.due_at, at(99));
                assert_eq!(t.correlation_id, rearmed.correlation_id);
            }
            Timer::Scheduled(_) => panic!("terminal state must not be rewound"),
        }
    }

    #[tokio::test]
    async fn lookups_are_tenant_scoped() {
        let store = MemoryTimerStore::new();
        let service_call_id = ServiceCallId::generate();
        let key_a = TimerKey::new(TenantId::generate(), service_call_id);
        let key_b = TimerKey::new(TenantId::generate(), service_call_id);

        store.save(&scheduled(key_b, 10)).await.unwrap();

        assert!(store.find(key_a).await.unwrap().is_none());
        assert!(store.find(key_b).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn find_due_is_inclusive_ordered_and_global() {
        let store = MemoryTimerStore::new();
        let late = key();
        let boundary = key();
        let early = key();
        let future = key();

        store.save(&scheduled(late, 30)).await.unwrap();
        store.save(&scheduled(boundary, 60)).await.unwrap();
        store.save(&scheduled(early, 10)).await.unwrap();
        store.save(&scheduled(future, 61)).await.unwrap();

        let due = store.find_due(at(60)).await.unwrap();

        let keys: Vec<TimerKey> = due.iter().map(ScheduledTimer::key).collect();
        assert_eq!(keys, vec![early, late, boundary]);
    }

    #[tokio::test]
    async fn find_due_excludes_reached_timers() {
        let store = MemoryTimerStore::new();
        let fired = key();
        let pending = key();
        store.save(&scheduled(fired, 10)).await.unwrap();
        store.save(&scheduled(pending, 20)).await.unwrap();
        store.mark_fired(fired, at(10)).await.unwrap();

        let due = store.find_due(at(60)).await.unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key(), pending);
    }

    #[tokio::test]
    async fn delete_removes_any_state_and_tolerates_missing() {
        let store = MemoryTimerStore::new();
        let key = key();
        store.save(&scheduled(key, 10)).await.unwrap();
        store.mark_fired(key, at(10)).await.unwrap();

        store.delete(key).await.unwrap();
        store.delete(key).await.unwrap();

        assert!(store.find(key).await.unwrap().is_none());
    }
}
