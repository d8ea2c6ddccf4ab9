use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_types::{ScheduledTimer, Timer, TimerKey};

use crate::error::StoreError;

/// Durable, multi-tenant timer store.
///
/// The port owns the idempotency guarantees so workflows stay trivial:
/// `save` is an upsert on [`TimerKey`] and `mark_fired` is a monotone
/// conditional transition. Adapters pick the most natural mechanism
/// (SQL `ON CONFLICT DO UPDATE` plus a state-guarded `UPDATE`, a map
/// entry match, ...).
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Upsert the timer under its key.
    ///
    /// A second save with the same key overwrites `due_at`,
    /// `registered_at`, and `correlation_id` (including dropping it to
    /// `None`). The stored state is never rewound: saving over a
    /// `Reached` row updates the header fields only.
    async fn save(&self, timer: &ScheduledTimer) -> Result<(), StoreError>;

    /// Look up a timer in any state. Tenant-scoped: a key with another
    /// tenant's `service_call_id` returns `None`.
    async fn find(&self, key: TimerKey) -> Result<Option<Timer>, StoreError>;

    /// Like [`find`](Self::find), but excludes `Reached` rows.
    async fn find_scheduled(&self, key: TimerKey) -> Result<Option<ScheduledTimer>, StoreError>;

    /// All scheduled timers with `due_at <= now` (inclusive), across all
    /// tenants, ordered by `due_at` ascending.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTimer>, StoreError>;

    /// Transition `Scheduled → Reached`.
    ///
    /// No-op when the key is missing. Idempotent: a row that is already
    /// `Reached` keeps its original `reached_at`.
    async fn mark_fired(&self, key: TimerKey, reached_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Remove the row in any state; no-op when missing. Operational
    /// escape hatch — never invoked by the normal flow.
    async fn delete(&self, key: TimerKey) -> Result<(), StoreError>;
}
