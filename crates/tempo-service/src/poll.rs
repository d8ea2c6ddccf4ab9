use chrono::{DateTime, Utc};
use tempo_store::{StoreError, TimerStore};
use tempo_types::{MessageEnvelope, ScheduledTimer, TimerMessage};
use tracing::{debug, instrument};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::error::{PollError, PublishError};

/// Result of a successful polling pass. A pass with any failed timer
/// returns [`PollError::Batch`] instead, so `failed` is zero here; it is
/// carried so the outcome mirrors the batch counters either way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub fired: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
enum FireError {
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One pass of the polling loop: scan for due timers, publish
/// `DueTimeReached` for each, then mark it fired.
///
/// Timers are processed sequentially — one publish per key per batch,
/// in `due_at` order — which keeps broker pressure bounded and leaves
/// per-aggregate ordering to the broker across batches. Publish
/// strictly precedes the state transition: a fault between the two
/// leaves the timer `Scheduled`, so the next pass re-publishes and
/// consumers see the event at-least-once.
///
/// Per-timer failures are collected, never aborting the batch; the pass
/// then fails with [`PollError::Batch`]. A failed scan returns
/// [`PollError::Store`] before any side effects.
#[instrument(name = "Timer.PollDueTimers", skip_all)]
pub async fn poll_due_timers(
    store: &dyn TimerStore,
    bus: &dyn EventBus,
    clock: &dyn Clock,
) -> Result<PollOutcome, PollError> {
    let now = clock.now();
    let batch = store.find_due(now).await?;
    if batch.is_empty() {
        return Ok(PollOutcome::default());
    }

    let total = batch.len();
    let mut failed = 0usize;
    for timer in &batch {
        if let Err(error) = fire_timer(store, bus, timer, now).await {
            failed += 1;
            debug!(key = %timer.key(), %error, "timer failed to fire; left scheduled for the next pass");
        }
    }

    if failed > 0 {
        Err(PollError::Batch { failed, total })
    } else {
        Ok(PollOutcome {
            fired: total,
            failed: 0,
            total,
        })
    }
}

async fn fire_timer(
    store: &dyn TimerStore,
    bus: &dyn EventBus,
    timer: &ScheduledTimer,
    now: DateTime<Utc>,
) -> Result<(), FireError> {
    let envelope = MessageEnvelope::new(
        TimerMessage::DueTimeReached {
            tenant_id: timer.tenant_id,
            service_call_id: timer.service_call_id,
            reached_at: now,
        },
        now,
    )
    .with_correlation(timer.correlation_id);

    bus.publish(std::slice::from_ref(&envelope)).await?;
    // Once the event is out, the transition must land; a fault here only
    // costs a duplicate event on the next pass.
    store.mark_fired(timer.key(), now).await?;
    Ok(())
}
