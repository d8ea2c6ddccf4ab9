use std::sync::Arc;
use std::time::Duration;

use tempo_store::TimerStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::poll::poll_due_timers;

/// Long-running activity that repeats the poll workflow at a fixed
/// cadence.
///
/// The first pass runs immediately on start; subsequent passes fire on
/// a fixed schedule measured from the start of the previous pass. A
/// failed pass is logged and the schedule continues — timers left
/// `Scheduled` are simply picked up next time.
pub struct PollingWorker {
    store: Arc<dyn TimerStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl PollingWorker {
    pub fn new(
        store: Arc<dyn TimerStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            poll_interval,
        }
    }

    /// Run until `shutdown` fires. Cancellation is observed between
    /// passes: no new pass starts after the signal, the in-flight one
    /// completes.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "polling worker started");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("polling worker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match poll_due_timers(self.store.as_ref(), self.bus.as_ref(), self.clock.as_ref()).await {
                        Ok(outcome) if outcome.total > 0 => {
                            debug!(fired = outcome.fired, "poll pass fired due timers");
                        }
                        Ok(_) => {}
                        // TODO: back off when consecutive passes fail instead of
                        // hammering a store that is clearly down.
                        Err(error) => {
                            debug!(%error, "poll pass failed; continuing on schedule");
                        }
                    }
                }
            }
        }
    }
}
