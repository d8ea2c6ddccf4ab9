use std::sync::Arc;

use tempo_store::TimerStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{EventBus, Topic};
use crate::clock::Clock;
use crate::config::TimerServiceConfig;
use crate::error::SubscribeError;
use crate::schedule::ScheduleTimerHandler;
use crate::worker::PollingWorker;

/// Wires the ports together and owns the service lifetime.
///
/// The polling worker runs as a child task of `shutdown`; the command
/// subscription runs on the caller's task. Shutdown ordering: once
/// `shutdown` fires, the subscription drains its in-flight command and
/// returns, the worker finishes its in-flight pass and stops, and
/// `run` joins it before returning.
pub struct TimerService {
    store: Arc<dyn TimerStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    config: TimerServiceConfig,
    shutdown: CancellationToken,
}

impl TimerService {
    pub fn new(
        store: Arc<dyn TimerStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: TimerServiceConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
            shutdown,
        }
    }

    /// Block on the command subscription until shutdown or a
    /// subscription-level fault. Subscribe faults are terminal.
    pub async fn run(self) -> Result<(), SubscribeError> {
        info!("timer service starting");

        let worker = PollingWorker::new(
            self.store.clone(),
            self.bus.clone(),
            self.clock.clone(),
            self.config.poll_interval,
        );
        let worker_task = tokio::spawn(worker.run(self.shutdown.child_token()));

        let handler = Arc::new(ScheduleTimerHandler::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.retry,
        ));
        let result = self.bus.subscribe(&[Topic::TimerCommands], handler).await;

        // The subscription is done (shutdown or fault); take the worker
        // down with it.
        self.shutdown.cancel();
        if let Err(error) = worker_task.await {
            warn!(%error, "polling worker task aborted");
        }

        info!("timer service stopped");
        result
    }
}
