use std::sync::Arc;

use anyhow::Context;
use tempo_service::{MemoryEventBus, SystemClock, TimerService, TimerServiceConfig};
use tempo_store::SqliteTimerStore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = TimerServiceConfig::from_env();

    let store = SqliteTimerStore::connect(&config.database_url)
        .await
        .context("connecting timer store")?;
    store.apply_schema().await.context("applying schema")?;

    let shutdown = CancellationToken::new();
    let bus = Arc::new(MemoryEventBus::new(shutdown.child_token()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    TimerService::new(
        Arc::new(store),
        bus,
        Arc::new(SystemClock),
        config,
        shutdown,
    )
    .run()
    .await
    .context("command subscription failed")?;

    Ok(())
}
