use pipe_core::metrics::MetricsRegistry;
use pipe_store::{Config, Store};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipe_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pipe store...");

    let config = Config::from_env().unwrap_or_else(|err| {
        tracing::warn!("{}, falling back to defaults", err);
        Config::default()
    });
    config.validate()?;

    tracing::info!("Opening database at {}", config.database_path.display());

    let metrics = Arc::new(MetricsRegistry::new());
    let store = Store::open(&config, Arc::clone(&metrics)).await?;

    store.migrate().await?;
    tracing::info!("Database schema ready");

    for (name, value) in metrics.snapshot() {
        tracing::debug!("{} = {:?}", name, value);
    }

    store.close().await;
    Ok(())
}
