//! Settlement server binary

use anyhow::Result;
use settlement::{Config, Gateway, LoggingDispatcher, SettlementCoordinator};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting CatBond Settlement Server");

    // Load configuration
    let config = Config::from_env()?;

    // Open the registry store
    let store_config = registry_core::Config {
        data_dir: config.registry_data_dir.clone(),
        ..Default::default()
    };
    let store = Arc::new(registry_core::RocksStore::open(&store_config)?);
    tracing::info!("Registry store opened at {:?}", store_config.data_dir);

    let coordinator = SettlementCoordinator::new(store, Arc::new(LoggingDispatcher), config);
    let _gateway = Gateway::new(coordinator);

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down settlement server");
    Ok(())
}
