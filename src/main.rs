use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

mod api;
mod config;
mod db;
mod fixture;
mod store;

use api::AppState;
use config::Config;
use db::Database;
use store::FixtureStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let store = FixtureStore::open(Arc::new(db), config.op_timeout())?;

    if config.no_seed {
        info!("Seeding disabled");
    } else {
        let added = store
            .seed_if_empty(fixture::seed::default_fixtures())
            .await?;
        if added > 0 {
            info!("Seeded {} default fixture(s)", added);
        }
    }

    let app = api::router(AppState { store });
    let addr = config.socket_addr()?;
    info!("Fixture API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Fixture API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
