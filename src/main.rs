use std::sync::Arc;

use clap::Parser;
use tracing::info;

use regatta_tracker::config::Config;
use regatta_tracker::{create_router, lifecycle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::parse());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "regatta_tracker=info,tower_http=warn".into()))
        .init();

    info!("regatta-tracker v{} starting", env!("CARGO_PKG_VERSION"));

    let state = lifecycle::build_state(config).await?;
    let router = create_router(state.clone());

    lifecycle::run(state, router).await
}
