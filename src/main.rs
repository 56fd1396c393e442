//! Loanflow - Question-Evaluation Service
//!
//! Service entry point: loads configuration, warms up the engine
//! (catalog → rules → database pool → remote cache → write-back queue) and
//! serves the HTTP surface until shutdown.

#![forbid(unsafe_code)]

use anyhow::Result;
use loanflow::server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loanflow=info,loanflow_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Loanflow v{}", env!("CARGO_PKG_VERSION"));

    server::run().await
}
