//! `batchelor-head` binary: loads config, boots the dispatch service and
//! HTTP server, and waits for a shutdown signal.

use std::env;

use anyhow::Context;
use batchelor_shared::config::{BatchelorConfig, HeadConfig};
use batchelor_shared::logging;
use batchelor_head::bootstrap::HeadBootstrap;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting batchelor-head");

    let config = load_config()?;

    let handle = HeadBootstrap::bootstrap(config).await?;

    shutdown_signal().await;
    info!("shutdown signal received, stopping head server");
    handle.stop().await?;
    info!("batchelor-head stopped");

    Ok(())
}

fn load_config() -> anyhow::Result<HeadConfig> {
    let config_path = env::var("BATCHELOR_HEAD_CONFIG").ok();
    let config = match config_path {
        Some(path) => {
            let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            BatchelorConfig::from_toml_str(&contents)?.head.unwrap_or_default()
        }
        None => HeadConfig::default(),
    };
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received sigterm"),
    }
}
