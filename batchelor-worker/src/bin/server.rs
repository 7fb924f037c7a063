//! `batchelor-worker` binary: loads config, builds the configured task
//! factories, and runs the poll loop until a shutdown signal arrives.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::time::Duration;

use anyhow::Context;
use batchelor_client::config::ConnectionSpec;
use batchelor_client::HeadClient;
use batchelor_shared::config::{BatchelorConfig, WorkerConfig};
use batchelor_shared::logging;
use batchelor_worker::factory::exec::ExecTaskFactory;
use batchelor_worker::factory::kubectl::KubectlTaskFactory;
use batchelor_worker::factory::traits::TaskFactory;
use batchelor_worker::worker_loop::WorkerLoop;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting batchelor-worker");

    let config = load_config()?;

    let connections = connections_from_config(&config);
    if connections.is_empty() {
        anyhow::bail!("no head URLs configured");
    }
    let client = HeadClient::new(connections);

    let factories = factories_from_config(&config);
    if factories.is_empty() {
        warn!("no task factories configured, worker will never accept work");
    }

    let request_interval = config.request_interval().unwrap_or(Duration::from_secs(5));

    let metrics: BTreeMap<String, String> = config.metrics.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut worker = WorkerLoop::new(client, factories, metrics, config.max_tasks_running, request_interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_signal().await;
    info!("shutdown signal received, stopping worker");
    let _ = shutdown_tx.send(true);

    if let Err(e) = loop_handle.await {
        error!(error = %e, "worker loop task panicked");
    }
    info!("batchelor-worker stopped");

    Ok(())
}

fn load_config() -> anyhow::Result<WorkerConfig> {
    let config_path = env::var("BATCHELOR_WORKER_CONFIG").ok();
    let config = match config_path {
        Some(path) => {
            let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            BatchelorConfig::from_toml_str(&contents)?.worker.unwrap_or_default()
        }
        None => WorkerConfig::default(),
    };
    Ok(config)
}

fn connections_from_config(config: &WorkerConfig) -> Vec<ConnectionSpec> {
    config
        .head_urls
        .iter()
        .map(|url| {
            let mut spec = ConnectionSpec::new(url.clone());
            if let Some(api_key) = &config.api_key {
                spec = spec.with_api_key(api_key.clone());
            }
            spec
        })
        .collect()
}

fn factories_from_config(config: &WorkerConfig) -> Vec<Box<dyn TaskFactory>> {
    config
        .factories
        .iter()
        .filter_map(|(event_type, factory_config)| build_factory(event_type, &factory_config.kind, &factory_config.settings))
        .collect()
}

fn build_factory(event_type: &str, kind: &str, settings: &HashMap<String, String>) -> Option<Box<dyn TaskFactory>> {
    let max_running: usize = settings.get("max_running").and_then(|v| v.parse().ok()).unwrap_or(0);

    match kind {
        "exec" => {
            let cmd = settings.get("cmd").cloned().unwrap_or_default();
            let cd = settings.get("cd").cloned().unwrap_or_default();
            Some(Box::new(ExecTaskFactory::new(event_type, cmd, cd, max_running)))
        }
        "kubectl" => {
            let image = settings.get("image").cloned().unwrap_or_default();
            let namespace = settings.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
            Some(Box::new(KubectlTaskFactory::new(event_type, image, namespace, max_running)))
        }
        other => {
            warn!(kind = other, event_type, "unknown factory kind, skipping");
            None
        }
    }
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
