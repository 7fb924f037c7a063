//! Boots the head: opens the SQLite pool, runs the schema migration, wires
//! the dispatch service and sweeper, and starts the axum server.

use std::sync::Arc;

use batchelor_shared::config::HeadConfig;
use batchelor_shared::error::BatchelorError;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::dispatch::observer::TracingObserver;
use crate::dispatch::DispatchService;
use crate::http::{build_router, AppState};
use crate::store::event_types::EventTypeStore;
use crate::store::schema;
use crate::store::tasks::TaskStore;
use crate::sweeper::{Sweeper, SweeperConfig};

pub struct HeadHandle {
    pub dispatch: Arc<DispatchService>,
    shutdown_tx: watch::Sender<bool>,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    sweeper_task: JoinHandle<()>,
}

impl HeadHandle {
    pub async fn stop(self) -> Result<(), BatchelorError> {
        let _ = self.shutdown_tx.send(true);
        self.sweeper_task.await.ok();
        self.server_task.await.ok();
        Ok(())
    }
}

pub struct HeadBootstrap;

impl HeadBootstrap {
    pub async fn bootstrap(config: HeadConfig) -> Result<HeadHandle, BatchelorError> {
        let connect_options = format!("sqlite://{}?mode=rwc", config.database_path);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&connect_options)
            .await
            .map_err(BatchelorError::from)?;

        schema::migrate(&pool).await.map_err(BatchelorError::from)?;

        let task_store = TaskStore::new(pool.clone());
        let event_type_store = EventTypeStore::new(pool.clone());

        let zombie_ttl = config.zombie_ttl().map_err(|_| BatchelorError::config("invalid zombie_ttl"))?;

        let dispatch = Arc::new(DispatchService::new(
            task_store.clone(),
            event_type_store.clone(),
            Arc::new(TracingObserver),
            zombie_ttl,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = Sweeper::new(
            task_store,
            event_type_store,
            SweeperConfig {
                interval: config.sweep_interval().map_err(|_| BatchelorError::config("invalid sweep_interval"))?,
                zombie_ttl,
                delete_ttl: config.delete_ttl().map_err(|_| BatchelorError::config("invalid delete_ttl"))?,
            },
        );
        let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));

        let state = AppState {
            dispatch: dispatch.clone(),
            config: Arc::new(config.clone()),
        };
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind(&config.bind)
            .await
            .map_err(BatchelorError::from)?;
        info!(bind = %config.bind, "head HTTP server listening");

        let mut server_shutdown_rx = shutdown_rx.clone();
        let server_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown_rx.changed().await;
                })
                .await
        });

        Ok(HeadHandle {
            dispatch,
            shutdown_tx,
            server_task,
            sweeper_task,
        })
    }
}
