//! The background sweeper (C4): periodically promotes stale running tasks
//! to zombie and hard-deletes old terminal/zombie tasks, plus prunes stale
//! `AVAILABLE_EVENT_TYPES` entries. Grounded in the timer loop implied by
//! `Service.cpp`'s zombie/delete TTL handling, using a `tokio::select!`
//! over the tick and a shutdown watch channel.

use std::time::Duration;

use tracing::{info, instrument};

use crate::store::event_types::EventTypeStore;
use crate::store::tasks::TaskStore;

pub struct SweeperConfig {
    pub interval: Duration,
    pub zombie_ttl: Duration,
    pub delete_ttl: Duration,
}

pub struct Sweeper {
    tasks: TaskStore,
    event_types: EventTypeStore,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(tasks: TaskStore, event_types: EventTypeStore, config: SweeperConfig) -> Self {
        Self {
            tasks,
            event_types,
            config,
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<(), sqlx::Error> {
        let now = batchelor_shared::time::now_millis();
        let zombie_cutoff = now - self.config.zombie_ttl.as_millis() as i64;
        let delete_cutoff = now - self.config.delete_ttl.as_millis() as i64;

        let (promoted, deleted) = self.tasks.sweep(zombie_cutoff, delete_cutoff).await?;
        let pruned_event_types = self.event_types.prune_stale(zombie_cutoff).await?;

        if promoted > 0 || deleted > 0 || pruned_event_types > 0 {
            info!(promoted, deleted, pruned_event_types, "sweep completed");
        }
        Ok(())
    }

    /// Runs `sweep_once` on `config.interval` forever. Intended to be
    /// spawned as a background tokio task from `bootstrap`.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::warn!(error = %e, "sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
