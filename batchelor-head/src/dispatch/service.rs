//! The dispatch service (C3): `runTask`, `fetchTask`, `sendSignal`, and the
//! read-only projections. Grounded in
//! `batchelor-head/src/main/batchelor/head/Service.cpp`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use batchelor_shared::auth::Role;
use batchelor_shared::condition::{admits, parse, ConditionError};
use batchelor_shared::model::{
    fingerprint, EventTypeAvailable, FetchRequest, FetchResponse, RunConfiguration, RunRequest, RunResponse, Setting,
    Signal, Task, TaskState, TaskStatusHead,
};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dispatch::matching::sort_candidates;
use crate::dispatch::observer::Observer;
use crate::store::event_types::EventTypeStore;
use crate::store::tasks::TaskStore;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("operation requires role {required:?}, got {actual:?}")]
    Forbidden { required: Role, actual: Role },

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),
}

pub struct DispatchService {
    tasks: TaskStore,
    event_types: EventTypeStore,
    observer: Arc<dyn Observer>,
    zombie_ttl: Duration,
}

fn require_role(actual: Role, required: Role) -> Result<(), DispatchError> {
    if actual.satisfies(required) {
        Ok(())
    } else {
        Err(DispatchError::Forbidden { required, actual })
    }
}

fn settings_map(settings: &[Setting]) -> BTreeMap<String, String> {
    settings.iter().map(|s| (s.key.clone(), s.value.clone())).collect()
}

fn to_settings_vec(map: &BTreeMap<String, String>) -> Vec<Setting> {
    map.iter().map(|(k, v)| Setting::new(k.clone(), v.clone())).collect()
}

fn task_to_wire(task: &Task, now_ts: i64) -> TaskStatusHead {
    TaskStatusHead {
        task_id: task.task_id.clone(),
        event_type: task.event_type.clone(),
        priority: task.priority,
        effective_priority: task.effective_priority(now_ts),
        settings: to_settings_vec(&task.settings),
        metrics: to_settings_vec(&task.metrics),
        condition: task.condition.clone(),
        created_ts: batchelor_shared::time::millis_to_rfc3339(task.created_ts),
        begin_ts: task.begin_ts.clone(),
        end_ts: task.end_ts.clone(),
        state: task.state,
        return_code: task.return_code,
        message: task.message.clone(),
    }
}

impl DispatchService {
    pub fn new(tasks: TaskStore, event_types: EventTypeStore, observer: Arc<dyn Observer>, zombie_ttl: Duration) -> Self {
        Self {
            tasks,
            event_types,
            observer,
            zombie_ttl,
        }
    }

    fn zombie_cutoff(&self, now: i64) -> i64 {
        now - self.zombie_ttl.as_millis() as i64
    }

    /// Admits a new task, deduplicating against any live task with the
    /// same event type and settings/metrics fingerprint. A duplicate
    /// request against a still-queued-or-running task refreshes its
    /// priority/condition and returns its id instead of creating a second
    /// row, matching `Service.cpp::runTask`.
    #[instrument(skip(self, request))]
    pub async fn run_task(&self, role: Role, request: RunRequest) -> Result<RunResponse, DispatchError> {
        require_role(role, Role::Execute)?;

        if !request.condition.trim().is_empty() {
            if let Err(e) = parse(&request.condition) {
                return Ok(RunResponse {
                    task_id: String::new(),
                    message: Some(format!("invalid condition: {e}")),
                });
            }
        }

        let settings = settings_map(&request.settings);
        let metrics = settings_map(&request.metrics);
        let crc32 = fingerprint(&settings, &metrics);
        let now = batchelor_shared::time::now_millis();

        if let Some(existing) = self.tasks.load_latest_by_fingerprint(&request.event_type, crc32).await? {
            if matches!(existing.state, TaskState::Queued | TaskState::Running) {
                info!(task_id = %existing.task_id, "runTask deduplicated against live task");
                self.tasks
                    .update_for_dedup(&existing.task_id, request.priority, &request.condition, now)
                    .await?;
                return Ok(RunResponse {
                    task_id: existing.task_id,
                    message: None,
                });
            }
        }

        if !self.event_types.is_live(&request.event_type, self.zombie_cutoff(now)).await? {
            return Ok(RunResponse {
                task_id: String::new(),
                message: Some("Event type is not available".to_string()),
            });
        }

        let task = Task {
            task_id: Uuid::new_v4().to_string(),
            crc32,
            priority: request.priority,
            priority_ts: now,
            event_type: request.event_type,
            settings,
            metrics,
            signals: Vec::new(),
            condition: request.condition,
            created_ts: now,
            begin_ts: None,
            end_ts: None,
            last_heartbeat_ts: now,
            state: TaskState::Queued,
            return_code: None,
            message: None,
        };

        self.tasks.insert(&task).await?;
        self.observer.on_state_changed(&task, TaskState::Queued);
        Ok(RunResponse {
            task_id: task.task_id,
            message: None,
        })
    }

    /// Worker heartbeat: ingest reported task statuses, record event-type
    /// availability, then hand back at most one new `RunConfiguration` per
    /// available event type plus any pending signals for the worker's
    /// running tasks.
    #[instrument(skip(self, request))]
    pub async fn fetch_task(&self, role: Role, request: FetchRequest) -> Result<FetchResponse, DispatchError> {
        require_role(role, Role::Worker)?;

        let now = batchelor_shared::time::now_millis();

        for status in &request.tasks {
            match self.tasks.load_by_id(&status.task_id).await? {
                Some(existing) if existing.state == TaskState::Running => {
                    self.apply_worker_status(&existing, status, now).await?;
                }
                _ => {
                    warn!(task_id = %status.task_id, "worker reported status for unknown or non-running task");
                }
            }
        }

        for event_type in &request.event_types {
            self.event_types.upsert(&event_type.event_type, now).await?;
        }

        let worker_metrics = settings_map(&request.metrics);

        let mut run_configurations = Vec::new();
        for event_type in request.event_types.iter().filter(|e| e.available) {
            if let Some(config) = self.assign_one(&event_type.event_type, &worker_metrics, now).await? {
                run_configurations.push(config);
            }
        }

        let signals = self.collect_signals(&request.tasks).await?;

        Ok(FetchResponse {
            signals,
            run_configurations,
        })
    }

    async fn apply_worker_status(
        &self,
        existing: &Task,
        status: &batchelor_shared::model::TaskStatusWorker,
        now: i64,
    ) -> Result<(), DispatchError> {
        self.tasks.touch_heartbeat(&existing.task_id, now).await?;

        if let Some(new_state) = TaskState::from_str_opt(&status.state) {
            if new_state != TaskState::Running {
                let end_ts = batchelor_shared::time::millis_to_rfc3339(now);
                self.tasks
                    .mark_ended(&existing.task_id, new_state, &end_ts, status.return_code, status.message.as_deref())
                    .await?;
                let mut updated = existing.clone();
                updated.state = new_state;
                self.observer.on_state_changed(&updated, TaskState::Running);
            }
        }
        Ok(())
    }

    async fn assign_one(
        &self,
        event_type: &str,
        worker_metrics: &BTreeMap<String, String>,
        now: i64,
    ) -> Result<Option<RunConfiguration>, DispatchError> {
        let candidates = self.tasks.load_queued_by_event_type(event_type).await?;
        let sorted = sort_candidates(candidates, now);

        for candidate in sorted {
            let waiting_ms = (now - candidate.created_ts).max(0);
            let mut variables: std::collections::HashMap<String, String> = candidate
                .settings
                .iter()
                .chain(candidate.metrics.iter())
                .chain(worker_metrics.iter())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            variables.insert("SECONDS_WAITING".to_string(), (waiting_ms / 1_000).to_string());
            variables.insert("MINUTES_WAITING".to_string(), (waiting_ms / 60_000).to_string());

            match admits(&candidate.condition, &variables) {
                Ok(true) => {
                    let begin_ts = batchelor_shared::time::millis_to_rfc3339(now);
                    self.tasks.mark_running(&candidate.task_id, &begin_ts).await?;
                    let mut assigned = candidate.clone();
                    assigned.state = TaskState::Running;
                    self.observer.on_state_changed(&assigned, TaskState::Queued);

                    return Ok(Some(RunConfiguration {
                        task_id: candidate.task_id,
                        event_type: candidate.event_type,
                        settings: to_settings_vec(&candidate.settings),
                    }));
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(task_id = %candidate.task_id, error = %e, "condition evaluation failed, skipping candidate");
                    continue;
                }
            }
        }
        Ok(None)
    }

    async fn collect_signals(
        &self,
        reported: &[batchelor_shared::model::TaskStatusWorker],
    ) -> Result<Vec<Signal>, DispatchError> {
        let mut signals = Vec::new();
        for status in reported {
            if let Some(task) = self.tasks.load_by_id(&status.task_id).await? {
                for signal in &task.signals {
                    signals.push(Signal {
                        task_id: task.task_id.clone(),
                        signal: signal.clone(),
                    });
                }
                if !task.signals.is_empty() {
                    self.tasks.clear_signals(&task.task_id).await?;
                }
            }
        }
        Ok(signals)
    }

    /// A `queued` task has no worker to deliver the signal to, so it
    /// transitions straight to `signaled`. A `running` task's signal is
    /// queued for the worker to pick up on its next `fetchTask`. Any other
    /// state is a no-op, not an error.
    #[instrument(skip(self))]
    pub async fn send_signal(&self, role: Role, task_id: &str, signal: &str) -> Result<(), DispatchError> {
        require_role(role, Role::Execute)?;
        let task = self
            .tasks
            .load_by_id(task_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(task_id.to_string()))?;

        match task.state {
            TaskState::Queued => {
                let end_ts = batchelor_shared::time::millis_to_rfc3339(batchelor_shared::time::now_millis());
                self.tasks
                    .mark_ended(task_id, TaskState::Signaled, &end_ts, None, Some(signal))
                    .await?;
                let mut updated = task.clone();
                updated.state = TaskState::Signaled;
                self.observer.on_state_changed(&updated, TaskState::Queued);
            }
            TaskState::Running => {
                self.tasks.append_signal(task_id, signal).await?;
            }
            _ => {}
        }
        Ok(())
    }

    pub async fn get_task(&self, role: Role, task_id: &str) -> Result<TaskStatusHead, DispatchError> {
        require_role(role, Role::ReadOnly)?;
        let task = self
            .tasks
            .load_by_id(task_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(task_id.to_string()))?;
        Ok(task_to_wire(&task, batchelor_shared::time::now_millis()))
    }

    pub async fn get_tasks(&self, role: Role) -> Result<Vec<TaskStatusHead>, DispatchError> {
        require_role(role, Role::ReadOnly)?;
        let now = batchelor_shared::time::now_millis();
        let tasks = self.tasks.load_all().await?;
        Ok(tasks.iter().map(|t| task_to_wire(t, now)).collect())
    }

    pub async fn get_event_types(&self, role: Role) -> Result<Vec<EventTypeAvailable>, DispatchError> {
        require_role(role, Role::ReadOnly)?;
        let now = batchelor_shared::time::now_millis();
        let records = self.event_types.load_live(self.zombie_cutoff(now)).await?;
        Ok(records
            .into_iter()
            .map(|r| EventTypeAvailable {
                event_type: r.event_type,
                available: true,
            })
            .collect())
    }

    pub async fn alive(&self) -> Result<(), DispatchError> {
        self.tasks.load_all().await?;
        Ok(())
    }
}
