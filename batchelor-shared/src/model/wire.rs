//! Wire DTOs exchanged over the head's HTTP API, grounded in
//! `batchelor-service/src/main/batchelor/service/schemas/*` and the mapping
//! done by `Service.cpp::taskToTaskStatusHead`.

use serde::{Deserialize, Serialize};

use super::task::TaskState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A worker's report of one of its own in-flight tasks, included in every
/// `FetchRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusWorker {
    pub task_id: String,
    pub state: String,
    pub return_code: Option<i32>,
    pub message: Option<String>,
}

/// The head's view of a task returned from read-only projections and
/// `show-task(s)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusHead {
    pub task_id: String,
    pub event_type: String,
    pub priority: i64,
    pub effective_priority: i64,
    pub settings: Vec<Setting>,
    pub metrics: Vec<Setting>,
    pub condition: String,
    pub created_ts: String,
    pub begin_ts: Option<String>,
    pub end_ts: Option<String>,
    pub state: TaskState,
    pub return_code: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTypeAvailable {
    pub event_type: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub task_id: String,
    pub signal: String,
}

/// A unit of work a worker should start, handed back from `fetchTask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub task_id: String,
    pub event_type: String,
    pub settings: Vec<Setting>,
}

/// Periodic heartbeat a worker sends the head: its current task statuses,
/// its metrics (always including `TASKS_RUNNING`), and which event types it
/// currently has capacity to start.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FetchRequest {
    #[serde(default)]
    pub tasks: Vec<TaskStatusWorker>,
    #[serde(default)]
    pub metrics: Vec<Setting>,
    #[serde(default)]
    pub event_types: Vec<EventTypeAvailable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FetchResponse {
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub run_configurations: Vec<RunConfiguration>,
}

/// Body of `runTask` (`send-event`): the admission request for a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub event_type: String,
    #[serde(default)]
    pub settings: Vec<Setting>,
    #[serde(default)]
    pub metrics: Vec<Setting>,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub priority: i64,
}

/// `task_id` is empty and `message` carries the reason when admission is
/// rejected (bad condition syntax, unavailable event type).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunResponse {
    pub task_id: String,
    #[serde(default)]
    pub message: Option<String>,
}
