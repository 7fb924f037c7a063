//! The task record and its fingerprint, grounded in the `TASKS` table
//! schema from the original `Dao.cpp` and the run-dedup logic in
//! `Service.cpp::makeCrc32`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task, matching `common::types::State::toString`'s
/// lowercase wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Signaled,
    Zombie,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Signaled => "signaled",
            TaskState::Zombie => "zombie",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskState::Queued),
            "running" => Some(TaskState::Running),
            "done" => Some(TaskState::Done),
            "signaled" => Some(TaskState::Signaled),
            "zombie" => Some(TaskState::Zombie),
            _ => None,
        }
    }

    /// A task in one of these states is no longer actionable and is a
    /// candidate for eventual hard deletion by the sweeper (C4). Zombie is
    /// terminal: a task that drops out without a heartbeat never comes back.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Signaled | TaskState::Zombie)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the `TASKS` table. Field names map 1:1 onto the original
/// schema's columns (`TASK_ID`, `CRC32`, `PRIORITY`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub crc32: u32,
    pub priority: i64,
    pub priority_ts: i64,
    pub event_type: String,
    pub settings: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, String>,
    pub signals: Vec<String>,
    pub condition: String,
    pub created_ts: i64,
    pub begin_ts: Option<String>,
    pub end_ts: Option<String>,
    pub last_heartbeat_ts: i64,
    pub state: TaskState,
    pub return_code: Option<i32>,
    pub message: Option<String>,
}

impl Task {
    /// Effective priority for candidate ordering: the stored priority plus
    /// one point for every full minute the task has aged since
    /// `priority_ts`, capped at 24 points of aging bonus, matching the
    /// priority-aging scenario (S3) in spec.md §8. Computed at query time,
    /// never persisted.
    pub fn effective_priority(&self, now_ts_millis: i64) -> i64 {
        let age_minutes = ((now_ts_millis - self.priority_ts).max(0)) / 60_000;
        self.priority + age_minutes.min(24)
    }
}

/// CRC32 over `settings` and `metrics`, each rendered as `;key=value` pairs
/// in key-sorted order and concatenated. `condition` and `priority` are
/// deliberately excluded, matching `Service.cpp::makeCrc32` exactly: two
/// `RunConfiguration`s that differ only by condition or priority are
/// considered the same task for dedup purposes.
pub fn fingerprint(settings: &BTreeMap<String, String>, metrics: &BTreeMap<String, String>) -> u32 {
    let mut buf = String::new();
    for (key, value) in settings {
        buf.push(';');
        buf.push_str(key);
        buf.push('=');
        buf.push_str(value);
    }
    for (key, value) in metrics {
        buf.push(';');
        buf.push_str(key);
        buf.push('=');
        buf.push_str(value);
    }
    crc32fast::hash(buf.as_bytes())
}
