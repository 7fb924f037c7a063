//! `TaskFactory`/`Task` traits (C6), grounded in
//! `batchelor-worker/src/main/batchelor/worker/TaskFactory.h` and `Task.h`:
//! a factory creates tasks for one event type and reports whether it has
//! spare capacity; a task reports its current status and accepts signals.

use std::collections::BTreeMap;

use async_trait::async_trait;
use batchelor_shared::model::TaskState;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub return_code: Option<i32>,
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn running() -> Self {
        Self {
            state: TaskState::Running,
            return_code: None,
            message: None,
        }
    }

    /// The task raised an exception rather than exiting normally (e.g. a
    /// `wait()` failure): no return code, just the exception message.
    pub fn signaled(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Signaled,
            return_code: None,
            message: Some(message.into()),
        }
    }
}

/// A signal the worker can deliver to a running task. `Cancel` is a
/// surface-level signal the worker loop expands into the
/// interrupt/terminate/pipe escalation; the others map directly onto OS
/// signals (on unix) or `Kill` everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSignal {
    Cancel,
    Interrupt,
    Terminate,
    Pipe,
    Kill,
}

impl TaskSignal {
    pub fn from_wire(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "CANCEL" => TaskSignal::Cancel,
            "INTERRUPT" => TaskSignal::Interrupt,
            "TERMINATE" => TaskSignal::Terminate,
            "PIPE" => TaskSignal::Pipe,
            "KILL" => TaskSignal::Kill,
            _ => TaskSignal::Terminate,
        }
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    fn status(&self) -> TaskStatus;
    async fn send_signal(&self, signal: TaskSignal);
}

#[async_trait]
pub trait TaskFactory: Send + Sync {
    fn event_type(&self) -> &str;

    /// True when this factory has no spare capacity to start another task,
    /// independent of the worker-wide `max_tasks_running` cap.
    fn is_busy(&self) -> bool;

    async fn create_task(&self, settings: BTreeMap<String, String>) -> Option<Box<dyn Task>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_maps_from_wire() {
        assert_eq!(TaskSignal::from_wire("cancel"), TaskSignal::Cancel);
        assert_eq!(TaskSignal::from_wire("CANCEL"), TaskSignal::Cancel);
    }

    #[test]
    fn unknown_signal_falls_back_to_terminate() {
        assert_eq!(TaskSignal::from_wire("hup"), TaskSignal::Terminate);
    }
}
