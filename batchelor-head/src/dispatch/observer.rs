//! Observer hook fired on task lifecycle transitions. Grounded in the
//! original's `Observer` interface (`batchelor-head/Service.cpp`'s calls to
//! `observer.onTaskStateChanged`) — here a simple trait so the head binary
//! can wire in a tracing-based observer without the dispatch service
//! depending on logging concerns directly.

use batchelor_shared::model::{Task, TaskState};

pub trait Observer: Send + Sync {
    fn on_state_changed(&self, task: &Task, previous: TaskState);
}

#[derive(Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_state_changed(&self, task: &Task, previous: TaskState) {
        tracing::info!(
            task_id = %task.task_id,
            event_type = %task.event_type,
            from = %previous,
            to = %task.state,
            "task state changed"
        );
    }
}
