//! `exec` task variant (C6): spawns a plain OS process. Grounded in
//! `batchelor-worker/src/main/batchelor/worker/TaskFactoryExec.cpp`, which
//! configures a `cmd` and working directory (`cd`) and forks/execs directly.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batchelor_shared::model::TaskState;
use tokio::process::Command;
use tracing::warn;

use super::settings_merge::{merge_settings, substitute_variables, MergeMode, SettingSpec};
use super::traits::{Task, TaskFactory, TaskSignal, TaskStatus};

pub struct ExecTaskFactory {
    event_type: String,
    defaults: BTreeMap<String, SettingSpec>,
    max_running: usize,
    running: Arc<Mutex<usize>>,
}

impl ExecTaskFactory {
    pub fn new(event_type: impl Into<String>, cmd_default: impl Into<String>, cd_default: impl Into<String>, max_running: usize) -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(
            "cmd".to_string(),
            SettingSpec {
                mode: MergeMode::Override,
                default: cmd_default.into(),
            },
        );
        defaults.insert(
            "cd".to_string(),
            SettingSpec {
                mode: MergeMode::Override,
                default: cd_default.into(),
            },
        );
        Self {
            event_type: event_type.into(),
            defaults,
            max_running,
            running: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl TaskFactory for ExecTaskFactory {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn is_busy(&self) -> bool {
        self.max_running != 0 && *self.running.lock().unwrap() >= self.max_running
    }

    async fn create_task(&self, settings: BTreeMap<String, String>) -> Option<Box<dyn Task>> {
        let mut merged = merge_settings(&self.defaults, &settings);
        substitute_variables(&mut merged);

        let cmd = merged.get("cmd")?.clone();
        let cd = merged.get("cd").cloned().unwrap_or_default();

        let mut parts = cmd.split_whitespace();
        let program = parts.next()?;
        let args: Vec<&str> = parts.collect();

        let mut command = Command::new(program);
        command.args(&args);
        if !cd.is_empty() {
            command.current_dir(&cd);
        }
        command.stdout(Stdio::null()).stderr(Stdio::null());

        match command.spawn() {
            Ok(child) => {
                *self.running.lock().unwrap() += 1;
                Some(Box::new(ExecTask::spawn(child, self.running.clone())))
            }
            Err(e) => {
                warn!(error = %e, cmd = %cmd, "failed to spawn exec task");
                None
            }
        }
    }
}

struct ExecTask {
    status: Arc<Mutex<TaskStatus>>,
    pid: Option<i32>,
}

impl ExecTask {
    fn spawn(mut child: tokio::process::Child, running: Arc<Mutex<usize>>) -> Self {
        let pid = child.id().map(|p| p as i32);
        let status = Arc::new(Mutex::new(TaskStatus::running()));
        let status_clone = status.clone();

        tokio::spawn(async move {
            let result = child.wait().await;
            *running.lock().unwrap() -= 1;
            let mut guard = status_clone.lock().unwrap();
            *guard = match result {
                Ok(exit_status) => TaskStatus {
                    state: TaskState::Done,
                    return_code: Some(exit_status.code().unwrap_or(-1)),
                    message: None,
                },
                Err(e) => TaskStatus::signaled(format!("wait failed: {e}")),
            };
        });

        Self { status, pid }
    }
}

#[async_trait]
impl Task for ExecTask {
    fn status(&self) -> TaskStatus {
        self.status.lock().unwrap().clone()
    }

    async fn send_signal(&self, signal: TaskSignal) {
        let Some(pid) = self.pid else { return };

        #[cfg(unix)]
        {
            let os_signal = match signal {
                TaskSignal::Cancel | TaskSignal::Interrupt => libc::SIGINT,
                TaskSignal::Terminate => libc::SIGTERM,
                TaskSignal::Pipe => libc::SIGPIPE,
                TaskSignal::Kill => libc::SIGKILL,
            };
            unsafe {
                libc::kill(pid, os_signal);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = (pid, signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_task_runs_true_and_reports_done() {
        let factory = ExecTaskFactory::new("noop", "/bin/true", "", 0);
        let task = factory.create_task(BTreeMap::new()).await.unwrap();

        for _ in 0..100 {
            if task.status().state != TaskState::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(task.status().state, TaskState::Done);
    }

    #[tokio::test]
    async fn create_task_reports_done_with_nonzero_return_code() {
        let factory = ExecTaskFactory::new("noop", "/bin/false", "", 0);
        let task = factory.create_task(BTreeMap::new()).await.unwrap();

        for _ in 0..100 {
            if task.status().state != TaskState::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let status = task.status();
        assert_eq!(status.state, TaskState::Done);
        assert_eq!(status.return_code, Some(1));
    }

    #[test]
    fn is_busy_respects_max_running() {
        let factory = ExecTaskFactory::new("noop", "/bin/true", "", 1);
        assert!(!factory.is_busy());
        *factory.running.lock().unwrap() = 1;
        assert!(factory.is_busy());
    }

    #[test]
    fn unlimited_max_running_never_busy() {
        let factory = ExecTaskFactory::new("noop", "/bin/true", "", 0);
        *factory.running.lock().unwrap() = 1000;
        assert!(!factory.is_busy());
    }
}
