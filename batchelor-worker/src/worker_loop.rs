//! Worker poll loop (C5): a single-threaded cycle of fetch, assign, and
//! report, grounded in `Main.cpp`'s `run1()`/`run2()`/`stopRunning()`.
//!
//! Each cycle reports every in-flight task's current status plus a
//! `TASKS_RUNNING` metric and per-factory availability, applies the
//! response's signals (expanding `CANCEL` into the interrupt/terminate/pipe
//! escalation `run2()` performs) and run configurations, then sleeps for the
//! configured request interval unless shutdown was requested, in which case
//! it escalates signals to every still-running task and waits out a kill
//! timeout before returning.

use std::collections::BTreeMap;
use std::time::Duration;

use batchelor_client::HeadClient;
use batchelor_shared::model::{EventTypeAvailable, FetchRequest, Setting, TaskStatusWorker};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::factory::traits::{Task, TaskFactory, TaskSignal};
use crate::resources::ResourceBudget;

struct RunningTask {
    task_id: String,
    event_type: String,
    task: Box<dyn Task>,
}

pub struct WorkerLoop {
    client: HeadClient,
    factories: Vec<Box<dyn TaskFactory>>,
    metrics: BTreeMap<String, String>,
    budget: ResourceBudget,
    request_interval: Duration,
    kill_timeout: Duration,
    running: Vec<RunningTask>,
}

impl WorkerLoop {
    pub fn new(
        client: HeadClient,
        factories: Vec<Box<dyn TaskFactory>>,
        metrics: BTreeMap<String, String>,
        max_tasks_running: usize,
        request_interval: Duration,
    ) -> Self {
        Self {
            client,
            factories,
            metrics,
            budget: ResourceBudget::new(max_tasks_running),
            request_interval,
            kill_timeout: Duration::from_secs(10),
            running: Vec::new(),
        }
    }

    /// Runs cycles until `shutdown` is signalled, then performs the
    /// escalating-signal shutdown sequence before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.run_cycle().await;

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.request_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stop_running().await;
    }

    /// One fetch/assign/report cycle (`run1()`/`run2()`).
    async fn run_cycle(&mut self) {
        let request = self.build_fetch_request();

        let response = match self.client.fetch_task(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "fetch_task failed, skipping cycle");
                return;
            }
        };

        for signal in &response.signals {
            self.deliver_signal(&signal.task_id, TaskSignal::from_wire(&signal.signal)).await;
        }

        for run_configuration in response.run_configurations {
            self.start_task(run_configuration).await;
        }

        self.reap_finished();
    }

    fn build_fetch_request(&mut self) -> FetchRequest {
        let tasks = self
            .running
            .iter()
            .map(|rt| {
                let status = rt.task.status();
                TaskStatusWorker {
                    task_id: rt.task_id.clone(),
                    state: status.state.as_str().to_string(),
                    return_code: status.return_code,
                    message: status.message,
                }
            })
            .collect();

        let mut metrics: Vec<Setting> = self
            .metrics
            .iter()
            .map(|(k, v)| Setting::new(k.clone(), v.clone()))
            .collect();
        metrics.push(Setting::new("TASKS_RUNNING", self.budget.running().to_string()));

        let event_types = self
            .factories
            .iter()
            .map(|f| EventTypeAvailable {
                event_type: f.event_type().to_string(),
                available: !f.is_busy() && !self.budget.is_exhausted(),
            })
            .collect();

        FetchRequest {
            tasks,
            metrics,
            event_types,
        }
    }

    async fn start_task(&mut self, run_configuration: batchelor_shared::model::RunConfiguration) {
        let Some(factory) = self.factories.iter().find(|f| f.event_type() == run_configuration.event_type) else {
            warn!(event_type = %run_configuration.event_type, "no factory registered for run configuration");
            return;
        };

        let settings: BTreeMap<String, String> = run_configuration
            .settings
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();

        match factory.create_task(settings).await {
            Some(task) => {
                self.budget.acquire();
                info!(task_id = %run_configuration.task_id, event_type = %run_configuration.event_type, "started task");
                self.running.push(RunningTask {
                    task_id: run_configuration.task_id,
                    event_type: run_configuration.event_type,
                    task,
                });
            }
            None => {
                warn!(task_id = %run_configuration.task_id, "factory declined to create task");
            }
        }
    }

    /// `CANCEL` is not itself delivered to a task: `run2()` expands it into
    /// interrupt, then terminate, then pipe, in sequence.
    async fn deliver_signal(&self, task_id: &str, signal: TaskSignal) {
        let Some(running) = self.running.iter().find(|rt| rt.task_id == task_id) else {
            debug!(task_id, "signal for unknown or already-finished task, ignoring");
            return;
        };

        if signal == TaskSignal::Cancel {
            running.task.send_signal(TaskSignal::Interrupt).await;
            running.task.send_signal(TaskSignal::Terminate).await;
            running.task.send_signal(TaskSignal::Pipe).await;
        } else {
            running.task.send_signal(signal).await;
        }
    }

    /// Drops any task whose status has reached a terminal state, freeing its
    /// budget slot. The head learns of the terminal status on the next
    /// cycle's report before the task disappears from it.
    fn reap_finished(&mut self) {
        let mut still_running = Vec::with_capacity(self.running.len());
        for rt in self.running.drain(..) {
            if rt.task.status().state.is_terminal() {
                self.budget.release();
                info!(task_id = %rt.task_id, event_type = %rt.event_type, "task finished");
            } else {
                still_running.push(rt);
            }
        }
        self.running = still_running;
    }

    /// `stopRunning()`: escalate interrupt, terminate, pipe to every
    /// still-running task, then wait out `kill_timeout` before force-killing
    /// whatever remains.
    async fn stop_running(&mut self) {
        if self.running.is_empty() {
            return;
        }

        info!(count = self.running.len(), "shutting down, escalating signals to running tasks");

        for rt in &self.running {
            rt.task.send_signal(TaskSignal::Interrupt).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        for rt in &self.running {
            rt.task.send_signal(TaskSignal::Terminate).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        for rt in &self.running {
            rt.task.send_signal(TaskSignal::Pipe).await;
        }

        let deadline = tokio::time::Instant::now() + self.kill_timeout;
        while tokio::time::Instant::now() < deadline {
            self.reap_finished();
            if self.running.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        warn!(count = self.running.len(), "tasks still running past kill timeout, force-killing");
        for rt in &self.running {
            rt.task.send_signal(TaskSignal::Kill).await;
        }
    }
}

pub fn spawn(mut worker: WorkerLoop, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { worker.run(shutdown).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::exec::ExecTaskFactory;
    use batchelor_client::config::ConnectionSpec;

    fn client() -> HeadClient {
        HeadClient::new(vec![ConnectionSpec::new("http://127.0.0.1:0")])
    }

    #[tokio::test]
    async fn build_fetch_request_reports_tasks_running_metric() {
        let mut worker = WorkerLoop::new(
            client(),
            vec![Box::new(ExecTaskFactory::new("noop", "/bin/true", "", 0))],
            BTreeMap::new(),
            0,
            Duration::from_secs(1),
        );
        let request = worker.build_fetch_request();
        assert!(request.metrics.iter().any(|s| s.key == "TASKS_RUNNING" && s.value == "0"));
        assert_eq!(request.event_types.len(), 1);
        assert!(request.event_types[0].available);
    }

    #[tokio::test]
    async fn start_task_with_unknown_event_type_is_a_noop() {
        let mut worker = WorkerLoop::new(client(), vec![], BTreeMap::new(), 0, Duration::from_secs(1));
        worker
            .start_task(batchelor_shared::model::RunConfiguration {
                task_id: "t1".to_string(),
                event_type: "missing".to_string(),
                settings: vec![],
            })
            .await;
        assert!(worker.running.is_empty());
    }

    #[tokio::test]
    async fn start_task_runs_and_reaps() {
        let mut worker = WorkerLoop::new(
            client(),
            vec![Box::new(ExecTaskFactory::new("noop", "/bin/true", "", 0))],
            BTreeMap::new(),
            0,
            Duration::from_secs(1),
        );
        worker
            .start_task(batchelor_shared::model::RunConfiguration {
                task_id: "t1".to_string(),
                event_type: "noop".to_string(),
                settings: vec![],
            })
            .await;
        assert_eq!(worker.running.len(), 1);
        assert_eq!(worker.budget.running(), 1);

        for _ in 0..100 {
            worker.reap_finished();
            if worker.running.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(worker.running.is_empty());
        assert_eq!(worker.budget.running(), 0);
    }
}
