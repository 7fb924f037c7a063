//! `kubectl` task variant (C6): renders a Kubernetes `Job` manifest and
//! polls it with `kubectl get job -o json`, grounded in
//! `batchelor-worker/src/main/batchelor/worker/TaskFactoryDocker.cpp`'s
//! Kubernetes-backed execution path.
//!
//! Per the REDESIGN FLAG, this parses the structured JSON of `kubectl get
//! job -o json` (`.status.succeeded`/`.status.failed`) instead of scraping
//! `kubectl get pods` text output, which is what the original shelled out
//! to.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchelor_shared::model::TaskState;
use serde::Deserialize;
use tokio::process::Command;
use tracing::warn;
use uuid::Uuid;

use super::settings_merge::{merge_settings, substitute_variables, MergeMode, SettingSpec};
use super::traits::{Task, TaskFactory, TaskSignal, TaskStatus};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct KubectlTaskFactory {
    event_type: String,
    defaults: BTreeMap<String, SettingSpec>,
    max_running: usize,
    running: Arc<Mutex<usize>>,
}

impl KubectlTaskFactory {
    pub fn new(event_type: impl Into<String>, image_default: impl Into<String>, namespace: impl Into<String>, max_running: usize) -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(
            "image".to_string(),
            SettingSpec {
                mode: MergeMode::Override,
                default: image_default.into(),
            },
        );
        defaults.insert(
            "namespace".to_string(),
            SettingSpec {
                mode: MergeMode::Fixed,
                default: namespace.into(),
            },
        );
        defaults.insert(
            "command".to_string(),
            SettingSpec {
                mode: MergeMode::Override,
                default: String::new(),
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

fn render_manifest(job_name: &str, namespace: &str, image: &str, command: &str) -> String {
    let command_args = if command.is_empty() {
        String::new()
    } else {
        let quoted: Vec<String> = command.split_whitespace().map(|arg| format!("\"{arg}\"")).collect();
        format!(",\"command\":[{}]", quoted.join(","))
    };

    format!(
        r#"{{
  "apiVersion": "batch/v1",
  "kind": "Job",
  "metadata": {{"name": "{job_name}", "namespace": "{namespace}"}},
  "spec": {{
    "backoffLimit": 0,
    "template": {{
      "spec": {{
        "restartPolicy": "Never",
        "containers": [{{"name": "task", "image": "{image}"{command_args}}}]
      }}
    }}
  }}
}}"#
    )
}

#[derive(Debug, Deserialize, Default)]
struct JobStatus {
    #[serde(default)]
    succeeded: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    active: u32,
}

#[derive(Debug, Deserialize)]
struct JobWrapper {
    #[serde(default)]
    status: JobStatus,
}

#[async_trait]
impl TaskFactory for KubectlTaskFactory {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn is_busy(&self) -> bool {
        self.max_running != 0 && *self.running.lock().unwrap() >= self.max_running
    }

    async fn create_task(&self, settings: BTreeMap<String, String>) -> Option<Box<dyn Task>> {
        let mut merged = merge_settings(&self.defaults, &settings);
        substitute_variables(&mut merged);

        let image = merged.get("image")?.clone();
        let namespace = merged.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
        let command = merged.get("command").cloned().unwrap_or_default();

        let job_name = format!("batchelor-{}", Uuid::new_v4());
        let manifest = render_manifest(&job_name, &namespace, &image, &command);

        let apply = Command::new("kubectl")
            .args(["apply", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match apply {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn kubectl apply");
                return None;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            if stdin.write_all(manifest.as_bytes()).await.is_err() {
                return None;
            }
        }

        if child.wait().await.map(|s| s.success()).unwrap_or(false) {
            *self.running.lock().unwrap() += 1;
            Some(Box::new(KubectlTask::spawn(job_name, namespace, self.running.clone())))
        } else {
            None
        }
    }
}

struct KubectlTask {
    job_name: String,
    namespace: String,
    status: Arc<Mutex<TaskStatus>>,
}

impl KubectlTask {
    fn spawn(job_name: String, namespace: String, running: Arc<Mutex<usize>>) -> Self {
        let status = Arc::new(Mutex::new(TaskStatus::running()));
        let status_clone = status.clone();
        let poll_job = job_name.clone();
        let poll_namespace = namespace.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;

                let output = Command::new("kubectl")
                    .args(["get", "job", &poll_job, "-n", &poll_namespace, "-o", "json"])
                    .output()
                    .await;

                let Ok(output) = output else {
                    continue;
                };
                if !output.status.success() {
                    continue;
                }

                let Ok(wrapper) = serde_json::from_slice::<JobWrapper>(&output.stdout) else {
                    continue;
                };

                if wrapper.status.succeeded > 0 {
                    *status_clone.lock().unwrap() = TaskStatus {
                        state: TaskState::Done,
                        return_code: Some(0),
                        message: None,
                    };
                    break;
                }
                if wrapper.status.failed > 0 && wrapper.status.active == 0 {
                    *status_clone.lock().unwrap() = TaskStatus {
                        state: TaskState::Done,
                        return_code: Some(1),
                        message: None,
                    };
                    break;
                }
                if wrapper.status.failed > 0 {
                    *status_clone.lock().unwrap() = TaskStatus {
                        state: TaskState::Running,
                        return_code: None,
                        message: Some(format!("{} pod(s) failed, retry in progress", wrapper.status.failed)),
                    };
                }
            }
            *running.lock().unwrap() -= 1;
        });

        Self {
            job_name,
            namespace,
            status,
        }
    }
}

#[async_trait]
impl Task for KubectlTask {
    fn status(&self) -> TaskStatus {
        self.status.lock().unwrap().clone()
    }

    async fn send_signal(&self, signal: TaskSignal) {
        if !matches!(signal, TaskSignal::Cancel | TaskSignal::Terminate | TaskSignal::Kill) {
            return;
        }
        let _ = Command::new("kubectl")
            .args(["delete", "job", &self.job_name, "-n", &self.namespace, "--ignore-not-found"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_manifest_with_command() {
        let manifest = render_manifest("job-1", "default", "busybox", "echo hi");
        assert!(manifest.contains("\"name\": \"job-1\""));
        assert!(manifest.contains("\"command\":[\"echo\",\"hi\"]"));
    }

    #[test]
    fn renders_manifest_without_command() {
        let manifest = render_manifest("job-1", "default", "busybox", "");
        assert!(!manifest.contains("\"command\""));
    }

    #[test]
    fn job_status_defaults_to_zero() {
        let status: JobStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.succeeded, 0);
        assert_eq!(status.failed, 0);
    }
}
