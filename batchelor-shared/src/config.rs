//! Configuration structs shared by the head and worker binaries. Loaded
//! from TOML with `Default` impls for every optional field, layered into
//! a head section and a worker section the way a combined config file
//! groups per-role settings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_zombie_ttl() -> String {
    "5min".to_string()
}

fn default_delete_ttl() -> String {
    "1h".to_string()
}

fn default_sweep_interval() -> String {
    "30s".to_string()
}

fn default_request_interval() -> String {
    "5s".to_string()
}

fn default_realm() -> String {
    "batchelor".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthUser {
    pub user: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub basic_users: Vec<BasicAuthUser>,
    #[serde(default = "default_realm")]
    pub realm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            basic_users: Vec::new(),
            realm: default_realm(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_zombie_ttl")]
    pub zombie_ttl: String,
    #[serde(default = "default_delete_ttl")]
    pub delete_ttl: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_database_path() -> String {
    "batchelor.sqlite".to_string()
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_path: default_database_path(),
            zombie_ttl: default_zombie_ttl(),
            delete_ttl: default_delete_ttl(),
            sweep_interval: default_sweep_interval(),
            auth: AuthConfig::default(),
        }
    }
}

impl HeadConfig {
    pub fn zombie_ttl(&self) -> Result<Duration, crate::error::BatchelorError> {
        parse_duration(&self.zombie_ttl)
    }

    pub fn delete_ttl(&self) -> Result<Duration, crate::error::BatchelorError> {
        parse_duration(&self.delete_ttl)
    }

    pub fn sweep_interval(&self) -> Result<Duration, crate::error::BatchelorError> {
        parse_duration(&self.sweep_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub kind: String,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    #[serde(default)]
    pub head_urls: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, String>,
    #[serde(default)]
    pub factories: HashMap<String, FactoryConfig>,
    #[serde(default = "default_request_interval")]
    pub request_interval: String,
    #[serde(default)]
    pub max_tasks_running: usize,
}

fn default_worker_id() -> String {
    "worker-1".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            head_urls: vec!["http://127.0.0.1:8080".to_string()],
            api_key: None,
            metrics: HashMap::new(),
            factories: HashMap::new(),
            request_interval: default_request_interval(),
            max_tasks_running: 0,
        }
    }
}

impl WorkerConfig {
    pub fn request_interval(&self) -> Result<Duration, crate::error::BatchelorError> {
        parse_duration(&self.request_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchelorConfig {
    #[serde(default)]
    pub head: Option<HeadConfig>,
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
}

impl BatchelorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, crate::error::BatchelorError> {
        toml::from_str(input).map_err(|e| crate::error::BatchelorError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_head_config_parses_its_own_durations() {
        let cfg = HeadConfig::default();
        assert!(cfg.zombie_ttl().is_ok());
        assert!(cfg.delete_ttl().is_ok());
        assert!(cfg.sweep_interval().is_ok());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let cfg = BatchelorConfig::from_toml_str(
            r#"
            [head]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        let head = cfg.head.unwrap();
        assert_eq!(head.bind, "0.0.0.0:9000");
        assert_eq!(head.zombie_ttl, "5min");
    }

    #[test]
    fn worker_config_defaults_request_interval() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.request_interval().unwrap(), Duration::from_secs(5));
    }
}
