use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cleanup::CleanupConfig;
use crate::combiner::CombinerConfig;
use crate::cost::PricingConfig;
use crate::dispatcher::DispatcherConfig;
use crate::orchestrator::{OrchestratorConfig, RenderSettings};
use crate::planner::PlannerConfig;
use crate::worker::WorkerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub combiner: CombinerConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl Config {
    /// Component settings handed to the render orchestrator.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            orchestrator: self.orchestrator.clone(),
            planner: self.planner.clone(),
            dispatcher: self.dispatcher.clone(),
            pricing: self.pricing.clone(),
            combiner: self.combiner.clone(),
            cleanup: self.cleanup.clone(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Finished renders kept for status queries; the oldest are dropped.
    #[serde(default = "default_max_finished_renders")]
    pub max_finished_renders: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_finished_renders: default_max_finished_renders(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_finished_renders() -> usize {
    1000
}

/// Where job objects live.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local; lost on restart.
    #[default]
    Memory,
    Filesystem,
    // Future: S3
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory (filesystem backend only)
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("chunkrender-data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_finished_renders, 1000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.dispatcher.max_concurrent_invocations, 200);
        assert_eq!(config.pricing.region, "us-east-1");
    }

    #[test]
    fn test_render_settings_carry_sections() {
        let config: Config = toml::from_str(
            r#"
[dispatcher]
max_retries = 4

[planner]
default_concurrency = 8

[cleanup]
enabled = false
"#,
        )
        .unwrap();
        let settings = config.render_settings();
        assert_eq!(settings.dispatcher.max_retries, 4);
        assert_eq!(settings.planner.default_concurrency, 8);
        assert!(!settings.cleanup.enabled);
    }

    #[test]
    fn test_storage_backend_parsing() {
        let config: Config = toml::from_str(
            r#"
[storage]
backend = "filesystem"
root = "/var/lib/chunkrender"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/chunkrender"));
    }
}
