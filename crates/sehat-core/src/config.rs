//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Paths to all Sehat data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite directory for audit records (`data/db/`).
    pub db_dir: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
    /// Optional knowledge table override (`data/knowledge.json`).
    pub knowledge_file: PathBuf,
    /// Optional safety policy override (`data/safety-policy.json`).
    pub safety_policy_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db_dir: root.join("db"),
            llm_config_file: root.join("llm-config.json"),
            knowledge_file: root.join("knowledge.json"),
            safety_policy_file: root.join("safety-policy.json"),
            root,
        };
        std::fs::create_dir_all(&paths.db_dir)?;
        Ok(paths)
    }
}

/// Timing and breaker knobs for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Ceiling on a single RemoteReasoner call.
    pub remote_timeout: Duration,
    /// Ceiling on a whole `analyze` invocation.
    pub pipeline_timeout: Duration,
    /// Consecutive `RemoteUnavailable` outcomes before a stage breaker opens.
    pub breaker_threshold: u32,
    /// How long an open breaker skips the remote path.
    pub breaker_cooldown: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_millis(5_000),
            pipeline_timeout: Duration::from_millis(15_000),
            breaker_threshold: 3,
            breaker_cooldown: Duration::from_secs(60),
        }
    }
}

impl PipelineSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            remote_timeout: env_parse("SEHAT_REMOTE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.remote_timeout),
            pipeline_timeout: env_parse("SEHAT_PIPELINE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.pipeline_timeout),
            breaker_threshold: env_parse::<u32>("SEHAT_BREAKER_THRESHOLD")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.breaker_threshold),
            breaker_cooldown: env_parse("SEHAT_BREAKER_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.breaker_cooldown),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}

/// Top-level Sehat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SehatConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub pipeline: PipelineSettings,
}

impl SehatConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_parse("PORT").unwrap_or(8080);
        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            pipeline: PipelineSettings::from_env(),
        })
    }
}
