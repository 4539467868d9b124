//! Layered configuration.
//!
//! Settings are resolved from, in increasing priority: compiled-in
//! defaults, an optional TOML file, then environment variables prefixed
//! `TVARR_` with `__` as the nesting separator (e.g.
//! `TVARR_BACKUP__RETENTION_COUNT=10`). This mirrors the teacher's
//! figment composition.

mod defaults;

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingestion: IngestionConfig::default(),
            pipeline: PipelineConfig::default(),
            scheduler: SchedulerConfig::default(),
            backup: BackupConfig::default(),
            daemon: DaemonConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `$TVARR_CONFIG` (default `config.toml`),
    /// falling back to compiled-in defaults when the file is absent.
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var("TVARR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        if !std::path::Path::new(config_file).exists() {
            tracing::warn!(
                path = config_file,
                "config file not found, using compiled-in defaults"
            );
            let config: Config = Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Env::prefixed("TVARR_").split("__"))
                .extract()
                .map_err(|e| AppError::invalid_argument(format!("invalid configuration: {e}")))?;
            return Ok(config);
        }

        let config: Config = Figment::new()
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("TVARR_").split("__"))
            .extract()
            .map_err(|e| AppError::invalid_argument(format!("invalid configuration: {e}")))?;
        Ok(config)
    }
}

/// Ingestion Coordinator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_progress_update_interval_ms")]
    pub progress_update_interval_ms: u64,
    #[serde(default = "default_max_retry_backoff_secs")]
    pub max_retry_backoff_secs: u64,
    #[serde(default = "default_run_missed_immediately")]
    pub run_missed_immediately: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            progress_update_interval_ms: default_progress_update_interval_ms(),
            max_retry_backoff_secs: default_max_retry_backoff_secs(),
            run_missed_immediately: default_run_missed_immediately(),
        }
    }
}

/// Proxy Generation Orchestrator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_min_free_disk_bytes")]
    pub min_free_disk_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            min_free_disk_bytes: default_min_free_disk_bytes(),
        }
    }
}

/// Scheduler + Runner tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,
    #[serde(default)]
    pub per_job_type_concurrency: std::collections::HashMap<String, usize>,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            global_concurrency: default_global_concurrency(),
            per_job_type_concurrency: std::collections::HashMap::new(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_attempts: default_retry_max_attempts(),
        }
    }
}

/// Backup Engine configuration, including the retention schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub directory: PathBuf,
    #[serde(default)]
    pub schedule: BackupScheduleConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_backup_dir(),
            schedule: BackupScheduleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_backup_cron")]
    pub cron: String,
    #[serde(default = "default_backup_retention_count")]
    pub retention_count: usize,
}

impl Default for BackupScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: default_backup_cron(),
            retention_count: default_backup_retention_count(),
        }
    }
}

/// Daemon Registry tuning (heartbeat thresholds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_heartbeat_sweep_interval_secs")]
    pub heartbeat_sweep_interval_secs: u64,
    #[serde(default = "default_unhealthy_after_secs")]
    pub unhealthy_after_secs: u64,
    #[serde(default = "default_disconnected_after_secs")]
    pub disconnected_after_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_sweep_interval_secs: default_heartbeat_sweep_interval_secs(),
            unhealthy_after_secs: default_unhealthy_after_secs(),
            disconnected_after_secs: default_disconnected_after_secs(),
        }
    }
}

/// Relay Session Manager buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_ring_buffer_bytes")]
    pub ring_buffer_bytes: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: default_ring_buffer_bytes(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}
