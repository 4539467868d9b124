//! Default value functions for `#[serde(default = "...")]` fields.
//!
//! Kept as free functions (rather than inline const expressions) so serde
//! can reference them and so a config file overriding one field doesn't
//! require specifying the rest.

use std::path::PathBuf;

pub fn default_progress_update_interval_ms() -> u64 {
    500
}

pub fn default_max_retry_backoff_secs() -> u64 {
    1024
}

pub fn default_run_missed_immediately() -> bool {
    true
}

pub fn default_working_dir() -> PathBuf {
    PathBuf::from("./data/pipeline")
}

pub fn default_min_free_disk_bytes() -> u64 {
    512 * 1024 * 1024
}

pub fn default_tick_interval_secs() -> u64 {
    1
}

pub fn default_global_concurrency() -> usize {
    4
}

pub fn default_retry_base_secs() -> u64 {
    1
}

pub fn default_retry_max_attempts() -> u32 {
    3
}

pub fn default_backup_dir() -> PathBuf {
    PathBuf::from("./data/backups")
}

pub fn default_backup_cron() -> String {
    "0 0 3 * * *".to_string()
}

pub fn default_backup_retention_count() -> usize {
    7
}

pub fn default_heartbeat_sweep_interval_secs() -> u64 {
    5
}

pub fn default_unhealthy_after_secs() -> u64 {
    30
}

pub fn default_disconnected_after_secs() -> u64 {
    90
}

pub fn default_ring_buffer_bytes() -> usize {
    4 * 1024 * 1024
}

pub fn default_idle_timeout_secs() -> u64 {
    30
}
