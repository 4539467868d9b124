//! `DaemonRegistry` — O(1) lookup by id, predicate-based iteration, and
//! the 5-second heartbeat sweeper that drives timeout transitions.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::errors::AppResult;
use crate::models::{Daemon, DaemonCapabilities, DaemonState, SystemStats};

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryStats {
    pub total: usize,
    pub connected: usize,
    pub unhealthy: usize,
    pub draining: usize,
    pub disconnected: usize,
}

pub struct DaemonRegistry {
    config: DaemonConfig,
    daemons: RwLock<HashMap<String, Daemon>>,
}

impl DaemonRegistry {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config, daemons: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, id: String, endpoint: String, capabilities: DaemonCapabilities) {
        let daemon = Daemon::register(id.clone(), endpoint, capabilities);
        self.daemons.write().unwrap().insert(id, daemon);
    }

    pub fn get(&self, id: &str) -> Option<Daemon> {
        self.daemons.read().unwrap().get(id).cloned()
    }

    pub fn heartbeat(&self, id: &str, system_stats: SystemStats, active_jobs: u32) -> AppResult<()> {
        let mut guard = self.daemons.write().unwrap();
        let daemon = guard.get_mut(id).ok_or_else(|| crate::errors::AppError::not_found("daemon", id))?;
        daemon.last_heartbeat = Utc::now();
        daemon.system_stats = system_stats;
        daemon.active_jobs = active_jobs;
        if daemon.state == DaemonState::Unhealthy {
            daemon.transition(DaemonState::Connected)?;
            info!(daemon_id = id, "daemon recovered from unhealthy state");
        }
        Ok(())
    }

    pub fn drain(&self, id: &str) -> AppResult<()> {
        let mut guard = self.daemons.write().unwrap();
        let daemon = guard.get_mut(id).ok_or_else(|| crate::errors::AppError::not_found("daemon", id))?;
        daemon.drain()
    }

    pub fn activate(&self, id: &str) -> AppResult<()> {
        let mut guard = self.daemons.write().unwrap();
        let daemon = guard.get_mut(id).ok_or_else(|| crate::errors::AppError::not_found("daemon", id))?;
        daemon.activate()
    }

    pub fn unregister(&self, id: &str) -> AppResult<()> {
        let mut guard = self.daemons.write().unwrap();
        let daemon = guard.get_mut(id).ok_or_else(|| crate::errors::AppError::not_found("daemon", id))?;
        daemon.transition(DaemonState::Disconnected)
    }

    pub fn get_active(&self) -> Vec<Daemon> {
        self.filter(|d| d.state != DaemonState::Disconnected)
    }

    pub fn get_available(&self) -> Vec<Daemon> {
        self.filter(|d| d.is_available())
    }

    pub fn get_with_capability(&self, encoder: &str) -> Vec<Daemon> {
        self.filter(|d| d.is_available() && d.has_capability(encoder))
    }

    pub fn get_with_available_gpu(&self) -> Vec<Daemon> {
        self.filter(|d| d.is_available() && d.has_available_gpu())
    }

    fn filter(&self, predicate: impl Fn(&Daemon) -> bool) -> Vec<Daemon> {
        self.daemons.read().unwrap().values().filter(|d| predicate(d)).cloned().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let guard = self.daemons.read().unwrap();
        let mut stats = RegistryStats { total: guard.len(), ..Default::default() };
        for daemon in guard.values() {
            match daemon.state {
                DaemonState::Connected => stats.connected += 1,
                DaemonState::Unhealthy => stats.unhealthy += 1,
                DaemonState::Draining => stats.draining += 1,
                DaemonState::Disconnected => stats.disconnected += 1,
            }
        }
        stats
    }

    /// One sweep: `connected -> unhealthy` past `unhealthy_after_secs`,
    /// `unhealthy -> disconnected` a further `disconnected_after_secs`
    /// later. Draining/disconnected daemons are untouched by heartbeat
    /// timeout — draining only exits via explicit activate or drain-to-zero.
    pub fn sweep_heartbeats(&self) {
        let now = Utc::now();
        let mut guard = self.daemons.write().unwrap();
        for daemon in guard.values_mut() {
            let age = (now - daemon.last_heartbeat).num_seconds().max(0) as u64;
            match daemon.state {
                DaemonState::Connected if age >= self.config.unhealthy_after_secs => {
                    warn!(daemon_id = %daemon.id, age, "daemon heartbeat stale, marking unhealthy");
                    let _ = daemon.transition(DaemonState::Unhealthy);
                }
                DaemonState::Unhealthy if age >= self.config.disconnected_after_secs => {
                    warn!(daemon_id = %daemon.id, age, "daemon heartbeat exceeded disconnect threshold");
                    let _ = daemon.transition(DaemonState::Disconnected);
                }
                _ => {}
            }
        }
    }

    /// Drive the periodic sweeper until `cancel` fires.
    pub async fn run_sweeper(&self, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.heartbeat_sweep_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_heartbeats(),
                _ = cancel.cancelled() => break,
            }
        }
    }
}
