//! Daemon registry entity and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    Connected,
    Unhealthy,
    Draining,
    Disconnected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonCapabilities {
    pub encoders: Vec<String>,
    /// GPU index -> active session count.
    pub gpus: HashMap<u32, u32>,
    pub max_concurrent_jobs: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Daemon {
    pub id: String,
    pub endpoint: String,
    pub state: DaemonState,
    pub capabilities: DaemonCapabilities,
    pub system_stats: SystemStats,
    pub active_jobs: u32,
    pub last_heartbeat: DateTime<Utc>,
}

impl Daemon {
    pub fn register(id: String, endpoint: String, capabilities: DaemonCapabilities) -> Self {
        Self {
            id,
            endpoint,
            state: DaemonState::Connected,
            capabilities,
            system_stats: SystemStats::default(),
            active_jobs: 0,
            last_heartbeat: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == DaemonState::Connected
            && self.active_jobs < self.capabilities.max_concurrent_jobs
    }

    pub fn has_capability(&self, encoder: &str) -> bool {
        self.capabilities.encoders.iter().any(|e| e == encoder)
    }

    pub fn has_available_gpu(&self) -> bool {
        self.capabilities.gpus.values().any(|&sessions| sessions == 0)
    }

    /// Validate and apply an explicit state transition per the §4.6 table.
    /// Heartbeat-timeout transitions are driven separately by the
    /// registry's sweeper, not through this entry point.
    pub fn transition(&mut self, to: DaemonState) -> Result<(), AppError> {
        use DaemonState::*;
        let allowed = match (self.state, to) {
            (Connected, Unhealthy) => true,
            (Connected, Draining) => true,
            (Connected, Disconnected) => true,
            (Unhealthy, Connected) => true,
            (Unhealthy, Draining) => true,
            (Unhealthy, Disconnected) => true,
            (Draining, Connected) => true,
            (Draining, Disconnected) => self.active_jobs == 0,
            (Disconnected, Connected) => true,
            _ => false,
        };
        if !allowed {
            return Err(AppError::precondition_failed(format!(
                "cannot transition daemon {} from {:?} to {:?}",
                self.id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    pub fn drain(&mut self) -> Result<(), AppError> {
        if self.state == DaemonState::Disconnected {
            return Err(AppError::precondition_failed(format!(
                "cannot drain disconnected daemon {}",
                self.id
            )));
        }
        self.transition(DaemonState::Draining)
    }

    pub fn activate(&mut self) -> Result<(), AppError> {
        if matches!(self.state, DaemonState::Unhealthy | DaemonState::Disconnected) {
            return Err(AppError::precondition_failed(format!(
                "cannot activate {:?} daemon {}",
                self.state, self.id
            )));
        }
        self.transition(DaemonState::Connected)
    }
}
