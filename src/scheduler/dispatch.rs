//! Dispatch table: maps a [`JobType`] to the core operation it drives.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backup::BackupEngine;
use crate::errors::AppResult;
use crate::ingestor::IngestionCoordinator;
use crate::models::JobType;
use crate::pipeline::ProxyOrchestrator;

pub enum DispatchOutcome {
    Completed,
}

/// Invoked by the Runner for each dequeued job. Kept as a trait so tests
/// can substitute a fake dispatcher without wiring up every subsystem.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, job_type: JobType, target_id: Uuid, cancel: CancellationToken) -> AppResult<DispatchOutcome>;
}

pub struct CoreDispatcher {
    pub ingestion: Arc<IngestionCoordinator>,
    pub proxy_orchestrator: Arc<ProxyOrchestrator>,
    pub backup: Arc<BackupEngine>,
}

#[async_trait]
impl Dispatcher for CoreDispatcher {
    async fn dispatch(&self, job_type: JobType, target_id: Uuid, cancel: CancellationToken) -> AppResult<DispatchOutcome> {
        match job_type {
            JobType::StreamIngest | JobType::EpgIngest => {
                self.ingestion.ingest(target_id, cancel).await?;
            }
            JobType::ProxyGenerate => {
                self.proxy_orchestrator.execute(target_id).await?;
            }
            JobType::Backup => {
                self.backup.create().await?;
            }
            JobType::Cleanup => {
                self.backup.cleanup_old_backups().await?;
            }
        }
        Ok(DispatchOutcome::Completed)
    }
}
