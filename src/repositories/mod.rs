//! Storage abstraction.
//!
//! The persistence layer itself is out of scope for this crate (§1); these
//! traits are the seam the core subsystems are written against, narrow
//! enough that a real SeaORM-backed implementation (as the teacher wires
//! up in its own `repositories` module) slots in without touching
//! ingestion, pipeline, scheduler, or backup logic.

mod in_memory;

pub use in_memory::*;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{Channel, Job, JobStatus, JobType, Proxy, Source};

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> AppResult<Source>;
    async fn find_all(&self) -> AppResult<Vec<Source>>;
    async fn upsert(&self, source: Source) -> AppResult<()>;
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Delete every channel owned by `source_id`. Must participate in the
    /// same transaction as the subsequent batch upserts so a failed
    /// ingestion rolls back to the prior channel set.
    async fn delete_by_source(&self, source_id: Uuid) -> AppResult<()>;
    async fn upsert_batch(&self, channels: Vec<Channel>) -> AppResult<()>;
    async fn find_by_source(&self, source_id: Uuid) -> AppResult<Vec<Channel>>;
    async fn find_by_proxy_sources(&self, source_ids: &[Uuid]) -> AppResult<Vec<Channel>>;
}

#[async_trait]
pub trait ProxyRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> AppResult<Proxy>;
    async fn find_all(&self) -> AppResult<Vec<Proxy>>;
    async fn upsert(&self, proxy: Proxy) -> AppResult<()>;

    /// Transition a proxy's status to `generating`, but only if it is not
    /// already non-idle. Returns `false` (no mutation) on the race the
    /// orchestrator must reject with `ErrPipelineAlreadyRunning`.
    async fn try_start_generation(&self, id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: Job) -> AppResult<()>;
    async fn update(&self, job: Job) -> AppResult<()>;
    async fn find(&self, id: Uuid) -> AppResult<Job>;
    async fn find_running_for_target(&self, job_type: JobType, target_id: Uuid) -> AppResult<Option<Job>>;
    async fn find_by_status(&self, status: JobStatus) -> AppResult<Vec<Job>>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Database-backed overrides supersede file configuration (§6); a
    /// `None` return means "no override, use the file config value".
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, key: &str, value: String) -> AppResult<()>;
}
