//! In-memory repository implementations.
//!
//! Used by tests throughout this crate, and as the default wiring when no
//! external storage is configured (analogous to the teacher's use of a
//! SQLite-backed `sea_orm` repository, but without the storage layer this
//! crate treats as out of scope).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ChannelRepository, JobRepository, ProxyRepository, SettingsRepository, SourceRepository};
use crate::errors::{AppError, AppResult};
use crate::models::{Channel, Job, JobStatus, JobType, Proxy, ProxyStatus, Source};

#[derive(Default)]
pub struct InMemorySourceRepository {
    sources: RwLock<HashMap<Uuid, Source>>,
}

#[async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn find(&self, id: Uuid) -> AppResult<Source> {
        self.sources
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::source_not_found(id))
    }

    async fn find_all(&self) -> AppResult<Vec<Source>> {
        Ok(self.sources.read().unwrap().values().cloned().collect())
    }

    async fn upsert(&self, source: Source) -> AppResult<()> {
        self.sources.write().unwrap().insert(source.id, source);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.sources.write().unwrap().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryChannelRepository {
    channels: RwLock<HashMap<Uuid, Channel>>,
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn delete_by_source(&self, source_id: Uuid) -> AppResult<()> {
        self.channels.write().unwrap().retain(|_, c| c.source_id != source_id);
        Ok(())
    }

    async fn upsert_batch(&self, channels: Vec<Channel>) -> AppResult<()> {
        let mut guard = self.channels.write().unwrap();
        for channel in channels {
            guard.insert(channel.id, channel);
        }
        Ok(())
    }

    async fn find_by_source(&self, source_id: Uuid) -> AppResult<Vec<Channel>> {
        Ok(self
            .channels
            .read()
            .unwrap()
            .values()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn find_by_proxy_sources(&self, source_ids: &[Uuid]) -> AppResult<Vec<Channel>> {
        Ok(self
            .channels
            .read()
            .unwrap()
            .values()
            .filter(|c| source_ids.contains(&c.source_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProxyRepository {
    proxies: RwLock<HashMap<Uuid, Proxy>>,
}

#[async_trait]
impl ProxyRepository for InMemoryProxyRepository {
    async fn find(&self, id: Uuid) -> AppResult<Proxy> {
        self.proxies
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("proxy", id))
    }

    async fn find_all(&self) -> AppResult<Vec<Proxy>> {
        Ok(self.proxies.read().unwrap().values().cloned().collect())
    }

    async fn upsert(&self, proxy: Proxy) -> AppResult<()> {
        self.proxies.write().unwrap().insert(proxy.id, proxy);
        Ok(())
    }

    async fn try_start_generation(&self, id: Uuid) -> AppResult<bool> {
        let mut guard = self.proxies.write().unwrap();
        let proxy = guard.get_mut(&id).ok_or_else(|| AppError::not_found("proxy", id))?;
        if !proxy.can_start_generation() {
            return Ok(false);
        }
        proxy.status = ProxyStatus::Generating;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: Job) -> AppResult<()> {
        self.jobs.write().unwrap().insert(job.id, job);
        Ok(())
    }

    async fn update(&self, job: Job) -> AppResult<()> {
        self.jobs.write().unwrap().insert(job.id, job);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Job> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("job", id))
    }

    async fn find_running_for_target(&self, job_type: JobType, target_id: Uuid) -> AppResult<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .values()
            .find(|j| j.job_type == job_type && j.target_id == target_id && j.status == JobStatus::Running)
            .cloned())
    }

    async fn find_by_status(&self, status: JobStatus) -> AppResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    values: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.values.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProxyMode};

    #[tokio::test]
    async fn try_start_generation_rejects_concurrent_run() {
        let repo = InMemoryProxyRepository::default();
        let proxy = Proxy {
            id: Uuid::new_v4(),
            name: "p".into(),
            active: true,
            starting_channel_number: 1,
            mode: ProxyMode::Smart,
            sources: vec![],
            epg_sources: vec![],
            filters: vec![],
            status: ProxyStatus::Idle,
            last_generation: None,
        };
        let id = proxy.id;
        repo.upsert(proxy).await.unwrap();

        assert!(repo.try_start_generation(id).await.unwrap());
        assert!(!repo.try_start_generation(id).await.unwrap());
    }

    #[tokio::test]
    async fn job_dedup_lookup_only_matches_running() {
        let repo = InMemoryJobRepository::default();
        let target = Uuid::new_v4();
        let mut job = Job::new(JobType::Backup, target);
        repo.insert(job.clone()).await.unwrap();
        assert!(repo.find_running_for_target(JobType::Backup, target).await.unwrap().is_none());

        job.try_start();
        repo.update(job).await.unwrap();
        assert!(repo.find_running_for_target(JobType::Backup, target).await.unwrap().is_some());
    }
}
