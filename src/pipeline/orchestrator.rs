//! The Proxy Generation Orchestrator itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::stage::{PipelineInputs, StageContext};
use super::stages::canonical_stages;
use super::{suggestion_for_stage, StageError};
use crate::errors::{AppError, AppResult};
use crate::models::{EncodingProfile, EpgSourceRef, FilterRef, ProxyStatus, SourceRef};
use crate::progress::{ErrorDetail, OperationType, ProgressService, StageSpec};
use crate::repositories::{ChannelRepository, ProxyRepository};

#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    pub channels: Vec<crate::models::Channel>,
    pub programs: Vec<super::stage::Program>,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub channel_count: usize,
    pub program_count: usize,
    pub duration: std::time::Duration,
}

pub struct ProxyOrchestrator {
    proxies: Arc<dyn ProxyRepository>,
    channels: Arc<dyn ChannelRepository>,
    progress: ProgressService,
    output_dir: PathBuf,
    sources: Vec<SourceRef>,
    epg_sources: Vec<EpgSourceRef>,
    filters: Vec<FilterRef>,
    encoding_profiles: Vec<EncodingProfile>,
}

impl ProxyOrchestrator {
    pub fn new(proxies: Arc<dyn ProxyRepository>, channels: Arc<dyn ChannelRepository>, progress: ProgressService, output_dir: PathBuf) -> Self {
        Self {
            proxies,
            channels,
            progress,
            output_dir,
            sources: Vec::new(),
            epg_sources: Vec::new(),
            filters: Vec::new(),
            encoding_profiles: Vec::new(),
        }
    }

    pub fn set_sources(&mut self, sources: Vec<SourceRef>) {
        self.sources = sources;
    }

    pub fn set_epg_sources(&mut self, epg_sources: Vec<EpgSourceRef>) {
        self.epg_sources = epg_sources;
    }

    pub fn set_filters(&mut self, filters: Vec<FilterRef>) {
        self.filters = filters;
    }

    pub fn stages(&self) -> Vec<(&'static str, &'static str, f64)> {
        canonical_stages().iter().map(|s| (s.id(), s.name(), s.weight())).collect()
    }

    pub async fn execute(&self, proxy_id: Uuid) -> AppResult<PipelineResult> {
        if self.sources.is_empty() {
            return Err(AppError::no_sources());
        }

        if !self.proxies.try_start_generation(proxy_id).await? {
            return Err(AppError::pipeline_already_running(proxy_id));
        }

        let proxy = self.proxies.find(proxy_id).await?;
        let stage_impls = canonical_stages();
        let stage_specs: Vec<StageSpec> = stage_impls.iter().map(|s| StageSpec::new(s.id(), s.name(), s.weight())).collect();

        let manager = match self.progress.start_operation(OperationType::ProxyGeneration, proxy_id, "proxy", proxy.name.clone(), stage_specs) {
            Ok(m) => m,
            Err(err) => {
                self.mark_failed(proxy_id, &err.to_string()).await;
                return Err(err);
            }
        };

        let inputs = PipelineInputs { sources: self.sources.clone(), epg_sources: self.epg_sources.clone() };
        let started = Instant::now();
        let mut channels = Vec::new();
        let mut programs = Vec::new();

        for stage in &stage_impls {
            let updater = manager.start_stage(stage.id())?;
            let ctx = StageContext {
                proxy: &proxy,
                inputs: &inputs,
                filters: &self.filters,
                encoding_profiles: &self.encoding_profiles,
                output_dir: &self.output_dir,
                progress: &updater,
                channels_repo: self.channels.as_ref(),
            };

            if let Err(source) = stage.run(&ctx, &mut channels, &mut programs).await {
                let stage_error = StageError { stage_id: stage.id().to_string(), stage_name: stage.name().to_string(), source };
                let detail = ErrorDetail {
                    stage: Some(stage_error.stage_id.clone()),
                    message: stage_error.source.to_string(),
                    technical: stage_error.to_string(),
                    suggestion: Some(suggestion_for_stage(&stage_error.stage_id).to_string()),
                };
                manager.fail_with_detail(detail);
                self.mark_failed(proxy_id, &stage_error.to_string()).await;
                return Err(stage_error.source);
            }
        }

        let result = PipelineResult { channel_count: channels.len(), program_count: programs.len(), duration: started.elapsed() };
        manager.complete(format!("generated {} channels, {} programs", result.channel_count, result.program_count));
        self.mark_succeeded(proxy_id, &result).await;
        Ok(result)
    }

    async fn mark_succeeded(&self, proxy_id: Uuid, result: &PipelineResult) {
        if let Ok(mut proxy) = self.proxies.find(proxy_id).await {
            proxy.status = ProxyStatus::Success;
            proxy.last_generation = Some(crate::models::LastGenerationSummary {
                timestamp: chrono::Utc::now(),
                status: ProxyStatus::Success,
                channel_count: result.channel_count,
                program_count: result.program_count,
                error: None,
            });
            let _ = self.proxies.upsert(proxy).await;
        }
    }

    async fn mark_failed(&self, proxy_id: Uuid, error: &str) {
        if let Ok(mut proxy) = self.proxies.find(proxy_id).await {
            proxy.status = ProxyStatus::Failed;
            proxy.last_generation = Some(crate::models::LastGenerationSummary {
                timestamp: chrono::Utc::now(),
                status: ProxyStatus::Failed,
                channel_count: 0,
                program_count: 0,
                error: Some(error.to_string()),
            });
            let _ = self.proxies.upsert(proxy).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Proxy, ProxyMode};
    use crate::repositories::{InMemoryChannelRepository, InMemoryProxyRepository};

    fn proxy() -> Proxy {
        Proxy {
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
        }
    }

    #[tokio::test]
    async fn execute_without_sources_is_rejected() {
        let proxies = Arc::new(InMemoryProxyRepository::default());
        let channels = Arc::new(InMemoryChannelRepository::default());
        let p = proxy();
        let id = p.id;
        proxies.upsert(p).await.unwrap();
        let orchestrator = ProxyOrchestrator::new(proxies, channels, ProgressService::new(), PathBuf::from("/tmp"));

        let result = orchestrator.execute(id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_execute_on_same_proxy_is_rejected() {
        let proxies = Arc::new(InMemoryProxyRepository::default());
        let channels = Arc::new(InMemoryChannelRepository::default());
        let p = proxy();
        let id = p.id;
        proxies.upsert(p).await.unwrap();
        assert!(proxies.try_start_generation(id).await.unwrap());

        let mut orchestrator = ProxyOrchestrator::new(proxies, channels, ProgressService::new(), PathBuf::from("/tmp"));
        orchestrator.set_sources(vec![SourceRef { source_id: Uuid::new_v4(), priority: 0 }]);

        let result = orchestrator.execute(id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_with_empty_source_produces_zero_counts_and_completes() {
        let proxies = Arc::new(InMemoryProxyRepository::default());
        let channels = Arc::new(InMemoryChannelRepository::default());
        let p = proxy();
        let id = p.id;
        proxies.upsert(p).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = ProxyOrchestrator::new(proxies, channels, ProgressService::new(), dir.path().to_path_buf());
        orchestrator.set_sources(vec![SourceRef { source_id: Uuid::new_v4(), priority: 0 }]);

        let result = orchestrator.execute(id).await.unwrap();
        assert_eq!(result.channel_count, 0);
        assert_eq!(result.program_count, 0);
    }
}
