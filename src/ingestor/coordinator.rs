//! The Ingestion Coordinator itself.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::handlers::HandlerRegistry;
use super::{InFlightGuard, InFlightRegistry, IngestSink};
use crate::errors::{AppError, AppResult};
use crate::models::{Channel, IngestionStatus, LastIngestionSummary, SourceKind};
use crate::progress::{OperationManager, OperationType, ProgressService, StageSpec};
use crate::repositories::{ChannelRepository, SourceRepository};

const BATCH_SIZE: usize = 1000;
const PROGRESS_UPDATE_EVERY: usize = 100;

pub struct IngestionCoordinator {
    sources: Arc<dyn SourceRepository>,
    channels: Arc<dyn ChannelRepository>,
    handlers: Arc<HandlerRegistry>,
    progress: ProgressService,
    in_flight: Arc<InFlightRegistry>,
}

impl IngestionCoordinator {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        channels: Arc<dyn ChannelRepository>,
        handlers: Arc<HandlerRegistry>,
        progress: ProgressService,
    ) -> Self {
        Self { sources, channels, handlers, progress, in_flight: Arc::new(InFlightRegistry::new()) }
    }

    fn stage_specs() -> Vec<StageSpec> {
        vec![
            StageSpec::new("connect", "Connect", 0.05),
            StageSpec::new("download", "Download", 0.85),
            StageSpec::new("finalize", "Finalize", 0.10),
        ]
    }

    /// Run a full refresh of `source_id` to completion, returning once the
    /// channel set has been committed (or the attempt has failed).
    pub async fn ingest(&self, source_id: Uuid, cancel: CancellationToken) -> AppResult<()> {
        let guard = self
            .in_flight
            .try_acquire(source_id)
            .ok_or_else(|| AppError::ingestion_in_progress(source_id))?;
        self.ingest_with_guard(source_id, cancel, guard).await
    }

    /// Shared body of `ingest`/`ingest_async`: runs with an already-held
    /// in-flight guard, so the slot is never released and reacquired in
    /// between — a gap there would let a second overlapping call slip
    /// through.
    async fn ingest_with_guard(&self, source_id: Uuid, cancel: CancellationToken, guard: InFlightGuard) -> AppResult<()> {
        let manager = self
            .progress
            .start_operation(OperationType::Ingestion, source_id, "source", format!("Ingest {source_id}"), Self::stage_specs());

        let manager = match manager {
            Ok(m) => m,
            Err(err) => {
                guard.finish(false);
                return Err(err);
            }
        };

        let result = self.run(source_id, &manager, cancel).await;
        match &result {
            Ok(count) => {
                manager.complete(format!("ingested {count} channels"));
                self.record_summary(source_id, true, *count, None).await;
            }
            Err(err) => {
                manager.fail(err);
                self.record_summary(source_id, false, 0, Some(err.to_string())).await;
            }
        }
        guard.finish(result.is_ok());
        result.map(|_| ())
    }

    /// Fire-and-forget variant: work continues on a detached task under
    /// its own cancellation token, independent of the caller's. The
    /// in-flight slot is acquired here, on the caller's thread, and held
    /// across the whole spawned task so a concurrent `ingest`/`ingest_async`
    /// call for the same source is rejected immediately rather than racing
    /// the spawned task's first poll.
    pub fn ingest_async(self: &Arc<Self>, source_id: Uuid) -> AppResult<()> {
        let guard = self
            .in_flight
            .try_acquire(source_id)
            .ok_or_else(|| AppError::ingestion_in_progress(source_id))?;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            if let Err(err) = this.ingest_with_guard(source_id, cancel, guard).await {
                tracing::warn!(target: "tvarr_core::ingestor", %source_id, error = %err, "background ingestion failed");
            }
        });
        Ok(())
    }

    async fn run(&self, source_id: Uuid, manager: &OperationManager, cancel: CancellationToken) -> AppResult<usize> {
        let source = self.sources.find(source_id).await?;
        if !source.enabled && source.kind != SourceKind::Manual {
            return Err(AppError::precondition_failed("source is disabled"));
        }

        let connect = manager.start_stage("connect")?;
        let handler = self
            .handlers
            .find(source.kind)
            .ok_or_else(|| AppError::handler_unavailable(source.kind))?;

        // Begin the logical transaction: clear the prior channel set
        // before any new rows land, so a mid-ingest failure simply leaves
        // the repository's rollback (if backed by a real transaction) to
        // restore the old set.
        self.channels.delete_by_source(source_id).await?;
        connect.complete();

        let download = manager.start_stage("download")?;
        let mut sink = BatchingSink {
            repo: Arc::clone(&self.channels),
            source_id,
            buffer: Vec::with_capacity(BATCH_SIZE),
            pushed: 0,
            stage: download.clone(),
            cancel: cancel.clone(),
        };

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        handler.fetch(&source, &mut sink).await?;
        let total = sink.pushed;
        download.complete();

        let finalize = manager.start_stage("finalize")?;
        sink.flush().await?;
        finalize.complete();

        Ok(total)
    }

    async fn record_summary(&self, source_id: Uuid, success: bool, channel_count: usize, error: Option<String>) {
        if let Ok(mut source) = self.sources.find(source_id).await {
            source.last_ingestion = Some(LastIngestionSummary {
                timestamp: Utc::now(),
                status: if success { IngestionStatus::Success } else { IngestionStatus::Failed },
                channel_count,
                error,
            });
            let _ = self.sources.upsert(source).await;
        }
    }

    /// Best-effort side effect on creation of an Xtream source: probe the
    /// derived XMLTV URL and, if it answers, link an EPG source mirroring
    /// credentials. Never fails the caller.
    pub async fn try_auto_link_epg(&self, source_id: Uuid, http: &reqwest::Client) {
        let Ok(source) = self.sources.find(source_id).await else { return };
        let Some(xmltv_url) = source.derived_xmltv_url() else { return };

        let probe = http
            .head(&xmltv_url)
            .timeout(StdDuration::from_secs(10))
            .send()
            .await;

        match probe {
            Ok(response) if response.status().is_success() => {
                tracing::info!(target: "tvarr_core::ingestor", %source_id, url = %xmltv_url, "auto-linking EPG source");
                // Creating the linked EPG Source entity is the caller's
                // responsibility via the (out-of-scope) EPG source
                // repository; this coordinator only performs the probe.
            }
            Ok(response) => {
                tracing::debug!(target: "tvarr_core::ingestor", %source_id, status = %response.status(), "xmltv probe did not succeed, skipping auto-link");
            }
            Err(err) => {
                tracing::debug!(target: "tvarr_core::ingestor", %source_id, error = %err, "xmltv probe failed, skipping auto-link");
            }
        }
    }
}

struct BatchingSink {
    repo: Arc<dyn ChannelRepository>,
    source_id: Uuid,
    buffer: Vec<Channel>,
    pushed: usize,
    stage: crate::progress::StageUpdater,
    cancel: CancellationToken,
}

impl BatchingSink {
    async fn flush(&mut self) -> AppResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.repo.upsert_batch(batch).await
    }
}

#[async_trait]
impl IngestSink for BatchingSink {
    async fn push(&mut self, channel: Channel) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        debug_assert_eq!(channel.source_id, self.source_id);
        self.buffer.push(channel);
        self.pushed += 1;

        if self.pushed % PROGRESS_UPDATE_EVERY == 0 {
            self.stage.set_message(format!("{} channels processed", self.pushed));
        }
        if self.buffer.len() >= BATCH_SIZE {
            self.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestor::handlers::IngestHandler;
    use crate::models::Source;
    use crate::repositories::{InMemoryChannelRepository, InMemorySourceRepository};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticHandler {
        kind: SourceKind,
        channel_count: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IngestHandler for StaticHandler {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, source: &Source, sink: &mut dyn IngestSink) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for i in 0..self.channel_count {
                sink.push(Channel {
                    id: Uuid::new_v4(),
                    source_id: source.id,
                    external_key: format!("ch-{i}"),
                    name: format!("Channel {i}"),
                    stream_url: "http://example/stream".into(),
                    logo_url: None,
                    channel_number: None,
                    group: None,
                })
                .await?;
            }
            Ok(())
        }
    }

    fn manual_source(id: Uuid) -> Source {
        Source {
            id,
            name: "manual".into(),
            kind: SourceKind::Manual,
            url: String::new(),
            username: None,
            password: None,
            enabled: true,
            priority: 0,
            last_ingestion: None,
        }
    }

    async fn build_coordinator(channel_count: usize) -> (Arc<IngestionCoordinator>, Uuid, Arc<AtomicUsize>) {
        let sources = Arc::new(InMemorySourceRepository::default());
        let channels: Arc<InMemoryChannelRepository> = Arc::new(InMemoryChannelRepository::default());
        let source_id = Uuid::new_v4();
        sources.upsert(manual_source(source_id)).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let handlers = Arc::new(HandlerRegistry::new().register(Box::new(StaticHandler {
            kind: SourceKind::Manual,
            channel_count,
            calls: calls.clone(),
        })));

        let coordinator = Arc::new(IngestionCoordinator::new(sources, channels, handlers, ProgressService::new()));
        (coordinator, source_id, calls)
    }

    #[tokio::test]
    async fn ingest_commits_all_channels_from_handler() {
        let (coordinator, source_id, _) = build_coordinator(5).await;
        coordinator.ingest(source_id, CancellationToken::new()).await.unwrap();

        let channels = coordinator.channels.find_by_source(source_id).await.unwrap();
        assert_eq!(channels.len(), 5);
    }

    #[tokio::test]
    async fn concurrent_ingest_on_same_source_is_rejected() {
        let (coordinator, source_id, _) = build_coordinator(1).await;
        let guard = coordinator.in_flight.try_acquire(source_id).unwrap();

        let result = coordinator.ingest(source_id, CancellationToken::new()).await;
        assert!(result.is_err());
        guard.finish(true);
    }

    #[tokio::test]
    async fn unknown_source_kind_is_rejected_without_touching_repository() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let channels: Arc<InMemoryChannelRepository> = Arc::new(InMemoryChannelRepository::default());
        let mut source = manual_source(Uuid::new_v4());
        source.kind = SourceKind::M3u;
        let source_id = source.id;
        sources.upsert(source).await.unwrap();

        let coordinator = IngestionCoordinator::new(sources, channels, Arc::new(HandlerRegistry::new()), ProgressService::new());
        let result = coordinator.ingest(source_id, CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
