//! End-to-end scenarios exercising whole subsystems together rather than
//! a single unit, one per concrete scenario in the operational spine's
//! testable-properties list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tvarr_core::backup::{BackupEngine, FileDatabaseSnapshotter};
use tvarr_core::config::{BackupConfig, BackupScheduleConfig, DaemonConfig, RelayConfig};
use tvarr_core::daemon::DaemonRegistry;
use tvarr_core::errors::{AppResult, ErrorKind};
use tvarr_core::ingestor::{HandlerRegistry, IngestHandler, IngestSink, IngestionCoordinator};
use tvarr_core::models::{
    Channel, DaemonCapabilities, Proxy, ProxyMode, ProxyStatus, RelaySessionKey, Source, SourceKind, SourceRef,
    SystemStats,
};
use tvarr_core::pipeline::ProxyOrchestrator;
use tvarr_core::progress::ProgressService;
use tvarr_core::relay::RelayManager;
use tvarr_core::repositories::{
    InMemoryChannelRepository, InMemoryProxyRepository, InMemorySettingsRepository, InMemorySourceRepository,
};

#[tokio::test]
async fn scenario_backup_create_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let live_db = dir.path().join("live.db");
    // Highly compressible content so the gzip archive, tar headers and
    // all, still lands under the raw database size.
    tokio::fs::write(&live_db, vec![0u8; 64 * 1024]).await.unwrap();

    let config = BackupConfig {
        directory: dir.path().join("backups"),
        schedule: BackupScheduleConfig { enabled: false, cron: "0 0 3 * * *".to_string(), retention_count: 7 },
    };
    let snapshotter = Arc::new(FileDatabaseSnapshotter::new(live_db));
    let settings = Arc::new(InMemorySettingsRepository::default());
    let engine = BackupEngine::new(config, snapshotter, settings);

    engine.create().await.unwrap();
    let listed = engine.list().await.unwrap();
    assert_eq!(listed.len(), 1);

    let filename_pattern =
        Regex::new(r"^tvarr-backup-\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}\.\d{3}\.tar\.gz$").unwrap();
    assert!(filename_pattern.is_match(&listed[0].filename));
    assert!(listed[0].metadata.checksum.starts_with("sha256:"));
    assert!(listed[0].metadata.compressed_size <= listed[0].metadata.database_size);
}

#[tokio::test]
async fn scenario_backup_retention_deletes_all_but_newest_n() {
    let dir = tempfile::tempdir().unwrap();
    let live_db = dir.path().join("live.db");
    tokio::fs::write(&live_db, b"pretend-sqlite-contents").await.unwrap();

    let config = BackupConfig {
        directory: dir.path().join("backups"),
        schedule: BackupScheduleConfig { enabled: false, cron: "0 0 3 * * *".to_string(), retention_count: 2 },
    };
    let snapshotter = Arc::new(FileDatabaseSnapshotter::new(live_db));
    let settings = Arc::new(InMemorySettingsRepository::default());
    let engine = BackupEngine::new(config, snapshotter, settings);

    for _ in 0..5 {
        engine.create().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let deleted = engine.cleanup_old_backups().await.unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(engine.list().await.unwrap().len(), 2);
}

struct SlowManualHandler {
    delay: Duration,
    channel_count: usize,
}

#[async_trait]
impl IngestHandler for SlowManualHandler {
    fn kind(&self) -> SourceKind {
        SourceKind::Manual
    }

    async fn fetch(&self, source: &Source, sink: &mut dyn IngestSink) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
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

#[tokio::test]
async fn scenario_ingest_overlap_is_rejected_then_succeeds_once_free() {
    let sources = Arc::new(InMemorySourceRepository::default());
    let channels = Arc::new(InMemoryChannelRepository::default());
    let source_id = Uuid::new_v4();
    sources
        .upsert(Source {
            id: source_id,
            name: "manual".into(),
            kind: SourceKind::Manual,
            url: String::new(),
            username: None,
            password: None,
            enabled: true,
            priority: 0,
            last_ingestion: None,
        })
        .await
        .unwrap();

    let handlers = Arc::new(
        HandlerRegistry::new()
            .register(Box::new(SlowManualHandler { delay: Duration::from_millis(60), channel_count: 2 })),
    );
    let coordinator = Arc::new(IngestionCoordinator::new(sources, channels, handlers, ProgressService::new()));

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.ingest(source_id, CancellationToken::new()).await })
    };
    // Give the spawned ingest a chance to acquire the in-flight slot and
    // block inside the handler's artificial delay.
    tokio::time::sleep(Duration::from_millis(15)).await;

    let overlapping = coordinator.ingest(source_id, CancellationToken::new()).await;
    let err = overlapping.unwrap_err();
    assert!(err.to_string().contains("already in progress"));

    running.await.unwrap().unwrap();

    let third = coordinator.ingest(source_id, CancellationToken::new()).await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn scenario_proxy_generation_reports_all_canonical_stages() {
    let proxies = Arc::new(InMemoryProxyRepository::default());
    let channels = Arc::new(InMemoryChannelRepository::default());
    let source_id = Uuid::new_v4();
    channels
        .upsert_batch(vec![
            Channel {
                id: Uuid::new_v4(),
                source_id,
                external_key: "a".into(),
                name: "A".into(),
                stream_url: "http://x/a".into(),
                logo_url: None,
                channel_number: None,
                group: None,
            },
            Channel {
                id: Uuid::new_v4(),
                source_id,
                external_key: "b".into(),
                name: "B".into(),
                stream_url: "http://x/b".into(),
                logo_url: None,
                channel_number: None,
                group: None,
            },
        ])
        .await
        .unwrap();

    let proxy_id = Uuid::new_v4();
    proxies
        .upsert(Proxy {
            id: proxy_id,
            name: "p".into(),
            active: true,
            starting_channel_number: 1,
            mode: ProxyMode::Smart,
            sources: vec![],
            epg_sources: vec![],
            filters: vec![],
            status: ProxyStatus::Idle,
            last_generation: None,
        })
        .await
        .unwrap();

    let progress = ProgressService::new();
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = ProxyOrchestrator::new(proxies, channels, progress.clone(), dir.path().to_path_buf());
    orchestrator.set_sources(vec![SourceRef { source_id, priority: 0 }]);

    let result = orchestrator.execute(proxy_id).await.unwrap();
    assert_eq!(result.channel_count, 2);
    assert_eq!(result.program_count, 0);

    let recorded = progress
        .list()
        .into_iter()
        .find(|op| op.target_id == proxy_id)
        .expect("proxy generation operation recorded");
    assert_eq!(recorded.stages.len(), 9);
    assert!((recorded.aggregate_percent - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn scenario_daemon_drain_then_reject_activate_on_disconnected() {
    let registry = DaemonRegistry::new(DaemonConfig { heartbeat_sweep_interval_secs: 5, unhealthy_after_secs: 30, disconnected_after_secs: 90 });
    let daemon_id = "daemon-1".to_string();
    registry.register(
        daemon_id.clone(),
        "http://daemon-1.local:9000".into(),
        DaemonCapabilities { encoders: vec!["h264".into()], gpus: Default::default(), max_concurrent_jobs: 4 },
    );
    registry.heartbeat(&daemon_id, SystemStats::default(), 2).unwrap();

    registry.drain(&daemon_id).unwrap();
    assert_eq!(registry.get(&daemon_id).unwrap().state, tvarr_core::models::DaemonState::Draining);

    // Active jobs block draining -> disconnected, so force disconnect
    // through unregister only once jobs have drained to zero.
    registry.heartbeat(&daemon_id, SystemStats::default(), 0).unwrap();
    registry.unregister(&daemon_id).unwrap();
    assert_eq!(registry.get(&daemon_id).unwrap().state, tvarr_core::models::DaemonState::Disconnected);

    let err = registry.activate(&daemon_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

/// A bare-bones origin that streams a fixed body as a single unterminated
/// chunked-encoding frame and then keeps the socket open, so the client's
/// byte stream never observes EOF — standing in for a long-lived live feed.
async fn spawn_chunked_origin(body: Vec<u8>) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request_buf = [0u8; 1024];
            let _ = socket.read(&mut request_buf).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: video/mp2t\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n",
                body.len()
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.write_all(b"\r\n").await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });
    addr
}

#[tokio::test]
async fn scenario_relay_fan_out_to_two_clients() {
    const BODY_LEN: usize = 1024 * 1024;
    let body: Vec<u8> = (0..BODY_LEN).map(|i| (i % 251) as u8).collect();
    let addr = spawn_chunked_origin(body.clone()).await;

    let daemon_registry = Arc::new(DaemonRegistry::new(DaemonConfig {
        heartbeat_sweep_interval_secs: 5,
        unhealthy_after_secs: 30,
        disconnected_after_secs: 90,
    }));
    let relay_config = RelayConfig { ring_buffer_bytes: BODY_LEN * 2, idle_timeout_secs: 1 };
    let manager = Arc::new(RelayManager::new(relay_config, daemon_registry));

    let key = RelaySessionKey::new(Uuid::new_v4(), None);
    let origin_url = format!("http://{addr}/stream");
    manager.get_or_create_session(key.clone(), origin_url, None).await.unwrap();

    let (client_a, session_a, cursor_a) = manager.add_client(&key, "ua-a".into(), "127.0.0.1".into()).unwrap();
    let (client_b, session_b, cursor_b) = manager.add_client(&key, "ua-b".into(), "127.0.0.1".into()).unwrap();

    let read_a = tokio::spawn(async move { read_exact_bytes(&session_a.buffer, cursor_a, BODY_LEN).await });
    let read_b = tokio::spawn(async move { read_exact_bytes(&session_b.buffer, cursor_b, BODY_LEN).await });

    let bytes_a = read_a.await.unwrap();
    let bytes_b = read_b.await.unwrap();
    assert_eq!(bytes_a, body);
    assert_eq!(bytes_b, body);

    manager.remove_client(&key, client_a);
    assert!(manager.get_session(&key).is_some());
    manager.remove_client(&key, client_b);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(manager.get_session(&key).is_none());
}

async fn read_exact_bytes(buffer: &tvarr_core::relay::RingBuffer, mut cursor: u64, expected_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(expected_len);
    while data.len() < expected_len {
        match buffer.read_from(cursor).await.unwrap() {
            Some((chunk, next_cursor)) => {
                data.extend_from_slice(&chunk);
                cursor = next_cursor;
            }
            None => break,
        }
    }
    data
}
