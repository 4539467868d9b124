//! Progress Service — a process-wide registry of in-flight Operation
//! Progress records with an event fan-out channel for subscribers.
//!
//! Grounded in the teacher's `ProgressManager`/`ProgressService` pair: a
//! reader-writer-locked map of snapshots plus a `tokio::sync::broadcast`
//! channel. `broadcast` already drops the oldest buffered message when a
//! subscriber falls behind; [`ProgressService::subscribe`] wraps the raw
//! receiver in a [`BroadcastStream`] and turns that `Lagged` signal into
//! an explicit [`ProgressEvent::Resync`] carrying the full current state,
//! so no subscriber ever blocks a producer or silently misses updates.

mod stage;
mod types;

pub use stage::{OperationManager, StageUpdater};
pub use types::*;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Inner {
    operations: RwLock<HashMap<Uuid, OperationProgress>>,
    /// (op_type, target_id) -> operation_id, for the "already running"
    /// rejection in `start`.
    active_index: RwLock<HashMap<(OperationType, Uuid), Uuid>>,
    events: broadcast::Sender<ProgressEvent>,
}

/// The process-wide Progress Service. Cheap to clone (an `Arc` handle);
/// constructed once at startup and injected into the Ingestion
/// Coordinator, Proxy Orchestrator and Backup Engine.
#[derive(Clone)]
pub struct ProgressService {
    inner: Arc<Inner>,
}

impl Default for ProgressService {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressService {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                operations: RwLock::new(HashMap::new()),
                active_index: RwLock::new(HashMap::new()),
                events: tx,
            }),
        }
    }

    /// Start tracking a new operation. Rejects if the stage weights don't
    /// sum to ≈1.0 (tolerance 1e-6), or if an operation of the same
    /// `(op_type, target_id)` is already running.
    pub fn start_operation(
        &self,
        op_type: OperationType,
        target_id: Uuid,
        target_kind: impl Into<String>,
        display_name: impl Into<String>,
        stages: Vec<StageSpec>,
    ) -> AppResult<OperationManager> {
        let weight_sum: f64 = stages.iter().map(|s| s.weight).sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(AppError::invalid_argument(format!(
                "stage weights must sum to 1.0, got {weight_sum}"
            )));
        }

        let mut active_index = self.inner.active_index.write().unwrap();
        let key = (op_type, target_id);
        if active_index.contains_key(&key) {
            return Err(AppError::conflict(format!(
                "an operation of type {op_type:?} is already running for target {target_id}"
            )));
        }

        let operation_id = Uuid::new_v4();
        let progress = OperationProgress::new(operation_id, op_type, target_id, target_kind.into(), display_name.into(), stages);
        active_index.insert(key, operation_id);
        drop(active_index);

        self.inner.operations.write().unwrap().insert(operation_id, progress.clone());
        self.broadcast(ProgressEvent::Updated(progress));

        Ok(OperationManager::new(self.clone(), operation_id, key))
    }

    pub fn list(&self) -> Vec<OperationProgress> {
        self.inner.operations.read().unwrap().values().cloned().collect()
    }

    pub fn get(&self, operation_id: Uuid) -> Option<OperationProgress> {
        self.inner.operations.read().unwrap().get(&operation_id).cloned()
    }

    /// Subscribe to the event stream. Returns a handle that surfaces
    /// `Resync` in place of a lag error, so callers never need to handle
    /// `broadcast`'s `Lagged` directly.
    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            inner: BroadcastStream::new(self.inner.events.subscribe()),
            service: self.clone(),
        }
    }

    /// Drop a completed/failed operation's record once a caller no longer
    /// needs it (mirrors the teacher's periodic `cleanup_stale_operations`
    /// sweep, exposed here as an explicit call the caller schedules).
    pub fn cleanup_completed(&self, older_than: chrono::Duration) {
        let now = chrono::Utc::now();
        let mut operations = self.inner.operations.write().unwrap();
        let mut active_index = self.inner.active_index.write().unwrap();
        operations.retain(|_, progress| {
            if progress.is_terminal() && now - progress.updated_at > older_than {
                active_index.retain(|_, id| *id != progress.operation_id);
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn mutate<F>(&self, operation_id: Uuid, f: F)
    where
        F: FnOnce(&mut OperationProgress),
    {
        let updated = {
            let mut operations = self.inner.operations.write().unwrap();
            let Some(progress) = operations.get_mut(&operation_id) else { return };
            f(progress);
            progress.updated_at = chrono::Utc::now();
            progress.clone()
        };
        self.broadcast(ProgressEvent::Updated(updated));
    }

    pub(crate) fn release_active(&self, key: (OperationType, Uuid)) {
        self.inner.active_index.write().unwrap().remove(&key);
    }

    fn broadcast(&self, event: ProgressEvent) {
        // No subscribers is not an error; broadcast's SendError just means
        // the event had no observers.
        let _ = self.inner.events.send(event);
    }
}

/// A subscriber's view of the event stream. Wraps the underlying
/// `broadcast::Receiver` in a `BroadcastStream` so a `Lagged` error (the
/// subscriber fell behind and missed buffered messages) can be caught and
/// replaced with a `Resync` snapshot instead of bubbling up as an error.
pub struct ProgressSubscription {
    inner: BroadcastStream<ProgressEvent>,
    service: ProgressService,
}

impl ProgressSubscription {
    /// Await the next event. Returns `None` once every `ProgressService`
    /// handle (and thus the underlying sender) has been dropped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        match self.inner.next().await {
            Some(Ok(event)) => Some(event),
            Some(Err(BroadcastStreamRecvError::Lagged(_))) => Some(ProgressEvent::Resync(self.service.list())),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> Vec<StageSpec> {
        vec![
            StageSpec::new("connect", "Connect", 0.05),
            StageSpec::new("download", "Download", 0.85),
            StageSpec::new("finalize", "Finalize", 0.10),
        ]
    }

    #[test]
    fn rejects_stage_weights_not_summing_to_one() {
        let service = ProgressService::new();
        let bad_stages = vec![StageSpec::new("a", "A", 0.4), StageSpec::new("b", "B", 0.4)];
        let result = service.start_operation(OperationType::Ingestion, Uuid::new_v4(), "source", "test", bad_stages);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_operation_for_same_target() {
        let service = ProgressService::new();
        let target = Uuid::new_v4();
        let _first = service
            .start_operation(OperationType::Ingestion, target, "source", "first", stages())
            .unwrap();
        let second = service.start_operation(OperationType::Ingestion, target, "source", "second", stages());
        assert!(second.is_err());
    }

    #[test]
    fn aggregate_percent_advances_monotonically_across_stages() {
        let service = ProgressService::new();
        let manager = service
            .start_operation(OperationType::Ingestion, Uuid::new_v4(), "source", "test", stages())
            .unwrap();

        let connect = manager.start_stage("connect").unwrap();
        connect.set_percent(1.0);
        let p1 = service.get(manager.operation_id()).unwrap().aggregate_percent;

        let download = manager.start_stage("download").unwrap();
        download.set_percent(0.5);
        let p2 = service.get(manager.operation_id()).unwrap().aggregate_percent;
        assert!(p2 > p1);

        download.set_percent(1.0);
        let p3 = service.get(manager.operation_id()).unwrap().aggregate_percent;
        assert!(p3 > p2);
        assert!((p3 - (0.05 + 0.85)).abs() < 1e-9);
    }

    #[test]
    fn starting_unknown_stage_is_rejected() {
        let service = ProgressService::new();
        let manager = service
            .start_operation(OperationType::Ingestion, Uuid::new_v4(), "source", "test", stages())
            .unwrap();
        assert!(manager.start_stage("does-not-exist").is_err());
    }

    #[test]
    fn failure_freezes_percent_below_completion() {
        let service = ProgressService::new();
        let manager = service
            .start_operation(OperationType::Ingestion, Uuid::new_v4(), "source", "test", stages())
            .unwrap();
        let connect = manager.start_stage("connect").unwrap();
        connect.set_percent(1.0);
        manager.start_stage("download").unwrap();

        manager.fail(&AppError::transient("origin unreachable"));
        let snapshot = service.get(manager.operation_id()).unwrap();
        assert!(snapshot.is_terminal());
        assert!(snapshot.aggregate_percent < 1.0);
    }

    #[test]
    fn completing_releases_the_active_slot_for_reuse() {
        let service = ProgressService::new();
        let target = Uuid::new_v4();
        let manager = service
            .start_operation(OperationType::Ingestion, target, "source", "test", stages())
            .unwrap();
        manager.complete("done");

        let again = service.start_operation(OperationType::Ingestion, target, "source", "test2", stages());
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn subscribers_receive_update_events() {
        let service = ProgressService::new();
        let mut rx = service.subscribe();
        let manager = service
            .start_operation(OperationType::Ingestion, Uuid::new_v4(), "source", "test", stages())
            .unwrap();
        let event = rx.recv().await.unwrap();
        match event {
            ProgressEvent::Updated(p) => assert_eq!(p.operation_id, manager.operation_id()),
            ProgressEvent::Resync(_) => panic!("expected Updated"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_receives_resync_snapshot_instead_of_lag_error() {
        let service = ProgressService::new();
        let mut rx = service.subscribe();

        // EVENT_CHANNEL_CAPACITY is 256; publish enough updates without
        // ever polling `rx` to force the broadcast channel to drop the
        // oldest buffered messages out from under it.
        let manager = service
            .start_operation(OperationType::Ingestion, Uuid::new_v4(), "source", "test", stages())
            .unwrap();
        let connect = manager.start_stage("connect").unwrap();
        for i in 0..(EVENT_CHANNEL_CAPACITY * 2) {
            connect.set_message(format!("tick {i}"));
        }

        let event = rx.recv().await.unwrap();
        match event {
            ProgressEvent::Resync(snapshot) => {
                assert!(snapshot.iter().any(|p| p.operation_id == manager.operation_id()));
            }
            ProgressEvent::Updated(_) => panic!("expected Resync after overflowing the broadcast buffer"),
        }
    }
}
