//! Ingestion Coordinator — drives a full refresh of a Source's channels
//! with hard overlap prevention and staged progress.

mod coordinator;
mod handlers;

pub use coordinator::IngestionCoordinator;
pub use handlers::{IngestHandler, IngestSink};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::utils::jitter::jitter_delay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingTrigger {
    Scheduler,
    Manual,
}

#[derive(Debug, Clone)]
struct ProcessingInfo {
    failure_count: u32,
    next_retry_after: Option<DateTime<Utc>>,
}

/// The process-wide `sourceID -> in-flight` mapping, shared with its own
/// backoff bookkeeping. A source consults this map (via
/// [`InFlightGuard::try_acquire`]) before either `Ingest` or `IngestAsync`
/// does any work; the returned guard releases on every exit path,
/// including panics, per the finaliser discipline §4.2 requires.
#[derive(Default)]
pub struct InFlightRegistry {
    processing: RwLock<HashMap<Uuid, ProcessingInfo>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire the in-flight slot for `source_id`. Returns
    /// `None` if already processing, or still inside a post-failure
    /// backoff window.
    pub fn try_acquire(self: &std::sync::Arc<Self>, source_id: Uuid) -> Option<InFlightGuard> {
        let mut processing = self.processing.write().unwrap();
        if let Some(info) = processing.get(&source_id) {
            if info.next_retry_after.is_none() {
                return None; // actively processing
            }
            if let Some(retry_after) = info.next_retry_after {
                if Utc::now() < retry_after {
                    return None; // in backoff
                }
            }
        }
        processing.insert(source_id, ProcessingInfo { failure_count: processing.get(&source_id).map(|i| i.failure_count).unwrap_or(0), next_retry_after: None });
        Some(InFlightGuard { registry: self.clone(), source_id, released: false })
    }

    fn finish(&self, source_id: Uuid, success: bool) {
        let mut processing = self.processing.write().unwrap();
        if let Some(mut info) = processing.remove(&source_id) {
            if success {
                info.failure_count = 0;
                info.next_retry_after = None;
            } else {
                info.failure_count += 1;
                let backoff = calculate_backoff_with_jitter(info.failure_count);
                info.next_retry_after = Some(Utc::now() + Duration::seconds(backoff as i64));
                processing.insert(source_id, info);
            }
        }
    }
}

fn calculate_backoff_with_jitter(failure_count: u32) -> u64 {
    let base_delay = 2_u64.saturating_pow(failure_count.min(10));
    let capped = base_delay.min(3600);
    capped + jitter_delay(capped, 25)
}

/// RAII guard releasing the in-flight slot on drop, recording the actual
/// outcome via [`InFlightGuard::finish`] when the coordinator knows it.
pub struct InFlightGuard {
    registry: std::sync::Arc<InFlightRegistry>,
    source_id: Uuid,
    released: bool,
}

impl InFlightGuard {
    pub fn finish(mut self, success: bool) {
        self.registry.finish(self.source_id, success);
        self.released = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            // Finalizer path: an unannounced drop (panic unwind, early
            // return) is treated as a failure so backoff still applies.
            self.registry.finish(self.source_id, false);
        }
    }
}
