//! Kind-specific ingestion handlers.
//!
//! Parsing M3U/Xtream/manual sources into channels is out of scope (§1);
//! a handler is simply something that can stream [`Channel`] records
//! through a sink, letting the coordinator own batching, progress, and
//! transactional commit regardless of upstream format.

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{Channel, Source, SourceKind};

/// Sink a handler pushes parsed channels into. The coordinator implements
/// this to do batching and progress counting; handlers just call `push`
/// once per channel, in upstream order.
#[async_trait]
pub trait IngestSink: Send {
    async fn push(&mut self, channel: Channel) -> AppResult<()>;
}

#[async_trait]
pub trait IngestHandler: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Stream every channel the source currently offers through `sink`,
    /// in the order the upstream provides them. Implementations should
    /// respect the ambient cancellation token threaded through `source`'s
    /// caller rather than polling it themselves.
    async fn fetch(&self, source: &Source, sink: &mut dyn IngestSink) -> AppResult<()>;
}

/// Registry of handlers keyed by [`SourceKind`], consulted by the
/// coordinator so an unconfigured kind fails fast with
/// `ErrHandlerUnavailable` instead of panicking on a missing match arm.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn IngestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Box<dyn IngestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn find(&self, kind: SourceKind) -> Option<&dyn IngestHandler> {
        self.handlers.iter().find(|h| h.kind() == kind).map(|h| h.as_ref())
    }
}
