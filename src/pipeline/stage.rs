//! The `PipelineStage` trait each canonical stage implements, and the
//! shared context a run threads through them.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::errors::AppResult;
use crate::models::{Channel, EncodingProfile, EpgSourceRef, FilterRef, Proxy, SourceRef};
use crate::progress::StageUpdater;
use crate::repositories::ChannelRepository;

/// A single EPG program entry. Parsing XMLTV itself is out of scope; the
/// orchestrator only needs enough shape to count and attach programs to
/// channels by external identity.
#[derive(Debug, Clone)]
pub struct Program {
    pub channel_external_key: String,
    pub title: String,
    pub start_offset_secs: i64,
    pub stop_offset_secs: i64,
}

/// The proxy's referenced entities, pre-sorted by priority, handed to the
/// pipeline before `execute` is called.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub sources: Vec<SourceRef>,
    pub epg_sources: Vec<EpgSourceRef>,
}

pub struct StageContext<'a> {
    pub proxy: &'a Proxy,
    pub inputs: &'a PipelineInputs,
    pub filters: &'a [FilterRef],
    pub encoding_profiles: &'a [EncodingProfile],
    pub output_dir: &'a PathBuf,
    pub progress: &'a StageUpdater,
    pub channels_repo: &'a dyn ChannelRepository,
}

/// A single named, weighted step of the proxy generation pipeline.
/// Stages run strictly in declared order; only one run per proxy may be
/// in flight (enforced at the orchestrator, not here).
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn weight(&self) -> f64;

    /// Run this stage, mutating `channels`/`programs` in place. A stage
    /// may use worker pools internally, but must return only once all of
    /// its own work (including any internal concurrency) has settled.
    async fn run(&self, ctx: &StageContext<'_>, channels: &mut Vec<Channel>, programs: &mut Vec<Program>) -> AppResult<()>;
}
