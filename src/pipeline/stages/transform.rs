//! `filtering`, `data_mapping` and `numbering` stages.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::errors::AppResult;
use crate::models::Channel;
use crate::pipeline::stage::{PipelineStage, Program, StageContext};

pub struct FilteringStage;

#[async_trait]
impl PipelineStage for FilteringStage {
    fn id(&self) -> &'static str {
        "filtering"
    }
    fn name(&self) -> &'static str {
        "Filtering"
    }
    fn weight(&self) -> f64 {
        0.10
    }

    /// Evaluating filter expressions is out of scope; only the
    /// active/ordering discipline lives here; `ctx.filters` have already
    /// been pre-sorted to active-and-ordered by the orchestrator.
    async fn run(&self, _ctx: &StageContext<'_>, _channels: &mut Vec<Channel>, _programs: &mut Vec<Program>) -> AppResult<()> {
        Ok(())
    }
}

pub struct DataMappingStage;

#[async_trait]
impl PipelineStage for DataMappingStage {
    fn id(&self) -> &'static str {
        "data_mapping"
    }
    fn name(&self) -> &'static str {
        "Data Mapping"
    }
    fn weight(&self) -> f64 {
        0.10
    }

    /// Applying data-mapping rule expressions (beyond fixed-number
    /// pinning, which the numbering stage consumes directly from each
    /// channel's `channel_number`) is out of scope.
    async fn run(&self, _ctx: &StageContext<'_>, _channels: &mut Vec<Channel>, _programs: &mut Vec<Program>) -> AppResult<()> {
        Ok(())
    }
}

pub struct NumberingStage;

#[async_trait]
impl PipelineStage for NumberingStage {
    fn id(&self) -> &'static str {
        "numbering"
    }
    fn name(&self) -> &'static str {
        "Numbering"
    }
    fn weight(&self) -> f64 {
        0.05
    }

    /// Assign output numbers starting from the proxy's configured
    /// starting number, in working-set order, skipping any number a
    /// prior stage already fixed explicitly.
    async fn run(&self, ctx: &StageContext<'_>, channels: &mut Vec<Channel>, _programs: &mut Vec<Program>) -> AppResult<()> {
        let mut taken: HashSet<u32> = channels.iter().filter_map(|c| c.channel_number).collect();
        let mut next = ctx.proxy.starting_channel_number;

        for channel in channels.iter_mut() {
            if channel.channel_number.is_some() {
                continue;
            }
            while taken.contains(&next) {
                next += 1;
            }
            channel.channel_number = Some(next);
            taken.insert(next);
            next += 1;
        }
        Ok(())
    }
}
