//! The nine canonical pipeline stages, in declared execution order.

mod cache;
mod emit;
mod load;
mod transform;

pub use cache::LogoCachingStage;
pub use emit::{GenerateM3uStage, GenerateXmltvStage, PublishStage};
pub use load::{LoadChannelsStage, LoadProgramsStage};
pub use transform::{DataMappingStage, FilteringStage, NumberingStage};

use crate::pipeline::stage::PipelineStage;

/// The canonical stage list with its declared weights (§4.3), in
/// execution order. The weights here must sum to 1.0 — enforced by the
/// orchestrator when it registers them with the Progress Service.
pub fn canonical_stages() -> Vec<Box<dyn PipelineStage>> {
    vec![
        Box::new(LoadChannelsStage),
        Box::new(LoadProgramsStage),
        Box::new(FilteringStage),
        Box::new(DataMappingStage),
        Box::new(NumberingStage),
        Box::new(LogoCachingStage),
        Box::new(GenerateM3uStage),
        Box::new(GenerateXmltvStage),
        Box::new(PublishStage),
    ]
}
