//! Proxy, Filter and related transform-reference entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Direct,
    Smart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Idle,
    Generating,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastGenerationSummary {
    pub timestamp: DateTime<Utc>,
    pub status: ProxyStatus,
    pub channel_count: usize,
    pub program_count: usize,
    pub error: Option<String>,
}

/// A Source referenced by a Proxy, carrying the generation-time priority
/// (ascending = higher priority, per the orchestrator's collision rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: Uuid,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgSourceRef {
    pub epg_source_id: Uuid,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRef {
    pub filter_id: Uuid,
    pub active: bool,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub starting_channel_number: u32,
    pub mode: ProxyMode,
    pub sources: Vec<SourceRef>,
    pub epg_sources: Vec<EpgSourceRef>,
    pub filters: Vec<FilterRef>,
    pub status: ProxyStatus,
    pub last_generation: Option<LastGenerationSummary>,
}

impl Proxy {
    /// Sources ordered for generation: ascending priority value means
    /// higher precedence, ties broken by declaration order (stable sort).
    pub fn sources_by_priority(&self) -> Vec<&SourceRef> {
        let mut refs: Vec<&SourceRef> = self.sources.iter().collect();
        refs.sort_by_key(|r| r.priority);
        refs
    }

    pub fn active_filters_in_order(&self) -> Vec<&FilterRef> {
        let mut active: Vec<&FilterRef> = self.filters.iter().filter(|f| f.active).collect();
        active.sort_by_key(|f| f.order);
        active
    }

    pub fn can_start_generation(&self) -> bool {
        self.status != ProxyStatus::Generating
    }
}

/// Predicate/transform record referenced by Proxies. Immutable during a
/// generation run; fields beyond `id` are opaque to the orchestrator,
/// which only needs to evaluate `matches`/`apply` through the data-mapping
/// and filtering stages (outside the scope of this spine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub id: Uuid,
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMappingRule {
    pub id: Uuid,
    pub name: String,
    pub expression: String,
    /// When present, this rule pins a channel to an explicit output
    /// number, which the numbering stage must not reassign.
    pub fixed_channel_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDetectionRule {
    pub id: Uuid,
    pub name: String,
    pub user_agent_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub id: Uuid,
    pub name: String,
    pub encoder: String,
}
