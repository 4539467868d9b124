//! Progress Service data shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Ingestion,
    ProxyGeneration,
    Backup,
    Restore,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Running,
    Completed,
    Failed,
}

/// Declared shape of one stage, supplied by the caller of `start_operation`.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub id: String,
    pub name: String,
    pub weight: f64,
}

impl StageSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: f64) -> Self {
        Self { id: id.into(), name: name.into(), weight }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub percent: f64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub stage: Option<String>,
    pub message: String,
    pub technical: String,
    pub suggestion: Option<String>,
}

impl ErrorDetail {
    pub fn from_error(err: &AppError, stage: Option<String>, suggestion: Option<String>) -> Self {
        Self {
            stage,
            message: user_facing_message(err),
            technical: format!("{err:#}"),
            suggestion,
        }
    }
}

fn user_facing_message(err: &AppError) -> String {
    match err.kind() {
        ErrorKind::Transient => "A temporary error occurred; this will be retried.".to_string(),
        ErrorKind::Cancelled => "The operation was cancelled.".to_string(),
        _ => err.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationProgress {
    pub operation_id: Uuid,
    pub op_type: OperationType,
    pub target_id: Uuid,
    pub target_kind: String,
    pub display_name: String,
    pub stages: Vec<Stage>,
    pub current_stage_index: Option<usize>,
    pub aggregate_percent: f64,
    pub message: Option<String>,
    pub state: OperationState,
    pub error: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationProgress {
    pub fn new(
        operation_id: Uuid,
        op_type: OperationType,
        target_id: Uuid,
        target_kind: String,
        display_name: String,
        stages: Vec<StageSpec>,
    ) -> Self {
        let now = Utc::now();
        Self {
            operation_id,
            op_type,
            target_id,
            target_kind,
            display_name,
            stages: stages
                .into_iter()
                .map(|s| Stage { id: s.id, name: s.name, weight: s.weight, percent: 0.0, message: None })
                .collect(),
            current_stage_index: None,
            aggregate_percent: 0.0,
            message: None,
            state: OperationState::Running,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, OperationState::Running)
    }

    pub fn stage_index(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == stage_id)
    }

    /// Recompute `aggregate_percent` from completed-stage weights plus the
    /// current stage's partial weight, per §4.1.
    pub fn recalculate_aggregate(&mut self) {
        let mut total = 0.0;
        for (i, stage) in self.stages.iter().enumerate() {
            total += match self.current_stage_index {
                Some(current) if i < current => stage.weight,
                Some(current) if i == current => stage.weight * stage.percent,
                _ => 0.0,
            };
        }
        self.aggregate_percent = total;
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Updated(OperationProgress),
    /// Sent to a subscriber that fell behind the broadcast buffer, in
    /// place of the updates it missed: a full snapshot of every
    /// currently-tracked operation, so the subscriber can resync its view
    /// without having observed the intervening `Updated` events.
    Resync(Vec<OperationProgress>),
}
