//! Handles returned to callers of the Progress Service: [`OperationManager`]
//! drives stage transitions and terminal outcomes; [`StageUpdater`] scopes
//! percent/message updates to the currently active stage.

use uuid::Uuid;

use super::types::{ErrorDetail, OperationState, OperationType};
use super::ProgressService;
use crate::errors::{AppError, AppResult};

#[derive(Clone)]
pub struct OperationManager {
    service: ProgressService,
    operation_id: Uuid,
    active_key: (OperationType, Uuid),
}

impl OperationManager {
    pub(crate) fn new(service: ProgressService, operation_id: Uuid, active_key: (OperationType, Uuid)) -> Self {
        Self { service, operation_id, active_key }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// Advance the current-stage pointer to `stage_id`. Auto-completes the
    /// previously active stage (forcing its percent to 1.0) before moving
    /// on, as §4.1 requires.
    pub fn start_stage(&self, stage_id: &str) -> AppResult<StageUpdater> {
        let stage_id = stage_id.to_string();
        let mut not_found = false;
        self.service.mutate(self.operation_id, |progress| {
            let Some(index) = progress.stage_index(&stage_id) else {
                not_found = true;
                return;
            };
            if let Some(current) = progress.current_stage_index {
                if let Some(stage) = progress.stages.get_mut(current) {
                    stage.percent = 1.0;
                }
            }
            progress.current_stage_index = Some(index);
            progress.recalculate_aggregate();
        });
        if not_found {
            return Err(AppError::invalid_argument(format!("unknown stage id '{stage_id}'")));
        }
        Ok(StageUpdater { manager: self.clone(), stage_id })
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.service.mutate(self.operation_id, |progress| {
            progress.message = Some(message);
        });
    }

    /// Complete the operation successfully: the final stage is forced to
    /// 1.0 and the aggregate recomputed to exactly 1.0.
    pub fn complete(&self, final_message: impl Into<String>) {
        let final_message = final_message.into();
        self.service.mutate(self.operation_id, |progress| {
            for stage in progress.stages.iter_mut() {
                stage.percent = 1.0;
            }
            progress.current_stage_index = Some(progress.stages.len().saturating_sub(1));
            progress.recalculate_aggregate();
            progress.message = Some(final_message);
            progress.state = OperationState::Completed;
        });
        self.service.release_active(self.active_key);
    }

    pub fn fail(&self, err: &AppError) {
        self.fail_with_detail(ErrorDetail::from_error(err, None, None));
    }

    /// Transition to terminal-failed state. The aggregate percent is left
    /// at whatever was last reached — it never advances to 100%.
    pub fn fail_with_detail(&self, detail: ErrorDetail) {
        self.service.mutate(self.operation_id, |progress| {
            progress.state = OperationState::Failed;
            progress.error = Some(detail);
        });
        self.service.release_active(self.active_key);
    }
}

#[derive(Clone)]
pub struct StageUpdater {
    manager: OperationManager,
    stage_id: String,
}

impl StageUpdater {
    pub fn set_percent(&self, percent: f64) {
        let percent = percent.clamp(0.0, 1.0);
        let stage_id = self.stage_id.clone();
        self.manager.service.mutate(self.manager.operation_id, |progress| {
            if let Some(index) = progress.stage_index(&stage_id) {
                progress.stages[index].percent = percent;
            }
            progress.recalculate_aggregate();
        });
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        let stage_id = self.stage_id.clone();
        self.manager.service.mutate(self.manager.operation_id, |progress| {
            if let Some(index) = progress.stage_index(&stage_id) {
                progress.stages[index].message = Some(message);
            }
        });
    }

    pub fn complete(&self) {
        self.set_percent(1.0);
    }
}
