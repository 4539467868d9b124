//! Job entity — a scheduled or triggered unit of work dispatched by the
//! Scheduler/Runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    StreamIngest,
    EpgIngest,
    ProxyGenerate,
    Backup,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Scheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub target_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub run_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempt: u32,
}

impl Job {
    pub fn new(job_type: JobType, target_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            target_id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            run_at: None,
            finished_at: None,
            error: None,
            attempt: 0,
        }
    }

    /// The identity used for at-most-one-running-per-target enforcement
    /// and for deduplicating queued jobs of the same kind.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.job_type, self.target_id)
    }

    /// Attempt the `pending -> running` transition. Rejects (returns
    /// `false`, leaving status untouched) unless currently `pending`,
    /// implementing the CAS discipline the spec requires.
    pub fn try_start(&mut self) -> bool {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
            true
        } else {
            false
        }
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Demote a would-be duplicate job to cancelled, as the Scheduler does
    /// when a superseding dispatch loses a race to an already-running job
    /// of the same target.
    pub fn supersede_skip(&mut self) {
        self.status = JobStatus::Cancelled;
        self.error = Some("supersede-skipped".to_string());
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_never_transitions_back() {
        let mut job = Job::new(JobType::Backup, Uuid::new_v4());
        assert!(job.try_start());
        job.complete();
        assert!(job.status.is_terminal());
        assert!(!job.try_start());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn dedup_key_is_stable_for_same_type_and_target() {
        let target = Uuid::new_v4();
        let a = Job::new(JobType::StreamIngest, target);
        let b = Job::new(JobType::StreamIngest, target);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn supersede_skip_is_terminal_and_carries_reason() {
        let mut job = Job::new(JobType::ProxyGenerate, Uuid::new_v4());
        job.supersede_skip();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.error.as_deref(), Some("supersede-skipped"));
    }
}
