//! Scheduler types: job priority ordering and the queued-job wrapper.

use chrono::{DateTime, Utc};

use crate::models::{Job, JobType};

/// Lower numeric value sorts first in the priority queue (`Critical`
/// runs before `Maintenance`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Maintenance = 4,
}

/// A Job paired with its scheduled fire time and priority, as held in the
/// pending queue. Ordering is priority first, then scheduled time —
/// `Ord`/`PartialOrd` are hand-written so a `BinaryHeap<Reverse<_>>` pops
/// the most urgent job first.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job: Job,
    pub priority: JobPriority,
    pub scheduled_time: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(job: Job, priority: JobPriority, scheduled_time: DateTime<Utc>) -> Self {
        Self { job, priority, scheduled_time }
    }

    pub fn job_type(&self) -> JobType {
        self.job.job_type
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_time
    }
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.scheduled_time == other.scheduled_time
    }
}
impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority.cmp(&other.priority).then_with(|| self.scheduled_time.cmp(&other.scheduled_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job_at(priority: JobPriority, offset_secs: i64) -> ScheduledJob {
        ScheduledJob::new(
            Job::new(JobType::Backup, Uuid::new_v4()),
            priority,
            Utc::now() + chrono::Duration::seconds(offset_secs),
        )
    }

    #[test]
    fn priority_orders_before_time() {
        let critical_later = job_at(JobPriority::Critical, 100);
        let normal_sooner = job_at(JobPriority::Normal, 0);
        assert!(critical_later < normal_sooner);
    }

    #[test]
    fn same_priority_orders_by_time() {
        let sooner = job_at(JobPriority::Normal, 0);
        let later = job_at(JobPriority::Normal, 100);
        assert!(sooner < later);
    }
}
