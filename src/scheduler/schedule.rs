//! The Scheduler half of §4.4: evaluates a catalogue of cron schedules
//! and enqueues pending Jobs for the Runner to dequeue. `ScheduleImmediate`
//! bypasses cron entirely.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use super::cron_eval::{next_fire_after, validate_cron};
use super::queue::JobQueue;
use super::types::{JobPriority, ScheduledJob};
use crate::errors::AppResult;
use crate::models::{Job, JobType};
use crate::repositories::JobRepository;

#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub job_type: JobType,
    pub target_id: Uuid,
    pub cron: String,
    pub priority: JobPriority,
}

pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
    queue: Arc<JobQueue>,
    jobs: Arc<dyn JobRepository>,
}

impl Scheduler {
    pub fn new(queue: Arc<JobQueue>, jobs: Arc<dyn JobRepository>) -> Self {
        Self { entries: Vec::new(), queue, jobs }
    }

    pub fn add_schedule(&mut self, entry: ScheduleEntry) -> AppResult<()> {
        validate_cron(&entry.cron)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Bypass cron and enqueue a pending Job directly.
    pub async fn schedule_immediate(&self, job_type: JobType, target_id: Uuid, priority: JobPriority) -> AppResult<bool> {
        let job = Job::new(job_type, target_id);
        self.jobs.insert(job.clone()).await?;
        Ok(self.queue.enqueue(ScheduledJob::new(job, priority, Utc::now())))
    }

    /// For every entry whose next fire time since `since` has arrived by
    /// `now`, insert and enqueue a pending Job.
    async fn tick(&self, since: DateTime<Utc>, now: DateTime<Utc>) {
        for entry in &self.entries {
            match next_fire_after(&entry.cron, since) {
                Ok(Some(fire_at)) if fire_at <= now => {
                    let job = Job::new(entry.job_type, entry.target_id);
                    if let Err(err) = self.jobs.insert(job.clone()).await {
                        warn!(job_type = %entry.job_type, error = %err, "failed to persist scheduled job");
                        continue;
                    }
                    self.queue.enqueue(ScheduledJob::new(job, entry.priority, fire_at));
                }
                Ok(_) => {}
                Err(err) => warn!(cron = %entry.cron, error = %err, "invalid cron schedule skipped"),
            }
        }
    }

    /// Drive the timer-wheel loop at `tick_interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, tick_interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(tick_interval);
        let mut since = Utc::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    self.tick(since, now).await;
                    since = now;
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryJobRepository;

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(JobQueue::new()), Arc::new(InMemoryJobRepository::default()))
    }

    #[test]
    fn add_schedule_rejects_invalid_cron() {
        let mut scheduler = scheduler();
        let entry = ScheduleEntry { job_type: JobType::Backup, target_id: Uuid::new_v4(), cron: "garbage".to_string(), priority: JobPriority::Low };
        assert!(scheduler.add_schedule(entry).is_err());
    }

    #[tokio::test]
    async fn schedule_immediate_enqueues_a_pending_job() {
        let scheduler = scheduler();
        let enqueued = scheduler.schedule_immediate(JobType::Backup, Uuid::new_v4(), JobPriority::Critical).await.unwrap();
        assert!(enqueued);
    }

    #[tokio::test]
    async fn tick_skips_entries_whose_cron_has_not_fired_yet() {
        let since = Utc::now();
        let far_future_cron = "0 0 0 1 1 *".to_string(); // once a year, Jan 1st midnight
        let mut scheduler = scheduler();
        scheduler
            .add_schedule(ScheduleEntry { job_type: JobType::Cleanup, target_id: Uuid::new_v4(), cron: far_future_cron, priority: JobPriority::Maintenance })
            .unwrap();

        scheduler.tick(since, Utc::now()).await;
        assert_eq!(scheduler.queue.stats().queue_depth, 0);
    }
}
