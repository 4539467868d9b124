//! `JobQueue` — the pending-job priority queue plus running/dedup
//! indices, grounded in the teacher's `BinaryHeap<Reverse<ScheduledJob>>`
//! plus parallel `HashMap`/`HashSet` bookkeeping.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use super::types::ScheduledJob;

#[derive(Debug, Default, Clone, Copy)]
pub struct JobQueueStats {
    pub queue_depth: usize,
    pub running: usize,
}

pub struct JobQueue {
    pending: RwLock<BinaryHeap<Reverse<ScheduledJob>>>,
    running: RwLock<HashMap<Uuid, String>>,
    dedup_keys: RwLock<HashSet<String>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(BinaryHeap::new()),
            running: RwLock::new(HashMap::new()),
            dedup_keys: RwLock::new(HashSet::new()),
        }
    }

    /// Enqueue a job unless one with the same dedup key is already
    /// pending or running. Returns whether it was actually enqueued.
    pub fn enqueue(&self, scheduled: ScheduledJob) -> bool {
        let key = scheduled.job.dedup_key();
        let mut dedup_keys = self.dedup_keys.write().unwrap();
        if dedup_keys.contains(&key) {
            return false;
        }
        dedup_keys.insert(key);
        self.pending.write().unwrap().push(Reverse(scheduled));
        true
    }

    /// Pop the most urgent ready job (priority, then scheduled time),
    /// leaving not-yet-due jobs in the queue.
    pub fn pop_ready(&self) -> Option<ScheduledJob> {
        let now = Utc::now();
        let mut pending = self.pending.write().unwrap();
        if pending.peek().map(|Reverse(j)| j.is_ready(now)).unwrap_or(false) {
            let Reverse(job) = pending.pop().unwrap();
            self.dedup_keys.write().unwrap().remove(&job.job.dedup_key());
            self.running.write().unwrap().insert(job.job.id, job.job.dedup_key());
            return Some(job);
        }
        None
    }

    pub fn mark_finished(&self, job_id: Uuid) {
        self.running.write().unwrap().remove(&job_id);
    }

    pub fn stats(&self) -> JobQueueStats {
        JobQueueStats {
            queue_depth: self.pending.read().unwrap().len(),
            running: self.running.read().unwrap().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Job, JobType};
    use crate::scheduler::JobPriority;

    #[test]
    fn duplicate_dedup_key_is_rejected_while_pending() {
        let queue = JobQueue::new();
        let target = Uuid::new_v4();
        let first = ScheduledJob::new(Job::new(JobType::Backup, target), JobPriority::Normal, Utc::now());
        let second = ScheduledJob::new(Job::new(JobType::Backup, target), JobPriority::Normal, Utc::now());

        assert!(queue.enqueue(first));
        assert!(!queue.enqueue(second));
    }

    #[test]
    fn pop_ready_respects_scheduled_time() {
        let queue = JobQueue::new();
        let future = ScheduledJob::new(
            Job::new(JobType::Backup, Uuid::new_v4()),
            JobPriority::Normal,
            Utc::now() + chrono::Duration::seconds(60),
        );
        queue.enqueue(future);
        assert!(queue.pop_ready().is_none());
    }

    #[test]
    fn pop_ready_returns_highest_priority_first() {
        let queue = JobQueue::new();
        let low = ScheduledJob::new(Job::new(JobType::Cleanup, Uuid::new_v4()), JobPriority::Low, Utc::now());
        let critical = ScheduledJob::new(Job::new(JobType::Backup, Uuid::new_v4()), JobPriority::Critical, Utc::now());
        queue.enqueue(low);
        queue.enqueue(critical);

        let popped = queue.pop_ready().unwrap();
        assert_eq!(popped.priority, JobPriority::Critical);
    }
}
