//! Job queue ordered by priority, then submission time.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use gpugrid_state::{Job, JobId, Priority};

/// Sort key: highest priority first, then earliest submission, then
/// submission sequence for jobs sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<Priority>,
    submitted_at_ms: u64,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    ordered: BTreeMap<QueueKey, JobId>,
    keys: HashMap<JobId, QueueKey>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job. A job already queued keeps its position.
    pub fn push(&mut self, job: &Job) {
        if self.keys.contains_key(&job.id) {
            return;
        }
        let key = QueueKey {
            priority: Reverse(job.priority()),
            submitted_at_ms: job.submitted_at_ms,
            seq: job.seq,
        };
        self.ordered.insert(key, job.id.clone());
        self.keys.insert(job.id.clone(), key);
    }

    pub fn remove(&mut self, job_id: &str) -> bool {
        match self.keys.remove(job_id) {
            Some(key) => {
                self.ordered.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.keys.contains_key(job_id)
    }

    /// Job ids in scheduling order.
    pub fn ordered_ids(&self) -> Vec<JobId> {
        self.ordered.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
