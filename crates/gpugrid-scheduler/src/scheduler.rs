//! Scheduler — matches queued jobs to nodes and drives the job state machine.
//!
//! Every public operation takes the single `inner` lock, mutates the pool
//! and job table, emits events, and (when capacity may have changed) runs
//! a scheduling pass before releasing it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use gpugrid_core::GridConfig;
use gpugrid_placement::{PlacementContext, StrategyKind, StrategyRegistry};
use gpugrid_state::*;

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::JobQueue;
use crate::stats::{LoadSummary, SchedulerStats};

/// State guarded by the scheduler lock.
struct Inner {
    pool: ResourcePool,
    /// Every job ever submitted, until purged.
    jobs: HashMap<JobId, Job>,
    queue: JobQueue,
    next_seq: u64,
}

pub struct Scheduler {
    inner: Mutex<Inner>,
    strategies: StrategyRegistry,
    placement: PlacementContext,
    default_strategy: StrategyKind,
    max_queue_len: usize,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Build a scheduler from static configuration.
    ///
    /// Fails with `UnknownStrategy` if `[scheduler] strategy` names no
    /// known strategy.
    pub fn new(config: &GridConfig, events: EventBus) -> SchedulerResult<Self> {
        let default_strategy: StrategyKind = config.scheduler.strategy.parse()?;
        let placement = PlacementContext::from_config(&config.placement);
        Ok(Self {
            inner: Mutex::new(Inner {
                pool: ResourcePool::new(events.clone()),
                jobs: HashMap::new(),
                queue: JobQueue::new(),
                next_seq: 1,
            }),
            strategies: StrategyRegistry::new(placement.clone()),
            placement,
            default_strategy,
            max_queue_len: config.scheduler.max_queue_len,
            events,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the round-robin strategy's RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.strategies = StrategyRegistry::with_seed(self.placement.clone(), seed);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn strategy(&self) -> StrategyKind {
        self.default_strategy
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ── Clusters and nodes ─────────────────────────────────────────

    pub async fn register_cluster(&self, cluster: Cluster) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.pool.register(cluster)?;
        self.schedule_locked(&mut inner);
        Ok(())
    }

    /// Remove a cluster. Jobs running on its nodes go back to the queue;
    /// their ids are returned.
    pub async fn deregister_cluster(&self, cluster_id: &str) -> SchedulerResult<Vec<JobId>> {
        let mut inner = self.inner.lock().await;
        let displaced = inner.pool.deregister(cluster_id).inspect_err(|e| {
            warn!(cluster = %cluster_id, error = %e, "deregister failed");
        })?;
        self.requeue_locked(&mut inner, &displaced);
        self.schedule_locked(&mut inner);
        Ok(displaced)
    }

    pub async fn add_node(&self, cluster_id: &str, node: Node) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.pool.add_node(cluster_id, node)?;
        self.schedule_locked(&mut inner);
        Ok(())
    }

    /// Remove a node. Its jobs are requeued, not failed.
    pub async fn remove_node(&self, node_id: &str) -> SchedulerResult<Vec<JobId>> {
        let mut inner = self.inner.lock().await;
        let displaced = inner.pool.remove_node(node_id).inspect_err(|e| {
            warn!(node = %node_id, error = %e, "remove node failed");
        })?;
        self.requeue_locked(&mut inner, &displaced);
        self.schedule_locked(&mut inner);
        Ok(displaced)
    }

    /// Set a cluster's status, returning the previous one. Reactivating a
    /// cluster triggers a scheduling pass.
    pub async fn set_cluster_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
    ) -> SchedulerResult<ClusterStatus> {
        let mut inner = self.inner.lock().await;
        let previous = inner.pool.set_cluster_status(cluster_id, status)?;
        if status == ClusterStatus::Active && previous != ClusterStatus::Active {
            self.schedule_locked(&mut inner);
        }
        Ok(previous)
    }

    pub async fn record_metrics(&self, node_id: &str, metrics: NodeMetrics) -> SchedulerResult<()> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        inner.pool.record_metrics(node_id, metrics, now)?;
        Ok(())
    }

    /// Unconditionally set a node's health (maintenance, operator
    /// override). Returns the previous status.
    pub async fn set_node_health(
        &self,
        node_id: &str,
        health: HealthStatus,
        reason: &str,
    ) -> SchedulerResult<HealthStatus> {
        let mut inner = self.inner.lock().await;
        let previous = inner.pool.set_health(node_id, health)?;
        self.health_changed_locked(&mut inner, node_id, previous, health, reason);
        Ok(previous)
    }

    /// Compare-and-set a node's health. Returns `false` without changing
    /// anything if the node's current health is not `expected`, so an
    /// operator override is never clobbered by a monitor sample.
    pub async fn transition_node_health(
        &self,
        node_id: &str,
        expected: HealthStatus,
        health: HealthStatus,
        reason: &str,
    ) -> SchedulerResult<bool> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .pool
            .node(node_id)
            .map(|n| n.health)
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))?;
        if current != expected {
            return Ok(false);
        }
        inner.pool.set_health(node_id, health)?;
        self.health_changed_locked(&mut inner, node_id, current, health, reason);
        Ok(true)
    }

    fn health_changed_locked(
        &self,
        inner: &mut Inner,
        node_id: &str,
        from: HealthStatus,
        to: HealthStatus,
        reason: &str,
    ) {
        if from == to {
            return;
        }
        if to == HealthStatus::Healthy {
            info!(node = %node_id, %from, "node recovered");
            self.events.emit(GridEvent::NodeRecovered {
                node_id: node_id.to_string(),
            });
            self.schedule_locked(inner);
        } else if from == HealthStatus::Healthy {
            // Running jobs stay where they are; the node just stops
            // receiving new placements.
            warn!(node = %node_id, health = %to, %reason, "node degraded");
            self.events.emit(GridEvent::NodeDegraded {
                node_id: node_id.to_string(),
                reason: reason.to_string(),
            });
        } else {
            info!(node = %node_id, %from, %to, "node health changed");
        }
    }

    // ── Jobs ───────────────────────────────────────────────────────

    /// Validate and enqueue a job, then run a scheduling pass.
    pub async fn submit(&self, spec: JobSpec) -> SchedulerResult<JobId> {
        let now = self.clock.now_ms();
        self.validate(&spec, now)?;

        let mut inner = self.inner.lock().await;
        if inner.queue.len() >= self.max_queue_len {
            return Err(SchedulerError::Validation(format!(
                "queue is full ({} jobs)",
                self.max_queue_len
            )));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let job = Job::new(format!("job-{seq}"), seq, spec, now);
        let job_id = job.id.clone();

        info!(
            job = %job_id,
            job_type = %job.spec.job_type,
            priority = %job.priority(),
            gpus = job.requirements().gpu_count,
            "job submitted"
        );
        inner.queue.push(&job);
        self.events.emit(GridEvent::JobSubmitted {
            job_id: job_id.clone(),
            priority: job.priority(),
        });
        inner.jobs.insert(job_id.clone(), job);

        self.schedule_locked(&mut inner);
        Ok(job_id)
    }

    fn validate(&self, spec: &JobSpec, now: u64) -> SchedulerResult<()> {
        let req = &spec.requirements;
        if req.gpu_count == 0 {
            return Err(SchedulerError::Validation(
                "gpu_count must be greater than zero".into(),
            ));
        }
        if req.max_nodes == 0 {
            return Err(SchedulerError::Validation(
                "max_nodes must be at least 1".into(),
            ));
        }
        if let Some(budget) = spec.cost_budget
            && !(budget.is_finite() && budget >= 0.0)
        {
            return Err(SchedulerError::Validation(format!(
                "cost_budget must be a non-negative number, got {budget}"
            )));
        }
        if let Some(max_latency) = req.max_latency_ms
            && !(max_latency.is_finite() && max_latency >= 0.0)
        {
            return Err(SchedulerError::Validation(format!(
                "max_latency_ms must be a non-negative number, got {max_latency}"
            )));
        }
        if let Some(deadline) = spec.deadline_ms
            && deadline <= now
        {
            return Err(SchedulerError::Validation(format!(
                "deadline {deadline} is already in the past"
            )));
        }
        if let Some(name) = &spec.strategy {
            name.parse::<StrategyKind>()?;
        }
        Ok(())
    }

    /// Record progress for a running job. Reaching 100 completes it.
    pub async fn report_progress(&self, job_id: &str, progress: u8) -> SchedulerResult<()> {
        if progress > 100 {
            return Err(SchedulerError::Validation(format!(
                "progress must be 0-100, got {progress}"
            )));
        }
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(job_id).ok_or_else(|| {
            warn!(job = %job_id, "progress for unknown job");
            SchedulerError::JobNotFound(job_id.to_string())
        })?;

        match job.status {
            JobStatus::Queued => {
                return Err(SchedulerError::Validation(format!(
                    "job {job_id} has not started"
                )));
            }
            status if status.is_terminal() => {
                debug!(job = %job_id, %status, "progress for finished job ignored");
                return Ok(());
            }
            _ => {}
        }
        if progress < job.progress {
            debug!(job = %job_id, current = job.progress, reported = progress, "stale progress ignored");
            return Ok(());
        }
        if progress == job.progress {
            return Ok(());
        }

        job.progress = progress;
        self.events.emit(GridEvent::JobProgress {
            job_id: job_id.to_string(),
            progress,
        });
        if progress == 100 {
            self.finish_locked(&mut inner, job_id, JobStatus::Completed, None, now);
            self.schedule_locked(&mut inner);
        }
        Ok(())
    }

    /// Mark a running job completed. Returns `false` if it had already
    /// finished.
    pub async fn complete(&self, job_id: &str) -> SchedulerResult<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        let status = self.status_locked(&inner, job_id)?;
        if status.is_terminal() {
            debug!(job = %job_id, %status, "complete on finished job ignored");
            return Ok(false);
        }
        if status == JobStatus::Queued {
            return Err(SchedulerError::Validation(format!(
                "job {job_id} has not started"
            )));
        }
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.progress = 100;
        }
        self.finish_locked(&mut inner, job_id, JobStatus::Completed, None, now);
        self.schedule_locked(&mut inner);
        Ok(true)
    }

    /// Mark a queued or running job failed. Returns `false` if it had
    /// already finished.
    pub async fn fail(&self, job_id: &str, error: impl Into<String>) -> SchedulerResult<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        let status = self.status_locked(&inner, job_id)?;
        if status.is_terminal() {
            debug!(job = %job_id, %status, "fail on finished job ignored");
            return Ok(false);
        }
        self.finish_locked(&mut inner, job_id, JobStatus::Failed, Some(error.into()), now);
        self.schedule_locked(&mut inner);
        Ok(true)
    }

    /// Cancel a queued or running job. Cancelling a finished job is a
    /// no-op and returns `false`.
    pub async fn cancel(&self, job_id: &str) -> SchedulerResult<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        let status = self.status_locked(&inner, job_id)?;
        if status.is_terminal() {
            debug!(job = %job_id, %status, "cancel on finished job ignored");
            return Ok(false);
        }
        self.finish_locked(&mut inner, job_id, JobStatus::Cancelled, None, now);
        self.schedule_locked(&mut inner);
        Ok(true)
    }

    /// Run one scheduling pass and return the number of jobs placed.
    pub async fn schedule_now(&self) -> usize {
        let mut inner = self.inner.lock().await;
        self.schedule_locked(&mut inner)
    }

    fn status_locked(&self, inner: &Inner, job_id: &str) -> SchedulerResult<JobStatus> {
        inner.jobs.get(job_id).map(|j| j.status).ok_or_else(|| {
            warn!(job = %job_id, "unknown job");
            SchedulerError::JobNotFound(job_id.to_string())
        })
    }

    /// Move a non-terminal job into `status`, releasing its capacity.
    fn finish_locked(
        &self,
        inner: &mut Inner,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        now: u64,
    ) {
        inner.queue.remove(job_id);
        inner.pool.release(job_id);

        let Some(job) = inner.jobs.get_mut(job_id) else {
            return;
        };
        let was_running = job.status == JobStatus::Running;
        job.status = status;
        job.ended_at_ms = Some(now);
        job.error = error.clone();

        match status {
            JobStatus::Completed => {
                let duration_ms = job.duration_ms().unwrap_or(0);
                info!(job = %job_id, duration_ms, "job completed");
                self.events.emit(GridEvent::JobCompleted {
                    job_id: job_id.to_string(),
                    duration_ms,
                });
            }
            JobStatus::Failed => {
                job.assignments.clear();
                let error = error.unwrap_or_default();
                warn!(job = %job_id, %error, was_running, "job failed");
                self.events.emit(GridEvent::JobFailed {
                    job_id: job_id.to_string(),
                    error,
                });
            }
            JobStatus::Cancelled => {
                info!(job = %job_id, was_running, "job cancelled");
                self.events.emit(GridEvent::JobCancelled {
                    job_id: job_id.to_string(),
                });
            }
            JobStatus::Queued | JobStatus::Running => {}
        }
    }

    /// Put jobs that lost their nodes back in the queue, keeping their
    /// original submission order.
    fn requeue_locked(&self, inner: &mut Inner, job_ids: &[JobId]) {
        for job_id in job_ids {
            let Some(job) = inner.jobs.get_mut(job_id) else {
                continue;
            };
            if job.status != JobStatus::Running {
                continue;
            }
            job.status = JobStatus::Queued;
            job.assignments.clear();
            job.progress = 0;
            job.started_at_ms = None;
            job.requeue_count += 1;
            info!(job = %job_id, requeues = job.requeue_count, "job requeued");
            inner.queue.push(job);
        }
    }

    /// Place as many queued jobs as possible, in queue order.
    fn schedule_locked(&self, inner: &mut Inner) -> usize {
        let now = self.clock.now_ms();
        self.expire_locked(inner, now);
        if inner.queue.is_empty() {
            return 0;
        }

        let mut candidates = inner.pool.placeable_nodes();
        let mut placed = 0;

        for job_id in inner.queue.ordered_ids() {
            if candidates.is_empty() {
                break;
            }
            let Some(job) = inner.jobs.get(&job_id) else {
                inner.queue.remove(&job_id);
                continue;
            };
            let kind = job
                .spec
                .strategy
                .as_deref()
                .and_then(|name| name.parse().ok())
                .unwrap_or(self.default_strategy);

            let Some(placement) = self.strategies.get(kind).select(&candidates, job) else {
                debug!(job = %job_id, strategy = %kind, "no placement, job stays queued");
                continue;
            };

            if let Err(e) = inner.pool.reserve(&job_id, &placement.allocations) {
                debug!(job = %job_id, error = %e, "reservation rejected, job stays queued");
                continue;
            }

            inner.queue.remove(&job_id);
            let nodes = placement.node_ids();
            if let Some(job) = inner.jobs.get_mut(&job_id) {
                job.status = JobStatus::Running;
                job.assignments = placement.allocations;
                job.started_at_ms = Some(now);
                job.progress = 0;
            }
            info!(job = %job_id, strategy = %kind, nodes = ?nodes, "job started");
            self.events.emit(GridEvent::JobStarted {
                job_id: job_id.clone(),
                nodes,
            });
            placed += 1;
            candidates = inner.pool.placeable_nodes();
        }

        if placed > 0 {
            debug!(placed, queued = inner.queue.len(), "scheduling pass finished");
        }
        placed
    }

    /// Fail queued jobs whose deadline has passed.
    fn expire_locked(&self, inner: &mut Inner, now: u64) {
        let expired: Vec<JobId> = inner
            .queue
            .ordered_ids()
            .into_iter()
            .filter(|id| {
                inner
                    .jobs
                    .get(id)
                    .and_then(|j| j.spec.deadline_ms)
                    .is_some_and(|deadline| deadline < now)
            })
            .collect();
        for job_id in expired {
            self.finish_locked(
                inner,
                &job_id,
                JobStatus::Failed,
                Some("deadline exceeded".to_string()),
                now,
            );
        }
    }

    // ── Accounting ─────────────────────────────────────────────────

    /// Check the pool's counters against the assignments recorded on
    /// running jobs. Empty means consistent.
    pub async fn verify_accounting(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.pool.audit(
            inner
                .jobs
                .values()
                .filter(|j| j.status == JobStatus::Running)
                .map(|j| (j.id.as_str(), j.assignments.as_slice())),
        )
    }

    /// Recompute every reservation from running jobs' assignments. Jobs
    /// whose assignments no longer fit are requeued; their ids are
    /// returned.
    pub async fn rebuild_accounting(&self) -> Vec<JobId> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let rejected = inner.pool.rebuild_reservations(
            inner
                .jobs
                .values()
                .filter(|j| j.status == JobStatus::Running)
                .map(|j| (j.id.as_str(), j.assignments.as_slice())),
        );
        if !rejected.is_empty() {
            warn!(jobs = rejected.len(), "reservations could not be replayed");
            self.requeue_locked(inner, &rejected);
            self.schedule_locked(inner);
        }
        rejected
    }

    /// Drop finished jobs that ended at least `older_than_ms` ago.
    /// Returns how many were removed.
    pub async fn purge_finished(&self, older_than_ms: u64) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(older_than_ms);
        let mut inner = self.inner.lock().await;
        let before = inner.jobs.len();
        inner.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.ended_at_ms.is_some_and(|t| t <= cutoff))
        });
        let purged = before - inner.jobs.len();
        if purged > 0 {
            info!(purged, "finished jobs purged");
        }
        purged
    }

    // ── Queries ────────────────────────────────────────────────────

    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.inner.lock().await.jobs.get(job_id).cloned()
    }

    /// Jobs in submission order, optionally filtered by status.
    pub async fn jobs(&self, status: Option<JobStatus>) -> Vec<Job> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.seq);
        jobs
    }

    /// Queued job ids in scheduling order.
    pub async fn queued(&self) -> Vec<JobId> {
        self.inner.lock().await.queue.ordered_ids()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        self.inner.lock().await.pool.snapshot()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let inner = self.inner.lock().await;
        SchedulerStats::collect(&inner.pool.snapshot(), inner.jobs.values())
    }

    pub async fn load_summary(&self) -> LoadSummary {
        let inner = self.inner.lock().await;
        LoadSummary::from_snapshot(&inner.pool.snapshot(), inner.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(id: &str, nodes: &[(&str, u32)]) -> Cluster {
        nodes.iter().fold(
            Cluster::new(id, Provider::Aws, "us-east-1"),
            |c, (node_id, gpus)| {
                c.with_node(Node::new(
                    *node_id,
                    "a100",
                    NodeCapacity {
                        gpu_count: *gpus,
                        memory_gb: u64::from(*gpus) * 80,
                        cpu_cores: 64,
                        network_bandwidth_gbps: 100,
                    },
                ))
            },
        )
    }

    fn scheduler(clock: Arc<ManualClock>) -> Scheduler {
        Scheduler::new(&GridConfig::default(), EventBus::new(64))
            .unwrap()
            .with_clock(clock)
            .with_seed(7)
    }

    fn spec(gpus: u32) -> JobSpec {
        JobSpec::new(
            JobType::Training,
            Priority::Medium,
            ResourceRequirements::new(gpus, u64::from(gpus) * 10),
        )
    }

    #[tokio::test]
    async fn rejects_zero_gpus_and_past_deadlines() {
        let clock = Arc::new(ManualClock::new(10_000));
        let sched = scheduler(clock);

        assert!(matches!(
            sched.submit(spec(0)).await,
            Err(SchedulerError::Validation(_))
        ));

        let mut late = spec(1);
        late.deadline_ms = Some(5_000);
        assert!(matches!(
            sched.submit(late).await,
            Err(SchedulerError::Validation(_))
        ));
        assert_eq!(sched.jobs(None).await.len(), 0);
    }

    #[tokio::test]
    async fn unknown_job_strategy_fails_submission() {
        let sched = scheduler(Arc::new(ManualClock::new(0)));
        let mut s = spec(1);
        s.strategy = Some("fastest".into());
        assert!(matches!(
            sched.submit(s).await,
            Err(SchedulerError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn unknown_configured_strategy_fails_construction() {
        let mut config = GridConfig::default();
        config.scheduler.strategy = "magic".into();
        assert!(matches!(
            Scheduler::new(&config, EventBus::default()),
            Err(SchedulerError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn queue_limit_is_enforced() {
        let mut config = GridConfig::default();
        config.scheduler.max_queue_len = 1;
        let sched = Scheduler::new(&config, EventBus::default()).unwrap();

        sched.submit(spec(1)).await.unwrap();
        assert!(matches!(
            sched.submit(spec(1)).await,
            Err(SchedulerError::Validation(msg)) if msg.contains("queue is full")
        ));
    }

    #[tokio::test]
    async fn progress_rules() {
        let clock = Arc::new(ManualClock::new(1_000));
        let sched = scheduler(clock.clone());

        let queued = sched.submit(spec(4)).await.unwrap();
        assert!(matches!(
            sched.report_progress(&queued, 10).await,
            Err(SchedulerError::Validation(_))
        ));

        sched.register_cluster(cluster("c1", &[("n1", 8)])).await.unwrap();
        assert_eq!(sched.job(&queued).await.unwrap().status, JobStatus::Running);

        sched.report_progress(&queued, 40).await.unwrap();
        sched.report_progress(&queued, 20).await.unwrap();
        assert_eq!(sched.job(&queued).await.unwrap().progress, 40);

        assert!(matches!(
            sched.report_progress(&queued, 101).await,
            Err(SchedulerError::Validation(_))
        ));
        assert!(matches!(
            sched.report_progress("job-999", 10).await,
            Err(SchedulerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn completion_records_duration() {
        let clock = Arc::new(ManualClock::new(1_000));
        let sched = scheduler(clock.clone());
        sched.register_cluster(cluster("c1", &[("n1", 8)])).await.unwrap();

        let id = sched.submit(spec(2)).await.unwrap();
        clock.advance(2_500);
        assert!(sched.complete(&id).await.unwrap());
        assert!(!sched.complete(&id).await.unwrap());

        let job = sched.job(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.duration_ms(), Some(2_500));
        assert_eq!(job.progress, 100);
        // Completed jobs keep their assignments as history.
        assert_eq!(job.assigned_nodes(), vec!["n1".to_string()]);

        let stats = sched.stats().await;
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.avg_completed_duration_ms, Some(2_500));
    }

    #[tokio::test]
    async fn failing_a_running_job_clears_assignments() {
        let sched = scheduler(Arc::new(ManualClock::new(0)));
        sched.register_cluster(cluster("c1", &[("n1", 8)])).await.unwrap();
        let id = sched.submit(spec(8)).await.unwrap();

        assert!(sched.fail(&id, "oom").await.unwrap());
        let job = sched.job(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("oom"));
        assert!(job.assignments.is_empty());
        assert_eq!(sched.stats().await.available, Capacity::new(8, 640));
    }

    #[tokio::test]
    async fn overdue_queued_jobs_expire_on_next_pass() {
        let clock = Arc::new(ManualClock::new(1_000));
        let sched = scheduler(clock.clone());

        let mut s = spec(1);
        s.deadline_ms = Some(2_000);
        let id = sched.submit(s).await.unwrap();
        clock.set(3_000);
        assert_eq!(sched.schedule_now().await, 0);

        let job = sched.job(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("deadline exceeded"));
        assert_eq!(sched.queue_len().await, 0);
    }

    #[tokio::test]
    async fn purge_drops_only_old_finished_jobs() {
        let clock = Arc::new(ManualClock::new(100_000));
        let sched = scheduler(clock.clone());
        sched.register_cluster(cluster("c1", &[("n1", 8)])).await.unwrap();

        let done = sched.submit(spec(1)).await.unwrap();
        let running = sched.submit(spec(1)).await.unwrap();
        sched.complete(&done).await.unwrap();

        clock.advance(10_000);
        assert_eq!(sched.purge_finished(60_000).await, 0);
        assert_eq!(sched.purge_finished(5_000).await, 1);
        assert!(sched.job(&done).await.is_none());
        assert!(sched.job(&running).await.is_some());
    }

    #[tokio::test]
    async fn transition_health_is_compare_and_set() {
        let sched = scheduler(Arc::new(ManualClock::new(0)));
        sched.register_cluster(cluster("c1", &[("n1", 8)])).await.unwrap();
        sched
            .set_node_health("n1", HealthStatus::Maintenance, "operator")
            .await
            .unwrap();

        let changed = sched
            .transition_node_health("n1", HealthStatus::Degraded, HealthStatus::Healthy, "sample")
            .await
            .unwrap();
        assert!(!changed);
        let snapshot = sched.snapshot().await;
        assert_eq!(snapshot.nodes().next().unwrap().health, HealthStatus::Maintenance);
    }

    #[tokio::test]
    async fn rebuild_matches_a_clean_audit() {
        let sched = scheduler(Arc::new(ManualClock::new(0)));
        sched
            .register_cluster(cluster("c1", &[("n1", 8), ("n2", 8)]))
            .await
            .unwrap();
        sched.submit(spec(3)).await.unwrap();
        sched.submit(spec(6)).await.unwrap();

        assert!(sched.verify_accounting().await.is_empty());
        assert!(sched.rebuild_accounting().await.is_empty());
        assert!(sched.verify_accounting().await.is_empty());
        assert_eq!(sched.stats().await.available.gpu_count, 7);
    }
}
