//! ResourcePool — cluster/node registry and capacity accounting.
//!
//! Every reservation is recorded per job. Node counters (`reserved`,
//! `assigned_jobs`) are only changed through `reserve` / `release`, and
//! `rebuild_reservations` can recompute all of them from job allocations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PoolError, PoolResult};
use crate::events::{EventBus, GridEvent};
use crate::types::*;

/// Immutable view of a node, flattened with its cluster's attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub cluster_id: ClusterId,
    pub provider: Provider,
    pub region: String,
    pub cluster_status: ClusterStatus,
    pub gpu_type: String,
    pub capacity: NodeCapacity,
    pub free: Capacity,
    pub health: HealthStatus,
    pub metrics: NodeMetrics,
    /// Number of jobs currently holding capacity on this node.
    pub queue_length: usize,
    pub base_latency_ms: f64,
    pub compute_throughput: f64,
    pub last_heartbeat_ms: u64,
}

impl NodeView {
    fn from_node(cluster: &Cluster, node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            cluster_id: cluster.id.clone(),
            provider: cluster.provider,
            region: cluster.region.clone(),
            cluster_status: cluster.status,
            gpu_type: node.gpu_type.clone(),
            capacity: node.capacity,
            free: node.free(),
            health: node.health,
            metrics: node.metrics,
            queue_length: node.assigned_jobs.len(),
            base_latency_ms: node.base_latency_ms,
            compute_throughput: node.compute_throughput,
            last_heartbeat_ms: node.last_heartbeat_ms,
        }
    }

    pub fn free_gpu_ratio(&self) -> f64 {
        ratio(self.free.gpu_count as f64, self.capacity.gpu_count as f64)
    }

    pub fn free_memory_ratio(&self) -> f64 {
        ratio(self.free.memory_gb as f64, self.capacity.memory_gb as f64)
    }

    /// `available / total`, averaged over GPUs and memory.
    pub fn free_ratio(&self) -> f64 {
        (self.free_gpu_ratio() + self.free_memory_ratio()) / 2.0
    }

    /// Fraction of reservable capacity in use.
    pub fn load(&self) -> f64 {
        1.0 - self.free_ratio()
    }

    /// Healthy node in an active cluster.
    pub fn is_placeable(&self) -> bool {
        self.health == HealthStatus::Healthy && self.cluster_status == ClusterStatus::Active
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterView {
    pub id: ClusterId,
    pub provider: Provider,
    pub region: String,
    pub status: ClusterStatus,
    pub total: Capacity,
    pub available: Capacity,
    pub nodes: Vec<NodeView>,
}

impl ClusterView {
    /// Fraction of GPUs reserved.
    pub fn gpu_utilization(&self) -> f64 {
        1.0 - ratio(self.available.gpu_count as f64, self.total.gpu_count as f64)
    }

    pub fn memory_utilization(&self) -> f64 {
        1.0 - ratio(self.available.memory_gb as f64, self.total.memory_gb as f64)
    }
}

/// Point-in-time copy of the whole pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolSnapshot {
    pub clusters: Vec<ClusterView>,
}

impl PoolSnapshot {
    pub fn nodes(&self) -> impl Iterator<Item = &NodeView> {
        self.clusters.iter().flat_map(|c| c.nodes.iter())
    }

    /// Nodes eligible for new placements.
    pub fn placeable_nodes(&self) -> Vec<NodeView> {
        self.nodes().filter(|n| n.is_placeable()).cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.clusters.iter().map(|c| c.nodes.len()).sum()
    }
}

pub struct ResourcePool {
    clusters: BTreeMap<ClusterId, Cluster>,
    /// node id → owning cluster id.
    node_index: HashMap<NodeId, ClusterId>,
    /// job id → allocations held by that job.
    reservations: HashMap<JobId, Vec<Allocation>>,
    events: EventBus,
}

impl ResourcePool {
    pub fn new(events: EventBus) -> Self {
        Self {
            clusters: BTreeMap::new(),
            node_index: HashMap::new(),
            reservations: HashMap::new(),
            events,
        }
    }

    // ── Registration ───────────────────────────────────────────────

    /// Register a cluster with its nodes. Incoming nodes start with no
    /// reservations regardless of what the caller passed in.
    pub fn register(&mut self, mut cluster: Cluster) -> PoolResult<()> {
        if self.clusters.contains_key(&cluster.id) {
            return Err(PoolError::DuplicateCluster(cluster.id));
        }
        let mut seen = std::collections::HashSet::new();
        for node in &cluster.nodes {
            if self.node_index.contains_key(&node.id) || !seen.insert(node.id.clone()) {
                return Err(PoolError::DuplicateNode(node.id.clone()));
            }
        }

        for node in &mut cluster.nodes {
            reset_node(node, &cluster.id);
            self.node_index.insert(node.id.clone(), cluster.id.clone());
        }

        let cluster_id = cluster.id.clone();
        let node_ids: Vec<NodeId> = cluster.nodes.iter().map(|n| n.id.clone()).collect();
        info!(
            cluster = %cluster_id,
            provider = %cluster.provider,
            region = %cluster.region,
            nodes = node_ids.len(),
            "cluster registered"
        );
        self.clusters.insert(cluster_id.clone(), cluster);

        self.events.emit(GridEvent::ClusterAdded {
            cluster_id: cluster_id.clone(),
        });
        for node_id in node_ids {
            self.events.emit(GridEvent::NodeAdded {
                cluster_id: cluster_id.clone(),
                node_id,
            });
        }
        Ok(())
    }

    /// Remove a cluster. Every job holding capacity on one of its nodes
    /// loses its whole reservation; those job ids are returned so the
    /// caller can put them back in the queue.
    pub fn deregister(&mut self, cluster_id: &str) -> PoolResult<Vec<JobId>> {
        let node_ids: Vec<NodeId> = self
            .clusters
            .get(cluster_id)
            .ok_or_else(|| PoolError::ClusterNotFound(cluster_id.to_string()))?
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .collect();

        let mut displaced = Vec::new();
        for node_id in &node_ids {
            for job_id in self.evict_node(node_id) {
                if !displaced.contains(&job_id) {
                    displaced.push(job_id);
                }
            }
        }

        for node_id in &node_ids {
            self.node_index.remove(node_id);
        }
        self.clusters.remove(cluster_id);

        for node_id in node_ids {
            self.events.emit(GridEvent::NodeRemoved {
                cluster_id: cluster_id.to_string(),
                node_id,
            });
        }
        self.events.emit(GridEvent::ClusterRemoved {
            cluster_id: cluster_id.to_string(),
        });
        info!(cluster = %cluster_id, displaced_jobs = displaced.len(), "cluster deregistered");
        Ok(displaced)
    }

    pub fn add_node(&mut self, cluster_id: &str, mut node: Node) -> PoolResult<()> {
        if self.node_index.contains_key(&node.id) {
            return Err(PoolError::DuplicateNode(node.id));
        }
        let cluster = self
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| PoolError::ClusterNotFound(cluster_id.to_string()))?;

        reset_node(&mut node, cluster_id);
        let node_id = node.id.clone();
        cluster.nodes.push(node);
        self.node_index.insert(node_id.clone(), cluster_id.to_string());

        info!(cluster = %cluster_id, node = %node_id, "node added");
        self.events.emit(GridEvent::NodeAdded {
            cluster_id: cluster_id.to_string(),
            node_id,
        });
        Ok(())
    }

    /// Remove a node, returning the jobs that lost their reservation.
    pub fn remove_node(&mut self, node_id: &str) -> PoolResult<Vec<JobId>> {
        let cluster_id = self
            .node_index
            .get(node_id)
            .cloned()
            .ok_or_else(|| PoolError::NodeNotFound(node_id.to_string()))?;

        let displaced = self.evict_node(node_id);

        if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
            cluster.nodes.retain(|n| n.id != node_id);
        }
        self.node_index.remove(node_id);

        info!(cluster = %cluster_id, node = %node_id, displaced_jobs = displaced.len(), "node removed");
        self.events.emit(GridEvent::NodeRemoved {
            cluster_id,
            node_id: node_id.to_string(),
        });
        Ok(displaced)
    }

    /// Release every reservation touching `node_id`.
    fn evict_node(&mut self, node_id: &str) -> Vec<JobId> {
        let jobs: Vec<JobId> = self
            .node(node_id)
            .map(|n| n.assigned_jobs.iter().cloned().collect())
            .unwrap_or_default();
        for job_id in &jobs {
            self.release(job_id);
        }
        jobs
    }

    // ── Reservations ───────────────────────────────────────────────

    /// Reserve capacity for a job on one or more nodes.
    ///
    /// All-or-nothing: every target is checked before any counter moves.
    pub fn reserve(&mut self, job_id: &str, allocations: &[Allocation]) -> PoolResult<()> {
        if self.reservations.contains_key(job_id) {
            return Err(PoolError::AlreadyReserved(job_id.to_string()));
        }

        // Aggregate per node so two allocations on the same node are
        // checked against its free capacity together.
        let mut per_node: BTreeMap<&str, Capacity> = BTreeMap::new();
        for alloc in allocations {
            *per_node.entry(alloc.node_id.as_str()).or_default() += alloc.capacity();
        }

        for (node_id, requested) in &per_node {
            let node = self
                .node(node_id)
                .ok_or_else(|| PoolError::NodeNotFound(node_id.to_string()))?;
            let free = node.free();
            if !free.covers(requested) {
                return Err(PoolError::InsufficientCapacity {
                    node_id: node_id.to_string(),
                    requested: *requested,
                    free,
                });
            }
        }

        for (node_id, requested) in per_node {
            if let Some(node) = self.node_mut(node_id) {
                node.reserved += requested;
                node.assigned_jobs.insert(job_id.to_string());
            }
        }
        self.reservations
            .insert(job_id.to_string(), allocations.to_vec());
        debug!(job = %job_id, nodes = allocations.len(), "capacity reserved");
        Ok(())
    }

    /// Release a job's reservation. Releasing twice is a no-op.
    pub fn release(&mut self, job_id: &str) -> Option<Vec<Allocation>> {
        let allocations = self.reservations.remove(job_id)?;
        for alloc in &allocations {
            match self.node_mut(&alloc.node_id) {
                Some(node) => {
                    node.reserved = node.reserved.saturating_sub(&alloc.capacity());
                    node.assigned_jobs.remove(job_id);
                }
                None => warn!(job = %job_id, node = %alloc.node_id, "released allocation on unknown node"),
            }
        }
        debug!(job = %job_id, "capacity released");
        Some(allocations)
    }

    pub fn reservation(&self, job_id: &str) -> Option<&[Allocation]> {
        self.reservations.get(job_id).map(|v| v.as_slice())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Recompute every counter from the given job allocations.
    ///
    /// Allocations that no longer fit (unknown node, over capacity) are
    /// skipped and their job ids returned.
    pub fn rebuild_reservations<'a, I>(&mut self, running: I) -> Vec<JobId>
    where
        I: IntoIterator<Item = (&'a str, &'a [Allocation])>,
    {
        self.reservations.clear();
        for cluster in self.clusters.values_mut() {
            for node in &mut cluster.nodes {
                node.reserved = Capacity::ZERO;
                node.assigned_jobs.clear();
            }
        }

        let mut rejected = Vec::new();
        for (job_id, allocations) in running {
            if let Err(e) = self.reserve(job_id, allocations) {
                warn!(job = %job_id, error = %e, "could not replay reservation");
                rejected.push(job_id.to_string());
            }
        }
        rejected
    }

    /// Compare the counters against a replay of the given allocations.
    /// Returns one line per discrepancy; empty means consistent.
    pub fn audit<'a, I>(&self, running: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, &'a [Allocation])>,
    {
        let mut expected: HashMap<&str, Capacity> = HashMap::new();
        let mut expected_jobs: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut problems = Vec::new();
        let mut job_count = 0;

        for (job_id, allocations) in running {
            job_count += 1;
            match self.reservations.get(job_id) {
                Some(held) if held.as_slice() == allocations => {}
                Some(_) => problems.push(format!("job {job_id}: reservation differs from assignment")),
                None => problems.push(format!("job {job_id}: running without a reservation")),
            }
            for alloc in allocations {
                *expected.entry(alloc.node_id.as_str()).or_default() += alloc.capacity();
                expected_jobs
                    .entry(alloc.node_id.as_str())
                    .or_default()
                    .push(job_id);
            }
        }

        if self.reservations.len() != job_count {
            problems.push(format!(
                "{} reservations held for {} running jobs",
                self.reservations.len(),
                job_count
            ));
        }

        for node in self.clusters.values().flat_map(|c| c.nodes.iter()) {
            let want = expected.get(node.id.as_str()).copied().unwrap_or_default();
            if node.reserved != want {
                problems.push(format!(
                    "node {}: reserved {} but assignments sum to {}",
                    node.id, node.reserved, want
                ));
            }
            let jobs = expected_jobs.get(node.id.as_str());
            let want_jobs = jobs.map(|j| j.len()).unwrap_or(0);
            let mut unique: Vec<&str> = jobs.cloned().unwrap_or_default();
            unique.sort_unstable();
            unique.dedup();
            if node.assigned_jobs.len() != unique.len()
                || !unique.iter().all(|j| node.assigned_jobs.contains(*j))
            {
                problems.push(format!(
                    "node {}: holds {} jobs, expected {}",
                    node.id,
                    node.assigned_jobs.len(),
                    want_jobs
                ));
            }
            if !node.capacity.reservable().covers(&node.reserved) {
                problems.push(format!("node {}: reserved exceeds total", node.id));
            }
        }
        problems
    }

    // ── Node state ─────────────────────────────────────────────────

    /// Set a node's health, returning the previous value.
    pub fn set_health(&mut self, node_id: &str, health: HealthStatus) -> PoolResult<HealthStatus> {
        let node = self
            .node_mut(node_id)
            .ok_or_else(|| PoolError::NodeNotFound(node_id.to_string()))?;
        let previous = node.health;
        node.health = health;
        Ok(previous)
    }

    /// Store the latest metrics for a node and refresh its heartbeat.
    pub fn record_metrics(&mut self, node_id: &str, metrics: NodeMetrics, now_ms: u64) -> PoolResult<()> {
        let node = self
            .node_mut(node_id)
            .ok_or_else(|| PoolError::NodeNotFound(node_id.to_string()))?;
        node.metrics = metrics;
        node.last_heartbeat_ms = now_ms;
        Ok(())
    }

    /// Set a cluster's status, returning the previous value.
    pub fn set_cluster_status(&mut self, cluster_id: &str, status: ClusterStatus) -> PoolResult<ClusterStatus> {
        let cluster = self
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| PoolError::ClusterNotFound(cluster_id.to_string()))?;
        let previous = cluster.status;
        cluster.status = status;
        if previous != status {
            info!(cluster = %cluster_id, from = %previous, to = %status, "cluster status changed");
        }
        Ok(previous)
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn cluster(&self, cluster_id: &str) -> Option<&Cluster> {
        self.clusters.get(cluster_id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        let cluster_id = self.node_index.get(node_id)?;
        self.clusters
            .get(cluster_id)?
            .nodes
            .iter()
            .find(|n| n.id == node_id)
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        let cluster_id = self.node_index.get(node_id)?;
        self.clusters
            .get_mut(cluster_id)?
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    pub fn total_capacity(&self) -> Capacity {
        self.clusters.values().map(|c| c.total_capacity()).sum()
    }

    pub fn available_capacity(&self) -> Capacity {
        self.clusters.values().map(|c| c.available_capacity()).sum()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let clusters = self
            .clusters
            .values()
            .map(|cluster| ClusterView {
                id: cluster.id.clone(),
                provider: cluster.provider,
                region: cluster.region.clone(),
                status: cluster.status,
                total: cluster.total_capacity(),
                available: cluster.available_capacity(),
                nodes: cluster
                    .nodes
                    .iter()
                    .map(|n| NodeView::from_node(cluster, n))
                    .collect(),
            })
            .collect();
        PoolSnapshot { clusters }
    }

    /// Placeable nodes only, without copying cluster summaries.
    pub fn placeable_nodes(&self) -> Vec<NodeView> {
        self.clusters
            .values()
            .filter(|c| c.status == ClusterStatus::Active)
            .flat_map(|c| {
                c.nodes
                    .iter()
                    .filter(|n| n.accepts_placements())
                    .map(move |n| NodeView::from_node(c, n))
            })
            .collect()
    }
}

fn reset_node(node: &mut Node, cluster_id: &str) {
    node.cluster_id = cluster_id.to_string();
    node.reserved = Capacity::ZERO;
    node.assigned_jobs.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_node(id: &str, gpus: u32) -> Node {
        Node::new(
            id,
            "a100",
            NodeCapacity {
                gpu_count: gpus,
                memory_gb: u64::from(gpus) * 80,
                cpu_cores: 64,
                network_bandwidth_gbps: 100,
            },
        )
    }

    fn pool_with_cluster() -> ResourcePool {
        let mut pool = ResourcePool::new(EventBus::new(64));
        let cluster = Cluster::new("c1", Provider::Aws, "us-east-1")
            .with_node(gpu_node("n1", 8))
            .with_node(gpu_node("n2", 8));
        pool.register(cluster).unwrap();
        pool
    }

    #[test]
    fn register_indexes_nodes() {
        let pool = pool_with_cluster();
        assert_eq!(pool.cluster_count(), 1);
        assert_eq!(pool.node_count(), 2);
        assert_eq!(pool.node("n2").unwrap().cluster_id, "c1");
        assert_eq!(pool.total_capacity(), Capacity::new(16, 1280));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut pool = pool_with_cluster();
        let dup = Cluster::new("c1", Provider::Gcp, "eu-west-1");
        assert_eq!(
            pool.register(dup).unwrap_err(),
            PoolError::DuplicateCluster("c1".into())
        );

        let clash = Cluster::new("c2", Provider::Gcp, "eu-west-1").with_node(gpu_node("n1", 4));
        assert_eq!(
            pool.register(clash).unwrap_err(),
            PoolError::DuplicateNode("n1".into())
        );
        assert_eq!(pool.cluster_count(), 1);
    }

    #[test]
    fn register_clears_caller_supplied_reservations() {
        let mut pool = ResourcePool::new(EventBus::new(8));
        let mut node = gpu_node("n1", 4);
        node.reserved = Capacity::new(4, 10);
        node.assigned_jobs.insert("ghost".into());
        pool.register(Cluster::new("c1", Provider::Azure, "westeurope").with_node(node))
            .unwrap();
        assert_eq!(pool.available_capacity(), Capacity::new(4, 320));
        assert!(!pool.node("n1").unwrap().is_busy());
    }

    #[test]
    fn reserve_and_release_update_counters() {
        let mut pool = pool_with_cluster();
        pool.reserve("job-1", &[Allocation::new("n1", 4, 100)]).unwrap();

        let node = pool.node("n1").unwrap();
        assert_eq!(node.reserved, Capacity::new(4, 100));
        assert!(node.is_busy());
        assert_eq!(pool.available_capacity().gpu_count, 12);

        let released = pool.release("job-1").unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(pool.available_capacity(), pool.total_capacity());
        assert!(!pool.node("n1").unwrap().is_busy());
    }

    #[test]
    fn release_is_idempotent() {
        let mut pool = pool_with_cluster();
        pool.reserve("job-1", &[Allocation::new("n1", 2, 10)]).unwrap();
        assert!(pool.release("job-1").is_some());
        assert!(pool.release("job-1").is_none());
        assert_eq!(pool.available_capacity(), pool.total_capacity());
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let mut pool = pool_with_cluster();
        let err = pool
            .reserve(
                "job-1",
                &[Allocation::new("n1", 4, 10), Allocation::new("n2", 9, 10)],
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::InsufficientCapacity { ref node_id, .. } if node_id == "n2"));
        assert_eq!(pool.node("n1").unwrap().reserved, Capacity::ZERO);
        assert!(pool.reservation("job-1").is_none());
    }

    #[test]
    fn reserve_sums_allocations_on_same_node() {
        let mut pool = pool_with_cluster();
        let err = pool
            .reserve(
                "job-1",
                &[Allocation::new("n1", 5, 10), Allocation::new("n1", 5, 10)],
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::InsufficientCapacity { .. }));
    }

    #[test]
    fn reserve_twice_for_same_job_is_rejected() {
        let mut pool = pool_with_cluster();
        pool.reserve("job-1", &[Allocation::new("n1", 1, 10)]).unwrap();
        assert_eq!(
            pool.reserve("job-1", &[Allocation::new("n2", 1, 10)]).unwrap_err(),
            PoolError::AlreadyReserved("job-1".into())
        );
    }

    #[test]
    fn reserve_unknown_node_fails() {
        let mut pool = pool_with_cluster();
        assert_eq!(
            pool.reserve("job-1", &[Allocation::new("nope", 1, 1)]).unwrap_err(),
            PoolError::NodeNotFound("nope".into())
        );
    }

    #[test]
    fn remove_node_returns_displaced_jobs() {
        let mut pool = pool_with_cluster();
        pool.reserve("job-1", &[Allocation::new("n1", 2, 10)]).unwrap();
        pool.reserve(
            "job-2",
            &[Allocation::new("n1", 2, 10), Allocation::new("n2", 2, 10)],
        )
        .unwrap();
        pool.reserve("job-3", &[Allocation::new("n2", 1, 10)]).unwrap();

        let mut displaced = pool.remove_node("n1").unwrap();
        displaced.sort();
        assert_eq!(displaced, vec!["job-1".to_string(), "job-2".to_string()]);

        // job-2's share on n2 is released too; job-3 is untouched.
        let n2 = pool.node("n2").unwrap();
        assert_eq!(n2.reserved, Capacity::new(1, 10));
        assert_eq!(pool.reservation_count(), 1);
        assert!(pool.node("n1").is_none());
    }

    #[test]
    fn deregister_unknown_cluster_fails() {
        let mut pool = pool_with_cluster();
        assert_eq!(
            pool.deregister("c9").unwrap_err(),
            PoolError::ClusterNotFound("c9".into())
        );
    }

    #[test]
    fn deregister_drops_nodes_and_reservations() {
        let mut pool = pool_with_cluster();
        pool.reserve("job-1", &[Allocation::new("n2", 8, 640)]).unwrap();
        let displaced = pool.deregister("c1").unwrap();
        assert_eq!(displaced, vec!["job-1".to_string()]);
        assert_eq!(pool.node_count(), 0);
        assert_eq!(pool.reservation_count(), 0);
    }

    #[tokio::test]
    async fn lifecycle_events_are_emitted() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut pool = ResourcePool::new(bus);
        pool.register(Cluster::new("c1", Provider::Gcp, "us-central1").with_node(gpu_node("n1", 2)))
            .unwrap();
        pool.add_node("c1", gpu_node("n2", 2)).unwrap();
        pool.remove_node("n1").unwrap();
        pool.deregister("c1").unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "clusterAdded",
                "nodeAdded",
                "nodeAdded",
                "nodeRemoved",
                "nodeRemoved",
                "clusterRemoved"
            ]
        );
    }

    #[test]
    fn snapshot_reflects_reservations() {
        let mut pool = pool_with_cluster();
        pool.reserve("job-1", &[Allocation::new("n1", 4, 320)]).unwrap();
        let snap = pool.snapshot();
        let cluster = &snap.clusters[0];
        assert_eq!(cluster.available.gpu_count, 12);
        let n1 = cluster.nodes.iter().find(|n| n.id == "n1").unwrap();
        assert_eq!(n1.queue_length, 1);
        assert!((n1.free_ratio() - 0.5).abs() < 1e-9);
        assert!((cluster.gpu_utilization() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn placeable_nodes_excludes_unhealthy_and_inactive() {
        let mut pool = pool_with_cluster();
        pool.set_health("n1", HealthStatus::Degraded).unwrap();
        let ids: Vec<_> = pool.placeable_nodes().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n2".to_string()]);

        pool.set_cluster_status("c1", ClusterStatus::Maintenance).unwrap();
        assert!(pool.placeable_nodes().is_empty());
        assert!(pool.snapshot().placeable_nodes().is_empty());
    }

    #[test]
    fn rebuild_restores_counters_from_allocations() {
        let mut pool = pool_with_cluster();
        let a1 = vec![Allocation::new("n1", 4, 100)];
        let a2 = vec![Allocation::new("n1", 2, 50), Allocation::new("n2", 2, 50)];
        pool.reserve("job-1", &a1).unwrap();
        pool.reserve("job-2", &a2).unwrap();

        let running = [("job-1", a1.as_slice()), ("job-2", a2.as_slice())];
        assert!(pool.audit(running).is_empty());

        // Drift one counter, the audit notices, a rebuild repairs it.
        pool.release("job-1");
        assert!(!pool.audit(running).is_empty());
        let rejected = pool.rebuild_reservations(running);
        assert!(rejected.is_empty());
        assert!(pool.audit(running).is_empty());
        assert_eq!(pool.node("n1").unwrap().reserved, Capacity::new(6, 150));
    }

    #[test]
    fn record_metrics_updates_heartbeat() {
        let mut pool = pool_with_cluster();
        let metrics = NodeMetrics {
            temperature_c: 71.0,
            ..Default::default()
        };
        pool.record_metrics("n1", metrics, 42).unwrap();
        let node = pool.node("n1").unwrap();
        assert_eq!(node.last_heartbeat_ms, 42);
        assert_eq!(node.metrics.temperature_c, 71.0);
        assert!(pool.record_metrics("zz", metrics, 1).is_err());
    }
}
