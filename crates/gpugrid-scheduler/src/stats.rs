//! Aggregate statistics over the pool and job history.

use serde::Serialize;

use gpugrid_state::{Capacity, ClusterId, ClusterStatus, Job, JobStatus, PoolSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterUtilization {
    pub cluster_id: ClusterId,
    pub status: ClusterStatus,
    pub total: Capacity,
    pub available: Capacity,
    /// Fraction of GPUs reserved (0.0–1.0).
    pub gpu_utilization: f64,
    /// Fraction of memory reserved (0.0–1.0).
    pub memory_utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub total_clusters: usize,
    pub total_nodes: usize,
    pub total_capacity: Capacity,
    pub available: Capacity,
    pub queued_count: usize,
    pub running_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub avg_completed_duration_ms: Option<u64>,
    pub per_cluster_utilization: Vec<ClusterUtilization>,
}

impl SchedulerStats {
    pub fn collect<'a>(snapshot: &PoolSnapshot, jobs: impl Iterator<Item = &'a Job>) -> Self {
        let mut stats = SchedulerStats {
            total_clusters: snapshot.clusters.len(),
            total_nodes: snapshot.node_count(),
            total_capacity: snapshot.clusters.iter().map(|c| c.total).sum(),
            available: snapshot.clusters.iter().map(|c| c.available).sum(),
            queued_count: 0,
            running_count: 0,
            completed_count: 0,
            failed_count: 0,
            cancelled_count: 0,
            avg_completed_duration_ms: None,
            per_cluster_utilization: snapshot
                .clusters
                .iter()
                .map(|c| ClusterUtilization {
                    cluster_id: c.id.clone(),
                    status: c.status,
                    total: c.total,
                    available: c.available,
                    gpu_utilization: c.gpu_utilization(),
                    memory_utilization: c.memory_utilization(),
                })
                .collect(),
        };

        let mut duration_sum = 0u64;
        for job in jobs {
            match job.status {
                JobStatus::Queued => stats.queued_count += 1,
                JobStatus::Running => stats.running_count += 1,
                JobStatus::Completed => {
                    stats.completed_count += 1;
                    duration_sum += job.duration_ms().unwrap_or(0);
                }
                JobStatus::Failed => stats.failed_count += 1,
                JobStatus::Cancelled => stats.cancelled_count += 1,
            }
        }
        if stats.completed_count > 0 {
            stats.avg_completed_duration_ms = Some(duration_sum / stats.completed_count as u64);
        }
        stats
    }
}

/// Inputs for the autoscaler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadSummary {
    pub node_count: usize,
    /// Mean node load (0.0–1.0) across every registered node.
    pub avg_utilization: f64,
    pub queue_length: usize,
}

impl LoadSummary {
    pub fn from_snapshot(snapshot: &PoolSnapshot, queue_length: usize) -> Self {
        let node_count = snapshot.node_count();
        let avg_utilization = if node_count == 0 {
            0.0
        } else {
            snapshot.nodes().map(|n| n.load()).sum::<f64>() / node_count as f64
        };
        Self {
            node_count,
            avg_utilization,
            queue_length,
        }
    }
}
