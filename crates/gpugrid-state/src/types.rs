//! Domain types for clusters, nodes, and jobs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::PoolError;

pub type ClusterId = String;
pub type NodeId = String;
pub type JobId = String;

/// Implements `as_str`, `Display` and `FromStr` over a fixed name table.
macro_rules! named_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = PoolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(PoolError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// ── Enums ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    OnPremise,
}

named_enum!(Provider, "provider", {
    Aws => "aws",
    Gcp => "gcp",
    Azure => "azure",
    OnPremise => "on-premise",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Active,
    Scaling,
    Maintenance,
    Offline,
}

named_enum!(ClusterStatus, "cluster status", {
    Active => "active",
    Scaling => "scaling",
    Maintenance => "maintenance",
    Offline => "offline",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Maintenance,
}

named_enum!(HealthStatus, "health status", {
    Healthy => "healthy",
    Degraded => "degraded",
    Unhealthy => "unhealthy",
    Maintenance => "maintenance",
});

/// Job priority. Ordering is `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

named_enum!(Priority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Training,
    Inference,
    FineTuning,
    Batch,
    Rendering,
}

named_enum!(JobType, "job type", {
    Training => "training",
    Inference => "inference",
    FineTuning => "fine-tuning",
    Batch => "batch",
    Rendering => "rendering",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

named_enum!(JobStatus, "job status", {
    Queued => "queued",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

// ── Capacity ──────────────────────────────────────────────────────

/// The reservable part of a node's capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub gpu_count: u32,
    pub memory_gb: u64,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity {
        gpu_count: 0,
        memory_gb: 0,
    };

    pub fn new(gpu_count: u32, memory_gb: u64) -> Self {
        Self {
            gpu_count,
            memory_gb,
        }
    }

    /// True when `other` fits inside `self`.
    pub fn covers(&self, other: &Capacity) -> bool {
        self.gpu_count >= other.gpu_count && self.memory_gb >= other.memory_gb
    }

    pub fn saturating_sub(&self, other: &Capacity) -> Capacity {
        Capacity {
            gpu_count: self.gpu_count.saturating_sub(other.gpu_count),
            memory_gb: self.memory_gb.saturating_sub(other.memory_gb),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.gpu_count == 0 && self.memory_gb == 0
    }
}

impl std::ops::Add for Capacity {
    type Output = Capacity;

    fn add(self, rhs: Capacity) -> Capacity {
        Capacity {
            gpu_count: self.gpu_count + rhs.gpu_count,
            memory_gb: self.memory_gb + rhs.memory_gb,
        }
    }
}

impl std::ops::AddAssign for Capacity {
    fn add_assign(&mut self, rhs: Capacity) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Capacity {
    fn sum<I: Iterator<Item = Capacity>>(iter: I) -> Capacity {
        iter.fold(Capacity::ZERO, |acc, c| acc + c)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} gpu / {} GB", self.gpu_count, self.memory_gb)
    }
}

/// Declared hardware of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacity {
    pub gpu_count: u32,
    pub memory_gb: u64,
    pub cpu_cores: u32,
    pub network_bandwidth_gbps: u32,
}

impl NodeCapacity {
    pub fn reservable(&self) -> Capacity {
        Capacity::new(self.gpu_count, self.memory_gb)
    }
}

/// Most recent metrics reported for a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Percent (0–100).
    pub cpu_utilization: f64,
    /// Percent (0–100).
    pub memory_utilization: f64,
    /// Percent (0–100).
    pub gpu_utilization: f64,
    pub temperature_c: f64,
    pub power_watts: f64,
    /// Fraction of failed operations (0.0–1.0).
    pub error_rate: f64,
    pub latency_ms: f64,
}

// ── Node ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Set by the pool on registration.
    pub cluster_id: ClusterId,
    pub gpu_type: String,
    pub capacity: NodeCapacity,
    /// Capacity currently reserved by placed jobs.
    pub reserved: Capacity,
    pub metrics: NodeMetrics,
    pub health: HealthStatus,
    pub assigned_jobs: BTreeSet<JobId>,
    pub last_heartbeat_ms: u64,
    /// Network latency to reach this node, used by latency scoring.
    pub base_latency_ms: f64,
    /// Relative compute throughput (e.g. TFLOPS).
    pub compute_throughput: f64,
}

impl Node {
    pub fn new(id: impl Into<String>, gpu_type: impl Into<String>, capacity: NodeCapacity) -> Self {
        Self {
            id: id.into(),
            cluster_id: String::new(),
            gpu_type: gpu_type.into(),
            capacity,
            reserved: Capacity::ZERO,
            metrics: NodeMetrics::default(),
            health: HealthStatus::Healthy,
            assigned_jobs: BTreeSet::new(),
            last_heartbeat_ms: 0,
            base_latency_ms: 0.0,
            compute_throughput: 1.0,
        }
    }

    pub fn with_latency(mut self, base_latency_ms: f64) -> Self {
        self.base_latency_ms = base_latency_ms;
        self
    }

    pub fn with_throughput(mut self, compute_throughput: f64) -> Self {
        self.compute_throughput = compute_throughput;
        self
    }

    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn free(&self) -> Capacity {
        self.capacity.reservable().saturating_sub(&self.reserved)
    }

    /// A node is busy exactly when it holds at least one job.
    pub fn is_busy(&self) -> bool {
        !self.assigned_jobs.is_empty()
    }

    /// Only healthy nodes accept new placements.
    pub fn accepts_placements(&self) -> bool {
        self.health == HealthStatus::Healthy
    }
}

// ── Cluster ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub provider: Provider,
    pub region: String,
    pub status: ClusterStatus,
    pub nodes: Vec<Node>,
}

impl Cluster {
    pub fn new(id: impl Into<String>, provider: Provider, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider,
            region: region.into(),
            status: ClusterStatus::Active,
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn total_capacity(&self) -> Capacity {
        self.nodes.iter().map(|n| n.capacity.reservable()).sum()
    }

    pub fn reserved_capacity(&self) -> Capacity {
        self.nodes.iter().map(|n| n.reserved).sum()
    }

    /// `total - Σ reserved` over this cluster's nodes.
    pub fn available_capacity(&self) -> Capacity {
        self.nodes.iter().map(|n| n.free()).sum()
    }
}

// ── Job ───────────────────────────────────────────────────────────

/// What a job needs and where it may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub gpu_count: u32,
    pub memory_gb: u64,
    pub gpu_type: Option<String>,
    /// Allowed regions; empty means any.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Allowed providers; empty means any.
    #[serde(default)]
    pub providers: Vec<Provider>,
    /// Region holding the job's data.
    pub data_locality: Option<String>,
    pub max_latency_ms: Option<f64>,
    /// Upper bound on the number of nodes the job may span.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
}

fn default_max_nodes() -> u32 {
    1
}

impl ResourceRequirements {
    pub fn new(gpu_count: u32, memory_gb: u64) -> Self {
        Self {
            gpu_count,
            memory_gb,
            gpu_type: None,
            regions: Vec::new(),
            providers: Vec::new(),
            data_locality: None,
            max_latency_ms: None,
            max_nodes: 1,
        }
    }

    pub fn capacity(&self) -> Capacity {
        Capacity::new(self.gpu_count, self.memory_gb)
    }
}

/// A job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub job_type: JobType,
    pub priority: Priority,
    pub requirements: ResourceRequirements,
    /// Unix milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Maximum acceptable cost for the estimated run.
    #[serde(default)]
    pub cost_budget: Option<f64>,
    #[serde(default = "default_duration")]
    pub estimated_duration_secs: u64,
    /// Overrides the scheduler's active strategy for this job.
    #[serde(default)]
    pub strategy: Option<String>,
}

fn default_duration() -> u64 {
    3600
}

impl JobSpec {
    pub fn new(job_type: JobType, priority: Priority, requirements: ResourceRequirements) -> Self {
        Self {
            name: None,
            job_type,
            priority,
            requirements,
            deadline_ms: None,
            cost_budget: None,
            estimated_duration_secs: default_duration(),
            strategy: None,
        }
    }
}

/// Capacity reserved for a job on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub node_id: NodeId,
    pub gpu_count: u32,
    pub memory_gb: u64,
}

impl Allocation {
    pub fn new(node_id: impl Into<String>, gpu_count: u32, memory_gb: u64) -> Self {
        Self {
            node_id: node_id.into(),
            gpu_count,
            memory_gb,
        }
    }

    pub fn capacity(&self) -> Capacity {
        Capacity::new(self.gpu_count, self.memory_gb)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Submission sequence number, breaks ties between equal timestamps.
    pub seq: u64,
    pub spec: JobSpec,
    pub status: JobStatus,
    /// Non-empty only while running, or after completing/cancelling from running.
    pub assignments: Vec<Allocation>,
    /// 0–100.
    pub progress: u8,
    pub submitted_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub error: Option<String>,
    /// How many times the job went back to the queue after losing its nodes.
    pub requeue_count: u32,
}

impl Job {
    pub fn new(id: impl Into<String>, seq: u64, spec: JobSpec, submitted_at_ms: u64) -> Self {
        Self {
            id: id.into(),
            seq,
            spec,
            status: JobStatus::Queued,
            assignments: Vec::new(),
            progress: 0,
            submitted_at_ms,
            started_at_ms: None,
            ended_at_ms: None,
            error: None,
            requeue_count: 0,
        }
    }

    pub fn priority(&self) -> Priority {
        self.spec.priority
    }

    pub fn requirements(&self) -> &ResourceRequirements {
        &self.spec.requirements
    }

    pub fn assigned_nodes(&self) -> Vec<NodeId> {
        self.assignments.iter().map(|a| a.node_id.clone()).collect()
    }

    /// Sum of all allocations.
    pub fn reserved(&self) -> Capacity {
        self.assignments.iter().map(|a| a.capacity()).sum()
    }

    /// Wall time between start and end, if the job ran.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at_ms, self.ended_at_ms) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_critical_highest() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn enums_parse_from_names() {
        assert_eq!("on-premise".parse::<Provider>().unwrap(), Provider::OnPremise);
        assert_eq!("fine-tuning".parse::<JobType>().unwrap(), JobType::FineTuning);
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!(Provider::OnPremise.to_string(), "on-premise");
    }

    #[test]
    fn unknown_enum_name_is_rejected() {
        let err = "urgent".parse::<Priority>().unwrap_err();
        assert_eq!(
            err,
            PoolError::UnknownVariant {
                kind: "priority",
                value: "urgent".to_string()
            }
        );
    }

    #[test]
    fn serde_names_match_display_names() {
        let json = serde_json::to_string(&Provider::OnPremise).unwrap();
        assert_eq!(json, "\"on-premise\"");
        let json = serde_json::to_string(&JobType::FineTuning).unwrap();
        assert_eq!(json, "\"fine-tuning\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn node_free_capacity_and_busy_flag() {
        let mut node = Node::new(
            "n1",
            "a100",
            NodeCapacity {
                gpu_count: 8,
                memory_gb: 640,
                cpu_cores: 96,
                network_bandwidth_gbps: 100,
            },
        );
        assert!(!node.is_busy());
        assert_eq!(node.free(), Capacity::new(8, 640));

        node.reserved = Capacity::new(3, 100);
        node.assigned_jobs.insert("job-1".to_string());
        assert!(node.is_busy());
        assert_eq!(node.free(), Capacity::new(5, 540));
    }

    #[test]
    fn cluster_capacity_sums_nodes() {
        let cap = NodeCapacity {
            gpu_count: 8,
            memory_gb: 512,
            ..Default::default()
        };
        let mut cluster = Cluster::new("c1", Provider::Aws, "us-east-1")
            .with_node(Node::new("n1", "a100", cap))
            .with_node(Node::new("n2", "a100", cap));
        cluster.nodes[0].reserved = Capacity::new(4, 100);

        assert_eq!(cluster.total_capacity(), Capacity::new(16, 1024));
        assert_eq!(cluster.available_capacity(), Capacity::new(12, 924));
        assert_eq!(cluster.reserved_capacity(), Capacity::new(4, 100));
    }

    #[test]
    fn job_duration_requires_start_and_end() {
        let spec = JobSpec::new(
            JobType::Training,
            Priority::High,
            ResourceRequirements::new(1, 8),
        );
        let mut job = Job::new("job-1", 1, spec, 1_000);
        assert_eq!(job.duration_ms(), None);
        job.started_at_ms = Some(2_000);
        job.ended_at_ms = Some(5_500);
        assert_eq!(job.duration_ms(), Some(3_500));
    }
}
