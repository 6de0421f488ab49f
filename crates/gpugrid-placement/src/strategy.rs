//! Placement strategies.
//!
//! Every strategy shares the same filter (`PlacementContext::admits`) and
//! planner (`plan_allocation`); they differ only in how they rank the
//! capable candidates. Sorting is stable, so equal scores keep the
//! candidate order the scheduler passed in.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

use gpugrid_state::{Job, NodeView};

use crate::planner::{Placement, plan_allocation};
use crate::scorer::{
    PlacementContext, estimated_cost, latency_estimate, locality_satisfied, max_throughput,
    performance_score,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("unknown placement strategy: {0}")]
    UnknownStrategy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    RoundRobin,
    LeastLoaded,
    PerformanceBased,
    CostOptimized,
    LatencyOptimized,
    Hybrid,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::RoundRobin,
        StrategyKind::LeastLoaded,
        StrategyKind::PerformanceBased,
        StrategyKind::CostOptimized,
        StrategyKind::LatencyOptimized,
        StrategyKind::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round-robin",
            StrategyKind::LeastLoaded => "least-loaded",
            StrategyKind::PerformanceBased => "performance-based",
            StrategyKind::CostOptimized => "cost-optimized",
            StrategyKind::LatencyOptimized => "latency-optimized",
            StrategyKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = PlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(StrategyKind::RoundRobin),
            "least-loaded" => Ok(StrategyKind::LeastLoaded),
            "performance-based" => Ok(StrategyKind::PerformanceBased),
            "cost-optimized" => Ok(StrategyKind::CostOptimized),
            "latency-optimized" => Ok(StrategyKind::LatencyOptimized),
            "hybrid" | "hybrid-weighted" => Ok(StrategyKind::Hybrid),
            other => Err(PlacementError::UnknownStrategy(other.to_string())),
        }
    }
}

/// A pluggable placement algorithm.
pub trait PlacementStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn context(&self) -> &PlacementContext;

    /// Order capable candidates best-first.
    fn rank<'a>(&self, capable: Vec<&'a NodeView>, job: &Job) -> Vec<&'a NodeView>;

    /// Choose allocations for `job` among `candidates`, or `None` when no
    /// candidate satisfies the job's hard constraints.
    fn select(&self, candidates: &[NodeView], job: &Job) -> Option<Placement> {
        let capable: Vec<&NodeView> = candidates
            .iter()
            .filter(|n| self.context().admits(n, job))
            .collect();
        if capable.is_empty() {
            debug!(job = %job.id, strategy = %self.kind(), "no capable candidates");
            return None;
        }
        let ranked = self.rank(capable, job);
        plan_allocation(&ranked, job.requirements())
    }
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn by_score_asc(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

// ── Round-robin ───────────────────────────────────────────────────

/// Uniform random choice among capable nodes.
///
/// Despite the name this is not sequential; the RNG is injectable so
/// tests can seed it.
pub struct RoundRobin {
    ctx: Arc<PlacementContext>,
    rng: Mutex<StdRng>,
}

impl RoundRobin {
    pub fn new(ctx: Arc<PlacementContext>) -> Self {
        Self {
            ctx,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(ctx: Arc<PlacementContext>, seed: u64) -> Self {
        Self {
            ctx,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl PlacementStrategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn context(&self) -> &PlacementContext {
        &self.ctx
    }

    fn rank<'a>(&self, mut capable: Vec<&'a NodeView>, _job: &Job) -> Vec<&'a NodeView> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        capable.shuffle(&mut *rng);
        capable
    }
}

// ── Least-loaded ──────────────────────────────────────────────────

/// Maximize `available / total`; ties go to the shortest job queue.
pub struct LeastLoaded {
    ctx: Arc<PlacementContext>,
}

impl LeastLoaded {
    pub fn new(ctx: Arc<PlacementContext>) -> Self {
        Self { ctx }
    }
}

impl PlacementStrategy for LeastLoaded {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LeastLoaded
    }

    fn context(&self) -> &PlacementContext {
        &self.ctx
    }

    fn rank<'a>(&self, mut capable: Vec<&'a NodeView>, _job: &Job) -> Vec<&'a NodeView> {
        capable.sort_by(|a, b| {
            by_score_desc(a.free_ratio(), b.free_ratio())
                .then(a.queue_length.cmp(&b.queue_length))
        });
        capable
    }
}

// ── Performance-based ─────────────────────────────────────────────

/// `0.4·freeGpu + 0.3·freeMemory + 0.3·throughput`, highest first.
pub struct PerformanceBased {
    ctx: Arc<PlacementContext>,
}

impl PerformanceBased {
    pub fn new(ctx: Arc<PlacementContext>) -> Self {
        Self { ctx }
    }
}

impl PlacementStrategy for PerformanceBased {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PerformanceBased
    }

    fn context(&self) -> &PlacementContext {
        &self.ctx
    }

    fn rank<'a>(&self, mut capable: Vec<&'a NodeView>, _job: &Job) -> Vec<&'a NodeView> {
        let top = max_throughput(&capable);
        capable.sort_by(|a, b| by_score_desc(performance_score(a, top), performance_score(b, top)));
        capable
    }
}

// ── Cost-optimized ────────────────────────────────────────────────

/// Cheapest estimated run first; equal prices go to the emptier node.
pub struct CostOptimized {
    ctx: Arc<PlacementContext>,
}

impl CostOptimized {
    pub fn new(ctx: Arc<PlacementContext>) -> Self {
        Self { ctx }
    }
}

impl PlacementStrategy for CostOptimized {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CostOptimized
    }

    fn context(&self) -> &PlacementContext {
        &self.ctx
    }

    fn rank<'a>(&self, mut capable: Vec<&'a NodeView>, job: &Job) -> Vec<&'a NodeView> {
        let rates = &self.ctx.rates;
        capable.sort_by(|a, b| {
            by_score_asc(estimated_cost(a, job, rates), estimated_cost(b, job, rates))
                .then(by_score_desc(a.free_ratio(), b.free_ratio()))
        });
        capable
    }
}

// ── Latency-optimized ─────────────────────────────────────────────

/// Lowest expected time-to-start first.
pub struct LatencyOptimized {
    ctx: Arc<PlacementContext>,
}

impl LatencyOptimized {
    pub fn new(ctx: Arc<PlacementContext>) -> Self {
        Self { ctx }
    }
}

impl PlacementStrategy for LatencyOptimized {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LatencyOptimized
    }

    fn context(&self) -> &PlacementContext {
        &self.ctx
    }

    fn rank<'a>(&self, mut capable: Vec<&'a NodeView>, job: &Job) -> Vec<&'a NodeView> {
        capable.sort_by(|a, b| by_score_asc(latency_estimate(a, job), latency_estimate(b, job)));
        capable
    }
}

// ── Hybrid ────────────────────────────────────────────────────────

/// Weighted sum of normalized performance, cost, latency, locality and
/// load scores. Each component is in `0.0..=1.0`, higher is better.
pub struct HybridWeighted {
    ctx: Arc<PlacementContext>,
}

impl HybridWeighted {
    pub fn new(ctx: Arc<PlacementContext>) -> Self {
        Self { ctx }
    }

    fn scores(&self, capable: &[&NodeView], job: &Job) -> Vec<f64> {
        let w = &self.ctx.weights;
        let top = max_throughput(capable);
        let costs: Vec<f64> = capable
            .iter()
            .map(|n| estimated_cost(n, job, &self.ctx.rates))
            .collect();
        let latencies: Vec<f64> = capable.iter().map(|n| latency_estimate(n, job)).collect();
        let min_cost = costs.iter().copied().fold(f64::INFINITY, f64::min);
        let min_latency = latencies.iter().copied().fold(f64::INFINITY, f64::min);

        capable
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let cost = if costs[i] > 0.0 { min_cost / costs[i] } else { 1.0 };
                let latency = (min_latency + 1.0) / (latencies[i] + 1.0);
                let locality = if locality_satisfied(node, job) { 1.0 } else { 0.0 };
                w.performance * performance_score(node, top)
                    + w.cost * cost
                    + w.latency * latency
                    + w.data_locality * locality
                    + w.load * node.free_ratio()
            })
            .collect()
    }
}

impl PlacementStrategy for HybridWeighted {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    fn context(&self) -> &PlacementContext {
        &self.ctx
    }

    fn rank<'a>(&self, capable: Vec<&'a NodeView>, job: &Job) -> Vec<&'a NodeView> {
        let scores = self.scores(&capable, job);
        let mut scored: Vec<(f64, &'a NodeView)> = scores.into_iter().zip(capable).collect();
        scored.sort_by(|a, b| by_score_desc(a.0, b.0));
        scored.into_iter().map(|(_, n)| n).collect()
    }
}
