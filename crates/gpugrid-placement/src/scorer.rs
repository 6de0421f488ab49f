//! Node scoring for placement decisions.
//!
//! Scores are computed against `NodeView` snapshots:
//! - **Performance**: `0.4·freeGpu + 0.3·freeMemory + 0.3·throughput`
//! - **Cost**: `rate(provider) × gpus × hours` (lower is better)
//! - **Latency**: `base + 1000ms per queued job + 50ms locality penalty`
//! - **Load**: fraction of reservable capacity still free
//!
//! `admits` applies the hard constraints every strategy shares.

use std::collections::BTreeMap;

use gpugrid_core::{HybridWeights, PlacementConfig};
use gpugrid_state::{Job, NodeView, Provider};

/// Penalty applied when a job's data lives outside the node's region.
pub const LOCALITY_PENALTY_MS: f64 = 50.0;

/// Latency charged per job already running on a node.
pub const QUEUE_PENALTY_MS: f64 = 1000.0;

/// Hourly per-GPU price by provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRates {
    overrides: BTreeMap<String, f64>,
    default_rate: f64,
}

impl ProviderRates {
    pub fn new(overrides: BTreeMap<String, f64>, default_rate: f64) -> Self {
        Self {
            overrides,
            default_rate,
        }
    }

    /// Override table, then the built-in table, then the default.
    pub fn rate_for(&self, provider: Provider) -> f64 {
        if let Some(rate) = self.overrides.get(provider.as_str()) {
            return *rate;
        }
        base_rate(provider).unwrap_or(self.default_rate)
    }
}

impl Default for ProviderRates {
    fn default() -> Self {
        Self::new(BTreeMap::new(), 2.5)
    }
}

fn base_rate(provider: Provider) -> Option<f64> {
    match provider {
        Provider::Aws => Some(3.06),
        Provider::Gcp => Some(2.93),
        Provider::Azure => Some(3.40),
        // Owned hardware has no list price; the configured default applies.
        Provider::OnPremise => None,
    }
}

/// Static inputs shared by the strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementContext {
    pub rates: ProviderRates,
    pub weights: HybridWeights,
}

impl PlacementContext {
    pub fn from_config(config: &PlacementConfig) -> Self {
        Self {
            rates: ProviderRates::new(config.provider_rates.clone(), config.default_rate),
            weights: config.effective_weights(),
        }
    }

    /// Hard constraints: eligibility, capability, capacity, budget, latency.
    pub fn admits(&self, node: &NodeView, job: &Job) -> bool {
        let req = job.requirements();

        if !node.is_placeable() {
            return false;
        }
        if let Some(gpu_type) = &req.gpu_type
            && !node.gpu_type.eq_ignore_ascii_case(gpu_type)
        {
            return false;
        }
        if !req.regions.is_empty() && !req.regions.iter().any(|r| r == &node.region) {
            return false;
        }
        if !req.providers.is_empty() && !req.providers.contains(&node.provider) {
            return false;
        }
        if !has_room(node, job) {
            return false;
        }
        if let Some(budget) = job.spec.cost_budget
            && estimated_cost(node, job, &self.rates) > budget
        {
            return false;
        }
        if let Some(max_latency) = req.max_latency_ms
            && latency_estimate(node, job) > max_latency
        {
            return false;
        }
        true
    }
}

/// Single-node jobs need the whole requirement on one node; jobs that
/// may span nodes only need some free GPU here.
fn has_room(node: &NodeView, job: &Job) -> bool {
    let req = job.requirements();
    if req.max_nodes <= 1 {
        node.free.covers(&req.capacity())
    } else {
        node.free.gpu_count > 0
    }
}

pub fn performance_score(node: &NodeView, max_throughput: f64) -> f64 {
    let throughput = if max_throughput > 0.0 {
        (node.compute_throughput / max_throughput).clamp(0.0, 1.0)
    } else {
        0.0
    };
    0.4 * node.free_gpu_ratio() + 0.3 * node.free_memory_ratio() + 0.3 * throughput
}

pub fn max_throughput(nodes: &[&NodeView]) -> f64 {
    nodes
        .iter()
        .map(|n| n.compute_throughput)
        .fold(0.0, f64::max)
}

/// Estimated cost of running the whole job at this node's provider rate.
pub fn estimated_cost(node: &NodeView, job: &Job, rates: &ProviderRates) -> f64 {
    let hours = job.spec.estimated_duration_secs as f64 / 3600.0;
    rates.rate_for(node.provider) * f64::from(job.requirements().gpu_count) * hours
}

pub fn locality_satisfied(node: &NodeView, job: &Job) -> bool {
    match &job.requirements().data_locality {
        None => true,
        Some(place) => place == &node.region || place == &node.cluster_id,
    }
}

/// Expected time-to-start in milliseconds.
pub fn latency_estimate(node: &NodeView, job: &Job) -> f64 {
    let locality = if locality_satisfied(node, job) {
        0.0
    } else {
        LOCALITY_PENALTY_MS
    };
    node.base_latency_ms + node.queue_length as f64 * QUEUE_PENALTY_MS + locality
}
