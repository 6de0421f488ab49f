//! Where metric samples come from.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpugrid_state::{NodeMetrics, NodeView};

pub trait MetricsSource: Send + Sync {
    fn sample(&self, node: &NodeView) -> NodeMetrics;

    /// Whether samples should be written back to the pool. Sources that
    /// read the pool's own metrics return `false`.
    fn publishes(&self) -> bool {
        true
    }
}

/// Uses the metrics last reported through `Scheduler::record_metrics`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportedMetrics;

impl MetricsSource for ReportedMetrics {
    fn sample(&self, node: &NodeView) -> NodeMetrics {
        node.metrics
    }

    fn publishes(&self) -> bool {
        false
    }
}

/// Random metrics for demos and soak tests. Most samples sit well inside
/// the default thresholds; a few breach them.
#[derive(Debug)]
pub struct SimulatedMetrics {
    rng: Mutex<StdRng>,
}

impl SimulatedMetrics {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl MetricsSource for SimulatedMetrics {
    fn sample(&self, node: &NodeView) -> NodeMetrics {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Busier nodes run hotter.
        let load = node.load() * 100.0;
        NodeMetrics {
            cpu_utilization: rng.gen_range(10.0..70.0) + load * 0.25,
            memory_utilization: rng.gen_range(20.0..60.0) + load * 0.35,
            gpu_utilization: (load + rng.gen_range(-5.0..8.0)).clamp(0.0, 100.0),
            temperature_c: rng.gen_range(45.0..70.0) + load * 0.15,
            power_watts: rng.gen_range(150.0..250.0) + load * 4.0,
            error_rate: rng.gen_range(0.0..0.12),
            latency_ms: rng.gen_range(5.0..120.0),
        }
    }
}
