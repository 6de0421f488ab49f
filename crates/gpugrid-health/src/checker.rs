//! Threshold checks and per-node debounce.

use tracing::debug;

use gpugrid_core::HealthConfig;
use gpugrid_state::{HealthStatus, NodeMetrics};

/// Outcome of checking one metrics sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Healthy,
    /// At least one threshold was breached; `reason` names them.
    Degraded { reason: String },
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }

    pub fn reason(&self) -> &str {
        match self {
            Verdict::Healthy => "metrics within thresholds",
            Verdict::Degraded { reason } => reason,
        }
    }
}

/// Compare a sample against the configured limits. Limits are exclusive:
/// a value exactly at the threshold is healthy.
pub fn assess(metrics: &NodeMetrics, config: &HealthConfig) -> Verdict {
    let mut breaches = Vec::new();

    for (name, value) in [
        ("cpu", metrics.cpu_utilization),
        ("memory", metrics.memory_utilization),
        ("gpu", metrics.gpu_utilization),
    ] {
        if value > config.max_utilization {
            breaches.push(format!(
                "{name} utilization {value:.1}% > {}%",
                config.max_utilization
            ));
        }
    }
    if metrics.temperature_c > config.max_temperature {
        breaches.push(format!(
            "temperature {:.1}C > {}C",
            metrics.temperature_c, config.max_temperature
        ));
    }
    if metrics.error_rate > config.max_error_rate {
        breaches.push(format!(
            "error rate {:.3} > {}",
            metrics.error_rate, config.max_error_rate
        ));
    }
    if metrics.latency_ms > config.max_latency_ms {
        breaches.push(format!(
            "latency {:.0}ms > {}ms",
            metrics.latency_ms, config.max_latency_ms
        ));
    }

    if breaches.is_empty() {
        Verdict::Healthy
    } else {
        Verdict::Degraded {
            reason: breaches.join("; "),
        }
    }
}

/// Tracks consecutive samples for a single node.
///
/// With both thresholds at 1 a single sample flips the status.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    status: HealthStatus,
    consecutive_breaches: u32,
    consecutive_clean: u32,
    degrade_after: u32,
    recover_after: u32,
}

impl HealthTracker {
    pub fn new(initial: HealthStatus, degrade_after: u32, recover_after: u32) -> Self {
        Self {
            status: initial,
            consecutive_breaches: 0,
            consecutive_clean: 0,
            degrade_after: degrade_after.max(1),
            recover_after: recover_after.max(1),
        }
    }

    pub fn from_config(initial: HealthStatus, config: &HealthConfig) -> Self {
        Self::new(initial, config.degrade_after, config.recover_after)
    }

    /// Adopt a status set elsewhere (operator override, another monitor)
    /// and restart counting from it.
    pub fn sync(&mut self, observed: HealthStatus) {
        if observed != self.status {
            self.status = observed;
            self.consecutive_breaches = 0;
            self.consecutive_clean = 0;
        }
    }

    /// Record a sample and return the status the node should have.
    pub fn record(&mut self, verdict: &Verdict) -> HealthStatus {
        if verdict.is_healthy() {
            self.consecutive_breaches = 0;
            self.consecutive_clean += 1;
            if self.status == HealthStatus::Degraded && self.consecutive_clean >= self.recover_after
            {
                debug!(samples = self.consecutive_clean, "node back within thresholds");
                self.status = HealthStatus::Healthy;
            }
        } else {
            self.consecutive_clean = 0;
            self.consecutive_breaches += 1;
            if self.status == HealthStatus::Healthy
                && self.consecutive_breaches >= self.degrade_after
            {
                debug!(
                    samples = self.consecutive_breaches,
                    threshold = self.degrade_after,
                    "node breached thresholds"
                );
                self.status = HealthStatus::Degraded;
            }
        }
        self.status
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_breaches(&self) -> u32 {
        self.consecutive_breaches
    }
}
