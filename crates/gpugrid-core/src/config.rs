//! gpugrid.toml configuration parser.
//!
//! All sections are optional. A missing section (or an empty file) yields
//! the defaults below, so the daemon can start without any config at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

/// Strategy names accepted by `[scheduler] strategy` and per-job overrides.
pub const STRATEGY_NAMES: &[&str] = &[
    "round-robin",
    "least-loaded",
    "performance-based",
    "cost-optimized",
    "latency-optimized",
    "hybrid",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub scheduler: SchedulerConfig,
    pub placement: PlacementConfig,
    pub health: HealthConfig,
    pub autoscale: AutoscaleConfig,
    /// Static cluster inventory registered at startup.
    pub clusters: Vec<ClusterSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Active placement strategy name.
    pub strategy: String,
    /// Submissions beyond this many queued jobs are rejected.
    pub max_queue_len: usize,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: "least-loaded".to_string(),
            max_queue_len: 10_000,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    pub cost_optimization: bool,
    pub latency_optimization: bool,
    /// Hourly per-GPU rate overrides keyed by provider name
    /// (`aws`, `gcp`, `azure`, `on-premise`).
    pub provider_rates: BTreeMap<String, f64>,
    /// Rate used for providers missing from both the override table and
    /// the built-in table.
    pub default_rate: f64,
    pub weights: HybridWeights,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            cost_optimization: true,
            latency_optimization: true,
            provider_rates: BTreeMap::new(),
            default_rate: 2.5,
            weights: HybridWeights::default(),
        }
    }
}

impl PlacementConfig {
    /// Hybrid weights with the optimization flags applied: a disabled flag
    /// zeroes the matching weight.
    pub fn effective_weights(&self) -> HybridWeights {
        let mut weights = self.weights.clone();
        if !self.cost_optimization {
            weights.cost = 0.0;
        }
        if !self.latency_optimization {
            weights.latency = 0.0;
        }
        weights
    }
}

/// Coefficients for the hybrid strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HybridWeights {
    pub performance: f64,
    pub cost: f64,
    pub latency: f64,
    pub data_locality: f64,
    pub load: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            performance: 0.3,
            cost: 0.25,
            latency: 0.2,
            data_locality: 0.1,
            load: 0.15,
        }
    }
}

impl HybridWeights {
    fn values(&self) -> [f64; 5] {
        [
            self.performance,
            self.cost,
            self.latency,
            self.data_locality,
            self.load,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    /// Percent, applied to cpu, memory and gpu utilization.
    pub max_utilization: f64,
    /// Degrees Celsius.
    pub max_temperature: f64,
    /// Fraction of failed operations (0.0–1.0).
    pub max_error_rate: f64,
    pub max_latency_ms: f64,
    /// Consecutive breaching samples before healthy -> degraded.
    pub degrade_after: u32,
    /// Consecutive clean samples before degraded -> healthy.
    pub recover_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            max_utilization: 95.0,
            max_temperature: 80.0,
            max_error_rate: 0.1,
            max_latency_ms: 1000.0,
            degrade_after: 1,
            recover_after: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Average load (0.0–1.0) above which the pool should grow.
    pub threshold: f64,
    pub min_nodes: u32,
    pub max_nodes: u32,
    /// Queue length above which the pool should grow regardless of load.
    pub queue_depth_trigger: usize,
    pub scale_up_cooldown_ms: u64,
    pub scale_down_cooldown_ms: u64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
            threshold: 0.8,
            min_nodes: 1,
            max_nodes: 64,
            queue_depth_trigger: 5,
            scale_up_cooldown_ms: 0,
            scale_down_cooldown_ms: 0,
        }
    }
}

/// A cluster declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSeed {
    pub id: String,
    pub provider: String,
    pub region: String,
    #[serde(default = "default_cluster_status")]
    pub status: String,
    #[serde(default)]
    pub nodes: Vec<NodeSeed>,
}

fn default_cluster_status() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSeed {
    pub id: String,
    pub gpu_type: String,
    pub gpu_count: u32,
    pub memory_gb: u64,
    #[serde(default)]
    pub cpu_cores: u32,
    #[serde(default)]
    pub network_bandwidth_gbps: u32,
    #[serde(default)]
    pub base_latency_ms: f64,
    /// Relative compute throughput (e.g. TFLOPS).
    #[serde(default = "default_throughput")]
    pub compute_throughput: f64,
}

fn default_throughput() -> f64 {
    1.0
}

impl GridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: GridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if !STRATEGY_NAMES.contains(&self.scheduler.strategy.as_str())
            && self.scheduler.strategy != "hybrid-weighted"
        {
            return Err(ConfigError::Invalid(format!(
                "unknown strategy '{}'",
                self.scheduler.strategy
            )));
        }
        if self.scheduler.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be > 0".into()));
        }
        if self.autoscale.min_nodes > self.autoscale.max_nodes {
            return Err(ConfigError::Invalid(format!(
                "autoscale min_nodes ({}) exceeds max_nodes ({})",
                self.autoscale.min_nodes, self.autoscale.max_nodes
            )));
        }
        if self.autoscale.threshold < 0.0 {
            return Err(ConfigError::Invalid("autoscale threshold is negative".into()));
        }
        if self.placement.weights.values().iter().any(|w| *w < 0.0) {
            return Err(ConfigError::Invalid("hybrid weights must be >= 0".into()));
        }
        if self.placement.default_rate < 0.0
            || self.placement.provider_rates.values().any(|r| *r < 0.0)
        {
            return Err(ConfigError::Invalid("provider rates must be >= 0".into()));
        }
        if self.health.degrade_after == 0 || self.health.recover_after == 0 {
            return Err(ConfigError::Invalid(
                "health degrade_after/recover_after must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = GridConfig::from_toml_str("").unwrap();
        assert_eq!(config, GridConfig::default());
        assert_eq!(config.scheduler.strategy, "least-loaded");
        assert_eq!(config.health.max_temperature, 80.0);
        assert_eq!(config.autoscale.queue_depth_trigger, 5);
    }

    #[test]
    fn parses_partial_sections() {
        let toml_str = r#"
[scheduler]
strategy = "cost-optimized"

[placement]
cost_optimization = false
default_rate = 3.0

[placement.provider_rates]
aws = 4.1

[autoscale]
min_nodes = 2
max_nodes = 8
"#;
        let config = GridConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.scheduler.strategy, "cost-optimized");
        assert_eq!(config.scheduler.max_queue_len, 10_000);
        assert_eq!(config.placement.provider_rates.get("aws"), Some(&4.1));
        assert_eq!(config.placement.effective_weights().cost, 0.0);
        assert!(config.placement.effective_weights().latency > 0.0);
        assert_eq!(config.autoscale.min_nodes, 2);
        assert!(config.autoscale.enabled);
    }

    #[test]
    fn parses_cluster_inventory() {
        let toml_str = r#"
[[clusters]]
id = "us-east"
provider = "aws"
region = "us-east-1"

[[clusters.nodes]]
id = "n1"
gpu_type = "a100"
gpu_count = 8
memory_gb = 640
"#;
        let config = GridConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.clusters.len(), 1);
        let cluster = &config.clusters[0];
        assert_eq!(cluster.status, "active");
        assert_eq!(cluster.nodes[0].gpu_count, 8);
        assert_eq!(cluster.nodes[0].compute_throughput, 1.0);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let err = GridConfig::from_toml_str("[scheduler]\nstrategy = \"fastest\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("fastest")));
    }

    #[test]
    fn rejects_inverted_node_bounds() {
        let err =
            GridConfig::from_toml_str("[autoscale]\nmin_nodes = 10\nmax_nodes = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_weight() {
        let err = GridConfig::from_toml_str("[placement.weights]\ncost = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = GridConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = GridConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
