//! gpugrid-health — node health monitoring for GpuGrid.
//!
//! Samples each node's metrics on a fixed interval, compares them with
//! the configured thresholds and flips the node between `healthy` and
//! `degraded` through the scheduler, so eligibility changes go through
//! the same lock as placements.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── MetricsSource (last reported metrics, or a seeded simulation)
//!   ├── Per-node HealthTracker (consecutive-sample debounce)
//!   ├── Scheduler::transition_node_health (compare-and-set)
//!   └── Optional HealthCallback for external observers
//! ```
//!
//! Degraded nodes keep their running jobs; they just stop receiving new
//! placements. `unhealthy` and `maintenance` are set by operators and the
//! monitor leaves those nodes alone.

pub mod checker;
pub mod monitor;
pub mod source;

pub use checker::{HealthTracker, Verdict, assess};
pub use monitor::{HealthCallback, HealthChange, HealthMonitor};
pub use source::{MetricsSource, ReportedMetrics, SimulatedMetrics};
