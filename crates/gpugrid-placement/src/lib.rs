//! gpugrid-placement — pluggable placement strategies.
//!
//! A strategy is a pure selection over a candidate list: given the nodes
//! the scheduler considers eligible and a job, it returns the allocations
//! to reserve, or `None` when nothing fits (the job stays queued).
//!
//! # Components
//!
//! - **`scorer`** — per-node scores and hard-constraint checks
//! - **`planner`** — turns a ranked node list into allocations
//! - **`strategy`** — the `PlacementStrategy` trait and its six variants
//! - **`registry`** — builds every strategy once and resolves them by name

pub mod planner;
pub mod registry;
pub mod scorer;
pub mod strategy;

pub use planner::{Placement, plan_allocation};
pub use registry::StrategyRegistry;
pub use scorer::{PlacementContext, ProviderRates};
pub use strategy::{
    CostOptimized, HybridWeighted, LatencyOptimized, LeastLoaded, PerformanceBased,
    PlacementError, PlacementStrategy, RoundRobin, StrategyKind,
};
