//! gpugrid-state — the resource pool for GpuGrid.
//!
//! Holds the registry of clusters and their nodes together with the
//! authoritative capacity counters. Reservations are keyed by job id, so
//! the counters can always be rebuilt from the allocations recorded on
//! running jobs.
//!
//! # Architecture
//!
//! ```text
//! ResourcePool
//!   ├── clusters: id → Cluster (ordered nodes)
//!   ├── node_index: node id → cluster id
//!   ├── reservations: job id → [Allocation]
//!   └── EventBus (cluster/node lifecycle events)
//! ```
//!
//! `ResourcePool` itself is not synchronized. The scheduler owns it behind
//! a single lock so check-then-reserve is atomic.

pub mod clock;
pub mod error;
pub mod events;
pub mod pool;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PoolError, PoolResult};
pub use events::{EventBus, GridEvent};
pub use pool::{ClusterView, NodeView, PoolSnapshot, ResourcePool};
pub use types::*;
