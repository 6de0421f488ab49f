//! gpugrid-scheduler — job scheduling over the resource pool.
//!
//! The scheduler owns the job queue and the `ResourcePool` behind one
//! lock. Every mutation (submit, progress, complete, fail, cancel, node
//! and cluster changes, health transitions) runs inside that critical
//! section, so check-then-reserve is atomic and the first of two racing
//! terminal transitions wins.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── Mutex<Inner>
//!   │   ├── ResourcePool (capacity counters)
//!   │   ├── jobs: id → Job (history retained until purge)
//!   │   └── JobQueue (priority desc, submission asc)
//!   ├── StrategyRegistry (active strategy + per-job overrides)
//!   ├── EventBus
//!   └── Clock
//! ```
//!
//! A scheduling pass runs after every event that can free capacity or
//! add work: submission, completion, failure, cancellation, node or
//! cluster registration, node recovery. There is no polling loop and no
//! per-job timer; progress is reported by external callers.

pub mod error;
pub mod queue;
pub mod scheduler;
pub mod stats;

pub use error::{SchedulerError, SchedulerResult};
pub use queue::JobQueue;
pub use scheduler::Scheduler;
pub use stats::{ClusterUtilization, LoadSummary, SchedulerStats};
