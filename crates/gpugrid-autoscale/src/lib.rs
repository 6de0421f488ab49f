//! gpugrid-autoscale — advisory scaling signals.
//!
//! Reads the scheduler's `LoadSummary` on a fixed interval and decides
//! whether the pool should grow or shrink. Decisions are published as
//! `scalingUp`/`scalingDown` events and handed to an optional callback;
//! provisioning itself happens elsewhere.
//!
//! # Scaling Algorithm
//!
//! ```text
//! grow   if (avg_load > threshold or queue > queue_depth_trigger)
//!           and nodes < max_nodes
//!        target = clamp(max(nodes + 1, ceil(nodes * avg_load / threshold)), max_nodes)
//!
//! shrink if avg_load < threshold / 2 and queue == 0 and nodes > min_nodes
//!        target = nodes - 1
//! ```
//!
//! Cooldown windows (`scale_up_cooldown_ms`, `scale_down_cooldown_ms`)
//! suppress repeated signals in the same direction.

pub mod scaler;

pub use scaler::{AutoScaler, ScaleCallback, ScaleDecision, ScaleFuture, decide};
