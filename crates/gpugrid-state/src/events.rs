//! Lifecycle event stream.
//!
//! The `EventBus` is an explicit broadcast channel handed to the pool and
//! the scheduler. External observers (UI, logs, metrics) call `subscribe()`.
//! Emitting never blocks; a slow subscriber lags and loses old events.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{ClusterId, JobId, NodeId, Priority};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GridEvent {
    ClusterAdded {
        cluster_id: ClusterId,
    },
    ClusterRemoved {
        cluster_id: ClusterId,
    },
    NodeAdded {
        cluster_id: ClusterId,
        node_id: NodeId,
    },
    NodeRemoved {
        cluster_id: ClusterId,
        node_id: NodeId,
    },
    NodeDegraded {
        node_id: NodeId,
        reason: String,
    },
    NodeRecovered {
        node_id: NodeId,
    },
    JobSubmitted {
        job_id: JobId,
        priority: Priority,
    },
    JobStarted {
        job_id: JobId,
        nodes: Vec<NodeId>,
    },
    JobProgress {
        job_id: JobId,
        progress: u8,
    },
    JobCompleted {
        job_id: JobId,
        duration_ms: u64,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },
    JobCancelled {
        job_id: JobId,
    },
    ScalingUp {
        node_count: usize,
        target_nodes: usize,
        queue_length: usize,
        avg_utilization: f64,
    },
    ScalingDown {
        node_count: usize,
        target_nodes: usize,
        queue_length: usize,
        avg_utilization: f64,
    },
}

impl GridEvent {
    /// Wire name of the event, as used in the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            GridEvent::ClusterAdded { .. } => "clusterAdded",
            GridEvent::ClusterRemoved { .. } => "clusterRemoved",
            GridEvent::NodeAdded { .. } => "nodeAdded",
            GridEvent::NodeRemoved { .. } => "nodeRemoved",
            GridEvent::NodeDegraded { .. } => "nodeDegraded",
            GridEvent::NodeRecovered { .. } => "nodeRecovered",
            GridEvent::JobSubmitted { .. } => "jobSubmitted",
            GridEvent::JobStarted { .. } => "jobStarted",
            GridEvent::JobProgress { .. } => "jobProgress",
            GridEvent::JobCompleted { .. } => "jobCompleted",
            GridEvent::JobFailed { .. } => "jobFailed",
            GridEvent::JobCancelled { .. } => "jobCancelled",
            GridEvent::ScalingUp { .. } => "scalingUp",
            GridEvent::ScalingDown { .. } => "scalingDown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GridEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: GridEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(event = name, "no subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
