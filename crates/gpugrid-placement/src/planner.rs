//! Allocation planning — turns a ranked node list into reservations.
//!
//! 1. The best-ranked node that can hold the whole job wins.
//! 2. Otherwise, if the job may span nodes, GPUs are packed greedily in
//!    rank order, memory split in proportion to GPUs.
//! 3. If neither works the job does not fit and stays queued.

use tracing::debug;

use gpugrid_state::{Allocation, NodeId, NodeView, ResourceRequirements};

/// Allocations chosen for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub allocations: Vec<Allocation>,
}

impl Placement {
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.allocations.iter().map(|a| a.node_id.clone()).collect()
    }

    pub fn gpu_count(&self) -> u32 {
        self.allocations.iter().map(|a| a.gpu_count).sum()
    }
}

pub fn plan_allocation(ranked: &[&NodeView], req: &ResourceRequirements) -> Option<Placement> {
    let whole = req.capacity();
    if let Some(node) = ranked.iter().find(|n| n.free.covers(&whole)) {
        return Some(Placement {
            allocations: vec![Allocation::new(&node.id, req.gpu_count, req.memory_gb)],
        });
    }

    if req.max_nodes <= 1 || req.gpu_count == 0 {
        return None;
    }

    let mut remaining_gpus = req.gpu_count;
    let mut remaining_memory = req.memory_gb;
    let mut allocations = Vec::new();

    for node in ranked {
        if remaining_gpus == 0 || allocations.len() as u32 >= req.max_nodes {
            break;
        }
        let take = node.free.gpu_count.min(remaining_gpus);
        if take == 0 {
            continue;
        }
        // The last slice absorbs the rounding remainder.
        let memory = if take == remaining_gpus {
            remaining_memory
        } else {
            req.memory_gb * u64::from(take) / u64::from(req.gpu_count)
        };
        if node.free.memory_gb < memory {
            continue;
        }
        allocations.push(Allocation::new(&node.id, take, memory));
        remaining_gpus -= take;
        remaining_memory -= memory;
    }

    if remaining_gpus > 0 {
        debug!(
            needed = req.gpu_count,
            short = remaining_gpus,
            "not enough spread capacity for multi-node placement"
        );
        return None;
    }

    Some(Placement { allocations })
}
