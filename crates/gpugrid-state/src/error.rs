//! Error types for the resource pool.

use thiserror::Error;

use crate::types::Capacity;

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("cluster already registered: {0}")]
    DuplicateCluster(String),

    #[error("node already registered: {0}")]
    DuplicateNode(String),

    #[error("job already holds a reservation: {0}")]
    AlreadyReserved(String),

    #[error("insufficient capacity on node {node_id}: requested {requested}, free {free}")]
    InsufficientCapacity {
        node_id: String,
        requested: Capacity,
        free: Capacity,
    },

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
