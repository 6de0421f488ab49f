//! Scheduler error types.

use thiserror::Error;

use gpugrid_placement::PlacementError;
use gpugrid_state::PoolError;

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("invalid job spec: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error(transparent)]
    UnknownStrategy(#[from] PlacementError),

    #[error("resource pool error: {0}")]
    Pool(PoolError),
}

impl From<PoolError> for SchedulerError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::ClusterNotFound(id) => SchedulerError::ClusterNotFound(id),
            PoolError::NodeNotFound(id) => SchedulerError::NodeNotFound(id),
            e @ PoolError::InsufficientCapacity { .. } => {
                SchedulerError::InsufficientCapacity(e.to_string())
            }
            e @ PoolError::UnknownVariant { .. } => SchedulerError::Validation(e.to_string()),
            other => SchedulerError::Pool(other),
        }
    }
}

impl SchedulerError {
    /// Unknown cluster, node, or job.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::JobNotFound(_)
                | SchedulerError::ClusterNotFound(_)
                | SchedulerError::NodeNotFound(_)
        )
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
