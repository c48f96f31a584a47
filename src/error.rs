//! Error types for graph construction and clustering

use thiserror::Error;

use crate::graph::{EdgeId, NodeId};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the graph store, the proximity builder and the clustering engines.
///
/// Parameter errors are raised before any work starts. The remaining variants
/// signal a broken invariant or a missing collaborator and are never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is outside its accepted range
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    /// A structural invariant was violated (asymmetric adjacency, count mismatch, unassigned label)
    #[error("inconsistent state: {0}")]
    Inconsistency(String),

    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    #[error("edge {0} does not exist")]
    MissingEdge(EdgeId),

    #[error("report {0} not found in the report store")]
    MissingReport(NodeId),

    /// A worker task of the parallel builder failed, or the pool could not be created
    #[error("worker task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::Task(err.to_string())
    }
}
