//! Error types for the navigation pipeline

use thiserror::Error;

use crate::nav::PathError;
use crate::octree::NodeKey;

/// Main error type for octonav
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Malformed mesh input. Fatal for that mesh only.
    #[error("Mesh '{mesh}', triangle {triangle}: {reason}")]
    Generation {
        mesh: String,
        triangle: usize,
        reason: String,
    },

    /// A partial index could not be merged without losing information.
    #[error("Merge invariant violated at node {key}: {reason}")]
    MergeInvariant { key: NodeKey, reason: String },

    #[error("Corrupt index data: {0}")]
    Persist(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Build worker stopped without reporting a result")]
    WorkerLost,

    #[error(transparent)]
    Path(#[from] PathError),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
