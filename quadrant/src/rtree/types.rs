//! Core types for the in-memory R-Tree: errors, results and statistics.

use thiserror::Error;

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// An internal invariant was found broken (dangling child pointer,
    /// stale bounding rectangle, wrong level). The tree must be considered
    /// corrupt and the behaviour of further operations is undefined.
    #[error("Index corrupted: {0}")]
    Corruption(String),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Statistics about the current shape of an R-Tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RTreeStats {
    /// Number of indexed entries
    pub entries: usize,
    /// Height of the tree; leaves are at level 1
    pub height: usize,
    /// Nodes held in the node table, live or reusable
    pub nodes: usize,
    /// Node ids currently parked on the free list
    pub free_nodes: usize,
}
