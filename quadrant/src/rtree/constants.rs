//! Constants for the in-memory R-Tree.

/// Maximum entries per node for a default-configured tree
pub const DEFAULT_MAX_NODE_ENTRIES: usize = 50;

/// Minimum entries per node for a default-configured tree
pub const DEFAULT_MIN_NODE_ENTRIES: usize = 20;

/// Fallback maximum when an explicit configuration is invalid. A node with
/// fewer than two entries cannot be split; the splitting algorithm works
/// with only two entries per node but is inefficient.
pub const FALLBACK_MAX_NODE_ENTRIES: usize = 10;

/// Entry assigned to a split group
pub(crate) const ENTRY_STATUS_ASSIGNED: u8 = 0;

/// Entry still awaiting distribution during a split
pub(crate) const ENTRY_STATUS_UNASSIGNED: u8 = 1;
