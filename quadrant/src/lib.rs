//! # Quadrant - In-Memory 2-D Spatial Index
//!
//! This crate provides an in-memory R-tree over axis-aligned rectangles,
//! built for fast intersection queries, low memory use and fast insertion.
//!
//! ## Features
//!
//! - **Main-Memory Only**: no pager, no persistence, no I/O of any kind
//! - **Structural Node Layout**: entries live in parallel primitive arrays,
//!   reorganised in place on splits to keep allocation and indirection low
//! - **Guttman Quadratic Splits**: the classic R-tree splitting algorithm
//! - **Three Query Families**: rectangle intersection, rectangle
//!   containment, and k-nearest-neighbour to a point with tie preservation
//! - **Streaming Results**: matches are pushed to a callback sink; the index
//!   never materialises a result list
//! - **Node Reuse**: deleted node ids are parked on a free list and recycled
//!
//! ## Quick Start
//!
//! ```rust
//! use quadrant::{Point, RTree, Rectangle};
//!
//! let mut tree = RTree::new();
//!
//! // Index some rectangles by id
//! tree.add(&Rectangle::new(0.0, 0.0, 10.0, 10.0), 1).unwrap();
//! tree.add(&Rectangle::new(20.0, 20.0, 30.0, 30.0), 2).unwrap();
//!
//! // Stream everything intersecting a query window
//! let mut found = Vec::new();
//! tree.intersects(&Rectangle::new(5.0, 5.0, 25.0, 25.0), &mut |id| {
//!     found.push(id);
//!     true
//! });
//! assert_eq!(found.len(), 2);
//!
//! // Nearest neighbour to a point
//! let mut nearest = Vec::new();
//! tree.nearest(&Point::new(12.0, 12.0), &mut |id| {
//!     nearest.push(id);
//!     true
//! }, f64::INFINITY);
//! assert_eq!(nearest, vec![1]);
//! ```
//!
//! ## Concurrency
//!
//! The tree is single-threaded by design: queries reuse scratch buffers
//! owned by the tree, so every operation takes `&mut self` and the borrow
//! checker enforces exclusive access. Wrap the tree in a lock or give each
//! thread its own instance if you need sharing.

pub mod point;
pub mod priority_queue;
pub mod rectangle;
pub mod rtree;
pub mod sorted_list;
pub mod spatial_index;

// Re-export the public surface
pub use point::Point;
pub use priority_queue::{PriorityQueue, SortOrder};
pub use rectangle::Rectangle;
pub use rtree::{RTree, RTreeConfig, RTreeStats, SpatialError, SpatialResult};
pub use sorted_list::SortedList;
pub use spatial_index::SpatialIndex;
