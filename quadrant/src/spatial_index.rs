//! SpatialIndex trait definition.

use crate::point::Point;
use crate::rectangle::Rectangle;
use crate::rtree::types::SpatialResult;

/// The operations every spatial index in this crate provides.
///
/// Matching entries are streamed to a *sink*: a closure invoked once per
/// matching id which returns `true` to continue or `false` to stop the
/// query early. No result list is ever materialised by the index itself.
///
/// All methods take `&mut self`: queries reuse scratch buffers owned by the
/// index (descent stacks, candidate lists, the distance queue) to avoid
/// per-call allocation, so even read-only operations need exclusive access.
/// Callers wanting shared access must wrap the index in a lock or give each
/// thread its own instance.
pub trait SpatialIndex {
    /// Adds a rectangle with the given id to the index.
    ///
    /// Id uniqueness is not enforced: the same `(rectangle, id)` pair may be
    /// added several times, and each matching [`SpatialIndex::delete`]
    /// removes one occurrence. The id `-1` is reserved and rejected.
    fn add(&mut self, r: &Rectangle, id: i32) -> SpatialResult<()>;

    /// Deletes a rectangle from the index.
    ///
    /// Matches only on exact coordinate equality *and* id equality. Returns
    /// `Ok(false)` if no such entry exists; the index is left unchanged.
    fn delete(&mut self, r: &Rectangle, id: i32) -> SpatialResult<bool>;

    /// Streams the ids of all entries whose rectangle intersects `r`.
    ///
    /// Invocation order is unspecified.
    fn intersects(&mut self, r: &Rectangle, sink: &mut dyn FnMut(i32) -> bool);

    /// Streams the ids of all entries whose rectangle is contained by `r`.
    ///
    /// Invocation order is unspecified.
    fn contains(&mut self, r: &Rectangle, sink: &mut dyn FnMut(i32) -> bool);

    /// Streams every id tied for the minimum distance to `p`.
    ///
    /// `furthest_distance` is a non-squared cutoff; entries further away are
    /// never reported. Use `f64::INFINITY` to guarantee a result on a
    /// non-empty index.
    fn nearest(&mut self, p: &Point, sink: &mut dyn FnMut(i32) -> bool, furthest_distance: f64);

    /// Streams the `count` entries nearest to `p` in ascending distance
    /// order.
    ///
    /// If the entries at positions `count` and `count + 1` of the distance
    /// order are tied, both are reported, so more than `count` ids may be
    /// streamed. `count == 0` reports nothing.
    fn nearest_n(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    );

    /// Like [`SpatialIndex::nearest_n`] but without the final distance sort.
    ///
    /// The reported id *set* is identical to `nearest_n`'s for the same
    /// arguments; skipping the sort is cheaper for callers that do not need
    /// ordering.
    fn nearest_n_unsorted(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    );

    /// Number of entries in the index.
    fn size(&self) -> usize;

    /// The minimum bounding rectangle of all entries, or `None` if the index
    /// is empty.
    fn bounds(&self) -> Option<Rectangle>;

    /// A string identifying the index implementation and its version,
    /// e.g. `"RTree-0.1.0"`.
    fn version(&self) -> String;
}
