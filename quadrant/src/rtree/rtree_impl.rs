//! In-memory R-Tree implementation.

use crate::point::Point;
use crate::priority_queue::{PriorityQueue, SortOrder};
use crate::rectangle::Rectangle;
use crate::sorted_list::SortedList;
use crate::spatial_index::SpatialIndex;

use super::constants::{
    DEFAULT_MAX_NODE_ENTRIES, DEFAULT_MIN_NODE_ENTRIES, ENTRY_STATUS_ASSIGNED,
    ENTRY_STATUS_UNASSIGNED, FALLBACK_MAX_NODE_ENTRIES,
};
use super::node::Node;
use super::types::{RTreeStats, SpatialError, SpatialResult};

/// Configuration for an [`RTree`].
///
/// Invalid values do not fail construction; they fall back to safe defaults
/// with a single warning, so a tree is always usable.
#[derive(Debug, Clone)]
pub struct RTreeConfig {
    /// Maximum number of entries per node. Must be at least 2; anything
    /// smaller falls back to 10.
    pub max_node_entries: usize,
    /// Minimum number of entries per node. Must be between 1 and
    /// `max_node_entries / 2`; anything outside falls back to
    /// `max_node_entries / 2`.
    pub min_node_entries: usize,
    /// Run a full consistency check after every mutation. Expensive;
    /// intended for debugging tree corruption.
    pub internal_consistency_checking: bool,
}

impl Default for RTreeConfig {
    fn default() -> Self {
        RTreeConfig {
            max_node_entries: DEFAULT_MAX_NODE_ENTRIES,
            min_node_entries: DEFAULT_MIN_NODE_ENTRIES,
            internal_consistency_checking: false,
        }
    }
}

/// An in-memory R-Tree over 2-D rectangles, built for fast intersection
/// queries, low memory use and fast insertion.
///
/// Nodes are kept in a table indexed by integer node id rather than linked
/// by owning pointers; parent information is reconstructed on the two
/// descent stacks recorded during each operation. Node splitting follows
/// Guttman's quadratic algorithm. Deleted node ids are parked on a free
/// list and reused, so the node table only ever grows.
///
/// The tree is single-threaded by design: queries share scratch state with
/// mutations (see [`SpatialIndex`]), which is why every operation takes
/// `&mut self`.
pub struct RTree {
    max_node_entries: usize,
    min_node_entries: usize,
    internal_consistency_checking: bool,

    /// Node table: node id -> node. Nodes are replaced in place when a
    /// free-listed id is reused, never removed.
    nodes: Vec<Node>,

    root_node_id: i32,
    tree_height: usize,
    size: usize,

    highest_used_node_id: i32,
    deleted_node_ids: Vec<i32>,

    // Scratch used to mark entries during a node split.
    entry_status: Vec<u8>,
    initial_entry_status: Vec<u8>,

    // Stacks recording node id and entry index from the root down to the
    // current node. Enable fast lookup of parents when a split or a shrink
    // is propagated up the tree.
    parents: Vec<i32>,
    parents_entry: Vec<i32>,

    // Candidate ids tied for nearest, kept between the search and the sink
    // drain so a closer entry found later can discard them.
    nearest_ids: Vec<i32>,
    nearest_n_ids: SortedList,
    distance_queue: PriorityQueue,
}

// ============================================================================
// Construction & configuration
// ============================================================================

impl RTree {
    /// Creates a tree with the default configuration.
    pub fn new() -> RTree {
        Self::with_config(RTreeConfig::default())
    }

    /// Creates a tree with the given configuration, falling back to default
    /// capacities if the configured ones are invalid.
    pub fn with_config(config: RTreeConfig) -> RTree {
        let mut max_node_entries = config.max_node_entries;
        let mut min_node_entries = config.min_node_entries;

        if max_node_entries < 2 {
            log::warn!(
                "Invalid MaxNodeEntries = {}, resetting to default value of {}",
                max_node_entries,
                FALLBACK_MAX_NODE_ENTRIES
            );
            max_node_entries = FALLBACK_MAX_NODE_ENTRIES;
        }

        if min_node_entries < 1 || min_node_entries > max_node_entries / 2 {
            log::warn!(
                "MinNodeEntries must be between 1 and MaxNodeEntries / 2, resetting to {}",
                max_node_entries / 2
            );
            min_node_entries = max_node_entries / 2;
        }

        let root = Node::new(0, 1, max_node_entries);

        RTree {
            max_node_entries,
            min_node_entries,
            internal_consistency_checking: config.internal_consistency_checking,
            nodes: vec![root],
            root_node_id: 0,
            tree_height: 1,
            size: 0,
            highest_used_node_id: 0,
            deleted_node_ids: Vec::new(),
            entry_status: vec![ENTRY_STATUS_UNASSIGNED; max_node_entries + 1],
            initial_entry_status: vec![ENTRY_STATUS_UNASSIGNED; max_node_entries + 1],
            parents: Vec::new(),
            parents_entry: Vec::new(),
            nearest_ids: Vec::new(),
            nearest_n_ids: SortedList::new(),
            distance_queue: PriorityQueue::new(SortOrder::Descending),
        }
    }

    /// The effective maximum number of entries per node.
    pub fn max_node_entries(&self) -> usize {
        self.max_node_entries
    }

    /// The effective minimum number of entries per node.
    pub fn min_node_entries(&self) -> usize {
        self.min_node_entries
    }
}

impl Default for RTree {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public operations
// ============================================================================

impl RTree {
    /// Adds a rectangle with the given id.
    ///
    /// Id uniqueness is not enforced; adding the same `(rectangle, id)` pair
    /// twice indexes two occurrences. The id `-1` is reserved internally and
    /// is rejected.
    pub fn add(&mut self, r: &Rectangle, id: i32) -> SpatialResult<()> {
        if id == -1 {
            return Err(SpatialError::InvalidOperation(
                "entry id -1 is reserved".to_string(),
            ));
        }

        log::debug!("Adding rectangle {}, id {}", r, id);

        self.add_at_level(r.min_x, r.min_y, r.max_x, r.max_y, id, 1)?;
        self.size += 1;

        if self.internal_consistency_checking {
            self.check_consistency()?;
        }
        Ok(())
    }

    /// Deletes a rectangle, matching on exact coordinates and id.
    ///
    /// Returns `Ok(false)` and leaves the tree unchanged if no such entry
    /// exists.
    pub fn delete(&mut self, r: &Rectangle, id: i32) -> SpatialResult<bool> {
        log::debug!("Deleting rectangle {}, id {}", r, id);

        // Descend only into entries that contain the target: an exact match
        // can only live inside a fully containing parent, so mere overlap
        // never needs searching. The parents_entry stack keeps a resume
        // marker per node so exhausted subtrees are not revisited.
        self.parents.clear();
        self.parents.push(self.root_node_id);
        self.parents_entry.clear();
        self.parents_entry.push(-1);

        let mut found: Option<(i32, usize)> = None;

        while found.is_none() && !self.parents.is_empty() {
            let top = self.parents.len() - 1;
            let n_id = self.parents[top];
            let start_index = (self.parents_entry[top] + 1) as usize;

            let n = &self.nodes[n_id as usize];
            if !n.is_leaf() {
                let mut descend = None;
                for i in start_index..n.entry_count {
                    if n.entry_contains(i, r) {
                        descend = Some((i, n.ids[i]));
                        break;
                    }
                }
                if let Some((i, child_id)) = descend {
                    // this becomes the start index when the child has been
                    // searched
                    self.parents_entry[top] = i as i32;
                    self.parents.push(child_id);
                    self.parents_entry.push(-1);
                    continue;
                }
            } else {
                found = n
                    .find_entry(r.min_x, r.min_y, r.max_x, r.max_y, id)
                    .map(|index| (n_id, index));
            }

            self.parents.pop();
            self.parents_entry.pop();
        }

        let deleted = if let Some((leaf_id, index)) = found {
            self.nodes[leaf_id as usize].delete_entry(index);
            self.condense_tree(leaf_id)?;
            self.size -= 1;
            true
        } else {
            false
        };

        // Shrink the tree while the root is internal with a single child;
        // the child becomes the new root.
        loop {
            let root = &self.nodes[self.root_node_id as usize];
            if root.entry_count != 1 || self.tree_height <= 1 {
                break;
            }
            let child_id = root.ids[0];
            let old_root_id = self.root_node_id;
            self.nodes[old_root_id as usize].entry_count = 0;
            self.deleted_node_ids.push(old_root_id);
            self.root_node_id = child_id;
            self.tree_height -= 1;
        }

        // An empty tree keeps its root node; reset the MBR so the next add
        // starts from the empty sentinel.
        if self.size == 0 {
            let root = &mut self.nodes[self.root_node_id as usize];
            root.mbr_min_x = f64::INFINITY;
            root.mbr_min_y = f64::INFINITY;
            root.mbr_max_x = f64::NEG_INFINITY;
            root.mbr_max_y = f64::NEG_INFINITY;
        }

        if self.internal_consistency_checking {
            self.check_consistency()?;
        }
        Ok(deleted)
    }

    /// Streams the ids of all entries intersecting `r` to the sink, in no
    /// particular order. The sink returns `false` to stop the query.
    pub fn intersects(&mut self, r: &Rectangle, sink: &mut dyn FnMut(i32) -> bool) {
        self.parents.clear();
        self.parents.push(self.root_node_id);
        self.parents_entry.clear();
        self.parents_entry.push(-1);

        while !self.parents.is_empty() {
            let top = self.parents.len() - 1;
            let n_id = self.parents[top];
            let start_index = (self.parents_entry[top] + 1) as usize;

            let n = &self.nodes[n_id as usize];
            if !n.is_leaf() {
                let mut descend = None;
                for i in start_index..n.entry_count {
                    if n.entry_intersects(i, r) {
                        descend = Some((i, n.ids[i]));
                        break;
                    }
                }
                if let Some((i, child_id)) = descend {
                    self.parents_entry[top] = i as i32;
                    self.parents.push(child_id);
                    self.parents_entry.push(-1);
                    continue;
                }
            } else {
                for i in 0..n.entry_count {
                    if n.entry_intersects(i, r) && !sink(n.ids[i]) {
                        return;
                    }
                }
            }

            self.parents.pop();
            self.parents_entry.pop();
        }
    }

    /// Streams the ids of all entries contained by `r` to the sink, in no
    /// particular order. The sink returns `false` to stop the query.
    pub fn contains(&mut self, r: &Rectangle, sink: &mut dyn FnMut(i32) -> bool) {
        self.parents.clear();
        self.parents.push(self.root_node_id);
        self.parents_entry.clear();
        self.parents_entry.push(-1);

        while !self.parents.is_empty() {
            let top = self.parents.len() - 1;
            let n_id = self.parents[top];
            let start_index = (self.parents_entry[top] + 1) as usize;

            let n = &self.nodes[n_id as usize];
            if !n.is_leaf() {
                // a contained entry can only lie inside a child whose MBR
                // intersects the query, so the prune predicate is the same
                // as for the intersection query
                let mut descend = None;
                for i in start_index..n.entry_count {
                    if n.entry_intersects(i, r) {
                        descend = Some((i, n.ids[i]));
                        break;
                    }
                }
                if let Some((i, child_id)) = descend {
                    self.parents_entry[top] = i as i32;
                    self.parents.push(child_id);
                    self.parents_entry.push(-1);
                    continue;
                }
            } else {
                for i in 0..n.entry_count {
                    if n.entry_contained_by(i, r) && !sink(n.ids[i]) {
                        return;
                    }
                }
            }

            self.parents.pop();
            self.parents_entry.pop();
        }
    }

    /// Streams every id tied for minimum distance to `p`, ignoring entries
    /// further than `furthest_distance` (non-squared).
    pub fn nearest(&mut self, p: &Point, sink: &mut dyn FnMut(i32) -> bool, furthest_distance: f64) {
        let furthest_distance_sq = furthest_distance * furthest_distance;
        self.nearest_recursive(p, self.root_node_id, furthest_distance_sq);

        for i in 0..self.nearest_ids.len() {
            if !sink(self.nearest_ids[i]) {
                break;
            }
        }
        self.nearest_ids.clear();
    }

    /// Streams the `count` nearest entries in ascending distance order.
    ///
    /// Entries tied with the `count`-th distance are all reported, so more
    /// than `count` ids may reach the sink.
    pub fn nearest_n(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    ) {
        self.create_nearest_n_distance_queue(p, count, furthest_distance);
        self.distance_queue.set_sort_order(SortOrder::Ascending);

        while let Some((value, _)) = self.distance_queue.pop() {
            if !sink(value) {
                break;
            }
        }
    }

    /// Same contents as [`RTree::nearest_n`], streamed without the final
    /// sort. Cheaper when the caller does not need ordering.
    pub fn nearest_n_unsorted(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    ) {
        self.create_nearest_n_distance_queue(p, count, furthest_distance);

        while let Some((value, _)) = self.distance_queue.pop() {
            if !sink(value) {
                break;
            }
        }
    }

    /// Original nearest-N search over the bounded sorted list.
    ///
    /// Reports the same id set as [`RTree::nearest_n`]; retained so callers
    /// of the historical path keep its exact behaviour.
    #[deprecated(note = "use nearest_n")]
    pub fn nearest_n_legacy(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    ) {
        if count == 0 {
            return;
        }

        self.nearest_n_ids.init(count);
        let furthest_distance_sq = furthest_distance * furthest_distance;
        self.nearest_n_recursive(p, self.root_node_id, furthest_distance_sq);

        self.nearest_n_ids.for_each_id(sink);
        self.nearest_n_ids.clear();
    }

    /// Number of entries in the tree.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The minimum bounding rectangle of all entries, or `None` if the tree
    /// is empty.
    pub fn bounds(&self) -> Option<Rectangle> {
        if self.size == 0 {
            return None;
        }
        Some(self.nodes[self.root_node_id as usize].mbr())
    }

    /// A string identifying this implementation and its version.
    pub fn version(&self) -> String {
        format!("RTree-{}", env!("CARGO_PKG_VERSION"))
    }

    /// Statistics about the current shape of the tree.
    pub fn stats(&self) -> RTreeStats {
        RTreeStats {
            entries: self.size,
            height: self.tree_height,
            nodes: self.nodes.len(),
            free_nodes: self.deleted_node_ids.len(),
        }
    }

    /// Walks the whole tree verifying its structural invariants: node
    /// levels, stored child MBRs against actual child MBRs, node MBRs
    /// against their entries, and that every child pointer resolves.
    ///
    /// Returns [`SpatialError::Corruption`] on the first violation found.
    pub fn check_consistency(&self) -> SpatialResult<()> {
        self.check_consistency_node(self.root_node_id, self.tree_height, None)
    }

    fn check_consistency_node(
        &self,
        node_id: i32,
        expected_level: usize,
        expected_mbr: Option<Rectangle>,
    ) -> SpatialResult<()> {
        let n = match self.nodes.get(node_id as usize) {
            Some(n) => n,
            None => {
                log::error!("Could not read node {}", node_id);
                return Err(SpatialError::Corruption(format!(
                    "could not read node {}",
                    node_id
                )));
            }
        };

        if n.level != expected_level {
            return Err(SpatialError::Corruption(format!(
                "node {}: expected level {}, actual level {}",
                node_id, expected_level, n.level
            )));
        }

        if node_id == self.root_node_id && n.entry_count == 0 {
            return if self.size == 0 {
                Ok(())
            } else {
                Err(SpatialError::Corruption(format!(
                    "root node is empty but the tree holds {} entries",
                    self.size
                )))
            };
        }

        if node_id != self.root_node_id
            && (n.entry_count < self.min_node_entries || n.entry_count > self.max_node_entries)
        {
            return Err(SpatialError::Corruption(format!(
                "node {}: entry count {} outside [{}, {}]",
                node_id, n.entry_count, self.min_node_entries, self.max_node_entries
            )));
        }

        let mut calculated = Rectangle::empty();
        for i in 0..n.entry_count {
            calculated.add(&n.entry(i));
        }
        if calculated != n.mbr() {
            return Err(SpatialError::Corruption(format!(
                "node {}: calculated MBR does not equal stored MBR",
                node_id
            )));
        }

        if let Some(expected) = expected_mbr {
            if n.mbr() != expected {
                return Err(SpatialError::Corruption(format!(
                    "node {}: MBR does not equal the entry stored in its parent",
                    node_id
                )));
            }
        }

        if n.level > 1 {
            for i in 0..n.entry_count {
                self.check_consistency_node(n.ids[i], n.level - 1, Some(n.entry(i)))?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Insertion internals
// ============================================================================

impl RTree {
    /// Adds an entry at the given level; leaves are level 1. Reinsertion
    /// after a node elimination passes the eliminated node's level so
    /// subtree leaves stay level with the main tree's.
    fn add_at_level(
        &mut self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        id: i32,
        level: usize,
    ) -> SpatialResult<()> {
        let n_id = self.choose_node(min_x, min_y, max_x, max_y, level);

        let new_node_id = if self.nodes[n_id as usize].entry_count < self.max_node_entries {
            self.nodes[n_id as usize].add_entry(min_x, min_y, max_x, max_y, id);
            None
        } else {
            Some(self.split_node(n_id, min_x, min_y, max_x, max_y, id))
        };

        let root_sibling_id = self.adjust_tree(n_id, new_node_id)?;

        // The root itself split: grow the tree by a level, with the two
        // halves of the former root as the new root's children.
        if let Some(sibling_id) = root_sibling_id {
            let old_root_id = self.root_node_id;
            self.root_node_id = self.next_node_id();
            self.tree_height += 1;

            let mut root = Node::new(self.root_node_id, self.tree_height, self.max_node_entries);
            {
                let sibling = &self.nodes[sibling_id as usize];
                root.add_entry(
                    sibling.mbr_min_x,
                    sibling.mbr_min_y,
                    sibling.mbr_max_x,
                    sibling.mbr_max_y,
                    sibling.node_id,
                );
            }
            {
                let old_root = &self.nodes[old_root_id as usize];
                root.add_entry(
                    old_root.mbr_min_x,
                    old_root.mbr_min_y,
                    old_root.mbr_max_x,
                    old_root.mbr_max_y,
                    old_root.node_id,
                );
            }
            self.put_node(root);
        }
        Ok(())
    }

    /// Chooses the node at `level` whose MBR needs the least enlargement to
    /// absorb the rectangle, breaking ties by smaller area. Records the
    /// descent on the parents stacks.
    fn choose_node(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64, level: usize) -> i32 {
        let mut n_id = self.root_node_id;
        self.parents.clear();
        self.parents_entry.clear();

        loop {
            let n = &self.nodes[n_id as usize];
            if n.level == level {
                return n_id;
            }

            let mut index = 0;
            let mut least_enlargement = n.entry_enlargement(0, min_x, min_y, max_x, max_y);
            for i in 1..n.entry_count {
                let temp_enlargement = n.entry_enlargement(i, min_x, min_y, max_x, max_y);
                if temp_enlargement < least_enlargement
                    || (temp_enlargement == least_enlargement
                        && n.entry_area(i) < n.entry_area(index))
                {
                    index = i;
                    least_enlargement = temp_enlargement;
                }
            }

            let child_id = n.ids[index];
            self.parents.push(n_id);
            self.parents_entry.push(index as i32);
            n_id = child_id;
        }
    }

    /// Ascends from `n_id` to the root, adjusting covering rectangles and
    /// propagating node splits. Returns the sibling produced by a root
    /// split, if any.
    fn adjust_tree(&mut self, mut n_id: i32, mut nn_id: Option<i32>) -> SpatialResult<Option<i32>> {
        while self.nodes[n_id as usize].level != self.tree_height {
            let parent_id = match self.parents.pop() {
                Some(id) => id,
                None => {
                    log::error!("Parents stack exhausted below the root");
                    return Err(SpatialError::Corruption(
                        "parents stack exhausted below the root".to_string(),
                    ));
                }
            };
            let entry = match self.parents_entry.pop() {
                Some(index) => index as usize,
                None => {
                    return Err(SpatialError::Corruption(
                        "parents entry stack exhausted below the root".to_string(),
                    ))
                }
            };

            let (child_node_id, child_mbr) = {
                let n = &self.nodes[n_id as usize];
                (n.node_id, n.mbr())
            };

            {
                let parent = &mut self.nodes[parent_id as usize];
                if parent.ids[entry] != child_node_id {
                    log::error!(
                        "Entry {} in node {} should point to node {}; actually points to node {}",
                        entry,
                        parent_id,
                        child_node_id,
                        parent.ids[entry]
                    );
                    return Err(SpatialError::Corruption(format!(
                        "entry {} in node {} does not point to node {}",
                        entry, parent_id, child_node_id
                    )));
                }

                if parent.entries_min_x[entry] != child_mbr.min_x
                    || parent.entries_min_y[entry] != child_mbr.min_y
                    || parent.entries_max_x[entry] != child_mbr.max_x
                    || parent.entries_max_y[entry] != child_mbr.max_y
                {
                    parent.entries_min_x[entry] = child_mbr.min_x;
                    parent.entries_min_y[entry] = child_mbr.min_y;
                    parent.entries_max_x[entry] = child_mbr.max_x;
                    parent.entries_max_y[entry] = child_mbr.max_y;
                    parent.recalculate_mbr();
                }
            }

            // Propagate an earlier split: add the sibling to the parent,
            // splitting the parent in turn if it is full.
            let mut new_sibling_id = None;
            if let Some(sibling_id) = nn_id {
                let (sibling_mbr, sibling_node_id) = {
                    let sibling = &self.nodes[sibling_id as usize];
                    (sibling.mbr(), sibling.node_id)
                };
                if self.nodes[parent_id as usize].entry_count < self.max_node_entries {
                    self.nodes[parent_id as usize].add_entry(
                        sibling_mbr.min_x,
                        sibling_mbr.min_y,
                        sibling_mbr.max_x,
                        sibling_mbr.max_y,
                        sibling_node_id,
                    );
                } else {
                    new_sibling_id = Some(self.split_node(
                        parent_id,
                        sibling_mbr.min_x,
                        sibling_mbr.min_y,
                        sibling_mbr.max_x,
                        sibling_mbr.max_y,
                        sibling_node_id,
                    ));
                }
            }

            n_id = parent_id;
            nn_id = new_sibling_id;
        }

        Ok(nn_id)
    }

    /// Splits an overfull node, distributing its entries plus the incoming
    /// one between the node and a new sibling. Guttman's quadratic method,
    /// pretty much verbatim. Returns the sibling's node id.
    fn split_node(
        &mut self,
        n_id: i32,
        new_min_x: f64,
        new_min_y: f64,
        new_max_x: f64,
        new_max_y: f64,
        new_id: i32,
    ) -> i32 {
        self.entry_status.copy_from_slice(&self.initial_entry_status);

        // Park the incoming entry in the scratch slot so seeds and
        // distribution treat it like any other entry.
        self.nodes[n_id as usize].add_entry(new_min_x, new_min_y, new_max_x, new_max_y, new_id);

        let new_node_id = self.next_node_id();
        let level = self.nodes[n_id as usize].level;
        self.put_node(Node::new(new_node_id, level, self.max_node_entries));

        self.pick_seeds(n_id, new_node_id);

        // Distribute the rest. If one group must take every remaining entry
        // to reach the minimum fill, hand them over and stop.
        let total = self.max_node_entries + 1;
        loop {
            let (n_count, new_count) = {
                (
                    self.nodes[n_id as usize].entry_count,
                    self.nodes[new_node_id as usize].entry_count,
                )
            };
            if n_count + new_count >= total {
                break;
            }

            if total - new_count == self.min_node_entries {
                // assign all remaining entries to the original node
                let n = &mut self.nodes[n_id as usize];
                for i in 0..total {
                    if self.entry_status[i] == ENTRY_STATUS_UNASSIGNED {
                        self.entry_status[i] = ENTRY_STATUS_ASSIGNED;
                        let min_x = n.entries_min_x[i];
                        let min_y = n.entries_min_y[i];
                        let max_x = n.entries_max_x[i];
                        let max_y = n.entries_max_y[i];
                        n.add_to_mbr(min_x, min_y, max_x, max_y);
                        n.entry_count += 1;
                    }
                }
                break;
            }
            if total - n_count == self.min_node_entries {
                // assign all remaining entries to the new node
                let (n, new_node) = two_nodes_mut(&mut self.nodes, n_id, new_node_id);
                for i in 0..total {
                    if self.entry_status[i] == ENTRY_STATUS_UNASSIGNED {
                        self.entry_status[i] = ENTRY_STATUS_ASSIGNED;
                        new_node.add_entry(
                            n.entries_min_x[i],
                            n.entries_min_y[i],
                            n.entries_max_x[i],
                            n.entries_max_y[i],
                            n.ids[i],
                        );
                        n.ids[i] = -1;
                    }
                }
                break;
            }

            self.pick_next(n_id, new_node_id);
        }

        self.nodes[n_id as usize].reorganize();
        new_node_id
    }

    /// Picks the two split seeds: along each axis, the entry with the
    /// greatest minimum and the entry with the smallest maximum; the axis
    /// with the largest normalised separation wins.
    fn pick_seeds(&mut self, n_id: i32, new_node_id: i32) {
        // initialise to -1 so that even fully overlapping entries yield
        // seeds
        let mut max_normalized_separation = -1.0_f64;
        let mut highest_low_index = 0;
        let mut lowest_high_index = 0;

        {
            let n = &self.nodes[n_id as usize];
            // the incoming entry sits in the scratch slot and provides the
            // starting extremes
            let last = n.entry_count - 1;

            // the node MBR already covers the incoming entry
            let mbr_len_x = n.mbr_max_x - n.mbr_min_x;
            let mbr_len_y = n.mbr_max_y - n.mbr_min_y;

            let mut temp_highest_low = n.entries_min_x[last];
            let mut temp_highest_low_index = last;
            let mut temp_lowest_high = n.entries_max_x[last];
            let mut temp_lowest_high_index = last;
            for i in 0..last {
                let temp_low = n.entries_min_x[i];
                if temp_low >= temp_highest_low {
                    temp_highest_low = temp_low;
                    temp_highest_low_index = i;
                } else {
                    // the same entry cannot be both the highest low and the
                    // lowest high
                    let temp_high = n.entries_max_x[i];
                    if temp_high <= temp_lowest_high {
                        temp_lowest_high = temp_high;
                        temp_lowest_high_index = i;
                    }
                }

                let normalized_separation = if mbr_len_x == 0.0 {
                    1.0
                } else {
                    (temp_highest_low - temp_lowest_high) / mbr_len_x
                };
                if !(-1.0..=1.0).contains(&normalized_separation) {
                    log::error!("Invalid normalized separation x: {}", normalized_separation);
                }

                if normalized_separation >= max_normalized_separation {
                    highest_low_index = temp_highest_low_index;
                    lowest_high_index = temp_lowest_high_index;
                    max_normalized_separation = normalized_separation;
                }
            }

            let mut temp_highest_low = n.entries_min_y[last];
            let mut temp_highest_low_index = last;
            let mut temp_lowest_high = n.entries_max_y[last];
            let mut temp_lowest_high_index = last;
            for i in 0..last {
                let temp_low = n.entries_min_y[i];
                if temp_low >= temp_highest_low {
                    temp_highest_low = temp_low;
                    temp_highest_low_index = i;
                } else {
                    let temp_high = n.entries_max_y[i];
                    if temp_high <= temp_lowest_high {
                        temp_lowest_high = temp_high;
                        temp_lowest_high_index = i;
                    }
                }

                let normalized_separation = if mbr_len_y == 0.0 {
                    1.0
                } else {
                    (temp_highest_low - temp_lowest_high) / mbr_len_y
                };
                if !(-1.0..=1.0).contains(&normalized_separation) {
                    log::error!("Invalid normalized separation y: {}", normalized_separation);
                }

                if normalized_separation >= max_normalized_separation {
                    highest_low_index = temp_highest_low_index;
                    lowest_high_index = temp_lowest_high_index;
                    max_normalized_separation = normalized_separation;
                }
            }

            // Both axes can resolve to the same entry on both sides when
            // every entry overlaps the incoming one. Fall back to a
            // deterministic pair: smallest min Y against, among the rest,
            // the largest max X.
            if highest_low_index == lowest_high_index {
                highest_low_index = last;
                let mut temp_min_y = n.entries_min_y[last];
                lowest_high_index = 0;
                let mut temp_max_x = n.entries_max_x[0];
                for i in 1..last {
                    if n.entries_min_y[i] < temp_min_y {
                        temp_min_y = n.entries_min_y[i];
                        highest_low_index = i;
                    } else if n.entries_max_x[i] > temp_max_x {
                        temp_max_x = n.entries_max_x[i];
                        lowest_high_index = i;
                    }
                }
            }
        }

        // The highest-low entry seeds the new node; the lowest-high entry
        // seeds the original, whose MBR restarts from that entry alone.
        let (n, new_node) = two_nodes_mut(&mut self.nodes, n_id, new_node_id);
        self.entry_status[highest_low_index] = ENTRY_STATUS_ASSIGNED;
        new_node.add_entry(
            n.entries_min_x[highest_low_index],
            n.entries_min_y[highest_low_index],
            n.entries_max_x[highest_low_index],
            n.entries_max_y[highest_low_index],
            n.ids[highest_low_index],
        );
        n.ids[highest_low_index] = -1;

        self.entry_status[lowest_high_index] = ENTRY_STATUS_ASSIGNED;
        n.entry_count = 1;
        n.set_mbr_to_entry(lowest_high_index);
    }

    /// Picks the next entry to distribute: the one with the largest
    /// difference between the enlargements the two groups would incur, given
    /// to the group enlarging less. Ties cascade to smaller area, then
    /// fewer entries.
    fn pick_next(&mut self, n_id: i32, new_node_id: i32) -> usize {
        let mut max_difference = f64::NEG_INFINITY;
        let mut next = 0;
        let mut next_group = 0;

        let total = self.max_node_entries + 1;

        {
            let n = &self.nodes[n_id as usize];
            let new_node = &self.nodes[new_node_id as usize];

            for i in 0..total {
                if self.entry_status[i] == ENTRY_STATUS_UNASSIGNED {
                    let min_x = n.entries_min_x[i];
                    let min_y = n.entries_min_y[i];
                    let max_x = n.entries_max_x[i];
                    let max_y = n.entries_max_y[i];

                    let n_increase = n.mbr_enlargement(min_x, min_y, max_x, max_y);
                    let new_node_increase = new_node.mbr_enlargement(min_x, min_y, max_x, max_y);
                    let difference = (n_increase - new_node_increase).abs();

                    if difference > max_difference {
                        next = i;
                        next_group = if n_increase < new_node_increase {
                            0
                        } else if new_node_increase < n_increase {
                            1
                        } else if n.mbr_area() < new_node.mbr_area() {
                            0
                        } else if new_node.mbr_area() < n.mbr_area() {
                            1
                        } else if new_node.entry_count < self.max_node_entries / 2 {
                            0
                        } else {
                            1
                        };
                        max_difference = difference;
                    }
                }
            }
        }

        self.entry_status[next] = ENTRY_STATUS_ASSIGNED;

        if next_group == 0 {
            let n = &mut self.nodes[n_id as usize];
            let min_x = n.entries_min_x[next];
            let min_y = n.entries_min_y[next];
            let max_x = n.entries_max_x[next];
            let max_y = n.entries_max_y[next];
            n.add_to_mbr(min_x, min_y, max_x, max_y);
            n.entry_count += 1;
        } else {
            let (n, new_node) = two_nodes_mut(&mut self.nodes, n_id, new_node_id);
            new_node.add_entry(
                n.entries_min_x[next],
                n.entries_min_y[next],
                n.entries_max_x[next],
                n.entries_max_y[next],
                n.ids[next],
            );
            n.ids[next] = -1;
        }

        next
    }
}

// ============================================================================
// Deletion internals
// ============================================================================

impl RTree {
    /// Ensures every node from `l_id` up to the root has the minimum number
    /// of entries, detaching under-full nodes and reinserting their entries
    /// at their original level.
    ///
    /// The parents stacks are expected to hold the path from the root down
    /// to `l_id`'s parent.
    fn condense_tree(&mut self, l_id: i32) -> SpatialResult<()> {
        let mut n_id = l_id;
        let mut eliminated_node_ids: Vec<i32> = Vec::new();

        while self.nodes[n_id as usize].level != self.tree_height {
            let parent_id = match self.parents.pop() {
                Some(id) => id,
                None => {
                    log::error!("Parents stack exhausted below the root");
                    return Err(SpatialError::Corruption(
                        "parents stack exhausted below the root".to_string(),
                    ));
                }
            };
            let parent_entry = match self.parents_entry.pop() {
                Some(index) => index as usize,
                None => {
                    return Err(SpatialError::Corruption(
                        "parents entry stack exhausted below the root".to_string(),
                    ))
                }
            };

            let (n_entry_count, n_mbr) = {
                let n = &self.nodes[n_id as usize];
                (n.entry_count, n.mbr())
            };

            if n_entry_count < self.min_node_entries {
                self.nodes[parent_id as usize].delete_entry(parent_entry);
                eliminated_node_ids.push(n_id);
            } else {
                let parent = &mut self.nodes[parent_id as usize];
                if parent.entries_min_x[parent_entry] != n_mbr.min_x
                    || parent.entries_min_y[parent_entry] != n_mbr.min_y
                    || parent.entries_max_x[parent_entry] != n_mbr.max_x
                    || parent.entries_max_y[parent_entry] != n_mbr.max_y
                {
                    let deleted_min_x = parent.entries_min_x[parent_entry];
                    let deleted_min_y = parent.entries_min_y[parent_entry];
                    let deleted_max_x = parent.entries_max_x[parent_entry];
                    let deleted_max_y = parent.entries_max_y[parent_entry];
                    parent.entries_min_x[parent_entry] = n_mbr.min_x;
                    parent.entries_min_y[parent_entry] = n_mbr.min_y;
                    parent.entries_max_x[parent_entry] = n_mbr.max_x;
                    parent.entries_max_y[parent_entry] = n_mbr.max_y;
                    parent.recalculate_mbr_if_influenced_by(
                        deleted_min_x,
                        deleted_min_y,
                        deleted_max_x,
                        deleted_max_y,
                    );
                }
            }

            n_id = parent_id;
        }

        // Reinsert the entries of every eliminated node at its original
        // level, then park the node id for reuse. Entries from higher-level
        // nodes must re-enter higher up so the leaves of their subtrees stay
        // level with the rest of the tree.
        while let Some(e_id) = eliminated_node_ids.pop() {
            let (level, entries) = {
                let e = &self.nodes[e_id as usize];
                let entries: Vec<(f64, f64, f64, f64, i32)> = (0..e.entry_count)
                    .map(|j| {
                        (
                            e.entries_min_x[j],
                            e.entries_min_y[j],
                            e.entries_max_x[j],
                            e.entries_max_y[j],
                            e.ids[j],
                        )
                    })
                    .collect();
                (e.level, entries)
            };
            self.nodes[e_id as usize].entry_count = 0;

            for (min_x, min_y, max_x, max_y, id) in entries {
                self.add_at_level(min_x, min_y, max_x, max_y, id, level)?;
            }
            self.deleted_node_ids.push(e_id);
        }

        Ok(())
    }
}

// ============================================================================
// Nearest-neighbour internals
// ============================================================================

impl RTree {
    /// Recursive single-nearest search. Leaves update the best distance and
    /// the tied-candidate list; internal nodes are entered only if their
    /// MBR could hold something at least as near as the current best.
    fn nearest_recursive(&mut self, p: &Point, n_id: i32, mut nearest_distance_sq: f64) -> f64 {
        let (entry_count, is_leaf) = {
            let n = &self.nodes[n_id as usize];
            (n.entry_count, n.is_leaf())
        };

        for i in 0..entry_count {
            let (temp_distance_sq, entry_id) = {
                let n = &self.nodes[n_id as usize];
                (n.entry_distance_sq(i, p.x, p.y), n.ids[i])
            };

            if is_leaf {
                if temp_distance_sq < nearest_distance_sq {
                    nearest_distance_sq = temp_distance_sq;
                    self.nearest_ids.clear();
                }
                if temp_distance_sq <= nearest_distance_sq {
                    self.nearest_ids.push(entry_id);
                }
            } else if temp_distance_sq <= nearest_distance_sq {
                nearest_distance_sq = self.nearest_recursive(p, entry_id, nearest_distance_sq);
            }
        }

        nearest_distance_sq
    }

    /// Fills the distance queue with the `count` nearest entries, keeping
    /// every entry tied with the `count`-th distance. On return the queue is
    /// descending, worst candidate on top.
    fn create_nearest_n_distance_queue(&mut self, p: &Point, count: usize, furthest_distance: f64) {
        self.distance_queue.clear();
        self.distance_queue.set_sort_order(SortOrder::Descending);

        if count == 0 {
            return;
        }

        self.parents.clear();
        self.parents.push(self.root_node_id);
        self.parents_entry.clear();
        self.parents_entry.push(-1);

        // Values evicted from a full queue are rescued here while the next
        // head shares their distance, so ties straddling the count boundary
        // survive.
        let mut saved_values: Vec<i32> = Vec::new();
        let mut saved_priority = 0.0;

        let mut furthest_distance_sq = furthest_distance * furthest_distance;

        while !self.parents.is_empty() {
            let top = self.parents.len() - 1;
            let n_id = self.parents[top];
            let start_index = (self.parents_entry[top] + 1) as usize;

            let n = &self.nodes[n_id as usize];
            if !n.is_leaf() {
                let mut descend = None;
                for i in start_index..n.entry_count {
                    if n.entry_distance_sq(i, p.x, p.y) <= furthest_distance_sq {
                        descend = Some((i, n.ids[i]));
                        break;
                    }
                }
                if let Some((i, child_id)) = descend {
                    self.parents_entry[top] = i as i32;
                    self.parents.push(child_id);
                    self.parents_entry.push(-1);
                    continue;
                }
            } else {
                for i in 0..n.entry_count {
                    let entry_distance_sq = n.entry_distance_sq(i, p.x, p.y);
                    let entry_id = n.ids[i];

                    if entry_distance_sq <= furthest_distance_sq {
                        self.distance_queue.insert(entry_id, entry_distance_sq);

                        while self.distance_queue.len() > count {
                            let (value, distance_sq) = match self.distance_queue.pop() {
                                Some(head) => head,
                                None => break,
                            };
                            if Some(distance_sq) == self.distance_queue.peek_priority() {
                                saved_values.push(value);
                                saved_priority = distance_sq;
                            } else {
                                saved_values.clear();
                            }
                        }

                        // the eviction stopped inside a run of equal
                        // distances; everything popped from it belongs back
                        if !saved_values.is_empty()
                            && Some(saved_priority) == self.distance_queue.peek_priority()
                        {
                            for &v in &saved_values {
                                self.distance_queue.insert(v, saved_priority);
                            }
                            saved_values.clear();
                        }

                        // narrow the search only once the queue is full
                        if self.distance_queue.len() >= count {
                            if let Some(priority) = self.distance_queue.peek_priority() {
                                if priority < furthest_distance_sq {
                                    furthest_distance_sq = priority;
                                }
                            }
                        }
                    }
                }
            }

            self.parents.pop();
            self.parents_entry.pop();
        }
    }

    /// Recursive legacy nearest-N search over the bounded sorted list.
    /// Priorities are negated distances, so the list keeps the nearest
    /// entries at its head and its lowest retained priority is the cutoff.
    fn nearest_n_recursive(&mut self, p: &Point, n_id: i32, mut furthest_distance_sq: f64) -> f64 {
        let (entry_count, is_leaf) = {
            let n = &self.nodes[n_id as usize];
            (n.entry_count, n.is_leaf())
        };

        for i in 0..entry_count {
            let (temp_distance_sq, entry_id) = {
                let n = &self.nodes[n_id as usize];
                (n.entry_distance_sq(i, p.x, p.y), n.ids[i])
            };

            if is_leaf {
                if temp_distance_sq <= furthest_distance_sq {
                    self.nearest_n_ids.add(entry_id, -temp_distance_sq);

                    let temp_furthest_distance_sq = -self.nearest_n_ids.lowest_priority();
                    if temp_furthest_distance_sq < furthest_distance_sq {
                        furthest_distance_sq = temp_furthest_distance_sq;
                    }
                }
            } else if temp_distance_sq <= furthest_distance_sq {
                furthest_distance_sq =
                    self.nearest_n_recursive(p, entry_id, furthest_distance_sq);
            }
        }

        furthest_distance_sq
    }
}

// ============================================================================
// Node table
// ============================================================================

impl RTree {
    /// The next available node id, reusing deleted ids when possible.
    fn next_node_id(&mut self) -> i32 {
        if let Some(id) = self.deleted_node_ids.pop() {
            id
        } else {
            self.highest_used_node_id += 1;
            self.highest_used_node_id
        }
    }

    /// Installs a node in the table under its own id.
    fn put_node(&mut self, node: Node) {
        let index = node.node_id as usize;
        if index == self.nodes.len() {
            self.nodes.push(node);
        } else {
            self.nodes[index] = node;
        }
    }
}

/// Mutable references to two distinct nodes of the table at once.
fn two_nodes_mut(nodes: &mut [Node], a: i32, b: i32) -> (&mut Node, &mut Node) {
    let (a, b) = (a as usize, b as usize);
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = nodes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = nodes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

// ============================================================================
// SpatialIndex implementation
// ============================================================================

impl SpatialIndex for RTree {
    fn add(&mut self, r: &Rectangle, id: i32) -> SpatialResult<()> {
        RTree::add(self, r, id)
    }

    fn delete(&mut self, r: &Rectangle, id: i32) -> SpatialResult<bool> {
        RTree::delete(self, r, id)
    }

    fn intersects(&mut self, r: &Rectangle, sink: &mut dyn FnMut(i32) -> bool) {
        RTree::intersects(self, r, sink)
    }

    fn contains(&mut self, r: &Rectangle, sink: &mut dyn FnMut(i32) -> bool) {
        RTree::contains(self, r, sink)
    }

    fn nearest(&mut self, p: &Point, sink: &mut dyn FnMut(i32) -> bool, furthest_distance: f64) {
        RTree::nearest(self, p, sink, furthest_distance)
    }

    fn nearest_n(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    ) {
        RTree::nearest_n(self, p, sink, count, furthest_distance)
    }

    fn nearest_n_unsorted(
        &mut self,
        p: &Point,
        sink: &mut dyn FnMut(i32) -> bool,
        count: usize,
        furthest_distance: f64,
    ) {
        RTree::nearest_n_unsorted(self, p, sink, count, furthest_distance)
    }

    fn size(&self) -> usize {
        RTree::size(self)
    }

    fn bounds(&self) -> Option<Rectangle> {
        RTree::bounds(self)
    }

    fn version(&self) -> String {
        RTree::version(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> RTree {
        RTree::with_config(RTreeConfig {
            max_node_entries: 4,
            min_node_entries: 2,
            internal_consistency_checking: true,
        })
    }

    fn collect_intersects(tree: &mut RTree, r: &Rectangle) -> Vec<i32> {
        let mut out = Vec::new();
        tree.intersects(r, &mut |id| {
            out.push(id);
            true
        });
        out.sort();
        out
    }

    fn collect_contains(tree: &mut RTree, r: &Rectangle) -> Vec<i32> {
        let mut out = Vec::new();
        tree.contains(r, &mut |id| {
            out.push(id);
            true
        });
        out.sort();
        out
    }

    fn collect_nearest(tree: &mut RTree, p: &Point, furthest: f64) -> Vec<i32> {
        let mut out = Vec::new();
        tree.nearest(
            p,
            &mut |id| {
                out.push(id);
                true
            },
            furthest,
        );
        out.sort();
        out
    }

    fn collect_nearest_n(tree: &mut RTree, p: &Point, count: usize, furthest: f64) -> Vec<i32> {
        let mut out = Vec::new();
        tree.nearest_n(
            p,
            &mut |id| {
                out.push(id);
                true
            },
            count,
            furthest,
        );
        out
    }

    #[test]
    fn test_new_tree_is_empty() {
        let tree = RTree::new();
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.bounds(), None);
        assert!(tree.version().starts_with("RTree-"));
        tree.check_consistency().unwrap();
    }

    #[test]
    fn test_default_configuration() {
        let tree = RTree::new();
        assert_eq!(tree.max_node_entries(), 50);
        assert_eq!(tree.min_node_entries(), 20);
    }

    #[test]
    fn test_invalid_configuration_falls_back() {
        let tree = RTree::with_config(RTreeConfig {
            max_node_entries: 1,
            min_node_entries: 0,
            internal_consistency_checking: false,
        });
        assert_eq!(tree.max_node_entries(), 10);
        assert_eq!(tree.min_node_entries(), 5);

        let tree = RTree::with_config(RTreeConfig {
            max_node_entries: 8,
            min_node_entries: 7,
            internal_consistency_checking: false,
        });
        assert_eq!(tree.max_node_entries(), 8);
        assert_eq!(tree.min_node_entries(), 4);
    }

    #[test]
    fn test_single_insert_delete() {
        let mut tree = RTree::new();
        tree.add(&Rectangle::new(1.0, 1.0, 2.0, 2.0), 42).unwrap();

        assert_eq!(tree.size(), 1);
        assert_eq!(tree.bounds(), Some(Rectangle::new(1.0, 1.0, 2.0, 2.0)));
        assert_eq!(
            collect_intersects(&mut tree, &Rectangle::new(0.0, 0.0, 3.0, 3.0)),
            vec![42]
        );
        assert!(collect_intersects(&mut tree, &Rectangle::new(3.0, 3.0, 4.0, 4.0)).is_empty());

        assert!(tree.delete(&Rectangle::new(1.0, 1.0, 2.0, 2.0), 42).unwrap());
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.bounds(), None);
    }

    #[test]
    fn test_delete_mismatch() {
        let mut tree = RTree::new();
        tree.add(&Rectangle::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();

        assert!(!tree.delete(&Rectangle::new(0.0, 0.0, 1.0, 2.0), 1).unwrap());
        assert!(!tree.delete(&Rectangle::new(0.0, 0.0, 1.0, 1.0), 2).unwrap());
        assert_eq!(tree.size(), 1);
        assert!(tree.delete(&Rectangle::new(0.0, 0.0, 1.0, 1.0), 1).unwrap());
        assert_eq!(tree.size(), 0);
    }

    #[test]
    fn test_add_rejects_reserved_id() {
        let mut tree = RTree::new();
        let result = tree.add(&Rectangle::new(0.0, 0.0, 1.0, 1.0), -1);
        assert!(matches!(result, Err(SpatialError::InvalidOperation(_))));
        assert_eq!(tree.size(), 0);
    }

    #[test]
    fn test_duplicate_entries() {
        let mut tree = RTree::new();
        let r = Rectangle::new(0.0, 0.0, 1.0, 1.0);
        tree.add(&r, 7).unwrap();
        tree.add(&r, 7).unwrap();
        assert_eq!(tree.size(), 2);

        // each delete removes one occurrence
        assert!(tree.delete(&r, 7).unwrap());
        assert_eq!(tree.size(), 1);
        assert!(tree.delete(&r, 7).unwrap());
        assert_eq!(tree.size(), 0);
        assert!(!tree.delete(&r, 7).unwrap());
    }

    #[test]
    fn test_contains_vs_intersects() {
        let mut tree = RTree::new();
        tree.add(&Rectangle::new(0.0, 0.0, 10.0, 10.0), 1).unwrap();
        tree.add(&Rectangle::new(2.0, 2.0, 5.0, 5.0), 2).unwrap();
        tree.add(&Rectangle::new(9.0, 9.0, 11.0, 11.0), 3).unwrap();

        assert_eq!(
            collect_contains(&mut tree, &Rectangle::new(1.0, 1.0, 6.0, 6.0)),
            vec![2]
        );
        assert_eq!(
            collect_intersects(&mut tree, &Rectangle::new(1.0, 1.0, 6.0, 6.0)),
            vec![1, 2]
        );
        assert_eq!(
            collect_contains(&mut tree, &Rectangle::new(-1.0, -1.0, 12.0, 12.0)),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_splits_maintain_queries() {
        let mut tree = small_tree();
        for i in 0..50 {
            let x = (i % 10) as f64;
            let y = (i / 10) as f64;
            tree.add(&Rectangle::new(x, y, x + 0.5, y + 0.5), i).unwrap();
        }
        assert_eq!(tree.size(), 50);
        assert!(tree.stats().height >= 2);

        let all = collect_intersects(&mut tree, &Rectangle::new(-1.0, -1.0, 11.0, 11.0));
        assert_eq!(all, (0..50).collect::<Vec<i32>>());

        // a single column of the grid
        let column = collect_intersects(&mut tree, &Rectangle::new(3.1, -1.0, 3.4, 11.0));
        assert_eq!(column, vec![3, 13, 23, 33, 43]);
    }

    #[test]
    fn test_delete_collapses_root() {
        let mut tree = small_tree();
        for i in 0..50 {
            let x = (i % 10) as f64;
            let y = (i / 10) as f64;
            tree.add(&Rectangle::new(x, y, x + 0.5, y + 0.5), i).unwrap();
        }
        assert!(tree.stats().height >= 2);

        for i in 0..50 {
            let x = (i % 10) as f64;
            let y = (i / 10) as f64;
            assert!(tree.delete(&Rectangle::new(x, y, x + 0.5, y + 0.5), i).unwrap());
        }
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.bounds(), None);
        assert_eq!(tree.stats().height, 1);
    }

    #[test]
    fn test_node_ids_are_reused() {
        let mut tree = small_tree();
        let fill = |tree: &mut RTree| {
            for i in 0..30 {
                let x = (i % 10) as f64;
                let y = (i / 10) as f64;
                tree.add(&Rectangle::new(x, y, x + 0.5, y + 0.5), i).unwrap();
            }
        };
        let drain = |tree: &mut RTree| {
            for i in 0..30 {
                let x = (i % 10) as f64;
                let y = (i / 10) as f64;
                assert!(tree.delete(&Rectangle::new(x, y, x + 0.5, y + 0.5), i).unwrap());
            }
        };

        fill(&mut tree);
        drain(&mut tree);
        let first_round_nodes = tree.stats().nodes;
        assert!(tree.stats().free_nodes > 0);

        // the second round is served from the free list
        fill(&mut tree);
        drain(&mut tree);
        assert_eq!(tree.stats().nodes, first_round_nodes);
    }

    #[test]
    fn test_nearest_single_and_ties() {
        let mut tree = RTree::new();
        // unit squares centred at (0,0), (2,0), (0,2), (-2,0), (0,-2)
        let centres = [(0.0, 0.0), (2.0, 0.0), (0.0, 2.0), (-2.0, 0.0), (0.0, -2.0)];
        for (i, &(cx, cy)) in centres.iter().enumerate() {
            tree.add(
                &Rectangle::new(cx - 0.5, cy - 0.5, cx + 0.5, cy + 0.5),
                (i + 1) as i32,
            )
            .unwrap();
        }

        assert_eq!(
            collect_nearest(&mut tree, &Point::new(0.0, 0.0), f64::INFINITY),
            vec![1]
        );
        // (2, 2) is equidistant from the squares centred at (2,0) and (0,2)
        assert_eq!(
            collect_nearest(&mut tree, &Point::new(2.0, 2.0), f64::INFINITY),
            vec![2, 3]
        );
        // (1, 1) is sqrt(0.5) from the corners of three squares at once
        assert_eq!(
            collect_nearest(&mut tree, &Point::new(1.0, 1.0), f64::INFINITY),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_nearest_respects_cutoff() {
        let mut tree = RTree::new();
        tree.add(&Rectangle::new(10.0, 10.0, 11.0, 11.0), 1).unwrap();

        assert!(collect_nearest(&mut tree, &Point::new(0.0, 0.0), 5.0).is_empty());
        assert_eq!(
            collect_nearest(&mut tree, &Point::new(0.0, 0.0), 20.0),
            vec![1]
        );
    }

    #[test]
    fn test_nearest_empty_tree() {
        let mut tree = RTree::new();
        assert!(collect_nearest(&mut tree, &Point::new(0.0, 0.0), f64::INFINITY).is_empty());
        assert!(collect_nearest_n(&mut tree, &Point::new(0.0, 0.0), 3, f64::INFINITY).is_empty());
    }

    #[test]
    fn test_nearest_n_preserves_boundary_ties() {
        let mut tree = RTree::new();
        for id in 10..15 {
            tree.add(&Rectangle::new(0.0, 0.0, 10.0, 10.0), id).unwrap();
        }

        // all five share distance zero, so asking for two returns them all
        let mut found = collect_nearest_n(&mut tree, &Point::new(5.0, 5.0), 2, f64::INFINITY);
        found.sort();
        assert_eq!(found, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_nearest_n_sorted_by_distance() {
        let mut tree = small_tree();
        for i in 0..20 {
            let x = i as f64 * 2.0;
            tree.add(&Rectangle::new(x, 0.0, x + 1.0, 1.0), i).unwrap();
        }

        let found = collect_nearest_n(&mut tree, &Point::new(0.5, 0.5), 5, f64::INFINITY);
        assert_eq!(found, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_nearest_n_count_zero() {
        let mut tree = RTree::new();
        tree.add(&Rectangle::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        assert!(collect_nearest_n(&mut tree, &Point::new(0.0, 0.0), 0, f64::INFINITY).is_empty());
    }

    #[test]
    fn test_nearest_n_unsorted_same_set() {
        let mut tree = small_tree();
        for i in 0..30 {
            let x = (i % 6) as f64 * 3.0;
            let y = (i / 6) as f64 * 3.0;
            tree.add(&Rectangle::new(x, y, x + 1.0, y + 1.0), i).unwrap();
        }

        let mut sorted = collect_nearest_n(&mut tree, &Point::new(7.0, 7.0), 6, f64::INFINITY);
        let mut unsorted = Vec::new();
        tree.nearest_n_unsorted(
            &Point::new(7.0, 7.0),
            &mut |id| {
                unsorted.push(id);
                true
            },
            6,
            f64::INFINITY,
        );

        sorted.sort();
        unsorted.sort();
        assert_eq!(sorted, unsorted);
    }

    #[test]
    fn test_query_early_termination() {
        let mut tree = RTree::new();
        for i in 0..10 {
            tree.add(&Rectangle::new(0.0, 0.0, 1.0, 1.0), i).unwrap();
        }

        let mut seen = 0;
        tree.intersects(&Rectangle::new(0.0, 0.0, 1.0, 1.0), &mut |_| {
            seen += 1;
            false
        });
        assert_eq!(seen, 1);

        let mut seen = 0;
        tree.nearest_n(
            &Point::new(0.5, 0.5),
            &mut |_| {
                seen += 1;
                false
            },
            5,
            f64::INFINITY,
        );
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_bounds_tracks_entries() {
        let mut tree = RTree::new();
        tree.add(&Rectangle::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        tree.add(&Rectangle::new(5.0, -3.0, 6.0, 2.0), 2).unwrap();
        assert_eq!(tree.bounds(), Some(Rectangle::new(0.0, -3.0, 6.0, 2.0)));

        tree.delete(&Rectangle::new(5.0, -3.0, 6.0, 2.0), 2).unwrap();
        assert_eq!(tree.bounds(), Some(Rectangle::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_stats() {
        let mut tree = small_tree();
        assert_eq!(
            tree.stats(),
            RTreeStats {
                entries: 0,
                height: 1,
                nodes: 1,
                free_nodes: 0
            }
        );

        for i in 0..10 {
            tree.add(&Rectangle::new(i as f64, 0.0, i as f64 + 1.0, 1.0), i)
                .unwrap();
        }
        let stats = tree.stats();
        assert_eq!(stats.entries, 10);
        assert!(stats.height >= 2);
        assert!(stats.nodes > 1);
    }

    #[test]
    fn test_trait_object_usable() {
        let mut tree = RTree::new();
        let index: &mut dyn SpatialIndex = &mut tree;
        index.add(&Rectangle::new(0.0, 0.0, 1.0, 1.0), 1).unwrap();
        assert_eq!(index.size(), 1);

        let mut out = Vec::new();
        index.intersects(&Rectangle::new(0.5, 0.5, 2.0, 2.0), &mut |id| {
            out.push(id);
            true
        });
        assert_eq!(out, vec![1]);
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_nearest_n_matches_heap_path() {
        let mut tree = small_tree();
        for i in 0..40 {
            let x = (i % 8) as f64 * 2.5;
            let y = (i / 8) as f64 * 2.5;
            tree.add(&Rectangle::new(x, y, x + 1.0, y + 1.0), i).unwrap();
        }

        for count in [1, 3, 7] {
            let mut modern = collect_nearest_n(&mut tree, &Point::new(9.0, 4.0), count, f64::INFINITY);
            let mut legacy = Vec::new();
            tree.nearest_n_legacy(
                &Point::new(9.0, 4.0),
                &mut |id| {
                    legacy.push(id);
                    true
                },
                count,
                f64::INFINITY,
            );
            modern.sort();
            legacy.sort();
            assert_eq!(modern, legacy, "count = {}", count);
        }
    }
}
