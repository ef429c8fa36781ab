//! Shared helpers for integration tests: a linear-scan reference index and
//! deterministic random data.
#![allow(dead_code)]

use quadrant::{Point, RTree, Rectangle};
use rand::rngs::StdRng;
use rand::Rng;

/// Reference index answering every query by scanning a flat entry list.
///
/// Deliberately trivial so it can serve as an oracle for the R-tree: the
/// two implementations share no code beyond the `Rectangle` type.
pub struct LinearIndex {
    entries: Vec<(Rectangle, i32)>,
}

impl Default for LinearIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearIndex {
    pub fn new() -> LinearIndex {
        LinearIndex {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, r: &Rectangle, id: i32) {
        self.entries.push((*r, id));
    }

    /// Removes one occurrence of the exact `(rectangle, id)` pair.
    pub fn delete(&mut self, r: &Rectangle, id: i32) -> bool {
        if let Some(position) = self
            .entries
            .iter()
            .position(|(er, eid)| er == r && *eid == id)
        {
            self.entries.swap_remove(position);
            true
        } else {
            false
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn intersects(&self, q: &Rectangle) -> Vec<i32> {
        let mut out: Vec<i32> = self
            .entries
            .iter()
            .filter(|(r, _)| q.intersects(r))
            .map(|(_, id)| *id)
            .collect();
        out.sort();
        out
    }

    pub fn contains(&self, q: &Rectangle) -> Vec<i32> {
        let mut out: Vec<i32> = self
            .entries
            .iter()
            .filter(|(r, _)| q.contains(r))
            .map(|(_, id)| *id)
            .collect();
        out.sort();
        out
    }

    /// All ids tied for minimum distance to `p`, within the cutoff.
    pub fn nearest(&self, p: &Point, furthest_distance: f64) -> Vec<i32> {
        let furthest_sq = furthest_distance * furthest_distance;
        let mut best_sq = f64::INFINITY;
        for (r, _) in &self.entries {
            let d = r.distance_sq(p);
            if d <= furthest_sq && d < best_sq {
                best_sq = d;
            }
        }

        let mut out: Vec<i32> = self
            .entries
            .iter()
            .filter(|(r, _)| {
                let d = r.distance_sq(p);
                d <= furthest_sq && d == best_sq
            })
            .map(|(_, id)| *id)
            .collect();
        out.sort();
        out
    }

    /// The `count` nearest ids in ascending distance order, keeping every
    /// entry tied with the distance at the count boundary.
    pub fn nearest_n(&self, p: &Point, count: usize, furthest_distance: f64) -> Vec<i32> {
        if count == 0 {
            return Vec::new();
        }
        let furthest_sq = furthest_distance * furthest_distance;
        let mut candidates: Vec<(f64, i32)> = self
            .entries
            .iter()
            .map(|(r, id)| (r.distance_sq(p), *id))
            .filter(|(d, _)| *d <= furthest_sq)
            .collect();
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

        if candidates.len() > count {
            let boundary = candidates[count - 1].0;
            let mut end = count;
            while end < candidates.len() && candidates[end].0 == boundary {
                end += 1;
            }
            candidates.truncate(end);
        }

        candidates.into_iter().map(|(_, id)| id).collect()
    }

    /// Distance from `p` to the (unique) entry with the given id.
    pub fn distance_sq_of(&self, id: i32, p: &Point) -> f64 {
        self.entries
            .iter()
            .find(|(_, eid)| *eid == id)
            .map(|(r, _)| r.distance_sq(p))
            .unwrap_or(f64::INFINITY)
    }
}

/// A random rectangle inside a 100 x 100 world, up to 10 units wide.
pub fn random_rectangle(rng: &mut StdRng) -> Rectangle {
    let x: f64 = rng.gen_range(0.0..100.0);
    let y: f64 = rng.gen_range(0.0..100.0);
    let w: f64 = rng.gen_range(0.0..10.0);
    let h: f64 = rng.gen_range(0.0..10.0);
    Rectangle::new(x, y, x + w, y + h)
}

pub fn random_point(rng: &mut StdRng) -> Point {
    Point::new(rng.gen_range(-10.0..110.0), rng.gen_range(-10.0..110.0))
}

pub fn collect_intersects(tree: &mut RTree, q: &Rectangle) -> Vec<i32> {
    let mut out = Vec::new();
    tree.intersects(q, &mut |id| {
        out.push(id);
        true
    });
    out.sort();
    out
}

pub fn collect_contains(tree: &mut RTree, q: &Rectangle) -> Vec<i32> {
    let mut out = Vec::new();
    tree.contains(q, &mut |id| {
        out.push(id);
        true
    });
    out.sort();
    out
}

pub fn collect_nearest(tree: &mut RTree, p: &Point, furthest_distance: f64) -> Vec<i32> {
    let mut out = Vec::new();
    tree.nearest(
        p,
        &mut |id| {
            out.push(id);
            true
        },
        furthest_distance,
    );
    out.sort();
    out
}

/// Ids in the order the tree streams them (ascending distance).
pub fn collect_nearest_n(
    tree: &mut RTree,
    p: &Point,
    count: usize,
    furthest_distance: f64,
) -> Vec<i32> {
    let mut out = Vec::new();
    tree.nearest_n(
        p,
        &mut |id| {
            out.push(id);
            true
        },
        count,
        furthest_distance,
    );
    out
}

pub fn collect_nearest_n_unsorted(
    tree: &mut RTree,
    p: &Point,
    count: usize,
    furthest_distance: f64,
) -> Vec<i32> {
    let mut out = Vec::new();
    tree.nearest_n_unsorted(
        p,
        &mut |id| {
            out.push(id);
            true
        },
        count,
        furthest_distance,
    );
    out
}
