//! Data generators for benchmarks

use quadrant::{Point, Rectangle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// World edge length used by all generated data.
pub const WORLD_SIZE: f64 = 1000.0;

/// Deterministic set of random rectangles inside the benchmark world.
pub fn random_rectangles(count: usize, seed: u64) -> Vec<(Rectangle, i32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let x: f64 = rng.gen_range(0.0..WORLD_SIZE);
            let y: f64 = rng.gen_range(0.0..WORLD_SIZE);
            let w: f64 = rng.gen_range(0.1..10.0);
            let h: f64 = rng.gen_range(0.1..10.0);
            (Rectangle::new(x, y, x + w, y + h), id as i32)
        })
        .collect()
}

/// Deterministic set of query windows covering roughly 1% of the world.
pub fn query_windows(count: usize, seed: u64) -> Vec<Rectangle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x: f64 = rng.gen_range(0.0..WORLD_SIZE * 0.9);
            let y: f64 = rng.gen_range(0.0..WORLD_SIZE * 0.9);
            Rectangle::new(x, y, x + WORLD_SIZE * 0.1, y + WORLD_SIZE * 0.1)
        })
        .collect()
}

/// Deterministic set of query points.
pub fn query_points(count: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Point::new(rng.gen_range(0.0..WORLD_SIZE), rng.gen_range(0.0..WORLD_SIZE)))
        .collect()
}
