//! Shared harness for multi-process integration tests
//!
//! Every test spins up an in-process world with one thread per rank, builds
//! the same grid on each, and runs the test body collectively. The reference
//! matrix stores `i * width + j` at entry `(i, j)`, which makes any misplaced
//! or stale entry identifiable from its value alone.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;

use gridmat::comm::World;
use gridmat::grid::Grid;
use gridmat::matrix::DistMatrix;

/// Run `f` collectively on a `h x w` grid of `p` in-process ranks
pub fn on_grid<F>(p: usize, h: usize, w: usize, f: F)
where
    F: Fn(Arc<Grid>) + Send + Sync,
{
    let comms = World::new(p);
    thread::scope(|s| {
        for comm in comms {
            let f = &f;
            s.spawn(move || f(Arc::new(Grid::new(comm, h, w).unwrap())));
        }
    });
}

/// The reference value of entry `(i, j)` in a matrix of the given width
pub fn entry(i: usize, j: usize, width: usize) -> f64 {
    (i * width + j) as f64
}

/// Write the reference values into every locally stored entry
pub fn fill(m: &mut DistMatrix<f64>) {
    let (cm, rm) = (m.col_map(), m.row_map());
    let w = m.width();
    for lj in 0..m.local_width() {
        for li in 0..m.local_height() {
            let (Some(i), Some(j)) = (cm.global_index(li), rm.global_index(lj)) else {
                continue;
            };
            m.set_local(li, lj, entry(i, j, w)).unwrap();
        }
    }
}

/// Assert that every locally stored entry carries its reference value
pub fn check_local(m: &DistMatrix<f64>) {
    let (cm, rm) = (m.col_map(), m.row_map());
    let w = m.width();
    for lj in 0..m.local_width() {
        for li in 0..m.local_height() {
            let (Some(i), Some(j)) = (cm.global_index(li), rm.global_index(lj)) else {
                continue;
            };
            assert_eq!(
                m.get_local(li, lj),
                entry(i, j, w),
                "entry ({i}, {j}) misplaced or stale"
            );
        }
    }
}

/// The reference matrix packed column-major, as a root or replica holds it
pub fn reference_column_major(height: usize, width: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(height * width);
    for j in 0..width {
        for i in 0..height {
            out.push(entry(i, j, width));
        }
    }
    out
}

/// Total number of entries stored across the grid
pub fn total_stored(grid: &Grid, m: &DistMatrix<f64>) -> u64 {
    let counts = grid
        .all_comm()
        .all_gather(&[(m.local_height() * m.local_width()) as u64]);
    counts.iter().map(|c| c[0]).sum()
}
