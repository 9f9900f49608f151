//! The process grid: an immutable 2D arrangement of cooperating processes
//!
//! Grid ranks are column-major: the process at grid row `r`, column `c` has
//! grid rank `r + c * height`, which is also its rank in the all-process
//! communicator the grid was built from. Row-major numbering is exposed as
//! the `vr` rank for the linear distributions that deal in that order.

use crate::comm::Comm;
use crate::dist::Dist;
use crate::error::{Error, Result};

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// A 2D arrangement of R x C processes with derived communication groups
///
/// Immutable after construction; shared read-only (via `Arc`) by every
/// distributed matrix that references it.
pub struct Grid {
    height: usize,
    width: usize,
    row: usize,
    col: usize,
    /// All processes, column-major (grid-rank) order
    all: Comm,
    /// All processes, row-major order
    vr: Comm,
    /// My grid row, ordered by grid column
    row_comm: Comm,
    /// My grid column, ordered by grid row
    col_comm: Comm,
    /// The lcm(R, C) diagonal processes, ordered by diagonal rank
    diag: Option<Comm>,
    diag_len: usize,
}

impl Grid {
    /// Arrange the processes of `comm` into a `height` x `width` grid
    ///
    /// A shape that does not exactly cover the communicator is a fatal
    /// configuration error.
    pub fn new(comm: Comm, height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 || height * width != comm.size() {
            return Err(Error::GridShape {
                height,
                width,
                procs: comm.size(),
            });
        }
        let rank = comm.rank();
        let (row, col) = (rank % height, rank / height);
        let grid_rank = |r: usize, c: usize| r + c * height;

        let vr_members: Vec<usize> = (0..height * width)
            .map(|m| grid_rank(m / width, m % width))
            .collect();
        let row_members: Vec<usize> = (0..width).map(|c| grid_rank(row, c)).collect();
        let col_members: Vec<usize> = (0..height).map(|r| grid_rank(r, col)).collect();

        let diag_len = height / gcd(height, width) * width;
        let diag_members: Vec<usize> = (0..diag_len)
            .map(|d| grid_rank(d % height, d % width))
            .collect();

        let vr = comm.subgroup(&vr_members).expect("every process is in vr");
        let row_comm = comm.subgroup(&row_members).expect("process is in its row");
        let col_comm = comm.subgroup(&col_members).expect("process is in its column");
        let diag = comm.subgroup(&diag_members);

        Ok(Grid {
            height,
            width,
            row,
            col,
            all: comm,
            vr,
            row_comm,
            col_comm,
            diag,
            diag_len,
        })
    }

    /// Arrange the processes of `comm` into the most square grid possible
    ///
    /// The height is the largest divisor of the process count not exceeding
    /// its square root.
    pub fn square(comm: Comm) -> Result<Self> {
        let p = comm.size();
        let mut h = (p as f64).sqrt() as usize;
        while h > 1 && p % h != 0 {
            h -= 1;
        }
        let h = h.max(1);
        Self::new(comm, h, p / h)
    }

    /// Number of grid rows
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of grid columns
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total number of processes
    #[inline]
    pub fn size(&self) -> usize {
        self.height * self.width
    }

    /// This process's grid row
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// This process's grid column
    #[inline]
    pub fn col(&self) -> usize {
        self.col
    }

    /// This process's grid rank (column-major linear numbering)
    #[inline]
    pub fn vc_rank(&self) -> usize {
        self.row + self.col * self.height
    }

    /// This process's row-major linear rank
    #[inline]
    pub fn vr_rank(&self) -> usize {
        self.row * self.width + self.col
    }

    /// Number of processes on the grid diagonal
    #[inline]
    pub fn diag_len(&self) -> usize {
        self.diag_len
    }

    /// Diagonal rank of the process at `(row, col)`, if it is on the diagonal
    ///
    /// The diagonal rank is the unique `d` in `[0, lcm(R, C))` with
    /// `d = row (mod R)` and `d = col (mod C)`; it exists exactly when
    /// `row = col (mod gcd(R, C))`.
    pub fn diag_rank_of(&self, row: usize, col: usize) -> Option<usize> {
        (0..self.diag_len).find(|&d| d % self.height == row && d % self.width == col)
    }

    /// This process's diagonal rank, if it is on the diagonal
    pub fn diag_rank(&self) -> Option<usize> {
        self.diag_rank_of(self.row, self.col)
    }

    /// All processes, in grid-rank order
    #[inline]
    pub fn all_comm(&self) -> &Comm {
        &self.all
    }

    /// All processes, in row-major rank order
    #[inline]
    pub fn vr_comm(&self) -> &Comm {
        &self.vr
    }

    /// The processes of this process's grid row, ordered by grid column
    #[inline]
    pub fn row_comm(&self) -> &Comm {
        &self.row_comm
    }

    /// The processes of this process's grid column, ordered by grid row
    #[inline]
    pub fn col_comm(&self) -> &Comm {
        &self.col_comm
    }

    /// The diagonal group, for processes that sit on it
    pub fn diag_comm(&self) -> Result<&Comm> {
        self.diag.as_ref().ok_or(Error::NotParticipating {
            rank: self.vc_rank(),
        })
    }

    /// The group whose members hold the distinct chunks of a `dist` axis
    ///
    /// Group rank within the returned communicator equals the axis rank of
    /// the dealing order, which is what the redistribution engine's unpack
    /// phase indexes by.
    pub fn comm_for(&self, dist: Dist) -> Result<&Comm> {
        match dist {
            Dist::GridRow => Ok(&self.col_comm),
            Dist::GridCol => Ok(&self.row_comm),
            Dist::VecCm => Ok(&self.all),
            Dist::VecRm => Ok(&self.vr),
            Dist::Diag => self.diag_comm(),
            // A replicated or single axis has one chunk; no group to speak of.
            Dist::Repl | Dist::Single => Ok(&self.all),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::World;
    use std::thread;

    fn on_grid<F>(p: usize, h: usize, w: usize, f: F)
    where
        F: Fn(Grid) + Send + Sync,
    {
        let comms = World::new(p);
        thread::scope(|s| {
            for comm in comms {
                let f = &f;
                s.spawn(move || f(Grid::new(comm, h, w).unwrap()));
            }
        });
    }

    #[test]
    fn test_bad_shape_is_fatal() {
        let mut comms = World::new(4);
        let comm = comms.remove(0);
        assert!(matches!(
            Grid::new(comm, 3, 2),
            Err(Error::GridShape { procs: 4, .. })
        ));
    }

    #[test]
    fn test_square_shapes() {
        for (p, h, w) in [(1, 1, 1), (4, 2, 2), (6, 2, 3), (7, 1, 7)] {
            let comms = World::new(p);
            thread::scope(|s| {
                for comm in comms {
                    s.spawn(move || {
                        let g = Grid::square(comm).unwrap();
                        assert_eq!((g.height(), g.width()), (h, w));
                    });
                }
            });
        }
    }

    #[test]
    fn test_rank_numbering() {
        on_grid(6, 2, 3, |g| {
            let q = g.vc_rank();
            assert_eq!(q, g.all_comm().rank());
            assert_eq!(g.row(), q % 2);
            assert_eq!(g.col(), q / 2);
            assert_eq!(g.vr_rank(), g.row() * 3 + g.col());
            assert_eq!(g.vr_comm().rank(), g.vr_rank());
            assert_eq!(g.row_comm().rank(), g.col());
            assert_eq!(g.col_comm().rank(), g.row());
        });
    }

    #[test]
    fn test_diag_ranks() {
        on_grid(6, 2, 3, |g| {
            // lcm(2, 3) = 6: every process is on the diagonal of a 2x3 grid.
            assert_eq!(g.diag_len(), 6);
            let d = g.diag_rank().unwrap();
            assert_eq!(d % 2, g.row());
            assert_eq!(d % 3, g.col());
            assert_eq!(g.diag_comm().unwrap().rank(), d);
        });
    }

    #[test]
    fn test_diag_excludes_off_diagonal() {
        on_grid(4, 2, 2, |g| {
            // lcm(2, 2) = 2: only the two processes with row == col sit on it.
            assert_eq!(g.diag_len(), 2);
            if g.row() == g.col() {
                assert!(g.diag_rank().is_some());
            } else {
                assert!(g.diag_rank().is_none());
                assert!(g.diag_comm().is_err());
            }
        });
    }
}
