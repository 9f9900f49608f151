//! Distribution kinds, partitioning descriptors, and the global/local index map
//!
//! Conventions follow column-major ordering: the *column* axis of a
//! descriptor governs global row indices (the direction running down a
//! column), and the *row* axis governs global column indices. A matrix
//! distributed `(GridRow, GridCol)` therefore deals rows round-robin over the
//! grid's rows and columns round-robin over the grid's columns.
//!
//! Per axis, with `stride` processes in the dealing order and an alignment
//! `a` in `[0, stride)`:
//!
//! - `owner(g) = (g + a) mod stride`
//! - `shift(rank) = (rank - a) mod stride` (first global index `rank` owns)
//! - local index `l` holds global index `shift + l * stride`
//!
//! which makes the owned global indices and `[0, local_len)` an exact
//! bijection on every process.

use crate::error::{Error, Result};
use crate::grid::Grid;

/// How one matrix axis's global indices are assigned to grid processes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dist {
    /// Every process stores the whole axis
    Repl,
    /// Dealt over grid rows (stride R, owner = grid row)
    GridRow,
    /// Dealt over grid columns (stride C, owner = grid column)
    GridCol,
    /// Dealt over all processes in column-major rank order (stride P)
    VecCm,
    /// Dealt over all processes in row-major rank order (stride P)
    VecRm,
    /// Dealt over the grid diagonal (stride lcm(R, C))
    Diag,
    /// One root process stores the whole axis
    Single,
}

impl Dist {
    /// Number of grid processes spanned by one step of local index
    pub fn stride(self, grid: &Grid) -> usize {
        match self {
            Dist::Repl | Dist::Single => 1,
            Dist::GridRow => grid.height(),
            Dist::GridCol => grid.width(),
            Dist::VecCm | Dist::VecRm => grid.size(),
            Dist::Diag => grid.diag_len(),
        }
    }

    /// This process's rank in the axis's dealing order, if it holds one
    ///
    /// `root` matters only for [`Dist::Single`]. Off-diagonal processes have
    /// no [`Dist::Diag`] rank; non-root processes have no [`Dist::Single`]
    /// rank.
    pub fn rank_of(self, grid: &Grid, root: usize) -> Option<usize> {
        match self {
            Dist::Repl => Some(0),
            Dist::GridRow => Some(grid.row()),
            Dist::GridCol => Some(grid.col()),
            Dist::VecCm => Some(grid.vc_rank()),
            Dist::VecRm => Some(grid.vr_rank()),
            Dist::Diag => grid.diag_rank(),
            Dist::Single => (grid.vc_rank() == root).then_some(0),
        }
    }

    /// Rank in this axis's dealing order held by the process at grid rank `q`
    pub fn rank_of_grid_rank(self, grid: &Grid, q: usize, root: usize) -> Option<usize> {
        let (row, col) = (q % grid.height(), q / grid.height());
        match self {
            Dist::Repl => Some(0),
            Dist::GridRow => Some(row),
            Dist::GridCol => Some(col),
            Dist::VecCm => Some(q),
            Dist::VecRm => Some(row * grid.width() + col),
            Dist::Diag => grid.diag_rank_of(row, col),
            Dist::Single => (q == root).then_some(0),
        }
    }
}

/// First global index owned by `rank` along an axis
#[inline]
pub fn shift(rank: usize, align: usize, stride: usize) -> usize {
    (rank + stride - align % stride) % stride
}

/// Rank owning global index `g` along an axis
#[inline]
pub fn owner(g: usize, align: usize, stride: usize) -> usize {
    (g + align) % stride
}

/// Number of global indices in `[0, n)` owned by a rank with the given shift
#[inline]
pub fn length(n: usize, shift: usize, stride: usize) -> usize {
    if n > shift {
        (n - shift).div_ceil(stride)
    } else {
        0
    }
}

/// Largest local length any rank can have along an axis of extent `n`
#[inline]
pub fn max_length(n: usize, stride: usize) -> usize {
    n.div_ceil(stride)
}

/// One axis of a descriptor bound to a grid: everything needed to map indices
#[derive(Clone, Copy, Debug)]
pub struct AxisMap {
    /// Distribution kind of the axis
    pub dist: Dist,
    /// Stride of the dealing order
    pub stride: usize,
    /// Alignment, already reduced modulo `stride`
    pub align: usize,
    /// This process's rank in the dealing order, if any
    pub rank: Option<usize>,
}

impl AxisMap {
    /// Rank owning global index `g`
    #[inline]
    pub fn owner(&self, g: usize) -> usize {
        owner(g, self.align, self.stride)
    }

    /// First global index this process owns, if it participates
    #[inline]
    pub fn shift(&self) -> Option<usize> {
        self.rank.map(|r| shift(r, self.align, self.stride))
    }

    /// First global index owned by `rank`
    #[inline]
    pub fn shift_of(&self, rank: usize) -> usize {
        shift(rank, self.align, self.stride)
    }

    /// This process's local extent for a global extent of `n`
    #[inline]
    pub fn local_len(&self, n: usize) -> usize {
        match self.shift() {
            Some(s) => length(n, s, self.stride),
            None => 0,
        }
    }

    /// Local extent of `rank` for a global extent of `n`
    #[inline]
    pub fn local_len_of(&self, rank: usize, n: usize) -> usize {
        length(n, self.shift_of(rank), self.stride)
    }

    /// Local index of global index `g`, if this process owns it
    pub fn local_index(&self, g: usize) -> Option<usize> {
        let rank = self.rank?;
        if self.owner(g) != rank {
            return None;
        }
        Some((g - self.shift_of(rank)) / self.stride)
    }

    /// Global index held at local index `l`
    ///
    /// Meaningful only on a participating process; returns `None` otherwise.
    pub fn global_index(&self, l: usize) -> Option<usize> {
        self.shift().map(|s| s + l * self.stride)
    }
}

/// The two axes of a matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// The axis running down a column (global row indices)
    Col,
    /// The axis running along a row (global column indices)
    Row,
}

/// A partitioning descriptor: the full rule for where every entry lives
///
/// Pairs a column-axis and a row-axis distribution with their alignments.
/// Only the fourteen pairings of the data model are constructible; `root`
/// matters only for the `(Single, Single)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistDesc {
    /// Distribution of the column axis (global row indices)
    pub col_dist: Dist,
    /// Distribution of the row axis (global column indices)
    pub row_dist: Dist,
    /// Column-axis alignment in `[0, col stride)`
    pub col_align: usize,
    /// Row-axis alignment in `[0, row stride)`
    pub row_align: usize,
    /// Owning process for the `(Single, Single)` pair, as a grid rank
    pub root: usize,
}

/// The descriptor pairings the data model defines
pub fn is_legal_pair(col: Dist, row: Dist) -> bool {
    use Dist::*;
    matches!(
        (col, row),
        (GridRow, GridCol)
            | (GridCol, GridRow)
            | (GridRow, Repl)
            | (Repl, GridRow)
            | (GridCol, Repl)
            | (Repl, GridCol)
            | (Diag, Repl)
            | (Repl, Diag)
            | (VecCm, Repl)
            | (Repl, VecCm)
            | (VecRm, Repl)
            | (Repl, VecRm)
            | (Repl, Repl)
            | (Single, Single)
    )
}

impl DistDesc {
    /// Descriptor with default (zero) alignments
    pub fn new(col_dist: Dist, row_dist: Dist) -> Result<Self> {
        if !is_legal_pair(col_dist, row_dist) {
            return Err(Error::IllegalDistPair {
                col: col_dist,
                row: row_dist,
            });
        }
        Ok(DistDesc {
            col_dist,
            row_dist,
            col_align: 0,
            row_align: 0,
            root: 0,
        })
    }

    /// Descriptor with explicit alignments (validated against the strides)
    pub fn with_aligns(
        col_dist: Dist,
        row_dist: Dist,
        col_align: usize,
        row_align: usize,
        grid: &Grid,
    ) -> Result<Self> {
        let mut desc = Self::new(col_dist, row_dist)?;
        let cs = col_dist.stride(grid);
        if col_align >= cs {
            return Err(Error::AlignOutOfRange {
                align: col_align,
                stride: cs,
            });
        }
        let rs = row_dist.stride(grid);
        if row_align >= rs {
            return Err(Error::AlignOutOfRange {
                align: row_align,
                stride: rs,
            });
        }
        desc.col_align = col_align;
        desc.row_align = row_align;
        Ok(desc)
    }

    /// Descriptor for the single-process partitioning rooted at `root`
    pub fn single(root: usize) -> Self {
        DistDesc {
            col_dist: Dist::Single,
            row_dist: Dist::Single,
            col_align: 0,
            row_align: 0,
            root,
        }
    }

    /// Distribution kind along `axis`
    #[inline]
    pub fn dist(&self, axis: Axis) -> Dist {
        match axis {
            Axis::Col => self.col_dist,
            Axis::Row => self.row_dist,
        }
    }

    /// Alignment along `axis`
    #[inline]
    pub fn align(&self, axis: Axis) -> usize {
        match axis {
            Axis::Col => self.col_align,
            Axis::Row => self.row_align,
        }
    }

    /// Column-axis mapping bound to `grid`
    pub fn col_map(&self, grid: &Grid) -> AxisMap {
        self.axis_map(Axis::Col, grid)
    }

    /// Row-axis mapping bound to `grid`
    pub fn row_map(&self, grid: &Grid) -> AxisMap {
        self.axis_map(Axis::Row, grid)
    }

    /// Mapping for `axis` bound to `grid`
    pub fn axis_map(&self, axis: Axis, grid: &Grid) -> AxisMap {
        let dist = self.dist(axis);
        AxisMap {
            dist,
            stride: dist.stride(grid),
            align: self.align(axis),
            rank: dist.rank_of(grid, self.root),
        }
    }

    /// Same kinds and placement: no data movement needed between the two
    pub fn same_placement(&self, other: &DistDesc) -> bool {
        self.col_dist == other.col_dist
            && self.row_dist == other.row_dist
            && self.col_align == other.col_align
            && self.row_align == other.row_align
            && (self.col_dist != Dist::Single || self.root == other.root)
    }

    /// Grid rank of the process owning entry `(i, j)`
    ///
    /// For replicated axes the canonical copy at coordinate zero is chosen,
    /// so every process computes the same owner.
    pub fn owner_grid_rank(&self, i: usize, j: usize, grid: &Grid) -> usize {
        let c = self.col_map(grid).owner(i);
        let r = self.row_map(grid).owner(j);
        grid_rank_for(self, c, r, 0, 0, grid)
    }
}

/// Grid rank of the process with the given axis ranks under `desc`
///
/// Replicated axes leave a grid coordinate free; `default_row`/`default_col`
/// fill it (a process's own coordinates for a pure realignment partner, zero
/// for a canonical owner).
pub(crate) fn grid_rank_for(
    desc: &DistDesc,
    col_rank: usize,
    row_rank: usize,
    default_row: usize,
    default_col: usize,
    grid: &Grid,
) -> usize {
    let (mut row, mut col) = (default_row, default_col);
    let mut place = |dist: Dist, rank: usize| match dist {
        Dist::Repl => {}
        Dist::GridRow => row = rank,
        Dist::GridCol => col = rank,
        Dist::VecCm => {
            row = rank % grid.height();
            col = rank / grid.height();
        }
        Dist::VecRm => {
            row = rank / grid.width();
            col = rank % grid.width();
        }
        Dist::Diag => {
            row = rank % grid.height();
            col = rank % grid.width();
        }
        Dist::Single => {
            row = desc.root % grid.height();
            col = desc.root / grid.height();
        }
    };
    place(desc.col_dist, col_rank);
    place(desc.row_dist, row_rank);
    row + col * grid.height()
}

/// Alignment a `target` axis should adopt from `src`, if a rule applies
///
/// Direct and axis-swapped matches copy the alignment; the finer linear kinds
/// reduce modulo the coarse stride (`VecCm` onto `GridRow`, `VecRm` onto
/// `GridCol`), and the coarse kinds embed unchanged in the finer ones.
pub fn resolve_align(target: Dist, src: &DistDesc, grid: &Grid) -> Option<usize> {
    use Dist::*;
    if target == Repl {
        return Some(0);
    }
    if src.col_dist == target {
        return Some(src.col_align);
    }
    if src.row_dist == target {
        return Some(src.row_align);
    }
    let reduced = |d: Dist, a: usize| -> Option<usize> {
        match (target, d) {
            (GridRow, VecCm) => Some(a % grid.height()),
            (GridCol, VecRm) => Some(a % grid.width()),
            (VecCm, GridRow) | (VecRm, GridCol) => Some(a),
            _ => None,
        }
    };
    reduced(src.col_dist, src.col_align).or_else(|| reduced(src.row_dist, src.row_align))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::World;

    #[test]
    fn test_shift_owner_inverse() {
        for stride in [1, 2, 3, 4, 6] {
            for align in 0..stride {
                for rank in 0..stride {
                    let s = shift(rank, align, stride);
                    assert_eq!(owner(s, align, stride), rank);
                    assert!(s < stride);
                }
            }
        }
    }

    #[test]
    fn test_length_partitions_exactly() {
        for stride in [1, 2, 3, 5] {
            for align in 0..stride {
                for n in 0..20 {
                    let total: usize = (0..stride)
                        .map(|r| length(n, shift(r, align, stride), stride))
                        .sum();
                    assert_eq!(total, n);
                }
            }
        }
    }

    #[test]
    fn test_axis_map_bijection() {
        for stride in [1, 2, 4] {
            for align in 0..stride {
                for rank in 0..stride {
                    let map = AxisMap {
                        dist: Dist::VecCm,
                        stride,
                        align,
                        rank: Some(rank),
                    };
                    let n = 17;
                    let mut seen = 0;
                    for g in 0..n {
                        if let Some(l) = map.local_index(g) {
                            assert_eq!(map.global_index(l), Some(g));
                            seen += 1;
                        }
                    }
                    assert_eq!(seen, map.local_len(n));
                }
            }
        }
    }

    #[test]
    fn test_max_length_bounds_all_ranks() {
        for stride in [2, 3, 7] {
            for align in 0..stride {
                for n in [0, 1, 10, 23] {
                    let max = max_length(n, stride);
                    for r in 0..stride {
                        assert!(length(n, shift(r, align, stride), stride) <= max);
                    }
                }
            }
        }
    }

    #[test]
    fn test_illegal_pairs_rejected() {
        assert!(DistDesc::new(Dist::GridRow, Dist::GridRow).is_err());
        assert!(DistDesc::new(Dist::VecCm, Dist::VecRm).is_err());
        assert!(DistDesc::new(Dist::Single, Dist::Repl).is_err());
        assert!(DistDesc::new(Dist::GridRow, Dist::GridCol).is_ok());
        assert!(DistDesc::new(Dist::Diag, Dist::Repl).is_ok());
    }

    #[test]
    fn test_resolve_align_on_grid() {
        let comms = World::new(6);
        std::thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    let grid = Grid::new(comm, 2, 3).unwrap();
                    let src =
                        DistDesc::with_aligns(Dist::VecCm, Dist::Repl, 5, 0, &grid).unwrap();
                    // VecCm alignment 5 reduces mod R=2 onto GridRow.
                    assert_eq!(resolve_align(Dist::GridRow, &src, &grid), Some(1));
                    assert_eq!(resolve_align(Dist::Repl, &src, &grid), Some(0));
                    assert_eq!(resolve_align(Dist::GridCol, &src, &grid), None);

                    let coarse =
                        DistDesc::with_aligns(Dist::GridRow, Dist::GridCol, 1, 2, &grid).unwrap();
                    assert_eq!(resolve_align(Dist::VecCm, &coarse, &grid), Some(1));
                    assert_eq!(resolve_align(Dist::GridCol, &coarse, &grid), Some(2));
                });
            }
        });
    }
}
