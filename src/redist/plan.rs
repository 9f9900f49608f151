//! Conversion planning: choose a communication pattern for a descriptor pair
//!
//! [`classify`] maps a (source, destination) descriptor pair to either a
//! single communication template or a [`Plan::TwoHop`] through an
//! intermediate descriptor. Routing rules, most to least specific:
//!
//! 1. Destination entries all locally present: pure filter, no communication.
//! 2. Same kinds on both axes: a realignment exchange.
//! 3. A single-process endpoint: scatter or gather over the whole grid.
//! 4. One axis changes kind: the axis-local patterns (all-gather variants,
//!    vector permutation), or a hop through the vector kind between the two.
//! 5. Both axes change: the grid-pair/vector all-to-alls, the square-grid
//!    transpose exchange, or a hop that fixes one axis at a time.
//!
//! Every intermediate chosen here strictly shortens the remaining route, so
//! recursion over plans terminates; the executor still carries a depth guard
//! against descriptor pairs that would cycle.

use crate::dist::{is_legal_pair, Axis, Dist, DistDesc};
use crate::grid::Grid;

/// One step of a conversion route
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Every destination entry is already on its process: strided local copy
    Filter,
    /// Same kinds, different placement: pairwise exchange between shifted peers
    Translate,
    /// One axis becomes replicated: all-gather over that axis's group
    AllGather(Axis),
    /// A diagonal axis becomes replicated: diagonal all-gather plus broadcast
    DiagAllGather(Axis),
    /// Vector axis coarsens to its grid kind: all-gather over the complement
    PartialAllGather(Axis),
    /// Column-major and row-major vector orders trade places: rank permutation
    VecExchange(Axis),
    /// Grid-kind pair collapses onto a vector axis: all-to-all
    Demote(Axis),
    /// Vector axis spreads back over a grid-kind pair: all-to-all
    Promote(Axis),
    /// The two grid-kind pairs trade axes on a square grid: pairwise exchange
    TransposeExchange,
    /// Everything onto one root process
    Gather,
    /// One root process to everything
    Scatter,
    /// No single template applies: route through an intermediate descriptor
    TwoHop(DistDesc),
}

fn with_axis(base: &DistDesc, axis: Axis, dist: Dist, align: usize) -> DistDesc {
    let mut d = *base;
    match axis {
        Axis::Col => {
            d.col_dist = dist;
            d.col_align = align;
        }
        Axis::Row => {
            d.row_dist = dist;
            d.row_align = align;
        }
    }
    d
}

fn axis_refinable(s: Dist, sa: usize, d: Dist, da: usize, grid: &Grid) -> bool {
    if s == d && sa == da {
        return true;
    }
    match (s, d) {
        (Dist::Repl, _) => true,
        (Dist::GridRow, Dist::VecCm) => da % grid.height() == sa,
        (Dist::GridCol, Dist::VecRm) => da % grid.width() == sa,
        _ => false,
    }
}

/// Whether every destination entry already sits on its destination process
pub(crate) fn refinable(src: &DistDesc, dst: &DistDesc, grid: &Grid) -> bool {
    if src.col_dist == Dist::Single && src.root != dst.root {
        return false;
    }
    axis_refinable(src.col_dist, src.col_align, dst.col_dist, dst.col_align, grid)
        && axis_refinable(src.row_dist, src.row_align, dst.row_dist, dst.row_align, grid)
}

/// The vector kind a coarse grid kind refines into
fn vector_of(coarse: Dist) -> Dist {
    match coarse {
        Dist::GridRow => Dist::VecCm,
        Dist::GridCol => Dist::VecRm,
        _ => unreachable!("only grid kinds refine to a vector kind"),
    }
}

fn classify_axis(src: &DistDesc, dst: &DistDesc, axis: Axis, grid: &Grid) -> Plan {
    use Dist::*;
    let (s, d) = (src.dist(axis), dst.dist(axis));
    let (sa, da) = (src.align(axis), dst.align(axis));
    match (s, d) {
        (Diag, Repl) => Plan::DiagAllGather(axis),
        (_, Repl) => Plan::AllGather(axis),
        // Diagonal conversions route through full replication of the axis.
        (Diag, _) | (_, Diag) => Plan::TwoHop(with_axis(src, axis, Repl, 0)),
        (VecCm, GridRow) | (VecRm, GridCol) => {
            if da == sa % d.stride(grid) {
                Plan::PartialAllGather(axis)
            } else {
                // Realign the vector first so the coarsening lands on `da`.
                Plan::TwoHop(with_axis(src, axis, s, da))
            }
        }
        (VecCm, VecRm) | (VecRm, VecCm) => Plan::VecExchange(axis),
        (GridRow, VecCm) | (GridCol, VecRm) => {
            // Refinement with incompatible alignments: refine in place, then
            // realign among the vector ranks.
            Plan::TwoHop(with_axis(dst, axis, d, sa))
        }
        (GridRow, GridCol) | (GridRow, VecRm) => Plan::TwoHop(with_axis(src, axis, VecCm, sa)),
        (GridCol, GridRow) | (GridCol, VecCm) => Plan::TwoHop(with_axis(src, axis, VecRm, sa)),
        (VecCm, GridCol) => Plan::TwoHop(with_axis(src, axis, VecRm, da)),
        (VecRm, GridRow) => Plan::TwoHop(with_axis(src, axis, VecCm, da)),
        _ => fallback(src, dst),
    }
}

fn both_change(src: &DistDesc, dst: &DistDesc, grid: &Grid) -> Plan {
    use Dist::*;
    let s = (src.col_dist, src.row_dist);
    let d = (dst.col_dist, dst.row_dist);
    match (s, d) {
        ((GridRow, GridCol), (VecCm, Repl)) | ((GridCol, GridRow), (VecRm, Repl)) => {
            if dst.col_align % src.col_dist.stride(grid) == src.col_align {
                Plan::Demote(Axis::Col)
            } else {
                Plan::TwoHop(with_axis(dst, Axis::Col, dst.col_dist, src.col_align))
            }
        }
        ((VecCm, Repl), (GridRow, GridCol)) | ((VecRm, Repl), (GridCol, GridRow)) => {
            if dst.col_align == src.col_align % dst.col_dist.stride(grid) {
                Plan::Promote(Axis::Col)
            } else {
                Plan::TwoHop(with_axis(src, Axis::Col, src.col_dist, dst.col_align))
            }
        }
        ((GridCol, GridRow), (Repl, VecCm)) | ((GridRow, GridCol), (Repl, VecRm)) => {
            if dst.row_align % src.row_dist.stride(grid) == src.row_align {
                Plan::Demote(Axis::Row)
            } else {
                Plan::TwoHop(with_axis(dst, Axis::Row, dst.row_dist, src.row_align))
            }
        }
        ((Repl, VecCm), (GridCol, GridRow)) | ((Repl, VecRm), (GridRow, GridCol)) => {
            if dst.row_align == src.row_align % dst.row_dist.stride(grid) {
                Plan::Promote(Axis::Row)
            } else {
                Plan::TwoHop(with_axis(src, Axis::Row, src.row_dist, dst.row_align))
            }
        }
        ((GridRow, GridCol), (GridCol, GridRow)) | ((GridCol, GridRow), (GridRow, GridCol)) => {
            if grid.height() == grid.width()
                && src.col_align == dst.col_align
                && src.row_align == dst.row_align
            {
                Plan::TransposeExchange
            } else {
                // Collapse onto the source-order vector axis, then spread
                // over the transposed pair.
                let mid = DistDesc {
                    col_dist: vector_of(src.col_dist),
                    row_dist: Repl,
                    col_align: src.col_align,
                    row_align: 0,
                    root: 0,
                };
                Plan::TwoHop(mid)
            }
        }
        _ => fallback(src, dst),
    }
}

fn fallback(src: &DistDesc, dst: &DistDesc) -> Plan {
    let mid = if is_legal_pair(src.col_dist, dst.row_dist) {
        DistDesc {
            col_dist: src.col_dist,
            row_dist: dst.row_dist,
            col_align: src.col_align,
            row_align: dst.row_align,
            root: 0,
        }
    } else if is_legal_pair(dst.col_dist, src.row_dist) {
        DistDesc {
            col_dist: dst.col_dist,
            row_dist: src.row_dist,
            col_align: dst.col_align,
            row_align: src.row_align,
            root: 0,
        }
    } else {
        DistDesc {
            col_dist: Dist::Repl,
            row_dist: Dist::Repl,
            col_align: 0,
            row_align: 0,
            root: 0,
        }
    };
    Plan::TwoHop(mid)
}

/// Choose the communication pattern taking `src` data onto `dst` placement
pub(crate) fn classify(src: &DistDesc, dst: &DistDesc, grid: &Grid) -> Plan {
    if refinable(src, dst, grid) {
        return Plan::Filter;
    }
    if src.col_dist == dst.col_dist && src.row_dist == dst.row_dist {
        return Plan::Translate;
    }
    if src.col_dist == Dist::Single {
        return Plan::Scatter;
    }
    if dst.col_dist == Dist::Single {
        return Plan::Gather;
    }
    for (axis, other) in [(Axis::Col, Axis::Row), (Axis::Row, Axis::Col)] {
        if src.dist(other) == dst.dist(other) && src.dist(axis) != dst.dist(axis) {
            if src.align(other) != dst.align(other) {
                // Realign the unchanged axis before touching the other one.
                let mut mid = *src;
                match other {
                    Axis::Col => mid.col_align = dst.col_align,
                    Axis::Row => mid.row_align = dst.row_align,
                }
                return Plan::TwoHop(mid);
            }
            return classify_axis(src, dst, axis, grid);
        }
    }
    both_change(src, dst, grid)
}
