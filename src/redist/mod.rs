//! Redistribution: move a matrix between any two partitioning descriptors
//!
//! [`convert`] is the single entry point. It is collective over the grid:
//! every process calls it with the same source and destination, the planner
//! picks a communication pattern for the descriptor pair, and the matching
//! template moves the data. Pairs with no direct template route through
//! intermediate descriptors, one axis at a time.
//!
//! Before any data moves, an unconstrained destination adopts compatible
//! alignments from the source so that as much of the transfer as possible
//! degenerates into local copies. Alignments the caller fixed, and attached
//! views, are never touched.

mod pack;
mod plan;
mod templates;

use std::sync::Arc;

use crate::dist::{resolve_align, Axis, Dist};
use crate::error::{Error, Result};
use crate::matrix::DistMatrix;
use crate::scalar::Scalar;

use plan::Plan;

/// Routes involve at most a handful of intermediates; anything deeper is a
/// planning bug surfaced as an error rather than unbounded recursion.
const MAX_DEPTH: usize = 8;

/// Rebuild `dst` so it holds the same global matrix as `src` under `dst`'s
/// descriptor
///
/// Collective over the whole grid. The destination is resized to the source's
/// global extents; a locked view is rejected, and an attached view must
/// already have the right extents and enough room.
pub fn convert<T: Scalar>(src: &DistMatrix<T>, dst: &mut DistMatrix<T>) -> Result<()> {
    if !Arc::ptr_eq(src.grid(), dst.grid()) {
        return Err(Error::GridMismatch);
    }
    let grid = src.grid();
    if dst.viewing() {
        if dst.height() != src.height() || dst.width() != src.width() {
            return Err(Error::DimensionMismatch {
                expected: (src.height(), src.width()),
                got: (dst.height(), dst.width()),
            });
        }
    } else {
        for axis in [Axis::Col, Axis::Row] {
            let d = dst.desc().dist(axis);
            if matches!(d, Dist::Repl | Dist::Single) {
                continue;
            }
            let constrained = match axis {
                Axis::Col => dst.col_constrained(),
                Axis::Row => dst.row_constrained(),
            };
            if constrained {
                continue;
            }
            if let Some(a) = resolve_align(d, src.desc(), grid) {
                dst.adopt_align(axis, a);
            }
        }
    }
    dst.resize(src.height(), src.width())?;
    if src.height() * src.width() == 0 {
        return Ok(());
    }
    execute(src, dst, 0)
}

fn execute<T: Scalar>(src: &DistMatrix<T>, dst: &mut DistMatrix<T>, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::Unsupported {
            from_col: src.desc().col_dist,
            from_row: src.desc().row_dist,
            to_col: dst.desc().col_dist,
            to_row: dst.desc().row_dist,
        });
    }
    match plan::classify(src.desc(), dst.desc(), src.grid()) {
        Plan::Filter => templates::filter(src, dst),
        Plan::Translate => templates::translate(src, dst),
        Plan::AllGather(axis) => templates::all_gather_axis(axis, src, dst),
        Plan::DiagAllGather(axis) => templates::diag_all_gather(axis, src, dst),
        Plan::PartialAllGather(axis) => templates::partial_all_gather(axis, src, dst),
        Plan::VecExchange(axis) => templates::vec_exchange(axis, src, dst),
        Plan::Demote(axis) => templates::demote(axis, src, dst),
        Plan::Promote(axis) => templates::promote(axis, src, dst),
        Plan::TransposeExchange => templates::transpose_exchange(src, dst),
        Plan::Gather => templates::gather_single(src, dst),
        Plan::Scatter => templates::scatter_single(src, dst),
        Plan::TwoHop(mid) => {
            let mut tmp = DistMatrix::with_desc(Arc::clone(src.grid()), mid)?;
            tmp.resize(src.height(), src.width())?;
            execute(src, &mut tmp, depth + 1)?;
            execute(&tmp, dst, depth + 1)
        }
    }
}
