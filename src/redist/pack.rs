//! Strided submatrix movement: the pack and unpack phases
//!
//! Every conversion template moves data between a column-major slab and a
//! tight staging arena through one helper, [`copy_strided`]. Packing uses a
//! strided source and tight destination; unpacking the reverse. Column
//! ranges of the destination are independent, so large moves are
//! parallelized per destination column.

use crate::scalar::Scalar;

/// Element count above which the copy fans out across threads
#[cfg(feature = "rayon")]
const PAR_THRESHOLD: usize = 8192;

/// Addressing of a column-major slab: which `nrows x ncols` sub-lattice of
/// it a copy touches
#[derive(Clone, Copy, Debug)]
pub(crate) struct Lattice {
    /// Leading dimension of the slab
    pub ldim: usize,
    /// First local row touched
    pub row_start: usize,
    /// Step between touched rows
    pub row_stride: usize,
    /// First local column touched
    pub col_start: usize,
    /// Step between touched columns
    pub col_stride: usize,
}

impl Lattice {
    /// The whole of a tight `nrows`-high slab
    pub fn tight(nrows: usize) -> Self {
        Lattice {
            ldim: nrows.max(1),
            row_start: 0,
            row_stride: 1,
            col_start: 0,
            col_stride: 1,
        }
    }

    /// Contiguous rows starting at a column offset of a slab
    pub fn columns(ldim: usize, col_start: usize, col_stride: usize) -> Self {
        Lattice {
            ldim,
            row_start: 0,
            row_stride: 1,
            col_start,
            col_stride,
        }
    }

    #[inline]
    fn idx(&self, r: usize, c: usize) -> usize {
        (self.row_start + r * self.row_stride) + (self.col_start + c * self.col_stride) * self.ldim
    }
}

fn copy_column<T: Scalar>(
    dst_col: &mut [T],
    dst_row_start: usize,
    dst_row_stride: usize,
    src: &[T],
    s: &Lattice,
    c: usize,
    nrows: usize,
) {
    if dst_row_stride == 1 && s.row_stride == 1 {
        let so = s.idx(0, c);
        dst_col[dst_row_start..dst_row_start + nrows].copy_from_slice(&src[so..so + nrows]);
    } else {
        for r in 0..nrows {
            dst_col[dst_row_start + r * dst_row_stride] = src[s.idx(r, c)];
        }
    }
}

/// Copy an `nrows x ncols` sub-lattice of `src` onto one of `dst`
///
/// The two lattices address disjoint columns per step, so the copy is safe
/// to run column-parallel; it does so above a size threshold when the
/// `rayon` feature is on.
pub(crate) fn copy_strided<T: Scalar>(
    dst: &mut [T],
    d: Lattice,
    src: &[T],
    s: Lattice,
    nrows: usize,
    ncols: usize,
) {
    if nrows == 0 || ncols == 0 {
        return;
    }

    #[cfg(feature = "rayon")]
    {
        if nrows * ncols >= PAR_THRESHOLD {
            use rayon::prelude::*;
            dst.par_chunks_mut(d.ldim)
                .enumerate()
                .for_each(|(jc, dst_col)| {
                    if jc < d.col_start || (jc - d.col_start) % d.col_stride != 0 {
                        return;
                    }
                    let c = (jc - d.col_start) / d.col_stride;
                    if c >= ncols {
                        return;
                    }
                    copy_column(dst_col, d.row_start, d.row_stride, src, &s, c, nrows);
                });
            return;
        }
    }

    for c in 0..ncols {
        let col_off = (d.col_start + c * d.col_stride) * d.ldim;
        let dst_col = &mut dst[col_off..col_off + d.ldim];
        copy_column(dst_col, d.row_start, d.row_stride, src, &s, c, nrows);
    }
}
