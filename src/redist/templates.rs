//! The communication templates behind each [`super::plan::Plan`] variant
//!
//! Every template is a pack, exchange, unpack pipeline: strided local data is
//! packed tight, moved with one collective or pairwise exchange on the right
//! process group, and unpacked into the destination's strided block. Shifts
//! and lengths come from the descriptor axis maps, so a template never needs
//! to inspect remote state.

use num_traits::Zero;

use crate::dist::{grid_rank_for, length, shift, Axis, AxisMap, Dist};
use crate::error::Result;
use crate::grid::Grid;
use crate::matrix::DistMatrix;
use crate::scalar::Scalar;

use super::pack::{copy_strided, Lattice};

fn pack_into<T: Scalar>(m: &DistMatrix<T>, out: &mut [T]) {
    copy_strided(
        out,
        Lattice::tight(m.local_height()),
        m.local_buffer(),
        Lattice::columns(m.ldim(), 0, 1),
        m.local_height(),
        m.local_width(),
    );
}

fn pack_vec<T: Scalar>(m: &DistMatrix<T>) -> Vec<T> {
    let mut out = vec![T::zero(); m.local_height() * m.local_width()];
    pack_into(m, &mut out);
    out
}

fn unpack_full<T: Scalar>(dst: &mut DistMatrix<T>, data: &[T]) -> Result<()> {
    let (lh, lw, ld) = (dst.local_height(), dst.local_width(), dst.ldim());
    copy_strided(
        dst.local_buffer_mut()?,
        Lattice::columns(ld, 0, 1),
        data,
        Lattice::tight(lh),
        lh,
        lw,
    );
    Ok(())
}

/// Strided copy between two matrices on the same process
fn copy_between<T: Scalar>(src: &DistMatrix<T>, dst: &mut DistMatrix<T>) -> Result<()> {
    let (lh, lw) = (dst.local_height(), dst.local_width());
    let (sld, dld) = (src.ldim(), dst.ldim());
    copy_strided(
        dst.local_buffer_mut()?,
        Lattice::columns(dld, 0, 1),
        src.local_buffer(),
        Lattice::columns(sld, 0, 1),
        lh,
        lw,
    );
    Ok(())
}

/// Extract the destination's entries out of a locally complete source
///
/// Applies when every destination entry already lives here: the identity,
/// any replicated-to-distributed cut, and a coarse-to-fine vector refinement
/// with agreeing alignments.
pub(crate) fn filter<T: Scalar>(src: &DistMatrix<T>, dst: &mut DistMatrix<T>) -> Result<()> {
    let (lh, lw) = (dst.local_height(), dst.local_width());
    if lh * lw == 0 {
        return Ok(());
    }
    let sub = |sm: &AxisMap, dm: &AxisMap| {
        let ds = dm.shift().unwrap_or(0);
        let ss = sm.shift().unwrap_or(0);
        ((ds - ss) / sm.stride, dm.stride / sm.stride)
    };
    let (rs, rstep) = sub(&src.col_map(), &dst.col_map());
    let (cs, cstep) = sub(&src.row_map(), &dst.row_map());
    let s = Lattice {
        ldim: src.ldim(),
        row_start: rs,
        row_stride: rstep,
        col_start: cs,
        col_stride: cstep,
    };
    let dld = dst.ldim();
    let src_buf = src.local_buffer();
    copy_strided(
        dst.local_buffer_mut()?,
        Lattice::columns(dld, 0, 1),
        src_buf,
        s,
        lh,
        lw,
    );
    Ok(())
}

/// Pairwise exchange between identically distributed but shifted placements
pub(crate) fn translate<T: Scalar>(src: &DistMatrix<T>, dst: &mut DistMatrix<T>) -> Result<()> {
    let grid = src.grid();
    let me = grid.vc_rank();
    let (scm, srm) = (src.col_map(), src.row_map());
    let (dcm, drm) = (dst.col_map(), dst.row_map());
    let send_len = src.local_height() * src.local_width();
    let recv_len = dst.local_height() * dst.local_width();

    // Axis ranks depend only on this process's coordinates, so they are the
    // same under both descriptors; only the shifts move.
    let to = match (scm.rank, srm.rank) {
        (Some(rc), Some(rr)) if send_len > 0 => {
            let tc = (rc + dcm.align + scm.stride - scm.align) % scm.stride;
            let tr = (rr + drm.align + srm.stride - srm.align) % srm.stride;
            Some(grid_rank_for(dst.desc(), tc, tr, grid.row(), grid.col(), grid))
        }
        _ => None,
    };
    let from = match (dcm.rank, drm.rank) {
        (Some(rc), Some(rr)) if recv_len > 0 => {
            let fc = (rc + scm.align + dcm.stride - dcm.align) % dcm.stride;
            let fr = (rr + srm.align + drm.stride - drm.align) % drm.stride;
            Some(grid_rank_for(src.desc(), fc, fr, grid.row(), grid.col(), grid))
        }
        _ => None,
    };

    if to == Some(me) {
        // My block stays put; shifts agree, so extents match exactly.
        return copy_between(src, dst);
    }
    if let Some(t) = to {
        let mut scratch = src.pool().acquire(send_len);
        pack_into(src, &mut scratch);
        grid.all_comm().send(t, &scratch);
    }
    if let Some(f) = from {
        let data: Vec<T> = grid.all_comm().recv(f);
        unpack_full(dst, &data)?;
    }
    Ok(())
}

/// Replicate one distributed axis with an all-gather over its process group
pub(crate) fn all_gather_axis<T: Scalar>(
    axis: Axis,
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let sm = src.desc().axis_map(axis, grid);
    let comm = grid.comm_for(sm.dist)?;
    let n = match axis {
        Axis::Col => src.height(),
        Axis::Row => src.width(),
    };
    let mut scratch = src.pool().acquire(src.local_height() * src.local_width());
    pack_into(src, &mut scratch);
    let parts = comm.all_gather(&scratch);
    drop(scratch);

    let dld = dst.ldim();
    let (dlh, dlw) = (dst.local_height(), dst.local_width());
    let buf = dst.local_buffer_mut()?;
    for (t, part) in parts.iter().enumerate() {
        let sh = sm.shift_of(t);
        let cnt = length(n, sh, sm.stride);
        if cnt == 0 {
            continue;
        }
        match axis {
            Axis::Col => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: sh,
                    row_stride: sm.stride,
                    col_start: 0,
                    col_stride: 1,
                },
                part,
                Lattice::tight(cnt),
                cnt,
                dlw,
            ),
            Axis::Row => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: 0,
                    row_stride: 1,
                    col_start: sh,
                    col_stride: sm.stride,
                },
                part,
                Lattice::tight(dlh),
                dlh,
                cnt,
            ),
        }
    }
    Ok(())
}

/// Replicate a diagonal axis: all-gather on the diagonal, broadcast to the rest
pub(crate) fn diag_all_gather<T: Scalar>(
    axis: Axis,
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let (h, w) = (src.height(), src.width());
    let sm = src.desc().axis_map(axis, grid);
    let n = match axis {
        Axis::Col => h,
        Axis::Row => w,
    };
    let mut full = vec![T::zero(); h * w];
    if let Ok(dcomm) = grid.diag_comm() {
        let packed = pack_vec(src);
        let parts = dcomm.all_gather(&packed);
        for (d, part) in parts.iter().enumerate() {
            let sh = sm.shift_of(d);
            let cnt = length(n, sh, sm.stride);
            if cnt == 0 {
                continue;
            }
            match axis {
                Axis::Col => copy_strided(
                    &mut full,
                    Lattice {
                        ldim: h,
                        row_start: sh,
                        row_stride: sm.stride,
                        col_start: 0,
                        col_stride: 1,
                    },
                    part,
                    Lattice::tight(cnt),
                    cnt,
                    w,
                ),
                Axis::Row => copy_strided(
                    &mut full,
                    Lattice {
                        ldim: h,
                        row_start: 0,
                        row_stride: 1,
                        col_start: sh,
                        col_stride: sm.stride,
                    },
                    part,
                    Lattice::tight(h),
                    h,
                    cnt,
                ),
            }
        }
    }
    // Grid rank zero sits at (0, 0), which is always diagonal rank zero.
    grid.all_comm().broadcast(0, &mut full);
    unpack_full(dst, &full)
}

/// Exchange group and member-to-vector-rank mapping for a vector kind
///
/// `VecCm` deals within grid rows, `VecRm` within grid columns; the member at
/// exchange rank `t` holds vector rank `vrank(t)`.
fn exchange_group(grid: &Grid, vec: Dist) -> (&crate::comm::Comm, impl Fn(usize) -> usize + '_) {
    let comm = match vec {
        Dist::VecCm => grid.row_comm(),
        _ => grid.col_comm(),
    };
    let vrank = move |t: usize| match vec {
        Dist::VecCm => grid.row() + t * grid.height(),
        _ => t * grid.width() + grid.col(),
    };
    (comm, vrank)
}

/// Coarsen a vector axis to its grid kind: all-gather over the complement
pub(crate) fn partial_all_gather<T: Scalar>(
    axis: Axis,
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let sm = src.desc().axis_map(axis, grid);
    let dm = dst.desc().axis_map(axis, grid);
    let n = match axis {
        Axis::Col => src.height(),
        Axis::Row => src.width(),
    };
    let (comm, vrank) = exchange_group(grid, sm.dist);
    let mut scratch = src.pool().acquire(src.local_height() * src.local_width());
    pack_into(src, &mut scratch);
    let parts = comm.all_gather(&scratch);
    drop(scratch);

    let step = sm.stride / dm.stride;
    let dshift = dm.shift().unwrap_or(0);
    let dld = dst.ldim();
    let (dlh, dlw) = (dst.local_height(), dst.local_width());
    let buf = dst.local_buffer_mut()?;
    for (t, part) in parts.iter().enumerate() {
        let vsh = shift(vrank(t), sm.align, sm.stride);
        let cnt = length(n, vsh, sm.stride);
        if cnt == 0 {
            continue;
        }
        let start = (vsh - dshift) / dm.stride;
        match axis {
            Axis::Col => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: start,
                    row_stride: step,
                    col_start: 0,
                    col_stride: 1,
                },
                part,
                Lattice::tight(cnt),
                cnt,
                dlw,
            ),
            Axis::Row => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: 0,
                    row_stride: 1,
                    col_start: start,
                    col_stride: step,
                },
                part,
                Lattice::tight(dlh),
                dlh,
                cnt,
            ),
        }
    }
    Ok(())
}

/// Permute between the two vector orders with one pairwise exchange
///
/// Each process's whole block has a single owner under the other order, so
/// the exchange is one send and one receive of a tight block.
pub(crate) fn vec_exchange<T: Scalar>(
    axis: Axis,
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let me = grid.vc_rank();
    let p = grid.size();
    let sm = src.desc().axis_map(axis, grid);
    let dm = dst.desc().axis_map(axis, grid);
    let grid_rank_of = |vec: Dist, r: usize| match vec {
        Dist::VecCm => r,
        _ => (r / grid.width()) + (r % grid.width()) * grid.height(),
    };
    let to = grid_rank_of(dm.dist, (sm.shift().unwrap_or(0) + dm.align) % p);
    let from = grid_rank_of(sm.dist, (dm.shift().unwrap_or(0) + sm.align) % p);
    if to == me {
        return copy_between(src, dst);
    }
    let mut scratch = src.pool().acquire(src.local_height() * src.local_width());
    pack_into(src, &mut scratch);
    let data = grid.all_comm().send_recv(&scratch, to, from);
    drop(scratch);
    unpack_full(dst, &data)
}

/// Collapse a grid-kind pair onto one vector axis with an all-to-all
pub(crate) fn demote<T: Scalar>(
    axis: Axis,
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let other = match axis {
        Axis::Col => Axis::Row,
        Axis::Row => Axis::Col,
    };
    let sm = src.desc().axis_map(axis, grid);
    let som = src.desc().axis_map(other, grid);
    let dm = dst.desc().axis_map(axis, grid);
    let (n_along, n_across) = match axis {
        Axis::Col => (src.height(), src.width()),
        Axis::Row => (src.width(), src.height()),
    };
    let (comm, vrank) = exchange_group(grid, dm.dist);
    let k = comm.size();
    let step = dm.stride / sm.stride;
    let sshift = sm.shift().unwrap_or(0);
    let across_src = match axis {
        Axis::Col => src.local_width(),
        Axis::Row => src.local_height(),
    };

    let mut parts = Vec::with_capacity(k);
    let src_buf = src.local_buffer();
    let sld = src.ldim();
    for t in 0..k {
        let vsh = shift(vrank(t), dm.align, dm.stride);
        let cnt = length(n_along, vsh, dm.stride);
        let start = (vsh - sshift) / sm.stride;
        let mut part = vec![T::zero(); cnt * across_src];
        if cnt * across_src > 0 {
            match axis {
                Axis::Col => copy_strided(
                    &mut part,
                    Lattice::tight(cnt),
                    src_buf,
                    Lattice {
                        ldim: sld,
                        row_start: start,
                        row_stride: step,
                        col_start: 0,
                        col_stride: 1,
                    },
                    cnt,
                    across_src,
                ),
                Axis::Row => copy_strided(
                    &mut part,
                    Lattice::tight(across_src),
                    src_buf,
                    Lattice {
                        ldim: sld,
                        row_start: 0,
                        row_stride: 1,
                        col_start: start,
                        col_stride: step,
                    },
                    across_src,
                    cnt,
                ),
            }
        }
        parts.push(part);
    }
    let recvd = comm.all_to_all(parts);

    let dld = dst.ldim();
    let along_dst = match axis {
        Axis::Col => dst.local_height(),
        Axis::Row => dst.local_width(),
    };
    let buf = dst.local_buffer_mut()?;
    for (t, part) in recvd.iter().enumerate() {
        let osh = som.shift_of(t);
        let ocnt = length(n_across, osh, som.stride);
        if ocnt * along_dst == 0 {
            continue;
        }
        match axis {
            Axis::Col => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: 0,
                    row_stride: 1,
                    col_start: osh,
                    col_stride: som.stride,
                },
                part,
                Lattice::tight(along_dst),
                along_dst,
                ocnt,
            ),
            Axis::Row => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: osh,
                    row_stride: som.stride,
                    col_start: 0,
                    col_stride: 1,
                },
                part,
                Lattice::tight(ocnt),
                ocnt,
                along_dst,
            ),
        }
    }
    Ok(())
}

/// Spread a vector axis back over a grid-kind pair with an all-to-all
pub(crate) fn promote<T: Scalar>(
    axis: Axis,
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let other = match axis {
        Axis::Col => Axis::Row,
        Axis::Row => Axis::Col,
    };
    let sm = src.desc().axis_map(axis, grid);
    let dm = dst.desc().axis_map(axis, grid);
    let dom = dst.desc().axis_map(other, grid);
    let (n_along, n_across) = match axis {
        Axis::Col => (src.height(), src.width()),
        Axis::Row => (src.width(), src.height()),
    };
    let (comm, vrank) = exchange_group(grid, sm.dist);
    let k = comm.size();
    let along_src = match axis {
        Axis::Col => src.local_height(),
        Axis::Row => src.local_width(),
    };

    // Pack per destination: my vector chunk, cut to the columns (or rows)
    // each peer owns under the grid kind. The other source axis is
    // replicated, so local indices along it are global.
    let mut parts = Vec::with_capacity(k);
    let src_buf = src.local_buffer();
    let sld = src.ldim();
    for t in 0..k {
        let osh = dom.shift_of(t);
        let ocnt = length(n_across, osh, dom.stride);
        let mut part = vec![T::zero(); along_src * ocnt];
        if along_src * ocnt > 0 {
            match axis {
                Axis::Col => copy_strided(
                    &mut part,
                    Lattice::tight(along_src),
                    src_buf,
                    Lattice {
                        ldim: sld,
                        row_start: 0,
                        row_stride: 1,
                        col_start: osh,
                        col_stride: dom.stride,
                    },
                    along_src,
                    ocnt,
                ),
                Axis::Row => copy_strided(
                    &mut part,
                    Lattice::tight(ocnt),
                    src_buf,
                    Lattice {
                        ldim: sld,
                        row_start: osh,
                        row_stride: dom.stride,
                        col_start: 0,
                        col_stride: 1,
                    },
                    ocnt,
                    along_src,
                ),
            }
        }
        parts.push(part);
    }
    let recvd = comm.all_to_all(parts);

    let step = sm.stride / dm.stride;
    let dshift = dm.shift().unwrap_or(0);
    let dld = dst.ldim();
    let across_dst = match axis {
        Axis::Col => dst.local_width(),
        Axis::Row => dst.local_height(),
    };
    let buf = dst.local_buffer_mut()?;
    for (t, part) in recvd.iter().enumerate() {
        let vsh = shift(vrank(t), sm.align, sm.stride);
        let cnt = length(n_along, vsh, sm.stride);
        if cnt * across_dst == 0 {
            continue;
        }
        let start = (vsh - dshift) / dm.stride;
        match axis {
            Axis::Col => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: start,
                    row_stride: step,
                    col_start: 0,
                    col_stride: 1,
                },
                part,
                Lattice::tight(cnt),
                cnt,
                across_dst,
            ),
            Axis::Row => copy_strided(
                buf,
                Lattice {
                    ldim: dld,
                    row_start: 0,
                    row_stride: 1,
                    col_start: start,
                    col_stride: step,
                },
                part,
                Lattice::tight(across_dst),
                across_dst,
                cnt,
            ),
        }
    }
    Ok(())
}

/// Trade axes between the two grid-kind pairs on a square grid
///
/// With equal alignments the block this process needs is exactly the block
/// its transposed partner holds, so one pairwise exchange suffices.
pub(crate) fn transpose_exchange<T: Scalar>(
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let me = grid.vc_rank();
    let partner = grid.col() + grid.row() * grid.height();
    if partner == me {
        return copy_between(src, dst);
    }
    let mut scratch = src.pool().acquire(src.local_height() * src.local_width());
    pack_into(src, &mut scratch);
    let data = grid.all_comm().send_recv(&scratch, partner, partner);
    drop(scratch);
    unpack_full(dst, &data)
}

/// Collect the whole matrix onto the destination's root process
pub(crate) fn gather_single<T: Scalar>(
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let root = dst.desc().root;
    let packed = pack_vec(src);
    let Some(parts) = grid.all_comm().gather(&packed, root) else {
        return Ok(());
    };
    let sdesc = *src.desc();
    let (scm, srm) = (src.col_map(), src.row_map());
    let (h, w) = (src.height(), src.width());
    let dld = dst.ldim();
    let buf = dst.local_buffer_mut()?;
    for (q, part) in parts.iter().enumerate() {
        let (Some(cr), Some(rr)) = (
            sdesc.col_dist.rank_of_grid_rank(grid, q, sdesc.root),
            sdesc.row_dist.rank_of_grid_rank(grid, q, sdesc.root),
        ) else {
            continue;
        };
        // Replicated source axes arrive once per replica; keep one.
        if grid_rank_for(&sdesc, cr, rr, 0, 0, grid) != q {
            continue;
        }
        let csh = scm.shift_of(cr);
        let rsh = srm.shift_of(rr);
        let nr = length(h, csh, scm.stride);
        let nc = length(w, rsh, srm.stride);
        if nr * nc == 0 {
            continue;
        }
        copy_strided(
            buf,
            Lattice {
                ldim: dld,
                row_start: csh,
                row_stride: scm.stride,
                col_start: rsh,
                col_stride: srm.stride,
            },
            part,
            Lattice::tight(nr),
            nr,
            nc,
        );
    }
    Ok(())
}

/// Deal the root process's matrix out under the destination descriptor
pub(crate) fn scatter_single<T: Scalar>(
    src: &DistMatrix<T>,
    dst: &mut DistMatrix<T>,
) -> Result<()> {
    let grid = src.grid();
    let root = src.desc().root;
    let ddesc = *dst.desc();
    let (dcm, drm) = (dst.col_map(), dst.row_map());
    let (h, w) = (src.height(), src.width());
    let parts: Option<Vec<Vec<T>>> = if grid.vc_rank() == root {
        let src_buf = src.local_buffer();
        let sld = src.ldim();
        let mut parts = Vec::with_capacity(grid.size());
        for q in 0..grid.size() {
            let (Some(cr), Some(rr)) = (
                ddesc.col_dist.rank_of_grid_rank(grid, q, ddesc.root),
                ddesc.row_dist.rank_of_grid_rank(grid, q, ddesc.root),
            ) else {
                parts.push(Vec::new());
                continue;
            };
            let csh = dcm.shift_of(cr);
            let rsh = drm.shift_of(rr);
            let nr = length(h, csh, dcm.stride);
            let nc = length(w, rsh, drm.stride);
            let mut part = vec![T::zero(); nr * nc];
            if nr * nc > 0 {
                copy_strided(
                    &mut part,
                    Lattice::tight(nr),
                    src_buf,
                    Lattice {
                        ldim: sld,
                        row_start: csh,
                        row_stride: dcm.stride,
                        col_start: rsh,
                        col_stride: drm.stride,
                    },
                    nr,
                    nc,
                );
            }
            parts.push(part);
        }
        Some(parts)
    } else {
        None
    };
    let mine = grid.all_comm().scatter(parts.as_deref(), root);
    unpack_full(dst, &mine)
}
