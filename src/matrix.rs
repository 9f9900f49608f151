//! Distributed matrices: a local slab plus the descriptor that places it
//!
//! A `DistMatrix` owns (or views) the column-major local block of a global
//! `height x width` matrix under a partitioning descriptor. The local block
//! has `local_height() x local_width()` elements stored with a leading
//! dimension `ldim()`, exactly the global entries this process owns under
//! the descriptor. All mutation of placement goes through explicit calls;
//! nothing ever re-labels live data under a different alignment.

use std::sync::Arc;

use num_traits::Zero;

use crate::dist::{Axis, AxisMap, Dist, DistDesc};
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::pool::BufferPool;
use crate::scalar::Scalar;

enum Storage<T> {
    Owned(Vec<T>),
    Attached(Vec<T>),
}

impl<T> Storage<T> {
    fn buf(&self) -> &Vec<T> {
        match self {
            Storage::Owned(b) | Storage::Attached(b) => b,
        }
    }

    fn buf_mut(&mut self) -> &mut Vec<T> {
        match self {
            Storage::Owned(b) | Storage::Attached(b) => b,
        }
    }
}

/// A matrix physically partitioned across a process grid
pub struct DistMatrix<T: Scalar> {
    grid: Arc<Grid>,
    desc: DistDesc,
    height: usize,
    width: usize,
    local_height: usize,
    local_width: usize,
    ldim: usize,
    storage: Storage<T>,
    locked: bool,
    col_constrained: bool,
    row_constrained: bool,
    pool: BufferPool<T>,
}

impl<T: Scalar> DistMatrix<T> {
    /// Empty matrix under the given distribution pair
    pub fn new(grid: Arc<Grid>, col_dist: Dist, row_dist: Dist) -> Result<Self> {
        let desc = DistDesc::new(col_dist, row_dist)?;
        Ok(Self::from_parts(grid, desc, false, false))
    }

    /// Empty matrix under an explicit descriptor, treating its alignments as
    /// caller-chosen (they will not be overridden by redistribution)
    pub fn with_desc(grid: Arc<Grid>, desc: DistDesc) -> Result<Self> {
        if !crate::dist::is_legal_pair(desc.col_dist, desc.row_dist) {
            return Err(Error::IllegalDistPair {
                col: desc.col_dist,
                row: desc.row_dist,
            });
        }
        Ok(Self::from_parts(grid, desc, true, true))
    }

    /// Zero-filled `height x width` matrix under the given distribution pair
    pub fn with_size(
        grid: Arc<Grid>,
        height: usize,
        width: usize,
        col_dist: Dist,
        row_dist: Dist,
    ) -> Result<Self> {
        let mut m = Self::new(grid, col_dist, row_dist)?;
        m.resize(height, width)?;
        Ok(m)
    }

    fn from_parts(
        grid: Arc<Grid>,
        desc: DistDesc,
        col_constrained: bool,
        row_constrained: bool,
    ) -> Self {
        DistMatrix {
            grid,
            desc,
            height: 0,
            width: 0,
            local_height: 0,
            local_width: 0,
            ldim: 1,
            storage: Storage::Owned(Vec::new()),
            locked: false,
            col_constrained,
            row_constrained,
            pool: BufferPool::default(),
        }
    }

    /// Wrap an externally supplied local buffer as a mutable view
    ///
    /// The buffer must already hold this process's local block of a
    /// `height x width` matrix under `desc` with the given leading
    /// dimension; it is never reallocated and can be reclaimed with
    /// [`DistMatrix::detach`].
    pub fn attach(
        grid: Arc<Grid>,
        desc: DistDesc,
        height: usize,
        width: usize,
        buffer: Vec<T>,
        ldim: usize,
    ) -> Result<Self> {
        Self::attach_inner(grid, desc, height, width, buffer, ldim, false)
    }

    /// Wrap an externally supplied local buffer as a read-only view
    ///
    /// Every mutation through the result fails with [`Error::LockedView`].
    pub fn locked_attach(
        grid: Arc<Grid>,
        desc: DistDesc,
        height: usize,
        width: usize,
        buffer: Vec<T>,
        ldim: usize,
    ) -> Result<Self> {
        Self::attach_inner(grid, desc, height, width, buffer, ldim, true)
    }

    fn attach_inner(
        grid: Arc<Grid>,
        desc: DistDesc,
        height: usize,
        width: usize,
        buffer: Vec<T>,
        ldim: usize,
        locked: bool,
    ) -> Result<Self> {
        let mut m = Self::with_desc(grid, desc)?;
        let lh = m.desc.col_map(&m.grid).local_len(height);
        let lw = m.desc.row_map(&m.grid).local_len(width);
        if ldim < lh.max(1) || buffer.len() < ldim * lw {
            return Err(Error::ViewTooSmall {
                height: lh,
                width: lw,
                ldim,
            });
        }
        m.height = height;
        m.width = width;
        m.local_height = lh;
        m.local_width = lw;
        m.ldim = ldim;
        m.storage = Storage::Attached(buffer);
        m.locked = locked;
        Ok(m)
    }

    /// Reclaim the buffer of an attached view (or the owned buffer)
    pub fn detach(self) -> Vec<T> {
        match self.storage {
            Storage::Owned(b) | Storage::Attached(b) => b,
        }
    }

    /// Whether this matrix views externally supplied memory
    #[inline]
    pub fn viewing(&self) -> bool {
        matches!(self.storage, Storage::Attached(_))
    }

    /// Whether this matrix is a read-only view
    #[inline]
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// The grid this matrix is partitioned over
    #[inline]
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// The partitioning descriptor
    #[inline]
    pub fn desc(&self) -> &DistDesc {
        &self.desc
    }

    /// Global height
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Global width
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows stored locally
    #[inline]
    pub fn local_height(&self) -> usize {
        self.local_height
    }

    /// Columns stored locally
    #[inline]
    pub fn local_width(&self) -> usize {
        self.local_width
    }

    /// Leading dimension of the local block
    #[inline]
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    /// Column-axis mapping for the current descriptor
    #[inline]
    pub fn col_map(&self) -> AxisMap {
        self.desc.col_map(&self.grid)
    }

    /// Row-axis mapping for the current descriptor
    #[inline]
    pub fn row_map(&self) -> AxisMap {
        self.desc.row_map(&self.grid)
    }

    /// First global row stored locally (on a participating process)
    pub fn col_shift(&self) -> usize {
        self.col_map().shift().unwrap_or(0)
    }

    /// First global column stored locally (on a participating process)
    pub fn row_shift(&self) -> usize {
        self.row_map().shift().unwrap_or(0)
    }

    /// Rank (along the column axis's dealing order) owning global row `i`
    pub fn row_owner(&self, i: usize) -> usize {
        self.col_map().owner(i)
    }

    /// Rank (along the row axis's dealing order) owning global column `j`
    pub fn col_owner(&self, j: usize) -> usize {
        self.row_map().owner(j)
    }

    /// Whether the column-axis alignment was fixed by the caller
    #[inline]
    pub fn col_constrained(&self) -> bool {
        self.col_constrained
    }

    /// Whether the row-axis alignment was fixed by the caller
    #[inline]
    pub fn row_constrained(&self) -> bool {
        self.row_constrained
    }

    /// The local block, column-major with leading dimension [`Self::ldim`]
    #[inline]
    pub fn local_buffer(&self) -> &[T] {
        self.storage.buf()
    }

    /// Mutable local block; fails on a locked view
    pub fn local_buffer_mut(&mut self) -> Result<&mut [T]> {
        if self.locked {
            return Err(Error::LockedView);
        }
        Ok(self.storage.buf_mut())
    }

    pub(crate) fn pool(&self) -> &BufferPool<T> {
        &self.pool
    }

    /// Take on an alignment during redistribution without constraining it
    ///
    /// Only meaningful before the local block is (re)built; the caller
    /// resizes immediately afterwards.
    pub(crate) fn adopt_align(&mut self, axis: Axis, align: usize) {
        match axis {
            Axis::Col => self.desc.col_align = align,
            Axis::Row => self.desc.row_align = align,
        }
    }

    /// Resize to a `height x width` global matrix
    ///
    /// Local extents are recomputed from the descriptor; previous local
    /// contents are invalidated. On an attached view the existing buffer
    /// must already be large enough, otherwise this is a logic error.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        let lh = self.desc.col_map(&self.grid).local_len(height);
        self.resize_with_ldim(height, width, lh.max(1))
    }

    /// Resize with an explicit leading dimension
    ///
    /// On an attached view the leading dimension fixed at attach time is
    /// kept; the new local extents must fit under it.
    pub fn resize_with_ldim(&mut self, height: usize, width: usize, ldim: usize) -> Result<()> {
        if self.locked {
            return Err(Error::LockedView);
        }
        let lh = self.desc.col_map(&self.grid).local_len(height);
        let lw = self.desc.row_map(&self.grid).local_len(width);
        let ldim = ldim.max(lh.max(1));
        match &mut self.storage {
            Storage::Owned(buf) => {
                buf.clear();
                buf.resize(ldim * lw, T::zero());
                self.ldim = ldim;
            }
            Storage::Attached(buf) => {
                // The attached layout belongs to the caller; its leading
                // dimension is fixed at attach time and must still fit.
                if lh > self.ldim || buf.len() < self.ldim * lw {
                    return Err(Error::ViewTooSmall {
                        height: lh,
                        width: lw,
                        ldim: self.ldim,
                    });
                }
            }
        }
        self.height = height;
        self.width = width;
        self.local_height = lh;
        self.local_width = lw;
        Ok(())
    }

    fn set_align(&mut self, axis: Axis, align: usize) -> Result<()> {
        if self.viewing() {
            return Err(Error::RealignView);
        }
        let stride = self.desc.dist(axis).stride(&self.grid);
        if align >= stride {
            return Err(Error::AlignOutOfRange { align, stride });
        }
        match axis {
            Axis::Col => {
                self.desc.col_align = align;
                self.col_constrained = true;
            }
            Axis::Row => {
                self.desc.row_align = align;
                self.row_constrained = true;
            }
        }
        // Alignment changes the owner map, so live data would be mislabeled;
        // re-create the local block instead.
        self.resize(self.height, self.width)
    }

    /// Fix the column-axis alignment (re-creates the local block)
    pub fn align_cols(&mut self, align: usize) -> Result<()> {
        self.set_align(Axis::Col, align)
    }

    /// Fix the row-axis alignment (re-creates the local block)
    pub fn align_rows(&mut self, align: usize) -> Result<()> {
        self.set_align(Axis::Row, align)
    }

    /// Adopt alignments from another matrix's descriptor
    ///
    /// Each distributed axis adopts through the resolution table (direct
    /// match, axis swap, or modular reduction from a finer linear kind);
    /// an axis with no applicable rule is a logic error.
    pub fn align_with(&mut self, other: &DistDesc) -> Result<()> {
        let mut aligns = [None, None];
        for (slot, axis) in aligns.iter_mut().zip([Axis::Col, Axis::Row]) {
            let dist = self.desc.dist(axis);
            if matches!(dist, Dist::Repl | Dist::Single) {
                continue;
            }
            match crate::dist::resolve_align(dist, other, &self.grid) {
                Some(a) => *slot = Some(a),
                None => {
                    return Err(Error::NonsensicalAlignment {
                        from_col: other.col_dist,
                        from_row: other.row_dist,
                        onto: dist,
                    })
                }
            }
        }
        if let Some(a) = aligns[0] {
            self.set_align(Axis::Col, a)?;
        }
        if let Some(a) = aligns[1] {
            self.set_align(Axis::Row, a)?;
        }
        Ok(())
    }

    /// Release the caller's hold on the column-axis alignment
    pub fn free_col_align(&mut self) {
        self.col_constrained = false;
    }

    /// Release the caller's hold on the row-axis alignment
    pub fn free_row_align(&mut self) {
        self.row_constrained = false;
    }

    fn check_entry(&self, i: usize, j: usize) -> Result<()> {
        if i >= self.height || j >= self.width {
            return Err(Error::EntryOutOfBounds {
                i,
                j,
                height: self.height,
                width: self.width,
            });
        }
        Ok(())
    }

    /// Local element at local coordinates `(i_loc, j_loc)`
    #[inline]
    pub fn get_local(&self, i_loc: usize, j_loc: usize) -> T {
        debug_assert!(i_loc < self.local_height && j_loc < self.local_width);
        self.storage.buf()[i_loc + j_loc * self.ldim]
    }

    /// Store into the local block at local coordinates
    pub fn set_local(&mut self, i_loc: usize, j_loc: usize, value: T) -> Result<()> {
        if self.locked {
            return Err(Error::LockedView);
        }
        debug_assert!(i_loc < self.local_height && j_loc < self.local_width);
        let idx = i_loc + j_loc * self.ldim;
        self.storage.buf_mut()[idx] = value;
        Ok(())
    }

    /// Fetch the entry at global coordinates `(i, j)`
    ///
    /// Collective: every grid process must call it with the same arguments;
    /// the owner broadcasts the value to the whole grid.
    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        self.check_entry(i, j)?;
        let root = self.desc.owner_grid_rank(i, j, &self.grid);
        let mut val = vec![T::zero()];
        if self.grid.vc_rank() == root {
            let li = self
                .col_map()
                .local_index(i)
                .expect("owner resolves its own local row");
            let lj = self
                .row_map()
                .local_index(j)
                .expect("owner resolves its own local column");
            val[0] = self.get_local(li, lj);
        }
        self.grid.all_comm().broadcast(root, &mut val);
        Ok(val[0])
    }

    /// Store `value` at global coordinates `(i, j)`
    ///
    /// Purely local: the processes owning the entry (every replica) store it,
    /// everyone else returns without touching anything. No communication.
    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.check_entry(i, j)?;
        if self.locked {
            return Err(Error::LockedView);
        }
        if let (Some(li), Some(lj)) = (self.col_map().local_index(i), self.row_map().local_index(j))
        {
            self.set_local(li, lj, value)?;
        }
        Ok(())
    }

    /// Sum replicated partial contributions along `axis`
    ///
    /// The axis must currently be replicated. Each process's local block is
    /// replaced by the elementwise sum over the group of processes holding
    /// replicas; on a grid where that group is this process alone the call
    /// is a no-op.
    pub fn sum_over(&mut self, axis: Axis) -> Result<()> {
        if self.locked {
            return Err(Error::LockedView);
        }
        let axis_dist = self.desc.dist(axis);
        if axis_dist != Dist::Repl {
            return Err(Error::AxisNotReplicated { dist: axis_dist });
        }
        let other = match axis {
            Axis::Row => self.desc.col_dist,
            Axis::Col => self.desc.row_dist,
        };
        let comm = match other {
            Dist::GridRow => self.grid.row_comm(),
            Dist::GridCol => self.grid.col_comm(),
            Dist::Repl => self.grid.all_comm(),
            // The remaining kinds leave each replica group a single process.
            Dist::VecCm | Dist::VecRm | Dist::Diag | Dist::Single => return Ok(()),
        };
        if comm.size() == 1 {
            return Ok(());
        }
        let (lh, lw, ldim) = (self.local_height, self.local_width, self.ldim);
        let mut scratch = self.pool.acquire(lh * lw);
        {
            let buf = self.storage.buf();
            for j in 0..lw {
                scratch[j * lh..(j + 1) * lh].copy_from_slice(&buf[j * ldim..j * ldim + lh]);
            }
        }
        comm.all_reduce_sum(&mut scratch);
        let buf = self.storage.buf_mut();
        for j in 0..lw {
            buf[j * ldim..j * ldim + lh].copy_from_slice(&scratch[j * lh..(j + 1) * lh]);
        }
        Ok(())
    }

    /// Rebuild this matrix from `src` under this matrix's descriptor
    ///
    /// The redistribution entry point; see [`crate::redist::convert`].
    pub fn redist_from(&mut self, src: &DistMatrix<T>) -> Result<()> {
        crate::redist::convert(src, self)
    }

    /// Copy of this matrix under another distribution pair
    pub fn redistribute(&self, col_dist: Dist, row_dist: Dist) -> Result<DistMatrix<T>> {
        let mut dst = DistMatrix::new(Arc::clone(&self.grid), col_dist, row_dist)?;
        crate::redist::convert(self, &mut dst)?;
        Ok(dst)
    }
}
