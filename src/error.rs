//! Error types for gridmat

use crate::dist::Dist;
use thiserror::Error;

/// Result type alias using gridmat's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gridmat operations
///
/// Variants fall into four groups: configuration errors (raised once, at grid
/// construction), logic errors (bad descriptor pairs, shape mismatches, writes
/// through locked views), participation errors (collective entered from a
/// process that holds no seat in the relevant group), and resource errors.
/// None of these are retried internally; all surface to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Grid shape does not cover the process count
    #[error("Grid shape {height}x{width} does not match {procs} processes")]
    GridShape {
        /// Requested grid height
        height: usize,
        /// Requested grid width
        width: usize,
        /// Number of processes in the communicator
        procs: usize,
    },

    /// Column/row distribution pairing that the data model does not define
    #[error("Illegal distribution pair ({col:?}, {row:?})")]
    IllegalDistPair {
        /// Column-axis distribution kind
        col: Dist,
        /// Row-axis distribution kind
        row: Dist,
    },

    /// No conversion rule exists for a descriptor pair
    #[error("Redistribution from ({from_col:?}, {from_row:?}) to ({to_col:?}, {to_row:?}) is not supported")]
    Unsupported {
        /// Source column distribution
        from_col: Dist,
        /// Source row distribution
        from_row: Dist,
        /// Target column distribution
        to_col: Dist,
        /// Target row distribution
        to_row: Dist,
    },

    /// Operand dimensions do not agree
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Expected (height, width)
        expected: (usize, usize),
        /// Actual (height, width)
        got: (usize, usize),
    },

    /// Global coordinate outside the matrix
    #[error("Entry ({i}, {j}) out of bounds for {height}x{width} matrix")]
    EntryOutOfBounds {
        /// Global row index
        i: usize,
        /// Global column index
        j: usize,
        /// Matrix height
        height: usize,
        /// Matrix width
        width: usize,
    },

    /// Mutation attempted through a locked view
    #[error("Cannot mutate a locked view")]
    LockedView,

    /// Alignment change on a matrix viewing attached memory
    #[error("Cannot realign a matrix viewing external memory")]
    RealignView,

    /// Resize attempted on an attached view with incompatible extents
    #[error("Attached buffer cannot hold a {height}x{width} local block (ldim {ldim})")]
    ViewTooSmall {
        /// Required local height
        height: usize,
        /// Required local width
        width: usize,
        /// Leading dimension of the attached buffer
        ldim: usize,
    },

    /// Alignment adoption between unrelated distribution kinds
    #[error("No alignment resolution from ({from_col:?}, {from_row:?}) onto {onto:?}")]
    NonsensicalAlignment {
        /// Source column distribution
        from_col: Dist,
        /// Source row distribution
        from_row: Dist,
        /// Distribution kind asking to adopt an alignment
        onto: Dist,
    },

    /// Alignment outside `[0, stride)`
    #[error("Alignment {align} out of range for stride {stride}")]
    AlignOutOfRange {
        /// Requested alignment
        align: usize,
        /// Stride of the distribution along that axis
        stride: usize,
    },

    /// Collective invoked by a process outside the participating set
    #[error("Process {rank} does not participate in this collective")]
    NotParticipating {
        /// Grid rank of the offending process
        rank: usize,
    },

    /// Reduction requested along an axis that is not replicated
    #[error("Axis is distributed as {dist:?}; sum_over requires a replicated axis")]
    AxisNotReplicated {
        /// Distribution kind of the offending axis
        dist: Dist,
    },

    /// Matrices attached to different grids in one operation
    #[error("Operands are attached to different process grids")]
    GridMismatch,

    /// Scratch allocation failure
    #[error("Out of memory: failed to reserve {len} scratch elements")]
    OutOfMemory {
        /// Requested length in elements
        len: usize,
    },
}
