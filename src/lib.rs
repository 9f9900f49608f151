//! # gridmat
//!
//! **Distributed dense matrices over a 2D process grid, with a complete
//! redistribution engine.**
//!
//! gridmat partitions a global matrix over an R x C grid of processes. Each
//! process stores only its local block, and a [`dist::DistDesc`] records the
//! rule placing every global entry: seven distribution kinds per axis
//! (round-robin over grid rows, grid columns, all processes in either
//! rank order, the grid diagonal, full replication, or a single root),
//! each with an alignment choosing which process gets index zero.
//!
//! [`redist::convert`] moves a matrix between any two legal descriptors,
//! picking the cheapest of a family of communication patterns: local
//! filters, pairwise realignment exchanges, axis all-gathers, all-to-alls
//! between grid and vector kinds, the square-grid transpose exchange, and
//! root gathers/scatters, with multi-hop routing for everything else.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridmat::prelude::*;
//! use std::sync::Arc;
//!
//! // One communicator per process; here, one thread per rank.
//! for comm in World::new(4) {
//!     std::thread::spawn(move || {
//!         let grid = Arc::new(Grid::new(comm, 2, 2)?);
//!         let mut a = DistMatrix::<f64>::with_size(
//!             Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::GridCol)?;
//!         a.set(0, 0, 1.0)?;
//!         let b = a.redistribute(Dist::VecCm, Dist::Repl)?;
//!         Ok::<_, gridmat::error::Error>(())
//!     });
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): parallel pack/unpack for large local blocks

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod comm;
pub mod dist;
pub mod error;
pub mod grid;
pub mod matrix;
pub mod pool;
pub mod redist;
pub mod scalar;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::comm::{Comm, World};
    pub use crate::dist::{Axis, Dist, DistDesc};
    pub use crate::error::{Error, Result};
    pub use crate::grid::Grid;
    pub use crate::matrix::DistMatrix;
    pub use crate::redist::convert;
    pub use crate::scalar::Scalar;
}
