//! Synchronous message passing between the processes of a grid
//!
//! The crate models one "process" per OS thread. [`World::new`] wires `p`
//! endpoints together with per-ordered-pair FIFO mailboxes and hands back one
//! all-process [`Comm`] per rank; subgroups (a grid row, a grid column, the
//! diagonal) are carved out of a parent group with [`Comm::subgroup`].
//!
//! Every collective is blocking and must be entered by every member of the
//! group in the same program order. There is no timeout or cancellation: a
//! collective that a peer never issues blocks its partners indefinitely.

mod group;
mod world;

pub use group::Comm;
pub use world::World;
