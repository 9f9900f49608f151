//! Ordered process groups and their collectives

use bytemuck::Zeroable;
use std::sync::Arc;

use super::world::Endpoint;
use crate::scalar::Scalar;

// Tag namespaces, one per operation, so a desync between two processes is
// caught at the first mismatched message instead of corrupting data.
const TAG_P2P: u64 = 0x01;
const TAG_EXCHANGE: u64 = 0x02;
const TAG_BCAST: u64 = 0x03;
const TAG_GATHER: u64 = 0x04;
const TAG_SCATTER: u64 = 0x05;
const TAG_ALL_GATHER: u64 = 0x06;
const TAG_ALL_TO_ALL: u64 = 0x07;
const TAG_REDUCE: u64 = 0x08;
const TAG_BARRIER: u64 = 0x09;

/// A fixed, ordered group of processes
///
/// A `Comm` is this process's handle on one group: the all-process world
/// group, a grid row, a grid column, or the diagonal. Ranks passed to every
/// method are group ranks, i.e. positions in the member list the group was
/// built with.
#[derive(Clone)]
pub struct Comm {
    endpoint: Arc<Endpoint>,
    /// World ranks of the members, in group order
    members: Arc<[usize]>,
    /// This process's position in `members`
    my_index: usize,
}

impl Comm {
    pub(crate) fn world(endpoint: Arc<Endpoint>) -> Self {
        let rank = endpoint.rank();
        let members: Arc<[usize]> = (0..endpoint.size()).collect();
        Comm {
            endpoint,
            members,
            my_index: rank,
        }
    }

    /// This process's rank within the group
    #[inline]
    pub fn rank(&self) -> usize {
        self.my_index
    }

    /// Number of processes in the group
    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Payload bytes this process has sent to other processes so far
    ///
    /// The counter lives on the process's endpoint, so subgroups carved from
    /// the same world all read the same running total. Self-deliveries are
    /// not counted.
    pub fn sent_bytes(&self) -> u64 {
        self.endpoint.sent_bytes()
    }

    /// Carve an ordered subgroup out of this group
    ///
    /// `group_ranks` are ranks relative to `self`, in the order the new group
    /// should number them. Returns `None` if this process is not a member or
    /// any rank is outside the group.
    pub fn subgroup(&self, group_ranks: &[usize]) -> Option<Comm> {
        let members: Arc<[usize]> = group_ranks
            .iter()
            .map(|&r| self.members.get(r).copied())
            .collect::<Option<_>>()?;
        let my_world = self.members[self.my_index];
        let my_index = members.iter().position(|&w| w == my_world)?;
        Some(Comm {
            endpoint: Arc::clone(&self.endpoint),
            members,
            my_index,
        })
    }

    fn send_bytes(&self, to: usize, tag: u64, bytes: Vec<u8>) {
        self.endpoint.send(self.members[to], tag, bytes);
    }

    fn recv_bytes(&self, from: usize, tag: u64) -> Vec<u8> {
        self.endpoint.recv(self.members[from], tag)
    }

    fn to_vec<T: Scalar>(bytes: &[u8]) -> Vec<T> {
        let elem = std::mem::size_of::<T>();
        debug_assert_eq!(bytes.len() % elem, 0);
        let mut out = vec![T::zeroed(); bytes.len() / elem];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
        out
    }

    /// Send a slab to `to`; never blocks
    pub fn send<T: Scalar>(&self, to: usize, data: &[T]) {
        self.send_bytes(to, TAG_P2P, bytemuck::cast_slice(data).to_vec());
    }

    /// Block until the next slab from `from` arrives
    pub fn recv<T: Scalar>(&self, from: usize) -> Vec<T> {
        Self::to_vec(&self.recv_bytes(from, TAG_P2P))
    }

    /// Paired exchange: send to `to`, receive from `from`
    ///
    /// Send and receive sizes are independent; the received slab is returned
    /// at whatever length the peer sent.
    pub fn send_recv<T: Scalar>(&self, data: &[T], to: usize, from: usize) -> Vec<T> {
        self.send_bytes(to, TAG_EXCHANGE, bytemuck::cast_slice(data).to_vec());
        Self::to_vec(&self.recv_bytes(from, TAG_EXCHANGE))
    }

    /// Broadcast `data` from `root` to every member
    ///
    /// On non-root members the vector is replaced by the root's payload.
    pub fn broadcast<T: Scalar>(&self, root: usize, data: &mut Vec<T>) {
        if self.my_index == root {
            let bytes: Vec<u8> = bytemuck::cast_slice(data.as_slice()).to_vec();
            for r in 0..self.size() {
                if r != root {
                    self.send_bytes(r, TAG_BCAST, bytes.clone());
                }
            }
        } else {
            *data = Self::to_vec(&self.recv_bytes(root, TAG_BCAST));
        }
    }

    /// Gather every member's slab at `root`
    ///
    /// Returns `Some(parts)` on the root, in group-rank order, and `None`
    /// elsewhere. Parts may have different lengths.
    pub fn gather<T: Scalar>(&self, local: &[T], root: usize) -> Option<Vec<Vec<T>>> {
        if self.my_index == root {
            let parts = (0..self.size())
                .map(|r| {
                    if r == root {
                        local.to_vec()
                    } else {
                        Self::to_vec(&self.recv_bytes(r, TAG_GATHER))
                    }
                })
                .collect();
            Some(parts)
        } else {
            self.send_bytes(root, TAG_GATHER, bytemuck::cast_slice(local).to_vec());
            None
        }
    }

    /// Scatter per-member slabs from `root`
    ///
    /// `parts` must be `Some` on the root with one entry per group rank, and
    /// is ignored elsewhere. Returns this member's slab.
    pub fn scatter<T: Scalar>(&self, parts: Option<&[Vec<T>]>, root: usize) -> Vec<T> {
        if self.my_index == root {
            let parts = parts.expect("scatter root must supply the parts");
            assert_eq!(parts.len(), self.size(), "one scatter part per member");
            for (r, part) in parts.iter().enumerate() {
                if r != root {
                    self.send_bytes(r, TAG_SCATTER, bytemuck::cast_slice(part.as_slice()).to_vec());
                }
            }
            parts[root].clone()
        } else {
            Self::to_vec(&self.recv_bytes(root, TAG_SCATTER))
        }
    }

    /// Every member receives every member's slab, in group-rank order
    pub fn all_gather<T: Scalar>(&self, local: &[T]) -> Vec<Vec<T>> {
        let bytes: Vec<u8> = bytemuck::cast_slice(local).to_vec();
        for r in 0..self.size() {
            if r != self.my_index {
                self.send_bytes(r, TAG_ALL_GATHER, bytes.clone());
            }
        }
        (0..self.size())
            .map(|r| {
                if r == self.my_index {
                    local.to_vec()
                } else {
                    Self::to_vec(&self.recv_bytes(r, TAG_ALL_GATHER))
                }
            })
            .collect()
    }

    /// Full exchange: member `r` receives `parts[me]` from every `r`
    ///
    /// Parts may have different lengths, so the degenerate slabs of a vector
    /// redistribution cost nothing on the wire.
    pub fn all_to_all<T: Scalar>(&self, parts: Vec<Vec<T>>) -> Vec<Vec<T>> {
        assert_eq!(parts.len(), self.size(), "one all_to_all part per member");
        for (r, part) in parts.iter().enumerate() {
            if r != self.my_index {
                self.send_bytes(r, TAG_ALL_TO_ALL, bytemuck::cast_slice(part.as_slice()).to_vec());
            }
        }
        let mine = parts[self.my_index].clone();
        (0..self.size())
            .map(|r| {
                if r == self.my_index {
                    mine.clone()
                } else {
                    Self::to_vec(&self.recv_bytes(r, TAG_ALL_TO_ALL))
                }
            })
            .collect()
    }

    /// Elementwise sum across the group, result on every member
    pub fn all_reduce_sum<T: Scalar>(&self, buf: &mut [T]) {
        if self.size() == 1 {
            return;
        }
        if self.my_index == 0 {
            for r in 1..self.size() {
                let part: Vec<T> = Self::to_vec(&self.recv_bytes(r, TAG_REDUCE));
                assert_eq!(part.len(), buf.len(), "all_reduce_sum length mismatch");
                for (acc, x) in buf.iter_mut().zip(part) {
                    *acc += x;
                }
            }
            let bytes: Vec<u8> = bytemuck::cast_slice(&*buf).to_vec();
            for r in 1..self.size() {
                self.send_bytes(r, TAG_REDUCE, bytes.clone());
            }
        } else {
            self.send_bytes(0, TAG_REDUCE, bytemuck::cast_slice(&*buf).to_vec());
            let summed: Vec<T> = Self::to_vec(&self.recv_bytes(0, TAG_REDUCE));
            buf.copy_from_slice(&summed);
        }
    }

    /// Block until every member has arrived
    pub fn barrier(&self) {
        if self.size() == 1 {
            return;
        }
        if self.my_index == 0 {
            for r in 1..self.size() {
                self.recv_bytes(r, TAG_BARRIER);
            }
            for r in 1..self.size() {
                self.send_bytes(r, TAG_BARRIER, Vec::new());
            }
        } else {
            self.send_bytes(0, TAG_BARRIER, Vec::new());
            self.recv_bytes(0, TAG_BARRIER);
        }
    }
}
