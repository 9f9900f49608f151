//! Endpoint wiring for an in-process world

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use super::Comm;

/// One message on a point-to-point mailbox
///
/// The tag names the operation that produced the message; a mismatch on
/// receipt means two processes diverged in their collective program order,
/// which is unrecoverable, so receipt asserts on it.
pub(crate) struct Message {
    pub(crate) tag: u64,
    pub(crate) bytes: Vec<u8>,
}

/// A process's end of the world wiring: senders to every rank, one guarded
/// receiver per source rank
pub(crate) struct Endpoint {
    rank: usize,
    size: usize,
    senders: Vec<Sender<Message>>,
    receivers: Vec<Mutex<Receiver<Message>>>,
    /// Payload bytes this process has sent to other processes
    sent: AtomicU64,
}

impl Endpoint {
    /// World rank of this endpoint
    pub(crate) fn rank(&self) -> usize {
        self.rank
    }

    /// Number of processes in the world
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Payload bytes sent to other processes so far
    pub(crate) fn sent_bytes(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Enqueue a message for `to`; never blocks
    pub(crate) fn send(&self, to: usize, tag: u64, bytes: Vec<u8>) {
        if to != self.rank {
            self.sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        // A send can only fail if the peer's receiver was dropped, i.e. the
        // peer thread is gone; surfacing that as a panic matches the
        // no-recovery contract of the communication layer.
        self.senders[to]
            .send(Message { tag, bytes })
            .unwrap_or_else(|_| panic!("process {} is gone; send from {} failed", to, self.rank));
    }

    /// Block until the next message from `from` arrives
    pub(crate) fn recv(&self, from: usize, tag: u64) -> Vec<u8> {
        let msg = self.receivers[from]
            .lock()
            .recv()
            .unwrap_or_else(|_| panic!("process {} is gone; recv on {} failed", from, self.rank));
        assert_eq!(
            msg.tag, tag,
            "collective desync: process {} expected tag {:#x} from {}, got {:#x}",
            self.rank, tag, from, msg.tag
        );
        msg.bytes
    }
}

/// Factory for the endpoints of an in-process world
pub struct World;

impl World {
    /// Wire up `size` processes and return the all-process group for each rank
    ///
    /// Element `r` of the returned vector is the `Comm` that the thread
    /// playing rank `r` must own. Endpoints are connected pairwise, so a
    /// message between any two ranks never passes through a third.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Vec<Comm> {
        assert!(size > 0, "world must contain at least one process");

        let mut senders: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Mutex<Receiver<Message>>>> =
            (0..size).map(|_| Vec::new()).collect();

        // receivers[dst][src] pairs with senders[src][dst]
        for dst in 0..size {
            for src in 0..size {
                let (tx, rx) = channel();
                senders[src].push(tx);
                receivers[dst].push(Mutex::new(rx));
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (tx, rx))| {
                let endpoint = Arc::new(Endpoint {
                    rank,
                    size,
                    senders: tx,
                    receivers: rx,
                    sent: AtomicU64::new(0),
                });
                Comm::world(endpoint)
            })
            .collect()
    }
}
