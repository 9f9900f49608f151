//! Reusable scratch arenas for the pack/communicate/unpack cycle
//!
//! Every distributed matrix carries its own pool, so the arenas a conversion
//! stages through are recycled across conversions instead of reallocated.
//! Acquisition is scoped: the guard returns its arena on drop, including on
//! the early-return paths of a failed conversion, so no arena can leak or be
//! referenced after release.

use num_traits::Zero;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

use crate::scalar::Scalar;

/// A process-local pool of scratch arenas for elements of type `T`
pub struct BufferPool<T: Scalar> {
    free: Mutex<Vec<Vec<T>>>,
}

impl<T: Scalar> Default for BufferPool<T> {
    fn default() -> Self {
        BufferPool {
            free: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Scalar> BufferPool<T> {
    /// Check out a zero-filled arena of exactly `len` elements
    ///
    /// Reuses a free arena when one exists. Nested
    /// acquisitions (as in a two-hop conversion) each get their own arena.
    pub fn acquire(&self, len: usize) -> PoolGuard<'_, T> {
        let mut buf = self.free.lock().pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, T::zero());
        PoolGuard {
            pool: self,
            buf: Some(buf),
        }
    }
}

/// Scoped handle on a checked-out arena; derefs to `[T]`
pub struct PoolGuard<'a, T: Scalar> {
    pool: &'a BufferPool<T>,
    buf: Option<Vec<T>>,
}

impl<T: Scalar> Deref for PoolGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.buf.as_deref().expect("arena present until drop")
    }
}

impl<T: Scalar> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.buf.as_deref_mut().expect("arena present until drop")
    }
}

impl<T: Scalar> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.free.lock().push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_zero_fills() {
        let pool = BufferPool::<f64>::default();
        {
            let mut buf = pool.acquire(4);
            buf[0] = 3.5;
            buf[3] = -1.0;
        }
        // The returned arena is recycled but its old contents never leak.
        let buf = pool.acquire(6);
        assert_eq!(&*buf, &[0.0; 6]);
    }

    #[test]
    fn test_nested_acquisitions_are_distinct() {
        let pool = BufferPool::<i32>::default();
        let mut a = pool.acquire(2);
        let mut b = pool.acquire(3);
        a[0] = 1;
        b[0] = 2;
        assert_eq!(a[0], 1);
        assert_eq!(b[0], 2);
    }

    #[test]
    fn test_arena_is_reused() {
        let pool = BufferPool::<u8>::default();
        {
            let _ = pool.acquire(1000);
        }
        let buf = pool.acquire(10);
        assert!(buf.buf.as_ref().unwrap().capacity() >= 1000);
    }
}
