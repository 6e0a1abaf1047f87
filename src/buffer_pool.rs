//! A bounded pool of reusable read buffers, so steady-state hashing
//! allocates nothing. The teacher allocates a fresh, doubling `Vec<u8>` per
//! comparison step (`hasher.rs::HashIter`); this generalizes that into a
//! shared pool sized by a memory ceiling rather than per-call growth, per
//! spec section 4.2.

use parking_lot::{Condvar, Mutex};

struct Inner {
    free: Vec<Vec<u8>>,
    /// Buffers handed out but not yet returned; tracked only for
    /// `in_use_bytes`, not for correctness.
    outstanding: usize,
}

pub struct BufferPool {
    buffer_bytes: usize,
    capacity: usize,
    inner: Mutex<Inner>,
    available: Condvar,
}

/// A borrowed buffer. Returned to the pool on drop so callers can't forget
/// to release it, which the spec's `release(buf)` never-blocks contract
/// assumes.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl<'a> std::ops::Deref for PooledBuffer<'a> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl<'a> std::ops::DerefMut for PooledBuffer<'a> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl<'a> Drop for PooledBuffer<'a> {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut inner = self.pool.inner.lock();
        inner.outstanding -= 1;
        inner.free.push(buf);
        self.pool.available.notify_one();
    }
}

impl BufferPool {
    /// `total_budget_bytes / buffer_bytes` buffers are allowed outstanding
    /// at once, rounded down but never below 1.
    pub fn new(buffer_bytes: usize, total_budget_bytes: usize) -> Self {
        let capacity = (total_budget_bytes / buffer_bytes.max(1)).max(1);
        BufferPool {
            buffer_bytes,
            capacity,
            inner: Mutex::new(Inner { free: Vec::new(), outstanding: 0 }),
            available: Condvar::new(),
        }
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Blocks if the pool has no free buffer and is already at capacity.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(mut buf) = inner.free.pop() {
                buf.reserve(self.buffer_bytes.saturating_sub(buf.capacity()));
                inner.outstanding += 1;
                return PooledBuffer { pool: self, buf };
            }
            if inner.outstanding < self.capacity {
                inner.outstanding += 1;
                return PooledBuffer { pool: self, buf: Vec::with_capacity(self.buffer_bytes) };
            }
            self.available.wait(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_reuses_released_buffers() {
        let pool = BufferPool::new(1024, 1024);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(&[1, 2, 3]);
        }
        let buf = pool.acquire();
        assert!(buf.is_empty());
    }

    #[test]
    fn acquire_blocks_until_release_when_at_capacity() {
        let pool = Arc::new(BufferPool::new(1024, 1024));
        let held = pool.acquire();
        let pool2 = Arc::clone(&pool);
        let handle = thread::spawn(move || {
            let _second = pool2.acquire();
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        drop(held);
        handle.join().unwrap();
    }
}
