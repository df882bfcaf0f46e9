use crossbeam::queue::ArrayQueue;

/// Recycled successor buffers, one bounded queue per worker so that
/// `recycle` on one thread never contends with `succ` on another.
pub struct BufferPool<T> {
    pools: Vec<ArrayQueue<Vec<T>>>,
    capacity: usize,
}

impl<T> BufferPool<T> {
    pub fn new(workers: usize, per_worker: usize, capacity: usize) -> Self {
        let pools = (0..workers.max(1))
            .map(|_| ArrayQueue::new(per_worker.max(1)))
            .collect();
        BufferPool { pools, capacity }
    }

    pub fn acquire(&self, tid: usize) -> Vec<T> {
        self.pools
            .get(tid)
            .and_then(|q| q.pop())
            .unwrap_or_else(|| Vec::with_capacity(self.capacity))
    }

    pub fn release(&self, tid: usize, mut buf: Vec<T>) {
        buf.clear();
        if buf.capacity() > self.capacity * 4 {
            return;
        }
        if let Some(q) = self.pools.get(tid) {
            let _ = q.push(buf);
        }
    }

    pub fn pooled(&self, tid: usize) -> usize {
        self.pools.get(tid).map(|q| q.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_then_acquire_reuses() {
        let pool: BufferPool<u32> = BufferPool::new(2, 4, 8);
        let mut buf = pool.acquire(1);
        buf.extend([1, 2, 3]);
        pool.release(1, buf);
        assert_eq!(pool.pooled(1), 1);
        assert_eq!(pool.pooled(0), 0);
        let again = pool.acquire(1);
        assert!(again.is_empty());
        assert_eq!(pool.pooled(1), 0);
    }

    #[test]
    fn test_unknown_worker_falls_back_to_allocation() {
        let pool: BufferPool<u32> = BufferPool::new(1, 1, 8);
        let buf = pool.acquire(9);
        pool.release(9, buf);
        assert_eq!(pool.pooled(9), 0);
    }
}
