//! Lock-free work queue for distributing detail reads across workers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Lock-free work queue distributing items to workers.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item.
/// Once [`close()`](WorkQueue::close) is called no further items are handed
/// out; items already claimed stay with their worker.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        log::trace!("{} items in work queue", items.len());
        Self {
            items,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Get next item to process (lock-free), `None` when drained or closed
    pub fn next(&self) -> Option<&S> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    /// Stop handing out items
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Items handed out so far
    pub fn claimed(&self) -> usize {
        self.cursor.load(Ordering::Relaxed).min(self.items.len())
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_returns_all() {
        let q = WorkQueue::new(vec![1, 2, 3]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some(&1));
        assert_eq!(q.next(), Some(&2));
        assert_eq!(q.next(), Some(&3));
        assert_eq!(q.next(), None);
        assert_eq!(q.claimed(), 3);
    }

    #[test]
    fn close_stops_handing_out() {
        let q = WorkQueue::new(vec![1, 2, 3, 4]);
        assert_eq!(q.next(), Some(&1));
        q.close();
        assert!(q.is_closed());
        assert_eq!(q.next(), None);
        assert_eq!(q.claimed(), 1);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<i32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.next(), None);
        assert_eq!(q.claimed(), 0);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        use std::sync::Arc;

        let q = Arc::new(WorkQueue::new((0..1000).collect::<Vec<_>>()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(&n) = q.next() {
                        got.push(n);
                    }
                    got
                })
            })
            .collect();
        let mut all: Vec<i32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }
}
