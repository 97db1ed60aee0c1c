//! Claim-once queue feeding the acquisition workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed list of items handed out one at a time, each to exactly one
/// claimant. Claiming is a single atomic increment, so workers never block
/// on each other.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        log::debug!("{} items queued", items.len());
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Take the next unclaimed item, in listing order
    pub fn claim(&self) -> Option<&S> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items nobody claimed, e.g. because workers stopped on shutdown
    pub fn unclaimed(&self) -> usize {
        let claimed = self.cursor.load(Ordering::Relaxed).min(self.items.len());
        self.items.len() - claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_follow_listing_order() {
        let q = WorkQueue::new(vec!["a", "b", "c"]);
        assert_eq!(q.claim(), Some(&"a"));
        assert_eq!(q.claim(), Some(&"b"));
        assert_eq!(q.unclaimed(), 1);
        assert_eq!(q.claim(), Some(&"c"));
        assert_eq!(q.claim(), None);
        assert_eq!(q.claim(), None);
        assert_eq!(q.unclaimed(), 0);
        assert_eq!(q.total(), 3);
    }

    #[test]
    fn nothing_to_claim() {
        let q: WorkQueue<u8> = WorkQueue::new(Vec::new());
        assert_eq!(q.claim(), None);
        assert_eq!(q.unclaimed(), 0);
    }

    #[test]
    fn each_item_goes_to_one_worker() {
        let q = WorkQueue::new((0..1000).collect::<Vec<u32>>());
        let claimed = std::sync::Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while let Some(v) = q.claim() {
                        claimed.lock().unwrap().push(*v);
                    }
                });
            }
        });
        let mut claimed = claimed.into_inner().unwrap();
        claimed.sort_unstable();
        assert_eq!(claimed, (0..1000).collect::<Vec<_>>());
    }
}
