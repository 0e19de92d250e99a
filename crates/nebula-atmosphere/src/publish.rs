//! Single-writer publication of rebuilt lookup tables.
//!
//! A rebuild always produces a complete new value off to the side; publishing
//! swaps the shared pointer in one step. Readers hold an `Arc` to whichever
//! version was current when they loaded it and never see a partial table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A published value plus a counter bumped on every swap.
#[derive(Debug)]
pub struct Published<T> {
    current: RwLock<Arc<T>>,
    generation: AtomicU64,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            generation: AtomicU64::new(0),
        }
    }

    /// Current value. The returned `Arc` stays valid across later publishes.
    pub fn load(&self) -> Arc<T> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Replace the current value, returning the previous one.
    pub fn publish(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, next);
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }

    /// Number of publishes since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_publish_swaps_value_and_generation() {
        let published = Published::new(vec![1, 2, 3]);
        assert_eq!(published.generation(), 0);
        let previous = published.publish(vec![4, 5, 6]);
        assert_eq!(*previous, vec![1, 2, 3]);
        assert_eq!(*published.load(), vec![4, 5, 6]);
        assert_eq!(published.generation(), 1);
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let published = Published::new(String::from("old"));
        let snapshot = published.load();
        published.publish(String::from("new"));
        assert_eq!(*snapshot, "old");
        assert_eq!(*published.load(), "new");
    }

    #[test]
    fn test_readers_never_see_torn_pairs() {
        // Both halves of the pair are always written together.
        let published = Published::new((0u32, 0u32));
        thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=2000 {
                    published.publish((i, i));
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..2000 {
                        let pair = published.load();
                        assert_eq!(pair.0, pair.1);
                    }
                });
            }
        });
        assert_eq!(published.generation(), 2000);
    }
}
