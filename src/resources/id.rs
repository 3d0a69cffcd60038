//! Buffer identity allocation.
//!
//! Every [`DataBuffer`](super::DataBuffer) receives a process-unique id used
//! as a map key by per-context managers. Ids come from an [`IdAllocator`]:
//! either the process-wide one or an allocator injected by the caller, which
//! keeps tests deterministic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide allocator used by [`DataBuffer::new`](super::DataBuffer::new).
static GLOBAL_ALLOCATOR: IdAllocator = IdAllocator::new();

/// Identity of a CPU-side buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl BufferId {
    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic atomic id counter.
///
/// Ids are handed out post-increment, so a fresh allocator yields 0, 1, 2, ...
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// The allocator shared by every buffer built without an explicit one.
    #[inline]
    #[must_use]
    pub fn global() -> &'static IdAllocator {
        &GLOBAL_ALLOCATOR
    }

    /// Hands out the next id.
    #[inline]
    pub fn next_id(&self) -> BufferId {
        BufferId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`next_id`](Self::next_id) will return.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> BufferId {
        BufferId(self.next.load(Ordering::Relaxed))
    }

    /// Rewinds the counter.
    ///
    /// Only meant for deterministic tests on an injected allocator: ids handed
    /// out before the reset may be issued again.
    pub fn reset(&self, first: u64) {
        self.next.store(first, Ordering::Relaxed);
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_post_increment_from_zero() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.next_id(), BufferId(0));
        assert_eq!(alloc.next_id(), BufferId(1));
        assert_eq!(alloc.peek(), BufferId(2));
    }

    #[test]
    fn test_reset_rewinds() {
        let alloc = IdAllocator::starting_at(40);
        alloc.next_id();
        alloc.reset(7);
        assert_eq!(alloc.next_id(), BufferId(7));
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let alloc = std::sync::Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let alloc = alloc.clone();
                std::thread::spawn(move || (0..250).map(|_| alloc.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<BufferId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
