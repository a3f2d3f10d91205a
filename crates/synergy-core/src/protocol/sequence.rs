//! Thread-safe counter for enter sequence numbers.
//!
//! # What is the enter sequence number? (for beginners)
//!
//! Every time the cursor enters a screen, the server sends `CINN` with a fresh
//! 32-bit sequence number.  Clipboard grabs carry the sequence number the
//! sender last saw, which lets the server tell a grab made *during* the
//! current visit apart from a stale one still in flight from an older visit.
//!
//! The counter is an `AtomicU32`, so the router and its tests can read it
//! through a shared reference without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// A monotonically increasing `u32` counter that wraps at `u32::MAX`.
///
/// # Examples
///
/// ```rust
/// use synergy_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.current(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next sequence number and advances the counter.
    ///
    /// `Relaxed` is enough: the value orders protocol records, it does not
    /// publish memory to other threads.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) will hand out.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_sequence_counter_wraps_at_u32_max() {
        // Arrange
        let counter = SequenceCounter {
            inner: AtomicU32::new(u32::MAX),
        };

        // Act
        let before_wrap = counter.next();
        let after_wrap = counter.next();

        // Assert
        assert_eq!(before_wrap, u32::MAX);
        assert_eq!(after_wrap, 0);
    }

    #[test]
    fn test_sequence_counter_hands_out_unique_values_across_threads() {
        // Arrange
        let counter = Arc::new(SequenceCounter::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }

    #[test]
    fn test_current_does_not_advance() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 1);
    }
}
