//! Sequence implementation for the queue
//!
//! A sequence tracks either the highest slot reserved by producers or the
//! highest slot fully processed by the consumer. Each one sits on its own
//! cache line so that the producer side and the consumer side never share a
//! line while both are being written.

use std::sync::atomic::{AtomicI64, Ordering};

/// Cache line size for padding to prevent false sharing
const CACHE_LINE_SIZE: usize = 64;

/// Value held by the producer sequence while the queue is closed
pub const CLOSED_SEQUENCE: i64 = i64::MIN;

/// A sequence number that prevents false sharing
///
/// The atomic value is followed by explicit filler bytes and the whole struct
/// is aligned to a cache line, so two sequences never share one.
#[repr(C, align(64))]
pub struct Sequence {
    /// The actual sequence value
    value: AtomicI64,
    /// Padding to prevent false sharing (cache line size - size of AtomicI64)
    _padding: [u8; CACHE_LINE_SIZE - std::mem::size_of::<AtomicI64>()],
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: AtomicI64::new(initial_value),
            _padding: [0; CACHE_LINE_SIZE - std::mem::size_of::<AtomicI64>()],
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Get the current sequence value with sequentially consistent ordering
    ///
    /// Used by the blocking wait strategies when re-checking the sequence
    /// after raising their wake-up flag.
    #[inline]
    pub fn get_volatile(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Set the sequence value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Atomically replace `expected` with `new`
    ///
    /// Returns `true` if the swap happened. Spurious failures are allowed, so
    /// callers must retry in a loop.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange_weak(expected, new, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }

    /// Move the sequence to [`CLOSED_SEQUENCE`]
    ///
    /// Returns the value held before closing, or `None` if it was already
    /// closed.
    pub fn close(&self) -> Option<i64> {
        match self.value.swap(CLOSED_SEQUENCE, Ordering::SeqCst) {
            CLOSED_SEQUENCE => None,
            previous => Some(previous),
        }
    }

    /// Whether the sequence currently holds [`CLOSED_SEQUENCE`]
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.get() == CLOSED_SEQUENCE
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(crate::queue::INITIAL_SEQUENCE_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_layout() {
        assert_eq!(std::mem::size_of::<Sequence>(), CACHE_LINE_SIZE);
        assert_eq!(std::mem::align_of::<Sequence>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn test_sequence_default() {
        let seq = Sequence::default();
        assert_eq!(seq.get(), crate::queue::INITIAL_SEQUENCE_VALUE);
    }

    #[test]
    fn test_sequence_set_get() {
        let seq = Sequence::new(0);
        seq.set(100);
        assert_eq!(seq.get(), 100);
        seq.set(7);
        assert_eq!(seq.get_volatile(), 7);
    }

    #[test]
    fn test_sequence_compare_and_set() {
        let seq = Sequence::new(10);

        // A weak CAS may fail spuriously, so retry until it lands
        while !seq.compare_and_set(10, 20) {}
        assert_eq!(seq.get(), 20);

        assert!(!seq.compare_and_set(10, 30));
        assert_eq!(seq.get(), 20);
    }

    #[test]
    fn test_sequence_close() {
        let seq = Sequence::new(41);
        assert!(!seq.is_closed());
        assert_eq!(seq.close(), Some(41));
        assert!(seq.is_closed());
        assert_eq!(seq.close(), None);

        seq.set(-1);
        assert!(!seq.is_closed());
    }

    #[test]
    fn test_sequence_thread_safety() {
        let seq = Arc::new(Sequence::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let seq_clone = Arc::clone(&seq);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    loop {
                        let current = seq_clone.get();
                        if seq_clone.compare_and_set(current, current + 1) {
                            break;
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seq.get(), 8000);
    }
}
