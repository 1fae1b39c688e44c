//! Slot array implementation
//!
//! Fixed-size storage for elements in flight between producers and the
//! consumer. A slot is addressed by `sequence & index_mask` and reused
//! cyclically. Each slot carries a publication flag: producers advance the
//! producer sequence before they write, so the consumer side must wait for
//! the flag before it can take the value out.

use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single cell of the slot array
struct Slot<T> {
    /// Set by the producer once `value` holds its element
    published: AtomicBool,
    value: UnsafeCell<Option<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            published: AtomicBool::new(false),
            value: UnsafeCell::new(None),
        }
    }
}

/// Fixed-size, power-of-two array of slots
pub struct SlotArray<T> {
    /// Using `Box<[Slot<T>]>` so the storage never moves or grows
    slots: Box<[Slot<T>]>,
    /// Mask for fast modulo operations (capacity - 1)
    index_mask: i64,
}

// SAFETY: a slot's value is only touched by the producer that won its
// sequence (before publishing) or by the single consumer side (after the
// publication flag was observed), so values are never shared between threads.
unsafe impl<T: Send> Send for SlotArray<T> {}
unsafe impl<T: Send> Sync for SlotArray<T> {}

impl<T> SlotArray<T> {
    /// Allocate `capacity` empty slots
    ///
    /// `capacity` is expected to be a power of two; the queue builder
    /// validates it before allocating.
    pub fn new(capacity: usize) -> Self {
        let slots: Box<[Slot<T>]> = (0..capacity).map(|_| Slot::new()).collect();
        Self {
            slots,
            index_mask: capacity as i64 - 1,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, sequence: i64) -> &Slot<T> {
        let index = (sequence & self.index_mask) as usize;
        &self.slots[index]
    }

    /// Store `value` in the slot for `sequence` and publish it
    ///
    /// # Safety
    /// The caller must have won the reservation of `sequence`. If the consumer
    /// side has not taken the previous value of that slot yet, this waits.
    #[inline]
    pub unsafe fn publish(&self, sequence: i64, value: T) {
        let slot = self.slot(sequence);
        if slot.published.load(Ordering::Acquire) {
            // Only reachable by a reservation raced across a stop and restart
            let backoff = Backoff::new();
            while slot.published.load(Ordering::Acquire) {
                backoff.snooze();
            }
        }
        *slot.value.get() = Some(value);
        slot.published.store(true, Ordering::Release);
    }

    /// Whether the slot for `sequence` currently holds a published value
    pub fn is_published(&self, sequence: i64) -> bool {
        self.slot(sequence).published.load(Ordering::Acquire)
    }

    /// Take the value out of the slot for `sequence`, leaving it empty
    ///
    /// Waits for the producer that reserved `sequence` to publish. The write
    /// always follows the reservation without any blocking step, so the wait
    /// is short.
    ///
    /// # Safety
    /// The caller must be the only consumer of the slot array, and `sequence`
    /// must have been reserved by a producer.
    pub unsafe fn take(&self, sequence: i64) -> T {
        let slot = self.slot(sequence);
        let backoff = Backoff::new();
        loop {
            if slot.published.load(Ordering::Acquire) {
                if let Some(value) = (*slot.value.get()).take() {
                    slot.published.store(false, Ordering::Release);
                    return value;
                }
            }
            backoff.snooze();
        }
    }
}

impl<T> std::fmt::Debug for SlotArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotArray")
            .field("capacity", &self.capacity())
            .finish()
    }
}
