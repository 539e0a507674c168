// SPDX-License-Identifier: MPL-2.0

//! Lock-free single-producer/single-consumer ring (`spec.md` §4.3, C4).
//!
//! Capacity is rounded up to a power of two so index wraparound is a mask
//! instead of a modulo. `push` never blocks: it drops the new item silently
//! when the ring is full. `pop` never blocks: it returns `None` when empty.
//! This mirrors the "quick lane" contract in `frame_queue.rs`'s `FrameQueue`
//! (producer never blocks, renderer reuses/empties without blocking), built
//! directly over atomics instead of a mutex-guarded `Vec<Option<T>>`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bounded SPSC ring. Safe to share via `Arc` between exactly one producer
/// thread and one consumer thread; using it with more than one of either is
/// a contract violation (`spec.md` §4.3, §7) and not detected at runtime.
pub struct SpscRing<T> {
    buf: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    head: AtomicUsize, // next slot the producer will write
    tail: AtomicUsize, // next slot the consumer will read
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring with capacity rounded up to the next power of two
    /// (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buf,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Push `value`. Returns `false` (and drops `value`) if the ring is
    /// full; never blocks.
    pub fn push(&self, value: T) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= self.buf.len() {
            return false;
        }

        let slot = head & self.mask;
        // SAFETY: only the single producer ever writes this slot, and it is
        // not readable by the consumer until `head` is published below.
        unsafe {
            *self.buf[slot].get() = Some(value);
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pop the oldest value, or `None` if empty; never blocks.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = tail & self.mask;
        // SAFETY: only the single consumer ever reads/clears this slot, and
        // `head`'s Acquire load above synchronizes with the producer's
        // Release store, so the write is visible here.
        let value = unsafe { (*self.buf[slot].get()).take() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        value
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(SpscRing::<u8>::new(3).capacity(), 4);
        assert_eq!(SpscRing::<u8>::new(8).capacity(), 8);
        assert_eq!(SpscRing::<u8>::new(0).capacity(), 1);
    }

    #[test]
    fn push_pop_is_fifo() {
        let ring = SpscRing::new(4);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn push_drops_silently_when_full() {
        let ring = SpscRing::new(2);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(!ring.push(3));
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order() {
        let ring = Arc::new(SpscRing::new(16));
        let producer_ring = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            let mut i = 0u32;
            while i < 1000 {
                if producer_ring.push(i) {
                    i += 1;
                }
            }
        });

        let mut received = Vec::new();
        while received.len() < 1000 {
            if let Some(v) = ring.pop() {
                received.push(v);
            }
        }
        producer.join().unwrap();

        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
