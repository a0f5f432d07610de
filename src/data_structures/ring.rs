//! # Interrupt-Safe Ring Buffer
//!
//! Fixed-capacity FIFO for handing data from an interrupt handler to normal
//! code without allocating.
//!
//! ```text
//!        head (consumer)          tail (producer)
//!          │                        │
//!   ┌───┬──▼┬───┬───┬───┬───┬───┬──▼┬───┐
//!   │   │ a │ b │ c │ d │ e │ f │   │   │   len = 6
//!   └───┴───┴───┴───┴───┴───┴───┴───┴───┘
//! ```
//!
//! The producer owns `tail`, the consumer owns `head`, and `len` is the only
//! index both sides write, always through a single atomic read-modify-write.
//! A push that lands in the middle of a pop (or the other way round) can
//! therefore never lose or duplicate a slot, with no need to mask
//! interrupts. All `N` slots are usable.
//!
//! Each side is additionally claimed with a flag for the duration of the
//! operation, so a second producer or consumer racing the first is refused
//! instead of corrupting its index.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct Ring<T, const N: usize> {
    slots: [UnsafeCell<MaybeUninit<T>>; N],
    head: AtomicUsize,
    tail: AtomicUsize,
    len: AtomicUsize,
    pushing: AtomicBool,
    popping: AtomicBool,
}

// Slots are only touched by the side holding the matching claim flag.
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}
unsafe impl<T: Send, const N: usize> Send for Ring<T, N> {}

impl<T, const N: usize> Ring<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "ring capacity must be non-zero");

    pub const fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            slots: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            pushing: AtomicBool::new(false),
            popping: AtomicBool::new(false),
        }
    }

    /// Appends `item`. Returns `false` and drops `item` when the ring is full.
    pub fn push(&self, item: T) -> bool {
        if self.pushing.swap(true, Ordering::Acquire) {
            return false;
        }

        let pushed = if self.len.load(Ordering::Acquire) == N {
            false
        } else {
            let tail = self.tail.load(Ordering::Relaxed);
            unsafe { (*self.slots[tail].get()).write(item) };
            self.tail.store((tail + 1) % N, Ordering::Relaxed);
            self.len.fetch_add(1, Ordering::Release);
            true
        };

        self.pushing.store(false, Ordering::Release);
        pushed
    }

    /// Removes the oldest item, or `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        if self.popping.swap(true, Ordering::Acquire) {
            return None;
        }

        let item = if self.len.load(Ordering::Acquire) == 0 {
            None
        } else {
            let head = self.head.load(Ordering::Relaxed);
            let item = unsafe { (*self.slots[head].get()).assume_init_read() };
            self.head.store((head + 1) % N, Ordering::Relaxed);
            self.len.fetch_sub(1, Ordering::Release);
            Some(item)
        };

        self.popping.store(false, Ordering::Release);
        item
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }
}

impl<T, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
