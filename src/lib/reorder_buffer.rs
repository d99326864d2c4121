//! Reassembly buffer turning out-of-order completions into an in-order stream.
//!
//! Workers finish blocks in whatever order the scheduler hands them out. Each
//! completion is inserted under its block's sequence number, and the consumer only
//! ever pops the contiguous prefix starting at the next expected number.
//!
//! # Example
//!
//! ```
//! use blockpipe_lib::reorder_buffer::ReorderBuffer;
//!
//! let mut buffer: ReorderBuffer<&str> = ReorderBuffer::new();
//! buffer.insert(2, "third");
//! buffer.insert(0, "first");
//!
//! assert_eq!(buffer.try_pop_next(), Some("first"));
//! assert_eq!(buffer.try_pop_next(), None); // waiting on 1
//!
//! buffer.insert(1, "second");
//! let rest: Vec<_> = buffer.drain_ready().collect();
//! assert_eq!(rest, vec!["second", "third"]);
//! ```

use std::collections::VecDeque;

/// A buffer that releases items in sequence order.
///
/// Backed by a sparse `VecDeque` whose front slot is always `next_seq`, so insert
/// and pop are O(1). The window never exceeds the number of blocks in flight.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// Slot `i` holds the item for sequence number `next_seq + i`.
    slots: VecDeque<Option<T>>,
    /// Next sequence number to release.
    next_seq: u64,
    /// Number of items currently stored.
    count: usize,
    /// Largest number of items held at once.
    peak: usize,
}

impl<T> ReorderBuffer<T> {
    /// Create an empty buffer expecting sequence number 0 first.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: VecDeque::new(), next_seq: 0, count: 0, peak: 0 }
    }

    /// Insert an item under its sequence number.
    ///
    /// # Panics
    ///
    /// Panics if `seq` was already released or is already buffered.
    pub fn insert(&mut self, seq: u64, item: T) {
        let Some(offset) = seq.checked_sub(self.next_seq) else {
            panic!("sequence {seq} already released (next {})", self.next_seq);
        };

        let index = offset as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }

        assert!(self.slots[index].is_none(), "duplicate sequence number {seq}");
        self.slots[index] = Some(item);
        self.count += 1;
        self.peak = self.peak.max(self.count);
    }

    /// Pop the item for `next_seq` if it has arrived.
    #[must_use]
    pub fn try_pop_next(&mut self) -> Option<T> {
        if !self.can_pop() {
            return None;
        }
        let item = self.slots.pop_front().flatten()?;
        self.next_seq += 1;
        self.count -= 1;
        Some(item)
    }

    /// Drain all consecutive ready items, stopping at the first gap.
    pub fn drain_ready(&mut self) -> DrainReady<'_, T> {
        DrainReady { buffer: self }
    }

    /// Whether the item for `next_seq` is buffered.
    #[must_use]
    pub fn can_pop(&self) -> bool {
        self.slots.front().is_some_and(Option::is_some)
    }

    /// Next sequence number eligible for release.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Number of items waiting in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no items are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Largest number of items that were waiting at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator that drains consecutive ready items from a [`ReorderBuffer`].
pub struct DrainReady<'a, T> {
    buffer: &'a mut ReorderBuffer<T>,
}

impl<T> Iterator for DrainReady<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_pop_next()
    }
}
