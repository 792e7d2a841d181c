//! Re-sequences out-of-order completions.
//!
//! [`OrderedQueue`] buffers results keyed by sequence index and releases them
//! strictly in ascending order. It never suspends: the caller pushes a
//! completion, gets back whatever became deliverable, and hands those items
//! to the consumer itself.

use std::collections::BTreeMap;

use crate::errors::QueueError;

/// Ordered delivery buffer for `total` items.
///
/// ## Examples
///
/// ```
/// use speak_stream::ordered_queue::OrderedQueue;
///
/// let mut queue = OrderedQueue::new(3);
/// assert!(queue.on_complete(2, "c").unwrap().is_empty());
/// assert!(queue.on_complete(1, "b").unwrap().is_empty());
/// assert_eq!(queue.on_complete(0, "a").unwrap(), vec![(0, "a"), (1, "b"), (2, "c")]);
/// assert!(queue.is_drained());
/// ```
#[derive(Debug)]
pub struct OrderedQueue<T> {
    total: usize,
    next_expected: usize,
    buffered: BTreeMap<usize, T>,
}

impl<T> OrderedQueue<T> {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            next_expected: 0,
            buffered: BTreeMap::new(),
        }
    }

    /// Record the result for `index` and return every item that is now
    /// deliverable, in order.
    ///
    /// ## Errors
    ///
    /// Rejects indices outside `0..total` and indices that were already
    /// received (delivered or buffered). A rejected call leaves the queue
    /// unchanged.
    pub fn on_complete(&mut self, index: usize, item: T) -> Result<Vec<(usize, T)>, QueueError> {
        if index >= self.total {
            return Err(QueueError::OutOfRange {
                index,
                total: self.total,
            });
        }
        if index < self.next_expected || self.buffered.contains_key(&index) {
            return Err(QueueError::Duplicate { index });
        }

        self.buffered.insert(index, item);

        let mut ready = Vec::new();
        while let Some(item) = self.buffered.remove(&self.next_expected) {
            ready.push((self.next_expected, item));
            self.next_expected += 1;
        }
        Ok(ready)
    }

    /// The index the consumer is waiting for.
    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// `true` once every index has been released.
    pub fn is_drained(&self) -> bool {
        self.next_expected == self.total
    }

    /// Indices that have not been received yet.
    pub fn missing(&self) -> Vec<usize> {
        (self.next_expected..self.total)
            .filter(|i| !self.buffered.contains_key(i))
            .collect()
    }

    /// Take every buffered-but-undelivered item, leaving the buffer empty.
    pub fn take_buffered(&mut self) -> Vec<(usize, T)> {
        std::mem::take(&mut self.buffered).into_iter().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
