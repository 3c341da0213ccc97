// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded exchange queue between the application and a link worker.
//!
//! Fixed capacity, FIFO, never blocks. When a producer hits capacity the
//! link does not evict the oldest element: it discards the whole backlog and
//! keeps only the newest item ([`ExchangeQueue::enqueue_or_reset`]). Stale
//! realtime data is worth less than a fresh sample.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Fixed-capacity FIFO shared between one side of the link and the
/// application. Safe for multiple producers and a single consumer.
pub struct ExchangeQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> ExchangeQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append `item` unless the queue is full.
    ///
    /// On a full queue nothing is inserted and the item is handed back.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }

    /// Append `item`, clearing the whole queue first if it is full.
    ///
    /// Clear and insert happen under one lock, so a concurrent consumer never
    /// observes the intermediate empty state. Returns `true` if the backlog
    /// was discarded.
    pub fn enqueue_or_reset(&self, item: T) -> bool {
        let mut items = self.items.lock();
        let reset = items.len() >= self.capacity;
        if reset {
            items.clear();
        }
        items.push_back(item);
        reset
    }

    /// Remove and return the oldest item, or `None` immediately if empty.
    pub fn dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Drop every queued item.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for ExchangeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
