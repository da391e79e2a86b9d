use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Fixed-capacity FIFO that evicts the oldest entry on overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    capacity: usize,
    #[serde(rename = "items")]
    buf: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// Push an item, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        while self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest items that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.buf.len() > capacity {
            self.buf.pop_front();
        }
    }

    /// Iterate over items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    /// The newest `n` items, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.buf.iter().skip(self.buf.len().saturating_sub(n))
    }

    /// Prepend `older` items, then drop from the front until within capacity.
    pub fn absorb_older(&mut self, older: impl IntoIterator<Item = T>) {
        let mut merged: VecDeque<T> = older.into_iter().collect();
        merged.append(&mut self.buf);
        while merged.len() > self.capacity {
            merged.pop_front();
        }
        self.buf = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn recent_returns_newest() {
        let mut ring = RingBuffer::new(10);
        for i in 0..6 {
            ring.push(i);
        }
        assert_eq!(ring.recent(2).copied().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(ring.recent(50).count(), 6);
    }

    #[test]
    fn absorb_keeps_newest() {
        let mut ring = RingBuffer::new(4);
        ring.push(10);
        ring.push(11);
        ring.absorb_older(vec![1, 2, 3]);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 10, 11]);
    }

    #[test]
    fn shrinking_keeps_newest() {
        let mut ring = RingBuffer::new(5);
        for i in 0..5 {
            ring.push(i);
        }
        ring.set_capacity(2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        ring.push(5);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(ring.capacity(), 2);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut ring = RingBuffer::new(0);
        ring.push(1);
        assert!(ring.is_empty());
    }
}
