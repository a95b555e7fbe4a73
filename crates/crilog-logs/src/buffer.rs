use std::collections::VecDeque;

/// Ring buffer keeping the most recent `capacity` items
#[derive(Clone, Debug)]
pub struct TailBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> TailBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Push a new entry, evicting the oldest if at capacity
    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest
    pub fn into_vec(self) -> Vec<T> {
        self.entries.into()
    }
}
