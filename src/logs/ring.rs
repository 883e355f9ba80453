//! Fixed-capacity ring buffer.
//!
//! Storage is allocated once; once full, each push overwrites the oldest slot.

/// FIFO ring of at most `capacity` items.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    start: usize,
    len: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates an empty ring. A zero capacity is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            start: 0,
            len: 0,
        }
    }

    /// Appends `item`, evicting the oldest item when full.
    pub fn push(&mut self, item: T) {
        let cap = self.slots.len();
        let idx = (self.start + self.len) % cap;
        self.slots[idx] = Some(item);
        if self.len == cap {
            self.start = (self.start + 1) % cap;
        } else {
            self.len += 1;
        }
    }

    /// Items in insertion order, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        let cap = self.slots.len();
        (0..self.len)
            .filter_map(|i| self.slots[(self.start + i) % cap].clone())
            .collect()
    }

    /// Drops every item; capacity is kept.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.start = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
