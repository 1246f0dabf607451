// Bounded in-memory history: fixed-capacity FIFO store and the rolling-average window built on it.

use std::collections::VecDeque;

/// Fixed-capacity ordered container. Pushing into a full store evicts the oldest entry,
/// so a long-running session never grows past `capacity` items.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, returning the evicted oldest entry when the store was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Moving average over the last `capacity` scalar samples of one metric.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: BoundedHistory<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: BoundedHistory::new(capacity),
        }
    }

    /// Non-finite values are dropped.
    pub fn push(&mut self, value: f64) {
        if value.is_finite() {
            self.samples.push(value);
        }
    }

    /// Arithmetic mean of the current contents; 0.0 when empty.
    ///
    /// Summed as offsets from the oldest sample, which keeps the mean of a constant
    /// window exactly equal to that constant.
    pub fn average(&self) -> f64 {
        let Some(&base) = self.samples.iter().next() else {
            return 0.0;
        };
        let offset: f64 = self.samples.iter().map(|v| v - base).sum();
        base + offset / self.samples.len() as f64
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.latest().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }
}
