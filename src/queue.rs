//! [`BoundedPriorityQueue`] implementation.

use std::fmt;

use crate::TreeError;

/// Fixed capacity binary max-heap keyed by an `f64` score.
///
/// Storage is allocated once at construction and never grows.
/// Slot indices returned by [`insert`](BoundedPriorityQueue::insert) are
/// only valid until the next mutation, entries move as the heap rebalances.
///
/// Ties are broken arbitrarily, the ordering of equal scores is not stable.
#[derive(Clone)]
pub struct BoundedPriorityQueue<T> {
    slots: Vec<(f64, T)>,
    capacity: usize,
}

impl<T: fmt::Debug> fmt::Debug for BoundedPriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedPriorityQueue")
            .field("slots", &self.slots)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[inline(always)]
fn parent(index: usize) -> usize {
    (index - 1) / 2
}

impl<T> BoundedPriorityQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, TreeError> {
        if capacity == 0 {
            return Err(TreeError::InvalidCapacity(
                "BoundedPriorityQueue with capacity 0".into(),
            ));
        }

        Ok(BoundedPriorityQueue {
            slots: Vec::with_capacity(capacity),
            capacity,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops all the entries, storage is kept.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Inserts `data` with `score`.
    ///
    /// Returns the slot the entry settled in.
    /// Fails with [`TreeError::QueueFull`] at capacity, check
    /// [`is_full`](Self::is_full) first.
    pub fn insert(&mut self, score: f64, data: T) -> Result<usize, TreeError> {
        debug_assert!(!score.is_nan(), "NaN score");
        if self.is_full() {
            return Err(TreeError::QueueFull(format!(
                "capacity {} reached",
                self.capacity
            )));
        }

        self.slots.push((score, data));
        Ok(self.sift_up(self.slots.len() - 1))
    }

    /// Highest scored entry.
    pub fn peek_max(&self) -> Result<(f64, &T), TreeError> {
        self.slots
            .first()
            .map(|(score, data)| (*score, data))
            .ok_or_else(|| TreeError::EmptyQueue("peek_max".into()))
    }

    /// Removes and returns the highest scored entry.
    pub fn extract_max(&mut self) -> Result<(f64, T), TreeError> {
        if self.slots.is_empty() {
            return Err(TreeError::EmptyQueue("extract_max".into()));
        }

        let max = self.slots.swap_remove(0);
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        Ok(max)
    }

    /// Sets the score of the entry in slot `index`.
    ///
    /// Returns the slot the entry moved to.
    pub fn change_priority(&mut self, index: usize, score: f64) -> Result<usize, TreeError> {
        debug_assert!(!score.is_nan(), "NaN score");
        self.check_index(index)?;

        let old = std::mem::replace(&mut self.slots[index].0, score);
        if score > old {
            Ok(self.sift_up(index))
        } else {
            Ok(self.sift_down(index))
        }
    }

    /// Removes the entry in slot `index`.
    ///
    /// The entry is promoted above the current maximum, sifted up to the
    /// root and taken out through [`extract_max`](Self::extract_max).
    /// Its original score is returned.
    pub fn remove(&mut self, index: usize) -> Result<(f64, T), TreeError> {
        self.check_index(index)?;

        let score = self.slots[index].0;
        let mut current = index;
        while current > 0 {
            let up = parent(current);
            self.slots.swap(current, up);
            current = up;
        }

        let (_, data) = self.extract_max()?;
        Ok((score, data))
    }

    /// Slot of the first entry matching `predicate`, in storage order.
    pub fn position<F>(&self, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        self.slots.iter().position(|(_, data)| predicate(data))
    }

    /// Entry in slot `index`.
    pub fn get(&self, index: usize) -> Option<(f64, &T)> {
        self.slots.get(index).map(|(score, data)| (*score, data))
    }

    /// Iterates entries in storage (heap) order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.slots.iter().map(|(score, data)| (*score, data))
    }

    fn check_index(&self, index: usize) -> Result<(), TreeError> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(TreeError::IndexOutOfRange(format!(
                "slot {index}, queue length {}",
                self.slots.len()
            )))
        }
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let up = parent(index);
            if self.slots[up].0 >= self.slots[index].0 {
                break;
            }
            self.slots.swap(index, up);
            index = up;
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) -> usize {
        let len = self.slots.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut largest = index;

            if left < len && self.slots[left].0 > self.slots[largest].0 {
                largest = left;
            }
            if right < len && self.slots[right].0 > self.slots[largest].0 {
                largest = right;
            }
            if largest == index {
                return index;
            }

            self.slots.swap(index, largest);
            index = largest;
        }
    }
}
