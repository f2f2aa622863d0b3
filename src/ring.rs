//! [`FixedRingBuffer`] implementation.

use crate::TreeError;

/// Fixed capacity FIFO.
///
/// Holds `capacity + 1` slots, one is always kept free to tell a full
/// buffer from an empty one. Pushing into a full buffer drops the value.
#[derive(Debug, Clone)]
pub struct FixedRingBuffer<T> {
    slots: Box<[T]>,
    head: usize,
    tail: usize,
}

impl<T: Copy + Default> FixedRingBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, TreeError> {
        if capacity == 0 {
            return Err(TreeError::InvalidCapacity(
                "FixedRingBuffer with capacity 0".into(),
            ));
        }

        Ok(FixedRingBuffer {
            slots: vec![T::default(); capacity + 1].into_boxed_slice(),
            head: 0,
            tail: 0,
        })
    }

    #[inline(always)]
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    /// Appends `value`.
    ///
    /// Returns `false` and drops the value when the buffer is full.
    pub fn push(&mut self, value: T) -> bool {
        let next = self.next(self.tail);
        if next == self.head {
            return false;
        }
        self.slots[self.tail] = value;
        self.tail = next;
        true
    }

    /// Takes the oldest value.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head];
        self.head = self.next(self.head);
        Some(value)
    }

    #[inline(always)]
    pub fn not_empty(&self) -> bool {
        self.head != self.tail
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.next(self.tail) == self.head
    }

    pub fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}
