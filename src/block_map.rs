//! [`SparseBlockMap`] implementation.

use crate::{BlockAddress, TreeError};

/// Presence map over the dense key space `[0, capacity)`.
///
/// Backed by one preallocated array, lookups are a single index.
/// A stored value is present whatever it is, a zero point count
/// included: presence lives in the [`Option`], not in the value.
#[derive(Debug, Clone)]
pub struct SparseBlockMap<V> {
    slots: Vec<Option<V>>,
    len: usize,
}

impl<V> SparseBlockMap<V> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        SparseBlockMap { slots, len: 0 }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of present entries.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` under `address`, returning the previous value.
    pub fn set(&mut self, address: BlockAddress, value: V) -> Result<Option<V>, TreeError> {
        let capacity = self.slots.len();
        let slot = self.slots.get_mut(usize::from(address)).ok_or_else(|| {
            TreeError::AddressOutOfRange(format!("{address}, map capacity {capacity}"))
        })?;

        let old = slot.replace(value);
        if old.is_none() {
            self.len += 1;
        }
        Ok(old)
    }

    #[inline]
    pub fn get(&self, address: BlockAddress) -> Option<&V> {
        self.slots
            .get(usize::from(address))
            .and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, address: BlockAddress) -> Option<&mut V> {
        self.slots
            .get_mut(usize::from(address))
            .and_then(Option::as_mut)
    }

    #[inline]
    pub fn has(&self, address: BlockAddress) -> bool {
        self.get(address).is_some()
    }

    pub fn remove(&mut self, address: BlockAddress) -> Option<V> {
        let old = self
            .slots
            .get_mut(usize::from(address))
            .and_then(Option::take);
        if old.is_some() {
            self.len -= 1;
        }
        old
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
    }

    /// Iterates present entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockAddress, &V)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|value| (BlockAddress::from(i), value)))
    }
}
