use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// The free slots of the object table, keyed by payload size (in allocation units).
///
/// A multi-map from size to slot index, plus its inverse so that a slot is never
/// recorded twice.
#[derive(Debug, Default, Clone)]
pub(crate) struct FreeList {
    by_size: BTreeSet<(usize, usize)>,
    by_handle: BTreeMap<usize, usize>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.by_size.clear();
        self.by_handle.clear();
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn contains(&self, handle: usize) -> bool {
        self.by_handle.contains_key(&handle)
    }

    /// Records `handle` as free with a payload of `size` units.
    ///
    /// Returns `false` if the slot was already free.
    pub fn insert(&mut self, size: usize, handle: usize) -> bool {
        if self.by_handle.contains_key(&handle) {
            return false;
        }
        self.by_handle.insert(handle, size);
        self.by_size.insert((size, handle));
        true
    }

    fn take(&mut self, entry: Option<(usize, usize)>) -> Option<(usize, usize)> {
        let (size, handle) = entry?;
        self.by_size.remove(&(size, handle));
        self.by_handle.remove(&handle);
        Some((handle, size))
    }

    /// Takes a free slot with exactly `size` units.
    pub fn take_exact(&mut self, size: usize) -> Option<usize> {
        let entry = self
            .by_size
            .range((size, 0)..=(size, usize::MAX))
            .next()
            .copied();
        self.take(entry).map(|(handle, _)| handle)
    }

    /// Takes the smallest free slot strictly larger than `size` units.
    pub fn take_larger(&mut self, size: usize) -> Option<(usize, usize)> {
        let entry = self
            .by_size
            .range((Bound::Excluded((size, usize::MAX)), Bound::Unbounded))
            .next()
            .copied();
        self.take(entry)
    }

    /// Takes the largest non-empty free slot strictly smaller than `size` units.
    pub fn take_smaller(&mut self, size: usize) -> Option<(usize, usize)> {
        if size <= 1 {
            return None;
        }
        let entry = self
            .by_size
            .range((1, 0)..(size, 0))
            .next_back()
            .copied();
        self.take(entry)
    }
}
