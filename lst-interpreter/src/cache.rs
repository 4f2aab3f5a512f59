use lst_memory::{HandleGuard, ObjectMemory, Oop};

/// A resolved send, kept alive by the cache.
#[derive(Debug)]
struct CacheEntry {
    selector: HandleGuard,
    lookup_class: HandleGuard,
    method_class: HandleGuard,
    method: HandleGuard,
}

/// A direct-mapped cache of method lookups, keyed by selector and receiver class.
#[derive(Debug)]
pub struct MethodCache {
    entries: Vec<Option<CacheEntry>>,
    hits: u64,
    misses: u64,
}

impl MethodCache {
    /// Creates an empty cache with `size` entries.
    pub fn new(size: usize) -> Self {
        Self {
            entries: (0..size.max(1)).map(|_| None).collect(),
            hits: 0,
            misses: 0,
        }
    }

    /// The number of entries.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    fn slot(&self, selector: Oop, class: Oop) -> usize {
        let hash = selector
            .identity_hash()
            .wrapping_add(class.identity_hash());
        hash.rem_euclid(self.entries.len() as i64) as usize
    }

    /// The cached `(method, defining class)` for a send of `selector` to an instance of
    /// `class`.
    pub fn lookup(&mut self, selector: Oop, class: Oop) -> Option<(Oop, Oop)> {
        let slot = self.slot(selector, class);
        let found = match &self.entries[slot] {
            Some(entry)
                if entry.selector.get() == selector && entry.lookup_class.get() == class =>
            {
                Some((entry.method.get(), entry.method_class.get()))
            }
            _ => None,
        };
        match found {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        found
    }

    /// Records the result of a lookup, evicting whatever shared its slot.
    pub fn insert(
        &mut self,
        memory: &ObjectMemory,
        selector: Oop,
        class: Oop,
        method: Oop,
        method_class: Oop,
    ) {
        let slot = self.slot(selector, class);
        self.entries[slot] = Some(CacheEntry {
            selector: memory.guard(selector),
            lookup_class: memory.guard(class),
            method_class: memory.guard(method_class),
            method: memory.guard(method),
        });
    }

    /// Empties the slot a send of `selector` to `class` maps to.
    pub fn evict(&mut self, selector: Oop, class: Oop) {
        let slot = self.slot(selector, class);
        self.entries[slot] = None;
    }

    /// Forgets every cached lookup of `selector`, whatever the receiver class.
    ///
    /// Must be called whenever a method is (re)defined: subclasses may have cached the
    /// method it replaces.
    pub fn flush(&mut self, selector: Oop) {
        for entry in self.entries.iter_mut() {
            if matches!(entry, Some(cached) if cached.selector.get() == selector) {
                *entry = None;
            }
        }
    }

    /// Forgets every cached lookup.
    pub fn flush_all(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
    }

    /// The number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// The number of lookups the cache could not answer.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_and_flushes() {
        let memory = ObjectMemory::new();
        let mut cache = MethodCache::new(211);
        let (selector, class) = (Oop::from_index(10), Oop::from_index(20));
        let (method, method_class) = (Oop::from_index(30), Oop::from_index(40));

        assert_eq!(cache.lookup(selector, class), None);
        cache.insert(&memory, selector, class, method, method_class);
        assert_eq!(cache.lookup(selector, class), Some((method, method_class)));
        assert_eq!(cache.lookup(selector, Oop::from_index(21)), None);
        assert_eq!((cache.hits(), cache.misses()), (1, 2));

        // other selectors are left alone
        cache.flush(Oop::from_index(11));
        assert_eq!(cache.lookup(selector, class), Some((method, method_class)));

        cache.flush(selector);
        assert_eq!(cache.lookup(selector, class), None);
    }

    #[test]
    fn flushing_covers_every_receiver_class() {
        let memory = ObjectMemory::new();
        let mut cache = MethodCache::new(211);
        let selector = Oop::from_index(10);
        let (base, derived) = (Oop::from_index(20), Oop::from_index(22));
        let (method, other) = (Oop::from_index(30), Oop::from_index(32));

        cache.insert(&memory, selector, base, method, base);
        cache.insert(&memory, selector, derived, method, base);
        cache.insert(&memory, Oop::from_index(12), derived, other, derived);

        cache.flush(selector);
        assert_eq!(cache.lookup(selector, base), None);
        assert_eq!(cache.lookup(selector, derived), None);
        assert_eq!(
            cache.lookup(Oop::from_index(12), derived),
            Some((other, derived))
        );
    }

    #[test]
    fn entries_keep_their_objects_alive() {
        let mut memory = ObjectMemory::new();
        let mut cache = MethodCache::new(7);
        let method = memory.allocate(9);
        cache.insert(
            &memory,
            Oop::from_integer(1),
            Oop::from_integer(2),
            method,
            Oop::NIL,
        );
        memory.garbage_collect();
        assert!(memory.is_valid(method));

        cache.flush_all();
        assert_eq!(memory.garbage_collect(), 1);
    }
}
