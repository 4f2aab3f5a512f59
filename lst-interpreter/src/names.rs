//!
//! Hashed name tables.
//!
//! A name table is a `Dictionary` whose single slot holds an array of
//! `(key, value, link)` triples, one triple per bucket.
//! Keys that collide on a bucket overflow into a chain of `Link` objects hanging off the
//! third slot of the triple.
//! The global symbol table hashes keys by their characters, method dictionaries by the
//! identity of the selector.
//!

use lst_memory::{ObjectMemory, Oop};

use crate::layout;
use crate::universe::Universe;

/// The hash of a string, as used by the global symbol table.
pub fn str_hash(text: &str) -> i64 {
    let mut hash: i64 = text.bytes().map(i64::from).sum();
    if hash > 16384 {
        hash >>= 2;
    }
    hash
}

/// The 0-based index of the first slot of the bucket for `hash`, in a table of `size` slots.
fn bucket(hash: i64, size: usize) -> usize {
    let buckets = (size / 3).max(1) as i64;
    3 * hash.rem_euclid(buckets) as usize
}

impl Universe {
    /// Binds `key` to `value` in a name table, replacing any previous binding of `key`.
    ///
    /// Keys are compared by identity.
    pub fn name_table_insert(&mut self, dictionary: Oop, hash: i64, key: Oop, value: Oop) {
        let table = self.memory.basic_at(dictionary, layout::dictionary::TABLE);
        let index = bucket(hash, self.memory.basic_size(table)) + 1;

        let head = self.memory.basic_at(table, index);
        if head.is_nil() || head == key {
            self.memory.basic_at_put(table, index, key);
            self.memory.basic_at_put(table, index + 1, value);
            return;
        }

        let mut previous = Oop::NIL;
        let mut cursor = self.memory.basic_at(table, index + 2);
        while !cursor.is_nil() {
            if self.memory.basic_at(cursor, layout::link::KEY) == key {
                self.memory.basic_at_put(cursor, layout::link::VALUE, value);
                return;
            }
            previous = cursor;
            cursor = self.memory.basic_at(cursor, layout::link::NEXT);
        }

        let _key = self.memory.guard(key);
        let _value = self.memory.guard(value);
        let link = self.new_link(key, value);
        if previous.is_nil() {
            self.memory.basic_at_put(table, index + 2, link);
        } else {
            self.memory.basic_at_put(previous, layout::link::NEXT, link);
        }
    }

    /// Walks the entries of the bucket for `hash`, answering the first `(key, value)`
    /// pair whose key satisfies `matches`.
    pub fn find_entry(
        &self,
        dictionary: Oop,
        hash: i64,
        mut matches: impl FnMut(&ObjectMemory, Oop) -> bool,
    ) -> Option<(Oop, Oop)> {
        let memory = &self.memory;
        let table = memory.basic_at(dictionary, layout::dictionary::TABLE);
        let index = bucket(hash, memory.basic_size(table)) + 1;

        let key = memory.basic_at(table, index);
        if !key.is_nil() && matches(memory, key) {
            return Some((key, memory.basic_at(table, index + 1)));
        }

        let mut cursor = memory.basic_at(table, index + 2);
        while !cursor.is_nil() {
            let key = memory.basic_at(cursor, layout::link::KEY);
            if matches(memory, key) {
                return Some((key, memory.basic_at(cursor, layout::link::VALUE)));
            }
            cursor = memory.basic_at(cursor, layout::link::NEXT);
        }
        None
    }

    /// The value bound to the first key of the bucket for `hash` satisfying `matches`,
    /// or `nil`.
    pub fn hash_each_element(
        &self,
        dictionary: Oop,
        hash: i64,
        matches: impl FnMut(&ObjectMemory, Oop) -> bool,
    ) -> Oop {
        self.find_entry(dictionary, hash, matches)
            .map_or(Oop::NIL, |(_, value)| value)
    }

    /// The value bound to the string key `name` in a name table, or `nil`.
    pub fn name_table_lookup(&self, dictionary: Oop, name: &str) -> Oop {
        self.hash_each_element(dictionary, str_hash(name), |memory, key| {
            string_key_matches(memory, key, name)
        })
    }

    /// The symbol interned for `name`, if any.
    pub fn global_key(&self, name: &str) -> Option<Oop> {
        self.find_entry(self.memory.symbols(), str_hash(name), |memory, key| {
            string_key_matches(memory, key, name)
        })
        .map(|(key, _)| key)
    }

    /// The value of the global `name`, or `nil`.
    pub fn global_symbol(&self, name: &str) -> Oop {
        self.name_table_lookup(self.memory.symbols(), name)
    }

    /// Interns `name`, registering a fresh symbol bound to `nil` if needed.
    pub fn create_symbol(&mut self, name: &str) -> Oop {
        if let Some(symbol) = self.global_key(name) {
            return symbol;
        }
        let symbol = self.new_symbol(name);
        let symbols = self.memory.symbols();
        self.name_table_insert(symbols, str_hash(name), symbol, Oop::NIL);
        symbol
    }

    /// Binds the global `name` to `value`.
    pub fn set_global(&mut self, name: &str, value: Oop) {
        let _value = self.memory.guard(value);
        let symbol = self.create_symbol(name);
        let symbols = self.memory.symbols();
        self.name_table_insert(symbols, str_hash(name), symbol, value);
    }

    /// Every `(key, value)` binding of a name table, in table order.
    pub fn dictionary_entries(&self, dictionary: Oop) -> Vec<(Oop, Oop)> {
        let memory = &self.memory;
        let table = memory.basic_at(dictionary, layout::dictionary::TABLE);
        let mut entries = Vec::new();
        for index in (1..=memory.basic_size(table)).step_by(3) {
            let key = memory.basic_at(table, index);
            if !key.is_nil() {
                entries.push((key, memory.basic_at(table, index + 1)));
            }
            let mut cursor = memory.basic_at(table, index + 2);
            while !cursor.is_nil() {
                entries.push((
                    memory.basic_at(cursor, layout::link::KEY),
                    memory.basic_at(cursor, layout::link::VALUE),
                ));
                cursor = memory.basic_at(cursor, layout::link::NEXT);
            }
        }
        entries
    }

    /// The method bound to `selector` in a method dictionary, or `nil`.
    pub fn method_lookup(&self, dictionary: Oop, selector: Oop) -> Oop {
        self.hash_each_element(dictionary, selector.identity_hash(), |_, key| {
            key == selector
        })
    }
}

fn string_key_matches(memory: &ObjectMemory, key: Oop, name: &str) -> bool {
    !key.is_small_integer() && memory.is_bytes(key) && memory.string_equals(key, name)
}
