use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::error::sys_error;
use crate::free_list::FreeList;
use crate::handles::{HandleGuard, HandleList};
use crate::oop::Oop;

/// The number of bytes in an allocation unit (one object slot).
pub const UNIT_BYTES: usize = std::mem::size_of::<i64>();

/// The sizing parameters of the object table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryParams {
    /// The number of entries the object table starts with.
    pub initial_size: usize,
    /// The number of entries added whenever the table runs out of free slots.
    pub grow_amount: usize,
    /// The number of entries past which growing the table is a fatal error.
    pub max_size: usize,
}

impl Default for MemoryParams {
    fn default() -> Self {
        Self {
            initial_size: 6500,
            grow_amount: 5000,
            max_size: 1 << 22,
        }
    }
}

/// Counters describing how allocations were satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Total number of objects allocated.
    pub allocations: usize,
    /// Allocations served by a free slot of the exact requested size.
    pub exact_hits: usize,
    /// Allocations served by growing a free slot of size zero.
    pub zero_slot_hits: usize,
    /// Allocations served by trimming a larger free slot.
    pub shrunk_hits: usize,
    /// Allocations served by enlarging a smaller free slot.
    pub grown_hits: usize,
    /// Number of garbage collections performed.
    pub collections: usize,
    /// Total number of objects reclaimed by collections.
    pub objects_freed: usize,
    /// Number of times the object table was grown.
    pub table_growths: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Words(Vec<Oop>),
    Bytes(Vec<u8>),
}

/// An entry of the object table.
#[derive(Debug, Clone)]
pub(crate) struct ObjectHeader {
    pub class: Oop,
    /// Only meaningful during and right after a collection, where it holds the number
    /// of references found to this object.
    pub reference_count: i64,
    /// Positive for pointer objects (number of slots), negative for byte objects
    /// (number of bytes).
    pub size: i64,
    pub payload: Payload,
}

impl ObjectHeader {
    pub fn empty() -> Self {
        Self {
            class: Oop::NIL,
            reference_count: 0,
            size: 0,
            payload: Payload::Words(Vec::new()),
        }
    }

    pub fn units(&self) -> usize {
        units_for_size(self.size)
    }
}

/// The number of allocation units backing an object of the given signed size.
pub(crate) fn units_for_size(size: i64) -> usize {
    if size >= 0 {
        size as usize
    } else {
        (size.unsigned_abs() as usize + UNIT_BYTES - 1) / UNIT_BYTES
    }
}

/// The object memory: the object table, its free lists and its GC roots.
pub struct ObjectMemory {
    pub(crate) params: MemoryParams,
    pub(crate) objects: Vec<ObjectHeader>,
    pub(crate) free: FreeList,
    pub(crate) handles: Rc<RefCell<HandleList>>,
    pub(crate) symbols: Oop,
    pub(crate) active_stack: Oop,
    pub(crate) integer_class: Oop,
    pub(crate) gc_disabled: bool,
    pub(crate) allocation_serial: i64,
    pub(crate) stats: AllocationStats,
}

impl Default for ObjectMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectMemory {
    /// Creates a new object memory, with the default parameters.
    pub fn new() -> Self {
        Self::with_params(MemoryParams::default())
    }

    /// Creates a new object memory, with the specified parameters.
    pub fn with_params(params: MemoryParams) -> Self {
        let mut memory = Self {
            objects: Vec::new(),
            free: FreeList::new(),
            handles: Rc::new(RefCell::new(HandleList::default())),
            symbols: Oop::NIL,
            active_stack: Oop::NIL,
            integer_class: Oop::NIL,
            gc_disabled: false,
            allocation_serial: 0,
            stats: AllocationStats::default(),
            params,
        };
        memory.reset_table();
        memory
    }

    /// Empties the table back to its initial size, everything but `nil` being free.
    pub(crate) fn reset_table(&mut self) {
        let size = self.params.initial_size.max(1);
        self.objects = (0..size).map(|_| ObjectHeader::empty()).collect();
        self.set_free_lists();
        self.objects[0].reference_count = 1;
    }

    /// Returns a reference to the memory's parameters.
    pub fn params(&self) -> &MemoryParams {
        &self.params
    }

    /// Returns a reference to the allocation counters.
    pub fn stats(&self) -> &AllocationStats {
        &self.stats
    }

    /// Allocates a pointer object of `size` slots, all `nil`.
    ///
    /// The class of the new object is `nil`.
    pub fn allocate(&mut self, size: usize) -> Oop {
        let index = self.allocate_slot(size);
        let header = &mut self.objects[index];
        header.class = Oop::NIL;
        header.reference_count = 0;
        header.size = size as i64;
        match &mut header.payload {
            Payload::Words(words) => {
                words.clear();
                words.resize(size, Oop::NIL);
            }
            payload => *payload = Payload::Words(vec![Oop::NIL; size]),
        }
        Oop::from_index(index)
    }

    /// Allocates a byte object of `size` bytes, all zero.
    ///
    /// The backing block is rounded up to whole allocation units.
    pub fn allocate_bytes(&mut self, size: usize) -> Oop {
        let units = (size + UNIT_BYTES - 1) / UNIT_BYTES;
        let index = self.allocate_slot(units);
        let header = &mut self.objects[index];
        header.class = Oop::NIL;
        header.reference_count = 0;
        header.size = -(size as i64);
        header.payload = Payload::Bytes(vec![0; units * UNIT_BYTES]);
        Oop::from_index(index)
    }

    /// Allocates a NUL-terminated byte object holding `text`.
    pub fn allocate_string(&mut self, text: &str) -> Oop {
        let oop = self.allocate_bytes(text.len() + 1);
        self.bytes_mut(oop)[..text.len()].copy_from_slice(text.as_bytes());
        oop
    }

    fn allocate_slot(&mut self, units: usize) -> usize {
        self.stats.allocations += 1;
        self.allocation_serial += 1;

        if let Some(index) = self.reuse_slot(units) {
            return index;
        }

        log::debug!("no free slot for {} units, collecting garbage", units);
        self.garbage_collect();
        if let Some(index) = self.reuse_slot(units) {
            return index;
        }

        log::debug!("no free slot for {} units after collection", units);
        self.grow(self.params.grow_amount);
        if let Some(index) = self.reuse_slot(units) {
            return index;
        }

        sys_error("allocate", &format!("cannot find a slot for {} units", units));
    }

    fn reuse_slot(&mut self, units: usize) -> Option<usize> {
        if let Some(index) = self.free.take_exact(units) {
            self.stats.exact_hits += 1;
            return Some(index);
        }
        if let Some(index) = self.free.take_exact(0) {
            self.stats.zero_slot_hits += 1;
            return Some(index);
        }
        if let Some((index, _)) = self.free.take_larger(units) {
            self.stats.shrunk_hits += 1;
            return Some(index);
        }
        if let Some((index, _)) = self.free.take_smaller(units) {
            self.stats.grown_hits += 1;
            return Some(index);
        }
        None
    }

    /// Adds `amount` empty entries to the object table, returning the new table size.
    pub fn grow(&mut self, amount: usize) -> usize {
        let current = self.objects.len();
        if current + amount > self.params.max_size {
            sys_error(
                "object table exhausted",
                &format!(
                    "cannot grow from {} to {} entries (maximum is {})",
                    current,
                    current + amount,
                    self.params.max_size
                ),
            );
        }
        self.extend_table(amount);
        for index in current..self.objects.len() {
            self.free.insert(0, index);
        }
        self.stats.table_growths += 1;
        log::debug!("growing object table to {} entries", self.objects.len());
        self.objects.len()
    }

    pub(crate) fn extend_table(&mut self, amount: usize) {
        let size = self.objects.len() + amount;
        self.objects.resize_with(size, ObjectHeader::empty);
    }

    /// Sets how many entries are added when the table runs out of free slots.
    pub fn set_grow_amount(&mut self, amount: usize) {
        self.params.grow_amount = amount;
    }

    /// Prevents (or allows again) garbage collections.
    pub fn disable_gc(&mut self, disable: bool) {
        self.gc_disabled = disable;
    }

    /// Releases a slot into the free lists, clearing its payload.
    ///
    /// Returns `false` if the slot was already free.
    pub(crate) fn destroy(&mut self, index: usize) -> bool {
        let header = &mut self.objects[index];
        if header.reference_count < 0 {
            sys_error(
                "negative reference count",
                &format!("object #{} ({})", index, header.reference_count),
            );
        }
        let units = header.units();
        let deleted = self.free.insert(units, index);
        header.class = Oop::NIL;
        header.size = units as i64;
        match &mut header.payload {
            Payload::Words(words) => {
                words.clear();
                words.resize(units, Oop::NIL);
            }
            payload => *payload = Payload::Words(vec![Oop::NIL; units]),
        }
        deleted
    }

    /// Rebuilds the free lists from the slots whose reference count is zero.
    pub(crate) fn set_free_lists(&mut self) {
        self.free.clear();
        for index in (1..self.objects.len()).rev() {
            if self.objects[index].reference_count == 0 {
                self.destroy(index);
            }
        }
    }

    /// Performs a mark-sweep collection, returning the number of objects freed.
    ///
    /// Roots are the symbol table, the active process stack and every live handle guard.
    /// Afterwards, the reference count of every surviving object is the number of
    /// references found to it.
    pub fn garbage_collect(&mut self) -> usize {
        if self.gc_disabled {
            return 0;
        }
        self.mark_and_sweep()
    }

    pub(crate) fn mark_and_sweep(&mut self) -> usize {
        for header in self.objects.iter_mut() {
            header.reference_count = 0;
        }
        self.objects[0].reference_count = 1;

        let mut pending = vec![self.symbols, self.active_stack];
        pending.extend(self.handles.borrow().roots());

        while let Some(oop) = pending.pop() {
            let Some(index) = oop.index() else {
                continue;
            };
            if index == 0 {
                continue;
            }
            let Some(header) = self.objects.get_mut(index) else {
                sys_error(
                    "garbage collection",
                    &format!("reference to object #{} outside of the table", index),
                );
            };
            header.reference_count -= 1;
            if header.reference_count == -1 {
                pending.push(header.class);
                if let Payload::Words(words) = &header.payload {
                    pending.extend_from_slice(words);
                }
            }
        }

        let mut live = 1;
        let mut freed = 0;
        for index in (1..self.objects.len()).rev() {
            let count = self.objects[index].reference_count;
            if count == 0 {
                if self.destroy(index) {
                    freed += 1;
                }
            } else {
                self.objects[index].reference_count = -count;
                live += 1;
            }
        }

        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        log::debug!(
            "garbage collection: {} live objects, {} freed, {} guards",
            live,
            freed,
            self.handle_count()
        );
        freed
    }

    /// Registers `oop` as a GC root for as long as the returned guard lives.
    pub fn guard(&self, oop: Oop) -> HandleGuard {
        HandleGuard::new(&self.handles, oop)
    }

    /// The number of live handle guards.
    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }

    /// The global symbol table.
    pub fn symbols(&self) -> Oop {
        self.symbols
    }

    /// Sets the global symbol table, which roots everything a program can name.
    pub fn set_symbols(&mut self, symbols: Oop) {
        self.symbols = symbols;
    }

    /// The stack of the process being executed.
    pub fn active_stack(&self) -> Oop {
        self.active_stack
    }

    /// Sets the stack of the process being executed.
    pub fn set_active_stack(&mut self, stack: Oop) {
        self.active_stack = stack;
    }

    /// The class answered for tagged small integers.
    pub fn integer_class(&self) -> Oop {
        self.integer_class
    }

    /// Sets the class answered for tagged small integers.
    ///
    /// The class must be reachable from a root of its own.
    pub fn set_integer_class(&mut self, class: Oop) {
        self.integer_class = class;
    }

    /// A counter bumped on every allocation and persisted in images.
    pub fn allocation_serial(&self) -> i64 {
        self.allocation_serial
    }

    fn header(&self, oop: Oop, context: &str) -> &ObjectHeader {
        match oop.index().and_then(|index| self.objects.get(index)) {
            Some(header) => header,
            None => sys_error(context, &format!("{:?} is not an object", oop)),
        }
    }

    fn header_mut(&mut self, oop: Oop, context: &str) -> &mut ObjectHeader {
        match oop.index().and_then(|index| self.objects.get_mut(index)) {
            Some(header) => header,
            None => sys_error(context, &format!("{:?} is not an object", oop)),
        }
    }

    /// Is `oop` a live (not free) object or a small integer ?
    pub fn is_valid(&self, oop: Oop) -> bool {
        match oop.index() {
            None => true,
            Some(0) => true,
            Some(index) => index < self.objects.len() && !self.free.contains(index),
        }
    }

    /// The class of `oop`.
    pub fn class_of(&self, oop: Oop) -> Oop {
        if oop.is_small_integer() {
            self.integer_class
        } else {
            self.header(oop, "classOf").class
        }
    }

    /// Changes the class of `oop`.
    pub fn set_class(&mut self, oop: Oop, class: Oop) {
        self.header_mut(oop, "setClass").class = class;
    }

    /// The signed size of `oop`: slot count for pointer objects, negated byte count for
    /// byte objects and `0` for small integers.
    pub fn size_of(&self, oop: Oop) -> i64 {
        if oop.is_small_integer() {
            0
        } else {
            self.header(oop, "sizeOf").size
        }
    }

    /// The number of slots (or bytes) of `oop`.
    pub fn basic_size(&self, oop: Oop) -> usize {
        self.size_of(oop).unsigned_abs() as usize
    }

    /// Is `oop` a byte object ?
    pub fn is_bytes(&self, oop: Oop) -> bool {
        self.size_of(oop) < 0
    }

    /// The reference count left by the last collection.
    pub fn reference_count(&self, oop: Oop) -> i64 {
        self.header(oop, "referenceCount").reference_count
    }

    /// Reads the 1-based slot `index` of a pointer object.
    pub fn basic_at(&self, oop: Oop, index: usize) -> Oop {
        match &self.header(oop, "basicAt").payload {
            Payload::Words(words) if index >= 1 && index <= words.len() => words[index - 1],
            _ => sys_error(
                "index out of range",
                &format!("basicAt: {} on {:?}", index, oop),
            ),
        }
    }

    /// Writes the 1-based slot `index` of a pointer object.
    pub fn basic_at_put(&mut self, oop: Oop, index: usize, value: Oop) {
        match &mut self.header_mut(oop, "basicAtPut").payload {
            Payload::Words(words) if index >= 1 && index <= words.len() => {
                words[index - 1] = value
            }
            _ => sys_error(
                "index out of range",
                &format!("basicAt: {} put: on {:?}", index, oop),
            ),
        }
    }

    /// The slots of a pointer object.
    pub fn words(&self, oop: Oop) -> &[Oop] {
        match &self.header(oop, "words").payload {
            Payload::Words(words) => words,
            Payload::Bytes(_) => sys_error("not a pointer object", &format!("{:?}", oop)),
        }
    }

    /// The bytes of a byte object.
    pub fn bytes(&self, oop: Oop) -> &[u8] {
        let header = self.header(oop, "bytes");
        match &header.payload {
            Payload::Bytes(bytes) => &bytes[..header.size.unsigned_abs() as usize],
            Payload::Words(_) => sys_error("not a byte object", &format!("{:?}", oop)),
        }
    }

    /// The bytes of a byte object, mutably.
    pub fn bytes_mut(&mut self, oop: Oop) -> &mut [u8] {
        let header = self.header_mut(oop, "bytes");
        let size = header.size.unsigned_abs() as usize;
        match &mut header.payload {
            Payload::Bytes(bytes) => &mut bytes[..size],
            Payload::Words(_) => sys_error("not a byte object", &format!("{:?}", oop)),
        }
    }

    /// Reads the 1-based byte `index` of a byte object.
    pub fn byte_at(&self, oop: Oop, index: usize) -> u8 {
        let bytes = self.bytes(oop);
        if index == 0 || index > bytes.len() {
            sys_error("index out of range", &format!("byteAt: {} on {:?}", index, oop));
        }
        bytes[index - 1]
    }

    /// Writes the 1-based byte `index` of a byte object.
    pub fn byte_at_put(&mut self, oop: Oop, index: usize, value: u8) {
        let bytes = self.bytes_mut(oop);
        if index == 0 || index > bytes.len() {
            sys_error(
                "index out of range",
                &format!("byteAt: {} put: on {:?}", index, oop),
            );
        }
        bytes[index - 1] = value;
    }

    /// The text of a NUL-terminated byte object (strings and symbols).
    pub fn string_value(&self, oop: Oop) -> String {
        if oop.is_nil() {
            return String::new();
        }
        let bytes = self.bytes(oop);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Does the NUL-terminated byte object `oop` hold exactly `text` ?
    pub fn string_equals(&self, oop: Oop, text: &str) -> bool {
        if oop.is_small_integer() || oop.is_nil() || !self.is_bytes(oop) {
            return false;
        }
        let bytes = self.bytes(oop);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        &bytes[..end] == text.as_bytes()
    }

    /// The value of a boxed float.
    pub fn float_value(&self, oop: Oop) -> f64 {
        let bytes = self.bytes(oop);
        match bytes.get(..UNIT_BYTES) {
            Some(raw) => {
                let mut buf = [0; UNIT_BYTES];
                buf.copy_from_slice(raw);
                f64::from_ne_bytes(buf)
            }
            None => sys_error("invalid float", &format!("{:?}", oop)),
        }
    }

    /// The value of a boxed machine word (C pointers).
    pub fn word_value(&self, oop: Oop) -> u64 {
        let bytes = self.bytes(oop);
        match bytes.get(..UNIT_BYTES) {
            Some(raw) => {
                let mut buf = [0; UNIT_BYTES];
                buf.copy_from_slice(raw);
                u64::from_ne_bytes(buf)
            }
            None => sys_error("invalid cPointer", &format!("{:?}", oop)),
        }
    }

    /// The number of entries in the object table.
    pub fn storage_size(&self) -> usize {
        self.objects.len()
    }

    /// The number of free entries in the object table.
    pub fn free_slot_count(&self) -> usize {
        self.free.len()
    }

    /// The number of entries in use.
    pub fn object_count(&self) -> usize {
        self.storage_size() - self.free_slot_count()
    }

    /// A human-readable summary of the table occupancy.
    pub fn stats_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Memory Statistics:");
        let _ = writeln!(out, "\tActive Objects     {}", self.object_count());
        let _ = writeln!(out, "\tObjectstore size   {}", self.storage_size());
        let _ = writeln!(out, "\tFree objects       {}", self.free_slot_count());
        let _ = writeln!(out, "\tCollections        {}", self.stats.collections);
        out
    }
}
