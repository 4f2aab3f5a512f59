use std::io::{Read, Write};

use lst_core::bytecode::{BINARY_SELECTORS, UNARY_SELECTORS};
use lst_memory::{
    sys_error, HandleGuard, ImageError, ImageInfo, MemoryParams, ObjectMemory, Oop,
    PrimitiveTableId,
};

use crate::kernel;
use crate::layout;

/// Number of buckets of the global symbol table.
pub const SYMBOL_TABLE_BUCKETS: usize = 53;
/// Number of slots of a fresh method dictionary.
pub const METHOD_TABLE_SIZE: usize = 39;

/// The selector sent when a lookup fails.
pub const NOT_RECOGNIZED_SELECTOR: &str = "message:notRecognizedWithArguments:";
/// The selector sent to watched methods in watch mode.
pub const WATCH_SELECTOR: &str = "watchWith:";
/// The selector compiled for non-local returns out of blocks.
pub const BLOCK_RETURN_SELECTOR: &str = "blockReturn";

/// The kernel classes, with their superclass and their number of instance variables.
#[rustfmt::skip]
const KERNEL_CLASSES: &[(&str, Option<&str>, usize)] = &[
    ("Object",          None,              0),
    ("UndefinedObject", Some("Object"),    0),
    ("Boolean",         Some("Object"),    0),
    ("True",            Some("Boolean"),   0),
    ("False",           Some("Boolean"),   0),
    ("Class",           Some("Object"),    layout::class::SIZE),
    ("Method",          Some("Object"),    layout::method::SIZE),
    ("Context",         Some("Object"),    layout::context::SIZE),
    ("Block",           Some("Object"),    layout::block::SIZE),
    ("Process",         Some("Object"),    layout::process::SIZE),
    ("Dictionary",      Some("Object"),    layout::dictionary::SIZE),
    ("Link",            Some("Object"),    layout::link::SIZE),
    ("Array",           Some("Object"),    0),
    ("ByteArray",       Some("Object"),    0),
    ("String",          Some("ByteArray"), 0),
    ("Symbol",          Some("String"),    0),
    ("Char",            Some("Object"),    layout::char::SIZE),
    ("Integer",         Some("Object"),    0),
    ("Float",           Some("Object"),    0),
    ("CPointer",        Some("Object"),    0),
];

/// The core classes of the Little Smalltalk virtual machine.
///
/// The guards keep these classes alive and let the interpreter reach them directly,
/// even if the image rebinds the matching globals.
#[derive(Debug)]
pub struct CoreClasses {
    /// The **Object** class.
    pub object_class: HandleGuard,
    /// The **UndefinedObject** class.
    pub undefined_object_class: HandleGuard,
    /// The **Boolean** class.
    pub boolean_class: HandleGuard,
    /// The **True** class.
    pub true_class: HandleGuard,
    /// The **False** class.
    pub false_class: HandleGuard,
    /// The **Class** class.
    pub class_class: HandleGuard,
    /// The **Method** class.
    pub method_class: HandleGuard,
    /// The **Context** class.
    pub context_class: HandleGuard,
    /// The **Block** class.
    pub block_class: HandleGuard,
    /// The **Process** class.
    pub process_class: HandleGuard,
    /// The **Dictionary** class.
    pub dictionary_class: HandleGuard,
    /// The **Link** class.
    pub link_class: HandleGuard,
    /// The **Array** class.
    pub array_class: HandleGuard,
    /// The **ByteArray** class.
    pub byte_array_class: HandleGuard,
    /// The **String** class.
    pub string_class: HandleGuard,
    /// The **Symbol** class.
    pub symbol_class: HandleGuard,
    /// The **Char** class.
    pub char_class: HandleGuard,
    /// The **Integer** class.
    pub integer_class: HandleGuard,
    /// The **Float** class.
    pub float_class: HandleGuard,
    /// The **CPointer** class.
    pub cpointer_class: HandleGuard,
}

impl CoreClasses {
    fn unbound(memory: &ObjectMemory) -> Self {
        Self {
            object_class: memory.guard(Oop::NIL),
            undefined_object_class: memory.guard(Oop::NIL),
            boolean_class: memory.guard(Oop::NIL),
            true_class: memory.guard(Oop::NIL),
            false_class: memory.guard(Oop::NIL),
            class_class: memory.guard(Oop::NIL),
            method_class: memory.guard(Oop::NIL),
            context_class: memory.guard(Oop::NIL),
            block_class: memory.guard(Oop::NIL),
            process_class: memory.guard(Oop::NIL),
            dictionary_class: memory.guard(Oop::NIL),
            link_class: memory.guard(Oop::NIL),
            array_class: memory.guard(Oop::NIL),
            byte_array_class: memory.guard(Oop::NIL),
            string_class: memory.guard(Oop::NIL),
            symbol_class: memory.guard(Oop::NIL),
            char_class: memory.guard(Oop::NIL),
            integer_class: memory.guard(Oop::NIL),
            float_class: memory.guard(Oop::NIL),
            cpointer_class: memory.guard(Oop::NIL),
        }
    }

    /// The guards, paired with the global name of the class they hold.
    pub fn entries(&self) -> [(&'static str, &HandleGuard); 20] {
        [
            ("Object", &self.object_class),
            ("UndefinedObject", &self.undefined_object_class),
            ("Boolean", &self.boolean_class),
            ("True", &self.true_class),
            ("False", &self.false_class),
            ("Class", &self.class_class),
            ("Method", &self.method_class),
            ("Context", &self.context_class),
            ("Block", &self.block_class),
            ("Process", &self.process_class),
            ("Dictionary", &self.dictionary_class),
            ("Link", &self.link_class),
            ("Array", &self.array_class),
            ("ByteArray", &self.byte_array_class),
            ("String", &self.string_class),
            ("Symbol", &self.symbol_class),
            ("Char", &self.char_class),
            ("Integer", &self.integer_class),
            ("Float", &self.float_class),
            ("CPointer", &self.cpointer_class),
        ]
    }

    /// The guard holding the kernel class of that name.
    pub fn named(&self, name: &str) -> Option<&HandleGuard> {
        self.entries()
            .into_iter()
            .find(|(class_name, _)| *class_name == name)
            .map(|(_, guard)| guard)
    }
}

/// The special objects and selectors the interpreter refers to directly.
#[derive(Debug)]
pub struct CommonSymbols {
    /// The `true` object.
    pub true_object: HandleGuard,
    /// The `false` object.
    pub false_object: HandleGuard,
    /// The selectors of `SendUnary`, by operand.
    pub unary: Vec<HandleGuard>,
    /// The selectors of `SendBinary`, by operand.
    pub binary: Vec<HandleGuard>,
    /// `message:notRecognizedWithArguments:`.
    pub not_recognized: HandleGuard,
    /// `watchWith:`.
    pub watch_with: HandleGuard,
    /// `blockReturn`.
    pub block_return: HandleGuard,
}

impl CommonSymbols {
    fn unbound(memory: &ObjectMemory) -> Self {
        Self {
            true_object: memory.guard(Oop::NIL),
            false_object: memory.guard(Oop::NIL),
            unary: Vec::new(),
            binary: Vec::new(),
            not_recognized: memory.guard(Oop::NIL),
            watch_with: memory.guard(Oop::NIL),
            block_return: memory.guard(Oop::NIL),
        }
    }
}

/// The central data structure of the virtual machine.
///
/// It owns the object memory and keeps track of the objects the interpreter and the
/// primitives need to reach without going through a global lookup.
pub struct Universe {
    /// The object memory.
    pub memory: ObjectMemory,
    /// The kernel classes.
    pub core: CoreClasses,
    /// The special objects and selectors.
    pub common: CommonSymbols,
}

impl Universe {
    /// Wraps an object memory, without binding anything yet.
    fn with_memory(memory: ObjectMemory) -> Self {
        let core = CoreClasses::unbound(&memory);
        let common = CommonSymbols::unbound(&memory);
        Self {
            memory,
            core,
            common,
        }
    }

    /// Builds a fresh heap holding the kernel classes, the global symbol table, `true`
    /// and `false` and the kernel methods the interpreter relies on.
    pub fn bootstrap(params: MemoryParams) -> Self {
        let mut universe = Self::with_memory(ObjectMemory::with_params(params));

        // the symbol table, classless until its classes exist
        let table = universe.memory.allocate(3 * SYMBOL_TABLE_BUCKETS);
        let _table = universe.memory.guard(table);
        let symbols = universe.memory.allocate(layout::dictionary::SIZE);
        universe
            .memory
            .basic_at_put(symbols, layout::dictionary::TABLE, table);
        universe.memory.set_symbols(symbols);

        for (name, _, _) in KERNEL_CLASSES {
            let class = universe.memory.allocate(layout::class::SIZE);
            if let Some(guard) = universe.core.named(name) {
                guard.set(class);
            }
        }
        let dictionary_class = universe.core.dictionary_class.get();
        let array_class = universe.core.array_class.get();
        universe.memory.set_class(symbols, dictionary_class);
        universe.memory.set_class(table, array_class);

        // metaclasses come second, once every superclass exists
        for &(name, superclass, instance_size) in KERNEL_CLASSES {
            let class = universe.kernel_class(name);
            let superclass = superclass.map_or(Oop::NIL, |name| universe.kernel_class(name));
            universe.initialize_class(class, name, superclass, instance_size);
            universe.set_global(name, class);
        }
        for &(name, superclass, _) in KERNEL_CLASSES {
            let class = universe.kernel_class(name);
            let meta_superclass = match superclass {
                Some(name) => universe.memory.class_of(universe.kernel_class(name)),
                None => universe.core.class_class.get(),
            };
            let metaclass = universe.memory.allocate(layout::class::SIZE);
            let class_class = universe.core.class_class.get();
            universe.memory.set_class(metaclass, class_class);
            universe.memory.set_class(class, metaclass);
            universe.initialize_class(
                metaclass,
                &format!("Meta{}", name),
                meta_superclass,
                layout::class::SIZE,
            );
        }

        let undefined_object_class = universe.core.undefined_object_class.get();
        universe.memory.set_class(Oop::NIL, undefined_object_class);
        for (name, class) in [
            ("true", universe.core.true_class.get()),
            ("false", universe.core.false_class.get()),
        ] {
            let object = universe.memory.allocate(0);
            universe.memory.set_class(object, class);
            universe.set_global(name, object);
        }

        universe.bind_common_symbols();
        kernel::install(&mut universe);
        log::debug!(
            "kernel bootstrapped ({} objects)",
            universe.memory.object_count()
        );
        universe
    }

    /// Loads a heap from an image and binds the common symbols out of it.
    pub fn from_image<R: Read>(
        reader: &mut R,
        params: MemoryParams,
    ) -> Result<(Self, ImageInfo), ImageError> {
        let mut memory = ObjectMemory::with_params(params);
        let info = memory.read_image(reader)?;
        let mut universe = Self::with_memory(memory);
        universe.bind_common_symbols();
        Ok((universe, info))
    }

    /// Writes the heap to an image, recording the given primitive tables.
    pub fn write_image<W: Write>(
        &mut self,
        writer: &mut W,
        primitive_tables: &[PrimitiveTableId],
    ) -> Result<(), ImageError> {
        self.memory.write_image(writer, primitive_tables)
    }

    /// Looks up the kernel classes, `true`, `false` and the selectors with a dedicated
    /// opcode in the global symbol table.
    pub fn bind_common_symbols(&mut self) {
        for (name, guard) in self.core.entries() {
            let class = self.global_symbol(name);
            if class.is_nil() {
                log::warn!("no global binding for the kernel class `{}`", name);
            }
            guard.set(class);
        }
        let integer_class = self.core.integer_class.get();
        self.memory.set_integer_class(integer_class);

        self.common.true_object.set(self.global_symbol("true"));
        self.common.false_object.set(self.global_symbol("false"));

        let unary: Vec<HandleGuard> = UNARY_SELECTORS
            .iter()
            .map(|name| {
                let symbol = self.create_symbol(name);
                self.memory.guard(symbol)
            })
            .collect();
        let binary: Vec<HandleGuard> = BINARY_SELECTORS
            .iter()
            .map(|name| {
                let symbol = self.create_symbol(name);
                self.memory.guard(symbol)
            })
            .collect();
        self.common.unary = unary;
        self.common.binary = binary;

        let not_recognized = self.create_symbol(NOT_RECOGNIZED_SELECTOR);
        self.common.not_recognized.set(not_recognized);
        let watch_with = self.create_symbol(WATCH_SELECTOR);
        self.common.watch_with.set(watch_with);
        let block_return = self.create_symbol(BLOCK_RETURN_SELECTOR);
        self.common.block_return.set(block_return);
    }

    fn kernel_class(&self, name: &str) -> Oop {
        match self.core.named(name) {
            Some(guard) => guard.get(),
            None => sys_error("unknown kernel class", name),
        }
    }

    fn initialize_class(&mut self, class: Oop, name: &str, superclass: Oop, instance_size: usize) {
        let _class = self.memory.guard(class);
        let symbol = self.create_symbol(name);
        self.memory.basic_at_put(class, layout::class::NAME, symbol);
        self.memory.basic_at_put(
            class,
            layout::class::INSTANCE_SIZE,
            Oop::from_integer(instance_size as i64),
        );
        let methods = self.new_dictionary(METHOD_TABLE_SIZE);
        self.memory
            .basic_at_put(class, layout::class::METHODS, methods);
        self.memory
            .basic_at_put(class, layout::class::SUPERCLASS, superclass);
    }

    /// Get the **Object** class.
    pub fn object_class(&self) -> Oop {
        self.core.object_class.get()
    }

    /// Get the **Class** class.
    pub fn class_class(&self) -> Oop {
        self.core.class_class.get()
    }

    /// Get the **Block** class.
    pub fn block_class(&self) -> Oop {
        self.core.block_class.get()
    }

    /// Get the **Context** class.
    pub fn context_class(&self) -> Oop {
        self.core.context_class.get()
    }

    /// Get the **Integer** class.
    pub fn integer_class(&self) -> Oop {
        self.core.integer_class.get()
    }

    /// Get the **String** class.
    pub fn string_class(&self) -> Oop {
        self.core.string_class.get()
    }

    /// Get the **Symbol** class.
    pub fn symbol_class(&self) -> Oop {
        self.core.symbol_class.get()
    }

    /// The `true` object.
    pub fn true_object(&self) -> Oop {
        self.common.true_object.get()
    }

    /// The `false` object.
    pub fn false_object(&self) -> Oop {
        self.common.false_object.get()
    }

    /// Either the `true` or the `false` object.
    pub fn boolean(&self, value: bool) -> Oop {
        if value {
            self.true_object()
        } else {
            self.false_object()
        }
    }

    /// The selector of a `SendUnary` operand.
    pub fn unary_selector(&self, operand: u8) -> Oop {
        match self.common.unary.get(usize::from(operand)) {
            Some(guard) => guard.get(),
            None => sys_error("invalid unary selector", &operand.to_string()),
        }
    }

    /// The selector of a `SendBinary` operand.
    pub fn binary_selector(&self, operand: u8) -> Oop {
        match self.common.binary.get(usize::from(operand)) {
            Some(guard) => guard.get(),
            None => sys_error("invalid binary selector", &operand.to_string()),
        }
    }

    /// The name of a class, as a Rust string.
    pub fn class_name(&self, class: Oop) -> String {
        if class.is_nil() || class.is_small_integer() {
            return String::from("nil");
        }
        let name = self.memory.basic_at(class, layout::class::NAME);
        if name.is_nil() || name.is_small_integer() || !self.memory.is_bytes(name) {
            return String::from("<anonymous class>");
        }
        self.memory.string_value(name)
    }

    /// A short human-readable description of an object.
    pub fn describe(&self, oop: Oop) -> String {
        if let Some(value) = oop.as_small_integer() {
            return value.to_string();
        }
        if oop.is_nil() {
            return String::from("nil");
        }
        if oop == self.true_object() {
            return String::from("true");
        }
        if oop == self.false_object() {
            return String::from("false");
        }

        let class = self.memory.class_of(oop);
        if class == self.symbol_class() {
            format!("#{}", self.memory.string_value(oop))
        } else if class == self.string_class() {
            format!("'{}'", self.memory.string_value(oop))
        } else if class == self.core.float_class.get() {
            self.memory.float_value(oop).to_string()
        } else if class == self.core.char_class.get() {
            let value = self.memory.basic_at(oop, layout::char::VALUE).get_integer();
            match u8::try_from(value) {
                Ok(byte) => format!("${}", char::from(byte)),
                Err(_) => format!("$<{}>", value),
            }
        } else if class == self.class_class()
            || (!class.is_nil() && self.memory.class_of(class) == self.class_class())
        {
            // a metaclass, or a class
            self.class_name(oop)
        } else {
            let name = self.class_name(class);
            let article = match name.chars().next() {
                Some('A' | 'E' | 'I' | 'O' | 'U') => "an",
                _ => "a",
            };
            format!("{} {}", article, name)
        }
    }
}
