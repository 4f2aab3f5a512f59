//!
//! Constructors for the objects the virtual machine creates itself.
//!
//! Every constructor may trigger a collection: arguments that are not reachable from a
//! root must be guarded by the caller.
//!

use lst_memory::{Oop, UNIT_BYTES};

use crate::layout;
use crate::universe::Universe;

impl Universe {
    /// A new `Array` of `size` nil slots.
    pub fn new_array(&mut self, size: usize) -> Oop {
        let array = self.memory.allocate(size);
        let class = self.core.array_class.get();
        self.memory.set_class(array, class);
        array
    }

    /// A new `ByteArray` of `size` zero bytes.
    pub fn new_byte_array(&mut self, size: usize) -> Oop {
        let bytes = self.memory.allocate_bytes(size);
        let class = self.core.byte_array_class.get();
        self.memory.set_class(bytes, class);
        bytes
    }

    /// A new `ByteArray` holding a copy of `content`.
    pub fn new_byte_array_from(&mut self, content: &[u8]) -> Oop {
        let bytes = self.new_byte_array(content.len());
        self.memory.bytes_mut(bytes).copy_from_slice(content);
        bytes
    }

    /// A new `String`.
    pub fn new_string(&mut self, text: &str) -> Oop {
        let string = self.memory.allocate_string(text);
        let class = self.core.string_class.get();
        self.memory.set_class(string, class);
        string
    }

    /// A new `Symbol`, which is not interned.
    ///
    /// Use [`Universe::create_symbol`] to get the unique symbol for a name.
    pub fn new_symbol(&mut self, text: &str) -> Oop {
        let symbol = self.memory.allocate_string(text);
        let class = self.core.symbol_class.get();
        self.memory.set_class(symbol, class);
        symbol
    }

    /// A new `Char` for the byte `value`.
    pub fn new_char(&mut self, value: u8) -> Oop {
        let char = self.memory.allocate(layout::char::SIZE);
        let class = self.core.char_class.get();
        self.memory.set_class(char, class);
        self.memory
            .basic_at_put(char, layout::char::VALUE, Oop::from_integer(i64::from(value)));
        char
    }

    /// A new boxed `Float`.
    pub fn new_float(&mut self, value: f64) -> Oop {
        let float = self.memory.allocate_bytes(UNIT_BYTES);
        let class = self.core.float_class.get();
        self.memory.set_class(float, class);
        self.memory
            .bytes_mut(float)
            .copy_from_slice(&value.to_ne_bytes());
        float
    }

    /// A new boxed C pointer.
    pub fn new_cpointer(&mut self, address: u64) -> Oop {
        let pointer = self.memory.allocate_bytes(UNIT_BYTES);
        let class = self.core.cpointer_class.get();
        self.memory.set_class(pointer, class);
        self.memory
            .bytes_mut(pointer)
            .copy_from_slice(&address.to_ne_bytes());
        pointer
    }

    /// A new name table with `size` slots, `size` being a multiple of three.
    pub fn new_dictionary(&mut self, size: usize) -> Oop {
        let dictionary = self.memory.allocate(layout::dictionary::SIZE);
        let _dictionary = self.memory.guard(dictionary);
        let class = self.core.dictionary_class.get();
        self.memory.set_class(dictionary, class);
        let table = self.new_array(size);
        self.memory
            .basic_at_put(dictionary, layout::dictionary::TABLE, table);
        dictionary
    }

    /// A new overflow link of a name table.
    pub fn new_link(&mut self, key: Oop, value: Oop) -> Oop {
        let link = self.memory.allocate(layout::link::SIZE);
        let class = self.core.link_class.get();
        self.memory.set_class(link, class);
        self.memory.basic_at_put(link, layout::link::KEY, key);
        self.memory.basic_at_put(link, layout::link::VALUE, value);
        link
    }

    /// A new, empty `Method`.
    pub fn new_method(&mut self) -> Oop {
        let method = self.memory.allocate(layout::method::SIZE);
        let class = self.core.method_class.get();
        self.memory.set_class(method, class);
        method
    }

    /// A new `Block`, whose fields are all `nil`.
    pub fn new_block(&mut self) -> Oop {
        let block = self.memory.allocate(layout::block::SIZE);
        let class = self.core.block_class.get();
        self.memory.set_class(block, class);
        block
    }

    /// A new `Context` reifying the activation whose linkage area starts at `link`.
    pub fn new_context(&mut self, link: usize, method: Oop, arguments: Oop, temporaries: Oop) -> Oop {
        let context = self.memory.allocate(layout::context::SIZE);
        let class = self.core.context_class.get();
        self.memory.set_class(context, class);
        self.memory.basic_at_put(
            context,
            layout::context::LINK_POINTER,
            Oop::from_integer(link as i64),
        );
        self.memory
            .basic_at_put(context, layout::context::METHOD, method);
        self.memory
            .basic_at_put(context, layout::context::ARGUMENTS, arguments);
        self.memory
            .basic_at_put(context, layout::context::TEMPORARIES, temporaries);
        context
    }

    /// A new `Array` holding the `size` slots of `object` starting at the 1-based `start`.
    pub fn copy_from(&mut self, object: Oop, start: usize, size: usize) -> Oop {
        let _object = self.memory.guard(object);
        let copy = self.new_array(size);
        for idx in 0..size {
            let value = self.memory.basic_at(object, start + idx);
            self.memory.basic_at_put(copy, idx + 1, value);
        }
        copy
    }

    /// A new class named `name`, along with its metaclass, bound to the global `name`.
    pub fn new_class(&mut self, name: &str, superclass: Oop, instance_size: usize) -> Oop {
        let _superclass = self.memory.guard(superclass);

        let metaclass = self.memory.allocate(layout::class::SIZE);
        let _metaclass = self.memory.guard(metaclass);
        let class_class = self.class_class();
        self.memory.set_class(metaclass, class_class);

        let class = self.memory.allocate(layout::class::SIZE);
        let _class = self.memory.guard(class);
        self.memory.set_class(class, metaclass);

        for (object, object_name, object_superclass, size) in [
            (class, name.to_string(), superclass, instance_size),
            (
                metaclass,
                format!("Meta{}", name),
                if superclass.is_nil() {
                    class_class
                } else {
                    self.memory.class_of(superclass)
                },
                layout::class::SIZE,
            ),
        ] {
            let symbol = self.create_symbol(&object_name);
            self.memory
                .basic_at_put(object, layout::class::NAME, symbol);
            self.memory.basic_at_put(
                object,
                layout::class::INSTANCE_SIZE,
                Oop::from_integer(size as i64),
            );
            self.memory
                .basic_at_put(object, layout::class::SUPERCLASS, object_superclass);
            let methods = self.new_dictionary(crate::universe::METHOD_TABLE_SIZE);
            self.memory
                .basic_at_put(object, layout::class::METHODS, methods);
        }

        self.set_global(name, class);
        class
    }

    /// A new instance of `class`, with as many slots as the class declares.
    pub fn new_instance(&mut self, class: Oop) -> Oop {
        let size = self
            .memory
            .basic_at(class, layout::class::INSTANCE_SIZE)
            .get_integer()
            .max(0) as usize;
        let _class = self.memory.guard(class);
        let instance = self.memory.allocate(size);
        self.memory.set_class(instance, class);
        instance
    }

    /// A new `Process`, ready to run `method` on `receiver` with `arguments`.
    ///
    /// The process stack holds the receiver and the arguments, followed by the linkage
    /// area of the root activation.
    pub fn new_process(&mut self, receiver: Oop, method: Oop, arguments: &[Oop], min_stack: usize) -> Oop {
        let _guards: Vec<_> = std::iter::once(receiver)
            .chain(arguments.iter().copied())
            .chain(std::iter::once(method))
            .map(|oop| self.memory.guard(oop))
            .collect();

        let temporary_size = crate::method::temporary_size(&self.memory, method);
        let stack_size = crate::method::stack_size(&self.memory, method);
        let link = 2 + arguments.len();
        let top = link + layout::linkage::TEMPORARIES - 1 + temporary_size;
        let size = min_stack.max(top + stack_size + layout::linkage::OVERHEAD);

        let process = self.memory.allocate(layout::process::SIZE);
        let _process = self.memory.guard(process);
        let class = self.core.process_class.get();
        self.memory.set_class(process, class);
        let stack = self.new_array(size);

        self.memory.basic_at_put(stack, 1, receiver);
        for (idx, argument) in arguments.iter().enumerate() {
            self.memory.basic_at_put(stack, idx + 2, *argument);
        }
        self.memory.basic_at_put(
            stack,
            link + layout::linkage::PREVIOUS_LINK,
            Oop::from_integer(0),
        );
        self.memory.basic_at_put(
            stack,
            link + layout::linkage::RETURN_POINT,
            Oop::from_integer(1),
        );
        self.memory
            .basic_at_put(stack, link + layout::linkage::METHOD, method);
        self.memory.basic_at_put(
            stack,
            link + layout::linkage::BYTE_OFFSET,
            Oop::from_integer(1),
        );

        self.memory
            .basic_at_put(process, layout::process::STACK, stack);
        self.memory.basic_at_put(
            process,
            layout::process::STACK_TOP,
            Oop::from_integer(top as i64),
        );
        self.memory.basic_at_put(
            process,
            layout::process::LINK_POINTER,
            Oop::from_integer(link as i64),
        );
        process
    }
}
