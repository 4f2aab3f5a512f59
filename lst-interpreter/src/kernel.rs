//!
//! The kernel methods the interpreter relies on.
//!
//! Block evaluation, non-local returns, instance creation and message recovery are
//! implemented by ordinary methods built on top of dedicated primitives; a fresh heap
//! gets them here, an image brings its own.
//!

use lst_core::bytecode::BINARY_SELECTORS;
use lst_memory::Oop;

use crate::layout;
use crate::method::MethodBuilder;
use crate::universe::{Universe, BLOCK_RETURN_SELECTOR, NOT_RECOGNIZED_SELECTOR};

/// Methods that forward their receiver and arguments to a primitive, by class.
#[rustfmt::skip]
const PRIMITIVE_METHODS: &[(&str, &str, u8, u8)] = &[
    // (class, selector, argument count, primitive)
    ("Object",  "class",        0, 11),
    ("Object",  "basicSize",    0, 12),
    ("Object",  "hash",         0, 13),
    ("Object",  "==",           1, 21),
    ("Object",  "basicAt:",     1, 25),
    ("Object",  "basicAt:put:", 2, 31),
    ("Process", "execute",      0, 19),
    ("Integer", "asFloat",      0, 51),
    ("Integer", "bitShift:",    1, 79),
    ("String",  ",",            1, 24),
    ("String",  "size",         0, 81),
    ("String",  "asSymbol",     0, 83),
    ("Float",   "printString",  0, 101),
    ("Float",   "+",            1, 110),
    ("Float",   "-",            1, 111),
    ("Float",   "<",            1, 112),
    ("Float",   ">",            1, 113),
    ("Float",   "<=",           1, 114),
    ("Float",   ">=",           1, 115),
    ("Float",   "=",            1, 116),
    ("Float",   "~=",           1, 117),
    ("Float",   "*",            1, 118),
    ("Float",   "/",            1, 119),
];

/// Installs the kernel methods in the kernel classes.
pub fn install(universe: &mut Universe) {
    install_block_methods(universe);
    install_context_methods(universe);
    install_class_methods(universe);

    let object_class = universe.object_class();
    let mut recovery = MethodBuilder::new(universe, NOT_RECOGNIZED_SELECTOR);
    recovery.protocol("error handling").push_nil().stack_return();
    recovery.install(object_class);

    // the integer fast paths fall back on these when the primitive fails
    let integer_class = universe.integer_class();
    for (idx, selector) in BINARY_SELECTORS.iter().enumerate().take(13) {
        install_primitive_method(universe, integer_class, selector, 1, 60 + idx as u8);
    }

    for &(class_name, selector, argument_count, primitive) in PRIMITIVE_METHODS {
        let class = match universe.core.named(class_name) {
            Some(guard) => guard.get(),
            None => continue,
        };
        install_primitive_method(universe, class, selector, argument_count, primitive);
    }
}

/// Installs `selector` in `class` as a method answering the result of `primitive`.
pub fn install_primitive_method(
    universe: &mut Universe,
    class: Oop,
    selector: &str,
    argument_count: u8,
    primitive: u8,
) -> Oop {
    let mut builder = MethodBuilder::new(universe, selector);
    for idx in 0..=argument_count {
        builder.push_argument(idx);
    }
    builder
        .primitive(primitive, argument_count + 1)
        .stack_return();
    builder.install(class)
}

fn install_block_methods(universe: &mut Universe) {
    let block_class = universe.block_class();
    let context = (layout::block::CONTEXT - 1) as u8;
    let argument_location = (layout::block::ARGUMENT_LOCATION - 1) as u8;
    let byte_position = (layout::block::BYTE_POSITION - 1) as u8;

    // jumps into the block body, which returns from this activation
    fn enter(builder: &mut MethodBuilder, context: u8, byte_position: u8) {
        builder
            .push_instance(context)
            .push_instance(byte_position)
            .send("returnToBlock:", 1)
            .stack_return();
    }

    let mut value = MethodBuilder::new(universe, "value");
    enter(&mut value, context, byte_position);
    value.install(block_class);

    // stores the arguments in the temporaries of the block's context first
    for (selector, argument_count) in [("value:", 1), ("value:value:", 2)] {
        let mut builder = MethodBuilder::new(universe, selector);
        for argument in 1..=argument_count {
            builder
                .push_instance(context)
                .push_integer(layout::context::TEMPORARIES as i64)
                .primitive(25, 2)
                .push_instance(argument_location)
                .push_integer(i64::from(argument) - 1)
                .send("+", 1)
                .push_argument(argument)
                .primitive(31, 3)
                .pop();
        }
        enter(&mut builder, context, byte_position);
        builder.install(block_class);
    }
}

fn install_context_methods(universe: &mut Universe) {
    let context_class = universe.context_class();

    let mut return_to_block = MethodBuilder::new(universe, "returnToBlock:");
    return_to_block
        .push_argument(0)
        .push_argument(1)
        .primitive(28, 2)
        .stack_return();
    return_to_block.install(context_class);

    let mut block_return = MethodBuilder::new(universe, BLOCK_RETURN_SELECTOR);
    block_return
        .push_argument(0)
        .primitive(18, 1)
        .stack_return();
    block_return.install(context_class);
}

fn install_class_methods(universe: &mut Universe) {
    let class_class = universe.class_class();
    let instance_size = (layout::class::INSTANCE_SIZE - 1) as u8;

    let mut new = MethodBuilder::new(universe, "new");
    new.push_instance(instance_size)
        .primitive(58, 1)
        .push_argument(0)
        .primitive(22, 2)
        .stack_return();
    new.install(class_class);

    let mut new_sized = MethodBuilder::new(universe, "new:");
    new_sized
        .push_argument(1)
        .primitive(58, 1)
        .push_argument(0)
        .primitive(22, 2)
        .stack_return();
    new_sized.install(class_class);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lst_memory::MemoryParams;

    #[test]
    fn kernel_methods_are_installed() {
        let universe = Universe::bootstrap(MemoryParams::default());
        for (class, selector) in [
            (universe.block_class(), "value"),
            (universe.block_class(), "value:"),
            (universe.context_class(), "blockReturn"),
            (universe.class_class(), "new"),
            (universe.integer_class(), "quo:"),
            (universe.object_class(), NOT_RECOGNIZED_SELECTOR),
        ] {
            let symbol = universe.global_key(selector);
            let found = symbol.and_then(|symbol| universe.lookup_method(symbol, class));
            assert!(found.is_some(), "missing {}", selector);
        }
    }

    #[test]
    fn instances_inherit_object_methods() {
        let universe = Universe::bootstrap(MemoryParams::default());
        let selector = universe.global_key("==").expect("`==` is interned");
        let found = universe.lookup_method(selector, universe.string_class());
        assert_eq!(found.map(|(_, class)| class), Some(universe.object_class()));
    }
}
