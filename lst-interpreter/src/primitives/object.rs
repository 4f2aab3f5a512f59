use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::primitives::{index_arg, PrimitiveFn};
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (11, self::class),
    (12, self::basic_size),
    (13, self::hashcode),
    (14, self::debug_print),
    (21, self::eq),
    (22, self::set_class),
    (23, self::debug_print_pair),
    (25, self::basic_at),
    (26, self::byte_at),
    (31, self::basic_at_put),
    (32, self::byte_at_put),
    (58, self::allocate),
    (59, self::allocate_bytes),
];

fn class(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#class";

    expect_args!(SIGNATURE, args, [object]);

    universe.memory.class_of(object)
}

fn basic_size(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#basicSize";

    expect_args!(SIGNATURE, args, [object]);

    Oop::from_integer(universe.memory.basic_size(object) as i64)
}

fn hashcode(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#hash";

    expect_args!(SIGNATURE, args, [object]);

    match object.as_small_integer() {
        Some(value) => Oop::from_integer(value),
        None => Oop::from_integer(object.identity_hash()),
    }
}

fn debug_print(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#debugPrint";

    expect_args!(SIGNATURE, args, [object]);

    eprintln!("primitive 14 {}", universe.describe(object));
    object
}

fn eq(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#==";

    expect_args!(SIGNATURE, args, [a, b]);

    universe.boolean(a == b)
}

fn set_class(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#class:";

    expect_args!(SIGNATURE, args, [object, class]);

    if object.is_small_integer() {
        lst_memory::sys_error("cannot change the class of", SIGNATURE);
    }
    universe.memory.set_class(object, class);
    object
}

fn debug_print_pair(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#debug:";

    expect_args!(SIGNATURE, args, [a, b]);

    eprintln!(
        "primitive 23 {} {}",
        universe.describe(a),
        universe.describe(b)
    );
    a
}

fn basic_at(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#basicAt:";

    expect_args!(SIGNATURE, args, [object, index]);

    universe
        .memory
        .basic_at(object, index_arg(SIGNATURE, index))
}

fn byte_at(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#byteAt:";

    expect_args!(SIGNATURE, args, [object, index]);

    let byte = universe
        .memory
        .byte_at(object, index_arg(SIGNATURE, index));
    Oop::from_integer(i64::from(byte))
}

fn basic_at_put(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#basicAt:put:";

    expect_args!(SIGNATURE, args, [object, index, value]);

    universe
        .memory
        .basic_at_put(object, index_arg(SIGNATURE, index), value);
    object
}

fn byte_at_put(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#byteAt:put:";

    expect_args!(SIGNATURE, args, [object, index, value]);

    // only the low byte is kept
    let byte = value.get_integer() as u8;
    universe
        .memory
        .byte_at_put(object, index_arg(SIGNATURE, index), byte);
    object
}

fn allocate(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#allocate:";

    expect_args!(SIGNATURE, args, [size]);

    universe.memory.allocate(index_arg(SIGNATURE, size))
}

fn allocate_bytes(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Object>>#allocateBytes:";

    expect_args!(SIGNATURE, args, [size]);

    universe.memory.allocate_bytes(index_arg(SIGNATURE, size))
}
