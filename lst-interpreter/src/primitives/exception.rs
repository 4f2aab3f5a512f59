use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (201, self::handler_selector),
    (202, self::signal),
];

fn handler_selector(_: &mut Interpreter, universe: &mut Universe, _: &[Oop]) -> Oop {
    universe.new_string("on:do:")
}

fn signal(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Exception>>#signal";

    expect_args!(SIGNATURE, args, [exception]);

    let class = universe.memory.class_of(exception);
    log::warn!("signal from: {}", universe.class_name(class));
    Oop::NIL
}
