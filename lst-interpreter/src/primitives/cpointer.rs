use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[(141, self::as_string)];

fn as_string(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "CPointer>>#printString";

    expect_args!(SIGNATURE, args, [pointer]);

    let address = universe.memory.word_value(pointer);
    universe.new_string(&format!("{:#x}", address))
}
