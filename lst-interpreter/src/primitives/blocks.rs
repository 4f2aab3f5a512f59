use lst_memory::Oop;

use crate::interpreter::{stack_index, Interpreter};
use crate::layout::{self, linkage};
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (18, self::block_return),
    (19, self::execute),
    (28, self::enter_block),
    (29, self::bind_block),
];

/// Makes the activation that sent `blockReturn` return from the method that created
/// the context instead.
///
/// Answers `false` when that context is no longer live on the process stack.
fn block_return(interpreter: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Context>>#blockReturn";

    expect_args!(SIGNATURE, args, [context]);

    let stack = interpreter.context.process_stack;
    let memory = &mut universe.memory;
    let sender = stack_index(memory.basic_at(
        stack,
        interpreter.context.link_pointer + linkage::PREVIOUS_LINK,
    ));
    let home = stack_index(memory.basic_at(context, layout::context::LINK_POINTER));

    let live = home > 0
        && home + linkage::CONTEXT <= memory.basic_size(stack)
        && memory.basic_at(stack, home + linkage::CONTEXT) == context;
    if !live {
        return universe.false_object();
    }

    let previous = memory.basic_at(stack, home + linkage::PREVIOUS_LINK);
    memory.basic_at_put(stack, sender + linkage::PREVIOUS_LINK, previous);
    let return_point = memory.basic_at(stack, home + linkage::RETURN_POINT);
    memory.basic_at_put(stack, sender + linkage::RETURN_POINT, return_point);
    universe.true_object()
}

/// Runs another process for one nested time slice.
fn execute(interpreter: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Process>>#execute";

    expect_args!(SIGNATURE, args, [process]);

    let budget = interpreter.params.nested_time_slice;
    let yielded = interpreter.nested(universe, |interpreter, universe| {
        interpreter.execute(universe, process, budget)
    });
    universe.boolean(yielded)
}

/// Redirects the activation that sent `returnToBlock:` into the body of a block.
fn enter_block(interpreter: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Context>>#returnToBlock:";

    expect_args!(SIGNATURE, args, [context, byte_position]);

    let stack = interpreter.context.process_stack;
    let memory = &mut universe.memory;
    let sender = stack_index(memory.basic_at(
        stack,
        interpreter.context.link_pointer + linkage::PREVIOUS_LINK,
    ));
    memory.basic_at_put(stack, sender + linkage::CONTEXT, context);
    memory.basic_at_put(stack, sender + linkage::BYTE_OFFSET, byte_position);
    context
}

/// Copies a block literal, binding the copy to the running context.
fn bind_block(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Block>>#in:";

    expect_args!(SIGNATURE, args, [template, context]);

    let block = universe.new_block();
    let memory = &mut universe.memory;
    memory.basic_at_put(block, layout::block::CONTEXT, context);
    for field in [
        layout::block::ARGUMENT_COUNT,
        layout::block::ARGUMENT_LOCATION,
        layout::block::BYTE_POSITION,
    ] {
        let value = memory.basic_at(template, field);
        memory.basic_at_put(block, field, value);
    }
    block
}
