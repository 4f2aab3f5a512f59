use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::layout;
use crate::method;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[(39, self::compile)];

/// Compiles source text into a method through the registered compiler.
///
/// Answers `false` when there is no compiler or when compilation fails.
fn compile(interpreter: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Class>>#compile:into:";

    expect_args!(SIGNATURE, args, [class, text, method]);

    let compiler = match interpreter.compiler.as_mut() {
        Some(compiler) => compiler,
        None => {
            log::warn!("no method compiler is registered");
            return universe.false_object();
        }
    };

    let text = universe.memory.string_value(text);
    if !compiler.compile(universe, class, &text, method) {
        return universe.false_object();
    }

    let selector = method::selector(&universe.memory, method);
    interpreter.cache.flush(selector);
    universe
        .memory
        .basic_at_put(method, layout::method::METHOD_CLASS, class);
    universe.true_object()
}
