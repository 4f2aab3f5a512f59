use lst_memory::{MemoryParams, Oop};

use lst_interpreter::interpreter::{ExecutionOutcome, Interpreter, InterpreterParams};
use lst_interpreter::layout;
use lst_interpreter::method::MethodBuilder;
use lst_interpreter::primitives::MethodCompiler;
use lst_interpreter::universe::{Universe, NOT_RECOGNIZED_SELECTOR, WATCH_SELECTOR};

fn setup() -> (Universe, Interpreter) {
    let universe = Universe::bootstrap(MemoryParams::default());
    (universe, Interpreter::new())
}

/// Assembles a method with a `nil` receiver and runs it to completion.
fn run_do_it(
    universe: &mut Universe,
    interpreter: &mut Interpreter,
    body: impl FnOnce(&mut MethodBuilder),
) -> Oop {
    let mut builder = MethodBuilder::new(universe, "doIt");
    body(&mut builder);
    let method = builder.finish();
    interpreter.run_method(universe, method)
}

/// Installs `self = 0 ifTrue: [^0]. ^(self - 1) countDown + 1` in **Integer**.
fn install_count_down(universe: &mut Universe) {
    let integer_class = universe.integer_class();
    let mut builder = MethodBuilder::new(universe, "countDown");
    builder.push_argument(0).push_integer(0).send("=", 1);
    let recurse = builder.branch_if_false();
    builder.push_integer(0).stack_return();
    builder
        .bind(recurse)
        .push_argument(0)
        .push_integer(1)
        .send("-", 1)
        .send("countDown", 0)
        .push_integer(1)
        .send("+", 1)
        .stack_return();
    builder.install(integer_class);
}

#[test]
fn adds_small_integers() {
    let (mut universe, mut interpreter) = setup();
    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_integer(3)
            .push_integer(4)
            .send("+", 1)
            .stack_return();
    });
    assert_eq!(result, Oop::from_integer(7));
}

#[test]
fn failed_integer_primitives_answer_nil() {
    let (mut universe, mut interpreter) = setup();

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_integer(1)
            .push_integer(0)
            .send("quo:", 1)
            .stack_return();
    });
    assert_eq!(result, Oop::NIL);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_integer(Oop::MAX_INTEGER)
            .push_integer(1)
            .send("+", 1)
            .stack_return();
    });
    assert_eq!(result, Oop::NIL);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_integer(17)
            .push_integer(5)
            .send("rem:", 1)
            .stack_return();
    });
    assert_eq!(result, Oop::from_integer(2));
}

#[test]
fn branches_and_comparisons() {
    let (mut universe, mut interpreter) = setup();
    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_integer(3).push_integer(4).send("<", 1);
        let otherwise = builder.branch_if_false();
        builder.push_integer(10).stack_return();
        builder.bind(otherwise).push_integer(20).stack_return();
    });
    assert_eq!(result, Oop::from_integer(10));

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_integer(3).push_integer(4).send(">", 1);
        let otherwise = builder.branch_if_false();
        builder.push_integer(10).stack_return();
        builder.bind(otherwise).push_integer(20).stack_return();
    });
    assert_eq!(result, Oop::from_integer(20));
}

#[test]
fn nil_tests_are_answered_inline() {
    let (mut universe, mut interpreter) = setup();
    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_nil().send("isNil", 0).stack_return();
    });
    assert_eq!(result, universe.true_object());
    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_nil().send("notNil", 0).stack_return();
    });
    assert_eq!(result, universe.false_object());
}

#[test]
fn undefined_selectors_reach_the_recovery_method() {
    let (mut universe, mut interpreter) = setup();

    // answers the selector it was sent
    let object_class = universe.object_class();
    let mut recovery = MethodBuilder::new(&mut universe, NOT_RECOGNIZED_SELECTOR);
    recovery.push_argument(1).stack_return();
    let recovery = recovery.finish();
    interpreter.install_method(&mut universe, object_class, recovery);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_integer(3).send("frobnicate", 0).stack_return();
    });
    assert_eq!(Some(result), universe.global_key("frobnicate"));

    // the arguments are handed over in an array, receiver first
    let mut recovery = MethodBuilder::new(&mut universe, NOT_RECOGNIZED_SELECTOR);
    recovery.push_argument(2).stack_return();
    let recovery = recovery.finish();
    interpreter.install_method(&mut universe, object_class, recovery);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_integer(3)
            .push_integer(4)
            .push_integer(5)
            .send("frobnicate:with:", 2)
            .stack_return();
    });
    let arguments: Vec<Oop> = universe.memory.words(result).to_vec();
    assert_eq!(
        arguments,
        vec![Oop::from_integer(3), Oop::from_integer(4), Oop::from_integer(5)]
    );
}

#[test]
fn sends_go_through_the_cache() {
    let (mut universe, mut interpreter) = setup();
    install_count_down(&mut universe);

    let count_down = |universe: &mut Universe, interpreter: &mut Interpreter| {
        run_do_it(universe, interpreter, |builder| {
            builder.push_integer(5).send("countDown", 0).stack_return();
        })
    };

    assert_eq!(count_down(&mut universe, &mut interpreter), Oop::from_integer(5));
    let hits = interpreter.cache.hits();
    assert!(hits > 0);

    // a cold cache gives the same answers
    interpreter.cache.flush_all();
    assert_eq!(count_down(&mut universe, &mut interpreter), Oop::from_integer(5));
    let mut uncached = Interpreter::with_params(InterpreterParams {
        cache_size: 1,
        ..InterpreterParams::default()
    });
    assert_eq!(count_down(&mut universe, &mut uncached), Oop::from_integer(5));
}

#[test]
fn redefining_a_method_invalidates_the_cache() {
    let (mut universe, mut interpreter) = setup();
    let object_class = universe.object_class();
    let foo = universe.new_class("Foo", object_class, 0);
    let mut answer = MethodBuilder::new(&mut universe, "answer");
    answer.push_integer(1).stack_return();
    answer.install(foo);

    let ask = |universe: &mut Universe, interpreter: &mut Interpreter| {
        run_do_it(universe, interpreter, |builder| {
            builder
                .push_global("Foo")
                .send("new", 0)
                .send("answer", 0)
                .stack_return();
        })
    };
    assert_eq!(ask(&mut universe, &mut interpreter), Oop::from_integer(1));
    assert_eq!(ask(&mut universe, &mut interpreter), Oop::from_integer(1));

    let mut answer = MethodBuilder::new(&mut universe, "answer");
    answer.push_integer(2).stack_return();
    let answer = answer.finish();
    interpreter.install_method(&mut universe, foo, answer);
    assert_eq!(ask(&mut universe, &mut interpreter), Oop::from_integer(2));
}

/// Compiles `selector value` into a method answering `value`.
struct ConstantCompiler;

impl MethodCompiler for ConstantCompiler {
    fn compile(&mut self, universe: &mut Universe, class: Oop, text: &str, method: Oop) -> bool {
        let (selector, value) = match text.split_once(' ') {
            Some(parts) => parts,
            None => return false,
        };
        let value: i64 = match value.parse() {
            Ok(value) => value,
            Err(_) => return false,
        };

        let _method = universe.memory.guard(method);
        let mut builder = MethodBuilder::new(universe, selector);
        builder.push_integer(value).stack_return();
        let template = builder.finish();
        for slot in [
            layout::method::MESSAGE,
            layout::method::BYTECODES,
            layout::method::LITERALS,
            layout::method::STACK_SIZE,
            layout::method::TEMPORARY_SIZE,
        ] {
            let value = universe.memory.basic_at(template, slot);
            universe.memory.basic_at_put(method, slot, value);
        }
        universe.install_method(class, method);
        true
    }
}

#[test]
fn the_compile_primitive_flushes_the_cache() {
    let (mut universe, mut interpreter) = setup();
    let object_class = universe.object_class();
    let foo = universe.new_class("Foo", object_class, 0);
    let mut answer = MethodBuilder::new(&mut universe, "answer");
    answer.push_integer(1).stack_return();
    answer.install(foo);

    let ask = |universe: &mut Universe, interpreter: &mut Interpreter| {
        run_do_it(universe, interpreter, |builder| {
            builder
                .push_global("Foo")
                .send("new", 0)
                .send("answer", 0)
                .stack_return();
        })
    };
    let compile = |universe: &mut Universe, interpreter: &mut Interpreter, text: &str| {
        let text = text.to_string();
        run_do_it(universe, interpreter, move |builder| {
            builder
                .push_global("Foo")
                .push_string(&text)
                .push_global("Method")
                .send("new", 0)
                .primitive(39, 3)
                .stack_return();
        })
    };

    // no compiler registered yet
    assert_eq!(
        compile(&mut universe, &mut interpreter, "answer 2"),
        universe.false_object()
    );

    assert_eq!(ask(&mut universe, &mut interpreter), Oop::from_integer(1));
    interpreter.set_compiler(Box::new(ConstantCompiler));
    assert_eq!(
        compile(&mut universe, &mut interpreter, "answer 2"),
        universe.true_object()
    );
    assert_eq!(ask(&mut universe, &mut interpreter), Oop::from_integer(2));

    assert_eq!(
        compile(&mut universe, &mut interpreter, "answer two"),
        universe.false_object()
    );
    assert_eq!(ask(&mut universe, &mut interpreter), Oop::from_integer(2));
}

#[test]
fn deep_recursion_grows_the_stack() {
    let (mut universe, mut interpreter) = setup();
    install_count_down(&mut universe);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_integer(100).send("countDown", 0).stack_return();
    });
    assert_eq!(result, Oop::from_integer(100));
}

#[test]
fn runaway_recursion_is_abandoned() {
    let (mut universe, mut interpreter) = setup();
    let integer_class = universe.integer_class();
    let mut forever = MethodBuilder::new(&mut universe, "forever");
    forever.push_argument(0).send("forever", 0).stack_return();
    forever.install(integer_class);

    let mut builder = MethodBuilder::new(&mut universe, "doIt");
    builder.push_integer(1).send("forever", 0).stack_return();
    let method = builder.finish();
    let process = universe.new_process(Oop::NIL, method, &[], 50);
    let _process = universe.memory.guard(process);

    let outcome = interpreter.run_to_completion(&mut universe, process);
    assert_eq!(outcome, ExecutionOutcome::Abandoned);

    // abandoned processes are not resumed
    assert!(!interpreter.execute(&mut universe, process, 100));
    assert_eq!(Interpreter::process_result(&universe, process), Oop::NIL);
    let top = universe.memory.basic_at(process, layout::process::STACK_TOP);
    assert_eq!(top, Oop::from_integer(1));
}

#[test]
fn processes_yield_when_their_budget_runs_out() {
    let (mut universe, mut interpreter) = setup();
    install_count_down(&mut universe);

    let mut builder = MethodBuilder::new(&mut universe, "doIt");
    builder.push_integer(50).send("countDown", 0).stack_return();
    let method = builder.finish();
    let process = universe.new_process(Oop::NIL, method, &[], 50);
    let _process = universe.memory.guard(process);

    let mut slices = 0;
    while interpreter.execute(&mut universe, process, 20) {
        slices += 1;
        // collections between slices must not disturb the process
        universe.memory.garbage_collect();
    }
    assert!(slices > 1);
    assert_eq!(
        Interpreter::process_result(&universe, process),
        Oop::from_integer(50)
    );
}

#[test]
fn send_message_runs_a_method_on_a_receiver() {
    let (mut universe, mut interpreter) = setup();
    install_count_down(&mut universe);

    let result = interpreter.send_message(&mut universe, Oop::from_integer(12), "countDown", &[]);
    assert_eq!(result, Some(Oop::from_integer(12)));

    let result = interpreter.send_message(
        &mut universe,
        Oop::from_integer(12),
        "bitShift:",
        &[Oop::from_integer(2)],
    );
    assert_eq!(result, Some(Oop::from_integer(48)));

    let result = interpreter.send_message(&mut universe, Oop::from_integer(12), "frobnicate", &[]);
    assert_eq!(result, None);
}

#[test]
fn instances_are_created_by_their_class() {
    let (mut universe, mut interpreter) = setup();
    let object_class = universe.object_class();
    let point = universe.new_class("Point", object_class, 2);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.push_global("Point").send("new", 0).stack_return();
    });
    assert_eq!(universe.memory.class_of(result), point);
    assert_eq!(universe.memory.basic_size(result), 2);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_global("Array")
            .push_integer(4)
            .send("new:", 1)
            .stack_return();
    });
    assert_eq!(universe.memory.class_of(result), universe.core.array_class.get());
    assert_eq!(universe.memory.basic_size(result), 4);
}

#[test]
fn super_sends_start_above_the_method_class() {
    let (mut universe, mut interpreter) = setup();
    let object_class = universe.object_class();
    let base = universe.new_class("Base", object_class, 0);
    let derived = universe.new_class("Derived", base, 0);

    let mut name = MethodBuilder::new(&mut universe, "name");
    name.push_integer(1).stack_return();
    name.install(base);

    let mut name = MethodBuilder::new(&mut universe, "name");
    name.push_self()
        .send_super("name", 0)
        .push_integer(10)
        .send("+", 1)
        .stack_return();
    name.install(derived);

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_global("Derived")
            .send("new", 0)
            .send("name", 0)
            .stack_return();
    });
    assert_eq!(result, Oop::from_integer(11));
}

/// Installs `Base>>answer`, answering 1, and an empty `Derived` subclass.
fn install_base_and_derived(universe: &mut Universe) -> (Oop, Oop) {
    let object_class = universe.object_class();
    let base = universe.new_class("Base", object_class, 0);
    let derived = universe.new_class("Derived", base, 0);
    let mut answer = MethodBuilder::new(universe, "answer");
    answer.push_integer(1).stack_return();
    answer.install(base);
    (base, derived)
}

fn ask_derived(universe: &mut Universe, interpreter: &mut Interpreter) -> Oop {
    run_do_it(universe, interpreter, |builder| {
        builder
            .push_global("Derived")
            .send("new", 0)
            .send("answer", 0)
            .stack_return();
    })
}

#[test]
fn redefining_an_inherited_method_invalidates_subclass_lookups() {
    let (mut universe, mut interpreter) = setup();
    let (base, _) = install_base_and_derived(&mut universe);
    assert_eq!(ask_derived(&mut universe, &mut interpreter), Oop::from_integer(1));

    let mut answer = MethodBuilder::new(&mut universe, "answer");
    answer.push_integer(2).stack_return();
    let answer = answer.finish();
    interpreter.install_method(&mut universe, base, answer);

    let warm = ask_derived(&mut universe, &mut interpreter);
    let mut cold = Interpreter::new();
    let fresh = ask_derived(&mut universe, &mut cold);
    assert_eq!(warm, fresh);
    assert_eq!(warm, Oop::from_integer(2));
}

#[test]
fn recompiling_an_inherited_method_invalidates_subclass_lookups() {
    let (mut universe, mut interpreter) = setup();
    install_base_and_derived(&mut universe);
    interpreter.set_compiler(Box::new(ConstantCompiler));
    assert_eq!(ask_derived(&mut universe, &mut interpreter), Oop::from_integer(1));

    let compiled = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_global("Base")
            .push_string("answer 2")
            .push_global("Method")
            .send("new", 0)
            .primitive(39, 3)
            .stack_return();
    });
    assert_eq!(compiled, universe.true_object());
    assert_eq!(ask_derived(&mut universe, &mut interpreter), Oop::from_integer(2));
}

/// Installs `Integer>>outer:`, which sends `inner:` and adds 100 to its result, and
/// `Integer>>inner:`, which unwinds to the return point it is given.
fn install_unwinding_methods(universe: &mut Universe) {
    let integer_class = universe.integer_class();
    let mut outer = MethodBuilder::new(universe, "outer:");
    outer
        .push_argument(0)
        .push_argument(1)
        .send("inner:", 1)
        .push_integer(100)
        .send("+", 1)
        .stack_return();
    outer.install(integer_class);

    let mut inner = MethodBuilder::new(universe, "inner:");
    inner
        .push_argument(1)
        .primitive(56, 1)
        .push_integer(-1)
        .stack_return();
    inner.install(integer_class);
}

#[test]
fn unwinding_returns_nil_to_the_target_activation() {
    let (mut universe, mut interpreter) = setup();
    install_unwinding_methods(&mut universe);

    // `3` stays below the send of `outer:`, whose return point is the target
    let mut builder = MethodBuilder::new(&mut universe, "doIt");
    builder
        .push_integer(3)
        .push_integer(10)
        .push_global("unwindTarget")
        .send("outer:", 1)
        .send("isNil", 0);
    let unwound = builder.branch_if_false();
    builder.stack_return();
    builder.bind(unwound).push_integer(-5).stack_return();
    let method = builder.finish();

    let process = universe.new_process(Oop::NIL, method, &[], 50);
    let _process = universe.memory.guard(process);
    let top = universe
        .memory
        .basic_at(process, layout::process::STACK_TOP)
        .get_integer();
    universe.set_global("unwindTarget", Oop::from_integer(top + 2));

    let outcome = interpreter.run_to_completion(&mut universe, process);
    assert_eq!(outcome, ExecutionOutcome::Finished);
    assert_eq!(
        Interpreter::process_result(&universe, process),
        Oop::from_integer(3)
    );
}

#[test]
fn unwinding_past_the_root_finishes_the_process() {
    let (mut universe, mut interpreter) = setup();
    install_unwinding_methods(&mut universe);

    for target in [0, 1] {
        let mut builder = MethodBuilder::new(&mut universe, "doIt");
        builder
            .push_integer(10)
            .push_integer(target)
            .send("outer:", 1)
            .push_integer(7)
            .stack_return();
        let method = builder.finish();
        let process = universe.new_process(Oop::NIL, method, &[], 50);
        let _process = universe.memory.guard(process);

        let outcome = interpreter.run_to_completion(&mut universe, process);
        assert_eq!(outcome, ExecutionOutcome::Finished);
        assert_eq!(Interpreter::process_result(&universe, process), Oop::NIL);
    }

    let result = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder
            .push_integer(0)
            .primitive(56, 1)
            .push_integer(7)
            .stack_return();
    });
    assert_eq!(result, Oop::NIL);
}

/// Installs a watched `Integer>>answer`, answering 1.
fn install_watched_answer(universe: &mut Universe) {
    let integer_class = universe.integer_class();
    let mut answer = MethodBuilder::new(universe, "answer");
    answer.watched().push_integer(1).stack_return();
    answer.install(integer_class);
}

fn ask_three(universe: &mut Universe, interpreter: &mut Interpreter) -> Oop {
    run_do_it(universe, interpreter, |builder| {
        builder.push_integer(3).send("answer", 0).stack_return();
    })
}

#[test]
fn watched_methods_are_sent_to_watch_with() {
    let (mut universe, mut interpreter) = setup();
    install_watched_answer(&mut universe);
    let method_class = universe.core.method_class.get();
    let mut watch = MethodBuilder::new(&mut universe, WATCH_SELECTOR);
    watch.push_integer(99).stack_return();
    watch.install(method_class);

    assert_eq!(ask_three(&mut universe, &mut interpreter), Oop::from_integer(1));

    let watching = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.primitive(5, 0).stack_return();
    });
    assert_eq!(watching, universe.true_object());
    assert!(interpreter.watching);
    assert_eq!(ask_three(&mut universe, &mut interpreter), Oop::from_integer(99));

    let watching = run_do_it(&mut universe, &mut interpreter, |builder| {
        builder.primitive(5, 0).stack_return();
    });
    assert_eq!(watching, universe.false_object());
    assert_eq!(ask_three(&mut universe, &mut interpreter), Oop::from_integer(1));
}

#[test]
fn watched_methods_without_watch_with_fail() {
    let (mut universe, mut interpreter) = setup();
    install_watched_answer(&mut universe);
    interpreter.watching = true;

    let mut builder = MethodBuilder::new(&mut universe, "doIt");
    builder.push_integer(3).send("answer", 0).stack_return();
    let method = builder.finish();
    let process = universe.new_process(Oop::NIL, method, &[], 50);
    let _process = universe.memory.guard(process);

    let outcome = interpreter.run_to_completion(&mut universe, process);
    assert_eq!(outcome, ExecutionOutcome::Failed);
}

#[test]
fn watching_disables_the_inline_fast_paths() {
    let (mut universe, mut interpreter) = setup();
    let integer_class = universe.integer_class();
    let mut plus = MethodBuilder::new(&mut universe, "+");
    plus.push_integer(42).stack_return();
    let plus = plus.finish();
    interpreter.install_method(&mut universe, integer_class, plus);

    let is_nil = |universe: &mut Universe, interpreter: &mut Interpreter| {
        run_do_it(universe, interpreter, |builder| {
            builder.push_nil().send("isNil", 0).stack_return();
        })
    };
    let add = |universe: &mut Universe, interpreter: &mut Interpreter| {
        run_do_it(universe, interpreter, |builder| {
            builder
                .push_integer(3)
                .push_integer(4)
                .send("+", 1)
                .stack_return();
        })
    };

    assert_eq!(is_nil(&mut universe, &mut interpreter), universe.true_object());
    assert_eq!(add(&mut universe, &mut interpreter), Oop::from_integer(7));

    // real sends: nil does not understand isNil, Integer>>+ is the one above
    interpreter.watching = true;
    assert_eq!(is_nil(&mut universe, &mut interpreter), Oop::NIL);
    assert_eq!(add(&mut universe, &mut interpreter), Oop::from_integer(42));
}

#[test]
fn interpreters_move_to_another_universe_after_a_flush() {
    let (mut first, mut interpreter) = setup();
    install_count_down(&mut first);
    let result = interpreter.send_message(&mut first, Oop::from_integer(4), "countDown", &[]);
    assert_eq!(result, Some(Oop::from_integer(4)));

    let mut second = Universe::bootstrap(MemoryParams::default());
    let integer_class = second.integer_class();
    let mut count_down = MethodBuilder::new(&mut second, "countDown");
    count_down.push_integer(-1).stack_return();
    count_down.install(integer_class);

    interpreter.cache.flush_all();
    let result = run_do_it(&mut second, &mut interpreter, |builder| {
        builder.push_integer(4).send("countDown", 0).stack_return();
    });
    assert_eq!(result, Oop::from_integer(-1));
}
