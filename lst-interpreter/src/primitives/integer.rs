use rand::rngs::StdRng;
use rand::SeedableRng;

use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (51, self::as_float),
    (52, self::debug_print),
    (53, self::set_time_slice),
    (55, self::seed_random),
    (60, self::plus),
    (61, self::minus),
    (62, self::lt),
    (63, self::gt),
    (64, self::le),
    (65, self::ge),
    (66, self::eq),
    (67, self::ne),
    (68, self::times),
    (69, self::quotient),
    (70, self::remainder),
    (71, self::bitand),
    (72, self::bitxor),
    (73, self::eq),
    (79, self::shift),
];

/// Unpacks two small integer arguments, or returns `nil` from the primitive.
macro_rules! integers {
    ($signature:expr, $args:expr) => {{
        expect_args!($signature, $args, [a, b]);
        match (a.as_small_integer(), b.as_small_integer()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Oop::NIL,
        }
    }};
}

/// Boxes an arithmetic result, answering `nil` when it does not fit a small integer.
fn demote(value: Option<i64>) -> Oop {
    value.and_then(Oop::try_from_integer).unwrap_or(Oop::NIL)
}

fn as_float(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#asFloat";

    expect_args!(SIGNATURE, args, [value]);

    universe.new_float(value.get_integer() as f64)
}

fn debug_print(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#debugPrint";

    expect_args!(SIGNATURE, args, [value]);

    eprintln!("debugging print {}", value.get_integer());
    Oop::NIL
}

fn set_time_slice(_: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
    // handled by the interpreter loop
    Oop::NIL
}

fn seed_random(interpreter: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#seedRandom";

    expect_args!(SIGNATURE, args, [seed]);

    interpreter.rng = StdRng::seed_from_u64(seed.get_integer() as u64);
    Oop::NIL
}

fn plus(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#+";

    let (a, b) = integers!(SIGNATURE, args);
    demote(a.checked_add(b))
}

fn minus(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#-";

    let (a, b) = integers!(SIGNATURE, args);
    demote(a.checked_sub(b))
}

fn times(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#*";

    let (a, b) = integers!(SIGNATURE, args);
    demote(a.checked_mul(b))
}

fn quotient(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#quo:";

    let (a, b) = integers!(SIGNATURE, args);
    demote(a.checked_div(b))
}

fn remainder(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#rem:";

    let (a, b) = integers!(SIGNATURE, args);
    demote(a.checked_rem(b))
}

fn bitand(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#bitAnd:";

    let (a, b) = integers!(SIGNATURE, args);
    Oop::from_integer(a & b)
}

fn bitxor(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#bitXor:";

    let (a, b) = integers!(SIGNATURE, args);
    Oop::from_integer(a ^ b)
}

fn shift(_: &mut Interpreter, _: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Integer>>#bitShift:";

    let (a, b) = integers!(SIGNATURE, args);
    if b < 0 {
        let amount = b.unsigned_abs().min(63) as u32;
        return Oop::from_integer(a >> amount);
    }
    if a == 0 {
        return Oop::from_integer(0);
    }
    if b >= 63 {
        return Oop::NIL;
    }
    let shifted = a << b;
    if shifted >> b != a {
        return Oop::NIL;
    }
    demote(Some(shifted))
}

macro_rules! relational {
    ($name:ident, $signature:expr, $op:tt) => {
        fn $name(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
            let (a, b) = integers!($signature, args);
            universe.boolean(a $op b)
        }
    };
}

relational!(lt, "Integer>>#<", <);
relational!(gt, "Integer>>#>", >);
relational!(le, "Integer>>#<=", <=);
relational!(ge, "Integer>>#>=", >=);
relational!(eq, "Integer>>#=", ==);
relational!(ne, "Integer>>#~=", !=);
