use num_traits::Float;

use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (101, self::as_string),
    (102, self::ln),
    (103, self::exp),
    (106, self::as_integer_parts),
    (110, self::plus),
    (111, self::minus),
    (112, self::lt),
    (113, self::gt),
    (114, self::le),
    (115, self::ge),
    (116, self::eq),
    (117, self::ne),
    (118, self::times),
    (119, self::divide),
];

/// The number of bits kept in the integer of [`integer_part`].
const INTEGER_PART_BITS: i32 = 12;

/// Reads a float argument, or returns `nil` from the primitive.
macro_rules! float_arg {
    ($universe:expr, $value:expr) => {{
        let value = $value;
        let float_class = $universe.core.float_class.get();
        if value.is_small_integer() || $universe.memory.class_of(value) != float_class {
            return Oop::NIL;
        }
        $universe.memory.float_value(value)
    }};
}

/// Formats a float the way C's `%g` does: six significant digits, no trailing zeros,
/// scientific notation for very large or very small magnitudes.
pub fn format_g(value: f64) -> String {
    const PRECISION: i32 = 6;

    if value.is_nan() {
        return String::from("nan");
    }
    if value.is_infinite() {
        return String::from(if value < 0.0 { "-inf" } else { "inf" });
    }
    if value == 0.0 {
        return String::from(if value.is_sign_negative() { "-0" } else { "0" });
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exponent.abs())
    } else {
        let fixed = format!("{:.*}", (PRECISION - 1 - exponent) as usize, value);
        trim_zeros(&fixed).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Splits `value` into `(n, m)` such that `value` is about `n * 2^m`, `n` keeping
/// at most [`INTEGER_PART_BITS`] significant bits.
pub fn integer_part(value: f64) -> (i64, i64) {
    let (mantissa, exponent, sign) = value.integer_decode();
    if mantissa == 0 {
        return (0, 0);
    }
    // `value` is `fraction * 2^binary_exponent`, with `fraction` in [0.5, 1)
    let bits = 64 - mantissa.leading_zeros() as i32;
    let binary_exponent = i32::from(exponent) + bits;
    let fraction = f64::from(sign) * (mantissa as f64) * 2f64.powi(-bits);

    if (0..=INTEGER_PART_BITS).contains(&binary_exponent) {
        (value as i64, 0)
    } else {
        let scaled = fraction * 2f64.powi(INTEGER_PART_BITS);
        (
            scaled as i64,
            i64::from(binary_exponent - INTEGER_PART_BITS),
        )
    }
}

fn as_string(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Float>>#printString";

    expect_args!(SIGNATURE, args, [value]);

    let value = float_arg!(universe, value);
    universe.new_string(&format_g(value))
}

fn ln(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Float>>#ln";

    expect_args!(SIGNATURE, args, [value]);

    let value = float_arg!(universe, value);
    universe.new_float(value.ln())
}

fn exp(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Float>>#exp";

    expect_args!(SIGNATURE, args, [value]);

    let value = float_arg!(universe, value);
    universe.new_float(value.exp())
}

fn as_integer_parts(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Float>>#integerPart";

    expect_args!(SIGNATURE, args, [value]);

    let (n, m) = integer_part(float_arg!(universe, value));
    let pair = universe.new_array(2);
    universe.memory.basic_at_put(pair, 1, Oop::from_integer(n));
    universe.memory.basic_at_put(pair, 2, Oop::from_integer(m));
    pair
}

macro_rules! arithmetic {
    ($name:ident, $signature:expr, $op:tt) => {
        fn $name(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
            expect_args!($signature, args, [a, b]);
            let a = float_arg!(universe, a);
            let b = float_arg!(universe, b);
            universe.new_float(a $op b)
        }
    };
}

macro_rules! relational {
    ($name:ident, $signature:expr, $op:tt) => {
        fn $name(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
            expect_args!($signature, args, [a, b]);
            let a = float_arg!(universe, a);
            let b = float_arg!(universe, b);
            universe.boolean(a $op b)
        }
    };
}

arithmetic!(plus, "Float>>#+", +);
arithmetic!(minus, "Float>>#-", -);
arithmetic!(times, "Float>>#*", *);
arithmetic!(divide, "Float>>#/", /);

relational!(lt, "Float>>#<", <);
relational!(gt, "Float>>#>", >);
relational!(le, "Float>>#<=", <=);
relational!(ge, "Float>>#>=", >=);
relational!(eq, "Float>>#=", ==);
relational!(ne, "Float>>#~=", !=);
