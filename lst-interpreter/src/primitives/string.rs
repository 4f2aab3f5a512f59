use lst_memory::{sys_error, Oop};

use crate::interpreter::Interpreter;
use crate::names::str_hash;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (24, self::concatenate),
    (27, self::set_global),
    (33, self::copy_from_to),
    (81, self::length),
    (82, self::hashcode),
    (83, self::as_symbol),
    (87, self::global_value),
    (89, self::fatal_error),
];

fn concatenate(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "String>>#,";

    expect_args!(SIGNATURE, args, [a, b]);

    let mut text = universe.memory.string_value(a);
    text.push_str(&universe.memory.string_value(b));
    universe.new_string(&text)
}

fn set_global(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Symbol>>#assign:";

    expect_args!(SIGNATURE, args, [symbol, value]);

    let hash = str_hash(&universe.memory.string_value(symbol));
    let symbols = universe.memory.symbols();
    universe.name_table_insert(symbols, hash, symbol, value);
    symbol
}

fn copy_from_to(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "String>>#copyFrom:to:";

    expect_args!(SIGNATURE, args, [string, from, to]);

    let bytes = universe.memory.bytes(string);
    let length = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let from = from.get_integer().max(1);
    let to = to.get_integer().min(length as i64);
    let copy = if from <= to {
        bytes[(from - 1) as usize..to as usize].to_vec()
    } else {
        Vec::new()
    };
    universe.new_string(&String::from_utf8_lossy(&copy))
}

fn length(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "String>>#size";

    expect_args!(SIGNATURE, args, [string]);

    let bytes = universe.memory.bytes(string);
    let length = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Oop::from_integer(length as i64)
}

fn hashcode(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "String>>#hash";

    expect_args!(SIGNATURE, args, [string]);

    Oop::from_integer(str_hash(&universe.memory.string_value(string)))
}

fn as_symbol(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "String>>#asSymbol";

    expect_args!(SIGNATURE, args, [string]);

    let name = universe.memory.string_value(string);
    universe.create_symbol(&name)
}

fn global_value(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "Symbol>>#value";

    expect_args!(SIGNATURE, args, [name]);

    let name = universe.memory.string_value(name);
    universe.global_symbol(&name)
}

fn fatal_error(_: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop {
    const SIGNATURE: &str = "String>>#error";

    expect_args!(SIGNATURE, args, [message]);

    sys_error("fatal error", &universe.memory.string_value(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lst_memory::MemoryParams;

    #[test]
    fn copies_inclusive_ranges() {
        let mut universe = Universe::bootstrap(MemoryParams::default());
        let mut interpreter = Interpreter::new();
        let string = universe.new_string("hello world");
        let _string = universe.memory.guard(string);

        let mut copy = |from: i64, to: i64| {
            let args = [string, Oop::from_integer(from), Oop::from_integer(to)];
            let copy = interpreter.primitive(&mut universe, 33, &args);
            universe.memory.string_value(copy)
        };
        assert_eq!(copy(1, 5), "hello");
        assert_eq!(copy(7, 100), "world");
        assert_eq!(copy(0, 2), "he");
        assert_eq!(copy(6, 5), "");
        assert_eq!(copy(20, 30), "");
    }

    #[test]
    fn symbols_are_interned() {
        let mut universe = Universe::bootstrap(MemoryParams::default());
        let mut interpreter = Interpreter::new();
        let string = universe.new_string("fooBar");
        let first = interpreter.primitive(&mut universe, 83, &[string]);
        let string = universe.new_string("fooBar");
        let second = interpreter.primitive(&mut universe, 83, &[string]);
        assert_eq!(first, second);
        assert_eq!(universe.memory.class_of(first), universe.symbol_class());

        interpreter.primitive(&mut universe, 27, &[first, Oop::from_integer(5)]);
        assert_eq!(universe.global_symbol("fooBar"), Oop::from_integer(5));
        let name = universe.new_string("fooBar");
        let value = interpreter.primitive(&mut universe, 87, &[name]);
        assert_eq!(value, Oop::from_integer(5));
    }
}
