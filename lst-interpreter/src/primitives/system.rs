use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use lst_memory::Oop;

use crate::interpreter::Interpreter;
use crate::primitives::PrimitiveFn;
use crate::universe::Universe;

pub static PRIMITIVES: &[(usize, PrimitiveFn)] = &[
    (1, self::ping),
    (2, self::memory_stats),
    (3, self::random),
    (4, self::time),
    (5, self::flip_watch),
    (6, self::null_pointer),
    (7, self::time_of_day),
    (9, self::exit),
];

fn seconds_since_epoch() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(_) => 0,
    }
}

fn ping(_: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
    eprintln!("did primitive 1");
    Oop::NIL
}

fn memory_stats(_: &mut Interpreter, universe: &mut Universe, _: &[Oop]) -> Oop {
    eprint!("{}", universe.memory.stats_string());
    Oop::NIL
}

fn random(interpreter: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
    let value = interpreter.rng.gen::<u32>() >> 9;
    Oop::from_integer(i64::from(value))
}

fn time(_: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
    Oop::from_integer(seconds_since_epoch())
}

fn flip_watch(interpreter: &mut Interpreter, universe: &mut Universe, _: &[Oop]) -> Oop {
    interpreter.watching = !interpreter.watching;
    universe.boolean(interpreter.watching)
}

fn null_pointer(_: &mut Interpreter, universe: &mut Universe, _: &[Oop]) -> Oop {
    universe.new_cpointer(0)
}

fn time_of_day(_: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
    Oop::from_integer(seconds_since_epoch() % 86400)
}

fn exit(_: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
    log::info!("exit requested by the image");
    std::process::exit(0)
}
