/// Macro for destructuring the arguments passed to primitives.
///
/// Missing arguments are fatal, extra ones are ignored.
macro_rules! expect_args {
    ($signature:expr, $args:expr, [ $( $name:ident ),* $(,)? ]) => {
        #[allow(unused_mut, unused_variables)]
        let mut args = $args.iter().copied();
        $(
            let $name = match args.next() {
                Some(value) => value,
                None => lst_memory::sys_error("missing primitive argument", $signature),
            };
        )*
    };
}

mod blocks;

/// Primitives for the **CPointer** class.
pub mod cpointer;
/// Primitives for the **Float** class.
pub mod double;
/// Primitives for exception handling.
pub mod exception;
/// Primitives for the **Integer** class.
pub mod integer;
/// Primitives for the **Method** class.
pub mod method;
/// Primitives for the **Object** class.
pub mod object;
/// Primitives for the **String** and **Symbol** classes.
pub mod string;
/// Primitives for the system as a whole.
pub mod system;

use indexmap::IndexMap;

use lst_memory::{Oop, PrimitiveTableId};

use crate::interpreter::Interpreter;
use crate::universe::Universe;

/// A interpreter primitive (just a bare function pointer).
///
/// Primitives receive their arguments in order and answer their result, `nil` telling
/// the calling method that the primitive failed.
pub type PrimitiveFn = fn(interpreter: &mut Interpreter, universe: &mut Universe, args: &[Oop]) -> Oop;

/// The identifier of the primitive table every interpreter comes with.
pub const CORE_TABLE_ID: PrimitiveTableId =
    PrimitiveTableId::from_u128(0x6c73_7400_636f_7265_0000_0000_0000_0001);

/// Compiles method source text on behalf of the compile primitive.
pub trait MethodCompiler {
    /// Compiles `text` as a method of `class`, filling in `method`.
    ///
    /// Answers whether the compilation succeeded.
    fn compile(&mut self, universe: &mut Universe, class: Oop, text: &str, method: Oop) -> bool;
}

/// A named set of primitives, identified in images by a UUID.
#[derive(Clone)]
pub struct PrimitiveTable {
    /// The table identifier, recorded in the images it is used with.
    pub id: PrimitiveTableId,
    /// A human-readable name.
    pub name: String,
    /// The primitives, by number.
    pub primitives: IndexMap<usize, PrimitiveFn>,
}

impl PrimitiveTable {
    /// Creates an empty table.
    pub fn new(id: PrimitiveTableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            primitives: IndexMap::new(),
        }
    }

    /// Adds a family of primitives to the table.
    pub fn with(mut self, family: &[(usize, PrimitiveFn)]) -> Self {
        self.primitives.extend(family.iter().copied());
        self
    }

    /// The table of the primitives built into the interpreter.
    pub fn core() -> Self {
        Self::new(CORE_TABLE_ID, "core")
            .with(system::PRIMITIVES)
            .with(object::PRIMITIVES)
            .with(blocks::PRIMITIVES)
            .with(method::PRIMITIVES)
            .with(integer::PRIMITIVES)
            .with(string::PRIMITIVES)
            .with(double::PRIMITIVES)
            .with(cpointer::PRIMITIVES)
            .with(exception::PRIMITIVES)
    }
}

impl std::fmt::Debug for PrimitiveTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PrimitiveTable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("primitives", &self.primitives.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The primitive tables known to an interpreter.
///
/// Tables registered later take precedence for the numbers they define.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRegistry {
    tables: Vec<PrimitiveTable>,
}

impl PrimitiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any table with the same identifier.
    pub fn register(&mut self, table: PrimitiveTable) {
        self.tables.retain(|it| it.id != table.id);
        self.tables.push(table);
    }

    /// The primitive with the given number.
    pub fn get(&self, number: usize) -> Option<PrimitiveFn> {
        self.tables
            .iter()
            .rev()
            .find_map(|table| table.primitives.get(&number).copied())
    }

    /// The identifiers of the registered tables.
    pub fn table_ids(&self) -> Vec<PrimitiveTableId> {
        self.tables.iter().map(|table| table.id).collect()
    }

    /// The identifiers in `expected` that no registered table has.
    pub fn missing_tables(&self, expected: &[PrimitiveTableId]) -> Vec<PrimitiveTableId> {
        expected
            .iter()
            .copied()
            .filter(|id| self.tables.iter().all(|table| table.id != *id))
            .collect()
    }
}

/// Reads a non-negative integer argument.
pub(crate) fn index_arg(signature: &str, value: Oop) -> usize {
    match value.as_small_integer().map(usize::try_from) {
        Some(Ok(index)) => index,
        _ => lst_memory::sys_error("expected a non-negative integer", signature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lst_memory::MemoryParams;

    fn answer_forty_two(_: &mut Interpreter, _: &mut Universe, _: &[Oop]) -> Oop {
        Oop::from_integer(42)
    }

    #[test]
    fn later_tables_override_earlier_ones() {
        let mut universe = Universe::bootstrap(MemoryParams::default());
        let mut interpreter = Interpreter::new();
        let args = [Oop::from_integer(3), Oop::from_integer(4)];
        assert!(interpreter.primitives.get(88).is_none());
        assert_eq!(
            interpreter.primitive(&mut universe, 60, &args),
            Oop::from_integer(7)
        );

        let extension = PrimitiveTableId::from_u128(42);
        interpreter
            .primitives
            .register(PrimitiveTable::new(extension, "ext").with(&[(60, answer_forty_two)]));
        assert_eq!(
            interpreter.primitive(&mut universe, 60, &args),
            Oop::from_integer(42)
        );
        assert_eq!(interpreter.primitive_table_ids(), vec![CORE_TABLE_ID, extension]);
    }

    #[test]
    fn reports_missing_tables() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(PrimitiveTable::core());
        let unknown = PrimitiveTableId::from_u128(7);
        assert_eq!(
            registry.missing_tables(&[CORE_TABLE_ID, unknown]),
            vec![unknown]
        );
    }
}
