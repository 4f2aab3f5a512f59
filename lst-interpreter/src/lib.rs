//!
//! This is the bytecode interpreter for Little Smalltalk.
//!

mod constructors;

/// Facilities for caching method lookups.
pub mod cache;
/// Facilities for disassembling bytecode.
pub mod disassembler;
/// The interpreter's main data structure.
pub mod interpreter;
/// The methods every heap needs for blocks, instance creation and error recovery.
pub mod kernel;
/// The slot layouts of the objects the virtual machine knows about.
pub mod layout;
/// Facilities for manipulating methods.
pub mod method;
/// Facilities for manipulating name tables and symbols.
pub mod names;
/// Definitions for all supported primitives.
pub mod primitives;
/// The collection of all known objects during execution.
pub mod universe;
