//!
//! This crate contains the bytecode definitions shared by the Little Smalltalk tools:
//! the instruction set, its byte encoding and the selectors that have dedicated opcodes.
//!

/// The Little Smalltalk bytecode definitions.
pub mod bytecode;
