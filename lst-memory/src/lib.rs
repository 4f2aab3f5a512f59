//!
//! This is the object memory of the Little Smalltalk virtual machine.
//!
//! Objects live in a growable table and are referred to by their index in it.
//! Freed slots are recycled through size-keyed free lists, reachability is computed by
//! a mark-sweep collector and the whole table can be written to (and read back from)
//! an image file.
//!
#![warn(missing_docs)]

mod error;
mod free_list;
mod handles;
mod image;
mod memory;
mod oop;

pub use crate::error::{sys_error, ImageError};
pub use crate::handles::HandleGuard;
pub use crate::image::{ImageInfo, PrimitiveTableId};
pub use crate::memory::{AllocationStats, MemoryParams, ObjectMemory, UNIT_BYTES};
pub use crate::oop::Oop;
