//!
//! Slot layouts of the objects the virtual machine looks into.
//!
//! Slot numbers are 1-based, as taken by `basic_at`.
//!

/// Classes.
pub mod class {
    pub const SIZE: usize = 5;
    pub const NAME: usize = 1;
    /// Number of instance variables of the instances, as a small integer.
    pub const INSTANCE_SIZE: usize = 2;
    pub const METHODS: usize = 3;
    pub const SUPERCLASS: usize = 4;
    /// Array of the instance variable names.
    pub const VARIABLES: usize = 5;
}

/// Compiled methods.
pub mod method {
    pub const SIZE: usize = 9;
    pub const TEXT: usize = 1;
    /// The selector.
    pub const MESSAGE: usize = 2;
    pub const BYTECODES: usize = 3;
    pub const LITERALS: usize = 4;
    pub const STACK_SIZE: usize = 5;
    pub const TEMPORARY_SIZE: usize = 6;
    pub const METHOD_CLASS: usize = 7;
    /// Non-nil when sends of this method are redirected to `watchWith:` in watch mode.
    pub const WATCH: usize = 8;
    pub const PROTOCOL: usize = 9;
}

/// Reified activations.
pub mod context {
    pub const SIZE: usize = 8;
    pub const LINK_POINTER: usize = 1;
    pub const METHOD: usize = 2;
    pub const ARGUMENTS: usize = 3;
    pub const TEMPORARIES: usize = 4;
}

/// Block closures.
pub mod block {
    pub const SIZE: usize = 6;
    pub const CONTEXT: usize = 1;
    pub const ARGUMENT_COUNT: usize = 2;
    /// 1-based temporary slot receiving the first argument.
    pub const ARGUMENT_LOCATION: usize = 3;
    pub const BYTE_POSITION: usize = 4;
}

/// Processes.
pub mod process {
    pub const SIZE: usize = 3;
    pub const STACK: usize = 1;
    pub const STACK_TOP: usize = 2;
    pub const LINK_POINTER: usize = 3;
}

/// Hashed name tables.
pub mod dictionary {
    pub const SIZE: usize = 1;
    pub const TABLE: usize = 1;
}

/// Overflow chains of name tables.
pub mod link {
    pub const SIZE: usize = 3;
    pub const KEY: usize = 1;
    pub const VALUE: usize = 2;
    pub const NEXT: usize = 3;
}

/// Characters.
pub mod char {
    pub const SIZE: usize = 1;
    pub const VALUE: usize = 1;
}

/// The linkage area pushed on the process stack for every activation.
///
/// Offsets are relative to the link pointer, which designates the first slot.
pub mod linkage {
    pub const PREVIOUS_LINK: usize = 0;
    /// The reified context of the activation, `nil` while the frame only lives on the stack.
    pub const CONTEXT: usize = 1;
    pub const RETURN_POINT: usize = 2;
    pub const METHOD: usize = 3;
    pub const BYTE_OFFSET: usize = 4;
    /// Offset of the first temporary, a padding slot sitting in between.
    pub const TEMPORARIES: usize = 6;
    /// Stack slots needed by a linkage area, on top of temporaries and the method's stack.
    pub const OVERHEAD: usize = 7;
}
