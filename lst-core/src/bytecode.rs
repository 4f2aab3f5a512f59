use std::fmt;

/// The high nibble of an instruction byte.
///
/// An instruction byte is split in two nibbles: the high one selects the opcode and
/// the low one carries its operand.
/// When the high nibble is `Extended`, the low nibble holds the real opcode and the
/// operand is found in the following byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Extended = 0,
    PushInstance = 1,
    PushArgument = 2,
    PushTemporary = 3,
    PushLiteral = 4,
    PushConstant = 5,
    AssignInstance = 6,
    AssignTemporary = 7,
    MarkArguments = 8,
    SendMessage = 9,
    SendUnary = 10,
    SendBinary = 11,
    DoPrimitive = 13,
    DoSpecial = 15,
}

impl Opcode {
    /// Decodes an opcode from its nibble value.
    pub fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Extended),
            1 => Some(Self::PushInstance),
            2 => Some(Self::PushArgument),
            3 => Some(Self::PushTemporary),
            4 => Some(Self::PushLiteral),
            5 => Some(Self::PushConstant),
            6 => Some(Self::AssignInstance),
            7 => Some(Self::AssignTemporary),
            8 => Some(Self::MarkArguments),
            9 => Some(Self::SendMessage),
            10 => Some(Self::SendUnary),
            11 => Some(Self::SendBinary),
            13 => Some(Self::DoPrimitive),
            15 => Some(Self::DoSpecial),
            _ => None,
        }
    }
}

/// The operand of a `PushConstant` instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Zero = 0,
    One = 1,
    Two = 2,
    MinusOne = 3,
    /// The context of the running method, materialized on first use.
    Context = 4,
    Nil = 5,
    True = 6,
    False = 7,
}

impl Constant {
    /// Decodes a constant from its operand value.
    pub fn from_operand(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Zero),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::MinusOne),
            4 => Some(Self::Context),
            5 => Some(Self::Nil),
            6 => Some(Self::True),
            7 => Some(Self::False),
            _ => None,
        }
    }

    /// The small integer this constant stands for, if any.
    pub fn integer_value(self) -> Option<i64> {
        match self {
            Self::Zero => Some(0),
            Self::One => Some(1),
            Self::Two => Some(2),
            Self::MinusOne => Some(-1),
            _ => None,
        }
    }
}

/// The operand of a `DoSpecial` instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Special {
    SelfReturn = 1,
    StackReturn = 2,
    Duplicate = 4,
    PopTop = 5,
    Branch = 6,
    BranchIfTrue = 7,
    BranchIfFalse = 8,
    AndBranch = 9,
    OrBranch = 10,
    SendToSuper = 11,
}

impl Special {
    /// Decodes a special from its operand value.
    pub fn from_operand(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::SelfReturn),
            2 => Some(Self::StackReturn),
            4 => Some(Self::Duplicate),
            5 => Some(Self::PopTop),
            6 => Some(Self::Branch),
            7 => Some(Self::BranchIfTrue),
            8 => Some(Self::BranchIfFalse),
            9 => Some(Self::AndBranch),
            10 => Some(Self::OrBranch),
            11 => Some(Self::SendToSuper),
            _ => None,
        }
    }

    /// Whether this special reads an extra operand byte.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Self::Branch
                | Self::BranchIfTrue
                | Self::BranchIfFalse
                | Self::AndBranch
                | Self::OrBranch
                | Self::SendToSuper
        )
    }
}

/// The selectors that `SendUnary` addresses by index.
pub static UNARY_SELECTORS: [&str; 9] = [
    "isNil",
    "notNil",
    "value",
    "new",
    "class",
    "size",
    "basicSize",
    "print",
    "printString",
];

/// The selectors that `SendBinary` addresses by index.
pub static BINARY_SELECTORS: [&str; 28] = [
    "+",
    "-",
    "<",
    ">",
    "<=",
    ">=",
    "=",
    "~=",
    "*",
    "quo:",
    "rem:",
    "bitAnd:",
    "bitXor:",
    "==",
    ",",
    "at:",
    "basicAt:",
    "do:",
    "coerce:",
    "error:",
    "includesKey:",
    "isMemberOf:",
    "new:",
    "to:",
    "value:",
    "whileTrue:",
    "addFirst:",
    "addLast:",
];

/// `SendUnary` operands up to this one (`isNil`, `notNil`) are answered inline for `nil`.
pub const NIL_TEST_LIMIT: u8 = 1;

/// `SendBinary` operands up to this one map onto integer primitive `60 + operand`.
pub const INTEGER_FAST_PATH_LIMIT: u8 = 12;

/// A fully decoded instruction, operands included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bytecode {
    PushInstance(u8),
    PushArgument(u8),
    PushTemporary(u8),
    PushLiteral(u8),
    PushConstant(Constant),
    AssignInstance(u8),
    AssignTemporary(u8),
    MarkArguments(u8),
    SendMessage(u8),
    SendUnary(u8),
    SendBinary(u8),
    /// Argument count, then primitive number.
    DoPrimitive(u8, u8),
    SelfReturn,
    StackReturn,
    Duplicate,
    PopTop,
    Branch(u8),
    BranchIfTrue(u8),
    BranchIfFalse(u8),
    AndBranch(u8),
    OrBranch(u8),
    SendToSuper(u8),
}

/// An error that occured while decoding an instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid bytecode {opcode} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("unimplemented constant {constant} at offset {offset}")]
    InvalidConstant { constant: u8, offset: usize },
    #[error("invalid doSpecial {special} at offset {offset}")]
    InvalidSpecial { special: u8, offset: usize },
    #[error("instruction at offset {offset} runs past the end of the method")]
    Truncated { offset: usize },
}

impl Bytecode {
    /// Decodes the instruction starting at the 1-based byte `offset` of `code`.
    ///
    /// Returns the instruction and the 1-based offset of the instruction following it.
    pub fn decode(code: &[u8], offset: usize) -> Result<(Self, usize), DecodeError> {
        let start = offset;
        let mut offset = offset;
        let mut next_byte = || {
            let byte = offset
                .checked_sub(1)
                .and_then(|idx| code.get(idx))
                .copied()
                .ok_or(DecodeError::Truncated { offset: start })?;
            offset += 1;
            Ok(byte)
        };

        let byte = next_byte()?;
        let (mut high, mut low) = (byte >> 4, byte & 0x0F);
        if high == Opcode::Extended as u8 {
            high = low;
            low = next_byte()?;
        }

        let opcode = match Opcode::from_nibble(high) {
            Some(Opcode::Extended) | None => {
                return Err(DecodeError::InvalidOpcode {
                    opcode: high,
                    offset: start,
                })
            }
            Some(opcode) => opcode,
        };

        let bytecode = match opcode {
            Opcode::Extended => unreachable!(),
            Opcode::PushInstance => Self::PushInstance(low),
            Opcode::PushArgument => Self::PushArgument(low),
            Opcode::PushTemporary => Self::PushTemporary(low),
            Opcode::PushLiteral => Self::PushLiteral(low),
            Opcode::PushConstant => match Constant::from_operand(low) {
                Some(constant) => Self::PushConstant(constant),
                None => {
                    return Err(DecodeError::InvalidConstant {
                        constant: low,
                        offset: start,
                    })
                }
            },
            Opcode::AssignInstance => Self::AssignInstance(low),
            Opcode::AssignTemporary => Self::AssignTemporary(low),
            Opcode::MarkArguments => Self::MarkArguments(low),
            Opcode::SendMessage => Self::SendMessage(low),
            Opcode::SendUnary => Self::SendUnary(low),
            Opcode::SendBinary => Self::SendBinary(low),
            Opcode::DoPrimitive => Self::DoPrimitive(low, next_byte()?),
            Opcode::DoSpecial => {
                let special = Special::from_operand(low).ok_or(DecodeError::InvalidSpecial {
                    special: low,
                    offset: start,
                })?;
                match special {
                    Special::SelfReturn => Self::SelfReturn,
                    Special::StackReturn => Self::StackReturn,
                    Special::Duplicate => Self::Duplicate,
                    Special::PopTop => Self::PopTop,
                    Special::Branch => Self::Branch(next_byte()?),
                    Special::BranchIfTrue => Self::BranchIfTrue(next_byte()?),
                    Special::BranchIfFalse => Self::BranchIfFalse(next_byte()?),
                    Special::AndBranch => Self::AndBranch(next_byte()?),
                    Special::OrBranch => Self::OrBranch(next_byte()?),
                    Special::SendToSuper => Self::SendToSuper(next_byte()?),
                }
            }
        };

        Ok((bytecode, offset))
    }

    /// Appends the byte encoding of this instruction to `code`.
    pub fn encode(self, code: &mut Vec<u8>) {
        let mut pair = |high: Opcode, low: u8| {
            if low >= 16 {
                code.push(Opcode::Extended as u8 * 16 + high as u8);
                code.push(low);
            } else {
                code.push(high as u8 * 16 + low);
            }
        };

        match self {
            Self::PushInstance(idx) => pair(Opcode::PushInstance, idx),
            Self::PushArgument(idx) => pair(Opcode::PushArgument, idx),
            Self::PushTemporary(idx) => pair(Opcode::PushTemporary, idx),
            Self::PushLiteral(idx) => pair(Opcode::PushLiteral, idx),
            Self::PushConstant(constant) => pair(Opcode::PushConstant, constant as u8),
            Self::AssignInstance(idx) => pair(Opcode::AssignInstance, idx),
            Self::AssignTemporary(idx) => pair(Opcode::AssignTemporary, idx),
            Self::MarkArguments(count) => pair(Opcode::MarkArguments, count),
            Self::SendMessage(idx) => pair(Opcode::SendMessage, idx),
            Self::SendUnary(idx) => pair(Opcode::SendUnary, idx),
            Self::SendBinary(idx) => pair(Opcode::SendBinary, idx),
            Self::DoPrimitive(count, number) => {
                pair(Opcode::DoPrimitive, count);
                code.push(number);
            }
            Self::SelfReturn => pair(Opcode::DoSpecial, Special::SelfReturn as u8),
            Self::StackReturn => pair(Opcode::DoSpecial, Special::StackReturn as u8),
            Self::Duplicate => pair(Opcode::DoSpecial, Special::Duplicate as u8),
            Self::PopTop => pair(Opcode::DoSpecial, Special::PopTop as u8),
            Self::Branch(target) => {
                pair(Opcode::DoSpecial, Special::Branch as u8);
                code.push(target);
            }
            Self::BranchIfTrue(target) => {
                pair(Opcode::DoSpecial, Special::BranchIfTrue as u8);
                code.push(target);
            }
            Self::BranchIfFalse(target) => {
                pair(Opcode::DoSpecial, Special::BranchIfFalse as u8);
                code.push(target);
            }
            Self::AndBranch(target) => {
                pair(Opcode::DoSpecial, Special::AndBranch as u8);
                code.push(target);
            }
            Self::OrBranch(target) => {
                pair(Opcode::DoSpecial, Special::OrBranch as u8);
                code.push(target);
            }
            Self::SendToSuper(idx) => {
                pair(Opcode::DoSpecial, Special::SendToSuper as u8);
                code.push(idx);
            }
        }
    }

    /// Get the instruction's name.
    #[rustfmt::skip]
    pub fn name(self) -> &'static str {
        match self {
            Self::PushInstance(_)    => "PUSH_INSTANCE",
            Self::PushArgument(_)    => "PUSH_ARGUMENT",
            Self::PushTemporary(_)   => "PUSH_TEMPORARY",
            Self::PushLiteral(_)     => "PUSH_LITERAL",
            Self::PushConstant(_)    => "PUSH_CONSTANT",
            Self::AssignInstance(_)  => "ASSIGN_INSTANCE",
            Self::AssignTemporary(_) => "ASSIGN_TEMPORARY",
            Self::MarkArguments(_)   => "MARK_ARGUMENTS",
            Self::SendMessage(_)     => "SEND_MESSAGE",
            Self::SendUnary(_)       => "SEND_UNARY",
            Self::SendBinary(_)      => "SEND_BINARY",
            Self::DoPrimitive(_, _)  => "DO_PRIMITIVE",
            Self::SelfReturn         => "SELF_RETURN",
            Self::StackReturn        => "STACK_RETURN",
            Self::Duplicate          => "DUPLICATE",
            Self::PopTop             => "POP_TOP",
            Self::Branch(_)          => "BRANCH",
            Self::BranchIfTrue(_)    => "BRANCH_IF_TRUE",
            Self::BranchIfFalse(_)   => "BRANCH_IF_FALSE",
            Self::AndBranch(_)       => "AND_BRANCH",
            Self::OrBranch(_)        => "OR_BRANCH",
            Self::SendToSuper(_)     => "SEND_TO_SUPER",
        }
    }

    /// Get the instruction's name padded so that every padded names are of the same length.
    pub fn padded_name(self) -> String {
        format!("{:<16}", self.name())
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "0"),
            Self::One => write!(f, "1"),
            Self::Two => write!(f, "2"),
            Self::MinusOne => write!(f, "-1"),
            Self::Context => write!(f, "context"),
            Self::Nil => write!(f, "nil"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
        }
    }
}

impl fmt::Display for Bytecode {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PushInstance(idx)          => write!(f, "PUSH_INSTANCE {}", idx),
            Self::PushArgument(idx)          => write!(f, "PUSH_ARGUMENT {}", idx),
            Self::PushTemporary(idx)         => write!(f, "PUSH_TEMPORARY {}", idx),
            Self::PushLiteral(idx)           => write!(f, "PUSH_LITERAL {}", idx),
            Self::PushConstant(constant)     => write!(f, "PUSH_CONSTANT {}", constant),
            Self::AssignInstance(idx)        => write!(f, "ASSIGN_INSTANCE {}", idx),
            Self::AssignTemporary(idx)       => write!(f, "ASSIGN_TEMPORARY {}", idx),
            Self::MarkArguments(count)       => write!(f, "MARK_ARGUMENTS {}", count),
            Self::SendMessage(idx)           => write!(f, "SEND_MESSAGE {}", idx),
            Self::SendUnary(idx)             => write!(f, "SEND_UNARY {}", UNARY_SELECTORS.get(*idx as usize).unwrap_or(&"?")),
            Self::SendBinary(idx)            => write!(f, "SEND_BINARY {}", BINARY_SELECTORS.get(*idx as usize).unwrap_or(&"?")),
            Self::DoPrimitive(count, number) => write!(f, "DO_PRIMITIVE {} ({} args)", number, count),
            Self::SelfReturn                 => write!(f, "SELF_RETURN"),
            Self::StackReturn                => write!(f, "STACK_RETURN"),
            Self::Duplicate                  => write!(f, "DUPLICATE"),
            Self::PopTop                     => write!(f, "POP_TOP"),
            Self::Branch(target)             => write!(f, "BRANCH {}", target),
            Self::BranchIfTrue(target)       => write!(f, "BRANCH_IF_TRUE {}", target),
            Self::BranchIfFalse(target)      => write!(f, "BRANCH_IF_FALSE {}", target),
            Self::AndBranch(target)          => write!(f, "AND_BRANCH {}", target),
            Self::OrBranch(target)           => write!(f, "OR_BRANCH {}", target),
            Self::SendToSuper(idx)           => write!(f, "SEND_TO_SUPER {}", idx),
        }
    }
}
