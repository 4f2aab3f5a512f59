use indexmap::IndexMap;

use lst_core::bytecode::{Bytecode, Constant, BINARY_SELECTORS, UNARY_SELECTORS};
use lst_memory::{sys_error, HandleGuard, ObjectMemory, Oop};

use crate::layout;
use crate::universe::Universe;

/// The expression stack depth reserved for every method.
pub const DEFAULT_STACK_SIZE: usize = 6;

/// The selector of a method.
pub fn selector(memory: &ObjectMemory, method: Oop) -> Oop {
    memory.basic_at(method, layout::method::MESSAGE)
}

/// The class a method is installed in.
pub fn method_class(memory: &ObjectMemory, method: Oop) -> Oop {
    memory.basic_at(method, layout::method::METHOD_CLASS)
}

/// The number of temporary slots of a method's activations.
pub fn temporary_size(memory: &ObjectMemory, method: Oop) -> usize {
    memory
        .basic_at(method, layout::method::TEMPORARY_SIZE)
        .get_integer()
        .max(0) as usize
}

/// The expression stack depth a method's activations may reach.
pub fn stack_size(memory: &ObjectMemory, method: Oop) -> usize {
    memory
        .basic_at(method, layout::method::STACK_SIZE)
        .get_integer()
        .max(0) as usize
}

/// The 0-based literal `index` of a method.
pub fn literal(memory: &ObjectMemory, method: Oop, index: usize) -> Oop {
    let literals = memory.basic_at(method, layout::method::LITERALS);
    if literals.is_nil() {
        sys_error("method has no literals", &index.to_string());
    }
    memory.basic_at(literals, index + 1)
}

/// A branch whose target is not known yet.
#[must_use]
#[derive(Debug)]
pub struct Label(usize);

/// An assembler for compiled methods.
///
/// Literals are interned per method and kept alive while the method is being built.
/// Branch targets are 1-based byte offsets, as read by the interpreter.
pub struct MethodBuilder<'a> {
    universe: &'a mut Universe,
    selector: String,
    code: Vec<u8>,
    literals: IndexMap<Oop, HandleGuard>,
    temporary_top: usize,
    max_temporaries: usize,
    stack_size: usize,
    text: Option<String>,
    protocol: Option<String>,
    watched: bool,
}

impl<'a> MethodBuilder<'a> {
    /// Starts a method for `selector`.
    pub fn new(universe: &'a mut Universe, selector: &str) -> Self {
        Self {
            universe,
            selector: selector.to_string(),
            code: Vec::new(),
            literals: IndexMap::new(),
            temporary_top: 0,
            max_temporaries: 0,
            stack_size: DEFAULT_STACK_SIZE,
            text: None,
            protocol: None,
            watched: false,
        }
    }

    /// The universe the method is built in.
    pub fn universe(&mut self) -> &mut Universe {
        &mut *self.universe
    }

    /// Declares the method's temporaries, numbered from 0.
    pub fn temporaries(&mut self, count: usize) -> &mut Self {
        self.temporary_top = count;
        self.max_temporaries = self.max_temporaries.max(count);
        self
    }

    /// Overrides the reserved expression stack depth.
    pub fn stack_size(&mut self, size: usize) -> &mut Self {
        self.stack_size = size;
        self
    }

    /// Records the source text of the method.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.text = Some(text.to_string());
        self
    }

    /// Records the protocol (category) of the method.
    pub fn protocol(&mut self, protocol: &str) -> &mut Self {
        self.protocol = Some(protocol.to_string());
        self
    }

    /// Marks the method as watched, redirecting its sends to `watchWith:` in watch mode.
    pub fn watched(&mut self) -> &mut Self {
        self.watched = true;
        self
    }

    /// The 1-based offset of the next instruction.
    pub fn position(&self) -> usize {
        self.code.len() + 1
    }

    /// Appends a raw instruction.
    pub fn instruction(&mut self, bytecode: Bytecode) -> &mut Self {
        bytecode.encode(&mut self.code);
        self
    }

    /// The literal index of `value`, adding it to the literal frame if needed.
    pub fn literal(&mut self, value: Oop) -> u8 {
        let index = match self.literals.get_full(&value) {
            Some((index, _, _)) => index,
            None => {
                let guard = self.universe.memory.guard(value);
                self.literals.insert_full(value, guard).0
            }
        };
        match u8::try_from(index) {
            Ok(index) => index,
            Err(_) => sys_error("too many literals in method", &self.selector),
        }
    }

    pub fn push_literal(&mut self, value: Oop) -> &mut Self {
        let index = self.literal(value);
        self.instruction(Bytecode::PushLiteral(index))
    }

    /// Pushes a small integer, through a constant when there is one.
    pub fn push_integer(&mut self, value: i64) -> &mut Self {
        match value {
            -1 => self.instruction(Bytecode::PushConstant(Constant::MinusOne)),
            0 => self.instruction(Bytecode::PushConstant(Constant::Zero)),
            1 => self.instruction(Bytecode::PushConstant(Constant::One)),
            2 => self.instruction(Bytecode::PushConstant(Constant::Two)),
            _ => self.push_literal(Oop::from_integer(value)),
        }
    }

    pub fn push_symbol(&mut self, name: &str) -> &mut Self {
        let symbol = self.universe.create_symbol(name);
        self.push_literal(symbol)
    }

    pub fn push_string(&mut self, text: &str) -> &mut Self {
        let string = self.universe.new_string(text);
        self.push_literal(string)
    }

    pub fn push_float(&mut self, value: f64) -> &mut Self {
        let float = self.universe.new_float(value);
        self.push_literal(float)
    }

    pub fn push_char(&mut self, value: u8) -> &mut Self {
        let char = self.universe.new_char(value);
        self.push_literal(char)
    }

    /// Pushes the value of a global, read when the method runs.
    pub fn push_global(&mut self, name: &str) -> &mut Self {
        self.push_symbol(name);
        self.primitive(87, 1)
    }

    pub fn push_nil(&mut self) -> &mut Self {
        self.instruction(Bytecode::PushConstant(Constant::Nil))
    }

    pub fn push_true(&mut self) -> &mut Self {
        self.instruction(Bytecode::PushConstant(Constant::True))
    }

    pub fn push_false(&mut self) -> &mut Self {
        self.instruction(Bytecode::PushConstant(Constant::False))
    }

    pub fn push_context(&mut self) -> &mut Self {
        self.instruction(Bytecode::PushConstant(Constant::Context))
    }

    pub fn push_self(&mut self) -> &mut Self {
        self.push_argument(0)
    }

    /// Pushes an argument, the receiver being argument 0.
    pub fn push_argument(&mut self, index: u8) -> &mut Self {
        self.instruction(Bytecode::PushArgument(index))
    }

    pub fn push_temporary(&mut self, index: u8) -> &mut Self {
        self.instruction(Bytecode::PushTemporary(index))
    }

    pub fn push_instance(&mut self, index: u8) -> &mut Self {
        self.instruction(Bytecode::PushInstance(index))
    }

    pub fn assign_temporary(&mut self, index: u8) -> &mut Self {
        self.instruction(Bytecode::AssignTemporary(index))
    }

    pub fn assign_instance(&mut self, index: u8) -> &mut Self {
        self.instruction(Bytecode::AssignInstance(index))
    }

    /// Sends `selector` to the receiver and arguments on top of the stack.
    ///
    /// Selectors with a dedicated opcode use it.
    pub fn send(&mut self, selector: &str, argument_count: u8) -> &mut Self {
        let table: &[&str] = match argument_count {
            0 => &UNARY_SELECTORS,
            1 => &BINARY_SELECTORS,
            _ => &[],
        };
        if let Some(index) = table.iter().position(|name| *name == selector) {
            let index = index as u8;
            return match argument_count {
                0 => self.instruction(Bytecode::SendUnary(index)),
                _ => self.instruction(Bytecode::SendBinary(index)),
            };
        }

        let symbol = self.universe.create_symbol(selector);
        let index = self.literal(symbol);
        self.instruction(Bytecode::MarkArguments(argument_count + 1))
            .instruction(Bytecode::SendMessage(index))
    }

    /// Sends `selector` to `self`, starting the lookup above the method's class.
    pub fn send_super(&mut self, selector: &str, argument_count: u8) -> &mut Self {
        let symbol = self.universe.create_symbol(selector);
        let index = self.literal(symbol);
        self.instruction(Bytecode::MarkArguments(argument_count + 1))
            .instruction(Bytecode::SendToSuper(index))
    }

    pub fn primitive(&mut self, number: u8, argument_count: u8) -> &mut Self {
        self.instruction(Bytecode::DoPrimitive(argument_count, number))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.instruction(Bytecode::PopTop)
    }

    pub fn duplicate(&mut self) -> &mut Self {
        self.instruction(Bytecode::Duplicate)
    }

    pub fn self_return(&mut self) -> &mut Self {
        self.instruction(Bytecode::SelfReturn)
    }

    pub fn stack_return(&mut self) -> &mut Self {
        self.instruction(Bytecode::StackReturn)
    }

    fn forward(&mut self, bytecode: Bytecode) -> Label {
        self.instruction(bytecode);
        Label(self.code.len() - 1)
    }

    pub fn branch(&mut self) -> Label {
        self.forward(Bytecode::Branch(0))
    }

    pub fn branch_if_true(&mut self) -> Label {
        self.forward(Bytecode::BranchIfTrue(0))
    }

    pub fn branch_if_false(&mut self) -> Label {
        self.forward(Bytecode::BranchIfFalse(0))
    }

    pub fn and_branch(&mut self) -> Label {
        self.forward(Bytecode::AndBranch(0))
    }

    pub fn or_branch(&mut self) -> Label {
        self.forward(Bytecode::OrBranch(0))
    }

    /// Jumps back to a `position` recorded earlier.
    pub fn branch_back(&mut self, position: usize) -> &mut Self {
        let target = self.target(position);
        self.instruction(Bytecode::Branch(target))
    }

    /// Points a forward branch at the next instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let target = self.target(self.position());
        self.code[label.0] = target;
        self
    }

    fn target(&self, position: usize) -> u8 {
        match u8::try_from(position) {
            Ok(target) => target,
            Err(_) => sys_error("branch target out of range in method", &self.selector),
        }
    }

    /// Compiles a block taking `argument_count` arguments.
    ///
    /// The block arguments are the temporaries following the ones in scope, `body`
    /// receives the index of the first one.
    /// The block evaluates to the value its body leaves on the stack.
    pub fn block(&mut self, argument_count: u8, body: impl FnOnce(&mut Self, u8)) -> &mut Self {
        let saved_top = self.temporary_top;
        self.temporary_top += usize::from(argument_count);
        self.max_temporaries = self.max_temporaries.max(self.temporary_top);

        let block = self.universe.new_block();
        let index = self.literal(block);
        let memory = &mut self.universe.memory;
        memory.basic_at_put(
            block,
            layout::block::ARGUMENT_COUNT,
            Oop::from_integer(i64::from(argument_count)),
        );
        memory.basic_at_put(
            block,
            layout::block::ARGUMENT_LOCATION,
            Oop::from_integer(saved_top as i64 + 1),
        );

        self.instruction(Bytecode::PushLiteral(index))
            .push_context()
            .primitive(29, 2);
        let skip = self.branch();
        let start = self.position();
        self.universe.memory.basic_at_put(
            block,
            layout::block::BYTE_POSITION,
            Oop::from_integer(start as i64),
        );

        let first_argument = match u8::try_from(saved_top) {
            Ok(index) => index,
            Err(_) => sys_error("too many temporaries in method", &self.selector),
        };
        body(self, first_argument);
        self.stack_return();
        self.bind(skip);

        self.temporary_top = saved_top;
        self
    }

    /// Returns the value on top of the stack from the method that created the
    /// enclosing block.
    pub fn block_return(&mut self) -> &mut Self {
        self.push_context()
            .send(crate::universe::BLOCK_RETURN_SELECTOR, 0)
            .pop()
            .stack_return()
    }

    /// Allocates the method.
    pub fn finish(mut self) -> Oop {
        self.build()
    }

    /// Allocates the method and installs it in `class`.
    ///
    /// Interpreters that already ran must flush their method cache for the selector.
    pub fn install(mut self, class: Oop) -> Oop {
        let method = self.build();
        self.universe.install_method(class, method);
        method
    }

    fn build(&mut self) -> Oop {
        let universe = &mut *self.universe;

        let method = universe.new_method();
        let _method = universe.memory.guard(method);

        let selector = universe.create_symbol(&self.selector);
        universe
            .memory
            .basic_at_put(method, layout::method::MESSAGE, selector);

        let bytecodes = universe.new_byte_array_from(&self.code);
        universe
            .memory
            .basic_at_put(method, layout::method::BYTECODES, bytecodes);

        if !self.literals.is_empty() {
            let literals = universe.new_array(self.literals.len());
            for (idx, value) in self.literals.keys().enumerate() {
                universe.memory.basic_at_put(literals, idx + 1, *value);
            }
            universe
                .memory
                .basic_at_put(method, layout::method::LITERALS, literals);
        }

        universe.memory.basic_at_put(
            method,
            layout::method::STACK_SIZE,
            Oop::from_integer(self.stack_size as i64),
        );
        universe.memory.basic_at_put(
            method,
            layout::method::TEMPORARY_SIZE,
            Oop::from_integer(1 + self.max_temporaries as i64),
        );

        if let Some(text) = &self.text {
            let text = universe.new_string(text);
            universe
                .memory
                .basic_at_put(method, layout::method::TEXT, text);
        }
        if let Some(protocol) = &self.protocol {
            let protocol = universe.new_string(protocol);
            universe
                .memory
                .basic_at_put(method, layout::method::PROTOCOL, protocol);
        }
        if self.watched {
            let watch = universe.true_object();
            universe
                .memory
                .basic_at_put(method, layout::method::WATCH, watch);
        }

        method
    }
}

impl Universe {
    /// Installs `method` in the method dictionary of `class`.
    pub fn install_method(&mut self, class: Oop, method: Oop) {
        let _method = self.memory.guard(method);
        self.memory
            .basic_at_put(method, layout::method::METHOD_CLASS, class);
        let selector = selector(&self.memory, method);
        let methods = self.memory.basic_at(class, layout::class::METHODS);
        self.name_table_insert(methods, selector.identity_hash(), selector, method);
    }

    /// Walks the superclass chain from `class`, answering the first method bound to
    /// `selector` along with the class defining it.
    pub fn lookup_method(&self, selector: Oop, class: Oop) -> Option<(Oop, Oop)> {
        let mut class = class;
        while !class.is_nil() {
            let methods = self.memory.basic_at(class, layout::class::METHODS);
            if !methods.is_nil() {
                let method = self.method_lookup(methods, selector);
                if !method.is_nil() {
                    return Some((method, class));
                }
            }
            class = self.memory.basic_at(class, layout::class::SUPERCLASS);
        }
        None
    }
}
