use rand::rngs::StdRng;
use rand::SeedableRng;

use lst_core::bytecode::{Bytecode, Constant, INTEGER_FAST_PATH_LIMIT, NIL_TEST_LIMIT};
use lst_memory::{sys_error, ImageInfo, ObjectMemory, Oop, PrimitiveTableId};

use crate::cache::MethodCache;
use crate::layout::{self, linkage};
use crate::method;
use crate::primitives::{MethodCompiler, PrimitiveRegistry, PrimitiveTable};
use crate::universe::Universe;

/// The tunables of the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterParams {
    /// The number of entries of the method cache.
    pub cache_size: usize,
    /// The step budget of the embedding entry points, per time slice.
    pub time_slice: i64,
    /// The step budget of processes run by the `execute` primitive.
    pub nested_time_slice: i64,
    /// The process stack size (in slots) past which a process is abandoned.
    pub stack_ceiling: usize,
    /// The minimum stack size of the processes created by the interpreter.
    pub initial_stack_size: usize,
}

impl Default for InterpreterParams {
    fn default() -> Self {
        Self {
            cache_size: 211,
            time_slice: 15000,
            nested_time_slice: 5000,
            stack_ceiling: 1800,
            initial_stack_size: 50,
        }
    }
}

/// How a run of a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionOutcome {
    /// The step budget ran out, the process can be resumed.
    Yielded,
    /// The root activation returned, its result is the first slot of the process stack.
    Finished,
    /// The process stack grew past the runaway ceiling.
    ///
    /// Its activations are dropped, later runs report it as finished with a `nil` result.
    Abandoned,
    /// A message was not understood, and neither was the recovery message.
    Failed,
}

/// The process stack and link pointer of the running activation, as seen by primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionContext {
    /// The stack of the running process.
    pub process_stack: Oop,
    /// The index of the linkage area of the running activation.
    pub link_pointer: usize,
}

/// Reads a stack index stored as a small integer.
pub(crate) fn stack_index(value: Oop) -> usize {
    match usize::try_from(value.get_integer()) {
        Ok(index) => index,
        Err(_) => sys_error("invalid stack index", &format!("{:?}", value)),
    }
}

/// The running activation, cached out of the process stack.
#[derive(Debug)]
struct Registers {
    stack: Oop,
    top: usize,
    link: usize,
    return_point: usize,
    byte_offset: usize,
    method: Oop,
    /// The reified context, `nil` while the activation only lives on the stack.
    context: Oop,
    arguments: Oop,
    temporaries: Oop,
    literals: Oop,
    bytecodes: Oop,
}

impl Registers {
    fn load(memory: &ObjectMemory, process: Oop) -> Self {
        let mut registers = Self {
            stack: memory.basic_at(process, layout::process::STACK),
            top: stack_index(memory.basic_at(process, layout::process::STACK_TOP)),
            link: stack_index(memory.basic_at(process, layout::process::LINK_POINTER)),
            return_point: 0,
            byte_offset: 0,
            method: Oop::NIL,
            context: Oop::NIL,
            arguments: Oop::NIL,
            temporaries: Oop::NIL,
            literals: Oop::NIL,
            bytecodes: Oop::NIL,
        };
        registers.read_linkage(memory);
        registers
    }

    fn save(&self, memory: &mut ObjectMemory, process: Oop) {
        if self.link > 0 {
            memory.basic_at_put(
                self.stack,
                self.link + linkage::BYTE_OFFSET,
                Oop::from_integer(self.byte_offset as i64),
            );
        }
        memory.basic_at_put(
            process,
            layout::process::STACK_TOP,
            Oop::from_integer(self.top as i64),
        );
        memory.basic_at_put(
            process,
            layout::process::LINK_POINTER,
            Oop::from_integer(self.link as i64),
        );
    }

    /// Reloads the activation whose linkage area starts at the link pointer.
    fn read_linkage(&mut self, memory: &ObjectMemory) {
        let link = self.link;
        self.context = memory.basic_at(self.stack, link + linkage::CONTEXT);
        self.return_point = stack_index(memory.basic_at(self.stack, link + linkage::RETURN_POINT));
        self.byte_offset = stack_index(memory.basic_at(self.stack, link + linkage::BYTE_OFFSET));
        if self.context.is_nil() {
            self.method = memory.basic_at(self.stack, link + linkage::METHOD);
            self.arguments = Oop::NIL;
            self.temporaries = Oop::NIL;
        } else {
            self.method = memory.basic_at(self.context, layout::context::METHOD);
            self.arguments = memory.basic_at(self.context, layout::context::ARGUMENTS);
            self.temporaries = memory.basic_at(self.context, layout::context::TEMPORARIES);
        }
        self.read_method(memory);
    }

    fn read_method(&mut self, memory: &ObjectMemory) {
        self.literals = memory.basic_at(self.method, layout::method::LITERALS);
        self.bytecodes = memory.basic_at(self.method, layout::method::BYTECODES);
    }

    fn slot(&self, memory: &ObjectMemory, index: usize) -> Oop {
        memory.basic_at(self.stack, index)
    }

    fn push(&mut self, memory: &mut ObjectMemory, value: Oop) {
        self.top += 1;
        memory.basic_at_put(self.stack, self.top, value);
    }

    fn pop(&mut self, memory: &mut ObjectMemory) -> Oop {
        let value = memory.basic_at(self.stack, self.top);
        memory.basic_at_put(self.stack, self.top, Oop::NIL);
        self.top -= 1;
        value
    }

    fn peek(&self, memory: &ObjectMemory) -> Oop {
        memory.basic_at(self.stack, self.top)
    }

    fn replace_top(&self, memory: &mut ObjectMemory, value: Oop) {
        memory.basic_at_put(self.stack, self.top, value);
    }

    fn argument(&self, memory: &ObjectMemory, index: u8) -> Oop {
        let index = usize::from(index);
        if self.context.is_nil() {
            memory.basic_at(self.stack, self.return_point + index)
        } else {
            memory.basic_at(self.arguments, index + 1)
        }
    }

    fn receiver(&self, memory: &ObjectMemory) -> Oop {
        self.argument(memory, 0)
    }

    fn temporary(&self, memory: &ObjectMemory, index: u8) -> Oop {
        let index = usize::from(index);
        if self.context.is_nil() {
            memory.basic_at(self.stack, self.link + linkage::TEMPORARIES + index)
        } else {
            memory.basic_at(self.temporaries, index + 1)
        }
    }

    fn set_temporary(&self, memory: &mut ObjectMemory, index: u8, value: Oop) {
        let index = usize::from(index);
        if self.context.is_nil() {
            memory.basic_at_put(self.stack, self.link + linkage::TEMPORARIES + index, value)
        } else {
            memory.basic_at_put(self.temporaries, index + 1, value)
        }
    }

    fn literal(&self, memory: &ObjectMemory, index: u8) -> Oop {
        if self.literals.is_nil() {
            sys_error("method has no literals", &index.to_string());
        }
        memory.basic_at(self.literals, usize::from(index) + 1)
    }
}

/// The bytecode interpreter.
///
/// An interpreter is bound to the first universe it runs against: its method cache
/// holds handles of that universe. Call `cache.flush_all()` before running it against
/// another one.
pub struct Interpreter {
    /// The interpreter's tunables.
    pub params: InterpreterParams,
    /// The method lookup cache.
    pub cache: MethodCache,
    /// The running activation, kept up to date for primitives.
    pub context: ExecutionContext,
    /// Whether sends of watched methods are redirected to `watchWith:`.
    pub watching: bool,
    /// Whether every executed instruction is logged.
    pub trace: bool,
    /// The registered primitive tables.
    pub primitives: PrimitiveRegistry,
    /// The random number generator of the random primitives.
    pub rng: StdRng,
    pub(crate) compiler: Option<Box<dyn MethodCompiler>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter with the default parameters and the core primitive table.
    pub fn new() -> Self {
        Self::with_params(InterpreterParams::default())
    }

    pub fn with_params(params: InterpreterParams) -> Self {
        let mut primitives = PrimitiveRegistry::new();
        primitives.register(PrimitiveTable::core());
        Self {
            cache: MethodCache::new(params.cache_size),
            params,
            context: ExecutionContext::default(),
            watching: false,
            trace: false,
            primitives,
            rng: StdRng::from_entropy(),
            compiler: None,
        }
    }

    /// Registers the compiler used by the compile primitive.
    pub fn set_compiler(&mut self, compiler: Box<dyn MethodCompiler>) {
        self.compiler = Some(compiler);
    }

    /// The identifiers of the registered primitive tables.
    pub fn primitive_table_ids(&self) -> Vec<PrimitiveTableId> {
        self.primitives.table_ids()
    }

    /// Warns about every primitive table an image was written with and that is not
    /// registered here, answering whether there was none.
    pub fn check_image(&self, info: &ImageInfo) -> bool {
        let missing = self.primitives.missing_tables(&info.primitive_tables);
        for id in missing.iter() {
            log::warn!("the image expects the unknown primitive table {}", id);
        }
        missing.is_empty()
    }

    /// Calls primitive `number` through the registered tables.
    pub fn primitive(&mut self, universe: &mut Universe, number: usize, args: &[Oop]) -> Oop {
        match self.primitives.get(number) {
            Some(primitive) => primitive(self, universe, args),
            None => sys_error(
                "unknown primitive",
                &format!("{} (family {})", number, number / 10),
            ),
        }
    }

    /// Installs `method` in `class`, dropping the cached lookups of its selector.
    pub fn install_method(&mut self, universe: &mut Universe, class: Oop, method: Oop) {
        universe.install_method(class, method);
        let selector = method::selector(&universe.memory, method);
        self.cache.flush(selector);
    }

    /// Looks up a method, through the cache.
    fn find_method(&mut self, universe: &Universe, selector: Oop, class: Oop) -> Option<(Oop, Oop)> {
        if let Some(found) = self.cache.lookup(selector, class) {
            return Some(found);
        }
        match universe.lookup_method(selector, class) {
            Some((method, method_class)) => {
                self.cache
                    .insert(&universe.memory, selector, class, method, method_class);
                Some((method, method_class))
            }
            None => {
                self.cache.evict(selector, class);
                None
            }
        }
    }

    /// Runs `process` for at most `max_steps` instructions.
    ///
    /// Answers `true` when the budget ran out with work left, `false` once the process
    /// is done (or cannot go on).
    pub fn execute(&mut self, universe: &mut Universe, process: Oop, max_steps: i64) -> bool {
        self.run(universe, process, max_steps) == ExecutionOutcome::Yielded
    }

    /// Runs `process` until its budget runs out, reporting how the run ended.
    pub fn run(&mut self, universe: &mut Universe, process: Oop, max_steps: i64) -> ExecutionOutcome {
        let _process = universe.memory.guard(process);
        if universe.memory.basic_at(process, layout::process::LINK_POINTER) == Oop::from_integer(0) {
            return ExecutionOutcome::Finished;
        }
        let mut registers = Registers::load(&universe.memory, process);
        universe.memory.set_active_stack(registers.stack);
        let mut time_slice = max_steps;

        let outcome = loop {
            time_slice -= 1;
            if time_slice <= 0 {
                break ExecutionOutcome::Yielded;
            }

            let decoded = Bytecode::decode(
                universe.memory.bytes(registers.bytecodes),
                registers.byte_offset,
            );
            let bytecode = match decoded {
                Ok((bytecode, next)) => {
                    if self.trace {
                        log::trace!("{:>4}: {}", registers.byte_offset, bytecode);
                    }
                    registers.byte_offset = next;
                    bytecode
                }
                Err(err) => sys_error("invalid bytecode", &err.to_string()),
            };

            match bytecode {
                Bytecode::PushInstance(idx) => {
                    let receiver = registers.receiver(&universe.memory);
                    let value = universe.memory.basic_at(receiver, usize::from(idx) + 1);
                    registers.push(&mut universe.memory, value);
                }
                Bytecode::PushArgument(idx) => {
                    let value = registers.argument(&universe.memory, idx);
                    registers.push(&mut universe.memory, value);
                }
                Bytecode::PushTemporary(idx) => {
                    let value = registers.temporary(&universe.memory, idx);
                    registers.push(&mut universe.memory, value);
                }
                Bytecode::PushLiteral(idx) => {
                    let value = registers.literal(&universe.memory, idx);
                    registers.push(&mut universe.memory, value);
                }
                Bytecode::PushConstant(constant) => {
                    let value = match constant {
                        Constant::Context => self.current_context(universe, &mut registers),
                        Constant::Nil => Oop::NIL,
                        Constant::True => universe.true_object(),
                        Constant::False => universe.false_object(),
                        Constant::Zero => Oop::from_integer(0),
                        Constant::One => Oop::from_integer(1),
                        Constant::Two => Oop::from_integer(2),
                        Constant::MinusOne => Oop::from_integer(-1),
                    };
                    registers.push(&mut universe.memory, value);
                }
                Bytecode::AssignInstance(idx) => {
                    let receiver = registers.receiver(&universe.memory);
                    let value = registers.peek(&universe.memory);
                    universe
                        .memory
                        .basic_at_put(receiver, usize::from(idx) + 1, value);
                }
                Bytecode::AssignTemporary(idx) => {
                    let value = registers.peek(&universe.memory);
                    registers.set_temporary(&mut universe.memory, idx, value);
                }
                Bytecode::MarkArguments(count) => {
                    registers.return_point = registers.top + 1 - usize::from(count);
                    // the send that follows counts as part of this step
                    time_slice += 1;
                }
                Bytecode::SendMessage(idx) => {
                    let selector = registers.literal(&universe.memory, idx);
                    let receiver = registers.slot(&universe.memory, registers.return_point);
                    let class = universe.memory.class_of(receiver);
                    if let Err(outcome) = self.send(universe, &mut registers, process, selector, class) {
                        break outcome;
                    }
                }
                Bytecode::SendUnary(idx) => {
                    if !self.watching && idx <= NIL_TEST_LIMIT {
                        let top = registers.peek(&universe.memory);
                        // isNil and notNil
                        let answer = match (idx, top.is_nil()) {
                            (0, true) => Some(universe.true_object()),
                            (1, true) => Some(universe.false_object()),
                            _ => None,
                        };
                        if let Some(answer) = answer {
                            registers.replace_top(&mut universe.memory, answer);
                            continue;
                        }
                    }
                    registers.return_point = registers.top;
                    let selector = universe.unary_selector(idx);
                    let receiver = registers.peek(&universe.memory);
                    let class = universe.memory.class_of(receiver);
                    if let Err(outcome) = self.send(universe, &mut registers, process, selector, class) {
                        break outcome;
                    }
                }
                Bytecode::SendBinary(idx) => {
                    if !self.watching && idx <= INTEGER_FAST_PATH_LIMIT {
                        let left = registers.slot(&universe.memory, registers.top - 1);
                        let right = registers.peek(&universe.memory);
                        if left.is_small_integer() && right.is_small_integer() {
                            self.sync_context(&registers);
                            let result =
                                self.primitive(universe, 60 + usize::from(idx), &[left, right]);
                            if !result.is_nil() {
                                registers.pop(&mut universe.memory);
                                registers.replace_top(&mut universe.memory, result);
                                continue;
                            }
                        }
                    }
                    registers.return_point = registers.top - 1;
                    let selector = universe.binary_selector(idx);
                    let receiver = registers.slot(&universe.memory, registers.return_point);
                    let class = universe.memory.class_of(receiver);
                    if let Err(outcome) = self.send(universe, &mut registers, process, selector, class) {
                        break outcome;
                    }
                }
                Bytecode::DoPrimitive(count, number) => {
                    let finished = self.do_primitive(
                        universe,
                        &mut registers,
                        &mut time_slice,
                        usize::from(count),
                        number,
                    );
                    if finished {
                        break ExecutionOutcome::Finished;
                    }
                }
                Bytecode::SelfReturn => {
                    let receiver = registers.receiver(&universe.memory);
                    if self.do_return(universe, &mut registers, receiver) {
                        break ExecutionOutcome::Finished;
                    }
                }
                Bytecode::StackReturn => {
                    let result = registers.pop(&mut universe.memory);
                    if self.do_return(universe, &mut registers, result) {
                        break ExecutionOutcome::Finished;
                    }
                }
                Bytecode::Duplicate => {
                    let value = registers.peek(&universe.memory);
                    registers.push(&mut universe.memory, value);
                }
                Bytecode::PopTop => {
                    registers.pop(&mut universe.memory);
                }
                Bytecode::Branch(target) => {
                    registers.byte_offset = usize::from(target);
                }
                Bytecode::BranchIfTrue(target) => {
                    let value = registers.pop(&mut universe.memory);
                    if value == universe.true_object() {
                        // leaves a nil in place of the condition
                        registers.top += 1;
                        registers.byte_offset = usize::from(target);
                    }
                }
                Bytecode::BranchIfFalse(target) => {
                    let value = registers.pop(&mut universe.memory);
                    if value == universe.false_object() {
                        registers.top += 1;
                        registers.byte_offset = usize::from(target);
                    }
                }
                Bytecode::AndBranch(target) => {
                    let value = registers.pop(&mut universe.memory);
                    if value == universe.false_object() {
                        registers.push(&mut universe.memory, value);
                        registers.byte_offset = usize::from(target);
                    }
                }
                Bytecode::OrBranch(target) => {
                    let value = registers.pop(&mut universe.memory);
                    if value == universe.true_object() {
                        registers.push(&mut universe.memory, value);
                        registers.byte_offset = usize::from(target);
                    }
                }
                Bytecode::SendToSuper(idx) => {
                    let selector = registers.literal(&universe.memory, idx);
                    let method_class = method::method_class(&universe.memory, registers.method);
                    let superclass = universe
                        .memory
                        .basic_at(method_class, layout::class::SUPERCLASS);
                    let class = if superclass.is_nil() {
                        method_class
                    } else {
                        superclass
                    };
                    if let Err(outcome) = self.send(universe, &mut registers, process, selector, class) {
                        break outcome;
                    }
                }
            }
        };

        if outcome == ExecutionOutcome::Abandoned {
            // leaves `nil` as the result, so the process cannot be resumed
            self.unwind(universe, &mut registers, 0);
        }
        registers.save(&mut universe.memory, process);
        self.sync_context(&registers);
        outcome
    }

    fn sync_context(&mut self, registers: &Registers) {
        self.context = ExecutionContext {
            process_stack: registers.stack,
            link_pointer: registers.link,
        };
    }

    /// The context of the running activation, reified on first use.
    fn current_context(&mut self, universe: &mut Universe, registers: &mut Registers) -> Oop {
        if !registers.context.is_nil() {
            return registers.context;
        }

        let link = registers.link;
        let arguments = universe.copy_from(
            registers.stack,
            registers.return_point,
            link - registers.return_point,
        );
        let _arguments = universe.memory.guard(arguments);
        let temporary_size = method::temporary_size(&universe.memory, registers.method);
        let temporaries = universe.copy_from(
            registers.stack,
            link + linkage::TEMPORARIES,
            temporary_size,
        );
        let _temporaries = universe.memory.guard(temporaries);
        let context = universe.new_context(link, registers.method, arguments, temporaries);

        let memory = &mut universe.memory;
        memory.basic_at_put(registers.stack, link + linkage::CONTEXT, context);
        memory.basic_at_put(
            registers.stack,
            link + linkage::BYTE_OFFSET,
            Oop::from_integer(registers.byte_offset as i64),
        );
        registers.read_linkage(memory);
        context
    }

    /// Moves the receiver and the arguments of the pending send into a new array.
    fn pop_arguments(&mut self, universe: &mut Universe, registers: &mut Registers) -> Oop {
        let count = registers.top + 1 - registers.return_point;
        let array = universe.new_array(count);
        for idx in (1..=count).rev() {
            let value = registers.pop(&mut universe.memory);
            universe.memory.basic_at_put(array, idx, value);
        }
        array
    }

    /// Sends `selector` to the receiver at the return point, looking it up from `class`.
    fn send(
        &mut self,
        universe: &mut Universe,
        registers: &mut Registers,
        process: Oop,
        selector: Oop,
        class: Oop,
    ) -> Result<(), ExecutionOutcome> {
        let mut method = match self.find_method(universe, selector, class) {
            Some((method, _)) => method,
            None => {
                let arguments = self.pop_arguments(universe, registers);
                let receiver = universe.memory.basic_at(arguments, 1);
                registers.push(&mut universe.memory, receiver);
                registers.push(&mut universe.memory, selector);
                registers.push(&mut universe.memory, arguments);

                let recovery = universe.common.not_recognized.get();
                match universe.lookup_method(recovery, class) {
                    Some((method, _)) => method,
                    None => {
                        log::warn!(
                            "no recovery method for #{} sent to an instance of {}",
                            universe.memory.string_value(selector),
                            universe.class_name(class)
                        );
                        return Err(ExecutionOutcome::Failed);
                    }
                }
            }
        };

        let watched = !universe
            .memory
            .basic_at(method, layout::method::WATCH)
            .is_nil();
        if self.watching && watched {
            let _method = universe.memory.guard(method);
            let arguments = self.pop_arguments(universe, registers);
            registers.push(&mut universe.memory, method);
            registers.push(&mut universe.memory, arguments);

            let watch = universe.common.watch_with.get();
            let method_class = universe.memory.class_of(method);
            method = match universe.lookup_method(watch, method_class) {
                Some((method, _)) => method,
                None => {
                    log::warn!("no #watchWith: method for watched methods");
                    return Err(ExecutionOutcome::Failed);
                }
            };
        }

        self.activate(universe, registers, process, method)
    }

    /// Pushes a linkage area for `method` and makes it the running activation.
    fn activate(
        &mut self,
        universe: &mut Universe,
        registers: &mut Registers,
        process: Oop,
        method: Oop,
    ) -> Result<(), ExecutionOutcome> {
        universe.memory.basic_at_put(
            registers.stack,
            registers.link + linkage::BYTE_OFFSET,
            Oop::from_integer(registers.byte_offset as i64),
        );

        let temporary_size = method::temporary_size(&universe.memory, method);
        let needed =
            linkage::OVERHEAD + temporary_size + method::stack_size(&universe.memory, method);
        if registers.top + needed > universe.memory.basic_size(registers.stack) {
            let _method = universe.memory.guard(method);
            self.grow_stack(universe, registers, process, needed);
        }

        let memory = &mut universe.memory;
        let previous = registers.link;
        registers.push(memory, Oop::from_integer(previous as i64));
        registers.link = registers.top;
        registers.push(memory, Oop::NIL);
        registers.push(memory, Oop::from_integer(registers.return_point as i64));
        registers.push(memory, method);
        registers.push(memory, Oop::from_integer(1));
        registers.push(memory, Oop::NIL);
        registers.top += temporary_size;

        registers.context = Oop::NIL;
        registers.arguments = Oop::NIL;
        registers.temporaries = Oop::NIL;
        registers.method = method;
        registers.byte_offset = 1;
        registers.read_method(memory);

        let size = memory.basic_size(registers.stack);
        if size > self.params.stack_ceiling {
            log::warn!(
                "process stack overflow ({} slots), abandoning the process",
                size
            );
            return Err(ExecutionOutcome::Abandoned);
        }
        Ok(())
    }

    fn grow_stack(&mut self, universe: &mut Universe, registers: &mut Registers, process: Oop, needed: usize) {
        let size = universe.memory.basic_size(registers.stack) + needed.max(100);
        let stack = universe.new_array(size);
        for idx in 1..=registers.top {
            let value = universe.memory.basic_at(registers.stack, idx);
            universe.memory.basic_at_put(stack, idx, value);
        }
        universe
            .memory
            .basic_at_put(process, layout::process::STACK, stack);
        universe.memory.set_active_stack(stack);
        registers.stack = stack;
        log::debug!("process stack grown to {} slots", size);
    }

    /// Returns `result` from the running activation.
    ///
    /// Answers whether that was the root activation of the process.
    fn do_return(&mut self, universe: &mut Universe, registers: &mut Registers, result: Oop) -> bool {
        let memory = &mut universe.memory;
        let return_point = stack_index(registers.slot(memory, registers.link + linkage::RETURN_POINT));
        let link = stack_index(registers.slot(memory, registers.link + linkage::PREVIOUS_LINK));
        while registers.top >= return_point {
            registers.pop(memory);
        }
        registers.push(memory, result);

        registers.link = link;
        if link == 0 {
            return true;
        }
        registers.read_linkage(memory);
        false
    }

    /// Runs a primitive, replacing its arguments with its result.
    ///
    /// Answers whether the process is done.
    fn do_primitive(
        &mut self,
        universe: &mut Universe,
        registers: &mut Registers,
        time_slice: &mut i64,
        count: usize,
        number: u8,
    ) -> bool {
        let first = match (registers.top + 1).checked_sub(count) {
            Some(first) if first >= 1 => first,
            _ => sys_error("primitive arguments underflow the stack", &number.to_string()),
        };
        let args: Vec<Oop> = (first..=registers.top)
            .map(|idx| registers.slot(&universe.memory, idx))
            .collect();
        let arg = |idx: usize| args.get(idx).copied().unwrap_or(Oop::NIL);

        let result = match number {
            5 => {
                self.watching = !self.watching;
                universe.boolean(self.watching)
            }
            11 => universe.memory.class_of(arg(0)),
            21 => universe.boolean(arg(0) == arg(1)),
            25 => universe.memory.basic_at(arg(0), stack_index(arg(1))),
            31 => {
                universe
                    .memory
                    .basic_at_put(arg(0), stack_index(arg(1)), arg(2));
                Oop::NIL
            }
            53 => {
                *time_slice = arg(0).get_integer();
                Oop::NIL
            }
            56 => return self.unwind(universe, registers, stack_index(arg(0))),
            58 => universe.memory.allocate(stack_index(arg(0))),
            87 => {
                let name = universe.memory.string_value(arg(0));
                universe.global_symbol(&name)
            }
            _ => {
                self.sync_context(registers);
                self.primitive(universe, usize::from(number), &args)
            }
        };

        for _ in 0..count {
            registers.pop(&mut universe.memory);
        }
        registers.push(&mut universe.memory, result);
        false
    }

    /// Returns `nil` from the activation whose return point is `target`, dropping the
    /// activations above it.
    ///
    /// Unwinding past the root activation finishes the process.
    fn unwind(&mut self, universe: &mut Universe, registers: &mut Registers, target: usize) -> bool {
        let memory = &mut universe.memory;
        let mut link = registers.link;
        loop {
            let return_point = stack_index(registers.slot(memory, link + linkage::RETURN_POINT));
            let previous = stack_index(registers.slot(memory, link + linkage::PREVIOUS_LINK));
            while registers.top >= return_point {
                registers.pop(memory);
            }
            link = previous;
            if return_point <= target || link == 0 {
                break;
            }
        }
        registers.push(memory, Oop::NIL);

        registers.link = link;
        if link == 0 {
            return true;
        }
        registers.read_linkage(memory);
        false
    }

    /// Runs `body`, restoring the running activation and the collector's view of the
    /// active stack afterwards.
    pub fn nested<T>(
        &mut self,
        universe: &mut Universe,
        body: impl FnOnce(&mut Self, &mut Universe) -> T,
    ) -> T {
        let saved_context = self.context;
        let saved_stack = universe.memory.active_stack();
        let _saved_stack = universe.memory.guard(saved_stack);
        let _saved_process_stack = universe.memory.guard(saved_context.process_stack);

        let result = body(self, universe);

        self.context = saved_context;
        universe.memory.set_active_stack(saved_stack);
        result
    }

    /// Runs `process` in time slices until it stops yielding.
    pub fn run_to_completion(&mut self, universe: &mut Universe, process: Oop) -> ExecutionOutcome {
        let time_slice = self.params.time_slice;
        loop {
            match self.run(universe, process, time_slice) {
                ExecutionOutcome::Yielded => continue,
                outcome => return outcome,
            }
        }
    }

    /// The value left in the first slot of a process stack: the result of a finished
    /// process.
    pub fn process_result(universe: &Universe, process: Oop) -> Oop {
        let stack = universe.memory.basic_at(process, layout::process::STACK);
        universe.memory.basic_at(stack, 1)
    }

    /// Sends `selector` to `receiver` with `arguments` in a fresh process, and runs it to
    /// completion.
    ///
    /// Answers `None` when the receiver does not understand the selector.
    pub fn send_message(
        &mut self,
        universe: &mut Universe,
        receiver: Oop,
        selector: &str,
        arguments: &[Oop],
    ) -> Option<Oop> {
        let _guards: Vec<_> = std::iter::once(receiver)
            .chain(arguments.iter().copied())
            .map(|oop| universe.memory.guard(oop))
            .collect();
        let selector = universe.create_symbol(selector);
        let class = universe.memory.class_of(receiver);
        let (method, _) = universe.lookup_method(selector, class)?;
        Some(self.run_detached(universe, receiver, method, arguments))
    }

    /// Runs `method` with a `nil` receiver in a fresh process, answering its result.
    pub fn run_method(&mut self, universe: &mut Universe, method: Oop) -> Oop {
        self.run_detached(universe, Oop::NIL, method, &[])
    }

    fn run_detached(&mut self, universe: &mut Universe, receiver: Oop, method: Oop, arguments: &[Oop]) -> Oop {
        let min_stack = self.params.initial_stack_size;
        let process = universe.new_process(receiver, method, arguments, min_stack);
        let _process = universe.memory.guard(process);
        let outcome = self.nested(universe, |interpreter, universe| {
            interpreter.run_to_completion(universe, process)
        });
        if outcome != ExecutionOutcome::Finished {
            log::warn!("detached process ended with {:?}", outcome);
        }
        Self::process_result(universe, process)
    }
}
