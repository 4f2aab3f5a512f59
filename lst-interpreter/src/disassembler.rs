use std::fmt::Write;

use lst_core::bytecode::{Bytecode, Constant};
use lst_memory::Oop;

use crate::layout;
use crate::method;
use crate::universe::Universe;

/// Renders the bytecodes of `method`, one instruction per line.
pub fn disassemble_method(universe: &Universe, method: Oop) -> String {
    let mut out = String::new();
    let memory = &universe.memory;
    let bytecodes = memory.basic_at(method, layout::method::BYTECODES);
    if bytecodes.is_nil() {
        return out;
    }
    let code = memory.bytes(bytecodes);

    let literal = |index: u8| -> Option<Oop> {
        let literals = memory.basic_at(method, layout::method::LITERALS);
        if literals.is_nil() || usize::from(index) >= memory.basic_size(literals) {
            return None;
        }
        Some(method::literal(memory, method, usize::from(index)))
    };

    let mut offset = 1;
    while offset <= code.len() {
        let (bytecode, next) = match Bytecode::decode(code, offset) {
            Ok(decoded) => decoded,
            Err(err) => {
                let _ = writeln!(out, "{:>4}  (invalid bytecode: {})", offset, err);
                break;
            }
        };
        let _ = write!(out, "{:>4}  {}", offset, bytecode.padded_name());

        let _ = match bytecode {
            Bytecode::PushInstance(idx)
            | Bytecode::PushArgument(idx)
            | Bytecode::PushTemporary(idx)
            | Bytecode::AssignInstance(idx)
            | Bytecode::AssignTemporary(idx)
            | Bytecode::MarkArguments(idx) => writeln!(out, " {}", idx),
            Bytecode::PushConstant(constant) => match constant {
                Constant::Context => writeln!(out, " thisContext"),
                constant => writeln!(out, " {}", constant),
            },
            Bytecode::PushLiteral(idx) => match literal(idx) {
                Some(value) => writeln!(out, " {} ({})", idx, universe.describe(value)),
                None => writeln!(out, " {} (invalid literal)", idx),
            },
            Bytecode::SendMessage(idx) | Bytecode::SendToSuper(idx) => match literal(idx) {
                Some(selector) => writeln!(
                    out,
                    " {} (#{})",
                    idx,
                    memory.string_value(selector)
                ),
                None => writeln!(out, " {} (invalid selector)", idx),
            },
            Bytecode::SendUnary(idx) => writeln!(
                out,
                " {} (#{})",
                idx,
                memory.string_value(universe.unary_selector(idx))
            ),
            Bytecode::SendBinary(idx) => writeln!(
                out,
                " {} (#{})",
                idx,
                memory.string_value(universe.binary_selector(idx))
            ),
            Bytecode::DoPrimitive(count, number) => writeln!(out, " {} {}", number, count),
            Bytecode::Branch(target)
            | Bytecode::BranchIfTrue(target)
            | Bytecode::BranchIfFalse(target)
            | Bytecode::AndBranch(target)
            | Bytecode::OrBranch(target) => writeln!(out, " -> {}", target),
            Bytecode::SelfReturn
            | Bytecode::StackReturn
            | Bytecode::Duplicate
            | Bytecode::PopTop => writeln!(out),
        };

        offset = next;
    }
    out
}

/// Renders every method defined by `class`, sorted by selector.
pub fn disassemble_class(universe: &Universe, class: Oop) -> String {
    let mut out = String::new();
    let methods = universe.memory.basic_at(class, layout::class::METHODS);
    if methods.is_nil() {
        return out;
    }

    let mut entries: Vec<(String, Oop)> = universe
        .dictionary_entries(methods)
        .into_iter()
        .map(|(selector, method)| (universe.memory.string_value(selector), method))
        .collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let class_name = universe.class_name(class);
    for (selector, method) in entries {
        let _ = writeln!(
            out,
            "{}>>#{} (temporaries: {}, stack: {})",
            class_name,
            selector,
            method::temporary_size(&universe.memory, method),
            method::stack_size(&universe.memory, method),
        );
        out.push_str(&disassemble_method(universe, method));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodBuilder;
    use lst_memory::MemoryParams;

    #[test]
    fn renders_operands() {
        let mut universe = Universe::bootstrap(MemoryParams::default());
        let mut builder = MethodBuilder::new(&mut universe, "doIt");
        builder
            .push_integer(3)
            .push_integer(40)
            .send("+", 1)
            .push_symbol("foo")
            .send("printOn:", 1)
            .stack_return();
        let method = builder.finish();

        let listing = disassemble_method(&universe, method);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains("3"));
        assert!(lines[1].contains("(40)"));
        assert!(lines[2].contains("(#+)"));
        assert!(lines[3].contains("(#foo)"));
        assert!(lines[5].contains("(#printOn:)"));
    }

    #[test]
    fn lists_class_methods() {
        let universe = Universe::bootstrap(MemoryParams::default());
        let listing = disassemble_class(&universe, universe.context_class());
        assert!(listing.contains("Context>>#blockReturn"));
        assert!(listing.contains("Context>>#returnToBlock:"));
    }
}
