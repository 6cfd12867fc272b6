//! Human-readable dump of a function tree

use std::fmt::Write;

use crate::function::Function;

/// Render a function and all its children.
pub fn disassemble(function: &Function) -> String {
    let mut out = String::new();
    write_function(&mut out, function, 0);
    out
}

fn write_function(out: &mut String, function: &Function, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{pad}function #{} {} (params: {}, registers: {}, upvalues: {})",
        function.id,
        function.name,
        function.param_count,
        function.register_count,
        function.upvalues.len()
    );

    for (index, upvalue) in function.upvalues.iter().enumerate() {
        let source = if upvalue.from_parent_locals {
            "parent register"
        } else {
            "parent upvalue"
        };
        let _ = writeln!(
            out,
            "{pad}  u{index} {} <- {source} {}",
            upvalue.name, upvalue.index
        );
    }

    for (index, instruction) in function.instructions.iter().enumerate() {
        let line = function
            .positions
            .get(index)
            .map(|pos| pos.line)
            .unwrap_or_default();
        let _ = write!(out, "{pad}  {index:>4} [{line:>4}] {instruction}");
        if let Some(offset) = instruction.jump_offset() {
            let _ = write!(out, "  ; -> {}", offset.target(index));
        }
        out.push('\n');
    }

    if !function.constants.is_empty() {
        let _ = writeln!(out, "{pad}  constants:");
        for (index, constant) in function.constants.iter().enumerate() {
            let _ = writeln!(out, "{pad}    k{index} = {constant}");
        }
    }

    for child in &function.children {
        write_function(out, child, depth + 1);
    }
}
