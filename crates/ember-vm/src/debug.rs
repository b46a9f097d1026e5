//! Linear bytecode disassembler.
//!
//! Purely a development aid — gated behind the `trace` Cargo feature, the
//! idiomatic-Rust equivalent of a C interpreter's `DEBUG_TRACE_EXECUTION`/
//! `DEBUG_PRINT_CODE` compile-time switches. Not used by `Vm::run` itself
//! outside of that feature.

use crate::chunk::Chunk;
use crate::opcode::OpCode;
use crate::value::Value;

/// Dumps every instruction in `chunk` under a `name` header, one line per
/// instruction.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.len() {
        let (line, next) = format_instruction(chunk, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// Prints the single instruction at `offset` to stdout, as the trace-mode
/// dispatch loop does before executing it.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) {
    let (line, _) = format_instruction(chunk, offset);
    println!("{line}");
}

/// Renders the current operand stack, bottom to top, matching the trace
/// format `" CURRENT STACK: [a, b, c]\n"`.
pub fn trace_stack(stack: &[Value]) -> String {
    let rendered: Vec<String> = stack.iter().map(|v| v.to_string()).collect();
    format!(" CURRENT STACK: [{}]\n", rendered.join(", "))
}

fn format_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut out = format!("{offset:04} ");
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.lines[offset]));
    }

    let op = match OpCode::try_from(chunk.code[offset]) {
        Ok(op) => op,
        Err(_) => {
            out.push_str(&format!("Unknown opcode {}", chunk.code[offset]));
            return (out, offset + 1);
        }
    };

    let next = match op {
        OpCode::Constant => constant_instruction(&mut out, "OP_CONSTANT", chunk, offset),
        OpCode::Nil => simple_instruction(&mut out, "OP_NIL", offset),
        OpCode::True => simple_instruction(&mut out, "OP_TRUE", offset),
        OpCode::False => simple_instruction(&mut out, "OP_FALSE", offset),
        OpCode::Equal => simple_instruction(&mut out, "OP_EQUAL", offset),
        OpCode::Greater => simple_instruction(&mut out, "OP_GREATER", offset),
        OpCode::Less => simple_instruction(&mut out, "OP_LESS", offset),
        OpCode::Add => simple_instruction(&mut out, "OP_ADD", offset),
        OpCode::Subtract => simple_instruction(&mut out, "OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction(&mut out, "OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction(&mut out, "OP_DIVIDE", offset),
        OpCode::Not => simple_instruction(&mut out, "OP_NOT", offset),
        OpCode::Negate => simple_instruction(&mut out, "OP_NEGATE", offset),
        OpCode::Print => simple_instruction(&mut out, "OP_PRINT", offset),
        OpCode::Pop => simple_instruction(&mut out, "OP_POP", offset),
        OpCode::Return => simple_instruction(&mut out, "OP_RETURN", offset),
        OpCode::DefineGlobal => constant_instruction(&mut out, "OP_DEFINEGLOBAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction(&mut out, "OP_GETGLOBAL", chunk, offset),
        OpCode::SetGlobal => constant_instruction(&mut out, "OP_SETGLOBAL", chunk, offset),
        OpCode::GetLocal => byte_instruction(&mut out, "OP_GETLOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction(&mut out, "OP_SETLOCAL", chunk, offset),
        OpCode::Jmp => jmp_instruction(&mut out, "OP_JMP", 1, chunk, offset),
        OpCode::Jnt => jmp_instruction(&mut out, "OP_JNT", 1, chunk, offset),
        OpCode::Jl => jmp_instruction(&mut out, "OP_JL", -1, chunk, offset),
    };
    (out, next)
}

fn simple_instruction(out: &mut String, name: &str, offset: usize) -> usize {
    out.push_str(&format!("{name:<40}"));
    offset + 1
}

fn constant_instruction(out: &mut String, name: &str, chunk: &Chunk, offset: usize) -> usize {
    let idx = chunk.code[offset + 1] as usize;
    out.push_str(&format!("{name:<16} {idx:>4} [{}]", chunk.constants[idx]));
    offset + 2
}

fn byte_instruction(out: &mut String, name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    out.push_str(&format!("{name:<16} {slot:>4}"));
    offset + 2
}

fn jmp_instruction(out: &mut String, name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let jmp = ((chunk.code[offset + 1] as u16) << 8) | chunk.code[offset + 2] as u16;
    let target = offset as i64 + 3 + sign as i64 * jmp as i64;
    out.push_str(&format!("{name:<16} {offset:>4} -> {target:04}"));
    offset + 3
}
