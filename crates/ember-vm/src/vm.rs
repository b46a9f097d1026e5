//! The bytecode interpreter: fetch–decode–dispatch over a [`Chunk`], a
//! fixed-size operand stack, and the globals/intern tables.
//!
//! `Vm` is an ordinary value the driver constructs once and threads into
//! every `compile`/`run` call — nothing here is actually global state.
//! Persisting one `Vm` across REPL lines is what keeps globals and
//! interned strings alive between lines; each line still gets its own
//! fresh [`Chunk`].

use std::io::{self, Write};
use std::rc::Rc;

use thiserror::Error;

use crate::chunk::Chunk;
use crate::object::Obj;
use crate::opcode::OpCode;
use crate::table::Table;
use crate::value::Value;

/// The operand stack holds a fixed 256 slots. Overflow is **detected**
/// here rather than left as undefined behavior: safe Rust has no cheap
/// way to leave a fixed buffer's overflow undefined, so pushing past the
/// bound raises the same `RuntimeError` machinery as any other fault.
pub const STACK_MAX: usize = 256;

/// The single runtime-fault type `Vm::run` propagates via `?`. Every
/// runtime error condition — and stack overflow — is reported through
/// this one type; its `Display` is the standard two-line diagnostic.
#[derive(Debug, Error)]
#[error("{message}\n[line {line}] in script")]
pub struct RuntimeError {
    pub message: String,
    pub line: u32,
}

/// Owns every piece of process-wide mutable state the interpreter needs:
/// the operand stack, the globals table, the string-intern table, and
/// the list of every heap object ever allocated (checkable independently
/// of `Drop` timing, even though `Rc` already drops unreachable data the
/// moment `Vm` itself goes out of scope).
pub struct Vm {
    stack: Vec<Value>,
    globals: Table,
    strings: Table,
    objects: Vec<Rc<Obj>>,
    output: Box<dyn Write>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Builds a `Vm` that writes `print` output to `output` instead of
    /// real stdout — how tests observe program output without spawning a
    /// subprocess.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            strings: Table::new(),
            objects: Vec::new(),
            output,
        }
    }

    /// Interns `bytes`, deduplicating against every string already seen by
    /// this VM. Used both by the compiler, for string-literal and
    /// identifier-name constants, and by [`Vm::concatenate`] at runtime —
    /// the same path either way, so compile-time and run-time strings with
    /// equal bytes are always the same `Rc`.
    pub fn intern(&mut self, bytes: &[u8]) -> Rc<Obj> {
        let hash = crate::object::fnv1a_hash(bytes);
        if let Some(existing) = self.strings.find_string(bytes, hash) {
            return existing;
        }
        let obj = Rc::new(Obj::new_string(bytes.to_vec().into_boxed_slice()));
        self.objects.push(Rc::clone(&obj));
        self.strings.set(Rc::clone(&obj), Value::Nil);
        obj
    }

    /// Every heap object this VM has ever allocated. Exists for the
    /// teardown test below; not used by `run` itself, since `Rc` already
    /// manages the objects' actual lifetime.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn push(&mut self, chunk: &Chunk, offset: usize, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error(chunk, offset, "Stack overflow."));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: malformed bytecode")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn runtime_error(&mut self, chunk: &Chunk, offset: usize, message: impl Into<String>) -> RuntimeError {
        let line = chunk.line_at(offset);
        self.stack.clear();
        RuntimeError { message: message.into(), line }
    }

    fn constant_string(&self, chunk: &Chunk, idx: usize) -> Rc<Obj> {
        match &chunk.constants[idx] {
            Value::Obj(obj) => Rc::clone(obj),
            other => unreachable!("non-string name constant {other:?} emitted by compiler"),
        }
    }

    fn concatenate(&mut self, chunk: &Chunk, offset: usize) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let (a_bytes, b_bytes) = (
            a.as_string_bytes().expect("caller verified both operands are strings"),
            b.as_string_bytes().expect("caller verified both operands are strings"),
        );
        let mut bytes = Vec::with_capacity(a_bytes.len() + b_bytes.len());
        bytes.extend_from_slice(a_bytes);
        bytes.extend_from_slice(b_bytes);
        let interned = self.intern(&bytes);
        self.push(chunk, offset, Value::Obj(interned))
    }

    /// Runs `chunk` from its first byte to an `OP_RETURN` or a runtime
    /// fault. Callers should propagate whatever this returns rather than
    /// assume success — a C driver that discards `run`'s result and
    /// always reports success would silently hide every runtime fault.
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        let mut ip: usize = 0;

        loop {
            #[cfg(feature = "trace")]
            {
                print!("{}", crate::debug::trace_stack(&self.stack));
                crate::debug::disassemble_instruction(chunk, ip);
            }

            let offset = ip;
            let op = OpCode::try_from(chunk.code[ip]).expect("invalid opcode emitted by compiler");
            ip += 1;

            match op {
                OpCode::Constant => {
                    let idx = chunk.code[ip] as usize;
                    ip += 1;
                    let value = chunk.constants[idx].clone();
                    self.push(chunk, offset, value)?;
                }
                OpCode::Nil => self.push(chunk, offset, Value::Nil)?,
                OpCode::True => self.push(chunk, offset, Value::Bool(true))?,
                OpCode::False => self.push(chunk, offset, Value::Bool(false))?,
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(chunk, offset, Value::Bool(a.values_equal(&b)))?;
                }
                OpCode::Greater => {
                    let (a, b) = self.pop_numeric_pair(chunk, offset, "Operands must be numbers.")?;
                    self.push(chunk, offset, Value::Bool(a > b))?;
                }
                OpCode::Less => {
                    let (a, b) = self.pop_numeric_pair(chunk, offset, "Operands must be numbers.")?;
                    self.push(chunk, offset, Value::Bool(a < b))?;
                }
                OpCode::Add => {
                    if self.peek(0).is_string() && self.peek(1).is_string() {
                        self.concatenate(chunk, offset)?;
                    } else if self.peek(0).is_number() && self.peek(1).is_number() {
                        let (a, b) = self.pop_numeric_pair(chunk, offset, "Operands must be numbers or strings.")?;
                        self.push(chunk, offset, Value::Number(a + b))?;
                    } else {
                        return Err(self.runtime_error(chunk, offset, "Operands must be numbers or strings."));
                    }
                }
                OpCode::Subtract => {
                    let (a, b) = self.pop_numeric_pair(chunk, offset, "Operands must be numbers.")?;
                    self.push(chunk, offset, Value::Number(a - b))?;
                }
                OpCode::Multiply => {
                    let (a, b) = self.pop_numeric_pair(chunk, offset, "Operands must be numbers.")?;
                    self.push(chunk, offset, Value::Number(a * b))?;
                }
                OpCode::Divide => {
                    let (a, b) = self.pop_numeric_pair(chunk, offset, "Operands must be numbers.")?;
                    self.push(chunk, offset, Value::Number(a / b))?;
                }
                OpCode::Not => {
                    let v = self.pop();
                    self.push(chunk, offset, Value::Bool(v.is_falsey()))?;
                }
                OpCode::Negate => {
                    if !self.peek(0).is_number() {
                        return Err(self.runtime_error(chunk, offset, "Operand must be a number."));
                    }
                    let n = self.pop().as_number().unwrap();
                    self.push(chunk, offset, Value::Number(-n))?;
                }
                OpCode::Print => {
                    let v = self.pop();
                    let _ = writeln!(self.output, "{v}");
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::DefineGlobal => {
                    let idx = chunk.code[ip] as usize;
                    ip += 1;
                    let name = self.constant_string(chunk, idx);
                    let value = self.peek(0).clone();
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::GetGlobal => {
                    let idx = chunk.code[ip] as usize;
                    ip += 1;
                    let name = self.constant_string(chunk, idx);
                    match self.globals.get(&name) {
                        Some(value) => self.push(chunk, offset, value)?,
                        None => {
                            let message = format!("Undefined variable '{}'.", display_name(&name));
                            return Err(self.runtime_error(chunk, offset, message));
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let idx = chunk.code[ip] as usize;
                    ip += 1;
                    let name = self.constant_string(chunk, idx);
                    let value = self.peek(0).clone();
                    if self.globals.set(Rc::clone(&name), value) {
                        self.globals.delete(&name);
                        let message = format!("Undefined variable '{}'.", display_name(&name));
                        return Err(self.runtime_error(chunk, offset, message));
                    }
                }
                OpCode::GetLocal => {
                    let slot = chunk.code[ip] as usize;
                    ip += 1;
                    let value = self.stack[slot].clone();
                    self.push(chunk, offset, value)?;
                }
                OpCode::SetLocal => {
                    let slot = chunk.code[ip] as usize;
                    ip += 1;
                    self.stack[slot] = self.peek(0).clone();
                }
                OpCode::Jmp => {
                    let delta = read_u16(chunk, &mut ip);
                    ip += delta as usize;
                }
                OpCode::Jnt => {
                    let delta = read_u16(chunk, &mut ip);
                    if self.peek(0).is_falsey() {
                        ip += delta as usize;
                    }
                }
                OpCode::Jl => {
                    let delta = read_u16(chunk, &mut ip);
                    ip -= delta as usize;
                }
                OpCode::Return => return Ok(()),
            }
        }
    }

    fn pop_numeric_pair(
        &mut self,
        chunk: &Chunk,
        offset: usize,
        message: &str,
    ) -> Result<(f64, f64), RuntimeError> {
        if !self.peek(0).is_number() || !self.peek(1).is_number() {
            return Err(self.runtime_error(chunk, offset, message.to_string()));
        }
        let b = self.pop().as_number().unwrap();
        let a = self.pop().as_number().unwrap();
        Ok((a, b))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u16(chunk: &Chunk, ip: &mut usize) -> u16 {
    let hi = chunk.code[*ip] as u16;
    let lo = chunk.code[*ip + 1] as u16;
    *ip += 2;
    (hi << 8) | lo
}

fn display_name(obj: &Rc<Obj>) -> String {
    String::from_utf8_lossy(obj.as_str_bytes()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    fn push_constant(chunk: &mut Chunk, value: Value, line: u32) {
        let idx = chunk.add_constant(value) as u8;
        chunk.write(OpCode::Constant as u8, line);
        chunk.write(idx, line);
    }

    #[test]
    fn arithmetic_and_print_roundtrip() {
        let mut chunk = Chunk::new();
        push_constant(&mut chunk, Value::Number(1.0), 1);
        push_constant(&mut chunk, Value::Number(2.0), 1);
        chunk.write(OpCode::Add as u8, 1);
        chunk.write(OpCode::Print as u8, 1);
        chunk.write(OpCode::Return as u8, 1);

        let mut vm = Vm::new();
        assert!(vm.run(&chunk).is_ok());
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        let mut chunk = Chunk::new();
        push_constant(&mut chunk, Value::Number(1.0), 3);
        let s = vm_intern_for_test();
        push_constant(&mut chunk, Value::Obj(s), 3);
        chunk.write(OpCode::Add as u8, 3);
        chunk.write(OpCode::Return as u8, 3);

        let mut vm = Vm::new();
        let err = vm.run(&chunk).unwrap_err();
        assert_eq!(err.message, "Operands must be numbers or strings.");
        assert_eq!(err.line, 3);
    }

    fn vm_intern_for_test() -> Rc<Obj> {
        Rc::new(Obj::new_string(b"x".to_vec().into_boxed_slice()))
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let mut vm = Vm::new();
        let mut chunk = Chunk::new();
        let name = vm.intern(b"y");
        push_constant(&mut chunk, Value::Obj(name), 5);
        chunk.write(OpCode::GetGlobal as u8, 5);
        chunk.write(OpCode::Return as u8, 5);

        let err = vm.run(&chunk).unwrap_err();
        assert_eq!(err.message, "Undefined variable 'y'.");
    }

    #[test]
    fn concatenation_interns_the_result() {
        let mut vm = Vm::new();
        let mut chunk = Chunk::new();
        let a = vm.intern(b"foo");
        let b = vm.intern(b"bar");
        push_constant(&mut chunk, Value::Obj(a), 1);
        push_constant(&mut chunk, Value::Obj(b), 1);
        chunk.write(OpCode::Add as u8, 1);
        chunk.write(OpCode::Return as u8, 1);

        assert!(vm.run(&chunk).is_ok());
        // The concatenation path allocated exactly one new object beyond
        // the two literal operands.
        assert_eq!(vm.object_count(), 3);
    }

    #[test]
    fn stack_overflow_is_a_detected_runtime_error() {
        let mut vm = Vm::new();
        let mut chunk = Chunk::new();
        for _ in 0..(STACK_MAX + 1) {
            push_constant(&mut chunk, Value::Number(1.0), 1);
        }
        chunk.write(OpCode::Return as u8, 1);
        let err = vm.run(&chunk).unwrap_err();
        assert_eq!(err.message, "Stack overflow.");
    }

    #[test]
    fn dropping_the_vm_releases_every_interned_string() {
        let mut vm = Vm::new();
        let obj = vm.intern(b"watch-me");
        let weak = Rc::downgrade(&obj);
        drop(obj);
        drop(vm);
        assert!(weak.upgrade().is_none());
    }
}
