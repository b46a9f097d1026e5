//! Bytecode instruction set.
//!
//! Each variant is a single byte, optionally followed by a one-byte
//! constant/slot operand or a two-byte big-endian jump offset — encoded
//! into [`crate::chunk::Chunk::code`] by the compiler and decoded back by
//! the VM's fetch loop. `num_enum` gives the enum <-> `u8` conversions
//! without a hand-rolled `match`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Pop,
    DefineGlobal,
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    Jmp,
    Jnt,
    Jl,
    Return,
}
