//! ember-compile — the single-pass Pratt-precedence compiler: source
//! bytes plus a borrowed [`ember_vm::Vm`] in, a [`ember_vm::Chunk`] of
//! bytecode out, no AST in between.

mod compiler;
mod locals;
mod precedence;

pub use compiler::{compile, CompileFailed};
