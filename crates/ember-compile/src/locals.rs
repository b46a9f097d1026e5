//! Compile-time lexical-scope bookkeeping: the local variable stack and
//! the per-loop break-jump lists.

use ember_lex::Token;

/// One-byte operand encoding caps the number of locals visible at once.
pub const MAX_LOCALS: usize = 256;

/// A declared local: the token that named it, and the scope depth it was
/// declared at. `depth == -1` marks "declared but its initializer hasn't
/// run yet" — the sentinel `resolve_local` checks to reject `var x = x;`.
pub struct Local {
    pub name: Token,
    pub depth: i32,
}

pub const UNINITIALIZED: i32 = -1;
