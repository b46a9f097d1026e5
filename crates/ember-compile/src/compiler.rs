//! The single-pass compiler: a Pratt-precedence parser that emits bytecode
//! directly into a [`Chunk`] as it parses — there is no AST stage in
//! between.

use ember_lex::{Scanner, Token, TokenKind};
use ember_util::Span;
use ember_vm::{Chunk, OpCode, Value, Vm};
use thiserror::Error;

use crate::locals::{Local, MAX_LOCALS, UNINITIALIZED};
use crate::precedence::{precedence_of, Precedence};

/// Sentinel returned once parsing ends with at least one reported error.
/// Every diagnostic has already gone to stderr via [`Compiler::error_at`]
/// by the time this is constructed — it exists purely so callers can use
/// `?` instead of matching a `bool`.
#[derive(Debug, Error)]
#[error("compilation failed")]
pub struct CompileFailed;

/// Parses `source` to completion, emitting bytecode into a fresh [`Chunk`]
/// and interning every string/identifier constant through `vm`. Returns
/// the chunk only if no compile error was reported; diagnostics are
/// printed to stderr as they're found (possibly several per call — error
/// recovery reports as many independent errors as it can).
pub fn compile(source: &[u8], vm: &mut Vm) -> Result<Chunk, CompileFailed> {
    let mut compiler = Compiler::new(source, vm);
    compiler.advance();
    while !compiler.advance_if_match(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_return();

    if compiler.had_err {
        Err(CompileFailed)
    } else {
        Ok(compiler.chunk)
    }
}

pub struct Compiler<'src, 'vm> {
    source: &'src [u8],
    scanner: Scanner<'src>,
    vm: &'vm mut Vm,
    chunk: Chunk,

    current: Token,
    previous: Token,
    had_err: bool,
    panic_mode: bool,

    locals: Vec<Local>,
    scope_depth: i32,
    /// One entry per currently-active loop, holding the offsets of every
    /// forward `break;` jump seen inside it so far — patched all at once
    /// when the loop ends. A single slot per loop would let a second
    /// `break` overwrite the first; storing a list per loop instead lets
    /// every break in a loop body patch correctly.
    loop_breaks: Vec<Vec<usize>>,
    /// The scope depth each active loop started at, recorded by
    /// `begin_loop` before any loop-local scope (e.g. a `for` initializer)
    /// is opened. `break_stmt` pops every local deeper than this before
    /// jumping, so locals the loop body declared don't linger on the
    /// operand stack past the jump.
    loop_depths: Vec<i32>,
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    fn new(source: &'src [u8], vm: &'vm mut Vm) -> Self {
        let sentinel = Token::new(TokenKind::Eof, Span::empty(1));
        Self {
            source,
            scanner: Scanner::new(source),
            vm,
            chunk: Chunk::new(),
            current: sentinel,
            previous: sentinel,
            had_err: false,
            panic_mode: false,
            locals: Vec::with_capacity(MAX_LOCALS),
            scope_depth: 0,
            loop_breaks: Vec::new(),
            loop_depths: Vec::new(),
        }
    }

    // ---- token stream -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.scanner.error_message();
            self.error_at(self.current, message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance_if_match(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ---- diagnostics ---------------------------------------------------

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_err = true;

        eprint!("[line {}] Error", token.line());
        match token.kind {
            TokenKind::Eof => eprint!(" at end"),
            TokenKind::Error => {}
            _ => {
                let lexeme = String::from_utf8_lossy(token.lexeme(self.source));
                eprint!(" at '{lexeme}'");
            }
        }
        eprintln!(": {message}");
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission ---------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line();
        self.chunk.write(byte, line);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    /// Emits a forward jump with a placeholder 16-bit operand, returning
    /// the address of that operand for [`Compiler::patch_jump`] to fill in
    /// later.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_byte(op as u8);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.len() - 2
    }

    /// Backfills the placeholder at `offset` with the distance from just
    /// past the operand to the current end of the chunk.
    fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        self.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        self.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    /// Emits `OP_JL`, the backward jump used to close a loop body.
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_byte(OpCode::Jl as u8);
        let offset = self.chunk.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn emit_return(&mut self) {
        self.emit_byte(OpCode::Return as u8);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let idx = self.chunk.add_constant(value);
        if idx > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        idx as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_bytes(OpCode::Constant as u8, idx);
    }

    // ---- scopes and loops ------------------------------------------------

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            self.emit_byte(OpCode::Pop as u8);
            self.locals.pop();
        }
    }

    fn begin_loop(&mut self) {
        self.loop_breaks.push(Vec::new());
        self.loop_depths.push(self.scope_depth);
    }

    fn end_loop(&mut self) {
        let breaks = self.loop_breaks.pop().expect("end_loop without matching begin_loop");
        self.loop_depths.pop().expect("end_loop without matching begin_loop");
        for offset in breaks {
            self.patch_jump(offset);
        }
    }

    fn is_in_loop(&self) -> bool {
        !self.loop_breaks.is_empty()
    }

    // ---- expressions ----------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The Pratt-parsing core: consume one token, run its prefix action,
    /// then keep consuming and running infix actions as long as the
    /// lookahead binds at least as tightly as `precedence`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= precedence_of(self.current.kind) {
            self.advance();
            self.infix_rule(self.previous.kind, can_assign);
        }

        // No parse function is associated with `=` itself, so the loop
        // above never consumes it; a leftover `=` here targets something
        // that wasn't an assignable lvalue.
        if can_assign && self.advance_if_match(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(can_assign),
            TokenKind::Minus | TokenKind::Bang => self.unary(can_assign),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::String => self.string(can_assign),
            TokenKind::Number => self.number(can_assign),
            TokenKind::False | TokenKind::Nil | TokenKind::True => self.literal(can_assign),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(can_assign),
            TokenKind::And => self.and_(can_assign),
            TokenKind::Or => self.or_(can_assign),
            _ => {}
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme(self.source);
        let text = std::str::from_utf8(lexeme).expect("scanner only admits ASCII digits and '.'");
        let value: f64 = text.parse().expect("scanner guarantees a well-formed number literal");
        self.emit_constant(Value::Number(value));
    }

    /// The lexeme minus its surrounding quotes, interned through the VM's
    /// string heap so the constant is the exact same object any later
    /// equal string (literal or concatenation result) resolves to.
    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme(self.source);
        let inner = &lexeme[1..lexeme.len() - 1];
        let interned = self.vm.intern(inner);
        self.emit_constant(Value::Obj(interned));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_byte(OpCode::False as u8),
            TokenKind::Nil => self.emit_byte(OpCode::Nil as u8),
            TokenKind::True => self.emit_byte(OpCode::True as u8),
            _ => unreachable!("literal() dispatched on a non-literal token"),
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_byte(OpCode::Not as u8),
            TokenKind::Minus => self.emit_byte(OpCode::Negate as u8),
            _ => unreachable!("unary() dispatched on a non-unary token"),
        }
    }

    /// `!=`/`>=`/`<=` lower to a sibling opcode plus `OP_NOT`: fewer
    /// opcodes for the VM to implement, identical semantics.
    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let next_precedence = precedence_of(operator).next();
        self.parse_precedence(next_precedence);

        match operator {
            TokenKind::BangEqual => self.emit_bytes(OpCode::Equal as u8, OpCode::Not as u8),
            TokenKind::EqualEqual => self.emit_byte(OpCode::Equal as u8),
            TokenKind::Greater => self.emit_byte(OpCode::Greater as u8),
            TokenKind::GreaterEqual => self.emit_bytes(OpCode::Less as u8, OpCode::Not as u8),
            TokenKind::Less => self.emit_byte(OpCode::Less as u8),
            TokenKind::LessEqual => self.emit_bytes(OpCode::Greater as u8, OpCode::Not as u8),
            TokenKind::Plus => self.emit_byte(OpCode::Add as u8),
            TokenKind::Minus => self.emit_byte(OpCode::Subtract as u8),
            TokenKind::Star => self.emit_byte(OpCode::Multiply as u8),
            TokenKind::Slash => self.emit_byte(OpCode::Divide as u8),
            _ => unreachable!("binary() dispatched on a non-binary token"),
        }
    }

    /// Short-circuit `and`: if the left side is falsey, jump straight past
    /// the right side, leaving the falsey left value as the result.
    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::Jnt);
        self.emit_byte(OpCode::Pop as u8);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    /// Short-circuit `or`: if the left side is truthy, jump straight past
    /// the right side.
    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::Jnt);
        let end_jump = self.emit_jump(OpCode::Jmp);
        self.patch_jump(else_jump);
        self.emit_byte(OpCode::Pop as u8);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    // ---- variables --------------------------------------------------

    fn identifier_constant(&mut self, name: Token) -> u8 {
        let bytes = name.lexeme(self.source).to_vec();
        let interned = self.vm.intern(&bytes);
        self.make_constant(Value::Obj(interned))
    }

    fn identifiers_equal(&self, a: &Token, b: &Token) -> bool {
        a.lexeme(self.source) == b.lexeme(self.source)
    }

    fn resolve_local(&mut self, name: &Token) -> Option<u8> {
        for i in (0..self.locals.len()).rev() {
            let local = &self.locals[i];
            if self.identifiers_equal(name, &local.name) {
                if local.depth == UNINITIALIZED {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    fn add_local(&mut self, name: Token) {
        if self.locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.locals.push(Local { name, depth: UNINITIALIZED });
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        let name = self.previous;
        for i in (0..self.locals.len()).rev() {
            let local = &self.locals[i];
            if local.depth != UNINITIALIZED && local.depth < self.scope_depth {
                break;
            }
            if self.identifiers_equal(&name, &local.name) {
                self.error("A variable with this name is already in the scope.");
            }
        }
        self.add_local(name);
    }

    fn named_variable(&mut self, name: Token, can_assign: bool) {
        let (get_op, set_op, arg) = match self.resolve_local(&name) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let idx = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, idx)
            }
        };

        // Assignment is parsed here, by the variable rule itself, rather
        // than by a generic infix rule — `=` has no entry in the
        // precedence table at all.
        if can_assign && self.advance_if_match(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op as u8, arg);
        } else {
            self.emit_bytes(get_op as u8, arg);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous;
        self.named_variable(name, can_assign);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }
        let name = self.previous;
        self.identifier_constant(name)
    }

    fn mark_initialized(&mut self) {
        let depth = self.scope_depth;
        self.locals.last_mut().expect("mark_initialized with no pending local").depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal as u8, global);
    }

    // ---- statements -------------------------------------------------

    fn declaration(&mut self) {
        if self.advance_if_match(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.advance_if_match(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil as u8);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.advance_if_match(TokenKind::Print) {
            self.print_stmt();
        } else if self.advance_if_match(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.advance_if_match(TokenKind::If) {
            self.if_stmt();
        } else if self.advance_if_match(TokenKind::While) {
            self.while_stmt();
        } else if self.advance_if_match(TokenKind::For) {
            self.for_stmt();
        } else if self.advance_if_match(TokenKind::Break) {
            self.break_stmt();
        } else {
            self.expression_stmt();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_stmt(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print as u8);
    }

    fn expression_stmt(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop as u8);
    }

    fn if_stmt(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::Jnt);
        self.emit_byte(OpCode::Pop as u8);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jmp);
        self.patch_jump(then_jump);
        self.emit_byte(OpCode::Pop as u8);

        if self.advance_if_match(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_stmt(&mut self) {
        self.begin_loop();
        let loop_start = self.chunk.len();

        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::Jnt);
        self.emit_byte(OpCode::Pop as u8);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(OpCode::Pop as u8);
        self.end_loop();
    }

    fn for_stmt(&mut self) {
        self.begin_loop();
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.advance_if_match(TokenKind::Semicolon) {
            // no initializer clause
        } else if self.advance_if_match(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_stmt();
        }

        let mut loop_start = self.chunk.len();
        let mut exit_jump = None;
        if !self.advance_if_match(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';'.");

            exit_jump = Some(self.emit_jump(OpCode::Jnt));
            self.emit_byte(OpCode::Pop as u8);
        }

        if !self.advance_if_match(TokenKind::RightParen) {
            // Jump over the increment on first entry; the back-edge from
            // the body re-enters here, runs the increment, then falls
            // through to the condition test above.
            let body_jump = self.emit_jump(OpCode::Jmp);
            let increment_start = self.chunk.len();
            self.expression();
            self.emit_byte(OpCode::Pop as u8);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_byte(OpCode::Pop as u8);
        }
        self.end_scope();
        self.end_loop();
    }

    fn break_stmt(&mut self) {
        self.consume(TokenKind::Semicolon, "Expected ';' after 'break'.");
        if !self.is_in_loop() {
            self.error("'break' can only be placed inside a loop.");
            return;
        }

        // Pop every local the loop body declared (without dropping them
        // from `self.locals` — the loop's own `end_scope` still owns that
        // bookkeeping) so the jump below lands with the same stack depth
        // the loop's normal exit path leaves behind.
        let loop_depth = *self.loop_depths.last().expect("is_in_loop just checked non-empty");
        for local in self.locals.iter().rev() {
            if local.depth <= loop_depth {
                break;
            }
            self.emit_byte(OpCode::Pop as u8);
        }

        let jump = self.emit_jump(OpCode::Jmp);
        self.loop_breaks.last_mut().expect("is_in_loop just checked non-empty").push(jump);
    }
}
