//! Parser. Split by concern the way a large dispatch surface is usually
//! broken up across several files, each one topic: `expr.rs` is the Pratt
//! expression parser, `stmt.rs` the statement grammar, `driver.rs` the
//! two-pass orchestration and the public `compile` entry point. All three
//! are `impl` blocks on the one [`Parser`] type defined here.

pub mod driver;
pub mod expr;
pub mod stmt;

use crate::cursor::TokenCursor;
use crate::emitter::Emitter;
use crate::error::{CompileError, CompileResult};
use crate::func_state::FuncState;
use crate::lexer::token::Punct;
use crate::limits::Limits;
use crate::tracer::CompilerTracer;

/// Compile-time flags the host passes into the top-level entry point
///.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileFlags {
    /// Compiling the body of an indirect/direct `eval` call rather than a
    /// top-level program.
    pub is_eval: bool,
    /// The surrounding context is already strict (e.g. a direct `eval`
    /// called from strict code, or a function expression nested in
    /// strict code), even before this source's own directive prologue is
    /// scanned.
    pub is_strict: bool,
    /// Compiling a standalone function expression (as opposed to a
    /// program or eval body) — affects whether a bare `return` at the
    /// top level is a syntax error.
    pub is_funcexpr: bool,
}

pub struct Parser<'a, T: CompilerTracer> {
    pub cursor: TokenCursor<'a>,
    pub limits: Limits,
    pub tracer: T,
    /// Function-state stack; the last element is the function currently
    /// being compiled.
    pub funcs: Vec<FuncState>,
    pub file_name: Option<String>,
}

impl<'a, T: CompilerTracer> Parser<'a, T> {
    pub fn new(src: &'a str, file_name: Option<String>, limits: Limits, tracer: T) -> CompileResult<Self> {
        let cursor = TokenCursor::new(src)?;
        Ok(Self { cursor, limits, tracer, funcs: Vec::new(), file_name })
    }

    #[must_use]
    pub fn cur_func(&mut self) -> &mut FuncState {
        self.funcs.last_mut().expect("at least one function state must be active while parsing")
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.cursor.line()
    }

    /// Borrows an [`Emitter`] over the current function state for the
    /// duration of one emission call.
    pub fn emitter(&mut self) -> Emitter<'_> {
        let limits = &self.limits;
        Emitter::new(self.funcs.last_mut().expect("active function"), limits, &mut self.tracer)
    }

    /// Automatic semicolon insertion: a
    /// statement terminator is satisfied by an explicit `;`, a following
    /// `}`, end-of-input, or a line terminator having appeared before the
    /// current token.
    pub fn consume_semicolon(&mut self) -> CompileResult<()> {
        if self.cursor.eat_punct(Punct::Semi)? {
            return Ok(());
        }
        if self.cursor.is_eof() || self.cursor.current().is_punct(Punct::RBrace) || self.cursor.current().newline_before
        {
            return Ok(());
        }
        Err(CompileError::syntax(format!("expected `;`, found {}", self.cursor.current().kind))
            .with_line(self.line()))
    }

    pub fn recursion_guard(&mut self) -> CompileResult<()> {
        let limit = self.limits.recursion_limit;
        let func = self.cur_func();
        func.recursion_depth += 1;
        if func.recursion_depth > limit {
            return Err(CompileError::range("expression or statement nesting too deep").with_line(self.line()));
        }
        Ok(())
    }

    pub fn recursion_release(&mut self) {
        self.cur_func().recursion_depth -= 1;
    }
}
