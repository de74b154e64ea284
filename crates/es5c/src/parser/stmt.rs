//! Statement parser: recursive-descent grammar for everything above
//! expression level — blocks, declarations, the control-flow statements,
//! and the top-level/function-body statement list the driver's two passes
//! walk. Leans on `labels` for every break/continue/label bookkeeping
//! detail and on `expr`/`ivalue` for materializing any value a statement
//! needs in a register.

use crate::emitter::JumpSite;
use crate::error::{CompileError, CompileResult};
use crate::func_state::DeclKind;
use crate::ivalue::{ISpec, IValue, VarRef};
use crate::labels;
use crate::lexer::token::{Keyword, Literal, Punct, TokenKind, STRICT_RESERVED};
use crate::opcode::{call_flags, trycatch_flags, ExtraOp, Instruction, Opcode, RegConst};
use crate::resolver::{self, Resolution};
use crate::tracer::CompilerTracer;

use super::driver::BodyEnd;
use super::Parser;

/// Rejects binding names forbidden in strict-mode code: `eval`/`arguments`
/// and the additional future-reserved words ES5.1 adds under `"use
/// strict"`. Shared by parameter lists, `var`/`catch` bindings, and
/// function declaration names.
pub(crate) fn check_strict_binding_name(name: &str, line: u32) -> CompileResult<()> {
    if name == "eval" || name == "arguments" {
        return Err(
            CompileError::syntax(format!("`{name}` cannot be a binding name in strict mode"))
                .with_line(line),
        );
    }
    if STRICT_RESERVED.contains(&name) {
        return Err(
            CompileError::syntax(format!("`{name}` is a reserved word in strict mode"))
                .with_line(line),
        );
    }
    Ok(())
}

/// The left-hand side of a `for-in` head: either a fresh `var` binding or
/// an already-parsed expression (property reference or bare identifier).
enum ForInTarget {
    Var(String),
    Expr(IValue),
}

impl<'a, T: CompilerTracer> Parser<'a, T> {
    /// Walks a block of source elements until `terminator`, consuming one
    /// directive-prologue string literal at a time up front via
    /// [`Self::maybe_consume_directive`].
    pub(crate) fn parse_statement_list(&mut self, terminator: BodyEnd) -> CompileResult<()> {
        loop {
            match terminator {
                BodyEnd::Eof => {
                    if self.cursor.is_eof() {
                        break;
                    }
                }
                BodyEnd::RBrace => {
                    if self.cursor.current().is_punct(Punct::RBrace) || self.cursor.is_eof() {
                        break;
                    }
                }
            }
            self.maybe_consume_directive()?;
            self.parse_source_element(true)?;
        }
        Ok(())
    }

    /// Tentatively peeks at the current token to decide whether it opens
    /// another prologue directive; always restores the cursor afterward
    /// since the string literal itself still needs to be parsed as an
    /// ordinary expression statement. A directive's text is the *source*
    /// string, so an escaped `"use\x20strict"` never turns strict mode on
    /// even though its decoded value reads identically.
    fn maybe_consume_directive(&mut self) -> CompileResult<()> {
        if self.cur_func().flags.prologue_closed || !self.cur_func().flags.in_directive_prologue {
            return Ok(());
        }
        let mark = self.cursor.mark();
        let string_lit = match &self.cursor.current().kind {
            TokenKind::Literal(Literal::String { value, had_escape }) => {
                Some((value.clone(), *had_escape))
            }
            _ => None,
        };
        let Some((value, had_escape)) = string_lit else {
            self.cur_func().flags.prologue_closed = true;
            return Ok(());
        };
        self.cursor.advance()?;
        let terminator_follows = self.cursor.is_eof()
            || self.cursor.current().is_punct(Punct::Semi)
            || self.cursor.current().is_punct(Punct::RBrace)
            || self.cursor.current().newline_before;
        self.cursor.restore(mark)?;
        if !terminator_follows {
            self.cur_func().flags.prologue_closed = true;
            return Ok(());
        }
        if !had_escape && value == "use strict" {
            self.cur_func().flags.is_strict = true;
        }
        Ok(())
    }

    /// A source element is a statement, or (only directly inside a
    /// function body or the program/eval top level) a function
    /// declaration.
    fn parse_source_element(&mut self, top_level: bool) -> CompileResult<()> {
        if self.cursor.current().is_keyword(Keyword::Function) {
            return self.parse_function_declaration(top_level);
        }
        self.parse_statement()
    }

    fn parse_block(&mut self) -> CompileResult<()> {
        self.cursor.expect_punct(Punct::LBrace)?;
        while !self.cursor.current().is_punct(Punct::RBrace) && !self.cursor.is_eof() {
            self.parse_source_element(false)?;
        }
        self.cursor.expect_punct(Punct::RBrace)?;
        Ok(())
    }

    fn parse_statement(&mut self) -> CompileResult<()> {
        self.recursion_guard()?;
        let result = self.parse_statement_inner();
        self.recursion_release();
        result
    }

    fn parse_statement_inner(&mut self) -> CompileResult<()> {
        let kind = self.cursor.current().kind.clone();
        match kind {
            TokenKind::Punct(Punct::LBrace) => self.parse_block(),
            TokenKind::Punct(Punct::Semi) => {
                self.cursor.advance()?;
                Ok(())
            }
            TokenKind::Keyword(Keyword::Var) => self.parse_var_statement(),
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(None),
            TokenKind::Keyword(Keyword::While) => self.parse_while(None),
            TokenKind::Keyword(Keyword::For) => self.parse_for(None),
            TokenKind::Keyword(Keyword::Continue) => self.parse_continue_or_break(true),
            TokenKind::Keyword(Keyword::Break) => self.parse_continue_or_break(false),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::With) => self.parse_with(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(None),
            TokenKind::Keyword(Keyword::Throw) => self.parse_throw(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Debugger) => {
                self.cursor.advance()?;
                self.consume_semicolon()
            }
            TokenKind::Ident(_) => self.parse_labeled_or_expression_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> CompileResult<()> {
        if self.cursor.current().is_keyword(kw) {
            self.cursor.advance()
        } else {
            Err(CompileError::syntax(format!(
                "expected `{kw:?}`, found {:?}",
                self.cursor.current().kind
            ))
            .with_line(self.cursor.line()))
        }
    }

    fn parse_function_declaration(&mut self, top_level: bool) -> CompileResult<()> {
        let line = self.line();
        if !top_level && self.cur_func().flags.is_strict {
            return Err(CompileError::syntax(
                "function declarations are not allowed in blocks in strict mode",
            )
            .with_line(line));
        }
        self.cursor.advance()?; // `function`
        let name = self
            .cursor
            .current()
            .as_ident()
            .map(str::to_string)
            .ok_or_else(|| {
                CompileError::syntax("function declaration requires a name")
                    .with_line(self.cursor.line())
            })?;
        if self.cur_func().flags.is_strict {
            check_strict_binding_name(&name, line)?;
        }
        self.cursor.advance()?;
        let formals = self.parse_formal_parameters()?;
        let in_scanning = self.cur_func().flags.in_scanning;
        let local_idx = self.function_literal(Some(name.clone()), formals, false)?;
        if in_scanning {
            self.cur_func().record_decl(&name, DeclKind::Func(u32::from(local_idx)));
        }
        Ok(())
    }

    fn parse_var_statement(&mut self) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `var`
        loop {
            let name = self
                .cursor
                .current()
                .as_ident()
                .map(str::to_string)
                .ok_or_else(|| {
                    CompileError::syntax(format!(
                        "expected variable name, found {:?}",
                        self.cursor.current().kind
                    ))
                    .with_line(self.cursor.line())
                })?;
            if self.cur_func().flags.is_strict {
                check_strict_binding_name(&name, line)?;
            }
            self.cursor.advance()?;
            if self.cur_func().flags.in_scanning {
                self.cur_func().record_decl(&name, DeclKind::Var);
            }
            if self.cursor.eat_punct(Punct::Eq)? {
                let saved_allow_in = self.cur_func().allow_in;
                self.cur_func().allow_in = true;
                let value = self.parse_assignment_expression()?;
                self.cur_func().allow_in = saved_allow_in;
                self.emit_var_init(&name, value, line)?;
            }
            if !self.cursor.eat_punct(Punct::Comma)? {
                break;
            }
        }
        self.consume_semicolon()
    }

    /// Writes `value` into `name`'s binding: a direct move into its
    /// register when one is live, or a `PUTVAR` against the constant-pool
    /// name otherwise.
    fn emit_var_init(&mut self, name: &str, value: IValue, line: u32) -> CompileResult<()> {
        match resolver::lookup_active_register_binding(self.cur_func(), name) {
            Resolution::Register(reg) => {
                let mut e = self.emitter();
                let rc = value.to_regconst(&mut e, ISpec::AllowConst, line)?;
                super::expr::move_into(&mut e, reg, rc, line);
            }
            Resolution::Slow => {
                let name_idx = {
                    let mut e = self.emitter();
                    e.func.add_name_const(name, e.limits)?
                };
                let mut e = self.emitter();
                let rc = value.to_regconst(&mut e, ISpec::RequireTemp, line)?;
                let reg = match rc {
                    RegConst::Reg(r) => r,
                    RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
                };
                e.emit(Instruction::a_bc(Opcode::PutVar, reg, u32::from(name_idx), line));
            }
        }
        Ok(())
    }

    fn parse_if_statement(&mut self) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `if`
        self.cursor.expect_punct(Punct::LParen)?;
        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let test = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        self.cursor.expect_punct(Punct::RParen)?;
        let else_jump = {
            let mut e = self.emitter();
            let rc = test.to_regconst(&mut e, ISpec::RequireShort, line)?;
            e.emit(Instruction::abc3(Opcode::If, 1, rc.encode(), 0, line));
            e.emit_jump(Opcode::Jump, line)
        };
        self.parse_statement()?;
        if self.cursor.current().is_keyword(Keyword::Else) {
            let end_jump = {
                let mut e = self.emitter();
                e.emit_jump(Opcode::Jump, line)
            };
            {
                let mut e = self.emitter();
                e.patch_jump_here(else_jump);
            }
            self.cursor.advance()?; // `else`
            self.parse_statement()?;
            let mut e = self.emitter();
            e.patch_jump_here(end_jump);
        } else {
            let mut e = self.emitter();
            e.patch_jump_here(else_jump);
        }
        Ok(())
    }

    fn parse_while(&mut self, label: Option<String>) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `while`
        {
            let mut e = self.emitter();
            labels::push_label(&mut e, label, true, true, line);
        }
        let loop_start = {
            let e = self.emitter();
            e.func.pc()
        };
        self.cursor.expect_punct(Punct::LParen)?;
        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let test = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        self.cursor.expect_punct(Punct::RParen)?;
        let exit_jump = {
            let mut e = self.emitter();
            let rc = test.to_regconst(&mut e, ISpec::RequireShort, line)?;
            e.emit(Instruction::abc3(Opcode::If, 1, rc.encode(), 0, line));
            e.emit_jump(Opcode::Jump, line)
        };
        self.parse_statement()?;
        {
            let mut e = self.emitter();
            labels::patch_continues(&mut e, loop_start);
            e.emit_jump_to(loop_start, line);
            e.patch_jump_here(exit_jump);
        }
        let break_target = {
            let e = self.emitter();
            e.func.pc()
        };
        let mut e = self.emitter();
        labels::pop_label(&mut e, break_target, line);
        Ok(())
    }

    fn parse_do_while(&mut self, label: Option<String>) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `do`
        {
            let mut e = self.emitter();
            labels::push_label(&mut e, label, true, true, line);
        }
        let body_start = {
            let e = self.emitter();
            e.func.pc()
        };
        self.parse_statement()?;
        let cond_start = {
            let e = self.emitter();
            e.func.pc()
        };
        {
            let mut e = self.emitter();
            labels::patch_continues(&mut e, cond_start);
        }
        self.expect_keyword(Keyword::While)?;
        self.cursor.expect_punct(Punct::LParen)?;
        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let test = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        self.cursor.expect_punct(Punct::RParen)?;
        {
            let mut e = self.emitter();
            let rc = test.to_regconst(&mut e, ISpec::RequireShort, line)?;
            e.emit(Instruction::abc3(Opcode::If, 0, rc.encode(), 0, line));
            e.emit_jump_to(body_start, line);
        }
        self.cursor.eat_punct(Punct::Semi)?;
        let break_target = {
            let e = self.emitter();
            e.func.pc()
        };
        let mut e = self.emitter();
        labels::pop_label(&mut e, break_target, line);
        Ok(())
    }

    fn parse_for(&mut self, label: Option<String>) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `for`
        self.cursor.expect_punct(Punct::LParen)?;

        if self.cursor.current().is_keyword(Keyword::Var) {
            self.cursor.advance()?; // `var`
            let name = self
                .cursor
                .current()
                .as_ident()
                .map(str::to_string)
                .ok_or_else(|| {
                    CompileError::syntax("expected variable name in `for` head")
                        .with_line(self.cursor.line())
                })?;
            if self.cur_func().flags.is_strict {
                check_strict_binding_name(&name, line)?;
            }
            self.cursor.advance()?;
            if self.cur_func().flags.in_scanning {
                self.cur_func().record_decl(&name, DeclKind::Var);
            }
            if self.cursor.current().is_keyword(Keyword::In) {
                return self.finish_for_in(label, ForInTarget::Var(name), line);
            }
            if self.cursor.eat_punct(Punct::Eq)? {
                let saved_allow_in = self.cur_func().allow_in;
                self.cur_func().allow_in = false;
                let value = self.parse_assignment_expression()?;
                self.cur_func().allow_in = saved_allow_in;
                self.emit_var_init(&name, value, line)?;
            }
            while self.cursor.eat_punct(Punct::Comma)? {
                let name = self
                    .cursor
                    .current()
                    .as_ident()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        CompileError::syntax("expected variable name in `for` head")
                            .with_line(self.cursor.line())
                    })?;
                if self.cur_func().flags.is_strict {
                    check_strict_binding_name(&name, line)?;
                }
                self.cursor.advance()?;
                if self.cur_func().flags.in_scanning {
                    self.cur_func().record_decl(&name, DeclKind::Var);
                }
                if self.cursor.eat_punct(Punct::Eq)? {
                    let saved_allow_in = self.cur_func().allow_in;
                    self.cur_func().allow_in = false;
                    let value = self.parse_assignment_expression()?;
                    self.cur_func().allow_in = saved_allow_in;
                    self.emit_var_init(&name, value, line)?;
                }
            }
            self.cursor.expect_punct(Punct::Semi)?;
            return self.finish_for_cstyle(label, line);
        }

        if self.cursor.current().is_punct(Punct::Semi) {
            self.cursor.advance()?;
            return self.finish_for_cstyle(label, line);
        }

        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = false;
        let init = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        if self.cursor.current().is_keyword(Keyword::In) {
            return self.finish_for_in(label, ForInTarget::Expr(init), line);
        }
        {
            let mut e = self.emitter();
            let _ = init.to_regconst(&mut e, ISpec::AllowConst, line)?;
        }
        self.cursor.expect_punct(Punct::Semi)?;
        self.finish_for_cstyle(label, line)
    }

    /// The classic C-style head: condition tested up front, the update
    /// clause parsed once but jumped around on the loop's first entry so
    /// it only ever runs between iterations.
    fn finish_for_cstyle(&mut self, label: Option<String>, line: u32) -> CompileResult<()> {
        {
            let mut e = self.emitter();
            labels::push_label(&mut e, label, true, true, line);
        }
        let test_start = {
            let e = self.emitter();
            e.func.pc()
        };
        let exit_jump = if self.cursor.current().is_punct(Punct::Semi) {
            None
        } else {
            let saved_allow_in = self.cur_func().allow_in;
            self.cur_func().allow_in = true;
            let test = self.parse_expression()?;
            self.cur_func().allow_in = saved_allow_in;
            let mut e = self.emitter();
            let rc = test.to_regconst(&mut e, ISpec::RequireShort, line)?;
            e.emit(Instruction::abc3(Opcode::If, 1, rc.encode(), 0, line));
            Some(e.emit_jump(Opcode::Jump, line))
        };
        self.cursor.expect_punct(Punct::Semi)?;

        let to_body = {
            let mut e = self.emitter();
            e.emit_jump(Opcode::Jump, line)
        };
        let update_start = {
            let e = self.emitter();
            e.func.pc()
        };
        if !self.cursor.current().is_punct(Punct::RParen) {
            let saved_allow_in = self.cur_func().allow_in;
            self.cur_func().allow_in = true;
            let update = self.parse_expression()?;
            self.cur_func().allow_in = saved_allow_in;
            let mut e = self.emitter();
            let _ = update.to_regconst(&mut e, ISpec::AllowConst, line)?;
        }
        {
            let mut e = self.emitter();
            e.emit_jump_to(test_start, line);
            e.patch_jump_here(to_body);
        }
        self.cursor.expect_punct(Punct::RParen)?;

        self.parse_statement()?;

        {
            let mut e = self.emitter();
            labels::patch_continues(&mut e, update_start);
            e.emit_jump_to(update_start, line);
            if let Some(exit_jump) = exit_jump {
                e.patch_jump_here(exit_jump);
            }
        }
        let break_target = {
            let e = self.emitter();
            e.func.pc()
        };
        let mut e = self.emitter();
        labels::pop_label(&mut e, break_target, line);
        Ok(())
    }

    /// `for (... in ...)`, lowered as a test-at-top loop over
    /// `INITENUM`/`NEXTENUM` rather than splicing the LHS-write with
    /// `Emitter::insert_jump`: re-testing exhaustion before every
    /// iteration (including the first) gives the same observable
    /// semantics without needing to retrofit a jump into already-emitted
    /// code, and keeps this construction structurally identical to
    /// `while`.
    fn finish_for_in(
        &mut self,
        label: Option<String>,
        target: ForInTarget,
        line: u32,
    ) -> CompileResult<()> {
        self.expect_keyword(Keyword::In)?;
        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let obj_expr = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        self.cursor.expect_punct(Punct::RParen)?;

        let enum_base = {
            let mut e = self.emitter();
            let rc = obj_expr.to_regconst(&mut e, ISpec::RequireTemp, line)?;
            let obj_reg = match rc {
                RegConst::Reg(r) => r,
                RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
            };
            e.emit_extra(ExtraOp::InitEnum, obj_reg, 0, line);
            obj_reg
        };

        {
            let mut e = self.emitter();
            labels::push_label(&mut e, label, true, true, line);
        }
        let head_start = {
            let e = self.emitter();
            e.func.pc()
        };
        let key_reg = {
            let mut e = self.emitter();
            e.func.alloc_temp(e.limits)?
        };
        let exit_jump = {
            let mut e = self.emitter();
            e.emit_extra(ExtraOp::NextEnum, key_reg, enum_base, line);
            e.emit(Instruction::abc3(Opcode::If, 1, key_reg, 0, line));
            e.emit_jump(Opcode::Jump, line)
        };
        match &target {
            ForInTarget::Var(name) => {
                self.emit_var_init(name, IValue::plain_rc(RegConst::Reg(key_reg)), line)?;
            }
            ForInTarget::Expr(expr) => {
                let expr = expr.clone();
                self.emit_assignment_target(&expr, IValue::plain_rc(RegConst::Reg(key_reg)), line)?;
            }
        }
        self.parse_statement()?;
        {
            let mut e = self.emitter();
            labels::patch_continues(&mut e, head_start);
            e.emit_jump_to(head_start, line);
            e.patch_jump_here(exit_jump);
        }
        let break_target = {
            let e = self.emitter();
            e.func.pc()
        };
        let mut e = self.emitter();
        labels::pop_label(&mut e, break_target, line);
        Ok(())
    }

    /// Writes `value` into an already-parsed expression used as an
    /// assignment target (a for-in head, never a general LHS — general
    /// assignment goes through `expr`'s own private target validation).
    fn emit_assignment_target(&mut self, target: &IValue, value: IValue, line: u32) -> CompileResult<()> {
        match target {
            IValue::Var(VarRef::Reg(reg), _) => {
                let mut e = self.emitter();
                let rc = value.to_regconst(&mut e, ISpec::AllowConst, line)?;
                super::expr::move_into(&mut e, *reg, rc, line);
            }
            IValue::Var(VarRef::Name(name_idx), _) => {
                let mut e = self.emitter();
                let rc = value.to_regconst(&mut e, ISpec::RequireTemp, line)?;
                let reg = match rc {
                    RegConst::Reg(r) => r,
                    RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
                };
                e.emit(Instruction::a_bc(Opcode::PutVar, reg, u32::from(*name_idx), line));
            }
            IValue::Prop { base, key } => {
                let (base_s, key_s) = {
                    let mut e = self.emitter();
                    (e.to_short(*base, line)?, e.to_short(*key, line)?)
                };
                let mut e = self.emitter();
                let rc = value.to_regconst(&mut e, ISpec::RequireTemp, line)?;
                let reg = match rc {
                    RegConst::Reg(r) => r,
                    RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
                };
                e.emit(Instruction::abc3(Opcode::PutProp, reg, base_s.encode(), key_s.encode(), line));
            }
            _ => return Err(CompileError::syntax("invalid `for-in` left-hand side").with_line(line)),
        }
        Ok(())
    }

    fn parse_continue_or_break(&mut self, is_continue: bool) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `continue`/`break`
        let label = if !self.cursor.current().newline_before {
            self.cursor.current().as_ident().map(str::to_string)
        } else {
            None
        };
        if label.is_some() {
            self.cursor.advance()?;
        }
        {
            let mut e = self.emitter();
            labels::emit_break_or_continue(&mut e, label.as_deref(), is_continue, line)?;
        }
        self.consume_semicolon()
    }

    fn parse_return(&mut self) -> CompileResult<()> {
        let line = self.line();
        if !self.cur_func().flags.is_function {
            return Err(CompileError::syntax("`return` outside of a function").with_line(line));
        }
        self.cursor.advance()?; // `return`
        let has_value = !self.cursor.current().newline_before
            && !self.cursor.current().is_punct(Punct::Semi)
            && !self.cursor.current().is_punct(Punct::RBrace)
            && !self.cursor.is_eof();
        let value_reg = if has_value {
            let value = self.parse_expression()?;
            let mut e = self.emitter();
            let rc = value.to_regconst(&mut e, ISpec::RequireTemp, line)?;
            match rc {
                RegConst::Reg(r) => r,
                RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
            }
        } else {
            0
        };
        self.consume_semicolon()?;
        if self.cur_func().catch_depth == 0 {
            if let Some(last) = self.cur_func().code.last_mut() {
                if matches!(last.op, Opcode::Call | Opcode::CallI) {
                    last.a |= call_flags::TAILCALL;
                }
            }
        }
        let mut e = self.emitter();
        e.emit(Instruction::a_bc(Opcode::Return, value_reg, 0, line));
        Ok(())
    }

    fn parse_with(&mut self) -> CompileResult<()> {
        let line = self.line();
        if self.cur_func().flags.is_strict {
            return Err(CompileError::syntax("`with` statement not allowed in strict mode").with_line(line));
        }
        self.cursor.advance()?; // `with`
        self.cursor.expect_punct(Punct::LParen)?;
        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let obj = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        self.cursor.expect_punct(Punct::RParen)?;
        let obj_reg = {
            let mut e = self.emitter();
            let rc = obj.to_regconst(&mut e, ISpec::RequireTemp, line)?;
            match rc {
                RegConst::Reg(r) => r,
                RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
            }
        };
        let trycatch_pc = {
            let mut e = self.emitter();
            e.emit(Instruction::abc3(Opcode::TryCatch, obj_reg, 0, 0, line))
        };
        let catch_slot = {
            let mut e = self.emitter();
            e.emit_jump(Opcode::Jump, line)
        };
        let end_slot = {
            let mut e = self.emitter();
            e.emit_jump(Opcode::Jump, line)
        };
        self.cur_func().with_depth += 1;
        let body_result = self.parse_statement();
        self.cur_func().with_depth -= 1;
        body_result?;
        {
            let mut e = self.emitter();
            e.patch_jump_here(catch_slot);
            e.patch_jump_here(end_slot);
            e.func.code[trycatch_pc].a |= trycatch_flags::WITH_BINDING;
        }
        Ok(())
    }

    fn parse_switch(&mut self, label: Option<String>) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `switch`
        self.cursor.expect_punct(Punct::LParen)?;
        let saved_allow_in = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let disc = self.parse_expression()?;
        self.cur_func().allow_in = saved_allow_in;
        self.cursor.expect_punct(Punct::RParen)?;
        let disc_rc = {
            let mut e = self.emitter();
            disc.to_regconst(&mut e, ISpec::AllowConst, line)?
        };

        self.cursor.expect_punct(Punct::LBrace)?;
        let entry_jump = {
            let mut e = self.emitter();
            e.emit_jump(Opcode::Jump, line)
        };
        {
            let mut e = self.emitter();
            labels::push_label(&mut e, label, false, false, line);
        }

        let mut pending_notmatch: Vec<JumpSite> = Vec::new();
        let mut pending_fallthrough: Option<JumpSite> = None;
        let mut default_body_pc: Option<usize> = None;
        let mut first_case_test: Option<usize> = None;
        let mut seen_default = false;

        while !self.cursor.current().is_punct(Punct::RBrace) && !self.cursor.is_eof() {
            if self.cursor.current().is_keyword(Keyword::Default) {
                if seen_default {
                    return Err(
                        CompileError::syntax("more than one `default` clause in `switch`")
                            .with_line(self.line()),
                    );
                }
                seen_default = true;
                self.cursor.advance()?;
                self.cursor.expect_punct(Punct::Colon)?;
                let body_start = {
                    let e = self.emitter();
                    e.func.pc()
                };
                if let Some(site) = pending_fallthrough.take() {
                    let mut e = self.emitter();
                    e.patch_jump(site, body_start);
                }
                default_body_pc = Some(body_start);
            } else {
                self.expect_keyword(Keyword::Case)?;
                let case_line = self.line();
                let test_start = {
                    let e = self.emitter();
                    e.func.pc()
                };
                if first_case_test.is_none() {
                    first_case_test = Some(test_start);
                }
                {
                    let mut e = self.emitter();
                    for site in pending_notmatch.drain(..) {
                        e.patch_jump(site, test_start);
                    }
                }
                let case_val = self.parse_expression()?;
                self.cursor.expect_punct(Punct::Colon)?;
                let test_reg = {
                    let mut e = self.emitter();
                    let case_rc = case_val.to_regconst(&mut e, ISpec::AllowConst, case_line)?;
                    let case_rc = e.to_short(case_rc, case_line)?;
                    let disc_s = e.to_short(disc_rc, case_line)?;
                    let t = e.func.alloc_temp(e.limits)?;
                    e.emit(Instruction::abc3(Opcode::SEq, t, disc_s.encode(), case_rc.encode(), case_line));
                    t
                };
                let notmatch_site = {
                    let mut e = self.emitter();
                    e.emit(Instruction::abc3(Opcode::If, 1, test_reg, 0, case_line));
                    e.emit_jump(Opcode::Jump, case_line)
                };
                pending_notmatch.push(notmatch_site);
                let body_start = {
                    let e = self.emitter();
                    e.func.pc()
                };
                if let Some(site) = pending_fallthrough.take() {
                    let mut e = self.emitter();
                    e.patch_jump(site, body_start);
                }
            }

            while !self.cursor.current().is_keyword(Keyword::Case)
                && !self.cursor.current().is_keyword(Keyword::Default)
                && !self.cursor.current().is_punct(Punct::RBrace)
                && !self.cursor.is_eof()
            {
                self.parse_source_element(false)?;
            }
            let fall_line = self.line();
            let mut e = self.emitter();
            pending_fallthrough = Some(e.emit_jump(Opcode::Jump, fall_line));
        }
        self.cursor.expect_punct(Punct::RBrace)?;

        let end_pc = {
            let e = self.emitter();
            e.func.pc()
        };
        if let Some(site) = pending_fallthrough.take() {
            let mut e = self.emitter();
            e.patch_jump(site, end_pc);
        }
        {
            let target = default_body_pc.unwrap_or(end_pc);
            let mut e = self.emitter();
            for site in pending_notmatch.drain(..) {
                e.patch_jump(site, target);
            }
        }
        {
            let entry_target = first_case_test.or(default_body_pc).unwrap_or(end_pc);
            let mut e = self.emitter();
            e.patch_jump(entry_jump, entry_target);
        }
        let mut e = self.emitter();
        let t = e.func.pc();
        labels::pop_label(&mut e, t, line);
        Ok(())
    }

    fn parse_throw(&mut self) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `throw`
        if self.cursor.current().newline_before {
            return Err(
                CompileError::syntax("no line break allowed between `throw` and its expression")
                    .with_line(line),
            );
        }
        let value = self.parse_expression()?;
        {
            let mut e = self.emitter();
            let rc = value.to_regconst(&mut e, ISpec::RequireTemp, line)?;
            let reg = match rc {
                RegConst::Reg(r) => r,
                RegConst::Const(_) => unreachable!("RequireTemp always yields a register"),
            };
            e.emit(Instruction::a_bc(Opcode::Throw, reg, 0, line));
        }
        self.consume_semicolon()
    }

    fn parse_try(&mut self) -> CompileResult<()> {
        let line = self.line();
        self.cursor.advance()?; // `try`
        let trycatch_pc = {
            let mut e = self.emitter();
            e.emit(Instruction::abc3(Opcode::TryCatch, 0, 0, 0, line))
        };
        let catch_slot = {
            let mut e = self.emitter();
            e.emit_jump(Opcode::Jump, line)
        };
        let finally_slot = {
            let mut e = self.emitter();
            e.emit_jump(Opcode::Jump, line)
        };

        self.cur_func().catch_depth += 1;
        let try_result = self.parse_block();
        self.cur_func().catch_depth -= 1;
        try_result?;
        {
            let mut e = self.emitter();
            e.emit_extra(ExtraOp::EndTry, 0, 0, line);
        }

        let mut flags = 0u16;
        if self.cursor.current().is_keyword(Keyword::Catch) {
            flags |= trycatch_flags::HAVE_CATCH;
            self.cursor.advance()?;
            self.cursor.expect_punct(Punct::LParen)?;
            let param = self
                .cursor
                .current()
                .as_ident()
                .map(str::to_string)
                .ok_or_else(|| {
                    CompileError::syntax("expected catch parameter name").with_line(self.cursor.line())
                })?;
            if self.cur_func().flags.is_strict {
                check_strict_binding_name(&param, line)?;
            }
            self.cursor.advance()?;
            self.cursor.expect_punct(Punct::RParen)?;

            let name_idx = {
                let mut e = self.emitter();
                e.func.add_name_const(&param, e.limits)?
            };
            {
                let mut e = self.emitter();
                e.patch_jump_here(catch_slot);
                e.func.code[trycatch_pc].b = name_idx;
            }
            flags |= trycatch_flags::CATCH_BINDING;

            let prior = self.cur_func().varmap.get(&param).copied();
            self.cur_func().mark_slow(&param);
            self.cur_func().catch_depth += 1;
            let catch_result = self.parse_block();
            self.cur_func().catch_depth -= 1;
            match prior {
                Some(Some(r)) => {
                    self.cur_func().bind_register(&param, r);
                }
                Some(None) => {
                    self.cur_func().mark_slow(&param);
                }
                None => {
                    self.cur_func().varmap.remove(&param);
                }
            }
            catch_result?;
            let mut e = self.emitter();
            e.emit_extra(ExtraOp::EndCatch, 0, 0, line);
        } else {
            let mut e = self.emitter();
            e.patch_jump_here(catch_slot);
        }

        if self.cursor.current().is_keyword(Keyword::Finally) {
            flags |= trycatch_flags::HAVE_FINALLY;
            self.cursor.advance()?;
            {
                let mut e = self.emitter();
                e.patch_jump_here(finally_slot);
            }
            self.cur_func().catch_depth += 1;
            let fin_result = self.parse_block();
            self.cur_func().catch_depth -= 1;
            fin_result?;
            let fin_reg = {
                let mut e = self.emitter();
                e.func.alloc_temp(e.limits)?
            };
            let mut e = self.emitter();
            e.emit_extra(ExtraOp::EndFin, fin_reg, 0, line);
        } else {
            let mut e = self.emitter();
            e.patch_jump_here(finally_slot);
        }

        if flags & (trycatch_flags::HAVE_CATCH | trycatch_flags::HAVE_FINALLY) == 0 {
            return Err(
                CompileError::syntax("`try` statement must have a `catch` or `finally` clause")
                    .with_line(line),
            );
        }
        self.cur_func().code[trycatch_pc].a |= flags;
        Ok(())
    }

    fn parse_labeled_or_expression_statement(&mut self) -> CompileResult<()> {
        let mark = self.cursor.mark();
        let name = self.cursor.current().as_ident().map(str::to_string);
        if let Some(name) = name {
            self.cursor.advance()?;
            if self.cursor.current().is_punct(Punct::Colon) {
                self.cursor.advance()?;
                return self.parse_labeled_target(name);
            }
            self.cursor.restore(mark)?;
        }
        self.parse_expression_statement()
    }

    fn parse_labeled_target(&mut self, label: String) -> CompileResult<()> {
        let line = self.line();
        if self
            .cur_func()
            .labelinfos
            .iter()
            .any(|l| l.name.as_deref() == Some(label.as_str()))
        {
            return Err(CompileError::syntax(format!("label `{label}` is already defined")).with_line(line));
        }
        match &self.cursor.current().kind {
            TokenKind::Keyword(Keyword::While) => self.parse_while(Some(label)),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(Some(label)),
            TokenKind::Keyword(Keyword::For) => self.parse_for(Some(label)),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(Some(label)),
            _ => {
                {
                    let mut e = self.emitter();
                    labels::push_label(&mut e, Some(label), false, false, line);
                }
                self.parse_statement()?;
                let break_target = {
                    let e = self.emitter();
                    e.func.pc()
                };
                let mut e = self.emitter();
                labels::pop_label(&mut e, break_target, line);
                Ok(())
            }
        }
    }

    fn parse_expression_statement(&mut self) -> CompileResult<()> {
        let line = self.line();
        let value = self.parse_expression()?;
        self.consume_semicolon()?;
        let dst = self.cur_func().reg_stmt_value;
        if let Some(reg) = dst {
            let mut e = self.emitter();
            let rc = value.to_regconst(&mut e, ISpec::AllowConst, line)?;
            super::expr::move_into(&mut e, reg, rc, line);
        } else {
            let mut e = self.emitter();
            let _ = value.to_regconst(&mut e, ISpec::AllowConst, line)?;
        }
        Ok(())
    }
}
