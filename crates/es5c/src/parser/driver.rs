//! Two-pass compilation driver and the crate's public
//! [`compile`] entry point.
//!
//! Pass 1 walks the body once with the ordinary statement/expression
//! parser, collecting `var`/function declarations into [`FuncState::decls`]
//! and fully, recursively compiling every nested function literal it meets
//! (so [`FuncState::funcs`] holds finished templates, not just positions).
//! Its code buffer is pure scratch — [`FuncState::reset_for_pass2`] clears
//! it before pass 2 starts. Pass 2 rewinds the cursor to the body's start,
//! binds formals and hoisted declarations to registers in one prologue
//! pass, then re-runs the *same* statement/expression parser, this time
//! for real: identifiers resolve to the registers pass 2's prologue bound,
//! and a nested function literal is skipped straight past via its recorded
//! [`crate::cursor::CursorMark`] instead of being recompiled.

use crate::error::{CompileError, CompileResult};
use crate::func_state::{DeclKind, FuncState, NestedFunc};
use crate::lexer::token::Punct;
use crate::limits::Limits;
use crate::opcode::{ExtraOp, Instruction, Opcode};
use crate::template::{build_pc2line, pack_instruction, FunctionTemplate, TemplateFlags};
use crate::tracer::{CompilerTracer, NoopTracer};
use crate::value::Value;

use super::{CompileFlags, Parser};

/// Compiles a complete source text into its top-level [`FunctionTemplate`]
///. `flags.is_funcexpr` is meaningless at this entry
/// point (there is no enclosing expression context) and is ignored.
pub fn compile(source: &str, file_name: Option<String>, flags: CompileFlags) -> CompileResult<FunctionTemplate> {
    let mut parser = Parser::new(source, file_name.clone(), Limits::default(), NoopTracer)?;
    parser.compile_function(Vec::new(), None, false, flags.is_strict, false, flags.is_eval)
}

/// Like [`compile`] but with caller-supplied [`Limits`] and a
/// [`CompilerTracer`], for embedding hosts and tests that want to observe
/// or bound compilation.
pub fn compile_with<T: CompilerTracer>(
    source: &str,
    file_name: Option<String>,
    flags: CompileFlags,
    limits: Limits,
    tracer: T,
) -> CompileResult<FunctionTemplate> {
    let mut parser = Parser::new(source, file_name, limits, tracer)?;
    parser.compile_function(Vec::new(), None, false, flags.is_strict, false, flags.is_eval)
}

impl<'a, T: CompilerTracer> Parser<'a, T> {
    /// Compiles one function body (or the top-level program/eval body) in
    /// full: pass 1 then pass 2, ending with the peephole pass and template
    /// packing.
    ///
    /// The cursor must be positioned at the first token of the body
    /// (right after a function's opening `{`, or at the very start of a
    /// program/eval source); on return it sits just past the body's `}`
    /// (function bodies) or at EOF (program/eval).
    pub(crate) fn compile_function(
        &mut self,
        formals: Vec<String>,
        name: Option<String>,
        is_function: bool,
        outer_strict: bool,
        is_funcexpr: bool,
        is_eval: bool,
    ) -> CompileResult<FunctionTemplate> {
        let start_mark = self.cursor.mark();
        let terminator = if is_function { BodyEnd::RBrace } else { BodyEnd::Eof };

        self.funcs.push(FuncState::new(is_function, outer_strict));
        {
            let func = self.cur_func();
            func.argnames = formals.clone();
            func.name = name.clone();
            func.flags.is_global = !is_function && !is_eval;
            func.flags.is_eval = is_eval;
            func.flags.is_decl = is_function && !is_funcexpr;
            func.flags.in_directive_prologue = true;
        }

        self.tracer.on_pass_start(1, self.funcs.len() as u32);
        self.reserve_toplevel_shuffle_regs()?;
        self.parse_statement_list(terminator)?;
        self.check_strictness_retroactive(&formals, name.as_deref())?;

        self.cursor.restore(start_mark)?;
        {
            let func = self.cur_func();
            func.reset_for_pass2();
            func.argnames = formals.clone();
        }
        self.bind_prologue()?;
        self.tracer.on_pass_start(2, self.funcs.len() as u32);
        self.parse_statement_list(terminator)?;

        if terminator == BodyEnd::RBrace {
            self.cursor.expect_punct(Punct::RBrace)?;
        }

        let line = self.line();
        {
            let ret_reg = self.cur_func().reg_stmt_value.unwrap_or(0);
            let mut e = self.emitter();
            e.emit(Instruction::a_bc(Opcode::Return, ret_reg, 0, line));
            e.peephole();
        }

        let func = self.funcs.pop().expect("pushed at the top of this call");
        Ok(self.build_template(func, name))
    }

    /// Argument and function-name checks that can only run once pass 1 has
    /// settled whether the body is strict: formal names may not
    /// repeat, and neither a formal nor the function's own name may be
    /// `eval`/`arguments`/a strict-reserved word.
    fn check_strictness_retroactive(&mut self, formals: &[String], name: Option<&str>) -> CompileResult<()> {
        if !self.cur_func().flags.is_strict {
            return Ok(());
        }
        let line = self.line();
        for (i, formal) in formals.iter().enumerate() {
            super::stmt::check_strict_binding_name(formal, line)?;
            if formals[..i].contains(formal) {
                return Err(CompileError::syntax(format!(
                    "duplicate parameter name `{formal}` not allowed in strict mode"
                ))
                .with_line(line));
            }
        }
        if let Some(name) = name {
            super::stmt::check_strict_binding_name(name, line)?;
        }
        Ok(())
    }

    /// A nested function's argument registers are bound before its own
    /// shuffle scratch registers; for the top level there
    /// are no arguments, but the same reservation still has to happen
    /// before anything else can allocate a temp.
    fn reserve_toplevel_shuffle_regs(&mut self) -> CompileResult<()> {
        if !self.cur_func().argnames.is_empty() {
            return Ok(());
        }
        let limits = self.limits;
        self.cur_func().reserve_shuffle_registers(&limits)
    }

    /// Pass 2's prologue: binds each formal parameter to a
    /// register in declaration order, reserves the three shuffle scratch
    /// registers and (for eval/global code) the implicit completion-value
    /// register right after them, then hoists every `var`/function
    /// declaration collected in pass 1.
    ///
    /// A `var` in function context gets a fresh register, unless the name
    /// is already bound (a formal or an earlier-declared function of the
    /// same name wins); a `var` in eval/global context instead declares a
    /// global property with `DECLVAR` and is marked slow, since global
    /// bindings are never register-resident. A function declaration always
    /// (re)binds its register and has its closure loaded immediately
    /// ("last function declaration wins", ES5.1 §10.5); in non-strict
    /// eval/global code it also gets a companion `DECLVAR` so the closure
    /// is visible as a global property.
    fn bind_prologue(&mut self) -> CompileResult<()> {
        let limits = self.limits;
        let line = self.line();
        let argnames = self.cur_func().argnames.clone();
        for name in &argnames {
            let func = self.cur_func();
            let r = func.alloc_temp(&limits)?;
            func.bind_register(name, r);
        }
        self.cur_func().reserve_shuffle_registers(&limits)?;
        {
            let func = self.cur_func();
            if func.flags.is_global || func.flags.is_eval {
                let r = func.alloc_temp(&limits)?;
                func.reg_stmt_value = Some(r);
            }
        }

        let is_global_scope = {
            let func = self.cur_func();
            func.flags.is_global || func.flags.is_eval
        };
        let is_strict = self.cur_func().flags.is_strict;
        let decls = self.cur_func().decls.clone();
        let mut pending_closures = Vec::new();
        let mut pending_declvars: Vec<(u16, u16)> = Vec::new();
        for decl in &decls {
            match decl.kind {
                DeclKind::Var => {
                    let func = self.cur_func();
                    if !func.varmap.contains_key(&decl.name) {
                        if is_global_scope {
                            let name_idx = func.add_name_const(&decl.name, &limits)?;
                            func.mark_slow(&decl.name);
                            pending_declvars.push((0, name_idx));
                        } else {
                            let r = func.alloc_temp(&limits)?;
                            func.bind_register(&decl.name, r);
                        }
                    }
                }
                DeclKind::Func(local_idx) => {
                    let func = self.cur_func();
                    let r = func.alloc_temp(&limits)?;
                    func.bind_register(&decl.name, r);
                    pending_closures.push((r, local_idx));
                    if is_global_scope && !is_strict {
                        let name_idx = func.add_name_const(&decl.name, &limits)?;
                        pending_declvars.push((r, name_idx));
                    }
                }
            }
        }
        let undef_reg = if pending_declvars.iter().any(|(r, _)| *r == 0) {
            let mut e = self.emitter();
            let dst = e.func.alloc_temp(e.limits)?;
            e.emit_extra(ExtraOp::LdUndef, dst, 0, line);
            Some(dst)
        } else {
            None
        };
        for (reg, local_idx) in pending_closures {
            let mut e = self.emitter();
            e.emit_extra(ExtraOp::Closure, reg, local_idx as u16, line);
        }
        for (reg, name_idx) in pending_declvars {
            let reg = if reg == 0 { undef_reg.expect("undef register reserved above") } else { reg };
            let mut e = self.emitter();
            e.emit(Instruction::a_bc(Opcode::DeclVar, reg, u32::from(name_idx), line));
        }
        Ok(())
    }

    /// Compiles or skips one function literal's body, called once the
    /// caller has already parsed its name (if any) and formal parameter
    /// list and positioned the cursor at the opening `{`. Returns the
    /// local index into the *current* function's nested-function table
    /// ([`FuncState::funcs`]) that a `CLOSURE` referencing this literal
    /// should carry.
    pub(crate) fn function_literal(
        &mut self,
        name: Option<String>,
        formals: Vec<String>,
        is_funcexpr: bool,
    ) -> CompileResult<u16> {
        let outer_strict = self.cur_func().flags.is_strict;
        if self.cur_func().flags.in_scanning {
            self.cursor.expect_punct(Punct::LBrace)?;
            let template = self.compile_function(formals, name, true, outer_strict, is_funcexpr, false)?;
            let resume_at = self.cursor.mark();
            let line = self.line();
            let local_idx = self.cur_func().add_nested_func(NestedFunc { template, resume_at, line });
            Ok(local_idx as u16)
        } else {
            let resume_at = self
                .cur_func()
                .advance_past_nested_func()
                .ok_or_else(|| CompileError::internal("nested function table exhausted in pass 2"))?;
            let local_idx = self.cur_func().funcs_cursor as u16 - 1;
            self.cursor.restore(resume_at)?;
            Ok(local_idx)
        }
    }

    /// Parses `( Ident (, Ident)* )`  (ES5.1 §13: `FormalParameterList`).
    pub(crate) fn parse_formal_parameters(&mut self) -> CompileResult<Vec<String>> {
        self.cursor.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        while !self.cursor.current().is_punct(Punct::RParen) {
            let name = self.cursor.current().as_ident().map(str::to_string).ok_or_else(|| {
                CompileError::syntax(format!("expected parameter name, found {}", self.cursor.current().kind))
                    .with_line(self.cursor.line())
            })?;
            params.push(name);
            self.cursor.advance()?;
            if !self.cursor.eat_punct(Punct::Comma)? {
                break;
            }
        }
        self.cursor.expect_punct(Punct::RParen)?;
        Ok(params)
    }

    fn build_template(&self, func: FuncState, name: Option<String>) -> FunctionTemplate {
        let pc2line = build_pc2line(&func.code);
        let code: Vec<u32> = func.code.iter().enumerate().map(|(pc, instr)| pack_instruction(pc, instr)).collect();
        let funcs: Vec<FunctionTemplate> = func.funcs.into_iter().map(|nf| nf.template).collect();
        FunctionTemplate {
            name,
            file_name: self.file_name.clone(),
            consts: func.consts,
            code,
            funcs,
            pc2line,
            nregs: func.temp_max,
            nargs: func.argnames.len() as u16,
            formals: func.argnames,
            varmap: func.varmap,
            flags: TemplateFlags {
                newenv: func.flags.may_direct_eval || func.with_depth > 0,
                createargs: func.flags.id_access_arguments,
                namebinding: func.flags.is_function && !func.flags.is_decl && func.name.is_some(),
                strict: func.flags.is_strict,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyEnd {
    Eof,
    RBrace,
}

/// Interns the two ubiquitous singleton values a directive-prologue check
/// and a handful of statement forms need without re-deriving them.
pub(crate) fn undefined_value() -> Value {
    Value::Undefined
}
