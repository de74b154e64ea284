//! Expression Parser: a Pratt (`nud`/`led`/`lbp`) parser
//! driving the emitter and IVALUE engine directly, without building an AST.
//! Dispatch favors an enum-plus-match style (`nud`/`led` are `match` arms on
//! `TokenKind`) over a table of function pointers.

use std::rc::Rc;

use crate::error::{CompileError, CompileResult};
use crate::ivalue::{ArithOp, ISpec, IValue, VarRef};
use crate::lexer::token::{bp, Keyword, Literal, Punct, TokenKind};
use crate::opcode::{call_flags, ExtraOp, Instruction, Opcode, RegConst};
use crate::resolver::{self, Resolution};
use crate::tracer::CompilerTracer;
use crate::value::Value;

use super::Parser;

/// Binary operators that fold via the IVALUE engine's constant-folding path
/// rather than emitting unconditionally. `%` folds numerically alongside
/// `+ - * /` — all five arithmetic operators fold the same way.
enum BinKind {
    Arith(ArithOp),
    Op(Opcode),
}

fn binary_info(p: Punct) -> (BinKind, u8) {
    use Punct::*;
    match p {
        Plus => (BinKind::Arith(ArithOp::Add), bp::ADDITIVE),
        Minus => (BinKind::Arith(ArithOp::Sub), bp::ADDITIVE),
        Star => (BinKind::Arith(ArithOp::Mul), bp::MULTIPLICATIVE),
        Slash => (BinKind::Arith(ArithOp::Div), bp::MULTIPLICATIVE),
        Percent => (BinKind::Arith(ArithOp::Mod), bp::MULTIPLICATIVE),
        Shl => (BinKind::Op(Opcode::Shl), bp::SHIFT),
        Shr => (BinKind::Op(Opcode::Shr), bp::SHIFT),
        UShr => (BinKind::Op(Opcode::UShr), bp::SHIFT),
        Amp => (BinKind::Op(Opcode::BAnd), bp::BAND),
        Pipe => (BinKind::Op(Opcode::BOr), bp::BOR),
        Caret => (BinKind::Op(Opcode::BXor), bp::BXOR),
        Lt => (BinKind::Op(Opcode::Lt), bp::RELATIONAL),
        Gt => (BinKind::Op(Opcode::Gt), bp::RELATIONAL),
        Le => (BinKind::Op(Opcode::Le), bp::RELATIONAL),
        Ge => (BinKind::Op(Opcode::Ge), bp::RELATIONAL),
        EqEq => (BinKind::Op(Opcode::Eq), bp::EQUALITY),
        NotEq => (BinKind::Op(Opcode::NEq), bp::EQUALITY),
        EqEqEq => (BinKind::Op(Opcode::SEq), bp::EQUALITY),
        NotEqEq => (BinKind::Op(Opcode::SNEq), bp::EQUALITY),
        other => unreachable!("{other:?} is not a binary operator punctuator"),
    }
}

fn is_binary_punct(p: Punct) -> bool {
    use Punct::*;
    matches!(
        p,
        Plus | Minus
            | Star
            | Slash
            | Percent
            | Shl
            | Shr
            | UShr
            | Amp
            | Pipe
            | Caret
            | Lt
            | Gt
            | Le
            | Ge
            | EqEq
            | NotEq
            | EqEqEq
            | NotEqEq
    )
}

fn is_assignment_punct(p: Punct) -> bool {
    use Punct::*;
    matches!(
        p,
        Eq | PlusEq | MinusEq | StarEq | PercentEq | SlashEq | ShlEq | ShrEq | UShrEq | AmpEq | PipeEq | CaretEq
    )
}

/// `None` for plain `=`; `Some(op)` for a compound assignment's underlying
/// binary opcode.
fn compound_opcode(p: Punct) -> Option<Opcode> {
    use Punct::*;
    match p {
        Eq => None,
        PlusEq => Some(Opcode::Add),
        MinusEq => Some(Opcode::Sub),
        StarEq => Some(Opcode::Mul),
        PercentEq => Some(Opcode::Mod),
        SlashEq => Some(Opcode::Div),
        ShlEq => Some(Opcode::Shl),
        ShrEq => Some(Opcode::Shr),
        UShrEq => Some(Opcode::UShr),
        AmpEq => Some(Opcode::BAnd),
        PipeEq => Some(Opcode::BOr),
        CaretEq => Some(Opcode::BXor),
        other => unreachable!("{other:?} is not an assignment operator punctuator"),
    }
}

/// Moves a materialized `RegConst` into `dst`, skipping the move when it is
/// already there. Used everywhere a result must land in a specific register
/// (array/object literal batch slots, call argument registers, compound
/// assignment targets).
pub(crate) fn move_into(e: &mut crate::emitter::Emitter<'_>, dst: u16, rc: RegConst, line: u32) {
    match rc {
        RegConst::Reg(r) if r == dst => {}
        RegConst::Reg(r) => {
            e.emit(Instruction::a_bc(Opcode::LdReg, dst, u32::from(r), line));
        }
        RegConst::Const(c) => {
            e.emit(Instruction::a_bc(Opcode::LdConst, dst, u32::from(c), line));
        }
    }
}

impl<'a, T: CompilerTracer> Parser<'a, T> {
    /// `Expression` (ES5.1 §11.14): includes the comma operator.
    pub fn parse_expression(&mut self) -> CompileResult<IValue> {
        self.parse_bin_expr(bp::NONE)
    }

    /// `AssignmentExpression`: excludes the comma operator, includes
    /// everything down through assignment itself.
    pub fn parse_assignment_expression(&mut self) -> CompileResult<IValue> {
        self.parse_bin_expr(bp::COMMA)
    }

    /// The left-binding power of the current token, with two contextual
    /// overrides the static `lbp` table can't express on its own: automatic
    /// semicolon insertion forbids a postfix `++`/`--` separated from its
    /// operand by a line terminator (so a preceding newline makes it bind
    /// as if absent), and `for(;;)` header parsing disables `in` as a
    /// binary operator.
    fn current_lbp(&mut self) -> u8 {
        let tok = self.cursor.current();
        if matches!(tok.kind, TokenKind::Punct(Punct::PlusPlus | Punct::MinusMinus)) && tok.newline_before {
            return bp::NONE;
        }
        if matches!(tok.kind, TokenKind::Keyword(Keyword::In)) && !self.cur_func().allow_in {
            return bp::NONE;
        }
        crate::lexer::token::lbp(&tok.kind)
    }

    fn parse_bin_expr(&mut self, rbp: u8) -> CompileResult<IValue> {
        self.recursion_guard()?;
        let mut left = self.nud()?;
        while rbp < self.current_lbp() {
            left = self.led(left)?;
        }
        self.recursion_release();
        Ok(left)
    }

    /// An operand tight enough to bind to a prefix unary operator: includes
    /// postfix `++`/`--` and member/call expressions, excludes every binary
    /// operator.
    fn parse_unary_operand(&mut self) -> CompileResult<IValue> {
        self.parse_bin_expr(bp::POSTFIX - 1)
    }

    // ---- nud -----------------------------------------------------------

    fn nud(&mut self) -> CompileResult<IValue> {
        self.cur_func().nud_count += 1;
        let tok = self.cursor.current().clone();
        let line = tok.line;
        match &tok.kind {
            TokenKind::Keyword(Keyword::This) => {
                self.cursor.advance()?;
                let mut e = self.emitter();
                let dst = e.func.alloc_temp(e.limits)?;
                e.emit_extra(ExtraOp::This, dst, 0, line);
                Ok(IValue::plain_rc(RegConst::Reg(dst)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.cursor.advance()?;
                Ok(IValue::plain_lit(Value::Null))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.cursor.advance()?;
                Ok(IValue::plain_lit(Value::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.cursor.advance()?;
                Ok(IValue::plain_lit(Value::Boolean(false)))
            }
            TokenKind::Literal(Literal::Number(n)) => {
                let n = *n;
                self.cursor.advance()?;
                Ok(IValue::plain_lit(Value::Number(n)))
            }
            TokenKind::Literal(Literal::String { value, .. }) => {
                let v = value.clone();
                self.cursor.advance()?;
                Ok(IValue::plain_lit(Value::String(v)))
            }
            TokenKind::Literal(Literal::Regexp { pattern, flags }) => {
                let (pattern, flags) = (pattern.clone(), flags.clone());
                self.cursor.advance()?;
                let mut e = self.emitter();
                let idx = e.func.add_const(Value::Regexp { pattern, flags }, e.limits)?;
                let dst = e.func.alloc_temp(e.limits)?;
                let rc = e.to_short(RegConst::Const(idx), line)?;
                e.emit(Instruction::abc3(Opcode::Regexp, dst, rc.encode(), 0, line));
                Ok(IValue::plain_rc(RegConst::Reg(dst)))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.cursor.advance()?;
                let _ = resolver::is_arguments_access(self.cur_func(), &name);
                let rc_name: Rc<str> = Rc::from(name.as_str());
                match resolver::lookup_active_register_binding(self.cur_func(), &name) {
                    Resolution::Register(r) => Ok(IValue::Var(VarRef::Reg(r), rc_name)),
                    Resolution::Slow => {
                        let mut e = self.emitter();
                        let idx = e.func.add_name_const(&name, e.limits)?;
                        Ok(IValue::Var(VarRef::Name(idx), rc_name))
                    }
                }
            }
            TokenKind::Punct(Punct::LParen) => {
                self.cursor.advance()?;
                self.cur_func().paren_level += 1;
                let saved_allow_in = self.cur_func().allow_in;
                self.cur_func().allow_in = true;
                let inner = self.parse_expression()?;
                self.cur_func().allow_in = saved_allow_in;
                self.cur_func().paren_level -= 1;
                self.cursor.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBracket) => self.parse_array_literal(),
            TokenKind::Punct(Punct::LBrace) => self.parse_object_literal(),
            TokenKind::Keyword(Keyword::Function) => self.parse_function_expression(),
            TokenKind::Keyword(Keyword::New) => self.parse_new_expression(),
            TokenKind::Keyword(Keyword::Delete) => self.parse_unary_delete(line),
            TokenKind::Keyword(Keyword::Void) => self.parse_unary_void(line),
            TokenKind::Keyword(Keyword::Typeof) => self.parse_unary_simple(ExtraOp::Typeof, line),
            TokenKind::Punct(Punct::Plus) => self.parse_unary_simple(ExtraOp::Pos, line),
            TokenKind::Punct(Punct::Minus) => self.parse_unary_simple(ExtraOp::Neg, line),
            TokenKind::Punct(Punct::Tilde) => self.parse_unary_simple(ExtraOp::BNot, line),
            TokenKind::Punct(Punct::Bang) => self.parse_unary_simple(ExtraOp::LNot, line),
            TokenKind::Punct(Punct::PlusPlus) => self.parse_prefix_incdec(ExtraOp::Inc, line),
            TokenKind::Punct(Punct::MinusMinus) => self.parse_prefix_incdec(ExtraOp::Dec, line),
            _ => Err(CompileError::syntax(format!("unexpected token {} in expression", tok.kind)).with_line(line)),
        }
    }

    fn parse_unary_simple(&mut self, extra: ExtraOp, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let operand = self.parse_unary_operand()?;
        let mut e = self.emitter();
        let src = operand.to_regconst(&mut e, ISpec::RequireShort, line)?;
        let dst = e.func.alloc_temp(e.limits)?;
        e.emit_extra(extra, dst, src.encode(), line);
        Ok(IValue::plain_rc(RegConst::Reg(dst)))
    }

    /// `void expr`: always evaluates to `undefined`, the operand kept only
    /// for its side effects.
    fn parse_unary_void(&mut self, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let operand = self.parse_unary_operand()?;
        let mut e = self.emitter();
        let _ = operand.to_regconst(&mut e, ISpec::AllowConst, line)?;
        Ok(IValue::plain_lit(Value::Undefined))
    }

    /// `delete expr`: deleting a property
    /// emits `DELPROP`; an unresolved (slow-path) name emits `DELVAR`; a
    /// register-bound variable is a declared binding and can never be
    /// deleted, so it folds to the literal `false` without emitting
    /// anything; any other operand is evaluated for its side effect only
    /// and the result is the literal `true`.
    fn parse_unary_delete(&mut self, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let operand = self.parse_unary_operand()?;
        match operand {
            IValue::Prop { base, key } => {
                let mut e = self.emitter();
                let base_rc = e.to_short(base, line)?;
                let key_rc = e.to_short(key, line)?;
                // DELPROP writes its boolean result back into the base
                // operand, so that operand must be a register: materialize
                // a constant base through a fresh temp first.
                let base_reg = match base_rc {
                    RegConst::Reg(r) => r,
                    RegConst::Const(c) => {
                        let r = e.func.alloc_temp(e.limits)?;
                        e.emit(Instruction::a_bc(Opcode::LdConst, r, u32::from(c), line));
                        r
                    }
                };
                e.emit_extra(ExtraOp::DelProp, base_reg, key_rc.encode(), line);
                Ok(IValue::plain_rc(RegConst::Reg(base_reg)))
            }
            IValue::Var(VarRef::Reg(_), _) => Ok(IValue::plain_lit(Value::Boolean(false))),
            IValue::Var(VarRef::Name(name_idx), _) => {
                let mut e = self.emitter();
                let dst = e.func.alloc_temp(e.limits)?;
                let name_rc = e.to_short(RegConst::Const(name_idx), line)?;
                e.emit_extra(ExtraOp::DelVar, dst, name_rc.encode(), line);
                Ok(IValue::plain_rc(RegConst::Reg(dst)))
            }
            other => {
                let mut e = self.emitter();
                let _ = other.to_regconst(&mut e, ISpec::AllowConst, line)?;
                Ok(IValue::plain_lit(Value::Boolean(true)))
            }
        }
    }

    fn parse_prefix_incdec(&mut self, extra: ExtraOp, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let operand = self.parse_unary_operand()?;
        self.check_assignment_target(&operand, line)?;
        self.apply_incdec(operand, extra, false, line)
    }

    /// Shared prefix/postfix `++`/`--` lowering: coerce to
    /// a number (`TONUM`), optionally save the pre-coercion value for a
    /// postfix result, mutate (`INC`/`DEC`), and write back through
    /// whichever of register/slow-variable/property path the target uses.
    fn apply_incdec(&mut self, target: IValue, extra: ExtraOp, is_postfix: bool, line: u32) -> CompileResult<IValue> {
        match target {
            IValue::Var(VarRef::Reg(reg), _) => {
                let mut e = self.emitter();
                e.emit_extra(ExtraOp::ToNum, reg, reg, line);
                let result = if is_postfix {
                    let old = e.func.alloc_temp(e.limits)?;
                    e.emit(Instruction::a_bc(Opcode::LdReg, old, u32::from(reg), line));
                    old
                } else {
                    reg
                };
                e.emit_extra(extra, reg, 0, line);
                Ok(IValue::plain_rc(RegConst::Reg(result)))
            }
            IValue::Var(VarRef::Name(name_idx), _) => {
                let mut e = self.emitter();
                let val = e.func.alloc_temp(e.limits)?;
                e.emit(Instruction::a_bc(Opcode::GetVar, val, u32::from(name_idx), line));
                e.emit_extra(ExtraOp::ToNum, val, val, line);
                let old = if is_postfix {
                    let o = e.func.alloc_temp(e.limits)?;
                    e.emit(Instruction::a_bc(Opcode::LdReg, o, u32::from(val), line));
                    Some(o)
                } else {
                    None
                };
                e.emit_extra(extra, val, 0, line);
                e.emit(Instruction::a_bc(Opcode::PutVar, val, u32::from(name_idx), line));
                Ok(IValue::plain_rc(RegConst::Reg(old.unwrap_or(val))))
            }
            IValue::Prop { base, key } => {
                let mut e = self.emitter();
                let base_s = e.to_short(base, line)?;
                let key_s = e.to_short(key, line)?;
                let val = e.func.alloc_temp(e.limits)?;
                e.emit(Instruction::abc3(Opcode::GetProp, val, base_s.encode(), key_s.encode(), line));
                e.emit_extra(ExtraOp::ToNum, val, val, line);
                let old = if is_postfix {
                    let o = e.func.alloc_temp(e.limits)?;
                    e.emit(Instruction::a_bc(Opcode::LdReg, o, u32::from(val), line));
                    Some(o)
                } else {
                    None
                };
                e.emit_extra(extra, val, 0, line);
                e.emit(Instruction::abc3(Opcode::PutProp, val, base_s.encode(), key_s.encode(), line));
                Ok(IValue::plain_rc(RegConst::Reg(old.unwrap_or(val))))
            }
            _ => Err(CompileError::syntax("invalid increment/decrement operand").with_line(line)),
        }
    }

    /// `FunctionExpression`: an optional name,
    /// usable only inside the function's own body for self-reference, then
    /// formals and a body compiled as a nested function.
    fn parse_function_expression(&mut self) -> CompileResult<IValue> {
        self.cursor.advance()?; // eat `function`
        let name = self.cursor.current().as_ident().map(str::to_string);
        if name.is_some() {
            self.cursor.advance()?;
        }
        let formals = self.parse_formal_parameters()?;
        self.parse_function_literal_body(name, formals)
    }

    /// Compiles (pass 1) or skips (pass 2) the function literal whose name
    /// and formals the caller has already parsed, with the cursor sitting
    /// at the opening `{`, and emits the `CLOSURE` materializing it. Shared between function expressions and object-literal
    /// accessors, which parse their own parameter lists before reaching
    /// this point.
    pub(crate) fn parse_function_literal_body(
        &mut self,
        name: Option<String>,
        formals: Vec<String>,
    ) -> CompileResult<IValue> {
        let line = self.line();
        let local_idx = self.function_literal(name, formals, true)?;
        let mut e = self.emitter();
        let dst = e.func.alloc_temp(e.limits)?;
        e.emit_extra(ExtraOp::Closure, dst, local_idx, line);
        Ok(IValue::plain_rc(RegConst::Reg(dst)))
    }

    // ---- led -------------------------------------------------------------

    fn led(&mut self, left: IValue) -> CompileResult<IValue> {
        self.cur_func().led_count += 1;
        let tok = self.cursor.current().clone();
        let line = tok.line;
        match &tok.kind {
            TokenKind::Punct(Punct::Dot) => self.parse_member_dot(left, line),
            TokenKind::Punct(Punct::LBracket) => self.parse_member_index(left, line),
            TokenKind::Punct(Punct::LParen) => self.parse_call(left, line),
            TokenKind::Punct(Punct::PlusPlus) => {
                self.cursor.advance()?;
                self.check_assignment_target(&left, line)?;
                self.apply_incdec(left, ExtraOp::Inc, true, line)
            }
            TokenKind::Punct(Punct::MinusMinus) => {
                self.cursor.advance()?;
                self.check_assignment_target(&left, line)?;
                self.apply_incdec(left, ExtraOp::Dec, true, line)
            }
            TokenKind::Keyword(Keyword::Instanceof) => {
                self.parse_binary_op(left, Opcode::InstanceOf, bp::RELATIONAL, line)
            }
            TokenKind::Keyword(Keyword::In) => self.parse_binary_op(left, Opcode::In, bp::RELATIONAL, line),
            TokenKind::Punct(Punct::AmpAmp) => self.parse_logical(left, true, line),
            TokenKind::Punct(Punct::PipePipe) => self.parse_logical(left, false, line),
            TokenKind::Punct(Punct::Question) => self.parse_conditional(left, line),
            TokenKind::Punct(Punct::Comma) => self.parse_comma(left, line),
            TokenKind::Punct(p) if is_binary_punct(*p) => self.parse_binary(left, *p, line),
            TokenKind::Punct(p) if is_assignment_punct(*p) => self.parse_assignment(left, *p, line),
            _ => Err(CompileError::internal(format!("led dispatched for non-operator token {}", tok.kind))
                .with_line(line)),
        }
    }

    fn parse_member_dot(&mut self, left: IValue, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let name = self.cursor.current().identifier_name().ok_or_else(|| {
            CompileError::syntax(format!("expected property name after `.`, found {}", self.cursor.current().kind))
                .with_line(self.cursor.line())
        })?;
        self.cursor.suppress_next_regexp();
        self.cursor.advance()?;
        let mut e = self.emitter();
        let base = left.to_regconst(&mut e, ISpec::AllowConst, line)?;
        let key_idx = e.func.add_name_const(&name, e.limits)?;
        Ok(IValue::Prop { base, key: RegConst::Const(key_idx) })
    }

    fn parse_member_index(&mut self, left: IValue, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let saved = self.cur_func().allow_in;
        self.cur_func().allow_in = true;
        let key_val = self.parse_expression()?;
        self.cur_func().allow_in = saved;
        self.cursor.expect_punct(Punct::RBracket)?;
        let mut e = self.emitter();
        let base = left.to_regconst(&mut e, ISpec::AllowConst, line)?;
        let key = key_val.to_regconst(&mut e, ISpec::AllowConst, line)?;
        Ok(IValue::Prop { base, key })
    }

    fn parse_binary(&mut self, left: IValue, p: Punct, line: u32) -> CompileResult<IValue> {
        let (kind, this_bp) = binary_info(p);
        self.cursor.advance()?;
        let right = self.parse_bin_expr(this_bp)?;
        match kind {
            BinKind::Arith(op) => Ok(IValue::fold(op, left, right)),
            BinKind::Op(opcode) => self.emit_binary(left, right, opcode, line),
        }
    }

    fn parse_binary_op(&mut self, left: IValue, opcode: Opcode, this_bp: u8, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let right = self.parse_bin_expr(this_bp)?;
        self.emit_binary(left, right, opcode, line)
    }

    fn emit_binary(&mut self, left: IValue, right: IValue, opcode: Opcode, line: u32) -> CompileResult<IValue> {
        let mut e = self.emitter();
        let l = left.to_regconst(&mut e, ISpec::AllowConst, line)?;
        let r = right.to_regconst(&mut e, ISpec::AllowConst, line)?;
        let dst = e.func.alloc_temp(e.limits)?;
        let l = e.to_short(l, line)?;
        let r = e.to_short(r, line)?;
        e.emit(Instruction::abc3(opcode, dst, l.encode(), r.encode(), line));
        Ok(IValue::plain_rc(RegConst::Reg(dst)))
    }

    /// `&&`/`||`: right-associative short circuit.
    /// Evaluates the left operand into a temp, tests it with `IF`, and
    /// conditionally skips an unconditional `JUMP` to fall through into the
    /// right operand (`&&` continues on truthy, `||` continues on falsy);
    /// the right operand's value is moved into the same temp so either path
    /// leaves the result in one place.
    fn parse_logical(&mut self, left: IValue, is_and: bool, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let this_bp = if is_and { bp::LAND } else { bp::LOR };
        let left_reg = {
            let mut e = self.emitter();
            match left.to_regconst(&mut e, ISpec::RequireTemp, line)? {
                RegConst::Reg(r) => r,
                RegConst::Const(_) => unreachable!("REQUIRE_TEMP always yields a register"),
            }
        };
        let jump_site = {
            let mut e = self.emitter();
            e.emit(Instruction::abc3(Opcode::If, u16::from(is_and), left_reg, 0, line));
            e.emit_jump(Opcode::Jump, line)
        };
        let right = self.parse_bin_expr(this_bp)?;
        let mut e = self.emitter();
        let rc = right.to_regconst(&mut e, ISpec::AllowConst, line)?;
        move_into(&mut e, left_reg, rc, line);
        e.patch_jump_here(jump_site);
        Ok(IValue::plain_rc(RegConst::Reg(left_reg)))
    }

    /// `a ? b : c`. Both
    /// branches are `AssignmentExpression`s, right-associative with the
    /// surrounding context, and their values converge into one register.
    fn parse_conditional(&mut self, test: IValue, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let (dst, else_jump) = {
            let mut e = self.emitter();
            let test_rc = test.to_regconst(&mut e, ISpec::RequireShort, line)?;
            let dst = e.func.alloc_temp(e.limits)?;
            e.emit(Instruction::abc3(Opcode::If, 1, test_rc.encode(), 0, line));
            let else_jump = e.emit_jump(Opcode::Jump, line);
            (dst, else_jump)
        };
        let consequent = self.parse_assignment_expression()?;
        let end_jump = {
            let mut e = self.emitter();
            let rc = consequent.to_regconst(&mut e, ISpec::AllowConst, line)?;
            move_into(&mut e, dst, rc, line);
            e.emit_jump(Opcode::Jump, line)
        };
        self.cursor.expect_punct(Punct::Colon)?;
        {
            let mut e = self.emitter();
            e.patch_jump_here(else_jump);
        }
        let alternate = self.parse_assignment_expression()?;
        {
            let mut e = self.emitter();
            let rc = alternate.to_regconst(&mut e, ISpec::AllowConst, line)?;
            move_into(&mut e, dst, rc, line);
            e.patch_jump_here(end_jump);
        }
        Ok(IValue::plain_rc(RegConst::Reg(dst)))
    }

    fn parse_comma(&mut self, left: IValue, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        {
            let mut e = self.emitter();
            let _ = left.to_regconst(&mut e, ISpec::AllowConst, line)?;
        }
        self.parse_assignment_expression()
    }

    /// Assignment: right-associative; the LHS
    /// shape picks the emission path (register move, `PUTVAR`, `PUTPROP`),
    /// and anything else evaluates both sides for side effects and emits
    /// `INVLHS` (a runtime `ReferenceError`).
    fn parse_assignment(&mut self, left: IValue, p: Punct, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        self.check_assignment_target(&left, line)?;
        let rhs = self.parse_bin_expr(bp::ASSIGNMENT - 1)?;
        let op = compound_opcode(p);
        match left {
            IValue::Var(VarRef::Reg(reg), _) => {
                let mut e = self.emitter();
                if let Some(opcode) = op {
                    let cur = e.to_short(RegConst::Reg(reg), line)?;
                    let rhs_rc = rhs.to_regconst(&mut e, ISpec::AllowConst, line)?;
                    let rhs_rc = e.to_short(rhs_rc, line)?;
                    e.emit(Instruction::abc3(opcode, reg, cur.encode(), rhs_rc.encode(), line));
                } else {
                    let rhs_rc = rhs.to_regconst(&mut e, ISpec::AllowConst, line)?;
                    move_into(&mut e, reg, rhs_rc, line);
                }
                Ok(IValue::plain_rc(RegConst::Reg(reg)))
            }
            IValue::Var(VarRef::Name(name_idx), _) => {
                let mut e = self.emitter();
                let dst = if let Some(opcode) = op {
                    let cur = e.func.alloc_temp(e.limits)?;
                    e.emit(Instruction::a_bc(Opcode::GetVar, cur, u32::from(name_idx), line));
                    let rhs_rc = rhs.to_regconst(&mut e, ISpec::AllowConst, line)?;
                    let rhs_rc = e.to_short(rhs_rc, line)?;
                    let cur_short = e.to_short(RegConst::Reg(cur), line)?;
                    e.emit(Instruction::abc3(opcode, cur, cur_short.encode(), rhs_rc.encode(), line));
                    cur
                } else {
                    let rhs_rc = rhs.to_regconst(&mut e, ISpec::RequireTemp, line)?;
                    match rhs_rc {
                        RegConst::Reg(r) => r,
                        RegConst::Const(_) => unreachable!("REQUIRE_TEMP always yields a register"),
                    }
                };
                e.emit(Instruction::a_bc(Opcode::PutVar, dst, u32::from(name_idx), line));
                Ok(IValue::plain_rc(RegConst::Reg(dst)))
            }
            IValue::Prop { base, key } => {
                let mut e = self.emitter();
                let base_s = e.to_short(base, line)?;
                let key_s = e.to_short(key, line)?;
                let dst = if let Some(opcode) = op {
                    let cur = e.func.alloc_temp(e.limits)?;
                    e.emit(Instruction::abc3(Opcode::GetProp, cur, base_s.encode(), key_s.encode(), line));
                    let rhs_rc = rhs.to_regconst(&mut e, ISpec::AllowConst, line)?;
                    let rhs_rc = e.to_short(rhs_rc, line)?;
                    let cur_short = e.to_short(RegConst::Reg(cur), line)?;
                    e.emit(Instruction::abc3(opcode, cur, cur_short.encode(), rhs_rc.encode(), line));
                    cur
                } else {
                    let rhs_rc = rhs.to_regconst(&mut e, ISpec::RequireTemp, line)?;
                    match rhs_rc {
                        RegConst::Reg(r) => r,
                        RegConst::Const(_) => unreachable!("REQUIRE_TEMP always yields a register"),
                    }
                };
                e.emit(Instruction::abc3(Opcode::PutProp, dst, base_s.encode(), key_s.encode(), line));
                Ok(IValue::plain_rc(RegConst::Reg(dst)))
            }
            other => {
                let mut e = self.emitter();
                let _ = other.to_regconst(&mut e, ISpec::AllowConst, line)?;
                let _ = rhs.to_regconst(&mut e, ISpec::AllowConst, line)?;
                let dst = e.func.alloc_temp(e.limits)?;
                e.emit_extra(ExtraOp::InvLhs, dst, 0, line);
                Ok(IValue::plain_rc(RegConst::Reg(dst)))
            }
        }
    }

    /// Strict-mode ES5.1 §11.13.1/§11.4.4/§11.4.5 restriction: `eval` and
    /// `arguments` can never be an assignment or `++`/`--` target in strict
    /// code. Non-`Var` targets (properties, or an invalid-LHS expression)
    /// are unaffected — their own emission path handles them.
    fn check_assignment_target(&mut self, target: &IValue, line: u32) -> CompileResult<()> {
        if let IValue::Var(_, name) = target {
            if self.cur_func().flags.is_strict && (name.as_ref() == "eval" || name.as_ref() == "arguments") {
                return Err(CompileError::syntax(format!(
                    "`{name}` cannot be assigned to in strict mode"
                ))
                .with_line(line));
            }
        }
        Ok(())
    }

    // ---- array / object literals ----------------------------------------

    /// `ArrayLiteral`.
    /// Elisions advance the logical index without writing a value (so an
    /// elided slot is never an own property); values are batched into
    /// `MPUTARR` calls of at most `max_array_init_values` each; trailing
    /// elisions only affect the final `SETALEN`.
    fn parse_array_literal(&mut self) -> CompileResult<IValue> {
        let line = self.line();
        self.cursor.advance()?;
        let arr_reg = {
            let mut e = self.emitter();
            let r = e.func.alloc_temp(e.limits)?;
            e.emit(Instruction::abc3(Opcode::NewArr, r, 0, 0, line));
            r
        };
        let max_batch = self.limits.max_array_init_values;
        let mut index: u32 = 0;
        let mut batch_start: Option<u16> = None;
        let mut batch_count: u16 = 0;
        loop {
            if self.cursor.current().is_punct(Punct::RBracket) {
                break;
            }
            if self.cursor.current().is_punct(Punct::Comma) {
                self.cursor.advance()?;
                index += 1;
                continue;
            }
            let slot = {
                let mut e = self.emitter();
                e.func.alloc_temp(e.limits)?
            };
            let val = self.parse_assignment_expression()?;
            {
                let mut e = self.emitter();
                let rc = val.to_regconst(&mut e, ISpec::AllowConst, line)?;
                move_into(&mut e, slot, rc, line);
                // Discard any scratch the value's own evaluation left
                // behind so the next element's slot is allocated right
                // after this one, keeping the batch's registers contiguous.
                e.func.release_temps_to(slot + 1);
            }
            if batch_start.is_none() {
                batch_start = Some(slot);
            }
            batch_count += 1;
            index += 1;
            if batch_count as usize >= max_batch {
                self.flush_array_batch(arr_reg, batch_start.take().unwrap(), batch_count, line)?;
                batch_count = 0;
            }
            if self.cursor.current().is_punct(Punct::Comma) {
                self.cursor.advance()?;
            } else {
                break;
            }
        }
        if batch_count > 0 {
            self.flush_array_batch(arr_reg, batch_start.unwrap(), batch_count, line)?;
        }
        self.cursor.expect_punct(Punct::RBracket)?;
        if index > 0 {
            let mut e = self.emitter();
            e.emit_extra(ExtraOp::SetALen, arr_reg, index as u16, line);
        }
        Ok(IValue::plain_rc(RegConst::Reg(arr_reg)))
    }

    fn flush_array_batch(&mut self, arr_reg: u16, start: u16, count: u16, line: u32) -> CompileResult<()> {
        let mut e = self.emitter();
        e.emit_range_op(Opcode::MPutArr, start, count, arr_reg, line)?;
        e.func.release_temps_to(start);
        Ok(())
    }

    /// `ObjectLiteral`: plain key/value pairs batch through
    /// `MPUTOBJ`; a getter/setter flushes the current batch and emits its
    /// own `INITGET`/`INITSET`.
    fn parse_object_literal(&mut self) -> CompileResult<IValue> {
        let line = self.line();
        self.cursor.advance()?;
        let obj_reg = {
            let mut e = self.emitter();
            let r = e.func.alloc_temp(e.limits)?;
            e.emit(Instruction::abc3(Opcode::NewObj, r, 0, 0, line));
            r
        };
        let max_batch = self.limits.max_object_init_pairs;
        let mut batch_start: Option<u16> = None;
        let mut batch_count: u16 = 0;
        // Duplicate-key policy (ES5.1 §11.1.5): track what kind of
        // definition each key has already seen.
        let mut seen: std::collections::HashMap<String, KeyKind> = std::collections::HashMap::new();

        loop {
            if self.cursor.current().is_punct(Punct::RBrace) {
                break;
            }
            let (kind, key_name) = self.parse_property_assignment(obj_reg, &mut batch_start, &mut batch_count, line)?;
            self.check_duplicate_key(&mut seen, &key_name, kind, line)?;
            if batch_count as usize >= max_batch {
                self.flush_object_batch(obj_reg, batch_start.take().unwrap(), batch_count, line)?;
                batch_count = 0;
            }
            if self.cursor.current().is_punct(Punct::Comma) {
                self.cursor.advance()?;
            } else {
                break;
            }
        }
        if batch_count > 0 {
            self.flush_object_batch(obj_reg, batch_start.unwrap(), batch_count, line)?;
        }
        self.cursor.expect_punct(Punct::RBrace)?;
        Ok(IValue::plain_rc(RegConst::Reg(obj_reg)))
    }

    fn check_duplicate_key(
        &mut self,
        seen: &mut std::collections::HashMap<String, KeyKind>,
        key: &str,
        kind: KeyKind,
        line: u32,
    ) -> CompileResult<()> {
        let is_strict = self.cur_func().flags.is_strict;
        match seen.get(key).copied() {
            None => {
                seen.insert(key.to_string(), kind);
                Ok(())
            }
            Some(KeyKind::Data) if kind == KeyKind::Data => {
                if is_strict {
                    Err(CompileError::syntax(format!("duplicate data property `{key}` in strict mode object literal"))
                        .with_line(line))
                } else {
                    seen.insert(key.to_string(), kind);
                    Ok(())
                }
            }
            Some(KeyKind::Get) if kind == KeyKind::Get => {
                Err(CompileError::syntax(format!("duplicate getter `{key}` in object literal")).with_line(line))
            }
            Some(KeyKind::Set) if kind == KeyKind::Set => {
                Err(CompileError::syntax(format!("duplicate setter `{key}` in object literal")).with_line(line))
            }
            Some(_) => {
                Err(CompileError::syntax(format!("property `{key}` cannot mix data and accessor definitions"))
                    .with_line(line))
            }
        }
    }

    /// Parses one `key: value`, `get key() {..}`, or `set key(v) {..}`
    /// entry. Plain pairs are appended to the in-progress batch (both
    /// slots allocated by the caller's batching state); accessors flush
    /// whatever batch is pending and emit their own `INITGET`/`INITSET`
    /// immediately, since each needs its own 2-register range.
    fn parse_property_assignment(
        &mut self,
        obj_reg: u16,
        batch_start: &mut Option<u16>,
        batch_count: &mut u16,
        line: u32,
    ) -> CompileResult<(KeyKind, String)> {
        // `get`/`set` only introduces an accessor when a property key
        // follows directly; `{ get: 1 }` uses `get` as a plain data key.
        let accessor_kind = self.cursor.current().as_ident().filter(|k| *k == "get" || *k == "set").map(str::to_string);

        // Lookahead-free disambiguation: if `get`/`set` is itself followed
        // by `:` or `,`/`}` it must be the plain property key, not the
        // accessor introducer (ES5.1 §11.1.5). We only know this once the
        // key parse below consumes the *next* token, so peek one token
        // past `get`/`set` by checking whether it is followed by a token
        // that can itself start a `PropertyName`.
        if let Some(kw) = accessor_kind {
            let saved = self.cursor.mark();
            self.cursor.advance()?; // eat `get`/`set`
            let followed_by_key = self.cursor.current().identifier_name().is_some()
                || matches!(
                    self.cursor.current().kind,
                    TokenKind::Literal(Literal::String { .. } | Literal::Number(_))
                );
            let is_accessor = followed_by_key && !self.cursor.current().is_punct(Punct::Colon);
            if !is_accessor {
                self.cursor.restore(saved)?;
            } else {
                let is_get = kw == "get";
                let key = self.parse_property_key()?;
                self.cursor.expect_punct(Punct::LParen)?;
                if !is_get {
                    let param = self.cursor.current().as_ident().map(str::to_string).ok_or_else(|| {
                        CompileError::syntax("expected setter parameter name").with_line(self.cursor.line())
                    })?;
                    self.cursor.advance()?;
                    self.cursor.expect_punct(Punct::RParen)?;
                    let func_val = self.parse_function_literal_body(None, vec![param])?;
                    return self.finish_accessor(obj_reg, batch_start, batch_count, key, is_get, func_val, line);
                }
                self.cursor.expect_punct(Punct::RParen)?;
                let func_val = self.parse_function_literal_body(None, Vec::new())?;
                return self.finish_accessor(obj_reg, batch_start, batch_count, key, is_get, func_val, line);
            }
        }

        let key = self.parse_property_key()?;
        self.cursor.expect_punct(Punct::Colon)?;
        let key_slot = {
            let mut e = self.emitter();
            let key_idx = e.func.add_name_const(&key, e.limits)?;
            let slot = e.func.alloc_temp(e.limits)?;
            move_into(&mut e, slot, RegConst::Const(key_idx), line);
            slot
        };
        let val = self.parse_assignment_expression()?;
        {
            let mut e = self.emitter();
            let val_slot = e.func.alloc_temp(e.limits)?;
            debug_assert_eq!(val_slot, key_slot + 1, "key/value must be adjacent for MPUTOBJ");
            let rc = val.to_regconst(&mut e, ISpec::AllowConst, line)?;
            move_into(&mut e, val_slot, rc, line);
            e.func.release_temps_to(val_slot + 1);
        }
        if batch_start.is_none() {
            *batch_start = Some(key_slot);
        }
        *batch_count += 1;
        Ok((KeyKind::Data, key))
    }

    fn finish_accessor(
        &mut self,
        obj_reg: u16,
        batch_start: &mut Option<u16>,
        batch_count: &mut u16,
        key: String,
        is_get: bool,
        func_val: IValue,
        line: u32,
    ) -> CompileResult<(KeyKind, String)> {
        if *batch_count > 0 {
            self.flush_object_batch(obj_reg, batch_start.take().unwrap(), *batch_count, line)?;
            *batch_count = 0;
        }
        let key_reg = {
            let mut e = self.emitter();
            let key_idx = e.func.add_name_const(&key, e.limits)?;
            let r = e.func.alloc_temp(e.limits)?;
            move_into(&mut e, r, RegConst::Const(key_idx), line);
            r
        };
        {
            let mut e = self.emitter();
            let closure_reg = e.func.alloc_temp(e.limits)?;
            debug_assert_eq!(closure_reg, key_reg + 1);
            let func_rc = func_val.to_regconst(&mut e, ISpec::AllowConst, line)?;
            move_into(&mut e, closure_reg, func_rc, line);
            let op = if is_get { Opcode::InitGet } else { Opcode::InitSet };
            e.emit_range_op(op, key_reg, 2, obj_reg, line)?;
            e.func.release_temps_to(key_reg);
        }
        Ok((if is_get { KeyKind::Get } else { KeyKind::Set }, key))
    }

    fn parse_property_key(&mut self) -> CompileResult<String> {
        let tok = self.cursor.current().clone();
        let key = if let Some(name) = tok.identifier_name() {
            self.cursor.advance()?;
            name
        } else {
            match &tok.kind {
                TokenKind::Literal(Literal::String { value, .. }) => {
                    let v = value.clone();
                    self.cursor.advance()?;
                    v
                }
                TokenKind::Literal(Literal::Number(n)) => {
                    let v = crate::value::Value::Number(*n).to_string();
                    self.cursor.advance()?;
                    v
                }
                _ => {
                    return Err(CompileError::syntax(format!("expected property name, found {}", tok.kind))
                        .with_line(tok.line))
                }
            }
        };
        Ok(key)
    }

    fn flush_object_batch(&mut self, obj_reg: u16, start: u16, pair_count: u16, line: u32) -> CompileResult<()> {
        let mut e = self.emitter();
        e.emit_range_op(Opcode::MPutObj, start, pair_count, obj_reg, line)?;
        e.func.release_temps_to(start);
        Ok(())
    }

    // ---- new / call ------------------------------------------------------

    /// `new Callee(args...)`. `NewExpression` without
    /// arguments (`new Foo`) is also valid ES5 grammar; distinguished from
    /// `new Foo()` purely by whether a `(` follows the member expression.
    fn parse_new_expression(&mut self) -> CompileResult<IValue> {
        let line = self.line();
        self.cursor.advance()?;
        // `new` binds to a MemberExpression (no call) at this precedence,
        // so nested `new`/member access is parsed directly rather than via
        // the general Pratt loop (which would also consume a `(...)` call
        // suffix that belongs to `new`, not to the callee).
        let callee = self.parse_new_callee()?;
        let mut e = self.emitter();
        let callee_reg = {
            let rc = callee.to_regconst(&mut e, ISpec::RequireTemp, line)?;
            match rc {
                RegConst::Reg(r) => r,
                RegConst::Const(_) => unreachable!("REQUIRE_TEMP always yields a register"),
            }
        };
        drop(e);
        let argc = if self.cursor.current().is_punct(Punct::LParen) {
            self.cursor.advance()?;
            let mut e = self.emitter();
            let base_for_args = e.func.alloc_temp(e.limits)?;
            debug_assert_eq!(base_for_args, callee_reg + 1, "constructor args follow the callee register");
            drop(e);
            let argc = self.parse_arguments_into(callee_reg + 1)?;
            self.cursor.expect_punct(Punct::RParen)?;
            argc
        } else {
            0
        };
        let mut e = self.emitter();
        let dst = e.func.alloc_temp(e.limits)?;
        e.emit_new(dst, callee_reg, argc, line)?;
        Ok(IValue::plain_rc(RegConst::Reg(dst)))
    }

    /// A `new` callee is a `MemberExpression` (property/index access
    /// allowed, calls are not — a `(` there belongs to `new`'s own
    /// argument list).
    fn parse_new_callee(&mut self) -> CompileResult<IValue> {
        let mut left = self.nud()?;
        loop {
            let line = self.line();
            match &self.cursor.current().kind {
                TokenKind::Punct(Punct::Dot) => left = self.parse_member_dot(left, line)?,
                TokenKind::Punct(Punct::LBracket) => left = self.parse_member_index(left, line)?,
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_call(&mut self, callee: IValue, line: u32) -> CompileResult<IValue> {
        self.cursor.advance()?;
        let (base, is_eval_callee) = self.emit_call_setup(callee, line)?;
        if is_eval_callee {
            resolver::marks_direct_eval(self.cur_func(), Some("eval"));
        }
        let argc = self.parse_arguments_into(base + 2)?;
        self.cursor.expect_punct(Punct::RParen)?;
        let flags = if is_eval_callee { call_flags::EVALCALL } else { 0 };
        let mut e = self.emitter();
        e.emit_call(flags, base, argc, line)?;
        Ok(IValue::plain_rc(RegConst::Reg(base)))
    }

    /// Sets up the callee/`this` pair for a call expression: identifier base uses `CSVAR`/`CSREG`, property base
    /// `CSPROP`, anything else falls back through a temp and `CSREG`.
    /// Returns the base register of the two-register (callee, this) block
    /// and whether the syntactic callee was the bare identifier `eval`.
    fn emit_call_setup(&mut self, callee: IValue, line: u32) -> CompileResult<(u16, bool)> {
        match callee {
            IValue::Var(VarRef::Reg(reg), name) => {
                let mut e = self.emitter();
                let base = e.func.alloc_temp(e.limits)?;
                e.func.alloc_temp(e.limits)?;
                let reg_s = e.to_short(RegConst::Reg(reg), line)?;
                e.emit(Instruction::a_bc(Opcode::CsReg, base, u32::from(reg_s.index()), line));
                Ok((base, name.as_ref() == "eval"))
            }
            IValue::Var(VarRef::Name(name_idx), name) => {
                let mut e = self.emitter();
                let base = e.func.alloc_temp(e.limits)?;
                e.func.alloc_temp(e.limits)?;
                e.emit(Instruction::a_bc(Opcode::CsVar, base, u32::from(name_idx), line));
                Ok((base, name.as_ref() == "eval"))
            }
            IValue::Prop { base: pbase, key } => {
                let mut e = self.emitter();
                let dst_base = e.func.alloc_temp(e.limits)?;
                e.func.alloc_temp(e.limits)?;
                let pbase_s = e.to_short(pbase, line)?;
                let key_s = e.to_short(key, line)?;
                e.emit(Instruction::abc3(Opcode::CsProp, dst_base, pbase_s.encode(), key_s.encode(), line));
                Ok((dst_base, false))
            }
            other => {
                let mut e = self.emitter();
                let rc = other.to_regconst(&mut e, ISpec::RequireTemp, line)?;
                let reg = match rc {
                    RegConst::Reg(r) => r,
                    RegConst::Const(_) => unreachable!("REQUIRE_TEMP always yields a register"),
                };
                let dst_base = e.func.alloc_temp(e.limits)?;
                e.func.alloc_temp(e.limits)?;
                let reg_s = e.to_short(RegConst::Reg(reg), line)?;
                e.emit(Instruction::a_bc(Opcode::CsReg, dst_base, u32::from(reg_s.index()), line));
                Ok((dst_base, false))
            }
        }
    }

    /// Parses a comma-separated `ArgumentList` (or constructor argument
    /// list), writing each value into consecutive registers starting at
    /// `start_reg`. Returns the argument count.
    fn parse_arguments_into(&mut self, start_reg: u16) -> CompileResult<u16> {
        let line = self.line();
        let mut count: u16 = 0;
        if self.cursor.current().is_punct(Punct::RParen) {
            return Ok(0);
        }
        loop {
            let arg = self.parse_assignment_expression()?;
            {
                let mut e = self.emitter();
                let dst = e.func.alloc_temp(e.limits)?;
                debug_assert_eq!(dst, start_reg + count, "arguments must land in consecutive registers");
                let rc = arg.to_regconst(&mut e, ISpec::AllowConst, line)?;
                move_into(&mut e, dst, rc, line);
            }
            count += 1;
            if self.cursor.current().is_punct(Punct::Comma) {
                self.cursor.advance()?;
            } else {
                break;
            }
        }
        Ok(count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Data,
    Get,
    Set,
}
