//! IVALUE Engine: the intermediate-value abstraction the
//! expression parser produces instead of eagerly emitting code for every
//! subexpression, plus constant folding and final materialization into a
//! register or constant-pool `RegConst`.
//!
//! Built around a deferred-codegen pattern: callers hold an unmaterialized
//! intermediate and decide late whether it can fold to a constant; `es5c`
//! expresses that as an explicit sum type because the register machine
//! (unlike a pure stack machine) needs to know *which* register or constant
//! an operand will live in before emitting the consumer instruction. Four
//! tags: `PLAIN` (a literal or an already-materialized regconst), `ARITH`
//! (a pending binary op, foldable), `PROP` (a pending property read), `VAR`
//! (a pending variable reference, not yet resolved to register vs. slow
//! name lookup).

use crate::emitter::Emitter;
use crate::error::CompileResult;
use crate::opcode::{ExtraOp, Opcode, RegConst};
use crate::value::{canonicalize_nan, Value};

/// `PLAIN`'s payload.
#[derive(Debug, Clone)]
pub enum PlainVal {
    Lit(Value),
    Rc(RegConst),
}

/// `VAR`'s payload: exactly one of the two is meaningful, mirroring
/// `resolver::lookup_lhs`'s "(reg_varbind, reg_varname) where exactly one is
/// non-negative".
#[derive(Debug, Clone, Copy)]
pub enum VarRef {
    Reg(u16),
    /// Constant-pool index of the interned identifier name.
    Name(u16),
}

/// An intermediate value produced by `nud`/`led` handlers, not yet
/// materialized to a register or constant.
#[derive(Debug, Clone)]
pub enum IValue {
    Plain(PlainVal),
    /// An unevaluated binary arithmetic/string-concat expression, kept
    /// symbolic so two plain operands can still fold after further `led`
    /// chaining.
    Arith { op: ArithOp, lhs: Box<IValue>, rhs: Box<IValue> },
    /// A property read not yet reduced to a value: `base[key]`.
    Prop { base: RegConst, key: RegConst },
    /// A pending variable reference. The identifier
    /// text rides along even once resolved to a register or constant, so
    /// an assignment target's source name is still available for the
    /// strict-mode `eval`/`arguments` checks
    /// without re-deriving it from the constant pool.
    Var(VarRef, std::rc::Rc<str>),
}

impl IValue {
    #[must_use]
    pub fn plain_lit(v: Value) -> Self {
        IValue::Plain(PlainVal::Lit(v))
    }

    #[must_use]
    pub fn plain_rc(rc: RegConst) -> Self {
        IValue::Plain(PlainVal::Rc(rc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    #[must_use]
    pub fn opcode(self) -> Opcode {
        match self {
            ArithOp::Add => Opcode::Add,
            ArithOp::Sub => Opcode::Sub,
            ArithOp::Mul => Opcode::Mul,
            ArithOp::Div => Opcode::Div,
            ArithOp::Mod => Opcode::Mod,
        }
    }
}

/// How eagerly an IVALUE must be reduced to a concrete operand slot
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ISpec {
    /// A constant-pool reference is acceptable; a register is too.
    AllowConst,
    /// Must land in a register, even if it started out as a plain
    /// constant (e.g. an opcode with no constant-operand form).
    RequireTemp,
    /// Must fit a short (9-bit) operand slot once encoded, shuffling
    /// through a scratch register if not.
    RequireShort,
}

impl IValue {
    /// Folds numeric arithmetic and (only for `+`) string concatenation at
    /// compile time when both operands are already plain literals.
    /// Returns the unfolded `Arith` node when folding doesn't apply (either
    /// operand isn't a literal yet, or the operator/type combination isn't
    /// one the source folds).
    #[must_use]
    pub fn fold(op: ArithOp, lhs: IValue, rhs: IValue) -> IValue {
        if let (IValue::Plain(PlainVal::Lit(l)), IValue::Plain(PlainVal::Lit(r))) = (&lhs, &rhs) {
            if let Some(folded) = fold_plain(op, l, r) {
                return IValue::plain_lit(folded);
            }
        }
        IValue::Arith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    /// Reduces this IVALUE to a concrete register-or-constant operand,
    /// emitting whatever code is needed along the way.
    pub fn to_regconst(self, emitter: &mut Emitter<'_>, spec: ISpec, line: u32) -> CompileResult<RegConst> {
        let rc = match self {
            IValue::Plain(PlainVal::Lit(v)) => {
                singleton_or_number_or_const(emitter, v, spec, line)?
            }
            IValue::Plain(PlainVal::Rc(rc)) => rc,
            IValue::Var(VarRef::Reg(r), _) => RegConst::Reg(r),
            IValue::Var(VarRef::Name(name_const), _) => {
                let dst = emitter.func.alloc_temp(emitter.limits)?;
                emitter.emit(crate::opcode::Instruction::a_bc(Opcode::GetVar, dst, u32::from(name_const), line));
                RegConst::Reg(dst)
            }
            IValue::Prop { base, key } => {
                let dst = emitter.func.alloc_temp(emitter.limits)?;
                let base = emitter.to_short(base, line)?;
                let key = emitter.to_short(key, line)?;
                emitter.emit(crate::opcode::Instruction::abc3(Opcode::GetProp, dst, base.encode(), key.encode(), line));
                RegConst::Reg(dst)
            }
            IValue::Arith { op, lhs, rhs } => {
                let lhs_rc = lhs.to_regconst(emitter, ISpec::AllowConst, line)?;
                let rhs_rc = rhs.to_regconst(emitter, ISpec::AllowConst, line)?;
                let dst = emitter.func.alloc_temp(emitter.limits)?;
                let lhs_rc = emitter.to_short(lhs_rc, line)?;
                let rhs_rc = emitter.to_short(rhs_rc, line)?;
                emitter.emit(crate::opcode::Instruction::abc3(
                    op.opcode(),
                    dst,
                    lhs_rc.encode(),
                    rhs_rc.encode(),
                    line,
                ));
                RegConst::Reg(dst)
            }
        };
        match spec {
            ISpec::AllowConst => Ok(rc),
            ISpec::RequireTemp => {
                if rc.is_const() {
                    let dst = emitter.func.alloc_temp(emitter.limits)?;
                    let short = emitter.to_short(rc, line)?;
                    emitter.emit(crate::opcode::Instruction::a_bc(Opcode::LdReg, dst, u32::from(short.index()), line));
                    Ok(RegConst::Reg(dst))
                } else {
                    Ok(rc)
                }
            }
            ISpec::RequireShort => emitter.to_short(rc, line),
        }
    }
}

/// Materializes a literal value:
/// `undefined`/`null`/`true`/`false` get dedicated extra-opcodes; whole
/// numbers in range get `LDINT`(`+LDINTX`); everything else interns into
/// the constant pool.
fn singleton_or_number_or_const(
    emitter: &mut Emitter<'_>,
    v: Value,
    spec: ISpec,
    line: u32,
) -> CompileResult<RegConst> {
    match v {
        Value::Undefined | Value::Null | Value::Boolean(_) => {
            let dst = emitter.func.alloc_temp(emitter.limits)?;
            let extra = match v {
                Value::Undefined => ExtraOp::LdUndef,
                Value::Null => ExtraOp::LdNull,
                Value::Boolean(true) => ExtraOp::LdTrue,
                Value::Boolean(false) => ExtraOp::LdFalse,
                _ => unreachable!(),
            };
            emitter.emit_extra(extra, dst, 0, line);
            Ok(RegConst::Reg(dst))
        }
        Value::Number(n) if is_small_whole(n) => {
            let dst = emitter.func.alloc_temp(emitter.limits)?;
            emitter.emit_loadint(dst, n as i64, line);
            Ok(RegConst::Reg(dst))
        }
        other => {
            let idx = emitter.func.add_const(other, emitter.limits)?;
            if spec == ISpec::AllowConst {
                Ok(RegConst::Const(idx))
            } else {
                let dst = emitter.func.alloc_temp(emitter.limits)?;
                emitter.emit(crate::opcode::Instruction::a_bc(Opcode::LdConst, dst, u32::from(idx), line));
                Ok(RegConst::Reg(dst))
            }
        }
    }
}

/// `true` for an integral `f64` that fits the widest immediate `LDINT`/
/// `LDINTX` pair can carry, so the emitter never has to intern a plain
/// small integer into the constant pool.
#[must_use]
fn is_small_whole(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < (1i64 << 32) as f64
}

/// Attempts compile-time folding of a binary arithmetic/concat operation
/// over two already-plain literal values. Only `+` over two literal
/// strings folds as concatenation; `+ - * /` fold two literal numbers.
/// `%` never folds, and a mixed string/number `+` never folds either: both
/// would require reproducing ECMAScript's `Number::toString` (exponential
/// notation past ~1e21, `"Infinity"`/`"NaN"` spellings) rather than Rust's
/// `f64` `Display`, so those cases are left for the runtime `ADD`/`MOD`
/// opcode to evaluate instead of baking in a wrong string.
fn fold_plain(op: ArithOp, l: &Value, r: &Value) -> Option<Value> {
    match (op, l, r) {
        (ArithOp::Add, Value::String(a), Value::String(b)) => Some(Value::String(format!("{a}{b}"))),
        (ArithOp::Add, Value::Number(a), Value::Number(b)) => Some(Value::Number(canonicalize_nan(a + b))),
        (ArithOp::Sub, Value::Number(a), Value::Number(b)) => Some(Value::Number(canonicalize_nan(a - b))),
        (ArithOp::Mul, Value::Number(a), Value::Number(b)) => Some(Value::Number(canonicalize_nan(a * b))),
        (ArithOp::Div, Value::Number(a), Value::Number(b)) => Some(Value::Number(canonicalize_nan(a / b))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_numeric_add() {
        let folded = IValue::fold(ArithOp::Add, IValue::plain_lit(Value::Number(1.0)), IValue::plain_lit(Value::Number(2.0)));
        match folded {
            IValue::Plain(PlainVal::Lit(Value::Number(n))) => assert_eq!(n, 3.0),
            _ => panic!("expected a folded numeric plain value"),
        }
    }

    #[test]
    fn fold_string_concat_only_for_add() {
        let a = IValue::plain_lit(Value::String("a".into()));
        let b = IValue::plain_lit(Value::String("b".into()));
        match IValue::fold(ArithOp::Add, a.clone(), b.clone()) {
            IValue::Plain(PlainVal::Lit(Value::String(s))) => assert_eq!(s, "ab"),
            _ => panic!("expected folded string concat"),
        }
        match IValue::fold(ArithOp::Sub, a, b) {
            IValue::Arith { .. } => {}
            _ => panic!("`-` must not fold two strings"),
        }
    }

    #[test]
    fn negative_zero_distinct_from_positive_zero() {
        let pos = Value::Number(0.0);
        let neg = Value::Number(-0.0);
        assert!(!pos.same_value(&neg));
    }

    #[test]
    fn mod_never_folds_at_compile_time() {
        let a = IValue::plain_lit(Value::Number(7.0));
        let b = IValue::plain_lit(Value::Number(2.0));
        match IValue::fold(ArithOp::Mod, a, b) {
            IValue::Arith { op: ArithOp::Mod, .. } => {}
            _ => panic!("`%` must always be left to the runtime MOD opcode"),
        }
    }

    #[test]
    fn mixed_string_and_number_add_never_folds() {
        let s = IValue::plain_lit(Value::String("x".into()));
        let n = IValue::plain_lit(Value::Number(1.0));
        match IValue::fold(ArithOp::Add, s.clone(), n.clone()) {
            IValue::Arith { .. } => {}
            _ => panic!("mixed string/number `+` must not fold: Rust's f64 Display diverges from Number::toString"),
        }
        match IValue::fold(ArithOp::Add, n, s) {
            IValue::Arith { .. } => {}
            _ => panic!("mixed number/string `+` must not fold either"),
        }
    }
}
