//! Function State: the per-function scratch area live for
//! the duration of compiling one function body — code buffer, constant
//! pool, nested-function table, variable map, label stacks, register
//! watermarks, and the grab-bag of boolean flags the rest of the compiler
//! consults. The code/const/instruction-offset bookkeeping follows a plain
//! builder pattern; the rest is ES5-specific bookkeeping layered on top.

use ahash::AHashMap;

use crate::cursor::CursorMark;
use crate::error::{CompileError, CompileResult};
use crate::limits::Limits;
use crate::opcode::Instruction;
use crate::template::FunctionTemplate;
use crate::value::Value;

/// One variable/function declaration collected during pass 1.
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    /// A `function` declaration; payload is the index into this function's
    /// `funcs` table of the nested template it binds to.
    Func(u32),
}

/// One entry of the nested-function table. Built once, during pass 1; pass
/// 2 only reads it back to fast-forward the lexer past an already-compiled
/// nested body. The finished template travels with the entry so it ends up
/// owned by the enclosing `FunctionTemplate.funcs`, ready for `CLOSURE` to
/// address by position without any external arena to keep alive.
#[derive(Debug, Clone)]
pub struct NestedFunc {
    pub template: FunctionTemplate,
    /// Lexer position just past the closing `}` of this function's body, so
    /// pass 2 can skip straight past it instead of re-parsing.
    pub resume_at: CursorMark,
    pub line: u32,
}

/// A variable binding: either a live register (fast path) or `None`,
/// meaning "exists but must be resolved through the slow path".
pub type VarBinding = Option<u16>;

/// One entry in the active label stack.
#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub id: u32,
    pub name: Option<String>,
    pub pc: usize,
    pub catch_depth: u32,
    pub with_depth: u32,
    /// PC of the label site's reserved break-jump slot. Every fast-path
    /// `break` targeting this label jumps here rather than allocating its
    /// own patch site; this slot itself is patched to the real break
    /// target exactly once, when the label is popped.
    pub break_slot: usize,
    /// PC of the label site's reserved continue-jump slot, same sharing
    /// scheme as `break_slot` (loops only).
    pub continue_slot: usize,
    pub is_loop: bool,
    /// `true` for a `switch`'s implicit label, which accepts `break` but
    /// never `continue`.
    pub allow_continue: bool,
}

#[derive(Debug, Default)]
pub struct FuncFlags {
    pub is_strict: bool,
    pub is_function: bool,
    pub is_eval: bool,
    pub is_global: bool,
    pub is_decl: bool,
    pub is_setget: bool,
    pub in_directive_prologue: bool,
    pub in_scanning: bool,
    pub may_direct_eval: bool,
    pub id_access_arguments: bool,
    pub id_access_slow: bool,
    pub needs_shuffle: bool,
    pub is_arguments_shadowed: bool,
    /// Set once the directive prologue has been terminated by a non-string
    /// statement, so later string-literal expression statements are not
    /// mistaken for directives.
    pub prologue_closed: bool,
}

pub struct FuncState {
    pub code: Vec<Instruction>,
    pub consts: Vec<Value>,
    /// Nested-function table, appended to only during pass 1.
    pub funcs: Vec<NestedFunc>,
    /// How far into `funcs` pass 2 has consumed so far.
    pub funcs_cursor: usize,
    pub decls: Vec<Decl>,
    pub argnames: Vec<String>,
    pub varmap: AHashMap<String, VarBinding>,
    pub labelinfos: Vec<LabelInfo>,
    pub next_label_id: u32,

    pub temp_first: u16,
    pub temp_next: u16,
    pub temp_max: u16,
    /// Base register of the three reserved shuffle scratch registers,
    /// allocated once per function right after its argument registers
    /// so they always sit at a fixed, low, directly
    /// addressable index regardless of how large the function's ordinary
    /// temp range grows.
    pub shuffle_base: Option<u16>,
    /// Rotates which of the three shuffle registers the next `to_short`/
    /// `emit_range_op` call receives, so two operands shuffled back to back
    /// within the same instruction (e.g. both `B` and `C`) don't clobber
    /// each other.
    pub shuffle_cursor: u8,

    pub flags: FuncFlags,

    pub catch_depth: u32,
    pub with_depth: u32,
    pub paren_level: u32,
    pub allow_in: bool,
    pub expr_lhs: bool,
    pub nud_count: u32,
    pub led_count: u32,
    pub recursion_depth: u32,

    /// Register holding the completion value of the statement currently
    /// being compiled, used by `eval`/global code to produce its result
    ///.
    pub reg_stmt_value: Option<u16>,

    pub name: Option<String>,
    pub line: u32,
}

impl FuncState {
    #[must_use]
    pub fn new(is_function: bool, is_strict: bool) -> Self {
        Self {
            code: Vec::new(),
            consts: Vec::new(),
            funcs: Vec::new(),
            funcs_cursor: 0,
            decls: Vec::new(),
            argnames: Vec::new(),
            varmap: AHashMap::new(),
            labelinfos: Vec::new(),
            next_label_id: 0,
            temp_first: 0,
            temp_next: 0,
            temp_max: 0,
            shuffle_base: None,
            shuffle_cursor: 0,
            flags: FuncFlags { is_strict, is_function, in_scanning: true, ..FuncFlags::default() },
            catch_depth: 0,
            with_depth: 0,
            paren_level: 0,
            allow_in: true,
            expr_lhs: false,
            nud_count: 0,
            led_count: 0,
            recursion_depth: 0,
            reg_stmt_value: None,
            name: None,
            line: 1,
        }
    }

    /// Resets the scratch area for pass 2. `decls` also
    /// survives — pass 2's prologue consumes it to populate `varmap` — but
    /// is not re-collected; the statement parser must not push onto it
    /// again while `in_scanning` is false.
    pub fn reset_for_pass2(&mut self) {
        self.code.clear();
        self.consts.clear();
        self.labelinfos.clear();
        self.next_label_id = 0;
        self.funcs_cursor = 0;
        self.temp_first = 0;
        self.temp_next = 0;
        self.temp_max = 0;
        self.shuffle_base = None;
        self.shuffle_cursor = 0;
        self.catch_depth = 0;
        self.with_depth = 0;
        self.paren_level = 0;
        self.allow_in = true;
        self.expr_lhs = false;
        self.nud_count = 0;
        self.led_count = 0;
        self.recursion_depth = 0;
        self.varmap.clear();
        self.flags.in_scanning = false;
        self.flags.in_directive_prologue = true;
        self.flags.prologue_closed = false;
    }

    /// Allocates the next scratch temp register, bumping the high-water
    /// mark. Callers free temps by resetting `temp_next` back down once the
    /// subexpression they were used for has been fully consumed.
    pub fn alloc_temp(&mut self, limits: &Limits) -> CompileResult<u16> {
        if (self.temp_next as usize) >= limits.max_temps {
            return Err(CompileError::range(format!(
                "function uses more than {} registers",
                limits.max_temps
            ))
            .with_line(self.line));
        }
        let r = self.temp_next;
        self.temp_next += 1;
        if self.temp_next > self.temp_max {
            self.temp_max = self.temp_next;
        }
        Ok(r)
    }

    pub fn release_temps_to(&mut self, mark: u16) {
        debug_assert!(mark <= self.temp_next);
        self.temp_next = mark;
    }

    /// Reserves the three scratch shuffle registers right after whatever is
    /// currently allocated. Called unconditionally at the
    /// start of both passes, right after binding argument registers, so
    /// `shuffle_base` always sits at a small, fixed, directly-addressable
    /// index — sidestepping the fixed-point problem of a later pass only
    /// discovering the need for shuffling after register numbers it would
    /// itself shift have already been handed out.
    pub fn reserve_shuffle_registers(&mut self, limits: &Limits) -> CompileResult<()> {
        let r0 = self.alloc_temp(limits)?;
        self.alloc_temp(limits)?;
        self.alloc_temp(limits)?;
        if r0 > crate::opcode::SHORT_MAX.saturating_sub(2) {
            return Err(CompileError::range(
                "too many argument registers to reserve shuffle scratch registers",
            )
            .with_line(self.line));
        }
        self.shuffle_base = Some(r0);
        Ok(())
    }

    #[must_use]
    pub fn temp_mark(&self) -> u16 {
        self.temp_next
    }

    /// Records a `var`/function declaration during pass 1's scan. Pass 1 never allocates registers —
    /// that happens once, in pass 2's prologue, from the finished list.
    pub fn record_decl(&mut self, name: &str, kind: DeclKind) {
        self.decls.push(Decl { name: name.to_string(), kind });
    }

    /// Binds `name` directly to a register (pass 2 prologue: formals,
    /// hoisted `var`/function declarations). Returns the previous binding,
    /// if any, so callers implementing "last function declaration wins" can
    /// detect a rebind.
    pub fn bind_register(&mut self, name: &str, reg: u16) -> Option<VarBinding> {
        self.varmap.insert(name.to_string(), Some(reg))
    }

    /// Marks an existing (or new) binding as slow-path-only.
    pub fn mark_slow(&mut self, name: &str) -> Option<VarBinding> {
        self.varmap.insert(name.to_string(), None)
    }

    /// Adds a constant to the pool, deduplicating by `SameValue` against
    /// only the first `limits.const_dedup_scan_limit` entries — matching a
    /// plain linear scan bounded from the start of the pool, not a
    /// lookback window trailing the end of it.
    pub fn add_const(&mut self, v: Value, limits: &Limits) -> CompileResult<u16> {
        let scan_to = limits.const_dedup_scan_limit.min(self.consts.len());
        for (i, existing) in self.consts[..scan_to].iter().enumerate() {
            if existing.same_value(&v) {
                return Ok(i as u16);
            }
        }
        if self.consts.len() >= limits.max_consts {
            return Err(CompileError::range(format!(
                "function has more than {} constants",
                limits.max_consts
            ))
            .with_line(self.line));
        }
        self.consts.push(v);
        Ok((self.consts.len() - 1) as u16)
    }

    /// Interns an identifier name as a string constant.
    pub fn add_name_const(&mut self, name: &str, limits: &Limits) -> CompileResult<u16> {
        self.add_const(Value::String(name.to_string()), limits)
    }

    /// Appends a newly compiled nested function's table entry during pass 1,
    /// returning the local index `CLOSURE` will reference.
    pub fn add_nested_func(&mut self, nf: NestedFunc) -> usize {
        self.funcs.push(nf);
        self.funcs.len() - 1
    }

    /// Advances past the next nested-function table entry during pass 2,
    /// returning just the lexer position to resume at. The entry's template
    /// stays put in `funcs` for `build_template` to collect later; pass 2
    /// has no use for it beyond skipping the already-compiled body.
    pub fn advance_past_nested_func(&mut self) -> Option<CursorMark> {
        let resume_at = self.funcs.get(self.funcs_cursor)?.resume_at;
        self.funcs_cursor += 1;
        Some(resume_at)
    }

    #[must_use]
    pub fn pc(&self) -> usize {
        self.code.len()
    }
}
