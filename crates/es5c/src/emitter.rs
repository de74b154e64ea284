//! Emitter & Shuffler: appends instructions to the current
//! function's code buffer, patches forward jumps, and reroutes operands
//! that overflow a short operand slot through the three reserved shuffle
//! registers. `emit_jump`/`patch_jump`/`peephole` generalize the familiar
//! stack-machine builder shape to the register machine's
//! A-B-C/A-BC/ABC triple.

use crate::error::{CompileError, CompileResult};
use crate::func_state::FuncState;
use crate::limits::Limits;
use crate::opcode::{ExtraOp, Instruction, Opcode, RegConst};
use crate::tracer::CompilerTracer;

/// A deferred jump: the PC of the `JUMP`/`IF` instruction whose target is
/// not yet known. `patch_jump` overwrites its wide offset field once the
/// target PC is known.
#[derive(Debug, Clone, Copy)]
pub struct JumpSite(pub usize);

pub struct Emitter<'a> {
    pub func: &'a mut FuncState,
    pub limits: &'a Limits,
    pub tracer: &'a mut dyn CompilerTracer,
}

impl<'a> Emitter<'a> {
    pub fn new(func: &'a mut FuncState, limits: &'a Limits, tracer: &'a mut dyn CompilerTracer) -> Self {
        Self { func, limits, tracer }
    }

    /// Appends a raw instruction and returns its PC.
    pub fn emit(&mut self, instr: Instruction) -> usize {
        let pc = self.func.pc();
        self.tracer.on_emit(instr.op, instr.line);
        self.func.code.push(instr);
        pc
    }

    /// Emits an unpatched forward jump (`JUMP` or conditional `IF`),
    /// returning a site to patch once the target is known.
    pub fn emit_jump(&mut self, op: Opcode, line: u32) -> JumpSite {
        JumpSite(self.emit(Instruction::abc_wide(op, 0, line)))
    }

    /// Patches a previously emitted jump to target `target_pc`.
    pub fn patch_jump(&mut self, site: JumpSite, target_pc: usize) {
        let instr = &mut self.func.code[site.0];
        instr.wide = target_pc as u32;
    }

    /// Patches a previously emitted jump to the current end of the code
    /// buffer (the common "jump to here" case).
    pub fn patch_jump_here(&mut self, site: JumpSite) {
        let here = self.func.pc();
        self.patch_jump(site, here);
    }

    /// Emits an unconditional jump straight to a known target (backward
    /// jumps closing a loop never need patching).
    pub fn emit_jump_to(&mut self, target_pc: usize, line: u32) -> usize {
        self.emit(Instruction::abc_wide(Opcode::Jump, target_pc as u32, line))
    }

    /// Inserts an unconditional `JUMP` at `at_pc`, shifting every
    /// already-emitted `JUMP` target and label-site PC at or past `at_pc`
    /// forward by one slot. Only ever used right after the LHS-write
    /// code for a for-in loop has been emitted, while that loop's own jump
    /// sites are still unpatched placeholders with no recorded target — so
    /// the only live references that can land at or past `at_pc` are other
    /// already-patched jumps and enclosing labels' site PCs, both fixed up
    /// here. Returns `at_pc`, now the PC of the inserted jump.
    pub fn insert_jump(&mut self, at_pc: usize, line: u32) -> usize {
        self.func.code.insert(at_pc, Instruction::abc_wide(Opcode::Jump, 0, line));
        for instr in &mut self.func.code {
            if instr.op == Opcode::Jump && instr.wide as usize >= at_pc {
                instr.wide += 1;
            }
        }
        for info in &mut self.func.labelinfos {
            if info.pc >= at_pc {
                info.pc += 1;
            }
            if info.break_slot >= at_pc {
                info.break_slot += 1;
            }
            if info.continue_slot >= at_pc {
                info.continue_slot += 1;
            }
        }
        at_pc
    }

    /// Emits the shortest instruction that loads `value` into `reg`
    ///.
    pub fn emit_loadint(&mut self, reg: u16, value: i64, line: u32) -> usize {
        const ABC_WIDE_MAX: i64 = (1 << 17) - 1;
        const ABC_WIDE_MIN: i64 = -(1 << 17);
        if (ABC_WIDE_MIN..=ABC_WIDE_MAX).contains(&value) {
            let biased = (value - ABC_WIDE_MIN) as u32;
            self.emit(Instruction::a_bc(Opcode::LdInt, reg, biased, line))
        } else {
            let pc = self.emit(Instruction::a_bc(Opcode::LdIntX, reg, 0, line));
            // LDINTX carries its wide payload in the following word's `wide`
            // slot in the real VM encoding; symbolically we just stash it.
            self.func.code[pc].wide = value as u32;
            pc
        }
    }

    /// Ensures `rc` fits a short (9-bit) operand slot. Values that already
    /// fit are returned unchanged; values that don't are spilled through
    /// one of the three reserved shuffle registers via `LDREG`/`LDCONST`,
    /// and the shuffled register is returned in its place.
    pub fn to_short(&mut self, rc: RegConst, line: u32) -> CompileResult<RegConst> {
        if rc.fits_short() {
            return Ok(rc);
        }
        self.tracer.on_shuffle(match rc {
            RegConst::Reg(_) => Opcode::LdReg,
            RegConst::Const(_) => Opcode::LdConst,
        });
        self.func.flags.needs_shuffle = true;
        let scratch = self.alloc_shuffle_reg()?;
        match rc {
            RegConst::Reg(r) => {
                self.emit(Instruction::a_bc(Opcode::LdReg, scratch, u32::from(r), line));
            }
            RegConst::Const(c) => {
                self.emit(Instruction::a_bc(Opcode::LdConst, scratch, u32::from(c), line));
            }
        }
        Ok(RegConst::Reg(scratch))
    }

    /// Picks one of the three reserved shuffle registers. Rotates across calls so
    /// two operands of the same instruction shuffled back to back don't
    /// clobber one another. Falls back to reserving them on the spot if the
    /// driver hasn't already done so (pass 1's throwaway buffer never runs
    /// the real prologue step).
    fn alloc_shuffle_reg(&mut self) -> CompileResult<u16> {
        if self.func.shuffle_base.is_none() {
            self.func.reserve_shuffle_registers(self.limits)?;
        }
        let base = self.func.shuffle_base.expect("just reserved");
        let slot = self.func.shuffle_cursor % self.limits.num_shuffle_regs() as u8;
        self.func.shuffle_cursor = self.func.shuffle_cursor.wrapping_add(1);
        Ok(base + u16::from(slot))
    }

    /// Emits a range-taking opcode (`NEW`/`MPUTOBJ`/`MPUTARR`/`INITGET`/
    /// `INITSET`): direct form when the range's base register fits the
    /// 8-bit `A` slot, otherwise the indirect sibling with a scratch
    /// register pre-loaded (via `LDINT`) with the base's numeric index, so
    /// the VM can compute the range from it at runtime.
    /// `target` is the object/array register the batch writes into (`C`
    /// slot, a full 9 bits — never needs shuffling since it is always a
    /// live temp well inside the register file). `CALL`/`CALLI` use
    /// [`Emitter::emit_call`] instead, since their `A` slot carries flags
    /// rather than the base register.
    pub fn emit_range_op(
        &mut self,
        op: Opcode,
        base: u16,
        count: u16,
        target: u16,
        line: u32,
    ) -> CompileResult<usize> {
        debug_assert!(op.takes_register_range() && op != Opcode::Call);
        if base <= crate::opcode::SHORT_MAX {
            Ok(self.emit(Instruction::abc3(op, base, count, target, line)))
        } else {
            let indirect = op.indirect_variant().ok_or_else(|| {
                CompileError::internal(format!("{op:?} has no indirect variant")).with_line(line)
            })?;
            let scratch = self.alloc_shuffle_reg()?;
            self.emit_loadint(scratch, i64::from(base), line);
            Ok(self.emit(Instruction::abc3(indirect, scratch, count, target, line)))
        }
    }

    /// Emits `CALL`/`CALLI`. Direct when `base` fits
    /// the 9-bit `B` slot; otherwise `CALLI`, with a scratch register
    /// pre-loaded (via `LDINT`) with `base`'s numeric index standing in for
    /// it.
    pub fn emit_call(&mut self, flags: u16, base: u16, argc: u16, line: u32) -> CompileResult<usize> {
        if base <= crate::opcode::SHORT_MAX {
            Ok(self.emit(Instruction::abc3(Opcode::Call, flags, base, argc, line)))
        } else {
            let scratch = self.alloc_shuffle_reg()?;
            self.emit_loadint(scratch, i64::from(base), line);
            Ok(self.emit(Instruction::abc3(Opcode::CallI, flags, scratch, argc, line)))
        }
    }

    /// Emits `NEW`/`NEWI`. Shape
    /// mirrors `CALL`: `A` carries the destination register for the
    /// constructed object, `B` the base of the constructor+arguments
    /// register range, `C` the argument count.
    pub fn emit_new(&mut self, dst: u16, base: u16, argc: u16, line: u32) -> CompileResult<usize> {
        if base <= crate::opcode::SHORT_MAX {
            Ok(self.emit(Instruction::abc3(Opcode::New, dst, base, argc, line)))
        } else {
            let scratch = self.alloc_shuffle_reg()?;
            self.emit_loadint(scratch, i64::from(base), line);
            Ok(self.emit(Instruction::abc3(Opcode::NewI, dst, scratch, argc, line)))
        }
    }

    pub fn emit_extra(&mut self, extra: ExtraOp, b: u16, c: u16, line: u32) -> usize {
        if extra.uses_wide_shape() {
            self.emit(Instruction::extra_wide(extra, b, line))
        } else {
            self.emit(Instruction::extra_bc3(extra, b, c, line))
        }
    }

    /// Bounded peephole pass: collapses chains of unconditional jumps
    /// (`JUMP` targeting another `JUMP`) to their final target. Runs at
    /// most `limits.peephole_max_iter` passes over the buffer so a
    /// pathological chain cannot hang compilation.
    pub fn peephole(&mut self) {
        for _ in 0..self.limits.peephole_max_iter {
            let mut changed = false;
            for pc in 0..self.func.code.len() {
                if self.func.code[pc].op != Opcode::Jump {
                    continue;
                }
                let target = self.func.code[pc].wide as usize;
                if target < self.func.code.len() && self.func.code[target].op == Opcode::Jump {
                    let final_target = self.func.code[target].wide;
                    if final_target != self.func.code[pc].wide {
                        self.tracer.on_jump_collapsed(pc, final_target as usize);
                        self.func.code[pc].wide = final_target;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }
}

impl Limits {
    #[must_use]
    pub fn num_shuffle_regs(&self) -> usize {
        crate::limits::NUM_SHUFFLE_REGS
    }
}
