//! Label Manager: tracks the active label/loop stack so
//! `break`/`continue` can resolve to either a cheap patched `JUMP` (the
//! common case — no intervening `catch`/`with` boundary) or a slow
//! `BREAK`/`CONTINUE` opcode the VM unwinds through when one is crossed.
//!
//! Each labeled construct gets a monotonically increasing `id` rather than reusing its stack position, since `BREAK`/
//! `CONTINUE` opcodes name a label by this id and must keep naming the same
//! one even as other labels push and pop around it.

use crate::emitter::Emitter;
use crate::error::CompileError;
use crate::func_state::LabelInfo;
use crate::opcode::{ExtraOp, Opcode};

/// Label-site instructions: `LABEL id`, then a break-jump slot and a
/// continue-jump slot, both initially `JUMP`s to themselves (patched later,
/// or left as `INVALID`-by-convention 0 targets if never taken).
pub struct LabelSite {
    pub label_pc: usize,
    pub break_slot: usize,
    pub continue_slot: usize,
}

/// Pushes a new label scope and emits its `LABEL id` plus break/continue
/// jump slots. `name` is `None` for the implicit label every loop/`switch`
/// carries so unlabeled `break`/`continue` always has a target.
/// `allow_continue` is `false` for `switch` (break-only).
pub fn push_label(emitter: &mut Emitter<'_>, name: Option<String>, is_loop: bool, allow_continue: bool, line: u32) -> LabelSite {
    let id = emitter.func.next_label_id;
    emitter.func.next_label_id += 1;
    let label_pc = emitter.emit_extra(ExtraOp::Label, id as u16, 0, line);
    let break_slot = emitter.emit_jump(Opcode::Jump, line).0;
    let continue_slot = emitter.emit_jump(Opcode::Jump, line).0;
    // Neither slot is taken unconditionally; patch_jump_here at the natural
    // fallthrough point below keeps them well-formed even if no break or
    // continue ever targets them. Every actual break/continue that targets
    // this label instead jumps straight to this slot, which is the only
    // thing `pop_label`/`patch_continues` ever has to repatch.
    emitter.patch_jump(crate::emitter::JumpSite(break_slot), break_slot + 1);
    emitter.patch_jump(crate::emitter::JumpSite(continue_slot), continue_slot + 1);

    let info = LabelInfo {
        id,
        name,
        pc: label_pc,
        catch_depth: emitter.func.catch_depth,
        with_depth: emitter.func.with_depth,
        break_slot,
        continue_slot,
        is_loop,
        allow_continue,
    };
    emitter.func.labelinfos.push(info);
    LabelSite { label_pc, break_slot, continue_slot }
}

/// Pops the innermost label scope, patching its reserved break slot to
/// `break_target` and emitting the closing `ENDLABEL id`. Every `break`
/// that targeted this label already chains through that one slot, so a
/// single patch here retargets all of them at once; the peephole pass
/// then collapses each break's own jump-to-slot straight to `break_target`.
pub fn pop_label(emitter: &mut Emitter<'_>, break_target: usize, line: u32) {
    if let Some(info) = emitter.func.labelinfos.pop() {
        emitter.func.code[info.break_slot].wide = break_target as u32;
        emitter.emit_extra(ExtraOp::EndLabel, info.id as u16, 0, line);
    }
}

/// Looks up the label `name` refers to (innermost active scope when `name`
/// is `None`), for `break`/`continue` target resolution. A `continue` may skip past an intervening
/// `switch`'s empty label, which does not allow continue.
#[must_use]
pub fn lookup_active_label<'f>(
    labelinfos: &'f [LabelInfo],
    name: Option<&str>,
    is_continue: bool,
) -> Option<&'f LabelInfo> {
    labelinfos.iter().rev().find(|l| {
        let name_matches = match name {
            Some(n) => l.name.as_deref() == Some(n),
            None => true,
        };
        name_matches && (!is_continue || l.allow_continue)
    })
}

/// Emits a `break`/`continue` targeting `name` (or the innermost eligible
/// label when `None`). When the label sits behind a `catch`/`with`
/// boundary relative to the current position, a slow `BREAK`/`CONTINUE`
/// opcode is emitted instead of a direct patched jump, since the VM must
/// first unwind the intervening exception/scope frames.
pub fn emit_break_or_continue(
    emitter: &mut Emitter<'_>,
    name: Option<&str>,
    is_continue: bool,
    line: u32,
) -> Result<(), CompileError> {
    let current_catch = emitter.func.catch_depth;
    let current_with = emitter.func.with_depth;

    let idx = {
        let labelinfos = &emitter.func.labelinfos;
        labelinfos
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| {
                let name_matches = match name {
                    Some(n) => l.name.as_deref() == Some(n),
                    None => true,
                };
                name_matches && (!is_continue || l.allow_continue)
            })
            .map(|(i, _)| i)
    };

    let Some(idx) = idx else {
        let what = if is_continue { "continue" } else { "break" };
        let msg = match name {
            Some(n) => format!("undefined label `{n}` for `{what}`"),
            None => format!("`{what}` not inside a loop or switch"),
        };
        return Err(CompileError::syntax(msg).with_line(line));
    };

    let crosses_boundary = {
        let info = &emitter.func.labelinfos[idx];
        info.catch_depth != current_catch || info.with_depth != current_with
    };

    if crosses_boundary {
        let label_id = emitter.func.labelinfos[idx].id;
        let extra = if is_continue { ExtraOp::Continue } else { ExtraOp::Break };
        emitter.emit_extra(extra, label_id as u16, 0, line);
    } else if is_continue {
        let slot = emitter.func.labelinfos[idx].continue_slot;
        emitter.emit_jump_to(slot, line);
    } else {
        let slot = emitter.func.labelinfos[idx].break_slot;
        emitter.emit_jump_to(slot, line);
    }
    Ok(())
}

/// Patches the innermost active label's reserved continue slot to
/// `target_pc` (the loop's increment/condition re-check point). Every
/// `continue` that targeted this label already chains through that slot.
pub fn patch_continues(emitter: &mut Emitter<'_>, target_pc: usize) {
    if let Some(info) = emitter.func.labelinfos.last() {
        let slot = info.continue_slot;
        emitter.func.code[slot].wide = target_pc as u32;
    }
}
