//! Function template buffer layout: the bit-exact output the
//! compiler hands to the (out-of-scope) VM — constants, nested function
//! templates, packed code words, a sparse PC→line map, and the template's
//! own flags/metadata. Packing happens exactly once, here, from the
//! symbolic `Instruction` form every other module works with.

use ahash::AHashMap;

use crate::opcode::{Instruction, Shape};
use crate::value::Value;

/// Flags carried alongside a compiled function.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TemplateFlags {
    /// The function needs its own lexical environment record even if it
    /// binds no closed-over variables (e.g. it contains a direct `eval`).
    pub newenv: bool,
    /// The function actually materializes an `arguments` object.
    pub createargs: bool,
    /// A named function expression binds its own name inside its body.
    pub namebinding: bool,
    pub strict: bool,
}

/// A fully compiled function, ready for the VM to load.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionTemplate {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub consts: Vec<Value>,
    /// Packed 32-bit instruction words.
    pub code: Vec<u32>,
    /// Nested function templates, in declaration order; `CLOSURE`'s operand
    /// is a position into this table.
    pub funcs: Vec<FunctionTemplate>,
    /// Sparse PC → source-line mapping; a PC between two entries maps to
    /// the preceding entry's line.
    pub pc2line: Vec<(usize, u32)>,
    pub nregs: u16,
    pub nargs: u16,
    /// Parameter/local variable names the VM needs for `arguments` object
    /// construction and debugging, in declaration order.
    pub formals: Vec<String>,
    /// Name-to-register map retained for slow-path and debugger lookups;
    /// entries with no binding (`None`) were permanently demoted to the
    /// runtime scope-chain lookup path.
    #[serde(with = "varmap_serde")]
    pub varmap: AHashMap<String, Option<u16>>,
    pub flags: TemplateFlags,
}

/// `AHashMap` isn't `serde`-transparent over an `ahash` hasher by default
/// construction parameters; route through a plain `Vec` of pairs instead.
mod varmap_serde {
    use ahash::AHashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(map: &AHashMap<String, Option<u16>>, s: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<(&String, &Option<u16>)> = map.iter().collect();
        entries.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<AHashMap<String, Option<u16>>, D::Error> {
        let entries = Vec::<(String, Option<u16>)>::deserialize(d)?;
        Ok(entries.into_iter().collect())
    }
}

/// Bias added to a `JUMP` instruction's target offset before it is packed
/// into the unsigned 26-bit `AbcWide` field, so a target lying behind the
/// jump (a negative relative offset, as in a loop's closing jump) still
/// packs as a plain non-negative integer. The VM recovers the target as
/// `target_pc = (pc + 1) + (abc - JUMP_BIAS)`. Mirrors Duktape's
/// `duk__emit_jump` biased jump slot.
pub const JUMP_BIAS: u32 = 1 << 25;

/// Packs one symbolic instruction into its bit-exact 32-bit word, per the
/// layout documented on `crate::opcode`: 6-bit primary opcode, then
/// `A:8/B:9/C:9`, `A:8/BC:18`, or `ABC:26` depending on `op.shape()`. `pc`
/// is this instruction's own position in the code buffer, needed to bias
/// a `JUMP`'s absolute target PC (the only use of `Shape::AbcWide`) into a
/// signed offset relative to itself.
#[must_use]
pub fn pack_instruction(pc: usize, instr: &Instruction) -> u32 {
    let op = u32::from(instr.op.primary_value()) & 0x3F;
    match instr.op.shape() {
        Shape::Abc3 => {
            let a = u32::from(instr.a) & 0xFF;
            let b = u32::from(instr.b) & 0x1FF;
            let c = u32::from(instr.c) & 0x1FF;
            op | (a << 6) | (b << 14) | (c << 23)
        }
        Shape::ABc => {
            let a = u32::from(instr.a) & 0xFF;
            let bc = instr.wide & 0x3_FFFF;
            op | (a << 6) | (bc << 14)
        }
        Shape::AbcWide => {
            // `instr.wide` carries the absolute target PC throughout the
            // compiler's symbolic form (peephole collapsing and for-in's
            // jump insertion both reason about it that way); the bias
            // relative to this instruction's own position is only applied
            // here, at final packing.
            let relative = instr.wide as i64 - (pc as i64 + 1);
            let biased = (relative + i64::from(JUMP_BIAS)) as u32 & 0x3FF_FFFF;
            op | (biased << 6)
        }
    }
}

/// Builds the sparse PC→line map from a straight-line instruction buffer,
/// emitting one entry per line change rather than one per instruction
///.
#[must_use]
pub fn build_pc2line(code: &[Instruction]) -> Vec<(usize, u32)> {
    let mut out = Vec::new();
    let mut last_line = None;
    for (pc, instr) in code.iter().enumerate() {
        if last_line != Some(instr.line) {
            out.push((pc, instr.line));
            last_line = Some(instr.line);
        }
    }
    out
}
