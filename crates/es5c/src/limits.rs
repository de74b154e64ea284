//! Named compile-time bounds.
//!
//! Hard limits live as named, documented constants rather than inline
//! literals, bundled into a `Limits` struct so tests can shrink them to
//! exercise boundary behavior cheaply (e.g. a tiny `max_temps` to force
//! register shuffling without writing a huge source file).

/// Usable value range of a short (`Abc3` B/C) operand slot once its top bit
/// is reserved as the constant marker. A register or constant beyond this
/// needs shuffling through a scratch register before it can appear directly
/// in a three-operand instruction; see `crate::opcode` for the encoding.
pub const SHORT_MAX: u16 = 0x00FF;

/// Largest value the wide 18-bit `ABc` payload field (`LDCONST`'s source
/// operand) could in principle carry. The compiler's in-memory `RegConst`
/// (`crate::opcode::RegConst::Const`) represents a pool index as a `u16`
/// rather than claiming the full 18 bits, so [`MAX_CONSTS`] below is capped
/// at that representational width, not this wider field ceiling — see
/// DESIGN.md, "constant pool width".
pub const BC_MAX: usize = (1 << 18) - 1;

/// Constants are read-only operands addressed through `LDCONST`'s wide
/// field, so a pool index beyond [`SHORT_MAX`] just means the literal gets
/// read back through a scratch register instead of referenced inline
/// — unlike [`MAX_TEMPS`]/[`MAX_FUNCS`], which name a
/// register or nested-function index that must itself fit an instruction's
/// narrow 8-bit destination slot. Bounded by `RegConst::Const`'s `u16`
/// representation (comfortably inside [`BC_MAX`]).
pub const MAX_CONSTS: usize = 1 << 16;
/// `MAX_FUNCS = MAX_TEMPS = SHORT_MAX + 1`: bounded by the 8-bit destination
/// slot every instruction writes through, with no indirect/wide write form.
pub const MAX_FUNCS: usize = SHORT_MAX as usize + 1;
pub const MAX_TEMPS: usize = SHORT_MAX as usize + 1;

/// Number of scratch registers reserved for operand shuffling.
pub const NUM_SHUFFLE_REGS: usize = 3;

/// Bound on the linear scan used for constant-pool deduplication: "beyond that, new entries are always appended."
pub const CONST_DEDUP_SCAN_LIMIT: usize = 32;

/// Cap on peephole-pass iterations.
pub const PEEPHOLE_MAX_ITER: usize = 16;

/// Maximum values per `MPUTARR` batch.
pub const MAX_ARRAY_INIT_VALUES: usize = 20;

/// Maximum key/value pairs per `MPUTOBJ` batch.
pub const MAX_OBJECT_INIT_PAIRS: usize = 10;

/// Recursion guard depth.
pub const RECURSION_LIMIT: u32 = 2500;

/// Bundled, overridable limits, defaulting to the named constants above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_consts: usize,
    pub max_funcs: usize,
    pub max_temps: usize,
    pub const_dedup_scan_limit: usize,
    pub peephole_max_iter: usize,
    pub max_array_init_values: usize,
    pub max_object_init_pairs: usize,
    pub recursion_limit: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_consts: MAX_CONSTS,
            max_funcs: MAX_FUNCS,
            max_temps: MAX_TEMPS,
            const_dedup_scan_limit: CONST_DEDUP_SCAN_LIMIT,
            peephole_max_iter: PEEPHOLE_MAX_ITER,
            max_array_init_values: MAX_ARRAY_INIT_VALUES,
            max_object_init_pairs: MAX_OBJECT_INIT_PAIRS,
            recursion_limit: RECURSION_LIMIT,
        }
    }
}
