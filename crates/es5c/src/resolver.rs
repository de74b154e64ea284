//! Identifier Resolver: decides whether a name resolves to
//! a live register binding or must fall back to a runtime property lookup
//! on the scope chain, and special-cases `arguments`/`eval` the way
//! ES5.1's binding rules require.

use crate::func_state::FuncState;

/// The outcome of resolving an identifier to either a fast register
/// binding or the slow path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Bound to a register in the current function's varmap.
    Register(u16),
    /// No fast binding available: under a `with`, an unresolved global, or
    /// a name deliberately marked slow.
    Slow,
}

/// Looks up `name` against the current function's active bindings
///. A binding present in
/// `with_depth > 0` code is always treated as slow, since a `with` object
/// could shadow it at runtime regardless of what the static varmap says.
#[must_use]
pub fn lookup_active_register_binding(func: &FuncState, name: &str) -> Resolution {
    if func.with_depth > 0 {
        return Resolution::Slow;
    }
    match func.varmap.get(name) {
        Some(Some(reg)) => Resolution::Register(*reg),
        Some(None) | None => Resolution::Slow,
    }
}

/// Resolution for an identifier appearing as an assignment target
///. Distinct from read resolution because
/// `arguments`/`eval` as an LHS in strict mode is a syntax error the
/// caller must raise, not merely a slow-path access.
#[must_use]
pub fn lookup_lhs(func: &FuncState, name: &str) -> Resolution {
    lookup_active_register_binding(func, name)
}

/// `true` when `name` is the magic `arguments` binding and the current
/// function actually materializes an arguments object. A function whose body never mentions
/// `arguments` never emits the allocation.
#[must_use]
pub fn is_arguments_access(func: &mut FuncState, name: &str) -> bool {
    if name == "arguments" && func.flags.is_function && !func.flags.is_arguments_shadowed {
        func.flags.id_access_arguments = true;
        true
    } else {
        false
    }
}

/// Flags `may_direct_eval` when a call expression's callee resolves to the
/// unbound identifier `eval`.
pub fn marks_direct_eval(func: &mut FuncState, callee_name: Option<&str>) {
    if callee_name == Some("eval") {
        func.flags.may_direct_eval = true;
        func.flags.id_access_slow = true;
    }
}
