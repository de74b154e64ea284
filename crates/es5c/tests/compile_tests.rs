use es5c::error::ErrorKind;
use es5c::opcode::{call_flags, Opcode};
use es5c::parser::driver::compile_with;
use es5c::tracer::{CompilerTracer, NoopTracer, RecordingTracer};
use es5c::value::Value;
use es5c::{compile, CompileFlags, FunctionTemplate, Limits};

fn compile_ok(source: &str) -> FunctionTemplate {
    compile(source, Some("test.js".to_owned()), CompileFlags::default())
        .unwrap_or_else(|e| panic!("expected {source:?} to compile, got {e}"))
}

fn compile_err(source: &str) -> es5c::CompileError {
    compile(source, Some("test.js".to_owned()), CompileFlags::default()).expect_err("expected a compile error")
}

fn primary_opcode(word: u32) -> u8 {
    (word & 0x3F) as u8
}

fn find_instruction(tmpl: &FunctionTemplate, op: Opcode) -> Option<u32> {
    tmpl.code.iter().copied().find(|&word| primary_opcode(word) == op.primary_value())
}

#[test]
fn empty_program_compiles() {
    let tmpl = compile_ok("");
    assert!(!tmpl.flags.strict);
    assert_eq!(tmpl.nargs, 0);
}

#[test]
fn use_strict_directive_sets_strict_flag() {
    let tmpl = compile_ok("\"use strict\";\nvar x = 1;");
    assert!(tmpl.flags.strict);
}

#[test]
fn escaped_use_strict_does_not_enable_strict_mode() {
    // The directive must match textually; an escaped character makes the
    // source text differ from the literal string "use strict" even though
    // the decoded value is identical.
    let tmpl = compile_ok("\"use\\x20strict\";\nvar x = 1;");
    assert!(!tmpl.flags.strict);
}

#[test]
fn directive_after_other_statements_is_inert() {
    let tmpl = compile_ok("var x = 1;\n\"use strict\";");
    assert!(!tmpl.flags.strict);
}

#[test]
fn strict_mode_forbids_eval_as_binding_name() {
    let err = compile_err("\"use strict\";\nvar eval = 1;");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn strict_mode_forbids_with_statement() {
    let err = compile_err("\"use strict\";\nwith (obj) {}");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn with_statement_lowers_through_trycatch_with_binding_flag() {
    let tmpl = compile_ok("with (obj) { x = 1; }");
    let word = find_instruction(&tmpl, Opcode::TryCatch).expect("`with` must emit a TRYCATCH instruction");
    let a = (word >> 6) & 0xFF;
    assert_ne!(a as u16 & es5c::opcode::trycatch_flags::WITH_BINDING, 0);
}

#[test]
fn direct_eval_call_marks_enclosing_function_needing_its_own_environment() {
    let tmpl = compile_ok("(function () { eval('1'); return 1; })");
    let inner = &tmpl.funcs[0];
    assert!(inner.flags.newenv, "a function containing a direct `eval` call needs its own environment record");
}

#[test]
fn indirect_eval_via_aliased_reference_does_not_set_newenv() {
    let tmpl = compile_ok("(function () { var e = eval; e('1'); return 1; })");
    let inner = &tmpl.funcs[0];
    assert!(!inner.flags.newenv, "calling through an alias is an indirect eval, not a direct one");
}

#[test]
fn calling_bare_eval_sets_evalcall_flag_on_the_call_instruction() {
    let tmpl = compile_ok("eval('1');");
    let word = find_instruction(&tmpl, Opcode::Call)
        .or_else(|| find_instruction(&tmpl, Opcode::CallI))
        .expect("eval('1') must emit a CALL instruction");
    let a = (word >> 6) & 0xFF;
    assert_ne!(a as u16 & call_flags::EVALCALL, 0, "calling the bare identifier `eval` must set EVALCALL");
}

#[test]
fn tail_call_in_return_position_sets_tailcall_flag() {
    let tmpl = compile_ok("(function () { return g(); })");
    let inner = &tmpl.funcs[0];
    let word = find_instruction(inner, Opcode::Call)
        .or_else(|| find_instruction(inner, Opcode::CallI))
        .expect("`return g()` must emit a CALL instruction");
    let a = (word >> 6) & 0xFF;
    assert_ne!(a as u16 & call_flags::TAILCALL, 0, "a call directly in `return` position must be tail-called");
}

#[test]
fn tail_call_inside_try_block_is_not_tail_called() {
    let tmpl = compile_ok("(function () { try { return g(); } catch (e) { h(); } })");
    let inner = &tmpl.funcs[0];
    let word = find_instruction(inner, Opcode::Call)
        .or_else(|| find_instruction(inner, Opcode::CallI))
        .expect("`return g()` must emit a CALL instruction");
    let a = (word >> 6) & 0xFF;
    assert_eq!(a as u16 & call_flags::TAILCALL, 0, "a call inside a try block is never safe to tail-call");
}

#[test]
fn duplicate_data_property_is_rejected_only_in_strict_mode() {
    let err = compile_err("\"use strict\";\nvar o = { a: 1, a: 2 };");
    assert_eq!(err.kind, ErrorKind::Syntax);

    let tmpl = compile_ok("var o = { a: 1, a: 2 };");
    assert!(!tmpl.flags.strict);
}

#[test]
fn duplicate_getter_is_rejected_regardless_of_strictness() {
    let err = compile_err("var o = { get a() { return 1; }, get a() { return 2; } };");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn mixing_data_and_accessor_on_same_key_is_rejected() {
    let err = compile_err("var o = { a: 1, get a() { return 1; } };");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn for_in_over_var_target_routes_through_enum_opcodes() {
    let tmpl = compile_ok("for (var k in obj) { x = k; }");
    assert!(find_instruction(&tmpl, Opcode::Extra).is_some(), "for-in needs INITENUM/NEXTENUM from the Extra space");
}

#[test]
fn for_in_over_property_target_rewrites_lhs_every_iteration() {
    let tmpl = compile_ok("for (o.k in obj) { }");
    assert!(
        find_instruction(&tmpl, Opcode::PutProp).is_some(),
        "for-in over a property target must write through PUTPROP each iteration"
    );
}

#[test]
fn unknown_break_label_is_a_syntax_error() {
    let err = compile_err("while (cond) { break nosuchlabel; }");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn continue_outside_any_loop_is_a_syntax_error() {
    let err = compile_err("continue;");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn duplicate_label_in_the_same_scope_is_rejected() {
    let err = compile_err("outer: while (cond) { outer: while (cond) { } }");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn continue_cannot_target_a_switchs_implicit_label() {
    let err = compile_err("sw: switch (x) { case 1: continue sw; }");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn switch_with_default_before_cases_still_routes_into_the_first_matching_case() {
    // `default:` appears lexically before any `case`, so falling into its
    // body unconditionally would skip testing earlier-declared cases.
    let tmpl = compile_ok("switch (x) { default: y = 1; break; case 1: y = 2; break; }");
    let jump_count = tmpl.code.iter().filter(|&&word| primary_opcode(word) == Opcode::Jump.primary_value()).count();
    assert!(jump_count >= 2, "switch entry routing plus per-case fallthrough both need jumps");
}

#[test]
fn switch_without_default_falls_through_to_the_end_on_no_match() {
    let tmpl = compile_ok("switch (x) { case 1: y = 1; break; }");
    assert!(find_instruction(&tmpl, Opcode::SEq).is_some());
}

#[test]
fn more_than_one_default_clause_is_rejected() {
    let err = compile_err("switch (x) { default: break; default: break; }");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn return_outside_a_function_is_a_syntax_error() {
    let err = compile_err("return 1;");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn try_without_catch_or_finally_is_rejected() {
    let err = compile_err("try { foo(); }");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn catch_binding_restores_prior_binding_once_the_catch_block_ends() {
    // `e` shadows an outer `var e` only inside the catch block; the
    // compiler must restore the pre-catch binding afterward.
    let tmpl = compile_ok("var e = 1; try { foo(); } catch (e) { bar(); } e = 2;");
    assert!(find_instruction(&tmpl, Opcode::TryCatch).is_some());
}

#[test]
fn throw_with_line_break_before_expression_is_rejected() {
    let err = compile_err("throw\n1;");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

/// A tracer that shares its counters through `Rc<Cell<_>>` so a test can
/// still read them after `compile_with` has consumed the tracer by value.
#[derive(Clone)]
struct CountingTracer {
    collapses: std::rc::Rc<std::cell::Cell<u32>>,
}

impl CompilerTracer for CountingTracer {
    fn on_jump_collapsed(&mut self, _from_pc: usize, _to_pc: usize) {
        self.collapses.set(self.collapses.get() + 1);
    }
}

#[test]
fn jump_chains_collapse_during_the_peephole_pass() {
    let collapses = std::rc::Rc::new(std::cell::Cell::new(0));
    let tracer = CountingTracer { collapses: collapses.clone() };
    let source = "while (cond) { if (skip) { continue; } work(); }";
    let tmpl =
        compile_with(source, Some("test.js".to_owned()), CompileFlags::default(), Limits::default(), tracer)
            .unwrap();
    assert!(!tmpl.code.is_empty());
    assert!(collapses.get() > 0, "a `continue` jumping straight to another jump should collapse in one hop");
}

#[test]
fn recording_tracer_observes_both_compiler_passes() {
    let tracer = RecordingTracer::default();
    let tmpl =
        compile_with("var x = 1;", Some("test.js".to_owned()), CompileFlags::default(), Limits::default(), tracer)
            .unwrap();
    assert!(!tmpl.code.is_empty());
}

#[test]
fn lexer_error_right_after_a_comma_is_not_swallowed() {
    // The token following a consumed `,` is scanned eagerly by
    // `eat_punct`; an unterminated string literal there must surface as a
    // compile error rather than leave the cursor silently desynced.
    let err = compile_err("var a, \"oops;");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn exceeding_max_temps_is_a_range_error() {
    let mut limits = Limits::default();
    limits.max_temps = 4;
    let source = "var a = 1, b = 2, c = 3, d = 4, e = 5, f = 6, g = 7;";
    let err =
        compile_with(source, Some("test.js".to_owned()), CompileFlags::default(), limits, NoopTracer).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn const_pool_deduplicates_identical_string_literals() {
    let tmpl = compile_ok("var a = 'hello'; var b = 'hello';");
    let hello_count = tmpl.consts.iter().filter(|c| matches!(c, Value::String(s) if s == "hello")).count();
    assert_eq!(hello_count, 1, "identical string literals should share one constant-pool entry");
}

#[test]
fn nested_function_declarations_are_recorded_in_the_funcs_table() {
    let tmpl = compile_ok("function outer() { function inner() { return 1; } return inner(); }");
    assert_eq!(tmpl.funcs.len(), 1);
    assert_eq!(tmpl.funcs[0].name.as_deref(), Some("inner"), "the nested template itself must travel with its parent");
}

#[test]
fn arguments_object_flag_set_only_when_actually_referenced() {
    let with_args = compile_ok("(function () { return arguments.length; })");
    assert!(with_args.funcs[0].flags.createargs);

    let without_args = compile_ok("(function () { return 1; })");
    assert!(!without_args.funcs[0].flags.createargs);
}

#[test]
fn named_function_expression_binds_its_own_name_inside_its_body() {
    let tmpl = compile_ok("(function named() { return named; })");
    assert!(tmpl.funcs[0].flags.namebinding);
}

#[test]
fn function_declaration_does_not_set_namebinding() {
    // A declaration's name is already bound in the enclosing scope; only a
    // named function *expression* needs the self-reference binding.
    let tmpl = compile_ok("function outer() { return 1; }");
    assert!(!tmpl.funcs[0].flags.namebinding);
}
