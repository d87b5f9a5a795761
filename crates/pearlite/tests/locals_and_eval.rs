//! Dynamic scoping (`local`) and `eval` exception handling.

mod common;

use common::*;
use pretty_assertions::assert_eq;

#[test]
fn local_restores_at_block_exit() {
    let result = run_list(vec![
        assign(our_s("g"), num(1)),
        block(vec![assign(local_s("g"), num(2)), num(0)]),
        list(vec![svar("g")]),
    ]);
    assert_eq!(result, vec!["1"]);
}

#[test]
fn local_array_and_hash_restore_contents() {
    let result = run_list(vec![
        assign(unary("our", avar("a")), list(vec![num(1), num(2)])),
        assign(unary("our", hvar("h")), list(vec![str_lit("k"), num(3)])),
        sub_named(
            "probe",
            vec![list(vec![
                unary("scalar", avar("a")),
                helem("h", "k"),
            ])],
        ),
        sub_named(
            "shadow",
            vec![
                assign(unary("local", avar("a")), list(vec![num(9), num(9), num(9)])),
                unary("local", hvar("h")),
                call("probe", vec![]),
            ],
        ),
        list(vec![
            call("shadow", vec![]),
            unary("scalar", avar("a")),
            helem("h", "k"),
        ]),
    ]);
    // during: 3 elements, no k; after: restored
    assert_eq!(result, vec!["3", "", "2", "3"]);
}

/// `local $h{key}` saves one slot.
#[test]
fn local_hash_element_restores_the_slot() {
    let result = run_list(vec![
        assign(
            unary("our", hvar("h")),
            list(vec![str_lit("k"), num(1), str_lit("other"), num(5)]),
        ),
        sub_named("peek", vec![helem("h", "k")]),
        sub_named(
            "shadow",
            vec![
                assign(unary("local", helem("h", "k")), num(99)),
                call("peek", vec![]),
            ],
        ),
        list(vec![call("shadow", vec![]), helem("h", "k"), helem("h", "other")]),
    ]);
    assert_eq!(result, vec!["99", "1", "5"]);
}

/// `local` made inside an eval block unwinds when the block dies.
#[test]
fn exceptional_exit_restores_locals() {
    let result = run_list(vec![
        assign(our_s("g"), num(1)),
        eval_blk(vec![
            assign(local_s("g"), num(42)),
            unary("die", list(vec![str_lit("boom\n")])),
        ]),
        list(vec![svar("g"), svar("@")]),
    ]);
    assert_eq!(result, vec!["1", "boom\n"]);
}

#[test]
fn nested_evals_catch_at_the_innermost_frame() {
    let result = run_scalar(vec![
        eval_blk(vec![
            eval_blk(vec![unary("die", list(vec![str_lit("inner\n")]))]),
            // the inner eval caught it; $@ holds the message here
            assign(my_s("seen"), svar("@")),
            unary("die", list(vec![concat(str_lit("re:"), svar("seen"))])),
        ]),
        svar("@"),
    ]);
    assert_eq!(result, "re:inner\n");
}

/// Errors without a trailing newline gain the `at FILE line N.` suffix.
#[test]
fn error_scalar_gains_location_suffix() {
    let result = run_scalar(vec![
        eval_blk(vec![unary("die", list(vec![str_lit("oops")]))]),
        svar("@"),
    ]);
    assert_eq!(result, "oops at t.pl line 1.\n");
}

/// `die` with a reference payload passes through `$@` unchanged.
#[test]
fn die_with_reference_payload_round_trips() {
    let result = run_list(vec![
        eval_blk(vec![unary(
            "die",
            list(vec![anon_hash(vec![str_lit("code"), num(404)])]),
        )]),
        list(vec![
            unary("ref", svar("@")),
            binop("->{", svar("@"), ident("code")),
        ]),
    ]);
    assert_eq!(result, vec!["HASH", "404"]);
}

/// An uncaught die propagates out of `execute`.
#[test]
fn uncaught_die_reaches_the_host() {
    let err = run_error(vec![unary("die", list(vec![str_lit("fatal\n")]))]);
    assert_eq!(err.render(), "fatal\n");
}

/// Division by zero is a runtime exception, catchable by eval.
#[test]
fn division_by_zero_is_catchable() {
    let result = run_scalar(vec![
        eval_blk(vec![binop("/", num(1), num(0))]),
        svar("@"),
    ]);
    assert!(
        result.starts_with("Illegal division by zero"),
        "unexpected $@: {result}"
    );
}

/// A successful eval returns its block's value.
#[test]
fn eval_yields_block_value_on_success() {
    let result = run_scalar(vec![eval_blk(vec![binop("+", num(40), num(2))])]);
    assert_eq!(result, "42");
}

/// The catch path leaves the eval's value undef.
#[test]
fn eval_yields_undef_on_catch() {
    let result = run_list(vec![
        assign(
            my_s("v"),
            eval_blk(vec![unary("die", list(vec![str_lit("x\n")])), num(7)]),
        ),
        list(vec![unary("defined", svar("v"))]),
    ]);
    assert_eq!(result, vec![""]);
}

/// Jumping out of an eval block with `last` pops the handler entry: a
/// leaked handler would swallow the next die at the stale catch pc.
#[test]
fn last_out_of_eval_pops_the_handler() {
    let result = run_scalar(vec![
        while_loop(num(1), vec![eval_blk(vec![unary0("last")])]),
        eval_blk(vec![unary("die", list(vec![str_lit("after\n")]))]),
        svar("@"),
    ]);
    assert_eq!(result, "after\n");
}

/// `warn` writes to stderr with the location suffix.
#[test]
fn warn_writes_to_stderr() {
    let unit = compile_program(vec![unary("warn", list(vec![str_lit("careful")]))]);
    let mut r = runner();
    r.interp
        .execute(&unit, pearlite::Value::empty_list(), pearlite::CallContext::Void, None)
        .expect("program runs");
    assert_eq!(r.sink.stderr(), "careful at t.pl line 1.\n");
}

/// `caller` reports the frame stack.
#[test]
fn caller_reports_package_and_file() {
    let result = run_list(vec![
        sub_named("who", vec![unary0("caller")]),
        call("who", vec![]),
    ]);
    assert_eq!(result[0], "main");
    assert_eq!(result[1], "t.pl");
}
