//! End-to-end scenarios: whole programs through compile + execute.

mod common;

use common::*;
use pretty_assertions::assert_eq;

/// `my $n = 0; for (1..10) { $n += $_ } $n` is 55.
#[test]
fn sum_over_range_through_topic() {
    let result = run_scalar(vec![
        assign(my_s("n"), num(0)),
        foreach(
            None,
            range(num(1), num(10)),
            vec![binop("+=", svar("n"), svar("_"))],
        ),
        svar("n"),
    ]);
    assert_eq!(result, "55");
}

/// `sub mk { my $x = shift; sub { ++$x } }` - the closure keeps bumping
/// the same captured cell.
#[test]
fn closure_counter_advances_captured_cell() {
    let result = run_scalar(vec![
        sub_named(
            "mk",
            vec![assign(my_s("x"), unary0("shift")), sub_anon(vec![unary("++", svar("x"))])],
        ),
        assign(my_s("c"), call("mk", vec![num(10)])),
        binop("->(", svar("c"), list(vec![])),
        binop("->(", svar("c"), list(vec![])),
        binop("->(", svar("c"), list(vec![])),
    ]);
    assert_eq!(result, "13");
}

/// Two closures from one maker share the captured cell; closures from
/// separate calls do not.
#[test]
fn capture_sharing_is_per_invocation() {
    let result = run_list(vec![
        sub_named(
            "pair",
            vec![
                assign(my_s("x"), unary0("shift")),
                list(vec![
                    sub_anon(vec![unary("++", svar("x"))]),
                    sub_anon(vec![svar("x")]),
                ]),
            ],
        ),
        assign(
            unary("my", list(vec![svar("bump"), svar("peek")])),
            call("pair", vec![num(5)]),
        ),
        // scalar context takes the last element: the second pair's peeker
        assign(my_s("other"), call("pair", vec![num(100)])),
        binop("->(", svar("bump"), list(vec![])),
        binop("->(", svar("bump"), list(vec![])),
        list(vec![
            binop("->(", svar("peek"), list(vec![])),
            binop("->(", svar("other"), list(vec![])),
        ]),
    ]);
    assert_eq!(result, vec!["7", "100"]);
}

/// `local $g = 42` is visible through a nested call and restored after.
#[test]
fn local_is_dynamic_and_restored() {
    let result = run_list(vec![
        assign(our_s("g"), num(1)),
        sub_named(
            "set_local",
            vec![assign(local_s("g"), num(42)), call("inner", vec![])],
        ),
        sub_named("inner", vec![svar("g")]),
        list(vec![call("set_local", vec![]), svar("g")]),
    ]);
    assert_eq!(result, vec!["42", "1"]);
}

/// `eval { die }` populates `$@`; a successful eval clears it.
#[test]
fn eval_catches_die_and_clears_after_success() {
    let result = run_scalar(vec![
        unary("my", avar("r")),
        eval_blk(vec![unary("die", list(vec![str_lit("oops\n")]))]),
        unary("push", list(vec![avar("r"), svar("@")])),
        eval_blk(vec![unary("push", list(vec![avar("r"), str_lit("ok")]))]),
        join_ws("r"),
    ]);
    assert_eq!(result, "oops\n ok");
}

/// `my ($a, $b, @rest) = (1, 2, 3, 4, 5)` distributes positionally with a
/// slurpy tail.
#[test]
fn list_assignment_with_slurpy_tail() {
    let result = run_scalar(vec![
        assign(
            unary("my", list(vec![svar("a"), svar("b"), avar("rest")])),
            list(vec![num(1), num(2), num(3), num(4), num(5)]),
        ),
        concat_all(vec![
            str_lit("["),
            svar("a"),
            str_lit("]["),
            svar("b"),
            str_lit("]["),
            join_ws("rest"),
            str_lit("]"),
        ]),
    ]);
    assert_eq!(result, "[1][2][3 4 5]");
}

/// `($s = "ab") =~ s/a/A/` mutates `$s` itself: the assignment expression
/// yields the variable's own cell.
#[test]
fn assignment_result_preserves_lvalue_identity() {
    let result = run_scalar(vec![
        assign(my_s("s"), str_lit("x")),
        binop(
            "=~",
            assign(svar("s"), str_lit("ab")),
            s_replace("a", "A", ""),
        ),
        svar("s"),
    ]);
    assert_eq!(result, "Ab");
}

/// The same holds for a global target: the stored-then-reloaded global is
/// the expression's value.
#[test]
fn global_assignment_reloads_the_global() {
    let result = run_scalar(vec![
        binop(
            "=~",
            assign(svar("gs"), str_lit("ab")),
            s_replace("a", "A", ""),
        ),
        svar("gs"),
    ]);
    assert_eq!(result, "Ab");
}

/// Round-trip law: `[$a,$b,$c]->[i]` equals `($a,$b,$c)[i]`.
#[test]
fn anon_array_element_matches_list_slice() {
    for i in 0..3 {
        let via_ref = run_scalar(vec![
            assign(my_s("a"), num(10)),
            assign(my_s("b"), num(20)),
            assign(my_s("c"), num(30)),
            binop(
                "->[",
                anon_array(vec![svar("a"), svar("b"), svar("c")]),
                num(i),
            ),
        ]);
        let via_slice = run_scalar(vec![
            assign(my_s("a"), num(10)),
            assign(my_s("b"), num(20)),
            assign(my_s("c"), num(30)),
            binop("[", list(vec![svar("a"), svar("b"), svar("c")]), num(i)),
        ]);
        assert_eq!(via_ref, via_slice);
        assert_eq!(via_ref, (10 * (i + 1)).to_string());
    }
}

/// Round-trip law: `keys %h` and `values %h` pair up.
#[test]
fn keys_and_values_stay_paired() {
    let keys = run_list(vec![
        assign(
            unary("my", hvar("h")),
            list(vec![
                str_lit("one"),
                num(1),
                str_lit("two"),
                num(2),
                str_lit("three"),
                num(3),
            ]),
        ),
        unary("keys", hvar("h")),
    ]);
    let values = run_list(vec![
        assign(
            unary("my", hvar("h")),
            list(vec![
                str_lit("one"),
                num(1),
                str_lit("two"),
                num(2),
                str_lit("three"),
                num(3),
            ]),
        ),
        unary("values", hvar("h")),
    ]);
    assert_eq!(keys.len(), values.len());
    let expected = |k: &str| match k {
        "one" => "1",
        "two" => "2",
        "three" => "3",
        other => panic!("unexpected key {other}"),
    };
    for (k, v) in keys.iter().zip(&values) {
        assert_eq!(v, expected(k));
    }
}

/// Short-circuit operators skip the right side entirely (observable via
/// side effects).
#[test]
fn short_circuit_suppresses_side_effects() {
    let result = run_list(vec![
        assign(my_s("hits"), num(0)),
        sub_named(
            "touch",
            vec![
                // $hits is shared with the top level through the
                // persistent-capture path
                assign(svar("hits"), binop("+", svar("hits"), num(1))),
                num(1),
            ],
        ),
        assign(my_s("t"), binop("||", num(7), call("touch", vec![]))),
        assign(my_s("f"), binop("&&", num(0), call("touch", vec![]))),
        assign(my_s("d"), binop("//", str_lit(""), call("touch", vec![]))),
        list(vec![svar("hits"), svar("t"), svar("f"), svar("d")]),
    ]);
    assert_eq!(result, vec!["0", "7", "0", ""]);
}

/// Reference-create then dereference observes writes at the original.
#[test]
fn reference_round_trip_aliases_target() {
    let result = run_list(vec![
        assign(my_s("x"), num(5)),
        assign(my_s("r"), unary("\\", svar("x"))),
        assign(unary("$", svar("r")), num(9)),
        list(vec![svar("x"), unary("$", svar("r"))]),
    ]);
    assert_eq!(result, vec!["9", "9"]);
}

/// `print`/`say` write through the host sink.
#[test]
fn print_and_say_reach_the_sink() {
    let unit = compile_program(vec![
        unary("print", list(vec![str_lit("a"), str_lit("b")])),
        unary("say", list(vec![str_lit("c")])),
        unary("print", list(vec![ident("STDERR"), str_lit("w")])),
    ]);
    let mut r = runner();
    r.interp
        .execute(&unit, pearlite::Value::empty_list(), pearlite::CallContext::Void, None)
        .expect("program runs");
    assert_eq!(r.sink.stdout(), "abc\n");
    assert_eq!(r.sink.stderr(), "w");
}
