//! Loops, labels, and control-flow markers crossing sub boundaries.

mod common;

use common::*;
use pretty_assertions::assert_eq;

#[test]
fn while_loop_with_last_and_next() {
    // sum odd numbers below 10, stopping at 15
    let result = run_scalar(vec![
        assign(my_s("i"), num(0)),
        assign(my_s("sum"), num(0)),
        while_loop(
            binop("<", svar("i"), num(10)),
            vec![
                unary("++", svar("i")),
                if_stmt(
                    binop("==", binop("%", svar("i"), num(2)), num(0)),
                    vec![unary0("next")],
                    None,
                ),
                binop("+=", svar("sum"), svar("i")),
                if_stmt(binop(">=", svar("sum"), num(15)), vec![unary0("last")], None),
            ],
        ),
        svar("sum"),
    ]);
    // 1 + 3 + 5 + 7 = 16
    assert_eq!(result, "16");
}

#[test]
fn until_loop_negates_the_condition() {
    let result = run_scalar(vec![
        assign(my_s("n"), num(0)),
        until_loop(binop(">=", svar("n"), num(3)), vec![unary("++", svar("n"))]),
        svar("n"),
    ]);
    assert_eq!(result, "3");
}

#[test]
fn c_style_for_runs_init_cond_step() {
    let result = run_scalar(vec![
        assign(my_s("sum"), num(0)),
        for_c(
            assign(my_s("i"), num(1)),
            binop("<=", svar("i"), num(4)),
            unary("++", svar("i")),
            vec![binop("+=", svar("sum"), svar("i"))],
        ),
        svar("sum"),
    ]);
    assert_eq!(result, "10");
}

#[test]
fn next_in_c_style_for_still_steps() {
    let result = run_scalar(vec![
        assign(my_s("sum"), num(0)),
        for_c(
            assign(my_s("i"), num(1)),
            binop("<=", svar("i"), num(5)),
            unary("++", svar("i")),
            vec![
                if_stmt(
                    binop("==", svar("i"), num(3)),
                    vec![unary0("next")],
                    None,
                ),
                binop("+=", svar("sum"), svar("i")),
            ],
        ),
        svar("sum"),
    ]);
    // 1 + 2 + 4 + 5
    assert_eq!(result, "12");
}

/// The foreach variable aliases the array elements: mutating it mutates
/// the array.
#[test]
fn foreach_variable_aliases_elements() {
    let result = run_list(vec![
        assign(unary("my", avar("a")), list(vec![num(1), num(2), num(3)])),
        foreach(
            Some(my_s("v")),
            avar("a"),
            vec![binop("*=", svar("v"), num(10))],
        ),
        avar("a"),
    ]);
    assert_eq!(result, vec!["10", "20", "30"]);
}

/// `$_` is restored after an implicit-topic loop.
#[test]
fn topic_variable_restored_after_loop() {
    let result = run_scalar(vec![
        assign(svar("_"), str_lit("before")),
        foreach(None, range(num(1), num(3)), vec![]),
        svar("_"),
    ]);
    assert_eq!(result, "before");
}

#[test]
fn labelled_last_exits_the_outer_loop() {
    let result = run_scalar(vec![
        assign(my_s("hits"), num(0)),
        foreach_labelled(
            "OUTER",
            Some(my_s("i")),
            range(num(1), num(3)),
            vec![foreach(
                Some(my_s("j")),
                range(num(1), num(3)),
                vec![
                    unary("++", svar("hits")),
                    if_stmt(
                        binop("==", svar("j"), num(2)),
                        vec![unary("last", ident("OUTER"))],
                        None,
                    ),
                ],
            )],
        ),
        svar("hits"),
    ]);
    assert_eq!(result, "2");
}

#[test]
fn labelled_next_continues_the_outer_loop() {
    let result = run_scalar(vec![
        assign(my_s("total"), num(0)),
        foreach_labelled(
            "ROW",
            Some(my_s("i")),
            range(num(1), num(3)),
            vec![foreach(
                Some(my_s("j")),
                range(num(1), num(3)),
                vec![
                    if_stmt(
                        binop("==", svar("j"), num(2)),
                        vec![unary("next", ident("ROW"))],
                        None,
                    ),
                    binop("+=", svar("total"), num(1)),
                ],
            )],
        ),
        svar("total"),
    ]);
    // each row counts j == 1 only
    assert_eq!(result, "3");
}

/// A marker from a called sub propagates until the loop that owns the
/// call site consumes it.
#[test]
fn last_propagates_through_a_sub_call() {
    let result = run_scalar(vec![
        sub_named("bail", vec![unary0("last")]),
        assign(my_s("n"), num(0)),
        while_loop(
            num(1),
            vec![
                unary("++", svar("n")),
                if_stmt(binop("==", svar("n"), num(3)), vec![call("bail", vec![])], None),
            ],
        ),
        svar("n"),
    ]);
    assert_eq!(result, "3");
}

/// A labelled marker skips an inner loop that does not match.
#[test]
fn labelled_marker_through_sub_skips_inner_loop() {
    let result = run_scalar(vec![
        sub_named("bail_outer", vec![unary("last", ident("OUTER"))]),
        assign(my_s("n"), num(0)),
        foreach_labelled(
            "OUTER",
            Some(my_s("i")),
            range(num(1), num(5)),
            vec![foreach(
                Some(my_s("j")),
                range(num(1), num(5)),
                vec![
                    unary("++", svar("n")),
                    call("bail_outer", vec![]),
                ],
            )],
        ),
        svar("n"),
    ]);
    assert_eq!(result, "1");
}

/// An unconsumed marker at the top level is an error.
#[test]
fn stray_last_is_an_error() {
    let err = run_error(vec![sub_named("bail", vec![unary0("last")]), call("bail", vec![]), num(1)]);
    assert!(
        err.render().contains("Can't \"last\" outside a loop block"),
        "unexpected error: {}",
        err.render()
    );
}

/// A labelled bare block behaves as a run-once loop for `last`.
#[test]
fn labelled_block_supports_last() {
    let result = run_scalar(vec![
        assign(my_s("x"), num(0)),
        labelled_block(
            "CHECK",
            vec![
                assign(svar("x"), num(1)),
                unary("last", ident("CHECK")),
                assign(svar("x"), num(2)),
            ],
        ),
        svar("x"),
    ]);
    assert_eq!(result, "1");
}

#[test]
fn redo_reruns_the_body_without_stepping() {
    let result = run_scalar(vec![
        assign(my_s("tries"), num(0)),
        foreach(
            Some(my_s("i")),
            range(num(1), num(3)),
            vec![
                unary("++", svar("tries")),
                if_stmt(
                    binop("&&", binop("==", svar("i"), num(2)), binop("<", svar("tries"), num(5))),
                    vec![unary0("redo")],
                    None,
                ),
            ],
        ),
        svar("tries"),
    ]);
    // i=1 (1 try), i=2 redone until tries reaches 5, i=3 (1 try)
    assert_eq!(result, "6");
}
