//! Closure capture, aliasing, and persistent variables for named subs.

mod common;

use common::*;
use pretty_assertions::assert_eq;

/// Writes through an inner closure are immediately visible to the
/// enclosing scope's variable.
#[test]
fn capture_aliases_the_declaring_cell() {
    let result = run_list(vec![
        assign(my_s("x"), num(1)),
        assign(my_s("setter"), sub_anon(vec![assign(svar("x"), num(50))])),
        binop("->(", svar("setter"), list(vec![])),
        list(vec![svar("x")]),
    ]);
    assert_eq!(result, vec!["50"]);
}

/// A named sub shares its free lexical with the declaring scope through
/// the persistent-variable table.
#[test]
fn named_sub_shares_lexical_with_outer_scope() {
    let result = run_scalar(vec![
        assign(my_s("count"), num(0)),
        sub_named(
            "bump",
            vec![assign(svar("count"), binop("+", svar("count"), num(1)))],
        ),
        call("bump", vec![]),
        call("bump", vec![]),
        svar("count"),
    ]);
    assert_eq!(result, "2");
}

/// Nested anonymous subs capture transitively through the middle layer.
#[test]
fn nested_closures_capture_transitively() {
    let result = run_scalar(vec![
        sub_named(
            "outer",
            vec![
                assign(my_s("x"), unary0("shift")),
                sub_anon(vec![sub_anon(vec![binop("+", svar("x"), num(1))])]),
            ],
        ),
        assign(my_s("mid"), call("outer", vec![num(41)])),
        assign(my_s("inner"), binop("->(", svar("mid"), list(vec![]))),
        binop("->(", svar("inner"), list(vec![])),
    ]);
    assert_eq!(result, "42");
}

/// `@_` aliases the caller's argument scalars.
#[test]
fn argument_array_aliases_caller_scalars() {
    let result = run_scalar(vec![
        sub_named("mutate", vec![assign(elem("_", num(0)), num(77))]),
        assign(my_s("v"), num(1)),
        call("mutate", vec![svar("v")]),
        svar("v"),
    ]);
    assert_eq!(result, "77");
}

/// `shift` with no operand works on `@_`.
#[test]
fn bare_shift_consumes_arguments() {
    let result = run_list(vec![
        sub_named(
            "two",
            vec![
                assign(my_s("a"), unary0("shift")),
                assign(my_s("b"), unary0("shift")),
                list(vec![svar("b"), svar("a")]),
            ],
        ),
        call("two", vec![num(1), num(2)]),
    ]);
    assert_eq!(result, vec!["2", "1"]);
}

/// `wantarray` reports the calling context.
#[test]
fn wantarray_reflects_call_context() {
    let program = || {
        vec![
            sub_named("ctx", vec![unary0("wantarray")]),
            call("ctx", vec![]),
        ]
    };
    // the final call inherits the host context through the context register
    assert_eq!(run_scalar(program()), "0");
    assert_eq!(run_list(program()), vec!["1"]);
}

/// Recursion through a named sub.
#[test]
fn recursive_factorial() {
    let result = run_scalar(vec![
        sub_named(
            "fact",
            vec![
                assign(my_s("n"), unary0("shift")),
                ternary(
                    binop("<=", svar("n"), num(1)),
                    num(1),
                    binop(
                        "*",
                        svar("n"),
                        call("fact", vec![binop("-", svar("n"), num(1))]),
                    ),
                ),
            ],
        ),
        call("fact", vec![num(6)]),
    ]);
    assert_eq!(result, "720");
}

/// Deep recursion fails with an error rather than a host stack overflow.
#[test]
fn runaway_recursion_is_an_error() {
    let err = run_error(vec![
        sub_named("spin", vec![call("spin", vec![])]),
        call("spin", vec![]),
    ]);
    assert!(
        err.render().contains("Deep recursion"),
        "unexpected error: {}",
        err.render()
    );
}
