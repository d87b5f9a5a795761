//! Coverage of the assignment matrix: declarations, elements, slices,
//! dereferences, globs, and the compile-time rejections.

mod common;

use common::*;
use pretty_assertions::assert_eq;

#[test]
fn my_scalar_copy_does_not_alias() {
    let result = run_list(vec![
        assign(my_s("a"), num(1)),
        assign(my_s("b"), svar("a")),
        assign(svar("a"), num(2)),
        list(vec![svar("a"), svar("b")]),
    ]);
    assert_eq!(result, vec!["2", "1"]);
}

#[test]
fn my_array_and_hash_from_lists() {
    let result = run_list(vec![
        assign(unary("my", avar("a")), list(vec![num(1), num(2), num(3)])),
        assign(
            unary("my", hvar("h")),
            list(vec![str_lit("k"), num(9)]),
        ),
        list(vec![
            unary("scalar", avar("a")),
            elem("a", num(1)),
            helem("h", "k"),
        ]),
    ]);
    assert_eq!(result, vec!["3", "2", "9"]);
}

/// List assignment in scalar context yields the RHS element count.
#[test]
fn list_assignment_scalar_context_counts_rhs() {
    let result = run_scalar(vec![assign(
        my_s("n"),
        assign(unary("my", avar("a")), list(vec![num(5), num(6), num(7)])),
    )]);
    assert_eq!(result, "3");

    let empty = run_scalar(vec![assign(
        my_s("n"),
        assign(unary("my", avar("b")), list(vec![])),
    )]);
    assert_eq!(empty, "0");
}

#[test]
fn array_element_assignment_extends() {
    let result = run_list(vec![
        unary("my", avar("a")),
        assign(elem("a", num(3)), str_lit("x")),
        list(vec![unary("scalar", avar("a")), elem("a", num(3)), elem("a", num(1))]),
    ]);
    assert_eq!(result, vec!["4", "x", ""]);
}

#[test]
fn negative_index_reaches_from_the_end() {
    let result = run_scalar(vec![
        assign(unary("my", avar("a")), list(vec![num(1), num(2), num(3)])),
        elem("a", unary("-", num(1))),
    ]);
    assert_eq!(result, "3");
}

#[test]
fn hash_element_assignment_with_bareword_key() {
    let result = run_scalar(vec![
        unary("my", hvar("h")),
        assign(helem("h", "name"), str_lit("perl")),
        helem("h", "name"),
    ]);
    assert_eq!(result, "perl");
}

#[test]
fn array_slice_assignment() {
    let result = run_list(vec![
        assign(unary("my", avar("a")), list(vec![num(0), num(0), num(0)])),
        assign(
            binop("@[", avar("a"), list(vec![num(0), num(2)])),
            list(vec![str_lit("x"), str_lit("y")]),
        ),
        avar("a"),
    ]);
    assert_eq!(result, vec!["x", "0", "y"]);
}

#[test]
fn hash_slice_assignment_and_read() {
    let result = run_list(vec![
        unary("my", hvar("h")),
        assign(
            binop("@{", hvar("h"), list(vec![ident("a"), ident("b")])),
            list(vec![num(1), num(2)]),
        ),
        binop("@{", hvar("h"), list(vec![ident("b"), ident("a"), ident("missing")])),
    ]);
    assert_eq!(result, vec!["2", "1", ""]);
}

#[test]
fn hash_slice_delete_yields_undef_for_absent() {
    let result = run_list(vec![
        assign(
            unary("my", hvar("h")),
            list(vec![str_lit("a"), num(1), str_lit("b"), num(2)]),
        ),
        list(vec![
            unary(
                "delete",
                binop("@{", hvar("h"), list(vec![ident("b"), ident("nope")])),
            ),
            unary("scalar", hvar("h")),
        ]),
    ]);
    assert_eq!(result, vec!["2", "", "1"]);
}

#[test]
fn key_value_slice_pairs() {
    let result = run_list(vec![
        assign(
            unary("my", hvar("h")),
            list(vec![str_lit("a"), num(1), str_lit("b"), num(2)]),
        ),
        binop("%{", hvar("h"), list(vec![ident("b")])),
    ]);
    assert_eq!(result, vec!["b", "2"]);
}

/// `${$ref} = rhs` writes through; the ref expression is evaluated before
/// the rhs.
#[test]
fn scalar_deref_assignment() {
    let result = run_scalar(vec![
        assign(my_s("x"), num(1)),
        assign(my_s("r"), unary("\\", svar("x"))),
        assign(unary("$", svar("r")), num(42)),
        svar("x"),
    ]);
    assert_eq!(result, "42");
}

#[test]
fn arrow_element_assignment_through_refs() {
    let result = run_list(vec![
        assign(my_s("a"), anon_array(vec![num(1), num(2)])),
        assign(my_s("h"), anon_hash(vec![str_lit("k"), num(3)])),
        assign(binop("->[", svar("a"), num(0)), num(10)),
        assign(binop("->{", svar("h"), ident("k")), num(30)),
        list(vec![
            binop("->[", svar("a"), num(0)),
            binop("->{", svar("h"), ident("k")),
        ]),
    ]);
    assert_eq!(result, vec!["10", "30"]);
}

/// `*glob = sub {...}` installs code; calling the name reaches it.
#[test]
fn glob_assignment_installs_code() {
    let result = run_scalar(vec![
        assign(unary("*", ident("answer")), sub_anon(vec![num(42)])),
        call("answer", vec![]),
    ]);
    assert_eq!(result, "42");
}

#[test]
fn ternary_lvalue_assigns_the_selected_cell() {
    let result = run_list(vec![
        assign(my_s("x"), num(1)),
        assign(my_s("y"), num(2)),
        assign(my_s("pick"), num(1)),
        assign(ternary(svar("pick"), svar("x"), svar("y")), num(99)),
        list(vec![svar("x"), svar("y")]),
    ]);
    assert_eq!(result, vec!["99", "2"]);
}

#[test]
fn compound_assignments() {
    let result = run_list(vec![
        assign(my_s("n"), num(10)),
        binop("-=", svar("n"), num(3)),
        binop("*=", svar("n"), num(2)),
        assign(my_s("s"), str_lit("a")),
        binop(".=", svar("s"), str_lit("b")),
        assign(my_s("u"), unary0("undef")),
        binop("//=", svar("u"), num(5)),
        binop("//=", svar("u"), num(9)), // already defined: no-op
        list(vec![svar("n"), svar("s"), svar("u")]),
    ]);
    assert_eq!(result, vec!["14", "ab", "5"]);
}

#[test]
fn swap_via_list_assignment() {
    let result = run_list(vec![
        assign(my_s("a"), num(1)),
        assign(my_s("b"), num(2)),
        assign(list(vec![svar("a"), svar("b")]), list(vec![svar("b"), svar("a")])),
        list(vec![svar("a"), svar("b")]),
    ]);
    assert_eq!(result, vec!["2", "1"]);
}

// ----------------------------------------------------------------------
// Compile-time rejections
// ----------------------------------------------------------------------

#[test]
fn localizing_a_lexical_is_a_compile_error() {
    let err = pearlite::compile(
        &block(vec![assign(my_s("x"), num(1)), local_s("x")]),
        &pearlite::PragmaSnapshot::default(),
        &files(),
    )
    .expect_err("local on a lexical must fail");
    assert!(
        err.message.contains("Can't localize lexical variable $x"),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn strict_vars_rejects_undeclared_globals() {
    let err = compile_strict(vec![assign(svar("undeclared"), num(1))])
        .expect_err("strict vars must reject the bare global");
    assert!(
        err.message.contains("requires explicit package name"),
        "unexpected message: {}",
        err.message
    );
    // declared via our, the same shape compiles
    compile_strict(vec![assign(our_s("declared"), num(1))]).expect("our passes strict");
}

#[test]
fn non_lvalue_in_list_assignment_is_rejected() {
    let err = pearlite::compile(
        &block(vec![assign(
            list(vec![svar("a"), binop("+", num(1), num(2))]),
            list(vec![num(1), num(2)]),
        )]),
        &pearlite::PragmaSnapshot::default(),
        &files(),
    )
    .expect_err("a sum is not an lvalue");
    assert!(
        err.message.contains("Can't modify"),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn range_in_scalar_context_is_rejected() {
    let err = pearlite::compile(
        &block(vec![assign(my_s("x"), range(num(1), num(5)))]),
        &pearlite::PragmaSnapshot::default(),
        &files(),
    )
    .expect_err("scalar-context range is unsupported");
    assert!(
        err.message.contains("Range in scalar context"),
        "unexpected message: {}",
        err.message
    );
}
