//! Delegate operators: regex forms, list utilities, string builtins,
//! method dispatch, and file I/O.

mod common;

use common::*;
use pretty_assertions::assert_eq;

// ----------------------------------------------------------------------
// Regex
// ----------------------------------------------------------------------

#[test]
fn match_in_list_context_returns_captures() {
    let result = run_list(vec![
        assign(my_s("d"), str_lit("2021-07")),
        binop("=~", svar("d"), m_match(r"(\d+)-(\d+)", "")),
    ]);
    assert_eq!(result, vec!["2021", "07"]);
}

#[test]
fn numbered_capture_globals_update() {
    let result = run_list(vec![
        assign(my_s("d"), str_lit("ab12")),
        assign(my_s("ok"), binop("=~", svar("d"), m_match(r"([a-z]+)(\d+)", ""))),
        list(vec![svar("ok"), svar("1"), svar("2")]),
    ]);
    assert_eq!(result, vec!["1", "ab", "12"]);
}

#[test]
fn global_match_collects_all_matches() {
    let result = run_list(vec![
        assign(my_s("s"), str_lit("a1b22c333")),
        binop("=~", svar("s"), m_match(r"\d+", "g")),
    ]);
    assert_eq!(result, vec!["1", "22", "333"]);
}

#[test]
fn substitution_counts_and_mutates() {
    let result = run_list(vec![
        assign(my_s("s"), str_lit("one two three")),
        assign(my_s("n"), binop("=~", svar("s"), s_replace("o", "0", "g"))),
        list(vec![svar("n"), svar("s")]),
    ]);
    assert_eq!(result, vec!["2", "0ne tw0 three"]);
}

#[test]
fn nondestructive_substitution_keeps_target() {
    let result = run_list(vec![
        assign(my_s("s"), str_lit("abc")),
        assign(my_s("t"), binop("=~", svar("s"), s_replace("a", "X", "r"))),
        list(vec![svar("s"), svar("t")]),
    ]);
    assert_eq!(result, vec!["abc", "Xbc"]);
}

#[test]
fn replacement_expands_group_references() {
    let result = run_scalar(vec![
        assign(my_s("s"), str_lit("user@host")),
        binop("=~", svar("s"), s_replace(r"(\w+)@(\w+)", "$2:$1", "")),
        svar("s"),
    ]);
    assert_eq!(result, "host:user");
}

#[test]
fn precompiled_qr_matches_case_insensitively() {
    let result = run_scalar(vec![
        assign(my_s("re"), unary("qr", list(vec![str_lit("perl"), str_lit("i")]))),
        assign(my_s("s"), str_lit("PERL rules")),
        binop("=~", svar("s"), svar("re")),
    ]);
    assert_eq!(result, "1");
}

#[test]
fn negated_bind_inverts_the_result() {
    let result = run_scalar(vec![
        assign(my_s("s"), str_lit("abc")),
        binop("!~", svar("s"), m_match(r"\d", "")),
    ]);
    assert_eq!(result, "1");
}

#[test]
fn match_against_the_topic() {
    let result = run_scalar(vec![
        assign(svar("_"), str_lit("hay needle hay")),
        m_match("needle", ""),
    ]);
    assert_eq!(result, "1");
}

#[test]
fn split_on_pattern_trims_trailing_empties() {
    let result = run_list(vec![unary(
        "split",
        list(vec![str_lit(","), str_lit("a,b,,c,,")]),
    )]);
    assert_eq!(result, vec!["a", "b", "", "c"]);
}

#[test]
fn split_awk_mode_skips_leading_whitespace() {
    let result = run_list(vec![unary(
        "split",
        list(vec![str_lit(" "), str_lit("  one   two three ")]),
    )]);
    assert_eq!(result, vec!["one", "two", "three"]);
}

#[test]
fn split_with_limit_keeps_the_tail_whole() {
    let result = run_list(vec![unary(
        "split",
        list(vec![str_lit(":"), str_lit("a:b:c:d"), num(2)]),
    )]);
    assert_eq!(result, vec!["a", "b:c:d"]);
}

#[test]
fn pos_tracks_global_match_progress() {
    let result = run_list(vec![
        assign(my_s("s"), str_lit("aXbXc")),
        binop("=~", svar("s"), m_match("X", "g")),
        assign(my_s("p1"), unary("pos", svar("s"))),
        binop("=~", svar("s"), m_match("X", "g")),
        list(vec![svar("p1"), unary("pos", svar("s"))]),
    ]);
    assert_eq!(result, vec!["2", "4"]);
}

// ----------------------------------------------------------------------
// List utilities
// ----------------------------------------------------------------------

#[test]
fn default_sort_is_stringwise() {
    let result = run_list(vec![unary(
        "sort",
        list(vec![str_lit("pear"), str_lit("apple"), str_lit("fig")]),
    )]);
    assert_eq!(result, vec!["apple", "fig", "pear"]);
}

#[test]
fn sort_with_numeric_comparator_block() {
    let result = run_list(vec![unary(
        "sort",
        list(vec![
            sub_anon(vec![binop("<=>", svar("a"), svar("b"))]),
            num(10),
            num(2),
            num(33),
        ]),
    )]);
    assert_eq!(result, vec!["2", "10", "33"]);
}

#[test]
fn reverse_list_and_scalar_string() {
    let listwise = run_list(vec![unary("reverse", list(vec![num(1), num(2), num(3)]))]);
    assert_eq!(listwise, vec!["3", "2", "1"]);

    let stringwise = run_scalar(vec![assign(
        my_s("r"),
        unary("reverse", list(vec![str_lit("abc")])),
    )]);
    assert_eq!(stringwise, "cba");
}

#[test]
fn join_and_sprintf() {
    let joined = run_scalar(vec![unary(
        "join",
        list(vec![str_lit("-"), num(1), num(2), num(3)]),
    )]);
    assert_eq!(joined, "1-2-3");

    let formatted = run_scalar(vec![unary(
        "sprintf",
        list(vec![str_lit("%s=%03d (%.1f)"), str_lit("x"), num(7), fnum("2.25")]),
    )]);
    assert_eq!(formatted, "x=007 (2.2)");
}

#[test]
fn push_pop_shift_unshift_round_trip() {
    let result = run_list(vec![
        assign(unary("my", avar("a")), list(vec![num(2), num(3)])),
        unary("push", list(vec![avar("a"), num(4)])),
        unary("unshift", list(vec![avar("a"), num(1)])),
        assign(my_s("last"), unary("pop", avar("a"))),
        assign(my_s("first"), unary("shift", avar("a"))),
        list(vec![svar("first"), svar("last"), join_ws("a")]),
    ]);
    assert_eq!(result, vec!["1", "4", "2 3"]);
}

#[test]
fn each_walks_pairs() {
    let result = run_list(vec![
        assign(
            unary("my", hvar("h")),
            list(vec![str_lit("a"), num(1), str_lit("b"), num(2)]),
        ),
        assign(
            unary("my", list(vec![svar("k1"), svar("v1")])),
            unary("each", hvar("h")),
        ),
        assign(
            unary("my", list(vec![svar("k2"), svar("v2")])),
            unary("each", hvar("h")),
        ),
        assign(unary("my", avar("done")), unary("each", hvar("h"))),
        list(vec![
            svar("k1"),
            svar("v1"),
            svar("k2"),
            svar("v2"),
            unary("scalar", avar("done")),
        ]),
    ]);
    assert_eq!(result, vec!["a", "1", "b", "2", "0"]);
}

#[test]
fn exists_and_delete() {
    let result = run_list(vec![
        assign(
            unary("my", hvar("h")),
            list(vec![str_lit("k"), num(1)]),
        ),
        list(vec![
            unary("exists", helem("h", "k")),
            unary("delete", helem("h", "k")),
            unary("exists", helem("h", "k")),
            unary("delete", helem("h", "missing")),
        ]),
    ]);
    assert_eq!(result, vec!["1", "1", "", ""]);
}

#[test]
fn string_range_uses_magic_increment() {
    let result = run_scalar(vec![
        assign(unary("my", avar("r")), range(str_lit("aa"), str_lit("ad"))),
        join_ws("r"),
    ]);
    assert_eq!(result, "aa ab ac ad");
}

#[test]
fn list_repetition() {
    let result = run_list(vec![binop(
        "x",
        list(vec![num(1), num(2)]),
        num(3),
    )]);
    assert_eq!(result, vec!["1", "2", "1", "2", "1", "2"]);
}

// ----------------------------------------------------------------------
// Scalar builtins
// ----------------------------------------------------------------------

#[test]
fn string_magic_increment() {
    let result = run_list(vec![
        assign(my_s("s"), str_lit("Az")),
        unary("++", svar("s")),
        assign(my_s("t"), str_lit("zz")),
        unary("++", svar("t")),
        list(vec![svar("s"), svar("t")]),
    ]);
    assert_eq!(result, vec!["Ba", "aaa"]);
}

#[test]
fn numeric_string_conversion_in_arithmetic() {
    let result = run_scalar(vec![binop("+", str_lit("3 apples"), num(4))]);
    assert_eq!(result, "7");
}

#[test]
fn named_unaries() {
    let result = run_list(vec![list(vec![
        unary("length", str_lit("hello")),
        unary("uc", str_lit("perl")),
        unary("lc", str_lit("PERL")),
        unary("abs", unary("-", num(7))),
        unary("int", fnum("3.9")),
        unary("sqrt", num(49)),
        unary("ord", str_lit("A")),
        unary("chr", num(66)),
    ])]);
    assert_eq!(result, vec!["5", "PERL", "perl", "7", "3", "7", "65", "B"]);
}

#[test]
fn string_repeat_and_concat() {
    let result = run_scalar(vec![concat(
        binop("x", str_lit("ab"), num(3)),
        str_lit("!"),
    )]);
    assert_eq!(result, "ababab!");
}

#[test]
fn chomp_returns_removed_count() {
    let result = run_list(vec![
        assign(my_s("s"), str_lit("line\n")),
        assign(my_s("n"), unary("chomp", svar("s"))),
        list(vec![svar("n"), svar("s")]),
    ]);
    assert_eq!(result, vec!["1", "line"]);
}

#[test]
fn last_index_form() {
    let result = run_scalar(vec![
        assign(unary("my", avar("a")), list(vec![num(5), num(6), num(7)])),
        unary("$#", avar("a")),
    ]);
    assert_eq!(result, "2");
}

// ----------------------------------------------------------------------
// Packages, methods, and blessing
// ----------------------------------------------------------------------

#[test]
fn method_dispatch_walks_isa() {
    let result = run_scalar(vec![
        pkg("Animal"),
        sub_named("noise", vec![str_lit("generic")]),
        pkg("Dog"),
        assign(unary("our", avar("ISA")), list(vec![str_lit("Animal")])),
        pkg("main"),
        method_call(ident("Dog"), "noise", vec![]),
    ]);
    assert_eq!(result, "generic");
}

#[test]
fn super_dispatches_past_the_compile_package() {
    let result = run_scalar(vec![
        pkg("Base"),
        sub_named("greet", vec![str_lit("base")]),
        pkg("Derived"),
        assign(unary("our", avar("ISA")), list(vec![str_lit("Base")])),
        sub_named(
            "greet",
            vec![
                assign(my_s("self"), unary0("shift")),
                concat(
                    str_lit("derived+"),
                    method_call(svar("self"), "SUPER::greet", vec![]),
                ),
            ],
        ),
        pkg("main"),
        assign(
            my_s("obj"),
            unary("bless", list(vec![anon_hash(vec![]), str_lit("Derived")])),
        ),
        method_call(svar("obj"), "greet", vec![]),
    ]);
    assert_eq!(result, "derived+base");
}

#[test]
fn constructor_bless_and_state() {
    let result = run_scalar(vec![
        pkg("Counter"),
        sub_named(
            "new",
            vec![
                assign(my_s("class"), unary0("shift")),
                assign(my_s("self"), anon_hash(vec![str_lit("n"), num(0)])),
                unary("bless", list(vec![svar("self"), svar("class")])),
            ],
        ),
        sub_named(
            "bump",
            vec![
                assign(my_s("self"), unary0("shift")),
                unary("++", binop("->{", svar("self"), ident("n"))),
            ],
        ),
        pkg("main"),
        assign(my_s("c"), method_call(ident("Counter"), "new", vec![])),
        method_call(svar("c"), "bump", vec![]),
        method_call(svar("c"), "bump", vec![]),
        binop("->{", svar("c"), ident("n")),
    ]);
    assert_eq!(result, "2");
}

#[test]
fn ref_reports_bless_package() {
    let result = run_list(vec![
        assign(
            my_s("obj"),
            unary("bless", list(vec![anon_array(vec![]), str_lit("Widget")])),
        ),
        assign(my_s("plain"), anon_array(vec![])),
        list(vec![
            unary("ref", svar("obj")),
            unary("ref", svar("plain")),
            unary("ref", num(5)),
        ]),
    ]);
    assert_eq!(result, vec!["Widget", "ARRAY", ""]);
}

#[test]
fn isa_operator_walks_the_hierarchy() {
    let result = run_list(vec![
        pkg("A"),
        sub_named("dummy", vec![num(0)]),
        pkg("B"),
        assign(unary("our", avar("ISA")), list(vec![str_lit("A")])),
        pkg("main"),
        assign(
            my_s("obj"),
            unary("bless", list(vec![anon_hash(vec![]), str_lit("B")])),
        ),
        list(vec![
            binop("isa", svar("obj"), ident("A")),
            binop("isa", svar("obj"), ident("B")),
            binop("isa", svar("obj"), ident("C")),
            method_call(svar("obj"), "isa", vec![str_lit("A")]),
        ]),
    ]);
    assert_eq!(result, vec!["1", "1", "", "1"]);
}

// ----------------------------------------------------------------------
// File I/O
// ----------------------------------------------------------------------

#[test]
fn open_readline_close_round_trip() {
    let path = std::env::temp_dir().join(format!("pearlite_io_{}.txt", std::process::id()));
    std::fs::write(&path, "first\nsecond\n").expect("fixture written");
    let path_text = path.to_string_lossy().into_owned();

    let result = run_list(vec![
        assign(
            my_s("ok"),
            unary(
                "open",
                list(vec![my_s("fh"), str_lit("<"), str_lit(&path_text)]),
            ),
        ),
        assign(unary("my", avar("lines")), unary("readline", svar("fh"))),
        unary("close", svar("fh")),
        unary("chomp", elem("lines", num(0))),
        unary("chomp", elem("lines", num(1))),
        list(vec![svar("ok"), unary("scalar", avar("lines")), join_ws("lines")]),
    ]);
    std::fs::remove_file(&path).ok();
    assert_eq!(result, vec!["1", "2", "first second"]);
}

#[test]
fn failed_open_sets_errno_and_returns_false() {
    let result = run_list(vec![
        assign(
            my_s("ok"),
            unary(
                "open",
                list(vec![
                    my_s("fh"),
                    str_lit("<"),
                    str_lit("/nonexistent/pearlite/fixture"),
                ]),
            ),
        ),
        list(vec![svar("ok"), binop("ne", svar("!"), str_lit(""))]),
    ]);
    assert_eq!(result, vec!["", "1"]);
}
