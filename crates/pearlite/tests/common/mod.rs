//! Shared harness for the integration tests: AST construction helpers
//! (the parser is out of scope, so tests build trees directly) and
//! compile-and-run wrappers.
#![allow(dead_code)]

use std::rc::Rc;

use pearlite::{
    ast::{Node, PragmaSnapshot, SourceFiles, SourcePos},
    compile,
    runtime::scalar::stringify,
    CallContext, CodeUnit, Interp, RunError, SharedSink, Value,
};

pub fn p() -> SourcePos {
    SourcePos::new(0, 1)
}

pub fn files() -> SourceFiles {
    SourceFiles::new(vec!["t.pl".to_owned()])
}

// ----------------------------------------------------------------------
// Node builders
// ----------------------------------------------------------------------

pub fn num(v: i64) -> Node {
    Node::Number {
        value: v.to_string(),
        pos: p(),
    }
}

pub fn fnum(v: &str) -> Node {
    Node::Number {
        value: v.to_owned(),
        pos: p(),
    }
}

pub fn str_lit(v: &str) -> Node {
    Node::StringLit {
        value: v.to_owned(),
        pos: p(),
    }
}

pub fn ident(name: &str) -> Node {
    Node::Identifier {
        name: name.to_owned(),
        pos: p(),
    }
}

pub fn unary(op: &str, operand: Node) -> Node {
    Node::Unary {
        op: op.to_owned(),
        operand: Some(Box::new(operand)),
        pos: p(),
    }
}

pub fn unary0(op: &str) -> Node {
    Node::Unary {
        op: op.to_owned(),
        operand: None,
        pos: p(),
    }
}

pub fn binop(op: &str, left: Node, right: Node) -> Node {
    Node::Binary {
        op: op.to_owned(),
        left: Box::new(left),
        right: Box::new(right),
        pos: p(),
    }
}

pub fn svar(name: &str) -> Node {
    unary("$", ident(name))
}

pub fn avar(name: &str) -> Node {
    unary("@", ident(name))
}

pub fn hvar(name: &str) -> Node {
    unary("%", ident(name))
}

pub fn my_s(name: &str) -> Node {
    unary("my", svar(name))
}

pub fn my_a(name: &str) -> Node {
    unary("my", avar(name))
}

pub fn my_h(name: &str) -> Node {
    unary("my", hvar(name))
}

pub fn our_s(name: &str) -> Node {
    unary("our", svar(name))
}

pub fn local_s(name: &str) -> Node {
    unary("local", svar(name))
}

pub fn assign(lhs: Node, rhs: Node) -> Node {
    binop("=", lhs, rhs)
}

pub fn list(elements: Vec<Node>) -> Node {
    Node::List { elements, pos: p() }
}

pub fn block(statements: Vec<Node>) -> Node {
    Node::Block { statements, pos: p() }
}

pub fn ternary(cond: Node, then: Node, otherwise: Node) -> Node {
    Node::Ternary {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
        pos: p(),
    }
}

pub fn call(name: &str, args: Vec<Node>) -> Node {
    Node::FunCall {
        callee: Box::new(ident(name)),
        args: Box::new(list(args)),
        pos: p(),
    }
}

pub fn sub_named(name: &str, statements: Vec<Node>) -> Node {
    Node::SubDef {
        name: Some(name.to_owned()),
        body: Box::new(block(statements)),
        prototype: None,
        pos: p(),
    }
}

pub fn sub_anon(statements: Vec<Node>) -> Node {
    Node::SubDef {
        name: None,
        body: Box::new(block(statements)),
        prototype: None,
        pos: p(),
    }
}

pub fn if_stmt(cond: Node, then: Vec<Node>, otherwise: Option<Vec<Node>>) -> Node {
    Node::If {
        cond: Box::new(cond),
        then_block: Box::new(block(then)),
        else_branch: otherwise.map(|stmts| Box::new(block(stmts))),
        pos: p(),
    }
}

pub fn while_loop(cond: Node, body: Vec<Node>) -> Node {
    Node::While {
        cond: Box::new(cond),
        body: Box::new(block(body)),
        label: None,
        is_until: false,
        pos: p(),
    }
}

pub fn while_labelled(label: &str, cond: Node, body: Vec<Node>) -> Node {
    Node::While {
        cond: Box::new(cond),
        body: Box::new(block(body)),
        label: Some(label.to_owned()),
        is_until: false,
        pos: p(),
    }
}

pub fn until_loop(cond: Node, body: Vec<Node>) -> Node {
    Node::While {
        cond: Box::new(cond),
        body: Box::new(block(body)),
        label: None,
        is_until: true,
        pos: p(),
    }
}

pub fn for_c(init: Node, cond: Node, step: Node, body: Vec<Node>) -> Node {
    Node::ForC {
        init: Some(Box::new(init)),
        cond: Some(Box::new(cond)),
        step: Some(Box::new(step)),
        body: Box::new(block(body)),
        label: None,
        pos: p(),
    }
}

pub fn foreach(var: Option<Node>, source: Node, body: Vec<Node>) -> Node {
    Node::Foreach {
        var: var.map(Box::new),
        list: Box::new(source),
        body: Box::new(block(body)),
        label: None,
        pos: p(),
    }
}

pub fn foreach_labelled(label: &str, var: Option<Node>, source: Node, body: Vec<Node>) -> Node {
    Node::Foreach {
        var: var.map(Box::new),
        list: Box::new(source),
        body: Box::new(block(body)),
        label: Some(label.to_owned()),
        pos: p(),
    }
}

pub fn pkg(name: &str) -> Node {
    Node::Package {
        name: name.to_owned(),
        pos: p(),
    }
}

pub fn labelled_block(label: &str, statements: Vec<Node>) -> Node {
    Node::LabelledBlock {
        label: label.to_owned(),
        body: Box::new(block(statements)),
        pos: p(),
    }
}

pub fn eval_blk(statements: Vec<Node>) -> Node {
    Node::EvalBlock {
        body: Box::new(block(statements)),
        pos: p(),
    }
}

pub fn range(start: Node, end: Node) -> Node {
    binop("..", start, end)
}

/// `$name[idx]`.
pub fn elem(array: &str, index: Node) -> Node {
    binop("[", avar(array), index)
}

/// `$name{key}` with a bareword key.
pub fn helem(hash: &str, key: &str) -> Node {
    binop("{", hvar(hash), ident(key))
}

pub fn anon_array(items: Vec<Node>) -> Node {
    unary("[", list(items))
}

pub fn anon_hash(items: Vec<Node>) -> Node {
    unary("{", list(items))
}

pub fn m_match(pattern: &str, flags: &str) -> Node {
    unary("m", list(vec![str_lit(pattern), str_lit(flags)]))
}

pub fn s_replace(pattern: &str, replacement: &str, flags: &str) -> Node {
    unary(
        "s",
        list(vec![str_lit(pattern), str_lit(replacement), str_lit(flags)]),
    )
}

pub fn method_call(invocant: Node, name: &str, args: Vec<Node>) -> Node {
    binop(
        "method",
        invocant,
        Node::FunCall {
            callee: Box::new(ident(name)),
            args: Box::new(list(args)),
            pos: p(),
        },
    )
}

/// `join(" ", @name)` - the shape string interpolation of `"@name"`
/// desugars to.
pub fn join_ws(array: &str) -> Node {
    unary("join", list(vec![str_lit(" "), avar(array)]))
}

pub fn concat(left: Node, right: Node) -> Node {
    binop(".", left, right)
}

pub fn concat_all(parts: Vec<Node>) -> Node {
    let mut iter = parts.into_iter();
    let first = iter.next().expect("concat_all needs at least one part");
    iter.fold(first, concat)
}

// ----------------------------------------------------------------------
// Compile-and-run wrappers
// ----------------------------------------------------------------------

pub fn compile_program(statements: Vec<Node>) -> Rc<CodeUnit> {
    compile(&block(statements), &PragmaSnapshot::default(), &files()).expect("program compiles")
}

pub fn compile_strict(statements: Vec<Node>) -> Result<Rc<CodeUnit>, pearlite::CompileError> {
    compile(&block(statements), &PragmaSnapshot::strict(), &files())
}

/// An engine wired to a capturing sink.
pub struct Runner {
    pub interp: Interp,
    pub sink: SharedSink,
}

pub fn runner() -> Runner {
    let sink = SharedSink::new();
    Runner {
        interp: Interp::with_output(Box::new(sink.clone())),
        sink,
    }
}

pub fn scalar_text(value: &Value) -> String {
    stringify(&value.pl_scalar()).to_string()
}

pub fn list_text(value: &Value) -> Vec<String> {
    value.pl_list().iter().map(|s| stringify(s).to_string()).collect()
}

/// Runs a program in scalar context and stringifies its result.
pub fn run_scalar(statements: Vec<Node>) -> String {
    let unit = compile_program(statements);
    let mut r = runner();
    let value = r
        .interp
        .execute(&unit, Value::empty_list(), CallContext::Scalar, None)
        .expect("program runs");
    scalar_text(&value)
}

/// Runs a program in list context and stringifies each element.
pub fn run_list(statements: Vec<Node>) -> Vec<String> {
    let unit = compile_program(statements);
    let mut r = runner();
    let value = r
        .interp
        .execute(&unit, Value::empty_list(), CallContext::List, None)
        .expect("program runs");
    list_text(&value)
}

/// Runs a program expecting a runtime error; returns its rendering.
pub fn run_error(statements: Vec<Node>) -> RunError {
    let unit = compile_program(statements);
    let mut r = runner();
    r.interp
        .execute(&unit, Value::empty_list(), CallContext::Scalar, None)
        .expect_err("program should fail")
}
