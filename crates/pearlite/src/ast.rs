//! Abstract syntax tree consumed by the bytecode compiler.
//!
//! The parser is an external collaborator; this module defines the node
//! shapes it must produce. Nodes are deliberately operator-keyed: most Perl
//! constructs arrive as [`Node::Unary`] or [`Node::Binary`] with the operator
//! spelled as a keyword string, and the compiler dispatches on that keyword.
//! Structured constructs (loops, sub definitions, `eval` blocks) get their
//! own variants.
//!
//! Subscript operators distinguish element access from slices at the parser
//! level so the compiler does not have to re-derive the sigil:
//!
//! | op      | meaning                         |
//! |---------|---------------------------------|
//! | `"["`   | `$a[i]` scalar element           |
//! | `"{"`   | `$h{k}` scalar element           |
//! | `"@["`  | `@a[...]` array slice            |
//! | `"@{"`  | `@h{...}` hash slice             |
//! | `"%{"`  | `%h{...}` key/value slice        |
//! | `"->["` | `$ref->[i]` arrow element        |
//! | `"->{"` | `$ref->{k}` arrow element        |
//! | `"->("` | `$code->(...)` arrow call        |
//! | `"method"` | `$obj->name(...)` method call |
//!
//! The unary forms of `"["` and `"{"` are the anonymous constructors
//! `[LIST]` and `{LIST}`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A source location: an index into [`SourceFiles`] plus a 1-based line.
///
/// Kept `Copy`-small; file names live in the side table so positions can be
/// stored densely in bytecode metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePos {
    /// Index into the [`SourceFiles`] table.
    pub file: u32,
    /// 1-based source line.
    pub line: u32,
}

impl SourcePos {
    #[must_use]
    pub fn new(file: u32, line: u32) -> Self {
        Self { file, line }
    }
}

/// Side table mapping [`SourcePos::file`] indexes to file names.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles(Vec<String>);

impl SourceFiles {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Returns the file name for an index, or `"-"` when out of range.
    #[must_use]
    pub fn name(&self, index: u32) -> &str {
        self.0.get(index as usize).map_or("-", String::as_str)
    }
}

/// Snapshot of the lexical pragmata in force at a compilation site.
///
/// Consulted by the compiler for `strict` enforcement; recorded into the
/// produced `CodeUnit` so `eval STRING` child compilations inherit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PragmaSnapshot {
    /// `use strict 'vars'`: forbid undeclared (non-`our`) global access.
    pub strict_vars: bool,
    /// `use strict 'refs'`: forbid symbolic dereferences.
    pub strict_refs: bool,
    /// `use warnings` (currently informational).
    pub warnings: bool,
    /// Feature-bundle bits (currently informational).
    pub features: u32,
    /// Package in scope at the compilation site.
    pub compile_package: String,
}

impl Default for PragmaSnapshot {
    fn default() -> Self {
        Self {
            strict_vars: false,
            strict_refs: false,
            warnings: false,
            features: 0,
            compile_package: "main".to_owned(),
        }
    }
}

impl PragmaSnapshot {
    /// Snapshot with both `strict` categories enabled, package `main`.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_vars: true,
            strict_refs: true,
            warnings: true,
            ..Self::default()
        }
    }
}

/// An AST node.
///
/// Every variant carries its source position. Children are boxed; lists of
/// statements or elements are plain vectors.
#[derive(Debug, Clone)]
pub enum Node {
    /// Numeric literal, kept in source spelling (`"42"`, `"0.5"`, `"1e3"`).
    /// The compiler decides integer versus double representation.
    Number { value: String, pos: SourcePos },

    /// String literal. Interpolation is resolved by the parser into
    /// concatenation/`join` nodes, so the value here is final.
    StringLit { value: String, pos: SourcePos },

    /// Bare identifier: sub names, package names, barewords, labels.
    Identifier { name: String, pos: SourcePos },

    /// Single-operand operator node. The operator is a keyword string:
    /// sigils (`$ @ % & *`, plus `$#` for the last-index form),
    /// declarations (`my our local`), `not`/`!`,
    /// unary minus/plus, `\` (reference), `++ -- ++post --post`, loop
    /// control (`last next redo goto return`), and named unaries
    /// (`defined undef scalar wantarray keys values each shift pop push
    /// unshift exists delete ref length int abs sqrt chr ord lc uc
    /// chomp chop die warn print say readline open close join sprintf sort
    /// reverse split bless caller pos eval-string m s qr`).
    ///
    /// Operators taking argument lists receive a [`Node::List`] operand.
    /// `operand` is `None` for bare `return`, `wantarray`, `shift`, etc.
    Unary {
        op: String,
        operand: Option<Box<Node>>,
        pos: SourcePos,
    },

    /// Two-operand operator node; see the module docs for subscript ops.
    Binary {
        op: String,
        left: Box<Node>,
        right: Box<Node>,
        pos: SourcePos,
    },

    /// `cond ? then : otherwise`.
    Ternary {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
        pos: SourcePos,
    },

    /// Parenthesised list. Also the argument carrier for calls and named
    /// list operators.
    List { elements: Vec<Node>, pos: SourcePos },

    /// Brace block: a statement sequence with its own lexical scope.
    Block { statements: Vec<Node>, pos: SourcePos },

    /// `if`/`elsif`/`else` chain. `else_branch` is another [`Node::If`]
    /// (for `elsif`), a [`Node::Block`], or absent.
    If {
        cond: Box<Node>,
        then_block: Box<Node>,
        else_branch: Option<Box<Node>>,
        pos: SourcePos,
    },

    /// `while`/`until` loop, possibly labelled.
    While {
        cond: Box<Node>,
        body: Box<Node>,
        label: Option<String>,
        is_until: bool,
        pos: SourcePos,
    },

    /// C-style `for (init; cond; step) { ... }`.
    ForC {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        step: Option<Box<Node>>,
        body: Box<Node>,
        label: Option<String>,
        pos: SourcePos,
    },

    /// `foreach [my $var] (LIST) { ... }`. `var` absent binds `$_`.
    Foreach {
        var: Option<Box<Node>>,
        list: Box<Node>,
        body: Box<Node>,
        label: Option<String>,
        pos: SourcePos,
    },

    /// Named or anonymous subroutine definition.
    SubDef {
        name: Option<String>,
        body: Box<Node>,
        prototype: Option<String>,
        pos: SourcePos,
    },

    /// `foo(...)` / `&foo(...)` call of a named or computed sub.
    /// `args` is a [`Node::List`].
    FunCall {
        callee: Box<Node>,
        args: Box<Node>,
        pos: SourcePos,
    },

    /// `eval { ... }` block (the exception form, not `eval STRING`).
    EvalBlock { body: Box<Node>, pos: SourcePos },

    /// `package NAME;` - switches the compile package for the rest of the
    /// enclosing block.
    Package { name: String, pos: SourcePos },

    /// A labelled bare block: `NAME: { ... }`. Behaves as a loop that runs
    /// once for the purposes of `last`/`next`/`redo`.
    LabelledBlock {
        label: String,
        body: Box<Node>,
        pos: SourcePos,
    },
}

impl Node {
    /// Returns this node's source position.
    #[must_use]
    pub fn pos(&self) -> SourcePos {
        match self {
            Self::Number { pos, .. }
            | Self::StringLit { pos, .. }
            | Self::Identifier { pos, .. }
            | Self::Unary { pos, .. }
            | Self::Binary { pos, .. }
            | Self::Ternary { pos, .. }
            | Self::List { pos, .. }
            | Self::Block { pos, .. }
            | Self::If { pos, .. }
            | Self::While { pos, .. }
            | Self::ForC { pos, .. }
            | Self::Foreach { pos, .. }
            | Self::SubDef { pos, .. }
            | Self::FunCall { pos, .. }
            | Self::EvalBlock { pos, .. }
            | Self::Package { pos, .. }
            | Self::LabelledBlock { pos, .. } => *pos,
        }
    }

    /// True when the node is a sigil application of the given sigil to a
    /// plain identifier (`$x`, `@a`, ...), as opposed to a dereference of a
    /// computed expression.
    #[must_use]
    pub fn as_sigil_var(&self, sigil: &str) -> Option<&str> {
        if let Self::Unary { op, operand: Some(inner), .. } = self {
            if op == sigil {
                if let Self::Identifier { name, .. } = inner.as_ref() {
                    return Some(name);
                }
            }
        }
        None
    }
}

impl fmt::Display for Node {
    /// Compact one-line rendering used in compile-error messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number { value, .. } => write!(f, "{value}"),
            Self::StringLit { value, .. } => write!(f, "{value:?}"),
            Self::Identifier { name, .. } => write!(f, "{name}"),
            Self::Unary { op, .. } => write!(f, "{op}(...)"),
            Self::Binary { op, .. } => write!(f, "(... {op} ...)"),
            Self::Ternary { .. } => write!(f, "(... ? ... : ...)"),
            Self::List { .. } => write!(f, "(...)"),
            Self::Block { .. } | Self::LabelledBlock { .. } => write!(f, "{{...}}"),
            Self::If { .. } => write!(f, "if (...)"),
            Self::While { is_until: false, .. } => write!(f, "while (...)"),
            Self::While { is_until: true, .. } => write!(f, "until (...)"),
            Self::ForC { .. } => write!(f, "for (;;)"),
            Self::Foreach { .. } => write!(f, "foreach (...)"),
            Self::SubDef { name: Some(name), .. } => write!(f, "sub {name}"),
            Self::SubDef { name: None, .. } => write!(f, "sub {{...}}"),
            Self::FunCall { .. } => write!(f, "call(...)"),
            Self::EvalBlock { .. } => write!(f, "eval {{...}}"),
            Self::Package { name, .. } => write!(f, "package {name}"),
        }
    }
}
