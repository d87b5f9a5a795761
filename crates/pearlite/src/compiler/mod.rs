//! The bytecode compiler: AST → `CodeUnit`.
//!
//! The compiler walks [`Node`]s exhaustively, allocating registers through
//! the scope stack and emitting through [`CodeBuilder`]. Calling context is
//! threaded explicitly: every subexpression compiles under the [`Ctx`] its
//! parent consumes, so the context in force is restored on every exit path
//! by construction.
//!
//! Module layout mirrors the construct families:
//! - `scope` - registers and lexical scopes
//! - `assign` - the assignment matrix
//! - `flow` - conditionals, loops, short-circuit, `eval` blocks
//! - `subs` - sub definitions, closures, calls

pub mod assign;
pub mod binop;
pub mod builtins;
pub mod flow;
pub mod scope;
pub mod subs;

use std::{cell::RefCell, rc::Rc};

use ahash::AHashSet;

use crate::{
    ast::{Node, PragmaSnapshot, SourceFiles, SourcePos},
    bytecode::{
        builder::CodeBuilder,
        code::{CodeUnit, Constant},
        op::Opcode,
    },
    exception::CompileError,
};
use scope::{ScopeStack, VarSlot, FIRST_FREE_REG};

/// Compile-time calling context.
///
/// `Inherit` compiles like list context but emits context operand 3, making
/// calls and `wantarray` consult the runtime context register (used for
/// `return` and a unit's final expression).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctx {
    Void,
    Scalar,
    List,
    Inherit,
}

impl Ctx {
    #[must_use]
    pub fn operand(self) -> i32 {
        match self {
            Self::Void => 0,
            Self::Scalar => 1,
            Self::List => 2,
            Self::Inherit => 3,
        }
    }

}

/// Result alias for compilation steps that produce a register.
pub(crate) type CResult = Result<u16, CompileError>;

/// One loop being compiled; collects forward patches for `last` (and for
/// `next` when the continue point comes after the body, as in C-style
/// `for`).
pub(crate) struct LoopFrame {
    pub label: Option<String>,
    /// `next` target when already known (condition re-check / iterator
    /// step); `None` while it still lies ahead.
    pub next_pc: Option<usize>,
    pub next_patches: Vec<crate::bytecode::builder::JumpLabel>,
    /// `redo` target (body start, after loop-variable binding).
    pub redo_pc: usize,
    pub last_patches: Vec<crate::bytecode::builder::JumpLabel>,
    pub level_reg: u16,
    /// `eval` nesting depth at loop entry; jumps out of deeper `eval`s
    /// must pop handlers first.
    pub eval_depth: u32,
    pub body_start: usize,
}

/// Compiles an AST into an executable unit.
///
/// `pragma` is the lexical pragma snapshot at the compilation site; `files`
/// resolves [`SourcePos::file`] indexes for diagnostics.
pub fn compile(
    root: &Node,
    pragma: &PragmaSnapshot,
    files: &SourceFiles,
) -> Result<Rc<CodeUnit>, CompileError> {
    let mut candidates = AHashSet::new();
    subs::collect_named_sub_free_vars(root, &mut candidates);
    let mut compiler = Compiler {
        builder: CodeBuilder::new(),
        scopes: ScopeStack::new(FIRST_FREE_REG),
        files,
        pragma: pragma.clone(),
        loops: Vec::new(),
        eval_depth: 0,
        capture_names: Vec::new(),
        capture_slots: ahash::AHashMap::new(),
        persistent_candidates: Rc::new(candidates),
        begin_ids: Rc::new(RefCell::new(0)),
        unit_name: None,
    };
    compiler.compile_unit(root)
}

pub(crate) struct Compiler<'a> {
    pub builder: CodeBuilder,
    pub scopes: ScopeStack,
    pub files: &'a SourceFiles,
    /// Current pragma; `compile_package` mutates on `package` statements.
    pub pragma: PragmaSnapshot,
    pub loops: Vec<LoopFrame>,
    pub eval_depth: u32,
    /// Names of this unit's capture slots, in slot order.
    pub capture_names: Vec<Rc<str>>,
    /// Sigil-qualified name → capture register (3 + slot).
    pub capture_slots: ahash::AHashMap<String, u16>,
    /// Sigil-qualified lexical names referenced freely by any named sub;
    /// declarations of these become persistent variables.
    pub persistent_candidates: Rc<AHashSet<String>>,
    /// Begin-id allocator shared across nested compilations.
    pub begin_ids: Rc<RefCell<u32>>,
    pub unit_name: Option<Rc<str>>,
}

/// Does this statement use `local` at its own level (not inside a nested
/// sub, whose body brackets its own dynamic state)?
fn contains_local(node: &Node) -> bool {
    match node {
        Node::Unary { op, operand, .. } => {
            op == "local" || operand.as_deref().is_some_and(contains_local)
        }
        Node::Binary { left, right, .. } => contains_local(left) || contains_local(right),
        Node::Ternary { cond, then, otherwise, .. } => {
            contains_local(cond) || contains_local(then) || contains_local(otherwise)
        }
        Node::List { elements, .. } | Node::Block { statements: elements, .. } => {
            elements.iter().any(contains_local)
        }
        Node::If {
            cond,
            then_block,
            else_branch,
            ..
        } => {
            contains_local(cond)
                || contains_local(then_block)
                || else_branch.as_deref().is_some_and(contains_local)
        }
        Node::While { cond, body, .. } => contains_local(cond) || contains_local(body),
        Node::ForC {
            init, cond, step, body, ..
        } => {
            [init, cond, step]
                .into_iter()
                .flatten()
                .any(|part| contains_local(part))
                || contains_local(body)
        }
        Node::Foreach { list, body, .. } => contains_local(list) || contains_local(body),
        Node::EvalBlock { body, .. } | Node::LabelledBlock { body, .. } => contains_local(body),
        Node::FunCall { callee, args, .. } => contains_local(callee) || contains_local(args),
        // a nested sub's locals are bracketed by its own invocation
        Node::SubDef { .. }
        | Node::Number { .. }
        | Node::StringLit { .. }
        | Node::Identifier { .. }
        | Node::Package { .. } => false,
    }
}

/// Scalar names exempt from `strict vars` (punctuation variables and the
/// conventional sort/topic globals).
pub(crate) fn strict_exempt(name: &str) -> bool {
    matches!(name, "_" | "a" | "b" | "@" | "!" | "/" | "\\" | "," | "." | "0" | "&" | "`" | "'")
        || name.chars().all(|c| c.is_ascii_digit())
        || matches!(name, "ENV" | "ARGV" | "INC" | "STDIN" | "STDOUT" | "STDERR" | "ISA")
}

impl<'a> Compiler<'a> {
    pub(crate) fn err(&self, message: impl Into<String>, pos: SourcePos) -> CompileError {
        CompileError::new(message, pos)
    }

    pub(crate) fn at(&mut self, pos: SourcePos) {
        self.builder.set_line(pos.line);
    }

    /// Qualifies an unqualified global name with the compile package.
    /// Punctuation variables and the process-wide handles always live in
    /// `main`; `@ISA` stays per-package.
    pub(crate) fn qualified(&self, name: &str) -> String {
        let forced_main = !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            || name.chars().all(|c| c.is_ascii_digit())
            || matches!(name, "_" | "a" | "b" | "ENV" | "ARGV" | "INC" | "STDIN" | "STDOUT" | "STDERR");
        if name.contains("::") {
            name.to_owned()
        } else if forced_main {
            format!("main::{name}")
        } else {
            format!("{}::{name}", self.pragma.compile_package)
        }
    }

    pub(crate) fn next_begin_id(&mut self) -> u32 {
        let mut ids = self.begin_ids.borrow_mut();
        *ids += 1;
        *ids
    }

    /// Compiles a whole unit body and finalises the `CodeUnit`.
    pub(crate) fn compile_unit(mut self, body: &Node) -> Result<Rc<CodeUnit>, CompileError> {
        let statements = match body {
            Node::Block { statements, .. } => statements.as_slice(),
            other => std::slice::from_ref(other),
        };
        let result = self.compile_stmt_sequence(statements, Ctx::Inherit)?;
        match result {
            Some(reg) => self.builder.emit1(Opcode::Return, i32::from(reg)),
            None => self.builder.emit(Opcode::ReturnEmpty),
        }
        let source_name: Rc<str> = Rc::from(self.files.name(body.pos().file));
        let unit = self.builder.build(
            self.scopes.max_registers(),
            self.capture_names,
            source_name,
            self.pragma,
            self.unit_name,
        );
        Ok(Rc::new(unit))
    }

    /// Compiles a statement list; all but the last run in void context, the
    /// last in `last_ctx`. Returns the last statement's register, if any.
    pub(crate) fn compile_stmt_sequence(
        &mut self,
        statements: &[Node],
        last_ctx: Ctx,
    ) -> Result<Option<u16>, CompileError> {
        let mut result = None;
        for (i, stmt) in statements.iter().enumerate() {
            let cp = self.scopes.checkpoint();
            if i + 1 == statements.len() && last_ctx != Ctx::Void {
                result = Some(self.compile_expr(stmt, last_ctx)?);
                // the final value's register must survive the statement
            } else {
                self.compile_expr(stmt, Ctx::Void)?;
                self.scopes.release_to(cp);
            }
        }
        Ok(result)
    }

    /// Runs `f` under a new lexical scope, emitting nothing extra.
    pub(crate) fn scoped<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, CompileError>,
    ) -> Result<R, CompileError> {
        self.scopes.push();
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// The central expression dispatch.
    #[expect(clippy::too_many_lines, reason = "exhaustive node dispatch stays in one place")]
    pub(crate) fn compile_expr(&mut self, node: &Node, ctx: Ctx) -> CResult {
        self.at(node.pos());
        match node {
            Node::Number { value, pos } => self.compile_number(value, *pos),
            Node::StringLit { value, .. } => {
                let idx = self.builder.intern(value);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadStr, i32::from(rd), idx);
                Ok(rd)
            }
            // a bareword in expression position is its own string
            Node::Identifier { name, .. } => {
                let idx = self.builder.intern(name);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadStr, i32::from(rd), idx);
                Ok(rd)
            }
            Node::Unary { op, operand, pos } => self.compile_unary(op, operand.as_deref(), *pos, ctx),
            Node::Binary { op, left, right, pos } => self.compile_binary(op, left, right, *pos, ctx),
            Node::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => self.compile_ternary(cond, then, otherwise, ctx),
            Node::List { elements, .. } => self.compile_list_node(elements, ctx),
            Node::Block { statements, .. } => self.scoped(|c| {
                // blocks containing `local` bracket the dynamic stack
                let localizes = statements.iter().any(contains_local);
                let rlvl = if localizes {
                    let rlvl = c.scopes.alloc_temp();
                    c.builder.emit1(Opcode::SaveLocalLevel, i32::from(rlvl));
                    Some(rlvl)
                } else {
                    None
                };
                let result = c.compile_stmt_sequence(statements, ctx)?;
                if let Some(rlvl) = rlvl {
                    c.builder.emit1(Opcode::PopToLocalLevel, i32::from(rlvl));
                }
                Ok(result.unwrap_or_else(|| {
                    let rd = c.scopes.alloc_temp();
                    c.builder.emit1(Opcode::LoadUndef, i32::from(rd));
                    rd
                }))
            }),
            Node::If { .. } => {
                self.compile_if(node)?;
                self.undef_result()
            }
            Node::While { .. } => {
                self.compile_while(node)?;
                self.undef_result()
            }
            Node::ForC { .. } => {
                self.compile_for_c(node)?;
                self.undef_result()
            }
            Node::Foreach { .. } => {
                self.compile_foreach(node)?;
                self.undef_result()
            }
            Node::LabelledBlock { .. } => {
                self.compile_labelled_block(node)?;
                self.undef_result()
            }
            Node::SubDef { .. } => self.compile_sub_def(node, ctx),
            Node::FunCall { callee, args, pos } => self.compile_fun_call(callee, args, *pos, ctx),
            Node::EvalBlock { body, .. } => self.compile_eval_block(body, ctx),
            Node::Package { name, .. } => {
                self.pragma.compile_package = name.clone();
                let idx = self.builder.intern(name);
                self.builder.emit1(Opcode::PushPackage, idx);
                self.undef_result()
            }
        }
    }

    pub(crate) fn undef_result(&mut self) -> CResult {
        let rd = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::LoadUndef, i32::from(rd));
        Ok(rd)
    }

    /// Test hook: the opcodes this compilation emitted, in order.
    #[cfg(test)]
    fn emitted_opcodes(unit: &CodeUnit) -> Vec<Opcode> {
        let mut out = Vec::new();
        let mut at = 0;
        while at < unit.instructions.len() {
            let op = u16::try_from(unit.instructions[at])
                .ok()
                .and_then(Opcode::from_repr)
                .expect("valid opcode");
            out.push(op);
            at += 1 + op.operand_count();
        }
        out
    }

    fn compile_number(&mut self, value: &str, pos: SourcePos) -> CResult {
        let rd = self.scopes.alloc_temp();
        if value.contains(['.', 'e', 'E']) {
            let parsed: f64 = value
                .parse()
                .map_err(|_| self.err(format!("Malformed numeric literal \"{value}\""), pos))?;
            let idx = self.builder.add_const(Constant::Num(parsed));
            self.builder.emit2(Opcode::LoadConst, i32::from(rd), idx);
        } else {
            let parsed: i64 = value
                .parse()
                .map_err(|_| self.err(format!("Malformed numeric literal \"{value}\""), pos))?;
            match i32::try_from(parsed) {
                Ok(imm) => self.builder.emit2(Opcode::LoadInt, i32::from(rd), imm),
                Err(_) => {
                    let idx = self.builder.add_const(Constant::Int(parsed));
                    self.builder.emit2(Opcode::LoadConst, i32::from(rd), idx);
                }
            }
        }
        Ok(rd)
    }

    // ------------------------------------------------------------------
    // Variable resolution
    // ------------------------------------------------------------------

    /// The register holding `$name`'s scalar cell, resolving lexicals,
    /// captures, and globals.
    pub(crate) fn resolve_scalar_var(&mut self, name: &str, pos: SourcePos) -> CResult {
        let key = format!("${name}");
        if let Some(slot) = self.scopes.lookup(&key) {
            return Ok(slot.reg);
        }
        if let Some(&reg) = self.capture_slots.get(&key) {
            return Ok(reg);
        }
        self.load_global_scalar(name, pos)
    }

    pub(crate) fn load_global_scalar(&mut self, name: &str, pos: SourcePos) -> CResult {
        if self.pragma.strict_vars && !name.contains("::") && !strict_exempt(name) {
            return Err(self.err(
                format!("Global symbol \"${name}\" requires explicit package name"),
                pos,
            ));
        }
        let qualified = self.qualified(name);
        let idx = self.builder.intern(&qualified);
        let rd = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::LoadGlobalScalar, i32::from(rd), idx);
        Ok(rd)
    }

    /// The register holding `@name` (lexical, capture, or global array).
    pub(crate) fn resolve_array_var(&mut self, name: &str, pos: SourcePos) -> CResult {
        let key = format!("@{name}");
        if name == "_" {
            // @_ is the fixed argument register
            return Ok(1);
        }
        if let Some(slot) = self.scopes.lookup(&key) {
            return Ok(slot.reg);
        }
        if let Some(&reg) = self.capture_slots.get(&key) {
            return Ok(reg);
        }
        if self.pragma.strict_vars && !name.contains("::") && !strict_exempt(name) {
            return Err(self.err(
                format!("Global symbol \"@{name}\" requires explicit package name"),
                pos,
            ));
        }
        let qualified = self.qualified(name);
        let idx = self.builder.intern(&qualified);
        let rd = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::LoadGlobalArray, i32::from(rd), idx);
        Ok(rd)
    }

    /// The register holding `%name`.
    pub(crate) fn resolve_hash_var(&mut self, name: &str, pos: SourcePos) -> CResult {
        let key = format!("%{name}");
        if let Some(slot) = self.scopes.lookup(&key) {
            return Ok(slot.reg);
        }
        if let Some(&reg) = self.capture_slots.get(&key) {
            return Ok(reg);
        }
        if self.pragma.strict_vars && !name.contains("::") && !strict_exempt(name) {
            return Err(self.err(
                format!("Global symbol \"%{name}\" requires explicit package name"),
                pos,
            ));
        }
        let qualified = self.qualified(name);
        let idx = self.builder.intern(&qualified);
        let rd = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::LoadGlobalHash, i32::from(rd), idx);
        Ok(rd)
    }

    /// Compiles the value an array-ish subscript base refers to: `$a[i]`
    /// and `@a[...]` both reach through `@a`, and `(LIST)[i]` through the
    /// literal list.
    pub(crate) fn compile_array_base(&mut self, base: &Node) -> CResult {
        match base {
            Node::Unary { op, operand: Some(inner), pos } if op == "@" => match inner.as_ref() {
                Node::Identifier { name, .. } => self.resolve_array_var(name, *pos),
                expr => {
                    let rs = self.compile_expr(expr, Ctx::Scalar)?;
                    let rd = self.scopes.alloc_temp();
                    self.builder.emit2(Opcode::DerefArray, i32::from(rd), i32::from(rs));
                    Ok(rd)
                }
            },
            Node::List { .. } => self.compile_to_list(base),
            other => self.compile_expr(other, Ctx::Scalar),
        }
    }

    /// Compiles a hash-ish subscript base (`$h{k}`, `@h{...}` reach `%h`).
    pub(crate) fn compile_hash_base(&mut self, base: &Node) -> CResult {
        match base {
            Node::Unary { op, operand: Some(inner), pos } if op == "%" => match inner.as_ref() {
                Node::Identifier { name, .. } => self.resolve_hash_var(name, *pos),
                expr => {
                    let rs = self.compile_expr(expr, Ctx::Scalar)?;
                    let rd = self.scopes.alloc_temp();
                    self.builder.emit2(Opcode::DerefHash, i32::from(rd), i32::from(rs));
                    Ok(rd)
                }
            },
            other => self.compile_expr(other, Ctx::Scalar),
        }
    }

    /// Hash keys auto-quote barewords.
    pub(crate) fn compile_hash_key(&mut self, key: &Node) -> CResult {
        match key {
            Node::Identifier { name, .. } => {
                let idx = self.builder.intern(name);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadStr, i32::from(rd), idx);
                Ok(rd)
            }
            other => self.compile_expr(other, Ctx::Scalar),
        }
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    /// Compiles any node into a list register (flattening, list context).
    pub(crate) fn compile_to_list(&mut self, node: &Node) -> CResult {
        let rlist = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
        self.push_onto_list(rlist, node)?;
        Ok(rlist)
    }

    /// Appends a node's list-context value onto an existing list register.
    pub(crate) fn push_onto_list(&mut self, rlist: u16, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::List { elements, .. } => {
                for element in elements {
                    self.push_onto_list(rlist, element)?;
                }
            }
            other => {
                let rv = self.compile_expr(other, Ctx::List)?;
                self.builder.emit2(Opcode::ListPush, i32::from(rlist), i32::from(rv));
            }
        }
        Ok(())
    }

    fn compile_list_node(&mut self, elements: &[Node], ctx: Ctx) -> CResult {
        match ctx {
            Ctx::Void => {
                for element in elements {
                    self.compile_expr(element, Ctx::Void)?;
                }
                self.undef_result()
            }
            Ctx::Scalar => {
                // the comma operator: evaluate all, yield the last
                let mut last = None;
                for element in elements {
                    last = Some(self.compile_expr(element, Ctx::Scalar)?);
                }
                match last {
                    Some(reg) => Ok(reg),
                    None => self.undef_result(),
                }
            }
            Ctx::List | Ctx::Inherit => {
                let rlist = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                for element in elements {
                    self.push_onto_list(rlist, element)?;
                }
                Ok(rlist)
            }
        }
    }

    fn compile_ternary(&mut self, cond: &Node, then: &Node, otherwise: &Node, ctx: Ctx) -> CResult {
        let rcond = self.compile_expr(cond, Ctx::Scalar)?;
        let rd = self.scopes.alloc_temp();
        let to_else = self.builder.emit_jump(Opcode::JumpIfFalse, &[i32::from(rcond)]);
        let ctx = if ctx == Ctx::Void { Ctx::Scalar } else { ctx };
        let rthen = self.compile_expr(then, ctx)?;
        self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(rthen));
        let to_end = self.builder.emit_jump(Opcode::Jump, &[]);
        self.builder.patch_jump(to_else);
        let relse = self.compile_expr(otherwise, ctx)?;
        self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(relse));
        self.builder.patch_jump(to_end);
        Ok(rd)
    }

    // ------------------------------------------------------------------
    // Unary dispatch
    // ------------------------------------------------------------------

    fn operand_or_err<'n>(&self, operand: Option<&'n Node>, op: &str, pos: SourcePos) -> Result<&'n Node, CompileError> {
        operand.ok_or_else(|| self.err(format!("Missing operand for {op}"), pos))
    }

    #[expect(clippy::too_many_lines, reason = "the unary keyword table is one exhaustive match")]
    fn compile_unary(&mut self, op: &str, operand: Option<&Node>, pos: SourcePos, ctx: Ctx) -> CResult {
        match op {
            "$" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                match inner {
                    Node::Identifier { name, .. } => self.resolve_scalar_var(name, pos),
                    expr => {
                        let rs = self.compile_expr(expr, Ctx::Scalar)?;
                        let rd = self.scopes.alloc_temp();
                        let deref = if self.pragma.strict_refs {
                            Opcode::DerefScalar
                        } else {
                            Opcode::DerefScalarSym
                        };
                        self.builder.emit2(deref, i32::from(rd), i32::from(rs));
                        Ok(rd)
                    }
                }
            }
            "@" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                match inner {
                    Node::Identifier { name, .. } => self.resolve_array_var(name, pos),
                    expr => {
                        let rs = self.compile_expr(expr, Ctx::Scalar)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::DerefArray, i32::from(rd), i32::from(rs));
                        Ok(rd)
                    }
                }
            }
            "%" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                match inner {
                    Node::Identifier { name, .. } => self.resolve_hash_var(name, pos),
                    expr => {
                        let rs = self.compile_expr(expr, Ctx::Scalar)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::DerefHash, i32::from(rd), i32::from(rs));
                        Ok(rd)
                    }
                }
            }
            "&" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                match inner {
                    Node::Identifier { name, .. } => {
                        let qualified = self.qualified(name);
                        let idx = self.builder.intern(&qualified);
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadGlobalCode, i32::from(rd), idx);
                        Ok(rd)
                    }
                    expr => {
                        let rs = self.compile_expr(expr, Ctx::Scalar)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::DerefCode, i32::from(rd), i32::from(rs));
                        Ok(rd)
                    }
                }
            }
            "*" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                match inner {
                    Node::Identifier { name, .. } => {
                        let qualified = self.qualified(name);
                        let idx = self.builder.intern(&qualified);
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadGlobalGlob, i32::from(rd), idx);
                        Ok(rd)
                    }
                    expr => {
                        let rs = self.compile_expr(expr, Ctx::Scalar)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::DerefGlob, i32::from(rd), i32::from(rs));
                        Ok(rd)
                    }
                }
            }
            "my" | "our" | "local" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                self.compile_declaration(op, inner, None, pos, ctx)
            }
            "\\" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                if let Node::List { elements, .. } = inner {
                    // \(LIST) distributes the reference over the elements
                    let rlist = self.scopes.alloc_temp();
                    self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                    for element in elements {
                        let rv = self.compile_expr(element, Ctx::List)?;
                        let rref = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::CreateRef, i32::from(rref), i32::from(rv));
                        self.builder.emit2(Opcode::ListPush, i32::from(rlist), i32::from(rref));
                    }
                    return Ok(rlist);
                }
                let rs = self.compile_expr(inner, Ctx::List)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::CreateRef, i32::from(rd), i32::from(rs));
                Ok(rd)
            }
            "!" | "not" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                let rs = self.compile_expr(inner, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::Not, i32::from(rd), i32::from(rs));
                Ok(rd)
            }
            "-" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                let rs = self.compile_expr(inner, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::Neg, i32::from(rd), i32::from(rs));
                Ok(rd)
            }
            "+" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                self.compile_expr(inner, ctx)
            }
            "++" | "--" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                let rv = self.compile_scalar_lvalue(inner)?;
                let opcode = if op == "++" { Opcode::Inc } else { Opcode::Dec };
                self.builder.emit1(opcode, i32::from(rv));
                Ok(rv)
            }
            "++post" | "--post" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                let rv = self.compile_scalar_lvalue(inner)?;
                let rold = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::LoadUndef, i32::from(rold));
                self.builder.emit2(Opcode::ScalarAssign, i32::from(rold), i32::from(rv));
                let opcode = if op == "++post" { Opcode::Inc } else { Opcode::Dec };
                self.builder.emit1(opcode, i32::from(rv));
                Ok(rold)
            }
            "m" | "s" | "qr" => self.compile_regex_op(op, operand, None, pos, ctx),
            "$#" => {
                let inner = self.operand_or_err(operand, op, pos)?;
                let rarr = self.compile_array_base(inner)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::ArrayLastIndex, i32::from(rd), i32::from(rarr));
                Ok(rd)
            }
            // anonymous constructors: `[LIST]` and `{LIST}`
            "[" => {
                let rlist = match operand {
                    Some(node) => self.compile_to_list(node)?,
                    None => {
                        let rlist = self.scopes.alloc_temp();
                        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                        rlist
                    }
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::AnonArray, i32::from(rd), i32::from(rlist));
                Ok(rd)
            }
            "{" => {
                let rlist = match operand {
                    Some(node) => self.compile_to_list(node)?,
                    None => {
                        let rlist = self.scopes.alloc_temp();
                        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                        rlist
                    }
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::AnonHash, i32::from(rd), i32::from(rlist));
                Ok(rd)
            }
            other => self.compile_named_unary(other, operand, pos, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pos() -> SourcePos {
        SourcePos::new(0, 1)
    }

    fn svar(name: &str) -> Node {
        Node::Unary {
            op: "$".to_owned(),
            operand: Some(Box::new(Node::Identifier {
                name: name.to_owned(),
                pos: pos(),
            })),
            pos: pos(),
        }
    }

    fn my_s(name: &str) -> Node {
        Node::Unary {
            op: "my".to_owned(),
            operand: Some(Box::new(svar(name))),
            pos: pos(),
        }
    }

    fn num(value: i64) -> Node {
        Node::Number {
            value: value.to_string(),
            pos: pos(),
        }
    }

    fn binary(op: &str, left: Node, right: Node) -> Node {
        Node::Binary {
            op: op.to_owned(),
            left: Box::new(left),
            right: Box::new(right),
            pos: pos(),
        }
    }

    fn program(statements: Vec<Node>) -> Node {
        Node::Block {
            statements,
            pos: pos(),
        }
    }

    fn compile_ok(statements: Vec<Node>) -> std::rc::Rc<CodeUnit> {
        let files = SourceFiles::new(vec!["t.pl".to_owned()]);
        compile(&program(statements), &PragmaSnapshot::default(), &files).expect("compiles")
    }

    /// `$x = $x + expr` on an uncaptured lexical must fuse to AddAssign.
    #[test]
    fn add_assign_peephole_fires() {
        let unit = compile_ok(vec![
            binary("=", my_s("x"), num(1)),
            binary("=", svar("x"), binary("+", svar("x"), num(5))),
        ]);
        let ops = Compiler::emitted_opcodes(&unit);
        assert!(ops.contains(&Opcode::AddAssign), "ops: {ops:?}");
        // no free-standing Add remains for the fused statement
        assert!(!ops.contains(&Opcode::Add), "ops: {ops:?}");
    }

    /// The peephole must not fire for a captured (persistent) lexical.
    #[test]
    fn add_assign_peephole_respects_captures() {
        let sub_body = Node::Block {
            statements: vec![svar("x")],
            pos: pos(),
        };
        let unit = compile_ok(vec![
            binary("=", my_s("x"), num(1)),
            Node::SubDef {
                name: Some("peek".to_owned()),
                body: Box::new(sub_body),
                prototype: None,
                pos: pos(),
            },
            binary("=", svar("x"), binary("+", svar("x"), num(5))),
        ]);
        let ops = Compiler::emitted_opcodes(&unit);
        assert!(ops.contains(&Opcode::Add), "ops: {ops:?}");
        assert!(ops.contains(&Opcode::RetrievePersistentScalar), "ops: {ops:?}");
    }

    /// Short-circuit OR lowers to a conditional jump over the right side.
    #[test]
    fn logical_or_emits_branch_not_opcode() {
        let unit = compile_ok(vec![binary("||", num(1), num(2))]);
        let ops = Compiler::emitted_opcodes(&unit);
        assert!(ops.contains(&Opcode::JumpIfTrue), "ops: {ops:?}");
    }

    /// Defined-or branches on definedness.
    #[test]
    fn defined_or_branches_on_definedness() {
        let unit = compile_ok(vec![binary("//", num(1), num(2))]);
        let ops = Compiler::emitted_opcodes(&unit);
        assert!(ops.contains(&Opcode::JumpIfDefined), "ops: {ops:?}");
    }

    /// Loops record their descriptors for runtime marker consumption.
    #[test]
    fn loops_register_loop_table_entries() {
        let unit = compile_ok(vec![Node::Foreach {
            var: None,
            list: Box::new(binary("..", num(1), num(3))),
            body: Box::new(program(vec![])),
            label: Some("L".to_owned()),
            pos: pos(),
        }]);
        assert_eq!(unit.loop_table.len(), 1);
        let entry = &unit.loop_table[0];
        assert_eq!(entry.label.as_deref(), Some("L"));
        assert!(entry.body_start < entry.body_end);
    }

    /// Strict vars rejects bare globals but admits punctuation variables.
    #[test]
    fn strict_vars_enforcement() {
        let files = SourceFiles::new(vec!["t.pl".to_owned()]);
        let err = compile(
            &program(vec![binary("=", svar("loose"), num(1))]),
            &PragmaSnapshot::strict(),
            &files,
        )
        .expect_err("bare global under strict");
        assert!(err.message.contains("requires explicit package name"));

        compile(
            &program(vec![binary("=", svar("_"), num(1))]),
            &PragmaSnapshot::strict(),
            &files,
        )
        .expect("$_ passes strict");
    }

    /// The register file size covers the fixed registers even for an
    /// empty program.
    #[test]
    fn empty_program_reserves_fixed_registers() {
        let unit = compile_ok(vec![]);
        assert!(unit.max_registers >= 3);
        assert!(matches!(
            Compiler::emitted_opcodes(&unit).as_slice(),
            [Opcode::ReturnEmpty]
        ));
    }
}
