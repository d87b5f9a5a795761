//! Subroutine definitions, closures, and call emission.
//!
//! Closure capture works in two layers:
//! - Anonymous subs capture free lexicals by *slot*: the inner unit records
//!   a capture list and `CreateClosure` snapshots the outer registers.
//! - Free lexicals of *named* subs instead live in the persistent-variable
//!   table, keyed by a begin-id assigned at their declaration; both the
//!   declaring scope and the named sub retrieve the same cell.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::{
    ast::{Node, SourcePos},
    bytecode::{builder::CodeBuilder, code::Constant, op::Opcode},
    exception::CompileError,
};

use super::{
    scope::{ScopeStack, FIRST_FREE_REG},
    CResult, Compiler, Ctx,
};

/// Records every sigil variable referenced freely by any *named* sub in the
/// tree. Declarations of these names compile to persistent variables.
pub(crate) fn collect_named_sub_free_vars(node: &Node, out: &mut AHashSet<String>) {
    walk(node, &mut |n| {
        if let Node::SubDef { name: Some(_), body, .. } = n {
            for key in free_vars(body) {
                out.insert(key);
            }
        }
    });
}

/// Free sigil variables of a sub body, in first-use order: names used but
/// not declared (`my`/`our`) anywhere inside the body.
fn free_vars(body: &Node) -> Vec<String> {
    let mut declared = AHashSet::new();
    walk(body, &mut |n| {
        if let Node::Unary { op, operand: Some(inner), .. } = n {
            if op == "my" || op == "our" {
                collect_declared(inner, &mut declared);
            }
        }
    });
    let mut seen = AHashSet::new();
    let mut order = Vec::new();
    walk(body, &mut |n| {
        if let Node::Unary { op, operand: Some(inner), .. } = n {
            if matches!(op.as_str(), "$" | "@" | "%") {
                if let Node::Identifier { name, .. } = inner.as_ref() {
                    if name.contains("::") || super::strict_exempt(name) {
                        return;
                    }
                    let key = format!("{op}{name}");
                    if !declared.contains(&key) && seen.insert(key.clone()) {
                        order.push(key);
                    }
                }
            }
        }
    });
    order
}

fn collect_declared(target: &Node, declared: &mut AHashSet<String>) {
    match target {
        Node::Unary { op, operand: Some(inner), .. } if matches!(op.as_str(), "$" | "@" | "%") => {
            if let Node::Identifier { name, .. } = inner.as_ref() {
                declared.insert(format!("{op}{name}"));
            }
        }
        Node::List { elements, .. } => {
            for element in elements {
                collect_declared(element, declared);
            }
        }
        _ => {}
    }
}

/// Pre-order walk over every node in a tree.
fn walk(node: &Node, visit: &mut impl FnMut(&Node)) {
    visit(node);
    match node {
        Node::Number { .. }
        | Node::StringLit { .. }
        | Node::Identifier { .. }
        | Node::Package { .. } => {}
        Node::Unary { operand, .. } => {
            if let Some(inner) = operand {
                walk(inner, visit);
            }
        }
        Node::Binary { left, right, .. } => {
            walk(left, visit);
            walk(right, visit);
        }
        Node::Ternary { cond, then, otherwise, .. } => {
            walk(cond, visit);
            walk(then, visit);
            walk(otherwise, visit);
        }
        Node::List { elements, .. } | Node::Block { statements: elements, .. } => {
            for child in elements {
                walk(child, visit);
            }
        }
        Node::If {
            cond,
            then_block,
            else_branch,
            ..
        } => {
            walk(cond, visit);
            walk(then_block, visit);
            if let Some(branch) = else_branch {
                walk(branch, visit);
            }
        }
        Node::While { cond, body, .. } => {
            walk(cond, visit);
            walk(body, visit);
        }
        Node::ForC {
            init, cond, step, body, ..
        } => {
            for part in [init, cond, step].into_iter().flatten() {
                walk(part, visit);
            }
            walk(body, visit);
        }
        Node::Foreach { var, list, body, .. } => {
            if let Some(var) = var {
                walk(var, visit);
            }
            walk(list, visit);
            walk(body, visit);
        }
        Node::SubDef { body, .. } | Node::EvalBlock { body, .. } | Node::LabelledBlock { body, .. } => {
            walk(body, visit);
        }
        Node::FunCall { callee, args, .. } => {
            walk(callee, visit);
            walk(args, visit);
        }
    }
}

impl Compiler<'_> {
    /// Compiles a sub definition; named subs are additionally installed in
    /// the symbol table when the definition statement executes.
    pub(crate) fn compile_sub_def(&mut self, node: &Node, _ctx: Ctx) -> CResult {
        let Node::SubDef { name, body, .. } = node else {
            unreachable!("compile_sub_def requires a SubDef node");
        };

        // classify each free variable of the body
        let mut captured: Vec<(String, u16)> = Vec::new();
        let mut persistent: Vec<(String, u32)> = Vec::new();
        for key in free_vars(body) {
            if let Some(slot) = self.scopes.lookup(&key) {
                match slot.persistent {
                    Some(id) => persistent.push((key, id)),
                    None => captured.push((key, slot.reg)),
                }
            } else if let Some(&reg) = self.capture_slots.get(&key) {
                // forward our own capture into the inner closure
                captured.push((key, reg));
            }
            // otherwise the name resolves globally inside the sub
        }

        let capture_count = u16::try_from(captured.len()).expect("capture count fits u16");
        let mut capture_slots = AHashMap::new();
        let mut capture_names = Vec::with_capacity(captured.len());
        for (i, (key, _)) in captured.iter().enumerate() {
            let slot = FIRST_FREE_REG + u16::try_from(i).expect("capture index fits u16");
            capture_slots.insert(key.clone(), slot);
            capture_names.push(Rc::from(key.as_str()));
        }

        let mut child = Compiler {
            builder: CodeBuilder::new(),
            scopes: ScopeStack::new(FIRST_FREE_REG + capture_count),
            files: self.files,
            pragma: self.pragma.clone(),
            loops: Vec::new(),
            eval_depth: 0,
            capture_names,
            capture_slots,
            persistent_candidates: Rc::clone(&self.persistent_candidates),
            begin_ids: Rc::clone(&self.begin_ids),
            unit_name: name.as_deref().map(Rc::from),
        };

        // prologue: re-retrieve persistent cells this body shares with its
        // declaring scope
        for (key, id) in persistent {
            let reg = child.scopes.declare_persistent(&key, id);
            let idx = child.builder.intern(&key);
            let opcode = match key.as_bytes()[0] {
                b'@' => Opcode::RetrievePersistentArray,
                b'%' => Opcode::RetrievePersistentHash,
                _ => Opcode::RetrievePersistentScalar,
            };
            child.builder.emit3(
                opcode,
                i32::from(reg),
                i32::try_from(id).expect("begin-id fits i32"),
                idx,
            );
        }

        let unit = child.compile_unit(body)?;
        let const_idx = self.builder.add_const(Constant::Unit(unit));

        // captures are passed as a contiguous register block
        let mut rbase = 0u16;
        for (i, (_, outer_reg)) in captured.iter().enumerate() {
            let rt = self.scopes.alloc_temp();
            if i == 0 {
                rbase = rt;
            }
            self.builder.emit2(Opcode::Move, i32::from(rt), i32::from(*outer_reg));
        }
        let rd = self.scopes.alloc_temp();
        self.builder
            .emit3(Opcode::CreateClosure, i32::from(rd), const_idx, i32::from(rbase));

        if let Some(sub_name) = name {
            let qualified = self.qualified(sub_name);
            let idx = self.builder.intern(&qualified);
            self.builder.emit2(Opcode::StoreGlobalCode, idx, i32::from(rd));
        }
        Ok(rd)
    }

    /// `foo(...)`, `&foo(...)`, or a computed callable.
    pub(crate) fn compile_fun_call(&mut self, callee: &Node, args: &Node, _pos: SourcePos, ctx: Ctx) -> CResult {
        let rcode = match callee {
            Node::Identifier { name, .. } => {
                let qualified = self.qualified(name);
                let idx = self.builder.intern(&qualified);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadGlobalCode, i32::from(rd), idx);
                rd
            }
            Node::Unary { op, operand: Some(inner), .. } if op == "&" => match inner.as_ref() {
                Node::Identifier { name, .. } => {
                    let qualified = self.qualified(name);
                    let idx = self.builder.intern(&qualified);
                    let rd = self.scopes.alloc_temp();
                    self.builder.emit2(Opcode::LoadGlobalCode, i32::from(rd), idx);
                    rd
                }
                expr => {
                    let rs = self.compile_expr(expr, Ctx::Scalar)?;
                    let rd = self.scopes.alloc_temp();
                    self.builder.emit2(Opcode::DerefCode, i32::from(rd), i32::from(rs));
                    rd
                }
            },
            expr => {
                let rs = self.compile_expr(expr, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DerefCode, i32::from(rd), i32::from(rs));
                rd
            }
        };
        let rargs = self.compile_to_list(args)?;
        let rd = self.scopes.alloc_temp();
        self.builder.emit4(
            Opcode::CallSub,
            i32::from(rd),
            i32::from(rcode),
            i32::from(rargs),
            ctx.operand(),
        );
        Ok(rd)
    }

    /// `$obj->name(...)` / `Class->name(...)`; the interpreter prepends
    /// the invocant to the argument list and resolves through `@ISA`.
    pub(crate) fn compile_method_call(&mut self, invocant: &Node, call: &Node, pos: SourcePos, ctx: Ctx) -> CResult {
        let (name_node, args_node) = match call {
            Node::FunCall { callee, args, .. } => (callee.as_ref(), Some(args.as_ref())),
            Node::Identifier { .. } => (call, None),
            other => return Err(self.err(format!("Malformed method call: {other}"), pos)),
        };
        let rinv = match invocant {
            Node::Identifier { name, .. } => {
                let idx = self.builder.intern(name);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadStr, i32::from(rd), idx);
                rd
            }
            expr => self.compile_expr(expr, Ctx::Scalar)?,
        };
        let rname = match name_node {
            Node::Identifier { name, .. } => {
                let idx = self.builder.intern(name);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadStr, i32::from(rd), idx);
                rd
            }
            expr => self.compile_expr(expr, Ctx::Scalar)?,
        };
        let rargs = match args_node {
            Some(args) => self.compile_to_list(args)?,
            None => {
                let rd = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::CreateList, i32::from(rd));
                rd
            }
        };
        let rd = self.scopes.alloc_temp();
        self.builder.emit5(
            Opcode::CallMethod,
            i32::from(rd),
            i32::from(rinv),
            i32::from(rname),
            i32::from(rargs),
            ctx.operand(),
        );
        Ok(rd)
    }
}
