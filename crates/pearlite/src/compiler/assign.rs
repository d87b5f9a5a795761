//! The assignment matrix.
//!
//! Assignment is the most shape-sensitive construct in the language: the
//! emitted protocol depends entirely on the left-hand side. Each arm below
//! corresponds to one row of that matrix; `compile_declaration` covers the
//! `my`/`our`/`local` rows and `compile_list_assign` the list-to-list rows
//! with slurpy tails.

use crate::{
    ast::{Node, SourcePos},
    bytecode::op::Opcode,
    exception::CompileError,
};

use super::{CResult, Compiler, Ctx};

impl Compiler<'_> {
    pub(crate) fn compile_assign(&mut self, lhs: &Node, rhs: &Node, pos: SourcePos, ctx: Ctx) -> CResult {
        match lhs {
            Node::Unary { op, operand: Some(target), pos } if op == "my" || op == "our" || op == "local" => {
                self.compile_declaration(op, target, Some(rhs), *pos, ctx)
            }
            Node::Unary { op, operand: Some(inner), pos } if op == "$" => match inner.as_ref() {
                Node::Identifier { name, .. } => self.compile_scalar_var_assign(name, rhs, *pos),
                // `${expr} = rhs` / `$$ref = rhs`: the name/ref expression
                // is evaluated first so the rhs cannot clobber it
                expr => {
                    let rs = self.compile_expr(expr, Ctx::Scalar)?;
                    let rt = self.scopes.alloc_temp();
                    let deref = if self.pragma.strict_refs {
                        Opcode::DerefScalar
                    } else {
                        Opcode::DerefScalarSym
                    };
                    self.builder.emit2(deref, i32::from(rt), i32::from(rs));
                    let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                    self.builder.emit2(Opcode::ScalarAssign, i32::from(rt), i32::from(rr));
                    Ok(rt)
                }
            },
            Node::Unary { op, operand: Some(_), .. } if op == "@" => {
                let rarr = self.compile_array_base(lhs)?;
                let rlist = self.compile_to_list(rhs)?;
                self.builder
                    .emit2(Opcode::ArraySetFromList, i32::from(rarr), i32::from(rlist));
                self.list_assign_result(rlist, ctx)
            }
            Node::Unary { op, operand: Some(_), .. } if op == "%" => {
                let rhash = self.compile_hash_base(lhs)?;
                let rlist = self.compile_to_list(rhs)?;
                self.builder
                    .emit2(Opcode::HashSetFromList, i32::from(rhash), i32::from(rlist));
                self.list_assign_result(rlist, ctx)
            }
            Node::Unary { op, operand: Some(inner), pos } if op == "*" => {
                let Node::Identifier { name, .. } = inner.as_ref() else {
                    return Err(self.err("Can't assign through a computed glob", *pos));
                };
                let qualified = self.qualified(name);
                let idx = self.builder.intern(&qualified);
                let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                self.builder.emit2(Opcode::GlobAssign, idx, i32::from(rr));
                Ok(rr)
            }
            Node::Unary { op, operand: Some(inner), .. } if op == "pos" => {
                let rv = self.compile_scalar_lvalue(inner)?;
                let rproxy = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::PosOp, i32::from(rproxy), i32::from(rv));
                let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                self.builder
                    .emit2(Opcode::ScalarAssign, i32::from(rproxy), i32::from(rr));
                Ok(rproxy)
            }
            Node::Binary { op, .. } if op == "[" || op == "{" || op == "->[" || op == "->{" => {
                let rt = self.compile_scalar_lvalue(lhs)?;
                let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                self.builder.emit2(Opcode::ScalarAssign, i32::from(rt), i32::from(rr));
                Ok(rt)
            }
            Node::Binary { op, left, right, .. } if op == "@[" => {
                let rarr = self.compile_array_base(left)?;
                let rkeys = self.compile_to_list(right)?;
                let rvals = self.compile_to_list(rhs)?;
                self.builder.emit3(
                    Opcode::ArraySliceSet,
                    i32::from(rarr),
                    i32::from(rkeys),
                    i32::from(rvals),
                );
                self.list_assign_result(rvals, ctx)
            }
            Node::Binary { op, left, right, .. } if op == "@{" => {
                let rhash = self.compile_hash_base(left)?;
                let rkeys = self.compile_slice_keys(right)?;
                let rvals = self.compile_to_list(rhs)?;
                self.builder.emit3(
                    Opcode::HashSliceSet,
                    i32::from(rhash),
                    i32::from(rkeys),
                    i32::from(rvals),
                );
                self.list_assign_result(rvals, ctx)
            }
            Node::List { elements, .. } => self.compile_list_assign(elements, None, rhs, pos, ctx),
            Node::Ternary { .. } => {
                let rt = self.compile_scalar_lvalue(lhs)?;
                let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                self.builder.emit2(Opcode::ScalarAssign, i32::from(rt), i32::from(rr));
                Ok(rt)
            }
            // an lvalue sub call returns a write-through proxy
            Node::FunCall { callee, args, pos } => {
                let rt = self.compile_fun_call(callee, args, *pos, Ctx::Scalar)?;
                let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                self.builder.emit2(Opcode::ScalarAssign, i32::from(rt), i32::from(rr));
                Ok(rt)
            }
            other => Err(self.err(format!("Can't modify {other} in assignment"), pos)),
        }
    }

    /// `$x = rhs` for a plain named scalar, with the mandatory
    /// `$x = $x + expr` → add-assign specialization for uncaptured
    /// lexicals.
    fn compile_scalar_var_assign(&mut self, name: &str, rhs: &Node, pos: SourcePos) -> CResult {
        let key = format!("${name}");
        let lexical = self.scopes.lookup(&key);

        if let Some(slot) = &lexical {
            if slot.persistent.is_none() && !slot.global && !self.capture_slots.contains_key(&key) {
                if let Node::Binary { op, left, right, .. } = rhs {
                    if op == "+" && left.as_sigil_var("$") == Some(name) {
                        let re = self.compile_expr(right, Ctx::Scalar)?;
                        self.builder
                            .emit2(Opcode::AddAssign, i32::from(slot.reg), i32::from(re));
                        return Ok(slot.reg);
                    }
                }
            }
        }

        if let Some(slot) = lexical {
            let rr = self.compile_expr(rhs, Ctx::Scalar)?;
            self.builder
                .emit2(Opcode::ScalarAssign, i32::from(slot.reg), i32::from(rr));
            return Ok(slot.reg);
        }
        if let Some(&reg) = self.capture_slots.get(&key) {
            let rr = self.compile_expr(rhs, Ctx::Scalar)?;
            self.builder.emit2(Opcode::ScalarAssign, i32::from(reg), i32::from(rr));
            return Ok(reg);
        }

        // global: store, then reload so the expression's value is the
        // global's own cell (`($x = "a") =~ s///` must see the variable)
        if self.pragma.strict_vars && !name.contains("::") && !super::strict_exempt(name) {
            return Err(self.err(
                format!("Global symbol \"${name}\" requires explicit package name"),
                pos,
            ));
        }
        let qualified = self.qualified(name);
        let idx = self.builder.intern(&qualified);
        let rr = self.compile_expr(rhs, Ctx::Scalar)?;
        self.builder.emit2(Opcode::StoreGlobalScalar, idx, i32::from(rr));
        let rd = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::LoadGlobalScalar, i32::from(rd), idx);
        Ok(rd)
    }

    /// The value of an aggregate/list assignment: the RHS list itself in
    /// list context, its element count in scalar context.
    fn list_assign_result(&mut self, rlist: u16, ctx: Ctx) -> CResult {
        if ctx == Ctx::Scalar {
            let rd = self.scopes.alloc_temp();
            self.builder.emit2(Opcode::ListCount, i32::from(rd), i32::from(rlist));
            Ok(rd)
        } else {
            Ok(rlist)
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// `my`/`our`/`local`, with or without an initialising rhs.
    pub(crate) fn compile_declaration(
        &mut self,
        kind: &str,
        target: &Node,
        rhs: Option<&Node>,
        pos: SourcePos,
        ctx: Ctx,
    ) -> CResult {
        match kind {
            "my" => self.compile_my(target, rhs, pos, ctx),
            "our" => self.compile_our(target, rhs, pos, ctx),
            "local" => self.compile_local(target, rhs, pos, ctx),
            other => Err(self.err(format!("Unknown declaration \"{other}\""), pos)),
        }
    }

    fn compile_my(&mut self, target: &Node, rhs: Option<&Node>, pos: SourcePos, ctx: Ctx) -> CResult {
        match target {
            Node::Unary { op, operand: Some(inner), .. } if op == "$" => {
                let Node::Identifier { name, .. } = inner.as_ref() else {
                    return Err(self.err("Malformed my declaration", pos));
                };
                let key = format!("${name}");
                let reg = if self.persistent_candidates.contains(&key) {
                    // captured by an inner named sub: the cell lives in the
                    // persistent table and writes go through it
                    let id = self.next_begin_id();
                    let reg = self.scopes.declare_persistent(&key, id);
                    let idx = self.builder.intern(&key);
                    self.builder.emit3(
                        Opcode::RetrievePersistentScalar,
                        i32::from(reg),
                        i32::try_from(id).expect("begin-id fits i32"),
                        idx,
                    );
                    reg
                } else {
                    let reg = self.scopes.declare(&key);
                    self.builder.emit1(Opcode::LoadUndef, i32::from(reg));
                    reg
                };
                if let Some(rhs) = rhs {
                    let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                    self.builder.emit2(Opcode::ScalarAssign, i32::from(reg), i32::from(rr));
                }
                Ok(reg)
            }
            Node::Unary { op, operand: Some(inner), .. } if op == "@" || op == "%" => {
                let Node::Identifier { name, .. } = inner.as_ref() else {
                    return Err(self.err("Malformed my declaration", pos));
                };
                let key = format!("{op}{name}");
                let is_array = op == "@";
                let reg = if self.persistent_candidates.contains(&key) {
                    let id = self.next_begin_id();
                    let reg = self.scopes.declare_persistent(&key, id);
                    let idx = self.builder.intern(&key);
                    let opcode = if is_array {
                        Opcode::RetrievePersistentArray
                    } else {
                        Opcode::RetrievePersistentHash
                    };
                    self.builder.emit3(
                        opcode,
                        i32::from(reg),
                        i32::try_from(id).expect("begin-id fits i32"),
                        idx,
                    );
                    reg
                } else {
                    let reg = self.scopes.declare(&key);
                    let opcode = if is_array { Opcode::CreateArray } else { Opcode::CreateHash };
                    self.builder.emit1(opcode, i32::from(reg));
                    reg
                };
                match rhs {
                    Some(rhs) => {
                        let rlist = self.compile_to_list(rhs)?;
                        let opcode = if is_array {
                            Opcode::ArraySetFromList
                        } else {
                            Opcode::HashSetFromList
                        };
                        self.builder.emit2(opcode, i32::from(reg), i32::from(rlist));
                        if ctx == Ctx::Scalar {
                            return self.list_assign_result(rlist, ctx);
                        }
                        Ok(reg)
                    }
                    None => Ok(reg),
                }
            }
            Node::List { elements, .. } => match rhs {
                Some(rhs) => self.compile_list_assign(elements, Some("my"), rhs, pos, ctx),
                None => {
                    for element in elements {
                        self.compile_my(element, None, pos, Ctx::Void)?;
                    }
                    self.undef_result()
                }
            },
            other => Err(self.err(format!("Can't declare {other} in \"my\""), pos)),
        }
    }

    fn compile_our(&mut self, target: &Node, rhs: Option<&Node>, pos: SourcePos, ctx: Ctx) -> CResult {
        match target {
            Node::Unary { op, operand: Some(inner), .. } if op == "$" || op == "@" || op == "%" => {
                let Node::Identifier { name, .. } = inner.as_ref() else {
                    return Err(self.err("Malformed our declaration", pos));
                };
                let key = format!("{op}{name}");
                let qualified = self.qualified(name);
                let idx = self.builder.intern(&qualified);
                let reg = self.scopes.declare_global_alias(&key);
                let load = match op.as_str() {
                    "$" => Opcode::LoadGlobalScalar,
                    "@" => Opcode::LoadGlobalArray,
                    _ => Opcode::LoadGlobalHash,
                };
                self.builder.emit2(load, i32::from(reg), idx);
                if let Some(rhs) = rhs {
                    match op.as_str() {
                        "$" => {
                            let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                            self.builder.emit2(Opcode::ScalarAssign, i32::from(reg), i32::from(rr));
                        }
                        "@" => {
                            let rlist = self.compile_to_list(rhs)?;
                            self.builder
                                .emit2(Opcode::ArraySetFromList, i32::from(reg), i32::from(rlist));
                            if ctx == Ctx::Scalar {
                                return self.list_assign_result(rlist, ctx);
                            }
                        }
                        _ => {
                            let rlist = self.compile_to_list(rhs)?;
                            self.builder
                                .emit2(Opcode::HashSetFromList, i32::from(reg), i32::from(rlist));
                            if ctx == Ctx::Scalar {
                                return self.list_assign_result(rlist, ctx);
                            }
                        }
                    }
                }
                Ok(reg)
            }
            Node::List { elements, .. } => match rhs {
                Some(rhs) => self.compile_list_assign(elements, Some("our"), rhs, pos, ctx),
                None => {
                    for element in elements {
                        self.compile_our(element, None, pos, Ctx::Void)?;
                    }
                    self.undef_result()
                }
            },
            other => Err(self.err(format!("Can't declare {other} in \"our\""), pos)),
        }
    }

    fn compile_local(&mut self, target: &Node, rhs: Option<&Node>, pos: SourcePos, _ctx: Ctx) -> CResult {
        match target {
            Node::Unary { op, operand: Some(inner), .. } if op == "$" => {
                let Node::Identifier { name, .. } = inner.as_ref() else {
                    // `local ${expr}` and friends
                    return Err(self.err("Can't localize through a reference", pos));
                };
                let key = format!("${name}");
                let reg = match self.scopes.lookup(&key) {
                    Some(slot) if !slot.global => {
                        return Err(self.err(format!("Can't localize lexical variable ${name}"), pos));
                    }
                    Some(slot) => slot.reg,
                    None => self.load_global_scalar(name, pos)?,
                };
                self.builder.emit1(Opcode::PushLocalScalar, i32::from(reg));
                if let Some(rhs) = rhs {
                    let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                    self.builder.emit2(Opcode::ScalarAssign, i32::from(reg), i32::from(rr));
                }
                Ok(reg)
            }
            Node::Unary { op, operand: Some(inner), .. } if op == "@" || op == "%" => {
                let Node::Identifier { name, .. } = inner.as_ref() else {
                    return Err(self.err("Can't localize through a reference", pos));
                };
                let key = format!("{op}{name}");
                let is_array = op == "@";
                let reg = match self.scopes.lookup(&key) {
                    Some(slot) if !slot.global => {
                        return Err(self.err(format!("Can't localize lexical variable {op}{name}"), pos));
                    }
                    Some(slot) => slot.reg,
                    None => {
                        if is_array {
                            self.resolve_array_var(name, pos)?
                        } else {
                            self.resolve_hash_var(name, pos)?
                        }
                    }
                };
                let push = if is_array { Opcode::PushLocalArray } else { Opcode::PushLocalHash };
                self.builder.emit1(push, i32::from(reg));
                if let Some(rhs) = rhs {
                    let rlist = self.compile_to_list(rhs)?;
                    let set = if is_array {
                        Opcode::ArraySetFromList
                    } else {
                        Opcode::HashSetFromList
                    };
                    self.builder.emit2(set, i32::from(reg), i32::from(rlist));
                }
                Ok(reg)
            }
            // `local $h{key} = rhs`: resolve the element lvalue first
            // (autovivifying), then save that slot's payload
            Node::Binary { op, .. } if op == "{" || op == "[" || op == "->{" || op == "->[" => {
                let cell = self.compile_scalar_lvalue(target)?;
                self.builder.emit1(Opcode::PushLocalScalar, i32::from(cell));
                if let Some(rhs) = rhs {
                    let rr = self.compile_expr(rhs, Ctx::Scalar)?;
                    self.builder.emit2(Opcode::ScalarAssign, i32::from(cell), i32::from(rr));
                }
                Ok(cell)
            }
            Node::List { elements, .. } => {
                let mut last = None;
                for element in elements {
                    last = Some(self.compile_local(element, None, pos, Ctx::Void)?);
                }
                match (last, rhs) {
                    (_, Some(rhs)) => {
                        let lvalues: Vec<Node> = elements.clone();
                        self.compile_list_assign(&lvalues, Some("local-assigned"), rhs, pos, Ctx::List)
                    }
                    (Some(reg), None) => Ok(reg),
                    (None, None) => self.undef_result(),
                }
            }
            other => Err(self.err(format!("Can't localize {other}"), pos)),
        }
    }

    // ------------------------------------------------------------------
    // List-to-list assignment
    // ------------------------------------------------------------------

    /// `(lhs1, …, @rest) = rhs`, optionally declaring each lvalue.
    ///
    /// The rhs is compiled to a list exactly once; positional lvalues take
    /// `list[i]`, a slurpy `@rest`/`%rest` takes `list[i..]` and ends the
    /// positional walk. Lvalues are validated up front so mixed
    /// assignable/non-assignable shapes fail at compile time.
    pub(crate) fn compile_list_assign(
        &mut self,
        lvalues: &[Node],
        declare: Option<&str>,
        rhs: &Node,
        pos: SourcePos,
        ctx: Ctx,
    ) -> CResult {
        for lv in lvalues {
            let assignable = match lv {
                Node::Unary { op, .. } => {
                    matches!(op.as_str(), "$" | "@" | "%" | "my" | "our" | "local" | "undef")
                }
                Node::Binary { op, .. } => matches!(op.as_str(), "[" | "{" | "->[" | "->{"),
                _ => false,
            };
            if !assignable && declare.is_none() {
                return Err(self.err(format!("Can't modify {lv} in list assignment"), pos));
            }
        }

        // snapshot the RHS before touching any lvalue so `($a, $b) =
        // ($b, $a)` reads both sources first
        let rsource = self.compile_to_list(rhs)?;
        let rlist = self.scopes.alloc_temp();
        self.builder
            .emit2(Opcode::ListSnapshot, i32::from(rlist), i32::from(rsource));
        let mut slurped = false;
        for (i, lv) in lvalues.iter().enumerate() {
            let index = i32::try_from(i).expect("lvalue count fits i32");
            if slurped {
                // anything after a slurpy aggregate receives nothing
                self.assign_empty(lv, declare, pos)?;
                continue;
            }
            let is_slurpy = matches!(
                lv,
                Node::Unary { op, .. } if op == "@" || op == "%"
            ) || (declare.is_some()
                && matches!(lv, Node::Unary { op, operand: Some(inner), .. }
                    if (op == "my" || op == "our") && matches!(inner.as_ref(), Node::Unary { op: sig, .. } if sig == "@" || sig == "%")));
            if is_slurpy {
                let ri = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadInt, i32::from(ri), index);
                let rtail = self.scopes.alloc_temp();
                self.builder.emit3(
                    Opcode::ListSliceFrom,
                    i32::from(rtail),
                    i32::from(rlist),
                    i32::from(ri),
                );
                self.assign_aggregate_from_list(lv, rtail, declare, pos)?;
                slurped = true;
                continue;
            }
            let ri = self.scopes.alloc_temp();
            self.builder.emit2(Opcode::LoadInt, i32::from(ri), index);
            let rtmp = self.scopes.alloc_temp();
            self.builder
                .emit3(Opcode::ListGet, i32::from(rtmp), i32::from(rlist), i32::from(ri));
            let cell = self.resolve_positional_lvalue(lv, declare, pos)?;
            self.builder.emit2(Opcode::ScalarAssign, i32::from(cell), i32::from(rtmp));
        }
        self.list_assign_result(rlist, ctx)
    }

    /// A positional (scalar) lvalue in a list assignment.
    fn resolve_positional_lvalue(&mut self, lv: &Node, declare: Option<&str>, pos: SourcePos) -> CResult {
        match (declare, lv) {
            (Some(kind), Node::Unary { op, .. }) if op == "$" && (kind == "my" || kind == "our") => {
                self.compile_declaration(kind, lv, None, pos, Ctx::Scalar)
            }
            // `my ($a, my $b)` style nesting or pre-declared locals
            (_, Node::Unary { op, operand: Some(inner), pos: dpos })
                if op == "my" || op == "our" || op == "local" =>
            {
                let (op, inner, dpos) = (op.clone(), inner.as_ref().clone(), *dpos);
                self.compile_declaration(&op, &inner, None, dpos, Ctx::Scalar)
            }
            (Some("local-assigned"), _) => self.compile_scalar_lvalue(lv),
            (_, other) => self.compile_scalar_lvalue(other),
        }
    }

    /// A slurpy `@rest`/`%rest` in a list assignment.
    fn assign_aggregate_from_list(
        &mut self,
        lv: &Node,
        rtail: u16,
        declare: Option<&str>,
        pos: SourcePos,
    ) -> Result<(), CompileError> {
        let (sigil_node, kind) = match lv {
            Node::Unary { op, operand: Some(inner), .. } if op == "my" || op == "our" => {
                (inner.as_ref(), Some(op.clone()))
            }
            other => (other, declare.map(str::to_owned).filter(|d| d == "my" || d == "our")),
        };
        let reg = match (&kind, sigil_node) {
            (Some(k), node) => self.compile_declaration(k, node, None, pos, Ctx::List)?,
            (None, Node::Unary { op, .. }) if op == "@" => self.compile_array_base(sigil_node)?,
            (None, _) => self.compile_hash_base(sigil_node)?,
        };
        let set = match sigil_node {
            Node::Unary { op, .. } if op == "@" => Opcode::ArraySetFromList,
            _ => Opcode::HashSetFromList,
        };
        self.builder.emit2(set, i32::from(reg), i32::from(rtail));
        Ok(())
    }

    /// Lvalues after a slurpy: scalars become undef, aggregates empty.
    fn assign_empty(&mut self, lv: &Node, declare: Option<&str>, pos: SourcePos) -> Result<(), CompileError> {
        let target = match lv {
            Node::Unary { op, operand: Some(inner), .. } if op == "my" || op == "our" => {
                let (op, inner) = (op.clone(), inner.as_ref().clone());
                self.compile_declaration(&op, &inner, None, pos, Ctx::Void)?;
                return Ok(());
            }
            other => other,
        };
        if matches!(target, Node::Unary { op, .. } if op == "$") {
            let cell = self.compile_scalar_lvalue(target)?;
            let rundef = self.scopes.alloc_temp();
            self.builder.emit1(Opcode::LoadUndef, i32::from(rundef));
            self.builder
                .emit2(Opcode::ScalarAssign, i32::from(cell), i32::from(rundef));
        } else if declare.is_none() {
            let rempty = self.scopes.alloc_temp();
            self.builder.emit1(Opcode::CreateList, i32::from(rempty));
            self.assign_aggregate_from_list(target, rempty, None, pos)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Compound assignment
    // ------------------------------------------------------------------

    pub(crate) fn compile_compound_assign(&mut self, op: &str, left: &Node, right: &Node, pos: SourcePos) -> CResult {
        let rv = self.compile_scalar_lvalue(left)?;
        match op {
            "||=" | "&&=" | "//=" => {
                let jump = match op {
                    "||=" => Opcode::JumpIfTrue,
                    "&&=" => Opcode::JumpIfFalse,
                    _ => Opcode::JumpIfDefined,
                };
                let skip = self.builder.emit_jump(jump, &[i32::from(rv)]);
                let rr = self.compile_expr(right, Ctx::Scalar)?;
                self.builder.emit2(Opcode::ScalarAssign, i32::from(rv), i32::from(rr));
                self.builder.patch_jump(skip);
                Ok(rv)
            }
            "+=" | "-=" | "*=" | "/=" | ".=" => {
                let rr = self.compile_expr(right, Ctx::Scalar)?;
                let opcode = match op {
                    "+=" => Opcode::AddAssign,
                    "-=" => Opcode::SubAssign,
                    "*=" => Opcode::MulAssign,
                    "/=" => Opcode::DivAssign,
                    _ => Opcode::ConcatAssign,
                };
                self.builder.emit2(opcode, i32::from(rv), i32::from(rr));
                Ok(rv)
            }
            "x=" | "**=" | "%=" => {
                let rr = self.compile_expr(right, Ctx::Scalar)?;
                let opcode = match op {
                    "x=" => Opcode::Repeat,
                    "**=" => Opcode::Pow,
                    _ => Opcode::Mod,
                };
                let rtmp = self.scopes.alloc_temp();
                self.builder
                    .emit3(opcode, i32::from(rtmp), i32::from(rv), i32::from(rr));
                self.builder.emit2(Opcode::ScalarAssign, i32::from(rv), i32::from(rtmp));
                Ok(rv)
            }
            other => Err(self.err(format!("Unsupported assignment operator \"{other}\""), pos)),
        }
    }
}
