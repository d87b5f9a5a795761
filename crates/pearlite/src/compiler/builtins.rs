//! Named unary/list operators: `defined`, `keys`, `push`, `print`,
//! `join`, `sort`, the regex forms, and friends.
//!
//! These all arrive as [`Node::Unary`] with a keyword operator and
//! (usually) a [`Node::List`] operand, and lower to delegate opcodes.

use crate::{
    ast::{Node, SourcePos},
    bytecode::op::Opcode,
    exception::CompileError,
};

use super::{CResult, Compiler, Ctx};

impl Compiler<'_> {
    #[expect(clippy::too_many_lines, reason = "the named-operator table is one exhaustive match")]
    pub(crate) fn compile_named_unary(
        &mut self,
        op: &str,
        operand: Option<&Node>,
        pos: SourcePos,
        ctx: Ctx,
    ) -> CResult {
        match op {
            "defined" => {
                let rs = match operand {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => self.topic_var()?,
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DefinedTest, i32::from(rd), i32::from(rs));
                Ok(rd)
            }
            "undef" => match operand {
                Some(node) => {
                    let rv = match node {
                        Node::Unary { op, .. } if op == "@" || op == "%" => self.compile_expr(node, Ctx::List)?,
                        lv => self.compile_scalar_lvalue(lv)?,
                    };
                    self.builder.emit1(Opcode::UndefOp, i32::from(rv));
                    Ok(rv)
                }
                None => self.undef_result(),
            },
            "scalar" => {
                let node = self.expect_operand(operand, op, pos)?;
                match node {
                    Node::Unary { op: sig, operand: Some(inner), pos } if sig == "@" => {
                        if let Node::Identifier { name, .. } = inner.as_ref() {
                            let rarr = self.resolve_array_var(name, *pos)?;
                            let rd = self.scopes.alloc_temp();
                            self.builder.emit2(Opcode::ArraySize, i32::from(rd), i32::from(rarr));
                            return Ok(rd);
                        }
                        self.compile_expr(node, Ctx::Scalar)
                    }
                    Node::Unary { op: sig, operand: Some(inner), pos } if sig == "%" => {
                        if let Node::Identifier { name, .. } = inner.as_ref() {
                            let rhash = self.resolve_hash_var(name, *pos)?;
                            let rd = self.scopes.alloc_temp();
                            self.builder.emit2(Opcode::HashCount, i32::from(rd), i32::from(rhash));
                            return Ok(rd);
                        }
                        self.compile_expr(node, Ctx::Scalar)
                    }
                    other => self.compile_expr(other, Ctx::Scalar),
                }
            }
            "wantarray" => {
                let rd = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::Wantarray, i32::from(rd));
                Ok(rd)
            }
            "keys" | "values" | "each" => {
                let node = self.expect_operand(operand, op, pos)?;
                let rhash = self.compile_hash_base(node)?;
                let opcode = match op {
                    "keys" => Opcode::HashKeys,
                    "values" => Opcode::HashValues,
                    _ => Opcode::HashEach,
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(opcode, i32::from(rd), i32::from(rhash));
                Ok(rd)
            }
            "shift" | "pop" => {
                let rarr = match operand {
                    Some(node) => self.compile_array_base(node)?,
                    None => 1, // defaults to @_
                };
                let opcode = if op == "shift" { Opcode::ArrayShift } else { Opcode::ArrayPop };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(opcode, i32::from(rd), i32::from(rarr));
                Ok(rd)
            }
            "push" | "unshift" => {
                let node = self.expect_operand(operand, op, pos)?;
                let Node::List { elements, .. } = node else {
                    return Err(self.err(format!("{op} needs an array and a list"), pos));
                };
                let (target, values) = elements
                    .split_first()
                    .ok_or_else(|| self.err(format!("{op} needs an array and a list"), pos))?;
                let rarr = self.compile_array_base(target)?;
                let rlist = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                for value in values {
                    self.push_onto_list(rlist, value)?;
                }
                let opcode = if op == "push" { Opcode::ArrayPush } else { Opcode::ArrayUnshift };
                self.builder.emit2(opcode, i32::from(rarr), i32::from(rlist));
                // push/unshift return the new element count
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::ArraySize, i32::from(rd), i32::from(rarr));
                Ok(rd)
            }
            "exists" => {
                let node = self.expect_operand(operand, op, pos)?;
                match node {
                    Node::Binary { op: bop, left, right, .. } if bop == "{" => {
                        let rhash = self.compile_hash_base(left)?;
                        let rkey = self.compile_hash_key(right)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder
                            .emit3(Opcode::HashExists, i32::from(rd), i32::from(rhash), i32::from(rkey));
                        Ok(rd)
                    }
                    Node::Binary { op: bop, left, right, .. } if bop == "->{" => {
                        let rref = self.compile_expr(left, Ctx::Scalar)?;
                        let rhash = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::DerefHash, i32::from(rhash), i32::from(rref));
                        let rkey = self.compile_hash_key(right)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder
                            .emit3(Opcode::HashExists, i32::from(rd), i32::from(rhash), i32::from(rkey));
                        Ok(rd)
                    }
                    other => Err(self.err(format!("exists argument is not a HASH element: {other}"), pos)),
                }
            }
            "delete" => {
                let node = self.expect_operand(operand, op, pos)?;
                match node {
                    Node::Binary { op: bop, left, right, .. } if bop == "{" => {
                        let rhash = self.compile_hash_base(left)?;
                        let rkey = self.compile_hash_key(right)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder
                            .emit3(Opcode::HashDelete, i32::from(rd), i32::from(rhash), i32::from(rkey));
                        Ok(rd)
                    }
                    Node::Binary { op: bop, left, right, .. } if bop == "->{" => {
                        let rref = self.compile_expr(left, Ctx::Scalar)?;
                        let rhash = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::DerefHash, i32::from(rhash), i32::from(rref));
                        let rkey = self.compile_hash_key(right)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder
                            .emit3(Opcode::HashDelete, i32::from(rd), i32::from(rhash), i32::from(rkey));
                        Ok(rd)
                    }
                    Node::Binary { op: bop, left, right, .. } if bop == "@{" => {
                        let rhash = self.compile_hash_base(left)?;
                        let rkeys = self.compile_to_list(right)?;
                        let rd = self.scopes.alloc_temp();
                        self.builder
                            .emit3(Opcode::HashSliceDelete, i32::from(rd), i32::from(rhash), i32::from(rkeys));
                        Ok(rd)
                    }
                    other => Err(self.err(format!("delete argument is not a HASH element or slice: {other}"), pos)),
                }
            }
            "ref" => {
                let rs = match operand {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => self.topic_var()?,
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::RefType, i32::from(rd), i32::from(rs));
                Ok(rd)
            }
            "length" | "int" | "abs" | "sqrt" | "chr" | "ord" | "lc" | "uc" => {
                let rs = match operand {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => self.topic_var()?,
                };
                let opcode = match op {
                    "length" => Opcode::StrLength,
                    "int" => Opcode::IntOp,
                    "abs" => Opcode::AbsOp,
                    "sqrt" => Opcode::SqrtOp,
                    "chr" => Opcode::ChrOp,
                    "ord" => Opcode::OrdOp,
                    "lc" => Opcode::LcOp,
                    _ => Opcode::UcOp,
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(opcode, i32::from(rd), i32::from(rs));
                Ok(rd)
            }
            "chomp" | "chop" => {
                let rv = match operand {
                    Some(node) => self.compile_scalar_lvalue(node)?,
                    None => self.topic_var()?,
                };
                let opcode = if op == "chomp" { Opcode::Chomp } else { Opcode::Chop };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(opcode, i32::from(rd), i32::from(rv));
                Ok(rd)
            }
            "die" | "warn" => {
                let rlist = match operand {
                    Some(node) => self.compile_to_list(node)?,
                    None => {
                        let rlist = self.scopes.alloc_temp();
                        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                        rlist
                    }
                };
                let opcode = if op == "die" { Opcode::Die } else { Opcode::Warn };
                self.builder.emit1(opcode, i32::from(rlist));
                self.undef_result()
            }
            "return" => {
                match operand {
                    Some(node) => {
                        let rv = self.compile_expr(node, Ctx::Inherit)?;
                        self.builder.emit1(Opcode::Return, i32::from(rv));
                    }
                    None => self.builder.emit(Opcode::ReturnEmpty),
                }
                self.undef_result()
            }
            "last" | "next" | "redo" => {
                let label = match operand {
                    Some(Node::Identifier { name, .. }) => Some(name.clone()),
                    _ => None,
                };
                self.compile_loop_control(op, label.as_deref(), pos)?;
                self.undef_result()
            }
            "goto" => {
                let label = match operand {
                    Some(Node::Identifier { name, .. }) => name.clone(),
                    _ => return Err(self.err("goto must have a label", pos)),
                };
                self.compile_goto(&label, pos)?;
                self.undef_result()
            }
            "print" | "say" => {
                let (rhandle, rlist) = self.compile_output_args(operand)?;
                let opcode = if op == "print" { Opcode::Print } else { Opcode::Say };
                self.builder.emit2(opcode, i32::from(rhandle), i32::from(rlist));
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadInt, i32::from(rd), 1);
                Ok(rd)
            }
            "readline" => {
                let node = self.expect_operand(operand, op, pos)?;
                let rh = self.compile_handle_expr(node)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Readline, i32::from(rd), i32::from(rh), ctx.operand());
                Ok(rd)
            }
            "open" => self.compile_open(operand, pos),
            "close" => {
                let node = self.expect_operand(operand, op, pos)?;
                let rh = self.compile_handle_expr(node)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::CloseHandle, i32::from(rd), i32::from(rh));
                Ok(rd)
            }
            "join" => {
                let node = self.expect_operand(operand, op, pos)?;
                let Node::List { elements, .. } = node else {
                    return Err(self.err("join needs a separator and a list", pos));
                };
                let (sep, rest) = elements
                    .split_first()
                    .ok_or_else(|| self.err("join needs a separator and a list", pos))?;
                let rsep = self.compile_expr(sep, Ctx::Scalar)?;
                let rlist = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                for value in rest {
                    self.push_onto_list(rlist, value)?;
                }
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Join, i32::from(rd), i32::from(rsep), i32::from(rlist));
                Ok(rd)
            }
            "sprintf" => {
                let node = self.expect_operand(operand, op, pos)?;
                let Node::List { elements, .. } = node else {
                    return Err(self.err("sprintf needs a format and a list", pos));
                };
                let (fmt, rest) = elements
                    .split_first()
                    .ok_or_else(|| self.err("sprintf needs a format and a list", pos))?;
                let rfmt = self.compile_expr(fmt, Ctx::Scalar)?;
                let rlist = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                for value in rest {
                    self.push_onto_list(rlist, value)?;
                }
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Sprintf, i32::from(rd), i32::from(rfmt), i32::from(rlist));
                Ok(rd)
            }
            "sort" => {
                let node = self.expect_operand(operand, op, pos)?;
                let elements: Vec<&Node> = match node {
                    Node::List { elements, .. } => elements.iter().collect(),
                    other => vec![other],
                };
                let (rcmp, values) = match elements.split_first() {
                    Some((Node::SubDef { name: None, .. }, rest)) => {
                        let rcmp = self.compile_sub_def(elements[0], Ctx::Scalar)?;
                        (rcmp, rest.to_vec())
                    }
                    _ => {
                        let rcmp = self.scopes.alloc_temp();
                        self.builder.emit1(Opcode::LoadUndef, i32::from(rcmp));
                        (rcmp, elements)
                    }
                };
                let rlist = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                for value in values {
                    self.push_onto_list(rlist, value)?;
                }
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::SortList, i32::from(rd), i32::from(rcmp), i32::from(rlist));
                Ok(rd)
            }
            "reverse" => {
                let rlist = match operand {
                    Some(node) => self.compile_to_list(node)?,
                    None => {
                        let rlist = self.scopes.alloc_temp();
                        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
                        rlist
                    }
                };
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Reverse, i32::from(rd), i32::from(rlist), ctx.operand());
                Ok(rd)
            }
            "split" => {
                let node = self.expect_operand(operand, op, pos)?;
                let elements: Vec<&Node> = match node {
                    Node::List { elements, .. } => elements.iter().collect(),
                    other => vec![other],
                };
                let rpat = match elements.first() {
                    Some(Node::Unary { op: rop, operand, .. }) if rop == "m" || rop == "qr" => {
                        self.compile_regex_operand_as_qr(operand.as_deref(), pos)?
                    }
                    Some(other) => self.compile_expr(other, Ctx::Scalar)?,
                    None => return Err(self.err("split needs a pattern", pos)),
                };
                let rtarget = match elements.get(1) {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => self.topic_var()?,
                };
                let rlimit = match elements.get(2) {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => {
                        let r = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadInt, i32::from(r), 0);
                        r
                    }
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit4(
                    Opcode::RegexSplit,
                    i32::from(rd),
                    i32::from(rpat),
                    i32::from(rtarget),
                    i32::from(rlimit),
                );
                Ok(rd)
            }
            "bless" => {
                let node = self.expect_operand(operand, op, pos)?;
                let elements: Vec<&Node> = match node {
                    Node::List { elements, .. } => elements.iter().collect(),
                    other => vec![other],
                };
                let rref = match elements.first() {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => return Err(self.err("bless needs a reference", pos)),
                };
                let rpkg = match elements.get(1) {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => {
                        // one-arg bless defaults to the compile package
                        let idx = self.builder.intern(&self.pragma.compile_package);
                        let r = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadStr, i32::from(r), idx);
                        r
                    }
                };
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Bless, i32::from(rd), i32::from(rref), i32::from(rpkg));
                Ok(rd)
            }
            "caller" => {
                let rlevel = match operand {
                    Some(node) => self.compile_expr(node, Ctx::Scalar)?,
                    None => {
                        let r = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadInt, i32::from(r), 0);
                        r
                    }
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::Caller, i32::from(rd), i32::from(rlevel));
                Ok(rd)
            }
            "pos" => {
                let node = self.expect_operand(operand, op, pos)?;
                let rv = self.compile_scalar_lvalue(node)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::PosOp, i32::from(rd), i32::from(rv));
                Ok(rd)
            }
            "eval-string" => {
                let node = self.expect_operand(operand, op, pos)?;
                let rs = self.compile_expr(node, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::EvalString, i32::from(rd), i32::from(rs), ctx.operand());
                Ok(rd)
            }
            other => Err(self.err(format!("Unsupported operator \"{other}\""), pos)),
        }
    }

    fn expect_operand<'n>(
        &self,
        operand: Option<&'n Node>,
        op: &str,
        pos: SourcePos,
    ) -> Result<&'n Node, CompileError> {
        operand.ok_or_else(|| self.err(format!("Missing operand for {op}"), pos))
    }

    /// `$_`'s cell.
    pub(crate) fn topic_var(&mut self) -> CResult {
        let idx = self.builder.intern("main::_");
        let rd = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::LoadGlobalScalar, i32::from(rd), idx);
        Ok(rd)
    }

    /// Splits `print FH LIST` shapes into handle and argument registers.
    fn compile_output_args(&mut self, operand: Option<&Node>) -> Result<(u16, u16), CompileError> {
        let elements: Vec<&Node> = match operand {
            Some(Node::List { elements, .. }) => elements.iter().collect(),
            Some(other) => vec![other],
            None => Vec::new(),
        };
        let (rhandle, args) = match elements.split_first() {
            Some((Node::Unary { op, .. }, rest)) if op == "*" => {
                let rh = self.compile_expr(elements[0], Ctx::Scalar)?;
                (rh, rest.to_vec())
            }
            Some((Node::Identifier { name, .. }, rest)) if name == "STDOUT" || name == "STDERR" => {
                let qualified = format!("main::{name}");
                let idx = self.builder.intern(&qualified);
                let rh = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadGlobalGlob, i32::from(rh), idx);
                (rh, rest.to_vec())
            }
            _ => {
                let rh = self.scopes.alloc_temp();
                self.builder.emit1(Opcode::LoadUndef, i32::from(rh));
                (rh, elements)
            }
        };
        let rlist = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
        if args.is_empty() {
            // bare print defaults to $_
            let topic = self.topic_var()?;
            self.builder.emit2(Opcode::ListPush, i32::from(rlist), i32::from(topic));
        }
        for value in args {
            self.push_onto_list(rlist, value)?;
        }
        Ok((rhandle, rlist))
    }

    /// A handle expression: bareword handle, glob, or scalar holding a
    /// glob reference.
    fn compile_handle_expr(&mut self, node: &Node) -> CResult {
        match node {
            Node::Identifier { name, .. } => {
                let qualified = format!("main::{name}");
                let idx = self.builder.intern(&qualified);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadGlobalGlob, i32::from(rd), idx);
                Ok(rd)
            }
            other => self.compile_expr(other, Ctx::Scalar),
        }
    }

    fn compile_open(&mut self, operand: Option<&Node>, pos: SourcePos) -> CResult {
        let node = self.expect_operand(operand, "open", pos)?;
        let Node::List { elements, .. } = node else {
            return Err(self.err("open needs a filehandle, mode, and path", pos));
        };
        if elements.len() != 3 {
            return Err(self.err("only 3-argument open is supported", pos));
        }
        let rfh = match &elements[0] {
            Node::Identifier { name, .. } => {
                let qualified = format!("main::{name}");
                let idx = self.builder.intern(&qualified);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadGlobalGlob, i32::from(rd), idx);
                rd
            }
            lv => self.compile_scalar_lvalue(lv)?,
        };
        let rargs = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::CreateList, i32::from(rargs));
        for node in &elements[1..] {
            let rv = self.compile_expr(node, Ctx::Scalar)?;
            self.builder.emit2(Opcode::ListPush, i32::from(rargs), i32::from(rv));
        }
        let rd = self.scopes.alloc_temp();
        self.builder
            .emit3(Opcode::OpenHandle, i32::from(rd), i32::from(rfh), i32::from(rargs));
        Ok(rd)
    }

    // ------------------------------------------------------------------
    // Regex forms
    // ------------------------------------------------------------------

    /// Pulls `(pattern, replacement?, flags)` out of an `m`/`s`/`qr`
    /// operand list. Flags must be a string literal.
    fn regex_parts<'n>(
        &self,
        kind: &str,
        operand: Option<&'n Node>,
        pos: SourcePos,
    ) -> Result<(&'n Node, Option<&'n Node>, String), CompileError> {
        let node = self.expect_operand(operand, kind, pos)?;
        let Node::List { elements, .. } = node else {
            return Err(self.err(format!("Malformed {kind}// operand"), pos));
        };
        let wants_replacement = kind == "s";
        let expected = if wants_replacement { 3 } else { 2 };
        if elements.len() != expected {
            return Err(self.err(format!("Malformed {kind}// operand"), pos));
        }
        let flags = match elements.last() {
            Some(Node::StringLit { value, .. }) => value.clone(),
            _ => return Err(self.err(format!("{kind}// flags must be a string literal"), pos)),
        };
        let replacement = if wants_replacement { Some(&elements[1]) } else { None };
        Ok((&elements[0], replacement, flags))
    }

    /// Standalone `m//`, `s///`, `qr//` - the first two bind `$_`.
    pub(crate) fn compile_regex_op(
        &mut self,
        kind: &str,
        operand: Option<&Node>,
        target: Option<u16>,
        pos: SourcePos,
        ctx: Ctx,
    ) -> CResult {
        if kind == "qr" {
            let (pattern, _, flags) = self.regex_parts(kind, operand, pos)?;
            let rpat = self.compile_expr(pattern, Ctx::Scalar)?;
            let flags_idx = self.builder.intern(&flags);
            let rd = self.scopes.alloc_temp();
            self.builder.emit3(Opcode::RegexQr, i32::from(rd), i32::from(rpat), flags_idx);
            return Ok(rd);
        }
        let rtarget = match target {
            Some(reg) => reg,
            None => self.topic_var()?,
        };
        self.compile_regex_against(kind, operand, rtarget, pos, ctx)
    }

    /// `target =~ m//` / `target =~ s///` with the target already resolved.
    pub(crate) fn compile_regex_against(
        &mut self,
        kind: &str,
        operand: Option<&Node>,
        rtarget: u16,
        pos: SourcePos,
        ctx: Ctx,
    ) -> CResult {
        if kind == "qr" {
            // binding against a qr is just a match with it
            let rpat = self.compile_regex_op("qr", operand, None, pos, Ctx::Scalar)?;
            let flags_idx = self.builder.intern("");
            let rd = self.scopes.alloc_temp();
            self.builder.emit5(
                Opcode::RegexMatch,
                i32::from(rd),
                i32::from(rtarget),
                i32::from(rpat),
                flags_idx,
                ctx.operand(),
            );
            return Ok(rd);
        }
        let (pattern, replacement, flags) = self.regex_parts(kind, operand, pos)?;
        let rpat = self.compile_expr(pattern, Ctx::Scalar)?;
        let flags_idx = self.builder.intern(&flags);
        let rd = self.scopes.alloc_temp();
        match replacement {
            None => {
                self.builder.emit5(
                    Opcode::RegexMatch,
                    i32::from(rd),
                    i32::from(rtarget),
                    i32::from(rpat),
                    flags_idx,
                    ctx.operand(),
                );
            }
            Some(repl) => {
                let rrepl = self.compile_expr(repl, Ctx::Scalar)?;
                self.builder.emit5(
                    Opcode::RegexReplace,
                    i32::from(rd),
                    i32::from(rtarget),
                    i32::from(rpat),
                    i32::from(rrepl),
                    flags_idx,
                );
            }
        }
        Ok(rd)
    }

    /// `split /pat/` patterns compile to a qr scalar so split sees the
    /// compiled form rather than a bool match.
    fn compile_regex_operand_as_qr(&mut self, operand: Option<&Node>, pos: SourcePos) -> CResult {
        let (pattern, _, flags) = self.regex_parts("m", operand, pos)?;
        let rpat = self.compile_expr(pattern, Ctx::Scalar)?;
        let flags_idx = self.builder.intern(&flags);
        let rd = self.scopes.alloc_temp();
        self.builder.emit3(Opcode::RegexQr, i32::from(rd), i32::from(rpat), flags_idx);
        Ok(rd)
    }
}
