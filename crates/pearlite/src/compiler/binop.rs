//! Binary-operator dispatch and scalar-lvalue resolution.

use crate::{
    ast::{Node, SourcePos},
    bytecode::op::Opcode,
    exception::CompileError,
};

use super::{CResult, Compiler, Ctx};

/// Binary operators that compile to a single three-register opcode.
fn simple_binop(op: &str) -> Option<Opcode> {
    Some(match op {
        "+" => Opcode::Add,
        "-" => Opcode::Sub,
        "*" => Opcode::Mul,
        "/" => Opcode::Div,
        "%" => Opcode::Mod,
        "**" => Opcode::Pow,
        "." => Opcode::Concat,
        "==" => Opcode::NumEq,
        "!=" => Opcode::NumNe,
        "<" => Opcode::NumLt,
        ">" => Opcode::NumGt,
        "<=" => Opcode::NumLe,
        ">=" => Opcode::NumGe,
        "<=>" => Opcode::NumCmp,
        "eq" => Opcode::StrEq,
        "ne" => Opcode::StrNe,
        "lt" => Opcode::StrLt,
        "gt" => Opcode::StrGt,
        "le" => Opcode::StrLe,
        "ge" => Opcode::StrGe,
        "cmp" => Opcode::StrCmp,
        "&" => Opcode::BitAnd,
        "|" => Opcode::BitOr,
        "^" => Opcode::BitXor,
        "<<" => Opcode::Shl,
        ">>" => Opcode::Shr,
        "&." => Opcode::BitAndStr,
        "|." => Opcode::BitOrStr,
        "^." => Opcode::BitXorStr,
        _ => return None,
    })
}

impl Compiler<'_> {
    pub(crate) fn compile_binary(
        &mut self,
        op: &str,
        left: &Node,
        right: &Node,
        pos: SourcePos,
        ctx: Ctx,
    ) -> CResult {
        if let Some(opcode) = simple_binop(op) {
            let ra = self.compile_expr(left, Ctx::Scalar)?;
            let rb = self.compile_expr(right, Ctx::Scalar)?;
            let rd = self.scopes.alloc_temp();
            self.builder
                .emit3(opcode, i32::from(rd), i32::from(ra), i32::from(rb));
            return Ok(rd);
        }
        match op {
            "=" => self.compile_assign(left, right, pos, ctx),
            "+=" | "-=" | "*=" | "/=" | ".=" | "x=" | "**=" | "%=" | "||=" | "&&=" | "//=" => {
                self.compile_compound_assign(op, left, right, pos)
            }
            "x" => {
                let ra = if matches!(left, Node::List { .. }) {
                    self.compile_to_list(left)?
                } else {
                    self.compile_expr(left, Ctx::Scalar)?
                };
                let rb = self.compile_expr(right, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Repeat, i32::from(rd), i32::from(ra), i32::from(rb));
                Ok(rd)
            }
            "&&" | "and" => self.compile_short_circuit(left, right, Opcode::JumpIfFalse),
            "||" | "or" => self.compile_short_circuit(left, right, Opcode::JumpIfTrue),
            "//" => self.compile_short_circuit(left, right, Opcode::JumpIfDefined),
            "=~" => self.compile_bind(left, right, pos, ctx, false),
            "!~" => self.compile_bind(left, right, pos, ctx, true),
            // the `$obj isa Class` infix operator
            "isa" => {
                let robj = self.compile_expr(left, Ctx::Scalar)?;
                let rclass = match right {
                    Node::Identifier { name, .. } => {
                        let idx = self.builder.intern(name);
                        let rd = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadStr, i32::from(rd), idx);
                        rd
                    }
                    expr => self.compile_expr(expr, Ctx::Scalar)?,
                };
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::Isa, i32::from(rd), i32::from(robj), i32::from(rclass));
                Ok(rd)
            }
            ".." => {
                if ctx == Ctx::Scalar {
                    return Err(self.err("Range in scalar context is not supported", pos));
                }
                let ra = self.compile_expr(left, Ctx::Scalar)?;
                let rb = self.compile_expr(right, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::NewRange, i32::from(rd), i32::from(ra), i32::from(rb));
                Ok(rd)
            }
            "[" => {
                let rarr = self.compile_array_base(left)?;
                let ridx = self.compile_expr(right, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::ArrayGet, i32::from(rd), i32::from(rarr), i32::from(ridx));
                Ok(rd)
            }
            "{" => {
                let rhash = self.compile_hash_base(left)?;
                let rkey = self.compile_hash_key(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::HashGet, i32::from(rd), i32::from(rhash), i32::from(rkey));
                Ok(rd)
            }
            "@[" => {
                let rarr = self.compile_array_base(left)?;
                let rkeys = self.compile_to_list(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::ArraySlice, i32::from(rd), i32::from(rarr), i32::from(rkeys));
                Ok(rd)
            }
            "@{" => {
                let rhash = self.compile_hash_base(left)?;
                let rkeys = self.compile_slice_keys(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::HashSlice, i32::from(rd), i32::from(rhash), i32::from(rkeys));
                Ok(rd)
            }
            "%{" => {
                let rhash = self.compile_hash_base(left)?;
                let rkeys = self.compile_slice_keys(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::HashKvSlice, i32::from(rd), i32::from(rhash), i32::from(rkeys));
                Ok(rd)
            }
            "->[" => {
                let rref = self.compile_expr(left, Ctx::Scalar)?;
                let rarr = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DerefArray, i32::from(rarr), i32::from(rref));
                let ridx = self.compile_expr(right, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::ArrayGet, i32::from(rd), i32::from(rarr), i32::from(ridx));
                Ok(rd)
            }
            "->{" => {
                let rref = self.compile_expr(left, Ctx::Scalar)?;
                let rhash = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DerefHash, i32::from(rhash), i32::from(rref));
                let rkey = self.compile_hash_key(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::HashGet, i32::from(rd), i32::from(rhash), i32::from(rkey));
                Ok(rd)
            }
            "->(" => {
                let rref = self.compile_expr(left, Ctx::Scalar)?;
                let rcode = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DerefCode, i32::from(rcode), i32::from(rref));
                let rargs = self.compile_to_list(right)?;
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
            "method" => self.compile_method_call(left, right, pos, ctx),
            "," => {
                // parsers normally produce List nodes; a raw comma pair
                // behaves the same way
                let elements = [left.clone(), right.clone()];
                self.compile_expr(
                    &Node::List {
                        elements: elements.to_vec(),
                        pos,
                    },
                    ctx,
                )
            }
            other => Err(self.err(format!("Unsupported operator \"{other}\""), pos)),
        }
    }

    /// Slice keys auto-quote barewords like hash keys do, element-wise.
    pub(crate) fn compile_slice_keys(&mut self, keys: &Node) -> CResult {
        let rlist = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::CreateList, i32::from(rlist));
        let elements: Vec<&Node> = match keys {
            Node::List { elements, .. } => elements.iter().collect(),
            other => vec![other],
        };
        for key in elements {
            let rk = self.compile_hash_key(key)?;
            self.builder.emit2(Opcode::ListPush, i32::from(rlist), i32::from(rk));
        }
        Ok(rlist)
    }

    /// `target =~ pattern-ish` and `!~`.
    fn compile_bind(&mut self, left: &Node, right: &Node, pos: SourcePos, ctx: Ctx, negate: bool) -> CResult {
        let rtarget = if self.is_lvalue_shape(left) {
            self.compile_scalar_lvalue(left)?
        } else {
            self.compile_expr(left, Ctx::Scalar)?
        };
        let rd = match right {
            Node::Unary { op, operand, .. } if op == "m" || op == "s" || op == "qr" => {
                self.compile_regex_against(op, operand.as_deref(), rtarget, pos, ctx)?
            }
            pattern => {
                let rpat = self.compile_expr(pattern, Ctx::Scalar)?;
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
                rd
            }
        };
        if negate {
            let rneg = self.scopes.alloc_temp();
            self.builder.emit2(Opcode::Not, i32::from(rneg), i32::from(rd));
            return Ok(rneg);
        }
        Ok(rd)
    }

    /// Can this node shape be a scalar lvalue?
    pub(crate) fn is_lvalue_shape(&self, node: &Node) -> bool {
        match node {
            Node::Unary { op, operand, .. } => match op.as_str() {
                "$" | "my" | "our" | "local" | "pos" => true,
                "@" | "%" => false,
                _ => operand.is_none() && false,
            },
            Node::Binary { op, .. } => matches!(op.as_str(), "[" | "{" | "->[" | "->{" | "="),
            Node::Ternary { then, otherwise, .. } => self.is_lvalue_shape(then) && self.is_lvalue_shape(otherwise),
            Node::FunCall { .. } => true,
            _ => false,
        }
    }

    /// Resolves a node to the register holding its scalar *cell*, so
    /// writes through it are visible at the variable.
    pub(crate) fn compile_scalar_lvalue(&mut self, node: &Node) -> CResult {
        self.at(node.pos());
        match node {
            Node::Unary { op, operand: Some(inner), pos } if op == "$" => match inner.as_ref() {
                Node::Identifier { name, .. } => self.resolve_scalar_var(name, *pos),
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
            },
            Node::Unary { op, operand: Some(inner), pos } if op == "my" || op == "our" || op == "local" => {
                self.compile_declaration(op, inner, None, *pos, Ctx::Scalar)
            }
            Node::Unary { op, operand: Some(inner), .. } if op == "pos" => {
                let rv = self.compile_scalar_lvalue(inner)?;
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::PosOp, i32::from(rd), i32::from(rv));
                Ok(rd)
            }
            Node::Binary { op, left, right, .. } if op == "[" => {
                let rarr = self.compile_array_base(left)?;
                let ridx = self.compile_expr(right, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::ArrayElemLv, i32::from(rd), i32::from(rarr), i32::from(ridx));
                Ok(rd)
            }
            Node::Binary { op, left, right, .. } if op == "{" => {
                let rhash = self.compile_hash_base(left)?;
                let rkey = self.compile_hash_key(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::HashElemLv, i32::from(rd), i32::from(rhash), i32::from(rkey));
                Ok(rd)
            }
            Node::Binary { op, left, right, .. } if op == "->[" => {
                let rref = self.compile_expr(left, Ctx::Scalar)?;
                let rarr = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DerefArray, i32::from(rarr), i32::from(rref));
                let ridx = self.compile_expr(right, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::ArrayElemLv, i32::from(rd), i32::from(rarr), i32::from(ridx));
                Ok(rd)
            }
            Node::Binary { op, left, right, .. } if op == "->{" => {
                let rref = self.compile_expr(left, Ctx::Scalar)?;
                let rhash = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::DerefHash, i32::from(rhash), i32::from(rref));
                let rkey = self.compile_hash_key(right)?;
                let rd = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::HashElemLv, i32::from(rd), i32::from(rhash), i32::from(rkey));
                Ok(rd)
            }
            Node::Binary { op, left, right, pos } if op == "=" => {
                // `($s = "ab") =~ s/a/A/` - the assignment's result is the
                // variable's own cell
                self.compile_assign(left, right, *pos, Ctx::Scalar)
            }
            Node::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => {
                let rcond = self.compile_expr(cond, Ctx::Scalar)?;
                let rd = self.scopes.alloc_temp();
                let to_else = self.builder.emit_jump(Opcode::JumpIfFalse, &[i32::from(rcond)]);
                let rthen = self.compile_scalar_lvalue(then)?;
                self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(rthen));
                let to_end = self.builder.emit_jump(Opcode::Jump, &[]);
                self.builder.patch_jump(to_else);
                let relse = self.compile_scalar_lvalue(otherwise)?;
                self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(relse));
                self.builder.patch_jump(to_end);
                Ok(rd)
            }
            // an lvalue sub call returns a write-through proxy scalar
            Node::FunCall { callee, args, pos } => self.compile_fun_call(callee, args, *pos, Ctx::Scalar),
            other => Err(CompileError::new(
                format!("Can't modify {other} in scalar assignment"),
                other.pos(),
            )),
        }
    }
}
