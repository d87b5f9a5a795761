//! Control flow: conditionals, the three loop forms, labelled blocks,
//! `last`/`next`/`redo`/`goto`, short-circuit operators, and `eval` blocks.
//!
//! Every loop brackets its body with a dynamic-stack watermark
//! (`SaveLocalLevel`/`PopToLocalLevel`) and registers a `LoopEntry` so the
//! interpreter can consume control-flow markers returned by calls made
//! inside the body.

use crate::{
    ast::{Node, SourcePos},
    bytecode::{builder::JumpLabel, code::LoopEntry, op::Opcode},
    exception::CompileError,
};

use super::{Compiler, Ctx, LoopFrame};

impl Compiler<'_> {
    pub(crate) fn compile_if(&mut self, node: &Node) -> Result<(), CompileError> {
        let Node::If {
            cond,
            then_block,
            else_branch,
            ..
        } = node
        else {
            unreachable!("compile_if requires an If node");
        };
        let rcond = self.compile_expr(cond, Ctx::Scalar)?;
        let to_else = self.builder.emit_jump(Opcode::JumpIfFalse, &[i32::from(rcond)]);
        self.compile_expr(then_block, Ctx::Void)?;
        match else_branch {
            Some(branch) => {
                let to_end = self.builder.emit_jump(Opcode::Jump, &[]);
                self.builder.patch_jump(to_else);
                self.compile_expr(branch, Ctx::Void)?;
                self.builder.patch_jump(to_end);
            }
            None => self.builder.patch_jump(to_else),
        }
        Ok(())
    }

    pub(crate) fn compile_while(&mut self, node: &Node) -> Result<(), CompileError> {
        let Node::While {
            cond,
            body,
            label,
            is_until,
            ..
        } = node
        else {
            unreachable!("compile_while requires a While node");
        };
        self.scopes.push();
        let rlvl = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::SaveLocalLevel, i32::from(rlvl));

        let start = self.builder.current_pc();
        let rcond = self.compile_expr(cond, Ctx::Scalar)?;
        let exit_op = if *is_until { Opcode::JumpIfTrue } else { Opcode::JumpIfFalse };
        let to_exit = self.builder.emit_jump(exit_op, &[i32::from(rcond)]);

        let body_start = self.builder.current_pc();
        self.loops.push(LoopFrame {
            label: label.clone(),
            next_pc: Some(start),
            next_patches: Vec::new(),
            redo_pc: body_start,
            last_patches: Vec::new(),
            level_reg: rlvl,
            eval_depth: self.eval_depth,
            body_start,
        });
        self.compile_expr(body, Ctx::Void)?;
        self.builder.emit_jump_to(Opcode::Jump, &[], start);

        let frame = self.loops.pop().expect("loop frame was pushed above");
        self.finish_loop(frame, to_exit, start);
        self.scopes.pop();
        Ok(())
    }

    pub(crate) fn compile_for_c(&mut self, node: &Node) -> Result<(), CompileError> {
        let Node::ForC {
            init,
            cond,
            step,
            body,
            label,
            ..
        } = node
        else {
            unreachable!("compile_for_c requires a ForC node");
        };
        self.scopes.push();
        let rlvl = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::SaveLocalLevel, i32::from(rlvl));

        if let Some(init) = init {
            self.compile_expr(init, Ctx::Void)?;
        }
        let start = self.builder.current_pc();
        let to_exit = match cond {
            Some(cond) => {
                let rcond = self.compile_expr(cond, Ctx::Scalar)?;
                Some(self.builder.emit_jump(Opcode::JumpIfFalse, &[i32::from(rcond)]))
            }
            None => None,
        };

        let body_start = self.builder.current_pc();
        self.loops.push(LoopFrame {
            label: label.clone(),
            next_pc: None, // the step comes after the body
            next_patches: Vec::new(),
            redo_pc: body_start,
            last_patches: Vec::new(),
            level_reg: rlvl,
            eval_depth: self.eval_depth,
            body_start,
        });
        self.compile_expr(body, Ctx::Void)?;

        let step_pc = self.builder.current_pc();
        if let Some(step) = step {
            self.compile_expr(step, Ctx::Void)?;
        }
        self.builder.emit_jump_to(Opcode::Jump, &[], start);

        let mut frame = self.loops.pop().expect("loop frame was pushed above");
        for patch in frame.next_patches.drain(..) {
            self.builder.patch_jump_to(patch, step_pc);
        }
        frame.next_pc = Some(step_pc);
        match to_exit {
            Some(jump) => self.finish_loop(frame, jump, step_pc),
            None => {
                // infinite loop: only `last` exits
                let last_pc = self.builder.current_pc();
                self.finish_loop_at(frame, last_pc, step_pc);
            }
        }
        self.scopes.pop();
        Ok(())
    }

    pub(crate) fn compile_foreach(&mut self, node: &Node) -> Result<(), CompileError> {
        let Node::Foreach {
            var,
            list,
            body,
            label,
            pos,
        } = node
        else {
            unreachable!("compile_foreach requires a Foreach node");
        };
        self.scopes.push();

        // materialise the source once; single expressions (ranges, arrays)
        // keep their lazy/aliased element behaviour through the iterator
        let rsrc = match list.as_ref() {
            Node::List { .. } => self.compile_to_list(list)?,
            other => self.compile_expr(other, Ctx::List)?,
        };
        let rit = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::IterCreate, i32::from(rit), i32::from(rsrc));
        let rlvl = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::SaveLocalLevel, i32::from(rlvl));

        // loop-variable binding strategy
        enum Binding {
            /// Rebind a lexical register each step.
            Lexical { rvar: u16, rsaved: Option<u16> },
            /// Alias a global's scalar slot each step, restoring after.
            Global { name_idx: i32, relem: u16, rorig: u16 },
        }
        let binding = match var.as_deref() {
            Some(Node::Unary { op, operand: Some(inner), .. }) if op == "my" => {
                let Node::Unary { op: sig, operand: Some(name_node), .. } = inner.as_ref() else {
                    return Err(self.err("Malformed foreach variable", *pos));
                };
                let Node::Identifier { name, .. } = name_node.as_ref() else {
                    return Err(self.err("Malformed foreach variable", *pos));
                };
                if sig != "$" {
                    return Err(self.err("foreach loop variable must be a scalar", *pos));
                }
                let rvar = self.scopes.declare(&format!("${name}"));
                Binding::Lexical { rvar, rsaved: None }
            }
            Some(Node::Unary { op, operand: Some(inner), .. }) if op == "$" => {
                if let Node::Identifier { name, .. } = inner.as_ref() {
                    let key = format!("${name}");
                    if let Some(slot) = self.scopes.lookup(&key) {
                        // an existing lexical is rebound for the loop and
                        // restored afterwards
                        let rsaved = self.scopes.alloc_temp();
                        self.builder
                            .emit2(Opcode::Move, i32::from(rsaved), i32::from(slot.reg));
                        Binding::Lexical {
                            rvar: slot.reg,
                            rsaved: Some(rsaved),
                        }
                    } else {
                        let qualified = self.qualified(name);
                        let name_idx = self.builder.intern(&qualified);
                        let relem = self.scopes.alloc_temp();
                        let rorig = self.scopes.alloc_temp();
                        self.builder.emit2(Opcode::LoadGlobalScalar, i32::from(rorig), name_idx);
                        Binding::Global { name_idx, relem, rorig }
                    }
                } else {
                    return Err(self.err("Malformed foreach variable", *pos));
                }
            }
            None => {
                let name_idx = self.builder.intern("main::_");
                let relem = self.scopes.alloc_temp();
                let rorig = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::LoadGlobalScalar, i32::from(rorig), name_idx);
                Binding::Global { name_idx, relem, rorig }
            }
            Some(other) => return Err(self.err(format!("Can't use {other} as a foreach variable"), *pos)),
        };

        let start = self.builder.current_pc();
        let (to_exit, body_start) = match &binding {
            Binding::Lexical { rvar, .. } => {
                let jump = self
                    .builder
                    .emit_jump(Opcode::IterNextOrJump, &[i32::from(*rvar), i32::from(rit)]);
                (jump, self.builder.current_pc())
            }
            Binding::Global { name_idx, relem, .. } => {
                let jump = self
                    .builder
                    .emit_jump(Opcode::IterNextOrJump, &[i32::from(*relem), i32::from(rit)]);
                let rdummy = self.scopes.alloc_temp();
                self.builder.emit3(
                    Opcode::GlobalScalarSwap,
                    i32::from(rdummy),
                    *name_idx,
                    i32::from(*relem),
                );
                (jump, self.builder.current_pc())
            }
        };

        self.loops.push(LoopFrame {
            label: label.clone(),
            next_pc: Some(start),
            next_patches: Vec::new(),
            redo_pc: body_start,
            last_patches: Vec::new(),
            level_reg: rlvl,
            eval_depth: self.eval_depth,
            body_start,
        });
        self.compile_expr(body, Ctx::Void)?;
        self.builder.emit_jump_to(Opcode::Jump, &[], start);

        let frame = self.loops.pop().expect("loop frame was pushed above");
        let last_pc = self.builder.current_pc();
        self.builder.patch_jump_to(to_exit, last_pc);
        for patch in frame.last_patches {
            self.builder.patch_jump_to(patch, last_pc);
        }
        self.builder.emit1(Opcode::PopToLocalLevel, i32::from(rlvl));
        match binding {
            Binding::Lexical { rvar, rsaved: Some(rsaved) } => {
                self.builder.emit2(Opcode::Move, i32::from(rvar), i32::from(rsaved));
            }
            Binding::Lexical { .. } => {}
            Binding::Global { name_idx, rorig, .. } => {
                let rdummy = self.scopes.alloc_temp();
                self.builder
                    .emit3(Opcode::GlobalScalarSwap, i32::from(rdummy), name_idx, i32::from(rorig));
            }
        }
        self.builder.add_loop_entry(LoopEntry {
            redo_pc: u32::try_from(frame.redo_pc).expect("pc fits u32"),
            next_pc: u32::try_from(start).expect("pc fits u32"),
            last_pc: u32::try_from(last_pc).expect("pc fits u32"),
            body_start: u32::try_from(frame.body_start).expect("pc fits u32"),
            body_end: u32::try_from(last_pc).expect("pc fits u32"),
            label: frame.label.map(Into::into),
            level_reg: rlvl,
        });
        self.scopes.pop();
        Ok(())
    }

    /// A labelled bare block is a loop that runs once.
    pub(crate) fn compile_labelled_block(&mut self, node: &Node) -> Result<(), CompileError> {
        let Node::LabelledBlock { label, body, .. } = node else {
            unreachable!("compile_labelled_block requires a LabelledBlock node");
        };
        self.scopes.push();
        let rlvl = self.scopes.alloc_temp();
        self.builder.emit1(Opcode::SaveLocalLevel, i32::from(rlvl));
        let body_start = self.builder.current_pc();
        self.loops.push(LoopFrame {
            label: Some(label.clone()),
            next_pc: None, // `next` exits a bare block
            next_patches: Vec::new(),
            redo_pc: body_start,
            last_patches: Vec::new(),
            level_reg: rlvl,
            eval_depth: self.eval_depth,
            body_start,
        });
        self.compile_expr(body, Ctx::Void)?;
        let mut frame = self.loops.pop().expect("loop frame was pushed above");
        let last_pc = self.builder.current_pc();
        for patch in frame.last_patches.drain(..).chain(frame.next_patches.drain(..)) {
            self.builder.patch_jump_to(patch, last_pc);
        }
        self.builder.emit1(Opcode::PopToLocalLevel, i32::from(rlvl));
        self.builder.add_loop_entry(LoopEntry {
            redo_pc: u32::try_from(frame.redo_pc).expect("pc fits u32"),
            next_pc: u32::try_from(last_pc).expect("pc fits u32"),
            last_pc: u32::try_from(last_pc).expect("pc fits u32"),
            body_start: u32::try_from(frame.body_start).expect("pc fits u32"),
            body_end: u32::try_from(last_pc).expect("pc fits u32"),
            label: frame.label.map(Into::into),
            level_reg: rlvl,
        });
        self.scopes.pop();
        Ok(())
    }

    /// Shared loop epilogue: patch exits, pop locals, record the entry.
    fn finish_loop(&mut self, frame: LoopFrame, to_exit: JumpLabel, next_pc: usize) {
        let last_pc = self.builder.current_pc();
        self.builder.patch_jump_to(to_exit, last_pc);
        self.finish_loop_at(frame, last_pc, next_pc);
    }

    fn finish_loop_at(&mut self, frame: LoopFrame, last_pc: usize, next_pc: usize) {
        for patch in frame.last_patches {
            self.builder.patch_jump_to(patch, last_pc);
        }
        self.builder.emit1(Opcode::PopToLocalLevel, i32::from(frame.level_reg));
        self.builder.add_loop_entry(LoopEntry {
            redo_pc: u32::try_from(frame.redo_pc).expect("pc fits u32"),
            next_pc: u32::try_from(next_pc).expect("pc fits u32"),
            last_pc: u32::try_from(last_pc).expect("pc fits u32"),
            body_start: u32::try_from(frame.body_start).expect("pc fits u32"),
            body_end: u32::try_from(last_pc).expect("pc fits u32"),
            label: frame.label.map(Into::into),
            level_reg: frame.level_reg,
        });
    }

    // ------------------------------------------------------------------
    // last / next / redo / goto
    // ------------------------------------------------------------------

    /// Emits a statically resolved loop transfer, or a marker return when
    /// the target loop is not in this compilation unit.
    pub(crate) fn compile_loop_control(&mut self, kind: &str, label: Option<&str>, pos: SourcePos) -> Result<(), CompileError> {
        let found = self
            .loops
            .iter()
            .rposition(|frame| label.is_none() || frame.label.as_deref() == label);
        match found {
            Some(idx) => {
                let level_reg = self.loops[idx].level_reg;
                let frame_eval_depth = self.loops[idx].eval_depth;
                let redo_pc = self.loops[idx].redo_pc;
                let next_pc = self.loops[idx].next_pc;
                // leaving an eval block by jumping past its EvalEnd would
                // leak the handler entry
                for _ in frame_eval_depth..self.eval_depth {
                    self.builder.emit(Opcode::EvalEnd);
                }
                self.builder.emit1(Opcode::PopToLocalLevel, i32::from(level_reg));
                match kind {
                    "redo" => self.builder.emit_jump_to(Opcode::Jump, &[], redo_pc),
                    "next" => match next_pc {
                        Some(target) => self.builder.emit_jump_to(Opcode::Jump, &[], target),
                        None => {
                            let patch = self.builder.emit_jump(Opcode::Jump, &[]);
                            self.loops[idx].next_patches.push(patch);
                        }
                    },
                    _ => {
                        let patch = self.builder.emit_jump(Opcode::Jump, &[]);
                        self.loops[idx].last_patches.push(patch);
                    }
                }
                Ok(())
            }
            None => {
                // no enclosing loop here: build a marker and let it
                // propagate through returns until a loop consumes it
                let _ = pos;
                let make = match kind {
                    "last" => Opcode::MakeLast,
                    "next" => Opcode::MakeNext,
                    _ => Opcode::MakeRedo,
                };
                let label_idx = match label {
                    Some(text) => self.builder.intern(text),
                    None => -1,
                };
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(make, i32::from(rd), label_idx);
                self.builder.emit1(Opcode::Return, i32::from(rd));
                Ok(())
            }
        }
    }

    pub(crate) fn compile_goto(&mut self, label: &str, pos: SourcePos) -> Result<(), CompileError> {
        let found = self
            .loops
            .iter()
            .rposition(|frame| frame.label.as_deref() == Some(label));
        match found {
            // goto to an enclosing loop label restarts that loop's step
            Some(_) => self.compile_loop_control("next", Some(label), pos),
            None => {
                let label_idx = self.builder.intern(label);
                let rd = self.scopes.alloc_temp();
                self.builder.emit2(Opcode::MakeGoto, i32::from(rd), label_idx);
                self.builder.emit1(Opcode::Return, i32::from(rd));
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Short-circuit and eval
    // ------------------------------------------------------------------

    /// `&&` / `||` / `//`: evaluate the left side into the result
    /// register, jump past the right side when the short circuit fires,
    /// otherwise evaluate the right side into the *same* register.
    pub(crate) fn compile_short_circuit(&mut self, left: &Node, right: &Node, jump: Opcode) -> Result<u16, CompileError> {
        let rl = self.compile_expr(left, Ctx::Scalar)?;
        let rd = self.scopes.alloc_temp();
        self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(rl));
        let skip = self.builder.emit_jump(jump, &[i32::from(rd)]);
        let rr = self.compile_expr(right, Ctx::Scalar)?;
        self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(rr));
        self.builder.patch_jump(skip);
        Ok(rd)
    }

    /// `eval { ... }`: handler registration, body, normal-path `EvalEnd`,
    /// and the catch entry that the runtime jumps to.
    pub(crate) fn compile_eval_block(&mut self, body: &Node, ctx: Ctx) -> Result<u16, CompileError> {
        self.eval_depth += 1;
        let to_catch = self.builder.emit_jump(Opcode::EvalTry, &[]);
        let rd = self.scopes.alloc_temp();
        let body_ctx = if ctx == Ctx::Void { Ctx::Scalar } else { ctx };
        let rres = self.compile_expr(body, body_ctx)?;
        self.builder.emit2(Opcode::Move, i32::from(rd), i32::from(rres));
        self.builder.emit(Opcode::EvalEnd);
        let to_end = self.builder.emit_jump(Opcode::Jump, &[]);
        self.builder.patch_jump(to_catch);
        self.builder.emit1(Opcode::EvalCatch, i32::from(rd));
        self.builder.patch_jump(to_end);
        self.eval_depth -= 1;
        Ok(rd)
    }
}
