//! Builder for emitting bytecode during compilation.
//!
//! `CodeBuilder` appends instruction words, handles forward jumps with
//! patching, interns strings and constants, and tracks source lines for
//! diagnostics. Jump operands are signed absolute PCs, so patching writes
//! the target directly instead of computing relative offsets.

use std::rc::Rc;

use crate::{
    ast::PragmaSnapshot,
    bytecode::{
        code::{CodeUnit, Constant, LineEntry, LoopEntry, StringPool},
        op::Opcode,
    },
};

/// Builder for one `CodeUnit`'s instruction stream and pools.
///
/// # Usage
///
/// ```ignore
/// let mut builder = CodeBuilder::new();
/// builder.set_line(3);
/// builder.emit2(Opcode::LoadInt, 4, 42);
/// let jump = builder.emit_jump(Opcode::JumpIfFalse, &[4]);
/// // ... emit more code ...
/// builder.patch_jump(jump);
/// let unit = builder.build(num_registers, ...);
/// ```
#[derive(Debug, Default)]
pub struct CodeBuilder {
    /// The word stream being built.
    words: Vec<i32>,

    /// Constants collected during compilation.
    constants: Vec<Constant>,

    /// Interned strings.
    strings: StringPool,

    /// Sorted pc → line entries.
    lines: Vec<LineEntry>,

    /// Current source line (set before emitting instructions).
    current_line: u32,

    /// Loop descriptors accumulated as loops finish compiling.
    loop_table: Vec<LoopEntry>,
}

/// Label for a forward jump that needs patching: the index of the
/// placeholder target word.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source line recorded for subsequent instructions.
    pub fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    /// Current instruction offset; the next emitted opcode lands here.
    #[must_use]
    pub fn current_pc(&self) -> usize {
        self.words.len()
    }

    fn start_instruction(&mut self) {
        let pc = u32::try_from(self.words.len()).expect("bytecode length exceeds u32");
        match self.lines.last() {
            Some(last) if last.line == self.current_line => {}
            _ => self.lines.push(LineEntry {
                pc,
                line: self.current_line,
            }),
        }
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        debug_assert_eq!(op.operand_count(), 0, "{op:?} takes operands");
        self.start_instruction();
        self.words.push(i32::from(op as u16));
    }

    /// Emits an instruction with explicit operand words.
    ///
    /// # Panics
    ///
    /// Debug-asserts that the operand count matches the catalog; a mismatch
    /// is a compiler bug.
    pub fn emit_with(&mut self, op: Opcode, operands: &[i32]) {
        debug_assert_eq!(op.operand_count(), operands.len(), "{op:?} operand mismatch");
        self.start_instruction();
        self.words.push(i32::from(op as u16));
        self.words.extend_from_slice(operands);
    }

    pub fn emit1(&mut self, op: Opcode, a: i32) {
        self.emit_with(op, &[a]);
    }

    pub fn emit2(&mut self, op: Opcode, a: i32, b: i32) {
        self.emit_with(op, &[a, b]);
    }

    pub fn emit3(&mut self, op: Opcode, a: i32, b: i32, c: i32) {
        self.emit_with(op, &[a, b, c]);
    }

    pub fn emit4(&mut self, op: Opcode, a: i32, b: i32, c: i32, d: i32) {
        self.emit_with(op, &[a, b, c, d]);
    }

    pub fn emit5(&mut self, op: Opcode, a: i32, b: i32, c: i32, d: i32, e: i32) {
        self.emit_with(op, &[a, b, c, d, e]);
    }

    /// Emits a jump-family instruction whose *last* operand is the target,
    /// with `pre` carrying the operands before it. Returns a label to patch
    /// once the target is known.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode, pre: &[i32]) -> JumpLabel {
        debug_assert_eq!(op.operand_count(), pre.len() + 1, "{op:?} operand mismatch");
        self.start_instruction();
        self.words.push(i32::from(op as u16));
        self.words.extend_from_slice(pre);
        let label = JumpLabel(self.words.len());
        self.words.push(0); // placeholder target
        label
    }

    /// Patches a forward jump to land at the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.current_pc();
        self.patch_jump_to(label, target);
    }

    /// Patches a jump to an explicit target.
    pub fn patch_jump_to(&mut self, label: JumpLabel, target: usize) {
        self.words[label.0] = i32::try_from(target).expect("jump target exceeds i32");
    }

    /// Emits a jump to a known (usually backward) target.
    pub fn emit_jump_to(&mut self, op: Opcode, pre: &[i32], target: usize) {
        let label = self.emit_jump(op, pre);
        self.patch_jump_to(label, target);
    }

    /// Adds a constant to the pool, returning its index.
    ///
    /// # Panics
    ///
    /// Panics if the pool exceeds `i32` indexing; that is a compile-time
    /// "function too large" condition, not silent truncation.
    pub fn add_const(&mut self, value: Constant) -> i32 {
        let idx = self.constants.len();
        self.constants.push(value);
        i32::try_from(idx).expect("constant pool exceeds i32 range")
    }

    /// Interns a string, returning its pool index as an operand word.
    pub fn intern(&mut self, value: &str) -> i32 {
        i32::try_from(self.strings.intern(value)).expect("string pool exceeds i32 range")
    }

    /// Records a finished loop's descriptor.
    pub fn add_loop_entry(&mut self, entry: LoopEntry) {
        self.loop_table.push(entry);
    }

    /// Builds the final `CodeUnit`.
    #[must_use]
    pub fn build(
        self,
        max_registers: u16,
        capture_names: Vec<Rc<str>>,
        source_name: Rc<str>,
        pragma: PragmaSnapshot,
        name: Option<Rc<str>>,
    ) -> CodeUnit {
        CodeUnit {
            instructions: self.words,
            constants: self.constants,
            strings: self.strings.into_vec(),
            max_registers,
            capture_names,
            source_name,
            lines: self.lines,
            loop_table: self.loop_table,
            pragma,
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn build(builder: CodeBuilder) -> CodeUnit {
        builder.build(8, Vec::new(), Rc::from("t.pl"), PragmaSnapshot::default(), None)
    }

    #[test]
    fn emit_basic() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::Nop);
        builder.emit1(Opcode::LoadUndef, 3);

        let unit = build(builder);
        assert_eq!(
            unit.instructions,
            vec![Opcode::Nop as i32, Opcode::LoadUndef as i32, 3]
        );
    }

    #[test]
    fn forward_jump_patches_to_absolute_pc() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(Opcode::Jump, &[]);
        builder.emit1(Opcode::LoadUndef, 3); // skipped
        builder.patch_jump(jump);
        builder.emit1(Opcode::Return, 3);

        let unit = build(builder);
        assert_eq!(
            unit.instructions,
            vec![
                Opcode::Jump as i32,
                4, // absolute target: the Return opcode's pc
                Opcode::LoadUndef as i32,
                3,
                Opcode::Return as i32,
                3,
            ]
        );
    }

    #[test]
    fn conditional_jump_keeps_pre_operands() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(Opcode::JumpIfFalse, &[5]);
        builder.emit(Opcode::Nop);
        builder.patch_jump(jump);

        let unit = build(builder);
        assert_eq!(unit.instructions, vec![Opcode::JumpIfFalse as i32, 5, 4, Opcode::Nop as i32]);
    }

    #[test]
    fn backward_jump_needs_no_patching() {
        let mut builder = CodeBuilder::new();
        let loop_start = builder.current_pc();
        builder.emit(Opcode::Nop);
        builder.emit_jump_to(Opcode::Jump, &[], loop_start);

        let unit = build(builder);
        assert_eq!(unit.instructions, vec![Opcode::Nop as i32, Opcode::Jump as i32, 0]);
    }

    #[test]
    fn add_const_and_intern() {
        let mut builder = CodeBuilder::new();
        let c0 = builder.add_const(Constant::Int(42));
        let c1 = builder.add_const(Constant::Undef);
        let s0 = builder.intern("x");
        let s0_again = builder.intern("x");

        assert_eq!(c0, 0);
        assert_eq!(c1, 1);
        assert_eq!(s0, 0);
        assert_eq!(s0_again, 0);
    }

    #[test]
    fn line_table_records_transitions_only() {
        let mut builder = CodeBuilder::new();
        builder.set_line(1);
        builder.emit(Opcode::Nop);
        builder.emit(Opcode::Nop);
        builder.set_line(2);
        builder.emit(Opcode::Nop);

        let unit = build(builder);
        assert_eq!(unit.lines.len(), 2);
        assert_eq!(unit.line_for_pc(1), 1);
        assert_eq!(unit.line_for_pc(2), 2);
    }
}
