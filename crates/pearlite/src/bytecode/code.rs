//! The compiled-code artifact.
//!
//! A [`CodeUnit`] is the immutable contract between the compiler and the
//! interpreter: a dense word stream plus the pools and metadata needed to
//! execute it. Inner subroutines are nested `CodeUnit`s living in the
//! constant pool.

use std::{fmt::Write as _, rc::Rc};

use ahash::AHashMap;

use crate::{
    ast::PragmaSnapshot,
    bytecode::op::Opcode,
    value::RangeValue,
};

/// A constant-pool entry.
///
/// Constants are templates: the interpreter instantiates fresh runtime
/// values from them (`LoadConst`), except nested units which are shared.
#[derive(Debug, Clone)]
pub enum Constant {
    Undef,
    Int(i64),
    Num(f64),
    Str(Rc<str>),
    Range(Rc<RangeValue>),
    /// Literal list of scalar constants.
    List(Vec<Constant>),
    /// An inner subroutine.
    Unit(Rc<CodeUnit>),
}

/// One `pc → source line` mapping entry. Entries are sorted by `pc`;
/// a lookup takes the last entry at or before the queried pc.
#[derive(Debug, Clone, Copy)]
pub struct LineEntry {
    pub pc: u32,
    pub line: u32,
}

/// Static description of one loop, consulted when a call inside the loop
/// body returns a control-flow marker.
#[derive(Debug, Clone)]
pub struct LoopEntry {
    /// First pc of the loop body (the `redo` target).
    pub redo_pc: u32,
    /// Continue target (`next`).
    pub next_pc: u32,
    /// Exit target (`last`); also runs the loop's cleanup sequence.
    pub last_pc: u32,
    /// Pc range within which a returned marker is attributed to this loop.
    pub body_start: u32,
    pub body_end: u32,
    /// Loop label, if any.
    pub label: Option<Rc<str>>,
    /// Register holding the dynamic-stack watermark saved at loop entry.
    pub level_reg: u16,
}

impl LoopEntry {
    /// Does a marker with this label belong to this loop?
    /// Unlabelled markers match any loop.
    #[must_use]
    pub fn matches_label(&self, label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(wanted) => self.label.as_deref() == Some(wanted),
        }
    }
}

/// Immutable compiled unit: instruction words plus pools and metadata.
#[derive(Debug)]
pub struct CodeUnit {
    /// Dense instruction stream: opcode word, then its operand words.
    pub instructions: Vec<i32>,
    /// Constant pool (literals, ranges, inner units).
    pub constants: Vec<Constant>,
    /// Interned strings (names, literals, format strings).
    pub strings: Vec<Rc<str>>,
    /// Register-file size required to run this unit.
    pub max_registers: u16,
    /// Names of closure-captured slots, in slot order (slots `3..3+N`).
    pub capture_names: Vec<Rc<str>>,
    /// Source file name for diagnostics.
    pub source_name: Rc<str>,
    /// Sorted `pc → line` table.
    pub lines: Vec<LineEntry>,
    /// Loops, for runtime marker consumption.
    pub loop_table: Vec<LoopEntry>,
    /// Pragma snapshot, inherited by `eval STRING` child compilations.
    pub pragma: PragmaSnapshot,
    /// Sub name, `None` for top-level or anonymous units.
    pub name: Option<Rc<str>>,
}

impl CodeUnit {
    /// The string-pool entry at `index`.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range index: string operands are emitted by the
    /// compiler, so a bad index is a compiler bug, not user error.
    #[must_use]
    pub fn string(&self, index: i32) -> Rc<str> {
        let i = usize::try_from(index).expect("string-pool index is non-negative");
        Rc::clone(&self.strings[i])
    }

    /// The source line active at `pc` (0 when no mapping exists).
    #[must_use]
    pub fn line_for_pc(&self, pc: usize) -> u32 {
        let pc = u32::try_from(pc).unwrap_or(u32::MAX);
        match self.lines.binary_search_by_key(&pc, |e| e.pc) {
            Ok(i) => self.lines[i].line,
            Err(0) => 0,
            Err(i) => self.lines[i - 1].line,
        }
    }

    /// The innermost loop whose body range covers `pc` and whose label
    /// matches the marker's.
    #[must_use]
    pub fn find_loop(&self, pc: usize, label: Option<&str>) -> Option<&LoopEntry> {
        let pc = u32::try_from(pc).unwrap_or(u32::MAX);
        self.loop_table
            .iter()
            .filter(|entry| entry.body_start <= pc && pc < entry.body_end && entry.matches_label(label))
            .max_by_key(|entry| entry.body_start)
    }

    /// Disassembles a window of instructions around `pc` for diagnostics.
    ///
    /// Walks the stream from the start (operand widths are fixed, so
    /// instruction boundaries are recoverable) and renders `radius`
    /// instructions on each side of the failing one.
    #[must_use]
    pub fn disasm_window(&self, pc: usize, radius: usize) -> String {
        let mut decoded: Vec<(usize, String)> = Vec::new();
        let mut at = 0usize;
        let mut failing_index = None;
        while at < self.instructions.len() {
            let word = self.instructions[at];
            let Some(op) = u16::try_from(word).ok().and_then(Opcode::from_repr) else {
                decoded.push((at, format!("??? {word}")));
                break;
            };
            let count = op.operand_count();
            let operands: Vec<String> = self.instructions[at + 1..]
                .iter()
                .take(count)
                .map(ToString::to_string)
                .collect();
            if at == pc {
                failing_index = Some(decoded.len());
            }
            decoded.push((at, format!("{op} {}", operands.join(", "))));
            at += 1 + count;
        }
        let center = failing_index.unwrap_or(0);
        let start = center.saturating_sub(radius);
        let end = (center + radius + 1).min(decoded.len());
        let mut out = String::new();
        for (i, (at, text)) in decoded[start..end].iter().enumerate() {
            let marker = if start + i == center { "->" } else { "  " };
            let _ = writeln!(out, "{marker} {at:5}  {text}");
        }
        out
    }
}

/// Deduplicating string-pool builder used during compilation.
#[derive(Debug, Default)]
pub struct StringPool {
    items: Vec<Rc<str>>,
    index: AHashMap<Rc<str>, u32>,
}

impl StringPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its pool index.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&existing) = self.index.get(value) {
            return existing;
        }
        let id = u32::try_from(self.items.len()).expect("string pool exceeds u32");
        let rc: Rc<str> = Rc::from(value);
        self.items.push(Rc::clone(&rc));
        self.index.insert(rc, id);
        id
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Rc<str>> {
        self.items
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Rc<str> {
        Rc::clone(&self.items[index as usize])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn unit_with(instructions: Vec<i32>, lines: Vec<LineEntry>) -> CodeUnit {
        CodeUnit {
            instructions,
            constants: Vec::new(),
            strings: Vec::new(),
            max_registers: 4,
            capture_names: Vec::new(),
            source_name: Rc::from("t.pl"),
            lines,
            loop_table: Vec::new(),
            pragma: PragmaSnapshot::default(),
            name: None,
        }
    }

    #[test]
    fn string_pool_deduplicates() {
        let mut pool = StringPool::new();
        let a = pool.intern("x");
        let b = pool.intern("y");
        let a_again = pool.intern("x");
        assert_eq!(a, a_again);
        assert_eq!(b, 1);
        assert_eq!(pool.into_vec().len(), 2);
    }

    #[test]
    fn line_lookup_takes_preceding_entry() {
        let unit = unit_with(
            Vec::new(),
            vec![LineEntry { pc: 0, line: 1 }, LineEntry { pc: 5, line: 3 }],
        );
        assert_eq!(unit.line_for_pc(0), 1);
        assert_eq!(unit.line_for_pc(4), 1);
        assert_eq!(unit.line_for_pc(5), 3);
        assert_eq!(unit.line_for_pc(100), 3);
    }

    #[test]
    fn innermost_loop_wins() {
        let mut unit = unit_with(Vec::new(), Vec::new());
        unit.loop_table = vec![
            LoopEntry {
                redo_pc: 2,
                next_pc: 1,
                last_pc: 20,
                body_start: 1,
                body_end: 20,
                label: Some(Rc::from("OUTER")),
                level_reg: 3,
            },
            LoopEntry {
                redo_pc: 6,
                next_pc: 5,
                last_pc: 15,
                body_start: 5,
                body_end: 15,
                label: None,
                level_reg: 4,
            },
        ];
        let inner = unit.find_loop(7, None).unwrap();
        assert_eq!(inner.level_reg, 4);
        let outer = unit.find_loop(7, Some("OUTER")).unwrap();
        assert_eq!(outer.level_reg, 3);
        assert!(unit.find_loop(7, Some("MISSING")).is_none());
    }

    #[test]
    fn disasm_window_marks_failing_instruction() {
        // LoadInt r1, 7 ; LoadInt r2, 8 ; Add r3, r1, r2
        let instructions = vec![
            Opcode::LoadInt as i32,
            1,
            7,
            Opcode::LoadInt as i32,
            2,
            8,
            Opcode::Add as i32,
            3,
            1,
            2,
        ];
        let unit = unit_with(instructions, Vec::new());
        let window = unit.disasm_window(6, 2);
        assert!(window.contains("-> "), "window: {window}");
        assert!(window.contains("Add"), "window: {window}");
    }
}
