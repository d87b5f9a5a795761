//! The process-wide dynamic state.
//!
//! One [`GlobalState`] instance backs one engine: the global symbol table,
//! the dynamic-variable stack implementing `local`, the diagnostic frame
//! stack for `caller()`, the error/errno scalars, regex match state, and
//! the persistent-variable table for named-sub captures. The interpreter,
//! compiler (`BEGIN`-time evaluation) and runtime library all consult it
//! only through these interfaces, so embedding hosts can run multiple
//! independent engines side by side.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    ast::{Node, PragmaSnapshot},
    exception::{CompileError, RunResult},
    runtime::regex::{CompiledPattern, MatchSpans},
    value::{Array, Code, Glob, Hash, Scalar, ScalarPayload, Value},
};

/// Host-provided parser for `eval STRING`.
pub type ParserHook = Box<dyn Fn(&str, &PragmaSnapshot) -> Result<Node, CompileError>>;

/// One entry on the dynamic-variable stack.
enum SavedLocal {
    Scalar { target: Scalar, saved: ScalarPayload },
    Array { target: Array, saved: Vec<Scalar> },
    Hash { target: Hash, saved: Vec<(Rc<str>, Scalar)> },
}

/// One diagnostic frame, as reported by `caller()`.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub package: Rc<str>,
    pub sub_name: Rc<str>,
    pub file: Rc<str>,
    pub line: u32,
}

/// The single shared engine state.
pub struct GlobalState {
    /// Fully-qualified name → glob. Lookups create empty entries.
    symbols: AHashMap<Rc<str>, Glob>,
    /// `local` save stack; indices are watermarks.
    dynamic_stack: Vec<SavedLocal>,
    /// Diagnostic frames, innermost last.
    frames: Vec<FrameInfo>,
    /// Runtime package stack for symbolic lookups.
    package_stack: Vec<Rc<str>>,
    /// Persistent variables for `my` lexicals captured by named subs,
    /// keyed by (begin-id, name).
    persistents: AHashMap<(u32, Rc<str>), Value>,
    /// Referent address → bless package.
    blessings: AHashMap<usize, Rc<str>>,
    /// Compiled-pattern cache keyed by (source, flags).
    patterns: AHashMap<(Rc<str>, String), Rc<CompiledPattern>>,
    /// `pos()` table keyed by scalar address.
    pos_table: Rc<RefCell<AHashMap<usize, usize>>>,
    /// Group count written by the last match, so stale `$N` get cleared.
    last_group_count: usize,
    /// Parser for `eval STRING`, when the host provides one.
    parser_hook: Option<ParserHook>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbols: AHashMap::new(),
            dynamic_stack: Vec::new(),
            frames: Vec::new(),
            package_stack: vec![Rc::from("main")],
            persistents: AHashMap::new(),
            blessings: AHashMap::new(),
            patterns: AHashMap::new(),
            pos_table: Rc::new(RefCell::new(AHashMap::new())),
            last_group_count: 0,
            parser_hook: None,
        }
    }

    // ------------------------------------------------------------------
    // Symbol table
    // ------------------------------------------------------------------

    /// The glob for a fully-qualified name, created on first lookup.
    pub fn glob(&mut self, name: &str) -> Glob {
        if let Some(existing) = self.symbols.get(name) {
            return existing.clone();
        }
        let key: Rc<str> = Rc::from(name);
        let glob = Glob::new(Rc::clone(&key));
        self.symbols.insert(key, glob.clone());
        glob
    }

    pub fn get_scalar(&mut self, name: &str) -> Scalar {
        self.glob(name).scalar()
    }

    pub fn get_array(&mut self, name: &str) -> Array {
        self.glob(name).array()
    }

    pub fn get_hash(&mut self, name: &str) -> Hash {
        self.glob(name).hash()
    }

    pub fn get_code(&mut self, name: &str) -> Option<Code> {
        self.glob(name).code()
    }

    pub fn set_code(&mut self, name: &str, code: Code) {
        self.glob(name).set_code(code);
    }

    // ------------------------------------------------------------------
    // Error scalars
    // ------------------------------------------------------------------

    /// `$@`.
    pub fn error_scalar(&mut self) -> Scalar {
        self.get_scalar("main::@")
    }

    pub fn set_error(&mut self, value: &Scalar) -> RunResult<()> {
        self.error_scalar().assign_from(value)
    }

    /// Successful `eval` leaves `$@` as the empty string.
    pub fn clear_error(&mut self) -> RunResult<()> {
        self.error_scalar().assign_payload(ScalarPayload::Str(Rc::from("")))
    }

    /// `$!`: set by failing system calls.
    pub fn set_errno(&mut self, message: &str) -> RunResult<()> {
        self.get_scalar("main::!")
            .assign_payload(ScalarPayload::Str(Rc::from(message)))
    }

    // ------------------------------------------------------------------
    // Dynamic-variable stack (`local`)
    // ------------------------------------------------------------------

    /// Saves a scalar's payload and resets it to undef.
    pub fn push_local_scalar(&mut self, target: Scalar) -> RunResult<()> {
        let saved = target.raw_payload();
        target.set_payload(ScalarPayload::Undef);
        self.dynamic_stack.push(SavedLocal::Scalar { target, saved });
        Ok(())
    }

    /// Saves and clears whole-array contents.
    pub fn push_local_array(&mut self, target: Array) {
        let saved = target.take_contents();
        self.dynamic_stack.push(SavedLocal::Array { target, saved });
    }

    /// Saves and clears whole-hash contents.
    pub fn push_local_hash(&mut self, target: Hash) {
        let saved = target.take_contents();
        self.dynamic_stack.push(SavedLocal::Hash { target, saved });
    }

    /// Current dynamic-stack watermark.
    #[must_use]
    pub fn current_level(&self) -> usize {
        self.dynamic_stack.len()
    }

    /// Pops entries down to a watermark, restoring saved payloads in
    /// reverse push order.
    pub fn pop_to_level(&mut self, level: usize) {
        while self.dynamic_stack.len() > level {
            match self.dynamic_stack.pop().expect("stack is non-empty") {
                SavedLocal::Scalar { target, saved } => target.set_payload(saved),
                SavedLocal::Array { target, saved } => target.restore_contents(saved),
                SavedLocal::Hash { target, saved } => target.restore_contents(saved),
            }
        }
    }

    // ------------------------------------------------------------------
    // Diagnostic frames
    // ------------------------------------------------------------------

    pub fn push_frame(&mut self, frame: FrameInfo) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// `caller(level)`: 0 is the current sub's call site.
    #[must_use]
    pub fn caller_info(&self, level: usize) -> Option<&FrameInfo> {
        let len = self.frames.len();
        if level + 1 > len {
            return None;
        }
        self.frames.get(len - 1 - level)
    }

    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    // ------------------------------------------------------------------
    // Runtime package
    // ------------------------------------------------------------------

    pub fn push_package(&mut self, package: Rc<str>) {
        self.package_stack.push(package);
    }

    pub fn pop_package(&mut self) {
        if self.package_stack.len() > 1 {
            self.package_stack.pop();
        }
    }

    #[must_use]
    pub fn current_package(&self) -> Rc<str> {
        Rc::clone(self.package_stack.last().expect("package stack is never empty"))
    }

    /// Depth save/restore so invocations leave the package stack balanced
    /// even when a body executes `package` without a matching pop.
    #[must_use]
    pub fn package_depth(&self) -> usize {
        self.package_stack.len()
    }

    pub fn truncate_packages(&mut self, depth: usize) {
        self.package_stack.truncate(depth.max(1));
    }

    // ------------------------------------------------------------------
    // Persistent variables (named-sub captures)
    // ------------------------------------------------------------------

    pub fn persistent_scalar(&mut self, begin_id: u32, name: &str) -> Scalar {
        match self
            .persistents
            .entry((begin_id, Rc::from(name)))
            .or_insert_with(|| Value::Scalar(Scalar::undef()))
        {
            Value::Scalar(s) => s.clone(),
            other => other.pl_scalar(),
        }
    }

    pub fn persistent_array(&mut self, begin_id: u32, name: &str) -> Array {
        match self
            .persistents
            .entry((begin_id, Rc::from(name)))
            .or_insert_with(|| Value::Array(Array::new()))
        {
            Value::Array(a) => a.clone(),
            _ => Array::new(),
        }
    }

    pub fn persistent_hash(&mut self, begin_id: u32, name: &str) -> Hash {
        match self
            .persistents
            .entry((begin_id, Rc::from(name)))
            .or_insert_with(|| Value::Hash(Hash::new()))
        {
            Value::Hash(h) => h.clone(),
            _ => Hash::new(),
        }
    }

    // ------------------------------------------------------------------
    // Blessings
    // ------------------------------------------------------------------

    #[must_use]
    pub fn blessing(&self, addr: usize) -> Option<Rc<str>> {
        self.blessings.get(&addr).cloned()
    }

    pub fn set_blessing(&mut self, addr: usize, package: Rc<str>) {
        self.blessings.insert(addr, package);
    }

    // ------------------------------------------------------------------
    // Regex state
    // ------------------------------------------------------------------

    /// Looks up or compiles a pattern.
    pub fn cached_pattern(
        &mut self,
        source: &str,
        flags: &str,
        compile: impl FnOnce(&str, &str) -> RunResult<Rc<CompiledPattern>>,
    ) -> RunResult<Rc<CompiledPattern>> {
        let key = (Rc::from(source), flags.to_owned());
        if let Some(existing) = self.patterns.get(&key) {
            return Ok(Rc::clone(existing));
        }
        let compiled = compile(source, flags)?;
        self.patterns.insert(key, Rc::clone(&compiled));
        Ok(compiled)
    }

    #[must_use]
    pub fn pos_table(&self) -> Rc<RefCell<AHashMap<usize, usize>>> {
        Rc::clone(&self.pos_table)
    }

    #[must_use]
    pub fn pos_get(&self, target: &Scalar) -> Option<usize> {
        self.pos_table.borrow().get(&target.addr()).copied()
    }

    pub fn pos_set(&mut self, target: &Scalar, pos: Option<usize>) {
        let mut table = self.pos_table.borrow_mut();
        match pos {
            Some(p) => {
                table.insert(target.addr(), p);
            }
            None => {
                table.remove(&target.addr());
            }
        }
    }

    /// Publishes match results into `$&`, `` $` ``, `$'`, and `$1..$N`.
    /// Stale numbered captures from a previous wider match become undef.
    pub fn set_match_captures(&mut self, text: &str, spans: &MatchSpans) {
        let (start, end) = spans.full();
        let assignments: Vec<(String, ScalarPayload)> = {
            let mut out = Vec::new();
            out.push(("main::&".to_owned(), ScalarPayload::Str(Rc::from(&text[start..end]))));
            out.push(("main::`".to_owned(), ScalarPayload::Str(Rc::from(&text[..start]))));
            out.push(("main::'".to_owned(), ScalarPayload::Str(Rc::from(&text[end..]))));
            for (i, span) in spans.groups.iter().enumerate().skip(1) {
                let payload = match span {
                    Some((s, e)) => ScalarPayload::Str(Rc::from(&text[*s..*e])),
                    None => ScalarPayload::Undef,
                };
                out.push((format!("main::{i}"), payload));
            }
            for i in spans.groups.len()..=self.last_group_count {
                out.push((format!("main::{i}"), ScalarPayload::Undef));
            }
            out
        };
        for (name, payload) in assignments {
            self.get_scalar(&name).set_payload(payload);
        }
        self.last_group_count = spans.group_count();
    }

    // ------------------------------------------------------------------
    // `eval STRING` support
    // ------------------------------------------------------------------

    pub fn set_parser_hook(&mut self, hook: ParserHook) {
        self.parser_hook = Some(hook);
    }

    /// Parses an `eval STRING` body through the host hook, if installed.
    #[must_use]
    pub fn parse_eval_string(&self, code: &str, pragma: &PragmaSnapshot) -> Option<Result<Node, CompileError>> {
        self.parser_hook.as_ref().map(|hook| hook(code, pragma))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::scalar::stringify;

    #[test]
    fn symbol_lookup_autocreates_once() {
        let mut state = GlobalState::new();
        let a = state.get_scalar("main::x");
        let b = state.get_scalar("main::x");
        assert!(a.same_cell(&b));
    }

    #[test]
    fn local_save_and_restore() {
        let mut state = GlobalState::new();
        let g = state.get_scalar("main::g");
        g.assign_payload(ScalarPayload::Int(1)).unwrap();

        let level = state.current_level();
        state.push_local_scalar(g.clone()).unwrap();
        assert!(!g.is_defined());
        g.assign_payload(ScalarPayload::Int(42)).unwrap();
        assert_eq!(&*stringify(&g), "42");

        state.pop_to_level(level);
        assert_eq!(&*stringify(&g), "1");
        assert_eq!(state.current_level(), level);
    }

    #[test]
    fn local_restores_in_reverse_order() {
        let mut state = GlobalState::new();
        let g = state.get_scalar("main::g");
        g.assign_payload(ScalarPayload::Int(1)).unwrap();

        let level = state.current_level();
        state.push_local_scalar(g.clone()).unwrap();
        g.assign_payload(ScalarPayload::Int(2)).unwrap();
        state.push_local_scalar(g.clone()).unwrap();
        g.assign_payload(ScalarPayload::Int(3)).unwrap();

        state.pop_to_level(level);
        assert_eq!(&*stringify(&g), "1");
    }

    #[test]
    fn persistent_scalar_keeps_identity() {
        let mut state = GlobalState::new();
        let a = state.persistent_scalar(7, "x");
        a.assign_payload(ScalarPayload::Int(9)).unwrap();
        let b = state.persistent_scalar(7, "x");
        assert!(a.same_cell(&b));
        let other = state.persistent_scalar(8, "x");
        assert!(!a.same_cell(&other));
    }

    #[test]
    fn caller_walks_outward() {
        let mut state = GlobalState::new();
        let frame = |name: &str| FrameInfo {
            package: Rc::from("main"),
            sub_name: Rc::from(name),
            file: Rc::from("t.pl"),
            line: 1,
        };
        state.push_frame(frame("outer"));
        state.push_frame(frame("inner"));
        assert_eq!(&*state.caller_info(0).unwrap().sub_name, "inner");
        assert_eq!(&*state.caller_info(1).unwrap().sub_name, "outer");
        assert!(state.caller_info(2).is_none());
    }
}
