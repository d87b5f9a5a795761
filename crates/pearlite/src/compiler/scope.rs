//! Lexical scopes and register allocation.
//!
//! Registers are allocated linearly and reused across non-overlapping
//! scopes. Named lexicals get stable registers recorded in the scope's
//! name→slot map; temporaries are released at statement boundaries via
//! checkpoint/release. Variable keys include the sigil (`$x`, `@a`, `%h`)
//! so the three namespaces stay distinct.

use ahash::AHashMap;

/// First register available to the allocator; 0..=2 are the fixed
/// code-unit/arguments/context registers.
pub const FIRST_FREE_REG: u16 = 3;

/// Where a lexical name resolves.
#[derive(Debug, Clone)]
pub struct VarSlot {
    /// Register holding the variable's value.
    pub reg: u16,
    /// Begin-id when the variable lives in the persistent table (captured
    /// by an inner named sub); re-retrieved by inner units.
    pub persistent: Option<u32>,
    /// True for `our` aliases: the register holds the package global, so
    /// `local` on it is legal.
    pub global: bool,
}

#[derive(Debug, Default)]
struct ScopeFrame {
    names: AHashMap<String, VarSlot>,
    saved_next: u16,
    saved_floor: u16,
}

/// The compiler's scope stack and register allocator.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
    /// Next free register.
    next_reg: u16,
    /// Lowest register a temp release may fall back to; raised by named
    /// declarations so statement-level release never frees a lexical.
    floor: u16,
    /// High-water mark, reported as the unit's register-file size.
    max_reg: u16,
}

impl ScopeStack {
    /// A stack whose allocator starts after the fixed registers and any
    /// capture slots.
    #[must_use]
    pub fn new(first_reg: u16) -> Self {
        Self {
            frames: vec![ScopeFrame {
                names: AHashMap::new(),
                saved_next: first_reg,
                saved_floor: first_reg,
            }],
            next_reg: first_reg,
            floor: first_reg,
            max_reg: first_reg,
        }
    }

    pub fn push(&mut self) {
        self.frames.push(ScopeFrame {
            names: AHashMap::new(),
            saved_next: self.next_reg,
            saved_floor: self.floor,
        });
    }

    /// Pops a scope, releasing its registers for reuse.
    pub fn pop(&mut self) {
        let frame = self.frames.pop().expect("scope stack never pops its root");
        self.next_reg = frame.saved_next;
        self.floor = frame.saved_floor;
    }

    fn bump(&mut self) -> u16 {
        let reg = self.next_reg;
        self.next_reg = self.next_reg.checked_add(1).expect("register file exceeds u16");
        self.max_reg = self.max_reg.max(self.next_reg);
        reg
    }

    /// Declares a named lexical in the innermost scope.
    pub fn declare(&mut self, key: &str) -> u16 {
        let reg = self.bump();
        self.floor = self.next_reg;
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .names
            .insert(
                key.to_owned(),
                VarSlot {
                    reg,
                    persistent: None,
                    global: false,
                },
            );
        reg
    }

    /// Declares an `our` alias: a lexical name whose register holds the
    /// package global.
    pub fn declare_global_alias(&mut self, key: &str) -> u16 {
        let reg = self.declare(key);
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .names
            .get_mut(key)
            .expect("slot was just inserted")
            .global = true;
        reg
    }

    /// Declares a lexical that lives in the persistent table.
    pub fn declare_persistent(&mut self, key: &str, begin_id: u32) -> u16 {
        let reg = self.declare(key);
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .names
            .get_mut(key)
            .expect("slot was just inserted")
            .persistent = Some(begin_id);
        reg
    }

    /// Inserts a pre-assigned slot (capture imports).
    pub fn insert_slot(&mut self, key: &str, slot: VarSlot) {
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .names
            .insert(key.to_owned(), slot);
    }

    /// Resolves a name innermost-out.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<VarSlot> {
        self.frames.iter().rev().find_map(|frame| frame.names.get(key).cloned())
    }

    /// Allocates a statement temporary.
    pub fn alloc_temp(&mut self) -> u16 {
        self.bump()
    }

    /// Statement boundary: remember where temps start.
    #[must_use]
    pub fn checkpoint(&self) -> u16 {
        self.next_reg
    }

    /// Releases statement temporaries, never dropping below declared
    /// lexicals.
    pub fn release_to(&mut self, checkpoint: u16) {
        self.next_reg = checkpoint.max(self.floor);
    }

    /// The register-file size this unit needs.
    #[must_use]
    pub fn max_registers(&self) -> u16 {
        self.max_reg
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn registers_reuse_across_sibling_scopes() {
        let mut scopes = ScopeStack::new(FIRST_FREE_REG);
        scopes.push();
        let a = scopes.declare("$a");
        scopes.pop();
        scopes.push();
        let b = scopes.declare("$b");
        scopes.pop();
        assert_eq!(a, b);
        assert_eq!(scopes.max_registers(), FIRST_FREE_REG + 1);
    }

    #[test]
    fn release_never_frees_lexicals() {
        let mut scopes = ScopeStack::new(FIRST_FREE_REG);
        let cp = scopes.checkpoint();
        let _t1 = scopes.alloc_temp();
        let x = scopes.declare("$x"); // declared mid-statement
        scopes.release_to(cp);
        let t2 = scopes.alloc_temp();
        assert!(t2 > x, "temp {t2} must not clobber lexical {x}");
    }

    #[test]
    fn lookup_resolves_innermost_out() {
        let mut scopes = ScopeStack::new(FIRST_FREE_REG);
        let outer = scopes.declare("$x");
        scopes.push();
        let inner = scopes.declare("$x");
        assert_eq!(scopes.lookup("$x").unwrap().reg, inner);
        scopes.pop();
        assert_eq!(scopes.lookup("$x").unwrap().reg, outer);
        assert!(scopes.lookup("$y").is_none());
    }

    #[test]
    fn sigils_partition_namespaces() {
        let mut scopes = ScopeStack::new(FIRST_FREE_REG);
        let scalar = scopes.declare("$x");
        let array = scopes.declare("@x");
        assert_ne!(scalar, array);
        assert_eq!(scopes.lookup("$x").unwrap().reg, scalar);
        assert_eq!(scopes.lookup("@x").unwrap().reg, array);
    }
}
