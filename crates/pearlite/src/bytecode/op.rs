//! The opcode catalog.
//!
//! Opcodes are partitioned into contiguous numeric groups so the dispatch
//! match compiles to a jump table over a dense `u16`. Each opcode has a fixed
//! operand layout; the interpreter advances the PC by exactly
//! `1 + operand_count()` words per instruction.
//!
//! Operand word vocabulary (all stored as `i32` words):
//! - `rN`  - register number
//! - `name`/`str` - string-pool index
//! - `const` - constant-pool index
//! - `imm` - immediate integer
//! - `pc` - signed absolute program counter
//! - `ctx` - calling context (`0` void, `1` scalar, `2` list,
//!   `3` inherit the current frame's context register)

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

/// Group base values. Kept explicit so the catalog's layout is auditable;
/// `tests::groups_are_contiguous` enforces membership.
pub const GROUP_CONTROL: u16 = 0x000;
pub const GROUP_REG: u16 = 0x020;
pub const GROUP_GLOBAL: u16 = 0x030;
pub const GROUP_ARITH: u16 = 0x040;
pub const GROUP_CMP: u16 = 0x060;
pub const GROUP_BIT: u16 = 0x070;
pub const GROUP_AGG: u16 = 0x080;
pub const GROUP_REF: u16 = 0x0B0;
pub const GROUP_CALL: u16 = 0x0D0;
pub const GROUP_SCOPE: u16 = 0x0E0;
pub const GROUP_ITER: u16 = 0x0F0;
pub const GROUP_EVAL: u16 = 0x100;
pub const GROUP_DELEGATE: u16 = 0x110;

/// A bytecode operation.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, IntoStaticStr, Serialize, Deserialize,
)]
pub enum Opcode {
    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------
    /// No operation.
    Nop = GROUP_CONTROL,
    /// `pc` - unconditional jump.
    Jump,
    /// `rs, pc` - jump when `rs` is true.
    JumpIfTrue,
    /// `rs, pc` - jump when `rs` is false.
    JumpIfFalse,
    /// `rs, pc` - jump when `rs` is defined.
    JumpIfDefined,
    /// `rs, pc` - jump when `rs` is undef.
    JumpIfUndef,
    /// `rs` - return `rs` from this invocation.
    Return,
    /// Return an empty list.
    ReturnEmpty,
    /// `rd, name` - build a `last` marker (`name` = label index or -1).
    MakeLast,
    /// `rd, name` - build a `next` marker.
    MakeNext,
    /// `rd, name` - build a `redo` marker.
    MakeRedo,
    /// `rd, name` - build a `goto LABEL` marker.
    MakeGoto,

    // ------------------------------------------------------------------
    // Register ops
    // ------------------------------------------------------------------
    /// `rd, rs` - rebind `rd` to the value in `rs` (aliases, no copy).
    Move = GROUP_REG,
    /// `rd` - fresh undef scalar.
    LoadUndef,
    /// `rd, imm` - fresh integer scalar.
    LoadInt,
    /// `rd, str` - fresh string scalar from the string pool.
    LoadStr,
    /// `rd, const` - instantiate a constant-pool entry.
    LoadConst,
    /// `rd, rs` - copy-assign: write `rs`'s payload through the scalar
    /// currently in `rd` (preserves aliasing; resolves lvalue proxies).
    ScalarAssign,

    // ------------------------------------------------------------------
    // Global access
    // ------------------------------------------------------------------
    /// `rd, name` - the symbol-table scalar itself (aliased).
    LoadGlobalScalar = GROUP_GLOBAL,
    /// `name, rs` - copy-assign into the symbol-table scalar.
    StoreGlobalScalar,
    /// `rd, name`.
    LoadGlobalArray,
    /// `rd, name`.
    LoadGlobalHash,
    /// `rd, name` - dies at runtime when no sub is defined.
    LoadGlobalCode,
    /// `rd, name`.
    LoadGlobalGlob,
    /// `name, rs` - install a code value into the symbol table.
    StoreGlobalCode,
    /// `name, rs` - `*glob = rhs`: store into the slot matching `rs`'s kind.
    GlobAssign,
    /// `rd, rs` - symbolic scalar load via a name-carrying scalar.
    LoadScalarByName,
    /// `rs_name, rs_val` - symbolic scalar store.
    StoreScalarByName,
    /// `rd, name, rs` - alias-swap the symbol's scalar slot with `rs`,
    /// old cell into `rd` (`foreach` over `$_`, `sort`'s `$a`/`$b`).
    GlobalScalarSwap,

    // ------------------------------------------------------------------
    // Arithmetic & string
    // ------------------------------------------------------------------
    /// `rd, ra, rb` - numeric addition (fresh result scalar).
    Add = GROUP_ARITH,
    /// `rd, ra, rb`.
    Sub,
    /// `rd, ra, rb`.
    Mul,
    /// `rd, ra, rb` - dies on division by zero.
    Div,
    /// `rd, ra, rb` - Perl `%` (sign follows the right operand).
    Mod,
    /// `rd, ra, rb` - exponentiation.
    Pow,
    /// `rd, ra` - numeric negation.
    Neg,
    /// `rd, ra, rb` - string concatenation.
    Concat,
    /// `rd, ra, rb` - `x`: string repetition, or list repetition when
    /// `ra` holds a list.
    Repeat,
    /// `rd, ra` - string length (undef input gives undef).
    StrLength,
    /// `rd, rs` - `rd`'s scalar `+=` `rs` in place.
    AddAssign,
    /// `rd, rs`.
    SubAssign,
    /// `rd, rs`.
    MulAssign,
    /// `rd, rs`.
    DivAssign,
    /// `rd, rs` - in-place `.=`.
    ConcatAssign,
    /// `r` - `++`: numeric increment, or Perl's magic string increment.
    Inc,
    /// `r` - `--`: always numeric.
    Dec,

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------
    /// `rd, ra, rb` - numeric `==`.
    NumEq = GROUP_CMP,
    NumNe,
    NumLt,
    NumGt,
    NumLe,
    NumGe,
    /// `rd, ra, rb` - `<=>`, three-valued.
    NumCmp,
    /// `rd, ra, rb` - string `eq`.
    StrEq,
    StrNe,
    StrLt,
    StrGt,
    StrLe,
    StrGe,
    /// `rd, ra, rb` - `cmp`, three-valued.
    StrCmp,

    // ------------------------------------------------------------------
    // Logical & bitwise
    // ------------------------------------------------------------------
    /// `rd, ra` - logical not.
    Not = GROUP_BIT,
    /// `rd, ra, rb` - numeric `&`.
    BitAnd,
    BitOr,
    BitXor,
    /// `rd, ra` - numeric `~`.
    BitNot,
    /// `rd, ra, rb` - `<<`.
    Shl,
    /// `rd, ra, rb` - `>>`.
    Shr,
    /// `rd, ra, rb` - string `&.`.
    BitAndStr,
    BitOrStr,
    BitXorStr,

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------
    /// `rd` - fresh empty array.
    CreateArray = GROUP_AGG,
    /// `rd` - fresh empty hash.
    CreateHash,
    /// `rd` - fresh empty list.
    CreateList,
    /// `rlist, rs` - flatten `rs` onto the end of the list in `rlist`.
    ListPush,
    /// `rd, rbase, imm` - list from `imm` consecutive registers.
    ListFromRegs,
    /// `rd, rlist, ridx` - positional element (for list assignment).
    ListGet,
    /// `rd, rlist, ridx` - sublist from index to end (slurpy tail).
    ListSliceFrom,
    /// `rd, rlist` - element count as an integer scalar.
    ListCount,
    /// `rd, rlist, rkeys` - `(LIST)[i, j]` list slice.
    ListSlice,
    /// `rd, rarr, ridx` - rvalue element read (no autovivification).
    ArrayGet,
    /// `rd, rarr, ridx` - lvalue element cell (extends the array).
    ArrayElemLv,
    /// `rarr, ridx, rs` - element copy-assign.
    ArraySet,
    /// `rarr, rs` - push flattened values.
    ArrayPush,
    /// `rd, rarr`.
    ArrayPop,
    /// `rd, rarr`.
    ArrayShift,
    /// `rarr, rs` - unshift flattened values.
    ArrayUnshift,
    /// `rd, rarr` - element count.
    ArraySize,
    /// `rd, rarr` - `$#a`.
    ArrayLastIndex,
    /// `rd, rarr, rkeys` - `@a[...]` slice, as a list.
    ArraySlice,
    /// `rarr, rkeys, rvals` - slice assignment.
    ArraySliceSet,
    /// `rarr, rlist` - replace contents from a list.
    ArraySetFromList,
    /// `rd, rh, rkey` - rvalue element read.
    HashGet,
    /// `rd, rh, rkey` - lvalue element cell (autovivifies).
    HashElemLv,
    /// `rh, rkey, rs` - element copy-assign.
    HashSet,
    /// `rd, rh, rkey`.
    HashExists,
    /// `rd, rh, rkey` - delete, yielding the removed value or undef.
    HashDelete,
    /// `rd, rh` - keys as a list.
    HashKeys,
    /// `rd, rh` - values as a list (aliased cells).
    HashValues,
    /// `rd, rh` - one `each` step: `(key, value)` or empty list.
    HashEach,
    /// `rd, rh` - entry count.
    HashCount,
    /// `rd, rh, rkeys` - `@h{...}` slice.
    HashSlice,
    /// `rh, rkeys, rvals` - slice assignment.
    HashSliceSet,
    /// `rd, rh, rkeys` - slice delete; absent keys yield undef.
    HashSliceDelete,
    /// `rd, rh, rkeys` - `%h{...}` key/value slice.
    HashKvSlice,
    /// `rh, rlist` - replace contents from a flat key/value list.
    HashSetFromList,
    /// `rd, ra, rb` - `..`: integer range when both endpoints look
    /// numeric, magic string range otherwise.
    NewRange,
    /// `rd, rs` - detached copy of a list (fresh cells). List assignment
    /// snapshots its RHS through this so `($a, $b) = ($b, $a)` swaps.
    ListSnapshot,

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------
    /// `rd, rs` - `\expr`.
    CreateRef = GROUP_REF,
    /// `rd, rs` - scalar deref, strict: dies on a non-reference.
    DerefScalar,
    /// `rd, rs` - scalar deref, non-strict: a string payload is a symbolic
    /// lookup in the current package.
    DerefScalarSym,
    /// `rd, rs`.
    DerefArray,
    /// `rd, rs`.
    DerefHash,
    /// `rd, rs`.
    DerefCode,
    /// `rd, rs`.
    DerefGlob,
    /// `rd, rref, rpkg` - bless the referent; `rd` gets the reference back.
    Bless,
    /// `rd, rs` - `ref EXPR`.
    RefType,
    /// `rd, robj, rclass` - `@ISA`-aware isa check.
    Isa,
    /// `rd, rs` - internal kind name, for diagnostics.
    GetKind,
    /// `rd, rlist` - `[LIST]`.
    AnonArray,
    /// `rd, rlist` - `{LIST}`.
    AnonHash,

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------
    /// `rd, rcode, rargs, ctx` - call a sub with an argument list.
    CallSub = GROUP_CALL,
    /// `rd, rinv, rname, rargs, ctx` - method call; `SUPER::` resolves
    /// against the current unit's compile package.
    CallMethod,
    /// `rd, const, rbase` - closure over the inner unit at `const`,
    /// capturing that unit's capture count of consecutive registers
    /// starting at `rbase`.
    CreateClosure,
    /// `rd, rs, ctx` - `eval STRING` through the host parser hook.
    EvalString,

    // ------------------------------------------------------------------
    // Scopes & `local`
    // ------------------------------------------------------------------
    /// `rd, imm, name` - persistent scalar keyed by (begin-id, name).
    RetrievePersistentScalar = GROUP_SCOPE,
    /// `rd, imm, name`.
    RetrievePersistentArray,
    /// `rd, imm, name`.
    RetrievePersistentHash,
    /// `rs` - save the scalar's payload on the dynamic stack, reset to undef.
    PushLocalScalar,
    /// `rs` - save and clear array contents.
    PushLocalArray,
    /// `rs` - save and clear hash contents.
    PushLocalHash,
    /// `rd` - dynamic-stack watermark into `rd`.
    SaveLocalLevel,
    /// `rs` - pop dynamic stack down to the watermark in `rs`.
    PopToLocalLevel,
    /// `name` - push the runtime package (symbolic lookups).
    PushPackage,
    /// Pop the runtime package.
    PopPackage,

    // ------------------------------------------------------------------
    // Iterators
    // ------------------------------------------------------------------
    /// `rd, rs` - iterator scalar over `rs`'s list elements.
    IterCreate = GROUP_ITER,
    /// `rd, rit` - boolean: more elements?
    IterHasNext,
    /// `rd, rit` - next element or undef.
    IterNext,
    /// `rd, rit, pc` - superinstruction: rebind `rd` to the next element
    /// (aliasing) or jump to `pc` when exhausted.
    IterNextOrJump,

    // ------------------------------------------------------------------
    // `eval` blocks
    // ------------------------------------------------------------------
    /// `pc` - push a handler resuming at `pc`; clears `$@`.
    EvalTry = GROUP_EVAL,
    /// Pop the handler on the normal path; `$@` becomes the empty string.
    EvalEnd,
    /// `rd` - catch entry point: undef into `rd` (`$@` was already set).
    EvalCatch,

    // ------------------------------------------------------------------
    // Regex & I/O delegates
    // ------------------------------------------------------------------
    /// `rd, rpat, str` - compile pattern + flags to a regex scalar.
    RegexQr = GROUP_DELEGATE,
    /// `rd, rtarget, rpat, str, ctx` - `=~ m//`.
    RegexMatch,
    /// `rd, rtarget, rpat, rrepl, str` - `=~ s///`.
    RegexReplace,
    /// `rd, rpat, rtarget, rlimit` - `split`.
    RegexSplit,
    /// `rh, rlist` - print to a handle (`rh` undef means stdout).
    Print,
    /// `rh, rlist` - print with a trailing newline.
    Say,
    /// `rd, rh, ctx` - read one line (scalar) or all lines (list).
    Readline,
    /// `rd, rh, rargs` - `open`; false + `$!` on failure.
    OpenHandle,
    /// `rd, rh` - close.
    CloseHandle,
    /// `rlist` - raise; empty message becomes "Died".
    Die,
    /// `rlist` - warn to stderr.
    Warn,
    /// `rd, rsep, rlist`.
    Join,
    /// `rd, rfmt, rlist`.
    Sprintf,
    /// `rd, rcmp, rlist` - sort; `rcmp` undef means default string order.
    SortList,
    /// `rd, rlist, ctx` - list reversal, or string reversal in scalar ctx.
    Reverse,
    /// `rd` - 1 list / 0 scalar / undef void, from the context register.
    Wantarray,
    /// `rd, rs`.
    DefinedTest,
    /// `rs` - `undef EXPR` in place.
    UndefOp,
    /// `rd, rs` - chomp; count of characters removed.
    Chomp,
    /// `rd, rs` - chop; the removed character.
    Chop,
    /// `rd, rs`.
    AbsOp,
    /// `rd, rs` - truncate toward zero.
    IntOp,
    /// `rd, rs`.
    SqrtOp,
    /// `rd, rs`.
    ChrOp,
    /// `rd, rs`.
    OrdOp,
    /// `rd, rs`.
    LcOp,
    /// `rd, rs`.
    UcOp,
    /// `rd, rs` - `caller(level)`: package name, or package/file/line list.
    Caller,
    /// `rd, rs` - `pos($x)` lvalue proxy.
    PosOp,
}

impl Opcode {
    /// Number of operand words following the opcode word.
    #[must_use]
    pub fn operand_count(self) -> usize {
        use Opcode as Op;
        match self {
            Op::Nop | Op::ReturnEmpty | Op::PopPackage | Op::EvalEnd => 0,

            Op::Jump
            | Op::Return
            | Op::LoadUndef
            | Op::CreateArray
            | Op::CreateHash
            | Op::CreateList
            | Op::Inc
            | Op::Dec
            | Op::PushLocalScalar
            | Op::PushLocalArray
            | Op::PushLocalHash
            | Op::SaveLocalLevel
            | Op::PopToLocalLevel
            | Op::PushPackage
            | Op::EvalTry
            | Op::EvalCatch
            | Op::Die
            | Op::Warn
            | Op::Wantarray
            | Op::UndefOp => 1,

            Op::JumpIfTrue
            | Op::JumpIfFalse
            | Op::JumpIfDefined
            | Op::JumpIfUndef
            | Op::MakeLast
            | Op::MakeNext
            | Op::MakeRedo
            | Op::MakeGoto
            | Op::Move
            | Op::LoadInt
            | Op::LoadStr
            | Op::LoadConst
            | Op::ScalarAssign
            | Op::LoadGlobalScalar
            | Op::StoreGlobalScalar
            | Op::LoadGlobalArray
            | Op::LoadGlobalHash
            | Op::LoadGlobalCode
            | Op::LoadGlobalGlob
            | Op::StoreGlobalCode
            | Op::GlobAssign
            | Op::LoadScalarByName
            | Op::StoreScalarByName
            | Op::Neg
            | Op::StrLength
            | Op::AddAssign
            | Op::SubAssign
            | Op::MulAssign
            | Op::DivAssign
            | Op::ConcatAssign
            | Op::Not
            | Op::BitNot
            | Op::ListPush
            | Op::ListCount
            | Op::ListSnapshot
            | Op::ArrayPop
            | Op::ArrayShift
            | Op::ArrayPush
            | Op::ArrayUnshift
            | Op::ArraySize
            | Op::ArrayLastIndex
            | Op::ArraySetFromList
            | Op::HashKeys
            | Op::HashValues
            | Op::HashEach
            | Op::HashCount
            | Op::HashSetFromList
            | Op::CreateRef
            | Op::DerefScalar
            | Op::DerefScalarSym
            | Op::DerefArray
            | Op::DerefHash
            | Op::DerefCode
            | Op::DerefGlob
            | Op::RefType
            | Op::GetKind
            | Op::AnonArray
            | Op::AnonHash
            | Op::IterCreate
            | Op::IterHasNext
            | Op::IterNext
            | Op::Print
            | Op::Say
            | Op::CloseHandle
            | Op::DefinedTest
            | Op::Chomp
            | Op::Chop
            | Op::AbsOp
            | Op::IntOp
            | Op::SqrtOp
            | Op::ChrOp
            | Op::OrdOp
            | Op::LcOp
            | Op::UcOp
            | Op::Caller
            | Op::PosOp => 2,

            Op::GlobalScalarSwap
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Pow
            | Op::Concat
            | Op::Repeat
            | Op::NumEq
            | Op::NumNe
            | Op::NumLt
            | Op::NumGt
            | Op::NumLe
            | Op::NumGe
            | Op::NumCmp
            | Op::StrEq
            | Op::StrNe
            | Op::StrLt
            | Op::StrGt
            | Op::StrLe
            | Op::StrGe
            | Op::StrCmp
            | Op::BitAnd
            | Op::BitOr
            | Op::BitXor
            | Op::Shl
            | Op::Shr
            | Op::BitAndStr
            | Op::BitOrStr
            | Op::BitXorStr
            | Op::ListFromRegs
            | Op::ListGet
            | Op::ListSliceFrom
            | Op::ListSlice
            | Op::ArrayGet
            | Op::ArrayElemLv
            | Op::ArraySet
            | Op::ArraySlice
            | Op::ArraySliceSet
            | Op::HashGet
            | Op::HashElemLv
            | Op::HashSet
            | Op::HashExists
            | Op::HashDelete
            | Op::HashSlice
            | Op::HashSliceSet
            | Op::HashSliceDelete
            | Op::HashKvSlice
            | Op::NewRange
            | Op::Bless
            | Op::Isa
            | Op::CreateClosure
            | Op::EvalString
            | Op::RetrievePersistentScalar
            | Op::RetrievePersistentArray
            | Op::RetrievePersistentHash
            | Op::IterNextOrJump
            | Op::RegexQr
            | Op::Join
            | Op::Sprintf
            | Op::SortList
            | Op::Reverse
            | Op::Readline
            | Op::OpenHandle => 3,

            Op::CallSub | Op::RegexSplit => 4,

            Op::CallMethod | Op::RegexMatch | Op::RegexReplace => 5,
        }
    }

    /// The group this opcode belongs to, for diagnostics.
    #[must_use]
    pub fn group_name(self) -> &'static str {
        let d = self as u16;
        match d {
            _ if d >= GROUP_DELEGATE => "delegate",
            _ if d >= GROUP_EVAL => "eval",
            _ if d >= GROUP_ITER => "iterator",
            _ if d >= GROUP_SCOPE => "scope",
            _ if d >= GROUP_CALL => "call",
            _ if d >= GROUP_REF => "reference",
            _ if d >= GROUP_AGG => "aggregate",
            _ if d >= GROUP_BIT => "bitwise",
            _ if d >= GROUP_CMP => "compare",
            _ if d >= GROUP_ARITH => "arith",
            _ if d >= GROUP_GLOBAL => "global",
            _ if d >= GROUP_REG => "register",
            _ => "control",
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Every opcode decodes back from its discriminant.
    #[test]
    fn round_trips_through_repr() {
        for d in 0..0x200u16 {
            if let Some(op) = Opcode::from_repr(d) {
                assert_eq!(op as u16, d);
            }
        }
    }

    /// Groups occupy disjoint, ordered ranges and every opcode lands in the
    /// group its position in the declaration implies.
    #[test]
    fn groups_are_contiguous() {
        let bounds = [
            (GROUP_CONTROL, GROUP_REG, "control"),
            (GROUP_REG, GROUP_GLOBAL, "register"),
            (GROUP_GLOBAL, GROUP_ARITH, "global"),
            (GROUP_ARITH, GROUP_CMP, "arith"),
            (GROUP_CMP, GROUP_BIT, "compare"),
            (GROUP_BIT, GROUP_AGG, "bitwise"),
            (GROUP_AGG, GROUP_REF, "aggregate"),
            (GROUP_REF, GROUP_CALL, "reference"),
            (GROUP_CALL, GROUP_SCOPE, "call"),
            (GROUP_SCOPE, GROUP_ITER, "scope"),
            (GROUP_ITER, GROUP_EVAL, "iterator"),
            (GROUP_EVAL, GROUP_DELEGATE, "eval"),
        ];
        for (start, end, name) in bounds {
            for d in start..end {
                if let Some(op) = Opcode::from_repr(d) {
                    assert_eq!(op.group_name(), name, "{op:?} at {d:#x}");
                }
            }
        }
        // each group actually starts at its base
        assert_eq!(Opcode::from_repr(GROUP_CONTROL), Some(Opcode::Nop));
        assert_eq!(Opcode::from_repr(GROUP_REG), Some(Opcode::Move));
        assert_eq!(Opcode::from_repr(GROUP_GLOBAL), Some(Opcode::LoadGlobalScalar));
        assert_eq!(Opcode::from_repr(GROUP_ARITH), Some(Opcode::Add));
        assert_eq!(Opcode::from_repr(GROUP_CMP), Some(Opcode::NumEq));
        assert_eq!(Opcode::from_repr(GROUP_BIT), Some(Opcode::Not));
        assert_eq!(Opcode::from_repr(GROUP_AGG), Some(Opcode::CreateArray));
        assert_eq!(Opcode::from_repr(GROUP_REF), Some(Opcode::CreateRef));
        assert_eq!(Opcode::from_repr(GROUP_CALL), Some(Opcode::CallSub));
        assert_eq!(Opcode::from_repr(GROUP_SCOPE), Some(Opcode::RetrievePersistentScalar));
        assert_eq!(Opcode::from_repr(GROUP_ITER), Some(Opcode::IterCreate));
        assert_eq!(Opcode::from_repr(GROUP_EVAL), Some(Opcode::EvalTry));
        assert_eq!(Opcode::from_repr(GROUP_DELEGATE), Some(Opcode::RegexQr));
    }

    #[test]
    fn operand_counts_spot_checks() {
        assert_eq!(Opcode::Nop.operand_count(), 0);
        assert_eq!(Opcode::Jump.operand_count(), 1);
        assert_eq!(Opcode::JumpIfFalse.operand_count(), 2);
        assert_eq!(Opcode::Add.operand_count(), 3);
        assert_eq!(Opcode::CallSub.operand_count(), 4);
        assert_eq!(Opcode::CallMethod.operand_count(), 5);
        assert_eq!(Opcode::RegexMatch.operand_count(), 5);
        assert_eq!(Opcode::RegexReplace.operand_count(), 5);
        assert_eq!(Opcode::IterNextOrJump.operand_count(), 3);
    }
}
