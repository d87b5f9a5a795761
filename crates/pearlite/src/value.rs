//! Runtime value model.
//!
//! Every runtime value is one of the kinds in [`Value`]. The load-bearing
//! design point is aliasing: a [`Scalar`] is an `Rc<RefCell<ScalarPayload>>`,
//! so two variables may share one mutable payload. Copy-assignment writes
//! *through* the cell ([`Scalar::assign_from`]) while closure capture,
//! `local` save, and references share the cell itself. Cloning any value
//! type here clones the handle, never the contents.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    ast::SourcePos,
    bytecode::code::CodeUnit,
    exception::RunResult,
    runtime::{io::IoHandle, scalar::magic_increment},
};

/// A scalar: shared, mutable payload cell.
///
/// `Clone` produces an *alias* (same payload). Use [`Scalar::assign_from`]
/// for Perl copy-assignment and [`Scalar::copy`] for a detached duplicate.
#[derive(Clone)]
pub struct Scalar(Rc<RefCell<ScalarPayload>>);

/// The tagged payload of a scalar.
#[derive(Debug, Clone)]
pub enum ScalarPayload {
    Undef,
    Int(i64),
    Num(f64),
    Str(Rc<str>),
    /// A typed pointer at another value, optionally blessed into a package.
    Ref(RefPayload),
    /// Compiled regex object (`qr//`).
    Regex(Rc<crate::runtime::regex::CompiledPattern>),
    /// Version string; stringifies only.
    VString(Rc<str>),
    /// Iterator state (`foreach` internals, `each`-style cursors).
    Iter(Rc<RefCell<ValueIter>>),
    /// Write-through lvalue proxy (`pos($x)`, lvalue subs).
    Proxy(Rc<dyn LvalueProxy>),
}

/// A reference payload: target plus optional bless package.
#[derive(Debug, Clone)]
pub struct RefPayload {
    pub target: RefTarget,
    pub blessed: Option<Rc<str>>,
}

/// What a reference points at.
#[derive(Debug, Clone)]
pub enum RefTarget {
    Scalar(Scalar),
    Array(Array),
    Hash(Hash),
    Code(Code),
    Glob(Glob),
}

impl RefTarget {
    /// Perl's `ref`-style tag for an unblessed reference of this shape.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "SCALAR",
            Self::Array(_) => "ARRAY",
            Self::Hash(_) => "HASH",
            Self::Code(_) => "CODE",
            Self::Glob(_) => "GLOB",
        }
    }

    /// Stable address used when stringifying references.
    #[must_use]
    pub fn addr(&self) -> usize {
        match self {
            Self::Scalar(s) => Rc::as_ptr(&s.0) as usize,
            Self::Array(a) => Rc::as_ptr(&a.0) as usize,
            Self::Hash(h) => Rc::as_ptr(&h.0) as usize,
            Self::Code(c) => Rc::as_ptr(&c.0) as usize,
            Self::Glob(g) => Rc::as_ptr(&g.0) as usize,
        }
    }
}

/// Write-through proxy protocol for magical lvalues.
///
/// Reading a proxy scalar resolves [`LvalueProxy::get`]; copy-assigning into
/// it calls [`LvalueProxy::set`] instead of replacing the payload.
pub trait LvalueProxy: fmt::Debug {
    fn get(&self) -> ScalarPayload;
    fn set(&self, payload: ScalarPayload) -> RunResult<()>;
}

impl Scalar {
    #[must_use]
    pub fn undef() -> Self {
        Self(Rc::new(RefCell::new(ScalarPayload::Undef)))
    }

    #[must_use]
    pub fn from_int(v: i64) -> Self {
        Self(Rc::new(RefCell::new(ScalarPayload::Int(v))))
    }

    #[must_use]
    pub fn from_num(v: f64) -> Self {
        Self(Rc::new(RefCell::new(ScalarPayload::Num(v))))
    }

    #[must_use]
    pub fn from_str_rc(v: Rc<str>) -> Self {
        Self(Rc::new(RefCell::new(ScalarPayload::Str(v))))
    }

    #[must_use]
    pub fn from_string(v: impl Into<String>) -> Self {
        Self::from_str_rc(Rc::from(v.into()))
    }

    #[must_use]
    pub fn from_payload(payload: ScalarPayload) -> Self {
        Self(Rc::new(RefCell::new(payload)))
    }

    #[must_use]
    pub fn from_bool(v: bool) -> Self {
        // Perl truth: 1 and "".
        if v { Self::from_int(1) } else { Self::from_str_rc(Rc::from("")) }
    }

    /// Two handles aliasing the same payload cell?
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Pointer identity for pos-tables and diagnostics.
    #[must_use]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Snapshot of the current payload, resolving proxies.
    #[must_use]
    pub fn payload(&self) -> ScalarPayload {
        let inner = self.0.borrow();
        if let ScalarPayload::Proxy(p) = &*inner {
            let proxy = Rc::clone(p);
            drop(inner);
            return proxy.get();
        }
        inner.clone()
    }

    /// Raw payload snapshot, *without* proxy resolution (`local` save path).
    #[must_use]
    pub fn raw_payload(&self) -> ScalarPayload {
        self.0.borrow().clone()
    }

    /// Replaces the payload wholesale. Bypasses proxies; used by `local`
    /// restore and internal plumbing.
    pub fn set_payload(&self, payload: ScalarPayload) {
        *self.0.borrow_mut() = payload;
    }

    /// Perl copy-assignment: copy the source's payload through this cell.
    ///
    /// Writing through the cell (rather than rebinding the handle) is what
    /// keeps closure captures, `local` targets, and references in sync.
    pub fn assign_from(&self, source: &Self) -> RunResult<()> {
        self.assign_payload(source.payload())
    }

    /// Copy-assignment from an already-snapshotted payload.
    pub fn assign_payload(&self, payload: ScalarPayload) -> RunResult<()> {
        let is_proxy = matches!(&*self.0.borrow(), ScalarPayload::Proxy(_));
        if is_proxy {
            let proxy = match &*self.0.borrow() {
                ScalarPayload::Proxy(p) => Rc::clone(p),
                _ => unreachable!(),
            };
            return proxy.set(payload);
        }
        *self.0.borrow_mut() = payload;
        Ok(())
    }

    /// Detached duplicate (fresh cell, copied payload).
    #[must_use]
    pub fn copy(&self) -> Self {
        Self::from_payload(self.payload())
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        !matches!(self.payload(), ScalarPayload::Undef)
    }

    /// Perl truth: undef, 0, 0.0, `""`, and `"0"` are false.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self.payload() {
            ScalarPayload::Undef => false,
            ScalarPayload::Int(v) => v != 0,
            ScalarPayload::Num(v) => v != 0.0,
            ScalarPayload::Str(s) | ScalarPayload::VString(s) => !(s.is_empty() || &*s == "0"),
            ScalarPayload::Ref(_) | ScalarPayload::Regex(_) | ScalarPayload::Iter(_) => true,
            ScalarPayload::Proxy(_) => false, // resolved by payload(); unreachable in practice
        }
    }

    /// The reference payload, if this scalar holds one.
    #[must_use]
    pub fn ref_payload(&self) -> Option<RefPayload> {
        match self.payload() {
            ScalarPayload::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(p) => write!(f, "Scalar({p:?})"),
            Err(_) => write!(f, "Scalar(<borrowed>)"),
        }
    }
}

/// A Perl array: shared vector of element scalars.
///
/// Elements are [`Scalar`]s so that `foreach` aliasing and `\$a[0]` work:
/// the element cell is the identity, not its contents.
#[derive(Clone)]
pub struct Array(Rc<RefCell<Vec<Scalar>>>);

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    #[must_use]
    pub fn from_scalars(elems: Vec<Scalar>) -> Self {
        Self(Rc::new(RefCell::new(elems)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Resolves a possibly negative index. `None` when a negative index
    /// reaches before the start.
    #[must_use]
    pub fn resolve_index(&self, index: i64) -> Option<usize> {
        if index >= 0 {
            return Some(usize::try_from(index).expect("non-negative index fits usize"));
        }
        let len = i64::try_from(self.len()).expect("array length fits i64");
        let adjusted = len + index;
        if adjusted < 0 {
            None
        } else {
            Some(usize::try_from(adjusted).expect("adjusted index fits usize"))
        }
    }

    /// Rvalue element fetch; out-of-range reads yield a fresh undef.
    #[must_use]
    pub fn get(&self, index: i64) -> Scalar {
        match self.resolve_index(index) {
            Some(i) => self.0.borrow().get(i).cloned().unwrap_or_else(Scalar::undef),
            None => Scalar::undef(),
        }
    }

    /// Lvalue element fetch: extends the array with undefs as needed and
    /// returns the element cell itself (aliased).
    #[must_use]
    pub fn elem_lv(&self, index: i64) -> Option<Scalar> {
        let i = self.resolve_index(index)?;
        let mut elems = self.0.borrow_mut();
        while elems.len() <= i {
            elems.push(Scalar::undef());
        }
        Some(elems[i].clone())
    }

    pub fn push(&self, value: Scalar) {
        self.0.borrow_mut().push(value);
    }

    #[must_use]
    pub fn pop(&self) -> Option<Scalar> {
        self.0.borrow_mut().pop()
    }

    #[must_use]
    pub fn shift(&self) -> Option<Scalar> {
        let mut elems = self.0.borrow_mut();
        if elems.is_empty() { None } else { Some(elems.remove(0)) }
    }

    pub fn unshift(&self, values: Vec<Scalar>) {
        let mut elems = self.0.borrow_mut();
        for (i, v) in values.into_iter().enumerate() {
            elems.insert(i, v);
        }
    }

    /// Replaces the contents with fresh copies of the given scalars.
    ///
    /// List assignment copies values: `my @a = @b` must not alias `@b`'s
    /// element cells.
    pub fn set_from_scalars(&self, values: &[Scalar]) {
        let copies: Vec<Scalar> = values.iter().map(Scalar::copy).collect();
        *self.0.borrow_mut() = copies;
    }

    /// Element cells in order (aliased).
    #[must_use]
    pub fn elements(&self) -> Vec<Scalar> {
        self.0.borrow().clone()
    }

    /// Contents snapshot-and-clear for `local @a`.
    #[must_use]
    pub fn take_contents(&self) -> Vec<Scalar> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn restore_contents(&self, saved: Vec<Scalar>) {
        *self.0.borrow_mut() = saved;
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(v) => write!(f, "Array(len={})", v.len()),
            Err(_) => write!(f, "Array(<borrowed>)"),
        }
    }
}

/// A Perl hash: insertion-ordered map from string keys to element scalars.
///
/// `IndexMap` keeps `keys`/`values` in one stable, paired order and gives
/// `each` a positional cursor.
#[derive(Clone)]
pub struct Hash(Rc<RefCell<HashData>>);

#[derive(Debug)]
struct HashData {
    map: IndexMap<Rc<str>, Scalar>,
    /// Cursor for `each`; reset by `keys`/`values`.
    each_pos: usize,
}

impl Hash {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(HashData {
            map: IndexMap::new(),
            each_pos: 0,
        })))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().map.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Scalar {
        self.0.borrow().map.get(key).cloned().unwrap_or_else(Scalar::undef)
    }

    /// Lvalue element fetch: autovivifies the slot and returns its cell.
    #[must_use]
    pub fn elem_lv(&self, key: &str) -> Scalar {
        let mut data = self.0.borrow_mut();
        if let Some(existing) = data.map.get(key) {
            return existing.clone();
        }
        let fresh = Scalar::undef();
        data.map.insert(Rc::from(key), fresh.clone());
        fresh
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.0.borrow().map.contains_key(key)
    }

    /// Removes a key, returning its value scalar (or `None` when absent).
    /// Uses `shift_remove` to preserve the insertion order of survivors.
    #[must_use]
    pub fn delete(&self, key: &str) -> Option<Scalar> {
        self.0.borrow_mut().map.shift_remove(key)
    }

    /// Keys in insertion order; resets the `each` cursor.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        let mut data = self.0.borrow_mut();
        data.each_pos = 0;
        data.map.keys().cloned().collect()
    }

    /// Values (aliased cells) in the same order as [`Hash::keys`].
    #[must_use]
    pub fn values(&self) -> Vec<Scalar> {
        let mut data = self.0.borrow_mut();
        data.each_pos = 0;
        data.map.values().cloned().collect()
    }

    /// One `each` step: the next (key, value) pair, or `None` when the
    /// cursor is exhausted (which also resets it).
    #[must_use]
    pub fn each_next(&self) -> Option<(Rc<str>, Scalar)> {
        let mut data = self.0.borrow_mut();
        let pos = data.each_pos;
        match data.map.get_index(pos) {
            Some((k, v)) => {
                let pair = (Rc::clone(k), v.clone());
                data.each_pos = pos + 1;
                Some(pair)
            }
            None => {
                data.each_pos = 0;
                None
            }
        }
    }

    /// Replaces contents from a flat key/value list. An odd trailing key
    /// gets an undef value, as in Perl (with a warning there, silent here).
    pub fn set_from_pairs(&self, flat: &[Scalar], stringify: impl Fn(&Scalar) -> Rc<str>) {
        let mut data = self.0.borrow_mut();
        data.map.clear();
        data.each_pos = 0;
        let mut i = 0;
        while i < flat.len() {
            let key = stringify(&flat[i]);
            let value = flat.get(i + 1).map_or_else(Scalar::undef, Scalar::copy);
            data.map.insert(key, value);
            i += 2;
        }
    }

    /// Contents snapshot-and-clear for `local %h`.
    #[must_use]
    pub fn take_contents(&self) -> Vec<(Rc<str>, Scalar)> {
        let mut data = self.0.borrow_mut();
        data.each_pos = 0;
        data.map.drain(..).collect()
    }

    pub fn restore_contents(&self, saved: Vec<(Rc<str>, Scalar)>) {
        let mut data = self.0.borrow_mut();
        data.map.clear();
        data.map.extend(saved);
        data.each_pos = 0;
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(d) => write!(f, "Hash(len={})", d.map.len()),
            Err(_) => write!(f, "Hash(<borrowed>)"),
        }
    }
}

/// A callable: compiled unit plus captured environment.
#[derive(Clone)]
pub struct Code(Rc<CodeValue>);

/// The body of a [`Code`] value.
pub struct CodeValue {
    /// The compiled unit.
    pub unit: Rc<CodeUnit>,
    /// Captured values for slots `3..3+N`, in declaration order.
    pub captures: Vec<Value>,
    /// Sub name for diagnostics; `None` for anonymous subs.
    pub name: Option<Rc<str>>,
}

impl Code {
    #[must_use]
    pub fn new(unit: Rc<CodeUnit>, captures: Vec<Value>, name: Option<Rc<str>>) -> Self {
        Self(Rc::new(CodeValue { unit, captures, name }))
    }

    #[must_use]
    pub fn value(&self) -> &CodeValue {
        &self.0
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.name {
            Some(name) => write!(f, "Code({name})"),
            None => write!(f, "Code(__ANON__)"),
        }
    }
}

/// A glob: one symbol-table entry exposing the four namespace slots.
#[derive(Clone)]
pub struct Glob(Rc<GlobInner>);

struct GlobInner {
    name: Rc<str>,
    slots: RefCell<GlobSlots>,
    /// File handle attached via `open`.
    io: RefCell<Option<IoHandle>>,
}

#[derive(Default)]
struct GlobSlots {
    scalar: Option<Scalar>,
    array: Option<Array>,
    hash: Option<Hash>,
    code: Option<Code>,
}

impl Glob {
    #[must_use]
    pub fn new(name: Rc<str>) -> Self {
        Self(Rc::new(GlobInner {
            name,
            slots: RefCell::new(GlobSlots::default()),
            io: RefCell::new(None),
        }))
    }

    #[must_use]
    pub fn name(&self) -> Rc<str> {
        Rc::clone(&self.0.name)
    }

    /// The scalar slot, created empty on first access.
    #[must_use]
    pub fn scalar(&self) -> Scalar {
        self.0.slots.borrow_mut().scalar.get_or_insert_with(Scalar::undef).clone()
    }

    /// Replaces the scalar slot with another cell (aliasing rebind).
    /// Returns the previous cell. Used for `foreach` over `$_` and
    /// `sort`'s `$a`/`$b`.
    #[must_use]
    pub fn swap_scalar(&self, replacement: Scalar) -> Scalar {
        let mut slots = self.0.slots.borrow_mut();
        std::mem::replace(slots.scalar.get_or_insert_with(Scalar::undef), replacement)
    }

    #[must_use]
    pub fn array(&self) -> Array {
        self.0.slots.borrow_mut().array.get_or_insert_with(Array::new).clone()
    }

    #[must_use]
    pub fn hash(&self) -> Hash {
        self.0.slots.borrow_mut().hash.get_or_insert_with(Hash::new).clone()
    }

    #[must_use]
    pub fn code(&self) -> Option<Code> {
        self.0.slots.borrow().code.clone()
    }

    pub fn set_code(&self, code: Code) {
        self.0.slots.borrow_mut().code = Some(code);
    }

    /// Stores a value into whichever slot matches its kind (`*glob = rhs`).
    pub fn assign_by_kind(&self, value: &Value) {
        let mut slots = self.0.slots.borrow_mut();
        match value {
            Value::Scalar(s) => match s.ref_payload() {
                Some(r) => match r.target {
                    RefTarget::Scalar(inner) => slots.scalar = Some(inner),
                    RefTarget::Array(a) => slots.array = Some(a),
                    RefTarget::Hash(h) => slots.hash = Some(h),
                    RefTarget::Code(c) => slots.code = Some(c),
                    RefTarget::Glob(g) => {
                        drop(slots);
                        self.adopt(&g);
                    }
                },
                None => slots.scalar = Some(s.clone()),
            },
            Value::Array(a) => slots.array = Some(a.clone()),
            Value::Hash(h) => slots.hash = Some(h.clone()),
            Value::Code(c) => slots.code = Some(c.clone()),
            Value::Glob(g) => {
                drop(slots);
                self.adopt(g);
            }
            Value::Range(_) | Value::List(_) | Value::Flow(_) => {}
        }
    }

    /// `*a = *b`: share every slot of the source glob.
    fn adopt(&self, source: &Self) {
        if Rc::ptr_eq(&self.0, &source.0) {
            return;
        }
        let theirs = source.0.slots.borrow();
        let mut ours = self.0.slots.borrow_mut();
        ours.scalar = theirs.scalar.clone();
        ours.array = theirs.array.clone();
        ours.hash = theirs.hash.clone();
        ours.code = theirs.code.clone();
    }

    pub fn set_io(&self, handle: Option<IoHandle>) {
        *self.0.io.borrow_mut() = handle;
    }

    /// Runs a closure with mutable access to the attached file handle.
    pub fn with_io<R>(&self, f: impl FnOnce(Option<&mut IoHandle>) -> R) -> R {
        f(self.0.io.borrow_mut().as_mut())
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Glob(*{})", self.0.name)
    }
}

/// A lazy range literal (`1..10`, `'aa'..'ad'`).
#[derive(Debug, Clone, PartialEq)]
pub enum RangeValue {
    Int { start: i64, end: i64 },
    Str { start: Rc<str>, end: Rc<str> },
}

/// An ephemeral flat list of scalars.
///
/// Lists are the currency of list context: arguments, list assignment
/// sources, and return values. Elements may alias array/hash cells.
#[derive(Clone)]
pub struct List(Rc<RefCell<Vec<Scalar>>>);

impl List {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    #[must_use]
    pub fn from_scalars(elems: Vec<Scalar>) -> Self {
        Self(Rc::new(RefCell::new(elems)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn push(&self, value: Scalar) {
        self.0.borrow_mut().push(value);
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Scalar> {
        self.0.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn scalars(&self) -> Vec<Scalar> {
        self.0.borrow().clone()
    }

    /// Last element, or undef for an empty list (Perl's list-in-scalar rule).
    #[must_use]
    pub fn last_or_undef(&self) -> Scalar {
        self.0.borrow().last().cloned().unwrap_or_else(Scalar::undef)
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(v) => write!(f, "List(len={})", v.len()),
            Err(_) => write!(f, "List(<borrowed>)"),
        }
    }
}

/// Pending non-local transfer: `last`/`next`/`redo`/`goto`.
#[derive(Debug, Clone)]
pub struct FlowMarker {
    pub kind: FlowKind,
    pub label: Option<Rc<str>>,
    pub origin: SourcePos,
}

/// Which control transfer a [`FlowMarker`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum FlowKind {
    Last,
    Next,
    Redo,
    Goto,
}

/// Any runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Scalar),
    Array(Array),
    Hash(Hash),
    Code(Code),
    Glob(Glob),
    Range(Rc<RangeValue>),
    List(List),
    /// Pending `last`/`next`/`redo`/`goto`, propagated through returns.
    Flow(Rc<FlowMarker>),
}

impl Value {
    #[must_use]
    pub fn undef() -> Self {
        Self::Scalar(Scalar::undef())
    }

    #[must_use]
    pub fn empty_list() -> Self {
        Self::List(List::new())
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "SCALAR",
            Self::Array(_) => "ARRAY",
            Self::Hash(_) => "HASH",
            Self::Code(_) => "CODE",
            Self::Glob(_) => "GLOB",
            Self::Range(_) => "RANGE",
            Self::List(_) => "LIST",
            Self::Flow(_) => "CONTROL",
        }
    }

    /// The scalar this value converts to in scalar context.
    ///
    /// Scalars convert to themselves (aliased); aggregates to their count;
    /// lists to their last element; code and globs to a reference/name.
    #[must_use]
    pub fn pl_scalar(&self) -> Scalar {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::Array(a) => Scalar::from_int(i64::try_from(a.len()).expect("array length fits i64")),
            Self::Hash(h) => Scalar::from_int(i64::try_from(h.len()).expect("hash length fits i64")),
            Self::Code(c) => Scalar::from_payload(ScalarPayload::Ref(RefPayload {
                target: RefTarget::Code(c.clone()),
                blessed: None,
            })),
            Self::Glob(g) => Scalar::from_str_rc(Rc::from(format!("*{}", g.name()))),
            Self::Range(r) => Self::List(range_to_list(r)).pl_scalar(),
            Self::List(l) => l.last_or_undef(),
            Self::Flow(_) => Scalar::undef(),
        }
    }

    /// Flattens this value into list-context scalars.
    #[must_use]
    pub fn pl_list(&self) -> Vec<Scalar> {
        match self {
            Self::Scalar(s) => vec![s.clone()],
            Self::Array(a) => a.elements(),
            Self::Hash(h) => {
                let mut out = Vec::with_capacity(h.len() * 2);
                let keys = h.keys();
                let values = h.values();
                for (k, v) in keys.into_iter().zip(values) {
                    out.push(Scalar::from_str_rc(k));
                    out.push(v);
                }
                out
            }
            Self::Code(_) | Self::Glob(_) => vec![self.pl_scalar()],
            Self::Range(r) => range_to_list(r).scalars(),
            Self::List(l) => l.scalars(),
            Self::Flow(_) => Vec::new(),
        }
    }

    /// An iterator over this value's list-context elements.
    ///
    /// Ranges iterate lazily; everything else materialises.
    #[must_use]
    pub fn pl_iter(&self) -> ValueIter {
        match self {
            Self::Range(r) => match r.as_ref() {
                RangeValue::Int { start, end } => ValueIter::IntRange { next: *start, end: *end },
                RangeValue::Str { start, end } => ValueIter::StrRange {
                    next: Some(start.to_string()),
                    end: end.to_string(),
                },
            },
            other => ValueIter::Scalars(other.pl_list().into_iter()),
        }
    }

    #[must_use]
    pub fn pl_defined(&self) -> bool {
        match self {
            Self::Scalar(s) => s.is_defined(),
            _ => true,
        }
    }

    #[must_use]
    pub fn pl_truthy(&self) -> bool {
        match self {
            Self::Scalar(s) => s.truthy(),
            Self::Array(a) => !a.is_empty(),
            Self::Hash(h) => !h.is_empty(),
            Self::List(l) => l.last_or_undef().truthy(),
            Self::Range(_) | Self::Code(_) | Self::Glob(_) => true,
            Self::Flow(_) => false,
        }
    }

    /// `\expr`: a fresh scalar whose payload points at this value.
    #[must_use]
    pub fn pl_make_ref(&self) -> Scalar {
        let target = match self {
            Self::Scalar(s) => RefTarget::Scalar(s.clone()),
            Self::Array(a) => RefTarget::Array(a.clone()),
            Self::Hash(h) => RefTarget::Hash(h.clone()),
            Self::Code(c) => RefTarget::Code(c.clone()),
            Self::Glob(g) => RefTarget::Glob(g.clone()),
            Self::Range(_) | Self::List(_) | Self::Flow(_) => {
                // \(LIST) distributes in Perl; the compiler handles that
                // shape, so a bare list here refers to its last element.
                RefTarget::Scalar(self.pl_scalar())
            }
        };
        Scalar::from_payload(ScalarPayload::Ref(RefPayload { target, blessed: None }))
    }

    /// The flow marker, if this value is one.
    #[must_use]
    pub fn as_flow(&self) -> Option<&FlowMarker> {
        match self {
            Self::Flow(m) => Some(m),
            _ => None,
        }
    }
}

/// Materialises a range into a list of fresh scalars.
#[must_use]
pub fn range_to_list(range: &RangeValue) -> List {
    let list = List::new();
    match range {
        RangeValue::Int { start, end } => {
            let mut v = *start;
            while v <= *end {
                list.push(Scalar::from_int(v));
                v += 1;
            }
        }
        RangeValue::Str { start, end } => {
            // Perl's magic string range: increment until the endpoint is
            // produced, bailing once the length exceeds the endpoint's.
            let mut cur = start.to_string();
            loop {
                list.push(Scalar::from_string(cur.clone()));
                if cur == **end {
                    break;
                }
                if cur.len() > end.len() {
                    break;
                }
                cur = magic_increment(&cur);
            }
        }
    }
    list
}

/// Iterator state over a value's elements.
#[derive(Debug)]
pub enum ValueIter {
    Scalars(std::vec::IntoIter<Scalar>),
    IntRange { next: i64, end: i64 },
    StrRange { next: Option<String>, end: String },
}

impl Iterator for ValueIter {
    type Item = Scalar;

    fn next(&mut self) -> Option<Scalar> {
        match self {
            Self::Scalars(it) => it.next(),
            Self::IntRange { next, end } => {
                if *next > *end {
                    return None;
                }
                let v = *next;
                *next += 1;
                Some(Scalar::from_int(v))
            }
            Self::StrRange { next, end } => {
                let cur = next.take()?;
                if cur != *end && cur.len() <= end.len() {
                    *next = Some(magic_increment(&cur));
                }
                Some(Scalar::from_string(cur))
            }
        }
    }
}

impl ValueIter {
    /// Non-consuming peek used by the `has-next` opcode.
    #[must_use]
    pub fn has_next(&self) -> bool {
        match self {
            Self::Scalars(it) => it.as_slice().first().is_some(),
            Self::IntRange { next, end } => next <= end,
            Self::StrRange { next, .. } => next.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn scalar_assign_writes_through_shared_cell() {
        let a = Scalar::from_int(1);
        let alias = a.clone();
        a.assign_payload(ScalarPayload::Int(42)).unwrap();
        match alias.payload() {
            ScalarPayload::Int(v) => assert_eq!(v, 42),
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn scalar_copy_detaches() {
        let a = Scalar::from_int(1);
        let b = a.copy();
        a.assign_payload(ScalarPayload::Int(2)).unwrap();
        match b.payload() {
            ScalarPayload::Int(v) => assert_eq!(v, 1),
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn perl_truth_table() {
        assert!(!Scalar::undef().truthy());
        assert!(!Scalar::from_int(0).truthy());
        assert!(!Scalar::from_string("").truthy());
        assert!(!Scalar::from_string("0").truthy());
        assert!(Scalar::from_string("0.0").truthy());
        assert!(Scalar::from_string("00").truthy());
        assert!(Scalar::from_int(-1).truthy());
    }

    #[test]
    fn array_negative_index_and_autoviv() {
        let a = Array::new();
        a.push(Scalar::from_int(10));
        a.push(Scalar::from_int(20));
        match a.get(-1).payload() {
            ScalarPayload::Int(v) => assert_eq!(v, 20),
            other => panic!("expected Int, got {other:?}"),
        }
        let cell = a.elem_lv(4).unwrap();
        assert_eq!(a.len(), 5);
        cell.assign_payload(ScalarPayload::Int(7)).unwrap();
        match a.get(4).payload() {
            ScalarPayload::Int(v) => assert_eq!(v, 7),
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn hash_keys_values_stay_paired() {
        let h = Hash::new();
        for (k, v) in [("one", 1), ("two", 2), ("three", 3)] {
            h.elem_lv(k).assign_payload(ScalarPayload::Int(v)).unwrap();
        }
        let keys = h.keys();
        let values = h.values();
        assert_eq!(keys.len(), values.len());
        for (k, v) in keys.iter().zip(&values) {
            match v.payload() {
                ScalarPayload::Int(n) => match &**k {
                    "one" => assert_eq!(n, 1),
                    "two" => assert_eq!(n, 2),
                    "three" => assert_eq!(n, 3),
                    other => panic!("unexpected key {other}"),
                },
                other => panic!("expected Int, got {other:?}"),
            }
        }
    }

    #[test]
    fn each_cursor_walks_and_resets() {
        let h = Hash::new();
        h.elem_lv("a").assign_payload(ScalarPayload::Int(1)).unwrap();
        h.elem_lv("b").assign_payload(ScalarPayload::Int(2)).unwrap();
        let (k1, _) = h.each_next().unwrap();
        let (k2, _) = h.each_next().unwrap();
        assert_eq!(&*k1, "a");
        assert_eq!(&*k2, "b");
        assert!(h.each_next().is_none());
        // exhausted cursor resets
        let (k1_again, _) = h.each_next().unwrap();
        assert_eq!(&*k1_again, "a");
    }

    #[test]
    fn int_range_iterates_inclusively() {
        let r = RangeValue::Int { start: 1, end: 4 };
        let list = range_to_list(&r);
        let nums: Vec<i64> = list
            .scalars()
            .iter()
            .map(|s| match s.payload() {
                ScalarPayload::Int(v) => v,
                other => panic!("expected Int, got {other:?}"),
            })
            .collect();
        assert_eq!(nums, vec![1, 2, 3, 4]);
    }
}
