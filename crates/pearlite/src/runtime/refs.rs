//! Reference primitives: dereference, `bless`, `ref`, and `@ISA`-aware
//! method resolution.

use std::rc::Rc;

use crate::{
    exception::{RunError, RunResult},
    runtime::scalar::stringify,
    state::GlobalState,
    value::{Array, Code, Glob, Hash, RefTarget, Scalar, ScalarPayload},
};

/// Qualifies an unqualified name into `package::name`.
#[must_use]
pub fn qualify(name: &str, package: &str) -> String {
    if name.contains("::") {
        name.to_owned()
    } else {
        format!("{package}::{name}")
    }
}

fn not_a_ref(kind: &str, payload: &ScalarPayload) -> RunError {
    match payload {
        ScalarPayload::Undef => RunError::msg(format!("Can't use an undefined value as {kind} reference")),
        ScalarPayload::Str(s) => RunError::msg(format!(
            "Can't use string (\"{s}\") as {kind} ref while \"strict refs\" in use"
        )),
        _ => RunError::msg(format!("Not {kind} reference")),
    }
}

/// Strict scalar dereference: dies on anything but a scalar reference.
pub fn deref_scalar_strict(s: &Scalar) -> RunResult<Scalar> {
    match s.payload() {
        ScalarPayload::Ref(r) => match r.target {
            RefTarget::Scalar(inner) => Ok(inner),
            _ => Err(RunError::msg("Not a SCALAR reference")),
        },
        other => Err(not_a_ref("a SCALAR", &other)),
    }
}

/// Non-strict scalar dereference: a string payload is a symbolic lookup in
/// the current package.
pub fn deref_scalar_symbolic(s: &Scalar, state: &mut GlobalState) -> RunResult<Scalar> {
    match s.payload() {
        ScalarPayload::Ref(r) => match r.target {
            RefTarget::Scalar(inner) => Ok(inner),
            _ => Err(RunError::msg("Not a SCALAR reference")),
        },
        ScalarPayload::Str(name) => {
            let package = state.current_package();
            Ok(state.get_scalar(&qualify(&name, &package)))
        }
        other => Err(not_a_ref("a SCALAR", &other)),
    }
}

pub fn deref_array(s: &Scalar, state: &mut GlobalState, strict_refs: bool) -> RunResult<Array> {
    match s.payload() {
        ScalarPayload::Ref(r) => match r.target {
            RefTarget::Array(a) => Ok(a),
            _ => Err(RunError::msg("Not an ARRAY reference")),
        },
        ScalarPayload::Str(name) if !strict_refs => {
            let package = state.current_package();
            Ok(state.get_array(&qualify(&name, &package)))
        }
        other => Err(not_a_ref("an ARRAY", &other)),
    }
}

pub fn deref_hash(s: &Scalar, state: &mut GlobalState, strict_refs: bool) -> RunResult<Hash> {
    match s.payload() {
        ScalarPayload::Ref(r) => match r.target {
            RefTarget::Hash(h) => Ok(h),
            _ => Err(RunError::msg("Not a HASH reference")),
        },
        ScalarPayload::Str(name) if !strict_refs => {
            let package = state.current_package();
            Ok(state.get_hash(&qualify(&name, &package)))
        }
        other => Err(not_a_ref("a HASH", &other)),
    }
}

pub fn deref_code(s: &Scalar, state: &mut GlobalState, strict_refs: bool) -> RunResult<Code> {
    match s.payload() {
        ScalarPayload::Ref(r) => match r.target {
            RefTarget::Code(c) => Ok(c),
            _ => Err(RunError::msg("Not a CODE reference")),
        },
        ScalarPayload::Str(name) if !strict_refs => {
            let package = state.current_package();
            state
                .get_code(&qualify(&name, &package))
                .ok_or_else(|| RunError::msg(format!("Undefined subroutine &{name} called")))
        }
        other => Err(not_a_ref("a CODE", &other)),
    }
}

pub fn deref_glob(s: &Scalar, state: &mut GlobalState, strict_refs: bool) -> RunResult<Glob> {
    match s.payload() {
        ScalarPayload::Ref(r) => match r.target {
            RefTarget::Glob(g) => Ok(g),
            _ => Err(RunError::msg("Not a GLOB reference")),
        },
        ScalarPayload::Str(name) if !strict_refs => {
            let package = state.current_package();
            Ok(state.glob(&qualify(&name, &package)))
        }
        other => Err(not_a_ref("a GLOB", &other)),
    }
}

/// `bless REF, PACKAGE`: marks the referent. The package is recorded both
/// on this reference scalar (fast path) and in the state's referent table
/// so independently created references observe the blessing too.
pub fn bless_ref(state: &mut GlobalState, reference: &Scalar, package: &str) -> RunResult<()> {
    match reference.payload() {
        ScalarPayload::Ref(mut r) => {
            let pkg: Rc<str> = Rc::from(package);
            state.set_blessing(r.target.addr(), Rc::clone(&pkg));
            r.blessed = Some(pkg);
            reference.assign_payload(ScalarPayload::Ref(r))
        }
        _ => Err(RunError::msg("Can't bless non-reference value")),
    }
}

/// `ref EXPR`: empty string for non-references, the bless package for
/// blessed referents, the type tag otherwise.
#[must_use]
pub fn ref_type(state: &GlobalState, s: &Scalar) -> Scalar {
    match s.payload() {
        ScalarPayload::Ref(r) => {
            if let Some(pkg) = &r.blessed {
                return Scalar::from_str_rc(Rc::clone(pkg));
            }
            if let Some(pkg) = state.blessing(r.target.addr()) {
                return Scalar::from_str_rc(pkg);
            }
            Scalar::from_string(r.target.type_tag())
        }
        ScalarPayload::Regex(_) => Scalar::from_string("Regexp"),
        _ => Scalar::from_string(""),
    }
}

/// The package an invocant dispatches through: the bless package of a
/// reference, or the string itself for a class-name invocant.
#[must_use]
pub fn invocant_package(state: &GlobalState, invocant: &Scalar) -> Option<Rc<str>> {
    match invocant.payload() {
        ScalarPayload::Ref(r) => r
            .blessed
            .clone()
            .or_else(|| state.blessing(r.target.addr())),
        ScalarPayload::Str(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// `UNIVERSAL::isa` semantics: depth-first walk of `@ISA`.
#[must_use]
pub fn isa_check(state: &mut GlobalState, invocant: &Scalar, class: &str) -> bool {
    // unblessed references answer for their type tag
    if let Some(r) = invocant.ref_payload() {
        if r.blessed.is_none() && state.blessing(r.target.addr()).is_none() {
            return r.target.type_tag() == class;
        }
    }
    let Some(start) = invocant_package(state, invocant) else {
        return false;
    };
    let mut seen = ahash::AHashSet::new();
    isa_walk(state, &start, class, &mut seen)
}

fn isa_walk(state: &mut GlobalState, package: &str, class: &str, seen: &mut ahash::AHashSet<Rc<str>>) -> bool {
    if package == class {
        return true;
    }
    let pkg: Rc<str> = Rc::from(package);
    if !seen.insert(pkg) {
        return false;
    }
    let parents = state.get_array(&format!("{package}::ISA")).elements();
    for parent in parents {
        let parent_name = stringify(&parent);
        if isa_walk(state, &parent_name, class, seen) {
            return true;
        }
    }
    false
}

/// Method resolution: `package::name`, then `@ISA` depth-first.
#[must_use]
pub fn resolve_method(state: &mut GlobalState, package: &str, name: &str) -> Option<Code> {
    let mut seen = ahash::AHashSet::new();
    resolve_method_walk(state, package, name, &mut seen)
}

fn resolve_method_walk(
    state: &mut GlobalState,
    package: &str,
    name: &str,
    seen: &mut ahash::AHashSet<Rc<str>>,
) -> Option<Code> {
    let pkg: Rc<str> = Rc::from(package);
    if !seen.insert(pkg) {
        return None;
    }
    if let Some(code) = state.get_code(&format!("{package}::{name}")) {
        return Some(code);
    }
    let parents = state.get_array(&format!("{package}::ISA")).elements();
    for parent in parents {
        let parent_name = stringify(&parent);
        if let Some(code) = resolve_method_walk(state, &parent_name, name, seen) {
            return Some(code);
        }
    }
    None
}
