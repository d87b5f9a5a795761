//! Hash primitives invoked by the aggregate opcodes.

use crate::{
    exception::RunResult,
    runtime::scalar::stringify,
    value::{Hash, Scalar, ScalarPayload},
};

/// `@h{...}` rvalue slice: one value per key, undef for absent keys,
/// no autovivification.
#[must_use]
pub fn slice(hash: &Hash, keys: &[Scalar]) -> Vec<Scalar> {
    keys.iter().map(|k| hash.get(&stringify(k))).collect()
}

/// `@h{...} = LIST`: element-wise copy-assign through autovivified slots.
pub fn slice_set(hash: &Hash, keys: &[Scalar], values: &[Scalar]) -> RunResult<()> {
    for (i, key) in keys.iter().enumerate() {
        let cell = hash.elem_lv(&stringify(key));
        match values.get(i) {
            Some(v) => cell.assign_from(v)?,
            None => cell.assign_payload(ScalarPayload::Undef)?,
        }
    }
    Ok(())
}

/// `delete @h{...}`: removes each key, yielding the removed values.
/// Absent keys yield undef, consistent with scalar `delete`.
#[must_use]
pub fn slice_delete(hash: &Hash, keys: &[Scalar]) -> Vec<Scalar> {
    keys.iter()
        .map(|k| hash.delete(&stringify(k)).unwrap_or_else(Scalar::undef))
        .collect()
}

/// `%h{...}` key/value slice: `key, value` pairs for each requested key.
#[must_use]
pub fn kv_slice(hash: &Hash, keys: &[Scalar]) -> Vec<Scalar> {
    let mut out = Vec::with_capacity(keys.len() * 2);
    for k in keys {
        let key = stringify(k);
        out.push(Scalar::from_str_rc(key.clone()));
        out.push(hash.get(&key));
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> Hash {
        let h = Hash::new();
        h.elem_lv("a").assign_payload(ScalarPayload::Int(1)).unwrap();
        h.elem_lv("b").assign_payload(ScalarPayload::Int(2)).unwrap();
        h
    }

    fn key(s: &str) -> Scalar {
        Scalar::from_string(s)
    }

    #[test]
    fn slice_does_not_autovivify() {
        let h = sample();
        let out = slice(&h, &[key("a"), key("missing")]);
        assert_eq!(&*stringify(&out[0]), "1");
        assert!(!out[1].is_defined());
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn slice_delete_yields_undef_for_absent() {
        let h = sample();
        let out = slice_delete(&h, &[key("b"), key("nope")]);
        assert_eq!(&*stringify(&out[0]), "2");
        assert!(!out[1].is_defined());
        assert_eq!(h.len(), 1);
        assert!(!h.exists("b"));
    }

    #[test]
    fn kv_slice_pairs_up() {
        let h = sample();
        let out = kv_slice(&h, &[key("b")]);
        assert_eq!(out.len(), 2);
        assert_eq!(&*stringify(&out[0]), "b");
        assert_eq!(&*stringify(&out[1]), "2");
    }
}
