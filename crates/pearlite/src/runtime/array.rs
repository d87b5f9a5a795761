//! Array primitives invoked by the aggregate opcodes.

use crate::{
    exception::RunResult,
    runtime::scalar::numify,
    value::{Array, Scalar},
};

/// `@a[...]` rvalue slice: one output element per index, no
/// autovivification.
#[must_use]
pub fn slice(array: &Array, indices: &[Scalar]) -> Vec<Scalar> {
    indices.iter().map(|idx| array.get(numify(idx).as_i64())).collect()
}

/// `@a[...] = LIST`: element-wise copy-assign, extending as needed.
/// Surplus indices get undef values, as in Perl.
pub fn slice_set(array: &Array, indices: &[Scalar], values: &[Scalar]) -> RunResult<()> {
    for (i, idx) in indices.iter().enumerate() {
        if let Some(cell) = array.elem_lv(numify(idx).as_i64()) {
            match values.get(i) {
                Some(v) => cell.assign_from(v)?,
                None => cell.assign_payload(crate::value::ScalarPayload::Undef)?,
            }
        }
    }
    Ok(())
}

/// List repetition: `(LIST) x N` copies the flattened elements N times.
#[must_use]
pub fn repeat_list(elements: &[Scalar], count: i64) -> Vec<Scalar> {
    if count <= 0 {
        return Vec::new();
    }
    let count = usize::try_from(count).expect("positive count fits usize");
    let mut out = Vec::with_capacity(elements.len() * count);
    for _ in 0..count {
        out.extend(elements.iter().map(Scalar::copy));
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::scalar::stringify;
    use crate::value::ScalarPayload;

    fn array_of(values: &[i64]) -> Array {
        Array::from_scalars(values.iter().map(|&v| Scalar::from_int(v)).collect())
    }

    #[test]
    fn slice_reads_without_extending() {
        let a = array_of(&[10, 20, 30]);
        let out = slice(&a, &[Scalar::from_int(2), Scalar::from_int(9)]);
        assert_eq!(&*stringify(&out[0]), "30");
        assert!(!out[1].is_defined());
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn slice_set_extends_and_assigns() {
        let a = array_of(&[1]);
        slice_set(
            &a,
            &[Scalar::from_int(0), Scalar::from_int(3)],
            &[Scalar::from_int(7), Scalar::from_int(8)],
        )
        .unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(&*stringify(&a.get(0)), "7");
        assert_eq!(&*stringify(&a.get(3)), "8");
        assert!(!a.get(2).is_defined());
    }

    #[test]
    fn repeat_copies_detached() {
        let elems = vec![Scalar::from_int(1), Scalar::from_int(2)];
        let out = repeat_list(&elems, 2);
        assert_eq!(out.len(), 4);
        out[0].assign_payload(ScalarPayload::Int(99)).unwrap();
        assert_eq!(&*stringify(&elems[0]), "1");
        assert_eq!(repeat_list(&elems, 0).len(), 0);
    }
}
