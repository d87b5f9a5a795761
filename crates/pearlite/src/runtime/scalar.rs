//! Scalar primitives: numification, stringification, arithmetic, string
//! operators, and `sprintf`.
//!
//! Perl's numeric model is two-tier: integers until an operation overflows
//! or produces a fraction, doubles after. Strings numify by their longest
//! leading numeric prefix; doubles stringify with `%.15g` semantics.

use std::rc::Rc;

use crate::{
    exception::{RunError, RunResult},
    value::{Scalar, ScalarPayload},
};

/// A numified scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumVal {
    Int(i64),
    Float(f64),
}

impl NumVal {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v as i64,
        }
    }

    #[must_use]
    pub fn into_scalar(self) -> Scalar {
        match self {
            Self::Int(v) => Scalar::from_int(v),
            Self::Float(v) => Scalar::from_num(v),
        }
    }
}

/// Numifies a payload: undef is 0, strings use their leading numeric
/// prefix, references numify to their address.
#[must_use]
pub fn numify_payload(payload: &ScalarPayload) -> NumVal {
    match payload {
        ScalarPayload::Undef => NumVal::Int(0),
        ScalarPayload::Int(v) => NumVal::Int(*v),
        ScalarPayload::Num(v) => NumVal::Float(*v),
        ScalarPayload::Str(s) | ScalarPayload::VString(s) => parse_numeric_prefix(s),
        ScalarPayload::Ref(r) => {
            NumVal::Int(i64::try_from(r.target.addr()).unwrap_or(i64::MAX))
        }
        ScalarPayload::Regex(_) | ScalarPayload::Iter(_) | ScalarPayload::Proxy(_) => NumVal::Int(0),
    }
}

#[must_use]
pub fn numify(scalar: &Scalar) -> NumVal {
    numify_payload(&scalar.payload())
}

/// Parses the longest leading numeric prefix, Perl-style: optional
/// whitespace and sign, digits, fraction, exponent. No prefix means 0.
#[must_use]
pub fn parse_numeric_prefix(s: &str) -> NumVal {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - digits_start;
    let mut is_float = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let mut j = i + 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > i + 1 || int_digits > 0 {
            is_float = true;
            i = j;
        }
    }
    if int_digits == 0 && !is_float {
        return NumVal::Int(0);
    }
    // exponent
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            is_float = true;
            i = j;
        }
    }
    let text = &trimmed[..i];
    if is_float {
        NumVal::Float(text.parse::<f64>().unwrap_or(0.0))
    } else {
        match text.parse::<i64>() {
            Ok(v) => NumVal::Int(v),
            // too large for i64: fall back to float like Perl's IV→NV
            Err(_) => NumVal::Float(text.parse::<f64>().unwrap_or(0.0)),
        }
    }
}

/// Stringifies a payload, Perl-style.
#[must_use]
pub fn stringify_payload(payload: &ScalarPayload) -> Rc<str> {
    match payload {
        ScalarPayload::Undef => Rc::from(""),
        ScalarPayload::Int(v) => Rc::from(v.to_string()),
        ScalarPayload::Num(v) => Rc::from(format_g(*v)),
        ScalarPayload::Str(s) | ScalarPayload::VString(s) => Rc::clone(s),
        ScalarPayload::Ref(r) => {
            let tag = r.target.type_tag();
            let addr = r.target.addr();
            match &r.blessed {
                Some(pkg) => Rc::from(format!("{pkg}={tag}({addr:#x})")),
                None => Rc::from(format!("{tag}({addr:#x})")),
            }
        }
        ScalarPayload::Regex(p) => Rc::from(format!("(?^{}:{})", p.flags, p.source)),
        ScalarPayload::Iter(it) => Rc::from(format!("ITER({:p})", Rc::as_ptr(it))),
        ScalarPayload::Proxy(_) => Rc::from(""),
    }
}

#[must_use]
pub fn stringify(scalar: &Scalar) -> Rc<str> {
    stringify_payload(&scalar.payload())
}

/// `%.15g`-style double formatting (Perl's default stringification).
#[must_use]
pub fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf".to_owned() } else { "-Inf".to_owned() };
    }
    if v == 0.0 {
        return "0".to_owned();
    }
    const PREC: i32 = 15;
    let exp = v.abs().log10().floor() as i32;
    if exp < -4 || exp >= PREC {
        // scientific notation with PREC significant digits
        let mantissa_prec = usize::try_from(PREC - 1).expect("precision is positive");
        let formatted = format!("{v:.mantissa_prec$e}");
        let (mantissa, exponent) = formatted.split_once('e').expect("exponential format contains 'e'");
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        let exp_num: i32 = exponent.parse().expect("exponent parses");
        format!("{mantissa}e{}{:02}", if exp_num < 0 { '-' } else { '+' }, exp_num.abs())
    } else {
        let frac = usize::try_from((PREC - 1 - exp).max(0)).expect("fraction digits are non-negative");
        let formatted = format!("{v:.frac$}");
        let trimmed = if formatted.contains('.') {
            formatted.trim_end_matches('0').trim_end_matches('.')
        } else {
            &formatted
        };
        trimmed.to_owned()
    }
}

// ----------------------------------------------------------------------
// Arithmetic
// ----------------------------------------------------------------------

/// Integer-preserving binary arithmetic: stays in `i64` when exact,
/// promotes to `f64` on overflow or mixed operands.
macro_rules! int_preserving {
    ($a:expr, $b:expr, $checked:ident, $float_op:tt) => {
        match ($a, $b) {
            (NumVal::Int(x), NumVal::Int(y)) => match x.$checked(y) {
                Some(v) => NumVal::Int(v),
                None => NumVal::Float((x as f64) $float_op (y as f64)),
            },
            (x, y) => NumVal::Float(x.as_f64() $float_op y.as_f64()),
        }
    };
}

#[must_use]
pub fn add(a: &Scalar, b: &Scalar) -> Scalar {
    int_preserving!(numify(a), numify(b), checked_add, +).into_scalar()
}

#[must_use]
pub fn sub(a: &Scalar, b: &Scalar) -> Scalar {
    int_preserving!(numify(a), numify(b), checked_sub, -).into_scalar()
}

#[must_use]
pub fn mul(a: &Scalar, b: &Scalar) -> Scalar {
    int_preserving!(numify(a), numify(b), checked_mul, *).into_scalar()
}

/// Division is carried out in floats; an exact integral quotient collapses
/// back to an integer so `8 / 2` prints `4`.
pub fn div(a: &Scalar, b: &Scalar) -> RunResult<Scalar> {
    let denominator = numify(b).as_f64();
    if denominator == 0.0 {
        return Err(RunError::msg("Illegal division by zero"));
    }
    let q = numify(a).as_f64() / denominator;
    if q.fract() == 0.0 && q.abs() < 9.007_199_254_740_992e15 {
        Ok(Scalar::from_int(q as i64))
    } else {
        Ok(Scalar::from_num(q))
    }
}

/// Perl `%`: integer modulus whose result takes the sign of the right
/// operand.
pub fn modulo(a: &Scalar, b: &Scalar) -> RunResult<Scalar> {
    let x = numify(a).as_i64();
    let y = numify(b).as_i64();
    if y == 0 {
        return Err(RunError::msg("Illegal modulus zero"));
    }
    let r = x.rem_euclid(y.abs());
    let r = if y < 0 && r != 0 { r - y.abs() } else { r };
    Ok(Scalar::from_int(r))
}

#[must_use]
pub fn pow(a: &Scalar, b: &Scalar) -> Scalar {
    match (numify(a), numify(b)) {
        (NumVal::Int(x), NumVal::Int(y)) if (0..=62).contains(&y) => {
            match u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp)) {
                Some(v) => Scalar::from_int(v),
                None => Scalar::from_num((x as f64).powf(y as f64)),
            }
        }
        (x, y) => Scalar::from_num(x.as_f64().powf(y.as_f64())),
    }
}

#[must_use]
pub fn neg(a: &Scalar) -> Scalar {
    match numify(a) {
        NumVal::Int(v) => match v.checked_neg() {
            Some(n) => Scalar::from_int(n),
            None => Scalar::from_num(-(v as f64)),
        },
        NumVal::Float(v) => Scalar::from_num(-v),
    }
}

/// In-place `+=` family. The target cell's payload is replaced.
pub fn add_assign(target: &Scalar, rhs: &Scalar) -> RunResult<()> {
    target.assign_payload(add(target, rhs).payload())
}

pub fn sub_assign(target: &Scalar, rhs: &Scalar) -> RunResult<()> {
    target.assign_payload(sub(target, rhs).payload())
}

pub fn mul_assign(target: &Scalar, rhs: &Scalar) -> RunResult<()> {
    target.assign_payload(mul(target, rhs).payload())
}

pub fn div_assign(target: &Scalar, rhs: &Scalar) -> RunResult<()> {
    target.assign_payload(div(target, rhs)?.payload())
}

pub fn concat_assign(target: &Scalar, rhs: &Scalar) -> RunResult<()> {
    let joined = format!("{}{}", stringify(target), stringify(rhs));
    target.assign_payload(ScalarPayload::Str(Rc::from(joined)))
}

// ----------------------------------------------------------------------
// Increment / decrement
// ----------------------------------------------------------------------

/// Perl's magic string increment: `"az" → "ba"`, `"a9" → "b0"`,
/// `"Zz" → "AAa"`.
#[must_use]
pub fn magic_increment(s: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    let mut i = chars.len();
    loop {
        if i == 0 {
            // carry off the front: prepend based on the first char's class
            let prefix = match chars.first() {
                Some(c) if c.is_ascii_digit() => '1',
                Some(c) if c.is_ascii_uppercase() => 'A',
                _ => 'a',
            };
            chars.insert(0, prefix);
            break;
        }
        i -= 1;
        match chars[i] {
            'z' => chars[i] = 'a',
            'Z' => chars[i] = 'A',
            '9' => chars[i] = '0',
            c if c.is_ascii_alphanumeric() => {
                chars[i] = char::from(c as u8 + 1);
                break;
            }
            _ => break, // non-alphanumeric: leave as-is (caller filtered)
        }
    }
    chars.into_iter().collect()
}

fn is_magic_incrementable(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut seen_digit = false;
    let mut has_alpha = false;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            if seen_digit {
                return false; // digits may only trail letters
            }
            has_alpha = true;
        } else if c.is_ascii_digit() {
            seen_digit = true;
        } else {
            return false;
        }
    }
    // pure digit strings still take the magic path so "009" becomes "010"
    has_alpha || seen_digit
}

/// `++`: magic string increment when the payload qualifies, numeric
/// otherwise. Undef increments to 1.
pub fn increment(target: &Scalar) -> RunResult<()> {
    let payload = target.payload();
    if let ScalarPayload::Str(s) = &payload {
        if is_magic_incrementable(s) {
            return target.assign_payload(ScalarPayload::Str(Rc::from(magic_increment(s))));
        }
    }
    let next = match numify_payload(&payload) {
        NumVal::Int(v) => match v.checked_add(1) {
            Some(n) => ScalarPayload::Int(n),
            None => ScalarPayload::Num(v as f64 + 1.0),
        },
        NumVal::Float(v) => ScalarPayload::Num(v + 1.0),
    };
    target.assign_payload(next)
}

/// `--` is always numeric.
pub fn decrement(target: &Scalar) -> RunResult<()> {
    let next = match numify(target) {
        NumVal::Int(v) => match v.checked_sub(1) {
            Some(n) => ScalarPayload::Int(n),
            None => ScalarPayload::Num(v as f64 - 1.0),
        },
        NumVal::Float(v) => ScalarPayload::Num(v - 1.0),
    };
    target.assign_payload(next)
}

// ----------------------------------------------------------------------
// Comparison
// ----------------------------------------------------------------------

/// Numeric three-way compare (`<=>`). NaN operands yield undef in Perl;
/// this engine maps them to 0 after an exact-integer fast path.
#[must_use]
pub fn num_cmp(a: &Scalar, b: &Scalar) -> std::cmp::Ordering {
    match (numify(a), numify(b)) {
        (NumVal::Int(x), NumVal::Int(y)) => x.cmp(&y),
        (x, y) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
    }
}

/// String three-way compare (`cmp`).
#[must_use]
pub fn str_cmp(a: &Scalar, b: &Scalar) -> std::cmp::Ordering {
    stringify(a).cmp(&stringify(b))
}

// ----------------------------------------------------------------------
// String operators
// ----------------------------------------------------------------------

#[must_use]
pub fn concat(a: &Scalar, b: &Scalar) -> Scalar {
    Scalar::from_string(format!("{}{}", stringify(a), stringify(b)))
}

/// String repetition (`x`). Negative counts produce the empty string.
#[must_use]
pub fn repeat_str(a: &Scalar, count: &Scalar) -> Scalar {
    let n = numify(count).as_i64();
    if n <= 0 {
        return Scalar::from_string("");
    }
    let n = usize::try_from(n).expect("positive count fits usize");
    Scalar::from_string(stringify(a).repeat(n))
}

// ----------------------------------------------------------------------
// Bitwise (numeric forms use Perl's unsigned-64 semantics)
// ----------------------------------------------------------------------

fn to_u64(s: &Scalar) -> u64 {
    match numify(s) {
        NumVal::Int(v) => v.cast_unsigned(),
        NumVal::Float(v) => {
            if v < 0.0 {
                (v as i64).cast_unsigned()
            } else {
                v as u64
            }
        }
    }
}

#[must_use]
pub fn bit_and(a: &Scalar, b: &Scalar) -> Scalar {
    Scalar::from_int((to_u64(a) & to_u64(b)).cast_signed())
}

#[must_use]
pub fn bit_or(a: &Scalar, b: &Scalar) -> Scalar {
    Scalar::from_int((to_u64(a) | to_u64(b)).cast_signed())
}

#[must_use]
pub fn bit_xor(a: &Scalar, b: &Scalar) -> Scalar {
    Scalar::from_int((to_u64(a) ^ to_u64(b)).cast_signed())
}

#[must_use]
pub fn bit_not(a: &Scalar) -> Scalar {
    Scalar::from_int((!to_u64(a)).cast_signed())
}

#[must_use]
pub fn shift_left(a: &Scalar, b: &Scalar) -> Scalar {
    let by = u32::try_from(numify(b).as_i64().clamp(0, 63)).expect("shift fits u32");
    Scalar::from_int((to_u64(a) << by).cast_signed())
}

#[must_use]
pub fn shift_right(a: &Scalar, b: &Scalar) -> Scalar {
    let by = u32::try_from(numify(b).as_i64().clamp(0, 63)).expect("shift fits u32");
    Scalar::from_int((to_u64(a) >> by).cast_signed())
}

/// Byte-wise string AND: result length is the shorter operand's.
#[must_use]
pub fn bit_and_str(a: &Scalar, b: &Scalar) -> Scalar {
    let x = stringify(a);
    let y = stringify(b);
    let bytes: Vec<u8> = x.bytes().zip(y.bytes()).map(|(p, q)| p & q).collect();
    Scalar::from_string(String::from_utf8_lossy(&bytes).into_owned())
}

/// Byte-wise string OR: result length is the longer operand's.
#[must_use]
pub fn bit_or_str(a: &Scalar, b: &Scalar) -> Scalar {
    bitwise_str_padded(&stringify(a), &stringify(b), |p, q| p | q)
}

/// Byte-wise string XOR: result length is the longer operand's.
#[must_use]
pub fn bit_xor_str(a: &Scalar, b: &Scalar) -> Scalar {
    bitwise_str_padded(&stringify(a), &stringify(b), |p, q| p ^ q)
}

fn bitwise_str_padded(x: &str, y: &str, f: impl Fn(u8, u8) -> u8) -> Scalar {
    let len = x.len().max(y.len());
    let mut bytes = Vec::with_capacity(len);
    for i in 0..len {
        let p = x.as_bytes().get(i).copied().unwrap_or(0);
        let q = y.as_bytes().get(i).copied().unwrap_or(0);
        bytes.push(f(p, q));
    }
    Scalar::from_string(String::from_utf8_lossy(&bytes).into_owned())
}

// ----------------------------------------------------------------------
// Named unaries
// ----------------------------------------------------------------------

/// `chomp`: removes one trailing newline, returning the removed count.
pub fn chomp(target: &Scalar) -> RunResult<Scalar> {
    let s = stringify(target);
    if let Some(stripped) = s.strip_suffix('\n') {
        target.assign_payload(ScalarPayload::Str(Rc::from(stripped)))?;
        Ok(Scalar::from_int(1))
    } else {
        Ok(Scalar::from_int(0))
    }
}

/// `chop`: removes the last character, returning it.
pub fn chop(target: &Scalar) -> RunResult<Scalar> {
    let s = stringify(target);
    match s.char_indices().last() {
        Some((idx, c)) => {
            target.assign_payload(ScalarPayload::Str(Rc::from(&s[..idx])))?;
            Ok(Scalar::from_string(c.to_string()))
        }
        None => Ok(Scalar::from_string("")),
    }
}

#[must_use]
pub fn abs_val(s: &Scalar) -> Scalar {
    match numify(s) {
        NumVal::Int(v) => match v.checked_abs() {
            Some(n) => Scalar::from_int(n),
            None => Scalar::from_num((v as f64).abs()),
        },
        NumVal::Float(v) => Scalar::from_num(v.abs()),
    }
}

#[must_use]
pub fn int_val(s: &Scalar) -> Scalar {
    match numify(s) {
        NumVal::Int(v) => Scalar::from_int(v),
        NumVal::Float(v) => Scalar::from_int(v.trunc() as i64),
    }
}

pub fn sqrt_val(s: &Scalar) -> RunResult<Scalar> {
    let v = numify(s).as_f64();
    if v < 0.0 {
        return Err(RunError::msg(format!("Can't take sqrt of {}", format_g(v))));
    }
    let root = v.sqrt();
    if root.fract() == 0.0 {
        Ok(Scalar::from_int(root as i64))
    } else {
        Ok(Scalar::from_num(root))
    }
}

#[must_use]
pub fn chr_val(s: &Scalar) -> Scalar {
    let code = numify(s).as_i64();
    let c = u32::try_from(code).ok().and_then(char::from_u32).unwrap_or('\u{fffd}');
    Scalar::from_string(c.to_string())
}

#[must_use]
pub fn ord_val(s: &Scalar) -> Scalar {
    let text = stringify(s);
    Scalar::from_int(text.chars().next().map_or(0, |c| i64::from(u32::from(c))))
}

// ----------------------------------------------------------------------
// sprintf
// ----------------------------------------------------------------------

/// `sprintf FORMAT, LIST` with the common conversions:
/// `%% %c %s %d %i %u %o %x %X %e %f %g`, `-`/`+`/`0`/space flags,
/// width and precision.
pub fn sprintf_format(fmt: &str, args: &[Scalar]) -> RunResult<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut next_arg = 0usize;
    let mut take = |next_arg: &mut usize| -> Scalar {
        let v = args.get(*next_arg).cloned().unwrap_or_else(Scalar::undef);
        *next_arg += 1;
        v
    };
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        // flags
        let mut left = false;
        let mut zero = false;
        let mut plus = false;
        let mut space = false;
        while let Some(&f) = chars.peek() {
            match f {
                '-' => left = true,
                '0' => zero = true,
                '+' => plus = true,
                ' ' => space = true,
                _ => break,
            }
            chars.next();
        }
        // width
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        // precision
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }
        let Some(conv) = chars.next() else {
            out.push('%');
            break;
        };
        let rendered = match conv {
            '%' => "%".to_owned(),
            'c' => {
                let v = take(&mut next_arg);
                stringify(&chr_val(&v)).to_string()
            }
            's' => {
                let v = take(&mut next_arg);
                let s = stringify(&v).to_string();
                match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            'd' | 'i' => {
                let v = numify(&take(&mut next_arg)).as_i64();
                let body = v.abs().to_string();
                let sign = if v < 0 {
                    "-"
                } else if plus {
                    "+"
                } else if space {
                    " "
                } else {
                    ""
                };
                format!("{sign}{body}")
            }
            'u' => to_u64(&take(&mut next_arg)).to_string(),
            'o' => format!("{:o}", to_u64(&take(&mut next_arg))),
            'x' => format!("{:x}", to_u64(&take(&mut next_arg))),
            'X' => format!("{:X}", to_u64(&take(&mut next_arg))),
            'e' => {
                let v = numify(&take(&mut next_arg)).as_f64();
                let p = precision.unwrap_or(6);
                let formatted = format!("{v:.p$e}");
                // pad the exponent to two digits, C-style
                match formatted.split_once('e') {
                    Some((m, e)) => {
                        let (sign, digits) = match e.strip_prefix('-') {
                            Some(d) => ('-', d),
                            None => ('+', e),
                        };
                        format!("{m}e{sign}{digits:0>2}")
                    }
                    None => formatted,
                }
            }
            'f' => {
                let v = numify(&take(&mut next_arg)).as_f64();
                let p = precision.unwrap_or(6);
                format!("{v:.p$}")
            }
            'g' => format_g(numify(&take(&mut next_arg)).as_f64()),
            other => return Err(RunError::msg(format!("Invalid conversion in sprintf: \"%{other}\""))),
        };
        let padded = if rendered.len() >= width {
            rendered
        } else if left {
            format!("{rendered:<width$}")
        } else if zero && matches!(conv, 'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'e' | 'f' | 'g') {
            // zero-pad after any sign
            let (sign, body) = match rendered.strip_prefix(['-', '+', ' ']) {
                Some(rest) => (&rendered[..1], rest),
                None => ("", rendered.as_str()),
            };
            let pad = width - rendered.len();
            format!("{sign}{}{body}", "0".repeat(pad))
        } else {
            format!("{rendered:>width$}")
        };
        out.push_str(&padded);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn int(v: i64) -> Scalar {
        Scalar::from_int(v)
    }

    fn s(v: &str) -> Scalar {
        Scalar::from_string(v)
    }

    #[test]
    fn numeric_prefix_parsing() {
        assert_eq!(parse_numeric_prefix("42"), NumVal::Int(42));
        assert_eq!(parse_numeric_prefix("  -7 apples"), NumVal::Int(-7));
        assert_eq!(parse_numeric_prefix("3.5x"), NumVal::Float(3.5));
        assert_eq!(parse_numeric_prefix("1e3"), NumVal::Float(1000.0));
        assert_eq!(parse_numeric_prefix("abc"), NumVal::Int(0));
        assert_eq!(parse_numeric_prefix(""), NumVal::Int(0));
    }

    #[test]
    fn division_collapses_exact_quotients() {
        match div(&int(8), &int(2)).unwrap().payload() {
            ScalarPayload::Int(v) => assert_eq!(v, 4),
            other => panic!("expected Int, got {other:?}"),
        }
        match div(&int(7), &int(2)).unwrap().payload() {
            ScalarPayload::Num(v) => assert_eq!(v, 3.5),
            other => panic!("expected Num, got {other:?}"),
        }
        assert!(div(&int(1), &int(0)).is_err());
    }

    #[test]
    fn modulo_sign_follows_right_operand() {
        assert_eq!(numify(&modulo(&int(-7), &int(3)).unwrap()).as_i64(), 2);
        assert_eq!(numify(&modulo(&int(7), &int(-3)).unwrap()).as_i64(), -2);
        assert_eq!(numify(&modulo(&int(7), &int(3)).unwrap()).as_i64(), 1);
    }

    #[test]
    fn overflow_promotes_to_float() {
        let big = int(i64::MAX);
        match add(&big, &int(1)).payload() {
            ScalarPayload::Num(v) => assert!(v > 9.2e18),
            other => panic!("expected Num, got {other:?}"),
        }
    }

    #[test]
    fn magic_increment_carries() {
        assert_eq!(magic_increment("az"), "ba");
        assert_eq!(magic_increment("a9"), "b0");
        assert_eq!(magic_increment("Zz"), "AAa");
        assert_eq!(magic_increment("zz"), "aaa");
        assert_eq!(magic_increment("a"), "b");
        assert_eq!(magic_increment("Az"), "Ba");
    }

    #[test]
    fn increment_picks_magic_or_numeric() {
        let v = s("aa");
        increment(&v).unwrap();
        assert_eq!(&*stringify(&v), "ab");

        let n = s("009");
        increment(&n).unwrap();
        assert_eq!(&*stringify(&n), "010");

        let f = s("9.5");
        increment(&f).unwrap();
        assert_eq!(&*stringify(&f), "10.5");

        let u = Scalar::undef();
        increment(&u).unwrap();
        assert_eq!(&*stringify(&u), "1");
    }

    #[test]
    fn float_formatting_follows_g() {
        assert_eq!(format_g(0.5), "0.5");
        assert_eq!(format_g(4.0), "4");
        assert_eq!(format_g(0.1), "0.1");
        assert_eq!(format_g(1e20), "1e+20");
        assert_eq!(format_g(1.5e-7), "1.5e-07");
        assert_eq!(format_g(-2.25), "-2.25");
    }

    #[test]
    fn sprintf_common_conversions() {
        let args = [int(42), s("perl"), Scalar::from_num(3.5)];
        assert_eq!(sprintf_format("%d|%s|%g", &args).unwrap(), "42|perl|3.5");
        assert_eq!(sprintf_format("%05d", &[int(42)]).unwrap(), "00042");
        assert_eq!(sprintf_format("%-5d|", &[int(42)]).unwrap(), "42   |");
        assert_eq!(sprintf_format("%x", &[int(255)]).unwrap(), "ff");
        assert_eq!(sprintf_format("%.2f", &[Scalar::from_num(2.5)]).unwrap(), "2.50");
        assert_eq!(sprintf_format("%%", &[]).unwrap(), "%");
        assert_eq!(sprintf_format("%+d", &[int(5)]).unwrap(), "+5");
    }

    #[test]
    fn chomp_and_chop() {
        let v = s("line\n");
        let count = chomp(&v).unwrap();
        assert_eq!(numify(&count).as_i64(), 1);
        assert_eq!(&*stringify(&v), "line");

        let c = chop(&v).unwrap();
        assert_eq!(&*stringify(&c), "e");
        assert_eq!(&*stringify(&v), "lin");
    }

    #[test]
    fn string_bitwise_ops() {
        let a = s("JA");
        let b = s("  ");
        assert_eq!(&*stringify(&bit_or_str(&a, &b)), "ja");
        assert_eq!(&*stringify(&bit_and_str(&s("ja"), &s("__"))), "JA");
    }
}
