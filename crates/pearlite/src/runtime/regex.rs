//! Regex delegates: pattern compilation, `m//`, `s///`, `split`, and the
//! `pos` lvalue proxy.
//!
//! Patterns compile to [`CompiledPattern`] scalars. Plain patterns use the
//! `regex` crate; patterns needing backreferences or lookaround fall back to
//! `fancy-regex`. Compiled patterns are cached per (source, flags) in the
//! global state. Setting `PEARLITE_TRACE_REGEX` logs every compilation.

use std::{cell::RefCell, fmt, rc::Rc, sync::LazyLock};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    exception::{RunError, RunResult},
    runtime::scalar::{numify, stringify},
    state::GlobalState,
    value::{List, LvalueProxy, Scalar, ScalarPayload, Value},
};

/// Verbose regex-compilation tracing, consulted once at first use.
static TRACE_REGEX: LazyLock<bool> = LazyLock::new(|| std::env::var_os("PEARLITE_TRACE_REGEX").is_some());

/// Capture spans for one match: index 0 is the whole match. Most patterns
/// have few groups, so spans stay inline.
#[derive(Debug, Clone)]
pub struct MatchSpans {
    pub groups: SmallVec<[Option<(usize, usize)>; 4]>,
}

impl MatchSpans {
    #[must_use]
    pub fn full(&self) -> (usize, usize) {
        self.groups[0].expect("group 0 is always present")
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len() - 1
    }
}

enum Engine {
    Std(regex::Regex),
    Fancy(fancy_regex::Regex),
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Std(r) => write!(f, "Std({})", r.as_str()),
            Self::Fancy(r) => write!(f, "Fancy({})", r.as_str()),
        }
    }
}

/// A compiled pattern with its original spelling, for `qr//` stringification.
#[derive(Debug)]
pub struct CompiledPattern {
    pub source: Rc<str>,
    /// The `imsx` subset of the flags the pattern was compiled with.
    pub flags: String,
    engine: Engine,
}

impl CompiledPattern {
    /// Finds the first match at or after `start`.
    #[must_use]
    pub fn find_at(&self, text: &str, start: usize) -> Option<MatchSpans> {
        if start > text.len() {
            return None;
        }
        match &self.engine {
            Engine::Std(re) => re.captures_at(text, start).map(|caps| MatchSpans {
                groups: (0..caps.len())
                    .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                    .collect(),
            }),
            Engine::Fancy(re) => match re.captures_from_pos(text, start) {
                Ok(Some(caps)) => Some(MatchSpans {
                    groups: (0..caps.len())
                        .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                        .collect(),
                }),
                Ok(None) => None,
                Err(e) => {
                    log::debug!("fancy-regex runtime failure treated as no-match: {e}");
                    None
                }
            },
        }
    }
}

fn needs_fancy(source: &str) -> bool {
    if source.contains("(?=") || source.contains("(?!") || source.contains("(?<=") || source.contains("(?<!") {
        return true;
    }
    // backreferences \1..\9
    let bytes = source.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes[i + 1].is_ascii_digit() && bytes[i + 1] != b'0' {
                return true;
            }
            i += 2;
            continue;
        }
        i += 1;
    }
    false
}

/// Compiles a pattern with its `imsx` flags.
pub fn compile_pattern(source: &str, flags: &str) -> RunResult<Rc<CompiledPattern>> {
    let inline: String = flags.chars().filter(|c| "imsx".contains(*c)).collect();
    let spelled = if inline.is_empty() {
        source.to_owned()
    } else {
        format!("(?{inline}){source}")
    };
    if *TRACE_REGEX {
        log::debug!("compiling regex /{source}/{flags}");
    }
    let engine = if needs_fancy(source) {
        Engine::Fancy(
            fancy_regex::Regex::new(&spelled)
                .map_err(|e| RunError::msg(format!("Invalid regex /{source}/: {e}")))?,
        )
    } else {
        match regex::Regex::new(&spelled) {
            Ok(re) => Engine::Std(re),
            Err(_) => Engine::Fancy(
                fancy_regex::Regex::new(&spelled)
                    .map_err(|e| RunError::msg(format!("Invalid regex /{source}/: {e}")))?,
            ),
        }
    };
    Ok(Rc::new(CompiledPattern {
        source: Rc::from(source),
        flags: inline,
        engine,
    }))
}

/// Resolves the pattern operand of a match: a `qr//` scalar is used as-is,
/// anything else stringifies and compiles through the state's cache.
pub fn pattern_for(state: &mut GlobalState, pattern: &Scalar, flags: &str) -> RunResult<Rc<CompiledPattern>> {
    if let ScalarPayload::Regex(p) = pattern.payload() {
        return Ok(p);
    }
    let source = stringify(pattern);
    state.cached_pattern(&source, flags, compile_pattern)
}

/// The next char boundary strictly after `at` (or one past the end).
fn next_boundary(text: &str, at: usize) -> usize {
    let mut next = at + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next
}

fn group_text(text: &str, span: Option<(usize, usize)>) -> Scalar {
    match span {
        Some((s, e)) => Scalar::from_string(&text[s..e]),
        None => Scalar::undef(),
    }
}

/// `target =~ m/pattern/flags`.
///
/// Returns a boolean scalar, or in list context a list of capture-group
/// strings (all matches' groups under `/g`).
pub fn regex_match(
    state: &mut GlobalState,
    target: &Scalar,
    pattern: &Scalar,
    flags: &str,
    want_list: bool,
) -> RunResult<Value> {
    let compiled = pattern_for(state, pattern, flags)?;
    let text = stringify(target).to_string();
    let global = flags.contains('g');

    if global && want_list {
        let out = List::new();
        let mut at = 0;
        let mut last: Option<MatchSpans> = None;
        while let Some(spans) = compiled.find_at(&text, at) {
            let (start, end) = spans.full();
            if spans.group_count() == 0 {
                out.push(Scalar::from_string(&text[start..end]));
            } else {
                for g in &spans.groups[1..] {
                    out.push(group_text(&text, *g));
                }
            }
            last = Some(spans);
            // avoid sticking on a zero-width match
            at = if end == start { next_boundary(&text, end) } else { end };
        }
        if let Some(spans) = last {
            state.set_match_captures(&text, &spans);
        }
        return Ok(Value::List(out));
    }

    let start = if global { state.pos_get(target).unwrap_or(0) } else { 0 };
    match compiled.find_at(&text, start) {
        Some(spans) => {
            if global {
                state.pos_set(target, Some(spans.full().1));
            }
            state.set_match_captures(&text, &spans);
            if want_list && spans.group_count() > 0 {
                let out = List::new();
                for g in &spans.groups[1..] {
                    out.push(group_text(&text, *g));
                }
                Ok(Value::List(out))
            } else {
                Ok(Value::Scalar(Scalar::from_bool(true)))
            }
        }
        None => {
            if global {
                state.pos_set(target, None);
            }
            if want_list {
                Ok(Value::List(List::new()))
            } else {
                Ok(Value::Scalar(Scalar::from_bool(false)))
            }
        }
    }
}

/// Expands `$1`/`\1`-style references in an `s///` replacement template.
fn expand_replacement(template: &str, text: &str, spans: &MatchSpans) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        let lead = match c {
            '$' | '\\' => c,
            _ => {
                out.push(c);
                continue;
            }
        };
        match chars.peek() {
            Some(&d) if d.is_ascii_digit() && d != '0' => {
                chars.next();
                let idx = d.to_digit(10).expect("digit parses") as usize;
                if let Some(span) = spans.groups.get(idx).copied().flatten() {
                    out.push_str(&text[span.0..span.1]);
                }
            }
            Some('&') if lead == '$' => {
                chars.next();
                let (s, e) = spans.full();
                out.push_str(&text[s..e]);
            }
            _ => out.push(lead),
        }
    }
    out
}

/// `target =~ s/pattern/replacement/flags`.
///
/// Mutates the target in place and returns the replacement count; under
/// `/r` the target is untouched and the modified string is returned.
pub fn regex_replace(
    state: &mut GlobalState,
    target: &Scalar,
    pattern: &Scalar,
    replacement: &Scalar,
    flags: &str,
) -> RunResult<Value> {
    let compiled = pattern_for(state, pattern, flags)?;
    let text = stringify(target).to_string();
    let template = stringify(replacement).to_string();
    let global = flags.contains('g');
    let nondestructive = flags.contains('r');

    let mut out = String::with_capacity(text.len());
    let mut at = 0;
    let mut count = 0i64;
    while let Some(spans) = compiled.find_at(&text, at) {
        let (start, end) = spans.full();
        out.push_str(&text[at..start]);
        out.push_str(&expand_replacement(&template, &text, &spans));
        state.set_match_captures(&text, &spans);
        count += 1;
        at = if end == start {
            let next = next_boundary(&text, end);
            out.push_str(&text[end..next.min(text.len())]);
            next
        } else {
            end
        };
        if !global {
            break;
        }
    }
    if at <= text.len() {
        out.push_str(&text[at.min(text.len())..]);
    }

    if nondestructive {
        return Ok(Value::Scalar(Scalar::from_string(out)));
    }
    if count > 0 {
        target.assign_payload(ScalarPayload::Str(Rc::from(out)))?;
    }
    Ok(Value::Scalar(Scalar::from_int(count)))
}

/// `split /pattern/, target, limit`.
///
/// A literal single-space pattern takes the awk path: leading whitespace is
/// stripped and fields split on runs of whitespace. `limit > 0` caps the
/// field count; `limit <= 0` trims trailing empty fields.
pub fn regex_split(state: &mut GlobalState, pattern: &Scalar, target: &Scalar, limit: i64) -> RunResult<List> {
    let text = stringify(target).to_string();
    let out = List::new();

    let awk_mode = matches!(pattern.payload(), ScalarPayload::Str(ref s) if &**s == " ");
    if awk_mode {
        let mut fields: Vec<&str> = text.split_whitespace().collect();
        if limit > 0 {
            let cap = usize::try_from(limit).expect("positive limit fits usize");
            if fields.len() > cap {
                // rejoin the tail into the final field starting at its
                // original offset
                let tail_start = {
                    let consumed: Vec<&str> = fields.iter().take(cap - 1).copied().collect();
                    let mut search_from = 0;
                    for f in consumed {
                        let found = text[search_from..].find(f).expect("field comes from text");
                        search_from += found + f.len();
                    }
                    let rest = &text[search_from..];
                    search_from + (rest.len() - rest.trim_start().len())
                };
                fields.truncate(cap - 1);
                fields.push(&text[tail_start..]);
            }
        }
        for f in fields {
            out.push(Scalar::from_string(f));
        }
        return Ok(out);
    }

    let compiled = pattern_for(state, pattern, "")?;
    let mut at = 0;
    let mut fields: Vec<String> = Vec::new();
    while at <= text.len() {
        if limit > 0 && fields.len() + 1 == usize::try_from(limit).expect("positive limit fits usize") {
            break;
        }
        match compiled.find_at(&text, at) {
            Some(spans) => {
                let (start, end) = spans.full();
                if end == start {
                    // zero-width separator splits between characters
                    if start >= text.len() {
                        break;
                    }
                    let mut next = start + 1;
                    while !text.is_char_boundary(next) {
                        next += 1;
                    }
                    fields.push(text[at..next].to_owned());
                    at = next;
                } else {
                    fields.push(text[at..start].to_owned());
                    at = end;
                }
            }
            None => break,
        }
    }
    fields.push(text[at.min(text.len())..].to_owned());
    if limit <= 0 {
        while fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }
    }
    for f in fields {
        out.push(Scalar::from_string(f));
    }
    Ok(out)
}

/// The lvalue proxy behind `pos($x)`.
#[derive(Debug)]
struct PosProxy {
    target_addr: usize,
    table: Rc<RefCell<AHashMap<usize, usize>>>,
}

impl LvalueProxy for PosProxy {
    fn get(&self) -> ScalarPayload {
        match self.table.borrow().get(&self.target_addr) {
            Some(&pos) => ScalarPayload::Int(i64::try_from(pos).expect("pos fits i64")),
            None => ScalarPayload::Undef,
        }
    }

    fn set(&self, payload: ScalarPayload) -> RunResult<()> {
        let mut table = self.table.borrow_mut();
        match payload {
            ScalarPayload::Undef => {
                table.remove(&self.target_addr);
            }
            other => {
                let pos = numify(&Scalar::from_payload(other)).as_i64();
                table.insert(self.target_addr, usize::try_from(pos.max(0)).expect("pos fits usize"));
            }
        }
        Ok(())
    }
}

/// Builds the `pos($x)` proxy scalar for a target.
#[must_use]
pub fn pos_proxy(state: &GlobalState, target: &Scalar) -> Scalar {
    Scalar::from_payload(ScalarPayload::Proxy(Rc::new(PosProxy {
        target_addr: target.addr(),
        table: state.pos_table(),
    })))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn std_and_fancy_selection() {
        let plain = compile_pattern("a+b", "").unwrap();
        assert!(matches!(plain.engine, Engine::Std(_)));
        let back = compile_pattern(r"(\w)\1", "").unwrap();
        assert!(matches!(back.engine, Engine::Fancy(_)));
        let look = compile_pattern("foo(?=bar)", "").unwrap();
        assert!(matches!(look.engine, Engine::Fancy(_)));
    }

    #[test]
    fn find_at_reports_group_spans() {
        let p = compile_pattern("(a)(b)?", "").unwrap();
        let spans = p.find_at("xab", 0).unwrap();
        assert_eq!(spans.full(), (1, 3));
        assert_eq!(spans.groups[1], Some((1, 2)));
        assert_eq!(spans.groups[2], Some((2, 3)));
        let spans = p.find_at("xa", 0).unwrap();
        assert_eq!(spans.groups[2], None);
    }

    #[test]
    fn replacement_expansion() {
        let p = compile_pattern("(\\w+)@(\\w+)", "").unwrap();
        let text = "user@host";
        let spans = p.find_at(text, 0).unwrap();
        assert_eq!(expand_replacement("$2:$1", text, &spans), "host:user");
        assert_eq!(expand_replacement("[$&]", text, &spans), "[user@host]");
        assert_eq!(expand_replacement("\\1", text, &spans), "user");
    }

    #[test]
    fn case_insensitive_flag() {
        let p = compile_pattern("perl", "i").unwrap();
        assert!(p.find_at("PERL", 0).is_some());
    }
}
