//! Call resolution and invocation: subs, methods, sort comparators, and
//! `eval STRING`.

use std::rc::Rc;

use crate::{
    exception::{RunError, RunResult},
    runtime::{
        refs::{self, deref_code},
        scalar::{numify, stringify},
    },
    tracer::ExecTracer,
    value::{Array, Code, Scalar, ScalarPayload, Value},
};

use super::Vm;

/// Hard backstop before the host stack would overflow.
const MAX_CALL_DEPTH: usize = 4000;

impl<T: ExecTracer> Vm<'_, T> {
    /// Resolves a callable register value: a code value, a code reference,
    /// or (symbolically) a sub name.
    pub(super) fn resolve_callable(&mut self, value: &Value) -> RunResult<Code> {
        match value {
            Value::Code(code) => Ok(code.clone()),
            Value::Scalar(s) => match s.payload() {
                ScalarPayload::Ref(_) => deref_code(s, self.state, true),
                ScalarPayload::Str(name) => {
                    let package = self.state.current_package();
                    let qualified = refs::qualify(&name, &package);
                    self.state
                        .get_code(&qualified)
                        .ok_or_else(|| RunError::msg(format!("Undefined subroutine &{qualified} called")))
                }
                _ => Err(RunError::msg("Not a CODE reference")),
            },
            Value::Glob(glob) => glob
                .code()
                .ok_or_else(|| RunError::msg(format!("Undefined subroutine &{} called", glob.name()))),
            other => Err(RunError::msg(format!(
                "Not a CODE reference ({} value)",
                other.kind_name()
            ))),
        }
    }

    /// Invokes a code value with an already-built argument array.
    ///
    /// Markers returned by the callee pass through untouched; the CallSub
    /// dispatch arm decides whether an enclosing loop consumes them.
    pub(super) fn call_code(
        &mut self,
        code: &Code,
        args: Array,
        ctx_tag: i64,
        call_line: u32,
    ) -> RunResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RunError::msg("Deep recursion; call stack exhausted"));
        }
        self.depth += 1;
        let result = self.run_unit(&code.value().unit.clone(), Some(code.clone()), args, ctx_tag, call_line);
        self.depth -= 1;
        result
    }

    /// Method dispatch: resolve the package, walk `@ISA`, prepend the
    /// invocant, and call.
    pub(super) fn call_method(
        &mut self,
        invocant: &Scalar,
        method: &str,
        args: &[Scalar],
        ctx_tag: i64,
        compile_package: &str,
        call_line: u32,
    ) -> RunResult<Value> {
        let (search_name, packages): (&str, Vec<Rc<str>>) = match method.strip_prefix("SUPER::") {
            Some(bare) => {
                // SUPER:: starts from the *compile* package's parents
                let parents = self
                    .state
                    .get_array(&format!("{compile_package}::ISA"))
                    .elements()
                    .iter()
                    .map(|p| stringify(p))
                    .collect();
                (bare, parents)
            }
            None => {
                let package = refs::invocant_package(self.state, invocant).ok_or_else(|| {
                    RunError::msg(format!(
                        "Can't call method \"{method}\" on unblessed reference"
                    ))
                })?;
                (method, vec![package])
            }
        };
        let resolved = packages
            .iter()
            .find_map(|pkg| refs::resolve_method(self.state, pkg, search_name));
        let code = match resolved {
            Some(code) => code,
            // UNIVERSAL fallbacks
            None if search_name == "isa" => {
                let class = args.first().map(stringify).unwrap_or_default();
                return Ok(Value::Scalar(Scalar::from_bool(refs::isa_check(
                    self.state, invocant, &class,
                ))));
            }
            None if search_name == "can" => {
                let method_name = args.first().map(stringify).unwrap_or_default();
                let found = refs::invocant_package(self.state, invocant)
                    .and_then(|pkg| refs::resolve_method(self.state, &pkg, &method_name));
                return Ok(match found {
                    Some(code) => Value::Scalar(Value::Code(code).pl_make_ref()),
                    None => Value::undef(),
                });
            }
            None => {
                let pkg = packages.first().map_or_else(|| "main".to_owned(), ToString::to_string);
                return Err(RunError::msg(format!(
                    "Can't locate object method \"{search_name}\" via package \"{pkg}\""
                )));
            }
        };
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(invocant.clone());
        full_args.extend(args.iter().cloned());
        self.call_code(&code, Array::from_scalars(full_args), ctx_tag, call_line)
    }

    /// `sort` with an optional comparator code value.
    ///
    /// The comparator sees its operands through the `$a`/`$b` globals,
    /// alias-swapped around each comparison.
    pub(super) fn sort_list(&mut self, comparator: Option<Code>, values: Vec<Scalar>, call_line: u32) -> RunResult<Vec<Scalar>> {
        let mut out = values;
        match comparator {
            None => {
                out.sort_by(|a, b| stringify(a).cmp(&stringify(b)));
                Ok(out)
            }
            Some(code) => {
                let glob_a = self.state.glob("main::a");
                let glob_b = self.state.glob("main::b");
                let saved_a = glob_a.swap_scalar(Scalar::undef());
                let saved_b = glob_b.swap_scalar(Scalar::undef());
                let mut failure: Option<RunError> = None;
                out.sort_by(|x, y| {
                    if failure.is_some() {
                        return std::cmp::Ordering::Equal;
                    }
                    let _ = glob_a.swap_scalar(x.clone());
                    let _ = glob_b.swap_scalar(y.clone());
                    match self.call_code(&code, Array::from_scalars(Vec::new()), 1, call_line) {
                        Ok(result) => {
                            let ordering = numify(&result.pl_scalar()).as_i64();
                            ordering.cmp(&0)
                        }
                        Err(e) => {
                            failure = Some(e);
                            std::cmp::Ordering::Equal
                        }
                    }
                });
                let _ = glob_a.swap_scalar(saved_a);
                let _ = glob_b.swap_scalar(saved_b);
                match failure {
                    Some(e) => Err(e),
                    None => Ok(out),
                }
            }
        }
    }

    /// `eval STRING`: parse through the host hook, compile with the
    /// enclosing unit's pragma snapshot, run under an implicit handler.
    pub(super) fn eval_string(
        &mut self,
        source: &Scalar,
        pragma: &crate::ast::PragmaSnapshot,
        ctx_tag: i64,
        call_line: u32,
    ) -> RunResult<Value> {
        let text = stringify(source);
        let Some(parsed) = self.state.parse_eval_string(&text, pragma) else {
            return Err(RunError::msg("eval STRING requires a host parser hook"));
        };
        let files = crate::ast::SourceFiles::new(vec!["(eval)".to_owned()]);
        let outcome = match parsed {
            Ok(node) => match crate::compiler::compile(&node, pragma, &files) {
                Ok(unit) => self.run_unit(&unit, None, Array::from_scalars(Vec::new()), ctx_tag, call_line),
                Err(ce) => Err(RunError::msg(ce.message).with_location(Rc::from("(eval)"), ce.pos.line)),
            },
            Err(ce) => Err(RunError::msg(ce.message)),
        };
        match outcome {
            Ok(value) => {
                self.state.clear_error()?;
                Ok(value)
            }
            Err(e) => {
                let error_value = e.into_error_scalar();
                self.state.error_scalar().set_payload(error_value.raw_payload());
                Ok(Value::undef())
            }
        }
    }
}
