//! `eval` handler bookkeeping and exception unwinding.
//!
//! Each invocation keeps its own stack of registered catch points. On a
//! throw, the innermost handler wins: the dynamic-variable stack is popped
//! to the level captured at `EvalTry`, `$@` receives the formatted error
//! value, and execution resumes at the catch pc. With no handler, the
//! error propagates to the caller.

use crate::{
    bytecode::code::CodeUnit,
    exception::RunError,
    state::GlobalState,
};

/// One registered `eval` handler.
#[derive(Debug, Clone, Copy)]
pub(super) struct Handler {
    /// Where the runtime resumes after populating `$@`.
    pub catch_pc: usize,
    /// Dynamic-stack watermark at `EvalTry`; restored before resuming so
    /// `local`s made inside the block unwind.
    pub dyn_level: usize,
}

/// Attaches the raise location and either resumes at a handler or reports
/// the error for propagation.
pub(super) fn catch_or_propagate(
    state: &mut GlobalState,
    unit: &CodeUnit,
    handlers: &mut Vec<Handler>,
    error: RunError,
    pc: usize,
) -> Result<usize, RunError> {
    let located = error.with_location(unit.source_name.clone(), unit.line_for_pc(pc));
    match handlers.pop() {
        Some(handler) => {
            state.pop_to_level(handler.dyn_level);
            let error_value = located.into_error_scalar();
            state.error_scalar().set_payload(error_value.raw_payload());
            Ok(handler.catch_pc)
        }
        None => Err(located),
    }
}
