//! Execution tracing hooks.
//!
//! Embedders implement [`ExecTracer`] to observe dispatch and calls; the
//! default [`NoopTracer`] compiles away entirely since the interpreter is
//! generic over the tracer type.

use crate::bytecode::op::Opcode;

/// Observer for interpreter events.
pub trait ExecTracer {
    /// Called before each opcode dispatch.
    fn on_opcode(&mut self, pc: usize, op: Opcode) {
        let _ = (pc, op);
    }

    /// Called when a sub invocation begins.
    fn on_enter(&mut self, sub_name: &str) {
        let _ = sub_name;
    }

    /// Called when a sub invocation ends (normally or exceptionally).
    fn on_exit(&mut self, sub_name: &str) {
        let _ = sub_name;
    }
}

/// The default do-nothing tracer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl ExecTracer for NoopTracer {}

/// Tracer that forwards opcode dispatch to `log::trace!`.
///
/// Heavyweight; meant for debugging sessions, not production.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl ExecTracer for LogTracer {
    fn on_opcode(&mut self, pc: usize, op: Opcode) {
        log::trace!("pc={pc:5} {op}");
    }

    fn on_enter(&mut self, sub_name: &str) {
        log::trace!("enter {sub_name}");
    }

    fn on_exit(&mut self, sub_name: &str) {
        log::trace!("exit  {sub_name}");
    }
}
