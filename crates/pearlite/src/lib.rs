#![doc = include_str!("../../../README.md")]

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod exception;
pub mod runtime;
pub mod state;
pub mod tracer;
pub mod value;
pub mod vm;

pub use ast::{Node, PragmaSnapshot, SourceFiles, SourcePos};
pub use bytecode::{CodeUnit, Opcode};
pub use compiler::compile;
pub use exception::{CompileError, RunError, RunResult};
pub use runtime::io::{BufferSink, OutputSink, SharedSink, StdSink};
pub use state::GlobalState;
pub use tracer::{ExecTracer, LogTracer, NoopTracer};
pub use value::{Scalar, Value};
pub use vm::{CallContext, Interp};
