//! Bytecode representation for the engine.
//!
//! - `op` - the opcode catalog, grouped for jump-table dispatch
//! - `code` - the `CodeUnit` artifact shared by compiler and interpreter
//! - `builder` - `CodeBuilder` for emitting instruction words

pub mod builder;
pub mod code;
pub mod op;

pub use builder::{CodeBuilder, JumpLabel};
pub use code::{CodeUnit, Constant};
pub use op::Opcode;
