//! Runtime library: the primitive operations invoked by opcodes.
//!
//! Organised by value kind. The interpreter never inspects payloads
//! directly; every operation on values goes through these modules.

pub mod array;
pub mod hash;
pub mod io;
pub mod refs;
pub mod regex;
pub mod scalar;
