//! Bytecode compiler for nodlang program graphs.
//!
//! [`compile`] checks a graph with [`is_program_valid`] and lowers it to
//! [`Code`]: a flat list of register-machine instructions that carry
//! everything the VM needs, so running them never reads the graph again.

pub mod code;
pub mod compiler;
pub mod error;

pub use code::{Code, CodeMeta, Instruction, NodeEval, Operand, Qword, Register, ValueSlot};
pub use compiler::{compile, is_program_valid};
pub use error::CompileError;
