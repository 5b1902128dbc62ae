//! Runtime faults.
//!
//! Every fault halts execution and puts the VM back into
//! [`VmState::Stopped`](crate::VmState). Faults raised while executing carry
//! the instruction index they happened at.

use nodlang_compiler::code::ValueSlot;
use nodlang_core::error::EvalError;
use nodlang_core::id::NodeId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum VmError {
    #[error("a program is already loaded")]
    AlreadyLoaded,

    #[error("no program loaded")]
    NoProgram,

    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("execution ran past the end of the code at {eip}")]
    EndOfCode { eip: usize },

    #[error("null dereference of {slot} at {eip}")]
    NullDereference { eip: usize, slot: ValueSlot },

    #[error("evaluation of node {node} failed at {eip}: {source}")]
    Eval {
        eip: usize,
        node: NodeId,
        source: EvalError,
    },

    #[error("stack frame mismatch at {eip}: {message}")]
    FrameMismatch { eip: usize, message: String },

    #[error("step limit ({limit}) exceeded")]
    StepLimit { limit: usize },
}
