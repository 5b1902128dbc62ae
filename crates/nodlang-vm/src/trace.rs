//! Execution trace recording for the virtual machine.
//!
//! When tracing is enabled via [`VmConfig::trace_enabled`](crate::VmConfig),
//! the VM records a [`TraceEntry`] for every executed instruction.

use nodlang_compiler::code::Qword;
use serde::Serialize;

/// One executed instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// Index of the instruction that ran.
    pub eip: usize,
    /// Its listing text.
    pub instruction: String,
    /// Accumulator after the instruction.
    pub rax: Qword,
}
