//! Register virtual machine executing compiled nodlang [`Code`](nodlang_compiler::Code).
//!
//! - [`VirtualMachine`] owns the registers, the slot memory and the frame
//!   stack, and moves between the [`VmState`]s.
//! - [`VmError`] is a fault: execution halts and the VM stops.
//! - [`TraceEntry`] records each executed instruction when tracing is enabled.
//!
//! # Usage
//!
//! ```ignore
//! let mut vm = VirtualMachine::new(VmConfig::default());
//! vm.load_program(compile(&graph)?)?;
//! let rax = vm.run_program()?;
//! ```

pub mod error;
pub mod trace;
pub mod vm;

pub use error::VmError;
pub use trace::TraceEntry;
pub use vm::{VirtualMachine, VmConfig, VmState};
