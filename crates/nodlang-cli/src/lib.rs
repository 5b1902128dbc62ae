//! The nodlang toolchain as a library: [`Pipeline`] ties the parser,
//! compiler and virtual machine together. The `nodlang` binary is a thin
//! command line layer over it.

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
