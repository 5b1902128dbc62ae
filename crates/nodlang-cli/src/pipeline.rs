//! Text to graph to bytecode to result, behind one context object.
//!
//! A [`Pipeline`] owns everything a session needs: the shared language, the
//! program graph and the virtual machine. Nothing is global, so several
//! pipelines can live side by side.

use std::sync::Arc;

use nodlang_compiler::code::{Code, Qword, ValueSlot};
use nodlang_compiler::error::CompileError;
use nodlang_core::error::GraphError;
use nodlang_core::graph::Graph;
use nodlang_core::id::NodeId;
use nodlang_core::language::Language;
use nodlang_core::variant::Variant;
use nodlang_parser::{Diagnostic, ParserConfig};
use nodlang_vm::{TraceEntry, VirtualMachine, VmConfig, VmError};
use serde::Serialize;
use tracing::info;

/// Settings for every stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub parser: ParserConfig,
    pub vm: VmConfig,
}

/// A failure in one of the stages, tagged with the stage for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("parse error at {diagnostic}")]
    Parse { diagnostic: Diagnostic },

    #[error("compile error: {source}")]
    Compile { source: CompileError },

    #[error("runtime error: {source}")]
    Runtime { source: VmError },
}

impl PipelineError {
    /// Process exit code for the failing stage.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Parse { .. } => 1,
            PipelineError::Compile { .. } => 2,
            PipelineError::Runtime { .. } => 3,
        }
    }
}

impl From<CompileError> for PipelineError {
    fn from(source: CompileError) -> Self {
        PipelineError::Compile { source }
    }
}

impl From<VmError> for PipelineError {
    fn from(source: VmError) -> Self {
        PipelineError::Runtime { source }
    }
}

pub struct Pipeline {
    language: Arc<Language>,
    graph: Graph,
    vm: VirtualMachine,
    parser_config: ParserConfig,
}

impl Pipeline {
    /// A pipeline over the standard language.
    pub fn new(config: PipelineConfig) -> Result<Self, GraphError> {
        Ok(Self::with_language(Arc::new(Language::standard()?), config))
    }

    pub fn with_language(language: Arc<Language>, config: PipelineConfig) -> Self {
        Pipeline {
            graph: Graph::new(Arc::clone(&language)),
            language,
            vm: VirtualMachine::new(config.vm),
            parser_config: config.parser,
        }
    }

    pub fn language(&self) -> &Arc<Language> {
        &self.language
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    /// Replaces the program with `source`. On failure the previous program
    /// is kept untouched.
    pub fn parse(&mut self, source: &str) -> Result<(), PipelineError> {
        nodlang_parser::parse_with_config(source, &mut self.graph, &self.parser_config).map_err(|err| {
            PipelineError::Parse {
                diagnostic: err.to_diagnostic(source),
            }
        })?;
        // Bytecode of the old graph is stale now.
        self.vm.release_program();
        info!(nodes = self.graph.node_count(), edges = self.graph.edge_count(), "program parsed");
        Ok(())
    }

    pub fn compile(&self) -> Result<Code, PipelineError> {
        Ok(nodlang_compiler::compile(&self.graph)?)
    }

    /// Compiles and runs the current program, returning the accumulator.
    pub fn run(&mut self) -> Result<Qword, PipelineError> {
        self.load()?;
        Ok(self.vm.run_program()?)
    }

    /// Compiles the current program and stops before its first instruction.
    pub fn debug(&mut self) -> Result<(), PipelineError> {
        self.load()?;
        Ok(self.vm.debug_program()?)
    }

    /// Executes one instruction of a program started with [`Pipeline::debug`].
    pub fn step(&mut self) -> Result<bool, PipelineError> {
        Ok(self.vm.step_over()?)
    }

    pub fn stop(&mut self) {
        self.vm.stop_program();
    }

    pub fn serialize(&self) -> String {
        nodlang_parser::serialize(&self.graph)
    }

    /// The node the debugger stops at next.
    pub fn next_node(&self) -> Option<NodeId> {
        self.vm.next_node()
    }

    /// The value of the last evaluated statement.
    pub fn last_value(&self) -> Option<Variant> {
        self.vm.last_value()
    }

    /// The current value of a variable declared in the root scope.
    pub fn variable(&self, name: &str) -> Option<&Variant> {
        let root = self.graph.node(self.graph.root()?)?;
        let id = root.scope()?.get(name)?;
        self.vm.read(ValueSlot::Variable(id))
    }

    pub fn trace(&self) -> Option<&[TraceEntry]> {
        self.vm.trace()
    }

    fn load(&mut self) -> Result<(), PipelineError> {
        let code = self.compile()?;
        self.vm.release_program();
        self.vm.load_program(code)?;
        Ok(())
    }
}
