//! Compilation failure modes.
//!
//! Validation errors name the offending node so a front end can highlight
//! it. Compilation is all-or-nothing: any error means no `Code` is produced.

use nodlang_core::id::NodeId;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum CompileError {
    /// The graph has no root scope.
    #[error("program has no root scope")]
    NoRoot,

    /// A reachable read of a name that was never declared.
    #[error("use of undeclared variable '{name}' at node {node}")]
    UndeclaredVariable { node: NodeId, name: String },

    /// A reachable call that no native function implements.
    #[error("call to unresolved function '{name}' at node {node}")]
    UnresolvedFunction { node: NodeId, name: String },

    /// A value that, through its inputs, depends on itself.
    #[error("data-flow cycle through node {node}")]
    Cycle { node: NodeId },

    /// A handle in the graph points at a node that no longer exists.
    #[error("node not found: {node}")]
    NodeNotFound { node: NodeId },

    /// A node appears where its kind cannot be compiled.
    #[error("unexpected {kind} node {node}")]
    UnexpectedNode { node: NodeId, kind: String },

    /// A conditional or loop has nothing feeding its condition.
    #[error("node {node} has no condition")]
    MissingCondition { node: NodeId },

    #[error("internal compiler error: {message}")]
    InternalError { message: String },
}
