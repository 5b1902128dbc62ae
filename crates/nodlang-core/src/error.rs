//! Core error types for nodlang-core.
//!
//! Uses `thiserror` for structured, matchable error variants. [`GraphError`]
//! covers graph consistency failures (the graph is left in its last valid
//! state). [`EvalError`] is returned by native functions and operators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{InvokableId, NodeId, PropertyId};
use crate::type_id::TypeId;

/// Errors produced by graph mutations and registry lookups.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Attempting to register a type name that already exists in the registry.
    #[error("duplicate type name: '{name}'")]
    DuplicateTypeName { name: String },

    /// A TypeId was not found in the type registry.
    #[error("type not found: TypeId({id})", id = id.0)]
    TypeNotFound { id: TypeId },

    /// An invokable id is unknown to the language.
    #[error("invokable not found: InvokableId({id})", id = id.0)]
    InvokableNotFound { id: InvokableId },

    /// A node handle does not refer to a live node.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A property index is out of range for its node.
    #[error("property not found: {id}")]
    PropertyNotFound { id: PropertyId },

    /// A variable with this name already lives in the target scope.
    #[error("variable '{name}' is already declared in scope {scope}")]
    DuplicateVariable { name: String, scope: NodeId },

    /// The variable already belongs to a scope.
    #[error("variable {variable} is already attached to scope {scope}")]
    AlreadyScoped { variable: NodeId, scope: NodeId },

    /// The node has no scope component.
    #[error("node {id} does not own a scope")]
    NotAScope { id: NodeId },

    /// The target property already has an input edge.
    #[error("property {id} already has an input")]
    InputOccupied { id: PropertyId },

    /// The connection flags of an endpoint forbid the edge.
    #[error("property {id} does not accept this connection")]
    ConnectionRefused { id: PropertyId },

    /// The source type cannot implicitly convert to the target type.
    #[error("cannot connect {from} to {to}: '{from_type}' is not convertible to '{to_type}'")]
    IncompatibleTypes {
        from: PropertyId,
        to: PropertyId,
        from_type: String,
        to_type: String,
    },

    /// A bounded slot set is at capacity.
    #[error("node {id} has no free {slot} slot (capacity {capacity})")]
    SlotsFull {
        id: NodeId,
        slot: &'static str,
        capacity: usize,
    },

    /// The node already has a parent.
    #[error("node {id} already has a parent")]
    AlreadyParented { id: NodeId },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// A structural invariant was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}

/// Errors returned by native function and operator implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("{message}")]
    Failed { message: String },
}
