pub mod coercion;
pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod language;
pub mod node;
pub mod property;
pub mod scope;
pub mod signature;
pub mod stdlib;
pub mod token;
pub mod type_id;
pub mod variant;

// Re-export commonly used types
pub use edge::{DirectedEdge, EdgeKind, Endpoint, OperandSyntax};
pub use error::{EvalError, GraphError};
pub use graph::{Graph, GraphChange};
pub use id::{EdgeId, InvokableId, NodeId, PropertyId};
pub use language::{Invokable, Language, NativeFn};
pub use node::{Component, ComponentKind, Node, NodeKind};
pub use property::{ConnectionFlags, Property, Visibility};
pub use signature::{Arg, Arity, Associativity, OperatorInfo, Signature};
pub use token::{Token, TokenKind};
pub use type_id::{Qualifiers, TypeId, TypeRegistry};
pub use variant::{ValueKind, Variant};
