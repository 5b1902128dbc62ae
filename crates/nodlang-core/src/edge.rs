//! Directed edges between nodes or between properties.
//!
//! Edges are stored in canonical form: `predecessor-of` is rewritten to
//! `successor-of` and `output-of` to `input-of`, both with the endpoints
//! swapped. Reading the tuple `(kind, tail, head)` aloud gives its meaning:
//! "tail child-of head", "tail input-of head", "tail successor-of head".

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{NodeId, PropertyId};
use crate::token::Token;

/// Relation carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    ChildOf,
    InputOf,
    SuccessorOf,
    PredecessorOf,
    OutputOf,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::ChildOf => "child-of",
            EdgeKind::InputOf => "input-of",
            EdgeKind::SuccessorOf => "successor-of",
            EdgeKind::PredecessorOf => "predecessor-of",
            EdgeKind::OutputOf => "output-of",
        };
        f.write_str(s)
    }
}

/// One side of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Node(NodeId),
    Property(PropertyId),
}

impl Endpoint {
    /// The node this endpoint belongs to.
    pub fn node(self) -> NodeId {
        match self {
            Endpoint::Node(id) => id,
            Endpoint::Property(prop) => prop.node,
        }
    }

    pub fn property_index(self) -> Option<u16> {
        match self {
            Endpoint::Node(_) => None,
            Endpoint::Property(prop) => Some(prop.index),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Node(id) => write!(f, "{id}"),
            Endpoint::Property(prop) => write!(f, "{prop}"),
        }
    }
}

/// `(kind, tail, head)`, always canonical once constructed with [`DirectedEdge::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectedEdge {
    pub kind: EdgeKind,
    pub tail: Endpoint,
    pub head: Endpoint,
}

impl DirectedEdge {
    /// Builds an edge, rewriting `predecessor-of` and `output-of` to their
    /// stored counterparts.
    pub fn new(kind: EdgeKind, tail: Endpoint, head: Endpoint) -> Self {
        match kind {
            EdgeKind::PredecessorOf => DirectedEdge {
                kind: EdgeKind::SuccessorOf,
                tail: head,
                head: tail,
            },
            EdgeKind::OutputOf => DirectedEdge {
                kind: EdgeKind::InputOf,
                tail: head,
                head: tail,
            },
            kind => DirectedEdge { kind, tail, head },
        }
    }

    /// `child` child-of `parent`.
    pub fn child_of(child: NodeId, parent: NodeId) -> Self {
        DirectedEdge::new(EdgeKind::ChildOf, Endpoint::Node(child), Endpoint::Node(parent))
    }

    /// `source` input-of `target`: the value of `source` feeds `target`.
    pub fn input_of(source: PropertyId, target: PropertyId) -> Self {
        DirectedEdge::new(EdgeKind::InputOf, Endpoint::Property(source), Endpoint::Property(target))
    }

    /// `next` successor-of `previous`.
    pub fn successor_of(next: NodeId, previous: NodeId) -> Self {
        DirectedEdge::new(EdgeKind::SuccessorOf, Endpoint::Node(next), Endpoint::Node(previous))
    }
}

impl fmt::Display for DirectedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.tail, self.kind, self.head)
    }
}

/// Source text attached to a data edge: the identifier of a variable
/// reference and any parentheses wrapped around the operand. Pairs are
/// ordered innermost first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperandSyntax {
    pub reference: Option<Token>,
    pub parens: SmallVec<[(Token, Token); 1]>,
}

impl OperandSyntax {
    pub fn reference(token: Token) -> Self {
        OperandSyntax {
            reference: Some(token),
            parens: SmallVec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_none() && self.parens.is_empty()
    }
}

/// Edge weight stored in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub kind: EdgeKind,
    pub tail_property: Option<u16>,
    pub head_property: Option<u16>,
    pub syntax: OperandSyntax,
}
