//! Graph nodes: kinds, slots and components.
//!
//! A [`Node`] is the single node weight stored in the graph arena. Its
//! [`NodeKind`] carries the kind-specific data, including the tokens the
//! parser consumed for it, so the serializer can reproduce the source text.
//! Structure (slots, parent, property connections) is private and only
//! changes through [`Graph`](crate::graph::Graph) methods.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{InvokableId, NodeId};
use crate::property::Property;
use crate::token::Token;
use crate::type_id::TypeId;

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// An ordered, bounded set of node handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    items: SmallVec<[NodeId; 2]>,
    capacity: usize,
}

impl Slots {
    pub fn with_capacity(capacity: usize) -> Self {
        Slots {
            items: SmallVec::new(),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Slots::with_capacity(usize::MAX)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.items.get(index).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.items.contains(&id)
    }

    /// Returns `false` when full.
    pub(crate) fn push(&mut self, id: NodeId) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push(id);
        true
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> bool {
        match self.items.iter().position(|x| *x == id) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Variables declared directly in a scope, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub(crate) variables: IndexMap<String, NodeId>,
}

impl Scope {
    pub fn variables(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.variables.values().copied()
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.variables.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Tag used to request a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Scope,
    Invokable,
}

/// The closed set of components a node may own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    Scope(Scope),
    /// The native function this node evaluates.
    Invokable(InvokableId),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Scope(_) => ComponentKind::Scope,
            Component::Invokable(_) => ComponentKind::Invokable,
        }
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// A block: `{ ... }`, or the program root (no braces, closed by the
/// end-of-file token).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeNode {
    pub open: Option<Token>,
    pub close: Option<Token>,
}

/// A variable declaration, or a reference to a name that was never declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableNode {
    pub ty: TypeId,
    pub identifier: Token,
    pub type_token: Option<Token>,
    /// The `=` of an initialized declaration.
    pub assign: Option<Token>,
    pub(crate) declared: bool,
    pub(crate) scope: Option<NodeId>,
}

impl VariableNode {
    pub fn name(&self) -> &str {
        self.identifier.word()
    }

    /// `true` once the variable has been attached to a scope.
    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteralNode {
    pub token: Option<Token>,
}

/// One statement. Its `root` property is fed by the expression to evaluate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionNode {
    pub end: Option<Token>,
}

/// Unary or binary operator application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorNode {
    pub identifier: String,
    pub token: Option<Token>,
}

/// Function call, including the `operator+(a, b)` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub identifier: String,
    /// `operator` keyword of the explicit operator call form.
    pub keyword: Option<Token>,
    pub identifier_token: Option<Token>,
    pub open: Option<Token>,
    pub separators: Vec<Token>,
    pub close: Option<Token>,
}

/// `if (condition) { } else { }`. Successor 0 is the true branch, successor 1
/// the optional else branch (a scope or a chained conditional).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalNode {
    pub keyword: Option<Token>,
    pub open: Option<Token>,
    pub close: Option<Token>,
    pub else_keyword: Option<Token>,
}

/// `for (init; condition; iteration) { }`. Successor 0 is the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForLoopNode {
    pub keyword: Option<Token>,
    pub open: Option<Token>,
    pub init_end: Option<Token>,
    pub condition_end: Option<Token>,
    pub close: Option<Token>,
}

/// `while (condition) { }`. Successor 0 is the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhileLoopNode {
    pub keyword: Option<Token>,
    pub open: Option<Token>,
    pub close: Option<Token>,
}

/// What a node is, plus its kind-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Scope(ScopeNode),
    Variable(VariableNode),
    Literal(LiteralNode),
    Instruction(InstructionNode),
    Operator(OperatorNode),
    Function(FunctionNode),
    Conditional(ConditionalNode),
    ForLoop(ForLoopNode),
    WhileLoop(WhileLoopNode),
}

impl NodeKind {
    /// Short lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Scope(_) => "scope",
            NodeKind::Variable(_) => "variable",
            NodeKind::Literal(_) => "literal",
            NodeKind::Instruction(_) => "instruction",
            NodeKind::Operator(_) => "operator",
            NodeKind::Function(_) => "function",
            NodeKind::Conditional(_) => "conditional",
            NodeKind::ForLoop(_) => "for",
            NodeKind::WhileLoop(_) => "while",
        }
    }

    fn capacities(&self) -> (usize, usize, usize) {
        // (children, successors, predecessors)
        match self {
            NodeKind::Scope(_) => (usize::MAX, 0, 1),
            NodeKind::Conditional(_) => (0, 2, 1),
            NodeKind::ForLoop(_) | NodeKind::WhileLoop(_) => (0, 1, 0),
            _ => (0, 0, 0),
        }
    }
}

// Fixed property positions.
pub const VALUE_PROPERTY: u16 = 0;
pub const ROOT_PROPERTY: u16 = 0;
pub const CONDITION_PROPERTY: u16 = 0;
pub const FOR_INIT_PROPERTY: u16 = 0;
pub const FOR_CONDITION_PROPERTY: u16 = 1;
pub const FOR_ITERATION_PROPERTY: u16 = 2;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A graph entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) generation: u32,
    pub(crate) kind: NodeKind,
    pub(crate) properties: SmallVec<[Property; 4]>,
    pub(crate) children: Slots,
    pub(crate) successors: Slots,
    pub(crate) predecessors: Slots,
    pub(crate) parent: Option<NodeId>,
    pub(crate) components: SmallVec<[Component; 1]>,
    pub(crate) dirty: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, properties: SmallVec<[Property; 4]>) -> Self {
        let (children, successors, predecessors) = kind.capacities();
        let mut components = SmallVec::new();
        if matches!(
            kind,
            NodeKind::Scope(_) | NodeKind::Conditional(_) | NodeKind::ForLoop(_) | NodeKind::WhileLoop(_)
        ) {
            components.push(Component::Scope(Scope::default()));
        }
        Node {
            generation: 0,
            kind,
            properties,
            children: Slots::with_capacity(children),
            successors: Slots::with_capacity(successors),
            predecessors: Slots::with_capacity(predecessors),
            parent: None,
            components,
            dirty: true,
        }
    }

    pub(crate) fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable access to the kind data (tokens, identifiers). Structure and
    /// scope membership stay under graph control.
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// Display name: the variable or operator identifier, else the kind label.
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Variable(v) => v.name(),
            NodeKind::Operator(op) => &op.identifier,
            NodeKind::Function(f) => &f.identifier,
            other => other.label(),
        }
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, index: u16) -> Option<&Property> {
        self.properties.get(index as usize)
    }

    pub(crate) fn property_mut(&mut self, index: u16) -> Option<&mut Property> {
        self.properties.get_mut(index as usize)
    }

    /// Index of the property by name.
    pub fn find_property(&self, name: &str) -> Option<u16> {
        self.properties
            .iter()
            .position(|p| p.name() == name)
            .map(|i| i as u16)
    }

    /// Index of the property holding this node's value, if it produces one.
    pub fn output_property(&self) -> Option<u16> {
        match &self.kind {
            NodeKind::Variable(_) | NodeKind::Literal(_) => Some(VALUE_PROPERTY),
            NodeKind::Operator(_) | NodeKind::Function(_) => {
                self.properties.len().checked_sub(1).map(|i| i as u16)
            }
            _ => None,
        }
    }

    /// Number of argument properties of an operator or function node.
    pub fn arg_count(&self) -> usize {
        match &self.kind {
            NodeKind::Operator(_) | NodeKind::Function(_) => self.properties.len().saturating_sub(1),
            _ => 0,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        self.children.as_slice()
    }

    pub fn successors(&self) -> &[NodeId] {
        self.successors.as_slice()
    }

    pub fn predecessors(&self) -> &[NodeId] {
        self.predecessors.as_slice()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn has_component(&self, kind: ComponentKind) -> bool {
        self.components.iter().any(|c| c.kind() == kind)
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.components.iter().find_map(|c| match c {
            Component::Scope(scope) => Some(scope),
            _ => None,
        })
    }

    pub(crate) fn scope_mut(&mut self) -> Option<&mut Scope> {
        self.components.iter_mut().find_map(|c| match c {
            Component::Scope(scope) => Some(scope),
            _ => None,
        })
    }

    pub fn invokable(&self) -> Option<InvokableId> {
        self.components.iter().find_map(|c| match c {
            Component::Invokable(id) => Some(*id),
            _ => None,
        })
    }

    pub fn as_variable(&self) -> Option<&VariableNode> {
        match &self.kind {
            NodeKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, NodeKind::Variable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::ConnectionFlags;
    use smallvec::smallvec;

    #[test]
    fn slots_respect_capacity() {
        let mut slots = Slots::with_capacity(1);
        let a = NodeId::new(0, 0);
        let b = NodeId::new(1, 0);
        assert!(slots.push(a));
        assert!(slots.is_full());
        assert!(!slots.push(b));
        assert!(slots.remove(a));
        assert!(!slots.remove(a));
        assert!(slots.is_empty());
    }

    #[test]
    fn control_nodes_own_a_scope() {
        let cond = Node::new(NodeKind::Conditional(ConditionalNode::default()), SmallVec::new());
        assert!(cond.has_component(ComponentKind::Scope));
        assert_eq!(cond.successors.capacity(), 2);

        let literal = Node::new(NodeKind::Literal(LiteralNode::default()), SmallVec::new());
        assert!(literal.scope().is_none());
        assert_eq!(literal.children.capacity(), 0);
    }

    #[test]
    fn operator_output_is_last_property() {
        let node = Node::new(
            NodeKind::Operator(OperatorNode {
                identifier: "+".into(),
                token: None,
            }),
            smallvec![
                Property::new("lhs", TypeId::INT, ConnectionFlags::In),
                Property::new("rhs", TypeId::INT, ConnectionFlags::In),
                Property::new("result", TypeId::INT, ConnectionFlags::Out),
            ],
        )
        .with_component(Component::Invokable(InvokableId(4)));
        assert_eq!(node.output_property(), Some(2));
        assert_eq!(node.arg_count(), 2);
        assert_eq!(node.invokable(), Some(InvokableId(4)));
        assert_eq!(node.find_property("rhs"), Some(1));
        assert_eq!(node.name(), "+");
    }
}
