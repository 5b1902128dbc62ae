//! Graph: the root container for nodes, properties and edges.
//!
//! [`Graph`] is the single entry point for constructing and querying
//! programs. Nodes live in a petgraph `StableGraph` arena and are addressed
//! by generation-checked [`NodeId`]s. Every structural relation is recorded
//! twice, as an arena edge and in the nodes' slots or property links, and
//! all mutations go through `Graph` methods so the two never drift apart.
//!
//! Collaborators do not register callbacks. They poll the dirty set
//! ([`Graph::take_dirty`]) and the change journal ([`Graph::drain_changes`]).

use std::sync::Arc;

use indexmap::IndexSet;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use crate::coercion::is_implicitly_convertible;
use crate::edge::{DirectedEdge, EdgeKind, Endpoint, GraphEdge, OperandSyntax};
use crate::error::GraphError;
use crate::id::{EdgeId, InvokableId, NodeId, PropertyId};
use crate::language::Language;
use crate::node::{
    Component, ConditionalNode, ForLoopNode, FunctionNode, InstructionNode, LiteralNode, Node,
    NodeKind, OperatorNode, ScopeNode, VariableNode, WhileLoopNode,
};
use crate::property::{ConnectionFlags, Property};
use crate::token::Token;
use crate::type_id::{TypeId, TypeRegistry};
use crate::variant::Variant;

/// One entry of the change journal.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    NodeCreated(NodeId),
    NodeDestroyed(NodeId),
    EdgeAdded(DirectedEdge),
    EdgeRemoved(DirectedEdge),
    RootChanged(Option<NodeId>),
}

/// The program graph.
#[derive(Debug, Clone)]
pub struct Graph {
    arena: StableGraph<Node, GraphEdge, Directed, u32>,
    language: Arc<Language>,
    root: Option<NodeId>,
    next_generation: u32,
    dirty: IndexSet<NodeId>,
    changes: Vec<GraphChange>,
}

impl Graph {
    /// Creates an empty graph resolving names against `language`.
    pub fn new(language: Arc<Language>) -> Self {
        Graph {
            arena: StableGraph::default(),
            language,
            root: None,
            next_generation: 0,
            dirty: IndexSet::new(),
            changes: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn language(&self) -> &Arc<Language> {
        &self.language
    }

    pub fn types(&self) -> &TypeRegistry {
        self.language.types()
    }

    /// The program root, a scope node.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Looks up a live node. Stale handles return `None`.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena
            .node_weight(id.node_index())
            .filter(|node| node.generation == id.generation)
    }

    /// Mutable node access for editing kind data. Marks the node dirty.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if self.node(id).is_none() {
            return None;
        }
        self.dirty.insert(id);
        let node = self.entry(id)?;
        node.dirty = true;
        Some(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.node(id.node)?.property(id.index)
    }

    /// All live node ids, in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.arena.node_indices().map(move |idx| self.id_of(idx))
    }

    /// All live edges in canonical form.
    pub fn edges(&self) -> impl Iterator<Item = DirectedEdge> + '_ {
        self.arena.edge_references().map(move |e| self.directed(e.source(), e.target(), e.weight()))
    }

    pub fn node_count(&self) -> usize {
        self.arena.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.arena.edge_count()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children())
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.successors())
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.predecessors())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent()
    }

    /// The property feeding `target` and the operand syntax recorded on
    /// that edge.
    pub fn input_of(&self, target: PropertyId) -> Option<(PropertyId, &OperandSyntax)> {
        let source = self.property(target)?.input()?;
        let edge = self
            .arena
            .edges_connecting(source.node.node_index(), target.node.node_index())
            .find(|e| {
                let w = e.weight();
                w.kind == EdgeKind::InputOf
                    && w.tail_property == Some(source.index)
                    && w.head_property == Some(target.index)
            })?;
        Some((source, &edge.weight().syntax))
    }

    /// The node whose value feeds `target`, if any.
    pub fn input_node(&self, target: PropertyId) -> Option<NodeId> {
        self.property(target)?.input().map(|p| p.node)
    }

    // -----------------------------------------------------------------------
    // Factories
    // -----------------------------------------------------------------------

    fn insert(&mut self, mut node: Node) -> NodeId {
        self.next_generation = self.next_generation.wrapping_add(1);
        node.generation = self.next_generation;
        let label = node.kind().label();
        let idx = self.arena.add_node(node);
        let id = NodeId::new(idx.index() as u32, self.next_generation);
        self.dirty.insert(id);
        self.changes.push(GraphChange::NodeCreated(id));
        trace!(%id, kind = label, "node created");
        id
    }

    /// Creates a scope node.
    pub fn create_scope(&mut self, syntax: ScopeNode) -> NodeId {
        self.insert(Node::new(NodeKind::Scope(syntax), SmallVec::new()))
    }

    /// Creates a scope node and makes it the program root.
    pub fn create_root(&mut self) -> NodeId {
        let id = self.create_scope(ScopeNode::default());
        self.set_root(Some(id));
        id
    }

    /// Creates a variable of type `ty`. It is not declared until attached to
    /// a scope with [`Graph::declare_variable`].
    pub fn create_variable(&mut self, ty: TypeId, identifier: Token, type_token: Option<Token>) -> NodeId {
        let default = Variant::default_for(self.types().value_kind(ty));
        let kind = NodeKind::Variable(VariableNode {
            ty,
            identifier,
            type_token,
            assign: None,
            declared: false,
            scope: None,
        });
        let value = Property::new("value", ty, ConnectionFlags::InOut).with_value(default);
        self.insert(Node::new(kind, smallvec![value]))
    }

    pub fn create_literal(&mut self, ty: TypeId, value: Variant, token: Option<Token>) -> NodeId {
        let kind = NodeKind::Literal(LiteralNode { token });
        let value = Property::new("value", ty, ConnectionFlags::Out).with_value(value);
        self.insert(Node::new(kind, smallvec![value]))
    }

    pub fn create_instruction(&mut self, syntax: InstructionNode) -> NodeId {
        let root = Property::new("root", TypeId::ANY, ConnectionFlags::In);
        self.insert(Node::new(NodeKind::Instruction(syntax), smallvec![root]))
    }

    /// Creates an operator node for a resolved invokable. Argument
    /// properties follow the signature, followed by `result`.
    pub fn create_operator(&mut self, invokable: InvokableId, token: Option<Token>) -> Result<NodeId, GraphError> {
        let signature = &self
            .language
            .invokable(invokable)
            .ok_or(GraphError::InvokableNotFound { id: invokable })?
            .signature;
        let properties = signature_properties(signature.args.iter().map(|a| (a.name.as_str(), a.ty)), signature.return_type);
        let kind = NodeKind::Operator(OperatorNode {
            identifier: signature.identifier.clone(),
            token,
        });
        let node = Node::new(kind, properties).with_component(Component::Invokable(invokable));
        Ok(self.insert(node))
    }

    /// Creates a function call node. An unresolved call (`invokable: None`)
    /// gets `arg_count` untyped arguments and an `any` result.
    pub fn create_function(
        &mut self,
        syntax: FunctionNode,
        invokable: Option<InvokableId>,
        arg_count: usize,
    ) -> Result<NodeId, GraphError> {
        let node = match invokable {
            Some(id) => {
                let signature = &self
                    .language
                    .invokable(id)
                    .ok_or(GraphError::InvokableNotFound { id })?
                    .signature;
                let properties =
                    signature_properties(signature.args.iter().map(|a| (a.name.as_str(), a.ty)), signature.return_type);
                Node::new(NodeKind::Function(syntax), properties).with_component(Component::Invokable(id))
            }
            None => {
                let names: Vec<String> = (0..arg_count).map(|i| format!("arg{i}")).collect();
                let properties = signature_properties(names.iter().map(|n| (n.as_str(), TypeId::ANY)), TypeId::ANY);
                Node::new(NodeKind::Function(syntax), properties)
            }
        };
        Ok(self.insert(node))
    }

    pub fn create_conditional(&mut self, syntax: ConditionalNode) -> NodeId {
        let condition = Property::new("condition", TypeId::BOOL, ConnectionFlags::In);
        self.insert(Node::new(NodeKind::Conditional(syntax), smallvec![condition]))
    }

    pub fn create_for_loop(&mut self, syntax: ForLoopNode) -> NodeId {
        let properties = smallvec![
            Property::new("initialization", TypeId::ANY, ConnectionFlags::In),
            Property::new("condition", TypeId::BOOL, ConnectionFlags::In),
            Property::new("iteration", TypeId::ANY, ConnectionFlags::In),
        ];
        self.insert(Node::new(NodeKind::ForLoop(syntax), properties))
    }

    pub fn create_while_loop(&mut self, syntax: WhileLoopNode) -> NodeId {
        let condition = Property::new("condition", TypeId::BOOL, ConnectionFlags::In);
        self.insert(Node::new(NodeKind::WhileLoop(syntax), smallvec![condition]))
    }

    // -----------------------------------------------------------------------
    // Destruction
    // -----------------------------------------------------------------------

    /// Detaches every edge of `id`, removes it from its scope, and deletes it.
    pub fn destroy(&mut self, id: NodeId) -> Result<Node, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::NodeNotFound { id });
        }
        let idx = id.node_index();

        let mut incident: Vec<EdgeIndex<u32>> = self
            .arena
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.arena.edges_directed(idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        incident.sort();
        incident.dedup();
        for edge in incident {
            self.unlink(edge);
        }

        let (own_scope, owned_variables) = match self.node(id) {
            Some(node) => (
                node.as_variable().and_then(|v| v.scope),
                node.scope().map(|s| s.variables().collect::<Vec<_>>()).unwrap_or_default(),
            ),
            None => (None, Vec::new()),
        };
        if let Some(scope) = own_scope {
            self.detach_from_scope(id, scope);
        }
        for variable in owned_variables {
            if let Some(NodeKind::Variable(var)) = self.entry(variable).map(|n| &mut n.kind) {
                var.scope = None;
                var.declared = false;
            }
            self.mark_dirty(variable);
        }

        if self.root == Some(id) {
            self.set_root(None);
        }

        let node = self.arena.remove_node(idx).ok_or(GraphError::NodeNotFound { id })?;
        self.dirty.shift_remove(&id);
        self.changes.push(GraphChange::NodeDestroyed(id));
        trace!(%id, "node destroyed");

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(node)
    }

    /// Destroys every node and edge and resets the root.
    pub fn clear(&mut self) {
        let edges: Vec<DirectedEdge> = self.edges().collect();
        let nodes: Vec<NodeId> = self.node_ids().collect();
        self.changes.extend(edges.into_iter().map(GraphChange::EdgeRemoved));
        self.changes.extend(nodes.into_iter().map(GraphChange::NodeDestroyed));
        self.arena.clear();
        self.dirty.clear();
        self.set_root(None);
    }

    pub fn set_root(&mut self, root: Option<NodeId>) {
        if self.root != root {
            self.root = root;
            self.changes.push(GraphChange::RootChanged(root));
        }
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Adds an edge. The edge is canonicalized first.
    ///
    /// Fails without touching the graph when an endpoint is missing, a slot
    /// set is full, the target property is already fed, the connection
    /// flags refuse the direction or the types are not convertible.
    pub fn connect(&mut self, edge: DirectedEdge, syntax: OperandSyntax) -> Result<EdgeId, GraphError> {
        let edge = DirectedEdge::new(edge.kind, edge.tail, edge.head);
        match (edge.kind, edge.tail, edge.head) {
            (EdgeKind::ChildOf, Endpoint::Node(child), Endpoint::Node(parent)) => self.link_child(child, parent)?,
            (EdgeKind::SuccessorOf, Endpoint::Node(next), Endpoint::Node(previous)) => {
                self.link_successor(next, previous)?
            }
            (EdgeKind::InputOf, Endpoint::Property(source), Endpoint::Property(target)) => {
                self.link_input(source, target)?
            }
            _ => {
                return Err(GraphError::InvalidEdge {
                    reason: format!("{edge} joins mismatched endpoints"),
                })
            }
        }

        let weight = GraphEdge {
            kind: edge.kind,
            tail_property: edge.tail.property_index(),
            head_property: edge.head.property_index(),
            syntax,
        };
        let idx = self
            .arena
            .add_edge(edge.tail.node().node_index(), edge.head.node().node_index(), weight);
        self.mark_dirty(edge.tail.node());
        self.mark_dirty(edge.head.node());
        self.changes.push(GraphChange::EdgeAdded(edge));
        trace!(%edge, "edge added");
        Ok(EdgeId::from(idx))
    }

    /// Appends `child` to the children of `parent`.
    pub fn connect_child(&mut self, parent: NodeId, child: NodeId) -> Result<EdgeId, GraphError> {
        self.connect(DirectedEdge::child_of(child, parent), OperandSyntax::default())
    }

    /// Makes `next` the next successor of `previous`.
    pub fn connect_successor(&mut self, previous: NodeId, next: NodeId) -> Result<EdgeId, GraphError> {
        self.connect(DirectedEdge::successor_of(next, previous), OperandSyntax::default())
    }

    /// Feeds `target` from `source`.
    pub fn connect_input(
        &mut self,
        source: PropertyId,
        target: PropertyId,
        syntax: OperandSyntax,
    ) -> Result<EdgeId, GraphError> {
        self.connect(DirectedEdge::input_of(source, target), syntax)
    }

    /// Removes an edge.
    pub fn disconnect(&mut self, edge: DirectedEdge) -> Result<(), GraphError> {
        let edge = DirectedEdge::new(edge.kind, edge.tail, edge.head);
        let (tail, head) = (edge.tail.node(), edge.head.node());
        if !self.contains(tail) {
            return Err(GraphError::NodeNotFound { id: tail });
        }
        if !self.contains(head) {
            return Err(GraphError::NodeNotFound { id: head });
        }
        let idx = self
            .arena
            .edges_connecting(tail.node_index(), head.node_index())
            .find(|e| {
                let w = e.weight();
                w.kind == edge.kind
                    && w.tail_property == edge.tail.property_index()
                    && w.head_property == edge.head.property_index()
            })
            .map(|e| e.id())
            .ok_or_else(|| GraphError::InvalidEdge {
                reason: format!("no such edge: {edge}"),
            })?;
        self.unlink(idx);
        Ok(())
    }

    /// Writes a property value, coerced to the property's type.
    pub fn set_value(&mut self, id: PropertyId, value: Variant) -> Result<(), GraphError> {
        let kind = {
            let prop = self.property(id).ok_or(GraphError::PropertyNotFound { id })?;
            self.types().value_kind(prop.ty())
        };
        let value = value.coerce(kind).map_err(|err| GraphError::GraphInconsistency {
            reason: format!("cannot store into {id}: {err}"),
        })?;
        if let Some(prop) = self.entry(id.node).and_then(|n| n.property_mut(id.index)) {
            prop.set_value(value);
        }
        self.mark_dirty(id.node);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Dirty set and journal
    // -----------------------------------------------------------------------

    /// Returns and clears the set of nodes touched since the last call.
    pub fn take_dirty(&mut self) -> IndexSet<NodeId> {
        let dirty = std::mem::take(&mut self.dirty);
        for id in &dirty {
            if let Some(node) = self.entry(*id) {
                node.dirty = false;
            }
        }
        dirty
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.dirty.contains(&id)
    }

    /// Returns and clears the change journal.
    pub fn drain_changes(&mut self) -> Vec<GraphChange> {
        std::mem::take(&mut self.changes)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    pub(crate) fn entry(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena
            .node_weight_mut(id.node_index())
            .filter(|node| node.generation == id.generation)
    }

    pub(crate) fn mark_dirty(&mut self, id: NodeId) {
        if let Some(node) = self.entry(id) {
            node.dirty = true;
            self.dirty.insert(id);
        }
    }

    fn id_of(&self, idx: NodeIndex<u32>) -> NodeId {
        let generation = self.arena.node_weight(idx).map_or(0, |n| n.generation);
        NodeId::new(idx.index() as u32, generation)
    }

    fn directed(&self, source: NodeIndex<u32>, target: NodeIndex<u32>, weight: &GraphEdge) -> DirectedEdge {
        let endpoint = |idx: NodeIndex<u32>, property: Option<u16>| {
            let node = self.id_of(idx);
            match property {
                Some(index) => Endpoint::Property(PropertyId::new(node, index)),
                None => Endpoint::Node(node),
            }
        };
        DirectedEdge {
            kind: weight.kind,
            tail: endpoint(source, weight.tail_property),
            head: endpoint(target, weight.head_property),
        }
    }

    fn link_child(&mut self, child: NodeId, parent: NodeId) -> Result<(), GraphError> {
        if child == parent {
            return Err(GraphError::InvalidEdge {
                reason: format!("{child} cannot be its own child"),
            });
        }
        let child_node = self.node(child).ok_or(GraphError::NodeNotFound { id: child })?;
        if child_node.parent.is_some() {
            return Err(GraphError::AlreadyParented { id: child });
        }
        let parent_node = self.node(parent).ok_or(GraphError::NodeNotFound { id: parent })?;
        if parent_node.children.is_full() {
            return Err(GraphError::SlotsFull {
                id: parent,
                slot: "child",
                capacity: parent_node.children.capacity(),
            });
        }
        if let Some(node) = self.entry(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.entry(child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    fn link_successor(&mut self, next: NodeId, previous: NodeId) -> Result<(), GraphError> {
        let prev_node = self.node(previous).ok_or(GraphError::NodeNotFound { id: previous })?;
        if prev_node.successors.is_full() {
            return Err(GraphError::SlotsFull {
                id: previous,
                slot: "successor",
                capacity: prev_node.successors.capacity(),
            });
        }
        let next_node = self.node(next).ok_or(GraphError::NodeNotFound { id: next })?;
        if next_node.predecessors.is_full() {
            return Err(GraphError::SlotsFull {
                id: next,
                slot: "predecessor",
                capacity: next_node.predecessors.capacity(),
            });
        }
        if let Some(node) = self.entry(previous) {
            node.successors.push(next);
        }
        if let Some(node) = self.entry(next) {
            node.predecessors.push(previous);
        }
        Ok(())
    }

    fn link_input(&mut self, source: PropertyId, target: PropertyId) -> Result<(), GraphError> {
        let src = self
            .property(source)
            .ok_or(GraphError::PropertyNotFound { id: source })?;
        let dst = self
            .property(target)
            .ok_or(GraphError::PropertyNotFound { id: target })?;
        if !src.flags().accepts_output() {
            return Err(GraphError::ConnectionRefused { id: source });
        }
        if !dst.flags().accepts_input() {
            return Err(GraphError::ConnectionRefused { id: target });
        }
        if dst.input().is_some() {
            return Err(GraphError::InputOccupied { id: target });
        }
        let types = self.language.types();
        if !is_implicitly_convertible(src.ty(), dst.ty(), types) {
            return Err(GraphError::IncompatibleTypes {
                from: source,
                to: target,
                from_type: types.name(src.ty()).to_string(),
                to_type: types.name(dst.ty()).to_string(),
            });
        }

        // a by-value connection copies the current value
        let copied = if types.is_reference(dst.ty()) {
            None
        } else {
            let kind = types.value_kind(dst.ty());
            Some(src.value().clone().coerce(kind).unwrap_or_else(|_| Variant::default_for(kind)))
        };

        if let Some(prop) = self.entry(target.node).and_then(|n| n.property_mut(target.index)) {
            prop.input = Some(source);
            if let Some(value) = copied {
                prop.set_value(value);
            }
        }
        if let Some(prop) = self.entry(source.node).and_then(|n| n.property_mut(source.index)) {
            prop.outputs.push(target);
        }
        Ok(())
    }

    /// Removes an arena edge and the slot or property links mirroring it.
    fn unlink(&mut self, idx: EdgeIndex<u32>) -> Option<DirectedEdge> {
        let (source, target) = self.arena.edge_endpoints(idx)?;
        let edge = self.directed(source, target, self.arena.edge_weight(idx)?);
        self.arena.remove_edge(idx)?;

        let (tail, head) = (edge.tail.node(), edge.head.node());
        match (edge.kind, edge.tail, edge.head) {
            (EdgeKind::ChildOf, _, _) => {
                if let Some(node) = self.entry(head) {
                    node.children.remove(tail);
                }
                if let Some(node) = self.entry(tail) {
                    node.parent = None;
                }
            }
            (EdgeKind::SuccessorOf, _, _) => {
                if let Some(node) = self.entry(head) {
                    node.successors.remove(tail);
                }
                if let Some(node) = self.entry(tail) {
                    node.predecessors.remove(head);
                }
            }
            (EdgeKind::InputOf, Endpoint::Property(source), Endpoint::Property(target)) => {
                if let Some(prop) = self.entry(target.node).and_then(|n| n.property_mut(target.index)) {
                    prop.input = None;
                }
                if let Some(prop) = self.entry(source.node).and_then(|n| n.property_mut(source.index)) {
                    prop.outputs.retain(|p| *p != target);
                }
            }
            _ => {}
        }

        self.mark_dirty(tail);
        self.mark_dirty(head);
        self.changes.push(GraphChange::EdgeRemoved(edge));
        trace!(%edge, "edge removed");
        Some(edge)
    }

    // -----------------------------------------------------------------------
    // Debug consistency assertion
    // -----------------------------------------------------------------------

    /// Verifies that slots, parents and property links mirror each other.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`).
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        for idx in self.arena.node_indices() {
            let id = self.id_of(idx);
            let node = &self.arena[idx];
            for child in node.children() {
                assert_eq!(
                    self.node(*child).and_then(|c| c.parent()),
                    Some(id),
                    "child {child} of {id} does not point back at its parent"
                );
            }
            for next in node.successors() {
                assert!(
                    self.predecessors(*next).contains(&id),
                    "successor {next} of {id} does not list it as predecessor"
                );
            }
            for (i, prop) in node.properties().iter().enumerate() {
                let this = PropertyId::new(id, i as u16);
                if let Some(source) = prop.input() {
                    assert!(
                        self.property(source).is_some_and(|p| p.outputs().contains(&this)),
                        "input {source} of {this} does not list it as output"
                    );
                }
            }
        }
        if let Some(root) = self.root {
            assert!(self.contains(root), "root {root} is not a live node");
        }
    }
}

fn signature_properties<'a>(
    args: impl Iterator<Item = (&'a str, TypeId)>,
    return_type: TypeId,
) -> SmallVec<[Property; 4]> {
    let mut properties: SmallVec<[Property; 4]> =
        args.map(|(name, ty)| Property::new(name, ty, ConnectionFlags::In)).collect();
    properties.push(Property::new("result", return_type, ConnectionFlags::Out));
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::VALUE_PROPERTY;
    use crate::token::TokenKind;

    fn graph() -> Graph {
        Graph::new(Arc::new(Language::standard().unwrap()))
    }

    fn ident(name: &str) -> Token {
        Token::synthetic(TokenKind::Identifier, name)
    }

    /// Builds `a + b` with two double variables, returns (a, b, plus).
    fn sum(graph: &mut Graph) -> (NodeId, NodeId, NodeId) {
        let a = graph.create_variable(TypeId::DOUBLE, ident("a"), None);
        let b = graph.create_variable(TypeId::DOUBLE, ident("b"), None);
        let plus_id = graph
            .language()
            .find_invokable("+", &[TypeId::DOUBLE, TypeId::DOUBLE])
            .unwrap();
        let plus = graph.create_operator(plus_id, None).unwrap();
        graph
            .connect_input(PropertyId::new(a, VALUE_PROPERTY), PropertyId::new(plus, 0), OperandSyntax::default())
            .unwrap();
        graph
            .connect_input(PropertyId::new(b, VALUE_PROPERTY), PropertyId::new(plus, 1), OperandSyntax::default())
            .unwrap();
        (a, b, plus)
    }

    #[test]
    fn basic_graph_construction() {
        let mut graph = graph();
        let root = graph.create_root();
        let (_, _, plus) = sum(&mut graph);
        let instr = graph.create_instruction(InstructionNode::default());
        graph
            .connect_input(PropertyId::new(plus, 2), PropertyId::new(instr, 0), OperandSyntax::default())
            .unwrap();
        graph.connect_child(root, instr).unwrap();

        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.children(root), &[instr]);
        assert_eq!(graph.parent(instr), Some(root));
        assert_eq!(graph.input_node(PropertyId::new(instr, 0)), Some(plus));
    }

    #[test]
    fn second_input_is_refused() {
        let mut graph = graph();
        let (a, _, plus) = sum(&mut graph);
        let err = graph
            .connect_input(PropertyId::new(a, VALUE_PROPERTY), PropertyId::new(plus, 1), OperandSyntax::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::InputOccupied { .. }));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn incompatible_types_are_refused() {
        let mut graph = graph();
        let flag = graph.create_literal(TypeId::STRING, Variant::from("x"), None);
        let cond = graph.create_conditional(ConditionalNode::default());
        let err = graph
            .connect_input(PropertyId::new(flag, 0), PropertyId::new(cond, 0), OperandSyntax::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::IncompatibleTypes { .. }));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn by_value_connection_copies() {
        let mut graph = graph();
        let lit = graph.create_literal(TypeId::INT, Variant::Int(4), None);
        let var = graph.create_variable(TypeId::DOUBLE, ident("d"), None);
        graph
            .connect_input(PropertyId::new(lit, 0), PropertyId::new(var, 0), OperandSyntax::default())
            .unwrap();
        assert_eq!(
            graph.property(PropertyId::new(var, 0)).unwrap().value(),
            &Variant::Double(4.0)
        );
    }

    #[test]
    fn destroy_detaches_edges() {
        let mut graph = graph();
        let (a, _, plus) = sum(&mut graph);
        graph.destroy(plus).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.property(PropertyId::new(a, 0)).unwrap().outputs().is_empty());
        assert!(graph.node(plus).is_none());
        assert!(matches!(graph.destroy(plus), Err(GraphError::NodeNotFound { .. })));
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let mut graph = graph();
        let first = graph.create_scope(ScopeNode::default());
        graph.destroy(first).unwrap();
        let second = graph.create_scope(ScopeNode::default());
        assert_eq!(first.index, second.index);
        assert!(graph.node(first).is_none());
        assert!(graph.node(second).is_some());
    }

    #[test]
    fn successor_slots_are_bounded() {
        let mut graph = graph();
        let cond = graph.create_conditional(ConditionalNode::default());
        let a = graph.create_scope(ScopeNode::default());
        let b = graph.create_scope(ScopeNode::default());
        let c = graph.create_scope(ScopeNode::default());
        graph.connect_successor(cond, a).unwrap();
        graph.connect_successor(cond, b).unwrap();
        let err = graph.connect_successor(cond, c).unwrap_err();
        assert!(matches!(err, GraphError::SlotsFull { slot: "successor", .. }));
        assert_eq!(graph.successors(cond), &[a, b]);
        assert_eq!(graph.predecessors(a), &[cond]);
    }

    #[test]
    fn predecessor_edge_is_stored_as_successor() {
        let mut graph = graph();
        let cond = graph.create_conditional(ConditionalNode::default());
        let body = graph.create_scope(ScopeNode::default());
        let edge = DirectedEdge::new(EdgeKind::PredecessorOf, Endpoint::Node(cond), Endpoint::Node(body));
        graph.connect(edge, OperandSyntax::default()).unwrap();
        let stored: Vec<DirectedEdge> = graph.edges().collect();
        assert_eq!(stored, vec![DirectedEdge::successor_of(body, cond)]);
        graph.disconnect(edge).unwrap();
        assert!(graph.successors(cond).is_empty());

        let err = graph.disconnect(edge).unwrap_err();
        assert!(matches!(err, GraphError::InvalidEdge { .. }), "{err:?}");
    }

    #[test]
    fn mismatched_endpoints_are_invalid() {
        let mut graph = graph();
        let a = graph.create_scope(ScopeNode::default());
        let b = graph.create_variable(TypeId::INT, ident("x"), None);
        let edge = DirectedEdge::new(EdgeKind::InputOf, Endpoint::Node(a), Endpoint::Property(PropertyId::new(b, 0)));
        assert!(matches!(
            graph.connect(edge, OperandSyntax::default()),
            Err(GraphError::InvalidEdge { .. })
        ));
    }

    #[test]
    fn edges_mark_endpoints_dirty_and_are_journaled() {
        let mut graph = graph();
        let root = graph.create_root();
        let instr = graph.create_instruction(InstructionNode::default());
        graph.take_dirty();
        graph.drain_changes();

        graph.connect_child(root, instr).unwrap();
        let dirty = graph.take_dirty();
        assert!(dirty.contains(&root) && dirty.contains(&instr));
        assert!(!graph.node(root).unwrap().is_dirty());
        assert_eq!(
            graph.drain_changes(),
            vec![GraphChange::EdgeAdded(DirectedEdge::child_of(instr, root))]
        );

        graph.destroy(instr).unwrap();
        let changes = graph.drain_changes();
        assert_eq!(
            changes,
            vec![
                GraphChange::EdgeRemoved(DirectedEdge::child_of(instr, root)),
                GraphChange::NodeDestroyed(instr),
            ]
        );
        assert!(graph.is_dirty(root));
    }

    #[test]
    fn clear_resets_everything() {
        let mut graph = graph();
        graph.create_root();
        sum(&mut graph);
        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.root().is_none());
    }

    #[test]
    fn unresolved_function_has_untyped_arguments() {
        let mut graph = graph();
        let call = graph
            .create_function(
                FunctionNode {
                    identifier: "frobnicate".into(),
                    keyword: None,
                    identifier_token: None,
                    open: None,
                    separators: Vec::new(),
                    close: None,
                },
                None,
                2,
            )
            .unwrap();
        let node = graph.node(call).unwrap();
        assert_eq!(node.arg_count(), 2);
        assert!(node.invokable().is_none());
        assert_eq!(node.property(2).unwrap().ty(), TypeId::ANY);
    }
}
