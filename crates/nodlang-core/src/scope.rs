//! Variable scoping.
//!
//! A scope is any node owning a [`Scope`](crate::node::Scope) component:
//! blocks, conditionals and loops. Name lookup starts at a node and walks
//! outwards through its owners (the parent, or for a branch body the
//! control node it succeeds) until a scope declares the name.

use tracing::trace;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::{ComponentKind, NodeKind};

impl Graph {
    /// Attaches `variable` to `scope` and marks it declared.
    pub fn declare_variable(&mut self, scope: NodeId, variable: NodeId) -> Result<(), GraphError> {
        let var = self
            .node(variable)
            .ok_or(GraphError::NodeNotFound { id: variable })?
            .as_variable()
            .ok_or_else(|| GraphError::InvalidEdge {
                reason: format!("{variable} is not a variable"),
            })?;
        if let Some(existing) = var.scope() {
            return Err(GraphError::AlreadyScoped {
                variable,
                scope: existing,
            });
        }
        let name = var.name().to_string();

        let table = self
            .node(scope)
            .ok_or(GraphError::NodeNotFound { id: scope })?
            .scope()
            .ok_or(GraphError::NotAScope { id: scope })?;
        if table.get(&name).is_some() {
            return Err(GraphError::DuplicateVariable { name, scope });
        }

        if let Some(table) = self.entry(scope).and_then(|n| n.scope_mut()) {
            table.variables.insert(name.clone(), variable);
        }
        if let Some(NodeKind::Variable(var)) = self.entry(variable).map(|n| &mut n.kind) {
            var.scope = Some(scope);
            var.declared = true;
        }
        self.mark_dirty(scope);
        self.mark_dirty(variable);
        trace!(%variable, %scope, name = %name, "variable declared");
        Ok(())
    }

    /// Detaches `variable` from its scope. The node itself survives.
    pub fn undeclare_variable(&mut self, variable: NodeId) -> Result<(), GraphError> {
        let scope = self
            .node(variable)
            .ok_or(GraphError::NodeNotFound { id: variable })?
            .as_variable()
            .and_then(|v| v.scope());
        if let Some(scope) = scope {
            self.detach_from_scope(variable, scope);
        }
        if let Some(NodeKind::Variable(var)) = self.entry(variable).map(|n| &mut n.kind) {
            var.scope = None;
            var.declared = false;
        }
        self.mark_dirty(variable);
        Ok(())
    }

    pub(crate) fn detach_from_scope(&mut self, variable: NodeId, scope: NodeId) {
        if let Some(table) = self.entry(scope).and_then(|n| n.scope_mut()) {
            table.variables.retain(|_, id| *id != variable);
        }
        self.mark_dirty(scope);
    }

    /// The node enclosing `id`: its parent, or the control node it is a
    /// branch of.
    pub fn owner_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id)?;
        node.parent().or_else(|| node.predecessors().first().copied())
    }

    /// The nearest scope-owning node at or above `id`.
    pub fn scope_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(at) = current {
            if self.node(at)?.has_component(ComponentKind::Scope) {
                return Some(at);
            }
            current = self.owner_of(at);
        }
        None
    }

    /// Resolves `name` from `from` outwards. Inner declarations shadow outer
    /// ones.
    pub fn find_variable(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = self.scope_of(from);
        while let Some(scope) = current {
            if let Some(found) = self.node(scope).and_then(|n| n.scope()).and_then(|s| s.get(name)) {
                return Some(found);
            }
            current = self.owner_of(scope).and_then(|owner| self.scope_of(owner));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::language::Language;
    use crate::node::{ConditionalNode, InstructionNode, ScopeNode};
    use crate::token::{Token, TokenKind};
    use crate::type_id::TypeId;

    use super::*;

    fn graph() -> Graph {
        Graph::new(Arc::new(Language::standard().unwrap()))
    }

    fn variable(graph: &mut Graph, name: &str) -> NodeId {
        graph.create_variable(TypeId::INT, Token::synthetic(TokenKind::Identifier, name), None)
    }

    #[test]
    fn declare_and_find() {
        let mut graph = graph();
        let root = graph.create_root();
        let x = variable(&mut graph, "x");
        graph.declare_variable(root, x).unwrap();

        let instr = graph.create_instruction(InstructionNode::default());
        graph.connect_child(root, instr).unwrap();

        assert_eq!(graph.find_variable(instr, "x"), Some(x));
        assert_eq!(graph.find_variable(instr, "y"), None);
        assert!(graph.node(x).unwrap().as_variable().unwrap().is_declared());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut graph = graph();
        let root = graph.create_root();
        let first = variable(&mut graph, "x");
        let second = variable(&mut graph, "x");
        graph.declare_variable(root, first).unwrap();
        let err = graph.declare_variable(root, second).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateVariable { .. }));
        assert!(!graph.node(second).unwrap().as_variable().unwrap().is_declared());
    }

    #[test]
    fn variable_belongs_to_one_scope() {
        let mut graph = graph();
        let a = graph.create_scope(ScopeNode::default());
        let b = graph.create_scope(ScopeNode::default());
        let x = variable(&mut graph, "x");
        graph.declare_variable(a, x).unwrap();
        assert!(matches!(
            graph.declare_variable(b, x),
            Err(GraphError::AlreadyScoped { .. })
        ));
    }

    #[test]
    fn literal_is_not_a_scope() {
        let mut graph = graph();
        let lit = graph.create_literal(TypeId::INT, 1i64.into(), None);
        let x = variable(&mut graph, "x");
        assert!(matches!(
            graph.declare_variable(lit, x),
            Err(GraphError::NotAScope { .. })
        ));
    }

    #[test]
    fn inner_scope_shadows_and_sees_outer() {
        let mut graph = graph();
        let root = graph.create_root();
        let outer = variable(&mut graph, "x");
        let other = variable(&mut graph, "y");
        graph.declare_variable(root, outer).unwrap();
        graph.declare_variable(root, other).unwrap();

        let cond = graph.create_conditional(ConditionalNode::default());
        graph.connect_child(root, cond).unwrap();
        let body = graph.create_scope(ScopeNode::default());
        graph.connect_successor(cond, body).unwrap();
        let inner = variable(&mut graph, "x");
        graph.declare_variable(body, inner).unwrap();

        let instr = graph.create_instruction(InstructionNode::default());
        graph.connect_child(body, instr).unwrap();

        assert_eq!(graph.find_variable(instr, "x"), Some(inner));
        assert_eq!(graph.find_variable(instr, "y"), Some(other));
        assert_eq!(graph.scope_of(instr), Some(body));
        assert_eq!(graph.owner_of(body), Some(cond));
    }

    #[test]
    fn destroying_scope_orphans_variables() {
        let mut graph = graph();
        let root = graph.create_root();
        let x = variable(&mut graph, "x");
        graph.declare_variable(root, x).unwrap();
        graph.destroy(root).unwrap();

        let var = graph.node(x).unwrap().as_variable().unwrap();
        assert!(!var.is_declared());
        assert!(var.scope().is_none());
        assert!(graph.root().is_none());
    }

    #[test]
    fn destroying_variable_frees_its_name() {
        let mut graph = graph();
        let root = graph.create_root();
        let x = variable(&mut graph, "x");
        graph.declare_variable(root, x).unwrap();
        graph.destroy(x).unwrap();
        assert!(graph.node(root).unwrap().scope().unwrap().is_empty());

        let again = variable(&mut graph, "x");
        graph.declare_variable(root, again).unwrap();
    }

    #[test]
    fn undeclare_keeps_node() {
        let mut graph = graph();
        let root = graph.create_root();
        let x = variable(&mut graph, "x");
        graph.declare_variable(root, x).unwrap();
        graph.undeclare_variable(x).unwrap();
        assert!(graph.contains(x));
        assert_eq!(graph.find_variable(root, "x"), None);
    }
}
