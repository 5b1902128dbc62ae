//! Graph to source text.
//!
//! Every token the parser consumed is stored on a node or on the edge that
//! carries an operand, prefix and suffix trivia included. Walking the graph
//! from the root and writing those buffers back in grammar order therefore
//! reproduces the parsed source byte for byte. Nodes built without tokens
//! (by graph edits rather than by the parser) are written with a canonical
//! spelling instead.

use nodlang_core::graph::Graph;
use nodlang_core::id::{NodeId, PropertyId};
use nodlang_core::node::{
    NodeKind, CONDITION_PROPERTY, FOR_CONDITION_PROPERTY, FOR_INIT_PROPERTY, FOR_ITERATION_PROPERTY,
    ROOT_PROPERTY, VALUE_PROPERTY,
};
use nodlang_core::token::Token;
use nodlang_core::variant::Variant;

/// Writes the program rooted at `graph.root()` back to text.
pub fn serialize(graph: &Graph) -> String {
    let mut writer = Writer {
        graph,
        out: String::new(),
    };
    if let Some(root) = graph.root() {
        writer.statement(root);
    }
    writer.out
}

struct Writer<'g> {
    graph: &'g Graph,
    out: String,
}

impl Writer<'_> {
    fn token(&mut self, token: Option<&Token>, fallback: &str) {
        match token {
            Some(token) => self.out.push_str(token.buffer()),
            None => self.out.push_str(fallback),
        }
    }

    fn statement(&mut self, id: NodeId) {
        let graph = self.graph;
        let Some(node) = graph.node(id) else {
            return;
        };

        match node.kind() {
            NodeKind::Scope(scope) => {
                let is_root = graph.root() == Some(id);
                self.token(scope.open.as_ref(), if is_root { "" } else { "{\n" });
                for &child in node.children() {
                    self.statement(child);
                }
                self.token(scope.close.as_ref(), if is_root { "" } else { "}\n" });
            }
            NodeKind::Instruction(instruction) => {
                self.input(PropertyId::new(id, ROOT_PROPERTY));
                self.token(instruction.end.as_ref(), ";\n");
            }
            NodeKind::Conditional(cond) => {
                self.token(cond.keyword.as_ref(), "if ");
                self.token(cond.open.as_ref(), "(");
                self.input(PropertyId::new(id, CONDITION_PROPERTY));
                self.token(cond.close.as_ref(), ") ");
                if let Some(&body) = node.successors().first() {
                    self.statement(body);
                }
                if let Some(&branch) = node.successors().get(1) {
                    self.token(cond.else_keyword.as_ref(), "else ");
                    self.statement(branch);
                }
            }
            NodeKind::ForLoop(for_loop) => {
                self.token(for_loop.keyword.as_ref(), "for ");
                self.token(for_loop.open.as_ref(), "(");
                self.input(PropertyId::new(id, FOR_INIT_PROPERTY));
                self.token(for_loop.init_end.as_ref(), "; ");
                self.input(PropertyId::new(id, FOR_CONDITION_PROPERTY));
                self.token(for_loop.condition_end.as_ref(), "; ");
                self.input(PropertyId::new(id, FOR_ITERATION_PROPERTY));
                self.token(for_loop.close.as_ref(), ") ");
                if let Some(&body) = node.successors().first() {
                    self.statement(body);
                }
            }
            NodeKind::WhileLoop(while_loop) => {
                self.token(while_loop.keyword.as_ref(), "while ");
                self.token(while_loop.open.as_ref(), "(");
                self.input(PropertyId::new(id, CONDITION_PROPERTY));
                self.token(while_loop.close.as_ref(), ") ");
                if let Some(&body) = node.successors().first() {
                    self.statement(body);
                }
            }
            // A bare expression node hanging off a scope.
            _ => {
                self.expression(id);
                self.out.push_str(";\n");
            }
        }
    }

    /// Writes whatever feeds `target`, with its parentheses.
    fn input(&mut self, target: PropertyId) {
        let Some((source, syntax)) = self.graph.input_of(target) else {
            return;
        };
        for (open, _) in syntax.parens.iter().rev() {
            self.out.push_str(open.buffer());
        }
        match &syntax.reference {
            Some(reference) => self.out.push_str(reference.buffer()),
            None => self.expression(source.node),
        }
        for (_, close) in &syntax.parens {
            self.out.push_str(close.buffer());
        }
    }

    fn expression(&mut self, id: NodeId) {
        let graph = self.graph;
        let Some(node) = graph.node(id) else {
            return;
        };

        match node.kind() {
            NodeKind::Variable(var) => {
                if var.is_declared() {
                    let keyword = graph.language().keyword_of(var.ty).unwrap_or("any");
                    match &var.type_token {
                        Some(token) => self.out.push_str(token.buffer()),
                        None => {
                            self.out.push_str(keyword);
                            self.out.push(' ');
                        }
                    }
                }
                self.out.push_str(var.identifier.buffer());
                let value = PropertyId::new(id, VALUE_PROPERTY);
                if graph.input_node(value).is_some() {
                    self.token(var.assign.as_ref(), " = ");
                    self.input(value);
                }
            }
            NodeKind::Literal(literal) => match &literal.token {
                Some(token) => self.out.push_str(token.buffer()),
                None => {
                    let value = node.property(VALUE_PROPERTY).map(|p| p.value());
                    self.out.push_str(&literal_text(value));
                }
            },
            NodeKind::Operator(op) => {
                let fallback = format!(" {} ", op.identifier);
                if node.arg_count() == 1 {
                    self.token(op.token.as_ref(), op.identifier.as_str());
                    self.input(PropertyId::new(id, 0));
                } else {
                    self.input(PropertyId::new(id, 0));
                    self.token(op.token.as_ref(), &fallback);
                    self.input(PropertyId::new(id, 1));
                }
            }
            NodeKind::Function(call) => {
                if let Some(keyword) = &call.keyword {
                    self.out.push_str(keyword.buffer());
                }
                self.token(call.identifier_token.as_ref(), &call.identifier);
                self.token(call.open.as_ref(), "(");
                for index in 0..node.arg_count() {
                    if index > 0 {
                        self.token(call.separators.get(index - 1), ", ");
                    }
                    self.input(PropertyId::new(id, index as u16));
                }
                self.token(call.close.as_ref(), ")");
            }
            _ => self.statement(id),
        }
    }
}

fn literal_text(value: Option<&Variant>) -> String {
    match value {
        Some(Variant::String(s)) => format!("{s:?}"),
        Some(Variant::Double(d)) if d.fract() == 0.0 && d.is_finite() => format!("{d:.1}"),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
