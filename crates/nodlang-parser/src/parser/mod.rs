//! Transactional parser building graph nodes directly.
//!
//! Statements, scopes and declarations are parsed by recursive descent and
//! expressions by precedence climbing. Every production runs inside
//! [`Parser::attempt`], which pairs a token stream transaction with the list
//! of nodes the production created: on failure the cursor is restored and
//! those nodes are destroyed (taking their edges and scope entries with
//! them), so a failing production leaves no trace.
//!
//! The whole parse works on a staging copy of the graph. Only a successful
//! parse replaces the caller's graph, so a failed parse leaves it untouched.

mod expressions;
mod statements;

use nodlang_core::error::GraphError;
use nodlang_core::graph::Graph;
use nodlang_core::id::NodeId;
use nodlang_core::language::Language;
use nodlang_core::node::NodeKind;
use nodlang_core::token::{Token, TokenKind};
use nodlang_core::type_id::TypeId;
use tracing::{debug, trace};

use crate::error::{ParseError, ParserConfig};
use crate::lexer::tokenize;
use crate::stream::TokenStream;

pub(crate) type PResult<T> = Result<T, ParseError>;

/// Parses `source` with the default configuration, replacing the contents
/// of `graph` on success.
pub fn parse(source: &str, graph: &mut Graph) -> Result<(), ParseError> {
    parse_with_config(source, graph, &ParserConfig::default())
}

/// Parses `source`, replacing the contents of `graph` on success. On failure
/// `graph` is left exactly as it was.
pub fn parse_with_config(source: &str, graph: &mut Graph, config: &ParserConfig) -> Result<(), ParseError> {
    let stream = tokenize(source);
    let mut staging = graph.clone();
    staging.clear();

    let result = Parser::new(stream, &mut staging, config).parse_program();
    match result {
        Ok(()) => {
            debug!(
                nodes = staging.node_count(),
                edges = staging.edge_count(),
                "parse succeeded"
            );
            *graph = staging;
            Ok(())
        }
        Err(err) => {
            debug!(offset = err.offset(), error = %err, "parse failed");
            Err(err)
        }
    }
}

/// How a freshly created statement node hangs off the tree.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Attach {
    /// Child of a scope.
    Child(NodeId),
    /// Branch or body of a control node.
    Successor(NodeId),
}

pub(crate) struct Parser<'g> {
    stream: TokenStream,
    graph: &'g mut Graph,
    strict: bool,
    /// Innermost scope last. Every entry is already linked into the tree.
    scopes: Vec<NodeId>,
    /// Nodes created by each open transaction.
    created: Vec<Vec<NodeId>>,
    furthest: Option<ParseError>,
}

impl<'g> Parser<'g> {
    fn new(stream: TokenStream, graph: &'g mut Graph, config: &ParserConfig) -> Self {
        Parser {
            stream,
            graph,
            strict: config.strict,
            scopes: Vec::new(),
            created: Vec::new(),
            furthest: None,
        }
    }

    /// `program := block EOF`
    fn parse_program(mut self) -> PResult<()> {
        let root = self.graph.create_root();
        self.scopes.push(root);

        let result = self.parse_block(root, TokenKind::EndOfFile).and_then(|()| {
            let eof = self.expect(TokenKind::EndOfFile, "end of input")?;
            self.edit(root, |kind| {
                if let NodeKind::Scope(scope) = kind {
                    scope.close = Some(eof);
                }
            });
            Ok(())
        });
        self.scopes.pop();

        result.map_err(|err| self.furthest_error(err))
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Runs `production` inside a transaction. On failure the cursor is
    /// restored and every node the production created is destroyed.
    pub(crate) fn attempt<T>(&mut self, production: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.stream.start_transaction();
        self.created.push(Vec::new());

        let result = production(self);
        let nodes = self.created.pop().unwrap_or_default();
        match result {
            Ok(value) => {
                self.stream.commit();
                if let Some(parent) = self.created.last_mut() {
                    parent.extend(nodes);
                }
                Ok(value)
            }
            Err(err) => {
                self.stream.rollback();
                for id in nodes.into_iter().rev() {
                    if let Err(destroy_err) = self.graph.destroy(id) {
                        trace!(%id, error = %destroy_err, "rollback skipped node");
                    }
                }
                trace!(cursor = self.stream.cursor(), error = %err, "production rolled back");
                self.record(&err);
                Err(err)
            }
        }
    }

    /// Registers a node with the innermost transaction.
    pub(crate) fn track(&mut self, id: NodeId) -> NodeId {
        if let Some(frame) = self.created.last_mut() {
            frame.push(id);
        }
        id
    }

    fn record(&mut self, err: &ParseError) {
        let further = self
            .furthest
            .as_ref()
            .map_or(true, |best| err.offset() > best.offset());
        if further {
            self.furthest = Some(err.clone());
        }
    }

    /// Picks between the error that ended the parse and the furthest one a
    /// rolled back production reported.
    fn furthest_error(&mut self, err: ParseError) -> ParseError {
        match self.furthest.take() {
            Some(best) if best.offset() > err.offset() => best,
            _ => err,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    pub(crate) fn language(&self) -> &Language {
        self.graph.language()
    }

    pub(crate) fn current_scope(&self) -> Option<NodeId> {
        self.scopes.last().copied()
    }

    /// Runs `body` with `scope` as the innermost scope.
    pub(crate) fn within<T>(&mut self, scope: NodeId, body: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.scopes.push(scope);
        let result = body(self);
        self.scopes.pop();
        result
    }

    /// Offset of the next significant word, or the end of input.
    pub(crate) fn offset(&self) -> usize {
        self.stream
            .peek()
            .map(Token::word_offset)
            .or_else(|| self.stream.tokens().last().map(|t| t.offset() + t.buffer().len()))
            .unwrap_or(0)
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, expected: &str) -> PResult<Token> {
        match self.stream.eat_if(kind) {
            Some(token) => Ok(token),
            None => Err(self.unexpected(expected)),
        }
    }

    /// Error describing the next token as not being `expected`.
    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let offset = self.offset();
        match self.stream.peek() {
            None => ParseError::UnexpectedEnd {
                offset,
                expected: expected.to_string(),
            },
            Some(token) if token.is(TokenKind::EndOfFile) => ParseError::UnexpectedEnd {
                offset,
                expected: expected.to_string(),
            },
            Some(token) if token.is(TokenKind::Unknown) => ParseError::Syntax {
                offset,
                message: self
                    .stream
                    .diagnostic_at(offset)
                    .map_or_else(|| "unrecognized input".to_string(), |d| d.message.clone()),
            },
            Some(token) => ParseError::Syntax {
                offset,
                message: format!("expected {expected}, found `{}`", token.word()),
            },
        }
    }

    pub(crate) fn type_error(offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::Type {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn graph_error(offset: usize) -> impl FnOnce(GraphError) -> ParseError {
        move |source| ParseError::Graph { offset, source }
    }

    pub(crate) fn attach(&mut self, attach: Attach, node: NodeId, offset: usize) -> PResult<()> {
        let result = match attach {
            Attach::Child(parent) => self.graph.connect_child(parent, node),
            Attach::Successor(previous) => self.graph.connect_successor(previous, node),
        };
        result.map(|_| ()).map_err(Self::graph_error(offset))
    }

    pub(crate) fn type_name(&self, ty: TypeId) -> String {
        self.graph.types().name(ty).to_string()
    }

    /// Updates the token data of a node this parser created.
    pub(crate) fn edit(&mut self, node: NodeId, edit: impl FnOnce(&mut NodeKind)) {
        if let Some(node) = self.graph.node_mut(node) {
            edit(node.kind_mut());
        }
    }
}
