//! Expressions: precedence climbing over the language's operator table.

use std::sync::Arc;

use nodlang_core::coercion::{is_implicitly_convertible, is_narrowing};
use nodlang_core::edge::OperandSyntax;
use nodlang_core::error::GraphError;
use nodlang_core::id::{InvokableId, NodeId, PropertyId};
use nodlang_core::language::Language;
use nodlang_core::node::{FunctionNode, NodeKind, VALUE_PROPERTY};
use nodlang_core::signature::{Arity, Associativity};
use nodlang_core::stdlib::PRECEDENCE_ASSIGN;
use nodlang_core::token::{Token, TokenKind};
use nodlang_core::type_id::TypeId;
use nodlang_core::variant::Variant;
use tracing::trace;

use super::{PResult, Parser};
use crate::error::ParseError;
use crate::lexer::unescape;

/// A parsed expression: the property holding its value and the text that
/// wrapped it.
#[derive(Debug, Clone)]
pub(crate) struct Operand {
    pub node: NodeId,
    pub output: PropertyId,
    pub ty: TypeId,
    /// Reference token and parentheses, stored on the edge consuming this
    /// operand.
    pub syntax: OperandSyntax,
    /// Declared or referenced variable, usable where a reference is needed.
    pub is_variable: bool,
    pub offset: usize,
}

impl Operand {
    fn of(node: NodeId, output: u16, ty: TypeId, offset: usize) -> Self {
        Operand {
            node,
            output: PropertyId::new(node, output),
            ty,
            syntax: OperandSyntax::default(),
            is_variable: false,
            offset,
        }
    }
}

impl Parser<'_> {
    /// `expression := operand (binary_op expression)*`
    ///
    /// Only operators binding at least as tight as `min_precedence` are
    /// consumed. When the text after an operator does not parse, the
    /// expression ends in front of that operator.
    ///
    /// An operator whose operands parse but match no overload does not end
    /// the expression. The type error is returned as is, at the operator's
    /// offset (`true * 2` fails at `*`), instead of rolling back and letting
    /// the caller trip over the operator token as unexpected text.
    pub(crate) fn parse_expression(&mut self, min_precedence: u8) -> PResult<Operand> {
        let mut lhs = self.attempt(Self::parse_operand)?;

        loop {
            let Some(token) = self.stream.peek() else {
                break;
            };
            if !token.is(TokenKind::Operator) {
                break;
            }
            let Some(info) = self.language().find_operator(token.word(), Arity::Binary) else {
                break;
            };
            if info.precedence < min_precedence {
                break;
            }
            let next_min = match info.associativity {
                Associativity::Left => info.precedence.saturating_add(1),
                Associativity::Right => info.precedence,
            };

            let left = lhs.clone();
            match self.attempt(|p| p.parse_binary(left, next_min)) {
                Ok(combined) => lhs = combined,
                // Types are settled once the operands parse; no other
                // reading of the text would fix them.
                Err(err @ ParseError::Type { .. }) => return Err(err),
                Err(_) => break,
            }
        }

        Ok(lhs)
    }

    fn parse_binary(&mut self, lhs: Operand, min_precedence: u8) -> PResult<Operand> {
        let op = self.expect(TokenKind::Operator, "an operator")?;
        let rhs = self.parse_expression(min_precedence)?;
        let offset = lhs.offset;
        self.build_operator(op, vec![lhs, rhs], offset)
    }

    fn parse_operand(&mut self) -> PResult<Operand> {
        let next_is_call = self
            .stream
            .peek_at(1)
            .is_some_and(|t| t.is(TokenKind::ParenOpen));

        match self.stream.peek_kind() {
            Some(TokenKind::ParenOpen) => self.parse_parenthesized(),
            Some(TokenKind::Operator) => self.parse_unary(),
            Some(TokenKind::KeywordOperator) => self.parse_call(),
            Some(TokenKind::Identifier) if next_is_call => self.parse_call(),
            Some(TokenKind::Identifier) => self.parse_reference(),
            Some(TokenKind::Type) => self.parse_declaration(),
            Some(kind) if kind.is_literal() => self.parse_literal(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// `'(' expression ')'`
    fn parse_parenthesized(&mut self) -> PResult<Operand> {
        let open = self.expect(TokenKind::ParenOpen, "`(`")?;
        let mut inner = self.parse_expression(PRECEDENCE_ASSIGN)?;
        let close = self.expect(TokenKind::ParenClose, "`)`")?;
        inner.syntax.parens.push((open, close));
        Ok(inner)
    }

    /// `unary_op expression`
    fn parse_unary(&mut self) -> PResult<Operand> {
        let info = self
            .stream
            .peek()
            .and_then(|t| self.language().find_operator(t.word(), Arity::Unary));
        let Some(info) = info else {
            return Err(self.unexpected("an expression"));
        };
        let op = self.expect(TokenKind::Operator, "an operator")?;
        let offset = op.word_offset();
        let operand = self.parse_expression(info.precedence)?;
        self.build_operator(op, vec![operand], offset)
    }

    /// `IDENT '(' args ')'` or `'operator' OP '(' args ')'`
    fn parse_call(&mut self) -> PResult<Operand> {
        let keyword = self.stream.eat_if(TokenKind::KeywordOperator);
        let identifier_token = match keyword {
            Some(_) => self.expect(TokenKind::Operator, "an operator")?,
            None => self.expect(TokenKind::Identifier, "a function name")?,
        };
        let offset = keyword.as_ref().unwrap_or(&identifier_token).word_offset();
        let open = self.expect(TokenKind::ParenOpen, "`(`")?;

        let mut args = Vec::new();
        let mut separators = Vec::new();
        if !self.stream.can_eat(TokenKind::ParenClose) {
            loop {
                args.push(self.parse_expression(PRECEDENCE_ASSIGN)?);
                match self.stream.eat_if(TokenKind::Separator) {
                    Some(separator) => separators.push(separator),
                    None => break,
                }
            }
        }
        let close = self.expect(TokenKind::ParenClose, "`)` or `,`")?;

        let identifier = identifier_token.word().to_string();
        let language = Arc::clone(self.graph.language());
        let types: Vec<TypeId> = args.iter().map(|a| a.ty).collect();
        let invokable = language.find_invokable(&identifier, &types);
        match invokable {
            Some(id) => self.check_arguments(&language, id, &args)?,
            None if keyword.is_some() || language.has_identifier(&identifier) => {
                return Err(Self::type_error(
                    offset,
                    format!("no overload of `{identifier}` accepts ({})", self.type_list(&types)),
                ));
            }
            None if self.strict => {
                return Err(ParseError::Syntax {
                    offset,
                    message: format!("unknown function `{identifier}`"),
                });
            }
            None => trace!(identifier = %identifier, "unresolved call"),
        }

        let return_type = match invokable.and_then(|id| language.invokable(id)) {
            Some(inv) => inv.signature.return_type,
            None => TypeId::ANY,
        };
        let arg_count = args.len();
        let syntax = FunctionNode {
            identifier,
            keyword,
            identifier_token: Some(identifier_token),
            open: Some(open),
            separators,
            close: Some(close),
        };
        let node = self
            .graph
            .create_function(syntax, invokable, arg_count)
            .map_err(Self::graph_error(offset))?;
        self.track(node);
        self.connect_operands(node, args)?;

        Ok(Operand::of(node, arg_count as u16, return_type, offset))
    }

    /// A name that is not followed by `(`.
    fn parse_reference(&mut self) -> PResult<Operand> {
        let token = self.expect(TokenKind::Identifier, "a name")?;
        let offset = token.word_offset();
        let found = self
            .current_scope()
            .and_then(|scope| self.graph.find_variable(scope, token.word()));

        let (node, ty) = match found {
            Some(var) => {
                let ty = self
                    .graph
                    .node(var)
                    .and_then(|n| n.as_variable())
                    .map_or(TypeId::ANY, |v| v.ty);
                (var, ty)
            }
            None if self.strict => {
                return Err(ParseError::Syntax {
                    offset,
                    message: format!("undeclared variable `{}`", token.word()),
                });
            }
            None => {
                let var = self.graph.create_variable(TypeId::ANY, token.clone(), None);
                trace!(name = token.word(), %var, "undeclared variable");
                (self.track(var), TypeId::ANY)
            }
        };

        Ok(Operand {
            syntax: OperandSyntax::reference(token),
            is_variable: true,
            ..Operand::of(node, VALUE_PROPERTY, ty, offset)
        })
    }

    /// `type IDENT ('=' expression)?`
    fn parse_declaration(&mut self) -> PResult<Operand> {
        let type_token = self.expect(TokenKind::Type, "a type")?;
        let offset = type_token.word_offset();
        let ty = self
            .language()
            .type_from_keyword(type_token.word())
            .ok_or_else(|| Self::type_error(offset, format!("unknown type `{}`", type_token.word())))?;
        let identifier = self.expect(TokenKind::Identifier, "a variable name")?;
        let name_offset = identifier.word_offset();
        let scope = self.current_scope().ok_or_else(|| ParseError::Syntax {
            offset,
            message: "declaration outside of any scope".to_string(),
        })?;

        let var = self.graph.create_variable(ty, identifier, Some(type_token));
        self.track(var);
        if self.stream.can_eat_word(TokenKind::Operator, "=") {
            let assign = self.expect(TokenKind::Operator, "`=`")?;
            let value = self.parse_expression(PRECEDENCE_ASSIGN)?;
            let types = self.graph.types();
            if !is_implicitly_convertible(value.ty, ty, types) {
                return Err(Self::type_error(
                    value.offset,
                    format!(
                        "cannot initialize `{}` with a value of type `{}`",
                        self.type_name(ty),
                        self.type_name(value.ty)
                    ),
                ));
            }
            if is_narrowing(value.ty, ty, types) {
                return Err(self.narrowing_error(value.offset, value.ty, ty));
            }
            self.connect_operand(value, PropertyId::new(var, VALUE_PROPERTY))?;
            self.edit(var, |kind| {
                if let NodeKind::Variable(v) = kind {
                    v.assign = Some(assign);
                }
            });
        }

        // Declared after the initializer: `int a = a` reads the outer `a`.
        self.graph.declare_variable(scope, var).map_err(|err| match err {
            GraphError::DuplicateVariable { name, .. } => Self::type_error(
                name_offset,
                format!("variable `{name}` is already declared in this scope"),
            ),
            source => ParseError::Graph {
                offset: name_offset,
                source,
            },
        })?;

        Ok(Operand {
            is_variable: true,
            ..Operand::of(var, VALUE_PROPERTY, ty, offset)
        })
    }

    fn parse_literal(&mut self) -> PResult<Operand> {
        let offset = self.offset();
        let is_literal = self.stream.peek().is_some_and(|t| t.kind().is_literal());
        let Some(token) = is_literal.then(|| self.stream.eat()).flatten() else {
            return Err(self.unexpected("a literal"));
        };

        let invalid = |what: &str| ParseError::Syntax {
            offset,
            message: format!("invalid {what} literal `{}`", token.word()),
        };
        let (ty, value) = match token.kind() {
            TokenKind::LiteralBool => (TypeId::BOOL, Variant::Bool(token.word() == "true")),
            TokenKind::LiteralInt => {
                let value = token.word().parse::<i64>().map_err(|_| invalid("integer"))?;
                (TypeId::INT, Variant::Int(value))
            }
            TokenKind::LiteralDouble => {
                let value = token.word().parse::<f64>().map_err(|_| invalid("number"))?;
                (TypeId::DOUBLE, Variant::Double(value))
            }
            _ => (TypeId::STRING, Variant::String(unescape(token.word()))),
        };

        let node = self.graph.create_literal(ty, value, Some(token));
        self.track(node);
        Ok(Operand::of(node, VALUE_PROPERTY, ty, offset))
    }

    // -----------------------------------------------------------------------
    // Node construction
    // -----------------------------------------------------------------------

    /// Resolves the overload for `op` and builds the operator node.
    fn build_operator(&mut self, op: Token, operands: Vec<Operand>, offset: usize) -> PResult<Operand> {
        let language = Arc::clone(self.graph.language());
        let identifier = op.word().to_string();
        let op_offset = op.word_offset();
        let types: Vec<TypeId> = operands.iter().map(|o| o.ty).collect();

        let id = language.find_invokable(&identifier, &types).ok_or_else(|| {
            Self::type_error(
                op_offset,
                format!("no operator `{identifier}` accepts ({})", self.type_list(&types)),
            )
        })?;
        self.check_arguments(&language, id, &operands)?;

        let return_type = language
            .invokable(id)
            .map_or(TypeId::ANY, |inv| inv.signature.return_type);
        let node = self
            .graph
            .create_operator(id, Some(op))
            .map_err(Self::graph_error(op_offset))?;
        self.track(node);
        let arg_count = operands.len();
        self.connect_operands(node, operands)?;

        Ok(Operand::of(node, arg_count as u16, return_type, offset))
    }

    /// Reference parameters need a variable, and an assignment may not
    /// narrow its value.
    fn check_arguments(&self, language: &Language, id: InvokableId, operands: &[Operand]) -> PResult<()> {
        let Some(invokable) = language.invokable(id) else {
            let offset = operands.first().map_or(self.offset(), |o| o.offset);
            return Err(ParseError::Graph {
                offset,
                source: GraphError::InvokableNotFound { id },
            });
        };
        let signature = &invokable.signature;
        let types = language.types();

        for (arg, operand) in signature.args.iter().zip(operands) {
            if types.is_reference(arg.ty) && !operand.is_variable {
                return Err(Self::type_error(
                    operand.offset,
                    format!("`{}` needs a variable as its {} operand", signature.identifier, arg.name),
                ));
            }
        }

        let assigns = signature.args.first().is_some_and(|a| types.is_reference(a.ty));
        if assigns {
            for (arg, operand) in signature.args.iter().zip(operands).skip(1) {
                if is_narrowing(operand.ty, arg.ty, types) {
                    return Err(self.narrowing_error(operand.offset, operand.ty, arg.ty));
                }
            }
        }
        Ok(())
    }

    fn narrowing_error(&self, offset: usize, from: TypeId, to: TypeId) -> ParseError {
        Self::type_error(
            offset,
            format!(
                "narrowing conversion from `{}` to `{}`",
                self.type_name(from),
                self.type_name(to)
            ),
        )
    }

    fn connect_operands(&mut self, node: NodeId, operands: Vec<Operand>) -> PResult<()> {
        for (index, operand) in operands.into_iter().enumerate() {
            self.connect_operand(operand, PropertyId::new(node, index as u16))?;
        }
        Ok(())
    }

    pub(crate) fn connect_operand(&mut self, operand: Operand, target: PropertyId) -> PResult<()> {
        self.graph
            .connect_input(operand.output, target, operand.syntax)
            .map(|_| ())
            .map_err(Self::graph_error(operand.offset))
    }

    fn type_list(&self, types: &[TypeId]) -> String {
        types
            .iter()
            .map(|ty| self.type_name(*ty))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
