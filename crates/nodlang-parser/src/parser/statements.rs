//! Statements, blocks and control flow.

use nodlang_core::coercion::is_implicitly_convertible;
use nodlang_core::id::{NodeId, PropertyId};
use nodlang_core::node::{
    ConditionalNode, ForLoopNode, InstructionNode, NodeKind, ScopeNode, WhileLoopNode, CONDITION_PROPERTY,
    FOR_CONDITION_PROPERTY, FOR_INIT_PROPERTY, FOR_ITERATION_PROPERTY, ROOT_PROPERTY,
};
use nodlang_core::stdlib::PRECEDENCE_ASSIGN;
use nodlang_core::token::TokenKind;
use nodlang_core::type_id::TypeId;

use super::{Attach, PResult, Parser};

impl Parser<'_> {
    /// `block := statement*`, stopping in front of `terminator`.
    pub(crate) fn parse_block(&mut self, scope: NodeId, terminator: TokenKind) -> PResult<()> {
        loop {
            match self.stream.peek_kind() {
                Some(kind) if kind == terminator => return Ok(()),
                None | Some(TokenKind::EndOfFile) => return Err(self.unexpected("`}`")),
                Some(_) => {
                    self.attempt(|p| p.parse_statement(scope))?;
                }
            }
        }
    }

    fn parse_statement(&mut self, scope: NodeId) -> PResult<NodeId> {
        let attach = Attach::Child(scope);
        match self.stream.peek_kind() {
            Some(TokenKind::KeywordIf) => self.parse_conditional(attach),
            Some(TokenKind::KeywordFor) => self.parse_for_loop(attach),
            Some(TokenKind::KeywordWhile) => self.parse_while_loop(attach),
            Some(TokenKind::ScopeOpen) => self.parse_scope(attach),
            _ => self.parse_instruction(attach),
        }
    }

    /// `instruction := expression? ';'`
    ///
    /// The `;` may be left out on the last statement of the program.
    fn parse_instruction(&mut self, attach: Attach) -> PResult<NodeId> {
        let offset = self.offset();
        let value = if self.stream.can_eat(TokenKind::EndOfInstruction) {
            None
        } else {
            Some(self.parse_expression(PRECEDENCE_ASSIGN)?)
        };

        let end = match self.stream.eat_if(TokenKind::EndOfInstruction) {
            Some(end) => Some(end),
            None if value.is_some() && self.stream.can_eat(TokenKind::EndOfFile) => None,
            None => return Err(self.unexpected("`;`")),
        };

        let node = self.graph.create_instruction(InstructionNode { end });
        self.track(node);
        if let Some(value) = value {
            self.connect_operand(value, PropertyId::new(node, ROOT_PROPERTY))?;
        }
        self.attach(attach, node, offset)?;
        Ok(node)
    }

    /// `scope := '{' block '}'`
    pub(crate) fn parse_scope(&mut self, attach: Attach) -> PResult<NodeId> {
        let open = self.expect(TokenKind::ScopeOpen, "`{`")?;
        let offset = open.word_offset();
        let node = self.graph.create_scope(ScopeNode {
            open: Some(open),
            close: None,
        });
        self.track(node);
        self.attach(attach, node, offset)?;

        self.within(node, |p| p.parse_block(node, TokenKind::ScopeClose))?;
        let close = self.expect(TokenKind::ScopeClose, "`}`")?;
        self.edit(node, |kind| {
            if let NodeKind::Scope(scope) = kind {
                scope.close = Some(close);
            }
        });
        Ok(node)
    }

    /// `conditional := 'if' '(' expression ')' scope ('else' (conditional | scope))?`
    fn parse_conditional(&mut self, attach: Attach) -> PResult<NodeId> {
        let keyword = self.expect(TokenKind::KeywordIf, "`if`")?;
        let offset = keyword.word_offset();
        let node = self.graph.create_conditional(ConditionalNode {
            keyword: Some(keyword),
            ..ConditionalNode::default()
        });
        self.track(node);
        self.attach(attach, node, offset)?;

        self.within(node, |p| {
            let open = p.expect(TokenKind::ParenOpen, "`(`")?;
            p.connect_condition(PropertyId::new(node, CONDITION_PROPERTY))?;
            let close = p.expect(TokenKind::ParenClose, "`)`")?;
            p.attempt(|p| p.parse_scope(Attach::Successor(node)))?;

            let else_keyword = p.stream.eat_if(TokenKind::KeywordElse);
            if else_keyword.is_some() {
                if p.stream.can_eat(TokenKind::KeywordIf) {
                    p.attempt(|p| p.parse_conditional(Attach::Successor(node)))?;
                } else {
                    p.attempt(|p| p.parse_scope(Attach::Successor(node)))?;
                }
            }

            p.edit(node, |kind| {
                if let NodeKind::Conditional(cond) = kind {
                    cond.open = Some(open);
                    cond.close = Some(close);
                    cond.else_keyword = else_keyword;
                }
            });
            Ok(node)
        })
    }

    /// `for_loop := 'for' '(' expression? ';' expression ';' expression? ')' scope`
    fn parse_for_loop(&mut self, attach: Attach) -> PResult<NodeId> {
        let keyword = self.expect(TokenKind::KeywordFor, "`for`")?;
        let offset = keyword.word_offset();
        let node = self.graph.create_for_loop(ForLoopNode {
            keyword: Some(keyword),
            ..ForLoopNode::default()
        });
        self.track(node);
        self.attach(attach, node, offset)?;

        self.within(node, |p| {
            let open = p.expect(TokenKind::ParenOpen, "`(`")?;
            if !p.stream.can_eat(TokenKind::EndOfInstruction) {
                let init = p.parse_expression(PRECEDENCE_ASSIGN)?;
                p.connect_operand(init, PropertyId::new(node, FOR_INIT_PROPERTY))?;
            }
            let init_end = p.expect(TokenKind::EndOfInstruction, "`;`")?;

            p.connect_condition(PropertyId::new(node, FOR_CONDITION_PROPERTY))?;
            let condition_end = p.expect(TokenKind::EndOfInstruction, "`;`")?;

            if !p.stream.can_eat(TokenKind::ParenClose) {
                let iteration = p.parse_expression(PRECEDENCE_ASSIGN)?;
                p.connect_operand(iteration, PropertyId::new(node, FOR_ITERATION_PROPERTY))?;
            }
            let close = p.expect(TokenKind::ParenClose, "`)`")?;
            p.attempt(|p| p.parse_scope(Attach::Successor(node)))?;

            p.edit(node, |kind| {
                if let NodeKind::ForLoop(for_loop) = kind {
                    for_loop.open = Some(open);
                    for_loop.init_end = Some(init_end);
                    for_loop.condition_end = Some(condition_end);
                    for_loop.close = Some(close);
                }
            });
            Ok(node)
        })
    }

    /// `while_loop := 'while' '(' expression ')' scope`
    fn parse_while_loop(&mut self, attach: Attach) -> PResult<NodeId> {
        let keyword = self.expect(TokenKind::KeywordWhile, "`while`")?;
        let offset = keyword.word_offset();
        let node = self.graph.create_while_loop(WhileLoopNode {
            keyword: Some(keyword),
            ..WhileLoopNode::default()
        });
        self.track(node);
        self.attach(attach, node, offset)?;

        self.within(node, |p| {
            let open = p.expect(TokenKind::ParenOpen, "`(`")?;
            p.connect_condition(PropertyId::new(node, CONDITION_PROPERTY))?;
            let close = p.expect(TokenKind::ParenClose, "`)`")?;
            p.attempt(|p| p.parse_scope(Attach::Successor(node)))?;

            p.edit(node, |kind| {
                if let NodeKind::WhileLoop(while_loop) = kind {
                    while_loop.open = Some(open);
                    while_loop.close = Some(close);
                }
            });
            Ok(node)
        })
    }

    /// Parses a condition and feeds it into `target`, which must accept a
    /// `bool`.
    fn connect_condition(&mut self, target: PropertyId) -> PResult<()> {
        let condition = self.parse_expression(PRECEDENCE_ASSIGN)?;
        if !is_implicitly_convertible(condition.ty, TypeId::BOOL, self.graph.types()) {
            return Err(Self::type_error(
                condition.offset,
                format!("condition must be `bool`, found `{}`", self.type_name(condition.ty)),
            ));
        }
        self.connect_operand(condition, target)
    }
}
