//! Token stream with nested transactions.
//!
//! The parser backtracks by opening a transaction before a production and
//! either committing it (keep the cursor where it is) or rolling it back
//! (restore the cursor saved when the transaction started). Transactions
//! nest without limit.

use nodlang_core::token::{Token, TokenKind};

use crate::error::Diagnostic;

/// Tokens, a cursor and a stack of saved cursor positions.
///
/// Invariant: `cursor <= tokens.len()`.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    cursor: usize,
    transactions: Vec<usize>,
    diagnostics: Vec<Diagnostic>,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>, diagnostics: Vec<Diagnostic>) -> Self {
        TokenStream {
            tokens,
            cursor: 0,
            transactions: Vec::new(),
            diagnostics,
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Lexical problems found while tokenizing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The lexical message recorded at `offset`, if any.
    pub fn diagnostic_at(&self, offset: usize) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.offset == offset)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    /// Looks `n` tokens past the cursor.
    pub fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + n)
    }

    pub fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(Token::kind)
    }

    pub fn can_eat(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// `true` if the next token has `kind` and spells `word`.
    pub fn can_eat_word(&self, kind: TokenKind, word: &str) -> bool {
        self.peek().is_some_and(|t| t.kind() == kind && t.word() == word)
    }

    /// Consumes the next token.
    pub fn eat(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(token)
    }

    /// Consumes the next token if it has `kind`.
    pub fn eat_if(&mut self, kind: TokenKind) -> Option<Token> {
        if self.can_eat(kind) {
            self.eat()
        } else {
            None
        }
    }

    /// Saves the cursor.
    pub fn start_transaction(&mut self) {
        self.transactions.push(self.cursor);
    }

    /// Drops the innermost saved cursor, keeping the current position.
    pub fn commit(&mut self) {
        let popped = self.transactions.pop();
        debug_assert!(popped.is_some(), "commit without a transaction");
    }

    /// Restores the innermost saved cursor.
    pub fn rollback(&mut self) {
        match self.transactions.pop() {
            Some(saved) => self.cursor = saved,
            None => debug_assert!(false, "rollback without a transaction"),
        }
    }

    pub fn transaction_depth(&self) -> usize {
        self.transactions.len()
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use proptest::prelude::*;

    #[test]
    fn eat_and_peek() {
        let mut stream = tokenize("a + 1;");
        assert!(stream.can_eat(TokenKind::Identifier));
        assert!(stream.eat_if(TokenKind::Operator).is_none());
        assert_eq!(stream.eat().unwrap().word(), "a");
        assert!(stream.can_eat_word(TokenKind::Operator, "+"));
        assert_eq!(stream.peek_at(1).unwrap().kind(), TokenKind::LiteralInt);
    }

    #[test]
    fn nested_transactions() {
        let mut stream = tokenize("a b c d");
        stream.start_transaction();
        stream.eat();
        stream.start_transaction();
        stream.eat();
        stream.eat();
        stream.rollback();
        assert_eq!(stream.cursor(), 1);
        stream.commit();
        assert_eq!(stream.cursor(), 1);
        assert_eq!(stream.transaction_depth(), 0);
    }

    #[test]
    fn cursor_stops_at_end() {
        let mut stream = tokenize("a");
        assert!(stream.eat().is_some());
        assert!(stream.eat().is_some());
        assert!(stream.eat().is_none());
        assert!(stream.is_at_end());
        assert_eq!(stream.cursor(), stream.len());
    }

    proptest! {
        #[test]
        fn rollback_restores_cursor(advance in prop::collection::vec(0usize..4, 1..8)) {
            let mut stream = tokenize("a b c d e f g h i j k l m n o p q r s t u v w x y z");
            let mut saved = Vec::new();
            for n in &advance {
                saved.push(stream.cursor());
                stream.start_transaction();
                for _ in 0..*n {
                    stream.eat();
                }
            }
            for expected in saved.into_iter().rev() {
                stream.rollback();
                prop_assert_eq!(stream.cursor(), expected);
            }
            prop_assert_eq!(stream.cursor(), 0);
            prop_assert!(stream.cursor() <= stream.len());
        }
    }
}
