//! Lexical tokens.
//!
//! A [`Token`] owns its slice of the source as `prefix + word + suffix`. The
//! prefix and suffix carry the whitespace and comments around the
//! significant word, so a graph that keeps its tokens can be serialized back
//! into the exact text it was parsed from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind tag of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Identifier,
    Operator,
    /// Type keyword (`int`, `double`, ...).
    Type,
    LiteralBool,
    LiteralInt,
    LiteralDouble,
    LiteralString,
    KeywordIf,
    KeywordElse,
    KeywordFor,
    KeywordWhile,
    KeywordOperator,
    ParenOpen,
    ParenClose,
    ScopeOpen,
    ScopeClose,
    EndOfInstruction,
    Separator,
    /// Terminal token. Its prefix holds whatever trails the last word.
    EndOfFile,
    /// Unrecognized input, kept so the parser can report it precisely.
    Unknown,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::LiteralBool
                | TokenKind::LiteralInt
                | TokenKind::LiteralDouble
                | TokenKind::LiteralString
        )
    }
}

/// A lexed token.
///
/// Invariant: `word_start + word_len <= buffer.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    kind: TokenKind,
    buffer: String,
    word_start: usize,
    word_len: usize,
    /// Source offset of the first byte of `buffer`.
    offset: usize,
}

impl Token {
    /// Builds a token from its three parts. `offset` is the source position
    /// of the first prefix byte.
    pub fn new(kind: TokenKind, prefix: &str, word: &str, suffix: &str, offset: usize) -> Self {
        let mut buffer = String::with_capacity(prefix.len() + word.len() + suffix.len());
        buffer.push_str(prefix);
        buffer.push_str(word);
        buffer.push_str(suffix);
        Token {
            kind,
            buffer,
            word_start: prefix.len(),
            word_len: word.len(),
            offset,
        }
    }

    /// A token that never came from source text (graph edits, tests).
    pub fn synthetic(kind: TokenKind, word: &str) -> Self {
        Token::new(kind, "", word, "", 0)
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn word(&self) -> &str {
        &self.buffer[self.word_start..self.word_start + self.word_len]
    }

    pub fn prefix(&self) -> &str {
        &self.buffer[..self.word_start]
    }

    pub fn suffix(&self) -> &str {
        &self.buffer[self.word_start + self.word_len..]
    }

    /// The full text, prefix and suffix included.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Source offset of the buffer start.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Source offset of the significant word.
    pub fn word_offset(&self) -> usize {
        self.offset + self.word_start
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Prepends text to the prefix.
    pub fn prepend_prefix(&mut self, text: &str) {
        self.buffer.insert_str(0, text);
        self.word_start += text.len();
        self.offset = self.offset.saturating_sub(text.len());
    }

    /// Appends text to the suffix.
    pub fn append_suffix(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Removes and returns the prefix.
    pub fn take_prefix(&mut self) -> String {
        let prefix: String = self.buffer.drain(..self.word_start).collect();
        self.offset += prefix.len();
        self.word_start = 0;
        prefix
    }

    /// Removes and returns the suffix.
    pub fn take_suffix(&mut self) -> String {
        self.buffer.split_off(self.word_start + self.word_len)
    }

    /// Moves this token's suffix to the front of `next`'s prefix.
    pub fn transfer_suffix_to(&mut self, next: &mut Token) {
        let suffix = self.take_suffix();
        next.prepend_prefix(&suffix);
    }

    /// Moves this token's prefix to the end of `previous`'s suffix.
    pub fn transfer_prefix_to(&mut self, previous: &mut Token) {
        let prefix = self.take_prefix();
        previous.append_suffix(&prefix);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_and_offsets() {
        let token = Token::new(TokenKind::Identifier, "  ", "abc", " // note\n", 10);
        assert_eq!(token.word(), "abc");
        assert_eq!(token.prefix(), "  ");
        assert_eq!(token.suffix(), " // note\n");
        assert_eq!(token.offset(), 10);
        assert_eq!(token.word_offset(), 12);
        assert_eq!(token.to_string(), "  abc // note\n");
    }

    #[test]
    fn take_prefix_moves_offset() {
        let mut token = Token::new(TokenKind::Operator, " \t", "+", "", 4);
        assert_eq!(token.take_prefix(), " \t");
        assert_eq!(token.buffer(), "+");
        assert_eq!(token.word_offset(), 6);
        assert_eq!(token.offset(), 6);
    }

    #[test]
    fn transfer_suffix_keeps_text() {
        let mut a = Token::new(TokenKind::Identifier, "", "a", "  ", 0);
        let mut b = Token::new(TokenKind::Operator, " ", "+", "", 3);
        a.transfer_suffix_to(&mut b);
        assert_eq!(a.buffer(), "a");
        assert_eq!(b.prefix(), "   ");
        assert_eq!(b.word(), "+");
        assert_eq!(format!("{a}{b}"), "a   +");
    }

    #[test]
    fn transfer_prefix_keeps_text() {
        let mut a = Token::new(TokenKind::Identifier, "", "a", "", 0);
        let mut b = Token::new(TokenKind::Operator, " ", "+", "", 1);
        b.transfer_prefix_to(&mut a);
        assert_eq!(a.suffix(), " ");
        assert_eq!(b.prefix(), "");
        assert_eq!(format!("{a}{b}"), "a +");
    }
}
