//! Parse errors and serializable diagnostics.
//!
//! [`ParseError`] is what a failed [`parse`](crate::parse) returns. Inside the
//! parser the same type drives backtracking: a production that fails is
//! rolled back and its error is kept only if it got further into the source
//! than any other failure so far.

use nodlang_core::error::GraphError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing source text into a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The token stream does not match the grammar.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// The text is well formed but its types do not line up.
    #[error("type error at offset {offset}: {message}")]
    Type { offset: usize, message: String },

    /// The source ended while a production still needed tokens.
    #[error("unexpected end of input at offset {offset}: expected {expected}")]
    UnexpectedEnd { offset: usize, expected: String },

    /// A graph mutation was refused.
    #[error("at offset {offset}: {source}")]
    Graph {
        offset: usize,
        #[source]
        source: GraphError,
    },
}

impl ParseError {
    /// Source offset the error points at.
    pub fn offset(&self) -> usize {
        match self {
            ParseError::Syntax { offset, .. }
            | ParseError::Type { offset, .. }
            | ParseError::UnexpectedEnd { offset, .. }
            | ParseError::Graph { offset, .. } => *offset,
        }
    }

    /// Message without the offset prefix.
    pub fn message(&self) -> String {
        match self {
            ParseError::Syntax { message, .. } | ParseError::Type { message, .. } => message.clone(),
            ParseError::UnexpectedEnd { expected, .. } => format!("unexpected end of input, expected {expected}"),
            ParseError::Graph { source, .. } => source.to_string(),
        }
    }

    /// Converts into a diagnostic with line and column resolved against
    /// `source`.
    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        Diagnostic::new(source, self.offset(), self.message())
    }
}

/// An `(offset, message)` pair, plus 1-based line and column for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_column(source, offset);
        Diagnostic {
            offset,
            line,
            column,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

/// Parser behavior switches.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    /// Reject undeclared identifiers and unknown functions instead of
    /// building placeholder nodes for them.
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_and_column_are_one_based() {
        let source = "int a;\nint b = \"x";
        let diag = Diagnostic::new(source, 15, "unterminated string literal");
        assert_eq!((diag.line, diag.column), (2, 9));
        assert_eq!(diag.to_string(), "2:9: unterminated string literal");
    }

    #[test]
    fn diagnostic_serializes() {
        let diag = ParseError::Type {
            offset: 8,
            message: "narrowing conversion from `double` to `int`".into(),
        }
        .to_diagnostic("int i = 15.5");
        insta::assert_json_snapshot!(diag, @r#"
        {
          "offset": 8,
          "line": 1,
          "column": 9,
          "message": "narrowing conversion from `double` to `int`"
        }
        "#);
    }
}
