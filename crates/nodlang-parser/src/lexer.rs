//! Tokenizer.
//!
//! Logos recognizes the raw lexemes, trivia included. A second pass folds
//! the trivia into the significant tokens around them:
//!
//! - after a token, horizontal whitespace, one `//` comment and one newline
//!   become its suffix
//! - everything else becomes the prefix of the next token
//! - whatever trails the last token is the prefix of the `EndOfFile` token
//!
//! Tokenizing never fails. Input that does not lex becomes an `Unknown`
//! token and a [`Diagnostic`] is recorded at its offset, so concatenating the
//! token buffers always reproduces the source.

use std::ops::Range;

use logos::Logos;
use nodlang_core::token::{Token, TokenKind};

use crate::error::Diagnostic;
use crate::stream::TokenStream;

pub const UNTERMINATED_STRING: &str = "unterminated string literal";
pub const UNTERMINATED_COMMENT: &str = "unterminated block comment";
pub const UNEXPECTED_CHARACTER: &str = "unexpected character";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Raw {
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("{")]
    ScopeOpen,
    #[token("}")]
    ScopeClose,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,

    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("operator")]
    OperatorKeyword,

    #[token("bool")]
    #[token("int")]
    #[token("double")]
    #[token("string")]
    #[token("any")]
    Type,

    #[token("true")]
    #[token("false")]
    Bool,
    #[regex(r"[0-9]+\.[0-9]+")]
    Double,
    #[regex(r"[0-9]+")]
    Int,
    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    String,

    #[token("<=>")]
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token("=>")]
    #[token("&&")]
    #[token("||")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("=")]
    #[token("<")]
    #[token(">")]
    #[token("!")]
    Operator,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    #[regex(r"[ \t\r]+")]
    Whitespace,
    #[token("\n")]
    Newline,
    #[regex(r"//[^\n]*", allow_greedy = true)]
    LineComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,
}

impl Raw {
    fn token_kind(self) -> Option<TokenKind> {
        let kind = match self {
            Raw::ParenOpen => TokenKind::ParenOpen,
            Raw::ParenClose => TokenKind::ParenClose,
            Raw::ScopeOpen => TokenKind::ScopeOpen,
            Raw::ScopeClose => TokenKind::ScopeClose,
            Raw::Semicolon => TokenKind::EndOfInstruction,
            Raw::Comma => TokenKind::Separator,
            Raw::If => TokenKind::KeywordIf,
            Raw::Else => TokenKind::KeywordElse,
            Raw::For => TokenKind::KeywordFor,
            Raw::While => TokenKind::KeywordWhile,
            Raw::OperatorKeyword => TokenKind::KeywordOperator,
            Raw::Type => TokenKind::Type,
            Raw::Bool => TokenKind::LiteralBool,
            Raw::Double => TokenKind::LiteralDouble,
            Raw::Int => TokenKind::LiteralInt,
            Raw::String => TokenKind::LiteralString,
            Raw::Operator => TokenKind::Operator,
            Raw::Identifier => TokenKind::Identifier,
            Raw::Whitespace | Raw::Newline | Raw::LineComment | Raw::BlockComment => return None,
        };
        Some(kind)
    }
}

/// One lexeme of the first pass.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Lexeme {
    Token(TokenKind),
    Whitespace,
    Newline,
    LineComment,
    BlockComment,
}

impl From<Raw> for Lexeme {
    fn from(raw: Raw) -> Self {
        match raw {
            Raw::Whitespace => Lexeme::Whitespace,
            Raw::Newline => Lexeme::Newline,
            Raw::LineComment => Lexeme::LineComment,
            Raw::BlockComment => Lexeme::BlockComment,
            other => Lexeme::Token(other.token_kind().unwrap_or(TokenKind::Unknown)),
        }
    }
}

/// Splits `source` into tokens. Total: never fails, never drops input.
pub fn tokenize(source: &str) -> TokenStream {
    let (lexemes, diagnostics) = lex(source);
    let mut tokens = Vec::new();
    let mut prefix_start = 0;
    let mut i = 0;

    while i < lexemes.len() {
        let (lexeme, span) = &lexemes[i];
        let kind = match lexeme {
            Lexeme::Token(kind) => *kind,
            _ => {
                i += 1;
                continue;
            }
        };

        let mut suffix_end = span.end;
        let mut j = i + 1;
        while let Some((next, next_span)) = lexemes.get(j) {
            match next {
                Lexeme::Whitespace | Lexeme::LineComment => {
                    suffix_end = next_span.end;
                    j += 1;
                }
                Lexeme::Newline => {
                    suffix_end = next_span.end;
                    j += 1;
                    break;
                }
                _ => break,
            }
        }

        tokens.push(Token::new(
            kind,
            &source[prefix_start..span.start],
            &source[span.clone()],
            &source[span.end..suffix_end],
            prefix_start,
        ));
        prefix_start = suffix_end;
        i = j;
    }

    tokens.push(Token::new(TokenKind::EndOfFile, &source[prefix_start..], "", "", prefix_start));
    TokenStream::new(tokens, diagnostics)
}

fn lex(source: &str) -> (Vec<(Lexeme, Range<usize>)>, Vec<Diagnostic>) {
    let mut lexemes = Vec::new();
    let mut diagnostics = Vec::new();
    let mut lexer = Raw::lexer(source);
    let mut error_start: Option<usize> = None;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let rest = &source[span.start..];
        let unterminated = if rest.starts_with('"') && result.is_err() {
            Some(UNTERMINATED_STRING)
        } else if rest.starts_with("/*") && result != Ok(Raw::BlockComment) {
            // a complete comment always wins the longest match
            Some(UNTERMINATED_COMMENT)
        } else {
            None
        };

        if let Some(message) = unterminated {
            flush_errors(source, &mut lexemes, &mut diagnostics, error_start.take(), span.start);
            lexemes.push((Lexeme::Token(TokenKind::Unknown), span.start..source.len()));
            diagnostics.push(Diagnostic::new(source, span.start, message));
            return (lexemes, diagnostics);
        }

        match result {
            Ok(raw) => {
                flush_errors(source, &mut lexemes, &mut diagnostics, error_start.take(), span.start);
                lexemes.push((Lexeme::from(raw), span));
            }
            Err(()) => {
                error_start.get_or_insert(span.start);
            }
        }
    }
    flush_errors(source, &mut lexemes, &mut diagnostics, error_start.take(), source.len());

    (lexemes, diagnostics)
}

/// Emits one `Unknown` token for a run of characters that did not lex.
fn flush_errors(
    source: &str,
    lexemes: &mut Vec<(Lexeme, Range<usize>)>,
    diagnostics: &mut Vec<Diagnostic>,
    start: Option<usize>,
    end: usize,
) {
    if let Some(start) = start {
        lexemes.push((Lexeme::Token(TokenKind::Unknown), start..end));
        diagnostics.push(Diagnostic::new(source, start, UNEXPECTED_CHARACTER));
    }
}

/// Decodes the body of a string literal token (quotes included).
pub fn unescape(word: &str) -> String {
    let body = word
        .strip_prefix('"')
        .and_then(|w| w.strip_suffix('"'))
        .unwrap_or(word);
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).tokens().iter().map(|t| t.kind()).collect()
    }

    fn words(source: &str) -> Vec<String> {
        tokenize(source).tokens().iter().map(|t| t.word().to_string()).collect()
    }

    fn concat(stream: &TokenStream) -> String {
        stream.tokens().iter().map(|t| t.buffer()).collect()
    }

    #[test]
    fn declaration() {
        assert_eq!(
            kinds("double a = 10.5;"),
            vec![
                TokenKind::Type,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::LiteralDouble,
                TokenKind::EndOfInstruction,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(words("a<=>b"), vec!["a", "<=>", "b", ""]);
        assert_eq!(words("a<=b"), vec!["a", "<=", "b", ""]);
        assert_eq!(words("x+=1"), vec!["x", "+=", "1", ""]);
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(
            kinds("if iffy integer int"),
            vec![
                TokenKind::KeywordIf,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Type,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn suffix_takes_trailing_comment_and_one_newline() {
        let stream = tokenize("a; // first\n\n/* doc */ b;");
        let tokens = stream.tokens();
        assert_eq!(tokens[1].word(), ";");
        assert_eq!(tokens[1].suffix(), " // first\n");
        assert_eq!(tokens[2].prefix(), "\n/* doc */ ");
        assert_eq!(tokens[2].word(), "b");
    }

    #[test]
    fn trailing_trivia_goes_to_end_of_file() {
        let stream = tokenize("a;\n\n  // done\n");
        let eof = stream.tokens().last().unwrap();
        assert_eq!(eof.kind(), TokenKind::EndOfFile);
        assert_eq!(eof.prefix(), "\n  // done\n");
        assert_eq!(eof.offset(), 3);
    }

    #[test]
    fn unterminated_string_is_unknown_to_the_end() {
        let source = "string s = \"abc;\nint x;";
        let stream = tokenize(source);
        let unknown = &stream.tokens()[3];
        assert_eq!(unknown.kind(), TokenKind::Unknown);
        assert_eq!(unknown.word_offset(), 11);
        assert_eq!(unknown.word(), "\"abc;\nint x;");
        assert_eq!(stream.diagnostics()[0].offset, 11);
        assert_eq!(stream.diagnostics()[0].message, UNTERMINATED_STRING);
        assert_eq!(concat(&stream), source);
    }

    #[test]
    fn unterminated_block_comment() {
        let stream = tokenize("a; /* never closed");
        assert_eq!(stream.diagnostics()[0].message, UNTERMINATED_COMMENT);
        assert_eq!(stream.diagnostics()[0].offset, 3);
    }

    #[test]
    fn stray_characters_coalesce() {
        let stream = tokenize("a @@# b");
        assert_eq!(
            stream.tokens().iter().map(|t| t.kind()).collect::<Vec<_>>(),
            vec![TokenKind::Identifier, TokenKind::Unknown, TokenKind::Identifier, TokenKind::EndOfFile]
        );
        assert_eq!(stream.tokens()[1].word(), "@@#");
        assert_eq!(stream.diagnostics().len(), 1);
    }

    #[test]
    fn unescape_handles_common_escapes() {
        assert_eq!(unescape(r#""a\nb\"c\\""#), "a\nb\"c\\");
    }

    proptest! {
        #[test]
        fn lexing_is_lossless(source in "\\PC{0,64}") {
            prop_assert_eq!(concat(&tokenize(&source)), source);
        }

        #[test]
        fn lexing_code_like_text_is_lossless(
            source in r#"([a-z0-9_ \t\n;,(){}+*/<>=!&|"-]|//|/\*|\*/|\.){0,80}"#
        ) {
            let stream = tokenize(&source);
            prop_assert_eq!(concat(&stream), source.clone());
            prop_assert_eq!(stream.tokens().last().map(|t| t.kind()), Some(TokenKind::EndOfFile));
        }
    }
}
