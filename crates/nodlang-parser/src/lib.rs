//! Source text front end: lexer, transactional token stream, parser and
//! serializer.
//!
//! [`parse`] turns text into nodes and edges of a
//! [`Graph`](nodlang_core::graph::Graph) directly, without an intermediate
//! syntax tree. Tokens keep their surrounding whitespace and comments, so
//! [`serialize`] writes a parsed graph back to the exact same text.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod serializer;
pub mod stream;

pub use error::{Diagnostic, ParseError, ParserConfig};
pub use lexer::tokenize;
pub use parser::{parse, parse_with_config};
pub use serializer::serialize;
pub use stream::TokenStream;
