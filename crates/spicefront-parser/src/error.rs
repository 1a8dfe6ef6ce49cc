//! Error types for spicefront-parser.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No lexer rule accepts the text at the current position.
    #[error("lexical error at line {line}: unexpected text {text:?}")]
    Lexical { text: String, line: usize },

    /// No production of `expected` matches the remaining tokens.
    #[error("syntax error at line {line}: expected {expected}, found {found}")]
    Syntax {
        expected: String,
        found: String,
        line: usize,
    },

    /// The parse tree does not have the shape a builder expects.
    #[error("translation error in {symbol}: {message}")]
    Translation { symbol: String, message: String },

    #[error("unknown grammar symbol: {0}")]
    UnknownSymbol(String),

    /// A lexer rule could not be compiled.
    #[error("invalid lexer rule {rule}: {message}")]
    InvalidRule { rule: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
