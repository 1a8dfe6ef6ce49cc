//! Error types for spicefront-eval.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed expression text.
    #[error("syntax error in {expression:?} at position {position}: {message}")]
    Syntax {
        expression: String,
        position: usize,
        message: String,
    },

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function {function} expects {expected} arguments, found {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    /// A parameter (or user function) refers back to itself.
    #[error("cyclic dependency through {0}")]
    CyclicDependency(String),

    /// `V()` or `I()` used where no signal values are available.
    #[error("unresolved signal: {0}")]
    UnresolvedSignal(String),

    #[error("invalid {directive} directive: {message}")]
    InvalidDirective { directive: String, message: String },

    #[error("unknown scope: {0}")]
    UnknownScope(String),
}

pub type Result<T> = std::result::Result<T, Error>;
