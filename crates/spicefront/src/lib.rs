//! # Spicefront
//!
//! A SPICE netlist front end: a grammar-driven reader that turns netlist
//! text into an object model, and a tree of parameter scopes that evaluates
//! `.PARAM`/`.FUNC` expressions, keeps dependent values up to date and
//! expands subcircuit instances.
//!
//! ## Quick Start
//!
//! ```rust
//! use spicefront::prelude::*;
//!
//! let design = spicefront::load(
//!     "Divider
//! .PARAM rtot=10k
//! .SUBCKT half a b params: share=0.5
//! R1 a b {rtot*share}
//! .ENDS
//! X1 in mid half
//! X2 mid 0 half share=0.25
//! .END
//! ",
//! )
//! .unwrap();
//!
//! assert_eq!(design.components().count(), 2);
//! assert_eq!(design.scope("x2").unwrap().evaluate_double("rtot*share").unwrap(), 2500.0);
//! ```

pub mod elaborate;

pub use spicefront_core as core;
pub use spicefront_eval as eval;
pub use spicefront_parser as parser;

pub use elaborate::{Design, ScopedStatement, elaborate};

// ============================================================================
// Convenient re-exports
// ============================================================================

pub use spicefront_core::{Netlist, Parameter, Statement, SubcircuitDefinition};
pub use spicefront_eval::{
    Error as EvalError, Evaluator, EvaluatorSettings, Expr, ScopeNames, SignalContext,
};
pub use spicefront_parser::{
    Error as ParseError, NetlistReader, ReaderOptions, Symbol, parse, parse_with,
};

use thiserror::Error;

/// Failure while reading or elaborating a netlist.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parse and elaborate netlist text with default options.
pub fn load(text: &str) -> Result<Design> {
    load_with(text, &ReaderOptions::default(), EvaluatorSettings::default())
}

pub fn load_with(
    text: &str,
    options: &ReaderOptions,
    settings: EvaluatorSettings,
) -> Result<Design> {
    let netlist = parse_with(text, options)?;
    Ok(elaborate(&netlist, settings)?)
}

/// Prelude module containing commonly used types.
///
/// ```rust
/// use spicefront::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Design, ScopedStatement, elaborate, load, load_with};
    pub use crate::{Evaluator, EvaluatorSettings, Expr, ScopeNames, SignalContext};
    pub use crate::{Netlist, Parameter, Statement, SubcircuitDefinition};
    pub use crate::{NetlistReader, ReaderOptions, parse, parse_with};
}
