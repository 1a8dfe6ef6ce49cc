//! SPICE netlist reader for Spicefront.
//!
//! Text goes through three stages: a grammar-driven lexer, a parse-tree
//! generator and a parse-tree evaluator that produces the
//! [`spicefront_core::Netlist`] object model.
//!
//! # Example
//!
//! ```
//! use spicefront_parser::parse;
//!
//! let netlist = parse("Voltage Divider
//! V1 1 0 10
//! R1 1 2 1k
//! R2 2 0 1k
//! .end
//! ").unwrap();
//!
//! assert_eq!(netlist.title.as_deref(), Some("Voltage Divider"));
//! assert_eq!(netlist.components().count(), 3);
//! ```

pub mod error;
pub mod lexer;
pub mod options;
pub mod parser;

pub use error::{Error, Result};
pub use lexer::{SpiceLexer, SpiceToken, Token, TokenType};
pub use options::ReaderOptions;
pub use parser::{
    NetlistReader, ParseTreeEvaluator, ParseTreeGenerator, SpiceObject, Symbol, parse, parse_with,
};
