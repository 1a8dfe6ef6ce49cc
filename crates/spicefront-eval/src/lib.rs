//! Expression engine and parameter scopes for Spicefront.
//!
//! Parameters live in a tree of [`Evaluator`] scopes, one per subcircuit
//! instance. Each scope tracks which parameters and named expressions read
//! which others, so reassigning a parameter refreshes exactly what depends
//! on it.
//!
//! # Example
//!
//! ```
//! use spicefront_eval::{Evaluator, EvaluatorSettings};
//!
//! let mut scope = Evaluator::new(EvaluatorSettings::default());
//! scope.set_parameter("a", "2").unwrap();
//! scope.set_parameter("b", "{a*3}").unwrap();
//! assert_eq!(scope.evaluate_double("b").unwrap(), 6.0);
//!
//! scope.set_parameter_value("a", 5.0).unwrap();
//! assert_eq!(scope.evaluate_double("b").unwrap(), 15.0);
//! ```

pub mod directives;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod names;
pub mod registry;
pub mod settings;

pub use directives::{
    Instance, apply_func, apply_param, flatten_conditionals, instantiate_subcircuit,
    process_statements,
};
pub use error::{Error, Result};
pub use evaluator::{ChangeAction, Evaluator, Origin, strip_delimiters};
pub use expression::{
    BinaryOp, Expr, FunctionDefinition, Scope, SignalContext, UnaryOp, parse_expression,
};
pub use names::ScopeNames;
pub use registry::{DependencyRegistry, Dependent};
pub use settings::EvaluatorSettings;
