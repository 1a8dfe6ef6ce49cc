//! Statement parameters.

use serde::{Deserialize, Serialize};

/// One parameter of a statement, as written in the netlist.
///
/// Parameters keep their raw text; numeric interpretation is left to
/// [`crate::units::parse_value`] or to an expression evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Parameter {
    /// A bare word such as a node name or a model name.
    Word(String),
    /// A numeric literal, possibly with a suffix (`10k`, `3,14`, `5%`).
    Value(String),
    /// An identifier that is not a plain word (contains `#`, `@`, `\`, ...).
    Identifier(String),
    /// A device/model property reference, `@name[prop]`.
    Reference(String),
    /// A quoted string, without the quotes.
    String(String),
    /// An expression, without the surrounding braces or quotes.
    Expression(String),
    /// Comma-separated list of single parameters (`1,2,3`).
    Vector(Vec<Parameter>),
    /// A name followed by a parenthesised parameter list (`PULSE(0 1 2)`,
    /// `V(out,0)`).
    Bracket {
        /// Text before the opening parenthesis.
        name: String,
        /// Parameters inside the parentheses.
        parameters: Vec<Parameter>,
    },
    /// `name = value`, or `name(args) = value`.
    Assignment {
        /// Left-hand name.
        name: String,
        /// Argument names of the array/function form; empty otherwise.
        arguments: Vec<String>,
        /// Right-hand side, raw text.
        value: String,
    },
}

impl Parameter {
    /// Text of the parameter as it would be written back into a netlist.
    pub fn image(&self) -> String {
        match self {
            Parameter::Word(s)
            | Parameter::Value(s)
            | Parameter::Identifier(s)
            | Parameter::Reference(s) => s.clone(),
            Parameter::String(s) => format!("\"{s}\""),
            Parameter::Expression(s) => format!("{{{s}}}"),
            Parameter::Vector(elements) => elements
                .iter()
                .map(Parameter::image)
                .collect::<Vec<_>>()
                .join(","),
            Parameter::Bracket { name, parameters } => {
                let inner: Vec<String> = parameters.iter().map(Parameter::image).collect();
                format!("{name}({})", inner.join(" "))
            }
            Parameter::Assignment {
                name,
                arguments,
                value,
            } => {
                if arguments.is_empty() {
                    format!("{name}={value}")
                } else {
                    format!("{name}({})={value}", arguments.join(","))
                }
            }
        }
    }

    /// The raw text a single (non-composite) parameter carries.
    ///
    /// Returns `None` for vectors, brackets and assignments.
    pub fn text(&self) -> Option<&str> {
        match self {
            Parameter::Word(s)
            | Parameter::Value(s)
            | Parameter::Identifier(s)
            | Parameter::Reference(s)
            | Parameter::String(s)
            | Parameter::Expression(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the assignment parts if this is an [`Parameter::Assignment`].
    pub fn as_assignment(&self) -> Option<(&str, &[String], &str)> {
        match self {
            Parameter::Assignment {
                name,
                arguments,
                value,
            } => Some((name, arguments, value)),
            _ => None,
        }
    }

    /// True for the `params:` marker that separates subcircuit pins from
    /// default parameters.
    pub fn is_params_marker(&self) -> bool {
        matches!(self, Parameter::Word(w) if w.eq_ignore_ascii_case("params:"))
    }
}
