//! Netlist object model: title plus ordered statements.

use serde::{Deserialize, Serialize};

use crate::parameter::Parameter;

/// A parsed netlist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Netlist {
    /// Title line, when the netlist was read with a title.
    pub title: Option<String>,
    /// Statements in source order.
    pub statements: Vec<Statement>,
}

impl Netlist {
    /// Create an empty netlist with an optional title.
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            statements: Vec::new(),
        }
    }

    /// Iterate over the component statements.
    pub fn components(&self) -> impl Iterator<Item = &Statement> {
        self.statements
            .iter()
            .filter(|s| matches!(s, Statement::Component { .. }))
    }

    /// Iterate over control statements with the given name (case-insensitive,
    /// without the leading dot).
    pub fn controls<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Statement> {
        self.statements.iter().filter(move |s| match s {
            Statement::Control { name: n, .. } => n.eq_ignore_ascii_case(name),
            _ => false,
        })
    }

    /// Find a subcircuit definition by name (case-insensitive).
    pub fn subcircuit(&self, name: &str) -> Option<&SubcircuitDefinition> {
        self.statements.iter().find_map(|s| match s {
            Statement::Subcircuit(def) if def.name.eq_ignore_ascii_case(name) => Some(def),
            _ => None,
        })
    }
}

/// A single netlist statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Statement {
    /// Element line (`R1 1 0 10k`).
    Component {
        name: String,
        /// Pins and parameters in source order; which is which depends on
        /// the element type and is decided downstream.
        pins_and_parameters: Vec<Parameter>,
        line: usize,
    },
    /// `.MODEL name type(params)`.
    Model {
        name: String,
        parameters: Vec<Parameter>,
        line: usize,
    },
    /// Any other dot statement. `name` has no leading dot and keeps the
    /// case it was written in; conditional blocks use `if`, `elseif`,
    /// `else` and `endif`.
    Control {
        name: String,
        parameters: Vec<Parameter>,
        line: usize,
    },
    /// `.SUBCKT ... .ENDS` block.
    Subcircuit(SubcircuitDefinition),
    /// Full-line `*` comment.
    Comment { text: String, line: usize },
}

impl Statement {
    /// Line the statement starts on.
    pub fn line(&self) -> usize {
        match self {
            Statement::Component { line, .. }
            | Statement::Model { line, .. }
            | Statement::Control { line, .. }
            | Statement::Comment { line, .. } => *line,
            Statement::Subcircuit(def) => def.line,
        }
    }
}

/// A subcircuit definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcircuitDefinition {
    /// Subcircuit name.
    pub name: String,
    /// External pin names in order.
    pub pins: Vec<String>,
    /// Default parameter assignments (`params: a=1 b=2`).
    pub default_parameters: Vec<Parameter>,
    /// Body statements.
    pub statements: Vec<Statement>,
    /// Line of the `.SUBCKT` statement.
    pub line: usize,
}
