//! Non-terminal symbols of the netlist grammar.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A non-terminal of the netlist grammar.
///
/// Every symbol can be used as the entry point of the parse-tree generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Netlist,
    NetlistWithoutTitle,
    NetlistEnding,
    NewLines,
    Statements,
    Statement,
    StatementEnd,
    Component,
    Control,
    Model,
    Subckt,
    SubcktEnding,
    CommentLine,
    Parameters,
    Parameter,
    ParameterSingle,
    Vector,
    VectorContinue,
    ParameterBracket,
    ParameterBracketContent,
    ParameterEqual,
    ParameterEqualSingle,
}

impl Symbol {
    pub const ALL: [Symbol; 22] = [
        Symbol::Netlist,
        Symbol::NetlistWithoutTitle,
        Symbol::NetlistEnding,
        Symbol::NewLines,
        Symbol::Statements,
        Symbol::Statement,
        Symbol::StatementEnd,
        Symbol::Component,
        Symbol::Control,
        Symbol::Model,
        Symbol::Subckt,
        Symbol::SubcktEnding,
        Symbol::CommentLine,
        Symbol::Parameters,
        Symbol::Parameter,
        Symbol::ParameterSingle,
        Symbol::Vector,
        Symbol::VectorContinue,
        Symbol::ParameterBracket,
        Symbol::ParameterBracketContent,
        Symbol::ParameterEqual,
        Symbol::ParameterEqualSingle,
    ];

    /// Grammar name, e.g. `PARAMETER_BRACKET`.
    pub fn name(self) -> &'static str {
        match self {
            Symbol::Netlist => "NETLIST",
            Symbol::NetlistWithoutTitle => "NETLIST_WITHOUT_TITLE",
            Symbol::NetlistEnding => "NETLIST_ENDING",
            Symbol::NewLines => "NEW_LINES",
            Symbol::Statements => "STATEMENTS",
            Symbol::Statement => "STATEMENT",
            Symbol::StatementEnd => "STATEMENT_END",
            Symbol::Component => "COMPONENT",
            Symbol::Control => "CONTROL",
            Symbol::Model => "MODEL",
            Symbol::Subckt => "SUBCKT",
            Symbol::SubcktEnding => "SUBCKT_ENDING",
            Symbol::CommentLine => "COMMENT_LINE",
            Symbol::Parameters => "PARAMETERS",
            Symbol::Parameter => "PARAMETER",
            Symbol::ParameterSingle => "PARAMETER_SINGLE",
            Symbol::Vector => "VECTOR",
            Symbol::VectorContinue => "VECTOR_CONTINUE",
            Symbol::ParameterBracket => "PARAMETER_BRACKET",
            Symbol::ParameterBracketContent => "PARAMETER_BRACKET_CONTENT",
            Symbol::ParameterEqual => "PARAMETER_EQUAL",
            Symbol::ParameterEqualSingle => "PARAMETER_EQUAL_SINGLE",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Symbol {
    type Err = Error;

    /// Accepts the grammar name in any case (`vector`, `PARAMETER_EQUAL`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::ALL
            .into_iter()
            .find(|sym| sym.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownSymbol(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for symbol in Symbol::ALL {
            assert_eq!(symbol.name().parse::<Symbol>().unwrap(), symbol);
        }
    }

    #[test]
    fn test_parse_lowercase_and_unknown() {
        assert_eq!("vector".parse::<Symbol>().unwrap(), Symbol::Vector);
        assert!(matches!(
            "nonsense".parse::<Symbol>(),
            Err(Error::UnknownSymbol(_))
        ));
    }
}
