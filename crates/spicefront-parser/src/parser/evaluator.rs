//! Parse tree to object model.
//!
//! The tree is walked once in post order. Every non-terminal is turned into
//! a value by the builder registered for its symbol, which receives the
//! already-built values of its children. A builder that sees children of an
//! unexpected shape fails the whole evaluation.

use std::collections::{HashMap, VecDeque};

use log::debug;
use spicefront_core::{Netlist, Parameter, Statement, SubcircuitDefinition};

use super::symbols::Symbol;
use super::tree::{ParseNode, ParseTree};
use crate::error::{Error, Result};
use crate::lexer::{SpiceToken, TokenType};

/// Result of evaluating a parse tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SpiceObject {
    Netlist(Netlist),
    Statements(Vec<Statement>),
    Statement(Statement),
    Parameters(Vec<Parameter>),
    Parameter(Parameter),
    Token(SpiceToken),
    /// Symbols that carry no value (line endings, `.ENDS`, ...).
    Empty,
}

/// Value of an evaluated node.
#[derive(Debug)]
enum Value {
    Token(SpiceToken),
    Netlist(Netlist),
    Statements(VecDeque<Statement>),
    Statement(Statement),
    Parameters(VecDeque<Parameter>),
    Parameter(Parameter),
    Empty,
}

impl Value {
    fn into_object(self) -> SpiceObject {
        match self {
            Value::Token(t) => SpiceObject::Token(t),
            Value::Netlist(n) => SpiceObject::Netlist(n),
            Value::Statements(s) => SpiceObject::Statements(s.into()),
            Value::Statement(s) => SpiceObject::Statement(s),
            Value::Parameters(p) => SpiceObject::Parameters(p.into()),
            Value::Parameter(p) => SpiceObject::Parameter(p),
            Value::Empty => SpiceObject::Empty,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Token(_) => "token",
            Value::Netlist(_) => "netlist",
            Value::Statements(_) => "statements",
            Value::Statement(_) => "statement",
            Value::Parameters(_) => "parameters",
            Value::Parameter(_) => "parameter",
            Value::Empty => "nothing",
        }
    }
}

/// Builder outcome; the error is a message about the unexpected shape.
type Shape<T> = std::result::Result<T, String>;
type BuildResult = Shape<Value>;
type Builder = fn(Children) -> BuildResult;

/// Evaluated children of one non-terminal.
struct Children(Vec<Option<Value>>);

impl Children {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn get(&self, i: usize) -> Shape<&Value> {
        self.0
            .get(i)
            .and_then(Option::as_ref)
            .ok_or_else(|| format!("missing child {i}"))
    }

    fn take(&mut self, i: usize) -> Shape<Value> {
        self.0
            .get_mut(i)
            .and_then(Option::take)
            .ok_or_else(|| format!("missing child {i}"))
    }

    fn token(&self, i: usize) -> Shape<&SpiceToken> {
        match self.get(i)? {
            Value::Token(t) => Ok(t),
            other => Err(format!("child {i}: expected token, found {}", other.kind())),
        }
    }

    fn is_token(&self, i: usize, token_type: TokenType) -> bool {
        matches!(self.get(i), Ok(Value::Token(t)) if t.token_type == token_type)
    }

    fn statement(&mut self, i: usize) -> Shape<Statement> {
        match self.take(i)? {
            Value::Statement(s) => Ok(s),
            other => Err(format!("child {i}: expected statement, found {}", other.kind())),
        }
    }

    fn statements(&mut self, i: usize) -> Shape<VecDeque<Statement>> {
        match self.take(i)? {
            Value::Statements(s) => Ok(s),
            other => Err(format!("child {i}: expected statements, found {}", other.kind())),
        }
    }

    fn parameter(&mut self, i: usize) -> Shape<Parameter> {
        match self.take(i)? {
            Value::Parameter(p) => Ok(p),
            other => Err(format!("child {i}: expected parameter, found {}", other.kind())),
        }
    }

    fn parameters(&mut self, i: usize) -> Shape<VecDeque<Parameter>> {
        match self.take(i)? {
            Value::Parameters(p) => Ok(p),
            other => Err(format!("child {i}: expected parameters, found {}", other.kind())),
        }
    }
}

fn arity(symbol: &str, found: usize) -> String {
    format!("unexpected number of children for {symbol}: {found}")
}

/// Turns parse trees into [`SpiceObject`]s.
pub struct ParseTreeEvaluator {
    builders: HashMap<Symbol, Builder>,
}

impl Default for ParseTreeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseTreeEvaluator {
    pub fn new() -> Self {
        let mut builders: HashMap<Symbol, Builder> = HashMap::new();
        builders.insert(Symbol::Netlist, build_netlist);
        builders.insert(Symbol::NetlistWithoutTitle, build_netlist_without_title);
        builders.insert(Symbol::NetlistEnding, build_empty);
        builders.insert(Symbol::NewLines, build_empty);
        builders.insert(Symbol::Statements, build_statements);
        builders.insert(Symbol::Statement, build_statement);
        builders.insert(Symbol::StatementEnd, build_empty);
        builders.insert(Symbol::Component, build_component);
        builders.insert(Symbol::Control, build_control);
        builders.insert(Symbol::Model, build_model);
        builders.insert(Symbol::Subckt, build_subckt);
        builders.insert(Symbol::SubcktEnding, build_empty);
        builders.insert(Symbol::CommentLine, build_comment);
        builders.insert(Symbol::Parameters, build_parameters);
        builders.insert(Symbol::Parameter, build_parameter);
        builders.insert(Symbol::ParameterSingle, build_parameter_single);
        builders.insert(Symbol::Vector, build_vector);
        builders.insert(Symbol::VectorContinue, build_vector_continue);
        builders.insert(Symbol::ParameterBracket, build_bracket);
        builders.insert(Symbol::ParameterBracketContent, build_bracket_content);
        builders.insert(Symbol::ParameterEqual, build_assignment);
        builders.insert(Symbol::ParameterEqualSingle, build_simple_assignment);
        Self { builders }
    }

    /// Evaluate the whole tree and return the value of its root.
    pub fn evaluate(&self, tree: &ParseTree) -> Result<SpiceObject> {
        let mut values: Vec<Option<Value>> = Vec::with_capacity(tree.len());
        values.resize_with(tree.len(), || None);

        for id in tree.post_order() {
            let value = match tree.node(id) {
                Some(ParseNode::Terminal(token)) => Value::Token(token.clone()),
                Some(ParseNode::NonTerminal { symbol, children }) => {
                    let translation = |message: String| Error::Translation {
                        symbol: symbol.name().to_string(),
                        message,
                    };
                    let builder = self
                        .builders
                        .get(symbol)
                        .ok_or_else(|| translation("no builder registered".into()))?;
                    let evaluated = children.iter().map(|&c| values[c].take()).collect();
                    builder(Children(evaluated)).map_err(translation)?
                }
                None => continue,
            };
            values[id] = Some(value);
        }

        let root = values
            .get_mut(tree.root())
            .and_then(Option::take)
            .map(Value::into_object)
            .unwrap_or(SpiceObject::Empty);
        debug!("evaluated parse tree of {} nodes", tree.len());
        Ok(root)
    }

    /// Evaluate a tree rooted at a netlist symbol.
    pub fn evaluate_netlist(&self, tree: &ParseTree) -> Result<Netlist> {
        match self.evaluate(tree)? {
            SpiceObject::Netlist(netlist) => Ok(netlist),
            other => Err(Error::Translation {
                symbol: Symbol::Netlist.name().to_string(),
                message: format!("tree does not evaluate to a netlist: {other:?}"),
            }),
        }
    }
}

fn build_empty(_: Children) -> BuildResult {
    Ok(Value::Empty)
}

fn build_netlist(mut c: Children) -> BuildResult {
    match c.len() {
        3 => {
            let title = c.token(0)?.text.trim_end().to_string();
            Ok(Value::Netlist(Netlist {
                title: Some(title),
                statements: c.statements(1)?.into(),
            }))
        }
        2 => Ok(Value::Netlist(Netlist {
            title: Some(String::new()),
            statements: c.statements(0)?.into(),
        })),
        n => Err(arity("netlist", n)),
    }
}

fn build_netlist_without_title(mut c: Children) -> BuildResult {
    if c.len() != 2 {
        return Err(arity("netlist", c.len()));
    }
    Ok(Value::Netlist(Netlist {
        title: None,
        statements: c.statements(0)?.into(),
    }))
}

fn build_statements(mut c: Children) -> BuildResult {
    match c.len() {
        0 => Ok(Value::Statements(VecDeque::new())),
        2 if c.is_token(0, TokenType::Newline) => Ok(Value::Statements(c.statements(1)?)),
        2 => {
            let first = c.statement(0)?;
            let mut rest = c.statements(1)?;
            rest.push_front(first);
            Ok(Value::Statements(rest))
        }
        n => Err(arity("statements", n)),
    }
}

fn build_statement(mut c: Children) -> BuildResult {
    if c.len() != 2 {
        return Err(arity("statement", c.len()));
    }
    Ok(Value::Statement(c.statement(0)?))
}

fn build_component(mut c: Children) -> BuildResult {
    if c.len() != 2 {
        return Err(arity("component", c.len()));
    }
    let token = c.token(0)?;
    let (name, line) = (token.text.clone(), token.line);
    Ok(Value::Statement(Statement::Component {
        name,
        pins_and_parameters: c.parameters(1)?.into(),
        line,
    }))
}

fn build_control(mut c: Children) -> BuildResult {
    let keyword = c.token(0)?;
    let (kind, line) = (keyword.token_type, keyword.line);
    let (name, parameters): (String, Vec<Parameter>) = match kind {
        TokenType::Dot => {
            if c.len() != 3 {
                return Err(arity("control", c.len()));
            }
            (c.token(1)?.text.clone(), c.parameters(2)?.into())
        }
        TokenType::Endl => ("endl".to_string(), c.parameters(1)?.into()),
        TokenType::If | TokenType::ElseIf => {
            let name = if kind == TokenType::If {
                "if"
            } else {
                "elseif"
            };
            let condition = c.token(1)?.text.trim();
            let condition = condition
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .unwrap_or(condition);
            (
                name.to_string(),
                vec![Parameter::Expression(condition.trim().to_string())],
            )
        }
        TokenType::Else => ("else".to_string(), Vec::new()),
        TokenType::EndIf => ("endif".to_string(), Vec::new()),
        other => return Err(format!("unexpected control keyword {other:?}")),
    };
    Ok(Value::Statement(Statement::Control {
        name,
        parameters,
        line,
    }))
}

fn build_model(mut c: Children) -> BuildResult {
    if c.len() != 4 {
        return Err(arity("model", c.len()));
    }
    let token = c.token(2)?;
    let (name, line) = (token.text.clone(), token.line);
    Ok(Value::Statement(Statement::Model {
        name,
        parameters: c.parameters(3)?.into(),
        line,
    }))
}

fn build_subckt(mut c: Children) -> BuildResult {
    if c.len() != 7 {
        return Err(arity("subcircuit", c.len()));
    }
    let token = c.token(2)?;
    let (name, line) = (token.text.clone(), token.line);

    let mut pins = Vec::new();
    let mut default_parameters = Vec::new();
    let mut reading_pins = true;
    for parameter in c.parameters(3)? {
        if parameter.is_params_marker() {
            reading_pins = false;
            continue;
        }
        match parameter {
            p @ Parameter::Assignment { .. } => {
                reading_pins = false;
                default_parameters.push(p);
            }
            Parameter::Word(pin) | Parameter::Identifier(pin) if reading_pins => pins.push(pin),
            Parameter::Value(pin) if reading_pins && pin.parse::<i64>().is_ok() => pins.push(pin),
            _ => {}
        }
    }

    Ok(Value::Statement(Statement::Subcircuit(SubcircuitDefinition {
        name,
        pins,
        default_parameters,
        statements: c.statements(5)?.into(),
        line,
    })))
}

fn build_comment(c: Children) -> BuildResult {
    let token = c.token(0)?;
    Ok(Value::Statement(Statement::Comment {
        text: token.text.clone(),
        line: token.line,
    }))
}

fn build_parameters(mut c: Children) -> BuildResult {
    match c.len() {
        0 => Ok(Value::Parameters(VecDeque::new())),
        2 => {
            let first = c.parameter(0)?;
            let mut rest = c.parameters(1)?;
            rest.push_front(first);
            Ok(Value::Parameters(rest))
        }
        n => Err(arity("parameters", n)),
    }
}

fn build_parameter(mut c: Children) -> BuildResult {
    if c.len() != 1 {
        return Err(arity("parameter", c.len()));
    }
    Ok(Value::Parameter(c.parameter(0)?))
}

fn strip<'a>(text: &'a str, open: char, close: char) -> &'a str {
    text.strip_prefix(open)
        .and_then(|s| s.strip_suffix(close))
        .unwrap_or(text)
}

fn build_parameter_single(c: Children) -> BuildResult {
    let token = c.token(0)?;
    let text = token.text.as_str();
    let parameter = match token.token_type {
        TokenType::Word => Parameter::Word(text.to_string()),
        TokenType::Identifier => Parameter::Identifier(text.to_string()),
        TokenType::Value | TokenType::Percent => Parameter::Value(text.to_string()),
        TokenType::Reference => Parameter::Reference(text.to_string()),
        TokenType::DoubleQuotedString => Parameter::String(strip(text, '"', '"').to_string()),
        TokenType::SingleQuotedString => Parameter::String(strip(text, '\'', '\'').to_string()),
        TokenType::ExpressionBracket => Parameter::Expression(strip(text, '{', '}').to_string()),
        TokenType::ExpressionSingleQuotes => {
            Parameter::Expression(strip(text, '\'', '\'').to_string())
        }
        other => return Err(format!("token {other:?} is not a parameter")),
    };
    Ok(Value::Parameter(parameter))
}

fn build_vector(mut c: Children) -> BuildResult {
    if c.len() != 4 {
        return Err(arity("vector", c.len()));
    }
    let mut elements = c.parameters(3)?;
    elements.push_front(c.parameter(2)?);
    elements.push_front(c.parameter(0)?);
    Ok(Value::Parameter(Parameter::Vector(elements.into())))
}

fn build_vector_continue(mut c: Children) -> BuildResult {
    match c.len() {
        0 => Ok(Value::Parameters(VecDeque::new())),
        3 => {
            let mut rest = c.parameters(2)?;
            rest.push_front(c.parameter(1)?);
            Ok(Value::Parameters(rest))
        }
        n => Err(arity("vector continuation", n)),
    }
}

fn build_bracket(mut c: Children) -> BuildResult {
    if c.len() != 4 {
        return Err(arity("bracket", c.len()));
    }
    Ok(Value::Parameter(Parameter::Bracket {
        name: c.token(0)?.text.clone(),
        parameters: c.parameters(2)?.into(),
    }))
}

fn build_bracket_content(mut c: Children) -> BuildResult {
    match c.len() {
        0 => Ok(Value::Parameters(VecDeque::new())),
        1 => Ok(Value::Parameters(c.parameters(0)?)),
        n => Err(arity("bracket content", n)),
    }
}

/// Text an assignment keeps for its value or argument.
fn assigned_text(parameter: &Parameter) -> String {
    parameter
        .text()
        .map(str::to_string)
        .unwrap_or_else(|| parameter.image())
}

fn build_simple_assignment(mut c: Children) -> BuildResult {
    if c.len() != 3 {
        return Err(arity("assignment", c.len()));
    }
    Ok(Value::Parameter(Parameter::Assignment {
        name: c.token(0)?.text.clone(),
        arguments: Vec::new(),
        value: assigned_text(&c.parameter(2)?),
    }))
}

fn build_assignment(mut c: Children) -> BuildResult {
    match c.len() {
        1 => Ok(Value::Parameter(c.parameter(0)?)),
        5 => Ok(Value::Parameter(Parameter::Assignment {
            name: c.token(0)?.text.clone(),
            arguments: Vec::new(),
            value: assigned_text(&c.parameter(4)?),
        })),
        6 => {
            let arguments = match c.parameter(2)? {
                Parameter::Vector(elements) => elements.iter().map(assigned_text).collect(),
                single => vec![assigned_text(&single)],
            };
            Ok(Value::Parameter(Parameter::Assignment {
                name: c.token(0)?.text.clone(),
                arguments,
                value: assigned_text(&c.parameter(5)?),
            }))
        }
        n => Err(arity("assignment", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Token;
    use crate::parser::ParseTreeGenerator;

    fn tok(token_type: TokenType, text: &str) -> SpiceToken {
        Token::new(token_type, text, 1)
    }

    fn evaluate(tokens: &[SpiceToken], symbol: Symbol) -> SpiceObject {
        let tree = ParseTreeGenerator::default()
            .generate(tokens, symbol)
            .unwrap();
        ParseTreeEvaluator::new().evaluate(&tree).unwrap()
    }

    #[test]
    fn test_vector_lengths() {
        let mut tokens = vec![
            tok(TokenType::Value, "1"),
            tok(TokenType::Comma, ","),
            tok(TokenType::Value, "2"),
            tok(TokenType::Comma, ","),
            tok(TokenType::Value, "3"),
        ];
        match evaluate(&tokens, Symbol::Vector) {
            SpiceObject::Parameter(Parameter::Vector(elements)) => {
                let texts: Vec<_> = elements.iter().map(Parameter::image).collect();
                assert_eq!(texts, vec!["1", "2", "3"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        tokens.push(tok(TokenType::Comma, ","));
        tokens.push(tok(TokenType::Value, "4"));
        match evaluate(&tokens, Symbol::Vector) {
            SpiceObject::Parameter(Parameter::Vector(elements)) => assert_eq!(elements.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bracket_with_vector() {
        let tokens = vec![
            tok(TokenType::Word, "v"),
            tok(TokenType::Delimiter, "("),
            tok(TokenType::Word, "out"),
            tok(TokenType::Comma, ","),
            tok(TokenType::Value, "0"),
            tok(TokenType::Delimiter, ")"),
        ];
        let expected = Parameter::Bracket {
            name: "v".into(),
            parameters: vec![Parameter::Vector(vec![
                Parameter::Word("out".into()),
                Parameter::Value("0".into()),
            ])],
        };
        assert_eq!(
            evaluate(&tokens, Symbol::ParameterBracket),
            SpiceObject::Parameter(expected)
        );
    }

    #[test]
    fn test_assignment_with_arguments() {
        let tokens = vec![
            tok(TokenType::Word, "v"),
            tok(TokenType::Delimiter, "("),
            tok(TokenType::Word, "out"),
            tok(TokenType::Comma, ","),
            tok(TokenType::Value, "0"),
            tok(TokenType::Delimiter, ")"),
            tok(TokenType::Equal, "="),
            tok(TokenType::Value, "13"),
        ];
        let expected = Parameter::Assignment {
            name: "v".into(),
            arguments: vec!["out".into(), "0".into()],
            value: "13".into(),
        };
        assert_eq!(
            evaluate(&tokens, Symbol::ParameterEqual),
            SpiceObject::Parameter(expected)
        );
    }

    #[test]
    fn test_bracket_of_assignments() {
        let tokens = vec![
            tok(TokenType::Word, "v"),
            tok(TokenType::Delimiter, "("),
            tok(TokenType::Word, "n1"),
            tok(TokenType::Equal, "="),
            tok(TokenType::Value, "2"),
            tok(TokenType::Word, "n3"),
            tok(TokenType::Equal, "="),
            tok(TokenType::Value, "3"),
            tok(TokenType::Delimiter, ")"),
        ];
        match evaluate(&tokens, Symbol::ParameterBracket) {
            SpiceObject::Parameter(Parameter::Bracket { name, parameters }) => {
                assert_eq!(name, "v");
                assert_eq!(parameters.len(), 2);
                assert!(parameters.iter().all(|p| p.as_assignment().is_some()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_component() {
        let tokens = vec![
            tok(TokenType::Word, "L1"),
            tok(TokenType::Value, "5"),
            tok(TokenType::Value, "3"),
            tok(TokenType::Value, "3MH"),
        ];
        match evaluate(&tokens, Symbol::Component) {
            SpiceObject::Statement(Statement::Component {
                name,
                pins_and_parameters,
                ..
            }) => {
                assert_eq!(name, "L1");
                assert_eq!(pins_and_parameters.len(), 3);
                assert_eq!(pins_and_parameters[2], Parameter::Value("3MH".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_builder_is_translation_error() {
        let tokens = vec![tok(TokenType::Value, "1")];
        let tree = ParseTreeGenerator::default()
            .generate(&tokens, Symbol::ParameterSingle)
            .unwrap();
        let evaluator = ParseTreeEvaluator {
            builders: HashMap::new(),
        };
        let err = evaluator.evaluate(&tree).unwrap_err();
        match err {
            Error::Translation { symbol, .. } => assert_eq!(symbol, "PARAMETER_SINGLE"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
