//! Parse-tree generator.
//!
//! A table-free LL generator: every non-terminal picks one of its
//! productions by looking at the upcoming tokens, trying the alternatives
//! in a fixed order. Expansion uses an explicit stack, so deeply nested
//! input does not grow the call stack.

use log::debug;

use super::symbols::Symbol;
use super::tree::{NodeId, ParseNode, ParseTree};
use crate::error::{Error, Result};
use crate::lexer::TokenType as T;
use crate::lexer::{SpiceToken, TokenType};

/// One element of a production.
#[derive(Debug, Clone, Copy)]
enum Item {
    Symbol(Symbol),
    /// A token of any of the listed types.
    Token(&'static [TokenType]),
    /// A delimiter token with the given text.
    Delimiter(&'static str),
}

use self::Item::{Delimiter as D, Symbol as S, Token as K};

const NAME: &[TokenType] = &[T::Word, T::Identifier];
const NAME_OR_VALUE: &[TokenType] = &[T::Word, T::Identifier, T::Value];
const SINGLE: &[TokenType] = &[
    T::Word,
    T::Identifier,
    T::Value,
    T::Percent,
    T::Reference,
    T::DoubleQuotedString,
    T::SingleQuotedString,
    T::ExpressionBracket,
    T::ExpressionSingleQuotes,
];

const NETLIST_WITH_TITLE: &[Item] = &[
    K(&[T::Title]),
    S(Symbol::Statements),
    S(Symbol::NetlistEnding),
];
const NETLIST_BODY: &[Item] = &[S(Symbol::Statements), S(Symbol::NetlistEnding)];
const ENDING_WITH_END: &[Item] = &[K(&[T::End]), S(Symbol::NewLines), K(&[T::Eof])];
const ENDING_EOF: &[Item] = &[K(&[T::Eof])];
const NEW_LINES: &[Item] = &[K(&[T::Newline]), S(Symbol::NewLines)];
const STATEMENTS_NEWLINE: &[Item] = &[K(&[T::Newline]), S(Symbol::Statements)];
const STATEMENTS_MORE: &[Item] = &[S(Symbol::Statement), S(Symbol::Statements)];
const STATEMENT_COMPONENT: &[Item] = &[S(Symbol::Component), S(Symbol::StatementEnd)];
const STATEMENT_MODEL: &[Item] = &[S(Symbol::Model), S(Symbol::StatementEnd)];
const STATEMENT_SUBCKT: &[Item] = &[S(Symbol::Subckt), S(Symbol::StatementEnd)];
const STATEMENT_CONTROL: &[Item] = &[S(Symbol::Control), S(Symbol::StatementEnd)];
const STATEMENT_COMMENT: &[Item] = &[S(Symbol::CommentLine), S(Symbol::StatementEnd)];
const STATEMENT_END: &[Item] = &[K(&[T::Newline])];
const COMPONENT: &[Item] = &[K(NAME), S(Symbol::Parameters)];
const CONTROL_DOT: &[Item] = &[K(&[T::Dot]), K(&[T::Word]), S(Symbol::Parameters)];
const CONTROL_ENDL: &[Item] = &[K(&[T::Endl]), S(Symbol::Parameters)];
const CONTROL_IF: &[Item] = &[K(&[T::If]), K(&[T::BooleanExpression])];
const CONTROL_ELSE_IF: &[Item] = &[K(&[T::ElseIf]), K(&[T::BooleanExpression])];
const CONTROL_ELSE: &[Item] = &[K(&[T::Else])];
const CONTROL_END_IF: &[Item] = &[K(&[T::EndIf])];
const MODEL: &[Item] = &[
    K(&[T::Dot]),
    K(&[T::Word]),
    K(NAME_OR_VALUE),
    S(Symbol::Parameters),
];
const SUBCKT: &[Item] = &[
    K(&[T::Dot]),
    K(&[T::Word]),
    K(NAME_OR_VALUE),
    S(Symbol::Parameters),
    K(&[T::Newline]),
    S(Symbol::Statements),
    S(Symbol::SubcktEnding),
];
const SUBCKT_ENDING_NAMED: &[Item] = &[K(&[T::Ends]), K(NAME_OR_VALUE)];
const SUBCKT_ENDING: &[Item] = &[K(&[T::Ends])];
const COMMENT_LINE: &[Item] = &[K(&[T::Comment])];
const PARAMETERS: &[Item] = &[S(Symbol::Parameter), S(Symbol::Parameters)];
const PARAMETER_VECTOR: &[Item] = &[S(Symbol::Vector)];
const PARAMETER_EQUAL: &[Item] = &[S(Symbol::ParameterEqual)];
const PARAMETER_BRACKET: &[Item] = &[S(Symbol::ParameterBracket)];
const PARAMETER_SINGLE: &[Item] = &[S(Symbol::ParameterSingle)];
const SINGLE_TOKEN: &[Item] = &[K(SINGLE)];
const VECTOR: &[Item] = &[
    S(Symbol::ParameterSingle),
    K(&[T::Comma]),
    S(Symbol::ParameterSingle),
    S(Symbol::VectorContinue),
];
const VECTOR_CONTINUE: &[Item] = &[
    K(&[T::Comma]),
    S(Symbol::ParameterSingle),
    S(Symbol::VectorContinue),
];
const BRACKET: &[Item] = &[
    K(&[T::Word]),
    D("("),
    S(Symbol::ParameterBracketContent),
    D(")"),
];
const BRACKET_CONTENT: &[Item] = &[S(Symbol::Parameters)];
const EQUAL_SIMPLE: &[Item] = &[S(Symbol::ParameterEqualSingle)];
const EQUAL_NO_ARGUMENTS: &[Item] = &[
    K(&[T::Word]),
    D("("),
    D(")"),
    K(&[T::Equal]),
    S(Symbol::ParameterSingle),
];
const EQUAL_VECTOR_ARGUMENTS: &[Item] = &[
    K(&[T::Word]),
    D("("),
    S(Symbol::Vector),
    D(")"),
    K(&[T::Equal]),
    S(Symbol::ParameterSingle),
];
const EQUAL_SINGLE_ARGUMENT: &[Item] = &[
    K(&[T::Word]),
    D("("),
    S(Symbol::ParameterSingle),
    D(")"),
    K(&[T::Equal]),
    S(Symbol::ParameterSingle),
];
const EQUAL_SINGLE: &[Item] = &[K(NAME), K(&[T::Equal]), S(Symbol::ParameterSingle)];
const EMPTY: &[Item] = &[];

/// Builds parse trees from token sequences.
#[derive(Debug, Clone, Default)]
pub struct ParseTreeGenerator {
    is_end_required: bool,
}

impl ParseTreeGenerator {
    pub fn new(is_end_required: bool) -> Self {
        Self { is_end_required }
    }

    /// Build the tree for `tokens` rooted at `root`.
    ///
    /// All tokens must be consumed; a trailing end-of-input token may be left
    /// over when the entry symbol does not consume it.
    pub fn generate(&self, tokens: &[SpiceToken], root: Symbol) -> Result<ParseTree> {
        let mut tree = ParseTree::new();
        let mut stack: Vec<(Item, Option<NodeId>)> = vec![(S(root), None)];
        let mut pos = 0;

        while let Some((item, parent)) = stack.pop() {
            let id = match item {
                S(symbol) => {
                    let production = self.expand(symbol, &Lookahead { tokens, pos })?;
                    let id = tree.push(ParseNode::NonTerminal {
                        symbol,
                        children: Vec::with_capacity(production.len()),
                    });
                    stack.extend(production.iter().rev().map(|item| (*item, Some(id))));
                    id
                }
                K(types) => {
                    let token = expect(tokens, pos, |t| types.contains(&t.token_type), || {
                        describe_types(types)
                    })?;
                    pos += 1;
                    tree.push(ParseNode::Terminal(token.clone()))
                }
                D(text) => {
                    let token = expect(
                        tokens,
                        pos,
                        |t| t.token_type == T::Delimiter && t.text == text,
                        || format!("'{text}'"),
                    )?;
                    pos += 1;
                    tree.push(ParseNode::Terminal(token.clone()))
                }
            };
            if let Some(parent) = parent {
                tree.add_child(parent, id);
            }
        }

        if let Some(token) = tokens.get(pos)
            && !(token.token_type == T::Eof && pos + 1 == tokens.len())
        {
            return Err(syntax_error("end of input", Some(token)));
        }

        debug!("generated parse tree for {root}: {} nodes", tree.len());
        Ok(tree)
    }

    /// Choose the production for `symbol` at the current position.
    fn expand(&self, symbol: Symbol, ahead: &Lookahead<'_>) -> Result<&'static [Item]> {
        let production = match symbol {
            Symbol::Netlist => {
                if ahead.is(0, T::Title) {
                    NETLIST_WITH_TITLE
                } else {
                    NETLIST_BODY
                }
            }
            Symbol::NetlistWithoutTitle => NETLIST_BODY,
            Symbol::NetlistEnding => match ahead.kind(0) {
                Some(T::End) => ENDING_WITH_END,
                Some(T::Eof) if !self.is_end_required => ENDING_EOF,
                None if !self.is_end_required => EMPTY,
                _ => return Err(ahead.error(".END")),
            },
            Symbol::NewLines => {
                if ahead.is(0, T::Newline) {
                    NEW_LINES
                } else {
                    EMPTY
                }
            }
            Symbol::Statements => match ahead.kind(0) {
                None | Some(T::Eof | T::End | T::Ends) => EMPTY,
                Some(T::Newline) => STATEMENTS_NEWLINE,
                Some(_) => STATEMENTS_MORE,
            },
            Symbol::Statement => match ahead.kind(0) {
                Some(T::Word | T::Identifier) => STATEMENT_COMPONENT,
                Some(T::Dot) if ahead.is_word(1, "model") => STATEMENT_MODEL,
                Some(T::Dot) if ahead.is_word(1, "subckt") => STATEMENT_SUBCKT,
                Some(T::Dot | T::Endl | T::If | T::ElseIf | T::Else | T::EndIf) => {
                    STATEMENT_CONTROL
                }
                Some(T::Comment) => STATEMENT_COMMENT,
                _ => return Err(ahead.error("STATEMENT")),
            },
            Symbol::StatementEnd => match ahead.kind(0) {
                Some(T::Newline) => STATEMENT_END,
                None | Some(T::Eof | T::End) => EMPTY,
                _ => return Err(ahead.error("NEWLINE")),
            },
            Symbol::Component => COMPONENT,
            Symbol::Control => match ahead.kind(0) {
                Some(T::Dot) => CONTROL_DOT,
                Some(T::Endl) => CONTROL_ENDL,
                Some(T::If) => CONTROL_IF,
                Some(T::ElseIf) => CONTROL_ELSE_IF,
                Some(T::Else) => CONTROL_ELSE,
                Some(T::EndIf) => CONTROL_END_IF,
                _ => return Err(ahead.error("CONTROL")),
            },
            Symbol::Model => MODEL,
            Symbol::Subckt => SUBCKT,
            Symbol::SubcktEnding => {
                if ahead.is_any(1, NAME_OR_VALUE) {
                    SUBCKT_ENDING_NAMED
                } else {
                    SUBCKT_ENDING
                }
            }
            Symbol::CommentLine => COMMENT_LINE,
            Symbol::Parameters => {
                if ahead.is_any(0, SINGLE) {
                    PARAMETERS
                } else {
                    EMPTY
                }
            }
            Symbol::Parameter => {
                if ahead.is(0, T::Word) && ahead.is_delimiter(1, "(") {
                    let assignment = ahead
                        .matching_close(1)
                        .is_some_and(|close| ahead.is(close + 1, T::Equal));
                    if assignment {
                        PARAMETER_EQUAL
                    } else {
                        PARAMETER_BRACKET
                    }
                } else if ahead.is_any(0, NAME) && ahead.is(1, T::Equal) {
                    PARAMETER_EQUAL
                } else if ahead.is_any(0, SINGLE) && ahead.is(1, T::Comma) {
                    PARAMETER_VECTOR
                } else if ahead.is_any(0, SINGLE) {
                    PARAMETER_SINGLE
                } else {
                    return Err(ahead.error("PARAMETER"));
                }
            }
            Symbol::ParameterSingle => SINGLE_TOKEN,
            Symbol::Vector => VECTOR,
            Symbol::VectorContinue => {
                if ahead.is(0, T::Comma) {
                    VECTOR_CONTINUE
                } else {
                    EMPTY
                }
            }
            Symbol::ParameterBracket => BRACKET,
            Symbol::ParameterBracketContent => {
                if ahead.is_delimiter(0, ")") {
                    EMPTY
                } else {
                    BRACKET_CONTENT
                }
            }
            Symbol::ParameterEqual => {
                if ahead.is(1, T::Equal) {
                    EQUAL_SIMPLE
                } else if ahead.is_delimiter(1, "(") && ahead.is_delimiter(2, ")") {
                    EQUAL_NO_ARGUMENTS
                } else if ahead.is_delimiter(1, "(") && ahead.is(3, T::Comma) {
                    EQUAL_VECTOR_ARGUMENTS
                } else if ahead.is_delimiter(1, "(") {
                    EQUAL_SINGLE_ARGUMENT
                } else {
                    return Err(ahead.error("PARAMETER_EQUAL"));
                }
            }
            Symbol::ParameterEqualSingle => EQUAL_SINGLE,
        };
        Ok(production)
    }
}

/// Read-only view of the tokens from the current position on.
struct Lookahead<'a> {
    tokens: &'a [SpiceToken],
    pos: usize,
}

impl Lookahead<'_> {
    fn token(&self, offset: usize) -> Option<&SpiceToken> {
        self.tokens.get(self.pos + offset)
    }

    fn kind(&self, offset: usize) -> Option<TokenType> {
        self.token(offset).map(|t| t.token_type)
    }

    fn is(&self, offset: usize, token_type: TokenType) -> bool {
        self.kind(offset) == Some(token_type)
    }

    fn is_any(&self, offset: usize, types: &[TokenType]) -> bool {
        self.kind(offset).is_some_and(|k| types.contains(&k))
    }

    fn is_delimiter(&self, offset: usize, text: &str) -> bool {
        self.token(offset)
            .is_some_and(|t| t.token_type == T::Delimiter && t.text == text)
    }

    fn is_word(&self, offset: usize, word: &str) -> bool {
        self.token(offset)
            .is_some_and(|t| t.token_type == T::Word && t.text.eq_ignore_ascii_case(word))
    }

    /// Offset of the `)` closing the `(` at `open`.
    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut offset = open;
        while let Some(token) = self.token(offset) {
            if token.token_type == T::Delimiter {
                match token.text.as_str() {
                    "(" => depth += 1,
                    ")" => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return Some(offset);
                        }
                    }
                    _ => {}
                }
            } else if matches!(token.token_type, T::Newline | T::Eof) {
                return None;
            }
            offset += 1;
        }
        None
    }

    fn error(&self, expected: &str) -> Error {
        syntax_error(expected, self.token(0))
    }
}

fn expect<'t>(
    tokens: &'t [SpiceToken],
    pos: usize,
    accept: impl Fn(&SpiceToken) -> bool,
    expected: impl FnOnce() -> String,
) -> Result<&'t SpiceToken> {
    match tokens.get(pos) {
        Some(token) if accept(token) => Ok(token),
        other => Err(syntax_error(&expected(), other)),
    }
}

fn syntax_error(expected: &str, found: Option<&SpiceToken>) -> Error {
    match found {
        Some(token) => Error::Syntax {
            expected: expected.to_string(),
            found: token.to_string(),
            line: token.line,
        },
        None => Error::Syntax {
            expected: expected.to_string(),
            found: "end of input".to_string(),
            line: 0,
        },
    }
}

fn describe_types(types: &[TokenType]) -> String {
    types
        .iter()
        .map(|t| format!("{t:?}"))
        .collect::<Vec<_>>()
        .join(" or ")
}
