//! Grammar-driven lexer.
//!
//! The engine walks the input left to right. At each position the rules of
//! the [`Grammar`] are tried in order; the first rule that matches a
//! non-empty lexeme and whose use decision accepts it wins. Its return
//! decision then either emits a token or drops the lexeme.

mod grammar;
mod spice;
mod state;

pub use grammar::{Grammar, GrammarBuilder, ReturnDecision, Rule, TokenRule, UseDecision};
pub use spice::{SpiceLexer, SpiceToken, TokenType};
pub use state::LexerState;

use std::fmt;
use std::iter::FusedIterator;

use log::trace;

use crate::error::{Error, Result};

/// A lexed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<T> {
    pub token_type: T,
    /// Raw text of the lexeme.
    pub text: String,
    /// Line the lexeme starts on.
    pub line: usize,
}

impl<T> Token<T> {
    pub fn new(token_type: T, text: impl Into<String>, line: usize) -> Self {
        Self {
            token_type,
            text: text.into(),
            line,
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.token_type, self.text)
    }
}

/// One lexer run over a piece of text.
///
/// Yields tokens lazily and ends with a single end-of-input token. After an
/// error or the end-of-input token the iterator is exhausted.
pub struct Lexer<'a, T> {
    grammar: &'a Grammar<T>,
    text: &'a str,
    pos: usize,
    state: LexerState<T>,
    finished: bool,
}

impl<'a, T: Copy + PartialEq + fmt::Debug> Lexer<'a, T> {
    pub fn new(grammar: &'a Grammar<T>, text: &'a str, state: LexerState<T>) -> Self {
        Self {
            grammar,
            text,
            pos: 0,
            state,
            finished: false,
        }
    }

    /// Current state of the run.
    pub fn state(&self) -> &LexerState<T> {
        &self.state
    }

    fn next_token(&mut self) -> Result<Token<T>> {
        'scan: loop {
            let rest = &self.text[self.pos..];
            if rest.is_empty() {
                self.finished = true;
                return Ok(Token::new(self.grammar.eof(), "", self.state.line));
            }

            for rule in self.grammar.rules() {
                let Some(len) = rule.match_len(rest) else {
                    continue;
                };
                let lexeme = &rest[..len];
                self.state.before_line_break = rest[len..].starts_with(['\r', '\n']);
                if rule.accepts(&self.state, lexeme) == UseDecision::Next {
                    continue;
                }

                let line = self.state.line;
                self.pos += len;
                match rule.fire(&mut self.state, lexeme) {
                    ReturnDecision::ReturnToken => {
                        self.state.previous = Some(rule.token_type());
                        trace!("line {line}: {:?} {lexeme:?}", rule.token_type());
                        return Ok(Token::new(rule.token_type(), lexeme, line));
                    }
                    ReturnDecision::IgnoreToken => continue 'scan,
                }
            }

            self.finished = true;
            let text: String = rest.lines().next().unwrap_or(rest).chars().take(40).collect();
            return Err(Error::Lexical {
                text,
                line: self.state.line,
            });
        }
    }
}

impl<T: Copy + PartialEq + fmt::Debug> Iterator for Lexer<'_, T> {
    type Item = Result<Token<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}

impl<T: Copy + PartialEq + fmt::Debug> FusedIterator for Lexer<'_, T> {}
