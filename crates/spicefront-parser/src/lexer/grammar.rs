//! Lexer grammar: ordered regex rules with use/return decisions.
//!
//! A grammar is built once from named internal fragments and token rules.
//! Token rule patterns can reference fragments as `<NAME>`; references are
//! expanded before the pattern is compiled. The compiled grammar is
//! immutable and `Send + Sync`, so one instance can be shared by many runs.

use log::debug;
use regex::Regex;

use super::state::LexerState;
use crate::error::{Error, Result};

/// Whether a matching rule may fire at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseDecision {
    Use,
    /// Skip this rule and try the next one.
    Next,
}

/// What happens to a lexeme once its rule has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDecision {
    ReturnToken,
    IgnoreToken,
}

pub type UseFn<T> = Box<dyn Fn(&LexerState<T>, &str) -> UseDecision + Send + Sync>;
pub type ReturnFn<T> = Box<dyn Fn(&mut LexerState<T>, &str) -> ReturnDecision + Send + Sync>;

/// A token rule before compilation.
pub struct TokenRule<T> {
    token_type: T,
    description: String,
    pattern: String,
    ignore_case: bool,
    use_decision: Option<UseFn<T>>,
    return_decision: Option<ReturnFn<T>>,
}

impl<T> TokenRule<T> {
    pub fn new(token_type: T, description: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            token_type,
            description: description.into(),
            pattern: pattern.into(),
            ignore_case: false,
            use_decision: None,
            return_decision: None,
        }
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Gate the rule. Without a use decision a matching rule always fires.
    pub fn use_when<F>(mut self, decide: F) -> Self
    where
        F: Fn(&LexerState<T>, &str) -> UseDecision + Send + Sync + 'static,
    {
        self.use_decision = Some(Box::new(decide));
        self
    }

    /// Decide what to do with a fired lexeme. Without a return decision the
    /// token is returned.
    pub fn on_match<F>(mut self, decide: F) -> Self
    where
        F: Fn(&mut LexerState<T>, &str) -> ReturnDecision + Send + Sync + 'static,
    {
        self.return_decision = Some(Box::new(decide));
        self
    }

    /// Consume the lexeme without emitting a token.
    pub fn ignored(self) -> Self {
        self.on_match(|_, _| ReturnDecision::IgnoreToken)
    }
}

/// A compiled token rule.
pub struct Rule<T> {
    token_type: T,
    description: String,
    regex: Regex,
    use_decision: Option<UseFn<T>>,
    return_decision: Option<ReturnFn<T>>,
}

impl<T: Copy> Rule<T> {
    pub fn token_type(&self) -> T {
        self.token_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Length of the non-empty match at the start of `text`.
    pub fn match_len(&self, text: &str) -> Option<usize> {
        self.regex
            .find(text)
            .map(|m| m.end())
            .filter(|&len| len > 0)
    }

    pub fn accepts(&self, state: &LexerState<T>, lexeme: &str) -> UseDecision {
        match &self.use_decision {
            Some(decide) => decide(state, lexeme),
            None => UseDecision::Use,
        }
    }

    pub fn fire(&self, state: &mut LexerState<T>, lexeme: &str) -> ReturnDecision {
        match &self.return_decision {
            Some(decide) => decide(state, lexeme),
            None => ReturnDecision::ReturnToken,
        }
    }
}

/// An immutable, ordered set of compiled token rules.
pub struct Grammar<T> {
    rules: Vec<Rule<T>>,
    eof: T,
}

impl<T: Copy> Grammar<T> {
    /// Rules in priority order.
    pub fn rules(&self) -> &[Rule<T>] {
        &self.rules
    }

    /// Token type emitted once the input is exhausted.
    pub fn eof(&self) -> T {
        self.eof
    }
}

/// Builds a [`Grammar`].
pub struct GrammarBuilder<T> {
    fragments: Vec<(String, String)>,
    rules: Vec<TokenRule<T>>,
    eof: T,
}

impl<T: Copy> GrammarBuilder<T> {
    pub fn new(eof: T) -> Self {
        Self {
            fragments: Vec::new(),
            rules: Vec::new(),
            eof,
        }
    }

    /// Add a named fragment. It may reference fragments added before it.
    pub fn internal(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.fragments.push((name.into(), pattern.into()));
        self
    }

    /// Append a token rule. Rules are tried in the order they are added.
    pub fn rule(mut self, rule: TokenRule<T>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> Result<Grammar<T>> {
        let reference = Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>").map_err(|e| Error::InvalidRule {
            rule: "<fragment reference>".into(),
            message: e.to_string(),
        })?;

        let mut expanded: Vec<(String, String)> = Vec::with_capacity(self.fragments.len());
        for (name, pattern) in &self.fragments {
            let pattern = expand(&reference, name, pattern, &expanded)?;
            expanded.push((name.clone(), pattern));
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            let pattern = expand(&reference, &rule.description, &rule.pattern, &expanded)?;
            let flags = if rule.ignore_case { "(?i)" } else { "" };
            let regex = Regex::new(&format!("{flags}^(?:{pattern})")).map_err(|e| {
                Error::InvalidRule {
                    rule: rule.description.clone(),
                    message: e.to_string(),
                }
            })?;
            rules.push(Rule {
                token_type: rule.token_type,
                description: rule.description,
                regex,
                use_decision: rule.use_decision,
                return_decision: rule.return_decision,
            });
        }

        debug!(
            "compiled lexer grammar: {} fragments, {} rules",
            expanded.len(),
            rules.len()
        );

        Ok(Grammar {
            rules,
            eof: self.eof,
        })
    }
}

/// Replace every `<NAME>` in `pattern` with the expanded fragment.
fn expand(
    reference: &Regex,
    rule: &str,
    pattern: &str,
    fragments: &[(String, String)],
) -> Result<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;
    for caps in reference.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let fragment = fragments
            .iter()
            .find(|(n, _)| n == name.as_str())
            .ok_or_else(|| Error::InvalidRule {
                rule: rule.to_string(),
                message: format!("unknown fragment <{}>", name.as_str()),
            })?;
        out.push_str(&pattern[last..whole.start()]);
        out.push_str("(?:");
        out.push_str(&fragment.1);
        out.push(')');
        last = whole.end();
    }
    out.push_str(&pattern[last..]);
    Ok(out)
}
