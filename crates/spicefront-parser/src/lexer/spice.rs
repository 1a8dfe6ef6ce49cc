//! SPICE netlist lexer.

use std::sync::Arc;

use super::grammar::{Grammar, GrammarBuilder, ReturnDecision, TokenRule, UseDecision};
use super::state::LexerState;
use super::{Lexer, Token};
use crate::error::Result;
use crate::options::ReaderOptions;

/// SPICE token types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TokenType {
    Whitespace,
    Title,
    CommentBlockStart,
    CommentBlockEnd,
    CommentBlockContent,
    Ends,
    Endl,
    EndIf,
    End,
    ElseIf,
    Else,
    If,
    Dot,
    Comma,
    /// `(`, `)` or `|`.
    Delimiter,
    Equal,
    Continue,
    Newline,
    /// Parenthesised condition of `.IF`/`.ELSEIF`.
    BooleanExpression,
    Percent,
    Value,
    CommentHspice,
    CommentPspice,
    /// Full-line `*` comment.
    Comment,
    DoubleQuotedString,
    ExpressionSingleQuotes,
    ExpressionBracket,
    SingleQuotedString,
    Reference,
    Word,
    Identifier,
    Asterisk,
    Eof,
}

pub type SpiceToken = Token<TokenType>;

fn gate(condition: bool) -> UseDecision {
    if condition {
        UseDecision::Use
    } else {
        UseDecision::Next
    }
}

/// Lexer for SPICE netlists.
///
/// The grammar depends on the reader options and is compiled once in
/// [`SpiceLexer::new`]. Clones share the compiled grammar.
#[derive(Clone)]
pub struct SpiceLexer {
    grammar: Arc<Grammar<TokenType>>,
    continuation_character: char,
    current_line_continuation_character: Option<char>,
}

impl SpiceLexer {
    pub fn new(options: &ReaderOptions) -> Result<Self> {
        Ok(Self {
            grammar: Arc::new(build_grammar(options)?),
            continuation_character: options.continuation_character,
            current_line_continuation_character: options.current_line_continuation_character,
        })
    }

    /// The compiled grammar.
    pub fn grammar(&self) -> Arc<Grammar<TokenType>> {
        Arc::clone(&self.grammar)
    }

    /// Start a lexer run over `text`.
    pub fn tokens<'a>(&'a self, text: &'a str) -> Lexer<'a, TokenType> {
        let state = LexerState::new(
            self.continuation_character,
            self.current_line_continuation_character,
        );
        Lexer::new(&self.grammar, text, state)
    }

    /// Lex the whole text, failing on the first lexical error.
    pub fn tokenize(&self, text: &str) -> Result<Vec<SpiceToken>> {
        self.tokens(text).collect()
    }
}

const NUMBER: &str = r"[+-]?(<DIGIT>+(\.<DIGIT>*)?|\.<DIGIT>+)(e[+-]?<DIGIT>+)?<LETTER>*";
const NUMBER_COMMA: &str = r"[+-]?(<DIGIT>+(,<DIGIT>*)?|\.<DIGIT>+)(e[+-]?<DIGIT>+)?<LETTER>*";

fn build_grammar(options: &ReaderOptions) -> Result<Grammar<TokenType>> {
    use TokenType as T;

    let has_title = options.has_title;
    let dot_case = options.ignore_case_for_dot_statements;

    let mut continuation = format!(
        r"(\r\n|\n|\r)[ \t]*{}",
        regex::escape(&options.continuation_character.to_string())
    );
    if let Some(c) = options.current_line_continuation_character {
        continuation = format!(
            r"{continuation}|{}(\r\n|\n|\r)",
            regex::escape(&c.to_string())
        );
    }

    let keyword = |token_type: T, text: &str| {
        TokenRule::new(token_type, format!("{text} keyword"), format!(r"\{text}\b"))
            .ignore_case(dot_case)
    };
    let refuse_continuation = |state: &LexerState<T>, lexeme: &str| {
        gate(!state.ends_with_continuation(lexeme))
    };

    GrammarBuilder::new(T::Eof)
        .internal("LETTER", "[a-zA-Z]")
        .internal("CHARACTER", r"[a-zA-Z0-9\-+]")
        .internal("DIGIT", "[0-9]")
        .internal("SPECIAL", r"[\\\[\]_.:!%#\-;<>^+/*]")
        .internal("SPECIAL_WITHOUT_BACKSLASH", r"[\[\]_.:!%#\-;<>^+/*]")
        .rule(TokenRule::new(T::Whitespace, "whitespace", r"[ \t]+").ignored())
        .rule(
            TokenRule::new(T::Title, "title line", r"[^\r\n]+")
                .use_when(move |s, _| gate(has_title && s.line == 1 && s.previous.is_none())),
        )
        .rule(
            TokenRule::new(T::CommentBlockStart, "comment block start", "#COM")
                .ignore_case(true)
                .use_when(|s, _| gate(!s.in_comment_block && s.at_line_start(&T::Newline)))
                .on_match(|s, _| {
                    s.in_comment_block = true;
                    ReturnDecision::IgnoreToken
                }),
        )
        .rule(
            TokenRule::new(T::CommentBlockEnd, "comment block end", "#ENDCOM")
                .ignore_case(true)
                .use_when(|s, _| gate(s.in_comment_block))
                .on_match(|s, _| {
                    s.in_comment_block = false;
                    ReturnDecision::IgnoreToken
                }),
        )
        .rule(
            TokenRule::new(T::CommentBlockContent, "comment block content", r"[^\r\n]+")
                .use_when(|s, _| gate(s.in_comment_block))
                .ignored(),
        )
        .rule(keyword(T::Ends, ".ENDS"))
        .rule(keyword(T::Endl, ".ENDL"))
        .rule(keyword(T::EndIf, ".ENDIF"))
        .rule(keyword(T::End, ".END"))
        .rule(keyword(T::ElseIf, ".ELSEIF"))
        .rule(keyword(T::Else, ".ELSE"))
        .rule(keyword(T::If, ".IF"))
        .rule(
            TokenRule::new(T::Dot, "dot", r"\.")
                .use_when(|s, _| gate(s.at_line_start(&T::Newline))),
        )
        .rule(
            TokenRule::new(T::BooleanExpression, "condition", r"\(.*\)")
                .use_when(|s, _| gate(s.previous_is(&[T::If, T::ElseIf]))),
        )
        .rule(TokenRule::new(T::Comma, "comma", ","))
        .rule(TokenRule::new(T::Delimiter, "delimiter", r"[()|]"))
        .rule(TokenRule::new(T::Equal, "equal sign", "="))
        .rule(
            TokenRule::new(T::Continue, "line continuation", continuation).on_match(|s, _| {
                s.line += 1;
                ReturnDecision::IgnoreToken
            }),
        )
        .rule(
            TokenRule::new(T::Newline, "new line", r"\r\n|\n|\r").on_match(|s, _| {
                s.line += 1;
                if s.in_comment_block {
                    ReturnDecision::IgnoreToken
                } else {
                    ReturnDecision::ReturnToken
                }
            }),
        )
        .rule(
            TokenRule::new(T::Percent, "percent value with comma", format!("{NUMBER_COMMA}%"))
                .ignore_case(true)
                .use_when(|s, lexeme| {
                    gate(
                        lexeme.contains(',')
                            && (s.previous.is_none() || s.previous_is(&[T::Equal, T::Value])),
                    )
                }),
        )
        .rule(
            TokenRule::new(T::Percent, "percent value", format!("{NUMBER}%")).ignore_case(true),
        )
        .rule(
            TokenRule::new(T::Value, "value with comma", NUMBER_COMMA)
                .ignore_case(true)
                .use_when(|s, lexeme| {
                    gate(lexeme.contains(',') && s.previous_is(&[T::Equal, T::Value]))
                }),
        )
        .rule(TokenRule::new(T::Value, "value", NUMBER).ignore_case(true))
        .rule(TokenRule::new(T::CommentHspice, "hspice comment", r"\$[^\r\n]*").ignored())
        .rule(TokenRule::new(T::CommentPspice, "pspice comment", r";[^\r\n]*").ignored())
        .rule(
            TokenRule::new(T::Comment, "full line comment", r"\*[^\r\n]*")
                .use_when(|s, _| gate(s.at_line_start(&T::Newline))),
        )
        .rule(TokenRule::new(
            T::DoubleQuotedString,
            "double quoted string",
            r#""(?:[^"\\]|\\.)*""#,
        ))
        .rule(
            TokenRule::new(T::ExpressionSingleQuotes, "quoted expression", "'[^']*'")
                .use_when(|s, _| gate(s.previous_is(&[T::Equal]))),
        )
        .rule(TokenRule::new(T::ExpressionBracket, "braced expression", r"\{[^{}]*\}"))
        .rule(TokenRule::new(T::SingleQuotedString, "single quoted string", "'[^']*'"))
        .rule(
            TokenRule::new(T::Reference, "reference", "@<CHARACTER>(<CHARACTER>|<SPECIAL>)*")
                .use_when(refuse_continuation),
        )
        .rule(
            TokenRule::new(T::Word, "word", "<LETTER>(<CHARACTER>|<SPECIAL>)*")
                .use_when(refuse_continuation),
        )
        .rule(
            TokenRule::new(
                T::Identifier,
                "identifier",
                r"(<CHARACTER>|_|\*)(<CHARACTER>|<SPECIAL>)*",
            )
            .use_when(refuse_continuation),
        )
        .rule(TokenRule::new(
            T::Reference,
            "reference without continuation",
            "@<CHARACTER>((<CHARACTER>|<SPECIAL>)*(<CHARACTER>|<SPECIAL_WITHOUT_BACKSLASH>))?",
        ))
        .rule(TokenRule::new(
            T::Word,
            "word without continuation",
            "<LETTER>((<CHARACTER>|<SPECIAL>)*(<CHARACTER>|<SPECIAL_WITHOUT_BACKSLASH>))?",
        ))
        .rule(TokenRule::new(
            T::Identifier,
            "identifier without continuation",
            r"(<CHARACTER>|_|\*)((<CHARACTER>|<SPECIAL>)*(<CHARACTER>|<SPECIAL_WITHOUT_BACKSLASH>))?",
        ))
        .rule(TokenRule::new(T::Asterisk, "asterisk", r"\*"))
        .build()
}
