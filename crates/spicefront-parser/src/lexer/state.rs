//! Per-run lexer state.

/// Mutable state threaded through one lexer run.
///
/// Rules read it in their use decision and may change it in their return
/// decision. A fresh state is created for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerState<T> {
    /// Current line, starting at 1.
    pub line: usize,
    /// Type of the last token that was returned (not ignored).
    pub previous: Option<T>,
    /// Inside a `#COM ... #ENDCOM` block.
    pub in_comment_block: bool,
    /// The candidate lexeme is immediately followed by a line break.
    pub before_line_break: bool,
    /// Character that continues the previous line.
    pub continuation_character: char,
    /// Character that continues the current line.
    pub current_line_continuation_character: Option<char>,
}

impl<T> LexerState<T> {
    pub fn new(continuation_character: char, current_line_continuation_character: Option<char>) -> Self {
        Self {
            line: 1,
            previous: None,
            in_comment_block: false,
            before_line_break: false,
            continuation_character,
            current_line_continuation_character,
        }
    }
}

impl<T: PartialEq> LexerState<T> {
    /// True when the last returned token is one of `types`.
    pub fn previous_is(&self, types: &[T]) -> bool {
        self.previous.as_ref().is_some_and(|p| types.contains(p))
    }

    /// True at the beginning of the input or right after `newline`.
    pub fn at_line_start(&self, newline: &T) -> bool {
        match &self.previous {
            None => true,
            Some(p) => p == newline,
        }
    }

    /// True when `lexeme` ends with the current-line continuation character
    /// right before a line break, so the character belongs to the
    /// continuation and not to the lexeme.
    pub fn ends_with_continuation(&self, lexeme: &str) -> bool {
        self.before_line_break
            && self
                .current_line_continuation_character
                .is_some_and(|c| lexeme.ends_with(c))
    }
}
