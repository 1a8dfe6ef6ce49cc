//! Reader configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options controlling how netlist text is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// The first line is a title and is not parsed as a statement.
    pub has_title: bool,
    /// The netlist must be terminated with `.END`.
    pub is_end_required: bool,
    /// `.ENDS`, `.IF`, ... are recognised in any letter case.
    pub ignore_case_for_dot_statements: bool,
    /// Character that continues the previous line when it starts a line.
    pub continuation_character: char,
    /// Character that continues the current line when it ends a line.
    pub current_line_continuation_character: Option<char>,
    /// Base directory for include resolution. Passed through untouched.
    pub working_directory: Option<PathBuf>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            has_title: true,
            is_end_required: false,
            ignore_case_for_dot_statements: true,
            continuation_character: '+',
            current_line_continuation_character: Some('\\'),
            working_directory: None,
        }
    }
}

impl ReaderOptions {
    /// Options for text without a title line.
    pub fn without_title() -> Self {
        Self {
            has_title: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ReaderOptions::default();
        assert!(options.has_title);
        assert!(!options.is_end_required);
        assert!(options.ignore_case_for_dot_statements);
        assert_eq!(options.continuation_character, '+');
        assert_eq!(options.current_line_continuation_character, Some('\\'));
    }

    #[test]
    fn test_partial_json() {
        let options: ReaderOptions =
            serde_json::from_str(r#"{ "has_title": false, "is_end_required": true }"#).unwrap();
        assert!(!options.has_title);
        assert!(options.is_end_required);
        assert_eq!(options.continuation_character, '+');
        assert!(options.working_directory.is_none());
    }
}
