//! Error types for template parsing and rendering.
//!
//! Soft misses (unknown slot names, malformed multi-line bodies, exhausted
//! pass budget) never surface here; they degrade to literal text.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for weft operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Grammar violation: unclosed tag, invalid identifier, malformed string
    /// or parameter list.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Opening and closing tags are well formed but name different variables.
    #[error("Mismatched variable tags: {{{open}}} ... {{/{close}}}")]
    MismatchedTags {
        open: String,
        close: String,
        offset: usize,
    },

    /// A variable was defined twice in the same render.
    #[error("Variable name conflict: `{0}`")]
    NameConflict(String),

    /// A variable was given the name of a registered function.
    #[error("Variable name conflicts with function: `{0}`")]
    FunctionConflict(String),

    /// A slot did not supply a required parameter.
    #[error("Required param for `{name}` not found: `{param}`")]
    MissingParam { name: String, param: String },

    /// Arithmetic failure.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// `register_function` was called with a name already in the registry.
    #[error("Function `{0}` is already registered")]
    FunctionExists(String),

    /// `load`/`loadDir` received an empty or non-string path.
    #[error("Invalid file path")]
    InvalidPath,

    /// `img` received a non-string argument.
    #[error("img() expects a string parameter.")]
    ImgArgument,

    /// A function rejected its arguments.
    #[error("{name}(): {message}")]
    Function { name: String, message: String },

    /// Filesystem failure inside a loader.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be used.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Convenience constructor for function argument errors.
    pub fn function(name: &str, message: impl Into<String>) -> Self {
        Error::Function {
            name: name.to_owned(),
            message: message.into(),
        }
    }
}

/// Result type alias for weft operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── SyntaxError ───────────────────────────────────────────────────────────────

/// A positioned grammar error in the style of PEG parser generators: the set
/// of alternatives that would have been accepted and the token actually found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Alternatives accepted at `offset`, already quoted where literal.
    pub expected: Vec<String>,
    /// The offending token; `None` means end of input.
    pub found: Option<String>,
    /// Byte offset into the text being parsed.
    pub offset: usize,
    /// 1-based line of `offset`.
    pub line: usize,
    /// 1-based column (in characters) of `offset`.
    pub column: usize,
}

impl SyntaxError {
    pub fn new<I, S>(expected: I, found: Option<String>, offset: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        expected.sort();
        expected.dedup();
        Self {
            expected,
            found,
            offset,
            line: 1,
            column: 1,
        }
    }

    /// Shift the offset by `base` (for errors raised on a sub-slice).
    pub fn rebase(mut self, base: usize) -> Self {
        self.offset += base;
        self
    }

    /// Fill in line and column from the text the offset refers to.
    pub fn locate(mut self, text: &str) -> Self {
        let upto = &text[..self.offset.min(text.len())];
        self.line = upto.matches('\n').count() + 1;
        let line_start = upto.rfind('\n').map(|i| i + 1).unwrap_or(0);
        self.column = upto[line_start..].chars().count() + 1;
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = match self.expected.as_slice() {
            [] => "end of input".to_owned(),
            [one] => one.clone(),
            [init @ .., last] => format!("{} or {}", init.join(", "), last),
        };
        let found = match &self.found {
            Some(tok) => format!("{tok:?}"),
            None => "end of input".to_owned(),
        };
        write!(
            f,
            "Expected {expected} but {found} found (line {}, column {})",
            self.line, self.column
        )
    }
}

impl std::error::Error for SyntaxError {}

// ── EvalError ─────────────────────────────────────────────────────────────────

/// Arithmetic evaluation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Param `{name}` is not a number: {value:?}")]
    NotANumber { name: String, value: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display_lists_alternatives() {
        let err = SyntaxError::new(["\"}}\"", "\"(\"", "identifier"], Some("b".into()), 6)
            .locate("{{foo bar}}");
        assert_eq!(
            err.to_string(),
            "Expected \"(\", \"}}\" or identifier but \"b\" found (line 1, column 7)"
        );
    }

    #[test]
    fn syntax_error_end_of_input() {
        let err = SyntaxError::new(["\"}}\""], None, 5).locate("{{abc");
        assert_eq!(
            err.to_string(),
            "Expected \"}}\" but end of input found (line 1, column 6)"
        );
    }

    #[test]
    fn locate_counts_lines_and_chars() {
        let err = SyntaxError::new(["x"], None, 8).locate("ab\ncdé\nfg");
        assert_eq!((err.line, err.column), (3, 1));
        let err = SyntaxError::new(["x"], None, 5).locate("ab\ncdé\nfg");
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn rebase_shifts_offset() {
        let err = SyntaxError::new(["x"], None, 2).rebase(10);
        assert_eq!(err.offset, 12);
    }

    #[test]
    fn binding_error_messages() {
        assert_eq!(
            Error::NameConflict("a".into()).to_string(),
            "Variable name conflict: `a`"
        );
        assert_eq!(
            Error::FunctionConflict("load".into()).to_string(),
            "Variable name conflicts with function: `load`"
        );
        assert_eq!(
            Error::MissingParam { name: "v".into(), param: "b".into() }.to_string(),
            "Required param for `v` not found: `b`"
        );
        assert_eq!(
            Error::MismatchedTags { open: "a".into(), close: "b".into(), offset: 0 }.to_string(),
            "Mismatched variable tags: {a} ... {/b}"
        );
    }

    #[test]
    fn eval_error_messages() {
        assert_eq!(Error::from(EvalError::DivisionByZero).to_string(), "Division by zero");
        assert_eq!(
            EvalError::NotANumber { name: "n".into(), value: "x".into() }.to_string(),
            "Param `n` is not a number: \"x\""
        );
    }
}
