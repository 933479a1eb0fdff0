//! Runtime value type for template parameters.
//!
//! The language has two value kinds: strings and numbers.  Parameter defaults
//! and slot arguments are written as one or the other; everything is text once
//! it lands in the output.

use std::fmt;

/// A parameter or argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Num(x) => write!(f, "{}", format_number(*x)),
        }
    }
}

impl Value {
    /// Coerce to a number.  Strings must parse completely (after trimming).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Num(x) => Some(*x),
            Value::Str(s) => s.trim().parse().ok().filter(|x: &f64| x.is_finite()),
        }
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Num(_) => None,
        }
    }
}

/// Format a number the way it should appear in rendered text: integral values
/// print without a fractional part.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        // `-0.0` formats as "-0"; normalise.
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Num(x)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
