//! Arithmetic expression lexer, AST, parser, and evaluator.
//!
//! Evaluated for arithmetic slots such as `{{count * 2}}` and `{{(a + 1)^2}}`.
//!
//! Operator precedence (lowest → highest):
//!   additive (`+ -`)  →  multiplicative (`* /`)  →  unary `-`  →
//!   power (`^`, right-associative)  →  primary
//!
//! Unary minus binds looser than `^`, so `-2^2` is `-4` and `2^-1` is `0.5`.

use crate::error::{EvalError, SyntaxError};

use super::value::Value;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Name resolution for the evaluator.
///
/// The renderer implements this for the parameter bindings of the variable
/// being expanded, and for the top-level symbol table.
pub trait Scope {
    /// Look up a name.  `None` means the name is unbound here.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for std::collections::HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    /// Unrecognised input byte.
    Unknown(char),
    Eof,
}

impl Token {
    /// Rendering used for the "found" part of a diagnostic.
    fn describe(&self) -> Option<String> {
        Some(match self {
            Token::Num(x) => super::value::format_number(*x),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Caret => "^".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Unknown(c) => c.to_string(),
            Token::Eof => return None,
        })
    }
}

const BINARY_OPS: [&str; 5] = ["\"*\"", "\"+\"", "\"-\"", "\"/\"", "\"^\""];
const OPERAND: [&str; 4] = ["\"(\"", "\"-\"", "identifier", "number"];

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let bytes = self.src.as_bytes();
        if self.peek() == Some(b'.') && matches!(bytes.get(self.pos + 1), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        Token::Num(self.src[start..self.pos].parse().unwrap_or(0.0))
    }

    fn read_ident(&mut self, start: usize) -> Token {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.pos += 1;
        }
        Token::Ident(self.src[start..self.pos].to_owned())
    }

    /// Next token together with its starting byte offset.
    fn next_token(&mut self) -> (Token, usize) {
        self.skip_ws();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return (Token::Eof, start);
        };
        if !ch.is_ascii() {
            let c = self.src[start..].chars().next().unwrap_or('\u{FFFD}');
            self.pos += c.len_utf8();
            return (Token::Unknown(c), start);
        }
        self.pos += 1;
        let tok = match ch {
            b'0'..=b'9' => self.read_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_ident(start),
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'^' => Token::Caret,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            c => Token::Unknown(c as char),
        };
        (tok, start)
    }

    fn tokenize(mut self) -> Vec<(Token, usize)> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token();
            let done = matches!(t.0, Token::Eof);
            tokens.push(t);
            if done {
                break;
            }
        }
        tokens
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Every name the expression references, in first-use order.
    pub fn names(&self) -> Vec<String> {
        fn walk(e: &Expr, out: &mut Vec<String>) {
            match e {
                Expr::Num(_) => {}
                Expr::Var(n) => {
                    if !out.contains(n) {
                        out.push(n.clone());
                    }
                }
                Expr::Neg(inner) => walk(inner, out),
                Expr::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.0).unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.1).unwrap_or(self.end)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &[&str]) -> SyntaxError {
        SyntaxError::new(expected.iter().copied(), self.peek().describe(), self.offset())
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_primary()?;
        if self.eat(&Token::Caret) {
            // Right-associative; the exponent may carry its own sign.
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().clone() {
            Token::Num(x) => {
                self.pos += 1;
                Ok(Expr::Num(x))
            }
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Expr::Var(name))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_additive()?;
                if !self.eat(&Token::RParen) {
                    let mut expected = BINARY_OPS.to_vec();
                    expected.push("\")\"");
                    return Err(self.error(&expected));
                }
                Ok(inner)
            }
            _ => Err(self.error(&OPERAND)),
        }
    }
}

/// Parse an arithmetic expression.  Error offsets are relative to `src`.
pub fn parse_expr(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = Lexer::new(src).tokenize();
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
    };
    let expr = parser.parse_additive()?;
    if parser.peek() != &Token::Eof {
        return Err(parser.error(&BINARY_OPS));
    }
    Ok(expr)
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] against `scope`.
///
/// Unbound names evaluate as an error here; callers that want the soft-miss
/// behaviour check [`Expr::names`] against the scope first.
pub fn eval_expr(expr: &Expr, scope: &dyn Scope) -> Result<f64, EvalError> {
    match expr {
        Expr::Num(x) => Ok(*x),
        Expr::Var(name) => {
            let value = scope.lookup(name).unwrap_or_default();
            value.as_number().ok_or_else(|| EvalError::NotANumber {
                name: name.clone(),
                value: value.to_string(),
            })
        }
        Expr::Neg(inner) => Ok(-eval_expr(inner, scope)?),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, scope)?;
            let r = eval_expr(rhs, scope)?;
            Ok(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l / r
                }
                BinOp::Pow => l.powf(r),
            })
        }
    }
}

/// Parse and evaluate `src` in one step.
pub fn eval_str(src: &str, scope: &dyn Scope) -> crate::Result<f64> {
    let expr = parse_expr(src)?;
    Ok(eval_expr(&expr, scope)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn eval(src: &str) -> f64 {
        eval_str(src, &HashMap::new()).expect("eval failed")
    }

    fn scope(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn literals() {
        assert_eq!(eval("42"), 42.0);
        assert_eq!(eval("3.25"), 3.25);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("2 + 3"), 5.0);
        assert_eq!(eval("10 - 4"), 6.0);
        assert_eq!(eval("3 * 4"), 12.0);
        assert_eq!(eval("10 / 2"), 5.0);
        assert_eq!(eval("7 / 2"), 3.5);
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("2+3^2"), 11.0);
        assert_eq!(eval("(2+3)^2"), 25.0);
        assert_eq!(eval("2 * 3 ^ 2"), 18.0);
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(eval("2^3^2"), 512.0);
    }

    #[test]
    fn unary_minus() {
        assert_eq!(eval("-5"), -5.0);
        assert_eq!(eval("-(3 + 2)"), -5.0);
        assert_eq!(eval("--4"), 4.0);
        assert_eq!(eval("-2^2"), -4.0);
        assert_eq!(eval("2^-1"), 0.5);
        assert_eq!(eval("3 - -1"), 4.0);
    }

    #[test]
    fn left_associative_subtraction_and_division() {
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("100 / 10 / 5"), 2.0);
    }

    #[test]
    fn division_by_zero() {
        let err = eval_str("5/0", &HashMap::new()).unwrap_err();
        assert!(matches!(err, crate::Error::Eval(EvalError::DivisionByZero)));
        let s = scope(&[("z", Value::Num(0.0))]);
        assert_eq!(eval_str("1 / z", &s).unwrap_err().to_string(), "Division by zero");
    }

    #[test]
    fn names_resolve_from_scope() {
        let s = scope(&[("count", Value::Num(4.0)), ("step", Value::Str("2.5".into()))]);
        assert_eq!(eval_str("count * step", &s).unwrap(), 10.0);
    }

    #[test]
    fn non_numeric_name_is_an_error() {
        let s = scope(&[("word", Value::Str("abc".into()))]);
        let err = eval_str("word + 1", &s).unwrap_err();
        assert_eq!(err.to_string(), "Param `word` is not a number: \"abc\"");
    }

    #[test]
    fn names_in_first_use_order() {
        let e = parse_expr("b * (a + b) - c").unwrap();
        assert_eq!(e.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn syntax_errors_are_positioned() {
        let err = parse_expr("2 + ").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.found.is_none());
        assert!(err.expected.contains(&"number".to_string()));

        let err = parse_expr("(1 + 2").unwrap_err();
        assert!(err.expected.contains(&"\")\"".to_string()));

        let err = parse_expr("1 $ 2").unwrap_err();
        assert_eq!(err.found.as_deref(), Some("$"));
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn digit_leading_identifier_rejected() {
        let err = parse_expr("1abc").unwrap_err();
        assert_eq!(err.found.as_deref(), Some("abc"));
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn spaced_number_then_identifier_rejected() {
        assert!(parse_expr("1 abc").is_err());
        assert!(parse_expr("foo bar").is_err());
    }
}
