//! Grammar recognizer.
//!
//! Turns masked, comment-free text into a flat list of [`Node`]s:
//!
//! | Form | Node |
//! |------|------|
//! | `{name = "value"}`, `{name = 3}` | single-line definition |
//! | `{name(req, opt="d")}…{/name}` | multi-line definition (`{@name}` marks it raw) |
//! | `{{name}}`, `{{name("a", key=1)}}`, `{{@name}}` | slot |
//! | `{{count * 2}}`, `{{(a + 1)^2}}` | arithmetic slot |
//! | anything else | text |
//!
//! A `{` that cannot begin a tag (followed by a quote, punctuation, a line
//! break, …) is plain text, as is any stray `}`.  Everything else inside
//! braces must be well formed; violations are reported as [`SyntaxError`]s
//! listing what the grammar would have accepted at that position.

use std::ops::Range;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result, SyntaxError};

use super::expr::{parse_expr, Expr};
use super::symbols::VariableDef;
use super::value::{format_number, Value};

const OPERATORS: [&str; 5] = ["\"*\"", "\"+\"", "\"-\"", "\"/\"", "\"^\""];

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// One argument of a slot call.  `name` is set for `key=value` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Option<String>,
    pub value: Value,
}

impl Param {
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    pub fn named(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.to_owned()),
            value: value.into(),
        }
    }
}

/// A recognized `{{…}}` slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMatch {
    /// Referenced name; for arithmetic slots, the trimmed expression source.
    pub name: String,
    pub params: Vec<Param>,
    /// `{{@name}}`: substitute without further parsing.
    pub raw_requested: bool,
    /// Set for arithmetic slots.
    pub expr: Option<Expr>,
    /// Byte offset of the opening `{{`.
    pub offset: usize,
    /// Length in bytes, closing `}}` included.
    pub len: usize,
}

impl SlotMatch {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Re-serialize the slot in canonical form.
    pub fn to_source(&self) -> String {
        let mut out = String::from("{{");
        if self.raw_requested {
            out.push('@');
        }
        out.push_str(&self.name);
        if self.expr.is_none() && !self.params.is_empty() {
            let args: Vec<String> = self
                .params
                .iter()
                .map(|p| match &p.name {
                    Some(n) => format!("{n}={}", quote_value(&p.value)),
                    None => quote_value(&p.value),
                })
                .collect();
            out.push('(');
            out.push_str(&args.join(", "));
            out.push(')');
        }
        out.push_str("}}");
        out
    }
}

/// Render a value as a literal the grammar reads back unchanged.
pub fn quote_value(value: &Value) -> String {
    match value {
        Value::Num(x) => format_number(*x),
        Value::Str(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        }
    }
}

/// A top-level element of parsed text.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(Range<usize>),
    Define {
        def: VariableDef,
        /// Whole definition, including a directly following line break.
        span: Range<usize>,
        /// Untrimmed body of a multi-line definition.
        body: Option<Range<usize>>,
    },
    Slot(SlotMatch),
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Parse `src` into nodes.
pub fn parse(src: &str) -> Result<Vec<Node>> {
    let mut r = Recognizer { src, pos: 0 };
    match r.parse_nodes(None) {
        Ok((nodes, _)) => Ok(nodes),
        Err(Error::Syntax(e)) => Err(Error::Syntax(e.locate(src))),
        Err(e) => Err(e),
    }
}

/// The top-level slots of `src`, in source order.
pub fn parse_matches(src: &str) -> Result<Vec<SlotMatch>> {
    Ok(parse(src)?
        .into_iter()
        .filter_map(|n| match n {
            Node::Slot(s) => Some(s),
            _ => None,
        })
        .collect())
}

// ── Recognizer ────────────────────────────────────────────────────────────────

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_text(nodes: &mut Vec<Node>, range: Range<usize>) {
    if range.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        if last.end == range.start {
            last.end = range.end;
            return;
        }
    }
    nodes.push(Node::Text(range));
}

enum Brace {
    Literal,
    Open,
    Close,
}

struct Recognizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Recognizer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Whitespace inside a tag, line breaks included.
    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.pos += 1;
        }
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        if !rest.starts_with(is_ident_start) {
            return None;
        }
        let len = rest
            .find(|c: char| !is_ident_continue(c))
            .unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    fn error(&self, expected: &[&str]) -> Error {
        let found = self.peek().map(String::from);
        SyntaxError::new(expected.iter().copied(), found, self.pos).into()
    }

    fn consume_line_break(&mut self) -> usize {
        if !self.eat('\n') && self.rest().starts_with("\r\n") {
            self.pos += 2;
        }
        self.pos
    }

    /// Parse nodes until end of input, or until the closer for `closer`.
    /// Returns the nodes and the span of the closing tag.
    fn parse_nodes(&mut self, closer: Option<&str>) -> Result<(Vec<Node>, Range<usize>)> {
        let mut nodes = Vec::new();
        loop {
            let Some(rel) = self.rest().find('{') else {
                push_text(&mut nodes, self.pos..self.src.len());
                self.pos = self.src.len();
                return match closer {
                    None => Ok((nodes, self.pos..self.pos)),
                    Some(name) => {
                        let expected = format!("\"{{/{name}}}\"");
                        Err(SyntaxError::new([expected], None, self.pos).into())
                    }
                };
            };
            let at = self.pos + rel;
            push_text(&mut nodes, self.pos..at);
            self.pos = at;

            let rest = self.rest();
            if rest.starts_with("{{{") {
                push_text(&mut nodes, at..at + 1);
                self.pos += 1;
                continue;
            }
            if rest.starts_with("{{") {
                nodes.push(Node::Slot(self.parse_slot()?));
                continue;
            }
            match self.classify_brace() {
                Brace::Literal => {
                    push_text(&mut nodes, at..at + 1);
                    self.pos += 1;
                }
                Brace::Close => {
                    let (name, span, slash) = self.parse_close()?;
                    return match closer {
                        Some(open) if open == name => Ok((nodes, span)),
                        Some(open) => Err(Error::MismatchedTags {
                            open: open.to_owned(),
                            close: name,
                            offset: span.start,
                        }),
                        None => Err(SyntaxError::new(
                            ["\"@\"", "identifier"],
                            Some("/".to_owned()),
                            slash,
                        )
                        .into()),
                    };
                }
                Brace::Open => {
                    let (def, span, body) = self.parse_definition()?;
                    nodes.push(Node::Define { def, span, body });
                }
            }
        }
    }

    /// Decide what a single `{` at the cursor starts.
    fn classify_brace(&self) -> Brace {
        let after = self.rest()[1..].trim_start_matches([' ', '\t']);
        match after.chars().next() {
            Some('/') => Brace::Close,
            Some(c) if is_ident_continue(c) || matches!(c, '@' | '}' | '=') => Brace::Open,
            _ => Brace::Literal,
        }
    }

    /// `{/name}`: returns the name, the tag span and the offset of `/`.
    fn parse_close(&mut self) -> Result<(String, Range<usize>, usize)> {
        let start = self.pos;
        self.pos += 1;
        self.skip_blanks();
        let slash = self.pos;
        self.eat('/');
        self.skip_blanks();
        let Some(name) = self.ident() else {
            return Err(self.error(&["identifier"]));
        };
        self.skip_blanks();
        if !self.eat('}') {
            return Err(self.error(&["\"}\""]));
        }
        Ok((name.to_owned(), start..self.pos, slash))
    }

    // ── Definitions ───────────────────────────────────────────────────────────

    fn parse_definition(&mut self) -> Result<(VariableDef, Range<usize>, Option<Range<usize>>)> {
        let start = self.pos;
        self.pos += 1;
        self.skip_blanks();
        let raw = self.eat('@');
        self.skip_blanks();
        let Some(name) = self.ident() else {
            let expected: &[&str] = if raw { &["identifier"] } else { &["\"@\"", "identifier"] };
            return Err(self.error(expected));
        };
        let mut def = VariableDef::new(name);
        def.is_raw = raw;
        self.skip_ws();

        match self.peek() {
            Some('=') => {
                self.pos += 1;
                self.skip_ws();
                let value = self.parse_value(&[])?;
                self.skip_ws();
                if !self.eat('}') {
                    return Err(self.error(&["\"}\""]));
                }
                def.content = value.to_string();
                if !def.is_raw && parse(&def.content).is_err() {
                    debug!(name = %def.name, "value is not valid template text; stored raw");
                    def.is_raw = true;
                }
                let end = self.consume_line_break();
                return Ok((def, start..end, None));
            }
            Some('(') => {
                self.parse_param_list(&mut def)?;
                self.skip_ws();
                if !self.eat('}') {
                    return Err(self.error(&["\"}\""]));
                }
            }
            Some('}') => self.pos += 1,
            _ => return Err(self.error(&["\"(\"", "\"=\"", "\"}\""])),
        }

        let body_start = self.pos;
        let mut inner = Recognizer {
            src: self.src,
            pos: body_start,
        };
        let close = match inner.parse_nodes(Some(def.name.as_str())) {
            Ok((_, close)) => close,
            Err(Error::Syntax(err)) => match find_closer(self.src, body_start, &def.name) {
                Some(close) => {
                    debug!(name = %def.name, error = %err, "malformed body; stored raw");
                    def.is_raw = true;
                    close
                }
                None => return Err(Error::Syntax(err)),
            },
            Err(e) => return Err(e),
        };

        def.content = trim_body(&self.src[body_start..close.start]).to_owned();
        self.pos = close.end;
        let end = self.consume_line_break();
        Ok((def, start..end, Some(body_start..close.start)))
    }

    /// `(req, opt="default", n=3)`.  Bare names must precede defaulted ones.
    fn parse_param_list(&mut self, def: &mut VariableDef) -> Result<()> {
        self.pos += 1;
        self.skip_ws();
        if self.eat(')') {
            return Ok(());
        }
        loop {
            self.skip_ws();
            let Some(param) = self.ident() else {
                return Err(self.error(&["identifier"]));
            };
            let param = param.to_owned();
            self.skip_ws();
            if self.eat('=') {
                self.skip_ws();
                let value = self.parse_value(&[])?;
                def.optional_params.push((param, value));
            } else if !def.optional_params.is_empty() {
                return Err(self.error(&["\"=\""]));
            } else {
                def.required_params.push(param);
            }
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(());
            }
            return Err(self.error(&["\")\"", "\",\"", "\"=\""]));
        }
    }

    // ── Slots ─────────────────────────────────────────────────────────────────

    fn parse_slot(&mut self) -> Result<SlotMatch> {
        let start = self.pos;
        self.pos += 2;
        self.skip_ws();
        let raw = self.eat('@');
        self.skip_ws();
        let body_start = self.pos;

        match self.peek() {
            Some(c) if is_ident_start(c) => {
                let name = self.ident().unwrap_or_default().to_owned();
                self.skip_ws();
                let params = match self.peek() {
                    Some('(') => {
                        let params = self.parse_args()?;
                        self.skip_ws();
                        params
                    }
                    Some('+' | '-' | '*' | '/' | '^') => {
                        return self.parse_expr_slot(start, body_start, raw);
                    }
                    _ => Vec::new(),
                };
                if !self.rest().starts_with("}}") {
                    let mut expected = OPERATORS.to_vec();
                    expected.extend(["\"(\"", "\"}}\""]);
                    if !params.is_empty() {
                        expected = vec!["\"}}\""];
                    }
                    return Err(self.error(&expected));
                }
                self.pos += 2;
                Ok(SlotMatch {
                    name,
                    params,
                    raw_requested: raw,
                    expr: None,
                    offset: start,
                    len: self.pos - start,
                })
            }
            Some(c) if c.is_ascii_digit() || c == '(' || c == '-' => {
                self.parse_expr_slot(start, body_start, raw)
            }
            _ => {
                let expected: &[&str] = if raw {
                    &["\"(\"", "\"-\"", "identifier", "number"]
                } else {
                    &["\"(\"", "\"-\"", "\"@\"", "identifier", "number"]
                };
                Err(self.error(expected))
            }
        }
    }

    fn parse_expr_slot(&mut self, start: usize, body_start: usize, raw: bool) -> Result<SlotMatch> {
        let Some(rel) = self.src[body_start..].find("}}") else {
            self.pos = self.src.len();
            return Err(SyntaxError::new(["\"}}\""], None, self.pos).into());
        };
        let inner = &self.src[body_start..body_start + rel];
        let expr = parse_expr(inner).map_err(|e| e.rebase(body_start))?;
        self.pos = body_start + rel + 2;
        Ok(SlotMatch {
            name: inner.trim().to_owned(),
            params: Vec::new(),
            raw_requested: raw,
            expr: Some(expr),
            offset: start,
            len: self.pos - start,
        })
    }

    /// `(arg, key=value, …)`
    fn parse_args(&mut self) -> Result<Vec<Param>> {
        self.pos += 1;
        let mut params = Vec::new();
        self.skip_ws();
        if self.eat(')') {
            return Ok(params);
        }
        loop {
            self.skip_ws();
            let param = match self.peek() {
                Some(c) if is_ident_start(c) => {
                    let name = self.ident().unwrap_or_default().to_owned();
                    self.skip_ws();
                    if !self.eat('=') {
                        return Err(self.error(&["\"=\""]));
                    }
                    self.skip_ws();
                    Param {
                        name: Some(name),
                        value: self.parse_value(&[])?,
                    }
                }
                _ => Param {
                    name: None,
                    value: self.parse_value(&["identifier"])?,
                },
            };
            params.push(param);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(params);
            }
            return Err(self.error(&["\")\"", "\",\""]));
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────────

    fn parse_value(&mut self, also: &[&str]) -> Result<Value> {
        match self.peek() {
            Some('"') => self.parse_string().map(Value::Str),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number().map(Value::Num),
            _ => {
                let mut expected = vec!["number", "string"];
                expected.extend_from_slice(also);
                Err(self.error(&expected))
            }
        }
    }

    /// `"…"` with `\" \\ \n \t \{ \}` escapes; other pairs are kept as written.
    fn parse_string(&mut self) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, e @ ('"' | '\\' | '{' | '}'))) => out.push(e),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }
        self.pos = self.src.len();
        Err(SyntaxError::new(["\"\\\"\""], None, self.pos).into())
    }

    /// `-?\d+(\.\d+)?`
    fn parse_number(&mut self) -> Result<f64> {
        let start = self.pos;
        self.eat('-');
        let n = self.digit_run();
        if n == 0 {
            return Err(self.error(&["[0-9]"]));
        }
        self.pos += n;
        if self.rest().starts_with('.') && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.pos += 1;
            self.pos += self.digit_run();
        }
        Ok(self.src[start..self.pos].parse().unwrap_or(0.0))
    }

    fn digit_run(&self) -> usize {
        self.rest().bytes().take_while(u8::is_ascii_digit).count()
    }
}

/// Textual search for `{/name}` when the body could not be parsed.
fn find_closer(src: &str, from: usize, name: &str) -> Option<Range<usize>> {
    let re = Regex::new(&format!(r"\{{[ \t]*/[ \t]*{}[ \t]*\}}", regex::escape(name))).ok()?;
    re.find(&src[from..]).map(|m| from + m.start()..from + m.end())
}

/// Drop one leading and one trailing line break.
fn trim_body(body: &str) -> &str {
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    body.strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
