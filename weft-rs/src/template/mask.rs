//! Code-span masking.
//!
//! Fenced blocks and inline backtick spans are opaque to every later stage:
//! comments are not stripped there and tags are not parsed there.  The
//! [`Masker`] swaps each span for a placeholder made of private-use
//! characters and puts the original bytes back once rendering is finished.
//!
//! | Form | Rule |
//! |------|------|
//! | Fence | a line of ≥ 3 backticks (optionally indented, optional info string) up to a line of at least as many backticks; unterminated fences run to end of input |
//! | Inline | a backtick run closed by a run of the same length on the same line; unmatched runs are literal |

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(`{3,})[^`]*$").expect("Invalid fence regex"));

static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(`{3,})[ \t\r]*$").expect("Invalid fence regex"));

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").expect("Invalid placeholder regex"));

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

// ── Range detection ───────────────────────────────────────────────────────────

/// Find all code spans in `text`, as sorted, non-overlapping byte ranges.
pub fn find_masked_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let eol = line_end(text, pos);
        let line = &text[pos..eol];

        if let Some(caps) = FENCE_OPEN.captures(line) {
            let fence_len = caps[1].len();
            let start = pos;
            let mut end = text.len();
            let mut p = next_line(text, eol);
            while p < text.len() {
                let le = line_end(text, p);
                let candidate = &text[p..le];
                if let Some(close) = FENCE_CLOSE.captures(candidate) {
                    if close[1].len() >= fence_len {
                        end = le;
                        break;
                    }
                }
                p = next_line(text, le);
            }
            ranges.push(start..end);
            pos = next_line(text, end);
            continue;
        }

        inline_spans(line, pos, &mut ranges);
        pos = next_line(text, eol);
    }

    ranges
}

fn line_end(text: &str, from: usize) -> usize {
    text[from..].find('\n').map(|i| from + i).unwrap_or(text.len())
}

fn next_line(text: &str, line_end: usize) -> usize {
    (line_end + 1).min(text.len())
}

/// Backtick runs matched by a run of the same length later on the line.
fn inline_spans(line: &str, base: usize, out: &mut Vec<Range<usize>>) {
    let bytes = line.as_bytes();
    let run_at = |i: usize| bytes[i..].iter().take_while(|&&b| b == b'`').count();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let n = run_at(i);
        let mut j = i + n;
        let mut closed = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let m = run_at(j);
                if m == n {
                    closed = Some(j + m);
                    break;
                }
                j += m;
            } else {
                j += 1;
            }
        }
        match closed {
            Some(end) => {
                out.push(base + i..base + end);
                i = end;
            }
            None => i += n,
        }
    }
}

// ── Masker ────────────────────────────────────────────────────────────────────

/// Holds masked segments for the lifetime of one render.
#[derive(Debug, Default)]
pub struct Masker {
    segments: Vec<String>,
}

impl Masker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every code span in `text` with a placeholder.
    pub fn mask(&mut self, text: &str) -> String {
        let ranges = find_masked_ranges(text);
        if ranges.is_empty() {
            return text.to_owned();
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for r in ranges {
            out.push_str(&text[last..r.start]);
            out.push_str(&self.protect(&text[r.clone()]));
            last = r.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Store `content` verbatim and return its placeholder.  Used for raw
    /// substitutions that later passes must not parse.
    pub fn protect(&mut self, content: &str) -> String {
        let idx = self.segments.len();
        self.segments.push(content.to_owned());
        format!("{OPEN}{idx}{CLOSE}")
    }

    /// Restore every placeholder in `text`.
    ///
    /// Segments stored later may contain placeholders of earlier ones, so
    /// substitution repeats until nothing changes.
    pub fn unmask(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for _ in 0..=self.segments.len() {
            if !out.contains(OPEN) {
                break;
            }
            let next = PLACEHOLDER.replace_all(&out, |caps: &regex::Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.segments.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_owned())
            });
            if next == out {
                break;
            }
            out = next.into_owned();
        }
        out
    }

    /// Number of stored segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
