//! Comment stripping.
//!
//! Runs after masking, so code spans are already placeholders and cannot be
//! touched.  The only other protected region is a double-quoted string inside
//! a brace tag (`{name = "a // b"}`, `{{f("http://x")}}`).
//!
//! * `// …` is removed up to (not including) the line break.
//! * `/* … */` is removed whole; the first `*/` closes it, and an
//!   unterminated block runs to end of input.
//! * `://` (a URL scheme separator) is not a comment.

/// Remove comments from `src`.
pub fn strip_comments(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut brace_depth = 0usize;
    let mut in_str = false;
    // Start of the pending run of bytes to copy.
    let mut copy_from = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if in_str {
            match b {
                b'\\' => i += 1,
                b'"' => in_str = false,
                b'\n' => in_str = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match b {
            b'{' if opens_tag(bytes, i) => brace_depth += 1,
            b'}' => brace_depth = brace_depth.saturating_sub(1),
            b'"' if brace_depth > 0 => in_str = true,
            b'/' if bytes.get(i + 1) == Some(&b'/') && (i == 0 || bytes[i - 1] != b':') => {
                out.push_str(&src[copy_from..i]);
                let end = src[i..].find('\n').map(|n| i + n).unwrap_or(src.len());
                copy_from = end;
                i = end;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(&src[copy_from..i]);
                let end = src[i + 2..]
                    .find("*/")
                    .map(|n| i + 2 + n + 2)
                    .unwrap_or(src.len());
                copy_from = end;
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    out.push_str(&src[copy_from.min(src.len())..]);
    out
}

/// Whether the `{` at `i` can start a tag: it is followed, after blanks, by
/// another `{`, an identifier character, `@` or `/`.  Other braces are prose.
fn opens_tag(bytes: &[u8], i: usize) -> bool {
    let next = bytes[i + 1..]
        .iter()
        .find(|&&b| b != b' ' && b != b'\t');
    matches!(next, Some(&c) if c.is_ascii_alphanumeric() || matches!(c, b'{' | b'@' | b'/' | b'_'))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
