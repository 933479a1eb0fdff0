//! `.weftrc` configuration file parser.
//!
//! One setting per line, `key = value…` (the `=` is optional):
//!
//! | Key | Value |
//! |-----|-------|
//! | `extensions` | file extensions `loadDir` keeps, e.g. `rs md "txt"` |
//! | `ignore` | glob patterns `loadDir` skips, e.g. `target/** *.lock` |
//! | `base_dir` | directory relative paths resolve against |
//! | `matches` | `on`/`off`: print slot matches instead of rendering |
//! | Lines starting with `;` | comment, ignored |
//!
//! `extensions` and `ignore` may appear several times; values accumulate.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::template::RenderOptions;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Parsed configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub options: RenderOptions,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.  Bad lines are skipped and reported; the rest
    /// still applies.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let (key, rest) = line
                .split_once(|c: char| c.is_ascii_whitespace() || c == '=')
                .unwrap_or((line, ""));
            let rest = rest.trim_start();
            let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
            let values = split_args(rest);

            if let Err(message) = config.apply(key, values) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file.  A relative `base_dir` is taken
    /// relative to the file's directory.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        let (mut config, errors) = Self::load_str(&s);
        let base = &config.options.base_dir;
        if !base.as_os_str().is_empty() && base.is_relative() {
            if let Some(dir) = path.parent() {
                config.options.base_dir = dir.join(base);
            }
        }
        Ok((config, errors))
    }

    fn apply(&mut self, key: &str, mut values: Vec<String>) -> Result<(), String> {
        let opts = &mut self.options;
        match key {
            "extensions" => opts.extensions.extend(
                values
                    .into_iter()
                    .map(|v| v.trim_start_matches('.').to_owned()),
            ),
            "ignore" => opts.ignore.extend(values),
            "base_dir" => {
                if values.len() != 1 {
                    return Err("base_dir: expected one directory".to_owned());
                }
                opts.base_dir = PathBuf::from(values.remove(0));
            }
            "matches" => {
                let [v] = values.as_slice() else {
                    return Err("matches: expected on or off".to_owned());
                };
                opts.return_parser_matches =
                    parse_bool(v).ok_or_else(|| format!("matches: not a boolean: {v}"))?;
            }
            other => return Err(format!("unknown setting: {other}")),
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Some(true),
        "off" | "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() || quoted {
                    args.push(std::mem::take(&mut cur));
                }
                quoted = false;
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() || quoted {
        args.push(cur);
    }
    args
}

// ── Tests ─────────────────────────────────────────────────────────────────────
