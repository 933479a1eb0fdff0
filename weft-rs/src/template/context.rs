//! Per-render state: options, the symbol table, and collected attachments.

use std::fmt;
use std::path::{Path, PathBuf};

use super::symbols::SymbolTable;

// ── RenderOptions ─────────────────────────────────────────────────────────────

/// Knobs for one render call.  Usually filled from a `.weftrc`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Return the slot matches of the preprocessed template instead of
    /// rendering it.
    pub return_parser_matches: bool,
    /// Directory that relative paths given to `load`, `loadDir` and `img`
    /// are resolved against.  Empty means the working directory.
    pub base_dir: PathBuf,
    /// File extensions (without the dot) `loadDir` keeps.  Empty keeps all.
    pub extensions: Vec<String>,
    /// Glob patterns `loadDir` skips, matched against paths relative to the
    /// loaded directory.
    pub ignore: Vec<String>,
}

impl RenderOptions {
    /// Resolve `path` against [`base_dir`](Self::base_dir).
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    /// Whether `loadDir` keeps a file with this extension.
    pub fn accepts_extension(&self, ext: Option<&str>) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        ext.is_some_and(|e| {
            self.extensions
                .iter()
                .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(e))
        })
    }
}

// ── Attachments ───────────────────────────────────────────────────────────────

/// Where an attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Inline file content.
    Base64 { mime: String, data: String },
    /// Remote resource, fetched by whoever consumes the attachment.
    Url(String),
}

/// A side artifact produced while rendering (currently only images).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub source: AttachmentSource,
    /// The path or URL as written in the template.
    pub origin: String,
}

impl Attachment {
    pub fn url(url: &str) -> Self {
        Self {
            source: AttachmentSource::Url(url.to_owned()),
            origin: url.to_owned(),
        }
    }

    pub fn base64(origin: &str, mime: &str, data: String) -> Self {
        Self {
            source: AttachmentSource::Base64 {
                mime: mime.to_owned(),
                data,
            },
            origin: origin.to_owned(),
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            AttachmentSource::Url(url) => write!(f, "url {url}"),
            AttachmentSource::Base64 { mime, data } => {
                write!(f, "{mime} {} ({} base64 bytes)", self.origin, data.len())
            }
        }
    }
}

// ── RenderContext ─────────────────────────────────────────────────────────────

/// State threaded through one top-level render.
///
/// Functions receive it mutably; built-ins read [`options`](Self::options)
/// and push to [`attachments`](Self::attachments).
#[derive(Debug, Default)]
pub struct RenderContext {
    pub options: RenderOptions,
    pub variables: SymbolTable,
    pub attachments: Vec<Attachment>,
}

impl RenderContext {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
