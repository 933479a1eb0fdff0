//! Built-in functions: `load`, `loadDir`, `img`.
//!
//! Relative paths resolve against [`RenderOptions::base_dir`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::Engine as _;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::context::{Attachment, RenderContext, RenderOptions};
use super::registry::FunctionRegistry;
use super::value::Value;

/// Install every built-in into `registry`, replacing functions of the same
/// names.
pub fn register_all(registry: &mut FunctionRegistry) {
    registry.replace_async("load", &["path"], |ctx, args| {
        Box::pin(async move { load(&ctx.options, &args).await })
    });
    registry.replace_async("loadDir", &["path", "ignore"], |ctx, args| {
        Box::pin(async move { load_dir_fn(&ctx.options, &args).await })
    });
    registry.replace_async("img", &["source"], |ctx, args| {
        Box::pin(async move { img(ctx, &args).await })
    });
}

fn path_arg(args: &[Value]) -> Result<&str> {
    match args.first().and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(Error::InvalidPath),
    }
}

// ── load ──────────────────────────────────────────────────────────────────────

async fn load(options: &RenderOptions, args: &[Value]) -> Result<String> {
    let path = options.resolve(path_arg(args)?);
    debug!(path = %path.display(), "load");
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| Error::Io { path, source })
}

// ── loadDir ───────────────────────────────────────────────────────────────────

async fn load_dir_fn(options: &RenderOptions, args: &[Value]) -> Result<String> {
    let root = options.resolve(path_arg(args)?);
    let extra: Vec<String> = args
        .get(1)
        .and_then(Value::as_str)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let options = options.clone();
    let files = tokio::task::spawn_blocking(move || load_dir(&root, &options, &extra))
        .await
        .map_err(|e| Error::function("loadDir", e.to_string()))??;
    Ok(format_files(&files))
}

/// Read every kept file under `root`, keyed by its `/`-separated path
/// relative to `root`.
///
/// A file is kept when its extension passes
/// [`RenderOptions::accepts_extension`] and neither it nor any of its parent
/// directories matches an ignore glob (`options.ignore` plus `extra_ignore`).
/// The walk applies the usual `ignore` filters too: hidden entries and
/// anything a `.gitignore` excludes are skipped.  Files that are not UTF-8
/// are skipped.
pub fn load_dir(
    root: &Path,
    options: &RenderOptions,
    extra_ignore: &[String],
) -> Result<BTreeMap<String, String>> {
    fs::metadata(root).map_err(|source| Error::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let globs = build_globset(options.ignore.iter().chain(extra_ignore))?;

    let base = root.to_path_buf();
    let walker = WalkBuilder::new(root)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |e| e.depth() == 0 || !globs.is_match(relative(&base, e.path())))
        .build();

    let mut files = BTreeMap::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if !options.accepts_extension(path.extension().and_then(|e| e.to_str())) {
            continue;
        }
        let rel = relative(root, path);
        match fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => {
                    files.insert(rel, text);
                }
                Err(_) => warn!(path = %rel, "skipping non-UTF-8 file"),
            },
            Err(e) => warn!(path = %rel, error = %e, "skipping unreadable file"),
        }
    }
    debug!(root = %root.display(), files = files.len(), "loadDir");
    Ok(files)
}

fn build_globset<'a>(patterns: impl Iterator<Item = &'a String>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::function("loadDir", format!("invalid ignore pattern '{pattern}' - {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::function("loadDir", format!("failed to compile ignore globs: {e}")))
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Format loaded files as fenced blocks labelled with their paths.
///
/// The fence is one backtick longer than the longest run inside the file, so
/// files that contain fences themselves stay intact.
pub fn format_files(files: &BTreeMap<String, String>) -> String {
    files
        .iter()
        .map(|(path, content)| {
            let longest = content
                .split(|c: char| c != '`')
                .map(str::len)
                .max()
                .unwrap_or(0);
            let fence = "`".repeat(longest.max(2) + 1);
            let nl = if content.ends_with('\n') || content.is_empty() { "" } else { "\n" };
            format!("{fence}{path}\n{content}{nl}{fence}\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── img ───────────────────────────────────────────────────────────────────────

fn is_url(source: &str) -> bool {
    let lower = source.get(..8).unwrap_or(source).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// MIME type from a file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/x-icon",
        Some("tif" | "tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

async fn img(ctx: &mut RenderContext, args: &[Value]) -> Result<String> {
    let source = match args.first().and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_owned(),
        _ => return Err(Error::ImgArgument),
    };
    let attachment = if is_url(&source) {
        Attachment::url(&source)
    } else {
        let path = ctx.options.resolve(&source);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Io { path: path.clone(), source: e })?;
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Attachment::base64(&source, mime_for(&path), data)
    };
    ctx.attachments.push(attachment);
    Ok(format!("[image: {source}]"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::AttachmentSource;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("src/nested/lib.rs"), "pub fn f() {}").unwrap();
        fs::write(root.join("README.md"), "# readme\n").unwrap();
        fs::write(root.join("Cargo.lock"), "lock").unwrap();
        fs::write(root.join("target/out.rs"), "junk").unwrap();
        fs::write(root.join("blob.bin"), [0xffu8, 0xfe, 0x00]).unwrap();
        dir
    }

    fn call(registry: &FunctionRegistry, name: &str) -> crate::template::registry::Function {
        registry.get(name).unwrap().clone()
    }

    #[test]
    fn load_dir_filters_and_sorts() {
        let dir = tree();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        let opts = RenderOptions {
            ignore: vec!["target".into()],
            ..RenderOptions::default()
        };
        let files = load_dir(dir.path(), &opts, &["*.lock".into()]).unwrap();
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["README.md", "src/main.rs", "src/nested/lib.rs"]);
    }

    #[test]
    fn load_dir_extension_filter() {
        let dir = tree();
        let opts = RenderOptions {
            extensions: vec!["rs".into()],
            ignore: vec!["target/**".into()],
            ..RenderOptions::default()
        };
        let files = load_dir(dir.path(), &opts, &[]).unwrap();
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["src/main.rs", "src/nested/lib.rs"]);
    }

    #[test]
    fn load_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dir(&dir.path().join("nope"), &RenderOptions::default(), &[]).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn bad_ignore_pattern() {
        let dir = tree();
        let err = load_dir(dir.path(), &RenderOptions::default(), &["a[".into()]).unwrap_err();
        assert!(err.to_string().starts_with("loadDir(): invalid ignore pattern 'a['"));
    }

    #[test]
    fn format_files_fences_each_file() {
        let mut files = BTreeMap::new();
        files.insert("a.rs".to_string(), "x\n".to_string());
        files.insert("b.md".to_string(), "has ``` fence".to_string());
        assert_eq!(
            format_files(&files),
            "```a.rs\nx\n```\n\n````b.md\nhas ``` fence\n````\n"
        );
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://x.y/a.png"));
        assert!(is_url("HTTP://x"));
        assert!(!is_url("images/a.png"));
        assert!(!is_url("ftp://x"));
    }

    #[tokio::test]
    async fn load_reads_relative_to_base_dir() {
        let dir = tree();
        let mut registry = FunctionRegistry::new();
        register_all(&mut registry);
        let mut ctx = RenderContext::new(RenderOptions {
            base_dir: dir.path().to_path_buf(),
            ..RenderOptions::default()
        });
        let load = call(&registry, "load");
        let text = load.call(&mut ctx, vec!["README.md".into()]).await.unwrap();
        assert_eq!(text, "# readme\n");

        let err = load.call(&mut ctx, vec![Value::Num(3.0)]).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid file path");
        let err = load.call(&mut ctx, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath));
        let err = load.call(&mut ctx, vec!["missing.txt".into()]).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn load_dir_function_applies_ignore_argument() {
        let dir = tree();
        let mut registry = FunctionRegistry::new();
        register_all(&mut registry);
        let mut ctx = RenderContext::new(RenderOptions {
            base_dir: dir.path().to_path_buf(),
            extensions: vec!["rs".into(), "md".into()],
            ..RenderOptions::default()
        });
        let out = call(&registry, "loadDir")
            .call(&mut ctx, vec![".".into(), "target, src/nested/**".into()])
            .await
            .unwrap();
        assert_eq!(out, "```README.md\n# readme\n```\n\n```src/main.rs\nfn main() {}\n```\n");
    }

    #[tokio::test]
    async fn img_records_attachments() {
        let dir = tree();
        fs::write(dir.path().join("logo.png"), b"PNG").unwrap();
        let mut registry = FunctionRegistry::new();
        register_all(&mut registry);
        let mut ctx = RenderContext::new(RenderOptions {
            base_dir: dir.path().to_path_buf(),
            ..RenderOptions::default()
        });
        let img = call(&registry, "img");

        let out = img.call(&mut ctx, vec!["logo.png".into()]).await.unwrap();
        assert_eq!(out, "[image: logo.png]");
        let out = img.call(&mut ctx, vec!["https://x.y/a.gif".into()]).await.unwrap();
        assert_eq!(out, "[image: https://x.y/a.gif]");

        assert_eq!(
            ctx.attachments[0].source,
            AttachmentSource::Base64 { mime: "image/png".into(), data: "UE5H".into() }
        );
        assert_eq!(ctx.attachments[1].source, AttachmentSource::Url("https://x.y/a.gif".into()));

        let err = img.call(&mut ctx, vec![Value::Num(1.0)]).await.unwrap_err();
        assert_eq!(err.to_string(), "img() expects a string parameter.");
    }
}
