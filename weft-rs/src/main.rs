use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use weft::cli::{self, ConfigFile, Input};
use weft::config::Config;
use weft::template::{Engine, RenderContext, RenderOptions, RenderOutput};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("weft: {e}");
            eprintln!("Usage: weft [-f[<file>]] [-b<dir>] [-md] [<file>|-]");
            std::process::exit(1);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG wins; -d raises the default from warn to debug.
    let default = if args.debug { "weft=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let config_path = match args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path),
        ConfigFile::Search => cli::find_user_config(),
    };
    let mut options = match config_path {
        None => RenderOptions::default(),
        Some(path) => match Config::load_file(&path) {
            Ok((config, errors)) => {
                for e in errors {
                    eprintln!("weft: warning: {}: {e}", path.display());
                }
                config.options
            }
            Err(e) => {
                eprintln!("weft: warning: {}: {e}", path.display());
                RenderOptions::default()
            }
        },
    };
    if let Some(dir) = args.base_dir {
        options.base_dir = dir;
    }
    if args.matches {
        options.return_parser_matches = true;
    }

    // ── Input ─────────────────────────────────────────────────────────────────
    let source = match &args.input {
        Input::Stdin => {
            let mut s = String::new();
            tokio::io::stdin().read_to_string(&mut s).await.map(|_| s)
        }
        Input::File(path) => tokio::fs::read_to_string(path).await,
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            match &args.input {
                Input::File(path) => eprintln!("weft: {}: {e}", path.display()),
                Input::Stdin => eprintln!("weft: stdin: {e}"),
            }
            std::process::exit(1);
        }
    };

    // ── Render ────────────────────────────────────────────────────────────────
    let engine = Engine::new();
    let mut ctx = RenderContext::new(options);
    match engine.render(&source, &mut ctx).await {
        Ok(RenderOutput::Text(text)) => print!("{text}"),
        Ok(RenderOutput::Matches(matches)) => {
            for m in matches {
                println!("{}\t{}\t{}", m.offset, m.len, m.to_source());
            }
        }
        Err(e) => {
            eprintln!("weft: {e}");
            std::process::exit(1);
        }
    }
    for attachment in &ctx.attachments {
        eprintln!("weft: attachment: {attachment}");
    }
}
