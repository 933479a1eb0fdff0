//! Command-line argument parsing.
//!
//! Usage:
//!   weft [-f[<file>]] [-b<dir>] [-md] [<file>|-]

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Base directory override (`-b<dir>`).
    pub base_dir: Option<PathBuf>,
    /// Print slot matches instead of rendering (`-m`).
    pub matches: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Template to render.
    pub input: Input,
}

/// How to choose the user config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the standard locations (default); see [`find_user_config`].
    #[default]
    Search,
    /// `-f` with no file argument: skip user config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where the template comes from.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Input {
    /// No positional argument, or `-`.
    #[default]
    Stdin,
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'm' => args.matches = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else {
                        // -f alone → skip user config; a following word is
                        // the template, not a config file.
                        args.config = ConfigFile::Skip;
                    }
                }

                // -b<dir>
                'b' => {
                    let dir = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-b requires a directory argument".to_owned());
                    };
                    args.base_dir = Some(PathBuf::from(dir));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => {
            let p = positional.remove(0);
            if p != "-" {
                args.input = Input::File(PathBuf::from(p));
            }
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file.  Returns the first that exists of:
/// `$WEFTRC`, `<config dir>/weft/weftrc`, `~/.weftrc`, `./.weftrc`.
pub fn find_user_config() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(p) = std::env::var_os("WEFTRC") {
        candidates.push(PathBuf::from(p));
    }
    if let Some(dirs) = ProjectDirs::from("", "", "weft") {
        candidates.push(dirs.config_dir().join("weftrc"));
    }
    if let Some(base) = BaseDirs::new() {
        candidates.push(base.home_dir().join(".weftrc"));
    }
    candidates.push(PathBuf::from("./.weftrc"));
    candidates.into_iter().find(|p| p.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
