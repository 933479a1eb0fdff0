/// CLI tests: run templates through the `weft` binary and check stdout,
/// stderr and exit status.
///
/// Every run passes `-f` so no user config is picked up, except the tests
/// that exercise config loading explicitly.

use std::io::Write;
use std::process::{Command, Output, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Path to the `weft` binary built by this Cargo workspace.
fn binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_weft"))
}

/// Run the binary with `args`, piping `stdin` to it.
fn run(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(binary())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("WEFTRC")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn weft binary");
    child
        .stdin
        .as_mut()
        .expect("stdin not open")
        .write_all(stdin.as_bytes())
        .expect("write to stdin");
    child.wait_with_output().expect("wait failed")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── Cases ─────────────────────────────────────────────────────────────────────

#[test]
fn renders_stdin() {
    let out = run(&["-f"], "{who = \"world\"}\nHello, {{who}}!\n");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "Hello, world!\n");
}

#[test]
fn dash_reads_stdin() {
    let out = run(&["-f", "-"], "{{2 * 21}}");
    assert_eq!(stdout(&out), "42");
}

#[test]
fn renders_file_argument() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.md");
    std::fs::write(&path, "{a(x)}<{{x}}>{/a}{{a(\"file\")}}").unwrap();
    let out = run(&["-f", path.to_str().unwrap()], "");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "<file>");
}

#[test]
fn missing_file_fails() {
    let out = run(&["-f", "/nonexistent/template.md"], "");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).starts_with("weft: /nonexistent/template.md:"));
}

#[test]
fn render_error_exits_nonzero() {
    let out = run(&["-f"], "{a=\"1\"}{a=\"2\"}");
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stderr(&out).trim_end(), "weft: Variable name conflict: `a`");
}

#[test]
fn unknown_option_prints_usage() {
    let out = run(&["-z"], "");
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("unknown option: -z"));
    assert!(err.contains("Usage: weft"));
}

#[test]
fn matches_flag_lists_slots() {
    let out = run(&["-f", "-m"], "x {{a}} {{b(\"q\", n=2)}}");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "2\t5\t{{a}}\n8\t15\t{{b(\"q\", n=2)}}\n");
}

#[test]
fn base_dir_flag_and_attachments() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("p.png"), b"x").unwrap();
    let out = run(&["-f", "-b", dir.path().to_str().unwrap()], "{{img(\"p.png\")}}");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "[image: p.png]");
    assert!(stderr(&out).contains("weft: attachment: image/png p.png"));
}

#[test]
fn explicit_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/a.rs"), "A").unwrap();
    std::fs::write(dir.path().join("src/b.md"), "B").unwrap();
    let rc = dir.path().join("test.weftrc");
    std::fs::write(&rc, "; test config\nextensions = rs\nbogus = 1\n").unwrap();

    let flag = format!("-f{}", rc.display());
    let out = run(
        &[&flag, "-b", dir.path().to_str().unwrap()],
        "{{loadDir(\"src\")}}",
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "```a.rs\nA\n```\n");
    assert!(stderr(&out).contains("line 3: unknown setting: bogus"));
}
