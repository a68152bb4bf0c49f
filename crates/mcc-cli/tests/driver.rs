//! Driver-surface tests: flags, exit codes, output files, diagnostics.

use std::path::Path;
use std::process::Command;

fn run_mcc(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_mcc"))
        .args(args)
        .output()
        .expect("run mcc")
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write input");
    path.to_str().unwrap().to_string()
}

#[test]
fn no_input_file_fails() {
    let out = run_mcc(&[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("no input file"));
}

#[test]
fn missing_file_fails_with_io_error() {
    let out = run_mcc(&["/nonexistent/definitely-missing.c"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("definitely-missing.c"), "stderr: {}", stderr);
}

#[test]
fn not_implemented_flags_warn_and_fail() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "a.c", "int main() { return 0; }\n");
    for flag in ["-dc", "-dltl", "-dmach"] {
        let out = run_mcc(&[flag, &input]);
        assert_eq!(out.status.code(), Some(1), "flag {}", flag);
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(
            stderr.contains("warning") && stderr.contains("not implemented"),
            "flag {}: stderr: {}",
            flag,
            stderr
        );
    }
}

#[test]
fn single_and_double_dash_flags_agree() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "a.c", "int main() { return 0; }\n");
    let single = run_mcc(&["-dparse", &input]);
    let double = run_mcc(&["--dparse", &input]);
    assert!(single.status.success());
    assert!(double.status.success());
    assert_eq!(single.stdout, double.stdout);
}

#[test]
fn parse_errors_go_to_stderr_and_suppress_later_passes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "bad.c", "int f() { int x = ; return 0; }\n");
    let out = run_mcc(&["-dclight", &input]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    // <file>:<line>:<col>: <kind>: <message>
    assert!(stderr.contains("bad.c:1:"), "stderr: {}", stderr);
    assert!(stderr.contains("error"), "stderr: {}", stderr);
    assert!(
        !dir.path().join("bad.light.c").exists(),
        "no dump after parse errors"
    );
}

#[test]
fn successful_run_is_quiet_without_flags() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "a.c", "int main() { return 0; }\n");
    let out = run_mcc(&[&input]);
    assert_eq!(out.status.code(), Some(0));
    assert!(out.stdout.is_empty());
}

#[test]
fn stage_dumps_create_expected_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "stage.c",
        "int add(int a, int b) { return a + b; }\n",
    );
    let out = run_mcc(&[
        "-dparse",
        "-dclight",
        "-dcsharpminor",
        "-dcminor",
        "-drtl",
        &input,
    ]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    for suffix in ["parsed.c", "light.c", "csharpminor", "cminor", "rtl.0"] {
        let path = dir.path().join(format!("stage.{}", suffix));
        assert!(path.exists(), "missing {}", path.display());
    }
}

#[test]
fn line_directives_shift_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "pp.c",
        "# 40 \"original.c\"\nint f() { int x = ; return 0; }\n",
    );
    let out = run_mcc(&[&input]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("original.c:40:"), "stderr: {}", stderr);
}
