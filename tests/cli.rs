//! End-to-end runs of the `fln` binary.

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

fn fln() -> Command {
    Command::cargo_bin("fln").expect("fln binary")
}

const REPLY: &str = "Sure, here you go:

```rust:src/lib.rs
pub fn greet() -> &'static str {
    \"hello\"
}
```

Run it with:

```bash
cargo test
```
";

#[test]
fn extract_lists_blocks_as_json() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let msg = tmp.child("reply.md");
    msg.write_str(REPLY).unwrap();

    let out = fln()
        .args(["extract", "--format", "json", "--chunk", "5"])
        .arg(msg.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let v: Value = serde_json::from_slice(&out).expect("valid json");
    assert_eq!(v["message_id"], "reply");
    let blocks = v["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["explicit_path"], "src/lib.rs");
    assert_eq!(blocks[1]["block_type"], "Command");
}

#[test]
fn apply_creates_then_modifies_with_backup() {
    let ws = assert_fs::TempDir::new().unwrap();
    let msg = ws.child("reply.md");
    msg.write_str(REPLY).unwrap();

    fln()
        .args(["--quiet", "apply", "--yes", "--root"])
        .arg(ws.path())
        .arg(msg.path())
        .assert()
        .success();
    ws.child("src/lib.rs").assert(predicate::str::contains("hello"));

    let second = ws.child("second.md");
    second
        .write_str("```rust:src/lib.rs\npub fn greet() -> &'static str {\n    \"hi\"\n}\n```\n")
        .unwrap();
    fln()
        .args(["--quiet", "apply", "--yes", "--root"])
        .arg(ws.path())
        .arg(second.path())
        .assert()
        .success();
    ws.child("src/lib.rs").assert(predicate::str::contains("\"hi\""));

    let out = fln()
        .args(["backup", "list", "--json", "--root"])
        .arg(ws.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: Value = serde_json::from_slice(&out).expect("valid json");
    let list = v.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["original_path"], "src/lib.rs");

    fln()
        .args(["--quiet", "backup", "restore", "latest", "--root"])
        .arg(ws.path())
        .assert()
        .success();
    ws.child("src/lib.rs").assert(predicate::str::contains("hello"));
}

#[test]
fn apply_refuses_without_yes_on_piped_stdin() {
    let ws = assert_fs::TempDir::new().unwrap();
    let msg = ws.child("reply.md");
    msg.write_str(REPLY).unwrap();

    assert_cmd::Command::from_std(fln())
        .args(["apply", "--root"])
        .arg(ws.path())
        .arg(msg.path())
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    ws.child("src/lib.rs").assert(predicate::path::missing());
}

#[test]
fn dry_run_apply_touches_nothing() {
    let ws = assert_fs::TempDir::new().unwrap();
    let msg = ws.child("reply.md");
    msg.write_str(REPLY).unwrap();

    fln()
        .args(["--dry-run", "apply", "--root"])
        .arg(ws.path())
        .arg(msg.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("would be applied"));
    ws.child("src/lib.rs").assert(predicate::path::missing());
}

#[test]
fn plan_prints_operations() {
    let ws = assert_fs::TempDir::new().unwrap();
    let msg = ws.child("reply.md");
    msg.write_str(REPLY).unwrap();

    fln()
        .args(["--no-color", "plan", "--root"])
        .arg(ws.path())
        .arg(msg.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("src/lib.rs").and(predicate::str::contains("Create")));
}

#[test]
fn init_refuses_to_overwrite() {
    let ws = assert_fs::TempDir::new().unwrap();

    fln().arg("init").arg(ws.path()).assert().success();
    ws.child("fenceline.toml")
        .assert(predicate::str::contains("undo_window = 1800"));

    fln()
        .arg("init")
        .arg(ws.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn completions_to_stdout() {
    fln()
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fln"));
}
