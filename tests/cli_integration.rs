//! CLI integration tests for archive-bridge
//!
//! These tests run the binary end to end: legacy JSONL in, staged JSONL and
//! reports out, plus the standalone markup and linearize commands.

use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Get a command instance isolated from any user or local config
fn bridge_cmd(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("archive-bridge"));
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("ARCHIVE_BRIDGE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn link(source: &str, target: &str) -> String {
    format!(
        r#"{{"id":"{}","properties":[{{"name":"hasLinkTo","values":[{{"type":"resptr","value":"{}"}}]}}]}}"#,
        source, target
    )
}

fn write_lines(dir: &TempDir, name: &str, lines: &[String]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

fn read_ids(path: &std::path::Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            value["id"].as_str().unwrap().to_string()
        })
        .collect()
}

// =============================================================================
// Markup Tests
// =============================================================================

#[test]
fn test_markup_from_stdin() {
    let dir = TempDir::new().unwrap();

    bridge_cmd(&dir)
        .arg("markup")
        .write_stdin(r#"{"text":"Hello World","ranges":[{"tag":"italic","start":0,"end":5}]}"#)
        .assert()
        .success()
        .stdout("<em>Hello</em> World\n");
}

#[test]
fn test_markup_legacy_overlap_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("value.json");
    fs::write(
        &path,
        r#"{"utf8str":"0123456789ABCDE","textattr":"{\"bold\":[{\"start\":0,\"end\":10}],\"italic\":[{\"start\":5,\"end\":15}]}"}"#,
    )
    .unwrap();

    bridge_cmd(&dir)
        .arg("markup")
        .arg(&path)
        .assert()
        .success()
        .stdout("<strong>01234<em>56789</em></strong><em>ABCDE</em>\n");
}

#[test]
fn test_markup_json_reports_links() {
    let dir = TempDir::new().unwrap();

    let output = bridge_cmd(&dir)
        .args(["markup", "--format", "json"])
        .write_stdin(r#"{"text":"see 42","ranges":[{"tag":"_link","start":4,"end":6,"resid":"42"}]}"#)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let json: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        json["markup"],
        "see <a class=\"salsah-link\" href=\"IRI:42:IRI\">42</a>"
    );
    assert_eq!(json["links"], serde_json::json!(["42"]));
}

#[test]
fn test_markup_rejects_out_of_bounds_range() {
    let dir = TempDir::new().unwrap();

    bridge_cmd(&dir)
        .arg("markup")
        .write_stdin(r#"{"text":"abc","ranges":[{"tag":"bold","start":0,"end":9}]}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("beyond the text length"));
}

// =============================================================================
// Linearize Tests
// =============================================================================

#[test]
fn test_linearize_breaks_three_cycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(
        &path,
        r#"{"a":{"hasLinkTo":["b"]},"b":{"hasLinkTo":["c"]},"c":{"hasLinkTo":["a"]}}"#,
    )
    .unwrap();

    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "hasLinkTo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c -hasLinkTo-> a"))
        .stdout(predicate::str::contains("a -hasLinkTo-> c"))
        .stdout(predicate::str::contains("Creation order:"));
}

#[test]
fn test_linearize_acyclic_graph_needs_no_edits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(&path, r#"{"a":{"partOf":["b"]},"b":{}}"#).unwrap();

    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "partOf"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No 'partOf' references need to change."));
}

#[test]
fn test_linearize_pass_cap_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(
        &path,
        r#"{"a":{"hasLinkTo":["b"]},"b":{"hasLinkTo":["c"]},"c":{}}"#,
    )
    .unwrap();

    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "hasLinkTo", "--max-passes", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did not settle within 1 passes"));
}

#[test]
fn test_linearize_rejects_zero_pass_cap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(&path, r#"{"a":{"k":["b"]},"b":{}}"#).unwrap();

    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "k", "--max-passes", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_passes must be at least 1"));
}

#[test]
fn test_linearize_huge_depth_still_breaks_cycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(
        &path,
        r#"{"a":{"k":["b"]},"b":{"k":["c"]},"c":{"k":["a"]}}"#,
    )
    .unwrap();

    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "k", "--max-depth"])
        .arg(usize::MAX.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("c -k-> a"));
}

#[test]
fn test_linearize_long_cycle_warns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(
        &path,
        r#"{"a":{"k":["b"]},"b":{"k":["c"]},"c":{"k":["d"]},"d":{"k":["e"]},"e":{"k":["a"]}}"#,
    )
    .unwrap();

    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "k"])
        .assert()
        .success()
        .stderr(predicate::str::contains("remain circular"))
        .stdout(predicate::str::contains("records: a, b, c, d, e"))
        .stdout(predicate::str::contains("max_cycle: 4"));

    // One more hop of search depth is enough
    bridge_cmd(&dir)
        .arg("linearize")
        .arg(&path)
        .args(["--kind", "k", "--max-depth", "4"])
        .assert()
        .success()
        .stderr(predicate::str::contains("remain circular").not());
}

// =============================================================================
// Migrate Tests
// =============================================================================

#[test]
fn test_migrate_writes_records_in_creation_order() {
    let dir = TempDir::new().unwrap();
    let input = write_lines(&dir, "export.jsonl", &[link("a", "b"), link("b", "c"), link("c", "a")]);
    let output = dir.path().join("out").join("staged.jsonl");
    let report = dir.path().join("report.json");

    bridge_cmd(&dir)
        .arg("migrate")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Staged 3 records"))
        .stdout(predicate::str::contains("Reversed 1 'hasLinkTo' reference(s)"));

    assert_eq!(read_ids(&output), vec!["c", "b", "a"]);

    let report: Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["staged"], 3);
    assert!(report["generated_at"].is_string());
    assert_eq!(report["linearizations"][0]["kind"], "hasLinkTo");
    assert!(report["cycle_through"].is_null());
}

#[test]
fn test_migrate_reports_rejected_and_duplicate_records() {
    let dir = TempDir::new().unwrap();
    let bad = r#"{"id":"bad","properties":[{"name":"hasBody","values":[{"type":"richtext","utf8str":"abc","textattr":{"bold":[{"start":2,"end":1}]}}]}]}"#;
    let input = write_lines(
        &dir,
        "export.jsonl",
        &[link("a", "b"), bad.to_string(), link("a", "c"), link("b", "a")],
    );
    let output = dir.path().join("staged.jsonl");

    let assert = bridge_cmd(&dir)
        .args(["--format", "json", "migrate"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    let json: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["read"], 4);
    assert_eq!(json["staged"], 2);
    assert_eq!(json["rejected"][0]["id"], "bad");
    assert_eq!(json["duplicates"], serde_json::json!(["a"]));
    assert_eq!(json["reversals"], 1);
    assert_eq!(json["ordered"], true);
}

#[test]
fn test_migrate_reconstructs_rich_text() {
    let dir = TempDir::new().unwrap();
    let record = r#"{"id":"1","properties":[{"name":"hasBody","values":[{"type":"richtext","utf8str":"Hello World","textattr":"{\"italic\":[{\"start\":0,\"end\":5}]}"}]}]}"#;
    let input = write_lines(&dir, "export.jsonl", &[record.to_string()]);
    let output = dir.path().join("staged.jsonl");

    bridge_cmd(&dir)
        .arg("migrate")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let line = fs::read_to_string(&output).unwrap();
    let staged: Value = serde_json::from_str(line.trim()).unwrap();
    let value = &staged["properties"]["hasBody"][0];
    assert_eq!(value["type"], "text");
    assert_eq!(value["encoding"], "xml");
    assert_eq!(value["text"], "<em>Hello</em> World");
}

#[test]
fn test_migrate_missing_input_fails() {
    let dir = TempDir::new().unwrap();

    bridge_cmd(&dir)
        .args(["migrate", "nope.jsonl", "--output", "out.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open record file"));
}

#[test]
fn test_migrate_malformed_line_names_line_number() {
    let dir = TempDir::new().unwrap();
    let input = write_lines(&dir, "export.jsonl", &[link("a", "b"), "{oops".to_string()]);

    bridge_cmd(&dir)
        .arg("migrate")
        .arg(&input)
        .args(["--output", "out.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_local_config_limits_kinds() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("archive-bridge.toml"),
        "[linearize]\nkinds = [\"partOf\"]\n",
    )
    .unwrap();
    let input = write_lines(&dir, "export.jsonl", &[link("a", "b"), link("b", "a")]);

    bridge_cmd(&dir)
        .arg("migrate")
        .arg(&input)
        .args(["--output", "out.jsonl"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No creation order"));

    // The command line wins over the file
    bridge_cmd(&dir)
        .arg("migrate")
        .arg(&input)
        .args(["--output", "out.jsonl", "--kind", "hasLinkTo"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No creation order").not());
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[markup]\ntie_break = \"sideways\"\n").unwrap();

    bridge_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["markup"])
        .write_stdin(r#"{"text":"x"}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_verbose_flag() {
    let dir = TempDir::new().unwrap();

    bridge_cmd(&dir)
        .args(["--verbose", "markup"])
        .write_stdin(r#"{"text":"x"}"#)
        .assert()
        .success()
        .stderr(predicate::str::contains("[verbose]"));
}
