use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn liveindex_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("liveindex");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("documents");
    fs::create_dir_all(docs_dir.join("policies")).unwrap();
    fs::create_dir_all(docs_dir.join("hr")).unwrap();
    fs::write(
        docs_dir.join("policies/refund-policy.md"),
        "# Refund Policy\n\nRefunds are accepted within 30 days of purchase.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("hr/salaries.md"),
        "# Salary Bands\n\nSalary bands for every engineering level.",
    )
    .unwrap();
    fs::write(docs_dir.join("logo.png"), [0u8, 1, 2, 3]).unwrap();

    let config_content = format!(
        r#"[watch]
root = "{}/documents"
include_globs = ["**/*.md"]

[sync]
debounce_ms = 20

[chunking]
target_size = 500
overlap = 50

[permissions]
default_level = 1

[[permissions.rules]]
pattern = "hr/**"
level = 3
"#,
        root.display()
    );

    let config_path = config_dir.join("liveindex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_liveindex(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = liveindex_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run liveindex binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_liveindex(&config, &["ingest"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("documents found:  2"), "{}", stdout);
    assert!(stdout.contains("documents indexed: 2"), "{}", stdout);
    assert!(stdout.contains("failed:           0"), "{}", stdout);
}

#[test]
fn test_ask_json() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) =
        run_liveindex(&config, &["ask", "how long do refunds take", "--json"]);
    assert!(success, "ask failed: {}", stderr);

    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["status"]["kind"], "answered");
    let sources = result["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert_eq!(sources[0]["document_id"], "policies/refund-policy.md");
    assert!(sources
        .iter()
        .all(|s| s["document_id"] != "hr/salaries.md"));
}

#[test]
fn test_ask_as_admin_sees_restricted_documents() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_liveindex(
        &config,
        &["ask", "salary bands", "--role", "admin", "--top-k", "5"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("Sources:"), "{}", stdout);
    assert!(stdout.contains("hr/salaries.md"), "{}", stdout);
}

#[test]
fn test_ask_unknown_role_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_liveindex(&config, &["ask", "refunds", "--role", "intern"]);
    assert!(!success);
    assert!(stderr.contains("intern"), "{}", stderr);
}

#[test]
fn test_missing_watch_root_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("liveindex.toml");
    fs::write(
        &config_path,
        format!("[watch]\nroot = \"{}/nope\"\n", tmp.path().display()),
    )
    .unwrap();
    let (_, _, success) = run_liveindex(&config_path, &["ingest"]);
    assert!(!success);
}
