use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn harvest_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_harvest"))
}

/// A config whose only sources point at a closed local port.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("sources.json"),
        r#"[
  {
    "id": "bb",
    "name": "Bureau of Builds",
    "acronym": "BB",
    "website": "https://bb.example.gov",
    "codeUrl": "http://127.0.0.1:9/bb/code.json",
    "complianceDashboard": true,
    "requirements": {"agencyWidePolicy": 1, "openSourceRequirement": 0.5, "inventoryRequirement": 0}
  }
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"sources_file = "{root}/sources.json"

[db]
path = "{root}/data/harvest.sqlite"

[index]
alias = "repos"
retention_days = 7

[harvest]
timeout_secs = 5

[report]
output_dir = "{root}/status"

[logging]
level = "warn"

[[sources]]
acronym = "AA"
name = "Agency of Examples"
catalog_url = "http://127.0.0.1:9/aa/code.json"
compliance_tracked = true
"#,
        root = root.display()
    );

    let config_path = config_dir.join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let binary = harvest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, code) = run_harvest(&config_path, &["init"]);
    assert_eq!(code, Some(0), "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data/harvest.sqlite").exists());

    // Idempotent
    let (_, stderr, code) = run_harvest(&config_path, &["init"]);
    assert_eq!(code, Some(0), "second init failed: {}", stderr);
}

#[test]
fn test_sources_lists_file_and_inline_entries() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, code) = run_harvest(&config_path, &["sources"]);
    assert_eq!(code, Some(0), "sources failed: {}", stderr);
    assert!(stdout.contains("BB"));
    assert!(stdout.contains("AA"));
    assert!(stdout.contains("2 source(s)"));
}

#[test]
fn test_run_with_unknown_source_fails_before_work() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, code) = run_harvest(&config_path, &["run", "--source", "ZZ"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("ZZ"));
    assert!(!tmp.path().join("status/report.json").exists());
}

#[test]
fn test_run_with_no_reachable_source_is_fatal_but_reports() {
    let (tmp, config_path) = setup_test_env();
    let output_dir = tmp.path().join("out");

    let (stdout, _stderr, code) = run_harvest(
        &config_path,
        &["run", "--output-dir", output_dir.to_str().unwrap()],
    );
    assert_eq!(code, Some(1), "stdout: {}", stdout);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["statuses"]["AA"]["status"], "FETCH_ERROR");
    assert_eq!(report["statuses"]["BB"]["status"], "FETCH_ERROR");
    assert_eq!(report["statuses"]["BB"]["version"], "N/A");
    assert!(!output_dir.join("releases.json").exists());
}

#[test]
fn test_indices_and_retire_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_harvest(&config_path, &["init"]);

    let (stdout, stderr, code) = run_harvest(&config_path, &["indices"]);
    assert_eq!(code, Some(0), "indices failed: {}", stderr);
    assert!(stdout.contains("No indices found"));

    let (stdout, stderr, code) = run_harvest(&config_path, &["retire", "--days", "1"]);
    assert_eq!(code, Some(0), "retire failed: {}", stderr);
    assert!(stdout.contains("retired: 0"));
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("harvest.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"h.sqlite\"\n\n[index]\nalias = \"\"\n",
    )
    .unwrap();

    let (_, stderr, code) = run_harvest(&config_path, &["sources"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("index.alias"));
}
