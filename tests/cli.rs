use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn agent_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_maritime-agent"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/agent.sqlite"

[knowledge]
dir = "{root}/knowledge"

[llm]
stub_mode = true

[tools]
url = "http://127.0.0.1:9"
list_timeout_secs = 1
call_timeout_secs = 1
"#,
        root = root.display()
    );
    let config_path = config_dir.join("agent.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(agent_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run maritime-agent")
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let output = run(&config, &["init"]);
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(tmp.path().join("data/agent.sqlite").exists());

    // Idempotent
    let output = run(&config, &["init"]);
    assert!(output.status.success());
}

#[test]
fn test_analyses_empty() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["analyses", "--limit", "5"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No analyses yet."));
}

#[test]
fn test_ingest_missing_directory_writes_nothing() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["ingest", "--if-empty"]);
    assert!(
        output.status.success(),
        "ingest failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Ingested 0 chunks"));
}

#[test]
fn test_analyze_unknown_event_fails() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["analyze", "12345"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Event 12345 not found"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let output = run(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"));
}
