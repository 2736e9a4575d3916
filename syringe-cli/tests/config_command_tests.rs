//! Integration tests for `syringe config`.
//!
//! Exercises config loading directly and through the built binary with real TOML files.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use syringe_core::config::{SyringeConfig, VcsKind};
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"
log_format = "pretty"

[vcs]
kind = "bitbucket_cloud"
token = "bb-app-password"
owner = "acme"
rate_limit = 10

[registry]
cli_path = "/usr/local/bin/phylum"
group = "security"

[pipeline]
discovery_concurrency = 25
creation_concurrency = 4
analysis_concurrency = 8
task_timeout_secs = 300
jit_create = false
"#;

/// Run the `syringe` binary with `SYRINGE_*` overrides cleared.
fn syringe(config_path: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_syringe"));
    for (key, _) in std::env::vars() {
        if key.starts_with("SYRINGE_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("should spawn syringe binary")
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("syringe.toml");
    fs::write(&path, content).expect("should write config");
    path
}

#[tokio::test]
async fn test_load_full_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, FULL_CONFIG);

    let config = SyringeConfig::from_file(&config_path)
        .await
        .expect("full config should parse");
    config.validate().expect("full config should be valid");

    assert_eq!(config.vcs.kind, VcsKind::BitbucketCloud);
    assert_eq!(config.vcs.owner, "acme");
    assert_eq!(config.registry.group(), Some("security"));
    assert_eq!(config.pipeline.analysis_concurrency, 8);
    assert!(!config.pipeline.jit_create);
}

#[tokio::test]
async fn test_load_malformed_toml_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "[general\nlog_level = \"info\"\n");

    let result = SyringeConfig::from_file(&config_path).await;
    assert!(result.is_err(), "malformed TOML should fail to load");
}

#[tokio::test]
async fn test_load_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "");

    let config = SyringeConfig::from_file(&config_path)
        .await
        .expect("empty config should use defaults");
    config.validate().expect("defaults should be valid");
    assert_eq!(config.vcs.kind, VcsKind::Gitlab);
    assert!(config.pipeline.jit_create);
}

#[test]
fn test_cli_config_validate_valid() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, FULL_CONFIG);

    let output = syringe(&config_path, &["config", "validate", "--output", "json"]);

    assert!(output.status.success(), "valid config should exit 0");
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["valid"].as_bool(), Some(true));
}

#[test]
fn test_cli_config_validate_invalid_exits_with_config_code() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(
        &temp_dir,
        "[pipeline]\nanalysis_concurrency = 0\n",
    );

    let output = syringe(&config_path, &["config", "validate", "--output", "json"]);

    assert_eq!(output.status.code(), Some(2));
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["valid"].as_bool(), Some(false));
    assert!(
        parsed["errors"][0]
            .as_str()
            .is_some_and(|e| e.contains("pipeline.analysis_concurrency"))
    );
}

#[test]
fn test_cli_config_validate_missing_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("nope.toml");

    let output = syringe(&config_path, &["config", "validate"]);

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("INVALID"));
}

#[test]
fn test_cli_config_show_redacts_token() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, FULL_CONFIG);

    let output = syringe(&config_path, &["config", "show", "--section", "vcs"]);

    assert!(output.status.success(), "show should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("acme"));
    assert!(!stdout.contains("bb-app-password"), "token must be redacted");
}

#[test]
fn test_cli_config_show_unknown_section() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, FULL_CONFIG);

    let output = syringe(&config_path, &["config", "show", "--section", "database"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown section"));
}

#[test]
fn test_cli_log_level_override_is_validated() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, FULL_CONFIG);

    let output = syringe(
        &config_path,
        &["--log-level", "loud", "config", "validate", "--output", "json"],
    );

    assert_eq!(output.status.code(), Some(2));
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["valid"].as_bool(), Some(false));
}
