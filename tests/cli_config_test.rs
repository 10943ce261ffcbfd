//! Integration tests for configuration resolution.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_config_show_defaults() {
    let env = TestEnv::new();
    let json = env.json(&["config", "show"]);

    assert_eq!(json["output_format"]["value"], "json");
    assert_eq!(json["output_format"]["source"], "default");
    assert_eq!(json["concurrency"]["value"], "10");
    assert_eq!(json["remote_dir"]["source"], "env:KVSTAGE_REMOTE_DIR");
}

#[test]
fn test_config_file_values() {
    let env = TestEnv::new();
    env.write_config("output-format \"human\"\nconcurrency 4\n");

    env.kvstage()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("output-format = human (config)"))
        .stdout(predicate::str::contains("concurrency = 4 (config)"));
}

#[test]
fn test_cli_flag_beats_config_file() {
    let env = TestEnv::new();
    env.write_config("concurrency 4\n");

    let json = env.json(&["--concurrency", "8", "config", "show"]);
    assert_eq!(json["concurrency"]["value"], "8");
    assert_eq!(json["concurrency"]["source"], "cli");
}

#[test]
fn test_human_output_from_config() {
    let env = TestEnv::new();
    env.write_config("output-format \"human\"\n");

    env.kvstage()
        .args(["status"])
        .assert()
        .success()
        .stdout("Nothing staged\n");
}

#[test]
fn test_invalid_config_is_fatal() {
    let env = TestEnv::new();
    env.write_config("concurrency 500\n");

    env.kvstage()
        .args(["status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency must be 1-64"));
}

#[test]
fn test_remote_dir_flag() {
    let env = TestEnv::new();
    let other = common::TempDir::new().unwrap();

    env.kvstage()
        .args(["param", "stage", "set", "/a", "1"])
        .assert()
        .success();
    env.kvstage()
        .args(["--remote-dir", other.path().to_str().unwrap(), "param", "push"])
        .assert()
        .success();

    assert!(other.path().join("params.json").exists());
    assert!(!env.remote_path().join("params.json").exists());
}
