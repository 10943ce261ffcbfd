//! Integration tests for `diff`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_diff_shows_unified_diff() {
    let env = TestEnv::new();
    env.seed_param("/app/url", "http://old");
    env.json(&["param", "stage", "set", "/app/url", "http://new"]);

    env.kvstage()
        .args(["-H", "param", "diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- /app/url#1"))
        .stdout(predicate::str::contains("+++ /app/url (staged)"))
        .stdout(predicate::str::contains("-http://old"))
        .stdout(predicate::str::contains("+http://new"));

    // Still staged after a real diff
    env.kvstage().args(["param", "status", "/app/url"]).assert().success();
}

#[test]
fn test_diff_auto_unstages_identical_value() {
    let env = TestEnv::new();
    env.seed_param("/app/url", "same");
    env.json(&["param", "stage", "set", "/app/url", "same"]);

    env.kvstage()
        .args(["param", "diff"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: unstaged /app/url: identical to remote"));

    env.kvstage()
        .args(["param", "status", "/app/url"])
        .assert()
        .failure();
    assert!(!env.stage_file().exists());
}

#[test]
fn test_diff_of_new_secret() {
    let env = TestEnv::new();
    env.json(&["secret", "stage", "set", "api-key", "s3cret"]);

    env.kvstage()
        .args(["-H", "secret", "diff", "api-key"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- api-key (not found)"))
        .stdout(predicate::str::contains("+s3cret"));
}

#[test]
fn test_diff_of_staged_delete() {
    let env = TestEnv::new();
    env.seed_secret("api-key", "s3cret");
    env.json(&["secret", "stage", "delete", "api-key"]);

    env.kvstage()
        .args(["-H", "secret", "diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+++ api-key (staged for deletion)"))
        .stdout(predicate::str::contains("-s3cret"));
}

#[test]
fn test_diff_json_reformats_both_sides() {
    let env = TestEnv::new();
    env.seed_param("/cfg", r#"{"a":1,"b":2}"#);
    env.json(&["param", "stage", "set", "/cfg", r#"{"b": 2, "a": 1}"#]);

    // Same document once normalized: converges
    env.kvstage()
        .args(["param", "diff", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("identical to remote"));
}

#[test]
fn test_diff_json_warns_when_a_side_is_not_json() {
    let env = TestEnv::new();
    env.seed_param("/cfg", r#"{"a":1}"#);
    env.json(&["param", "stage", "set", "/cfg", "not json"]);

    env.kvstage()
        .args(["param", "diff", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("--json has no effect on /cfg"));
}

#[test]
fn test_diff_never_staged_name_fails() {
    let env = TestEnv::new();
    env.kvstage()
        .args(["param", "diff", "/nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("param /nope is not staged"));
}
