//! Common test utilities for kvstage integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's real staging file, config or remote.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated directories.
///
/// Each `TestEnv` creates three temporary directories:
/// - `data_dir`: Holds the staging file (via `KVSTAGE_DATA_DIR`)
/// - `config_dir`: Holds config.kdl (via `KVSTAGE_CONFIG_DIR`)
/// - `remote_dir`: Backs the local remote (via `KVSTAGE_REMOTE_DIR`)
///
/// The `kvstage()` method returns a `Command` that sets these per-invocation,
/// making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
    pub remote_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            remote_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the kvstage binary with isolated directories.
    pub fn kvstage(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kvstage"));
        cmd.env("KVSTAGE_DATA_DIR", self.data_dir.path());
        cmd.env("KVSTAGE_CONFIG_DIR", self.config_dir.path());
        cmd.env("KVSTAGE_REMOTE_DIR", self.remote_dir.path());
        cmd.env_remove("KVSTAGE_LOG");
        cmd
    }

    /// Path of the staging file.
    pub fn stage_file(&self) -> PathBuf {
        self.data_dir.path().join("stage.json")
    }

    /// Write config.kdl.
    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.config_dir.path().join("config.kdl"), contents).unwrap();
    }

    pub fn remote_path(&self) -> &Path {
        self.remote_dir.path()
    }

    /// Parsed JSON stdout of a successful command.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.kvstage().args(args).assert().success().get_output().clone();
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Stage and push a parameter value, creating a new remote version.
    pub fn seed_param(&self, name: &str, value: &str) {
        self.kvstage()
            .args(["param", "stage", "set", name, value])
            .assert()
            .success();
        self.kvstage().args(["param", "push", name]).assert().success();
    }

    /// Stage and push a secret value, creating a new remote version.
    pub fn seed_secret(&self, name: &str, value: &str) {
        self.kvstage()
            .args(["secret", "stage", "set", name, value])
            .assert()
            .success();
        self.kvstage().args(["secret", "push", name]).assert().success();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
