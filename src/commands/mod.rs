//! Command implementations for the kvstage CLI.
//!
//! Every per-service command is written once against
//! [`ServiceStrategy`] and returns a result struct implementing [`Output`].
//! `main` picks the strategy, runs the command and prints the result.

use crate::config::{ResolvedConfig, ValueSource};
use crate::engine::{self, DiffReport, PushOptions, PushReport};
use crate::models::{DeleteOptions, Entry, HistoryEntry, Operation, Service};
use crate::spec::join_spec_args;
use crate::storage::StagingStore;
use crate::strategy::ServiceStrategy;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;

    /// Non-fatal conditions to report on stderr.
    fn warnings(&self) -> &[String] {
        &[]
    }
}

fn json_or_empty<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn spec_input(spec: &str, suffix: Option<&str>) -> Result<String> {
    let joined = match suffix {
        Some(suffix) => join_spec_args(&[spec, suffix])?,
        None => join_spec_args(&[spec])?,
    };
    Ok(joined)
}

// === Stage ===

#[derive(Debug, Serialize)]
pub struct StageResult {
    pub service: Service,
    pub name: String,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_options: Option<DeleteOptions>,
}

impl Output for StageResult {
    fn to_json(&self) -> String {
        json_or_empty(self)
    }

    fn to_human(&self) -> String {
        match (&self.operation, &self.delete_options) {
            (Operation::Delete, Some(options)) => format!(
                "Staged delete of {} {} ({})",
                self.service, self.name, options
            ),
            (Operation::Delete, None) => format!("Staged delete of {} {}", self.service, self.name),
            (Operation::Set, _) => format!("Staged {} {}", self.service, self.name),
        }
    }
}

/// Stage a new value. Replaces any entry already staged for `name`.
pub fn stage_set(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: &str,
    value: &str,
) -> Result<StageResult> {
    let name = strategy.parse_name(name)?;
    let service = strategy.service();
    store.stage(service, &name, Entry::set(value))?;
    Ok(StageResult {
        service,
        name,
        operation: Operation::Set,
        delete_options: None,
    })
}

/// Stage a deletion, optionally with a deletion policy.
pub fn stage_delete(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: &str,
    force: bool,
    recovery_window: Option<u32>,
) -> Result<StageResult> {
    let name = strategy.parse_name(name)?;
    let service = strategy.service();

    let options = DeleteOptions {
        force,
        recovery_window,
    };
    if !options.is_default() && !strategy.has_delete_options() {
        return Err(Error::InvalidInput(format!(
            "--force and --recovery-window are not supported for {}s",
            strategy.item_name()
        )));
    }
    options.validate().map_err(Error::InvalidInput)?;

    let entry = Entry::delete(Some(options));
    let delete_options = entry.delete_options.clone();
    store.stage(service, &name, entry)?;
    Ok(StageResult {
        service,
        name,
        operation: Operation::Delete,
        delete_options,
    })
}

// === Status ===

#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub name: String,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_options: Option<DeleteOptions>,
    pub staged_at: DateTime<Utc>,
}

impl StatusEntry {
    fn new(name: String, entry: Entry, verbose: bool) -> Self {
        Self {
            name,
            operation: entry.operation,
            value: if verbose { entry.value } else { None },
            delete_options: entry.delete_options,
            staged_at: entry.staged_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub staged: BTreeMap<Service, Vec<StatusEntry>>,
    pub count: usize,
}

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json_or_empty(self)
    }

    fn to_human(&self) -> String {
        if self.count == 0 {
            return "Nothing staged".to_string();
        }
        let mut out = String::new();
        for (service, entries) in &self.staged {
            let _ = writeln!(out, "{}:", service);
            for entry in entries {
                let _ = write!(out, "  {:<7} {}", entry.operation.to_string(), entry.name);
                if let Some(ref options) = entry.delete_options {
                    let _ = write!(out, " ({})", options);
                }
                if let Some(ref value) = entry.value {
                    let _ = write!(out, " = {}", value);
                }
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }
}

/// List staged entries of one service (or all when `service` is `None`).
///
/// With `name` set only that entry is listed, and it must be staged.
pub fn status(
    store: &StagingStore,
    service: Option<Service>,
    name: Option<&str>,
    verbose: bool,
) -> Result<StatusResult> {
    let mut staged = BTreeMap::new();

    match (service, name) {
        (Some(service), Some(name)) => {
            let entry = store.get(service, name)?;
            staged.insert(service, vec![StatusEntry::new(name.to_string(), entry, verbose)]);
        }
        _ => {
            for (service, entries) in store.list(service)? {
                let entries = entries
                    .into_iter()
                    .map(|(name, entry)| StatusEntry::new(name, entry, verbose))
                    .collect();
                staged.insert(service, entries);
            }
        }
    }

    let count = staged.values().map(Vec::len).sum();
    Ok(StatusResult { staged, count })
}

/// Status for one service, validating the optional name first.
pub fn service_status(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: Option<&str>,
    verbose: bool,
) -> Result<StatusResult> {
    let name = name.map(|n| strategy.parse_name(n)).transpose()?;
    status(store, Some(strategy.service()), name.as_deref(), verbose)
}

// === Diff ===

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DiffOutput(pub DiffReport);

impl Output for DiffOutput {
    fn to_json(&self) -> String {
        json_or_empty(&self.0)
    }

    fn to_human(&self) -> String {
        if self.0.diffs.is_empty() {
            return "No differences".to_string();
        }
        let mut out = String::new();
        for item in &self.0.diffs {
            out.push_str(&item.diff);
        }
        out.trim_end().to_string()
    }

    fn warnings(&self) -> &[String] {
        &self.0.warnings
    }
}

/// Diff staged entries against the remote, unstaging converged ones.
pub async fn diff(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: Option<&str>,
    format_json: bool,
) -> Result<DiffOutput> {
    let name = name.map(|n| strategy.parse_name(n)).transpose()?;
    let report = engine::diff_staged(store, strategy, name.as_deref(), format_json).await?;
    Ok(DiffOutput(report))
}

// === Push ===

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct PushOutput(pub PushReport);

impl PushOutput {
    /// The aggregate failure to exit with, if any entry failed.
    pub fn failure(&self) -> Option<Error> {
        self.0.has_failures().then(|| Error::PushFailed {
            succeeded: self.0.succeeded.len(),
            failed: self.0.failed.len(),
        })
    }
}

impl Output for PushOutput {
    fn to_json(&self) -> String {
        json_or_empty(&self.0)
    }

    fn to_human(&self) -> String {
        let report = &self.0;
        if report.total() == 0 {
            return "Nothing to push".to_string();
        }
        let mut out = String::new();
        for name in &report.succeeded {
            let _ = writeln!(out, "pushed {} {}", report.service, name);
        }
        for (name, message) in &report.failed {
            let _ = writeln!(out, "failed {} {}: {}", report.service, name, message);
        }
        let _ = write!(
            out,
            "pushed {}, failed {}",
            report.succeeded.len(),
            report.failed.len()
        );
        out
    }

    fn warnings(&self) -> &[String] {
        &self.0.warnings
    }
}

/// Push staged entries to the remote.
pub async fn push(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: Option<&str>,
    options: &PushOptions,
) -> Result<PushOutput> {
    let name = name.map(|n| strategy.parse_name(n)).transpose()?;
    let report = engine::push_staged(store, strategy, name.as_deref(), options).await?;
    Ok(PushOutput(report))
}

// === Reset ===

#[derive(Debug, Serialize)]
pub struct Restored {
    pub name: String,
    pub version_label: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    /// Number of entries removed from the staging area
    pub unstaged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored: Option<Restored>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Output for ResetResult {
    fn to_json(&self) -> String {
        json_or_empty(self)
    }

    fn to_human(&self) -> String {
        if let Some(ref restored) = self.restored {
            let service = self.service.map(|s| s.as_str()).unwrap_or("");
            return format!(
                "Staged {} {} from {}",
                service, restored.name, restored.version_label
            );
        }
        match self.unstaged {
            0 => "Nothing to reset".to_string(),
            1 => "Unstaged 1 entry".to_string(),
            n => format!("Unstaged {} entries", n),
        }
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Unstage entries of one service, or restore a past version.
///
/// - `all`: unstage every entry of the service
/// - bare name: unstage it; a name that is not staged is only a warning
/// - name with a version specifier: fetch that version and stage it as a set
pub async fn reset(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    spec: Option<&str>,
    suffix: Option<&str>,
    all: bool,
) -> Result<ResetResult> {
    let service = strategy.service();
    let mut result = ResetResult {
        service: Some(service),
        unstaged: 0,
        restored: None,
        warnings: Vec::new(),
    };

    if all {
        result.unstaged = store.unstage_all(Some(service))?;
        return Ok(result);
    }

    let spec = spec.ok_or_else(|| Error::InvalidInput("specify a name or --all".to_string()))?;
    let input = spec_input(spec, suffix)?;
    let (name, has_version) = strategy.parse_spec(&input)?;

    if has_version {
        let fetched = strategy.fetch_version(&input).await?;
        store.stage(service, &name, Entry::set(fetched.value))?;
        tracing::debug!(%service, name = %name, version = %fetched.version_label, "restored");
        result.restored = Some(Restored {
            name,
            version_label: fetched.version_label,
        });
        return Ok(result);
    }

    match store.unstage(Some(service), &name) {
        Ok(()) => result.unstaged = 1,
        Err(e) if e.is_not_staged() => {
            tracing::warn!(%service, name = %name, "reset of an entry that is not staged");
            result.warnings.push(e.to_string());
        }
        Err(e) => return Err(e),
    }
    Ok(result)
}

/// Unstage every entry of every service.
pub fn reset_all(store: &StagingStore) -> Result<ResetResult> {
    Ok(ResetResult {
        service: None,
        unstaged: store.unstage_all(None)?,
        restored: None,
        warnings: Vec::new(),
    })
}

// === Show / Log ===

#[derive(Debug, Serialize)]
pub struct ShowResult {
    pub name: String,
    pub version_label: String,
    pub value: String,
    #[serde(skip)]
    pub raw: bool,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Output for ShowResult {
    fn to_json(&self) -> String {
        if self.raw {
            return self.value.clone();
        }
        json_or_empty(self)
    }

    fn to_human(&self) -> String {
        if self.raw {
            return self.value.clone();
        }
        format!("{}{}\n\n{}", self.name, self.version_label, self.value)
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Fetch the version a spec points at.
pub async fn show(
    strategy: &dyn ServiceStrategy,
    spec: &str,
    suffix: Option<&str>,
    raw: bool,
    format_json: bool,
) -> Result<ShowResult> {
    let input = spec_input(spec, suffix)?;
    let (name, _) = strategy.parse_spec(&input)?;
    let fetched = strategy.fetch_version(&input).await?;

    let mut warnings = Vec::new();
    let mut value = fetched.value;
    if format_json {
        match serde_json::from_str::<serde_json::Value>(&value) {
            Ok(parsed) => value = serde_json::to_string_pretty(&parsed)?,
            Err(_) => warnings.push(format!(
                "--json has no effect on {}: value is not valid JSON",
                name
            )),
        }
    }

    Ok(ShowResult {
        name,
        version_label: fetched.version_label,
        value,
        raw,
        warnings,
    })
}

#[derive(Debug, Serialize)]
pub struct LogResult {
    pub name: String,
    pub versions: Vec<HistoryEntry>,
}

impl Output for LogResult {
    fn to_json(&self) -> String {
        json_or_empty(self)
    }

    fn to_human(&self) -> String {
        let mut out = String::new();
        for version in &self.versions {
            let _ = write!(out, "version {}", version.version_label);
            if !version.labels.is_empty() {
                let _ = write!(out, " ({})", version.labels.join(", "));
            }
            out.push('\n');
            if let Some(modified_at) = version.modified_at {
                let _ = writeln!(out, "Date: {}", modified_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            out.push('\n');
            for line in version.value.lines() {
                let _ = writeln!(out, "    {}", line);
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// Version history of an item, newest first, optionally limited.
pub async fn log(
    strategy: &dyn ServiceStrategy,
    name: &str,
    max_count: Option<usize>,
) -> Result<LogResult> {
    let name = strategy.parse_name(name)?;
    let mut versions = strategy.history(&name).await?;
    if let Some(max) = max_count {
        versions.truncate(max);
    }
    Ok(LogResult { name, versions })
}

// === Config ===

#[derive(Debug, Serialize)]
pub struct ConfigValue {
    pub value: String,
    pub source: String,
}

impl ConfigValue {
    fn new(value: impl ToString, source: &ValueSource) -> Self {
        Self {
            value: value.to_string(),
            source: source.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub config_file: PathBuf,
    pub output_format: ConfigValue,
    pub concurrency: ConfigValue,
    pub remote_dir: ConfigValue,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json_or_empty(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("config file: {}\n", self.config_file.display());
        for (key, value) in [
            ("output-format", &self.output_format),
            ("concurrency", &self.concurrency),
            ("remote-dir", &self.remote_dir),
        ] {
            let _ = writeln!(out, "{} = {} ({})", key, value.value, value.source);
        }
        out.trim_end().to_string()
    }
}

/// Resolved configuration with the source of every value.
pub fn config_show(config_file: PathBuf, resolved: &ResolvedConfig) -> ConfigShowResult {
    ConfigShowResult {
        config_file,
        output_format: ConfigValue::new(resolved.output_format(), &resolved.output_format.source),
        concurrency: ConfigValue::new(resolved.concurrency(), &resolved.concurrency.source),
        remote_dir: ConfigValue::new(
            resolved.remote_dir().display(),
            &resolved.remote_dir.source,
        ),
    }
}
