//! Convergence-aware diff of staged entries against the remote.
//!
//! For every selected entry the remote's current value is fetched and
//! compared with the staged value (empty for deletes). An entry that already
//! matches the remote is unstaged as a side effect, with a warning: a set whose
//! value equals the existing item's, or a delete of an item that is gone.
//!
//! Remote fetches happen before any entry is unstaged: if one fetch fails the
//! whole diff fails and the store is left untouched. A remote "not found" is
//! not a failure; the remote side is then empty.

use super::select_entries;
use super::unified::unified_diff;
use crate::models::{Operation, Service};
use crate::storage::StagingStore;
use crate::strategy::ServiceStrategy;
use crate::Result;
use serde::Serialize;

/// Label shown for the remote side when the item does not exist.
pub const NOT_FOUND_LABEL: &str = "(not found)";

/// Diff of one staged entry.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDiff {
    pub name: String,
    pub operation: Operation,
    /// Version tag of the remote side, e.g. `#3`
    pub remote_version: Option<String>,
    /// Unified diff text
    pub diff: String,
}

/// Result of diffing one service's staged entries.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub service: Service,
    pub diffs: Vec<ItemDiff>,
    /// Entries that matched the remote and were unstaged
    pub unstaged: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Diff staged entries of `strategy`'s service against the remote.
///
/// With `name` set only that entry is diffed, and it must be staged. With
/// `format_json` both sides are pretty-printed when they are valid JSON.
pub async fn diff_staged(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: Option<&str>,
    format_json: bool,
) -> Result<DiffReport> {
    let service = strategy.service();
    let entries = select_entries(store, service, name)?;

    let mut fetched = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let remote = match strategy.fetch_current(&name).await {
            Ok(result) => Some(result),
            Err(e) if e.is_remote_not_found() => None,
            Err(e) => return Err(e),
        };
        fetched.push((name, entry, remote));
    }

    let mut report = DiffReport {
        service,
        diffs: Vec::new(),
        unstaged: Vec::new(),
        warnings: Vec::new(),
    };

    for (name, entry, remote) in fetched {
        let mut remote_value = remote.as_ref().map(|r| r.value.clone()).unwrap_or_default();
        let mut local_value = entry.local_value().to_string();

        if format_json {
            match format_pair(&remote_value, &local_value) {
                Ok((remote_pretty, local_pretty)) => {
                    remote_value = remote_pretty;
                    local_value = local_pretty;
                }
                Err(reason) => {
                    report
                        .warnings
                        .push(format!("--json has no effect on {}: {}", name, reason));
                }
            }
        }

        // A set only converges on an existing item, a delete only on a missing one
        let converged = match entry.operation {
            Operation::Set => remote.is_some() && remote_value == local_value,
            Operation::Delete => remote.is_none(),
        };

        if converged {
            match store.unstage(Some(service), &name) {
                Ok(()) => report
                    .warnings
                    .push(format!("unstaged {}: identical to remote", name)),
                Err(e) => report.warnings.push(format!(
                    "{} is identical to remote but could not be unstaged: {}",
                    name, e
                )),
            }
            tracing::warn!(%service, name = %name, "staged value matches remote");
            report.unstaged.push(name);
            continue;
        }

        let remote_header = match &remote {
            Some(r) => format!("{}{}", name, r.version_label),
            None => format!("{} {}", name, NOT_FOUND_LABEL),
        };
        let local_header = match entry.operation {
            Operation::Set => format!("{} (staged)", name),
            Operation::Delete => format!("{} (staged for deletion)", name),
        };

        let mut diff = unified_diff(&remote_value, &local_value, &remote_header, &local_header);
        if diff.is_empty() {
            // Both sides empty: creating an empty value or deleting one
            diff = format!("--- {}\n+++ {}\n", remote_header, local_header);
        }

        report.diffs.push(ItemDiff {
            diff,
            name,
            operation: entry.operation,
            remote_version: remote.map(|r| r.version_label),
        });
    }

    Ok(report)
}

/// Pretty-print both sides as JSON.
///
/// Empty sides are left empty. Fails with a reason when a non-empty side is
/// not valid JSON, in which case neither side should be formatted.
fn format_pair(remote: &str, local: &str) -> std::result::Result<(String, String), String> {
    let remote_pretty = pretty_json(remote);
    let local_pretty = pretty_json(local);
    match (remote_pretty, local_pretty) {
        (Some(r), Some(l)) => Ok((r, l)),
        (None, Some(_)) => Err("remote value is not valid JSON".to_string()),
        (Some(_), None) => Err("staged value is not valid JSON".to_string()),
        (None, None) => Err("values are not valid JSON".to_string()),
    }
}

/// Pretty JSON for a non-empty value, the empty string for an empty one, or
/// `None` when the value does not parse.
fn pretty_json(value: &str) -> Option<String> {
    if value.is_empty() {
        return Some(String::new());
    }
    serde_json::from_str::<serde_json::Value>(value)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
}
