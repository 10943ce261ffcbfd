//! Data models for kvstage.
//!
//! This module defines the core data structures:
//! - `Service` - Which remote store an item lives in
//! - `Entry` - A pending local change (set or delete)
//! - `DeleteOptions` - Deletion policy passed through to the secret store
//! - `State` - The schema-versioned contents of the staging file
//! - `FetchResult` / `HistoryEntry` - Values read back from a remote

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current schema version of the staging file.
pub const STATE_VERSION: u32 = 1;

/// Minimum recovery window accepted by the secret store, in days.
pub const MIN_RECOVERY_WINDOW_DAYS: u32 = 7;

/// Maximum recovery window accepted by the secret store, in days.
pub const MAX_RECOVERY_WINDOW_DAYS: u32 = 30;

/// A remote configuration service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Parameter store with sequential numeric versions
    Param,
    /// Secret store with opaque version IDs and stage labels
    Secret,
}

impl Service {
    /// All services, in namespace order.
    pub const ALL: [Service; 2] = [Service::Param, Service::Secret];

    /// Namespace key used in the staging file and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Param => "param",
            Self::Secret => "secret",
        }
    }

    /// Human name for a single item of this service.
    pub fn item_name(&self) -> &'static str {
        match self {
            Self::Param => "parameter",
            Self::Secret => "secret",
        }
    }

    /// Parse a service from its namespace key.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "param" | "params" | "parameter" => Some(Self::Param),
            "secret" | "secrets" => Some(Self::Secret),
            _ => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Set,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Deletion policy for services that support one.
///
/// `force` and `recovery_window` are mutually exclusive; see [`DeleteOptions::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Delete immediately with no recovery window
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,

    /// Days the deleted item stays recoverable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_window: Option<u32>,
}

impl DeleteOptions {
    /// Options for an immediate, unrecoverable delete.
    pub fn force() -> Self {
        Self {
            force: true,
            recovery_window: None,
        }
    }

    /// Options for a delete that stays recoverable for `days`.
    pub fn with_recovery_window(days: u32) -> Self {
        Self {
            force: false,
            recovery_window: Some(days),
        }
    }

    /// True when no option is set (the remote's default policy applies).
    pub fn is_default(&self) -> bool {
        !self.force && self.recovery_window.is_none()
    }

    /// Validate the option combination.
    ///
    /// Returns an error message if the options are invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.force && self.recovery_window.is_some() {
            return Err("--force and --recovery-window cannot be used together".to_string());
        }
        if let Some(days) = self.recovery_window {
            if !(MIN_RECOVERY_WINDOW_DAYS..=MAX_RECOVERY_WINDOW_DAYS).contains(&days) {
                return Err(format!(
                    "recovery window must be {}-{} days, got {}",
                    MIN_RECOVERY_WINDOW_DAYS, MAX_RECOVERY_WINDOW_DAYS, days
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DeleteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force {
            write!(f, "force")
        } else if let Some(days) = self.recovery_window {
            write!(f, "recovery window {} days", days)
        } else {
            write!(f, "default")
        }
    }
}

/// A pending local change to one remote item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Whether the item will be written or removed
    pub operation: Operation,

    /// New value; only present for `Set`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// When the change was staged
    pub staged_at: DateTime<Utc>,

    /// Deletion policy (delete entries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_options: Option<DeleteOptions>,
}

impl Entry {
    /// A pending write of `value`.
    pub fn set(value: impl Into<String>) -> Self {
        Self {
            operation: Operation::Set,
            value: Some(value.into()),
            staged_at: Utc::now(),
            delete_options: None,
        }
    }

    /// A pending delete. Default options are stored as `None`.
    pub fn delete(options: Option<DeleteOptions>) -> Self {
        Self {
            operation: Operation::Delete,
            value: None,
            staged_at: Utc::now(),
            delete_options: options.filter(|o| !o.is_default()),
        }
    }

    /// True for delete entries.
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    /// The value that would exist locally once this entry is applied.
    ///
    /// Delete entries are treated as an empty value.
    pub fn local_value(&self) -> &str {
        match self.operation {
            Operation::Set => self.value.as_deref().unwrap_or(""),
            Operation::Delete => "",
        }
    }

    /// Drop fields that do not belong to this entry's operation.
    pub(crate) fn normalize(&mut self) {
        match self.operation {
            Operation::Set => self.delete_options = None,
            Operation::Delete => self.value = None,
        }
    }
}

/// Contents of the staging file.
///
/// Namespaces with no entries are omitted when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Schema version
    pub version: u32,

    /// Pending parameter changes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub param: BTreeMap<String, Entry>,

    /// Pending secret changes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret: BTreeMap<String, Entry>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            param: BTreeMap::new(),
            secret: BTreeMap::new(),
        }
    }
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for one service.
    pub fn namespace(&self, service: Service) -> &BTreeMap<String, Entry> {
        match service {
            Service::Param => &self.param,
            Service::Secret => &self.secret,
        }
    }

    /// Mutable entries for one service.
    pub fn namespace_mut(&mut self, service: Service) -> &mut BTreeMap<String, Entry> {
        match service {
            Service::Param => &mut self.param,
            Service::Secret => &mut self.secret,
        }
    }

    /// Total number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.param.len() + self.secret.len()
    }

    /// True when no namespace has entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The remote's value at some version, with a short tag for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub value: String,
    /// e.g. `#3` for a parameter version, `#1a2b3c4d` for a secret version
    pub version_label: String,
}

/// One version in a remote item's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub version_label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_parse_and_display() {
        assert_eq!(Service::parse("param"), Some(Service::Param));
        assert_eq!(Service::parse("Secrets"), Some(Service::Secret));
        assert_eq!(Service::parse("bucket"), None);
        assert_eq!(Service::Param.to_string(), "param");
        assert_eq!(Service::Secret.item_name(), "secret");
    }

    #[test]
    fn test_delete_entry_never_carries_value() {
        let entry = Entry::delete(None);
        assert!(entry.is_delete());
        assert_eq!(entry.value, None);
        assert_eq!(entry.local_value(), "");
    }

    #[test]
    fn test_delete_entry_drops_default_options() {
        let entry = Entry::delete(Some(DeleteOptions::default()));
        assert_eq!(entry.delete_options, None);

        let entry = Entry::delete(Some(DeleteOptions::force()));
        assert_eq!(entry.delete_options, Some(DeleteOptions::force()));
    }

    #[test]
    fn test_normalize_drops_value_on_delete() {
        let mut entry = Entry::delete(None);
        entry.value = Some("leftover".to_string());
        entry.normalize();
        assert_eq!(entry.value, None);
    }

    #[test]
    fn test_delete_options_validate() {
        assert!(DeleteOptions::force().validate().is_ok());
        assert!(DeleteOptions::with_recovery_window(7).validate().is_ok());
        assert!(DeleteOptions::with_recovery_window(30).validate().is_ok());
        assert!(DeleteOptions::with_recovery_window(6).validate().is_err());
        assert!(DeleteOptions::with_recovery_window(31).validate().is_err());

        let both = DeleteOptions {
            force: true,
            recovery_window: Some(10),
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_state_serialization_omits_empty_namespaces() {
        let mut state = State::new();
        state
            .namespace_mut(Service::Param)
            .insert("/app/db".to_string(), Entry::set("v1"));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json.get("param").is_some());
        assert!(json.get("secret").is_none());
        assert_eq!(json["param"]["/app/db"]["operation"], "set");
        assert_eq!(json["param"]["/app/db"]["value"], "v1");
    }

    #[test]
    fn test_delete_entry_serialization() {
        let entry = Entry::delete(Some(DeleteOptions::with_recovery_window(14)));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["operation"], "delete");
        assert!(json.get("value").is_none());
        assert_eq!(json["delete_options"]["recovery_window"], 14);
        assert!(json["delete_options"].get("force").is_none());
    }
}
