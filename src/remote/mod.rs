//! Remote client interfaces.
//!
//! Each remote service is reached through a narrow client trait:
//! - [`ParamClient`] - a parameter store with sequential numeric versions
//! - [`SecretClient`] - a secret store with opaque version IDs and stage labels
//!
//! The strategies in [`crate::strategy`] are written against these traits only.
//! [`local::LocalRemote`] implements both on top of a directory of JSON files.

pub mod local;

use crate::models::DeleteOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label carried by the current version of a secret.
pub const LABEL_CURRENT: &str = "current";

/// Label carried by the version that was current before the latest write.
pub const LABEL_PREVIOUS: &str = "previous";

/// Errors returned by remote clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is scheduled for deletion")]
    ScheduledForDeletion(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Other(String),
}

/// One version of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamVersion {
    pub version: u64,
    pub value: String,
    pub modified_at: DateTime<Utc>,
}

/// One version of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub id: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl SecretVersion {
    /// True if this version carries `label`.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Which version of a secret to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSelector<'a> {
    Current,
    Id(&'a str),
    Label(&'a str),
}

/// Client for a parameter store with sequential numeric versions.
#[async_trait]
pub trait ParamClient: Send + Sync {
    /// Read the latest version.
    async fn get_parameter(&self, name: &str) -> Result<ParamVersion, RemoteError>;

    /// Read every retained version, oldest first.
    async fn get_parameter_history(&self, name: &str) -> Result<Vec<ParamVersion>, RemoteError>;

    /// Write a new version (creating the parameter if needed). Returns the new version number.
    async fn put_parameter(&self, name: &str, value: &str) -> Result<u64, RemoteError>;

    /// Delete the parameter and its history.
    async fn delete_parameter(&self, name: &str) -> Result<(), RemoteError>;
}

/// Client for a secret store with opaque version IDs and stage labels.
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// Read one version of a secret.
    async fn get_secret_value(
        &self,
        name: &str,
        selector: SecretSelector<'_>,
    ) -> Result<SecretVersion, RemoteError>;

    /// List the retained versions of a secret.
    async fn list_secret_versions(&self, name: &str) -> Result<Vec<SecretVersion>, RemoteError>;

    /// Write a new version of an existing secret. Returns the new version ID.
    async fn put_secret_value(&self, name: &str, value: &str) -> Result<String, RemoteError>;

    /// Create a secret with its first version. Returns the version ID.
    async fn create_secret(&self, name: &str, value: &str) -> Result<String, RemoteError>;

    /// Delete a secret according to `options`.
    async fn delete_secret(&self, name: &str, options: &DeleteOptions) -> Result<(), RemoteError>;
}
