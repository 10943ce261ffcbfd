//! Strategy for the secret store (opaque version IDs plus stage labels).

use super::{ServiceStrategy, remote_error};
use crate::models::{Entry, FetchResult, HistoryEntry, Service};
use crate::remote::{LABEL_CURRENT, RemoteError, SecretClient, SecretSelector, SecretVersion};
use crate::spec::{Absolute, Scheme, VersionSpec, shifted_index};
use crate::{Error, RemoteOp, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Characters of a version ID shown in labels.
const SHORT_ID_LEN: usize = 8;

pub struct SecretStrategy {
    client: Arc<dyn SecretClient>,
}

impl SecretStrategy {
    pub fn new(client: Arc<dyn SecretClient>) -> Self {
        Self { client }
    }

    async fn get(&self, name: &str, selector: SecretSelector<'_>) -> Result<FetchResult> {
        let version = self
            .client
            .get_secret_value(name, selector)
            .await
            .map_err(remote_error(RemoteOp::Fetch, Service::Secret, name))?;
        Ok(FetchResult {
            version_label: version_label(&version.id),
            value: version.value,
        })
    }

    /// Versions sorted newest first.
    async fn sorted_versions(&self, name: &str) -> Result<Vec<SecretVersion>> {
        let mut versions = self
            .client
            .list_secret_versions(name)
            .await
            .map_err(remote_error(RemoteOp::History, Service::Secret, name))?;
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(versions)
    }
}

fn version_label(id: &str) -> String {
    let short: String = id.chars().take(SHORT_ID_LEN).collect();
    format!("#{}", short)
}

#[async_trait]
impl ServiceStrategy for SecretStrategy {
    fn service(&self) -> Service {
        Service::Secret
    }

    fn scheme(&self) -> Scheme {
        Scheme::Labeled
    }

    fn has_delete_options(&self) -> bool {
        true
    }

    async fn push_set(&self, name: &str, value: &str) -> Result<()> {
        let result = match self.client.put_secret_value(name, value).await {
            Err(RemoteError::NotFound(_)) => {
                tracing::debug!(name, "secret does not exist, creating");
                self.client.create_secret(name, value).await
            }
            other => other,
        };
        let id = result.map_err(remote_error(RemoteOp::Set, Service::Secret, name))?;
        tracing::debug!(name, id = %id, "pushed secret");
        Ok(())
    }

    async fn push_delete(&self, name: &str, entry: &Entry) -> Result<()> {
        let options = entry.delete_options.clone().unwrap_or_default();
        match self.client.delete_secret(name, &options).await {
            Ok(()) => Ok(()),
            Err(RemoteError::NotFound(_)) => {
                tracing::debug!(name, "secret already absent");
                Ok(())
            }
            Err(e) => Err(remote_error(RemoteOp::Delete, Service::Secret, name)(e)),
        }
    }

    async fn fetch_current(&self, name: &str) -> Result<FetchResult> {
        self.get(name, SecretSelector::Current).await
    }

    async fn resolve(&self, spec: &VersionSpec) -> Result<FetchResult> {
        if spec.shift == 0 {
            return match &spec.absolute {
                Absolute::Current => self.fetch_current(&spec.name).await,
                Absolute::Id(id) => self.get(&spec.name, SecretSelector::Id(id)).await,
                Absolute::Label(label) => {
                    self.get(&spec.name, SecretSelector::Label(label)).await
                }
                other => Err(Error::InvalidInput(format!(
                    "{} is not a secret version",
                    other
                ))),
            };
        }

        let versions = self.sorted_versions(&spec.name).await?;
        let not_found = |what: String| Error::VersionNotFound {
            name: spec.name.clone(),
            version: what,
        };
        let start = match &spec.absolute {
            Absolute::Current => versions
                .iter()
                .position(|v| v.has_label(LABEL_CURRENT))
                .unwrap_or(0),
            Absolute::Id(id) => versions
                .iter()
                .position(|v| v.id == *id)
                .ok_or_else(|| not_found(format!("#{}", id)))?,
            Absolute::Label(label) => versions
                .iter()
                .position(|v| v.has_label(label))
                .ok_or_else(|| not_found(format!(":{}", label)))?,
            other => {
                return Err(Error::InvalidInput(format!(
                    "{} is not a secret version",
                    other
                )));
            }
        };

        let index = shifted_index(start, spec.shift, versions.len()).ok_or_else(|| {
            Error::ShiftOutOfRange {
                name: spec.name.clone(),
                shift: spec.shift,
                available: versions.len(),
            }
        })?;

        let found = &versions[index];
        Ok(FetchResult {
            value: found.value.clone(),
            version_label: version_label(&found.id),
        })
    }

    async fn history(&self, name: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .sorted_versions(name)
            .await?
            .into_iter()
            .map(|v| HistoryEntry {
                version_label: version_label(&v.id),
                value: v.value,
                modified_at: Some(v.created_at),
                labels: v.labels,
            })
            .collect())
    }
}
