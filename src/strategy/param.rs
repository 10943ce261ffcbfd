//! Strategy for the parameter store (sequential numeric versions).

use super::{ServiceStrategy, remote_error};
use crate::models::{Entry, FetchResult, HistoryEntry, Service};
use crate::remote::{ParamClient, ParamVersion, RemoteError};
use crate::spec::{Absolute, Scheme, VersionSpec, shifted_index};
use crate::{Error, RemoteOp, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ParamStrategy {
    client: Arc<dyn ParamClient>,
}

impl ParamStrategy {
    pub fn new(client: Arc<dyn ParamClient>) -> Self {
        Self { client }
    }

    /// History sorted newest first.
    async fn sorted_history(&self, name: &str) -> Result<Vec<ParamVersion>> {
        let mut history = self
            .client
            .get_parameter_history(name)
            .await
            .map_err(remote_error(RemoteOp::History, Service::Param, name))?;
        history.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(history)
    }
}

fn version_label(version: u64) -> String {
    format!("#{}", version)
}

#[async_trait]
impl ServiceStrategy for ParamStrategy {
    fn service(&self) -> Service {
        Service::Param
    }

    fn scheme(&self) -> Scheme {
        Scheme::Numeric
    }

    fn has_delete_options(&self) -> bool {
        false
    }

    async fn push_set(&self, name: &str, value: &str) -> Result<()> {
        let version = self
            .client
            .put_parameter(name, value)
            .await
            .map_err(remote_error(RemoteOp::Set, Service::Param, name))?;
        tracing::debug!(name, version, "pushed parameter");
        Ok(())
    }

    async fn push_delete(&self, name: &str, _entry: &Entry) -> Result<()> {
        match self.client.delete_parameter(name).await {
            Ok(()) => Ok(()),
            Err(RemoteError::NotFound(_)) => {
                tracing::debug!(name, "parameter already absent");
                Ok(())
            }
            Err(e) => Err(remote_error(RemoteOp::Delete, Service::Param, name)(e)),
        }
    }

    async fn fetch_current(&self, name: &str) -> Result<FetchResult> {
        let current = self
            .client
            .get_parameter(name)
            .await
            .map_err(remote_error(RemoteOp::Fetch, Service::Param, name))?;
        Ok(FetchResult {
            value: current.value,
            version_label: version_label(current.version),
        })
    }

    async fn resolve(&self, spec: &VersionSpec) -> Result<FetchResult> {
        if !spec.has_version() {
            return self.fetch_current(&spec.name).await;
        }

        let history = self.sorted_history(&spec.name).await?;
        let start = match &spec.absolute {
            Absolute::Current => 0,
            Absolute::Version(v) => history
                .iter()
                .position(|p| p.version == *v)
                .ok_or_else(|| Error::VersionNotFound {
                    name: spec.name.clone(),
                    version: version_label(*v),
                })?,
            other => {
                return Err(Error::InvalidInput(format!(
                    "{} is not a parameter version",
                    other
                )));
            }
        };

        let index = shifted_index(start, spec.shift, history.len()).ok_or_else(|| {
            Error::ShiftOutOfRange {
                name: spec.name.clone(),
                shift: spec.shift,
                available: history.len(),
            }
        })?;

        let found = &history[index];
        Ok(FetchResult {
            value: found.value.clone(),
            version_label: version_label(found.version),
        })
    }

    async fn history(&self, name: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .sorted_history(name)
            .await?
            .into_iter()
            .map(|p| HistoryEntry {
                version_label: version_label(p.version),
                value: p.value,
                modified_at: Some(p.modified_at),
                labels: Vec::new(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    async fn seeded(env: &TestEnv, values: &[&str]) -> ParamStrategy {
        let remote = env.remote();
        for value in values {
            remote.put_parameter("/app/db", value).await.unwrap();
        }
        ParamStrategy::new(remote)
    }

    #[tokio::test]
    async fn test_fetch_current() {
        let env = TestEnv::new();
        let strategy = seeded(&env, &["v1", "v2"]).await;

        let current = strategy.fetch_current("/app/db").await.unwrap();
        assert_eq!(current.value, "v2");
        assert_eq!(current.version_label, "#2");
    }

    #[tokio::test]
    async fn test_shift_walks_back_from_current() {
        let env = TestEnv::new();
        let strategy = seeded(&env, &["v1", "v2", "v3"]).await;

        let result = strategy.fetch_version("/app/db~").await.unwrap();
        assert_eq!(result.value, "v2");

        let result = strategy.fetch_version("/app/db~2").await.unwrap();
        assert_eq!(result.version_label, "#1");
    }

    #[tokio::test]
    async fn test_version_then_shift() {
        let env = TestEnv::new();
        let values: Vec<String> = (1..=8).map(|i| format!("v{}", i)).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let strategy = seeded(&env, &refs).await;

        let result = strategy.fetch_version("/app/db#7~1").await.unwrap();
        assert_eq!(result.version_label, "#6");
        assert_eq!(result.value, "v6");
    }

    #[tokio::test]
    async fn test_shift_out_of_range() {
        let env = TestEnv::new();
        let strategy = seeded(&env, &["v1", "v2"]).await;

        let err = strategy.fetch_version("/app/db~5").await.unwrap_err();
        assert!(matches!(err, Error::ShiftOutOfRange { shift: 5, .. }));
        assert!(err.to_string().contains("~5"));
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let env = TestEnv::new();
        let strategy = seeded(&env, &["v1"]).await;

        let err = strategy.fetch_version("/app/db#9").await.unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_parse_spec_reports_pinning() {
        let env = TestEnv::new();
        let strategy = ParamStrategy::new(env.remote());

        assert_eq!(
            strategy.parse_spec("/app/db").unwrap(),
            ("/app/db".to_string(), false)
        );
        assert_eq!(
            strategy.parse_spec("/app/db#2").unwrap(),
            ("/app/db".to_string(), true)
        );
        assert!(strategy.parse_spec("/app/db:current").is_err());
        assert!(strategy.parse_name("/app/db~1").is_err());
    }

    #[tokio::test]
    async fn test_push_delete_of_absent_parameter_succeeds() {
        let env = TestEnv::new();
        let strategy = ParamStrategy::new(env.remote());

        strategy
            .push_delete("/gone", &Entry::delete(None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_missing_is_remote_not_found() {
        let env = TestEnv::new();
        let strategy = ParamStrategy::new(env.remote());

        let err = strategy.fetch_current("/missing").await.unwrap_err();
        assert!(err.is_remote_not_found());
        assert!(err.to_string().starts_with("failed to fetch parameter /missing"));
    }
}
