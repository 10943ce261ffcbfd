//! Push staged entries to the remote.
//!
//! Entries are applied with bounded concurrency. Every entry gets its own
//! outcome: a success unstages it, a failure leaves it staged for a retry.
//! Entries still outstanding when the push is cancelled stay staged and are
//! reported as failed.

use super::parallel::{CancelToken, DEFAULT_CONCURRENCY, map_bounded};
use super::select_entries;
use crate::models::{Entry, Operation, Service};
use crate::storage::StagingStore;
use crate::strategy::ServiceStrategy;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Failure message for entries cut off by cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled before completion";

#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Maximum remote calls in flight
    pub concurrency: usize,
    pub cancel: CancelToken,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancelToken::never(),
        }
    }
}

/// Per-entry outcome of a push.
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub service: Service,
    pub succeeded: Vec<String>,
    /// Name to error message
    pub failed: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PushReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Push staged entries of `strategy`'s service.
///
/// Only errors that prevent the push from starting (reading the staging
/// file, an unstaged `name`) are returned as `Err`. Remote failures are
/// reported per entry in the [`PushReport`].
pub async fn push_staged(
    store: &StagingStore,
    strategy: &dyn ServiceStrategy,
    name: Option<&str>,
    options: &PushOptions,
) -> Result<PushReport> {
    let service = strategy.service();
    let entries = select_entries(store, service, name)?;
    tracing::info!(%service, count = entries.len(), concurrency = options.concurrency, "pushing");

    let results = map_bounded(
        entries,
        options.concurrency,
        &options.cancel,
        |name: String, entry: Entry| async move {
            match entry.operation {
                Operation::Set => strategy.push_set(&name, entry.local_value()).await,
                Operation::Delete => strategy.push_delete(&name, &entry).await,
            }
        },
    )
    .await;

    let mut report = PushReport {
        service,
        succeeded: Vec::new(),
        failed: BTreeMap::new(),
        warnings: Vec::new(),
    };

    for (name, outcome) in results.completed {
        match outcome {
            Ok(()) => {
                if let Err(e) = store.unstage(Some(service), &name) {
                    report
                        .warnings
                        .push(format!("pushed {} but failed to unstage it: {}", name, e));
                }
                tracing::debug!(%service, name = %name, "pushed");
                report.succeeded.push(name);
            }
            Err(e) => {
                tracing::warn!(%service, name = %name, error = %e, "push failed");
                report.failed.insert(name, e.to_string());
            }
        }
    }
    for name in results.cancelled {
        report.failed.insert(name, CANCELLED_MESSAGE.to_string());
    }

    Ok(report)
}
