//! Synchronization engine: diffing staged entries against the remote and
//! pushing them.
//!
//! - [`diff`] - convergence-aware diff of staged entries
//! - [`push`] - bounded parallel push with per-item outcomes
//! - [`parallel`] - generic bounded-concurrency map with cancellation
//! - [`unified`] - line-based unified diff rendering

pub mod diff;
pub mod parallel;
pub mod push;
pub mod unified;

pub use diff::{DiffReport, ItemDiff, diff_staged};
pub use parallel::{BoundedResults, CancelToken, Canceller, DEFAULT_CONCURRENCY, map_bounded};
pub use push::{PushOptions, PushReport, push_staged};

use crate::models::{Entry, Service};
use crate::storage::StagingStore;
use crate::Result;

/// Staged entries of one service, optionally narrowed to a single name.
///
/// A name that is not staged is a `NotStaged` error.
pub(crate) fn select_entries(
    store: &StagingStore,
    service: Service,
    name: Option<&str>,
) -> Result<Vec<(String, Entry)>> {
    match name {
        Some(name) => Ok(vec![(name.to_string(), store.get(service, name)?)]),
        None => Ok(store
            .list(Some(service))?
            .remove(&service)
            .unwrap_or_default()
            .into_iter()
            .collect()),
    }
}
