//! Bounded-concurrency map with cancellation.
//!
//! [`map_bounded`] runs an async function over a list of keyed items with at
//! most `limit` calls in flight and collects every item's result under its
//! key. A failing item never affects the others. When the [`CancelToken`]
//! fires, in-flight calls are dropped, no new calls start, and the keys that
//! did not finish are reported as cancelled next to the results already
//! collected.

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Default ceiling on concurrent remote calls.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Sending half of a cancellation signal.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving half of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl Canceller {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A token that fires when [`Canceller::cancel`] is called.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// True once the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the signal fires; pending forever if it never can.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

/// Outcome of [`map_bounded`].
#[derive(Debug)]
pub struct BoundedResults<K, R, E> {
    /// Items whose call ran to completion
    pub completed: BTreeMap<K, Result<R, E>>,
    /// Items that were in flight or not yet started when cancelled (sorted)
    pub cancelled: Vec<K>,
}

/// Apply `f` to every item with at most `limit` calls in flight.
///
/// A `limit` of 0 is treated as 1.
pub async fn map_bounded<K, V, R, E, F, Fut>(
    items: Vec<(K, V)>,
    limit: usize,
    cancel: &CancelToken,
    f: F,
) -> BoundedResults<K, R, E>
where
    K: Ord + Clone,
    F: Fn(K, V) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let f = &f;
    let mut outcomes = stream::iter(items)
        .map(|(key, value)| async move {
            if cancel.is_cancelled() {
                return (key, None);
            }
            let call = f(key.clone(), value);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => (key, None),
                result = call => (key, Some(result)),
            }
        })
        .buffer_unordered(limit.max(1));

    let mut results = BoundedResults {
        completed: BTreeMap::new(),
        cancelled: Vec::new(),
    };
    while let Some((key, outcome)) = outcomes.next().await {
        match outcome {
            Some(result) => {
                results.completed.insert(key, result);
            }
            None => results.cancelled.push(key),
        }
    }
    results.cancelled.sort();
    results
}
