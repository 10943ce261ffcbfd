//! Per-service strategies.
//!
//! Every command is written once against [`ServiceStrategy`]. The concrete
//! strategy is picked at startup from the service the command targets:
//!
//! - [`ParamStrategy`] - sequential numeric versions (`#<n>`)
//! - [`SecretStrategy`] - opaque version IDs (`#<id>`) and labels (`:<label>`)

mod param;
mod secret;

pub use param::ParamStrategy;
pub use secret::SecretStrategy;

use crate::models::{Entry, FetchResult, HistoryEntry, Service};
use crate::remote::local::LocalRemote;
use crate::remote::{ParamClient, RemoteError, SecretClient};
use crate::spec::{self, Scheme, VersionSpec};
use crate::{Error, RemoteOp, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Operations every remote service supports.
#[async_trait]
pub trait ServiceStrategy: Send + Sync {
    /// The service this strategy talks to.
    fn service(&self) -> Service;

    /// Versioning scheme used to parse specs for this service.
    fn scheme(&self) -> Scheme;

    /// Whether delete entries may carry [`crate::models::DeleteOptions`].
    fn has_delete_options(&self) -> bool;

    /// Namespace name, e.g. `param`.
    fn service_name(&self) -> &'static str {
        self.service().as_str()
    }

    /// Item name for messages, e.g. `parameter`.
    fn item_name(&self) -> &'static str {
        self.service().item_name()
    }

    /// Write `value` as the new current version.
    async fn push_set(&self, name: &str, value: &str) -> Result<()>;

    /// Delete the item, passing the entry's delete options through.
    ///
    /// Deleting an item that no longer exists succeeds.
    async fn push_delete(&self, name: &str, entry: &Entry) -> Result<()>;

    /// Read the current version. Never a pinned version.
    async fn fetch_current(&self, name: &str) -> Result<FetchResult>;

    /// Resolve a parsed spec against the remote history.
    async fn resolve(&self, spec: &VersionSpec) -> Result<FetchResult>;

    /// Every retained version, newest first.
    async fn history(&self, name: &str) -> Result<Vec<HistoryEntry>>;

    /// Parse a name that must not carry a version specifier.
    fn parse_name(&self, input: &str) -> Result<String> {
        Ok(spec::parse_name(input)?)
    }

    /// Parse a spec, returning the name and whether it pins a version.
    fn parse_spec(&self, input: &str) -> Result<(String, bool)> {
        let spec = VersionSpec::parse(input, self.scheme())?;
        let has_version = spec.has_version();
        Ok((spec.name, has_version))
    }

    /// Parse `input` as a spec and fetch the value it points at.
    async fn fetch_version(&self, input: &str) -> Result<FetchResult> {
        let spec = VersionSpec::parse(input, self.scheme())?;
        self.resolve(&spec).await
    }
}

/// Clients for every remote service.
#[derive(Clone)]
pub struct Remotes {
    pub params: Arc<dyn ParamClient>,
    pub secrets: Arc<dyn SecretClient>,
}

impl Remotes {
    /// Both services backed by one local remote directory.
    pub fn local(dir: &Path) -> Self {
        let remote = Arc::new(LocalRemote::new(dir));
        Self {
            params: remote.clone(),
            secrets: remote,
        }
    }

    /// Strategy for `service`.
    pub fn strategy(&self, service: Service) -> Arc<dyn ServiceStrategy> {
        match service {
            Service::Param => Arc::new(ParamStrategy::new(Arc::clone(&self.params))),
            Service::Secret => Arc::new(SecretStrategy::new(Arc::clone(&self.secrets))),
        }
    }
}

/// Wrap a client error with the operation that failed.
pub(crate) fn remote_error(
    op: RemoteOp,
    service: Service,
    name: &str,
) -> impl FnOnce(RemoteError) -> Error {
    let name = name.to_string();
    move |source| Error::Remote {
        op,
        item: service.item_name(),
        name,
        source,
    }
}
