//! File-backed remote that emulates both services.
//!
//! Layout of the remote directory:
//!
//! ```text
//! <remote-dir>/
//!   params.json   {"<name>": [{"version": 1, "value": "...", "modified_at": "..."}, ...]}
//!   secrets.json  {"<name>": {"versions": [...], "deletion_date": "..."}}
//! ```
//!
//! Parameter versions count up from 1 and at most [`MAX_VERSIONS`] are kept.
//! Writing a secret moves the `current` label to the new version and the
//! `previous` label to the version that was current. A non-forced secret
//! delete only schedules deletion; the secret is unreadable until then.

use super::{
    LABEL_CURRENT, LABEL_PREVIOUS, ParamClient, ParamVersion, RemoteError, SecretClient,
    SecretSelector, SecretVersion,
};
use crate::models::{DeleteOptions, MAX_RECOVERY_WINDOW_DAYS};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Versions retained per item.
pub const MAX_VERSIONS: usize = 100;

const PARAMS_FILE: &str = "params.json";
const SECRETS_FILE: &str = "secrets.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSecret {
    /// Oldest first
    versions: Vec<SecretVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deletion_date: Option<DateTime<Utc>>,
}

type Params = BTreeMap<String, Vec<ParamVersion>>;
type Secrets = BTreeMap<String, StoredSecret>;

/// Remote services emulated in a local directory.
#[derive(Debug)]
pub struct LocalRemote {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl LocalRemote {
    /// Create a remote rooted at `dir`. The directory is created on first write.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Root directory of this remote.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, RemoteError> {
        let path = self.dir.join(file);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                RemoteError::Other(format!("corrupt remote file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn write<T: Serialize>(&self, file: &str, data: &T) -> Result<(), RemoteError> {
        let path = self.dir.join(file);
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| RemoteError::Other(e.to_string()))?;
        fs::write(&path, json).map_err(|e| io_error(&path, e))
    }

    /// Run `f` against the parameter table, saving it if `f` succeeds and `save` is set.
    fn with_params<T>(
        &self,
        save: bool,
        f: impl FnOnce(&mut Params) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut params: Params = self.read(PARAMS_FILE)?;
        let result = f(&mut params)?;
        if save {
            self.write(PARAMS_FILE, &params)?;
        }
        Ok(result)
    }

    fn with_secrets<T>(
        &self,
        save: bool,
        f: impl FnOnce(&mut Secrets) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut secrets: Secrets = self.read(SECRETS_FILE)?;
        let result = f(&mut secrets)?;
        if save {
            self.write(SECRETS_FILE, &secrets)?;
        }
        Ok(result)
    }
}

fn io_error(path: &Path, e: io::Error) -> RemoteError {
    RemoteError::Other(format!("{}: {}", path.display(), e))
}

/// Look up a secret that is readable (exists and not scheduled for deletion).
fn live_secret<'a>(secrets: &'a Secrets, name: &str) -> Result<&'a StoredSecret, RemoteError> {
    let secret = secrets
        .get(name)
        .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
    if secret.deletion_date.is_some() {
        return Err(RemoteError::ScheduledForDeletion(name.to_string()));
    }
    Ok(secret)
}

fn push_secret_version(secret: &mut StoredSecret, value: &str) -> String {
    for version in secret.versions.iter_mut() {
        version.labels.retain(|l| l != LABEL_PREVIOUS);
        if version.has_label(LABEL_CURRENT) {
            version.labels.retain(|l| l != LABEL_CURRENT);
            version.labels.push(LABEL_PREVIOUS.to_string());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    secret.versions.push(SecretVersion {
        id: id.clone(),
        value: value.to_string(),
        created_at: Utc::now(),
        labels: vec![LABEL_CURRENT.to_string()],
    });

    if secret.versions.len() > MAX_VERSIONS {
        let excess = secret.versions.len() - MAX_VERSIONS;
        secret.versions.drain(..excess);
    }
    id
}

#[async_trait]
impl ParamClient for LocalRemote {
    async fn get_parameter(&self, name: &str) -> Result<ParamVersion, RemoteError> {
        self.with_params(false, |params| {
            params
                .get(name)
                .and_then(|history| history.last())
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))
        })
    }

    async fn get_parameter_history(&self, name: &str) -> Result<Vec<ParamVersion>, RemoteError> {
        self.with_params(false, |params| {
            params
                .get(name)
                .filter(|history| !history.is_empty())
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))
        })
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<u64, RemoteError> {
        let version = self.with_params(true, |params| {
            let history = params.entry(name.to_string()).or_default();
            let version = history.last().map(|v| v.version + 1).unwrap_or(1);
            history.push(ParamVersion {
                version,
                value: value.to_string(),
                modified_at: Utc::now(),
            });
            if history.len() > MAX_VERSIONS {
                let excess = history.len() - MAX_VERSIONS;
                history.drain(..excess);
            }
            Ok(version)
        })?;
        tracing::debug!(name, version, "local remote: put parameter");
        Ok(version)
    }

    async fn delete_parameter(&self, name: &str) -> Result<(), RemoteError> {
        self.with_params(true, |params| {
            params
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))
        })?;
        tracing::debug!(name, "local remote: deleted parameter");
        Ok(())
    }
}

#[async_trait]
impl SecretClient for LocalRemote {
    async fn get_secret_value(
        &self,
        name: &str,
        selector: SecretSelector<'_>,
    ) -> Result<SecretVersion, RemoteError> {
        self.with_secrets(false, |secrets| {
            let secret = live_secret(secrets, name)?;
            let found = match selector {
                SecretSelector::Current => {
                    secret.versions.iter().find(|v| v.has_label(LABEL_CURRENT))
                }
                SecretSelector::Id(id) => secret.versions.iter().find(|v| v.id == id),
                SecretSelector::Label(label) => secret.versions.iter().find(|v| v.has_label(label)),
            };
            found.cloned().ok_or_else(|| {
                let what = match selector {
                    SecretSelector::Current => format!("current version of {}", name),
                    SecretSelector::Id(id) => format!("version {} of {}", id, name),
                    SecretSelector::Label(label) => format!("label {} of {}", label, name),
                };
                RemoteError::NotFound(what)
            })
        })
    }

    async fn list_secret_versions(&self, name: &str) -> Result<Vec<SecretVersion>, RemoteError> {
        self.with_secrets(false, |secrets| {
            let secret = live_secret(secrets, name)?;
            Ok(secret.versions.iter().rev().cloned().collect())
        })
    }

    async fn put_secret_value(&self, name: &str, value: &str) -> Result<String, RemoteError> {
        let id = self.with_secrets(true, |secrets| {
            live_secret(secrets, name)?;
            let secret = secrets
                .get_mut(name)
                .ok_or_else(|| RemoteError::NotFound(name.to_string()))?;
            Ok(push_secret_version(secret, value))
        })?;
        tracing::debug!(name, id = %id, "local remote: put secret value");
        Ok(id)
    }

    async fn create_secret(&self, name: &str, value: &str) -> Result<String, RemoteError> {
        self.with_secrets(true, |secrets| {
            if let Some(existing) = secrets.get(name) {
                return Err(if existing.deletion_date.is_some() {
                    RemoteError::ScheduledForDeletion(name.to_string())
                } else {
                    RemoteError::AlreadyExists(name.to_string())
                });
            }
            let secret = secrets.entry(name.to_string()).or_default();
            Ok(push_secret_version(secret, value))
        })
    }

    async fn delete_secret(&self, name: &str, options: &DeleteOptions) -> Result<(), RemoteError> {
        self.with_secrets(true, |secrets| {
            live_secret(secrets, name)?;
            if options.force {
                secrets.remove(name);
            } else if let Some(secret) = secrets.get_mut(name) {
                let days = options.recovery_window.unwrap_or(MAX_RECOVERY_WINDOW_DAYS);
                secret.deletion_date = Some(Utc::now() + Duration::days(i64::from(days)));
            }
            Ok(())
        })?;
        tracing::debug!(name, %options, "local remote: deleted secret");
        Ok(())
    }
}
