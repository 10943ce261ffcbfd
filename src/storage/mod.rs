//! Persistent staging store.
//!
//! Pending edits are kept in a single JSON file, `stage.json`, under the
//! kvstage data directory (`$KVSTAGE_DATA_DIR`, or
//! `~/.local/share/kvstage/` on Linux).
//!
//! ## File format
//!
//! ```json
//! {
//!   "version": 1,
//!   "param": { "/app/db/url": { "operation": "set", "value": "...", "staged_at": "..." } },
//!   "secret": { "api-key": { "operation": "delete", "staged_at": "...", "delete_options": { "force": true } } }
//! }
//! ```
//!
//! Namespaces without entries are omitted. When nothing is staged at all the
//! file does not exist.
//!
//! ## Locking
//!
//! Every mutation runs load → mutate → save under one process-wide lock. There
//! is no cross-process coordination: two processes writing at the same time
//! race and the last writer wins. Writes go through a temporary file and an
//! atomic rename, so readers never observe a partially written file.

use crate::models::{Entry, STATE_VERSION, Service, State};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "KVSTAGE_DATA_DIR";

/// File name of the staging file inside the data directory.
pub const STAGE_FILE: &str = "stage.json";

/// Required permissions for the staging file (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const STAGE_FILE_MODE: u32 = 0o600;

/// Serializes every load-mutate-save cycle in this process.
static STAGE_LOCK: Mutex<()> = Mutex::new(());

/// Resolve the kvstage data directory.
///
/// Priority: `KVSTAGE_DATA_DIR` env var > platform data dir + `kvstage`.
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("kvstage"))
}

/// Handle on the staging file.
#[derive(Debug, Clone)]
pub struct StagingStore {
    path: PathBuf,
}

impl StagingStore {
    /// Open the store in the default data directory.
    pub fn open() -> Result<Self> {
        Ok(Self::with_data_dir(&get_data_dir()?))
    }

    /// Open the store in an explicit data directory.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STAGE_FILE),
        }
    }

    /// Path to the staging file (which may not exist).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the staging file. A missing file is an empty state.
    pub fn load(&self) -> Result<State> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(State::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut state: State =
            serde_json::from_str(&content).map_err(|e| Error::StageFileParse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        if state.version != STATE_VERSION {
            return Err(Error::StageFileParse {
                path: self.path.clone(),
                message: format!(
                    "unsupported version {} (expected {})",
                    state.version, STATE_VERSION
                ),
            });
        }

        for service in Service::ALL {
            for entry in state.namespace_mut(service).values_mut() {
                entry.normalize();
            }
        }

        Ok(state)
    }

    /// Replace the staging file with `state`.
    pub fn save(&self, state: &State) -> Result<()> {
        let _guard = STAGE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_state(state)
    }

    /// Stage `entry` for `name`, replacing any earlier entry for the same name.
    pub fn stage(&self, service: Service, name: &str, entry: Entry) -> Result<()> {
        self.update(|state| {
            state
                .namespace_mut(service)
                .insert(name.to_string(), entry);
            Ok(())
        })?;
        tracing::debug!(%service, name, "staged");
        Ok(())
    }

    /// Remove the entry for `name`.
    ///
    /// With `service` = `None` the name is removed from every namespace.
    /// Returns `NotStaged` when no selected namespace had it.
    pub fn unstage(&self, service: Option<Service>, name: &str) -> Result<()> {
        self.update(|state| {
            let mut removed = false;
            for svc in selected(service) {
                removed |= state.namespace_mut(svc).remove(name).is_some();
            }
            if removed {
                Ok(())
            } else {
                Err(Error::NotStaged {
                    service,
                    name: name.to_string(),
                })
            }
        })?;
        tracing::debug!(?service, name, "unstaged");
        Ok(())
    }

    /// Remove every entry in the selected namespace(s).
    ///
    /// Returns the number of entries removed.
    pub fn unstage_all(&self, service: Option<Service>) -> Result<usize> {
        self.update(|state| {
            let mut removed = 0;
            for svc in selected(service) {
                let namespace = state.namespace_mut(svc);
                removed += namespace.len();
                namespace.clear();
            }
            Ok(removed)
        })
    }

    /// Get the staged entry for `name`.
    pub fn get(&self, service: Service, name: &str) -> Result<Entry> {
        let state = self.load()?;
        state
            .namespace(service)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotStaged {
                service: Some(service),
                name: name.to_string(),
            })
    }

    /// List staged entries, grouped by service.
    ///
    /// With `service` = `None` every namespace is listed. Namespaces without
    /// entries are left out of the result.
    pub fn list(
        &self,
        service: Option<Service>,
    ) -> Result<BTreeMap<Service, BTreeMap<String, Entry>>> {
        let mut state = self.load()?;
        let mut result = BTreeMap::new();
        for svc in selected(service) {
            let entries = std::mem::take(state.namespace_mut(svc));
            if !entries.is_empty() {
                result.insert(svc, entries);
            }
        }
        Ok(result)
    }

    /// Run a load → mutate → save cycle under the process-wide lock.
    ///
    /// Nothing is written when `mutate` fails.
    fn update<T>(&self, mutate: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let _guard = STAGE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.load()?;
        let result = mutate(&mut state)?;
        self.write_state(&state)?;
        Ok(result)
    }

    fn write_state(&self, state: &State) -> Result<()> {
        if state.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::Io(e)),
            };
        }

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Other("Staging file has no parent directory".to_string()))?;
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(state)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(STAGE_FILE_MODE))?;
        }
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        Ok(())
    }
}

/// Services selected by an optional filter.
fn selected(service: Option<Service>) -> Vec<Service> {
    match service {
        Some(service) => vec![service],
        None => Service::ALL.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeleteOptions;
    use crate::test_utils::TestEnv;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_stage_then_get_returns_entry() {
        let env = TestEnv::new();
        let store = env.store();

        let entry = Entry::set("postgres://db");
        store.stage(Service::Param, "/app/db", entry.clone()).unwrap();

        assert_eq!(store.get(Service::Param, "/app/db").unwrap(), entry);
    }

    #[test]
    fn test_unstage_then_get_is_not_staged() {
        let env = TestEnv::new();
        let store = env.store();

        store
            .stage(Service::Secret, "api-key", Entry::set("s3cr3t"))
            .unwrap();
        store.unstage(Some(Service::Secret), "api-key").unwrap();

        let err = store.get(Service::Secret, "api-key").unwrap_err();
        assert!(err.is_not_staged());
    }

    #[test]
    fn test_unstage_missing_is_not_staged() {
        let env = TestEnv::new();
        let store = env.store();

        let err = store.unstage(Some(Service::Param), "/nope").unwrap_err();
        assert!(matches!(
            err,
            Error::NotStaged {
                service: Some(Service::Param),
                ..
            }
        ));
    }

    #[test]
    fn test_empty_store_has_no_file() {
        let env = TestEnv::new();
        let store = env.store();

        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists());

        store.save(&State::new()).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_unstaging_last_entry_removes_file() {
        let env = TestEnv::new();
        let store = env.store();

        store.stage(Service::Param, "/a", Entry::set("1")).unwrap();
        assert!(store.path().exists());

        store.unstage(Some(Service::Param), "/a").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_last_stage_wins() {
        let env = TestEnv::new();
        let store = env.store();

        store.stage(Service::Param, "x", Entry::set("v1")).unwrap();
        store.stage(Service::Param, "x", Entry::set("v2")).unwrap();

        let listed = store.list(Some(Service::Param)).unwrap();
        let params = &listed[&Service::Param];
        assert_eq!(params.len(), 1);
        assert_eq!(params["x"].value.as_deref(), Some("v2"));
    }

    #[test]
    fn test_round_trip_preserves_namespaces() {
        let env = TestEnv::new();
        let store = env.store();

        let mut state = State::new();
        state
            .namespace_mut(Service::Param)
            .insert("/a".to_string(), Entry::set("1"));
        state.namespace_mut(Service::Secret).insert(
            "b".to_string(),
            Entry::delete(Some(DeleteOptions::with_recovery_window(7))),
        );
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let env = TestEnv::new();
        let store = env.store();
        fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::StageFileParse { .. }));
    }

    #[test]
    fn test_unsupported_version_is_parse_error() {
        let env = TestEnv::new();
        let store = env.store();
        fs::write(store.path(), r#"{"version": 99}"#).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("unsupported version 99"));
    }

    #[test]
    fn test_load_drops_value_from_delete_entry() {
        let env = TestEnv::new();
        let store = env.store();
        fs::write(
            store.path(),
            r#"{"version":1,"param":{"/a":{"operation":"delete","value":"stale","staged_at":"2026-01-01T00:00:00Z"}}}"#,
        )
        .unwrap();

        let entry = store.get(Service::Param, "/a").unwrap();
        assert!(entry.is_delete());
        assert_eq!(entry.value, None);
    }

    #[test]
    fn test_wildcard_list_and_unstage_all() {
        let env = TestEnv::new();
        let store = env.store();

        store.stage(Service::Param, "/a", Entry::set("1")).unwrap();
        store.stage(Service::Param, "/b", Entry::set("2")).unwrap();
        store.stage(Service::Secret, "c", Entry::set("3")).unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&Service::Param].len(), 2);

        assert_eq!(store.unstage_all(Some(Service::Param)).unwrap(), 2);
        let all = store.list(None).unwrap();
        assert!(!all.contains_key(&Service::Param));
        assert_eq!(all[&Service::Secret].len(), 1);

        assert_eq!(store.unstage_all(None).unwrap(), 1);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_wildcard_unstage_removes_from_every_namespace() {
        let env = TestEnv::new();
        let store = env.store();

        store.stage(Service::Param, "shared", Entry::set("1")).unwrap();
        store.stage(Service::Secret, "shared", Entry::set("2")).unwrap();

        store.unstage(None, "shared").unwrap();
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_stages_are_not_lost() {
        let env = TestEnv::new();
        let store = Arc::new(env.store());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .stage(Service::Param, &format!("/p{}", i), Entry::set(i.to_string()))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list(Some(Service::Param)).unwrap()[&Service::Param].len(), 16);
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let env = TestEnv::new();
        let store = env.store();
        store.stage(Service::Param, "/a", Entry::set("1")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, STAGE_FILE_MODE);
    }
}
