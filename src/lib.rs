//! kvstage - git-like staging for remote parameter and secret stores.
//!
//! This library provides the core functionality for the `kvstage` CLI tool:
//! a persistent local staging area, version specifier parsing, per-service
//! strategies, a convergence-aware diff engine and a bounded parallel push
//! executor.

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod models;
pub mod remote;
pub mod spec;
pub mod storage;
pub mod strategy;

use models::Service;
use remote::RemoteError;
use spec::SpecError;
use std::fmt;
use std::path::PathBuf;


/// Remote operation that failed, used as the error message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Set,
    Delete,
    Fetch,
    History,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Delete => write!(f, "delete"),
            Self::Fetch => write!(f, "fetch"),
            Self::History => write!(f, "read history of"),
        }
    }
}

/// Library-level error type for kvstage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse staging file {}: {message}", .path.display())]
    StageFileParse { path: PathBuf, message: String },

    #[error("invalid version spec: {0}")]
    Spec(#[from] SpecError),

    #[error("{} is not staged", staged_label(.service, .name))]
    NotStaged {
        service: Option<Service>,
        name: String,
    },

    #[error("failed to {op} {item} {name}: {source}")]
    Remote {
        op: RemoteOp,
        item: &'static str,
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("version {version} of {name} not found")]
    VersionNotFound { name: String, version: String },

    #[error("version shift ~{shift} is out of range for {name} ({available} version(s) available)")]
    ShiftOutOfRange {
        name: String,
        shift: u32,
        available: usize,
    },

    #[error("pushed {succeeded}, failed {failed}")]
    PushFailed { succeeded: usize, failed: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when a remote call failed because the item does not exist.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(
            self,
            Error::Remote {
                source: RemoteError::NotFound(_),
                ..
            }
        )
    }

    /// True for the not-staged condition.
    pub fn is_not_staged(&self) -> bool {
        matches!(self, Error::NotStaged { .. })
    }
}

fn staged_label(service: &Option<Service>, name: &str) -> String {
    match service {
        Some(service) => format!("{} {}", service, name),
        None => name.to_string(),
    }
}

/// Result type alias for kvstage operations.
pub type Result<T> = std::result::Result<T, Error>;
