//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`KVSTAGE_REMOTE_DIR`)
//! 3. config.kdl
//! 4. Built-in defaults

use super::schema::{KvstageConfig, OutputFormat, validate_concurrency};
use super::{REMOTE_DIR_ENV, load_config};
use crate::engine::DEFAULT_CONCURRENCY;
use crate::storage::get_data_dir;
use crate::{Error, Result};
use std::path::PathBuf;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_format: Resolved<OutputFormat>,
    pub concurrency: Resolved<usize>,
    pub remote_dir: Resolved<PathBuf>,
}

impl ResolvedConfig {
    pub fn output_format(&self) -> &OutputFormat {
        &self.output_format.value
    }

    pub fn human(&self) -> bool {
        self.output_format.value == OutputFormat::Human
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.value
    }

    pub fn remote_dir(&self) -> &PathBuf {
        &self.remote_dir.value
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_format: Option<OutputFormat>,
    pub concurrency: Option<usize>,
    pub remote_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_remote_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.remote_dir = Some(dir.into());
        self
    }
}

/// Resolve configuration from the config file, the environment and `overrides`.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let file = load_config()?;
    let env_remote_dir = std::env::var_os(REMOTE_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let default_remote_dir = get_data_dir()?.join("remote");
    resolve_from(&file, env_remote_dir, default_remote_dir, overrides)
}

/// Apply the precedence chain to already-loaded inputs.
pub fn resolve_from(
    file: &KvstageConfig,
    env_remote_dir: Option<PathBuf>,
    default_remote_dir: PathBuf,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let output_format = if let Some(ref format) = overrides.output_format {
        Resolved::new(format.clone(), ValueSource::CliFlag)
    } else if let Some(ref format) = file.output_format {
        Resolved::new(format.clone(), ValueSource::ConfigFile)
    } else {
        Resolved::new(OutputFormat::default(), ValueSource::Default)
    };

    let concurrency = if let Some(concurrency) = overrides.concurrency {
        validate_concurrency(concurrency).map_err(Error::Config)?;
        Resolved::new(concurrency, ValueSource::CliFlag)
    } else if let Some(concurrency) = file.concurrency {
        Resolved::new(concurrency, ValueSource::ConfigFile)
    } else {
        Resolved::new(DEFAULT_CONCURRENCY, ValueSource::Default)
    };

    let remote_dir = if let Some(ref dir) = overrides.remote_dir {
        Resolved::new(dir.clone(), ValueSource::CliFlag)
    } else if let Some(dir) = env_remote_dir {
        Resolved::new(dir, ValueSource::EnvVar(REMOTE_DIR_ENV.to_string()))
    } else if let Some(ref dir) = file.remote_dir {
        Resolved::new(dir.clone(), ValueSource::ConfigFile)
    } else {
        Resolved::new(default_remote_dir, ValueSource::Default)
    };

    Ok(ResolvedConfig {
        output_format,
        concurrency,
        remote_dir,
    })
}
