//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The Rust struct representing the file
//! - Serialization/deserialization to/from KDL format
//! - Validation of value ranges

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest accepted `concurrency` value.
pub const MIN_CONCURRENCY: usize = 1;

/// Largest accepted `concurrency` value.
pub const MAX_CONCURRENCY: usize = 64;

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// output-format "human"  // or "json"
/// concurrency 10         // 1-64
/// remote-dir "/srv/kvstage-remote"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvstageConfig {
    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Maximum remote calls in flight during push
    pub concurrency: Option<usize>,

    /// Directory backing the local remote
    pub remote_dir: Option<PathBuf>,
}

impl KvstageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(concurrency) = self.concurrency {
            validate_concurrency(concurrency)?;
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes are ignored. A known node with a value of the wrong type
    /// or out of range is an error.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self, String> {
        let mut config = Self::new();

        if let Some(value) = first_value(doc, "output-format") {
            let s = value
                .as_string()
                .ok_or_else(|| "output-format must be a string".to_string())?;
            config.output_format = Some(OutputFormat::parse(s).ok_or_else(|| {
                format!("output-format must be \"json\" or \"human\", got \"{}\"", s)
            })?);
        }

        if let Some(value) = first_value(doc, "concurrency") {
            let i = value
                .as_integer()
                .ok_or_else(|| "concurrency must be an integer".to_string())?;
            let concurrency = usize::try_from(i).map_err(|_| {
                format!(
                    "concurrency must be {}-{}, got {}",
                    MIN_CONCURRENCY, MAX_CONCURRENCY, i
                )
            })?;
            config.concurrency = Some(concurrency);
        }

        if let Some(value) = first_value(doc, "remote-dir") {
            let s = value
                .as_string()
                .ok_or_else(|| "remote-dir must be a string".to_string())?;
            config.remote_dir = Some(PathBuf::from(s));
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref format) = self.output_format {
            let mut node = KdlNode::new("output-format");
            node.push(KdlEntry::new(KdlValue::String(format.as_str().to_string())));
            doc.nodes_mut().push(node);
        }

        if let Some(concurrency) = self.concurrency {
            let mut node = KdlNode::new("concurrency");
            node.push(KdlEntry::new(KdlValue::Integer(concurrency as i128)));
            doc.nodes_mut().push(node);
        }

        if let Some(ref dir) = self.remote_dir {
            let mut node = KdlNode::new("remote-dir");
            node.push(KdlEntry::new(KdlValue::String(dir.display().to_string())));
            doc.nodes_mut().push(node);
        }

        doc
    }
}

/// Check that a concurrency value is in range.
pub fn validate_concurrency(concurrency: usize) -> Result<(), String> {
    if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
        Ok(())
    } else {
        Err(format!(
            "concurrency must be {}-{}, got {}",
            MIN_CONCURRENCY, MAX_CONCURRENCY, concurrency
        ))
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("HUMAN"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_config_from_kdl_empty() {
        let doc = KdlDocument::new();
        assert_eq!(KvstageConfig::from_kdl(&doc).unwrap(), KvstageConfig::default());
    }

    #[test]
    fn test_config_from_kdl_full() {
        let doc: KdlDocument = r#"
output-format "human"
concurrency 4
remote-dir "/tmp/remote"
"#
        .parse()
        .unwrap();
        let config = KvstageConfig::from_kdl(&doc).unwrap();

        assert_eq!(config.output_format, Some(OutputFormat::Human));
        assert_eq!(config.concurrency, Some(4));
        assert_eq!(config.remote_dir, Some(PathBuf::from("/tmp/remote")));
    }

    #[test]
    fn test_config_from_kdl_ignores_unknown_nodes() {
        let doc: KdlDocument = "editor \"nvim\"\nconcurrency 2".parse().unwrap();
        let config = KvstageConfig::from_kdl(&doc).unwrap();
        assert_eq!(config.concurrency, Some(2));
    }

    #[test]
    fn test_config_from_kdl_rejects_bad_values() {
        let doc: KdlDocument = "concurrency 0".parse().unwrap();
        let err = KvstageConfig::from_kdl(&doc).unwrap_err();
        assert!(err.contains("concurrency must be 1-64"));

        let doc: KdlDocument = "concurrency 65".parse().unwrap();
        assert!(KvstageConfig::from_kdl(&doc).is_err());

        let doc: KdlDocument = "concurrency -3".parse().unwrap();
        assert!(KvstageConfig::from_kdl(&doc).is_err());

        let doc: KdlDocument = "output-format \"xml\"".parse().unwrap();
        let err = KvstageConfig::from_kdl(&doc).unwrap_err();
        assert!(err.contains("output-format"));

        let doc: KdlDocument = "remote-dir 5".parse().unwrap();
        assert!(KvstageConfig::from_kdl(&doc).is_err());
    }

    #[test]
    fn test_config_kdl_roundtrip() {
        let config = KvstageConfig {
            output_format: Some(OutputFormat::Json),
            concurrency: Some(12),
            remote_dir: Some(PathBuf::from("/srv/remote")),
        };
        let doc = config.to_kdl();
        assert_eq!(KvstageConfig::from_kdl(&doc).unwrap(), config);
    }
}
