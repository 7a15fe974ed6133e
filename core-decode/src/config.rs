//! # Decode Configuration
//!
//! Configuration types for backend selection and block output.

use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for `block_size`; anything larger is almost certainly a typo.
const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// How the probe step orders candidate backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Use the configured (or registered) priority order as-is. The file is
    /// not read by the probe.
    #[default]
    Priority,
    /// Read the file header and move backends that handle the detected
    /// container ahead of the rest, keeping their relative order.
    Sniff,
}

/// Settings for the external-process backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// Candidate executables, tried in order. Bare names are looked up on
    /// `PATH`; absolute paths are used directly.
    ///
    /// Default: `["ffmpeg", "avconv"]`.
    #[serde(default = "default_ffmpeg_commands")]
    pub commands: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            commands: default_ffmpeg_commands(),
        }
    }
}

/// Decoding configuration.
///
/// Controls which backends are tried, in which order, and how large the
/// emitted blocks are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum size of one emitted block, in bytes.
    ///
    /// Backends round this down to whole frames. Callers must not rely on
    /// blocks having exactly this size.
    ///
    /// Default: 4096 bytes.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Explicit backend order by name (e.g. `["raw", "ffmpeg"]`).
    ///
    /// When set, only the named backends are tried, in this order. When
    /// unset, every registered backend is tried in priority order.
    #[serde(default)]
    pub backends: Option<Vec<String>>,

    /// Candidate ordering strategy.
    ///
    /// Default: [`ProbeStrategy::Priority`].
    #[serde(default)]
    pub probe_strategy: ProbeStrategy,

    /// External-process backend settings.
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            backends: None,
            probe_strategy: ProbeStrategy::default(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl DecodeConfig {
    /// Set the maximum block size in bytes.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Restrict and order the backends to try.
    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backends = Some(backends.into_iter().map(Into::into).collect());
        self
    }

    /// Set the probe strategy.
    pub fn with_probe_strategy(mut self, strategy: ProbeStrategy) -> Self {
        self.probe_strategy = strategy;
        self
    }

    /// Replace the external decoder candidates.
    pub fn with_ffmpeg_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ffmpeg.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DecodeError::InvalidConfig(format!("malformed JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(DecodeError::InvalidConfig(
                "block_size must be greater than 0".to_string(),
            ));
        }

        if self.block_size > MAX_BLOCK_SIZE {
            return Err(DecodeError::InvalidConfig(format!(
                "block_size must not exceed {} bytes",
                MAX_BLOCK_SIZE
            )));
        }

        if let Some(backends) = &self.backends {
            if backends.is_empty() {
                return Err(DecodeError::InvalidConfig(
                    "backends list must not be empty when given".to_string(),
                ));
            }
        }

        if self.ffmpeg.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(DecodeError::InvalidConfig(
                "ffmpeg.commands must contain at least one command".to_string(),
            ));
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_block_size() -> usize {
    4096
}

fn default_ffmpeg_commands() -> Vec<String> {
    vec!["ffmpeg".to_string(), "avconv".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DecodeConfig::default();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.backends, None);
        assert_eq!(config.probe_strategy, ProbeStrategy::Priority);
        assert_eq!(config.ffmpeg.commands, vec!["ffmpeg", "avconv"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = DecodeConfig::default()
            .with_block_size(8192)
            .with_backends(["ffmpeg", "raw"])
            .with_probe_strategy(ProbeStrategy::Sniff)
            .with_ffmpeg_commands(["/opt/ffmpeg/bin/ffmpeg"]);

        assert_eq!(config.block_size, 8192);
        assert_eq!(
            config.backends,
            Some(vec!["ffmpeg".to_string(), "raw".to_string()])
        );
        assert_eq!(config.probe_strategy, ProbeStrategy::Sniff);
        assert_eq!(config.ffmpeg.commands, vec!["/opt/ffmpeg/bin/ffmpeg"]);
    }

    #[test]
    fn test_validation() {
        assert!(DecodeConfig::default().with_block_size(0).validate().is_err());
        assert!(DecodeConfig::default()
            .with_block_size(MAX_BLOCK_SIZE + 1)
            .validate()
            .is_err());
        assert!(DecodeConfig::default()
            .with_backends(Vec::<String>::new())
            .validate()
            .is_err());
        assert!(DecodeConfig::default()
            .with_ffmpeg_commands([" "])
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config =
            DecodeConfig::from_json_str(r#"{ "backends": ["raw"], "probe_strategy": "sniff" }"#)
                .unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.backends, Some(vec!["raw".to_string()]));
        assert_eq!(config.probe_strategy, ProbeStrategy::Sniff);
        assert_eq!(config.ffmpeg, FfmpegConfig::default());
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        let err = DecodeConfig::from_json_str(r#"{ "block_size": 0 }"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidConfig(_)));

        let err = DecodeConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidConfig(_)));
    }

    #[test]
    fn test_json_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decode.json");
        let config = DecodeConfig::default().with_block_size(1024);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = DecodeConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DecodeConfig::from_json_file("/nonexistent/decode.json").unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
