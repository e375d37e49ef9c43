//! Serializable pipeline configuration.
//!
//! Loaded from TOML; every section is optional and falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use stockprep_core::clean::{DedupPolicy, MissingDataPolicy};
use stockprep_core::data::IngestConfig;
use thiserror::Error;

/// Content hash of a configuration, recorded alongside run artifacts.
pub type ConfigFingerprint = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full configuration for one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub dedupe: DedupPolicy,
    pub missing: MissingDataPolicy,
}

impl PipelineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.ingest.max_error_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::Invalid(format!(
                "ingest.max_error_rate must be within [0, 1], got {rate}"
            )));
        }
        if self.ingest.date_formats.is_empty() {
            return Err(ConfigError::Invalid(
                "ingest.date_formats must not be empty".into(),
            ));
        }
        if self.missing.unknown_sector.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "missing.unknown_sector must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two configs that deserialize to the same values share a fingerprint,
    /// regardless of TOML formatting or omitted defaults.
    pub fn fingerprint(&self) -> Result<ConfigFingerprint, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
