//! Configuration structures for the conversion pipeline.

use serde::{Deserialize, Serialize};

use super::money::RoundingPolicy;
use crate::numbers::NumberLocale;

/// Main configuration for txscan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TxscanConfig {
    /// Extraction configuration.
    pub extraction: ExtractionConfig,

    /// Output configuration.
    pub output: OutputConfig,

    /// Batch processing configuration.
    pub batch: BatchConfig,
}

/// Extraction engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Number format used when a rule table declares none.
    pub default_locale: NumberLocale,

    /// Rounding used by reconciliation when a rule table declares none.
    pub default_rounding: RoundingPolicy,

    /// Accept any captured security reference with an identifier instead of
    /// requiring a catalog entry.
    pub create_missing_securities: bool,

    /// Keep discarded items in the output.
    pub keep_discarded: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            default_locale: NumberLocale::GERMAN,
            default_rounding: RoundingPolicy::HalfUp,
            create_missing_securities: true,
            keep_discarded: false,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pretty-print JSON output.
    pub pretty: bool,

    /// Include failed items in per-document output files.
    pub include_failed: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            include_failed: true,
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of documents parsed concurrently.
    pub jobs: usize,

    /// Keep going when a document cannot be read.
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            continue_on_error: true,
        }
    }
}

impl TxscanConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TxscanConfig =
            serde_json::from_str(r#"{"extraction": {"default_rounding": "half_down"}}"#).unwrap();
        assert_eq!(config.extraction.default_rounding, RoundingPolicy::HalfDown);
        assert_eq!(config.extraction.default_locale, NumberLocale::GERMAN);
        assert_eq!(config.batch.jobs, 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = TxscanConfig::default();
        config.extraction.keep_discarded = true;
        config.save(&path).unwrap();

        let loaded = TxscanConfig::from_file(&path).unwrap();
        assert!(loaded.extraction.keep_discarded);
    }
}
