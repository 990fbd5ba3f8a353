use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::shared::constants::{DEFAULT_TRAINING_DIR, DEFAULT_UPLOADS_DIR};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("confidence must be between 0.0 and 1.0, got {0}")]
    Confidence(f64),
}

/// Settings for one archive, loaded from a JSON file.
///
/// ```json
/// { "database": "piwigo.sqlite", "training_dir": "training", "confidence": 0.5 }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// SQLite database holding images, tags and face positions.
    pub database: PathBuf,
    #[serde(default)]
    pub training_dir: Option<PathBuf>,
    #[serde(default)]
    pub uploads_dir: Option<PathBuf>,
    /// Detector confidence threshold.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Use this detection model instead of the cached download.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

impl ArchiveConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(c) = config.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(ConfigError::Confidence(c));
            }
        }
        Ok(config)
    }

    pub fn training_dir_or_default(&self) -> PathBuf {
        self.training_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRAINING_DIR))
    }

    pub fn uploads_dir_or_default(&self) -> PathBuf {
        self.uploads_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR))
    }
}
