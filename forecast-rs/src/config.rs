//! Run configuration, loaded from TOML.

use crate::features::FeatureConfig;
use crate::smoothing::validate_alpha;
use crate::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smoothing applied to every raw history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Weight of the newest value, within [0, 1]
    pub alpha: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: 0.3 }
    }
}

/// What to do with a record that cannot be turned into features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Abort the run, naming the offending line.
    #[default]
    FailFast,
    /// Log a warning and leave the record out of the output.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    pub policy: RecordPolicy,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub smoothing: SmoothingConfig,
    pub features: FeatureConfig,
    pub records: RecordConfig,
}

impl ForecastConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ForecastError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ForecastError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that would fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.smoothing.alpha)?;
        crate::features::FeatureLayout::new(&self.features)?;
        Ok(())
    }
}
