use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::profile::{ProfileCatalogue, RecognitionProfile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Runtime settings for the recognition pipeline, supplied once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Wall-clock budget for a single profile attempt.
    pub attempt_timeout_secs: u64,
    /// Words at or below this confidence are left out of the reported word boxes.
    pub min_word_confidence: f32,
    /// Currency code attached to every extracted invoice.
    pub default_currency: String,
    pub profiles: ProfileCatalogue,
    /// Single profile used by the simplified receipt analysis.
    pub receipt_profile: RecognitionProfile,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 10,
            min_word_confidence: 30.0,
            default_currency: "COP".to_string(),
            profiles: ProfileCatalogue::default(),
            receipt_profile: RecognitionProfile::new(
                crate::profile::EngineMode::Default,
                crate::profile::SegmentationMode::SingleColumn,
                Some("spa"),
            ),
        }
    }
}

impl OcrSettings {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let settings: OcrSettings = toml::from_str(toml_content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid("attempt_timeout_secs must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.min_word_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_word_confidence {} is outside 0-100",
                self.min_word_confidence
            )));
        }
        if self.default_currency.trim().is_empty() {
            return Err(ConfigError::Invalid("default_currency is empty".into()));
        }
        Ok(())
    }
}
