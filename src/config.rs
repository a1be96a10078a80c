//! Transformation configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TransformError};
use crate::types::MediaRange;

/// Report progress on every change
pub const GRANULARITY_NONE: u32 = 0;

/// Report progress in 1% steps
pub const GRANULARITY_DEFAULT: u32 = 100;

/// Per-job options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationOptions {
    /// Number of progress steps reported over a job, `GRANULARITY_NONE` for every change
    pub granularity: u32,

    /// Trim selection of the source media
    pub source_media_range: MediaRange,

    /// Safety margin added to the estimated output size, as a fraction
    pub disk_space_padding: f64,

    /// Refuse to start when the output volume is too small for the estimate
    pub check_disk_space: bool,

    /// Dequeue timeout for decoder slots in microseconds
    pub decoder_timeout_us: i64,

    /// Dequeue timeout for encoder slots in microseconds
    pub encoder_timeout_us: i64,
}

impl Default for TransformationOptions {
    fn default() -> Self {
        Self {
            granularity: GRANULARITY_DEFAULT,
            source_media_range: MediaRange::whole(),
            disk_space_padding: 0.10,
            check_disk_space: true,
            decoder_timeout_us: 10_000,
            encoder_timeout_us: 10_000,
        }
    }
}

impl TransformationOptions {
    /// Minimum progress delta between two reports, `None` when every change is reported
    pub fn progress_step(&self) -> Option<f32> {
        match self.granularity {
            GRANULARITY_NONE => None,
            g => Some(1.0 / g as f32),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.source_media_range.is_valid() {
            return Err(TransformError::InvalidMediaRange {
                start_us: self.source_media_range.start,
                end_us: self.source_media_range.end,
            });
        }
        if !(self.disk_space_padding >= 0.0) {
            return Err(TransformError::Config(format!(
                "disk_space_padding must be non-negative, got {}",
                self.disk_space_padding
            )));
        }
        if self.decoder_timeout_us < 0 || self.encoder_timeout_us < 0 {
            return Err(TransformError::Config("dequeue timeouts must be non-negative".into()));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "transcode_core=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Transformer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Jobs allowed to run at the same time
    pub max_concurrent_jobs: usize,

    /// Options used when a request does not bring its own
    pub options: TransformationOptions,

    pub logging: LoggingConfig,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            options: TransformationOptions::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TransformerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TransformerConfig =
            toml::from_str(&content).map_err(|e| TransformError::Config(e.to_string()))?;
        config.options.validate()?;
        if config.max_concurrent_jobs == 0 {
            return Err(TransformError::Config("max_concurrent_jobs must be at least 1".into()));
        }
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TransformError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
