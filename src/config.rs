//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `deario.toml`. Stock defaults are
//! the base layer; a user file overrides any subset of keys on top.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [images]
//! max_width = 800           # Output width cap in pixels (no enlargement)
//! jpeg_quality = 75         # Starting JPEG quality (1-100)
//! webp_quality = 75         # Starting WebP quality (1-100)
//! min_quality = 50          # Floor for the byte-budget back-off
//! quality_step = 5          # Quality decrement per retry
//! max_bytes = 614400        # Byte budget and "already small" threshold
//!
//! [storage]
//! prefix = "diary/"         # Only objects under this prefix are processed
//! extensions = ["jpg", "jpeg", "png", "webp"]
//! default_cache_control = "public, max-age=31536000"
//!
//! [trigger]
//! timeout_secs = 60         # Upload-triggered run limit
//!
//! [sweep]
//! concurrency = 5           # Objects processed at once
//! timeout_secs = 600        # Whole-sweep limit
//! page_size = 1000          # Objects per listing page
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [sweep]
//! concurrency = 2
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::NormalizeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "deario.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `deario.toml`.
///
/// All fields have defaults matching the production deployment. Unknown keys
/// are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Resize and re-encode settings.
    pub images: ImagesConfig,
    /// Which objects are in scope and what they are written back with.
    pub storage: StorageConfig,
    /// Upload-triggered processor limits.
    pub trigger: TriggerConfig,
    /// Daily sweep limits.
    pub sweep: SweepConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let images = &self.images;
        for (key, value) in [
            ("images.jpeg_quality", images.jpeg_quality),
            ("images.webp_quality", images.webp_quality),
            ("images.min_quality", images.min_quality),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!("{key} must be 1-100")));
            }
        }
        if images.min_quality > images.jpeg_quality || images.min_quality > images.webp_quality {
            return Err(ConfigError::Validation(
                "images.min_quality must not exceed the starting qualities".into(),
            ));
        }
        if images.quality_step == 0 {
            return Err(ConfigError::Validation(
                "images.quality_step must be non-zero".into(),
            ));
        }
        if images.max_width == 0 {
            return Err(ConfigError::Validation(
                "images.max_width must be non-zero".into(),
            ));
        }
        if images.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "images.max_bytes must be non-zero".into(),
            ));
        }
        if self.storage.prefix.is_empty() {
            return Err(ConfigError::Validation(
                "storage.prefix must not be empty".into(),
            ));
        }
        if self.storage.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "storage.extensions must not be empty".into(),
            ));
        }
        if self.sweep.concurrency == 0 {
            return Err(ConfigError::Validation(
                "sweep.concurrency must be non-zero".into(),
            ));
        }
        if self.sweep.page_size == 0 {
            return Err(ConfigError::Validation(
                "sweep.page_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Resize and re-encode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub max_width: u32,
    pub jpeg_quality: u32,
    pub webp_quality: u32,
    pub min_quality: u32,
    pub quality_step: u32,
    /// Byte budget for lossy output and the size-gate threshold.
    pub max_bytes: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        let engine = NormalizeConfig::default();
        Self {
            max_width: engine.max_width,
            jpeg_quality: engine.jpeg_quality,
            webp_quality: engine.webp_quality,
            min_quality: engine.min_quality,
            quality_step: engine.quality_step,
            max_bytes: engine.max_bytes,
        }
    }
}

impl ImagesConfig {
    /// Settings handed to [`crate::imaging::normalize`].
    pub fn normalize_config(&self) -> NormalizeConfig {
        NormalizeConfig {
            max_width: self.max_width,
            jpeg_quality: self.jpeg_quality,
            webp_quality: self.webp_quality,
            min_quality: self.min_quality,
            quality_step: self.quality_step,
            max_bytes: self.max_bytes,
        }
    }
}

/// Scope and write-back settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Single top-level folder; objects outside it are ignored.
    pub prefix: String,
    /// Image extensions accepted by the path filter, case-insensitive.
    pub extensions: Vec<String>,
    /// Cache-control written when an object has none.
    pub default_cache_control: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: "diary/".to_string(),
            extensions: ["jpg", "jpeg", "png", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_cache_control: "public, max-age=31536000".to_string(),
        }
    }
}

impl StorageConfig {
    /// The prefix as a folder: always exactly one trailing `/`.
    pub fn folder_prefix(&self) -> String {
        format!("{}/", self.prefix.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    pub timeout_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl TriggerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Maximum objects in flight. Not clamped to the core count.
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub page_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout_secs: 600,
            page_size: 1000,
        }
    }
}

impl SweepConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PipelineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a TOML file as a raw value.
pub fn read_raw_config(file: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(file)?;
    Ok(toml::from_str(&content)?)
}

/// Load `deario.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no `deario.toml`.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(None);
    }
    read_raw_config(&config_path).map(Some)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the pipeline config.
///
/// An explicit file must exist. Without one, `deario.toml` in `dir` is used
/// when present, and stock defaults otherwise.
pub fn load_config(dir: &Path, explicit: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let overlay = match explicit {
        Some(file) => Some(read_raw_config(file)?),
        None => load_raw_config(dir)?,
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `deario.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Deario Images Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Resize and re-encode
# ---------------------------------------------------------------------------
[images]
# Output width cap in pixels. Narrower images are never enlarged.
max_width = 800

# Starting quality for lossy formats (1 = worst, 100 = best).
jpeg_quality = 75
webp_quality = 75

# While output exceeds max_bytes, quality drops by quality_step,
# never below min_quality. PNG has no quality knob and is not retried.
min_quality = 50
quality_step = 5

# Byte budget for re-encoded output. Objects already at or below this size
# are marked without being downloaded.
max_bytes = 614400

# ---------------------------------------------------------------------------
# Storage scope
# ---------------------------------------------------------------------------
[storage]
# Only objects under this prefix are processed.
prefix = "diary/"

# Accepted image extensions (case-insensitive).
extensions = ["jpg", "jpeg", "png", "webp"]

# Cache-control written back when an object has none.
default_cache_control = "public, max-age=31536000"

# ---------------------------------------------------------------------------
# Upload trigger
# ---------------------------------------------------------------------------
[trigger]
# Seconds one upload-triggered run may take.
timeout_secs = 60

# ---------------------------------------------------------------------------
# Daily sweep
# ---------------------------------------------------------------------------
[sweep]
# Objects processed concurrently.
concurrency = 5

# Seconds the whole sweep may take.
timeout_secs = 600

# Objects per listing page.
page_size = 1000
"##
}
