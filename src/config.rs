//! Service configuration module.
//!
//! Handles loading, validating, and merging `thumber.toml`. Stock defaults
//! are the base layer; a user file overrides just the keys it names.
//!
//! ## Config File Location
//!
//! The first of these that exists is used:
//!
//! ```text
//! --config <file>        # explicit path (must exist)
//! ./thumber.toml         # working directory
//! /etc/thumber.toml      # system-wide
//! ```
//!
//! With none of them present the stock defaults are used as-is.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [font]
//! names = []                       # Font candidates for text, first match wins
//!
//! [http]
//! avoid_chunk = false              # Send Content-Length instead of chunking
//! user_agent = "thumber"           # User-Agent for upstream fetches
//!
//! [image]
//! background_color = "#ffffff"     # Margin / flatten color
//! compression_quality = 90         # Default quality (0-100)
//! gravity = 5                      # Default gravity (0 = unset, 1-9)
//! crop_mode = 0                    # Default crop mode (0 fit, 1 crop, 2 margin)
//!
//! [limits]
//! max_dimension = 65000            # Largest accepted w or h
//! max_pixels = 10000000            # Largest accepted w*h and source size
//!
//! [processing]
//! max_processes = 4                # Max parallel engine workers (omit for auto)
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! The loaded [`ServiceConfig`] is a plain value: request parsing takes it
//! by reference, nothing reads it from global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "thumber.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/thumber.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `thumber.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Fonts tried for text annotation.
    pub font: FontConfig,
    /// Settings for the serving layer.
    pub http: HttpConfig,
    /// Request defaults.
    pub image: ImageConfig,
    /// Request size ceilings.
    pub limits: LimitsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.compression_quality > 100 {
            return Err(ConfigError::Validation(
                "image.compression_quality must be 0-100".into(),
            ));
        }
        if !(0..=9).contains(&self.image.gravity) {
            return Err(ConfigError::Validation(
                "image.gravity must be 0-9".into(),
            ));
        }
        if !(0..=2).contains(&self.image.crop_mode) {
            return Err(ConfigError::Validation(
                "image.crop_mode must be 0, 1 or 2".into(),
            ));
        }
        if self.image.background_color.is_empty() {
            return Err(ConfigError::Validation(
                "image.background_color must not be empty".into(),
            ));
        }
        if self.limits.max_dimension == 0 || self.limits.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "limits.max_dimension and limits.max_pixels must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Text annotation fonts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    /// Font names in order of preference. Empty uses the engine's defaults.
    pub names: Vec<String>,
}

/// Settings for the HTTP serving layer that embeds this crate.
///
/// Nothing in the CLI reads these; they are parsed and validated here so a
/// server can share the same `thumber.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Buffer the whole response and send Content-Length.
    pub avoid_chunk: bool,
    /// User-Agent header for upstream fetches.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            avoid_chunk: false,
            user_agent: format!("thumber/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Defaults applied to every request before its parameters are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Margin fill and flatten background.
    pub background_color: String,
    /// Lossy encoding quality (0 = worst, 100 = best).
    pub compression_quality: u32,
    /// Gravity code, 0 for unset.
    pub gravity: i64,
    /// 0 fit, 1 crop, 2 margin.
    pub crop_mode: i64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_string(),
            compression_quality: 90,
            gravity: 5,
            crop_mode: 0,
        }
    }
}

/// Request and source size ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted target width or height.
    pub max_dimension: u32,
    /// Largest accepted target area, and largest accepted source area.
    pub max_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: 65_000,
            max_pixels: 10_000_000,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of concurrent engine invocations.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ServiceConfig::default())?)
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

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServiceConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// The config file that [`load_config`] would read, if any.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from(SYSTEM_CONFIG_PATH)]
        .into_iter()
        .find(|p| p.is_file())
}

/// Load the service config.
///
/// An explicit path must exist. Otherwise the standard locations are tried
/// and stock defaults are used when none exists. User values are merged on
/// top of stock defaults, unknown keys are rejected, and the result is
/// validated.
pub fn load_config(explicit: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = match find_config_file(explicit) {
        Some(path) => Some(load_raw_config(&path)?),
        None => None,
    };
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `thumber.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Thumber Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Looked up as ./thumber.toml, then /etc/thumber.toml, unless --config is given.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Text annotation
# ---------------------------------------------------------------------------
[font]
# Font names tried in order for the `t` parameter; the first one the engine
# knows is used. Overridden per request by `tf`.
names = []

# ---------------------------------------------------------------------------
# Serving layer
# ---------------------------------------------------------------------------
[http]
# Buffer the whole thumbnail and send Content-Length instead of chunking.
avoid_chunk = false

# User-Agent header for upstream image fetches.
# user_agent = "thumber/<version>"

# ---------------------------------------------------------------------------
# Request defaults
# ---------------------------------------------------------------------------
[image]
# Background for margin mode and for flattening transparency (`bg`).
background_color = "#ffffff"

# Lossy encoding quality, 0 = worst, 100 = best (`q`).
compression_quality = 90

# Gravity 1-9 (numpad layout), 0 = unset (`g`).
gravity = 5

# 0 = fit, 1 = crop, 2 = margin (`cm`).
crop_mode = 0

# ---------------------------------------------------------------------------
# Limits
# ---------------------------------------------------------------------------
[limits]
# Largest accepted target width or height.
max_dimension = 65000

# Largest accepted target area (w*h) and source image area.
max_pixels = 10000000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum concurrent pixel-engine workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
