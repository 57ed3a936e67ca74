//! Pool and slab store configuration
//!
//! Every knob has a default, so an empty file (or no file at all) is a valid
//! configuration. Values are layered as: defaults → TOML file → `BUFPOOL_*`
//! environment variables, e.g. `BUFPOOL_POOL__SERVE_PERCENTILE=0.8`.

use crate::error::{Error, Result};
use crate::slab::size_class::{MAX_POOL_SIZE, MIN_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Percentile of observed sizes used as the serve size
pub const DEFAULT_SERVE_PERCENTILE: f64 = 0.9;

/// Percentile of observed sizes used as the discard ceiling
pub const DEFAULT_DISCARD_PERCENTILE: f64 = 0.95;

/// Observations of a single class that trigger calibration
pub const CALIBRATE_CALLS_THRESHOLD: u64 = 42_000;

/// Serve size before anything has been observed
pub const DEFAULT_SIZE: usize = 4096;

/// Idle buffers kept per size class
pub const DEFAULT_MAX_FREE_PER_CLASS: usize = 1024;

/// Adaptive pool tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Fraction of observations the serve size must cover
    pub serve_percentile: f64,
    /// Fraction of observations the discard ceiling must cover
    pub discard_percentile: f64,
    /// Per-class observation count that triggers calibration
    pub calibrate_threshold: u64,
    /// Serve size before the first observation
    pub default_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            serve_percentile: DEFAULT_SERVE_PERCENTILE,
            discard_percentile: DEFAULT_DISCARD_PERCENTILE,
            calibrate_threshold: CALIBRATE_CALLS_THRESHOLD,
            default_size: DEFAULT_SIZE,
        }
    }
}

impl PoolConfig {
    /// Replace unusable percentiles.
    ///
    /// Non-positive or non-finite values fall back to the defaults, values
    /// above 1.0 are clamped to 1.0. A zero threshold becomes the default.
    pub fn normalized(mut self) -> Self {
        self.serve_percentile = normalize_percentile(
            "serve_percentile",
            self.serve_percentile,
            DEFAULT_SERVE_PERCENTILE,
        );
        self.discard_percentile = normalize_percentile(
            "discard_percentile",
            self.discard_percentile,
            DEFAULT_DISCARD_PERCENTILE,
        );
        if self.calibrate_threshold == 0 {
            warn!(
                default = CALIBRATE_CALLS_THRESHOLD,
                "calibrate_threshold of 0 replaced with default"
            );
            self.calibrate_threshold = CALIBRATE_CALLS_THRESHOLD;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.calibrate_threshold == 0 {
            return Err(Error::InvalidArgument(
                "pool.calibrate_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn normalize_percentile(name: &str, value: f64, default: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        warn!(setting = name, value, default, "percentile out of range, using default");
        default
    } else if value > 1.0 {
        warn!(setting = name, value, "percentile above 1.0, clamping");
        1.0
    } else {
        value
    }
}

/// Slab store limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest buffer capacity retained for reuse
    pub max_pool_size: usize,
    /// Idle buffers kept per size class
    pub max_free_per_class: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_pool_size: MAX_POOL_SIZE,
            max_free_per_class: DEFAULT_MAX_FREE_PER_CLASS,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.max_pool_size < MIN_SIZE {
            return Err(Error::InvalidArgument(format!(
                "store.max_pool_size {} is below the minimum class size {}",
                self.max_pool_size, MIN_SIZE
            )));
        }
        if self.max_free_per_class == 0 {
            return Err(Error::InvalidArgument(
                "store.max_free_per_class must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufpoolConfig {
    pub store: StoreConfig,
    pub pool: PoolConfig,
}

impl BufpoolConfig {
    /// Load from an optional TOML file plus `BUFPOOL_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("BUFPOOL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to read configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid TOML configuration: {}", e)))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check limits that cannot be repaired silently
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.pool.validate()
    }
}
