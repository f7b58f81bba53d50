//! Configuration types and defaults for the bridge.
//!
//! This module defines the configuration options for the resource tracker
//! and the memory pressure monitor, including thresholds, capacity ceilings,
//! and feature flags.

use serde::{Deserialize, Serialize};

/// Default leak-candidate age threshold (60 seconds)
pub const DEFAULT_LEAK_THRESHOLD_MS: u64 = 60_000;

/// Default maximum number of tracked resources
pub const DEFAULT_MAX_TRACKED_RESOURCES: usize = 1_000;

/// Default memory sampling interval (5 seconds)
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 5_000;

/// Default heap budget used as the pressure-ratio denominator (512 MB)
pub const DEFAULT_HEAP_LIMIT_BYTES: u64 = 512 * 1024 * 1024;

/// Default minimum delay between cleanup rounds (30 seconds)
pub const DEFAULT_CLEANUP_COOLDOWN_MS: u64 = 30_000;

/// Default number of samples in the trend window
pub const DEFAULT_TREND_WINDOW: usize = 12;

/// Default sustained growth rate treated as a leak signal (1 MB/s)
pub const DEFAULT_GROWTH_THRESHOLD_BYTES_PER_SEC: f64 = 1024.0 * 1024.0;

/// Default minimum regression fit for the leak signal
pub const DEFAULT_MIN_TREND_CONFIDENCE: f64 = 0.8;

/// Configuration for the resource tracker
///
/// Fixed at tracker construction; a tracker never changes configuration
/// mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Capture a stack trace at registration for leak reports (default: false)
    #[serde(default)]
    pub capture_stack_traces: bool,

    /// Enable age-based leak-candidate detection (default: true)
    #[serde(default = "default_true")]
    pub enable_leak_detection: bool,

    /// Age beyond which an un-disposed resource is a leak candidate
    #[serde(default = "default_leak_threshold")]
    pub leak_threshold_ms: u64,

    /// Soft ceiling on concurrently tracked resources
    #[serde(default = "default_max_tracked")]
    pub max_tracked_resources: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capture_stack_traces: false,
            enable_leak_detection: true,
            leak_threshold_ms: DEFAULT_LEAK_THRESHOLD_MS,
            max_tracked_resources: DEFAULT_MAX_TRACKED_RESOURCES,
        }
    }
}

impl TrackerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable stack capture
    pub fn with_stack_traces(mut self, enable: bool) -> Self {
        self.capture_stack_traces = enable;
        self
    }

    /// Enable or disable leak detection
    pub fn with_leak_detection(mut self, enable: bool) -> Self {
        self.enable_leak_detection = enable;
        self
    }

    /// Set the leak-candidate age threshold
    pub fn with_leak_threshold_ms(mut self, ms: u64) -> Self {
        self.leak_threshold_ms = ms;
        self
    }

    /// Set the tracked-resource ceiling
    pub fn with_max_tracked_resources(mut self, max: usize) -> Self {
        self.max_tracked_resources = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.leak_threshold_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "leak_threshold_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_tracked_resources == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tracked_resources".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration for the memory pressure monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Sampling interval in milliseconds
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Heap budget used as the denominator of the pressure ratio
    #[serde(default = "default_heap_limit")]
    pub heap_limit_bytes: u64,

    /// Ratio at which pressure becomes moderate
    #[serde(default = "default_moderate_ratio")]
    pub moderate_ratio: f64,

    /// Ratio at which pressure becomes high
    #[serde(default = "default_high_ratio")]
    pub high_ratio: f64,

    /// Ratio at which pressure becomes critical
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,

    /// Absolute RSS ceiling; crossing it is immediately critical
    #[serde(default)]
    pub rss_ceiling_bytes: Option<u64>,

    /// Minimum delay between cleanup rounds
    #[serde(default = "default_cleanup_cooldown")]
    pub cleanup_cooldown_ms: u64,

    /// Number of samples kept for trend analysis
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,

    /// Sustained heap growth rate reported as a leak signal
    #[serde(default = "default_growth_threshold")]
    pub growth_threshold_bytes_per_sec: f64,

    /// Minimum regression fit (r-squared) for the leak signal
    #[serde(default = "default_min_confidence")]
    pub min_trend_confidence: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            heap_limit_bytes: DEFAULT_HEAP_LIMIT_BYTES,
            moderate_ratio: 0.70,
            high_ratio: 0.85,
            critical_ratio: 0.95,
            rss_ceiling_bytes: None,
            cleanup_cooldown_ms: DEFAULT_CLEANUP_COOLDOWN_MS,
            trend_window: DEFAULT_TREND_WINDOW,
            growth_threshold_bytes_per_sec: DEFAULT_GROWTH_THRESHOLD_BYTES_PER_SEC,
            min_trend_confidence: DEFAULT_MIN_TREND_CONFIDENCE,
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling interval
    pub fn with_sample_interval_ms(mut self, ms: u64) -> Self {
        self.sample_interval_ms = ms;
        self
    }

    /// Set the heap budget
    pub fn with_heap_limit(mut self, bytes: u64) -> Self {
        self.heap_limit_bytes = bytes;
        self
    }

    /// Set the pressure thresholds
    pub fn with_thresholds(mut self, moderate: f64, high: f64, critical: f64) -> Self {
        self.moderate_ratio = moderate;
        self.high_ratio = high;
        self.critical_ratio = critical;
        self
    }

    /// Set the absolute RSS ceiling
    pub fn with_rss_ceiling(mut self, bytes: u64) -> Self {
        self.rss_ceiling_bytes = Some(bytes);
        self
    }

    /// Set the cleanup cooldown
    pub fn with_cleanup_cooldown_ms(mut self, ms: u64) -> Self {
        self.cleanup_cooldown_ms = ms;
        self
    }

    /// Set the trend window size
    pub fn with_trend_window(mut self, samples: usize) -> Self {
        self.trend_window = samples;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sample_interval_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.heap_limit_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "heap_limit_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        let ordered = self.moderate_ratio > 0.0
            && self.moderate_ratio < self.high_ratio
            && self.high_ratio < self.critical_ratio
            && self.critical_ratio <= 1.0;
        if !ordered {
            return Err(ConfigError::InvalidValue {
                field: "pressure ratios".into(),
                reason: "must satisfy 0 < moderate < high < critical <= 1".into(),
            });
        }

        if self.trend_window < 2 {
            return Err(ConfigError::InvalidValue {
                field: "trend_window".into(),
                reason: "must hold at least 2 samples".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.min_trend_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "min_trend_confidence".into(),
                reason: "must be between 0 and 1".into(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field name
        field: String,
        /// The reason it's invalid
        reason: String,
    },

    /// Missing required field
    #[error("Missing required configuration field: {field}")]
    MissingField {
        /// The field name
        field: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_leak_threshold() -> u64 {
    DEFAULT_LEAK_THRESHOLD_MS
}

fn default_max_tracked() -> usize {
    DEFAULT_MAX_TRACKED_RESOURCES
}

fn default_sample_interval() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_MS
}

fn default_heap_limit() -> u64 {
    DEFAULT_HEAP_LIMIT_BYTES
}

fn default_moderate_ratio() -> f64 {
    0.70
}

fn default_high_ratio() -> f64 {
    0.85
}

fn default_critical_ratio() -> f64 {
    0.95
}

fn default_cleanup_cooldown() -> u64 {
    DEFAULT_CLEANUP_COOLDOWN_MS
}

fn default_trend_window() -> usize {
    DEFAULT_TREND_WINDOW
}

fn default_growth_threshold() -> f64 {
    DEFAULT_GROWTH_THRESHOLD_BYTES_PER_SEC
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_TREND_CONFIDENCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tracker_config() {
        let config = TrackerConfig::default();
        assert!(!config.capture_stack_traces);
        assert!(config.enable_leak_detection);
        assert_eq!(config.leak_threshold_ms, DEFAULT_LEAK_THRESHOLD_MS);
        assert_eq!(config.max_tracked_resources, DEFAULT_MAX_TRACKED_RESOURCES);
    }

    #[test]
    fn test_tracker_config_builder() {
        let config = TrackerConfig::new()
            .with_stack_traces(true)
            .with_leak_threshold_ms(100)
            .with_max_tracked_resources(2);

        assert!(config.capture_stack_traces);
        assert_eq!(config.leak_threshold_ms, 100);
        assert_eq!(config.max_tracked_resources, 2);
    }

    #[test]
    fn test_tracker_config_validation() {
        let invalid = TrackerConfig::new().with_max_tracked_resources(0);
        assert!(invalid.validate().is_err());

        let invalid = TrackerConfig::new().with_leak_threshold_ms(0);
        assert!(invalid.validate().is_err());

        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_monitor_config_validation() {
        assert!(MonitorConfig::default().validate().is_ok());

        let unordered = MonitorConfig::new().with_thresholds(0.9, 0.8, 0.95);
        assert!(unordered.validate().is_err());

        let mut tiny_window = MonitorConfig::default();
        tiny_window.trend_window = 1;
        assert!(tiny_window.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = TrackerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("leakThresholdMs"));
        let parsed: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.leak_threshold_ms, config.leak_threshold_ms);
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let parsed: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.enable_leak_detection);
        assert_eq!(parsed.max_tracked_resources, DEFAULT_MAX_TRACKED_RESOURCES);
    }
}
