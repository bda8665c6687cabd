use std::fs;
use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning constants for aggregation and detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Samples a buffer (and a lot bucket) must hold before it is evaluated.
    pub min_series_length: usize,
    /// Maximum coefficient of variation of inter-arrival intervals.
    pub interval_cv_tolerance: f64,
    /// Buffer retention horizon.
    pub time_window_ms: i64,
    /// Ticks below this quantity are ignored.
    pub min_lot: u64,
    /// Two sizes within this distance share a lot bucket.
    pub lot_tolerance: u64,
    /// Ticks this close to the previous sample are merged into it.
    pub aggregation_window_ms: i64,
    /// A robot silent for longer than this is evicted.
    pub robot_timeout_ms: i64,
    /// Only the newest N samples take part in one evaluation.
    pub recent_window: usize,
    pub display_offset_secs: i32,
    pub display_zone_label: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_series_length: 3,
            interval_cv_tolerance: 0.3,
            time_window_ms: 240_000,
            min_lot: 5,
            lot_tolerance: 0,
            aggregation_window_ms: 50,
            robot_timeout_ms: 180_000,
            recent_window: 10,
            display_offset_secs: 3 * 3600,
            display_zone_label: "MSK".to_string(),
        }
    }
}

impl DetectorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_series_length < 2 {
            return Err(ConfigError::Validation(format!(
                "min_series_length must be at least 2, got {}",
                self.min_series_length
            )));
        }
        if self.recent_window < self.min_series_length {
            return Err(ConfigError::Validation(format!(
                "recent_window ({}) must not be smaller than min_series_length ({})",
                self.recent_window, self.min_series_length
            )));
        }
        if !self.interval_cv_tolerance.is_finite() || self.interval_cv_tolerance < 0.0 {
            return Err(ConfigError::Validation(format!(
                "interval_cv_tolerance must be a finite non-negative number, got {}",
                self.interval_cv_tolerance
            )));
        }
        if self.time_window_ms <= 0 {
            return Err(ConfigError::Validation("time_window_ms must be positive".into()));
        }
        if self.robot_timeout_ms <= 0 {
            return Err(ConfigError::Validation("robot_timeout_ms must be positive".into()));
        }
        if self.aggregation_window_ms < 0 {
            return Err(ConfigError::Validation("aggregation_window_ms must not be negative".into()));
        }
        if FixedOffset::east_opt(self.display_offset_secs).is_none() {
            return Err(ConfigError::Validation(format!(
                "display_offset_secs out of range: {}",
                self.display_offset_secs
            )));
        }
        Ok(())
    }

    pub fn display_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_offset_secs).unwrap_or_else(|| Utc.fix())
    }
}
