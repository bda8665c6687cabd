use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

// ── Input Types (delivered by the feed) ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_id: String,
    pub timestamp_ms: i64,
    pub quantity: u64,
}

impl Tick {
    pub fn new(instrument_id: impl Into<String>, timestamp_ms: i64, quantity: u64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp_ms,
            quantity,
        }
    }
}

/// One buffered sample: a tick, or a run of ticks merged inside the aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregatedSample {
    pub timestamp_ms: i64,
    pub quantity: u64,
}

// ── Detection State ──

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RobotKey {
    pub instrument_id: String,
    pub lot_size: u64,
}

impl RobotKey {
    pub fn new(instrument_id: impl Into<String>, lot_size: u64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            lot_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RobotState {
    pub instrument_id: String,
    pub ticker: String,
    pub lot_size: u64,
    pub interval_secs: i64,
    pub first_detected_ms: i64,
    pub last_tick_ms: i64,
}

// ── Output Types (handed to report sinks) ──

/// Emitted once, when a robot is first detected. Refreshes of a known robot are silent.
#[derive(Debug, Clone, Serialize)]
pub struct RobotEvent {
    pub instrument_id: String,
    pub ticker: String,
    pub interval_secs: i64,
    pub lot_size: u64,
    pub lot_tolerance: u64,
    pub last_tick_ms: i64,
}

impl RobotEvent {
    /// Wall-clock `HH:MM:SS` of the triggering tick in the given zone.
    pub fn tick_time(&self, zone: FixedOffset) -> String {
        format_clock(self.last_tick_ms, zone)
    }
}

impl fmt::Display for RobotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} interval={}s lot≈{} (±{})",
            self.ticker, self.interval_secs, self.lot_size, self.lot_tolerance
        )
    }
}

/// `HH:MM:SS` of an epoch-millisecond timestamp in `zone`.
pub fn format_clock(ts_ms: i64, zone: FixedOffset) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ts_ms) {
        Some(ts) => ts.with_timezone(&zone).format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}
