use std::collections::HashMap;

use tracing::{debug, info};

use crate::aggregator::InstrumentBuffer;
use crate::config::DetectorConfig;
use crate::types::{AggregatedSample, RobotEvent, RobotKey, RobotState};

// ── Lot grouping ──

/// Timestamps of the samples whose size landed near `lot_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotBucket {
    pub lot_size: u64,
    pub timestamps: Vec<i64>,
}

/// Greedy grouping: each sample joins the first open bucket (in opening order)
/// whose lot is within `tolerance`, otherwise it opens a bucket of its own.
pub fn group_by_lot(samples: &[AggregatedSample], tolerance: u64) -> Vec<LotBucket> {
    let mut buckets: Vec<LotBucket> = Vec::new();
    for sample in samples {
        match buckets
            .iter_mut()
            .find(|bucket| bucket.lot_size.abs_diff(sample.quantity) <= tolerance)
        {
            Some(bucket) => bucket.timestamps.push(sample.timestamp_ms),
            None => buckets.push(LotBucket {
                lot_size: sample.quantity,
                timestamps: vec![sample.timestamp_ms],
            }),
        }
    }
    buckets
}

// ── Interval statistics ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalStats {
    pub mean_ms: f64,
    pub std_dev_ms: f64,
}

impl IntervalStats {
    /// Mean and deviation of consecutive differences. `None` below two timestamps.
    pub fn from_timestamps(timestamps: &[i64]) -> Option<Self> {
        if timestamps.len() < 2 {
            return None;
        }
        let diffs: Vec<f64> = timestamps.windows(2).map(|w| w[1].saturating_sub(w[0]) as f64).collect();
        let n = diffs.len() as f64;
        let mean_ms = diffs.iter().sum::<f64>() / n;
        let variance = diffs.iter().map(|d| (d - mean_ms) * (d - mean_ms)).sum::<f64>() / n;
        Some(Self {
            mean_ms,
            std_dev_ms: variance.sqrt(),
        })
    }

    pub fn coefficient_of_variation(&self) -> Option<f64> {
        if self.mean_ms == 0.0 {
            None
        } else {
            Some(self.std_dev_ms / self.mean_ms)
        }
    }

    pub fn is_regular(&self, cv_tolerance: f64) -> bool {
        self.coefficient_of_variation()
            .is_some_and(|cv| cv <= cv_tolerance)
    }

    pub fn interval_secs(&self) -> i64 {
        (self.mean_ms / 1000.0).round() as i64
    }
}

// ── Registry ──

/// Active robots, indexed by instrument then lot so that timeout sweeps only
/// touch the instrument being evaluated.
#[derive(Debug, Default)]
pub struct RobotRegistry {
    robots: HashMap<String, HashMap<u64, RobotState>>,
}

impl RobotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RobotKey) -> Option<&RobotState> {
        self.robots.get(&key.instrument_id)?.get(&key.lot_size)
    }

    pub fn get_mut(&mut self, key: &RobotKey) -> Option<&mut RobotState> {
        self.robots.get_mut(&key.instrument_id)?.get_mut(&key.lot_size)
    }

    pub fn contains(&self, key: &RobotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, state: RobotState) {
        self.robots
            .entry(state.instrument_id.clone())
            .or_default()
            .insert(state.lot_size, state);
    }

    /// Removes robots of `instrument_id` whose last tick is more than
    /// `timeout_ms` before `latest_ms`, returning them.
    pub fn evict_stale(&mut self, instrument_id: &str, latest_ms: i64, timeout_ms: i64) -> Vec<RobotState> {
        let Some(lots) = self.robots.get_mut(instrument_id) else {
            return Vec::new();
        };
        let stale: Vec<u64> = lots
            .iter()
            .filter(|(_, state)| latest_ms.saturating_sub(state.last_tick_ms) > timeout_ms)
            .map(|(lot, _)| *lot)
            .collect();
        let evicted: Vec<RobotState> = stale.iter().filter_map(|lot| lots.remove(lot)).collect();
        if lots.is_empty() {
            self.robots.remove(instrument_id);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.robots.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    pub fn for_instrument<'a>(&'a self, instrument_id: &str) -> impl Iterator<Item = &'a RobotState> + 'a {
        self.robots.get(instrument_id).into_iter().flat_map(|lots| lots.values())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RobotState> {
        self.robots.values().flat_map(|lots| lots.values())
    }
}

// ── Detector ──

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorCounts {
    pub created: u64,
    pub refreshed: u64,
    pub evicted: u64,
}

pub struct RobotDetector {
    registry: RobotRegistry,
    min_series_length: usize,
    recent_window: usize,
    lot_tolerance: u64,
    interval_cv_tolerance: f64,
    robot_timeout_ms: i64,
    counts: DetectorCounts,
}

impl RobotDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            registry: RobotRegistry::new(),
            min_series_length: config.min_series_length,
            recent_window: config.recent_window,
            lot_tolerance: config.lot_tolerance,
            interval_cv_tolerance: config.interval_cv_tolerance,
            robot_timeout_ms: config.robot_timeout_ms,
            counts: DetectorCounts::default(),
        }
    }

    pub fn registry(&self) -> &RobotRegistry {
        &self.registry
    }

    pub fn counts(&self) -> DetectorCounts {
        self.counts
    }

    /// Evaluates the newest `recent_window` samples of `buffer`.
    pub fn evaluate(&mut self, instrument_id: &str, ticker: &str, buffer: &InstrumentBuffer) -> Option<RobotEvent> {
        let window: Vec<AggregatedSample> = buffer.recent(self.recent_window).copied().collect();
        self.evaluate_window(instrument_id, ticker, &window)
    }

    /// Runs one detection round over an already-windowed, oldest-first slice.
    ///
    /// Stale robots of the instrument are evicted first. Only the first lot
    /// bucket that passes the regularity test touches the registry; later
    /// buckets wait for the next tick. Returns an event only for a new robot.
    pub fn evaluate_window(
        &mut self,
        instrument_id: &str,
        ticker: &str,
        window: &[AggregatedSample],
    ) -> Option<RobotEvent> {
        let latest_ms = window.last()?.timestamp_ms;

        for state in self.registry.evict_stale(instrument_id, latest_ms, self.robot_timeout_ms) {
            self.counts.evicted += 1;
            debug!(
                ticker = %state.ticker,
                lot = state.lot_size,
                silent_ms = latest_ms.saturating_sub(state.last_tick_ms),
                "robot timed out"
            );
        }

        for bucket in group_by_lot(window, self.lot_tolerance) {
            if bucket.timestamps.len() < self.min_series_length {
                continue;
            }
            let Some(stats) = IntervalStats::from_timestamps(&bucket.timestamps) else {
                continue;
            };
            if !stats.is_regular(self.interval_cv_tolerance) {
                continue;
            }

            let interval_secs = stats.interval_secs();
            let last_tick_ms = *bucket.timestamps.last()?;
            let key = RobotKey::new(instrument_id, bucket.lot_size);

            if let Some(state) = self.registry.get_mut(&key) {
                state.interval_secs = interval_secs;
                state.last_tick_ms = last_tick_ms;
                self.counts.refreshed += 1;
                debug!(ticker, lot = bucket.lot_size, interval_secs, "robot refreshed");
                return None;
            }

            self.registry.insert(RobotState {
                instrument_id: instrument_id.to_string(),
                ticker: ticker.to_string(),
                lot_size: bucket.lot_size,
                interval_secs,
                first_detected_ms: last_tick_ms,
                last_tick_ms,
            });
            self.counts.created += 1;
            info!(ticker, lot = bucket.lot_size, interval_secs, "robot detected");

            return Some(RobotEvent {
                instrument_id: instrument_id.to_string(),
                ticker: ticker.to_string(),
                interval_secs,
                lot_size: bucket.lot_size,
                lot_tolerance: self.lot_tolerance,
                last_tick_ms,
            });
        }

        None
    }
}
