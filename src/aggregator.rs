//! Per-instrument tick buffering.
//!
//! Ticks closer than the aggregation window to the previous sample are folded
//! into it, and samples older than the retention horizon are dropped from the
//! front on every insert.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::config::DetectorConfig;
use crate::types::{AggregatedSample, Tick};

#[derive(Debug, Clone, Default)]
pub struct InstrumentBuffer {
    samples: VecDeque<AggregatedSample>,
}

impl InstrumentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tick, merging it into the last sample when it falls inside
    /// `aggregation_window_ms`. Returns `true` when the tick was merged.
    ///
    /// A merged sample takes the tick's timestamp. A tick that arrives out of
    /// order never moves the sample back in time: the later of the two wins.
    /// Merged quantities saturate at `u64::MAX`.
    pub fn push(&mut self, timestamp_ms: i64, quantity: u64, aggregation_window_ms: i64) -> bool {
        if let Some(last) = self.samples.back_mut() {
            if timestamp_ms.saturating_sub(last.timestamp_ms) <= aggregation_window_ms {
                last.timestamp_ms = last.timestamp_ms.max(timestamp_ms);
                last.quantity = last.quantity.saturating_add(quantity);
                return true;
            }
        }
        self.samples.push_back(AggregatedSample { timestamp_ms, quantity });
        false
    }

    /// Drops leading samples strictly older than `cutoff_ms`. Returns how many were removed.
    pub fn trim_before(&mut self, cutoff_ms: i64) -> usize {
        let mut removed = 0;
        while let Some(front) = self.samples.front() {
            if front.timestamp_ms < cutoff_ms {
                self.samples.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &AggregatedSample> {
        self.samples.iter()
    }

    /// The newest `count` samples, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &AggregatedSample> {
        self.samples.iter().skip(self.samples.len().saturating_sub(count))
    }

    pub fn latest(&self) -> Option<&AggregatedSample> {
        self.samples.back()
    }
}

pub struct TickAggregator {
    buffers: HashMap<String, InstrumentBuffer>,
    min_lot: u64,
    aggregation_window_ms: i64,
    time_window_ms: i64,
}

impl TickAggregator {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            buffers: HashMap::new(),
            min_lot: config.min_lot,
            aggregation_window_ms: config.aggregation_window_ms,
            time_window_ms: config.time_window_ms,
        }
    }

    /// Buffers one tick and trims the instrument's buffer against `now_ms`.
    ///
    /// Returns `None` when the tick is below the minimum lot and was dropped;
    /// the buffer is left untouched in that case.
    pub fn ingest(&mut self, tick: &Tick, now_ms: i64) -> Option<&InstrumentBuffer> {
        if tick.quantity < self.min_lot {
            trace!(instrument = %tick.instrument_id, quantity = tick.quantity, "below min lot, dropped");
            return None;
        }

        let buffer = self.buffers.entry(tick.instrument_id.clone()).or_default();
        buffer.push(tick.timestamp_ms, tick.quantity, self.aggregation_window_ms);
        buffer.trim_before(now_ms.saturating_sub(self.time_window_ms));
        Some(buffer)
    }

    pub fn buffer(&self, instrument_id: &str) -> Option<&InstrumentBuffer> {
        self.buffers.get(instrument_id)
    }

    pub fn instruments(&self) -> impl Iterator<Item = (&String, &InstrumentBuffer)> {
        self.buffers.iter()
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffers.values().map(InstrumentBuffer::len).sum()
    }
}
