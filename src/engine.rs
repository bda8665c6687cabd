use serde::Serialize;
use tracing::trace;

use crate::aggregator::{InstrumentBuffer, TickAggregator};
use crate::alerts::ReportSink;
use crate::config::DetectorConfig;
use crate::detection::{RobotDetector, RobotRegistry};
use crate::instruments::InstrumentDirectory;
use crate::types::{RobotEvent, Tick};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    pub ticks_seen: u64,
    pub ticks_dropped: u64,
    pub evaluations: u64,
    pub robots_created: u64,
    pub robots_refreshed: u64,
    pub robots_evicted: u64,
    pub active_robots: usize,
}

impl EngineStats {
    pub fn merge(&mut self, other: &EngineStats) {
        self.ticks_seen += other.ticks_seen;
        self.ticks_dropped += other.ticks_dropped;
        self.evaluations += other.evaluations;
        self.robots_created += other.robots_created;
        self.robots_refreshed += other.robots_refreshed;
        self.robots_evicted += other.robots_evicted;
        self.active_robots += other.active_robots;
    }
}

/// Where the processing time used for retention comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall clock, for live feeds.
    #[default]
    Wall,
    /// The latest tick timestamp this engine has seen, for recorded feeds.
    TickTime,
}

/// Owns the buffers and the robot registry for a set of instruments.
pub struct DetectionEngine {
    aggregator: TickAggregator,
    detector: RobotDetector,
    directory: InstrumentDirectory,
    min_series_length: usize,
    ticks_seen: u64,
    ticks_dropped: u64,
    evaluations: u64,
    high_water_ms: Option<i64>,
}

impl DetectionEngine {
    pub fn new(config: &DetectorConfig, directory: InstrumentDirectory) -> Self {
        Self {
            aggregator: TickAggregator::new(config),
            detector: RobotDetector::new(config),
            directory,
            min_series_length: config.min_series_length,
            ticks_seen: 0,
            ticks_dropped: 0,
            evaluations: 0,
            high_water_ms: None,
        }
    }

    /// Buffers `tick`, trimming against `now_ms`, and evaluates the instrument
    /// once its buffer holds enough samples.
    pub fn process(&mut self, tick: &Tick, now_ms: i64) -> Option<RobotEvent> {
        self.ticks_seen += 1;
        let Some(buffer) = self.aggregator.ingest(tick, now_ms) else {
            self.ticks_dropped += 1;
            return None;
        };
        if buffer.len() < self.min_series_length {
            trace!(instrument = %tick.instrument_id, samples = buffer.len(), "not enough samples");
            return None;
        }
        self.evaluations += 1;
        let ticker = self.directory.ticker_for(&tick.instrument_id);
        self.detector.evaluate(&tick.instrument_id, ticker, buffer)
    }

    pub fn process_live(&mut self, tick: &Tick) -> Option<RobotEvent> {
        self.process(tick, chrono::Utc::now().timestamp_millis())
    }

    /// Processes `tick` with the clock at the newest tick timestamp seen so far.
    /// The clock never moves backwards, so a late tick is trimmed as usual.
    pub fn process_tick_time(&mut self, tick: &Tick) -> Option<RobotEvent> {
        let now_ms = self.high_water_ms.map_or(tick.timestamp_ms, |hw| hw.max(tick.timestamp_ms));
        self.high_water_ms = Some(now_ms);
        self.process(tick, now_ms)
    }

    pub fn process_with(&mut self, tick: &Tick, clock: Clock) -> Option<RobotEvent> {
        match clock {
            Clock::Wall => self.process_live(tick),
            Clock::TickTime => self.process_tick_time(tick),
        }
    }

    /// Processes a batch and hands every creation event to `sink`. Returns the number reported.
    pub fn process_batch<S: ReportSink + ?Sized>(&mut self, ticks: &[Tick], now_ms: i64, sink: &mut S) -> usize {
        let mut reported = 0;
        for tick in ticks {
            if let Some(event) = self.process(tick, now_ms) {
                sink.report(&event);
                reported += 1;
            }
        }
        reported
    }

    pub fn buffer(&self, instrument_id: &str) -> Option<&InstrumentBuffer> {
        self.aggregator.buffer(instrument_id)
    }

    pub fn registry(&self) -> &RobotRegistry {
        self.detector.registry()
    }

    pub fn directory(&self) -> &InstrumentDirectory {
        &self.directory
    }

    pub fn buffered_samples(&self) -> usize {
        self.aggregator.buffered_samples()
    }

    pub fn tracked_instruments(&self) -> usize {
        self.aggregator.instruments().count()
    }

    pub fn stats(&self) -> EngineStats {
        let counts = self.detector.counts();
        EngineStats {
            ticks_seen: self.ticks_seen,
            ticks_dropped: self.ticks_dropped,
            evaluations: self.evaluations,
            robots_created: counts.created,
            robots_refreshed: counts.refreshed,
            robots_evicted: counts.evicted,
            active_robots: self.detector.registry().len(),
        }
    }
}
