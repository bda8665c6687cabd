use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;

const WINDOW_SIZE: usize = 1000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub count: usize,
}

/// Rolling latency samples: per-tick ingest, per-cycle batch, and tick-to-detection.
pub struct LatencyTracker {
    tick_latencies: VecDeque<u64>,
    cycle_latencies: VecDeque<u64>,
    detection_latencies: VecDeque<u64>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            tick_latencies: VecDeque::with_capacity(WINDOW_SIZE),
            cycle_latencies: VecDeque::with_capacity(WINDOW_SIZE),
            detection_latencies: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }

    pub fn start(&self) -> Instant {
        Instant::now()
    }

    /// Records one processed tick, rounded up to the next microsecond.
    pub fn record_tick(&mut self, start: Instant) {
        let us = start.elapsed().as_nanos().div_ceil(1_000) as u64;
        push_capped(&mut self.tick_latencies, us);
    }

    pub fn record_cycle(&mut self, start: Instant) {
        push_capped(&mut self.cycle_latencies, start.elapsed().as_micros() as u64);
    }

    pub fn record_detection(&mut self, gen_instant: Instant) {
        push_capped(&mut self.detection_latencies, gen_instant.elapsed().as_micros() as u64);
    }

    pub fn tick_stats(&self) -> LatencyStats {
        compute_stats(&self.tick_latencies)
    }

    pub fn cycle_stats(&self) -> LatencyStats {
        compute_stats(&self.cycle_latencies)
    }

    pub fn detection_stats(&self) -> LatencyStats {
        compute_stats(&self.detection_latencies)
    }
}

fn push_capped(q: &mut VecDeque<u64>, val: u64) {
    if q.len() >= WINDOW_SIZE {
        q.pop_front();
    }
    q.push_back(val);
}

fn compute_stats(q: &VecDeque<u64>) -> LatencyStats {
    if q.is_empty() {
        return LatencyStats::default();
    }
    let mut sorted: Vec<u64> = q.iter().copied().collect();
    sorted.sort_unstable();
    let n = sorted.len();
    LatencyStats {
        p50_us: sorted[n * 50 / 100],
        p95_us: sorted[n * 95 / 100],
        p99_us: sorted[(n * 99 / 100).min(n - 1)],
        min_us: sorted[0],
        max_us: sorted[n - 1],
        count: n,
    }
}
