use std::time::Instant;

use crate::alerts::{Alert, AlertLog};
use crate::config::DetectorConfig;
use crate::engine::DetectionEngine;
use crate::generator::TickGenerator;
use crate::latency::LatencyTracker;

/// Generator → engine loop shared by the headless, TUI and web modes.
pub struct SimSession {
    pub engine: DetectionEngine,
    pub generator: TickGenerator,
    pub latency: LatencyTracker,
    pub alerts: AlertLog,
    pub total_ticks: u64,
    pub started: Instant,
}

impl SimSession {
    pub fn new(config: &DetectorConfig, robot_rate: f64) -> Self {
        Self {
            engine: DetectionEngine::new(config, TickGenerator::directory()),
            generator: TickGenerator::new(robot_rate),
            latency: LatencyTracker::new(),
            alerts: AlertLog::new(config),
            total_ticks: 0,
            started: Instant::now(),
        }
    }

    /// Generates the ticks up to `ts`, feeds them through the engine and returns new detections.
    pub fn step(&mut self, ts: i64) -> Vec<Alert> {
        let cycle_start = self.latency.start();
        let gen_instant = Instant::now();
        let ticks = self.generator.generate_cycle(ts);
        self.total_ticks += ticks.len() as u64;

        let mut fresh = Vec::new();
        for tick in &ticks {
            let tick_start = self.latency.start();
            let event = self.engine.process(tick, ts);
            self.latency.record_tick(tick_start);
            if let Some(event) = event {
                self.latency.record_detection(gen_instant);
                fresh.push(self.alerts.record(&event, gen_instant));
            }
        }
        self.latency.record_cycle(cycle_start);
        fresh
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
