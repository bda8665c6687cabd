use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use chrono::FixedOffset;
use serde::Serialize;

use crate::config::DetectorConfig;
use crate::types::RobotEvent;

const MAX_RECENT: usize = 200;

/// Receives one call per newly detected robot.
pub trait ReportSink {
    fn report(&mut self, event: &RobotEvent);
}

/// Prints one line per detection, with the triggering tick's time in the display zone.
pub struct StdoutSink {
    zone: FixedOffset,
    zone_label: String,
}

impl StdoutSink {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            zone: config.display_zone(),
            zone_label: config.display_zone_label.clone(),
        }
    }

    pub fn format(&self, event: &RobotEvent) -> String {
        format!(
            "Robot: {} interval={}s lot≈{} (±{}) last tick ({})={}",
            event.ticker,
            event.interval_secs,
            event.lot_size,
            event.lot_tolerance,
            self.zone_label,
            event.tick_time(self.zone),
        )
    }
}

impl ReportSink for StdoutSink {
    fn report(&mut self, event: &RobotEvent) {
        println!("{}", self.format(event));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: u64,
    pub event: RobotEvent,
    pub tick_time: String,
    pub latency_us: u64,
    pub timestamp_ms: i64,
}

/// Bounded feed of recent detections plus per-ticker totals, backing the dashboards.
pub struct AlertLog {
    next_id: u64,
    zone: FixedOffset,
    alerts: VecDeque<Alert>,
    counts: HashMap<String, u64>,
}

impl AlertLog {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            next_id: 0,
            zone: config.display_zone(),
            alerts: VecDeque::with_capacity(MAX_RECENT),
            counts: HashMap::new(),
        }
    }

    pub fn recent_alerts(&self) -> &VecDeque<Alert> {
        &self.alerts
    }

    pub fn alert_counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    pub fn total_alerts(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Records a detection; `gen_instant` is when the tick that triggered it was produced.
    pub fn record(&mut self, event: &RobotEvent, gen_instant: Instant) -> Alert {
        self.next_id += 1;
        let alert = Alert {
            id: self.next_id,
            event: event.clone(),
            tick_time: event.tick_time(self.zone),
            latency_us: gen_instant.elapsed().as_micros() as u64,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };
        *self.counts.entry(event.ticker.clone()).or_insert(0) += 1;
        if self.alerts.len() >= MAX_RECENT {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert.clone());
        alert
    }
}

impl ReportSink for AlertLog {
    fn report(&mut self, event: &RobotEvent) {
        self.record(event, Instant::now());
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub events: Vec<RobotEvent>,
}

impl ReportSink for VecSink {
    fn report(&mut self, event: &RobotEvent) {
        self.events.push(event.clone());
    }
}
