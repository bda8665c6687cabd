use rand::Rng;

use crate::instruments::InstrumentDirectory;
use crate::types::Tick;

pub const SYMBOLS: &[(&str, &str)] = &[
    ("BBG004730N88", "SBER"),
    ("BBG004730RP0", "GAZP"),
    ("BBG004731032", "LKOH"),
    ("BBG004RVFFC0", "TATN"),
    ("BBG004S681W1", "MTSS"),
];

/// Chance per cycle and instrument of one background print.
const NOISE_PROBABILITY: f64 = 0.05;
const NOISE_LOT_RANGE: std::ops::Range<u64> = 1..1000;
const ROBOT_LOT_RANGE: std::ops::Range<u64> = 10..200;
const ROBOT_INTERVAL_MS: std::ops::Range<i64> = 2_000..15_000;
const ROBOT_JITTER_MS: i64 = 150;
const ROBOT_PRINTS: std::ops::RangeInclusive<u32> = 8..=30;
const STRESS_SPACING_MS: i64 = 20;

#[derive(Debug, Clone)]
pub struct InjectedRobot {
    pub instrument_id: String,
    pub lot: u64,
    pub interval_ms: i64,
    next_ts: i64,
    remaining: u32,
}

/// Synthetic feed: sparse random prints on every instrument, plus robots that
/// print a fixed lot at a fixed interval (with jitter) for a limited time.
pub struct TickGenerator {
    pub robot_rate: f64,
    robots: Vec<InjectedRobot>,
    last_ts: Option<i64>,
    robots_injected: u64,
}

impl TickGenerator {
    pub fn new(robot_rate: f64) -> Self {
        Self {
            robot_rate,
            robots: Vec::new(),
            last_ts: None,
            robots_injected: 0,
        }
    }

    pub fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn directory() -> InstrumentDirectory {
        SYMBOLS
            .iter()
            .map(|(id, ticker)| (id.to_string(), ticker.to_string()))
            .collect()
    }

    pub fn active_robots(&self) -> &[InjectedRobot] {
        &self.robots
    }

    pub fn robots_injected(&self) -> u64 {
        self.robots_injected
    }

    /// Ticks for the slice `(previous ts, ts]`, sorted by timestamp.
    pub fn generate_cycle(&mut self, ts: i64) -> Vec<Tick> {
        let mut rng = rand::thread_rng();
        let from = self.last_ts.unwrap_or(ts - 1).min(ts - 1);
        self.last_ts = Some(ts);

        if rng.gen_bool(self.robot_rate.clamp(0.0, 1.0)) {
            self.inject_robot(ts);
        }

        let mut ticks = Vec::new();
        for (id, _) in SYMBOLS {
            if rng.gen_bool(NOISE_PROBABILITY) {
                ticks.push(Tick::new(*id, rng.gen_range(from + 1..=ts), rng.gen_range(NOISE_LOT_RANGE)));
            }
        }

        for robot in &mut self.robots {
            while robot.remaining > 0 && robot.next_ts <= ts {
                ticks.push(Tick::new(robot.instrument_id.clone(), robot.next_ts, robot.lot));
                robot.remaining -= 1;
                robot.next_ts += robot.interval_ms + rng.gen_range(-ROBOT_JITTER_MS..=ROBOT_JITTER_MS);
            }
        }
        self.robots.retain(|robot| robot.remaining > 0);

        ticks.sort_by_key(|tick| tick.timestamp_ms);
        ticks
    }

    fn inject_robot(&mut self, ts: i64) {
        let mut rng = rand::thread_rng();
        let (id, _) = SYMBOLS[rng.gen_range(0..SYMBOLS.len())];
        self.robots_injected += 1;
        self.robots.push(InjectedRobot {
            instrument_id: id.to_string(),
            lot: rng.gen_range(ROBOT_LOT_RANGE),
            interval_ms: rng.gen_range(ROBOT_INTERVAL_MS),
            next_ts: ts,
            remaining: rng.gen_range(ROBOT_PRINTS),
        });
    }

    /// `count` prints spaced `STRESS_SPACING_MS` apart, cycling through the instrument list.
    /// Every third print per instrument repeats a fixed lot so detection work is exercised.
    pub fn generate_stress_cycle(&mut self, ts: i64, count: usize) -> Vec<Tick> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|i| {
                let (id, _) = SYMBOLS[i % SYMBOLS.len()];
                let quantity = if (i / SYMBOLS.len()) % 3 == 0 {
                    100
                } else {
                    rng.gen_range(NOISE_LOT_RANGE)
                };
                Tick::new(id, ts + i as i64 * STRESS_SPACING_MS, quantity)
            })
            .collect()
    }

    pub fn stress_cycle_span_ms(count: usize) -> i64 {
        count as i64 * STRESS_SPACING_MS + 1
    }
}
