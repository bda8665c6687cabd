//! Correctness tests for aggregation, retention and robot lifecycle.
//!
//! Feeds known deterministic tick sequences through the engine (or straight
//! into the detector) with an explicit processing clock and asserts buffer
//! contents, emitted events and registry state.

use robot_detect::alerts::{ReportSink, StdoutSink, VecSink};
use robot_detect::detection::{IntervalStats, RobotDetector};
use robot_detect::instruments::InstrumentDirectory;
use robot_detect::{AggregatedSample, DetectionEngine, DetectorConfig, RobotEvent, RobotKey, Tick};

const SBER: &str = "BBG004730N88";
const GAZP: &str = "BBG004730RP0";

fn engine() -> DetectionEngine {
    engine_with(DetectorConfig::default())
}

fn engine_with(config: DetectorConfig) -> DetectionEngine {
    let mut directory = InstrumentDirectory::new();
    directory.insert(SBER, "SBER");
    directory.insert(GAZP, "GAZP");
    DetectionEngine::new(&config, directory)
}

/// Processes `(timestamp, quantity)` ticks for one instrument, with the clock at each tick's time.
fn feed(engine: &mut DetectionEngine, instrument: &str, ticks: &[(i64, u64)]) -> Vec<RobotEvent> {
    ticks
        .iter()
        .filter_map(|&(ts, qty)| engine.process(&Tick::new(instrument, ts, qty), ts))
        .collect()
}

fn samples(engine: &DetectionEngine, instrument: &str) -> Vec<(i64, u64)> {
    engine
        .buffer(instrument)
        .map(|b| b.samples().map(|s| (s.timestamp_ms, s.quantity)).collect())
        .unwrap_or_default()
}

// ── Test 1: Aggregation ──
// Two ticks inside the 50 ms window collapse into one sample carrying the
// later timestamp and the summed quantity. The boundary is inclusive.
#[test]
fn test_aggregation_merges_within_window() {
    let mut engine = engine();
    feed(&mut engine, SBER, &[(1_000, 10), (1_030, 15)]);
    assert_eq!(samples(&engine, SBER), vec![(1_030, 25)]);

    // Exactly 50 ms after the merged sample still merges
    feed(&mut engine, SBER, &[(1_080, 5)]);
    assert_eq!(samples(&engine, SBER), vec![(1_080, 30)]);

    // 51 ms opens a new sample
    feed(&mut engine, SBER, &[(1_131, 7)]);
    assert_eq!(samples(&engine, SBER), vec![(1_080, 30), (1_131, 7)]);
}

#[test]
fn test_aggregation_is_per_instrument() {
    let mut engine = engine();
    engine.process(&Tick::new(SBER, 1_000, 10), 1_000);
    engine.process(&Tick::new(GAZP, 1_010, 20), 1_010);
    assert_eq!(samples(&engine, SBER), vec![(1_000, 10)]);
    assert_eq!(samples(&engine, GAZP), vec![(1_010, 20)]);
}

// ── Test 2: Retention ──
// Trimming runs against the processing clock, not the tick timestamp.
#[test]
fn test_retention_trims_against_processing_clock() {
    let config = DetectorConfig::default();
    let mut engine = engine_with(config.clone());

    feed(&mut engine, SBER, &[(0, 10), (100_000, 11), (200_000, 12)]);
    let now = 300_000;
    engine.process(&Tick::new(SBER, 300_000, 13), now);

    let buffered = samples(&engine, SBER);
    assert_eq!(buffered, vec![(100_000, 11), (200_000, 12), (300_000, 13)]);
    assert!(buffered.iter().all(|&(ts, _)| ts >= now - config.time_window_ms));
}

#[test]
fn test_retention_drops_tick_older_than_horizon() {
    let mut engine = engine();
    engine.process(&Tick::new(SBER, 1_000, 10), 1_000_000);
    assert!(engine.buffer(SBER).is_some_and(|b| b.is_empty()));
}

#[test]
fn test_retention_boundary_is_kept() {
    let mut engine = engine();
    engine.process(&Tick::new(SBER, 10_000, 10), 10_000);
    engine.process(&Tick::new(SBER, 20_000, 11), 250_000);
    // 10_000 == 250_000 - 240_000 is not older than the horizon
    assert_eq!(samples(&engine, SBER), vec![(10_000, 10), (20_000, 11)]);
}

#[test]
fn test_tick_clock_never_moves_backwards() {
    let mut engine = engine();
    engine.process_tick_time(&Tick::new(SBER, 300_000, 10));
    // A late tick on another instrument is judged against the newest time already seen
    engine.process_tick_time(&Tick::new(GAZP, 10_000, 11));
    assert!(engine.buffer(GAZP).is_some_and(|b| b.is_empty()));

    engine.process_tick_time(&Tick::new(GAZP, 200_000, 12));
    assert_eq!(samples(&engine, GAZP), vec![(200_000, 12)]);
    assert_eq!(samples(&engine, SBER), vec![(300_000, 10)]);
}

// ── Test 3: Regularity ──
// 0, 5000, 10000, 15000 ms at lot 100 is a perfect robot: mean 5 s, CV 0.
#[test]
fn test_regular_series_is_detected() {
    let stats = IntervalStats::from_timestamps(&[0, 5_000, 10_000, 15_000]).unwrap();
    assert_eq!(stats.mean_ms, 5_000.0);
    assert_eq!(stats.coefficient_of_variation(), Some(0.0));
    assert!(stats.is_regular(0.3));
    assert_eq!(stats.interval_secs(), 5);

    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 100), (5_000, 100), (10_000, 100), (15_000, 100)]);

    // Created on the third print, silently refreshed on the fourth
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.ticker, "SBER");
    assert_eq!(event.interval_secs, 5);
    assert_eq!(event.lot_size, 100);
    assert_eq!(event.lot_tolerance, 0);
    assert_eq!(event.last_tick_ms, 10_000);

    let state = engine.registry().get(&RobotKey::new(SBER, 100)).expect("robot should be tracked");
    assert_eq!(state.first_detected_ms, 10_000);
    assert_eq!(state.last_tick_ms, 15_000);
    assert_eq!(state.interval_secs, 5);

    let stats = engine.stats();
    assert_eq!(stats.robots_created, 1);
    assert_eq!(stats.robots_refreshed, 1);
    assert_eq!(stats.evaluations, 2);
}

// ── Test 4: Irregularity ──
// 0, 1000, 9000, 9500 ms has CV well above 0.3 and never becomes a robot.
#[test]
fn test_irregular_series_is_rejected() {
    let stats = IntervalStats::from_timestamps(&[0, 1_000, 9_000, 9_500]).unwrap();
    assert!(stats.coefficient_of_variation().unwrap() > 0.3);
    assert!(!stats.is_regular(0.3));

    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 100), (1_000, 100), (9_000, 100), (9_500, 100)]);
    assert!(events.is_empty());
    assert!(engine.registry().is_empty());
}

#[test]
fn test_small_jitter_is_regular() {
    // Intervals 5000 and 5400: CV = 200 / 5200 ≈ 0.038
    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 40), (5_000, 40), (10_400, 40)]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].interval_secs, 5);
}

// Intervals 7000 and 13000: mean 10000, population deviation 3000, so
// CV lands exactly on the 0.3 tolerance and is accepted. The sample
// deviation (divide by n - 1) would give CV ≈ 0.42 and reject it.
#[test]
fn test_tolerance_boundary_is_inclusive() {
    let stats = IntervalStats::from_timestamps(&[0, 7_000, 20_000]).unwrap();
    assert_eq!(stats.mean_ms, 10_000.0);
    assert_eq!(stats.std_dev_ms, 3_000.0);
    assert_eq!(stats.coefficient_of_variation(), Some(0.3));

    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 100), (7_000, 100), (20_000, 100)]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].interval_secs, 10);
}

// ── Test 5: Lot filtering ──
#[test]
fn test_ticks_below_min_lot_never_reach_buffer() {
    let mut engine = engine();

    // First tick for an instrument below the lot does not even create its buffer
    assert!(engine.process(&Tick::new(SBER, 0, 4), 0).is_none());
    assert!(engine.buffer(SBER).is_none());

    feed(&mut engine, SBER, &[(1_000, 10), (2_000, 10)]);
    let before = samples(&engine, SBER);

    // Within the aggregation window it would otherwise have merged
    engine.process(&Tick::new(SBER, 2_010, 4), 2_010);
    engine.process(&Tick::new(SBER, 3_000, 0), 3_000);
    assert_eq!(samples(&engine, SBER), before);
    assert_eq!(engine.stats().ticks_dropped, 3);
    assert_eq!(engine.stats().ticks_seen, 5);
}

// ── Test 6: Timeout eviction ──
#[test]
fn test_silent_robot_is_evicted_on_next_evaluation() {
    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 100), (5_000, 100), (10_000, 100)]);
    assert_eq!(events.len(), 1);
    assert!(engine.registry().contains(&RobotKey::new(SBER, 100)));

    // Much later: the old lot-100 samples fall out of retention, and the
    // new, irregular prints trigger an evaluation at latest = 215_000.
    let now = 260_000;
    for (ts, qty) in [(200_000, 7), (201_000, 7), (215_000, 7)] {
        assert!(engine.process(&Tick::new(SBER, ts, qty), now).is_none());
    }

    assert!(!engine.registry().contains(&RobotKey::new(SBER, 100)));
    assert!(engine.registry().is_empty());
    assert_eq!(engine.stats().robots_evicted, 1);
}

#[test]
fn test_timeout_is_strict_and_scoped() {
    let config = DetectorConfig::default();
    let mut detector = RobotDetector::new(&config);
    let robot = |ts: i64| AggregatedSample { timestamp_ms: ts, quantity: 100 };
    let noise = |ts: i64, quantity: u64| AggregatedSample { timestamp_ms: ts, quantity };

    assert!(detector.evaluate_window(SBER, "SBER", &[robot(0), robot(5_000), robot(10_000)]).is_some());
    assert!(detector.evaluate_window(GAZP, "GAZP", &[robot(0), robot(5_000), robot(10_000)]).is_some());

    // latest - last_tick == timeout: still alive
    detector.evaluate_window(SBER, "SBER", &[noise(150_000, 7), noise(160_000, 8), noise(190_000, 9)]);
    assert!(detector.registry().contains(&RobotKey::new(SBER, 100)));

    // One millisecond later it is gone, but only for SBER
    detector.evaluate_window(SBER, "SBER", &[noise(160_000, 8), noise(190_000, 9), noise(190_001, 11)]);
    assert!(!detector.registry().contains(&RobotKey::new(SBER, 100)));
    assert!(detector.registry().contains(&RobotKey::new(GAZP, 100)));
}

#[test]
fn test_evicted_robot_is_detected_again() {
    let config = DetectorConfig::default();
    let mut detector = RobotDetector::new(&config);
    let at = |ts: i64| AggregatedSample { timestamp_ms: ts, quantity: 100 };

    assert!(detector.evaluate_window(SBER, "SBER", &[at(0), at(5_000), at(10_000)]).is_some());
    let again = detector.evaluate_window(SBER, "SBER", &[at(400_000), at(405_000), at(410_000)]);
    let event = again.expect("robot should be re-created after eviction");
    assert_eq!(event.last_tick_ms, 410_000);
    assert_eq!(detector.counts().evicted, 1);
    assert_eq!(detector.counts().created, 2);
}

// ── Test 7: Single detection per tick ──
// Lots 100 and 50 are both regular; only the first bucket in iteration
// order (lot 100, opened first) touches the registry.
#[test]
fn test_only_first_regular_bucket_is_applied() {
    let mut engine = engine();
    let events = feed(
        &mut engine,
        SBER,
        &[(0, 100), (1_000, 50), (10_000, 100), (11_000, 50), (20_000, 100), (21_000, 50)],
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].lot_size, 100);
    assert_eq!(events[0].interval_secs, 10);
    assert_eq!(engine.registry().len(), 1);
    assert!(!engine.registry().contains(&RobotKey::new(SBER, 50)));

    // The last tick refreshed lot 100 instead of creating lot 50
    assert_eq!(engine.stats().robots_refreshed, 1);
}

#[test]
fn test_single_window_with_two_robots_mutates_once() {
    let config = DetectorConfig::default();
    let mut detector = RobotDetector::new(&config);
    let window: Vec<AggregatedSample> = [(0, 100), (1_000, 50), (10_000, 100), (11_000, 50), (20_000, 100), (21_000, 50)]
        .iter()
        .map(|&(timestamp_ms, quantity)| AggregatedSample { timestamp_ms, quantity })
        .collect();

    let event = detector.evaluate_window(SBER, "SBER", &window).expect("first bucket should be created");
    assert_eq!(event.lot_size, 100);
    assert_eq!(event.last_tick_ms, 20_000);
    assert_eq!(detector.registry().len(), 1);
}

// ── Test 8: Lot tolerance ──
#[test]
fn test_lot_tolerance_groups_near_sizes() {
    let config = DetectorConfig { lot_tolerance: 2, ..Default::default() };
    let mut engine = engine_with(config);
    let events = feed(&mut engine, SBER, &[(0, 100), (5_000, 102), (10_000, 98)]);

    assert_eq!(events.len(), 1);
    // The bucket keeps the size of the sample that opened it
    assert_eq!(events[0].lot_size, 100);
    assert_eq!(events[0].lot_tolerance, 2);
}

#[test]
fn test_zero_tolerance_requires_exact_sizes() {
    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 100), (5_000, 101), (10_000, 100)]);
    assert!(events.is_empty());
}

// ── Test 9: Recent window ──
// Lot 100 at 0, 2000, 4000 is regular, but nine noise samples in between
// push the first two prints out of the 10-sample window.
#[test]
fn test_only_recent_samples_are_evaluated() {
    let mut ticks = vec![(0, 100), (2_000, 100)];
    ticks.extend((0..9).map(|i| (2_100 + i * 100, 11 + i as u64)));
    ticks.push((4_000, 100));

    let mut engine = engine();
    assert!(feed(&mut engine, SBER, &ticks).is_empty());
    assert_eq!(engine.buffer(SBER).map(|b| b.len()), Some(12));

    let config = DetectorConfig { recent_window: 20, ..Default::default() };
    let mut wide = engine_with(config);
    let events = feed(&mut wide, SBER, &ticks);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].interval_secs, 2);
}

// ── Test 10: Hostile input ──
// Values straight from a feed must never abort processing of later ticks.
#[test]
fn test_quantity_overflow_saturates() {
    let mut engine = engine();
    engine.process(&Tick::new(SBER, 0, u64::MAX), 0);
    engine.process(&Tick::new(SBER, 10, 5), 10);
    assert_eq!(samples(&engine, SBER), vec![(10, u64::MAX)]);

    // The instrument keeps working afterwards
    let events = feed(&mut engine, SBER, &[(5_000, 100), (10_000, 100), (15_000, 100)]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].lot_size, 100);
}

#[test]
fn test_extreme_timestamps_do_not_abort() {
    let mut engine = engine();
    engine.process(&Tick::new(SBER, i64::MIN, 10), i64::MIN);
    engine.process(&Tick::new(SBER, i64::MAX, 10), i64::MIN);
    engine.process(&Tick::new(SBER, 0, 10), i64::MAX);
    assert_eq!(engine.stats().ticks_seen, 3);
}

// ── Test 11: Insufficient data ──
#[test]
fn test_no_evaluation_below_min_series_length() {
    let mut engine = engine();
    feed(&mut engine, SBER, &[(0, 100), (5_000, 100)]);
    assert_eq!(engine.stats().evaluations, 0);
}

#[test]
fn test_merged_prints_do_not_count_as_series() {
    // Three prints, but the last two merge: only two samples
    let mut engine = engine();
    let events = feed(&mut engine, SBER, &[(0, 50), (5_000, 50), (5_020, 50)]);
    assert!(events.is_empty());
    assert_eq!(samples(&engine, SBER), vec![(0, 50), (5_020, 100)]);
    assert_eq!(engine.stats().evaluations, 0);
}

// ── Test 12: Reporting ──
#[test]
fn test_unknown_instrument_reports_its_id() {
    let mut engine = engine();
    let events = feed(&mut engine, "BBG000000001", &[(0, 20), (3_000, 20), (6_000, 20)]);
    assert_eq!(events[0].ticker, "BBG000000001");
}

#[test]
fn test_stdout_line_uses_display_zone() {
    let sink = StdoutSink::new(&DetectorConfig::default());
    let event = RobotEvent {
        instrument_id: SBER.into(),
        ticker: "SBER".into(),
        interval_secs: 5,
        lot_size: 100,
        lot_tolerance: 0,
        // 2024-01-01T07:00:05Z
        last_tick_ms: 1_704_092_405_000,
    };
    assert_eq!(
        sink.format(&event),
        "Robot: SBER interval=5s lot≈100 (±0) last tick (MSK)=10:00:05"
    );
}

#[test]
fn test_batch_reports_only_creations() {
    let mut engine = engine();
    let ticks: Vec<Tick> = [0, 5_000, 10_000, 15_000, 20_000]
        .iter()
        .map(|&ts| Tick::new(GAZP, ts, 30))
        .collect();
    let mut sink = VecSink::default();
    let reported = engine.process_batch(&ticks, 20_000, &mut sink);

    assert_eq!(reported, 1);
    assert_eq!(sink.events.len(), 1);
    assert_eq!(sink.events[0].ticker, "GAZP");

    let first = sink.events[0].clone();
    sink.report(&first);
    assert_eq!(sink.events.len(), 2);
}
