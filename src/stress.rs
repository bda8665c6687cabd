use std::time::{Duration, Instant};

use crate::config::DetectorConfig;
use crate::engine::DetectionEngine;
use crate::generator::TickGenerator;
use crate::latency::LatencyTracker;

struct StressLevel {
    ticks_per_cycle: usize,
    sleep_ms: u64,
    target_tps: u64,
}

const LEVELS: &[StressLevel] = &[
    StressLevel { ticks_per_cycle: 10,    sleep_ms: 100, target_tps: 100 },
    StressLevel { ticks_per_cycle: 50,    sleep_ms: 50,  target_tps: 1_000 },
    StressLevel { ticks_per_cycle: 200,   sleep_ms: 20,  target_tps: 10_000 },
    StressLevel { ticks_per_cycle: 1000,  sleep_ms: 10,  target_tps: 100_000 },
    StressLevel { ticks_per_cycle: 5000,  sleep_ms: 5,   target_tps: 1_000_000 },
];

struct LevelResult {
    level: usize,
    target_tps: u64,
    actual_tps: u64,
    total_ticks: u64,
    evaluations: u64,
    robots: u64,
    tick_p50: u64,
    tick_p95: u64,
    tick_p99: u64,
    cycle_p50: u64,
    cycle_p99: u64,
    duration_secs: f64,
}

pub async fn run(config: &DetectorConfig, level_duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    let total_time = LEVELS.len() as u64 * level_duration;
    println!("=== STRESS TEST ===");
    println!("Levels: {}, Duration per level: {}s, Total estimated: {}s",
        LEVELS.len(), level_duration, total_time);
    println!();

    let mut gen = TickGenerator::new(0.0);
    let mut results: Vec<LevelResult> = Vec::new();

    let level_dur = Duration::from_secs(level_duration);

    for (idx, level) in LEVELS.iter().enumerate() {
        let level_num = idx + 1;
        print!("Level {}/{}: target ~{} ticks/sec, {} ticks/cycle, {}ms sleep ... ",
            level_num, LEVELS.len(), level.target_tps, level.ticks_per_cycle, level.sleep_ms);

        // Fresh engine and latency window per level.
        let mut engine = DetectionEngine::new(config, TickGenerator::directory());
        let mut latency = LatencyTracker::new();
        let mut total_ticks = 0u64;

        // Each cycle starts where the previous one ended so per-instrument order holds.
        let mut event_ts: i64 = TickGenerator::now_ms();
        let cycle_span = TickGenerator::stress_cycle_span_ms(level.ticks_per_cycle);

        let level_start = Instant::now();

        while level_start.elapsed() < level_dur {
            let ticks = gen.generate_stress_cycle(event_ts, level.ticks_per_cycle);
            total_ticks += ticks.len() as u64;

            let cycle_start = latency.start();
            for tick in &ticks {
                let tick_start = latency.start();
                engine.process(tick, event_ts + cycle_span);
                latency.record_tick(tick_start);
            }
            latency.record_cycle(cycle_start);

            event_ts += cycle_span;

            tokio::time::sleep(Duration::from_millis(level.sleep_ms)).await;
        }

        let elapsed = level_start.elapsed().as_secs_f64();
        let actual_tps = (total_ticks as f64 / elapsed) as u64;

        let tick = latency.tick_stats();
        let cycle = latency.cycle_stats();
        let stats = engine.stats();

        println!("{} ticks/sec (tick p99={}us)", actual_tps, tick.p99_us);

        results.push(LevelResult {
            level: level_num,
            target_tps: level.target_tps,
            actual_tps,
            total_ticks,
            evaluations: stats.evaluations,
            robots: stats.robots_created,
            tick_p50: tick.p50_us,
            tick_p95: tick.p95_us,
            tick_p99: tick.p99_us,
            cycle_p50: cycle.p50_us,
            cycle_p99: cycle.p99_us,
            duration_secs: elapsed,
        });
    }

    println!();
    print_results_table(&results);
    print_saturation_analysis(&results);

    Ok(())
}

fn format_latency(us: u64) -> String {
    if us >= 1_000_000 {
        format!("{:.1}s", us as f64 / 1_000_000.0)
    } else if us >= 1_000 {
        format!("{:.1}ms", us as f64 / 1_000.0)
    } else {
        format!("{}us", us)
    }
}

fn print_results_table(results: &[LevelResult]) {
    println!("{}", "=".repeat(100));
    println!("{:^100}", "STRESS TEST RESULTS");
    println!("{}", "=".repeat(100));
    println!(
        " {:<5} {:>10} {:>10} {:>9} {:>9} {:>9} {:>10} {:>10} {:>7} {:>7}",
        "Level", "Target/s", "Actual/s", "Tick p50", "Tick p95", "Tick p99", "Cycle p50", "Cycle p99", "Robots", "Time"
    );
    println!("{}", "-".repeat(100));

    for r in results {
        println!(
            " {:<5} {:>10} {:>10} {:>9} {:>9} {:>9} {:>10} {:>10} {:>7} {:>6.1}s",
            r.level,
            r.target_tps,
            r.actual_tps,
            format_latency(r.tick_p50),
            format_latency(r.tick_p95),
            format_latency(r.tick_p99),
            format_latency(r.cycle_p50),
            format_latency(r.cycle_p99),
            r.robots,
            r.duration_secs,
        );
    }

    println!("{}", "=".repeat(100));

    let total_ticks: u64 = results.iter().map(|r| r.total_ticks).sum();
    let total_evaluations: u64 = results.iter().map(|r| r.evaluations).sum();
    let total_time: f64 = results.iter().map(|r| r.duration_secs).sum();
    println!(
        "Totals: {} ticks, {} evaluations in {:.1}s",
        total_ticks, total_evaluations, total_time
    );
}

fn print_saturation_analysis(results: &[LevelResult]) {
    println!();

    // Saturation: actual below 90% of target
    let saturation = results.iter().find(|r| {
        r.actual_tps < (r.target_tps * 90 / 100)
    });

    if let Some(sat) = saturation {
        let pct = (sat.actual_tps as f64 / sat.target_tps as f64) * 100.0;
        println!(
            "Saturation point: Level {} (~{} ticks/sec target)",
            sat.level, sat.target_tps
        );
        println!(
            "  Actual throughput: {}/sec ({:.0}% of target)",
            sat.actual_tps, pct
        );
        println!("  Tick p99: {}", format_latency(sat.tick_p99));
    } else {
        println!("No saturation detected - engine handled all load levels!");
    }

    let peak = results.iter().max_by_key(|r| r.actual_tps);
    if let Some(p) = peak {
        println!(
            "Peak sustained throughput: ~{} ticks/sec (Level {})",
            p.actual_tps, p.level
        );
    }
}
