use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use robot_detect::alerts::{ReportSink, StdoutSink};
use robot_detect::generator::TickGenerator;
use robot_detect::instruments::InstrumentDirectory;
use robot_detect::logging;
use robot_detect::replay;
use robot_detect::session::SimSession;
use robot_detect::stress;
use robot_detect::tui;
use robot_detect::web;
use robot_detect::{Clock, DetectorConfig};

#[derive(Parser)]
#[command(name = "robot-detect", about = "Detect mechanically-regular trading robots in live trade ticks")]
struct Cli {
    /// Run mode: headless, replay, tui, web, or stress
    #[arg(long, default_value = "headless")]
    mode: String,

    /// Web server port (web mode only)
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Chance per generator cycle of starting a synthetic robot (0.0-1.0)
    #[arg(long, default_value = "0.02")]
    robot_rate: f64,

    /// Run duration in seconds (0 = one hour)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Seconds per load level (stress mode only)
    #[arg(long, default_value = "5")]
    level_duration: u64,

    /// JSON file with detector settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON object mapping instrument id to ticker (replay mode)
    #[arg(long)]
    instruments: Option<PathBuf>,

    /// JSON-lines tick file, or - for stdin (replay mode)
    #[arg(long, default_value = "-")]
    input: String,

    /// Detection workers; instruments are partitioned across them (replay mode)
    #[arg(long, default_value = "1")]
    shards: usize,

    /// Trim against the wall clock instead of tick timestamps (replay of a live stream)
    #[arg(long)]
    wall_clock: bool,

    #[arg(long)]
    min_lot: Option<u64>,

    #[arg(long)]
    lot_tolerance: Option<u64>,

    /// Maximum coefficient of variation of robot intervals
    #[arg(long)]
    interval_tolerance: Option<f64>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn detector_config(&self) -> Result<DetectorConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::from_file(path)?,
            None => DetectorConfig::default(),
        };
        if let Some(min_lot) = self.min_lot {
            config.min_lot = min_lot;
        }
        if let Some(lot_tolerance) = self.lot_tolerance {
            config.lot_tolerance = lot_tolerance;
        }
        if let Some(tolerance) = self.interval_tolerance {
            config.interval_cv_tolerance = tolerance;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The TUI owns the terminal; a stderr subscriber would tear its frames.
    if cli.mode != "tui" {
        logging::init_logging(&cli.log_level, cli.log_json);
    }

    let config = cli.detector_config()?;
    tracing::debug!(?config, "detector config");

    match cli.mode.as_str() {
        "headless" => run_headless(&config, cli.robot_rate, cli.duration).await?,
        "replay" => {
            let directory = match &cli.instruments {
                Some(path) => InstrumentDirectory::from_file(path)?,
                None => InstrumentDirectory::new(),
            };
            let clock = if cli.wall_clock { Clock::Wall } else { Clock::TickTime };
            replay::run(&cli.input, &config, directory, cli.shards, clock).await?;
        }
        "tui" => tui::run(&config, cli.robot_rate, cli.duration).await?,
        "web" => web::run(cli.port, &config, cli.robot_rate, cli.duration).await?,
        "stress" => stress::run(&config, cli.level_duration).await?,
        other => eprintln!("Unknown mode: {other}. Use --mode headless|replay|tui|web|stress"),
    }

    Ok(())
}

async fn run_headless(
    config: &DetectorConfig,
    robot_rate: f64,
    duration_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== robot-detect (headless) ===");
    println!(
        "Robot rate: {:.0}%, Duration: {}s",
        robot_rate * 100.0,
        if duration_secs == 0 { "3600".to_string() } else { duration_secs.to_string() }
    );
    println!();

    let mut session = SimSession::new(config, robot_rate);
    let mut sink = StdoutSink::new(config);

    let run_duration = if duration_secs == 0 { Duration::from_secs(3600) } else { Duration::from_secs(duration_secs) };

    while session.started.elapsed() < run_duration {
        let ts = TickGenerator::now_ms();
        for alert in session.step(ts) {
            sink.report(&alert.event);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Summary
    let stats = session.engine.stats();
    println!();
    println!("=== Results ===");
    println!("  Ticks generated:    {}", session.total_ticks);
    println!("  Ticks below lot:    {}", stats.ticks_dropped);
    println!("  Evaluations:        {}", stats.evaluations);
    println!("  Robots injected:    {}", session.generator.robots_injected());
    println!("  Robots detected:    {}", stats.robots_created);
    println!("  Robots refreshed:   {}", stats.robots_refreshed);
    println!("  Robots timed out:   {}", stats.robots_evicted);
    println!("  Robots active:      {}", stats.active_robots);
    println!();
    let tick = session.latency.tick_stats();
    let cycle = session.latency.cycle_stats();
    let detect = session.latency.detection_stats();
    println!("  Latency (microseconds):");
    println!("    Tick:       p50={} p95={} p99={} min={} max={}", tick.p50_us, tick.p95_us, tick.p99_us, tick.min_us, tick.max_us);
    println!("    Cycle:      p50={} p95={} p99={} min={} max={}", cycle.p50_us, cycle.p95_us, cycle.p99_us, cycle.min_us, cycle.max_us);
    println!("    Detection:  p50={} p95={} p99={} min={} max={}", detect.p50_us, detect.p95_us, detect.p99_us, detect.min_us, detect.max_us);
    println!();

    let mut counts: Vec<_> = session.alerts.alert_counts().iter().collect();
    counts.sort();
    for (ticker, count) in counts {
        println!("  {}: {}", ticker, count);
    }

    Ok(())
}
