use std::fs::File;
use std::io::{self, BufRead, BufReader};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::alerts::{ReportSink, StdoutSink};
use crate::config::DetectorConfig;
use crate::engine::{Clock, EngineStats};
use crate::error::FeedError;
use crate::feed::TickReader;
use crate::instruments::InstrumentDirectory;
use crate::pipeline::ShardedPipeline;
use crate::types::Tick;

const READ_QUEUE_DEPTH: usize = 1024;

/// Streams a JSON-lines tick file (`-` for stdin) through the sharded pipeline,
/// printing every new robot to stdout. Returns the merged engine counters.
///
/// Recorded files should use `Clock::TickTime`; against the wall clock their
/// ticks would all be outside the retention window.
pub async fn run(
    input: &str,
    config: &DetectorConfig,
    directory: InstrumentDirectory,
    shards: usize,
    clock: Clock,
) -> Result<EngineStats, Box<dyn std::error::Error>> {
    let source: Box<dyn BufRead + Send> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input).map_err(FeedError::Io)?))
    };

    let (pipeline, mut events) = ShardedPipeline::spawn(config, directory, shards, clock);
    info!(input, shards = pipeline.shard_count(), ?clock, "replay started");

    let mut sink = StdoutSink::new(config);
    let printer = tokio::spawn(async move {
        let mut printed = 0u64;
        while let Some(event) = events.recv().await {
            sink.report(&event);
            printed += 1;
        }
        printed
    });

    let (tx, mut rx) = mpsc::channel::<Tick>(READ_QUEUE_DEPTH);
    let reader = tokio::task::spawn_blocking(move || -> Result<(u64, u64), FeedError> {
        let mut read = 0u64;
        let mut skipped = 0u64;
        for item in TickReader::new(source) {
            match item {
                Ok(tick) => {
                    read += 1;
                    if tx.blocking_send(tick).is_err() {
                        break;
                    }
                }
                Err(e @ FeedError::Malformed { .. }) => {
                    skipped += 1;
                    warn!(error = %e, "skipping malformed tick");
                }
                Err(e) => return Err(e),
            }
        }
        Ok((read, skipped))
    });

    while let Some(tick) = rx.recv().await {
        pipeline.submit(tick).await?;
    }

    let (read, skipped) = reader.await??;
    let stats = pipeline.shutdown().await?;
    let printed = printer.await?;

    info!(
        read,
        skipped,
        dropped = stats.ticks_dropped,
        evaluations = stats.evaluations,
        robots = printed,
        active = stats.active_robots,
        "replay finished"
    );
    Ok(stats)
}
