//! Sharded detection runtime.
//!
//! Every instrument hashes to exactly one worker task, and each worker owns a
//! private `DetectionEngine`, so ticks of one instrument are processed in
//! arrival order without any shared detection state.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::DetectorConfig;
use crate::engine::{Clock, DetectionEngine, EngineStats};
use crate::error::Error;
use crate::instruments::InstrumentDirectory;
use crate::types::{RobotEvent, Tick};

const SHARD_QUEUE_DEPTH: usize = 4096;

pub struct ShardedPipeline {
    senders: Vec<mpsc::Sender<Tick>>,
    workers: Vec<JoinHandle<EngineStats>>,
}

impl ShardedPipeline {
    /// Starts `shards` workers (at least one). Creation events from every
    /// worker arrive on the returned receiver.
    ///
    /// With `Clock::TickTime` each worker trims against the newest timestamp
    /// among its own instruments.
    pub fn spawn(
        config: &DetectorConfig,
        directory: InstrumentDirectory,
        shards: usize,
        clock: Clock,
    ) -> (Self, mpsc::UnboundedReceiver<RobotEvent>) {
        let shards = shards.max(1);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut senders = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(SHARD_QUEUE_DEPTH);
            let engine = DetectionEngine::new(config, directory.clone());
            workers.push(tokio::spawn(run_worker(shard, engine, clock, rx, event_tx.clone())));
            senders.push(tx);
        }

        (Self { senders, workers }, event_rx)
    }

    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    pub fn shard_for(&self, instrument_id: &str) -> usize {
        shard_index(instrument_id, self.senders.len())
    }

    /// Queues a tick on its instrument's worker, waiting while that queue is full.
    pub async fn submit(&self, tick: Tick) -> Result<(), Error> {
        let shard = self.shard_for(&tick.instrument_id);
        self.senders[shard].send(tick).await.map_err(|_| Error::Worker {
            shard,
            reason: "worker stopped".to_string(),
        })
    }

    /// Closes every queue, waits for the workers to drain and returns their combined stats.
    pub async fn shutdown(self) -> Result<EngineStats, Error> {
        drop(self.senders);
        let mut total = EngineStats::default();
        for (shard, result) in join_all(self.workers).await.into_iter().enumerate() {
            match result {
                Ok(stats) => total.merge(&stats),
                Err(e) => {
                    error!(shard, error = %e, "pipeline worker failed");
                    return Err(Error::Worker {
                        shard,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(total)
    }
}

pub fn shard_index(instrument_id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    instrument_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

async fn run_worker(
    shard: usize,
    mut engine: DetectionEngine,
    clock: Clock,
    mut rx: mpsc::Receiver<Tick>,
    events: mpsc::UnboundedSender<RobotEvent>,
) -> EngineStats {
    debug!(shard, ?clock, "pipeline worker started");
    while let Some(tick) = rx.recv().await {
        if let Some(event) = engine.process_with(&tick, clock) {
            // The receiver may already be gone; detection continues regardless.
            let _ = events.send(event);
        }
    }
    let stats = engine.stats();
    debug!(shard, ticks = stats.ticks_seen, robots = stats.robots_created, "pipeline worker stopped");
    stats
}
