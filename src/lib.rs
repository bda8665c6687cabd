pub mod aggregator;
pub mod alerts;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod feed;
pub mod generator;
pub mod instruments;
pub mod latency;
pub mod logging;
pub mod pipeline;
pub mod replay;
pub mod session;
pub mod stress;
pub mod tui;
pub mod types;
pub mod web;

pub use config::DetectorConfig;
pub use engine::{Clock, DetectionEngine, EngineStats};
pub use error::Error;
pub use types::{AggregatedSample, RobotEvent, RobotKey, RobotState, Tick};
