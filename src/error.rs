use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tick on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("instrument file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("instrument file parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error("pipeline worker {shard} failed: {reason}")]
    Worker { shard: usize, reason: String },
}
