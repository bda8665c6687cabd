use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::InstrumentError;

/// Instrument id → display ticker, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct InstrumentDirectory {
    tickers: HashMap<String, String>,
}

impl InstrumentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON object of the form `{"<instrument id>": "<ticker>", ...}`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InstrumentError> {
        let raw = fs::read_to_string(path)?;
        let tickers: HashMap<String, String> = serde_json::from_str(&raw)?;
        Ok(Self { tickers })
    }

    pub fn insert(&mut self, instrument_id: impl Into<String>, ticker: impl Into<String>) {
        self.tickers.insert(instrument_id.into(), ticker.into());
    }

    /// Unknown instruments display as their id.
    pub fn ticker_for<'a>(&'a self, instrument_id: &'a str) -> &'a str {
        self.tickers.get(instrument_id).map(String::as_str).unwrap_or(instrument_id)
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

impl FromIterator<(String, String)> for InstrumentDirectory {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            tickers: iter.into_iter().collect(),
        }
    }
}
