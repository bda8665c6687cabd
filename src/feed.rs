//! JSON-lines tick replay.
//!
//! Each non-blank line is one tick:
//! `{"instrument_id": "BBG004730N88", "timestamp_ms": 1718000000000, "quantity": 10}`

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::error::FeedError;
use crate::types::Tick;

pub struct TickReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> TickReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl TickReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for TickReader<R> {
    type Item = Result<Tick, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(FeedError::Io(e))),
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed).map_err(|source| FeedError::Malformed {
                    line: self.line_no,
                    source,
                }),
            );
        }
    }
}
