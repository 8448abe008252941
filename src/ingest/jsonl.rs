//! JSON-lines observation source.
//!
//! Each non-blank line holds one frame:
//!
//! ```text
//! {"frame": 12, "objects": [{"bbox": [380, 100, 420, 140], "id": 7, "class": "car"}]}
//! ```
//!
//! `frame` is optional. Missing ids, `null` ids and negative ids all mean the
//! tracker had no stable identity for that object.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Result};

use super::{ObservationSource, SourceStats};
use crate::observation::TrackedFrame;

pub struct JsonLinesSource<R> {
    name: String,
    reader: R,
    line_no: u64,
    buf: String,
    stats: SourceStats,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(name: &str, reader: R) -> Self {
        Self {
            name: name.to_string(),
            reader,
            line_no: 0,
            buf: String::new(),
            stats: SourceStats::default(),
        }
    }
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a local file. URL schemes are rejected.
    pub fn open(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        if display.contains("://") {
            return Err(anyhow!(
                "observation input must be a local path, got {}",
                display
            ));
        }
        let file = File::open(path)
            .map_err(|e| anyhow!("failed to open observation file {}: {}", display, e))?;
        log::info!("JsonLinesSource: reading {}", display);
        Ok(Self::new(&display, BufReader::new(file)))
    }
}

impl<R: BufRead> ObservationSource for JsonLinesSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<TrackedFrame>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|e| anyhow!("{}: read failed after line {}: {}", self.name, self.line_no, e))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            let frame: TrackedFrame = serde_json::from_str(line).map_err(|e| {
                anyhow!("{}: invalid frame on line {}: {}", self.name, self.line_no, e)
            })?;
            self.stats.record(&frame);
            return Ok(Some(frame));
        }
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
