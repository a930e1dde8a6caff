//! Append-only NDJSON log of [`TickRecord`]s, one record per line.

use crate::{FeedbackError, Result};
use sentinel_core::{TickRecord, TickSink};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct TickLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl TickLog {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `record` as a single line.
    pub fn append(&self, record: &TickRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    /// Reads back every record written so far.
    pub fn read_all(&self) -> Result<Vec<TickRecord>> {
        read_records(&self.path)
    }
}

impl TickSink for TickLog {
    fn record(&self, record: &TickRecord) -> io::Result<()> {
        self.append(record)
    }
}

/// Reads a tick log file. Blank lines are skipped.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<TickRecord>> {
    let file = File::open(path)?;
    parse_records(BufReader::new(file))
}

/// Parses NDJSON tick records; the first malformed line aborts with its
/// 1-based line number.
pub fn parse_records(reader: impl BufRead) -> Result<Vec<TickRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| FeedbackError::Parse {
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
