use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{EngineState, TradeRecord};

/// Append-only trade log, one JSON record per line.
///
/// The log is the authoritative record set: statistics are recomputed from it
/// (or from the in-memory mirror) rather than from running accumulators, so a
/// write failure here is a reporting gap that must reach the operator.
pub struct TradeLog {
    path: PathBuf,
    file: File,
}

impl TradeLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), "trade log opened");

        Ok(Self { path, file })
    }

    pub fn append(&mut self, record: &TradeRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        Ok(())
    }

    /// Replay every record in the log, for independent reporting.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Advisory status snapshot for external observers, overwritten per update.
/// Not authoritative; readers must tolerate it lagging or missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub market: String,
    pub state: EngineState,
    pub ema: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, snapshot: &StatusSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, json).map_err(EngineError::from)
    }
}
