//! Append-only JSONL event log.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{ArborError, Result};
use crate::events::{EngineEvent, EventSink};

/// JSONL log writer for engine events.
///
/// One event per line, appended. The CLI writes to `<data_dir>/events.log`.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create a log writing to the given path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append an event to the log.
    pub fn append(&self, event: &EngineEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArborError::storage(parent, e))?;
        }

        let json = serde_json::to_string(event)
            .map_err(|e| ArborError::serde(format!("failed to serialize event: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArborError::storage(&self.path, e))?;

        writeln!(file, "{}", json).map_err(|e| ArborError::storage(&self.path, e))?;
        Ok(())
    }

    /// Read all events from the log.
    ///
    /// The log is streamed line by line; it grows with every notification
    /// and has no size cap.
    pub fn read_all(&self) -> Result<Vec<EngineEvent>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArborError::storage(&self.path, e)),
        };

        let mut events = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ArborError::storage(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let event: EngineEvent = serde_json::from_str(&line).map_err(|e| {
                ArborError::serde(format!(
                    "failed to parse event on line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: &EngineEvent) -> Result<()> {
        self.append(event)
    }
}
