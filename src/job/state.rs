use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("no baseline has been recorded yet")]
    Missing,
    #[error("state file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("state file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Where the baseline count lives between cycles.
pub trait StateStore {
    fn get_baseline(&self) -> Result<Option<u64>, StateError>;
    fn set_baseline(&mut self, count: u64) -> Result<(), StateError>;
}

/// Baseline held by a long-lived process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    count: Option<u64>,
}

impl StateStore for MemoryStore {
    fn get_baseline(&self) -> Result<Option<u64>, StateError> {
        Ok(self.count)
    }

    fn set_baseline(&mut self, count: u64) -> Result<(), StateError> {
        self.count = Some(count);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    count: u64,
    updated_at: DateTime<Utc>,
}

/// Baseline kept in a small JSON file, for one-cycle-per-process runs.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the target, so a reader sees either the old record or the new one. A
/// failed write leaves no temp file behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn get_baseline(&self) -> Result<Option<u64>, StateError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: StateRecord = serde_json::from_slice(&bytes)?;
        Ok(Some(record.count))
    }

    fn set_baseline(&mut self, count: u64) -> Result<(), StateError> {
        let record = StateRecord {
            count,
            updated_at: Utc::now(),
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&record)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), count, "baseline written");
        Ok(())
    }
}
