//! Append-only violation log.
//!
//! The on-disk format is a single JSON array of entries, rewritten whole on
//! every append. An absent or unparseable store reads as empty rather than
//! failing the pipeline. Only the dispatcher worker writes; readers (the
//! export tool) open the file independently. Multi-process writers are not
//! coordinated.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViolationType {
    #[serde(rename = "No Helmet")]
    NoHelmet,
}

/// One successful plate read. Immutable once appended.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Unix seconds at job submission.
    pub timestamp: u64,
    pub plate_text: String,
    /// Best OCR confidence across the raw and normalized attempts.
    pub confidence: f32,
    /// Where the crop image was persisted.
    pub image_path: String,
    pub violation_type: ViolationType,
}

/// Append-only store contract: `append` reads the current contents (empty on
/// absence or corruption), concatenates preserving arrival order, and
/// rewrites the whole store; `read_all` returns the ordered list or empty.
/// No per-entry deletion or update.
pub trait EventLogStore: Send {
    fn append(&mut self, entries: &[LogEntry]) -> Result<()>;

    fn read_all(&mut self) -> Result<Vec<LogEntry>>;
}

// ----------------------------------------------------------------------------
// JSON file store
// ----------------------------------------------------------------------------

pub struct JsonFileEventLog {
    path: PathBuf,
}

impl JsonFileEventLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(anyhow!("event log path must not be empty"));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating event log dir {}", parent.display()))?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Vec<LogEntry> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!(
                    "event log {} unparseable, treating as empty: {}",
                    self.path.display(),
                    err
                );
                Vec::new()
            }
        }
    }
}

impl EventLogStore for JsonFileEventLog {
    fn append(&mut self, entries: &[LogEntry]) -> Result<()> {
        let mut all = self.load();
        all.extend_from_slice(entries);
        let json = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing event log {}", self.path.display()))?;
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<LogEntry>> {
        Ok(self.load())
    }
}

// ----------------------------------------------------------------------------
// In-memory store (tests)
// ----------------------------------------------------------------------------

/// In-memory store whose contents stay observable after the store itself
/// moves into the dispatcher worker.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the stored entries.
    pub fn handle(&self) -> Arc<Mutex<Vec<LogEntry>>> {
        self.entries.clone()
    }
}

impl EventLogStore for InMemoryEventLog {
    fn append(&mut self, entries: &[LogEntry]) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("event log poisoned"))?
            .extend_from_slice(entries);
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<LogEntry>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| anyhow!("event log poisoned"))?
            .clone())
    }
}
