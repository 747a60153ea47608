//! Prediction record persistence.
//!
//! A record and its log entries are one value and are always written in a
//! single operation: the file store serializes the whole record to one JSON
//! line and appends it with one write followed by `sync_data`.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::{Result, StcError};
use crate::types::{Position, PredictionRecord};

pub trait RecordStore {
    /// Most recent record for `machine_id`/`position` created strictly before
    /// `before` and, when given, no earlier than `not_before`.
    fn latest_before(
        &self,
        machine_id: u32,
        position: Position,
        before: DateTime<Utc>,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Option<PredictionRecord>>;

    fn save(&self, record: &PredictionRecord) -> Result<()>;
}

fn matches(
    r: &PredictionRecord,
    machine_id: u32,
    position: Position,
    before: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
) -> bool {
    r.machine_id == machine_id
        && r.position == position
        && r.created_at < before
        && not_before.is_none_or(|nb| r.created_at >= nb)
}

fn newest<I: IntoIterator<Item = PredictionRecord>>(records: I) -> Option<PredictionRecord> {
    // later saves win ties on created_at
    records
        .into_iter()
        .fold(None, |best: Option<PredictionRecord>, r| match best {
            Some(b) if b.created_at > r.created_at => Some(b),
            _ => Some(r),
        })
}

/// In-memory store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<PredictionRecord>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PredictionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Make every subsequent `save` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl RecordStore for MemoryStore {
    fn latest_before(
        &self,
        machine_id: u32,
        position: Position,
        before: DateTime<Utc>,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Option<PredictionRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(newest(
            records
                .iter()
                .filter(|r| matches(r, machine_id, position, before, not_before))
                .cloned(),
        ))
    }

    fn save(&self, record: &PredictionRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StcError::Persistence("store unavailable".into()));
        }
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Append-only JSON-lines file, one record (with its logs) per line.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (and create parent directories for) the store file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StcError::Persistence(format!("create {}: {e}", parent.display()))
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable record in file order. Malformed lines are skipped.
    pub fn load_all(&self) -> Result<Vec<PredictionRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StcError::Persistence(format!(
                    "open {}: {e}",
                    self.path.display()
                )));
            }
        };
        let mut out = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                StcError::Persistence(format!("read {}: {e}", self.path.display()))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PredictionRecord>(&line) {
                Ok(r) => out.push(r),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping malformed record"
                ),
            }
        }
        Ok(out)
    }

    /// Check that the store file can be opened for appending.
    pub fn probe(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map(|_| ())
            .map_err(|e| StcError::Persistence(format!("open {}: {e}", self.path.display())))
    }
}

impl RecordStore for JsonlStore {
    fn latest_before(
        &self,
        machine_id: u32,
        position: Position,
        before: DateTime<Utc>,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Option<PredictionRecord>> {
        Ok(newest(
            self.load_all()?
                .into_iter()
                .filter(|r| matches(r, machine_id, position, before, not_before)),
        ))
    }

    fn save(&self, record: &PredictionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| StcError::Persistence(format!("serialize record: {e}")))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StcError::Persistence(format!("open {}: {e}", self.path.display())))?;
        file.write_all(&line)
            .and_then(|()| file.sync_data())
            .map_err(|e| StcError::Persistence(format!("write {}: {e}", self.path.display())))?;
        tracing::debug!(
            path = %self.path.display(),
            machine_id = record.machine_id,
            position = %record.position,
            logs = record.logs.len(),
            "record saved"
        );
        Ok(())
    }
}
