//! Append-only audit trail
//!
//! One record per completed task invocation: task, command, wall-clock
//! window, outcome. Thread-safe by construction; never read back by the
//! core. A write failure on the file sink must not fail the task - it is
//! reported through `tracing::warn!` and otherwise swallowed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of one task invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Succeeded,
    Failed,
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub task_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: AuditStatus,
}

impl AuditRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Thread-safe, append-only audit log with an optional JSON-lines file sink
#[derive(Clone)]
pub struct AuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
    sink: Option<Arc<Mutex<File>>>,
}

impl AuditLog {
    /// In-memory log with no file sink
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            sink: None,
        }
    }

    /// Log that also appends JSON lines to `path`
    pub fn with_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            records: Arc::new(RwLock::new(Vec::new())),
            sink: Some(Arc::new(Mutex::new(file))),
        })
    }

    /// Append one record; sink errors never propagate to the caller
    pub fn record(&self, record: AuditRecord) {
        if let Some(sink) = &self.sink {
            if let Err(e) = Self::write_line(&mut sink.lock(), &record) {
                warn!(task = %record.task_id, error = %e, "audit sink write failed");
            }
        }
        self.records.write().push(record);
    }

    fn write_line(file: &mut File, record: &AuditRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(file, "{line}")
    }

    /// Snapshot of all records (cloned)
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Records for one task
    pub fn filter_task(&self, task_id: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.task_id == task_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("len", &self.len())
            .field("file_sink", &self.sink.is_some())
            .finish()
    }
}

static GLOBAL: Lazy<AuditLog> = Lazy::new(AuditLog::new);

/// Process-wide audit log shared by all runners that do not carry their own
pub fn global() -> &'static AuditLog {
    &GLOBAL
}
