//! Append-only audit trail of finished operations
//!
//! One JSON object per line, written when an operation first reaches a
//! terminal state. Records are never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CoreError, OperationError, Result};
use crate::operation::{OperationId, OperationKind, OperationState, RemoteOperation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: OperationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub target: String,
    pub kind: OperationKind,
    pub state: OperationState,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl From<&RemoteOperation> for AuditRecord {
    fn from(op: &RemoteOperation) -> Self {
        Self {
            id: op.id,
            handle: op.handle.clone(),
            target: op.target.clone(),
            kind: op.kind,
            state: op.state,
            submitted_at: op.submitted_at,
            completed_at: op.completed_at,
            error: op.error.clone(),
        }
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// JSON-lines file sink
pub struct JsonLinesAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditLog {
    /// Open (or create) the log for appending
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("Audit log opened at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, skipping lines that do not parse
    pub fn read_all(path: &Path) -> Result<Vec<AuditRecord>> {
        let file = File::open(path)?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed audit line {} in {}: {}",
                    lineno + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }
}

impl AuditSink for JsonLinesAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| CoreError::Audit(std::io::Error::other(e)))?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| CoreError::Audit(std::io::Error::other("audit log lock poisoned")))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// In-memory sink, mostly for tests and dry runs
#[derive(Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}
