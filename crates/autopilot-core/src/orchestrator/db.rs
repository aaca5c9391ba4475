//! Persistent store for execution logs using redb.
//!
//! # Table design
//!
//! A single `RUNS` table uses a 24-byte composite key:
//! ```text
//! [ timestamp_ms: u64 big-endian (8 bytes) | uuid: 16 bytes ]
//! ```
//!
//! With the timestamp in the high bytes, byte ordering equals creation-time
//! ordering, so listing recent runs is a reverse scan with no sorting pass.
//! The value is the JSON-encoded `ExecutionLog`; a run is inserted while
//! still `running` and overwritten in place exactly once at finalization.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::execution::{ExecutionLog, RunStatus};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: 24-byte composite (timestamp_ms big-endian ++ uuid bytes)
/// Value: JSON-encoded ExecutionLog
const RUNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("runs");

fn run_key(log: &ExecutionLog) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = log.timestamp.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(log.id.as_bytes());
    key
}

fn db_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::RunDb(e.to_string())
}

// ---------------------------------------------------------------------------
// RunDb
// ---------------------------------------------------------------------------

/// Persistent store for `ExecutionLog` records.
pub struct RunDb {
    db: Database,
}

impl RunDb {
    /// Open or create the redb database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(RUNS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    fn put(&self, log: &ExecutionLog) -> Result<()> {
        let key = run_key(log);
        let value = serde_json::to_vec(log).map_err(db_err)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(RUNS).map_err(db_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Persist a freshly created log, still in `running` state.
    pub fn insert(&self, log: &ExecutionLog) -> Result<()> {
        self.put(log)
    }

    /// Overwrite the stored record with its terminal shape. Fails with
    /// `AlreadyFinalized` if the stored record already left `running` —
    /// the one-finalization-per-log invariant lives here.
    pub fn finalize(&self, log: &ExecutionLog) -> Result<()> {
        let stored = self.get(log.id)?;
        if stored.status.is_terminal() {
            return Err(PipelineError::AlreadyFinalized(log.id));
        }
        self.put(log)
    }

    pub fn get(&self, id: Uuid) -> Result<ExecutionLog> {
        self.scan(|log| log.id == id)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::RunNotFound(id.to_string()))
    }

    /// Most recent runs first, at most `limit`.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionLog>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RUNS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)?.rev() {
            if result.len() >= limit {
                break;
            }
            let (_, v) = entry.map_err(db_err)?;
            let log: ExecutionLog = serde_json::from_slice(v.value()).map_err(db_err)?;
            result.push(log);
        }
        Ok(result)
    }

    /// All runs owned by one automation, most recent first.
    pub fn list_for_automation(&self, automation_id: Uuid) -> Result<Vec<ExecutionLog>> {
        let mut result = self.scan(|log| log.automation_id == Some(automation_id))?;
        result.reverse();
        Ok(result)
    }

    fn scan(&self, keep: impl Fn(&ExecutionLog) -> bool) -> Result<Vec<ExecutionLog>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RUNS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let log: ExecutionLog = serde_json::from_slice(v.value()).map_err(db_err)?;
            if keep(&log) {
                result.push(log);
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
