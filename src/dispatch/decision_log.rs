// Append-only record of routing decisions, flushed to SQLite at shutdown

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// One dispatched request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub input_len: u32,
    pub output_len: Option<u32>,
    pub gpu_type: String,
    pub address: String,
}

/// In-memory decision log shared by all dispatch handlers.
///
/// Grows without bound for the lifetime of the process.
#[derive(Default)]
pub struct DecisionLog {
    records: Mutex<Vec<DecisionRecord>>,
    per_backend: DashMap<String, AtomicU64>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: DecisionRecord) {
        self.per_backend
            .entry(record.gpu_type.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record so far, in append order
    pub fn snapshot(&self) -> Vec<DecisionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of decisions per accelerator label
    pub fn counts_by_backend(&self) -> BTreeMap<String, u64> {
        self.per_backend
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Write all records to the `decisions` table of the SQLite file at `path`.
    ///
    /// Returns the number of rows written.
    pub fn flush_to_sqlite(&self, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                input_len INTEGER NOT NULL,
                output_len INTEGER,
                gpu_type TEXT NOT NULL,
                address TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create decisions table")?;

        let records = self.snapshot();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO decisions (timestamp, input_len, output_len, gpu_type, address)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in &records {
                stmt.execute(rusqlite::params![
                    record.timestamp.to_rfc3339(),
                    record.input_len,
                    record.output_len,
                    record.gpu_type,
                    record.address,
                ])?;
            }
        }
        tx.commit().context("Failed to commit decision log")?;

        Ok(records.len())
    }
}
