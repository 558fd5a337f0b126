//! Persistent record of credits consumed across runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use viincci_core::{AppError, AppResult};

/// On-disk ledger contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub consumed: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for LedgerRecord {
    fn default() -> Self {
        Self {
            consumed: 0,
            updated_at: Utc::now(),
        }
    }
}

/// JSON file holding the consumed credit count.
#[derive(Debug, Clone)]
pub struct CreditLedger {
    path: PathBuf,
}

impl CreditLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the ledger; a missing file means nothing consumed yet.
    pub fn load(&self) -> AppResult<LedgerRecord> {
        if !self.path.exists() {
            return Ok(LedgerRecord::default());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::Storage(format!("Failed to read credit ledger {:?}: {}", self.path, e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            AppError::Storage(format!("Corrupt credit ledger {:?}: {}", self.path, e))
        })
    }

    /// Persist `consumed`.
    pub fn save(&self, consumed: u64) -> AppResult<LedgerRecord> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = LedgerRecord {
            consumed,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, json).map_err(|e| {
            AppError::Storage(format!("Failed to write credit ledger {:?}: {}", self.path, e))
        })?;

        tracing::debug!("Credit ledger saved: {} consumed", consumed);
        Ok(record)
    }

    /// Zero the ledger.
    pub fn reset(&self) -> AppResult<LedgerRecord> {
        self.save(0)
    }
}
