//! SQLite store for past research runs.
//!
//! Optional: research and indexing work entirely in memory; the store only
//! lets a later run rebuild its index without spending credits.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use viincci_core::{AppError, AppResult, Source};

use crate::orchestrator::ResearchOutcome;

/// Listing entry for a stored run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub topic: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub source_count: usize,
    pub queries_issued: u64,
    pub credits_spent: u64,
    pub partial: bool,
}

/// Handle to the research database.
pub struct ResearchStore {
    conn: Connection,
}

impl ResearchStore {
    /// Open (and create if needed) the store at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open research store: {}", e)))?;

        let store = Self { conn };
        store.init()?;
        tracing::debug!("Opened research store at {:?}", db_path);
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open research store: {}", e)))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> AppResult<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    topic TEXT NOT NULL,
                    domain TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    queries_issued INTEGER NOT NULL,
                    credits_spent INTEGER NOT NULL,
                    partial INTEGER NOT NULL,
                    stop_reason TEXT
                );

                CREATE TABLE IF NOT EXISTS sources (
                    run_id TEXT NOT NULL,
                    rank INTEGER NOT NULL,
                    url TEXT NOT NULL,
                    title TEXT NOT NULL,
                    raw_text TEXT NOT NULL,
                    source_type TEXT NOT NULL,
                    reliability_score REAL NOT NULL,
                    trusted INTEGER NOT NULL,
                    fetched_at TEXT NOT NULL,
                    query TEXT NOT NULL,
                    PRIMARY KEY (run_id, rank),
                    FOREIGN KEY (run_id) REFERENCES runs(id)
                );
                "#,
            )
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))
    }

    /// Persist a finished run; returns its id.
    pub fn save_run(&mut self, outcome: &ResearchOutcome) -> AppResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let stop_reason = outcome
            .stop_reason
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let tx = self
            .conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO runs (id, topic, domain, created_at, queries_issued, credits_spent, partial, stop_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                outcome.topic,
                outcome.domain,
                Utc::now().to_rfc3339(),
                outcome.queries_issued as i64,
                outcome.credits_spent as i64,
                outcome.is_partial(),
                stop_reason,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to insert run: {}", e)))?;

        for (rank, source) in outcome.sources.iter().enumerate() {
            tx.execute(
                "INSERT INTO sources (run_id, rank, url, title, raw_text, source_type, reliability_score, trusted, fetched_at, query)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    rank as i64,
                    source.url,
                    source.title,
                    source.raw_text,
                    source.source_type,
                    source.reliability_score as f64,
                    source.trusted,
                    source.fetched_at.to_rfc3339(),
                    source.query,
                ],
            )
            .map_err(|e| AppError::Storage(format!("Failed to insert source: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Storage(format!("Failed to commit run: {}", e)))?;

        tracing::info!("Saved research run {} ({} sources)", id, outcome.sources.len());
        Ok(id)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> AppResult<Vec<RunSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.id, r.topic, r.domain, r.created_at, r.queries_issued, r.credits_spent, r.partial,
                        (SELECT COUNT(*) FROM sources s WHERE s.run_id = r.id)
                 FROM runs r
                 ORDER BY r.created_at DESC, r.rowid DESC
                 LIMIT ?1",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunSummary {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    domain: row.get(2)?,
                    created_at: parse_timestamp(row.get::<_, String>(3)?),
                    queries_issued: row.get::<_, i64>(4)? as u64,
                    credits_spent: row.get::<_, i64>(5)? as u64,
                    partial: row.get(6)?,
                    source_count: row.get::<_, i64>(7)? as usize,
                })
            })
            .map_err(|e| AppError::Storage(format!("Failed to list runs: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to read run: {}", e)))
    }

    /// Sources of a stored run, in rank order.
    pub fn load_sources(&self, run_id: &str) -> AppResult<Vec<Source>> {
        let exists: Option<String> = self
            .conn
            .query_row("SELECT id FROM runs WHERE id = ?1", params![run_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to look up run: {}", e)))?;

        if exists.is_none() {
            return Err(AppError::Storage(format!("Research run not found: {}", run_id)));
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT url, title, raw_text, source_type, reliability_score, trusted, fetched_at, query
                 FROM sources WHERE run_id = ?1 ORDER BY rank",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(Source {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    raw_text: row.get(2)?,
                    source_type: row.get(3)?,
                    reliability_score: row.get::<_, f64>(4)? as f32,
                    trusted: row.get(5)?,
                    fetched_at: parse_timestamp(row.get::<_, String>(6)?),
                    query: row.get(7)?,
                })
            })
            .map_err(|e| AppError::Storage(format!("Failed to load sources: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to read source: {}", e)))
    }
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
