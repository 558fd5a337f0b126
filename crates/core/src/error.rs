//! Error types for the viincci research tool.
//!
//! This module defines a unified error enum covering every failure category of
//! the research pipeline: configuration, budget control, source fetching,
//! index construction, generation, storage and I/O.

use serde::Serialize;
use thiserror::Error;

/// Typed denial returned by the credit governor.
///
/// Carries how many credits the batch needed, how many were still available
/// and the difference between the two.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error(
    "Budget exceeded: requested {requested} credits but only {available} remain (short by {shortfall})"
)]
pub struct BudgetExceeded {
    /// Credits the rejected batch would have consumed
    pub requested: u64,

    /// Credits left under the limit at the time of the request
    pub available: u64,

    /// `requested - available`
    pub shortfall: u64,
}

impl BudgetExceeded {
    /// Build a denial from the requested and available credit counts.
    pub fn new(requested: u64, available: u64) -> Self {
        Self {
            requested,
            available,
            shortfall: requested.saturating_sub(available),
        }
    }
}

/// Unified error type for the viincci workspace.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed configuration, domain profile or missing secret
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The credit governor refused an authorization
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),

    /// A single source could not be searched or fetched
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Chunking, embedding or indexing of a source failed
    #[error("Index error: {0}")]
    Index(String),

    /// The index cannot serve queries in its current phase
    #[error("Index not ready: {0}")]
    NotReady(String),

    /// Embedding or generation model unavailable or errored
    #[error("Generation error: {0}")]
    Generation(String),

    /// The caller's cancellation token fired
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Persistence backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error is a budget denial.
    pub fn is_budget(&self) -> bool {
        matches!(self, AppError::Budget(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
