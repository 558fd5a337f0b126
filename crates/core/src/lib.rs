//! Viincci Core Library
//!
//! This crate provides the foundational utilities shared by every viincci crate:
//! - Error handling (`AppError`, `AppResult`, `BudgetExceeded`)
//! - Logging infrastructure
//! - Configuration management
//! - The `Source` record passed from research to indexing

pub mod config;
pub mod error;
pub mod logging;
pub mod source;

// Re-export commonly used types
pub use config::{AppConfig, BudgetConfig, EmbeddingConfig, LlmConfig, RagConfig, SearchConfig};
pub use error::{AppError, AppResult, BudgetExceeded};
pub use source::Source;
