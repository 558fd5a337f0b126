//! Budget-aware web research.
//!
//! Provides the credit governor that meters paid searches, the orchestrator
//! that turns a topic and a domain profile into ranked sources, and the
//! supporting pieces: domain catalog, search and fetch capabilities, URL
//! normalization, credit ledger and research store.

pub mod classify;
pub mod fetch;
pub mod governor;
pub mod ledger;
pub mod normalize;
pub mod orchestrator;
pub mod profile;
pub mod retry;
pub mod search;
pub mod store;


// Re-export commonly used types
pub use fetch::{ContentFetcher, FetchError, FetchedPage, HttpFetcher};
pub use governor::{Authorization, BudgetSnapshot, BudgetStatus, CostEstimate, CreditGovernor};
pub use ledger::{CreditLedger, LedgerRecord};
pub use orchestrator::{
    DegradedSource, DegradedStage, ResearchOrchestrator, ResearchOutcome, StopReason,
};
pub use profile::{DomainCatalog, DomainProfile};
pub use search::{SearchError, SearchHit, SearchProvider, SerpApiProvider};
pub use store::{ResearchStore, RunSummary};
