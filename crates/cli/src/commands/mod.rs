//! Command handlers for the viincci CLI.

pub mod credits;
pub mod domains;
pub mod history;
pub mod research;

pub use credits::CreditsCommand;
pub use domains::DomainsCommand;
pub use history::HistoryCommand;
pub use research::ResearchCommand;

use viincci_core::{AppConfig, AppResult};
use viincci_research::{CreditGovernor, CreditLedger, DomainCatalog};

/// Built-in domains plus the workspace's own profiles.
pub(crate) fn load_catalog(config: &AppConfig) -> AppResult<DomainCatalog> {
    DomainCatalog::load(&config.domains_dir())
}

/// Governor resumed from the workspace ledger.
pub(crate) fn load_governor(config: &AppConfig) -> AppResult<(CreditGovernor, CreditLedger)> {
    let ledger = CreditLedger::new(config.ledger_path());
    let record = ledger.load()?;
    tracing::debug!("Credit ledger: {} consumed", record.consumed);
    Ok((
        CreditGovernor::with_consumed(config.budget, record.consumed),
        ledger,
    ))
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
