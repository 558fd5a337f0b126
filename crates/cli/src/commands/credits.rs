//! Credits command handler.
//!
//! Shows the search budget and what researching a domain would cost.

use clap::Args;
use serde::Serialize;
use viincci_core::{AppConfig, AppResult};
use viincci_research::{BudgetSnapshot, CostEstimate};

use super::{load_catalog, load_governor, print_json};

/// Show the search credit budget
#[derive(Args, Debug)]
pub struct CreditsCommand {
    /// Estimate the cost of one research session in this domain
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Zero the consumed credit count
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreditsReport {
    budget: BudgetSnapshot,
    cost_per_query: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimate: Option<CostEstimate>,
}

impl CreditsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing credits command");

        let (governor, ledger) = load_governor(config)?;
        if self.reset {
            ledger.reset()?;
            governor.reset();
            tracing::info!("Credit ledger reset");
        }

        let estimate = match &self.domain {
            Some(name) => {
                let catalog = load_catalog(config)?;
                let profile = catalog.get(name)?;
                let queries = profile.question_templates.len() as u64;
                Some(governor.estimate(&profile.name, queries))
            }
            None => None,
        };

        let report = CreditsReport {
            budget: governor.snapshot(),
            cost_per_query: config.budget.cost_per_query,
            estimate,
        };

        if self.json {
            return print_json(&report);
        }

        let budget = &report.budget;
        println!(
            "Credits: {} of {} used, {} remaining [{}]",
            budget.consumed, budget.limit, budget.remaining, budget.status
        );
        println!("Cost per query: {}", report.cost_per_query);

        if let Some(estimate) = &report.estimate {
            println!(
                "Domain '{}': {} queries, {} credits ({})",
                estimate.topic,
                estimate.queries_needed,
                estimate.credits_needed,
                if estimate.can_afford {
                    "affordable"
                } else {
                    "exceeds remaining budget"
                }
            );
        }

        Ok(())
    }
}
