//! History command handler.

use clap::Args;
use viincci_core::{AppConfig, AppResult};
use viincci_research::ResearchStore;

use super::print_json;

/// Show stored research runs
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// Maximum number of runs to show
    #[arg(short, long, default_value_t = 20)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HistoryCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store = ResearchStore::open(&config.store_path())?;
        let runs = store.list_runs(self.limit)?;

        if self.json {
            return print_json(&runs);
        }

        if runs.is_empty() {
            println!("No stored research runs. Use `viincci research <TOPIC> --save`.");
            return Ok(());
        }

        for run in runs {
            println!(
                "{}  {}  {} [{}]  {} sources, {} credits{}",
                run.id,
                run.created_at.format("%Y-%m-%d %H:%M"),
                run.topic,
                run.domain,
                run.source_count,
                run.credits_spent,
                if run.partial { "  (partial)" } else { "" }
            );
        }

        Ok(())
    }
}
