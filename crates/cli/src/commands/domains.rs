//! Domains command handler.

use clap::{Args, Subcommand};
use viincci_core::{AppConfig, AppResult};
use viincci_research::DomainProfile;

use super::{load_catalog, print_json};

/// List or inspect domain profiles
#[derive(Args, Debug)]
pub struct DomainsCommand {
    #[command(subcommand)]
    pub action: Option<DomainsAction>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum DomainsAction {
    /// List available domains
    List,
    /// Show one domain profile
    Show {
        /// Domain name
        name: String,
    },
}

impl DomainsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let catalog = load_catalog(config)?;

        match &self.action {
            None | Some(DomainsAction::List) => {
                let profiles: Vec<&DomainProfile> = catalog.iter().collect();
                if self.json {
                    return print_json(&profiles);
                }
                for profile in profiles {
                    println!(
                        "{:<14} {} questions  {}",
                        profile.name,
                        profile.question_templates.len(),
                        profile.description
                    );
                }
            }
            Some(DomainsAction::Show { name }) => {
                let profile = catalog.get(name)?;
                if self.json {
                    return print_json(profile);
                }
                print_profile(profile);
            }
        }

        Ok(())
    }
}

fn print_profile(profile: &DomainProfile) {
    println!("{}", profile.name);
    if !profile.description.is_empty() {
        println!("  {}", profile.description);
    }

    println!("\nQuestions:");
    for template in &profile.question_templates {
        println!("  - {}", template);
    }

    if !profile.keyword_expansions.is_empty() {
        println!("\nKeywords: {}", profile.keyword_expansions.join(", "));
    }

    let trusted: Vec<&str> = profile
        .trusted_source_types
        .iter()
        .map(String::as_str)
        .collect();
    println!("Trusted source types: {}", trusted.join(", "));

    println!("\nReliability weights:");
    for (source_type, weight) in &profile.reliability_weights {
        println!("  {:<14} {:.2}", source_type, weight);
    }
}
