//! viincci CLI
//!
//! Main entry point for the viincci command-line tool.
//! Researches a topic on the web under a credit budget and answers
//! questions from the gathered sources.

mod commands;

use clap::{Parser, Subcommand};
use commands::{CreditsCommand, DomainsCommand, HistoryCommand, ResearchCommand};
use std::path::PathBuf;
use viincci_core::{logging, AppConfig, AppResult};

/// viincci - budget-aware web research with retrieval-augmented answers
#[derive(Parser, Debug)]
#[command(name = "viincci")]
#[command(about = "Budget-aware web research with retrieval-augmented answers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "VIINCCI_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file (default: <workspace>/.viincci/config.yaml)
    #[arg(short, long, global = true, env = "VIINCCI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generation model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a topic and optionally answer a question about it
    Research(ResearchCommand),

    /// Show the search credit budget
    Credits(CreditsCommand),

    /// List or inspect domain profiles
    Domains(DomainsCommand),

    /// Show stored research runs
    History(HistoryCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Config file and environment, then CLI overrides
    let config = AppConfig::load_from(cli.workspace, cli.config)?.with_overrides(
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.json_logs)?;

    tracing::info!("viincci starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Model: {}", config.llm.model);

    config.ensure_viincci_dir()?;

    let command_name = match &cli.command {
        Commands::Research(_) => "research",
        Commands::Credits(_) => "credits",
        Commands::Domains(_) => "domains",
        Commands::History(_) => "history",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Research(cmd) => cmd.execute(&config).await,
        Commands::Credits(cmd) => cmd.execute(&config),
        Commands::Domains(cmd) => cmd.execute(&config),
        Commands::History(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
