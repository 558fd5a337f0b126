//! Research command handler.
//!
//! Runs a research session (or loads a stored one), builds the RAG index
//! from its sources and optionally answers a question.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use viincci_core::{AppConfig, AppError, AppResult, BudgetExceeded, Source};
use viincci_knowledge::{
    create_provider, Answer, BuildReport, GenerationParams, RagEngine, RagStats,
};
use viincci_research::{
    BudgetSnapshot, DomainProfile, HttpFetcher, ResearchOrchestrator, ResearchOutcome,
    ResearchStore, SerpApiProvider, StopReason,
};

use super::{load_catalog, load_governor, print_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Markdown,
}

/// Research a topic and optionally answer a question about it
#[derive(Args, Debug)]
pub struct ResearchCommand {
    /// Topic to research
    pub topic: String,

    /// Domain profile name
    #[arg(short, long, default_value = "botany")]
    pub domain: String,

    /// Load the domain profile from a JSON file instead
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Maximum number of sources to gather
    #[arg(long, default_value_t = 10)]
    pub max_sources: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Generate an answer from the gathered sources
    #[arg(long)]
    pub generate: bool,

    /// Question to answer (implies --generate)
    #[arg(short, long)]
    pub question: Option<String>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Maximum tokens to generate
    #[arg(long, default_value_t = 2000)]
    pub max_new_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Stop issuing queries and skip generation after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Store the run in the workspace database
    #[arg(long)]
    pub save: bool,

    /// Reuse the sources of a stored run instead of searching
    #[arg(long, conflicts_with = "save")]
    pub from_run: Option<String>,

    /// Start even when the estimate exceeds the remaining budget
    #[arg(long)]
    pub allow_partial: bool,
}

/// Everything the command prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    pub topic: String,
    pub domain: String,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ResearchOutcome>,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<BuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RagStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
}

impl ResearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing research command for topic '{}'", self.topic);

        let profile = self.resolve_profile(config)?;
        let cancel = CancellationToken::new();
        if let Some(secs) = self.deadline_secs {
            let deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!("Deadline of {}s reached", secs);
                deadline.cancel();
            });
        }

        let mut report = match &self.from_run {
            Some(run_id) => self.load_run(config, &profile, run_id)?,
            None => self.run_research(config, &profile, &cancel).await?,
        };

        let engine = if report.sources.is_empty() {
            tracing::warn!("No sources gathered; skipping indexing");
            None
        } else {
            let embedder = create_provider(&config.embedding).await?;
            let generator = viincci_llm::create_client(&config.llm)?;
            let engine = RagEngine::new(config.rag, embedder, generator, config.llm.model.clone());
            index_sources(&engine, &mut report).await?;
            Some(engine)
        };

        if self.generate || self.question.is_some() {
            match &engine {
                Some(engine) => self.answer(engine, config, &mut report, &cancel).await?,
                None => tracing::warn!("Nothing indexed; skipping generation"),
            }
        }

        self.print(&report)?;

        if let Some(outcome) = report.outcome.as_ref().filter(|o| o.budget_blocked()) {
            let remaining = report.budget.map(|b| b.remaining).unwrap_or(0);
            return Err(blocked_error(
                outcome,
                config.budget.cost_per_query,
                remaining,
            ));
        }

        Ok(())
    }

    fn resolve_profile(&self, config: &AppConfig) -> AppResult<DomainProfile> {
        match &self.profile {
            Some(path) => DomainProfile::from_file(path),
            None => load_catalog(config)?.get(&self.domain).cloned(),
        }
    }

    fn load_run(
        &self,
        config: &AppConfig,
        profile: &DomainProfile,
        run_id: &str,
    ) -> AppResult<ResearchReport> {
        let store = ResearchStore::open(&config.store_path())?;
        let sources = store.load_sources(run_id)?;
        tracing::info!("Loaded {} sources from run {}", sources.len(), run_id);

        Ok(ResearchReport {
            topic: self.topic.clone(),
            domain: profile.name.clone(),
            partial: false,
            run_id: Some(run_id.to_string()),
            budget: None,
            outcome: None,
            sources,
            index: None,
            stats: None,
            answer: None,
        })
    }

    async fn run_research(
        &self,
        config: &AppConfig,
        profile: &DomainProfile,
        cancel: &CancellationToken,
    ) -> AppResult<ResearchReport> {
        let (governor, ledger) = load_governor(config)?;
        let governor = Arc::new(governor);

        let api_key = config.resolve_search_api_key()?;
        let search = Arc::new(SerpApiProvider::new(api_key, &config.search)?);
        let fetcher = Arc::new(HttpFetcher::new(&config.search)?);
        let orchestrator = ResearchOrchestrator::new(
            Arc::clone(&governor),
            search,
            fetcher,
            config.search.clone(),
        );

        let queries = orchestrator.build_queries(&self.topic, profile);
        let estimate = governor.estimate(&self.topic, queries.len() as u64);
        tracing::info!(
            "Estimate: {} queries, {} credits needed, {} available",
            estimate.queries_needed,
            estimate.credits_needed,
            estimate.credits_available
        );

        if !estimate.can_afford {
            if !self.allow_partial {
                return Err(AppError::Budget(BudgetExceeded::new(
                    estimate.credits_needed,
                    estimate.credits_available,
                )));
            }
            tracing::warn!("Estimate exceeds remaining budget; continuing with partial research");
        }

        let result = orchestrator
            .research_with_cancel(&self.topic, profile, self.max_sources, cancel)
            .await;

        // Record whatever was consumed, even on error
        ledger.save(governor.consumed())?;
        let outcome = result?;

        let run_id = if self.save {
            let mut store = ResearchStore::open(&config.store_path())?;
            Some(store.save_run(&outcome)?)
        } else {
            None
        };

        Ok(ResearchReport {
            topic: outcome.topic.clone(),
            domain: outcome.domain.clone(),
            partial: outcome.is_partial(),
            run_id,
            budget: Some(governor.snapshot()),
            sources: outcome.sources.clone(),
            outcome: Some(outcome),
            index: None,
            stats: None,
            answer: None,
        })
    }

    async fn answer(
        &self,
        engine: &RagEngine,
        config: &AppConfig,
        report: &mut ResearchReport,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        let question = self
            .question
            .clone()
            .unwrap_or_else(|| format!("What is known about {}?", self.topic));
        let params = GenerationParams {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };
        let k = self.top_k.unwrap_or(config.rag.top_k);

        match engine.query_with_cancel(&question, k, params, cancel).await {
            Ok(answer) => report.answer = Some(answer),
            Err(AppError::Cancelled(reason)) => {
                tracing::warn!("Generation skipped: {}", reason);
                report.partial = true;
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    fn print(&self, report: &ResearchReport) -> AppResult<()> {
        match self.format {
            OutputFormat::Json => print_json(report),
            OutputFormat::Text => {
                print!("{}", render_text(report));
                Ok(())
            }
            OutputFormat::Markdown => {
                print!("{}", render_markdown(report));
                Ok(())
            }
        }
    }
}

/// Build the index from the report's sources and record the outcome.
async fn index_sources(engine: &RagEngine, report: &mut ResearchReport) -> AppResult<()> {
    let built = engine.build_index(&report.sources).await?;
    for failure in &built.failures {
        tracing::warn!("Not indexed: {} ({})", failure.source_url, failure.reason);
    }
    report.index = Some(built);
    report.stats = Some(engine.stats().await);
    Ok(())
}

fn blocked_error(outcome: &ResearchOutcome, cost_per_query: u64, remaining: u64) -> AppError {
    match &outcome.stop_reason {
        Some(StopReason::BudgetDenied(denial)) => AppError::Budget(*denial),
        _ => AppError::Budget(BudgetExceeded::new(cost_per_query, remaining)),
    }
}

fn summary_line(report: &ResearchReport) -> String {
    let mut line = format!(
        "{} sources on '{}' ({})",
        report.sources.len(),
        report.topic,
        report.domain
    );
    if let Some(outcome) = &report.outcome {
        line.push_str(&format!(
            ", {} queries, {} credits",
            outcome.queries_issued, outcome.credits_spent
        ));
    }
    if let Some(run_id) = &report.run_id {
        line.push_str(&format!(", run {}", run_id));
    }
    line
}

fn index_line(report: &ResearchReport) -> Option<String> {
    let stats = report.stats.as_ref()?;
    let mut line = format!(
        "Indexed {} chunks from {} sources ({}, {}/{})",
        stats.chunks, stats.sources, stats.phase, stats.embedding_provider, stats.embedding_model
    );
    if let Some(index) = report.index.as_ref().filter(|i| !i.failures.is_empty()) {
        line.push_str(&format!(", {} not indexed", index.failures.len()));
    }
    Some(line)
}

fn partial_note(report: &ResearchReport) -> Option<String> {
    if !report.partial {
        return None;
    }
    let reason = report
        .outcome
        .as_ref()
        .and_then(|o| o.stop_reason.as_ref())
        .map(|r| r.to_string())
        .unwrap_or_else(|| "fewer sources than requested".to_string());
    Some(format!("PARTIAL RESULT: {}", reason))
}

pub(crate) fn render_text(report: &ResearchReport) -> String {
    let mut out = String::new();
    if let Some(note) = partial_note(report) {
        out.push_str(&format!("{}\n", note));
    }
    out.push_str(&format!("{}\n\n", summary_line(report)));

    for (i, source) in report.sources.iter().enumerate() {
        out.push_str(&format!(
            "{:>2}. [{:.2} {}{}] {}\n    {}\n",
            i + 1,
            source.reliability_score,
            source.source_type,
            if source.trusted { ", trusted" } else { "" },
            source.label(),
            source.url
        ));
    }

    if let Some(outcome) = &report.outcome {
        for degraded in &outcome.degraded {
            out.push_str(&format!(
                "  skipped {} after {} attempt(s): {}\n",
                degraded.target, degraded.attempts, degraded.reason
            ));
        }
    }

    if let Some(line) = index_line(report) {
        out.push_str(&format!("\n{}\n", line));
    }

    if let Some(answer) = &report.answer {
        out.push_str(&format!("\nQ: {}\n\n{}\n", answer.question, answer.text.trim()));
        out.push_str("\nSources:\n");
        for (i, cited) in answer.citations.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {} ({:.3})\n",
                i + 1,
                cited.chunk.source_label(),
                cited.score
            ));
        }
    }

    out
}

pub(crate) fn render_markdown(report: &ResearchReport) -> String {
    let mut out = format!("# {}\n\n", report.topic);
    if let Some(note) = partial_note(report) {
        out.push_str(&format!("> **{}**\n\n", note));
    }
    out.push_str(&format!("_{}_\n\n", summary_line(report)));
    if let Some(line) = index_line(report) {
        out.push_str(&format!("_{}_\n\n", line));
    }

    if let Some(answer) = &report.answer {
        out.push_str(&format!("## {}\n\n{}\n\n", answer.question, answer.text.trim()));
        if !answer.citations.is_empty() {
            out.push_str("### Cited sources\n\n");
            for (i, cited) in answer.citations.iter().enumerate() {
                out.push_str(&format!(
                    "{}. [{}]({})\n",
                    i + 1,
                    cited.chunk.source_label(),
                    cited.chunk.source_url
                ));
            }
            out.push('\n');
        }
    }

    out.push_str("## Sources\n\n");
    for source in &report.sources {
        out.push_str(&format!(
            "- [{}]({}) ({}, reliability {:.2})\n",
            source.label(),
            source.url,
            source.source_type,
            source.reliability_score
        ));
    }

    out
}
