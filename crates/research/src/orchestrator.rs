//! Budget-aware research orchestration.
//!
//! Turns a topic and a [`DomainProfile`] into a deduplicated,
//! reliability-ranked list of [`Source`]s. Every metered query is authorized
//! by the [`CreditGovernor`] before it is issued; a denial or an exhausted
//! budget ends the session with the sources gathered so far.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use viincci_core::{AppError, AppResult, BudgetExceeded, SearchConfig, Source};

use crate::classify::classify_host;
use crate::fetch::{truncate_chars, ContentFetcher, FetchError};
use crate::governor::{BudgetStatus, CreditGovernor};
use crate::normalize::{check_candidate, host_of, normalize_url};
use crate::profile::DomainProfile;
use crate::retry::RetryPolicy;
use crate::search::{SearchHit, SearchProvider};

/// Why a session stopped issuing queries before running every template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The governor reported EXHAUSTED before a query
    BudgetExhausted,
    /// The governor refused an authorization
    BudgetDenied(BudgetExceeded),
    /// The caller's token fired
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "budget exhausted"),
            Self::BudgetDenied(denial) => write!(f, "{}", denial),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Pipeline stage at which a source was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStage {
    Search,
    Fetch,
}

/// A query or page that was skipped after failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedSource {
    /// Query text or URL
    pub target: String,
    pub stage: DegradedStage,
    pub reason: String,
    pub attempts: u32,
}

/// Everything a research session produced.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    pub topic: String,
    pub domain: String,
    /// Ranked by reliability, highest first
    pub sources: Vec<Source>,
    /// `max_sources` the caller asked for
    pub requested: usize,
    pub queries_issued: u64,
    pub credits_spent: u64,
    pub stop_reason: Option<StopReason>,
    pub degraded: Vec<DegradedSource>,
}

impl ResearchOutcome {
    /// Fewer sources than requested, or stopped early.
    pub fn is_partial(&self) -> bool {
        self.stop_reason.is_some() || self.sources.len() < self.requested
    }

    /// The budget ran out before anything was gathered.
    pub fn budget_blocked(&self) -> bool {
        self.sources.is_empty()
            && matches!(
                self.stop_reason,
                Some(StopReason::BudgetExhausted) | Some(StopReason::BudgetDenied(_))
            )
    }
}

/// A search hit that passed filtering and deduplication.
#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    normalized: String,
    title: String,
    query: String,
}

/// Per-session mutable state. Owned by one `research` call.
#[derive(Default)]
struct Session {
    seen: HashSet<String>,
    sources: Vec<Source>,
    degraded: Vec<DegradedSource>,
    queries_issued: u64,
    credits_spent: u64,
    stop_reason: Option<StopReason>,
}

/// Drives search, fetch and ranking for one topic at a time.
pub struct ResearchOrchestrator {
    governor: Arc<CreditGovernor>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    config: SearchConfig,
    retry: RetryPolicy,
}

impl ResearchOrchestrator {
    pub fn new(
        governor: Arc<CreditGovernor>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        config: SearchConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            governor,
            search,
            fetcher,
            config,
            retry,
        }
    }

    pub fn governor(&self) -> &Arc<CreditGovernor> {
        &self.governor
    }

    /// Queries issued for `topic`, one per template, in declared order.
    pub fn build_queries(&self, topic: &str, profile: &DomainProfile) -> Vec<String> {
        let expansion = profile
            .keyword_expansions
            .iter()
            .take(self.config.max_expansion_terms)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        profile
            .render_questions(topic)
            .into_iter()
            .map(|q| {
                if expansion.is_empty() {
                    q
                } else {
                    format!("{} {}", q, expansion)
                }
            })
            .collect()
    }

    /// Research `topic` without a cancellation token.
    pub async fn research(
        &self,
        topic: &str,
        profile: &DomainProfile,
        max_sources: usize,
    ) -> AppResult<ResearchOutcome> {
        self.research_with_cancel(topic, profile, max_sources, &CancellationToken::new())
            .await
    }

    /// Research `topic`, stopping between queries once `cancel` fires.
    ///
    /// Budget denial and cancellation yield a partial outcome, not an error.
    /// Only invalid arguments are errors.
    #[tracing::instrument(skip_all, fields(topic = %topic, domain = %profile.name))]
    pub async fn research_with_cancel(
        &self,
        topic: &str,
        profile: &DomainProfile,
        max_sources: usize,
        cancel: &CancellationToken,
    ) -> AppResult<ResearchOutcome> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AppError::Config("Research topic is empty".to_string()));
        }
        if max_sources == 0 {
            return Err(AppError::Config("max_sources must be at least 1".to_string()));
        }

        let queries = self.build_queries(topic, profile);
        let batch_size = self.config.concurrency.max(1);
        let mut session = Session::default();

        tracing::info!(
            "Researching '{}' in domain '{}' with {} queries",
            topic,
            profile.name,
            queries.len()
        );

        for batch in queries.chunks(batch_size) {
            let authorized = self.authorize_batch(batch, cancel, &mut session);

            let candidates = self.run_searches(&authorized, &mut session).await;
            self.fetch_candidates(candidates, profile, &mut session).await;

            if session.stop_reason.is_some() {
                break;
            }
        }

        let mut sources = std::mem::take(&mut session.sources);
        // Stable: equal scores keep fetch order
        sources.sort_by(|a, b| b.reliability_score.total_cmp(&a.reliability_score));
        sources.truncate(max_sources);

        let outcome = ResearchOutcome {
            topic: topic.to_string(),
            domain: profile.name.clone(),
            sources,
            requested: max_sources,
            queries_issued: session.queries_issued,
            credits_spent: session.credits_spent,
            stop_reason: session.stop_reason,
            degraded: session.degraded,
        };

        match &outcome.stop_reason {
            Some(reason) => tracing::warn!(
                "Research stopped early ({}): {} sources from {} queries",
                reason,
                outcome.sources.len(),
                outcome.queries_issued
            ),
            None => tracing::info!(
                "Research complete: {} sources from {} queries ({} degraded)",
                outcome.sources.len(),
                outcome.queries_issued,
                outcome.degraded.len()
            ),
        }

        Ok(outcome)
    }

    /// Authorize the queries of one batch, one at a time, in order.
    fn authorize_batch(
        &self,
        batch: &[String],
        cancel: &CancellationToken,
        session: &mut Session,
    ) -> Vec<String> {
        let mut authorized = Vec::with_capacity(batch.len());

        for query in batch {
            if cancel.is_cancelled() {
                session.stop_reason = Some(StopReason::Cancelled);
                break;
            }

            if self.governor.status() == BudgetStatus::Exhausted {
                session.stop_reason = Some(StopReason::BudgetExhausted);
                break;
            }

            match self.governor.authorize(1) {
                Ok(auth) => {
                    tracing::debug!(
                        "Authorized query #{} ({} consumed): {}",
                        auth.sequence,
                        auth.consumed_after,
                        query
                    );
                    session.queries_issued += auth.queries;
                    session.credits_spent += auth.credits;
                    authorized.push(query.clone());
                }
                Err(denial) => {
                    tracing::warn!("Query denied: {}", denial);
                    session.stop_reason = Some(StopReason::BudgetDenied(denial));
                    break;
                }
            }
        }

        authorized
    }

    /// Run authorized queries concurrently and merge hits in query order.
    async fn run_searches(&self, queries: &[String], session: &mut Session) -> Vec<Candidate> {
        let num_results = self.config.results_per_query;
        let results: Vec<_> = stream::iter(queries)
            .map(|query| async move {
                let label = format!("Search '{}'", query);
                let result = self
                    .retry
                    .run(&label, || self.search.search(query, num_results))
                    .await;
                (query, result)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut candidates = Vec::new();
        for (query, result) in results {
            match result {
                Ok(hits) => {
                    tracing::debug!("{} hits for '{}'", hits.len(), query);
                    for hit in hits {
                        if let Some(candidate) = self.admit(hit, query, session) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(failure) => {
                    tracing::warn!("Search degraded for '{}': {}", query, failure.error);
                    session.degraded.push(DegradedSource {
                        target: query.clone(),
                        stage: DegradedStage::Search,
                        reason: failure.error.to_string(),
                        attempts: failure.attempts,
                    });
                }
            }
        }

        candidates
    }

    /// Filter and deduplicate a hit against the session's seen set.
    fn admit(&self, hit: SearchHit, query: &str, session: &mut Session) -> Option<Candidate> {
        if let Err(rejection) = check_candidate(&hit.url, &self.config) {
            tracing::debug!("Skipping {}: {:?}", hit.url, rejection);
            return None;
        }

        let normalized = normalize_url(&hit.url)?;
        if !session.seen.insert(normalized.clone()) {
            tracing::debug!("Duplicate source skipped: {}", normalized);
            return None;
        }

        Some(Candidate {
            url: hit.url,
            normalized,
            title: hit.title,
            query: query.to_string(),
        })
    }

    /// Fetch candidates concurrently; accepted sources keep candidate order.
    async fn fetch_candidates(
        &self,
        candidates: Vec<Candidate>,
        profile: &DomainProfile,
        session: &mut Session,
    ) {
        let results: Vec<_> = stream::iter(candidates)
            .map(|candidate| async move {
                let label = format!("Fetch {}", candidate.url);
                let result = self
                    .retry
                    .run(&label, || self.fetcher.fetch(&candidate.url))
                    .await;
                (candidate, result)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (candidate, result) in results {
            let outcome = match result {
                Ok(page) => {
                    let chars = page.text.chars().count();
                    if chars < self.config.min_content_chars {
                        Err((
                            FetchError::NoContent {
                                url: candidate.url.clone(),
                                chars,
                            }
                            .to_string(),
                            1,
                        ))
                    } else {
                        Ok(self.to_source(candidate.clone(), page.title, &page.text, profile))
                    }
                }
                Err(failure) => Err((failure.error.to_string(), failure.attempts)),
            };

            match outcome {
                Ok(source) => session.sources.push(source),
                Err((reason, attempts)) => {
                    tracing::warn!("Source degraded {}: {}", candidate.url, reason);
                    session.degraded.push(DegradedSource {
                        target: candidate.url,
                        stage: DegradedStage::Fetch,
                        reason,
                        attempts,
                    });
                }
            }
        }
    }

    fn to_source(
        &self,
        candidate: Candidate,
        page_title: Option<String>,
        text: &str,
        profile: &DomainProfile,
    ) -> Source {
        let host = host_of(&candidate.normalized).unwrap_or_default();
        let source_type = classify_host(&host, &profile.source_type_hosts);
        let reliability_score = profile
            .reliability_weights
            .get(&source_type)
            .copied()
            .unwrap_or(self.config.min_reliability_weight);
        let trusted = profile.is_trusted(&source_type);

        Source {
            url: candidate.normalized,
            title: page_title.unwrap_or(candidate.title),
            raw_text: truncate_chars(text, self.config.max_content_chars).to_string(),
            source_type,
            reliability_score,
            trusted,
            fetched_at: Utc::now(),
            query: candidate.query,
        }
    }
}
