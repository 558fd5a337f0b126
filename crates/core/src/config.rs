//! Configuration management for the viincci CLI.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`.viincci/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Every component receives its own section (`BudgetConfig`, `SearchConfig`,
//! `RagConfig`, ...) as an explicit constructor argument; nothing reads
//! configuration implicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .viincci/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Metered search budget
    pub budget: BudgetConfig,

    /// Search, fetch and retry settings
    pub search: SearchConfig,

    /// Chunking and retrieval settings
    pub rag: RagConfig,

    /// Embedding provider settings
    pub embedding: EmbeddingConfig,

    /// Generation model settings
    pub llm: LlmConfig,
}

/// Budget of the metered search API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Credits available for the session
    pub limit: u64,

    /// Usage ratio at which the governor reports WARNING
    pub threshold_warn: f64,

    /// Usage ratio at which the governor reports EXHAUSTED
    pub threshold_stop: f64,

    /// Credits billed per search query
    pub cost_per_query: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            threshold_warn: 0.8,
            threshold_stop: 1.0,
            cost_per_query: 1,
        }
    }
}

impl BudgetConfig {
    /// Check threshold ranges and cost.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.threshold_warn > 0.0 && self.threshold_warn < 1.0) {
            return Err(AppError::Config(format!(
                "budget.thresholdWarn must be in (0, 1), got {}",
                self.threshold_warn
            )));
        }

        if !(self.threshold_stop > 0.0 && self.threshold_stop <= 1.0) {
            return Err(AppError::Config(format!(
                "budget.thresholdStop must be in (0, 1], got {}",
                self.threshold_stop
            )));
        }

        if self.threshold_warn > self.threshold_stop {
            return Err(AppError::Config(format!(
                "budget.thresholdWarn ({}) must not exceed budget.thresholdStop ({})",
                self.threshold_warn, self.threshold_stop
            )));
        }

        if self.cost_per_query == 0 {
            return Err(AppError::Config(
                "budget.costPerQuery must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Search provider, fetching and source policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Environment variable holding the search API key
    pub api_key_env: String,

    /// Search API endpoint
    pub endpoint: String,

    /// Search engine requested from the provider
    pub engine: String,

    /// Results requested per query
    pub results_per_query: usize,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Base delay of the exponential backoff
    pub retry_base_delay_ms: u64,

    /// Concurrent queries/fetches in flight
    pub concurrency: usize,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Pages with less extracted text are discarded
    pub min_content_chars: usize,

    /// Extracted text is truncated to this length
    pub max_content_chars: usize,

    /// Reliability assigned to source types without a configured weight
    pub min_reliability_weight: f32,

    /// Keyword expansions appended to each query
    pub max_expansion_terms: usize,

    /// Hosts never fetched
    pub skip_domains: Vec<String>,

    /// File extensions never fetched
    pub unsupported_extensions: Vec<String>,

    /// User agent sent when fetching pages
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "SERP_API_KEY".to_string(),
            endpoint: "https://serpapi.com/search".to_string(),
            engine: "google".to_string(),
            results_per_query: 10,
            max_retries: 3,
            retry_base_delay_ms: 500,
            concurrency: 4,
            request_timeout_secs: 40,
            min_content_chars: 150,
            max_content_chars: 20_000,
            min_reliability_weight: 0.5,
            max_expansion_terms: 2,
            skip_domains: vec![
                "pinterest.com".to_string(),
                "youtube.com".to_string(),
                "amazon.com".to_string(),
                "ebay.com".to_string(),
            ],
            unsupported_extensions: [
                ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            user_agent: format!("viincci/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SearchConfig {
    /// Check counts and weights.
    pub fn validate(&self) -> AppResult<()> {
        if self.concurrency == 0 {
            return Err(AppError::Config(
                "search.concurrency must be at least 1".to_string(),
            ));
        }

        if self.results_per_query == 0 {
            return Err(AppError::Config(
                "search.resultsPerQuery must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_reliability_weight) {
            return Err(AppError::Config(format!(
                "search.minReliabilityWeight must be in [0, 1], got {}",
                self.min_reliability_weight
            )));
        }

        Ok(())
    }
}

/// Chunking and retrieval settings of the RAG engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RagConfig {
    /// Target chunk length in bytes
    pub chunk_size: usize,

    /// Bytes shared between consecutive chunks
    pub chunk_overlap: usize,

    /// How far back from the target end a sentence boundary is searched
    pub boundary_lookback: usize,

    /// Default number of chunks retrieved per question
    pub top_k: usize,

    /// Upper bound of the context placed in the prompt
    pub max_context_chars: usize,

    /// Fail queries with NotReady instead of waiting while indexing
    pub reject_while_indexing: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            boundary_lookback: 64,
            top_k: 5,
            max_context_chars: 2000,
            reject_while_indexing: false,
        }
    }
}

impl RagConfig {
    /// Check chunk geometry.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config(
                "rag.chunkSize must be at least 1".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "rag.chunkOverlap ({}) must be smaller than rag.chunkSize ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        Ok(())
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Provider name: "hashing" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint (ollama)
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Generation model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider name
    pub provider: String,

    /// Provider endpoint
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    budget: Option<BudgetConfig>,
    search: Option<SearchConfig>,
    rag: Option<RagConfig>,
    embedding: Option<EmbeddingConfig>,
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            json_logs: false,
            budget: BudgetConfig::default(),
            search: SearchConfig::default(),
            rag: RagConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, config file and defaults.
    ///
    /// Environment variables:
    /// - `VIINCCI_WORKSPACE`: Override workspace path
    /// - `VIINCCI_CONFIG`: Path to config file
    /// - `VIINCCI_MODEL`: Generation model identifier
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use viincci_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let workspace = std::env::var("VIINCCI_WORKSPACE").ok().map(PathBuf::from);
        let config_file = std::env::var("VIINCCI_CONFIG").ok().map(PathBuf::from);
        Self::load_from(workspace, config_file)
    }

    /// Load configuration for an explicit workspace and config file.
    ///
    /// `None` falls back to the current directory and
    /// `<workspace>/.viincci/config.yaml` respectively.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }
        config.config_file = config_file;

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.viincci_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(model) = std::env::var("VIINCCI_MODEL") {
            config.llm.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        config.validate()?;

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let config_file: ConfigFile = if contents.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(contents)?
        };

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.json_logs = json;
            }
        }

        if let Some(budget) = config_file.budget {
            result.budget = budget;
        }
        if let Some(search) = config_file.search {
            result.search = search;
        }
        if let Some(rag) = config_file.rag {
            result.rag = rag;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the config file and the
    /// environment.
    pub fn with_overrides(
        mut self,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .viincci directory.
    pub fn viincci_dir(&self) -> PathBuf {
        self.workspace.join(".viincci")
    }

    /// Ensure the .viincci directory exists.
    pub fn ensure_viincci_dir(&self) -> AppResult<()> {
        let dir = self.viincci_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .viincci directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Directory scanned for user domain profiles.
    pub fn domains_dir(&self) -> PathBuf {
        self.viincci_dir().join("domains")
    }

    /// Persistent credit ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.viincci_dir().join("credits.json")
    }

    /// SQLite research store.
    pub fn store_path(&self) -> PathBuf {
        self.viincci_dir().join("research.sqlite")
    }

    /// Resolve the search API key from the configured environment variable.
    ///
    /// A missing key is a startup error, never a per-call error.
    pub fn resolve_search_api_key(&self) -> AppResult<String> {
        match std::env::var(&self.search.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AppError::Config(format!(
                "Search API key not found in environment variable: {}",
                self.search.api_key_env
            ))),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> AppResult<()> {
        self.budget.validate()?;
        self.search.validate()?;
        self.rag.validate()?;

        let known_embedders = ["hashing", "ollama"];
        if !known_embedders.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                known_embedders.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be at least 1".to_string(),
            ));
        }

        let known_providers = ["ollama"];
        if !known_providers.contains(&self.llm.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown LLM provider: {}. Supported: {}",
                self.llm.provider,
                known_providers.join(", ")
            )));
        }

        Ok(())
    }
}
