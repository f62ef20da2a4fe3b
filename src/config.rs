//! Configuration for the income pipeline.
//!
//! Two structs, two lifetimes:
//!
//! * [`PipelineConfig`] — how documents are analysed (strategy, LLM knobs,
//!   batch policy). Built via [`PipelineConfigBuilder`].
//! * [`StoreConfig`] — where records are persisted. Built explicitly or read
//!   from the environment with [`StoreConfig::from_env`]; there are no
//!   baked-in credentials, so a missing URL or key is a startup error.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Default Supabase table for income records.
pub const DEFAULT_TABLE: &str = "income_data";

/// Completion budget for the heuristic compliance check. The reply only needs
/// to carry a verdict and a brief reason.
const HEURISTIC_MAX_TOKENS: usize = 50;

/// Completion budget for the structured strategy (summary + verdict as JSON).
const STRUCTURED_MAX_TOKENS: usize = 512;

/// Configuration for analysing and batching documents.
///
/// # Example
/// ```rust
/// use edgequake_income::{AnalysisStrategy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .strategy(AnalysisStrategy::Structured)
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_max_tokens(), 512);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// How income and compliance are derived. Default: [`AnalysisStrategy::Heuristic`].
    pub strategy: AnalysisStrategy,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0, so the verdict is repeatable.
    pub temperature: f32,

    /// Maximum completion tokens. If None, a per-strategy default is used.
    pub max_tokens: Option<usize>,

    /// Per reasoning-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt replacing the built-in compliance persona.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub pdf_password: Option<String>,

    /// What the batch flow does with records whose analysis failed.
    pub batch_policy: BatchPolicy,

    /// Per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: AnalysisStrategy::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: None,
            api_timeout_secs: 60,
            system_prompt: None,
            pdf_password: None,
            batch_policy: BatchPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("strategy", &self.strategy)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdf_password", &self.pdf_password.as_ref().map(|_| "<redacted>"))
            .field("batch_policy", &self.batch_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Completion budget for the configured strategy.
    pub fn effective_max_tokens(&self) -> usize {
        self.max_tokens.unwrap_or(match self.strategy {
            AnalysisStrategy::Heuristic => HEURISTIC_MAX_TOKENS,
            AnalysisStrategy::Structured => STRUCTURED_MAX_TOKENS,
        })
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn strategy(mut self, strategy: AnalysisStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.config.batch_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Store configuration ──────────────────────────────────────────────────

/// Connection settings for the Supabase persistence service.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Service-role or anon API key.
    pub api_key: String,
    /// Target table. Default: [`DEFAULT_TABLE`].
    pub table: String,
    /// Per-request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl StoreConfig {
    /// Validate and assemble a store configuration.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, PipelineError> {
        let url = url.into().trim().trim_end_matches('/').to_string();
        let api_key = api_key.into().trim().to_string();

        if url.is_empty() {
            return Err(missing("SUPABASE_URL"));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(PipelineError::InvalidConfig(format!(
                "Supabase URL must start with http:// or https://, got '{url}'"
            )));
        }
        if api_key.is_empty() {
            return Err(missing("SUPABASE_KEY"));
        }

        Ok(Self {
            url,
            api_key,
            table: DEFAULT_TABLE.to_string(),
            timeout_secs: 30,
        })
    }

    /// Read `SUPABASE_URL` and `SUPABASE_KEY` from the environment.
    ///
    /// The key falls back to `SUPABASE_SERVICE_ROLE_KEY`, then
    /// `SUPABASE_ANON_KEY`. Empty values count as missing.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_env_or(None, None)
    }

    /// Like [`StoreConfig::from_env`], but explicit values win over the
    /// environment.
    pub fn from_env_or(url: Option<String>, api_key: Option<String>) -> Result<Self, PipelineError> {
        let url = url
            .filter(|v| !v.trim().is_empty())
            .or_else(|| env_non_empty("SUPABASE_URL"))
            .ok_or_else(|| missing("SUPABASE_URL"))?;
        let key = api_key
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                ["SUPABASE_KEY", "SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_ANON_KEY"]
                    .iter()
                    .find_map(|name| env_non_empty(name))
            })
            .ok_or_else(|| missing("SUPABASE_KEY"))?;
        Self::new(url, key)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    /// PostgREST endpoint for the configured table.
    pub fn table_endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn missing(name: &str) -> PipelineError {
    PipelineError::MissingConfig {
        name: name.to_string(),
        hint: "Set SUPABASE_URL and SUPABASE_KEY (or SUPABASE_ANON_KEY) in the environment or a .env file."
            .to_string(),
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How an [`crate::pipeline::analyze::IncomeAnalyzer`] derives its result.
///
/// | Strategy | Summary | Compliance |
/// |----------|---------|------------|
/// | Heuristic | keyword scan for "income" | free-text LLM verdict |
/// | Structured | LLM, JSON schema | same LLM call |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalysisStrategy {
    /// Local keyword heuristic plus a free-text compliance call. (default)
    #[default]
    Heuristic,
    /// One schema-constrained call produces both summary and verdict.
    Structured,
}

/// Batch handling of documents whose text was extracted but whose analysis
/// failed.
///
/// Extraction failures are always skipped: without text there is no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchPolicy {
    /// Upload an `Error: ...` record so every readable document is auditable. (default)
    #[default]
    IncludeErrorRecords,
    /// Leave analysis failures out of the batch.
    SkipErrorRecords,
}
