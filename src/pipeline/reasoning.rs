//! Reasoning-service access: send a prompt, get the reply text.
//!
//! Analyzers talk to the LLM only through [`ReasoningService`], so they can be
//! exercised with canned replies. [`LlmReasoningService`] is the production
//! implementation over any `edgequake_llm` provider.
//!
//! There are no retries. A failed call becomes an [`AnalysisError`] that the
//! analyzer turns into an `Error: ...` compliance status.

use crate::config::{PipelineConfig, DEFAULT_MODEL};
use crate::error::AnalysisError;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A text-in, text-out reasoning backend.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Send one system + user exchange and return the reply content.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError>;

    /// The system message analyzers should send.
    fn system_prompt(&self) -> &str {
        DEFAULT_SYSTEM_PROMPT
    }
}

/// [`ReasoningService`] backed by an `edgequake_llm` provider.
pub struct LlmReasoningService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
    system_prompt: String,
}

impl LlmReasoningService {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Resolve a provider from config and environment, then wrap it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AnalysisError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl ReasoningService for LlmReasoningService {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| AnalysisError::Timeout {
            secs: self.timeout.as_secs(),
        })?
        .map_err(|e| AnalysisError::Provider {
            message: e.to_string(),
        })?;

        debug!(
            "Reasoning call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(response.content.trim().to_string())
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.effective_max_tokens()),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnalysisError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AnalysisError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: e.to_string(),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`)
/// 2. **Named provider + model** (`config.provider_name`)
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`)
/// 4. **OpenAI** when `OPENAI_API_KEY` is set
/// 5. **Full auto-detection** (`ProviderFactory::from_env`)
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, AnalysisError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AnalysisError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment. \
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider. Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
