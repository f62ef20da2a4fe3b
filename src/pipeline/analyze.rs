//! Income analysis: raw text → income summary + compliance status.
//!
//! Both strategies implement [`IncomeAnalyzer`]. The trait's provided
//! [`IncomeAnalyzer::analyze`] never fails: whatever goes wrong inside
//! [`IncomeAnalyzer::try_analyze`] becomes a result with
//! [`ComplianceStatus::Error`], so a flaky LLM cannot abort the pipeline.
//!
//! | Strategy | Reasoning calls | Summary on failure |
//! |----------|-----------------|--------------------|
//! | [`HeuristicAnalyzer`] | 1 (free text) | kept (computed locally) |
//! | [`StructuredAnalyzer`] | 1 (JSON) | `None` |

use crate::config::{AnalysisStrategy, PipelineConfig};
use crate::error::AnalysisError;
use crate::model::{AnalysisResult, ComplianceStatus};
use crate::pipeline::normalize;
use crate::pipeline::reasoning::ReasoningService;
use crate::prompts::{compliance_check_prompt, structured_analysis_prompt};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Summary reported when the keyword scan finds income information.
pub const INCOME_FOUND_MESSAGE: &str = "Found income info (details here).";

/// Summary reported when it does not.
pub const INCOME_NOT_FOUND_MESSAGE: &str = "Income info not found.";

const INCOME_KEYWORD: &str = "income";

/// Turns document text into an [`AnalysisResult`].
#[async_trait]
pub trait IncomeAnalyzer: Send + Sync {
    /// Run the analysis, surfacing failures.
    async fn try_analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError>;

    /// Run the analysis, absorbing failures into an `Error` status.
    async fn analyze(&self, text: &str) -> AnalysisResult {
        match self.try_analyze(text).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Income analysis failed: {e}");
                AnalysisResult::failed(e)
            }
        }
    }
}

/// Build the analyzer selected by `config.strategy`.
pub fn analyzer_for(
    config: &PipelineConfig,
    reasoning: Arc<dyn ReasoningService>,
) -> Arc<dyn IncomeAnalyzer> {
    match config.strategy {
        AnalysisStrategy::Heuristic => Arc::new(HeuristicAnalyzer::new(reasoning)),
        AnalysisStrategy::Structured => Arc::new(StructuredAnalyzer::new(reasoning)),
    }
}

// ── Heuristic ────────────────────────────────────────────────────────────

/// Keyword scan for the summary, free-text LLM verdict for compliance.
pub struct HeuristicAnalyzer {
    reasoning: Arc<dyn ReasoningService>,
}

impl HeuristicAnalyzer {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl IncomeAnalyzer for HeuristicAnalyzer {
    async fn try_analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        let summary = summarize_income(text);

        // A failed verdict keeps the locally computed summary.
        let compliance_status = match self
            .reasoning
            .complete(
                self.reasoning.system_prompt(),
                &compliance_check_prompt(summary),
            )
            .await
        {
            Ok(reply) => {
                debug!("Compliance reply: {reply:?}");
                classify_verdict(&reply)
            }
            Err(e) => {
                warn!("Compliance check failed: {e}");
                ComplianceStatus::error(format!("Error during compliance check: {e}"))
            }
        };

        Ok(AnalysisResult {
            income_summary: Some(summary.to_string()),
            compliance_status,
        })
    }
}

/// Fixed summary for `text` based on a case-insensitive "income" match.
pub fn summarize_income(text: &str) -> &'static str {
    if text.to_lowercase().contains(INCOME_KEYWORD) {
        INCOME_FOUND_MESSAGE
    } else {
        INCOME_NOT_FOUND_MESSAGE
    }
}

/// Classify a free-text verdict. Only the case-sensitive token `Compliant`
/// counts; anything else needs a human.
pub fn classify_verdict(reply: &str) -> ComplianceStatus {
    if reply.contains("Compliant") {
        ComplianceStatus::Compliant
    } else {
        ComplianceStatus::NeedsReview
    }
}

// ── Structured ───────────────────────────────────────────────────────────

/// One schema-constrained call produces both summary and verdict.
pub struct StructuredAnalyzer {
    reasoning: Arc<dyn ReasoningService>,
}

impl StructuredAnalyzer {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructuredReply {
    income_summary: String,
    compliance_status: StructuredStatus,
}

#[derive(Debug, Deserialize)]
enum StructuredStatus {
    Compliant,
    NeedsReview,
}

impl From<StructuredStatus> for ComplianceStatus {
    fn from(status: StructuredStatus) -> Self {
        match status {
            StructuredStatus::Compliant => ComplianceStatus::Compliant,
            StructuredStatus::NeedsReview => ComplianceStatus::NeedsReview,
        }
    }
}

#[async_trait]
impl IncomeAnalyzer for StructuredAnalyzer {
    async fn try_analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        let reply = self
            .reasoning
            .complete(
                self.reasoning.system_prompt(),
                &structured_analysis_prompt(text),
            )
            .await?;
        parse_structured_reply(&reply)
    }
}

/// Parse a structured reply, rejecting anything outside the schema.
pub fn parse_structured_reply(reply: &str) -> Result<AnalysisResult, AnalysisError> {
    let payload = normalize::extract_json_object(reply);
    let parsed: StructuredReply =
        serde_json::from_str(payload).map_err(|e| AnalysisError::MalformedResponse {
            detail: e.to_string(),
        })?;

    Ok(AnalysisResult {
        income_summary: Some(parsed.income_summary),
        compliance_status: parsed.compliance_status.into(),
    })
}
