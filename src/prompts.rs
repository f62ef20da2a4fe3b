//! Fixed instruction prompts for the reasoning service.
//!
//! Callers can replace the system persona via
//! [`crate::config::PipelineConfig::system_prompt`]; the user-turn templates
//! are always built here because the reply parsers depend on their wording.

/// Default system message for every compliance call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a mortgage compliance expert.";

/// Build the user turn for the heuristic strategy's free-text verdict.
///
/// The reply is classified by [`crate::pipeline::analyze::classify_verdict`],
/// which looks for the exact token `Compliant`.
pub fn compliance_check_prompt(income_summary: &str) -> String {
    format!(
        "You are a mortgage compliance expert. \
Given the following extracted income data, determine if it meets standard mortgage compliance requirements. \
Reply with 'Compliant' or 'Incomplete: Needs manual review' and a brief reason.\n\n\
Extracted Income Data:\n{income_summary}\n"
    )
}

/// Output contract for the structured strategy.
///
/// Kept in sync with `StructuredReply` in [`crate::pipeline::analyze`], which
/// rejects unknown fields and any status outside the two listed values.
pub const STRUCTURED_OUTPUT_SCHEMA: &str = r#"{
  "type": "object",
  "additionalProperties": false,
  "required": ["income_summary", "compliance_status"],
  "properties": {
    "income_summary": { "type": "string" },
    "compliance_status": { "type": "string", "enum": ["Compliant", "NeedsReview"] }
  }
}"#;

/// Build the user turn for the structured strategy.
pub fn structured_analysis_prompt(document_text: &str) -> String {
    format!(
        "Read the mortgage applicant document below. Summarise every income figure it states \
(employer, pay period, gross and net amounts) and decide whether the income documentation \
meets standard mortgage compliance requirements.\n\n\
Respond with a single JSON object and nothing else. It must validate against this JSON Schema:\n\
{STRUCTURED_OUTPUT_SCHEMA}\n\n\
Use \"NeedsReview\" whenever the documentation is incomplete or ambiguous.\n\n\
Document:\n\"\"\"{document_text}\"\"\""
    )
}
