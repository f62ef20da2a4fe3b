//! Record assembly: analysis output + metadata → persistence-ready row.
//!
//! The timestamp is taken when the record is built, not when the text was
//! extracted, so `extracted_at` marks when processing of the document
//! completed.

use crate::model::{AnalysisResult, Record, RecordMetadata};
use chrono::{DateTime, Utc};

/// Merges analyzer output with document metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordBuilder;

impl RecordBuilder {
    /// Build a record stamped with the current UTC time.
    pub fn build(&self, text: &str, result: AnalysisResult, metadata: RecordMetadata) -> Record {
        self.build_at(text, result, metadata, Utc::now())
    }

    /// Build a record with an explicit timestamp.
    pub fn build_at(
        &self,
        text: &str,
        result: AnalysisResult,
        metadata: RecordMetadata,
        extracted_at: DateTime<Utc>,
    ) -> Record {
        Record {
            raw_text: text.to_string(),
            income_info: result.income_summary,
            compliance_status: result.compliance_status,
            extracted_at,
            file_name: metadata.file_name,
            applicant_id: metadata.applicant_id,
            batch_id: metadata.batch_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComplianceStatus;

    fn result() -> AnalysisResult {
        AnalysisResult {
            income_summary: Some("Found income info (details here).".into()),
            compliance_status: ComplianceStatus::Compliant,
        }
    }

    fn metadata() -> RecordMetadata {
        RecordMetadata {
            file_name: Some("doc1.pdf".into()),
            applicant_id: Some("APPL_12345".into()),
            batch_id: None,
        }
    }

    #[test]
    fn frozen_clock_builds_identical_records() {
        let at = Utc::now();
        let a = RecordBuilder.build_at("net income", result(), metadata(), at);
        let b = RecordBuilder.build_at("net income", result(), metadata(), at);
        assert_eq!(a, b);
    }

    #[test]
    fn live_clock_differs_only_in_timestamp() {
        let mut a = RecordBuilder.build("net income", result(), metadata());
        let b = RecordBuilder.build("net income", result(), metadata());
        assert!(b.extracted_at >= a.extracted_at);
        a.extracted_at = b.extracted_at;
        assert_eq!(a, b);
    }

    #[test]
    fn fields_are_carried_over() {
        let record = RecordBuilder.build("", AnalysisResult::failed("boom"), metadata());
        assert_eq!(record.raw_text, "");
        assert_eq!(record.income_info, None);
        assert_eq!(record.compliance_status.to_string(), "Error: boom");
        assert_eq!(record.file_name.as_deref(), Some("doc1.pdf"));
        assert_eq!(record.applicant_id.as_deref(), Some("APPL_12345"));
        assert_eq!(record.batch_id, None);
    }
}
