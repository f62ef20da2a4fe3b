//! Domain types shared by every pipeline stage.
//!
//! [`Record`] is the persistence-ready row; [`StoredRecord`] is the same row
//! as echoed back by the database, with its server-assigned id.
//! [`ComplianceStatus`] is stored as plain text so that ad-hoc SQL against the
//! table stays readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Text stored for [`ComplianceStatus::NeedsReview`].
pub const NEEDS_REVIEW_TEXT: &str = "Incomplete: Needs manual review";

/// Outcome of the compliance check for one document.
///
/// Never blank: every failure is carried as [`ComplianceStatus::Error`] with a
/// human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceStatus {
    Compliant,
    NeedsReview,
    Error(String),
}

impl ComplianceStatus {
    /// Wrap any displayable failure as an error status.
    pub fn error(cause: impl fmt::Display) -> Self {
        ComplianceStatus::Error(cause.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ComplianceStatus::Error(_))
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Compliant => f.write_str("Compliant"),
            ComplianceStatus::NeedsReview => f.write_str(NEEDS_REVIEW_TEXT),
            ComplianceStatus::Error(cause) => write!(f, "Error: {cause}"),
        }
    }
}

impl FromStr for ComplianceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "Compliant" => Ok(ComplianceStatus::Compliant),
            "NeedsReview" | NEEDS_REVIEW_TEXT => Ok(ComplianceStatus::NeedsReview),
            _ => match s.strip_prefix("Error:") {
                Some(cause) => Ok(ComplianceStatus::Error(cause.trim_start().to_string())),
                None => Err(format!("unknown compliance status '{s}'")),
            },
        }
    }
}

impl Serialize for ComplianceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ComplianceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What an analyzer derived from a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// `None` when the structured strategy failed before producing a summary.
    pub income_summary: Option<String>,
    pub compliance_status: ComplianceStatus,
}

impl AnalysisResult {
    /// The result used when analysis failed outright.
    pub fn failed(cause: impl fmt::Display) -> Self {
        Self {
            income_summary: None,
            compliance_status: ComplianceStatus::error(cause),
        }
    }
}

/// Optional metadata attached to a record at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMetadata {
    pub file_name: Option<String>,
    pub applicant_id: Option<String>,
    pub batch_id: Option<String>,
}

impl RecordMetadata {
    /// Metadata with `file_name` set to the final component of `path`.
    pub fn for_path(path: &Path) -> Self {
        Self {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            ..Self::default()
        }
    }

    pub fn with_applicant_id(mut self, applicant_id: Option<String>) -> Self {
        self.applicant_id = applicant_id;
        self
    }

    pub fn with_batch_id(mut self, batch_id: Option<String>) -> Self {
        self.batch_id = batch_id;
        self
    }
}

/// A persistence-ready row.
///
/// Column names match the `income_data` table (see [`crate::schema`]).
/// Optional fields serialise as `null` rather than being omitted: PostgREST
/// bulk inserts require every object in the array to carry the same keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub raw_text: String,
    pub income_info: Option<String>,
    pub compliance_status: ComplianceStatus,
    pub extracted_at: DateTime<Utc>,
    pub file_name: Option<String>,
    pub applicant_id: Option<String>,
    pub batch_id: Option<String>,
}

/// Server-assigned primary key of a stored row.
///
/// Integer for the default `BIGSERIAL` table; text for tables keyed by uuid
/// or any other non-numeric type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl RowId {
    /// Lift an id out of a response row. `null` means the row carried none.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => RowId::Int(i),
                None => RowId::Text(n.to_string()),
            }),
            serde_json::Value::String(s) => Some(RowId::Text(s.clone())),
            other => Some(RowId::Text(other.to_string())),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(i) => write!(f, "{i}"),
            RowId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId::Int(id)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        RowId::Text(id.to_string())
    }
}

/// A [`Record`] the database confirmed as stored.
///
/// Only the server-assigned columns are read back from the response; the
/// record itself is the one that was submitted, so a table with extra columns
/// or a different key type never turns a successful insert into a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: Option<RowId>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub record: Record,
}

impl StoredRecord {
    /// Pair a response row with the record that produced it.
    pub fn from_row(row: &serde_json::Value, record: Record) -> Self {
        let id = row.get("id").and_then(RowId::from_json);
        let created_at = row
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Self {
            id,
            created_at,
            record,
        }
    }

    /// The id for log lines, `N/A` when the row carried none.
    pub fn id_label(&self) -> String {
        self.id
            .as_ref()
            .map_or_else(|| "N/A".to_string(), RowId::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_forms() {
        assert_eq!(ComplianceStatus::Compliant.to_string(), "Compliant");
        assert_eq!(
            ComplianceStatus::NeedsReview.to_string(),
            "Incomplete: Needs manual review"
        );
        assert_eq!(
            ComplianceStatus::error("connection reset").to_string(),
            "Error: connection reset"
        );
    }

    #[test]
    fn status_parses_stored_text() {
        assert_eq!(
            "Compliant".parse::<ComplianceStatus>().unwrap(),
            ComplianceStatus::Compliant
        );
        assert_eq!(
            NEEDS_REVIEW_TEXT.parse::<ComplianceStatus>().unwrap(),
            ComplianceStatus::NeedsReview
        );
        assert_eq!(
            "NeedsReview".parse::<ComplianceStatus>().unwrap(),
            ComplianceStatus::NeedsReview
        );
        assert_eq!(
            "Error: timed out".parse::<ComplianceStatus>().unwrap(),
            ComplianceStatus::Error("timed out".into())
        );
        assert!("maybe".parse::<ComplianceStatus>().is_err());
    }

    #[test]
    fn metadata_for_path_takes_file_name() {
        let meta = RecordMetadata::for_path(Path::new("/scans/2024/doc1.pdf"))
            .with_applicant_id(Some("APPL_12345".into()));
        assert_eq!(meta.file_name.as_deref(), Some("doc1.pdf"));
        assert_eq!(meta.applicant_id.as_deref(), Some("APPL_12345"));
        assert_eq!(meta.batch_id, None);
    }

    #[test]
    fn record_serialises_nulls_and_status_text() {
        let record = Record {
            raw_text: "net income $4800".into(),
            income_info: None,
            compliance_status: ComplianceStatus::error("boom"),
            extracted_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            file_name: Some("doc1.pdf".into()),
            applicant_id: None,
            batch_id: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["compliance_status"], "Error: boom");
        assert!(json["income_info"].is_null());
        assert!(json.as_object().unwrap().contains_key("batch_id"));
    }

    fn sample_record() -> Record {
        Record {
            raw_text: "John Doe net income $4800/month".into(),
            income_info: Some("Found income info (details here).".into()),
            compliance_status: ComplianceStatus::Compliant,
            extracted_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            file_name: Some("doc1.pdf".into()),
            applicant_id: None,
            batch_id: Some("BATCH_001".into()),
        }
    }

    #[test]
    fn stored_record_lifts_server_columns() {
        let row = serde_json::json!({
            "id": 7,
            "raw_text": "John Doe net income $4800/month",
            "compliance_status": "Compliant",
            "created_at": "2024-05-01T12:00:01.123456+00:00"
        });
        let stored = StoredRecord::from_row(&row, sample_record());
        assert_eq!(stored.id, Some(RowId::Int(7)));
        assert_eq!(stored.id_label(), "7");
        assert!(stored.created_at.is_some());
        assert_eq!(stored.record, sample_record());
    }

    #[test]
    fn stored_record_accepts_any_key_type_and_row_shape() {
        let uuid_row = serde_json::json!({
            "id": "3f2a9c1e-8b7d-4e2f-9a61-0c5d2b7e4f10",
            "compliance_status": "something the enum would reject",
            "created_at": "not a timestamp"
        });
        let stored = StoredRecord::from_row(&uuid_row, sample_record());
        assert_eq!(
            stored.id,
            Some(RowId::from("3f2a9c1e-8b7d-4e2f-9a61-0c5d2b7e4f10"))
        );
        assert_eq!(stored.created_at, None);

        let bare = StoredRecord::from_row(&serde_json::json!({}), sample_record());
        assert_eq!(bare.id, None);
        assert_eq!(bare.id_label(), "N/A");
    }
}
