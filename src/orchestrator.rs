//! Single-document and batch entry points.
//!
//! Every document moves through the same states:
//!
//! ```text
//! Pending ──▶ Extracted ──▶ Analyzed ──▶ Built ──▶ Uploaded
//!    └───────────┴─────────────┴──────────┴──────▶ Failed
//! ```
//!
//! Documents are processed strictly one after another. The LLM call is the
//! only suspension point that matters, and it is awaited in place before the
//! next stage starts.
//!
//! ## Failure policy
//!
//! * Extraction failure: the document has no text and therefore no record.
//!   The single flow returns `false`; the batch flow skips the document.
//! * Analysis failure: absorbed by the analyzer into an `Error: ...` status.
//!   The record is still built and uploaded, in both flows, unless the batch
//!   runs with [`BatchPolicy::SkipErrorRecords`].
//! * Upload failure: logged by the gateway. Single flow returns `false`; the
//!   batch reports zero uploaded records.

use crate::config::{BatchPolicy, PipelineConfig, StoreConfig};
use crate::error::{ExtractionError, PipelineError};
use crate::model::{Record, RecordMetadata};
use crate::pipeline::analyze::{analyzer_for, IncomeAnalyzer};
use crate::pipeline::extract::{PdfiumTextExtractor, TextExtractor};
use crate::pipeline::reasoning::LlmReasoningService;
use crate::pipeline::record::RecordBuilder;
use crate::pipeline::upload::{RecordStore, SupabaseStore, UploadGateway};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where a document is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentState {
    Pending,
    Extracted,
    Analyzed,
    Built,
    Uploaded,
    Failed,
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentState::Pending => "pending",
            DocumentState::Extracted => "extracted",
            DocumentState::Analyzed => "analyzed",
            DocumentState::Built => "built",
            DocumentState::Uploaded => "uploaded",
            DocumentState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A batch document that did not make it into the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of [`Pipeline::process_batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: Option<String>,
    /// Documents handed to the batch.
    pub attempted: usize,
    /// Records built and submitted for upload.
    pub built: usize,
    pub skipped: Vec<SkippedDocument>,
    /// Records the database confirmed as stored.
    pub uploaded: usize,
}

impl BatchReport {
    /// True when every attempted document was stored.
    pub fn is_complete(&self) -> bool {
        self.uploaded == self.attempted
    }
}

/// Generate a batch id of the form `BATCH_1A2B3C4D`.
pub fn generate_batch_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("BATCH_{}", id[..8].to_uppercase())
}

/// Drives documents through extract → analyze → build → upload.
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    analyzer: Arc<dyn IncomeAnalyzer>,
    builder: RecordBuilder,
    gateway: UploadGateway,
    config: PipelineConfig,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        analyzer: Arc<dyn IncomeAnalyzer>,
        store: Arc<dyn RecordStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            builder: RecordBuilder,
            gateway: UploadGateway::new(store),
            config,
        }
    }

    /// Production wiring: pdfium extraction, an LLM provider resolved from
    /// `config` and the environment, and the given record store.
    pub fn with_store(
        config: PipelineConfig,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, PipelineError> {
        let reasoning = LlmReasoningService::from_config(&config).map_err(|e| {
            PipelineError::MissingConfig {
                name: "LLM provider".to_string(),
                hint: e.to_string(),
            }
        })?;
        let analyzer = analyzer_for(&config, Arc::new(reasoning));
        let extractor = Arc::new(PdfiumTextExtractor::with_password(
            config.pdf_password.clone(),
        ));
        Ok(Self::new(extractor, analyzer, store, config))
    }

    /// Production wiring with a Supabase store.
    pub fn from_config(config: PipelineConfig, store: &StoreConfig) -> Result<Self, PipelineError> {
        let store = SupabaseStore::new(store)?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract, analyze, and build the record for one document, without
    /// uploading it.
    pub async fn prepare_record(
        &self,
        path: &Path,
        metadata: RecordMetadata,
    ) -> Result<Record, ExtractionError> {
        let name = display_name(path);
        debug!(file = %name, state = %DocumentState::Pending, "Document state");

        let text = self.extractor.extract(path).await?;
        debug!(file = %name, state = %DocumentState::Extracted, "Document state");

        let result = self.analyzer.analyze(&text).await;
        debug!(file = %name, state = %DocumentState::Analyzed, "Document state");

        let record = self.builder.build(&text, result, metadata);
        debug!(file = %name, state = %DocumentState::Built, "Document state");
        Ok(record)
    }

    /// Process one document and upload its record.
    ///
    /// Returns `true` only when the database confirms the stored row.
    pub async fn process_document(&self, path: &Path, applicant_id: Option<&str>) -> bool {
        let name = display_name(path);
        info!("Processing document: {}", path.display());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(1, 1, &name);
        }

        let metadata =
            RecordMetadata::for_path(path).with_applicant_id(applicant_id.map(str::to_string));

        let record = match self.prepare_record(path, metadata).await {
            Ok(record) => record,
            Err(e) => {
                error!(file = %name, state = %DocumentState::Failed, "Error processing document: {e}");
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_error(&name, &e.to_string());
                }
                return false;
            }
        };

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_complete(&name, &record.compliance_status);
        }

        match self.gateway.upload_one(&record).await {
            Some(stored) => {
                info!(file = %name, state = %DocumentState::Uploaded, "Uploaded record with ID: {}", stored.id_label());
                true
            }
            None => {
                error!(file = %name, state = %DocumentState::Failed, "Failed to upload income data");
                false
            }
        }
    }

    /// Blocking wrapper around [`Pipeline::process_document`].
    ///
    /// Creates its own tokio runtime; do not call from inside an async context.
    pub fn process_document_blocking(&self, path: &Path, applicant_id: Option<&str>) -> bool {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.process_document(path, applicant_id)),
            Err(e) => {
                error!("Failed to create tokio runtime: {e}");
                false
            }
        }
    }

    /// Process documents one at a time and upload the built records in a
    /// single insert.
    pub async fn process_batch(&self, paths: &[PathBuf], batch_id: Option<&str>) -> BatchReport {
        let total = paths.len();
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_batch_start(total);
        }

        let mut batch: Vec<Record> = Vec::with_capacity(total);
        let mut skipped = Vec::new();

        for (i, path) in paths.iter().enumerate() {
            let name = display_name(path);
            info!("Processing document: {}", path.display());
            if let Some(cb) = cb {
                cb.on_document_start(i + 1, total, &name);
            }

            let metadata =
                RecordMetadata::for_path(path).with_batch_id(batch_id.map(str::to_string));

            let reason = match self.prepare_record(path, metadata).await {
                Ok(record)
                    if record.compliance_status.is_error()
                        && self.config.batch_policy == BatchPolicy::SkipErrorRecords =>
                {
                    warn!(file = %name, "Skipping record with failed analysis: {}", record.compliance_status);
                    record.compliance_status.to_string()
                }
                Ok(record) => {
                    if let Some(cb) = cb {
                        cb.on_document_complete(&name, &record.compliance_status);
                    }
                    batch.push(record);
                    continue;
                }
                Err(e) => {
                    error!(file = %name, state = %DocumentState::Failed, "Error processing {}: {e}", path.display());
                    e.to_string()
                }
            };

            if let Some(cb) = cb {
                cb.on_document_error(&name, &reason);
            }
            skipped.push(SkippedDocument {
                file_name: name,
                reason,
            });
        }

        let built = batch.len();
        let uploaded = if batch.is_empty() {
            warn!("No documents produced a record; nothing to upload");
            0
        } else {
            match self.gateway.upload_batch(&batch).await {
                Some(stored) => {
                    info!("Successfully uploaded {} records", stored.len());
                    stored.len()
                }
                None => {
                    error!("Failed to upload batch data");
                    0
                }
            }
        };

        if let Some(cb) = cb {
            cb.on_batch_complete(total, uploaded);
        }

        BatchReport {
            batch_id: batch_id.map(str::to_string),
            attempted: total,
            built,
            skipped,
            uploaded,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_id_shape() {
        let id = generate_batch_id();
        assert!(id.starts_with("BATCH_"), "{id}");
        assert_eq!(id.len(), "BATCH_".len() + 8);
        assert!(id[6..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(id, generate_batch_id());
    }

    #[test]
    fn display_name_prefers_file_name() {
        assert_eq!(display_name(Path::new("/scans/doc1.pdf")), "doc1.pdf");
        assert_eq!(display_name(Path::new("/")), "/");
    }

    #[test]
    fn report_completeness() {
        let report = BatchReport {
            batch_id: None,
            attempted: 3,
            built: 2,
            skipped: vec![SkippedDocument {
                file_name: "b.pdf".into(),
                reason: "not a PDF".into(),
            }],
            uploaded: 2,
        };
        assert!(!report.is_complete());
        assert_eq!(DocumentState::Uploaded.to_string(), "uploaded");
    }
}
