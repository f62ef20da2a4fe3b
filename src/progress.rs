//! Progress-callback trait for per-document pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves each document through the pipeline.
//!
//! # Example
//!
//! ```rust
//! use edgequake_income::{ComplianceStatus, PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, file_name: &str, status: &ComplianceStatus) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name}: {status}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::ComplianceStatus;
use std::sync::Arc;

/// Called by the orchestrator as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The trait is `Send + Sync` so a callback can be
/// shared with whatever task hosts the pipeline.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first document of a batch.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before extraction starts for a document.
    ///
    /// # Arguments
    /// * `index`     — 1-indexed position in the batch (1 for single documents)
    /// * `total`     — documents in the batch
    /// * `file_name` — base name of the document
    fn on_document_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when a record has been built for a document.
    fn on_document_complete(&self, file_name: &str, status: &ComplianceStatus) {
        let _ = (file_name, status);
    }

    /// Called when a document is dropped (extraction failure, or analysis
    /// failure under [`crate::config::BatchPolicy::SkipErrorRecords`]).
    fn on_document_error(&self, file_name: &str, error: &str) {
        let _ = (file_name, error);
    }

    /// Called once after the batch upload has been attempted.
    ///
    /// # Arguments
    /// * `total`    — documents in the batch
    /// * `uploaded` — records the database confirmed as stored
    fn on_batch_complete(&self, total: usize, uploaded: usize) {
        let _ = (total, uploaded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
