//! # edgequake-income
//!
//! Extract income details from PDF mortgage documents, check documentation
//! compliance with an LLM, and persist the results to Supabase.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract  pdfium text layer (spawn_blocking) + clean-up
//!  ├─ 2. Analyze  keyword heuristic or structured LLM call → summary + verdict
//!  ├─ 3. Build    merge with file name / applicant id / batch id + timestamp
//!  └─ 4. Upload   one insert per document, or one insert per batch
//! ```
//!
//! Analysis and upload never abort the pipeline: analysis failures become an
//! `Error: ...` compliance status on the record, upload failures are logged
//! and reported as "nothing stored". Only a document whose text cannot be
//! extracted is dropped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_income::{Pipeline, PipelineConfig, StoreConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // SUPABASE_URL + SUPABASE_KEY; provider auto-detected from OPENAI_API_KEY etc.
//!     let store = StoreConfig::from_env()?;
//!     let pipeline = Pipeline::from_config(PipelineConfig::default(), &store)?;
//!
//!     let ok = pipeline
//!         .process_document(Path::new("payslip.pdf"), Some("APPL_12345"))
//!         .await;
//!     println!("uploaded: {ok}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `incomecheck` binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalysisStrategy, BatchPolicy, PipelineConfig, PipelineConfigBuilder, StoreConfig};
pub use error::{AnalysisError, ExtractionError, PipelineError, UploadError};
pub use model::{AnalysisResult, ComplianceStatus, Record, RecordMetadata, RowId, StoredRecord};
pub use orchestrator::{generate_batch_id, BatchReport, DocumentState, Pipeline, SkippedDocument};
pub use pipeline::analyze::{HeuristicAnalyzer, IncomeAnalyzer, StructuredAnalyzer};
pub use pipeline::extract::{PdfiumTextExtractor, TextExtractor};
pub use pipeline::reasoning::{LlmReasoningService, ReasoningService};
pub use pipeline::record::RecordBuilder;
pub use pipeline::upload::{RecordStore, SupabaseStore, UploadGateway};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
