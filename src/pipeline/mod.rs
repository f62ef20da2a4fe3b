//! Pipeline stages for document-to-record processing.
//!
//! Each submodule implements exactly one transformation step behind a small
//! interface, so the orchestrator can be exercised with stub collaborators.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ analyze ──▶ record ──▶ upload
//! (pdfium)    (LLM)       (pure)     (Supabase)
//! ```
//!
//! 1. [`extract`]   — PDF path to cleaned text; pdfium runs in `spawn_blocking`
//! 2. [`analyze`]   — text to income summary + compliance status; never fails
//! 3. [`record`]    — merge analysis with metadata and a build-time timestamp
//! 4. [`upload`]    — insert single or batched records; never fails
//!
//! Supporting modules: [`normalize`] (text clean-up rules) and
//! [`reasoning`] (the LLM seam used by [`analyze`]).

pub mod analyze;
pub mod extract;
pub mod normalize;
pub mod reasoning;
pub mod record;
pub mod upload;
