//! Error types for the edgequake-income library.
//!
//! Each pipeline stage has its own error type because each failure is handled
//! differently by the orchestrator:
//!
//! * [`ExtractionError`] — **fatal to one document**: the PDF cannot be read
//!   or parsed. The single-document flow reports failure; the batch flow
//!   skips the document.
//!
//! * [`AnalysisError`] — **absorbed**: the reasoning service failed or
//!   replied with garbage. Analyzers convert it into
//!   [`crate::model::ComplianceStatus::Error`] so the record is still built.
//!
//! * [`UploadError`] — **logged**: the persistence call failed. The gateway
//!   reports it and returns `None`; nothing is retried.
//!
//! * [`PipelineError`] — **fatal at startup**: missing or invalid
//!   configuration. Returned from constructors before any document is touched.

use std::path::PathBuf;
use thiserror::Error;

/// Failures turning a file path into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Unexpected internal error (e.g. the blocking task panicked).
    #[error("Internal extraction error: {0}")]
    Internal(String),
}

/// Failures talking to the reasoning service or interpreting its reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// No LLM provider could be resolved from config or environment.
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider returned a transport or API error.
    #[error("LLM API error: {message}")]
    Provider { message: String },

    /// The call did not complete within the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The reply did not match the required structured shape.
    #[error("Malformed structured response: {detail}")]
    MalformedResponse { detail: String },
}

/// Failures inserting records into the persistence service.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Network or TLS failure before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Insert rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service accepted the request but echoed no rows back.
    #[error("No data returned from insert")]
    EmptyResponse,

    /// The response body could not be decoded into stored records.
    #[error("Could not decode insert response: {0}")]
    Decode(String),
}

/// Fatal configuration and startup errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required environment variable or setting is absent or empty.
    #[error("Missing configuration: {name} is not set.\n{hint}")]
    MissingConfig { name: String, hint: String },

    /// Builder or store validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display_includes_path() {
        let e = ExtractionError::NotAPdf {
            path: PathBuf::from("/tmp/payslip.docx"),
            magic: *b"PK\x03\x04",
        };
        assert!(e.to_string().contains("payslip.docx"), "got: {e}");
    }

    #[test]
    fn timeout_display() {
        let e = AnalysisError::Timeout { secs: 60 };
        assert_eq!(e.to_string(), "LLM call timed out after 60s");
    }

    #[test]
    fn upload_status_display() {
        let e = UploadError::Status {
            status: 401,
            body: "Invalid API key".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("401"), "got: {msg}");
        assert!(msg.contains("Invalid API key"), "got: {msg}");
    }

    #[test]
    fn missing_config_display() {
        let e = PipelineError::MissingConfig {
            name: "SUPABASE_URL".into(),
            hint: "export SUPABASE_URL=https://<project>.supabase.co".into(),
        };
        assert!(e.to_string().contains("SUPABASE_URL is not set"));
    }
}
