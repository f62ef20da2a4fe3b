//! Text extraction: turn a PDF path into the document's text.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool; the
//! orchestrator awaits it immediately, so documents are still processed one
//! at a time.
//!
//! ## Why validate before opening?
//!
//! pdfium reports every failure as an opaque load error. Checking existence,
//! permissions, and the `%PDF` magic bytes first gives the operator a message
//! that says what is actually wrong with the file.

use crate::error::ExtractionError;
use crate::pipeline::normalize;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a file path into raw text.
///
/// Implementations fail with [`ExtractionError`] when the file cannot be read
/// or parsed. Failures are never retried.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Extracts the embedded text layer of a PDF via pdfium.
///
/// Scanned PDFs without a text layer yield an empty string, which is a valid
/// result: the analyzer then reports that no income information was found.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextExtractor {
    password: Option<String>,
}

impl PdfiumTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `password` when opening encrypted PDFs.
    pub fn with_password(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl TextExtractor for PdfiumTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        validate_pdf_file(path)?;

        let path_buf = path.to_path_buf();
        let password = self.password.clone();
        let text = tokio::task::spawn_blocking(move || {
            extract_text_blocking(&path_buf, password.as_deref())
        })
        .await
        .map_err(|e| ExtractionError::Internal(format!("Extraction task panicked: {e}")))??;

        let cleaned = normalize::clean_text(&text);
        info!(
            "Extracted {} chars from {}",
            cleaned.chars().count(),
            path.display()
        );
        Ok(cleaned)
    }
}

/// Validate existence, read permission, and PDF magic bytes.
pub fn validate_pdf_file(path: &Path) -> Result<(), ExtractionError> {
    if !path.exists() {
        return Err(ExtractionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ExtractionError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractionError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ExtractionError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}

/// Blocking implementation: open the document and join every page's text.
fn extract_text_blocking(path: &Path, password: Option<&str>) -> Result<String, ExtractionError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| map_load_error(path, password, e))?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut page_texts = Vec::with_capacity(pages.len() as usize);
    for page in pages.iter() {
        let text = page.text().map(|t| t.all()).map_err(|e| {
            ExtractionError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("text layer unreadable: {e:?}"),
            }
        })?;
        page_texts.push(text);
    }

    Ok(page_texts.join("\n\n"))
}

/// Bind the pdfium library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. System library search paths
fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(lib_path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %lib_path, "Binding pdfium from env var");
        let bindings = Pdfium::bind_to_library(&lib_path).map_err(|e| {
            ExtractionError::PdfiumBindingFailed(format!("{lib_path}: {e:?}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Bound pdfium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractionError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load error, telling encrypted documents apart from corrupt ones.
fn map_load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> ExtractionError {
    let detail = format!("{e:?}");
    if detail.to_lowercase().contains("password") {
        if password.is_some() {
            ExtractionError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            ExtractionError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        ExtractionError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = validate_pdf_file(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_not_a_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PK\x03\x04 this is a zip").unwrap();
        let err = validate_pdf_file(tmp.path()).unwrap_err();
        match err {
            ExtractionError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn pdf_magic_passes_validation() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n%fake body").unwrap();
        assert!(validate_pdf_file(tmp.path()).is_ok());
    }

    #[tokio::test]
    async fn extractor_rejects_non_pdf_before_binding_pdfium() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let err = PdfiumTextExtractor::new().extract(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NotAPdf { .. }));
    }
}
