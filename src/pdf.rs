//! PDF text extraction.
//!
//! Wraps the pdf-extract crate. Malformed gazette PDFs occasionally make it
//! panic, so the call is isolated and any panic becomes an `Extraction` error.

use std::panic;

use crate::error::{BocmError, Result};

pub trait TextExtractor: Send + Sync {
    /// Concatenated text of every page, in page order.
    fn extract_text(&self, bytes: &[u8]) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        if !bytes.starts_with(b"%PDF") {
            return Err(BocmError::Extraction("not a PDF document".into()));
        }
        panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| BocmError::Extraction("PDF parser panicked".into()))?
            .map_err(|e| BocmError::Extraction(format!("{e:?}")))
    }
}

/// Extract text, degrading to an empty string on failure.
pub fn extract_or_empty(extractor: &dyn TextExtractor, bytes: &[u8], label: &str) -> String {
    match extractor.extract_text(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(source = %label, error = %e, "text extraction failed, continuing with empty text");
            String::new()
        }
    }
}
