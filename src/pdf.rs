use std::path::{Path, PathBuf};
use log::{info, warn};

use crate::error::DocumentError;

/// Minimum non-whitespace characters for a text layer to count as real text.
pub const MIN_TEXT_LAYER_CHARS: usize = 50;

/// Raw bytes and page count of a PDF that passed inspection.
#[derive(Debug, Clone)]
pub struct PdfInfo {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PdfProcessor;

impl PdfProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Load a PDF and make sure it has at least one page.
    pub async fn inspect(&self, pdf_path: &Path) -> Result<PdfInfo, DocumentError> {
        if !pdf_path.is_file() {
            return Err(DocumentError::NotFound(pdf_path.to_path_buf()));
        }

        let bytes = tokio::fs::read(pdf_path).await?;
        let page_count = Self::page_count(&bytes).map_err(|reason| DocumentError::Unreadable {
            path: pdf_path.to_path_buf(),
            reason,
        })?;

        if page_count == 0 {
            return Err(DocumentError::NoPages(pdf_path.to_path_buf()));
        }

        Ok(PdfInfo {
            path: pdf_path.to_path_buf(),
            bytes,
            page_count,
        })
    }

    /// Get PDF page count
    pub fn page_count(bytes: &[u8]) -> Result<usize, String> {
        let document = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
        Ok(document.get_pages().len())
    }

    /// Extract the embedded text layer, page by page, using lopdf with a
    /// pdf-extract fallback when lopdf finds little text.
    pub fn extract_text_layer(&self, pdf_path: &Path, bytes: &[u8]) -> Result<String, String> {
        let document = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;

        let mut pages = Vec::new();
        for (page_num, _) in document.get_pages() {
            match document.extract_text(&[page_num]) {
                Ok(page_text) => {
                    if !page_text.trim().is_empty() {
                        pages.push(page_text.trim_end().to_string());
                    }
                }
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_num, e);
                }
            }
        }
        let text = pages.join("\n\n");

        if !Self::has_extractable_text(&text) {
            match pdf_extract::extract_text_from_mem(bytes) {
                Ok(extracted) => {
                    if extracted.trim().len() > text.trim().len() {
                        info!("Using pdf-extract fallback for {}", pdf_path.display());
                        return Ok(extracted);
                    }
                }
                Err(e) => {
                    warn!("pdf-extract fallback failed: {}", e);
                }
            }
        }

        Ok(text)
    }

    /// Check if PDF has substantial extractable text
    pub fn has_extractable_text(text: &str) -> bool {
        text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_TEXT_LAYER_CHARS
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new()
    }
}
