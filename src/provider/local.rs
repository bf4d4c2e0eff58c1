use async_trait::async_trait;
use log::debug;

use crate::config::OcrSettings;
use crate::document::DocumentRef;
use crate::error::{PreprocessError, ProviderError};
use crate::ocr::{OcrEngine, PageRasterizer, PdftoppmRasterizer, TesseractCli};
use crate::preprocess::preprocess_page;

use super::{run_blocking, ExtractionProvider, ExtractionResult};

/// Rasterize, preprocess and OCR every page locally.
pub struct LocalOcrProvider {
    rasterizer: Box<dyn PageRasterizer>,
    engine: Box<dyn OcrEngine>,
    settings: OcrSettings,
}

impl LocalOcrProvider {
    pub fn new(rasterizer: Box<dyn PageRasterizer>, engine: Box<dyn OcrEngine>, settings: OcrSettings) -> Self {
        Self {
            rasterizer,
            engine,
            settings,
        }
    }

    /// `pdftoppm` + `tesseract` from the host.
    pub fn with_system_tools(settings: OcrSettings) -> Self {
        let timeout = settings.subprocess_timeout;
        Self::new(
            Box::new(PdftoppmRasterizer::new(timeout)),
            Box::new(TesseractCli::new(timeout)),
            settings,
        )
    }
}

#[async_trait]
impl ExtractionProvider for LocalOcrProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, ProviderError> {
        let pages = self.rasterizer.rasterize(&doc.path, self.settings.dpi).await?;

        let mut texts = Vec::with_capacity(pages.len());
        let mut confidences = Vec::with_capacity(pages.len());

        for (index, page) in pages.into_iter().enumerate() {
            let threshold = self.settings.threshold;
            let prepared = run_blocking("preprocessing", move || preprocess_page(&page, threshold))
                .await?
                .map_err(|e: PreprocessError| {
                    ProviderError::MalformedInput(format!("page {}: {}", index + 1, e))
                })?;

            let ocr = self
                .engine
                .recognize(&prepared, &self.settings.language, self.settings.dpi)
                .await?;
            debug!(
                "{} page {}: {} chars, {} word scores",
                doc.filename,
                index + 1,
                ocr.text.len(),
                ocr.word_confidences.len()
            );

            texts.push(ocr.text.trim().to_string());
            confidences.push(ocr.word_confidences);
        }

        let text = texts.join("\n\n").trim().to_string();
        Ok(ExtractionResult::new(text, mean_confidence(&confidences)))
    }
}

/// Mean of per-page averages. Negative scores are excluded within a page;
/// a page with no valid scores averages to 0 and still counts.
pub fn mean_confidence(pages: &[Vec<f32>]) -> f64 {
    if pages.is_empty() {
        return 0.0;
    }

    let total: f64 = pages
        .iter()
        .map(|words| {
            let valid: Vec<f64> = words
                .iter()
                .filter(|c| **c >= 0.0)
                .map(|c| f64::from(*c))
                .collect();
            if valid.is_empty() {
                0.0
            } else {
                valid.iter().sum::<f64>() / valid.len() as f64
            }
        })
        .sum();

    total / pages.len() as f64
}
