use async_trait::async_trait;

use crate::document::DocumentRef;
use crate::error::ProviderError;
use crate::pdf::PdfProcessor;

use super::{run_blocking, ExtractionProvider, ExtractionResult};

/// Uses the text already embedded in the PDF. Only digital-born documents
/// pass; scans fall through to the next provider.
pub struct TextLayerProvider {
    pdf: PdfProcessor,
}

impl TextLayerProvider {
    pub fn new() -> Self {
        Self {
            pdf: PdfProcessor::new(),
        }
    }
}

impl Default for TextLayerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionProvider for TextLayerProvider {
    fn name(&self) -> &str {
        "text-layer"
    }

    async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, ProviderError> {
        let pdf = self.pdf;
        let path = doc.path.clone();
        let bytes = doc.bytes.clone();
        // pdf-extract can panic on broken font programs
        let text = run_blocking("text layer", move || pdf.extract_text_layer(&path, &bytes))
            .await?
            .map_err(ProviderError::MalformedInput)?;

        if !PdfProcessor::has_extractable_text(&text) {
            return Err(ProviderError::NoText);
        }

        Ok(ExtractionResult::new(text.trim().to_string(), 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::doc;

    #[tokio::test]
    async fn unparseable_bytes_are_malformed() {
        let err = TextLayerProvider::new().extract(&doc("x.pdf")).await.unwrap_err();
        assert_eq!(err.kind(), "malformed-input");
    }
}
