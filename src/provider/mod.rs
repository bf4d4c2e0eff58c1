//! Text extraction providers and the fallback chain that drives them.
//!
//! A provider turns one document into text plus a confidence score, and may
//! also supply structured fields directly. The chain tries providers in
//! order; a failure advances to the next provider and is never retried for
//! the same document.

pub mod docai;
pub mod llm;
pub mod local;
pub mod sigv4;
pub mod text_layer;
pub mod textract;

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;

use crate::config::{Config, ProviderKind};
use crate::document::DocumentRef;
use crate::error::ProviderError;

pub use docai::DocumentAiProvider;
pub use llm::{LlmClient, LlmFieldExtractor, OpenAiClient};
pub use local::LocalOcrProvider;
pub use text_layer::TextLayerProvider;
pub use textract::TextractProvider;

/// Fields a provider extracted itself. Blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProvidedFields {
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Date", default)]
    pub date: Option<String>,
    #[serde(rename = "Volume", default)]
    pub volume: Option<String>,
    #[serde(rename = "Issue", default)]
    pub issue: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
}

impl ProvidedFields {
    /// Trim every value and drop the blank ones.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            title: clean(self.title),
            date: clean(self.date),
            volume: clean(self.volume),
            issue: clean(self.issue),
            description: clean(self.description),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.volume.is_none()
            && self.issue.is_none()
            && self.description.is_none()
    }
}

/// Output of one successful provider attempt, or of an exhausted chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub text: String,
    /// 0-100; 0 when no confidence signal is available.
    pub confidence: f64,
    pub fields: Option<ProvidedFields>,
    /// Name of the provider that produced this result.
    pub source: Option<String>,
}

impl ExtractionResult {
    pub fn new(text: String, confidence: f64) -> Self {
        Self {
            text,
            confidence,
            fields: None,
            source: None,
        }
    }

    pub fn with_fields(mut self, fields: ProvidedFields) -> Self {
        let fields = fields.normalized();
        self.fields = if fields.is_empty() { None } else { Some(fields) };
        self
    }

    /// Result used when every provider failed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || self.fields.is_some()
    }
}

#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, ProviderError>;
}

/// A provider failure recorded while walking the chain.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

#[derive(Debug)]
pub struct ChainOutcome {
    pub result: ExtractionResult,
    pub failures: Vec<ProviderFailure>,
}

pub struct ProviderChain {
    providers: Vec<Box<dyn ExtractionProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn ExtractionProvider>>) -> Self {
        Self { providers }
    }

    /// Build the configured providers in order, skipping the ones whose
    /// credentials are missing.
    pub fn from_config(config: &Config) -> Self {
        let mut providers: Vec<Box<dyn ExtractionProvider>> = Vec::new();

        for kind in &config.provider_order {
            let provider: Result<Box<dyn ExtractionProvider>, ProviderError> = match kind {
                ProviderKind::Docai => match &config.docai {
                    Some(settings) => DocumentAiProvider::new(settings.clone(), config.request_timeout)
                        .map(|p| Box::new(p) as Box<dyn ExtractionProvider>),
                    None => Err(ProviderError::NotConfigured(
                        "set GCP_PROJECT_ID, DOCAI_PROCESSOR and Google credentials".into(),
                    )),
                },
                ProviderKind::Textract => match &config.aws {
                    Some(settings) => {
                        let llm = match &config.openai {
                            Some(openai) => match OpenAiClient::new(openai.clone(), config.request_timeout) {
                                Ok(client) => Some(LlmFieldExtractor::new(Box::new(client))),
                                Err(e) => {
                                    warn!("LLM field extraction disabled: {}", e);
                                    None
                                }
                            },
                            None => None,
                        };
                        TextractProvider::new(settings.clone(), config.request_timeout, llm)
                            .map(|p| Box::new(p) as Box<dyn ExtractionProvider>)
                    }
                    None => Err(ProviderError::NotConfigured(
                        "set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".into(),
                    )),
                },
                ProviderKind::Local => Ok(Box::new(LocalOcrProvider::with_system_tools(config.ocr.clone()))),
                ProviderKind::TextLayer => Ok(Box::new(TextLayerProvider::new())),
            };

            match provider {
                Ok(p) => providers.push(p),
                Err(e) => warn!("Skipping provider {}: {}", kind, e),
            }
        }

        info!(
            "Provider chain: {}",
            if providers.is_empty() {
                "(empty)".to_string()
            } else {
                providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(" -> ")
            }
        );

        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider once, in order. Never fails: an exhausted chain
    /// yields an empty result with zero confidence.
    pub async fn extract(&self, doc: &DocumentRef) -> ChainOutcome {
        let mut failures = Vec::new();

        for provider in &self.providers {
            let outcome = provider.extract(doc).await.and_then(|result| {
                if result.has_content() {
                    Ok(result)
                } else {
                    Err(ProviderError::NoText)
                }
            });

            match outcome {
                Ok(mut result) => {
                    result.confidence = clamp_confidence(result.confidence);
                    result.source = Some(provider.name().to_string());
                    info!(
                        "{}: extracted {} chars via {} ({:.1}%)",
                        doc.filename,
                        result.text.len(),
                        provider.name(),
                        result.confidence
                    );
                    return ChainOutcome { result, failures };
                }
                Err(error) => {
                    warn!(
                        "{}: provider {} failed [{}]: {}",
                        doc.filename,
                        provider.name(),
                        error.kind(),
                        error
                    );
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        error,
                    });
                }
            }
        }

        warn!("{}: all providers failed, continuing with no text", doc.filename);
        ChainOutcome {
            result: ExtractionResult::empty(),
            failures,
        }
    }
}

/// Run CPU-bound or panic-prone work off the async workers. A panic in `work`
/// becomes a provider error instead of taking the batch down.
pub(crate) async fn run_blocking<T, F>(label: &str, work: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProviderError::Unknown(format!("{} task failed: {}", label, e)))
}

pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Provider returning a fixed outcome and counting its calls.
    pub struct ScriptedProvider {
        pub name: String,
        pub outcome: fn() -> Result<ExtractionResult, ProviderError>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        pub fn new(name: &str, outcome: fn() -> Result<ExtractionResult, ProviderError>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name: name.to_string(),
                    outcome,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl ExtractionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn extract(&self, _doc: &DocumentRef) -> Result<ExtractionResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    pub fn doc(filename: &str) -> DocumentRef {
        DocumentRef {
            path: std::path::PathBuf::from(filename),
            filename: filename.to_string(),
            bytes: b"%PDF-1.5".to_vec(),
            page_count: 1,
            year: None,
            folder_number: None,
        }
    }
}
