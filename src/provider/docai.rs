use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::auth::{GoogleAuth, CLOUD_PLATFORM_SCOPE};
use crate::config::DocumentAiSettings;
use crate::document::DocumentRef;
use crate::error::ProviderError;

use super::{ExtractionProvider, ExtractionResult, ProvidedFields};

/// Characters of document text used as the description when the processor
/// returns no description entity.
pub const DOCAI_DESCRIPTION_CHARS: usize = 500;

/// Google Document AI `process` endpoint.
pub struct DocumentAiProvider {
    settings: DocumentAiSettings,
    auth: GoogleAuth,
    client: reqwest::Client,
    timeout: Duration,
}

impl DocumentAiProvider {
    pub fn new(settings: DocumentAiSettings, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;
        let auth = GoogleAuth::new(&settings.credentials, CLOUD_PLATFORM_SCOPE)?;

        Ok(Self {
            settings,
            auth,
            client,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{loc}-documentai.googleapis.com/v1/projects/{project}/locations/{loc}/processors/{processor}:process",
            loc = self.settings.location,
            project = self.settings.project_id,
            processor = self.settings.processor_id,
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub document: Option<DocaiDocument>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocaiDocument {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub entities: Vec<DocaiEntity>,
    #[serde(default)]
    pub pages: Vec<DocaiPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocaiEntity {
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub mention_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocaiPage {
    #[serde(default)]
    pub layout: Option<DocaiLayout>,
}

#[derive(Debug, Deserialize)]
pub struct DocaiLayout {
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Map a processor response to an extraction result. Entities named
/// title/date/volume/issue/description become provided fields; the first
/// mention of each type wins.
pub fn map_response(response: ProcessResponse) -> ExtractionResult {
    let document = response.document.unwrap_or_default();

    let mut fields = ProvidedFields::default();
    for entity in &document.entities {
        let slot = match entity.entity_type.to_ascii_lowercase().as_str() {
            "title" => &mut fields.title,
            "date" | "document_date" => &mut fields.date,
            "volume" => &mut fields.volume,
            "issue" => &mut fields.issue,
            "description" => &mut fields.description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = entity.mention_text.clone().filter(|t| !t.trim().is_empty());
        }
    }

    if fields.description.is_none() {
        let prefix: String = document.text.chars().take(DOCAI_DESCRIPTION_CHARS).collect();
        fields.description = Some(prefix);
    }

    let page_confidences: Vec<f64> = document
        .pages
        .iter()
        .filter_map(|p| p.layout.as_ref().and_then(|l| l.confidence))
        .collect();
    let confidence = if page_confidences.is_empty() {
        0.0
    } else {
        page_confidences.iter().sum::<f64>() / page_confidences.len() as f64 * 100.0
    };

    ExtractionResult::new(document.text.trim().to_string(), confidence).with_fields(fields)
}

#[async_trait]
impl ExtractionProvider for DocumentAiProvider {
    fn name(&self) -> &str {
        "docai"
    }

    async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, ProviderError> {
        let body = ProcessRequest {
            raw_document: RawDocument {
                content: STANDARD.encode(&doc.bytes),
                mime_type: "application/pdf",
            },
        };

        let token = self.auth.bearer().await?;
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: ProcessResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedInput(format!("Document AI response: {}", e)))?;

        Ok(map_response(parsed))
    }
}
