use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use crate::config::AwsSettings;
use crate::document::DocumentRef;
use crate::error::ProviderError;

use super::llm::LlmFieldExtractor;
use super::sigv4::{self, CanonicalInput, Credentials};
use super::{ExtractionProvider, ExtractionResult};

const TARGET: &str = "Textract.DetectDocumentText";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// AWS Textract text detection, optionally followed by LLM field extraction.
pub struct TextractProvider {
    settings: AwsSettings,
    client: reqwest::Client,
    timeout: Duration,
    llm: Option<LlmFieldExtractor>,
}

impl TextractProvider {
    pub fn new(
        settings: AwsSettings,
        timeout: Duration,
        llm: Option<LlmFieldExtractor>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            client,
            timeout,
            llm,
        })
    }

    fn host(&self) -> String {
        format!("textract.{}.amazonaws.com", self.settings.region)
    }

    async fn detect_text(&self, bytes: &[u8]) -> Result<DetectResponse, ProviderError> {
        let host = self.host();
        let payload = serde_json::to_vec(&json!({ "Document": { "Bytes": STANDARD.encode(bytes) } }))
            .map_err(|e| ProviderError::Unknown(e.to_string()))?;

        let credentials = Credentials {
            access_key_id: &self.settings.access_key_id,
            secret_access_key: &self.settings.secret_access_key,
            session_token: self.settings.session_token.as_deref(),
        };
        let input = CanonicalInput {
            method: "POST",
            path: "/",
            query: "",
            headers: vec![
                ("content-type", CONTENT_TYPE.to_string()),
                ("host", host.clone()),
                ("x-amz-target", TARGET.to_string()),
            ],
            payload: &payload,
        };
        let signed = sigv4::sign(&credentials, &self.settings.region, "textract", &input, Utc::now())?;

        let mut request = self
            .client
            .post(format!("https://{}/", host))
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout.as_secs()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout.as_secs()))?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedInput(format!("Textract response: {}", e)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectResponse {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Newline-joined LINE blocks and their mean confidence.
pub fn lines_and_confidence(response: &DetectResponse) -> (String, f64) {
    let lines: Vec<&Block> = response
        .blocks
        .iter()
        .filter(|b| b.block_type == "LINE")
        .collect();

    let text = lines
        .iter()
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    let scores: Vec<f64> = lines.iter().filter_map(|b| b.confidence).collect();
    let confidence = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    (text.trim().to_string(), confidence)
}

#[derive(Deserialize)]
struct AwsErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Map an AWS JSON error to a provider error, using the exception name when
/// present and the HTTP status otherwise.
fn classify_error(status: u16, body: &str) -> ProviderError {
    let Ok(parsed) = serde_json::from_str::<AwsErrorBody>(body) else {
        return ProviderError::from_status(status, body);
    };

    let exception = parsed.error_type.rsplit('#').next().unwrap_or_default();
    let detail = format!("{}: {}", exception, parsed.message);
    match exception {
        "UnrecognizedClientException"
        | "InvalidSignatureException"
        | "AccessDeniedException"
        | "ExpiredTokenException"
        | "MissingAuthenticationTokenException" => ProviderError::Auth(detail),
        "ThrottlingException" | "ProvisionedThroughputExceededException" | "LimitExceededException" => {
            ProviderError::Quota(detail)
        }
        "InvalidParameterException"
        | "UnsupportedDocumentException"
        | "BadDocumentException"
        | "DocumentTooLargeException" => ProviderError::MalformedInput(detail),
        "InternalServerError" | "ServiceUnavailableException" => ProviderError::Network(detail),
        _ => ProviderError::from_status(status, &detail),
    }
}

#[async_trait]
impl ExtractionProvider for TextractProvider {
    fn name(&self) -> &str {
        "textract"
    }

    async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, ProviderError> {
        let response = self.detect_text(&doc.bytes).await?;
        let (text, confidence) = lines_and_confidence(&response);
        debug!("{}: Textract returned {} chars", doc.filename, text.len());

        let mut result = ExtractionResult::new(text, confidence);
        if let (Some(llm), false) = (&self.llm, result.text.is_empty()) {
            match llm.extract_fields(&result.text).await {
                Ok(fields) => result = result.with_fields(fields),
                Err(e) => warn!(
                    "{}: LLM field extraction failed, using heuristics: {}",
                    doc.filename, e
                ),
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_line_blocks_are_used() {
        let response: DetectResponse = serde_json::from_str(
            r#"{"Blocks": [
                {"BlockType": "PAGE", "Confidence": 10.0},
                {"BlockType": "LINE", "Text": "HARBOR NEWS", "Confidence": 99.0},
                {"BlockType": "WORD", "Text": "HARBOR", "Confidence": 5.0},
                {"BlockType": "LINE", "Text": "Vol. 4 No. 2", "Confidence": 91.0}
            ]}"#,
        )
        .unwrap();

        let (text, confidence) = lines_and_confidence(&response);
        assert_eq!(text, "HARBOR NEWS\nVol. 4 No. 2");
        assert!((confidence - 95.0).abs() < 1e-9);
    }

    #[test]
    fn no_lines_means_no_confidence() {
        let (text, confidence) = lines_and_confidence(&DetectResponse::default());
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn exceptions_map_to_kinds() {
        let body = |t: &str| format!(r#"{{"__type": "com.amazonaws.textract#{}", "message": "m"}}"#, t);
        assert_eq!(classify_error(400, &body("UnrecognizedClientException")).kind(), "auth");
        assert_eq!(classify_error(400, &body("ThrottlingException")).kind(), "quota");
        assert_eq!(
            classify_error(400, &body("UnsupportedDocumentException")).kind(),
            "malformed-input"
        );
        assert_eq!(classify_error(500, &body("InternalServerError")).kind(), "network");
        assert_eq!(classify_error(403, "<html>denied</html>").kind(), "auth");
    }
}
