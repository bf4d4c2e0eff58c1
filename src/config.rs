//! Run configuration.
//!
//! Everything tunable lives in [`Config`], which is built once from the
//! command line (with environment fallbacks) and handed to the components
//! that need it. Nothing reads configuration from globals.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::GoogleCredentials;
use crate::cli::Args;
use crate::fields::TitleFallback;
use crate::preprocess::ThresholdParams;

/// Text extraction backends, in the names accepted by `--providers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Google Document AI
    Docai,
    /// AWS Textract, optionally followed by LLM field extraction
    Textract,
    /// pdftoppm + preprocessing + Tesseract
    Local,
    /// Embedded PDF text layer
    TextLayer,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Docai => "docai",
            ProviderKind::Textract => "textract",
            ProviderKind::Local => "local",
            ProviderKind::TextLayer => "text-layer",
        };
        f.write_str(name)
    }
}

/// Serialization used by the local file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LocalFormat {
    /// One pretty-printed JSON array per destination
    Json,
    /// SQLite record store shared by all destinations
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub dpi: u32,
    pub language: String,
    pub threshold: ThresholdParams,
    pub subprocess_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DocumentAiSettings {
    pub project_id: String,
    pub location: String,
    pub processor_id: String,
    pub credentials: GoogleCredentials,
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub spreadsheet_id: String,
    pub credentials: GoogleCredentials,
    pub start_column: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider_order: Vec<ProviderKind>,
    pub ocr: OcrSettings,
    pub request_timeout: Duration,
    pub title_fallback: TitleFallback,
    pub description_chars: usize,
    pub start_row: u32,
    pub output_dir: PathBuf,
    pub local_format: LocalFormat,
    pub input_root: PathBuf,
    pub docai: Option<DocumentAiSettings>,
    pub aws: Option<AwsSettings>,
    pub openai: Option<OpenAiSettings>,
    pub sheets: Option<SheetsSettings>,
    pub show_progress: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        let google = GoogleCredentials::resolve(
            non_empty(&args.google_access_token),
            args.google_credentials.clone(),
        );

        let docai = match (non_empty(&args.gcp_project), non_empty(&args.docai_processor), &google) {
            (Some(project_id), Some(processor_id), Some(credentials)) => Some(DocumentAiSettings {
                project_id,
                location: args.gcp_location.clone(),
                processor_id,
                credentials: credentials.clone(),
            }),
            _ => None,
        };

        let aws = match (non_empty(&args.aws_access_key_id), non_empty(&args.aws_secret_access_key)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(AwsSettings {
                region: args.aws_region.clone(),
                access_key_id,
                secret_access_key,
                session_token: non_empty(&args.aws_session_token),
            }),
            _ => None,
        };

        let openai = non_empty(&args.openai_api_key).map(|api_key| OpenAiSettings {
            api_key,
            model: args.openai_model.clone(),
            base_url: args.openai_base_url.trim_end_matches('/').to_string(),
        });

        let sheets = match (non_empty(&args.spreadsheet_id), &google) {
            (Some(spreadsheet_id), Some(credentials)) => Some(SheetsSettings {
                spreadsheet_id,
                credentials: credentials.clone(),
                start_column: args.start_column.to_ascii_uppercase(),
            }),
            _ => None,
        };

        let mut provider_order = Vec::new();
        for kind in &args.providers {
            if !provider_order.contains(kind) {
                provider_order.push(*kind);
            }
        }

        Self {
            provider_order,
            ocr: OcrSettings {
                dpi: args.dpi.max(72),
                language: args.lang.clone(),
                threshold: ThresholdParams {
                    window: args.threshold_window,
                    offset: args.threshold_offset,
                },
                subprocess_timeout: Duration::from_secs(args.ocr_timeout.max(1)),
            },
            request_timeout: Duration::from_secs(args.request_timeout.max(1)),
            title_fallback: args.title_fallback,
            description_chars: args.description_chars.max(1),
            start_row: args.start_row,
            output_dir: args.output_dir.clone(),
            local_format: args.format,
            input_root: args.input_root.clone(),
            docai,
            aws,
            openai,
            sheets,
            show_progress: !args.quiet,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Config {
        let mut full = vec!["pdf-metadata-extractor"];
        full.extend_from_slice(argv);
        Config::from_args(&Args::parse_from(full))
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&["--offline"]);
        assert_eq!(config.ocr.dpi, 300);
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.start_row, 3);
        assert_eq!(config.ocr.threshold, ThresholdParams::default());
        assert_eq!(
            config.provider_order,
            vec![ProviderKind::Docai, ProviderKind::Textract, ProviderKind::Local]
        );
    }

    #[test]
    fn provider_order_is_deduplicated() {
        let config = parse(&["--providers", "local,text-layer,local"]);
        assert_eq!(config.provider_order, vec![ProviderKind::Local, ProviderKind::TextLayer]);
    }

    #[test]
    fn cloud_settings_require_all_credentials() {
        let config = parse(&["--gcp-project", "p", "--docai-processor", "abc"]);
        // no Google credentials on the command line; env may supply them
        if std::env::var("GOOGLE_ACCESS_TOKEN").is_err()
            && std::env::var("GOOGLE_APPLICATION_CREDENTIALS").is_err()
        {
            assert!(config.docai.is_none());
        }

        let config = parse(&[
            "--gcp-project",
            "p",
            "--docai-processor",
            "abc",
            "--google-access-token",
            "tok",
        ]);
        let docai = config.docai.expect("docai configured");
        assert_eq!(docai.processor_id, "abc");
    }

    #[test]
    fn sheets_accept_a_service_account_key() {
        if std::env::var("GOOGLE_ACCESS_TOKEN").is_ok() {
            return;
        }
        let config = parse(&["--spreadsheet-id", "sheet", "--google-credentials", "/etc/key.json"]);
        let sheets = config.sheets.expect("sheets configured");
        assert_eq!(
            sheets.credentials,
            GoogleCredentials::ServiceAccountFile(PathBuf::from("/etc/key.json"))
        );
    }

    #[test]
    fn access_token_flag_overrides_the_key_file() {
        let config = parse(&[
            "--spreadsheet-id",
            "sheet",
            "--google-credentials",
            "/etc/key.json",
            "--google-access-token",
            "tok",
        ]);
        let sheets = config.sheets.expect("sheets configured");
        assert_eq!(sheets.credentials, GoogleCredentials::AccessToken("tok".into()));
    }

    #[test]
    fn start_row_must_be_positive() {
        let result = Args::try_parse_from(["pdf-metadata-extractor", "--start-row", "0"]);
        assert!(result.is_err());
    }
}
