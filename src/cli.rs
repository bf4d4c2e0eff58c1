use clap::Parser;
use std::path::PathBuf;

use crate::config::{LocalFormat, ProviderKind};
use crate::fields::TitleFallback;

#[derive(Parser, Debug, Clone)]
#[command(name = "pdf-metadata-extractor")]
#[command(about = "Extract bibliographic metadata from scanned PDFs into a spreadsheet or local file")]
#[command(version)]
pub struct Args {
    /// Folder of PDFs to process (one batch). Without it, every sub-folder of
    /// --input-root named after a destination tab is processed.
    #[arg(short, long)]
    pub folder: Option<PathBuf>,

    /// Root folder holding one sub-folder per destination tab
    #[arg(long, env = "INPUT_DIR", default_value = "input_dirs")]
    pub input_root: PathBuf,

    /// Destination tab / sheet name
    #[arg(short, long, env = "SHEET_TAB")]
    pub tab: Option<String>,

    /// Folder / batch identifier written with every record (e.g. FF1)
    #[arg(long = "folder-number", env = "FF_NUMBER")]
    pub folder_number: Option<String>,

    /// Expected year of the documents in this batch
    #[arg(short, long)]
    pub year: Option<i32>,

    /// First sheet row to write (rows above hold headers)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    pub start_row: u32,

    /// First sheet column to write
    #[arg(long, default_value = "C")]
    pub start_column: String,

    /// Print the destination tabs and exit
    #[arg(long)]
    pub list_tabs: bool,

    /// Skip the spreadsheet and write records to the local output only
    #[arg(long)]
    pub offline: bool,

    /// Directory for local output files
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Local output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: LocalFormat,

    /// Provider order, tried until one succeeds
    #[arg(long, value_enum, value_delimiter = ',', default_value = "docai,textract,local")]
    pub providers: Vec<ProviderKind>,

    /// Rasterization DPI for local OCR
    #[arg(long, default_value = "300")]
    pub dpi: u32,

    /// Tesseract language(s)
    #[arg(long, default_value = "eng")]
    pub lang: String,

    /// Adaptive threshold window (pixels, odd)
    #[arg(long, default_value = "51")]
    pub threshold_window: u32,

    /// Adaptive threshold offset subtracted from the local mean
    #[arg(long, default_value = "10")]
    pub threshold_offset: f32,

    /// Title used when no text line is found
    #[arg(long, value_enum, default_value = "sentinel")]
    pub title_fallback: TitleFallback,

    /// Characters kept in heuristic descriptions
    #[arg(long, default_value = "100")]
    pub description_chars: usize,

    /// Timeout for each remote call, in seconds
    #[arg(long, default_value = "60")]
    pub request_timeout: u64,

    /// Timeout for each OCR subprocess, in seconds
    #[arg(long, default_value = "120")]
    pub ocr_timeout: u64,

    /// Google Sheets spreadsheet id
    #[arg(long, env = "SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// OAuth access token for Google APIs (Sheets and Document AI); overrides
    /// the service account key
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub google_access_token: Option<String>,

    /// Service account key file for Google APIs
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub google_credentials: Option<PathBuf>,

    /// Document AI project id
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub gcp_project: Option<String>,

    /// Document AI location
    #[arg(long, env = "GCP_LOCATION", default_value = "us")]
    pub gcp_location: String,

    /// Document AI processor id
    #[arg(long, env = "DOCAI_PROCESSOR")]
    pub docai_processor: Option<String>,

    /// AWS region for Textract
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub aws_region: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    /// OpenAI API key for LLM field extraction after Textract
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo")]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Show verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
