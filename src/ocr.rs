use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use log::{debug, error, info};
use tokio::process::Command;

use crate::error::ProviderError;

/// Text and raw per-word confidences recognised on one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOcr {
    pub text: String,
    /// Tesseract word confidences (0-100); negative values mean "no score".
    pub word_confidences: Vec<f32>,
}

/// Renders PDF pages to images.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, ProviderError>;
}

/// Recognises text on a preprocessed page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, page: &GrayImage, lang: &str, dpi: u32) -> Result<PageOcr, ProviderError>;
}

/// `pdftoppm` from poppler-utils.
pub struct PdftoppmRasterizer {
    timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, ProviderError> {
        let temp_dir = tempfile::tempdir().map_err(|e| ProviderError::Unknown(e.to_string()))?;
        let image_prefix = temp_dir.path().join("page");

        let mut command = Command::new("pdftoppm");
        command
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(&image_prefix);

        let output = run_with_timeout(command, "pdftoppm", self.timeout).await?;
        if !output.status.success() {
            return Err(ProviderError::MalformedInput(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // pdftoppm zero-pads page numbers, so a lexical sort is page order
        let mut image_files: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(temp_dir.path())
            .await
            .map_err(|e| ProviderError::Unknown(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProviderError::Unknown(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("png") {
                image_files.push(path);
            }
        }
        image_files.sort();

        if image_files.is_empty() {
            return Err(ProviderError::MalformedInput("No images generated from PDF".into()));
        }

        let mut pages = Vec::with_capacity(image_files.len());
        for path in &image_files {
            let page = image::open(path)
                .map_err(|e| ProviderError::MalformedInput(format!("{}: {}", path.display(), e)))?;
            pages.push(page);
        }

        debug!("Rasterized {} page(s) of {} at {} DPI", pages.len(), pdf_path.display(), dpi);
        Ok(pages)
    }
}

/// The `tesseract` command line engine.
pub struct TesseractCli {
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, page: &GrayImage, lang: &str, dpi: u32) -> Result<PageOcr, ProviderError> {
        let temp_dir = tempfile::tempdir().map_err(|e| ProviderError::Unknown(e.to_string()))?;
        let image_path = temp_dir.path().join("page.png");
        let output_base = temp_dir.path().join("page");

        page.save(&image_path)
            .map_err(|e| ProviderError::MalformedInput(format!("could not encode page: {}", e)))?;

        // one run writes both page.txt and page.tsv
        let mut command = Command::new("tesseract");
        command
            .arg(&image_path)
            .arg(&output_base)
            .args(["-l", lang, "--dpi"])
            .arg(dpi.to_string())
            .args(["txt", "tsv"]);

        let output = run_with_timeout(command, "tesseract", self.timeout).await?;
        if !output.status.success() {
            return Err(ProviderError::Unknown(format!(
                "Tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = tokio::fs::read_to_string(output_base.with_extension("txt"))
            .await
            .map_err(|e| ProviderError::Unknown(format!("missing tesseract text output: {}", e)))?;
        let tsv = tokio::fs::read_to_string(output_base.with_extension("tsv"))
            .await
            .map_err(|e| ProviderError::Unknown(format!("missing tesseract TSV output: {}", e)))?;

        Ok(PageOcr {
            text,
            word_confidences: parse_tsv_confidences(&tsv),
        })
    }
}

async fn run_with_timeout(
    mut command: Command,
    program: &str,
    timeout: Duration,
) -> Result<Output, ProviderError> {
    command.kill_on_drop(true);
    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ProviderError::NotConfigured(format!("failed to run {}: {}", program, e))),
        Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
    }
}

/// Word-level (level 5) confidences from Tesseract TSV output.
///
/// TSV columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Rows whose confidence does not parse are dropped.
pub fn parse_tsv_confidences(tsv: &str) -> Vec<f32> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 11 || fields[0].trim() != "5" {
                return None;
            }
            fields[10].trim().parse::<f32>().ok().filter(|c| c.is_finite())
        })
        .collect()
}

/// Check if OCR tools are available
pub async fn check_ocr_availability() -> bool {
    let tesseract_available = Command::new("tesseract")
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false);

    let pdftoppm_available = Command::new("pdftoppm")
        .arg("-v")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false);

    if !tesseract_available {
        error!("Tesseract not found. Install with: apt install tesseract-ocr");
    }

    if !pdftoppm_available {
        error!("pdftoppm not found. Install with: apt install poppler-utils");
    }

    if tesseract_available && pdftoppm_available {
        info!("Local OCR tools available");
    }

    tesseract_available && pdftoppm_available
}
