//! Batch orchestration: find the PDFs of one folder, extract each one, and
//! deliver the finished records.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::document::DocumentRef;
use crate::error::{BatchError, DocumentError, SinkError};
use crate::pdf::PdfProcessor;
use crate::progress::ProgressTracker;
use crate::provider::ProviderChain;
use crate::record::{MetadataRecord, RecordBuilder};
use crate::sink::{RecordSink, WriteOutcome};

/// Caller-supplied context for one batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub source: PathBuf,
    pub destination: String,
    pub year: Option<i32>,
    pub folder_number: Option<String>,
    pub start_row: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub filename: String,
    pub cause: String,
}

/// Where a batch's records went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No record was produced, so no sink was called.
    NothingToWrite,
    Written {
        sink: String,
        location: String,
        rows: usize,
    },
    /// The remote sink failed and the local sink took the rows.
    FellBack {
        sink: String,
        location: String,
        rows: usize,
        reason: String,
    },
}

#[derive(Debug)]
pub struct BatchReport {
    pub destination: String,
    pub records: Vec<MetadataRecord>,
    pub failures: Vec<DocumentFailure>,
    /// Provider attempts that failed across all documents.
    pub provider_failures: usize,
    pub delivery: Delivery,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

pub struct MetadataExtractor {
    chain: ProviderChain,
    builder: RecordBuilder,
    pdf_processor: PdfProcessor,
    remote: Option<Box<dyn RecordSink>>,
    local: Box<dyn RecordSink>,
    remote_disabled: AtomicBool,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl MetadataExtractor {
    pub fn new(chain: ProviderChain, builder: RecordBuilder, local: Box<dyn RecordSink>) -> Self {
        Self {
            chain,
            builder,
            pdf_processor: PdfProcessor::new(),
            remote: None,
            local,
            remote_disabled: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    pub fn with_remote(mut self, remote: Box<dyn RecordSink>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Flag checked between documents; setting it stops the batch after the
    /// current document.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn remote(&self) -> Option<&dyn RecordSink> {
        if self.remote_disabled.load(Ordering::SeqCst) {
            None
        } else {
            self.remote.as_deref()
        }
    }

    /// PDF files directly inside `dir` (extension matched case-insensitively),
    /// sorted by file name.
    pub fn find_pdf_files(&self, dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
        if !dir.is_dir() {
            return Err(BatchError::SourceMissing(dir.to_path_buf()));
        }

        let mut pdf_files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

            if entry.file_type().is_file() && is_pdf {
                pdf_files.push(path.to_path_buf());
            }
        }

        pdf_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(pdf_files)
    }

    /// Destinations known to the remote sink, or to the local sink when
    /// running offline.
    pub async fn list_destinations(&self) -> Result<Vec<String>, SinkError> {
        match self.remote() {
            Some(remote) => remote.list_destinations().await,
            None => self.local.list_destinations().await,
        }
    }

    /// Sub-folders of `input_root` to process in all-tabs mode: those named
    /// after a remote destination, or every sub-folder when offline or when
    /// the remote listing fails.
    pub async fn plan_all_tabs(&self, input_root: &Path) -> Result<Vec<String>, BatchError> {
        if !input_root.is_dir() {
            return Err(BatchError::SourceMissing(input_root.to_path_buf()));
        }

        let mut folders = Vec::new();
        for entry in WalkDir::new(input_root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                folders.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        folders.sort();

        let Some(remote) = self.remote() else {
            return Ok(folders);
        };

        let tabs = match remote.list_destinations().await {
            Ok(tabs) => tabs,
            Err(e) => {
                if e.is_fatal() {
                    self.remote_disabled.store(true, Ordering::SeqCst);
                    error!("Remote sink disabled for this run: {}", e);
                }
                warn!(
                    "Cannot list {} destinations ({}); processing every input folder",
                    remote.name(),
                    e
                );
                return Ok(folders);
            }
        };
        for tab in &tabs {
            if !folders.contains(tab) {
                info!("No input folder for tab '{}', skipping", tab);
            }
        }
        Ok(tabs.into_iter().filter(|t| folders.contains(t)).collect())
    }

    /// Extract every document of one folder and deliver the records.
    pub async fn process_batch(&self, ctx: &BatchContext) -> Result<BatchReport, BatchError> {
        let pdf_files = self.find_pdf_files(&ctx.source)?;
        info!(
            "Batch '{}': {} PDF file(s) in {}",
            ctx.destination,
            pdf_files.len(),
            ctx.source.display()
        );

        let progress = ProgressTracker::new(pdf_files.len(), &ctx.destination, self.show_progress);
        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut provider_failures = 0;
        let mut cancelled = false;

        for (index, pdf_path) in pdf_files.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(
                    "Cancelled: {} of {} document(s) left unprocessed",
                    pdf_files.len() - index,
                    pdf_files.len()
                );
                cancelled = true;
                break;
            }

            let filename = pdf_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress.start_document(&filename);
            info!("Processing ({}/{}): {}", index + 1, pdf_files.len(), filename);

            match self.process_document(pdf_path, ctx).await {
                Ok((record, failed_attempts)) => {
                    provider_failures += failed_attempts;
                    records.push(record);
                }
                Err(e) => {
                    error!("{}: {}", filename, e);
                    progress.println(&format!("failed: {}: {}", filename, e));
                    failures.push(DocumentFailure {
                        filename,
                        cause: e.to_string(),
                    });
                }
            }
            progress.increment();
        }
        progress.finish(records.len(), failures.len());

        let delivery = self.deliver(ctx, &records).await?;

        Ok(BatchReport {
            destination: ctx.destination.clone(),
            records,
            failures,
            provider_failures,
            delivery,
            cancelled,
        })
    }

    /// Returns the record and the number of provider attempts that failed
    /// before one succeeded (or the chain ran out).
    pub async fn process_document(
        &self,
        pdf_path: &Path,
        ctx: &BatchContext,
    ) -> Result<(MetadataRecord, usize), DocumentError> {
        let info = self.pdf_processor.inspect(pdf_path).await?;
        let doc = DocumentRef::new(info, ctx.year, ctx.folder_number.clone());
        debug!("{}: {} page(s), {} bytes", doc.filename, doc.page_count, doc.bytes.len());

        let outcome = self.chain.extract(&doc).await;
        let record = self
            .builder
            .build(&doc, &outcome.result, Some(ctx.destination.as_str()));

        Ok((record, outcome.failures.len()))
    }

    async fn deliver(&self, ctx: &BatchContext, records: &[MetadataRecord]) -> Result<Delivery, BatchError> {
        if records.is_empty() {
            info!("Batch '{}': nothing to write", ctx.destination);
            return Ok(Delivery::NothingToWrite);
        }

        let reason = match self.remote() {
            None => None,
            Some(remote) => match remote.write_batch(&ctx.destination, records, ctx.start_row).await {
                Ok(WriteOutcome::Written { location, rows }) => {
                    return Ok(Delivery::Written {
                        sink: remote.name().to_string(),
                        location,
                        rows,
                    })
                }
                Ok(WriteOutcome::Rejected { reason }) => Some(reason),
                Err(e) => {
                    if e.is_fatal() {
                        // credentials and quota do not recover within a run
                        self.remote_disabled.store(true, Ordering::SeqCst);
                        error!("Remote sink disabled for this run: {}", e);
                    }
                    Some(e.to_string())
                }
            },
        };

        if let Some(reason) = &reason {
            warn!(
                "Remote write for '{}' failed ({}); falling back to {}",
                ctx.destination,
                reason,
                self.local.name()
            );
        }

        match self.local.write_batch(&ctx.destination, records, ctx.start_row).await? {
            WriteOutcome::Written { location, rows } => Ok(match reason {
                Some(reason) => Delivery::FellBack {
                    sink: self.local.name().to_string(),
                    location,
                    rows,
                    reason,
                },
                None => Delivery::Written {
                    sink: self.local.name().to_string(),
                    location,
                    rows,
                },
            }),
            WriteOutcome::Rejected { reason } => Err(BatchError::Sink(SinkError::Api(format!(
                "local sink rejected the batch: {}",
                reason
            )))),
        }
    }
}
