mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};

use common::{count, write_pdf, RecordingSink, ScriptedProvider, SinkBehavior};
use pdf_metadata_extractor::config::{LocalFormat, OcrSettings};
use pdf_metadata_extractor::error::ProviderError;
use pdf_metadata_extractor::extractor::{BatchContext, Delivery, MetadataExtractor};
use pdf_metadata_extractor::fields::UNKNOWN;
use pdf_metadata_extractor::ocr::{OcrEngine, PageOcr, PageRasterizer};
use pdf_metadata_extractor::preprocess::ThresholdParams;
use pdf_metadata_extractor::provider::{ExtractionProvider, ExtractionResult, LocalOcrProvider, ProviderChain};
use pdf_metadata_extractor::record::RecordBuilder;
use pdf_metadata_extractor::sink::local::read_records;
use pdf_metadata_extractor::sink::LocalFileSink;

fn context(source: &Path, destination: &str) -> BatchContext {
    BatchContext {
        source: source.to_path_buf(),
        destination: destination.to_string(),
        year: None,
        folder_number: Some("FF3".to_string()),
        start_row: 3,
    }
}

async fn local_sink(dir: &Path) -> Box<LocalFileSink> {
    Box::new(LocalFileSink::new(dir, LocalFormat::Json).await.unwrap())
}

fn text_provider(name: &str, text: &'static str) -> Box<dyn ExtractionProvider> {
    let (provider, _) = ScriptedProvider::new(name, move |_| Ok(ExtractionResult::new(text.to_string(), 91.0)));
    Box::new(provider)
}

#[tokio::test]
async fn auth_failure_falls_back_once_per_document() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "a.pdf", &["first"]);
    write_pdf(input.path(), "b.pdf", &["second"]);

    let (cloud, cloud_calls) = ScriptedProvider::new("cloud", |_| Err(ProviderError::Auth("HTTP 401".into())));
    let (local, local_calls) = ScriptedProvider::new("local", |doc| {
        Ok(ExtractionResult::new(format!("Report for {}\n2022-12-31", doc.filename), 77.0))
    });
    let chain = ProviderChain::new(vec![Box::new(cloud), Box::new(local)]);

    let extractor = MetadataExtractor::new(chain, RecordBuilder::default(), local_sink(output.path()).await);
    let report = extractor.process_batch(&context(input.path(), "Reports")).await.unwrap();

    assert_eq!(count(&cloud_calls), 2);
    assert_eq!(count(&local_calls), 2);
    assert_eq!(report.provider_failures, 2);
    assert_eq!(report.succeeded(), 2);

    let first = &report.records[0];
    assert_eq!(first.filename, "a.pdf");
    assert_eq!(first.title, "Report for a.pdf");
    assert_eq!(first.document_date, "2022/12/31");
    assert_eq!(first.confidence, "77.0%");
    assert_eq!(first.source.as_deref(), Some("local"));
    assert_eq!(first.folder_number.as_deref(), Some("FF3"));
    assert_eq!(first.tab.as_deref(), Some("Reports"));
}

#[tokio::test]
async fn unreadable_document_does_not_abort_batch() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "01.pdf", &["one"]);
    std::fs::write(input.path().join("02.pdf"), b"not a pdf at all").unwrap();
    write_pdf(input.path(), "03.pdf", &["three", "more"]);

    let chain = ProviderChain::new(vec![text_provider("ocr", "Minutes\nVol. 2 No. 9")]);
    let (remote, writes) = RecordingSink::new(SinkBehavior::Accept, &["Minutes"]);
    let extractor = MetadataExtractor::new(chain, RecordBuilder::default(), local_sink(output.path()).await)
        .with_remote(Box::new(remote));

    let report = extractor.process_batch(&context(input.path(), "Minutes")).await.unwrap();

    assert_eq!(report.processed(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].filename, "02.pdf");

    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].destination, "Minutes");
    assert_eq!(writes[0].start_row, 3);
    let names: Vec<&str> = writes[0].records.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["01.pdf", "03.pdf"]);
    assert_eq!(writes[0].records[0].volume.as_deref(), Some("2"));
    assert_eq!(writes[0].records[0].issue.as_deref(), Some("9"));

    assert!(matches!(report.delivery, Delivery::Written { rows: 2, .. }));
}

#[tokio::test]
async fn empty_folder_does_not_touch_sinks() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("readme.txt"), b"no pdfs here").unwrap();

    let (provider, calls) = ScriptedProvider::new("ocr", |_| Ok(ExtractionResult::new("x".into(), 1.0)));
    let (remote, writes) = RecordingSink::new(SinkBehavior::Accept, &[]);
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![Box::new(provider)]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    )
    .with_remote(Box::new(remote));

    let report = extractor.process_batch(&context(input.path(), "Empty")).await.unwrap();

    assert_eq!(report.delivery, Delivery::NothingToWrite);
    assert_eq!(report.processed(), 0);
    assert_eq!(count(&calls), 0);
    assert!(writes.lock().unwrap().is_empty());
    assert!(!output.path().join("Empty.json").exists());
}

#[tokio::test]
async fn only_failed_documents_means_nothing_to_write() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("bad.pdf"), b"%PDF-garbage").unwrap();

    let (remote, writes) = RecordingSink::new(SinkBehavior::Accept, &[]);
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![text_provider("ocr", "text")]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    )
    .with_remote(Box::new(remote));

    let report = extractor.process_batch(&context(input.path(), "Bad")).await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.delivery, Delivery::NothingToWrite);
    assert!(writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_remote_write_falls_back_to_local_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "a.pdf", &["page"]);

    let (remote, writes) = RecordingSink::new(SinkBehavior::Reject, &["News"]);
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![text_provider("ocr", "Harbor News\nMarch 3, 1952")]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    )
    .with_remote(Box::new(remote));

    let report = extractor.process_batch(&context(input.path(), "News")).await.unwrap();

    assert_eq!(writes.lock().unwrap().len(), 1);
    match &report.delivery {
        Delivery::FellBack { rows, reason, .. } => {
            assert_eq!(*rows, 1);
            assert!(reason.contains("500"));
        }
        other => panic!("expected fallback, got {:?}", other),
    }

    let stored = read_records(&output.path().join("News.json")).unwrap();
    assert_eq!(stored, report.records);
    assert_eq!(stored[0].document_date, "1952/03/03");
}

#[tokio::test]
async fn unauthorized_remote_is_disabled_for_later_batches() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for tab in ["1950s", "1960s"] {
        std::fs::create_dir(root.path().join(tab)).unwrap();
        write_pdf(&root.path().join(tab), "doc.pdf", &[tab]);
    }

    let (remote, writes) = RecordingSink::new(SinkBehavior::Unauthorized, &["1950s", "1960s"]);
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![text_provider("ocr", "Bulletin")]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    )
    .with_remote(Box::new(remote));

    let tabs = extractor.plan_all_tabs(root.path()).await.unwrap();
    assert_eq!(tabs, vec!["1950s", "1960s"]);

    let first = extractor
        .process_batch(&context(&root.path().join("1950s"), "1950s"))
        .await
        .unwrap();
    assert!(matches!(first.delivery, Delivery::FellBack { .. }));

    let second = extractor
        .process_batch(&context(&root.path().join("1960s"), "1960s"))
        .await
        .unwrap();
    assert!(matches!(second.delivery, Delivery::Written { .. }));

    assert_eq!(writes.lock().unwrap().len(), 1);
    assert!(output.path().join("1950s.json").exists());
    assert!(output.path().join("1960s.json").exists());
}

#[tokio::test]
async fn failed_tab_listing_falls_back_to_local_output() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("1950s")).unwrap();
    write_pdf(&root.path().join("1950s"), "a.pdf", &["Bulletin"]);

    let (remote, writes) = RecordingSink::new(SinkBehavior::Accept, &["1950s"]);
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![text_provider("ocr", "Bulletin")]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    )
    .with_remote(Box::new(remote.failing_listing()));

    let tabs = extractor.plan_all_tabs(root.path()).await.unwrap();
    assert_eq!(tabs, vec!["1950s"]);

    let report = extractor
        .process_batch(&context(&root.path().join("1950s"), "1950s"))
        .await
        .unwrap();
    match &report.delivery {
        Delivery::Written { sink, rows, .. } => {
            assert_eq!(sink, "local-json");
            assert_eq!(*rows, 1);
        }
        other => panic!("unexpected delivery {:?}", other),
    }
    assert!(writes.lock().unwrap().is_empty());
    assert_eq!(read_records(&output.path().join("1950s.json")).unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_chain_round_trips_sentinels_through_local_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "blank.pdf", &[""]);

    let (provider, _) = ScriptedProvider::new("cloud", |_| Err(ProviderError::Quota("limit".into())));
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![Box::new(provider)]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    );

    let report = extractor.process_batch(&context(input.path(), "Blank")).await.unwrap();
    let record = &report.records[0];
    assert_eq!(record.title, UNKNOWN);
    assert_eq!(record.description, UNKNOWN);
    assert_eq!(record.document_date, UNKNOWN);
    assert_eq!(record.confidence, "0.0%");
    assert_eq!(record.source, None);

    let stored = read_records(&output.path().join("Blank.json")).unwrap();
    assert_eq!(stored, report.records);
}

#[tokio::test]
async fn supplied_year_becomes_default_date() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "a.pdf", &["x"]);

    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![text_provider("ocr", "Church Bulletin\nno date here")]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    );
    let mut ctx = context(input.path(), "Bulletins");
    ctx.year = Some(1948);

    let report = extractor.process_batch(&ctx).await.unwrap();
    assert_eq!(report.records[0].document_date, "1948/01/01");
    assert_eq!(report.records[0].year, Some(1948));
}

#[tokio::test]
async fn cancellation_is_checked_between_documents() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "a.pdf", &["x"]);
    write_pdf(input.path(), "b.pdf", &["y"]);

    let (provider, calls) = ScriptedProvider::new("ocr", |_| Ok(ExtractionResult::new("t".into(), 1.0)));
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![Box::new(provider)]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    );
    extractor.cancel_flag().store(true, Ordering::SeqCst);

    let report = extractor.process_batch(&context(input.path(), "Stopped")).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.processed(), 0);
    assert_eq!(count(&calls), 0);
    assert_eq!(report.delivery, Delivery::NothingToWrite);
}

struct WhitePages;

#[async_trait]
impl PageRasterizer for WhitePages {
    async fn rasterize(&self, _pdf_path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, ProviderError> {
        Ok(vec![
            DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([255]))),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([255]))),
        ])
    }
}

struct UnscoredEngine;

#[async_trait]
impl OcrEngine for UnscoredEngine {
    async fn recognize(&self, _page: &GrayImage, _lang: &str, _dpi: u32) -> Result<PageOcr, ProviderError> {
        Ok(PageOcr {
            text: "faint text".to_string(),
            word_confidences: vec![-1.0, -1.0],
        })
    }
}

#[tokio::test]
async fn pages_without_valid_scores_give_zero_confidence() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_pdf(input.path(), "faint.pdf", &["a", "b"]);

    let provider = LocalOcrProvider::new(
        Box::new(WhitePages),
        Box::new(UnscoredEngine),
        OcrSettings {
            dpi: 150,
            language: "eng".to_string(),
            threshold: ThresholdParams::default(),
            subprocess_timeout: Duration::from_secs(5),
        },
    );
    let extractor = MetadataExtractor::new(
        ProviderChain::new(vec![Box::new(provider)]),
        RecordBuilder::default(),
        local_sink(output.path()).await,
    );

    let report = extractor.process_batch(&context(input.path(), "Faint")).await.unwrap();
    let record = &report.records[0];
    assert_eq!(record.confidence, "0.0%");
    assert_eq!(record.title, "faint text");
    assert_eq!(record.source.as_deref(), Some("local"));
}
