use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::sync::atomic::Ordering;

use pdf_metadata_extractor::cli::Args;
use pdf_metadata_extractor::config::{Config, ProviderKind};
use pdf_metadata_extractor::extractor::{BatchContext, BatchReport, Delivery, MetadataExtractor};
use pdf_metadata_extractor::ocr::check_ocr_availability;
use pdf_metadata_extractor::provider::ProviderChain;
use pdf_metadata_extractor::record::RecordBuilder;
use pdf_metadata_extractor::sink::{LocalFileSink, SheetsSink};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = Config::from_args(&args);
    info!("PDF metadata extractor starting");
    info!("Providers: {:?}", config.provider_order);
    info!("Local output: {} ({:?})", config.output_dir.display(), config.local_format);

    let extractor = build_extractor(&config, args.offline).await?;

    let cancel = extractor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current document");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    if args.list_tabs {
        let tabs = extractor
            .list_destinations()
            .await
            .context("listing destinations")?;
        for tab in tabs {
            println!("{}", tab);
        }
        return Ok(());
    }

    let batches = plan_batches(&args, &config, &extractor).await?;
    if batches.is_empty() {
        warn!("Nothing to process under {}", config.input_root.display());
        return Ok(());
    }

    let mut reports = Vec::new();
    for ctx in &batches {
        let report = extractor
            .process_batch(ctx)
            .await
            .with_context(|| format!("batch '{}' ({})", ctx.destination, ctx.source.display()))?;
        let cancelled = report.cancelled;
        reports.push(report);
        if cancelled || extractor.cancel_flag().load(Ordering::SeqCst) {
            break;
        }
    }

    print_summary(&reports);
    Ok(())
}

async fn build_extractor(config: &Config, offline: bool) -> Result<MetadataExtractor> {
    let local = LocalFileSink::new(&config.output_dir, config.local_format)
        .await
        .with_context(|| format!("preparing local output in {}", config.output_dir.display()))?;

    let chain = ProviderChain::from_config(config);
    if chain.is_empty() {
        warn!("No extraction provider available; records will carry UNKNOWN fields");
    }
    if config.provider_order.contains(&ProviderKind::Local) && !check_ocr_availability().await {
        warn!("Local OCR will fail until Tesseract and pdftoppm are installed");
    }

    let builder = RecordBuilder::new(config.title_fallback, config.description_chars);
    let mut extractor = MetadataExtractor::new(chain, builder, Box::new(local)).with_progress(config.show_progress);

    if offline {
        info!("Offline mode: records are written locally only");
    } else {
        match &config.sheets {
            Some(settings) => match SheetsSink::new(settings.clone(), config.request_timeout) {
                Ok(sheets) => extractor = extractor.with_remote(Box::new(sheets)),
                Err(e) => warn!("Google Sheets unavailable ({}), writing records locally", e),
            },
            None => warn!("SPREADSHEET_ID or Google credentials not set, writing records locally"),
        }
    }

    Ok(extractor)
}

async fn plan_batches(args: &Args, config: &Config, extractor: &MetadataExtractor) -> Result<Vec<BatchContext>> {
    let context = |source, destination| BatchContext {
        source,
        destination,
        year: args.year,
        folder_number: args.folder_number.clone(),
        start_row: config.start_row,
    };

    match (&args.folder, &args.tab) {
        (Some(folder), tab) => {
            let destination = tab.clone().unwrap_or_else(|| {
                folder
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "metadata".to_string())
            });
            Ok(vec![context(folder.clone(), destination)])
        }
        (None, Some(tab)) => Ok(vec![context(config.input_root.join(tab), tab.clone())]),
        (None, None) => {
            let tabs = extractor
                .plan_all_tabs(&config.input_root)
                .await
                .context("discovering tab folders")?;
            info!("Processing {} tab folder(s)", tabs.len());
            Ok(tabs
                .into_iter()
                .map(|tab| context(config.input_root.join(&tab), tab))
                .collect())
        }
    }
}

fn print_summary(reports: &[BatchReport]) {
    let processed: usize = reports.iter().map(BatchReport::processed).sum();
    let succeeded: usize = reports.iter().map(BatchReport::succeeded).sum();
    let failed: usize = reports.iter().map(BatchReport::failed).sum();

    println!("\nExtraction complete");
    println!("Processed: {}", processed);
    println!("Successful: {}", succeeded);
    println!("Failed: {}", failed);

    for report in reports {
        match &report.delivery {
            Delivery::NothingToWrite => println!("  {}: nothing to write", report.destination),
            Delivery::Written { sink, location, rows } => {
                println!("  {}: {} row(s) -> {} ({})", report.destination, rows, location, sink)
            }
            Delivery::FellBack {
                sink,
                location,
                rows,
                reason,
            } => println!(
                "  {}: {} row(s) -> {} ({}, remote failed: {})",
                report.destination, rows, location, sink, reason
            ),
        }
        for failure in &report.failures {
            println!("    failed {}: {}", failure.filename, failure.cause);
        }
        if report.cancelled {
            println!("  {}: cancelled before completion", report.destination);
        }
    }
}
