use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use pdf_metadata_extractor::database::RecordStore;
use pdf_metadata_extractor::record::MetadataRecord;

#[derive(Parser, Debug)]
#[command(name = "pdf-query")]
#[command(about = "Query the local metadata record store")]
pub struct QueryArgs {
    /// SQLite record store written with --format sqlite
    #[arg(short, long, default_value = "output/metadata.db")]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: QueryCommand,
}

#[derive(Parser, Debug)]
pub enum QueryCommand {
    /// Show record statistics
    Stats,

    /// Search titles, descriptions and filenames
    Search {
        /// Text to search for
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List stored records
    List {
        /// Only records written to this tab
        #[arg(short, long)]
        tab: Option<String>,
    },

    /// Export records to a JSON file
    Export {
        /// Output JSON file
        output: PathBuf,

        /// Only records written to this tab
        #[arg(short, long)]
        tab: Option<String>,
    },
}

fn print_record(destination: &str, record: &MetadataRecord) {
    println!("File: {} [{}]", record.filename, destination);
    println!("Title: {}", record.title);
    println!("Date: {}", record.document_date);
    if let Some(volume) = &record.volume {
        println!("Volume: {}", volume);
    }
    if let Some(issue) = &record.issue {
        println!("Issue: {}", issue);
    }
    println!("Confidence: {}", record.confidence);
    println!("Description: {}", record.description);
    println!("{}", "-".repeat(40));
}

pub async fn run_query(args: QueryArgs) -> Result<()> {
    if !args.database.is_file() {
        anyhow::bail!("record store not found: {}", args.database.display());
    }
    let store = RecordStore::open(&args.database)
        .await
        .with_context(|| format!("opening {}", args.database.display()))?;

    match args.command {
        QueryCommand::Stats => {
            let stats = store.stats().await?;

            println!("Metadata Record Statistics");
            println!("{}", "=".repeat(40));
            println!("Total records: {}", stats.total);
            println!("Unknown titles: {}", stats.unknown_titles);
            println!("Unknown dates: {}", stats.unknown_dates);
            println!("Average confidence: {:.1}%", stats.avg_confidence);
            for (destination, count) in &stats.per_destination {
                println!("  {}: {}", destination, count);
            }
        }

        QueryCommand::Search { query, limit } => {
            let results = store.search(&query, limit).await?;

            println!("Search results for '{}' (showing {} of max {}):", query, results.len(), limit);
            println!("{}", "=".repeat(60));
            for stored in &results {
                print_record(&stored.destination, &stored.record);
            }
        }

        QueryCommand::List { tab } => {
            let results = store.list(tab.as_deref()).await?;
            for stored in &results {
                println!(
                    "{:<30} {:<12} {:>7}  {}",
                    stored.record.filename, stored.record.document_date, stored.record.confidence, stored.record.title
                );
            }
            println!("{} record(s)", results.len());
        }

        QueryCommand::Export { output, tab } => {
            let records: Vec<MetadataRecord> = store
                .list(tab.as_deref())
                .await?
                .into_iter()
                .map(|stored| stored.record)
                .collect();

            let json = serde_json::to_string_pretty(&records)?;
            tokio::fs::write(&output, json)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Exported {} record(s) to {}", records.len(), output.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = QueryArgs::parse();
    run_query(args).await
}
