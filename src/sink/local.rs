use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};
use tempfile::NamedTempFile;

use crate::config::LocalFormat;
use crate::database::RecordStore;
use crate::error::SinkError;
use crate::record::MetadataRecord;

use super::{sanitize_destination, RecordSink, WriteOutcome};

pub const STORE_FILE: &str = "metadata.db";

/// Writes records under a local output directory. Used for offline runs and
/// as the fallback when the remote sink is unavailable.
pub struct LocalFileSink {
    output_dir: PathBuf,
    backend: Backend,
}

enum Backend {
    Json,
    Sqlite(RecordStore),
}

impl LocalFileSink {
    pub async fn new(output_dir: &Path, format: LocalFormat) -> Result<Self, SinkError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let backend = match format {
            LocalFormat::Json => Backend::Json,
            LocalFormat::Sqlite => Backend::Sqlite(RecordStore::open(&output_dir.join(STORE_FILE)).await?),
        };

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            backend,
        })
    }

    pub fn json_path(&self, destination: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.json", sanitize_destination(destination)))
    }

    fn write_json(&self, destination: &str, records: &[MetadataRecord]) -> Result<PathBuf, SinkError> {
        let path = self.json_path(destination);

        let mut merged = if path.exists() { read_records(&path)? } else { Vec::new() };
        for record in records {
            match merged.iter_mut().find(|r| r.filename == record.filename) {
                Some(existing) => *existing = record.clone(),
                None => merged.push(record.clone()),
            }
        }

        // write beside the target so the rename stays on one filesystem
        let temp = NamedTempFile::new_in(&self.output_dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &merged)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        temp.persist(&path).map_err(|e| SinkError::Io(e.error))?;

        Ok(path)
    }
}

/// Read the records of one JSON output file.
pub fn read_records(path: &Path) -> Result<Vec<MetadataRecord>, SinkError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[async_trait]
impl RecordSink for LocalFileSink {
    fn name(&self) -> &str {
        match self.backend {
            Backend::Json => "local-json",
            Backend::Sqlite(_) => "local-sqlite",
        }
    }

    async fn list_destinations(&self) -> Result<Vec<String>, SinkError> {
        match &self.backend {
            Backend::Json => {
                let mut names = Vec::new();
                let mut entries = tokio::fs::read_dir(&self.output_dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    // file names are sanitized; the stored Tab column is not
                    match read_records(&path) {
                        Ok(records) => {
                            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
                            if let Some(name) = records.into_iter().find_map(|r| r.tab).or(stem) {
                                names.push(name);
                            }
                        }
                        Err(e) => warn!("Skipping {}: {}", path.display(), e),
                    }
                }
                names.sort();
                names.dedup();
                Ok(names)
            }
            Backend::Sqlite(store) => Ok(store
                .stats()
                .await?
                .per_destination
                .into_iter()
                .map(|(name, _)| name)
                .collect()),
        }
    }

    async fn write_batch(
        &self,
        destination: &str,
        records: &[MetadataRecord],
        _start_row: u32,
    ) -> Result<WriteOutcome, SinkError> {
        let location = match &self.backend {
            Backend::Json => self.write_json(destination, records)?.display().to_string(),
            Backend::Sqlite(store) => {
                store.upsert_batch(destination, records).await?;
                format!("{} [{}]", self.output_dir.join(STORE_FILE).display(), destination)
            }
        };

        info!("Saved {} record(s) to {}", records.len(), location);
        Ok(WriteOutcome::Written {
            location,
            rows: records.len(),
        })
    }
}
