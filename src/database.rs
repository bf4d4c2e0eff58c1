use std::path::Path;

use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use crate::error::SinkError;
use crate::record::MetadataRecord;

const RECORD_COLUMNS: &str = "filename, title, description, document_date, year, folder_number, \
                              confidence, volume, issue, tab, source";

/// SQLite store of metadata records, one row per destination + filename.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=memory;",
        )?;

        let store = RecordStore {
            conn: Mutex::new(conn),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SinkError> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS metadata_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                destination TEXT NOT NULL,
                filename TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                document_date TEXT NOT NULL,
                year INTEGER,
                folder_number TEXT,
                confidence TEXT NOT NULL,
                volume TEXT,
                issue TEXT,
                tab TEXT,
                source TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(destination, filename)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_destination ON metadata_records(destination)",
            [],
        )?;

        info!("Record store schema initialized");
        Ok(())
    }

    /// Insert or replace every record under `destination` in one transaction.
    pub async fn upsert_batch(&self, destination: &str, records: &[MetadataRecord]) -> Result<usize, SinkError> {
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(&format!(
                r#"
                INSERT INTO metadata_records (destination, {cols})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(destination, filename) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    document_date = excluded.document_date,
                    year = excluded.year,
                    folder_number = excluded.folder_number,
                    confidence = excluded.confidence,
                    volume = excluded.volume,
                    issue = excluded.issue,
                    tab = excluded.tab,
                    source = excluded.source,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                cols = RECORD_COLUMNS
            ))?;

            for record in records {
                stmt.execute(params![
                    destination,
                    record.filename,
                    record.title,
                    record.description,
                    record.document_date,
                    record.year,
                    record.folder_number,
                    record.confidence,
                    record.volume,
                    record.issue,
                    record.tab,
                    record.source,
                ])?;
            }
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub async fn get(&self, destination: &str, filename: &str) -> Result<Option<MetadataRecord>, SinkError> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM metadata_records WHERE destination = ?1 AND filename = ?2",
                    RECORD_COLUMNS
                ),
                params![destination, filename],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Records of one destination, or of all destinations, ordered by
    /// destination then filename.
    pub async fn list(&self, destination: Option<&str>) -> Result<Vec<StoredRecord>, SinkError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT destination, {}
            FROM metadata_records
            WHERE ?1 IS NULL OR destination = ?1
            ORDER BY destination, filename
            "#,
            RECORD_COLUMNS
        ))?;

        let rows = stmt.query_map(params![destination], stored_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Case-insensitive substring search over title, description and filename.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<StoredRecord>, SinkError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT destination, {}
            FROM metadata_records
            WHERE title LIKE ?1 OR description LIKE ?1 OR filename LIKE ?1
            ORDER BY destination, filename
            LIMIT ?2
            "#,
            RECORD_COLUMNS
        ))?;

        let pattern = format!("%{}%", query);
        let rows = stmt.query_map(params![pattern, limit as i64], stored_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub async fn stats(&self) -> Result<StoreStats, SinkError> {
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM metadata_records", [], |row| row.get(0))?;
        let unknown_titles: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metadata_records WHERE title = 'UNKNOWN'",
            [],
            |row| row.get(0),
        )?;
        let unknown_dates: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metadata_records WHERE document_date = 'UNKNOWN'",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT destination, COUNT(*) FROM metadata_records GROUP BY destination ORDER BY destination",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut per_destination = Vec::new();
        for row in rows {
            per_destination.push(row?);
        }

        // confidence is stored as "NN.N%"
        let mut stmt = conn.prepare("SELECT confidence FROM metadata_records")?;
        let scores: Vec<f64> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|c| c.ok())
            .filter_map(|c| c.trim_end_matches('%').parse::<f64>().ok())
            .collect();
        let avg_confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        Ok(StoreStats {
            total,
            unknown_titles,
            unknown_dates,
            avg_confidence,
            per_destination,
        })
    }
}

/// A record together with the destination it was written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub destination: String,
    pub record: MetadataRecord,
}

#[derive(Debug)]
pub struct StoreStats {
    pub total: i64,
    pub unknown_titles: i64,
    pub unknown_dates: i64,
    pub avg_confidence: f64,
    pub per_destination: Vec<(String, i64)>,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MetadataRecord> {
    record_at(row, 0)
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        destination: row.get(0)?,
        record: record_at(row, 1)?,
    })
}

fn record_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<MetadataRecord> {
    Ok(MetadataRecord {
        filename: row.get(offset)?,
        title: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        document_date: row.get(offset + 3)?,
        year: row.get(offset + 4)?,
        folder_number: row.get(offset + 5)?,
        confidence: row.get(offset + 6)?,
        volume: row.get(offset + 7)?,
        issue: row.get(offset + 8)?,
        tab: row.get(offset + 9)?,
        source: row.get(offset + 10)?,
    })
}
