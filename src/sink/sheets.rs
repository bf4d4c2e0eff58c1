use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{GoogleAuth, SPREADSHEETS_SCOPE};
use crate::config::SheetsSettings;
use crate::error::SinkError;
use crate::record::{MetadataRecord, COLUMNS};

use super::{RecordSink, WriteOutcome};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets, one tab per destination.
pub struct SheetsSink {
    settings: SheetsSettings,
    auth: GoogleAuth,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

impl SheetsSink {
    pub fn new(settings: SheetsSettings, timeout: Duration) -> Result<Self, SinkError> {
        if column_index(&settings.start_column).is_none() {
            return Err(SinkError::NotConfigured(format!(
                "invalid start column '{}'",
                settings.start_column
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::NotConfigured(format!("HTTP client: {}", e)))?;
        let auth = GoogleAuth::new(&settings.credentials, SPREADSHEETS_SCOPE)?;

        Ok(Self { settings, auth, client })
    }

    fn spreadsheet_url(&self) -> Result<Url, SinkError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| SinkError::NotConfigured(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::NotConfigured("bad Sheets API URL".into()))?
            .push(&self.settings.spreadsheet_id);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::from_status(status.as_u16(), &body))
        }
    }

    /// Look up `tab`, creating it when missing.
    async fn ensure_tab(&self, tab: &str) -> Result<(), SinkError> {
        if self.list_destinations().await?.iter().any(|t| t == tab) {
            return Ok(());
        }

        let mut url = self.spreadsheet_url()?;
        let id = self.settings.spreadsheet_id.clone();
        url.path_segments_mut()
            .map_err(|_| SinkError::NotConfigured("bad Sheets API URL".into()))?
            .pop()
            .push(&format!("{}:batchUpdate", id));

        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": tab } } }]
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(self.auth.bearer().await?)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;

        info!("Created sheet tab '{}'", tab);
        Ok(())
    }

    async fn put_rows(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), SinkError> {
        let mut url = self.spreadsheet_url()?;
        url.path_segments_mut()
            .map_err(|_| SinkError::NotConfigured("bad Sheets API URL".into()))?
            .push("values")
            .push(range);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });
        let response = self
            .client
            .put(url)
            .bearer_auth(self.auth.bearer().await?)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SheetsSink {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn list_destinations(&self) -> Result<Vec<String>, SinkError> {
        let mut url = self.spreadsheet_url()?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        let info: SpreadsheetInfo = Self::check(response).await?.json().await?;

        Ok(info.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn write_batch(
        &self,
        destination: &str,
        records: &[MetadataRecord],
        start_row: u32,
    ) -> Result<WriteOutcome, SinkError> {
        let range = match row_range(destination, &self.settings.start_column, start_row, records.len()) {
            Some(range) => range,
            None => {
                return Ok(WriteOutcome::Rejected {
                    reason: format!("cannot address {} rows from row {}", records.len(), start_row),
                })
            }
        };
        let rows: Vec<Vec<String>> = records.iter().map(MetadataRecord::to_row).collect();

        let result = match self.ensure_tab(destination).await {
            Ok(()) => self.put_rows(&range, rows).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("Wrote {} row(s) to {}", records.len(), range);
                Ok(WriteOutcome::Written {
                    location: range,
                    rows: records.len(),
                })
            }
            Err(e) => classify_write_error(destination, e),
        }
    }
}

/// Authorization and quota errors propagate so the caller can stop using
/// the sheet; anything else rejects only this batch.
pub fn classify_write_error(destination: &str, err: SinkError) -> Result<WriteOutcome, SinkError> {
    if err.is_fatal() {
        return Err(err);
    }
    error!("Sheets write to '{}' failed: {}", destination, err);
    Ok(WriteOutcome::Rejected {
        reason: err.to_string(),
    })
}

/// 1-based index of a column label (`A` = 1, `AA` = 27).
pub fn column_index(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    label.chars().try_fold(0u32, |acc, c| {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_uppercase() {
            acc.checked_mul(26)?.checked_add(c as u32 - 'A' as u32 + 1)
        } else {
            None
        }
    })
}

/// Column label for a 1-based index.
pub fn column_letter(mut index: u32) -> String {
    let mut label = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        label.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    label.iter().rev().collect()
}

/// `'<tab>'!<col><start>:<end col><start + rows - 1>` spanning every column
/// of a record.
pub fn row_range(tab: &str, start_column: &str, start_row: u32, rows: usize) -> Option<String> {
    if rows == 0 || start_row == 0 {
        return None;
    }
    let first = column_index(start_column)?;
    let last = first + COLUMNS.len() as u32 - 1;
    let end_row = start_row.checked_add(u32::try_from(rows).ok()? - 1)?;

    Some(format!(
        "'{}'!{}{}:{}{}",
        tab.replace('\'', "''"),
        column_letter(first),
        start_row,
        column_letter(last),
        end_row
    ))
}
