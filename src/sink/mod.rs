//! Record destinations.

pub mod local;
pub mod sheets;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::MetadataRecord;

pub use local::LocalFileSink;
pub use sheets::SheetsSink;

/// Result of a write that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { location: String, rows: usize },
    /// The destination refused the write; the caller should fall back.
    Rejected { reason: String },
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the destinations (tabs) this sink knows about.
    async fn list_destinations(&self) -> Result<Vec<String>, SinkError>;

    /// Write `records` to `destination`, starting at `start_row` where rows
    /// are addressable. Callers never pass an empty batch.
    async fn write_batch(
        &self,
        destination: &str,
        records: &[MetadataRecord],
        start_row: u32,
    ) -> Result<WriteOutcome, SinkError>;
}

/// Make a destination name safe to use as a file name: strips
/// `< > : " / \ | ? *` and turns spaces into underscores.
pub fn sanitize_destination(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "untitled".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_names_are_sanitized() {
        assert_eq!(sanitize_destination("1950s Newsletters"), "1950s_Newsletters");
        assert_eq!(sanitize_destination("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize_destination("  "), "untitled");
        assert_eq!(sanitize_destination(".."), "untitled");
    }
}
