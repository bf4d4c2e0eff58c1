//! Per-document metadata records.
//!
//! `Title` and `Document Date` always hold a value: the `UNKNOWN` sentinel
//! stands in for anything that could not be found, so consumers never see a
//! missing key.

use serde::{Deserialize, Serialize};

use crate::document::DocumentRef;
use crate::fields::{self, extract_fields, find_date, DateKind, TitleFallback, UNKNOWN};
use crate::provider::ExtractionResult;

/// Column order shared by every sink.
pub const COLUMNS: [&str; 11] = [
    "Filename",
    "Title",
    "Description",
    "Document Date",
    "Year",
    "Folder Number",
    "Confidence",
    "Volume",
    "Issue",
    "Tab",
    "Source",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Document Date")]
    pub document_date: String,
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    #[serde(rename = "Folder Number")]
    pub folder_number: Option<String>,
    #[serde(rename = "Confidence")]
    pub confidence: String,
    #[serde(rename = "Volume")]
    pub volume: Option<String>,
    #[serde(rename = "Issue")]
    pub issue: Option<String>,
    #[serde(rename = "Tab")]
    pub tab: Option<String>,
    /// Provider that produced the text, if any did.
    #[serde(rename = "Source")]
    pub source: Option<String>,
}

impl MetadataRecord {
    /// Cell values in [`COLUMNS`] order; absent optional values are blank.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.filename.clone(),
            self.title.clone(),
            self.description.clone(),
            self.document_date.clone(),
            self.year.map(|y| y.to_string()).unwrap_or_default(),
            self.folder_number.clone().unwrap_or_default(),
            self.confidence.clone(),
            self.volume.clone().unwrap_or_default(),
            self.issue.clone().unwrap_or_default(),
            self.tab.clone().unwrap_or_default(),
            self.source.clone().unwrap_or_default(),
        ]
    }
}

/// Builds records from extraction output and batch context.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder {
    pub title_fallback: TitleFallback,
    pub description_chars: usize,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self {
            title_fallback: TitleFallback::Sentinel,
            description_chars: fields::DEFAULT_DESCRIPTION_CHARS,
        }
    }
}

impl RecordBuilder {
    pub fn new(title_fallback: TitleFallback, description_chars: usize) -> Self {
        Self {
            title_fallback,
            description_chars,
        }
    }

    /// Provider-supplied fields take precedence over text heuristics, field
    /// by field.
    pub fn build(&self, doc: &DocumentRef, extraction: &ExtractionResult, tab: Option<&str>) -> MetadataRecord {
        let heuristic = extract_fields(
            &extraction.text,
            &doc.filename,
            self.title_fallback,
            self.description_chars,
        );
        let provided = extraction.fields.clone().unwrap_or_default();

        let title = provided.title.unwrap_or(heuristic.title);
        let description = provided.description.unwrap_or(heuristic.description);

        let (date, date_kind) = match provided.date {
            Some(raw) => match find_date(&raw) {
                Some(found) => (found.value, Some(found.kind)),
                None => (raw, Some(DateKind::Unparsed)),
            },
            None => (heuristic.date, heuristic.date_kind),
        };

        MetadataRecord {
            filename: doc.filename.clone(),
            title,
            description,
            document_date: resolve_document_date(date, date_kind, doc.year),
            year: doc.year,
            folder_number: doc.folder_number.clone(),
            confidence: format_confidence(extraction.confidence),
            volume: provided.volume.or(heuristic.volume),
            issue: provided.issue.or(heuristic.issue),
            tab: tab.map(str::to_string),
            source: extraction.source.clone(),
        }
    }
}

/// A supplied year replaces anything less specific than a full date.
pub fn resolve_document_date(date: String, kind: Option<DateKind>, year: Option<i32>) -> String {
    match (year, kind) {
        (Some(_), Some(DateKind::Full)) | (None, _) => date,
        (Some(year), _) => format!("{:04}/01/01", year),
    }
}

/// One decimal place with a trailing `%`, clamped to 0-100.
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", crate::provider::clamp_confidence(confidence))
}

pub fn is_sentinel(value: &str) -> bool {
    value == UNKNOWN
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::provider::ProvidedFields;

    fn doc(year: Option<i32>) -> DocumentRef {
        DocumentRef {
            path: PathBuf::from("in/harbor_1952.pdf"),
            filename: "harbor_1952.pdf".into(),
            bytes: Vec::new(),
            page_count: 1,
            year,
            folder_number: Some("FF7".into()),
        }
    }

    fn extraction(text: &str, confidence: f64) -> ExtractionResult {
        ExtractionResult::new(text.into(), confidence)
    }

    #[test]
    fn heuristic_record() {
        let text = "HARBOR NEWS\nPublished 12/03/1952\nVol. 4 No. 2";
        let record = RecordBuilder::default().build(&doc(None), &extraction(text, 87.456), Some("1950s"));

        assert_eq!(record.filename, "harbor_1952.pdf");
        assert_eq!(record.title, "HARBOR NEWS");
        assert_eq!(record.document_date, "1952/03/12");
        assert_eq!(record.volume.as_deref(), Some("4"));
        assert_eq!(record.issue.as_deref(), Some("2"));
        assert_eq!(record.confidence, "87.5%");
        assert_eq!(record.folder_number.as_deref(), Some("FF7"));
        assert_eq!(record.tab.as_deref(), Some("1950s"));
    }

    #[test]
    fn empty_extraction_uses_sentinels() {
        let record = RecordBuilder::default().build(&doc(None), &ExtractionResult::empty(), None);
        assert!(is_sentinel(&record.title));
        assert!(is_sentinel(&record.description));
        assert!(is_sentinel(&record.document_date));
        assert_eq!(record.confidence, "0.0%");
    }

    #[test]
    fn filename_fallback_uses_stem() {
        let builder = RecordBuilder::new(TitleFallback::Filename, 100);
        let record = builder.build(&doc(None), &ExtractionResult::empty(), None);
        assert_eq!(record.title, "harbor_1952");
    }

    #[test]
    fn provided_fields_take_precedence() {
        let result = extraction("IGNORED TITLE\n1960", 70.0).with_fields(ProvidedFields {
            title: Some("Harbor News".into()),
            date: Some("March 3, 1952".into()),
            ..Default::default()
        });
        let record = RecordBuilder::default().build(&doc(None), &result, None);
        assert_eq!(record.title, "Harbor News");
        assert_eq!(record.document_date, "1952/03/03");
        assert_eq!(record.description, "IGNORED TITLE 1960");
    }

    #[test]
    fn unparseable_provided_date_is_kept_raw() {
        let result = extraction("", 0.0).with_fields(ProvidedFields {
            date: Some("Spring issue".into()),
            ..Default::default()
        });
        let record = RecordBuilder::default().build(&doc(None), &result, None);
        assert_eq!(record.document_date, "Spring issue");
    }

    #[test]
    fn supplied_year_fills_missing_or_vague_dates() {
        assert_eq!(resolve_document_date(UNKNOWN.into(), None, Some(1952)), "1952/01/01");
        assert_eq!(
            resolve_document_date("1952/01/01".into(), Some(DateKind::YearOnly), Some(1952)),
            "1952/01/01"
        );
        assert_eq!(
            resolve_document_date("1952/03/12".into(), Some(DateKind::Full), Some(1950)),
            "1952/03/12"
        );
        assert_eq!(resolve_document_date(UNKNOWN.into(), None, None), UNKNOWN);
    }

    #[test]
    fn confidence_formatting() {
        assert_eq!(format_confidence(0.0), "0.0%");
        assert_eq!(format_confidence(99.96), "100.0%");
        assert_eq!(format_confidence(130.0), "100.0%");
        assert_eq!(format_confidence(-5.0), "0.0%");
    }

    #[test]
    fn row_follows_column_order() {
        let record = RecordBuilder::default().build(&doc(Some(1952)), &extraction("Title", 50.0), None);
        let row = record.to_row();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "harbor_1952.pdf");
        assert_eq!(row[3], "1952/01/01");
        assert_eq!(row[4], "1952");
        assert_eq!(row[5], "FF7");
        assert_eq!(row[9], "");
    }
}
