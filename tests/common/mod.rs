#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use pdf_metadata_extractor::document::DocumentRef;
use pdf_metadata_extractor::error::{ProviderError, SinkError};
use pdf_metadata_extractor::provider::{ExtractionProvider, ExtractionResult};
use pdf_metadata_extractor::record::MetadataRecord;
use pdf_metadata_extractor::sink::{RecordSink, WriteOutcome};

/// Write a PDF with one page per entry of `pages`, each showing its text.
pub fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

type Script = Box<dyn Fn(&DocumentRef) -> Result<ExtractionResult, ProviderError> + Send + Sync>;

/// Provider driven by a closure, counting its calls.
pub struct ScriptedProvider {
    name: String,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(
        name: &str,
        script: impl Fn(&DocumentRef) -> Result<ExtractionResult, ProviderError> + Send + Sync + 'static,
    ) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name: name.to_string(),
                script: Box::new(script),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl ExtractionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(doc)
    }
}

pub fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehavior {
    Accept,
    Reject,
    Unauthorized,
}

/// Write call seen by a [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub destination: String,
    pub records: Vec<MetadataRecord>,
    pub start_row: u32,
}

/// Remote-style sink that records every write.
pub struct RecordingSink {
    behavior: SinkBehavior,
    destinations: Vec<String>,
    listing_fails: bool,
    calls: Arc<Mutex<Vec<WriteCall>>>,
}

impl RecordingSink {
    pub fn new(behavior: SinkBehavior, destinations: &[&str]) -> (Self, Arc<Mutex<Vec<WriteCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                behavior,
                destinations: destinations.iter().map(|d| d.to_string()).collect(),
                listing_fails: false,
                calls: calls.clone(),
            },
            calls,
        )
    }

    /// Make `list_destinations` fail with an authorization error.
    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn list_destinations(&self) -> Result<Vec<String>, SinkError> {
        if self.listing_fails {
            return Err(SinkError::Auth("HTTP 401: expired token".to_string()));
        }
        Ok(self.destinations.clone())
    }

    async fn write_batch(
        &self,
        destination: &str,
        records: &[MetadataRecord],
        start_row: u32,
    ) -> Result<WriteOutcome, SinkError> {
        self.calls.lock().unwrap().push(WriteCall {
            destination: destination.to_string(),
            records: records.to_vec(),
            start_row,
        });

        match self.behavior {
            SinkBehavior::Accept => Ok(WriteOutcome::Written {
                location: format!("{}!{}", destination, start_row),
                rows: records.len(),
            }),
            SinkBehavior::Reject => Ok(WriteOutcome::Rejected {
                reason: "HTTP 500: backend error".to_string(),
            }),
            SinkBehavior::Unauthorized => Err(SinkError::Auth("HTTP 401: expired token".to_string())),
        }
    }
}
