use std::path::PathBuf;

use crate::pdf::PdfInfo;

/// One input PDF together with the batch context it was found in.
#[derive(Debug, Clone)]
pub struct DocumentRef {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub year: Option<i32>,
    pub folder_number: Option<String>,
}

impl DocumentRef {
    pub fn new(info: PdfInfo, year: Option<i32>, folder_number: Option<String>) -> Self {
        let filename = info
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path: info.path,
            filename,
            bytes: info.bytes,
            page_count: info.page_count,
            year,
            folder_number,
        }
    }
}
