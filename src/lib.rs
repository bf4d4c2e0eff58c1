//! Bibliographic metadata extraction from scanned PDFs.
//!
//! Each document goes through an ordered chain of text providers (cloud
//! document understanding, cloud OCR with optional LLM field extraction,
//! local Tesseract OCR), then text heuristics fill whatever fields the
//! provider did not supply. Finished records go to Google Sheets or to a
//! local JSON/SQLite file.

pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod ocr;
pub mod pdf;
pub mod preprocess;
pub mod progress;
pub mod provider;
pub mod record;
pub mod sink;
