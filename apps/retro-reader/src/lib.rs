//! Retro Reader
//!
//! Core of a local reader for plain-text and EPUB files.
//!
//! # Modules
//!
//! - `ingest`: chunked, cancelable reads, encoding detection and chapter
//!   segmentation
//! - `structured`: EPUB rendering behind the `StructuredRenderer` trait
//! - `progress`: debounced reading-position persistence and preferences
//! - `reader`: shelf, open document and navigation driven by `ReaderEvent`s

pub mod config;
pub mod error;
pub mod ingest;
pub mod progress;
pub mod reader;
pub mod structured;

pub use config::Config;
pub use error::{ReaderError, Result, StoreError};
