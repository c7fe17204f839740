//! Document ingest
//!
//! Turns a raw file into a [`Document`]:
//! - [`reader`] streams the bytes in cancelable chunks
//! - [`encoding`] picks a text encoding from the first chunk
//! - [`segment`] splits plain text into chapters
//! - [`pipeline`] ties the stages together and delegates EPUB files to a
//!   [`StructuredRenderer`](crate::structured::StructuredRenderer)

pub mod encoding;
pub mod pipeline;
pub mod reader;
pub mod segment;
pub mod source;
pub mod token;
pub mod types;

pub use encoding::{decode, resolve_encoding, EncodingChoice};
pub use pipeline::{IngestPipeline, LoadOutcome, LoadTask, LoadedDocument};
pub use reader::{ChunkedReader, ReadBuffer, ReadHandle, ReadOutcome};
pub use segment::{SegmentOptions, Segmenter};
pub use source::{FileSource, LocalFile, MemorySource};
pub use token::{LoadGeneration, LoadToken};
pub use types::*;
