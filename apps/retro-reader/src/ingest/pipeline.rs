//! Ingest pipeline
//!
//! read → resolve encoding → decode → segment, with the load token checked
//! between stages so a superseded load never produces a document.
//! Structured files skip decoding and segmentation: their bytes go to the
//! configured [`StructuredRenderer`] and the table of contents becomes the
//! chapter list.

use std::sync::Arc;

use tokio::sync::watch;

use super::encoding::{decode, resolve_encoding, EncodingChoice};
use super::reader::{ChunkedReader, ReadHandle, ReadOutcome};
use super::segment::{SegmentOptions, Segmenter};
use super::source::FileSource;
use super::token::{LoadGeneration, LoadToken};
use super::types::{display_name, Chapter, Document, DocumentFormat, DocumentId};
use crate::config::IngestConfig;
use crate::error::{ReaderError, Result};
use crate::structured::{DocumentHandle, StructuredRenderer};

/// A document that finished loading under a still-current token
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub token: LoadToken,
    /// Renderer handle for structured documents
    pub handle: Option<DocumentHandle>,
}

/// Result of a load attempt
#[derive(Debug)]
pub enum LoadOutcome {
    Ready(LoadedDocument),
    /// A newer load started first; the result was discarded
    Stale,
}

/// Runs loads against one shared generation
#[derive(Clone)]
pub struct IngestPipeline {
    reader: ChunkedReader,
    segmenter: Segmenter,
    structured: Option<Arc<dyn StructuredRenderer>>,
}

impl IngestPipeline {
    pub fn new(generation: LoadGeneration, config: &IngestConfig) -> Self {
        Self {
            reader: ChunkedReader::new(generation, config.chunk_size),
            segmenter: Segmenter::new(SegmentOptions {
                preface_title: config.preface_title.clone(),
                ..SegmentOptions::default()
            }),
            structured: None,
        }
    }

    /// Attach the renderer used for structured documents
    pub fn with_renderer(mut self, renderer: Arc<dyn StructuredRenderer>) -> Self {
        self.structured = Some(renderer);
        self
    }

    pub fn generation(&self) -> &LoadGeneration {
        self.reader.generation()
    }

    pub fn structured(&self) -> Option<&Arc<dyn StructuredRenderer>> {
        self.structured.as_ref()
    }

    /// Start loading `source`; any load already in flight becomes stale
    pub fn begin(&self, source: Arc<dyn FileSource>, choice: EncodingChoice) -> Result<LoadTask> {
        let file_name = source.name().to_string();
        let format = DocumentFormat::from_file_name(&file_name)
            .ok_or_else(|| ReaderError::UnsupportedFormat(file_name.clone()))?;
        let id = DocumentId::from_name_and_size(&file_name, source.len());

        tracing::info!(
            document_id = %id,
            format = format.label(),
            encoding = %choice,
            "Loading document"
        );

        let read = self.reader.begin_read(source);

        Ok(LoadTask {
            read,
            id,
            name: display_name(&file_name),
            format,
            choice,
            generation: self.reader.generation().clone(),
            segmenter: self.segmenter.clone(),
            structured: self.structured.clone(),
        })
    }

    /// Load `source` to completion
    pub async fn load(
        &self,
        source: Arc<dyn FileSource>,
        choice: EncodingChoice,
    ) -> Result<LoadOutcome> {
        self.begin(source, choice)?.finish().await
    }
}

/// An in-flight load
pub struct LoadTask {
    read: ReadHandle,
    id: DocumentId,
    name: String,
    format: DocumentFormat,
    choice: EncodingChoice,
    generation: LoadGeneration,
    segmenter: Segmenter,
    structured: Option<Arc<dyn StructuredRenderer>>,
}

impl LoadTask {
    pub fn token(&self) -> LoadToken {
        self.read.token()
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.id
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Read progress in `[0.0, 1.0]`
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.read.progress()
    }

    pub fn cancel(&self) {
        self.read.cancel();
    }

    /// Wait for the read and run the remaining stages
    pub async fn finish(self) -> Result<LoadOutcome> {
        let LoadTask {
            read,
            id,
            name,
            format,
            choice,
            generation,
            segmenter,
            structured,
        } = self;
        let token = read.token();

        let buffer = match read.join().await? {
            ReadOutcome::Complete(buffer) => buffer,
            ReadOutcome::Stale => return Ok(LoadOutcome::Stale),
        };

        if !generation.is_current(token) {
            tracing::debug!(document_id = %id, "Load superseded after read");
            return Ok(LoadOutcome::Stale);
        }

        let (encoding, chapters, handle) = match format {
            DocumentFormat::Plain => {
                let title = name.clone();
                let (encoding, chapters) = tokio::task::spawn_blocking(move || {
                    let encoding = resolve_encoding(&buffer.sample, choice);
                    let text = decode(&buffer.bytes, encoding);
                    (encoding, segmenter.segment(&text, &title))
                })
                .await?;
                (Some(encoding), chapters, None)
            }
            DocumentFormat::Structured => {
                let renderer = structured.ok_or_else(|| {
                    ReaderError::Structured("no renderer configured for EPUB files".to_string())
                })?;
                let handle = renderer.load_from_bytes(buffer.bytes, id.as_str()).await?;
                let toc = renderer.table_of_contents(&handle).await?;

                let chapters = if toc.is_empty() {
                    tracing::debug!(document_id = %id, "Empty table of contents");
                    vec![Chapter::with_locator(name.clone(), "")]
                } else {
                    toc.into_iter()
                        .map(|entry| Chapter::with_locator(entry.title, entry.locator.into_string()))
                        .collect()
                };
                (None, chapters, Some(handle))
            }
        };

        if !generation.is_current(token) {
            tracing::debug!(document_id = %id, "Load superseded before commit");
            return Ok(LoadOutcome::Stale);
        }

        tracing::info!(
            document_id = %id,
            chapters = chapters.len(),
            encoding = encoding.map(|e| e.name()).unwrap_or("-"),
            "Document ready"
        );

        Ok(LoadOutcome::Ready(LoadedDocument {
            document: Document {
                id,
                name,
                format,
                encoding,
                chapters,
            },
            token,
            handle,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingest::source::MemorySource;
    use crate::structured::testing::StubRenderer;
    use encoding_rs::{GB18030, UTF_8};

    fn pipeline() -> IngestPipeline {
        let mut config = Config::default().ingest;
        config.chunk_size = 8;
        IngestPipeline::new(LoadGeneration::new(), &config)
    }

    fn source(name: &str, bytes: impl Into<Vec<u8>>) -> Arc<dyn FileSource> {
        Arc::new(MemorySource::new(name, bytes))
    }

    fn ready(outcome: LoadOutcome) -> LoadedDocument {
        match outcome {
            LoadOutcome::Ready(loaded) => loaded,
            LoadOutcome::Stale => panic!("load should not be stale"),
        }
    }

    #[tokio::test]
    async fn test_plain_load() {
        let text = "Intro line\n\n第一章 开端\nHello\n\n第二章 结局\nBye";
        let loaded = ready(
            pipeline()
                .load(source("story.txt", text.as_bytes()), EncodingChoice::Auto)
                .await
                .unwrap(),
        );

        let document = loaded.document;
        assert_eq!(document.id.as_str(), format!("story.txt_{}", text.len()));
        assert_eq!(document.name, "story");
        assert_eq!(document.format, DocumentFormat::Plain);
        assert_eq!(document.encoding, Some(UTF_8));
        let titles: Vec<&str> = document.chapters.iter().map(|c| c.title()).collect();
        assert_eq!(titles, vec!["开始", "第一章 开端", "第二章 结局"]);
        assert!(loaded.handle.is_none());
    }

    #[tokio::test]
    async fn test_gbk_file_is_decoded() {
        let (bytes, _, _) = GB18030.encode("第一章 开端\n山\n第二章 结局\n水");
        let loaded = ready(
            pipeline()
                .load(source("old.txt", bytes.into_owned()), EncodingChoice::Auto)
                .await
                .unwrap(),
        );

        assert_eq!(loaded.document.encoding_name(), Some("gb18030"));
        assert_eq!(loaded.document.chapters[1].title(), "第二章 结局");
        assert_eq!(loaded.document.chapters[1].lines(), ["水"]);
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let result = pipeline().begin(source("notes.md", b"# hi".to_vec()), EncodingChoice::Auto);
        assert!(matches!(result, Err(ReaderError::UnsupportedFormat(name)) if name == "notes.md"));
    }

    #[tokio::test]
    async fn test_new_load_supersedes_pending_one() {
        let pipeline = pipeline();
        let first = pipeline
            .begin(source("a.txt", vec![b'a'; 64]), EncodingChoice::Auto)
            .unwrap();
        let second = pipeline
            .begin(source("b.txt", b"second".to_vec()), EncodingChoice::Auto)
            .unwrap();

        assert!(matches!(first.finish().await.unwrap(), LoadOutcome::Stale));
        let loaded = ready(second.finish().await.unwrap());
        assert_eq!(loaded.document.name, "b");
    }

    #[tokio::test]
    async fn test_superseded_after_read_is_stale() {
        let pipeline = pipeline();
        let first = pipeline
            .begin(source("a.txt", b"fully read".to_vec()), EncodingChoice::Auto)
            .unwrap();
        first
            .progress()
            .wait_for(|progress| *progress >= 1.0)
            .await
            .unwrap();

        let _second = pipeline
            .begin(source("b.txt", b"next".to_vec()), EncodingChoice::Auto)
            .unwrap();
        assert!(matches!(first.finish().await.unwrap(), LoadOutcome::Stale));
    }

    #[tokio::test]
    async fn test_structured_load_uses_toc() {
        let renderer = Arc::new(StubRenderer::with_toc(&[
            ("Prologue", "text/p.xhtml"),
            ("One", "text/1.xhtml#start"),
        ]));
        let pipeline = pipeline().with_renderer(renderer.clone());

        let loaded = ready(
            pipeline
                .load(source("Dune.epub", b"PK fake".to_vec()), EncodingChoice::Auto)
                .await
                .unwrap(),
        );

        assert_eq!(renderer.loaded(), vec!["Dune.epub_7".to_string()]);
        assert_eq!(loaded.handle.unwrap().document_id(), "Dune.epub_7");
        let document = loaded.document;
        assert_eq!(document.format, DocumentFormat::Structured);
        assert_eq!(document.encoding, None);
        assert_eq!(document.chapters[1].title(), "One");
        assert_eq!(document.chapters[1].locator(), Some("text/1.xhtml#start"));
    }

    #[tokio::test]
    async fn test_structured_empty_toc_single_chapter() {
        let pipeline = pipeline().with_renderer(Arc::new(StubRenderer::with_toc(&[])));
        let loaded = ready(
            pipeline
                .load(source("flat.epub", b"PK".to_vec()), EncodingChoice::Auto)
                .await
                .unwrap(),
        );

        assert_eq!(loaded.document.chapter_count(), 1);
        assert_eq!(loaded.document.chapters[0].title(), "flat");
        assert_eq!(loaded.document.chapters[0].locator(), Some(""));
    }

    #[tokio::test]
    async fn test_structured_failures() {
        let without_renderer = pipeline()
            .load(source("a.epub", b"PK".to_vec()), EncodingChoice::Auto)
            .await;
        assert!(matches!(without_renderer, Err(ReaderError::Structured(_))));

        let failing = pipeline()
            .with_renderer(Arc::new(StubRenderer::failing()))
            .load(source("b.epub", b"PK".to_vec()), EncodingChoice::Auto)
            .await;
        assert!(matches!(failing, Err(ReaderError::Structured(_))));
    }
}
