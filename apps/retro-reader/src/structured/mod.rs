//! Structured document rendering
//!
//! EPUB-like documents are not segmented locally. A [`StructuredRenderer`]
//! loads the bytes, exposes a table of contents, renders sections to a
//! [`RenderTarget`] and broadcasts a [`Relocation`] whenever the visible
//! position changes. The locator carried by a relocation is what gets
//! persisted in place of a scroll offset.

mod epub;

pub use epub::EpubRenderer;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

/// Capacity of relocation broadcast channels
pub const RELOCATION_CHANNEL_CAPACITY: usize = 64;

/// Opaque position inside a structured document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a document loaded by a renderer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentHandle {
    document_id: String,
}

impl DocumentHandle {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}

/// Table of contents entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub locator: Locator,
}

/// A rendered section handed to the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSection {
    pub locator: Option<Locator>,
    pub title: Option<String>,
    pub html: String,
}

/// Where rendered sections go
pub trait RenderTarget: Send {
    fn present(&mut self, section: RenderedSection);
}

impl RenderTarget for Vec<RenderedSection> {
    fn present(&mut self, section: RenderedSection) {
        self.push(section);
    }
}

/// Emitted after the visible position of a document changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub document_id: String,
    pub locator: Locator,
}

/// External renderer for structured documents
#[async_trait]
pub trait StructuredRenderer: Send + Sync {
    /// Load a document from its complete bytes
    async fn load_from_bytes(&self, bytes: Vec<u8>, document_id: &str) -> Result<DocumentHandle>;

    /// Flattened table of contents in reading order
    async fn table_of_contents(&self, handle: &DocumentHandle) -> Result<Vec<TocEntry>>;

    /// Render the section at `locator` (the start when `None`) into `target`
    async fn render_to(
        &self,
        handle: &DocumentHandle,
        target: &mut dyn RenderTarget,
        locator: Option<&Locator>,
    ) -> Result<()>;

    /// Subscribe to relocation events
    fn relocations(&self) -> broadcast::Receiver<Relocation>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory renderer for exercising the structured path

    use std::sync::Mutex;

    use super::*;
    use crate::error::ReaderError;

    pub(crate) struct StubRenderer {
        toc: Vec<TocEntry>,
        fail_load: bool,
        loaded: Mutex<Vec<String>>,
        events: broadcast::Sender<Relocation>,
    }

    impl StubRenderer {
        pub(crate) fn with_toc(entries: &[(&str, &str)]) -> Self {
            let (events, _) = broadcast::channel(RELOCATION_CHANNEL_CAPACITY);
            Self {
                toc: entries
                    .iter()
                    .map(|(title, locator)| TocEntry {
                        title: title.to_string(),
                        locator: Locator::new(*locator),
                    })
                    .collect(),
                fail_load: false,
                loaded: Mutex::new(Vec::new()),
                events,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail_load: true,
                ..Self::with_toc(&[])
            }
        }

        pub(crate) fn loaded(&self) -> Vec<String> {
            self.loaded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StructuredRenderer for StubRenderer {
        async fn load_from_bytes(
            &self,
            _bytes: Vec<u8>,
            document_id: &str,
        ) -> Result<DocumentHandle> {
            if self.fail_load {
                return Err(ReaderError::Structured("corrupt container".to_string()));
            }
            self.loaded.lock().unwrap().push(document_id.to_string());
            Ok(DocumentHandle::new(document_id))
        }

        async fn table_of_contents(&self, _handle: &DocumentHandle) -> Result<Vec<TocEntry>> {
            Ok(self.toc.clone())
        }

        async fn render_to(
            &self,
            handle: &DocumentHandle,
            target: &mut dyn RenderTarget,
            locator: Option<&Locator>,
        ) -> Result<()> {
            let locator = match locator {
                Some(locator) if !locator.as_str().is_empty() => locator.clone(),
                _ => Locator::new("start"),
            };
            target.present(RenderedSection {
                locator: Some(locator.clone()),
                title: None,
                html: format!("<section>{}</section>", locator),
            });
            let _ = self.events.send(Relocation {
                document_id: handle.document_id().to_string(),
                locator,
            });
            Ok(())
        }

        fn relocations(&self) -> broadcast::Receiver<Relocation> {
            self.events.subscribe()
        }
    }
}
