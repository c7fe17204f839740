//! EPUB renderer using rbook
//!
//! Keeps parsed books in memory keyed by document id and renders spine
//! resources as raw XHTML sections.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use rbook::prelude::*;
use rbook::Epub;
use tokio::sync::{broadcast, RwLock};

use super::{
    DocumentHandle, Locator, Relocation, RenderTarget, RenderedSection, StructuredRenderer,
    TocEntry as OutlineEntry, RELOCATION_CHANNEL_CAPACITY,
};
use crate::error::{ReaderError, Result};

/// [`StructuredRenderer`] backed by rbook
pub struct EpubRenderer {
    books: RwLock<HashMap<String, Arc<Epub>>>,
    events: broadcast::Sender<Relocation>,
}

impl Default for EpubRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubRenderer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(RELOCATION_CHANNEL_CAPACITY);
        Self {
            books: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Drop a loaded book
    pub async fn unload(&self, handle: &DocumentHandle) -> bool {
        let mut books = self.books.write().await;
        books.remove(handle.document_id()).is_some()
    }

    async fn book(&self, handle: &DocumentHandle) -> Result<Arc<Epub>> {
        let books = self.books.read().await;
        books
            .get(handle.document_id())
            .cloned()
            .ok_or_else(|| ReaderError::NotFound(format!("EPUB {} not loaded", handle.document_id())))
    }

    /// Href of the first spine item
    fn first_href(epub: &Epub) -> Option<String> {
        let spine = epub.spine();
        let manifest = epub.manifest();
        let first = spine.entries().next()?;
        manifest.by_id(first.idref()).map(|m| m.href().to_string())
    }

    /// Strip leading slashes and common EPUB content directory prefixes
    fn normalize_href(href: &str) -> String {
        let href = href.trim_start_matches('/');
        let href = href
            .strip_prefix("OEBPS/")
            .or_else(|| href.strip_prefix("OPS/"))
            .or_else(|| href.strip_prefix("EPUB/"))
            .unwrap_or(href);
        href.to_string()
    }

    fn read_section(epub: &Epub, href: &str) -> Result<String> {
        let path = href.split('#').next().unwrap_or(href);
        let manifest = epub.manifest();
        let item = manifest
            .by_href(path)
            .or_else(|| manifest.by_href(&Self::normalize_href(path)))
            .ok_or_else(|| ReaderError::Structured(format!("Section not found: {}", href)))?;

        epub.read_resource_str(item.href())
            .map_err(|e| ReaderError::Structured(e.to_string()))
    }
}

#[async_trait]
impl StructuredRenderer for EpubRenderer {
    async fn load_from_bytes(&self, bytes: Vec<u8>, document_id: &str) -> Result<DocumentHandle> {
        // Lenient parsing: plenty of real-world EPUBs have sloppy metadata
        let epub = Epub::options()
            .strict(false)
            .read(Cursor::new(bytes))
            .map_err(|e| ReaderError::Structured(format!("Failed to open EPUB: {}", e)))?;

        {
            let mut books = self.books.write().await;
            books.insert(document_id.to_string(), Arc::new(epub));
        }

        tracing::debug!(document_id = %document_id, "Loaded EPUB");
        Ok(DocumentHandle::new(document_id))
    }

    async fn table_of_contents(&self, handle: &DocumentHandle) -> Result<Vec<OutlineEntry>> {
        let epub = self.book(handle).await?;
        let toc = epub.toc();

        let Some(root) = toc.contents() else {
            return Ok(Vec::new());
        };

        fn flatten<'a>(entry: impl rbook::prelude::TocEntry<'a>, out: &mut Vec<OutlineEntry>) {
            let href = entry
                .resource()
                .map(|r| {
                    use rbook::ebook::resource::ResourceKey;
                    match r.key() {
                        ResourceKey::Value(s) => s.to_string(),
                        ResourceKey::Position(pos) => pos.to_string(),
                    }
                })
                .unwrap_or_default();

            out.push(OutlineEntry {
                title: entry.label().split_whitespace().collect::<Vec<_>>().join(" "),
                locator: Locator::new(href),
            });

            for child in entry.children().iter() {
                flatten(child, out);
            }
        }

        let mut entries = Vec::new();
        for entry in root.children().iter() {
            flatten(entry, &mut entries);
        }
        Ok(entries)
    }

    async fn render_to(
        &self,
        handle: &DocumentHandle,
        target: &mut dyn RenderTarget,
        locator: Option<&Locator>,
    ) -> Result<()> {
        let epub = self.book(handle).await?;

        let href = match locator {
            Some(locator) if !locator.as_str().is_empty() => locator.as_str().to_string(),
            _ => Self::first_href(&epub)
                .ok_or_else(|| ReaderError::Structured("EPUB has an empty spine".to_string()))?,
        };

        let html = Self::read_section(&epub, &href)?;
        let rendered = Locator::new(href);

        target.present(RenderedSection {
            locator: Some(rendered.clone()),
            title: None,
            html,
        });

        // Nobody listening is fine
        let _ = self.events.send(Relocation {
            document_id: handle.document_id().to_string(),
            locator: rendered,
        });

        Ok(())
    }

    fn relocations(&self) -> broadcast::Receiver<Relocation> {
        self.events.subscribe()
    }
}
