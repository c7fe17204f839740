//! Reader session state

use std::sync::Arc;

use serde::Serialize;

use crate::ingest::{display_name, Document, DocumentFormat, DocumentId, FileSource, LoadToken};
use crate::progress::{Preferences, ReadingPosition};
use crate::structured::DocumentHandle;

/// Which screen is showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Shelf,
    Reader,
}

/// Lifecycle of the most recent load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        document_id: DocumentId,
        token: LoadToken,
    },
    Ready,
    Failed {
        document_id: DocumentId,
        message: String,
    },
}

/// A file on the shelf
#[derive(Clone)]
pub struct ShelfEntry {
    pub id: DocumentId,
    /// File name without the extension
    pub name: String,
    pub format: DocumentFormat,
    pub size: u64,
    pub source: Arc<dyn FileSource>,
}

impl ShelfEntry {
    /// `None` for anything other than `.txt` / `.epub`
    pub fn from_source(source: Arc<dyn FileSource>) -> Option<Self> {
        let format = DocumentFormat::from_file_name(source.name())?;
        let size = source.len();
        Some(Self {
            id: DocumentId::from_name_and_size(source.name(), size),
            name: display_name(source.name()),
            format,
            size,
            source,
        })
    }
}

/// The document being read
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub document: Document,
    pub handle: Option<DocumentHandle>,
    pub position: ReadingPosition,
    /// Share of the current chapter scrolled past, `[0.0, 1.0]`
    pub progress: f64,
}

impl OpenDocument {
    pub fn is_structured(&self) -> bool {
        self.document.format == DocumentFormat::Structured
    }
}

/// Everything the controller owns
#[derive(Default)]
pub struct ReaderState {
    pub view: View,
    pub load: LoadState,
    pub shelf: Vec<ShelfEntry>,
    pub current: Option<OpenDocument>,
    pub preferences: Preferences,
}

impl ReaderState {
    /// Add supported files that are not on the shelf yet; returns how many
    pub fn add_sources(&mut self, sources: impl IntoIterator<Item = Arc<dyn FileSource>>) -> usize {
        let mut added = 0;
        for source in sources {
            let Some(entry) = ShelfEntry::from_source(source) else {
                continue;
            };
            if self.shelf.iter().any(|existing| existing.id == entry.id) {
                continue;
            }
            tracing::debug!(document_id = %entry.id, format = entry.format.label(), "Added to shelf");
            self.shelf.push(entry);
            added += 1;
        }
        added
    }

    pub fn entry(&self, id: &DocumentId) -> Option<&ShelfEntry> {
        self.shelf.iter().find(|entry| &entry.id == id)
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        ReaderSnapshot {
            view: self.view,
            loading: matches!(self.load, LoadState::Loading { .. }),
            error: match &self.load {
                LoadState::Failed { message, .. } => Some(message.clone()),
                _ => None,
            },
            shelf: self
                .shelf
                .iter()
                .map(|entry| ShelfItem {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    format: entry.format,
                    size: human_size(entry.size),
                })
                .collect(),
            current: self.current.as_ref().map(|open| CurrentDocument {
                id: open.document.id.clone(),
                name: open.document.name.clone(),
                format: open.document.format,
                encoding: open.document.encoding_name(),
                chapters: open
                    .document
                    .chapters
                    .iter()
                    .enumerate()
                    .map(|(i, chapter)| chapter.label(i))
                    .collect(),
                position: open.position.clone(),
                progress: open.progress,
            }),
            preferences: self.preferences,
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Read-only copy of the state for rendering
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSnapshot {
    pub view: View,
    pub loading: bool,
    pub error: Option<String>,
    pub shelf: Vec<ShelfItem>,
    pub current: Option<CurrentDocument>,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfItem {
    pub id: DocumentId,
    pub name: String,
    pub format: DocumentFormat,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentDocument {
    pub id: DocumentId,
    pub name: String,
    pub format: DocumentFormat,
    pub encoding: Option<&'static str>,
    /// Picker labels, one per chapter
    pub chapters: Vec<String>,
    pub position: ReadingPosition,
    pub progress: f64,
}

/// Byte count as `512B`, `1.5K` or `2.0M`
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MemorySource;

    fn source(name: &str, len: usize) -> Arc<dyn FileSource> {
        Arc::new(MemorySource::new(name, vec![b'x'; len]))
    }

    #[test]
    fn test_shelf_filters_and_dedupes() {
        let mut state = ReaderState::default();
        let added = state.add_sources(vec![
            source("a.txt", 3),
            source("b.EPUB", 4),
            source("c.pdf", 5),
            source("a.txt", 3),
            source("a.txt", 7),
        ]);

        assert_eq!(added, 3);
        let ids: Vec<&str> = state.shelf.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt_3", "b.EPUB_4", "a.txt_7"]);
        assert_eq!(state.shelf[1].name, "b");
        assert_eq!(state.shelf[1].format, DocumentFormat::Structured);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(1536), "1.5K");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0M");
    }

    #[test]
    fn test_snapshot_reports_failure() {
        let mut state = ReaderState::default();
        state.load = LoadState::Failed {
            document_id: DocumentId::from_name_and_size("x.txt", 1),
            message: "IO error: gone".to_string(),
        };
        let snapshot = state.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error.as_deref(), Some("IO error: gone"));
        assert_eq!(snapshot.view, View::Shelf);
    }
}
