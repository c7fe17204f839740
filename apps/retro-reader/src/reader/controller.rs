//! Reader controller
//!
//! Single owner of [`ReaderState`]. Every user action arrives as a
//! [`ReaderEvent`] through [`ReaderController::dispatch`]; loads run without
//! holding the state lock and only commit while their token is still
//! current.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::state::{LoadState, OpenDocument, ReaderSnapshot, ReaderState, View};
use super::view::{chapter_section, reading_progress};
use crate::error::{ReaderError, Result};
use crate::ingest::{
    DocumentFormat, DocumentId, EncodingChoice, FileSource, IngestPipeline, LoadOutcome,
};
use crate::progress::{clamp_font_size, PositionManager, ReadingPosition};
use crate::structured::{Locator, RenderTarget};

/// User actions
pub enum ReaderEvent {
    /// Files picked or dropped onto the shelf
    AddFiles(Vec<Arc<dyn FileSource>>),
    Open(DocumentId),
    ShowShelf,
    ShowReader,
    NextChapter,
    PreviousChapter,
    SelectChapter(usize),
    /// Plain-text scroll position and the geometry it was measured against
    Scrolled {
        offset: f64,
        content_height: f64,
        viewport_height: f64,
    },
    /// Visible position of a structured document moved
    Relocated(Locator),
    IncreaseFont,
    DecreaseFont,
    CycleTheme,
    ResetPosition,
    /// Write pending positions now (shutdown)
    Flush,
}

impl ReaderEvent {
    /// Keyboard shortcut for a key name, ignoring modified presses
    pub fn from_key(key: &str, modified: bool) -> Option<Self> {
        if modified {
            return None;
        }
        match key {
            "ArrowLeft" => Some(ReaderEvent::PreviousChapter),
            "ArrowRight" => Some(ReaderEvent::NextChapter),
            "Escape" => Some(ReaderEvent::ShowShelf),
            _ => None,
        }
    }
}

/// What a dispatched event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderUpdate {
    Changed,
    /// Nothing to do: no document, out of bounds, already there
    Ignored,
    /// The load was overtaken by a newer one
    Stale,
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Clone)]
pub struct ReaderController {
    inner: Arc<ReaderControllerInner>,
}

struct ReaderControllerInner {
    pipeline: IngestPipeline,
    positions: PositionManager,
    encoding: EncodingChoice,
    state: Mutex<ReaderState>,
}

impl ReaderController {
    /// Build a controller, loading global preferences from the store
    pub async fn new(
        pipeline: IngestPipeline,
        positions: PositionManager,
        encoding: EncodingChoice,
    ) -> Self {
        let state = ReaderState {
            preferences: positions.preferences().await,
            ..ReaderState::default()
        };

        Self {
            inner: Arc::new(ReaderControllerInner {
                pipeline,
                positions,
                encoding,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn positions(&self) -> &PositionManager {
        &self.inner.positions
    }

    pub async fn snapshot(&self) -> ReaderSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn dispatch(&self, event: ReaderEvent) -> Result<ReaderUpdate> {
        match event {
            ReaderEvent::AddFiles(sources) => {
                let added = self.inner.state.lock().await.add_sources(sources);
                Ok(changed_if(added > 0))
            }
            ReaderEvent::Open(id) => self.open(id).await,
            ReaderEvent::ShowShelf => Ok(self.switch_view(View::Shelf).await),
            ReaderEvent::ShowReader => Ok(self.switch_view(View::Reader).await),
            ReaderEvent::NextChapter => Ok(self.step_chapter(1).await),
            ReaderEvent::PreviousChapter => Ok(self.step_chapter(-1).await),
            ReaderEvent::SelectChapter(index) => Ok(self.select_chapter(index).await),
            ReaderEvent::Scrolled {
                offset,
                content_height,
                viewport_height,
            } => Ok(self.scrolled(offset, content_height, viewport_height).await),
            ReaderEvent::Relocated(locator) => Ok(self.relocated(locator).await),
            ReaderEvent::IncreaseFont => Ok(self.adjust_font(1).await),
            ReaderEvent::DecreaseFont => Ok(self.adjust_font(-1).await),
            ReaderEvent::CycleTheme => Ok(self.cycle_theme().await),
            ReaderEvent::ResetPosition => Ok(self.reset_position().await),
            ReaderEvent::Flush => {
                self.inner.positions.flush().await;
                Ok(ReaderUpdate::Changed)
            }
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    async fn open(&self, id: DocumentId) -> Result<ReaderUpdate> {
        let source = {
            let state = self.inner.state.lock().await;
            state
                .entry(&id)
                .map(|entry| entry.source.clone())
                .ok_or_else(|| ReaderError::NotFound(format!("{} is not on the shelf", id)))?
        };

        // The previous document's position goes out before it is replaced
        self.inner.positions.flush().await;

        let task = self.inner.pipeline.begin(source, self.inner.encoding)?;
        let token = task.token();
        {
            let mut state = self.inner.state.lock().await;
            state.view = View::Reader;
            state.load = LoadState::Loading {
                document_id: id.clone(),
                token,
            };
        }

        let generation = self.inner.pipeline.generation().clone();
        let loaded = match task.finish().await {
            Ok(LoadOutcome::Ready(loaded)) => loaded,
            Ok(LoadOutcome::Stale) => return Ok(ReaderUpdate::Stale),
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                if !generation.is_current(token) {
                    return Ok(ReaderUpdate::Stale);
                }
                tracing::warn!(document_id = %id, error = %e, "Failed to load document");
                state.load = LoadState::Failed {
                    document_id: id,
                    message: e.to_string(),
                };
                return Err(e);
            }
        };

        let chapter_count = loaded.document.chapter_count();
        let restored = self.inner.positions.restore(&id, chapter_count).await;

        let mut state = self.inner.state.lock().await;
        if !generation.is_current(loaded.token) {
            tracing::debug!(document_id = %id, "Discarding overtaken load");
            return Ok(ReaderUpdate::Stale);
        }

        let mut position = restored.unwrap_or_else(|| ReadingPosition::start(id.clone()));
        position.font_size = state.preferences.font_size;
        position.theme = state.preferences.theme;
        if loaded.document.format == DocumentFormat::Structured && position.locator.is_none() {
            position.locator = loaded
                .document
                .chapter(position.chapter_index)
                .and_then(|chapter| chapter.locator())
                .filter(|locator| !locator.is_empty())
                .map(str::to_string);
        }

        tracing::info!(
            document_id = %id,
            chapter_index = position.chapter_index,
            chapters = chapter_count,
            "Opened document"
        );

        state.current = Some(OpenDocument {
            document: loaded.document,
            handle: loaded.handle,
            position,
            progress: 0.0,
        });
        state.load = LoadState::Ready;
        state.view = View::Reader;

        Ok(ReaderUpdate::Changed)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Present the current chapter (plain) or section (structured)
    pub async fn render_current(&self, target: &mut dyn RenderTarget) -> Result<()> {
        let (document_id, handle, locator) = {
            let state = self.inner.state.lock().await;
            let open = state
                .current
                .as_ref()
                .ok_or_else(|| ReaderError::NotFound("no document is open".to_string()))?;

            if !open.is_structured() {
                let chapter = open
                    .document
                    .chapter(open.position.chapter_index)
                    .ok_or_else(|| ReaderError::NotFound("chapter out of range".to_string()))?;
                target.present(chapter_section(chapter));
                return Ok(());
            }

            let handle = open.handle.clone().ok_or_else(|| {
                ReaderError::Structured("document has no renderer handle".to_string())
            })?;
            (
                open.document.id.clone(),
                handle,
                open.position.locator.clone().map(Locator::new),
            )
        };

        let renderer = self.inner.pipeline.structured().cloned().ok_or_else(|| {
            ReaderError::Structured("no renderer configured for EPUB files".to_string())
        })?;

        let mut relocations = renderer.relocations();
        renderer
            .render_to(&handle, target, locator.as_ref())
            .await?;

        while let Ok(relocation) = relocations.try_recv() {
            if relocation.document_id == document_id.as_str() {
                self.relocated(relocation.locator).await;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    async fn switch_view(&self, view: View) -> ReaderUpdate {
        let mut state = self.inner.state.lock().await;
        if state.view == view {
            return ReaderUpdate::Ignored;
        }
        state.view = view;
        ReaderUpdate::Changed
    }

    async fn step_chapter(&self, delta: isize) -> ReaderUpdate {
        let current = {
            let state = self.inner.state.lock().await;
            match &state.current {
                Some(open) => open.position.chapter_index,
                None => return ReaderUpdate::Ignored,
            }
        };

        match current.checked_add_signed(delta) {
            Some(index) => self.select_chapter(index).await,
            None => ReaderUpdate::Ignored,
        }
    }

    async fn select_chapter(&self, index: usize) -> ReaderUpdate {
        let position = {
            let mut state = self.inner.state.lock().await;
            let Some(open) = state.current.as_mut() else {
                return ReaderUpdate::Ignored;
            };
            let Some(chapter) = open.document.chapter(index) else {
                return ReaderUpdate::Ignored;
            };

            let locator = chapter
                .locator()
                .filter(|locator| !locator.is_empty())
                .map(str::to_string);
            open.position.chapter_index = index;
            open.position.scroll_offset = 0.0;
            open.position.locator = locator;
            open.progress = 0.0;
            open.position.clone()
        };

        self.inner.positions.save(position).await;
        ReaderUpdate::Changed
    }

    async fn scrolled(&self, offset: f64, content_height: f64, viewport_height: f64) -> ReaderUpdate {
        let position = {
            let mut state = self.inner.state.lock().await;
            let Some(open) = state.current.as_mut() else {
                return ReaderUpdate::Ignored;
            };
            if open.is_structured() {
                return ReaderUpdate::Ignored;
            }

            open.position.scroll_offset = offset.max(0.0);
            open.progress = reading_progress(offset, content_height, viewport_height);
            open.position.clone()
        };

        self.inner.positions.save(position).await;
        ReaderUpdate::Changed
    }

    async fn relocated(&self, locator: Locator) -> ReaderUpdate {
        let position = {
            let mut state = self.inner.state.lock().await;
            let Some(open) = state.current.as_mut() else {
                return ReaderUpdate::Ignored;
            };
            if !open.is_structured() {
                return ReaderUpdate::Ignored;
            }

            let path = strip_fragment(locator.as_str());
            if let Some(index) = open.document.chapters.iter().position(|chapter| {
                chapter
                    .locator()
                    .is_some_and(|l| !l.is_empty() && strip_fragment(l) == path)
            }) {
                open.position.chapter_index = index;
            }

            let count = open.document.chapter_count().max(1);
            open.progress = (open.position.chapter_index + 1) as f64 / count as f64;
            open.position.locator = Some(locator.into_string());
            open.position.clone()
        };

        self.inner.positions.save(position).await;
        ReaderUpdate::Changed
    }

    async fn reset_position(&self) -> ReaderUpdate {
        let position = {
            let mut state = self.inner.state.lock().await;
            let Some(open) = state.current.as_mut() else {
                return ReaderUpdate::Ignored;
            };

            if open.is_structured() {
                open.position.chapter_index = 0;
                open.position.locator = None;
            }
            open.position.scroll_offset = 0.0;
            open.progress = 0.0;
            open.position.clone()
        };

        self.inner.positions.save(position).await;
        ReaderUpdate::Changed
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    async fn adjust_font(&self, delta: i32) -> ReaderUpdate {
        let mut state = self.inner.state.lock().await;
        let size = clamp_font_size(state.preferences.font_size as i32 + delta);
        if size == state.preferences.font_size {
            return ReaderUpdate::Ignored;
        }
        state.preferences.font_size = size;
        self.apply_preferences(state).await
    }

    async fn cycle_theme(&self) -> ReaderUpdate {
        let mut state = self.inner.state.lock().await;
        state.preferences.theme = state.preferences.theme.next();
        self.apply_preferences(state).await
    }

    async fn apply_preferences(
        &self,
        mut state: tokio::sync::MutexGuard<'_, ReaderState>,
    ) -> ReaderUpdate {
        let preferences = state.preferences;
        let position = state.current.as_mut().map(|open| {
            open.position.font_size = preferences.font_size;
            open.position.theme = preferences.theme;
            open.position.clone()
        });
        drop(state);

        tracing::debug!(
            font_size = preferences.font_size,
            theme = preferences.theme.as_str(),
            "Preferences changed"
        );

        self.inner.positions.save_preferences(preferences).await;
        if let Some(position) = position {
            self.inner.positions.save(position).await;
        }
        ReaderUpdate::Changed
    }
}

fn changed_if(changed: bool) -> ReaderUpdate {
    if changed {
        ReaderUpdate::Changed
    } else {
        ReaderUpdate::Ignored
    }
}

fn strip_fragment(locator: &str) -> &str {
    locator.split('#').next().unwrap_or(locator)
}

// ============================================================================
// Tests
// ============================================================================
