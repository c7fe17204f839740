//! Reading position types

use serde::{Deserialize, Serialize};

use crate::ingest::DocumentId;

/// Font size used when nothing is stored
pub const DEFAULT_FONT_SIZE: u8 = 16;
pub const MIN_FONT_SIZE: u8 = 12;
pub const MAX_FONT_SIZE: u8 = 36;

/// Colour theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Sepia,
    Dark,
}

impl Theme {
    /// Next theme in the light → sepia → dark cycle
    pub fn next(self) -> Self {
        match self {
            Theme::Light => Theme::Sepia,
            Theme::Sepia => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Sepia => "sepia",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "light" => Some(Theme::Light),
            "sepia" => Some(Theme::Sepia),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

/// Clamp a font size into the supported range
pub fn clamp_font_size(size: i32) -> u8 {
    size.clamp(MIN_FONT_SIZE as i32, MAX_FONT_SIZE as i32) as u8
}

/// Persisted reading cursor for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    pub document_id: DocumentId,
    pub chapter_index: usize,
    /// Scroll offset inside the chapter (plain text)
    #[serde(default)]
    pub scroll_offset: f64,
    /// Renderer locator (structured documents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default = "default_font_size")]
    pub font_size: u8,
    #[serde(default)]
    pub theme: Theme,
}

fn default_font_size() -> u8 {
    DEFAULT_FONT_SIZE
}

impl ReadingPosition {
    /// Top of the first chapter
    pub fn start(document_id: DocumentId) -> Self {
        Self {
            document_id,
            chapter_index: 0,
            scroll_offset: 0.0,
            locator: None,
            font_size: DEFAULT_FONT_SIZE,
            theme: Theme::default(),
        }
    }

    /// Keep the chapter index inside `[0, chapter_count)`
    ///
    /// An out-of-range index means the stored cursor belongs to a different
    /// file that shares this identity, so the cursor moves back to the start.
    pub fn clamped(mut self, chapter_count: usize) -> Self {
        if self.chapter_index >= chapter_count {
            self.chapter_index = 0;
            self.scroll_offset = 0.0;
            self.locator = None;
        }
        if !self.scroll_offset.is_finite() || self.scroll_offset < 0.0 {
            self.scroll_offset = 0.0;
        }
        self
    }
}
