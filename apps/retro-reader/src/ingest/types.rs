//! Ingest data types
//!
//! Documents and chapters produced by the ingest pipeline.

use std::fmt;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Characters kept when a chapter title is shown in a picker
pub const DISPLAY_TITLE_CHARS: usize = 40;

// ============================================================================
// Identity
// ============================================================================

/// Stable document key built from file name and byte size
///
/// Two distinct files sharing both name and size collide. Content hashing
/// is deliberately not used here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn from_name_and_size(file_name: &str, size: u64) -> Self {
        Self(format!("{}_{}", file_name, size))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document format tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Line-oriented text, segmented locally
    Plain,
    /// EPUB-like container delegated to a renderer
    Structured,
}

impl DocumentFormat {
    /// Detect format from a file name; only `.txt` and `.epub` are accepted
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        if ext.eq_ignore_ascii_case("txt") {
            Some(DocumentFormat::Plain)
        } else if ext.eq_ignore_ascii_case("epub") {
            Some(DocumentFormat::Structured)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Plain => "TXT",
            DocumentFormat::Structured => "EPUB",
        }
    }
}

/// Strip a trailing `.txt` / `.epub` extension for display
pub fn display_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("epub")) =>
        {
            stem.to_string()
        }
        _ => file_name.to_string(),
    }
}

// ============================================================================
// Chapters
// ============================================================================

/// Chapter body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ChapterContent {
    /// Lines of a plain-text chapter; blank lines separate paragraphs
    Paragraphs { lines: Vec<String> },
    /// Locator into a delegated structured document
    Reference { locator: String },
}

/// A titled chapter, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    title: String,
    content: ChapterContent,
}

impl Chapter {
    pub fn with_lines(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            title: title.into(),
            content: ChapterContent::Paragraphs { lines },
        }
    }

    pub fn with_locator(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: ChapterContent::Reference {
                locator: locator.into(),
            },
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &ChapterContent {
        &self.content
    }

    /// Lines of a plain chapter (empty for structured chapters)
    pub fn lines(&self) -> &[String] {
        match &self.content {
            ChapterContent::Paragraphs { lines } => lines,
            ChapterContent::Reference { .. } => &[],
        }
    }

    pub fn locator(&self) -> Option<&str> {
        match &self.content {
            ChapterContent::Reference { locator } => Some(locator),
            ChapterContent::Paragraphs { .. } => None,
        }
    }

    /// Non-blank lines, i.e. the paragraphs a reader view would show
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.lines()
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
    }

    /// Title cut to `max_chars` characters for pickers
    pub fn display_title(&self, max_chars: usize) -> String {
        self.title.chars().take(max_chars).collect()
    }

    /// Picker label: one-based index plus shortened title
    pub fn label(&self, index: usize) -> String {
        format!("{}. {}", index + 1, self.display_title(DISPLAY_TITLE_CHARS))
    }
}

// ============================================================================
// Document
// ============================================================================

/// A loaded document
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub format: DocumentFormat,
    /// Resolved encoding for plain text
    pub encoding: Option<&'static Encoding>,
    pub chapters: Vec<Chapter>,
}

impl Document {
    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    pub fn encoding_name(&self) -> Option<&'static str> {
        self.encoding.map(|e| e.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id() {
        let id = DocumentId::from_name_and_size("三体.txt", 1024);
        assert_eq!(id.as_str(), "三体.txt_1024");
        assert_eq!(id, DocumentId::from_name_and_size("三体.txt", 1024));
        assert_ne!(id, DocumentId::from_name_and_size("三体.txt", 1025));
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(DocumentFormat::from_file_name("a.TXT"), Some(DocumentFormat::Plain));
        assert_eq!(
            DocumentFormat::from_file_name("book.epub"),
            Some(DocumentFormat::Structured)
        );
        assert_eq!(DocumentFormat::from_file_name("notes.md"), None);
        assert_eq!(DocumentFormat::from_file_name("README"), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("Dune.epub"), "Dune");
        assert_eq!(display_name("diary.Txt"), "diary");
        assert_eq!(display_name("archive.tar.gz"), "archive.tar.gz");
        assert_eq!(display_name(".txt"), ".txt");
    }

    #[test]
    fn test_chapter_label_truncates() {
        let chapter = Chapter::with_lines("x".repeat(60), Vec::new());
        assert_eq!(chapter.label(2), format!("3. {}", "x".repeat(40)));
        assert_eq!(chapter.title().len(), 60);
    }

    #[test]
    fn test_paragraphs_skip_blank_lines() {
        let chapter = Chapter::with_lines(
            "one",
            vec!["  first ".to_string(), String::new(), "second".to_string()],
        );
        let paragraphs: Vec<&str> = chapter.paragraphs().collect();
        assert_eq!(paragraphs, vec!["first", "second"]);
        assert_eq!(chapter.locator(), None);
    }
}
