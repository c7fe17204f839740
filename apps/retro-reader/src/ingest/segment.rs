//! Chapter segmentation for plain text
//!
//! Lines that look like chapter headings ("第十二章", "Chapter 3", "Part 2")
//! start a new chapter, but only once the running chapter has real content.
//! Text without any usable heading comes back as a single chapter named
//! after the document.

use std::sync::OnceLock;

use regex::Regex;

use super::types::Chapter;
use crate::config::DEFAULT_PREFACE_TITLE;

const HEADING_PATTERN: &str =
    r"(?i)(第[\d一二三四五六七八九十百千万零〇两]+[章节回卷])|^chapter\s+\d+|^part\s+\d+";

/// Segmentation options
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Title of the chapter holding text before the first heading
    pub preface_title: String,
    /// Non-blank lines a chapter needs before a heading may close it
    pub min_content_lines: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            preface_title: DEFAULT_PREFACE_TITLE.to_string(),
            min_content_lines: 1,
        }
    }
}

/// Heading-driven chapter splitter
#[derive(Debug, Clone)]
pub struct Segmenter {
    options: SegmentOptions,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(SegmentOptions::default())
    }
}

impl Segmenter {
    pub fn new(options: SegmentOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    /// Whether a trimmed line reads as a chapter heading
    pub fn is_heading(line: &str) -> bool {
        heading_pattern().is_match(line)
    }

    /// Split `text` into chapters; pure and deterministic
    pub fn segment(&self, text: &str, document_name: &str) -> Vec<Chapter> {
        let lines: Vec<&str> = split_lines(text).collect();
        let min_content = self.options.min_content_lines.max(1);

        let mut finished: Vec<(String, Vec<String>)> = Vec::new();
        let mut title = self.options.preface_title.clone();
        let mut current: Vec<String> = Vec::new();
        let mut content_lines = 0usize;
        let mut headings = 0usize;

        for line in &lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                current.push((*line).to_string());
                continue;
            }

            if content_lines >= min_content && Self::is_heading(trimmed) {
                let heading = collapse_whitespace(trimmed);
                finished.push((
                    std::mem::replace(&mut title, heading),
                    std::mem::take(&mut current),
                ));
                content_lines = 0;
                headings += 1;
                continue;
            }

            current.push((*line).to_string());
            content_lines += 1;
        }

        if content_lines > 0 {
            finished.push((title, current));
        } else if let Some((_, last)) = finished.last_mut() {
            // Blank tail after a bare heading stays with the previous chapter
            last.extend(current);
        }

        if headings == 0 || finished.len() <= 1 {
            tracing::debug!(
                document = %document_name,
                headings,
                "No usable headings, keeping text as one chapter"
            );
            return vec![Chapter::with_lines(
                document_name,
                lines.iter().map(|l| (*l).to_string()).collect(),
            )];
        }

        finished
            .into_iter()
            .map(|(title, lines)| Chapter::with_lines(title, lines))
            .collect()
    }
}

/// Segment with default options
pub fn segment(text: &str, document_name: &str) -> Vec<Chapter> {
    Segmenter::default().segment(text, document_name)
}

/// Split on `\n`, dropping the `\r` of `\r\n` endings
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(HEADING_PATTERN).expect("heading pattern is valid"))
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
