//! Plain-text chapter rendering

use crate::ingest::Chapter;
use crate::structured::RenderedSection;

/// Chapter as HTML: an `<h2>` title, then one `<p>` per line
///
/// Empty lines are dropped and whitespace-only lines become a spacer
/// paragraph.
pub fn chapter_html(chapter: &Chapter) -> String {
    let mut html = format!("<h2>{}</h2>", html_escape::encode_text(chapter.title()));
    for line in chapter.lines().iter().filter(|line| !line.is_empty()) {
        let text = line.trim();
        if text.is_empty() {
            html.push_str("<p>&nbsp;</p>");
        } else {
            html.push_str("<p>");
            html.push_str(&html_escape::encode_text(text));
            html.push_str("</p>");
        }
    }
    html
}

pub fn chapter_section(chapter: &Chapter) -> RenderedSection {
    RenderedSection {
        locator: None,
        title: Some(chapter.title().to_string()),
        html: chapter_html(chapter),
    }
}

/// Scrolled share of a chapter, 0 when the content fits the viewport
pub fn reading_progress(scroll_offset: f64, content_height: f64, viewport_height: f64) -> f64 {
    let scrollable = content_height - viewport_height;
    if scrollable <= 0.0 || !scroll_offset.is_finite() {
        return 0.0;
    }
    (scroll_offset / scrollable).clamp(0.0, 1.0)
}
