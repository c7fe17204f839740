//! Encoding resolution
//!
//! An explicit user choice always wins. In `auto` mode a byte-order mark
//! decides first; otherwise a bounded prefix is decoded as UTF-8 and the
//! density of replacement characters, plus a GB18030 validity check, decides
//! between UTF-8 and the legacy Chinese multi-byte family. Detection never
//! fails: when in doubt the answer is UTF-8.

use std::fmt;
use std::str::FromStr;

use encoding_rs::{DecoderResult, Encoding, GB18030, UTF_8};

use crate::error::ReaderError;

/// Maximum number of sample bytes inspected during detection
pub const SAMPLE_LIMIT: usize = 200_000;

/// Replacement-character density above which UTF-8 is rejected
pub const REPLACEMENT_RATIO_THRESHOLD: f64 = 0.02;

/// Encoding chosen when UTF-8 is rejected
pub static LEGACY_FALLBACK: &Encoding = GB18030;

/// Encoding requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingChoice {
    #[default]
    Auto,
    Explicit(&'static Encoding),
}

impl EncodingChoice {
    /// Parse `auto` or any WHATWG encoding label (`utf-8`, `gbk`, `big5`, ...)
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() || label.eq_ignore_ascii_case("auto") {
            return Some(EncodingChoice::Auto);
        }
        Encoding::for_label(label.as_bytes()).map(EncodingChoice::Explicit)
    }
}

impl FromStr for EncodingChoice {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| ReaderError::Config(format!("Unknown encoding: {}", s)))
    }
}

impl fmt::Display for EncodingChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingChoice::Auto => f.write_str("auto"),
            EncodingChoice::Explicit(encoding) => f.write_str(encoding.name()),
        }
    }
}

/// Pick the encoding for a document from a sample of its first bytes
pub fn resolve_encoding(sample: &[u8], choice: EncodingChoice) -> &'static Encoding {
    match choice {
        EncodingChoice::Explicit(encoding) => encoding,
        EncodingChoice::Auto => detect(sample),
    }
}

/// Heuristic detection, UTF-8 vs. GB18030
pub fn detect(sample: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        return encoding;
    }

    let prefix = &sample[..sample.len().min(SAMPLE_LIMIT)];
    let (text, had_errors) = UTF_8.decode_without_bom_handling(trim_partial_tail(prefix));
    if !had_errors && !text.contains('\u{FFFD}') {
        return UTF_8;
    }

    let ratio = replacement_ratio(&text);
    if ratio > REPLACEMENT_RATIO_THRESHOLD {
        tracing::debug!(ratio, "Replacement density too high for UTF-8, using legacy fallback");
        return LEGACY_FALLBACK;
    }

    if had_errors && looks_like_legacy_multibyte(prefix) {
        tracing::debug!(ratio, "Invalid UTF-8 that is valid GB18030, using legacy fallback");
        return LEGACY_FALLBACK;
    }

    UTF_8
}

/// Share of decoded characters that are U+FFFD
pub fn replacement_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut replaced = 0usize;
    for c in text.chars() {
        total += 1;
        if c == '\u{FFFD}' {
            replaced += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        replaced as f64 / total as f64
    }
}

/// Decode a complete buffer, honouring (and stripping) any BOM
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, actual, had_errors) = encoding.decode(bytes);
    if actual != encoding {
        tracing::debug!(
            requested = encoding.name(),
            actual = actual.name(),
            "Byte-order mark overrode encoding"
        );
    }
    if had_errors {
        tracing::debug!(encoding = actual.name(), "Decoded with replacement characters");
    }
    text.into_owned()
}

/// The bytes contain multi-byte sequences and decode cleanly as GB18030
///
/// A sequence left incomplete at the end of the sample is not malformed.
fn looks_like_legacy_multibyte(bytes: &[u8]) -> bool {
    if !bytes.iter().any(|b| *b >= 0x80) {
        return false;
    }
    let mut decoder = GB18030.new_decoder_without_bom_handling();
    let Some(capacity) = decoder.max_utf8_buffer_length_without_replacement(bytes.len()) else {
        return false;
    };
    let mut out = String::with_capacity(capacity);
    let (result, _) = decoder.decode_to_string_without_replacement(bytes, &mut out, false);
    matches!(result, DecoderResult::InputEmpty)
}

/// Drop an incomplete UTF-8 sequence left at the end by a sample cut
fn trim_partial_tail(bytes: &[u8]) -> &[u8] {
    let floor = bytes.len().saturating_sub(3);
    for i in (floor..bytes.len()).rev() {
        let b = bytes[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let needed = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if bytes.len() - i < needed {
            &bytes[..i]
        } else {
            bytes
        };
    }
    bytes
}
