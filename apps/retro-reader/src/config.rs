//! Configuration management for Retro Reader

use std::env;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ReaderError, Result};

/// Default chunk size for incremental reads: 512 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Default debounce window for position saves
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 500;

/// Default key prefix for persisted reading positions
pub const DEFAULT_PROGRESS_NAMESPACE: &str = "reader:progress:";

/// Default title of the chapter that precedes the first heading
pub const DEFAULT_PREFACE_TITLE: &str = "开始";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ingest: IngestConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Bytes requested per read step
    pub chunk_size: usize,
    /// Encoding label, or "auto" for detection
    pub encoding: String,
    /// Title given to text before the first heading
    pub preface_title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    /// SQLite URL for the key-value store; `None` keeps positions in memory
    pub database_url: Option<String>,
    pub namespace: String,
    pub save_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ingest: IngestConfig {
                chunk_size: DEFAULT_CHUNK_SIZE,
                encoding: "auto".to_string(),
                preface_title: DEFAULT_PREFACE_TITLE.to_string(),
            },
            progress: ProgressConfig {
                database_url: Some("sqlite:./retro-reader.db".to_string()),
                namespace: DEFAULT_PROGRESS_NAMESPACE.to_string(),
                save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let chunk_size = parse_or(env::var("READER_CHUNK_SIZE").ok(), defaults.ingest.chunk_size);
        if chunk_size == 0 {
            return Err(ReaderError::Config(
                "READER_CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }

        let database_url = match env::var("READER_DATABASE_URL") {
            Ok(url) if url.eq_ignore_ascii_case("memory") || url.is_empty() => None,
            Ok(url) => Some(url),
            Err(_) => defaults.progress.database_url,
        };

        Ok(Config {
            ingest: IngestConfig {
                chunk_size,
                encoding: env::var("READER_ENCODING").unwrap_or(defaults.ingest.encoding),
                preface_title: env::var("READER_PREFACE_TITLE")
                    .unwrap_or(defaults.ingest.preface_title),
            },
            progress: ProgressConfig {
                database_url,
                namespace: env::var("READER_PROGRESS_NAMESPACE")
                    .unwrap_or(defaults.progress.namespace),
                save_debounce_ms: parse_or(
                    env::var("READER_SAVE_DEBOUNCE_MS").ok(),
                    defaults.progress.save_debounce_ms,
                ),
            },
        })
    }
}

fn parse_or<T: FromStr + Copy>(raw: Option<String>, fallback: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(value = %value, "Ignoring unparsable numeric setting");
            fallback
        }),
        None => fallback,
    }
}
