//! File sources
//!
//! The ingest pipeline only needs a name, a byte length and ranged reads,
//! so it never cares whether bytes came from disk, a picker or a test.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::Mutex;

/// A user-supplied file
#[async_trait]
pub trait FileSource: Send + Sync {
    /// File name including extension
    fn name(&self) -> &str;

    /// Total size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`
    ///
    /// A short read means the file was truncated underneath us and must be
    /// reported as `UnexpectedEof`.
    async fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;
}

// ============================================================================
// Local filesystem
// ============================================================================

/// File on the local filesystem
pub struct LocalFile {
    name: String,
    path: PathBuf,
    len: u64,
    file: Mutex<tokio::fs::File>,
}

impl LocalFile {
    pub async fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path).await?;
        let len = file.metadata().await?.len();
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            name,
            path,
            len,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Bytes already held in memory (drag-and-drop payloads, tests)
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl FileSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    async fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start.saturating_add(len);
        self.bytes
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("range {}..{} beyond {} bytes", start, end, self.bytes.len()),
                )
            })
    }
}
