//! Chunked reader
//!
//! Reads a [`FileSource`] front to back in fixed-size chunks on a spawned
//! task, yielding to the scheduler between chunks. Each read owns a
//! [`LoadToken`]; once a newer read starts the old one stops at the next
//! chunk boundary and resolves to [`ReadOutcome::Stale`] without touching
//! its accumulator or progress channel again.

use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::source::FileSource;
use super::token::{LoadGeneration, LoadToken};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::Result;

/// Bytes produced by a completed read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBuffer {
    /// Whole file contents in file order
    pub bytes: Vec<u8>,
    /// Raw bytes of the first chunk, kept for encoding detection
    pub sample: Vec<u8>,
}

/// How a read finished
#[derive(Debug)]
pub enum ReadOutcome {
    Complete(ReadBuffer),
    /// Superseded by a newer load; nothing was published
    Stale,
}

/// Issues chunked reads against a shared load generation
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    generation: LoadGeneration,
    chunk_size: usize,
}

impl ChunkedReader {
    pub fn new(generation: LoadGeneration, chunk_size: usize) -> Self {
        Self {
            generation,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn with_default_chunks(generation: LoadGeneration) -> Self {
        Self::new(generation, DEFAULT_CHUNK_SIZE)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn generation(&self) -> &LoadGeneration {
        &self.generation
    }

    /// Start reading `source`, invalidating any read already in flight
    pub fn begin_read(&self, source: Arc<dyn FileSource>) -> ReadHandle {
        let token = self.generation.advance();
        let (progress_tx, progress_rx) = watch::channel(0.0);

        tracing::debug!(
            token = token.value(),
            file_name = %source.name(),
            size = source.len(),
            chunk_size = self.chunk_size,
            "Starting chunked read"
        );

        let task = tokio::spawn(read_chunks(
            source,
            self.chunk_size,
            token,
            self.generation.clone(),
            progress_tx,
        ));

        ReadHandle {
            token,
            generation: self.generation.clone(),
            progress: progress_rx,
            task,
        }
    }
}

/// Handle to an in-flight read
pub struct ReadHandle {
    token: LoadToken,
    generation: LoadGeneration,
    progress: watch::Receiver<f64>,
    task: JoinHandle<Result<ReadOutcome>>,
}

impl ReadHandle {
    pub fn token(&self) -> LoadToken {
        self.token
    }

    /// Progress in `[0.0, 1.0]`, updated after every chunk
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Abandon this read at the next chunk boundary
    pub fn cancel(&self) {
        if self.generation.is_current(self.token) {
            self.generation.invalidate();
        }
    }

    pub async fn join(self) -> Result<ReadOutcome> {
        self.task.await?
    }
}

async fn read_chunks(
    source: Arc<dyn FileSource>,
    chunk_size: usize,
    token: LoadToken,
    generation: LoadGeneration,
    progress: watch::Sender<f64>,
) -> Result<ReadOutcome> {
    let total = source.len();
    if total == 0 {
        let _ = progress.send(1.0);
        return Ok(ReadOutcome::Complete(ReadBuffer::default()));
    }

    let mut bytes = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
    let mut sample = Vec::new();
    let mut offset: u64 = 0;
    let mut chunk_index = 0usize;

    while offset < total {
        if !generation.is_current(token) {
            tracing::debug!(token = token.value(), offset, "Read superseded before chunk");
            return Ok(ReadOutcome::Stale);
        }

        let len = (total - offset).min(chunk_size as u64) as usize;
        let chunk = source.read_range(offset, len).await?;
        if chunk.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "short read at offset {}: wanted {} bytes, got {}",
                    offset,
                    len,
                    chunk.len()
                ),
            )
            .into());
        }

        if !generation.is_current(token) {
            tracing::debug!(token = token.value(), chunk = chunk_index, "Dropping stale chunk");
            return Ok(ReadOutcome::Stale);
        }

        if chunk_index == 0 {
            sample = chunk.clone();
        }
        bytes.extend_from_slice(&chunk);
        offset += len as u64;
        chunk_index += 1;

        let _ = progress.send(offset as f64 / total as f64);
        tokio::task::yield_now().await;
    }

    tracing::debug!(
        token = token.value(),
        chunks = chunk_index,
        bytes = bytes.len(),
        "Chunked read complete"
    );

    Ok(ReadOutcome::Complete(ReadBuffer { bytes, sample }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReaderError;
    use crate::ingest::source::MemorySource;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    /// Source that releases one chunk per permit
    struct GatedSource {
        inner: MemorySource,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl FileSource for GatedSource {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn len(&self) -> u64 {
            self.inner.len()
        }

        async fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
            self.gate.acquire().await.unwrap().forget();
            self.inner.read_range(offset, len).await
        }
    }

    /// Source that claims more bytes than it has
    struct TruncatedSource;

    #[async_trait]
    impl FileSource for TruncatedSource {
        fn name(&self) -> &str {
            "short.txt"
        }

        fn len(&self) -> u64 {
            10
        }

        async fn read_range(&self, offset: u64, _len: usize) -> io::Result<Vec<u8>> {
            if offset == 0 {
                Ok(vec![b'a'; 4])
            } else {
                Ok(vec![b'b'; 2])
            }
        }
    }

    fn source(bytes: &[u8]) -> Arc<dyn FileSource> {
        Arc::new(MemorySource::new("test.txt", bytes.to_vec()))
    }

    #[tokio::test]
    async fn test_reads_in_order_with_sample() {
        let reader = ChunkedReader::new(LoadGeneration::new(), 4);
        let handle = reader.begin_read(source(b"abcdefghij"));
        let progress = handle.progress();

        match handle.join().await.unwrap() {
            ReadOutcome::Complete(buffer) => {
                assert_eq!(buffer.bytes, b"abcdefghij");
                assert_eq!(buffer.sample, b"abcd");
            }
            ReadOutcome::Stale => panic!("read should complete"),
        }
        assert_eq!(*progress.borrow(), 1.0);
    }

    #[tokio::test]
    async fn test_empty_file_completes_immediately() {
        let reader = ChunkedReader::new(LoadGeneration::new(), 4);
        let handle = reader.begin_read(source(b""));
        let progress = handle.progress();

        match handle.join().await.unwrap() {
            ReadOutcome::Complete(buffer) => {
                assert!(buffer.bytes.is_empty());
                assert!(buffer.sample.is_empty());
            }
            ReadOutcome::Stale => panic!("empty read should complete"),
        }
        assert_eq!(*progress.borrow(), 1.0);
    }

    #[tokio::test]
    async fn test_newer_read_supersedes_in_flight_read() {
        let reader = ChunkedReader::new(LoadGeneration::new(), 4);
        let gate = Arc::new(Semaphore::new(0));
        let slow: Arc<dyn FileSource> = Arc::new(GatedSource {
            inner: MemorySource::new("slow.txt", b"0123456789ab".to_vec()),
            gate: gate.clone(),
        });

        let first = reader.begin_read(slow);
        let mut first_progress = first.progress();

        gate.add_permits(1);
        first_progress.changed().await.unwrap();
        let seen = *first_progress.borrow();
        assert!((seen - 1.0 / 3.0).abs() < 1e-9);

        let second = reader.begin_read(source(b"fresh"));
        gate.add_permits(10);

        assert!(matches!(first.join().await.unwrap(), ReadOutcome::Stale));
        assert_eq!(*first_progress.borrow(), seen);

        match second.join().await.unwrap() {
            ReadOutcome::Complete(buffer) => assert_eq!(buffer.bytes, b"fresh"),
            ReadOutcome::Stale => panic!("latest read should complete"),
        }
    }

    #[tokio::test]
    async fn test_cancel_abandons_read() {
        let reader = ChunkedReader::new(LoadGeneration::new(), 2);
        let gate = Arc::new(Semaphore::new(0));
        let handle = reader.begin_read(Arc::new(GatedSource {
            inner: MemorySource::new("slow.txt", b"abcdef".to_vec()),
            gate: gate.clone(),
        }));

        handle.cancel();
        gate.add_permits(10);
        assert!(matches!(handle.join().await.unwrap(), ReadOutcome::Stale));
    }

    #[tokio::test]
    async fn test_truncated_source_is_io_error() {
        let reader = ChunkedReader::new(LoadGeneration::new(), 4);
        let handle = reader.begin_read(Arc::new(TruncatedSource));

        match handle.join().await {
            Err(ReaderError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected IO error, got {:?}", other.map(|_| ())),
        }
    }
}
