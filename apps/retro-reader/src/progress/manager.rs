//! Position Manager
//!
//! Persists one [`ReadingPosition`] per document:
//! - Saves are coalesced per key over a debounce window
//! - `flush` writes everything pending (shutdown, document switch)
//! - Restores clamp the stored chapter to the loaded chapter count
//! - Store failures never reach the caller; the manager logs once and keeps
//!   positions in memory for the rest of the session

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use super::prefs::Preferences;
use super::store::KeyValueStore;
use super::types::ReadingPosition;
use crate::config::ProgressConfig;
use crate::error::StoreError;
use crate::ingest::DocumentId;

// ============================================================================
// Position Manager
// ============================================================================

/// Debounced reading-position persistence
#[derive(Clone)]
pub struct PositionManager {
    inner: Arc<PositionManagerInner>,
}

struct PositionManagerInner {
    store: Arc<dyn KeyValueStore>,

    /// Prefix for storage keys
    namespace: String,

    debounce: Duration,

    /// Latest unwritten position per storage key
    pending: Mutex<HashMap<String, ReadingPosition>>,

    /// Every position saved during this session
    session: RwLock<HashMap<DocumentId, ReadingPosition>>,

    /// Set after the first store failure
    degraded: AtomicBool,
}

impl PositionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &ProgressConfig) -> Self {
        Self::with_debounce(
            store,
            config.namespace.clone(),
            Duration::from_millis(config.save_debounce_ms),
        )
    }

    pub fn with_debounce(
        store: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PositionManagerInner {
                store,
                namespace: namespace.into(),
                debounce,
                pending: Mutex::new(HashMap::new()),
                session: RwLock::new(HashMap::new()),
                degraded: AtomicBool::new(false),
            }),
        }
    }

    /// Storage key for a document
    pub fn key(&self, document_id: &DocumentId) -> String {
        format!("{}{}", self.inner.namespace, document_id)
    }

    /// Whether positions are only being kept in memory
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Acquire)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Record a position; the write happens once the debounce window closes
    pub async fn save(&self, position: ReadingPosition) {
        let key = self.key(&position.document_id);

        {
            let mut session = self.inner.session.write().await;
            session.insert(position.document_id.clone(), position.clone());
        }

        if self.inner.debounce.is_zero() {
            self.write(&key, &position).await;
            return;
        }

        let first_in_window = {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(key.clone(), position).is_none()
        };

        if first_in_window {
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(manager.inner.debounce).await;
                manager.flush_key(&key).await;
            });
        }
    }

    /// Write every pending position now
    pub async fn flush(&self) {
        let pending: Vec<(String, ReadingPosition)> = {
            let mut pending = self.inner.pending.lock().await;
            pending.drain().collect()
        };

        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "Flushing reading positions");
        }

        for (key, position) in pending {
            self.write(&key, &position).await;
        }
    }

    /// Stored position for a document with `chapter_count` chapters
    ///
    /// `None` when nothing was stored or the stored value is unreadable.
    pub async fn restore(
        &self,
        document_id: &DocumentId,
        chapter_count: usize,
    ) -> Option<ReadingPosition> {
        let remembered = {
            let session = self.inner.session.read().await;
            session.get(document_id).cloned()
        };

        let position = match remembered {
            Some(position) => position,
            None => self.read_stored(document_id).await?,
        };

        if position.chapter_index >= chapter_count {
            tracing::debug!(
                document_id = %document_id,
                chapter_index = position.chapter_index,
                chapter_count,
                "Stored chapter out of range, starting from the top"
            );
        }

        Some(position.clamped(chapter_count))
    }

    async fn read_stored(&self, document_id: &DocumentId) -> Option<ReadingPosition> {
        if self.is_degraded() {
            return None;
        }

        let key = self.key(document_id);
        let raw = match self.inner.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                self.degrade(&e);
                return None;
            }
        };

        match serde_json::from_str::<ReadingPosition>(&raw) {
            Ok(position) => Some(position),
            Err(e) => {
                let error = StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %error, "Ignoring stored reading position");
                None
            }
        }
    }

    async fn flush_key(&self, key: &str) {
        let position = {
            let mut pending = self.inner.pending.lock().await;
            pending.remove(key)
        };

        // Already written by an explicit flush
        if let Some(position) = position {
            self.write(key, &position).await;
        }
    }

    async fn write(&self, key: &str, position: &ReadingPosition) {
        if self.is_degraded() {
            return;
        }

        let value = match serde_json::to_string(position) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize reading position");
                return;
            }
        };

        match self.inner.store.set(key, &value).await {
            Ok(()) => tracing::debug!(
                key = %key,
                chapter_index = position.chapter_index,
                "Saved reading position"
            ),
            Err(e) => self.degrade(&e),
        }
    }

    fn degrade(&self, error: &StoreError) {
        if !self.inner.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                error = %error,
                "Position store unavailable, keeping positions in memory for this session"
            );
        }
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    /// Global font size and theme; defaults when the store cannot be read
    pub async fn preferences(&self) -> Preferences {
        if self.is_degraded() {
            return Preferences::default();
        }

        match Preferences::load(self.inner.store.as_ref()).await {
            Ok(prefs) => prefs,
            Err(e) => {
                self.degrade(&e);
                Preferences::default()
            }
        }
    }

    pub async fn save_preferences(&self, prefs: Preferences) {
        if self.is_degraded() {
            return;
        }

        if let Err(e) = prefs.store(self.inner.store.as_ref()).await {
            self.degrade(&e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::store::{MemoryStore, StoreResult};
    use crate::progress::types::Theme;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    const WINDOW: Duration = Duration::from_millis(500);

    /// Counts writes on top of a memory store
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for CountingStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StoreResult<()> {
            self.inner.remove(key).await
        }
    }

    /// Store that is never reachable
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }

        async fn remove(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
    }

    fn id() -> DocumentId {
        DocumentId::from_name_and_size("story.txt", 2048)
    }

    fn position(chapter_index: usize, scroll_offset: f64) -> ReadingPosition {
        ReadingPosition {
            chapter_index,
            scroll_offset,
            ..ReadingPosition::start(id())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_then_restore_after_window() {
        let store = Arc::new(MemoryStore::new());
        let manager = PositionManager::with_debounce(store.clone(), "reader:progress:", WINDOW);

        let saved = position(3, 120.5);
        manager.save(saved.clone()).await;
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

        let raw = store.get("reader:progress:story.txt_2048").await.unwrap();
        assert!(raw.is_some());

        // A fresh session only sees the store
        let reopened = PositionManager::with_debounce(store, "reader:progress:", WINDOW);
        assert_eq!(reopened.restore(&id(), 10).await, Some(saved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_in_window_coalesce() {
        let store = Arc::new(CountingStore::default());
        let manager = PositionManager::with_debounce(store.clone(), "p:", WINDOW);

        for scroll in [10.0, 20.0, 30.0] {
            manager.save(position(1, scroll)).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(WINDOW).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending_count().await, 0);

        let raw = store.get("p:story.txt_2048").await.unwrap().unwrap();
        let stored: ReadingPosition = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.scroll_offset, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let store = Arc::new(CountingStore::default());
        let manager = PositionManager::with_debounce(store.clone(), "p:", WINDOW);

        manager.save(position(2, 5.0)).await;
        assert_eq!(manager.pending_count().await, 1);
        manager.flush().await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        // The timer finds nothing left to write
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_restores_to_start() {
        let store = Arc::new(MemoryStore::new());
        let stored = serde_json::to_string(&position(5, 300.0)).unwrap();
        store.set("p:story.txt_2048", &stored).await.unwrap();

        let manager = PositionManager::with_debounce(store, "p:", WINDOW);
        let restored = manager.restore(&id(), 5).await.unwrap();
        assert_eq!(restored.chapter_index, 0);
        assert_eq!(restored.scroll_offset, 0.0);
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_values() {
        let store = Arc::new(MemoryStore::new());
        let manager = PositionManager::with_debounce(store.clone(), "p:", WINDOW);
        assert_eq!(manager.restore(&id(), 3).await, None);

        store.set("p:story.txt_2048", "{not json").await.unwrap();
        assert_eq!(manager.restore(&id(), 3).await, None);
        assert!(!manager.is_degraded());
    }

    #[tokio::test]
    async fn test_unavailable_store_degrades_to_memory() {
        let manager = PositionManager::with_debounce(Arc::new(BrokenStore), "p:", Duration::ZERO);

        assert_eq!(manager.restore(&id(), 4).await, None);
        assert!(manager.is_degraded());

        let saved = position(2, 42.0);
        manager.save(saved.clone()).await;
        assert_eq!(manager.restore(&id(), 4).await, Some(saved));
        assert_eq!(manager.preferences().await, Preferences::default());
    }

    #[tokio::test]
    async fn test_preferences_round_trip() {
        let manager = PositionManager::with_debounce(Arc::new(MemoryStore::new()), "p:", WINDOW);
        let prefs = Preferences {
            font_size: 18,
            theme: Theme::Dark,
        };
        manager.save_preferences(prefs).await;
        assert_eq!(manager.preferences().await, prefs);
    }
}
