//! Global reader preferences

use serde::{Deserialize, Serialize};

use super::store::{KeyValueStore, StoreResult};
use super::types::{clamp_font_size, Theme, DEFAULT_FONT_SIZE};

pub const FONT_SIZE_KEY: &str = "reader:font-size";
pub const THEME_KEY: &str = "reader:theme";

/// Font size and theme shared by every document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub font_size: u8,
    pub theme: Theme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            theme: Theme::default(),
        }
    }
}

impl Preferences {
    /// Read both keys; missing or unparsable values fall back to defaults
    pub async fn load(store: &dyn KeyValueStore) -> StoreResult<Self> {
        let defaults = Self::default();

        let font_size = store
            .get(FONT_SIZE_KEY)
            .await?
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .filter(|size| *size > 0)
            .map(clamp_font_size)
            .unwrap_or(defaults.font_size);

        let theme = store
            .get(THEME_KEY)
            .await?
            .and_then(|raw| Theme::parse(&raw))
            .unwrap_or(defaults.theme);

        Ok(Self { font_size, theme })
    }

    pub async fn store(&self, store: &dyn KeyValueStore) -> StoreResult<()> {
        store
            .set(FONT_SIZE_KEY, &self.font_size.to_string())
            .await?;
        store.set(THEME_KEY, self.theme.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::store::MemoryStore;

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let store = MemoryStore::new();
        assert_eq!(Preferences::load(&store).await.unwrap(), Preferences::default());
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let store = MemoryStore::new();
        let prefs = Preferences {
            font_size: 22,
            theme: Theme::Sepia,
        };
        prefs.store(&store).await.unwrap();

        assert_eq!(store.get(FONT_SIZE_KEY).await.unwrap().as_deref(), Some("22"));
        assert_eq!(Preferences::load(&store).await.unwrap(), prefs);
    }

    #[tokio::test]
    async fn test_bad_values_fall_back() {
        let store = MemoryStore::new();
        store.set(FONT_SIZE_KEY, "huge").await.unwrap();
        store.set(THEME_KEY, "neon").await.unwrap();
        assert_eq!(Preferences::load(&store).await.unwrap(), Preferences::default());

        store.set(FONT_SIZE_KEY, "80").await.unwrap();
        assert_eq!(Preferences::load(&store).await.unwrap().font_size, 36);
    }
}
