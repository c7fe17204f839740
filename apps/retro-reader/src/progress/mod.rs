//! Reading progress
//!
//! Per-document reading positions plus the global font size and theme,
//! persisted in a [`KeyValueStore`].

mod manager;
mod prefs;
mod store;
mod types;

pub use manager::PositionManager;
pub use prefs::{Preferences, FONT_SIZE_KEY, THEME_KEY};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreResult};
pub use types::*;
