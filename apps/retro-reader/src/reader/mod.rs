//! Reader session: shelf, open document, navigation and preferences

mod controller;
mod state;
mod view;

pub use controller::{ReaderController, ReaderEvent, ReaderUpdate};
pub use state::{
    human_size, CurrentDocument, LoadState, OpenDocument, ReaderSnapshot, ReaderState,
    ShelfEntry, ShelfItem, View,
};
pub use view::{chapter_html, chapter_section, reading_progress};
