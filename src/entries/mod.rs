//! Journal entries stored as one Markdown file per day.

/// External editor launch through tmux.
pub mod editor;
/// Gated entry CRUD and tag lookup.
pub mod repository;
/// ripgrep wrapper.
pub mod search;

pub use editor::{EditorLauncher, EditorMode};
pub use repository::EntryRepository;
pub use search::TagSearch;
