#![deny(missing_docs)]
//! Journal keeps one Markdown file per day inside a gocryptfs volume.

/// Background-to-UI message passing.
pub mod bridge;
/// Command-line interface.
pub mod cli;
/// Config file parsing and validation.
pub mod config;
/// Date-addressed journal entries.
pub mod entries;
/// Error types.
pub mod error;
/// Secure filesystem helpers.
pub mod fs_secure;
/// Tracing subscriber setup.
pub mod logging;
/// Entry path layout.
pub mod paths;
mod process;
/// Shared types.
pub mod types;
/// Encrypted volume supervision.
pub mod volume;
