//! # Quran Tajik Common Library
//!
//! Shared code for the Quran Tajik audio crates including:
//! - Playback state snapshot (`PlaybackState`)
//! - Canonical surah metadata (verse counts, global ayah numbering)
//! - TOML configuration loading
//! - Time conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod surah;
pub mod time;

pub use error::{Error, Result};
pub use events::PlaybackState;
pub use surah::SurahCatalog;
