//! # Quran Tajik audio player library (qtj-ap)
//!
//! Playback controller for recited Quran audio: single verses, full surahs
//! and verse-by-verse runs with automatic advance, repeat, speed control and
//! word-level highlight driven by alignment timestamps.
//!
//! **Architecture:** [`AudioController`] drives one [`MediaBackend`] and
//! publishes [`PlaybackState`] snapshots to subscribers. URL resolution,
//! reciter capabilities and alignment data are injected strategies. With the
//! `native-output` feature, [`backend::native::NativeBackend`] plays through
//! the system audio device using reqwest + symphonia + rubato + cpal.

pub mod alignment;
#[cfg(feature = "native-output")]
pub mod audio;
pub mod backend;
pub mod capability;
pub mod config;
pub mod error;
pub mod last_played;
pub mod playback;
pub mod resolver;
pub mod state;
pub mod translation_audio;

pub use backend::{LoadId, MediaBackend, MediaErrorKind, MediaEvent, MediaEventKind};
pub use error::{Error, Result};
pub use playback::{AudioController, AudioControllerBuilder};
pub use qtj_common::PlaybackState;
pub use state::{SharedState, Subscription};
