//! Playback state snapshot shared between the controller and its consumers
//!
//! The controller replaces the whole snapshot on every change and hands
//! copies to subscribers; nothing outside the controller ever holds a live
//! reference to the state it mutates.

use serde::{Deserialize, Serialize};

/// Snapshot of the audio controller state
///
/// `current_verse_number == None` means full-surah mode. The word number is
/// only ever set in verse mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Media is currently producing audio
    pub is_playing: bool,
    /// Surah of the active target (1..=114)
    pub current_surah_number: Option<u16>,
    /// Verse of the active target, `None` for full-surah playback
    pub current_verse_number: Option<u16>,
    /// Reciter or translation edition identifier
    pub current_edition: Option<String>,
    /// Resolved media URL
    pub current_url: Option<String>,
    /// Playback position in seconds
    pub position: f64,
    /// Media duration in seconds, 0 when unknown
    pub duration: f64,
    /// A load is in progress
    pub is_loading: bool,
    /// Localized message of the last failure, cleared on the next load
    pub error: Option<String>,
    /// 1-based index of the word being recited (verse mode only)
    pub current_word_number: Option<u32>,
}

impl PlaybackState {
    /// True when playing one verse at a time
    pub fn is_verse_mode(&self) -> bool {
        self.current_verse_number.is_some()
    }

    /// True when no playback target has been resolved
    pub fn is_idle(&self) -> bool {
        self.current_url.is_none()
    }

    /// Short human-readable label for logs ("2:255", "2", "-")
    pub fn target_label(&self) -> String {
        match (self.current_surah_number, self.current_verse_number) {
            (Some(surah), Some(verse)) => format!("{}:{}", surah, verse),
            (Some(surah), None) => surah.to_string(),
            _ => "-".to_string(),
        }
    }
}
