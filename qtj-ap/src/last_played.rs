//! Last played target persistence
//!
//! Remembers the most recent reciter/surah/verse so a front end can offer
//! "continue listening". Stored as a small JSON document.

use crate::error::Result;
use chrono::{DateTime, Utc};
use qtj_common::PlaybackState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Most recently played target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPlayed {
    pub reciter_id: String,
    pub surah_number: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse_number: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl LastPlayed {
    pub fn new(reciter_id: impl Into<String>, surah_number: u16, verse_number: Option<u16>) -> Self {
        Self {
            reciter_id: reciter_id.into(),
            surah_number,
            verse_number,
            timestamp: qtj_common::time::now(),
        }
    }

    fn same_target(&self, other: &LastPlayed) -> bool {
        self.reciter_id == other.reciter_id
            && self.surah_number == other.surah_number
            && self.verse_number == other.verse_number
    }
}

/// JSON file holding a single [`LastPlayed`] record
pub struct LastPlayedStore {
    path: PathBuf,
    last_recorded: Mutex<Option<LastPlayed>>,
}

impl LastPlayedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_recorded: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, entry: &LastPlayed) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entry)?;
        std::fs::write(&self.path, json)?;
        debug!(
            reciter = %entry.reciter_id,
            surah = entry.surah_number,
            verse = ?entry.verse_number,
            "Saved last played"
        );
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet
    pub fn load(&self) -> Result<Option<LastPlayed>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear(&self) -> Result<()> {
        if let Ok(mut last) = self.last_recorded.lock() {
            *last = None;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the state's target if it has one and it differs from the last save
    ///
    /// Returns whether a write happened. Meant to be called from a state
    /// listener, so failures are logged instead of returned.
    pub fn record_from_state(&self, state: &PlaybackState) -> bool {
        let (Some(surah), Some(edition)) = (state.current_surah_number, &state.current_edition)
        else {
            return false;
        };

        let entry = LastPlayed::new(edition.clone(), surah, state.current_verse_number);

        let Ok(mut last) = self.last_recorded.lock() else {
            return false;
        };
        if last.as_ref().is_some_and(|prev| prev.same_target(&entry)) {
            return false;
        }

        match self.save(&entry) {
            Ok(()) => {
                *last = Some(entry);
                true
            }
            Err(e) => {
                warn!("Failed to save last played to {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LastPlayedStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LastPlayedStore::new(dir.path().join("nested").join("last_played.json"));
        (dir, store)
    }

    #[test]
    fn test_save_load_clear() {
        let (_dir, store) = store();
        assert_eq!(store.load().unwrap(), None);

        let entry = LastPlayed::new("ar.husary", 36, Some(12));
        store.save(&entry).unwrap();
        assert_eq!(store.load().unwrap(), Some(entry));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_verse_is_omitted_for_full_surah() {
        let (_dir, store) = store();
        store.save(&LastPlayed::new("ar.alafasy", 2, None)).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"reciterId\""));
        assert!(!raw.contains("verseNumber"));
    }

    #[test]
    fn test_record_from_state_writes_only_on_target_change() {
        let (_dir, store) = store();
        assert!(!store.record_from_state(&PlaybackState::default()));

        let mut state = PlaybackState {
            current_surah_number: Some(1),
            current_verse_number: Some(1),
            current_edition: Some("ar.alafasy".to_string()),
            ..Default::default()
        };
        assert!(store.record_from_state(&state));

        state.position = 3.5;
        assert!(!store.record_from_state(&state));

        state.current_verse_number = Some(2);
        assert!(store.record_from_state(&state));
        assert_eq!(store.load().unwrap().unwrap().verse_number, Some(2));
    }
}
