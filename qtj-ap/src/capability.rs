//! Reciter capability table
//!
//! Only some editions publish one audio file per verse. Verse-level playback
//! is gated on this table before any URL is built.

use std::collections::HashSet;

/// Reciter ids with per-verse audio on the CDN
const VERSE_BY_VERSE_RECITER_IDS: &[&str] = &[
    // 128 kbps
    "ar.ahmedajamy",
    "ar.alafasy",
    "ar.hudhaify",
    "ar.husary",
    "ar.husarymujawwad",
    "ar.mahermuaiqly",
    "ar.minshawi",
    "ar.muhammadayyoub",
    "ar.muhammadjibreel",
    "ar.shaatree",
    // 192 kbps
    "ar.abdulbasitmurattal",
    "ar.abdullahbasfar",
    "ar.abdurrahmaansudais",
    "ar.hanirifai",
    // 32 kbps
    "ar.ibrahimakhbar",
    // 64 kbps
    "ar.abdulsamad",
    "ar.aymanswoaid",
    "ar.minshawimujawwad",
    "ar.saoodshuraym",
    // Translations
    "fr.leclerc",
    "ru.kuliev-audio",
    "zh.chinese",
    "en.walk",
    "fa.hedayatfarfooladvand",
    "ur.khan",
];

/// Answers whether an edition can be played verse by verse
pub trait CapabilityChecker: Send + Sync {
    fn supports_verse_by_verse(&self, edition: &str) -> bool;
}

/// Built-in capability table plus ids flagged by reciter data
#[derive(Debug, Clone)]
pub struct ReciterCapabilities {
    verse_by_verse: HashSet<String>,
}

impl ReciterCapabilities {
    /// Table with only the built-in reciter ids
    pub fn builtin() -> Self {
        Self {
            verse_by_verse: VERSE_BY_VERSE_RECITER_IDS
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }

    /// Add ids that reciter metadata marks as having per-verse audio
    pub fn with_verse_by_verse<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.verse_by_verse
            .extend(ids.into_iter().map(|id| id.as_ref().to_lowercase()));
        self
    }

    pub fn len(&self) -> usize {
        self.verse_by_verse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verse_by_verse.is_empty()
    }
}

impl Default for ReciterCapabilities {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CapabilityChecker for ReciterCapabilities {
    fn supports_verse_by_verse(&self, edition: &str) -> bool {
        self.verse_by_verse.contains(&edition.to_lowercase())
    }
}

/// True for editions that are not Arabic recitations
pub fn is_translation(edition: &str) -> bool {
    !edition.starts_with("ar.")
}

/// True for translations that only exist as per-verse audio
pub fn is_verse_by_verse_translation(checker: &dyn CapabilityChecker, edition: &str) -> bool {
    is_translation(edition) && checker.supports_verse_by_verse(edition)
}
