//! Canonical surah metadata
//!
//! The verse-count table lives here and nowhere else. Auto-advance bounds,
//! global ayah numbering (used by the per-verse CDN URLs) and surah
//! navigation all read from [`SurahCatalog`].

use crate::{Error, Result};

/// Number of surahs in the Quran
pub const SURAH_COUNT: u16 = 114;

/// Total number of verses across all surahs
pub const TOTAL_VERSES: u32 = 6236;

/// Verse count per surah, index 0 = surah 1
const VERSES_PER_SURAH: [u16; SURAH_COUNT as usize] = [
    7, 286, 200, 176, 120, 165, 206, 75, 129, 109, 123, 111, 43, 52, 99, 128, 111, 110, 98, 135,
    112, 78, 118, 64, 77, 227, 93, 88, 69, 60, 34, 30, 73, 54, 45, 83, 182, 88, 75, 85, 54, 53,
    89, 59, 37, 35, 38, 29, 18, 45, 60, 49, 62, 55, 78, 96, 29, 22, 24, 13, 14, 11, 11, 18, 12,
    12, 30, 52, 52, 44, 28, 28, 20, 56, 40, 31, 50, 40, 46, 42, 29, 19, 36, 25, 22, 17, 19, 26,
    30, 20, 15, 21, 11, 8, 8, 19, 5, 8, 8, 11, 11, 8, 3, 9, 5, 4, 7, 3, 6, 3, 5, 4, 5, 6,
];

/// Read-only view over the surah metadata table
///
/// Cheap to copy; inject it wherever verse bounds are needed instead of
/// duplicating the table.
#[derive(Debug, Clone, Copy)]
pub struct SurahCatalog {
    verse_counts: &'static [u16; SURAH_COUNT as usize],
}

impl SurahCatalog {
    /// Catalog backed by the standard Hafs verse counts
    pub const fn standard() -> Self {
        Self {
            verse_counts: &VERSES_PER_SURAH,
        }
    }

    /// True if `surah` is in 1..=114
    pub fn contains(&self, surah: u16) -> bool {
        (1..=SURAH_COUNT).contains(&surah)
    }

    /// Number of verses in `surah`, `None` when out of range
    pub fn verse_count(&self, surah: u16) -> Option<u16> {
        if !self.contains(surah) {
            return None;
        }
        Some(self.verse_counts[surah as usize - 1])
    }

    /// Validate a (surah, verse) pair
    pub fn validate_verse(&self, surah: u16, verse: u16) -> Result<()> {
        let count = self
            .verse_count(surah)
            .ok_or_else(|| Error::InvalidInput(format!("Surah {} is outside 1..={}", surah, SURAH_COUNT)))?;

        if verse == 0 || verse > count {
            return Err(Error::InvalidInput(format!(
                "Verse {} is outside 1..={} for surah {}",
                verse, count, surah
            )));
        }
        Ok(())
    }

    /// Position of a verse counted from the start of the mushaf (1..=6236)
    ///
    /// This is the numbering the per-verse CDN files are named by.
    pub fn global_ayah_number(&self, surah: u16, verse: u16) -> Result<u32> {
        self.validate_verse(surah, verse)?;

        let preceding: u32 = self.verse_counts[..surah as usize - 1]
            .iter()
            .map(|&count| count as u32)
            .sum();

        Ok(preceding + verse as u32)
    }

    /// True if another verse follows `verse` in `surah`
    pub fn has_next_verse(&self, surah: u16, verse: u16) -> bool {
        self.verse_count(surah)
            .map(|count| verse < count)
            .unwrap_or(false)
    }

    /// Next surah number, clamped to 114
    pub fn next_surah(&self, surah: u16) -> u16 {
        surah.saturating_add(1).clamp(1, SURAH_COUNT)
    }

    /// Previous surah number, clamped to 1
    pub fn previous_surah(&self, surah: u16) -> u16 {
        surah.saturating_sub(1).clamp(1, SURAH_COUNT)
    }
}

impl Default for SurahCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
