//! Word-level alignment data
//!
//! Some reciters have word-by-word timestamps: for every verse a list of
//! segments `[word_start_index, word_end_index, start_ms, end_ms]` with
//! 0-based word indices. The controller uses them to highlight the word
//! being recited.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Subdirectory (or URL path) the timestamp files live under
pub const ALIGNMENT_DIR: &str = "reciters-wbw-timestamps";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One timed span of words: `[word_start, word_end, start_ms, end_ms]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSegment(pub u32, pub u32, pub f64, pub f64);

impl AlignmentSegment {
    /// 0-based index of the first word
    pub fn word_start(&self) -> u32 {
        self.0
    }

    /// 0-based index one past the last word
    pub fn word_end(&self) -> u32 {
        self.1
    }

    pub fn start_ms(&self) -> f64 {
        self.2
    }

    pub fn end_ms(&self) -> f64 {
        self.3
    }

    pub fn contains(&self, time_ms: f64) -> bool {
        time_ms >= self.start_ms() && time_ms < self.end_ms()
    }
}

/// Recognition quality counters shipped with each verse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentStats {
    #[serde(default)]
    pub deletions: Option<u32>,
    #[serde(default)]
    pub transpositions: Option<u32>,
    #[serde(default)]
    pub insertions: Option<u32>,
}

/// Alignment of a single verse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseAlignment {
    pub surah: u16,
    pub ayah: u16,
    pub segments: Vec<AlignmentSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<AlignmentStats>,
}

/// Supplies alignment data to the controller
#[async_trait]
pub trait AlignmentProvider: Send + Sync {
    /// Whether timestamps exist for this reciter at all
    fn has_alignment_data(&self, reciter: &str) -> bool;

    /// Alignment for one verse, `Ok(None)` when the file has no entry for it
    async fn alignment_for_verse(
        &self,
        reciter: &str,
        surah: u16,
        verse: u16,
    ) -> Result<Option<VerseAlignment>>;
}

/// Timestamp file for a reciter, if one is published
pub fn alignment_file_for(reciter: &str) -> Option<&'static str> {
    let file = match reciter.to_lowercase().as_str() {
        "ar.alafasy" => "Alafasy_128kbps.json",
        "ar.abdurrahmaansudais" => "Abdurrahmaan_As-Sudais_192kbps.json",
        "ar.shaatree" => "Abu_Bakr_Ash-Shaatree_128kbps.json",
        "ar.hanirifai" => "Hani_Rifai_192kbps.json",
        "ar.husary" => "Husary_64kbps.json",
        "ar.husarymujawwad" => "Husary_Muallim_128kbps.json",
        "ar.minshawimujawwad" => "Minshawy_Mujawwad_192kbps.json",
        "ar.minshawi" => "Minshawy_Murattal_128kbps.json",
        "ar.saoodshuraym" => "Saood_ash-Shuraym_128kbps.json",
        "ar.abdulbasitmurattal" => "Abdul_Basit_Murattal_64kbps.json",
        "ar.abdulbasitmujawwad" => "Abdul_Basit_Mujawwad_128kbps.json",
        "ar.mohammadaltablaway" => "Mohammad_al_Tablaway_128kbps.json",
        _ => return None,
    };
    Some(file)
}

/// 0-based index of the word being recited at `time_ms`
///
/// Matches the segment whose `[start, end)` interval contains the time.
/// Gaps, positions before the first word and after the last are `None`.
pub fn word_index_at(alignment: &VerseAlignment, time_ms: f64) -> Option<u32> {
    alignment
        .segments
        .iter()
        .find(|segment| segment.contains(time_ms))
        .map(AlignmentSegment::word_start)
}

/// 0-based alignment index to the 1-based word number used by the text
pub fn word_index_to_word_number(index: u32) -> u32 {
    index + 1
}

/// 1-based word number to 0-based alignment index
pub fn word_number_to_word_index(word_number: u32) -> Option<u32> {
    word_number.checked_sub(1)
}

/// Start of a word in seconds, used to seek to a tapped word
pub fn word_start_time(alignment: &VerseAlignment, word_number: u32) -> Option<f64> {
    let index = word_number_to_word_index(word_number)?;
    alignment
        .segments
        .iter()
        .find(|segment| segment.word_start() == index)
        .map(|segment| segment.start_ms() / 1000.0)
}

/// Where timestamp files are read from
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentSource {
    /// Local data directory containing `reciters-wbw-timestamps/`
    Directory(PathBuf),
    /// HTTP base URL serving `reciters-wbw-timestamps/`
    Http(String),
}

impl AlignmentSource {
    /// `http://` and `https://` locations are remote, anything else is a path
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            AlignmentSource::Http(location.trim_end_matches('/').to_string())
        } else {
            AlignmentSource::Directory(PathBuf::from(location))
        }
    }
}

/// Loads timestamp files and caches them per reciter
pub struct AlignmentLoader {
    source: AlignmentSource,
    http_client: reqwest::Client,
    cache: Mutex<HashMap<String, Arc<Vec<VerseAlignment>>>>,
}

impl AlignmentLoader {
    pub fn new(source: AlignmentSource) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            source,
            http_client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// All verse alignments of a reciter, loaded once
    pub async fn load_reciter(&self, reciter: &str) -> Result<Arc<Vec<VerseAlignment>>> {
        let file = alignment_file_for(reciter).ok_or_else(|| {
            Error::Alignment(format!("No alignment data available for reciter: {reciter}"))
        })?;
        let key = reciter.to_lowercase();

        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }

        let data: Vec<VerseAlignment> = match &self.source {
            AlignmentSource::Directory(dir) => {
                let path = dir.join(ALIGNMENT_DIR).join(file);
                debug!(path = %path.display(), "Reading alignment file");
                let bytes = tokio::fs::read(&path).await?;
                serde_json::from_slice(&bytes)?
            }
            AlignmentSource::Http(base) => {
                let url = format!("{base}/{ALIGNMENT_DIR}/{file}");
                debug!(url = %url, "Fetching alignment file");
                self.http_client
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?
            }
        };

        info!(reciter = %key, verses = data.len(), "Loaded alignment data");

        let data = Arc::new(data);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::clone(&data));
        }
        Ok(data)
    }

    fn cached(&self, key: &str) -> Option<Arc<Vec<VerseAlignment>>> {
        self.cache.lock().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl AlignmentProvider for AlignmentLoader {
    fn has_alignment_data(&self, reciter: &str) -> bool {
        alignment_file_for(reciter).is_some()
    }

    async fn alignment_for_verse(
        &self,
        reciter: &str,
        surah: u16,
        verse: u16,
    ) -> Result<Option<VerseAlignment>> {
        let all = self.load_reciter(reciter).await?;
        Ok(all
            .iter()
            .find(|a| a.surah == surah && a.ayah == verse)
            .cloned())
    }
}

/// Provider for setups without timestamp files; word tracking stays off
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlignmentData;

#[async_trait]
impl AlignmentProvider for NoAlignmentData {
    fn has_alignment_data(&self, _reciter: &str) -> bool {
        false
    }

    async fn alignment_for_verse(
        &self,
        _reciter: &str,
        _surah: u16,
        _verse: u16,
    ) -> Result<Option<VerseAlignment>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fatiha_1() -> VerseAlignment {
        serde_json::from_str(
            r#"{"surah":1,"ayah":1,"segments":[[0,1,0,630],[1,2,630,1270],[2,3,1400,2320],[3,4,2320,5810]]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_segment_tuple_decodes() {
        let alignment = fatiha_1();
        assert_eq!(alignment.segments.len(), 4);
        assert_eq!(alignment.segments[2].word_start(), 2);
        assert_eq!(alignment.segments[2].word_end(), 3);
        assert_eq!(alignment.segments[2].start_ms(), 1400.0);
        assert!(alignment.stats.is_none());
    }

    #[test]
    fn test_word_index_at_half_open_intervals() {
        let alignment = fatiha_1();
        assert_eq!(word_index_at(&alignment, 0.0), Some(0));
        assert_eq!(word_index_at(&alignment, 629.9), Some(0));
        assert_eq!(word_index_at(&alignment, 630.0), Some(1));
        assert_eq!(word_index_at(&alignment, 2400.0), Some(3));
    }

    #[test]
    fn test_word_index_at_gaps_and_edges() {
        let alignment = fatiha_1();
        // gap between 1270 and 1400
        assert_eq!(word_index_at(&alignment, 1300.0), None);
        assert_eq!(word_index_at(&alignment, 5810.0), None);
        assert_eq!(word_index_at(&alignment, 9000.0), None);
        assert_eq!(word_index_at(&alignment, -5.0), None);

        let empty = VerseAlignment {
            surah: 1,
            ayah: 1,
            segments: vec![],
            stats: None,
        };
        assert_eq!(word_index_at(&empty, 0.0), None);
    }

    #[test]
    fn test_word_number_conversions() {
        assert_eq!(word_index_to_word_number(0), 1);
        assert_eq!(word_number_to_word_index(1), Some(0));
        assert_eq!(word_number_to_word_index(0), None);
    }

    #[test]
    fn test_word_start_time() {
        let alignment = fatiha_1();
        assert_eq!(word_start_time(&alignment, 3), Some(1.4));
        assert_eq!(word_start_time(&alignment, 1), Some(0.0));
        assert_eq!(word_start_time(&alignment, 9), None);
    }

    #[test]
    fn test_reciter_file_map() {
        assert_eq!(alignment_file_for("ar.alafasy"), Some("Alafasy_128kbps.json"));
        assert_eq!(alignment_file_for("AR.Husary"), Some("Husary_64kbps.json"));
        assert_eq!(alignment_file_for("ar.ahmedajamy"), None);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            AlignmentSource::parse("https://www.quran.tj/data/"),
            AlignmentSource::Http("https://www.quran.tj/data".to_string())
        );
        assert_eq!(
            AlignmentSource::parse("/srv/data"),
            AlignmentSource::Directory(PathBuf::from("/srv/data"))
        );
    }

    #[tokio::test]
    async fn test_loader_reads_directory_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join(ALIGNMENT_DIR);
        std::fs::create_dir_all(&sub).unwrap();
        let file = sub.join("Husary_64kbps.json");
        std::fs::write(
            &file,
            r#"[{"surah":1,"ayah":1,"segments":[[0,1,0,500]]},
                {"surah":1,"ayah":2,"segments":[[0,1,0,400],[1,2,400,900]],"stats":{"deletions":0}}]"#,
        )
        .unwrap();

        let loader = AlignmentLoader::new(AlignmentSource::Directory(dir.path().to_path_buf())).unwrap();
        assert!(loader.has_alignment_data("ar.husary"));

        let verse = loader.alignment_for_verse("ar.husary", 1, 2).await.unwrap().unwrap();
        assert_eq!(verse.segments.len(), 2);
        assert_eq!(verse.stats.unwrap().deletions, Some(0));

        assert!(loader.alignment_for_verse("ar.husary", 1, 7).await.unwrap().is_none());

        // Served from cache once the file is gone
        std::fs::remove_file(&file).unwrap();
        assert!(loader.alignment_for_verse("ar.husary", 1, 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_loader_rejects_reciter_without_file() {
        let loader = AlignmentLoader::new(AlignmentSource::Directory(PathBuf::from("/nonexistent"))).unwrap();
        assert!(!loader.has_alignment_data("ar.ahmedajamy"));
        let err = loader.alignment_for_verse("ar.ahmedajamy", 1, 1).await.unwrap_err();
        assert!(matches!(err, Error::Alignment(_)));
    }
}
