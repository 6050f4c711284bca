//! Tajik translation audio listing
//!
//! Full-surah Tajik translation recordings are not on the CDN. A small
//! listing service returns every available file as JSON; the list is cached
//! and an expired copy is served when the service cannot be reached.

use crate::error::{Error, Result};
use crate::resolver::TranslationAudioLookup;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const LIST_ENDPOINT: &str = "/list";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of a fetched listing
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// One recording from the listing
#[derive(Debug, Clone, PartialEq)]
pub struct TajikAudioFile {
    pub name: String,
    pub url: String,
    /// Parsed from the trailing digits of the file name, 0 when absent
    pub surah_number: u16,
}

/// Raw listing entry; older deployments use `filename`/`path`
#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl From<ListEntry> for TajikAudioFile {
    fn from(entry: ListEntry) -> Self {
        let name = entry
            .name
            .filter(|n| !n.is_empty())
            .or(entry.filename)
            .unwrap_or_default();
        let url = entry
            .url
            .filter(|u| !u.is_empty())
            .or(entry.path)
            .unwrap_or_default();
        let surah_number = surah_number_from_file_name(&name).unwrap_or(0);
        Self {
            name,
            url,
            surah_number,
        }
    }
}

/// `"003.mp3"` → 3, `"surah_114.mp3"` → 114
pub fn surah_number_from_file_name(name: &str) -> Option<u16> {
    let stem = name.strip_suffix(".mp3")?;
    let digits_from = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    stem[digits_from..].parse().ok()
}

/// Decode the JSON body of the listing endpoint
pub fn parse_listing(body: &str) -> Result<Vec<TajikAudioFile>> {
    let entries: Vec<ListEntry> = serde_json::from_str(body)?;
    Ok(entries.into_iter().map(TajikAudioFile::from).collect())
}

/// Pick the file for a surah: `{n:03}.mp3` or a parsed surah number match
pub fn find_surah_file(files: &[TajikAudioFile], surah: u16) -> Option<&TajikAudioFile> {
    let file_name = format!("{surah:03}.mp3");
    files
        .iter()
        .find(|f| f.name == file_name || f.surah_number == surah)
}

struct CachedListing {
    files: Vec<TajikAudioFile>,
    fetched_at: Instant,
}

/// Client for the Tajik translation audio listing
pub struct TajikAudioService {
    api_base: String,
    http_client: reqwest::Client,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedListing>>,
}

impl TajikAudioService {
    pub fn new(api_base: impl Into<String>, cache_ttl: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http_client,
            cache_ttl,
            cache: Mutex::new(None),
        })
    }

    /// Current listing, from cache while it is fresh
    pub async fn fetch_audio_files(&self) -> Result<Vec<TajikAudioFile>> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.files.clone());
            }
        }

        match self.request_listing().await {
            Ok(files) => {
                debug!(count = files.len(), "Fetched Tajik audio listing");
                *cache = Some(CachedListing {
                    files: files.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(files)
            }
            Err(e) => match cache.as_ref() {
                Some(stale) => {
                    warn!("Tajik audio listing unavailable, serving cached copy: {}", e);
                    Ok(stale.files.clone())
                }
                None => Err(e),
            },
        }
    }

    /// Drop the cached listing so the next lookup refetches
    pub async fn clear_cache(&self) {
        *self.cache.lock().await = None;
    }

    async fn request_listing(&self) -> Result<Vec<TajikAudioFile>> {
        let url = format!("{}{}", self.api_base, LIST_ENDPOINT);
        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Resolution(format!(
                "Failed to fetch audio files: HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        parse_listing(&body)
    }

    #[cfg(test)]
    async fn seed_cache(&self, files: Vec<TajikAudioFile>, age: Duration) {
        let fetched_at = Instant::now()
            .checked_sub(age)
            .unwrap_or_else(Instant::now);
        *self.cache.lock().await = Some(CachedListing { files, fetched_at });
    }
}

#[async_trait]
impl TranslationAudioLookup for TajikAudioService {
    async fn audio_url_for_surah(&self, surah: u16) -> Result<Option<String>> {
        let files = self.fetch_audio_files().await?;
        Ok(find_surah_file(&files, surah).map(|f| f.url.clone()))
    }
}
