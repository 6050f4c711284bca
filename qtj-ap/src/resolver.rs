//! Media URL resolution
//!
//! Per-verse and full-surah audio lives on the islamic.network CDN. The only
//! exception is the Tajik translation, whose files are listed by a separate
//! service and looked up through [`TranslationAudioLookup`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use qtj_common::SurahCatalog;
use std::sync::Arc;
use tracing::debug;

/// Edition whose full-surah audio is served outside the CDN
pub const TAJIK_TRANSLATION_EDITION: &str = "tg.akmal_mansurov";

const CDN_BASE: &str = "https://cdn.islamic.network/quran";

/// Bitrate of every full-surah file on the CDN
pub const SURAH_AUDIO_BITRATE: u32 = 128;

/// Bitrate used for per-verse files of reciters missing from the table
pub const DEFAULT_VERSE_BITRATE: u32 = 128;

/// Produces playable URLs for verse and surah targets
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// URL of a single verse recited by `reciter`
    fn verse_url(&self, surah: u16, verse: u16, reciter: &str) -> Result<String>;

    /// URL of the full surah in `edition`
    async fn surah_url(&self, surah: u16, edition: &str) -> Result<String>;
}

/// Resolves full-surah audio for editions that are not on the CDN
#[async_trait]
pub trait TranslationAudioLookup: Send + Sync {
    /// `Ok(None)` when the listing has no file for this surah
    async fn audio_url_for_surah(&self, surah: u16) -> Result<Option<String>>;
}

/// Per-verse bitrate published for a reciter
pub fn verse_by_verse_bitrate(reciter: &str) -> u32 {
    match reciter.to_lowercase().as_str() {
        "ar.abdulbasitmurattal"
        | "ar.abdullahbasfar"
        | "ar.abdurrahmaansudais"
        | "ar.hanirifai"
        | "en.walk" => 192,
        "ar.abdulsamad"
        | "ar.aymanswoaid"
        | "ar.minshawimujawwad"
        | "ar.saoodshuraym"
        | "ur.khan" => 64,
        "ar.ibrahimakhbar" => 32,
        "fa.hedayatfarfooladvand" => 40,
        _ => DEFAULT_VERSE_BITRATE,
    }
}

/// `https://cdn.islamic.network/quran/audio/{bitrate}/{reciter}/{globalAyah}.mp3`
pub fn build_verse_audio_url(
    catalog: &SurahCatalog,
    reciter: &str,
    surah: u16,
    verse: u16,
) -> Result<String> {
    let global_ayah = catalog
        .global_ayah_number(surah, verse)
        .map_err(|e| Error::InvalidInput(e.to_string()))?;
    let bitrate = verse_by_verse_bitrate(reciter);
    Ok(format!("{CDN_BASE}/audio/{bitrate}/{reciter}/{global_ayah}.mp3"))
}

/// `https://cdn.islamic.network/quran/audio-surah/128/{edition}/{surah}.mp3`
pub fn build_surah_audio_url(edition: &str, surah: u16) -> String {
    format!("{CDN_BASE}/audio-surah/{SURAH_AUDIO_BITRATE}/{edition}/{surah}.mp3")
}

/// CDN URL conventions plus an optional translation lookup
#[derive(Clone, Default)]
pub struct CdnUrlResolver {
    catalog: SurahCatalog,
    translation: Option<Arc<dyn TranslationAudioLookup>>,
}

impl CdnUrlResolver {
    pub fn new(catalog: SurahCatalog) -> Self {
        Self {
            catalog,
            translation: None,
        }
    }

    /// Route the Tajik translation edition through `lookup`
    pub fn with_translation_lookup(mut self, lookup: Arc<dyn TranslationAudioLookup>) -> Self {
        self.translation = Some(lookup);
        self
    }
}

#[async_trait]
impl UrlResolver for CdnUrlResolver {
    fn verse_url(&self, surah: u16, verse: u16, reciter: &str) -> Result<String> {
        build_verse_audio_url(&self.catalog, reciter, surah, verse)
    }

    async fn surah_url(&self, surah: u16, edition: &str) -> Result<String> {
        if edition != TAJIK_TRANSLATION_EDITION {
            return Ok(build_surah_audio_url(edition, surah));
        }

        let lookup = self.translation.as_ref().ok_or_else(|| {
            Error::Resolution(format!("no translation audio lookup configured for {edition}"))
        })?;

        match lookup.audio_url_for_surah(surah).await? {
            Some(url) => {
                debug!(surah, url = %url, "Resolved Tajik translation audio");
                Ok(url)
            }
            None => Err(Error::Resolution(format!(
                "Tajik audio not available for surah {surah}"
            ))),
        }
    }
}
