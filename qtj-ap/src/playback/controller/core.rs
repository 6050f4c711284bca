//! Load pipeline
//!
//! Every playback start runs the same sequence: publish the loading state,
//! tear down the previous source, load, race for readiness, play. A newer
//! request may start while any await in that sequence is pending; the older
//! call then returns [`Error::Superseded`] and leaves the state alone.

use super::{highlight, ControllerInner};
use crate::backend::{LoadId, MediaBackend};
use crate::error::{Error, Result};
use crate::playback::ready::wait_until_ready;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a load is playing
#[derive(Debug, Clone)]
pub(super) struct PlaybackTarget {
    pub(super) surah: u16,
    /// `None` for a full-surah recording
    pub(super) verse: Option<u16>,
    pub(super) edition: String,
    pub(super) url: String,
    /// Auto-advance flag to set once the target is accepted; `None` keeps it
    pub(super) auto_advance: Option<bool>,
}

/// Empty, whitespace and `"default"` editions become the configured reciter
pub(super) fn normalize_edition<B: MediaBackend>(inner: &ControllerInner<B>, edition: &str) -> String {
    let (normalized, fell_back) = inner.settings.normalize_edition(edition);
    if fell_back {
        warn!("Invalid edition \"{}\", using default: {}", edition, normalized);
    }
    normalized.to_string()
}

pub(super) async fn play_verse<B: MediaBackend>(
    inner: &Arc<ControllerInner<B>>,
    surah: u16,
    verse: u16,
    edition: &str,
    auto_advance: Option<bool>,
) -> Result<()> {
    inner
        .catalog
        .validate_verse(surah, verse)
        .map_err(|e| Error::InvalidInput(e.to_string()))?;

    let edition = normalize_edition(inner, edition);

    if !inner.capabilities.supports_verse_by_verse(&edition) {
        return Err(record_failure(inner, Error::UnsupportedEdition { edition }));
    }

    let url = match inner.resolver.verse_url(surah, verse, &edition) {
        Ok(url) => url,
        Err(e) => return Err(record_failure(inner, e)),
    };

    debug!(surah, verse, edition = %edition, url = %url, "Playing verse");

    start(
        inner,
        PlaybackTarget {
            surah,
            verse: Some(verse),
            edition,
            url,
            auto_advance,
        },
    )
    .await
}

pub(super) async fn play_surah<B: MediaBackend>(
    inner: &Arc<ControllerInner<B>>,
    surah: u16,
    edition: &str,
) -> Result<()> {
    if !inner.catalog.contains(surah) {
        return Err(Error::InvalidInput(format!(
            "surah must be between 1 and {}, got {}",
            qtj_common::surah::SURAH_COUNT,
            surah
        )));
    }

    let edition = normalize_edition(inner, edition);

    // Resolution may hit the network; a request made meanwhile wins
    let issued_at = inner.control().active_load;
    let url = match inner.resolver.surah_url(surah, &edition).await {
        Ok(url) => url,
        Err(e) if inner.is_current(issued_at) => return Err(record_failure(inner, e)),
        Err(_) => return Err(Error::Superseded),
    };
    if !inner.is_current(issued_at) {
        return Err(Error::Superseded);
    }

    debug!(surah, edition = %edition, url = %url, "Playing surah");

    start(
        inner,
        PlaybackTarget {
            surah,
            verse: None,
            edition,
            url,
            auto_advance: None,
        },
    )
    .await
}

/// Load `target` and start playing it
async fn start<B: MediaBackend>(inner: &Arc<ControllerInner<B>>, target: PlaybackTarget) -> Result<()> {
    if !target.url.starts_with("http") {
        return Err(record_failure(inner, Error::InvalidUrl(target.url)));
    }

    if let Some(auto_advance) = target.auto_advance {
        inner.control().auto_advance = auto_advance;
    }

    let already_playing = {
        let state = inner.state.snapshot();
        state.current_url.as_deref() == Some(target.url.as_str())
            && inner.backend.has_source()
            && !inner.backend.is_paused()
    };
    if already_playing {
        debug!(url = %target.url, "Already playing");
        return Ok(());
    }

    let load_id = inner.bump_generation();
    highlight::stop_polling(inner);

    inner.state.update(|state| {
        state.is_loading = true;
        state.error = None;
        state.current_surah_number = Some(target.surah);
        state.current_verse_number = target.verse;
        state.current_edition = Some(target.edition.clone());
        state.current_url = Some(target.url.clone());
        state.current_word_number = None;
        state.position = 0.0;
        state.duration = 0.0;
    });

    match load_and_play(inner, load_id, &target.url).await {
        Ok(()) => {
            info!(%load_id, url = %target.url, "Playback started");
            Ok(())
        }
        Err(e) => Err(fail_load(inner, load_id, e)),
    }
}

async fn load_and_play<B: MediaBackend>(
    inner: &Arc<ControllerInner<B>>,
    load_id: LoadId,
    url: &str,
) -> Result<()> {
    let backend = &inner.backend;

    if backend.has_source() {
        backend.pause();
        backend.unload();
        tokio::time::sleep(inner.settings.teardown_settle).await;
        ensure_current(inner, load_id)?;
    }

    let speed = inner.control().speed;
    backend.set_playback_rate(speed);

    let mut events = backend.events();
    let mut generation = inner.generation.subscribe();
    inner.control().unready_load = Some(load_id);
    backend.load(load_id, url);

    wait_until_ready(
        &mut events,
        &mut generation,
        load_id,
        inner.settings.load_timeout,
    )
    .await?;
    {
        let mut control = inner.control();
        if control.unready_load == Some(load_id) {
            control.unready_load = None;
        }
    }
    ensure_current(inner, load_id)?;

    backend.play().await?;
    ensure_current(inner, load_id)?;

    inner.state.update(|state| {
        state.is_playing = true;
        state.is_loading = false;
    });
    highlight::start_polling(inner, load_id);
    Ok(())
}

fn ensure_current<B: MediaBackend>(inner: &ControllerInner<B>, load_id: LoadId) -> Result<()> {
    if inner.is_current(load_id) {
        Ok(())
    } else {
        Err(Error::Superseded)
    }
}

/// Record a failure of the active load; stale loads only report `Superseded`
fn fail_load<B: MediaBackend>(inner: &ControllerInner<B>, load_id: LoadId, err: Error) -> Error {
    if err.is_superseded() || !inner.is_current(load_id) {
        debug!(%load_id, "Load superseded");
        return Error::Superseded;
    }
    record_failure(inner, err)
}

/// Write the localized message into the state and hand the error back
pub(super) fn record_failure<B: MediaBackend>(inner: &ControllerInner<B>, err: Error) -> Error {
    error!("Playback failed: {}", err);
    let message = err.localized();
    inner.state.update(|state| {
        state.error = Some(message);
        state.is_loading = false;
        state.is_playing = false;
    });
    err
}
