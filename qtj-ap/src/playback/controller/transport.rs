//! Transport controls on the loaded source

use super::{core, highlight, AudioController};
use crate::backend::MediaBackend;
use crate::error::Result;
use qtj_common::PlaybackState;
use tracing::{debug, info};

impl<B: MediaBackend> AudioController<B> {
    /// True when a target has been resolved and the backend holds it
    fn has_target(&self) -> bool {
        self.inner.backend.has_source() && self.inner.state.snapshot().current_url.is_some()
    }

    /// Resume when paused, pause when playing; no-op without a source
    pub async fn toggle_play_pause(&self) -> Result<()> {
        if !self.has_target() {
            return Ok(());
        }

        let backend = &self.inner.backend;
        if backend.is_paused() {
            backend
                .play()
                .await
                .map_err(|e| core::record_failure(&self.inner, e))
        } else {
            backend.pause();
            Ok(())
        }
    }

    pub fn pause(&self) {
        if self.has_target() {
            self.inner.backend.pause();
        }
    }

    /// Stop playback and return to the initial state
    pub fn stop(&self) {
        let inner = &self.inner;
        inner.bump_generation();
        inner.control().auto_advance = false;
        highlight::stop_polling(inner);

        if inner.backend.has_source() {
            inner.backend.pause();
            inner.backend.set_current_time(0.0);
        }

        inner.state.replace(PlaybackState::default());
        debug!("Playback stopped");
    }

    /// Jump to `seconds`; the position is published without waiting for
    /// the backend. No-op without a source.
    pub fn seek_to(&self, seconds: f64) {
        if !self.has_target() {
            return;
        }
        let inner = &self.inner;
        inner.backend.set_current_time(seconds);

        let load_id = inner.control().active_load;
        highlight::on_position(inner, load_id, seconds);
    }

    /// Playback rate for the current and all later loads
    ///
    /// Stored and forwarded as given; the backend decides which rates it
    /// can honour.
    pub fn set_speed(&self, rate: f64) {
        self.inner.control().speed = rate;
        if self.inner.backend.has_source() {
            self.inner.backend.set_playback_rate(rate);
        }
    }

    pub fn speed(&self) -> f64 {
        self.inner.control().speed
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.inner.control().repeat = repeat;
    }

    pub fn repeat(&self) -> bool {
        self.inner.control().repeat
    }

    /// Move to the following surah, keeping verse or full-surah mode
    pub async fn play_next_surah(&self, edition: &str) -> Result<()> {
        let state = self.state();
        let Some(surah) = state.current_surah_number else {
            return Ok(());
        };
        let next = self.inner.catalog.next_surah(surah);
        self.play_neighbour(next, state.is_verse_mode(), edition).await
    }

    /// Move to the preceding surah, keeping verse or full-surah mode
    pub async fn play_previous_surah(&self, edition: &str) -> Result<()> {
        let state = self.state();
        let Some(surah) = state.current_surah_number else {
            return Ok(());
        };
        let previous = self.inner.catalog.previous_surah(surah);
        self.play_neighbour(previous, state.is_verse_mode(), edition).await
    }

    async fn play_neighbour(&self, surah: u16, verse_mode: bool, edition: &str) -> Result<()> {
        if verse_mode {
            core::play_verse(&self.inner, surah, 1, edition, None).await
        } else {
            core::play_surah(&self.inner, surah, edition).await
        }
    }

    /// Stop, end the background tasks and drop every listener
    pub fn shutdown(&self) {
        self.stop();
        if let Some(event_loop) = self.inner.tasks().event_loop.take() {
            event_loop.abort();
        }
        self.inner.state.clear_listeners();
        info!("Audio controller shut down");
    }
}
