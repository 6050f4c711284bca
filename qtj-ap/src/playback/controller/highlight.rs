//! Position polling and word highlight
//!
//! While a source plays, its position is sampled on a fixed interval in
//! addition to the backend's own time updates. Each position update in
//! verse mode maps the time onto the verse alignment to find the word being
//! recited. The alignment is fetched lazily, once per load.

use super::{AlignmentSlot, ControllerInner};
use crate::alignment::{word_index_at, word_index_to_word_number};
use crate::backend::{LoadId, MediaBackend};
use std::sync::{Arc, Weak};
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub(super) fn start_polling<B: MediaBackend>(inner: &Arc<ControllerInner<B>>, load_id: LoadId) {
    let weak = Arc::downgrade(inner);
    let period = inner.settings.position_poll_interval;

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if !inner.is_current(load_id) {
                break;
            }
            if inner.backend.has_source() && !inner.backend.is_paused() {
                let position = inner.backend.current_time();
                on_position(&inner, load_id, position);
            }
        }
    });

    if let Some(previous) = inner.tasks().poller.replace(handle) {
        previous.abort();
    }
}

pub(super) fn stop_polling<B: MediaBackend>(inner: &ControllerInner<B>) {
    if let Some(poller) = inner.tasks().poller.take() {
        poller.abort();
    }
}

/// A position report from the backend or the poller
pub(super) fn on_position<B: MediaBackend>(
    inner: &Arc<ControllerInner<B>>,
    load_id: LoadId,
    position: f64,
) {
    inner.state.update_if(|state| {
        if state.position == position {
            return false;
        }
        state.position = position;
        true
    });
    update_word(inner, load_id);
}

/// Recompute the highlighted word for the active load
pub(super) fn update_word<B: MediaBackend>(inner: &Arc<ControllerInner<B>>, load_id: LoadId) {
    let snapshot = inner.state.snapshot();
    let (Some(surah), Some(verse), Some(edition)) = (
        snapshot.current_surah_number,
        snapshot.current_verse_number,
        snapshot.current_edition.as_deref(),
    ) else {
        return;
    };

    if !inner.alignment.has_alignment_data(edition) {
        publish_word(inner, None);
        return;
    }

    let alignment = {
        let mut control = inner.control();
        if control.active_load != load_id {
            return;
        }
        let slot = control.alignment.clone();
        match slot {
            AlignmentSlot::Loaded(alignment) => alignment,
            AlignmentSlot::Fetching => return,
            AlignmentSlot::Empty => {
                control.alignment = AlignmentSlot::Fetching;
                drop(control);
                spawn_fetch(inner, load_id, edition.to_string(), surah, verse);
                return;
            }
        }
    };

    // A verse missing from the alignment file leaves the word untouched
    if let Some(alignment) = alignment {
        let position_ms = qtj_common::time::seconds_to_millis(snapshot.position);
        let word = word_index_at(&alignment, position_ms).map(word_index_to_word_number);
        publish_word(inner, word);
    }
}

fn publish_word<B: MediaBackend>(inner: &ControllerInner<B>, word: Option<u32>) {
    inner.state.update_if(|state| {
        if state.current_word_number == word {
            return false;
        }
        state.current_word_number = word;
        true
    });
}

fn spawn_fetch<B: MediaBackend>(
    inner: &Arc<ControllerInner<B>>,
    load_id: LoadId,
    reciter: String,
    surah: u16,
    verse: u16,
) {
    let weak: Weak<ControllerInner<B>> = Arc::downgrade(inner);
    let provider = Arc::clone(&inner.alignment);

    tokio::spawn(async move {
        let fetched = match provider.alignment_for_verse(&reciter, surah, verse).await {
            Ok(alignment) => alignment.map(Arc::new),
            Err(e) => {
                debug!(reciter = %reciter, surah, verse, "Alignment unavailable: {}", e);
                None
            }
        };

        let Some(inner) = weak.upgrade() else { return };
        {
            let mut control = inner.control();
            if control.active_load != load_id {
                return;
            }
            control.alignment = AlignmentSlot::Loaded(fetched);
        }
        update_word(&inner, load_id);
    });
}
