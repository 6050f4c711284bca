//! Media event loop and end-of-media resolution

use super::{core, highlight, ControllerInner};
use crate::backend::{LoadId, MediaBackend, MediaEvent, MediaEventKind};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Forward backend events for the active load into the shared state
///
/// The task holds only a weak reference and ends when the controller is
/// dropped or the backend closes its event channel.
pub(super) fn spawn_event_loop<B: MediaBackend>(inner: &Arc<ControllerInner<B>>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let mut events = inner.backend.events();

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Media event loop lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(inner) = weak.upgrade() else { break };
            if !inner.is_current(event.load_id) {
                trace!(load_id = %event.load_id, "Ignoring event from stale load");
                continue;
            }
            handle_event(&inner, event);
        }
        debug!("Media event loop stopped");
    })
}

fn handle_event<B: MediaBackend>(inner: &Arc<ControllerInner<B>>, event: MediaEvent) {
    let load_id = event.load_id;
    match event.kind {
        MediaEventKind::LoadedMetadata { duration } => {
            inner.state.update_if(|state| {
                let changed = state.duration != duration || state.is_loading;
                state.duration = duration;
                state.is_loading = false;
                changed
            });
        }
        MediaEventKind::TimeUpdate { position } => {
            highlight::on_position(inner, load_id, position);
        }
        MediaEventKind::Play => {
            inner.state.update_if(|state| {
                let changed = !state.is_playing || state.is_loading;
                state.is_playing = true;
                state.is_loading = false;
                changed
            });
        }
        MediaEventKind::Pause => {
            inner.state.update_if(|state| std::mem::replace(&mut state.is_playing, false));
        }
        MediaEventKind::Waiting => {
            inner.state.update_if(|state| !std::mem::replace(&mut state.is_loading, true));
        }
        MediaEventKind::CanPlay => {
            inner.state.update_if(|state| std::mem::replace(&mut state.is_loading, false));
        }
        MediaEventKind::CanPlayThrough => {}
        MediaEventKind::Error(kind) => {
            warn!(%load_id, "Media error: {}", kind);
            if inner.control().unready_load == Some(load_id) {
                return;
            }
            let message = kind.localized();
            inner.state.update(|state| {
                state.error = Some(message);
                state.is_loading = false;
                state.is_playing = false;
            });
        }
        MediaEventKind::Ended => {
            tokio::spawn(handle_ended(Arc::clone(inner), load_id));
        }
    }
}

/// Decide what follows the end of the current media
///
/// In order: advance to the next verse, finish a verse-by-verse run at the
/// end of the surah, repeat the current target, or simply stop.
async fn handle_ended<B: MediaBackend>(inner: Arc<ControllerInner<B>>, load_id: LoadId) {
    if !inner.is_current(load_id) {
        return;
    }

    let state = inner.state.snapshot();
    let (auto_advance, repeat) = {
        let control = inner.control();
        (control.auto_advance, control.repeat)
    };
    let edition = state
        .current_edition
        .clone()
        .unwrap_or_else(|| inner.settings.default_reciter.clone());

    match (state.current_surah_number, state.current_verse_number) {
        (Some(surah), Some(verse)) if auto_advance => {
            if inner.catalog.has_next_verse(surah, verse) {
                debug!(surah, verse = verse + 1, "Advancing to next verse");
                if let Err(e) = core::play_verse(&inner, surah, verse + 1, &edition, None).await {
                    if !e.is_superseded() {
                        warn!("Auto-advance stopped at {}:{}: {}", surah, verse + 1, e);
                        finish_verse_by_verse(&inner);
                    }
                }
            } else {
                info!(surah, "Finished verse-by-verse playback");
                finish_verse_by_verse(&inner);
            }
        }
        (Some(surah), verse) if repeat => {
            debug!(surah, verse = ?verse, "Repeating");
            let replay = match verse {
                Some(verse) => core::play_verse(&inner, surah, verse, &edition, None).await,
                None => core::play_surah(&inner, surah, &edition).await,
            };
            if let Err(e) = replay {
                if !e.is_superseded() {
                    warn!("Repeat failed: {}", e);
                }
            }
        }
        _ => {
            inner
                .state
                .update_if(|state| std::mem::replace(&mut state.is_playing, false));
        }
    }
}

fn finish_verse_by_verse<B: MediaBackend>(inner: &ControllerInner<B>) {
    inner.control().auto_advance = false;
    inner.state.update(|state| {
        state.is_playing = false;
        state.current_verse_number = None;
        state.current_word_number = None;
    });
}
