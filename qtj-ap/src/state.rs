//! Shared playback state
//!
//! Holds the current [`PlaybackState`] and the listeners subscribed to it.
//! Every mutation goes through [`SharedState::update_if`], which publishes a
//! snapshot to all listeners after the lock is released, so a listener may
//! call back into the controller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::error;

pub use qtj_common::events::PlaybackState;

/// Callback receiving every published state snapshot
pub type StateListener = Arc<dyn Fn(&PlaybackState) + Send + Sync>;

struct Versioned {
    state: PlaybackState,
    version: u64,
}

/// Current playback state plus its subscribers
pub struct SharedState {
    current: Mutex<Versioned>,
    listeners: Mutex<Vec<(u64, StateListener)>>,
    next_listener_id: AtomicU64,
    /// Highest snapshot version handed to listeners
    published_version: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Versioned {
                state: PlaybackState::default(),
                version: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            published_version: AtomicU64::new(0),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PlaybackState {
        self.lock_current().state.clone()
    }

    /// Apply `f` and publish the result
    pub fn update(&self, f: impl FnOnce(&mut PlaybackState)) {
        self.update_if(|state| {
            f(state);
            true
        });
    }

    /// Apply `f`; publish only when it reports a change
    ///
    /// Returns what `f` returned.
    pub fn update_if(&self, f: impl FnOnce(&mut PlaybackState) -> bool) -> bool {
        let published = {
            let mut current = self.lock_current();
            if !f(&mut current.state) {
                return false;
            }
            current.version += 1;
            (current.version, current.state.clone())
        };
        let (version, snapshot) = published;
        self.publish(version, &snapshot);
        true
    }

    /// Replace the whole state
    pub fn replace(&self, state: PlaybackState) {
        self.update(|current| *current = state);
    }

    /// Register a listener; it is called with the current state right away
    pub fn subscribe(self: &Arc<Self>, listener: StateListener) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().push((id, Arc::clone(&listener)));

        let snapshot = self.snapshot();
        invoke(&listener, &snapshot);

        Subscription {
            state: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Drop every listener
    pub fn clear_listeners(&self) {
        self.lock_listeners().clear();
    }

    fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn publish(&self, version: u64, snapshot: &PlaybackState) {
        // A newer snapshot already went out from another thread
        if self.published_version.fetch_max(version, Ordering::AcqRel) > version {
            return;
        }

        let listeners: Vec<StateListener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            invoke(listener, snapshot);
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Versioned> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(u64, StateListener)>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke(listener: &StateListener, snapshot: &PlaybackState) {
    if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
        error!("Playback state listener panicked");
    }
}

/// Handle returned by [`SharedState::subscribe`]
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    state: Weak<SharedState>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(state) = self.state.upgrade() {
            state.remove_listener(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (StateListener, Arc<Mutex<Vec<PlaybackState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: StateListener = Arc::new(move |state: &PlaybackState| {
            sink.lock().unwrap().push(state.clone());
        });
        (listener, seen)
    }

    #[test]
    fn test_subscribe_delivers_current_state_immediately() {
        let state = Arc::new(SharedState::new());
        state.update(|s| s.position = 4.0);

        let (listener, seen) = recorder();
        let _sub = state.subscribe(listener);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].position, 4.0);
    }

    #[test]
    fn test_update_if_skips_unchanged() {
        let state = Arc::new(SharedState::new());
        let (listener, seen) = recorder();
        let _sub = state.subscribe(listener);

        assert!(!state.update_if(|_| false));
        assert!(state.update_if(|s| {
            s.is_loading = true;
            true
        }));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let state = Arc::new(SharedState::new());
        let (listener, seen) = recorder();
        let sub = state.subscribe(listener);
        assert_eq!(state.listener_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(state.listener_count(), 0);

        state.update(|s| s.is_playing = true);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dropping_subscription_keeps_listener() {
        let state = Arc::new(SharedState::new());
        let (listener, _seen) = recorder();
        drop(state.subscribe(listener));
        assert_eq!(state.listener_count(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let state = Arc::new(SharedState::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = state.subscribe(Arc::new(|s: &PlaybackState| {
            if s.is_playing {
                panic!("listener failure");
            }
        }));
        let counter = Arc::clone(&calls);
        let _good = state.subscribe(Arc::new(move |_: &PlaybackState| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.update(|s| s.is_playing = true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_reenter() {
        let state = Arc::new(SharedState::new());
        let inner = Arc::clone(&state);
        let _sub = state.subscribe(Arc::new(move |_: &PlaybackState| {
            let _ = inner.snapshot();
            let _ = inner.listener_count();
        }));
        state.update(|s| s.duration = 12.0);
        assert_eq!(state.snapshot().duration, 12.0);
    }

    #[test]
    fn test_replace() {
        let state = SharedState::new();
        state.update(|s| s.current_surah_number = Some(2));
        state.replace(PlaybackState::default());
        assert_eq!(state.snapshot(), PlaybackState::default());
    }
}
