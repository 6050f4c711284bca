//! Audio playback controller
//!
//! Drives one [`MediaBackend`] through verse and surah playback:
//! - Resolves targets to URLs and loads them, newest request wins
//! - Auto-advances verse by verse and honours repeat at end of media
//! - Tracks position and the recited word for highlighting
//! - Publishes every change to subscribed listeners
//!
//! The implementation is split by concern:
//! - `core`: load pipeline and failure handling
//! - `transport`: pause/seek/speed/stop and surah navigation
//! - `end_of_media`: media event loop and end-of-media resolution
//! - `highlight`: position polling and word tracking

mod core;
mod end_of_media;
mod highlight;
mod transport;

use crate::alignment::{AlignmentProvider, NoAlignmentData, VerseAlignment};
use crate::backend::{LoadId, MediaBackend};
use crate::capability::{CapabilityChecker, ReciterCapabilities};
use crate::config::PlayerSettings;
use crate::error::Result;
use crate::resolver::{CdnUrlResolver, UrlResolver};
use crate::state::{SharedState, Subscription};
use qtj_common::{PlaybackState, SurahCatalog};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Alignment for the verse of the active load
#[derive(Debug, Clone, Default)]
pub(super) enum AlignmentSlot {
    #[default]
    Empty,
    Fetching,
    /// `None` when the reciter's file has no entry or the fetch failed
    Loaded(Option<Arc<VerseAlignment>>),
}

/// Controller flags and bookkeeping that are not part of the published state
pub(super) struct ControlState {
    /// Most recently issued load; anything older is stale
    pub(super) active_load: LoadId,
    pub(super) auto_advance: bool,
    /// Load still in its ready race; its media errors are recorded by the
    /// load pipeline, not the event loop
    pub(super) unready_load: Option<LoadId>,
    pub(super) speed: f64,
    pub(super) repeat: bool,
    pub(super) alignment: AlignmentSlot,
}

#[derive(Default)]
pub(super) struct Tasks {
    pub(super) event_loop: Option<JoinHandle<()>>,
    pub(super) poller: Option<JoinHandle<()>>,
}

pub(super) struct ControllerInner<B: MediaBackend> {
    pub(super) backend: B,
    pub(super) resolver: Arc<dyn UrlResolver>,
    pub(super) capabilities: Arc<dyn CapabilityChecker>,
    pub(super) alignment: Arc<dyn AlignmentProvider>,
    pub(super) catalog: SurahCatalog,
    pub(super) settings: PlayerSettings,
    pub(super) state: Arc<SharedState>,
    pub(super) control: Mutex<ControlState>,
    /// Publishes `active_load` to in-flight ready races
    pub(super) generation: watch::Sender<LoadId>,
    pub(super) tasks: Mutex<Tasks>,
}

impl<B: MediaBackend> ControllerInner<B> {
    pub(super) fn control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn is_current(&self, load_id: LoadId) -> bool {
        self.control().active_load == load_id
    }

    /// Issue a new load id and announce it; older loads become stale
    pub(super) fn bump_generation(&self) -> LoadId {
        let mut control = self.control();
        let id = control.active_load.next();
        control.active_load = id;
        control.alignment = AlignmentSlot::Empty;
        self.generation.send_replace(id);
        id
    }
}

/// Handle to the playback controller
///
/// Cheap to clone; all clones drive the same backend.
pub struct AudioController<B: MediaBackend> {
    inner: Arc<ControllerInner<B>>,
}

impl<B: MediaBackend> Clone for AudioController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: MediaBackend> AudioController<B> {
    /// Controller with the CDN resolver, built-in capability table and no
    /// alignment data. Must be called inside a Tokio runtime.
    pub fn new(backend: B) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: B) -> AudioControllerBuilder<B> {
        AudioControllerBuilder::new(backend)
    }

    /// Register a state listener; it receives the current state immediately
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlaybackState) + Send + Sync + 'static,
    {
        self.inner.state.subscribe(Arc::new(listener))
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PlaybackState {
        self.inner.state.snapshot()
    }

    /// The backend this controller drives
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.inner.settings
    }

    pub fn catalog(&self) -> &SurahCatalog {
        &self.inner.catalog
    }

    /// Play a single verse
    ///
    /// An out-of-range surah or verse is a caller error: it returns
    /// `InvalidInput` before any state change and is not published to
    /// listeners. Every later failure is written into the state.
    pub async fn play_verse(&self, surah: u16, verse: u16, edition: &str) -> Result<()> {
        core::play_verse(&self.inner, surah, verse, edition, None).await
    }

    /// Play a full surah recording
    ///
    /// Range errors behave as in [`AudioController::play_verse`].
    pub async fn play_surah(&self, surah: u16, edition: &str) -> Result<()> {
        core::play_surah(&self.inner, surah, edition).await
    }

    /// Play a surah verse by verse from verse 1, advancing automatically
    ///
    /// Auto-advance is only switched on once the edition and URL have been
    /// accepted, so a rejected call leaves the current playback untouched.
    pub async fn play_surah_verse_by_verse(&self, surah: u16, edition: &str) -> Result<()> {
        let edition = core::normalize_edition(&self.inner, edition);
        core::play_verse(&self.inner, surah, 1, &edition, Some(true)).await
    }

    pub fn auto_advance(&self) -> bool {
        self.inner.control().auto_advance
    }
}

/// Builder for [`AudioController`]
pub struct AudioControllerBuilder<B: MediaBackend> {
    backend: B,
    resolver: Option<Arc<dyn UrlResolver>>,
    capabilities: Option<Arc<dyn CapabilityChecker>>,
    alignment: Option<Arc<dyn AlignmentProvider>>,
    catalog: SurahCatalog,
    settings: PlayerSettings,
}

impl<B: MediaBackend> AudioControllerBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            resolver: None,
            capabilities: None,
            alignment: None,
            catalog: SurahCatalog::standard(),
            settings: PlayerSettings::default(),
        }
    }

    pub fn resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn capabilities(mut self, capabilities: Arc<dyn CapabilityChecker>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn alignment(mut self, alignment: Arc<dyn AlignmentProvider>) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn catalog(mut self, catalog: SurahCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn settings(mut self, settings: PlayerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Spawns the media event loop, so this must run inside a Tokio runtime
    pub fn build(self) -> AudioController<B> {
        let catalog = self.catalog;
        let (generation, _) = watch::channel(LoadId::default());

        let inner = Arc::new(ControllerInner {
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(CdnUrlResolver::new(catalog))),
            capabilities: self
                .capabilities
                .unwrap_or_else(|| Arc::new(ReciterCapabilities::builtin())),
            alignment: self.alignment.unwrap_or_else(|| Arc::new(NoAlignmentData)),
            catalog,
            control: Mutex::new(ControlState {
                active_load: LoadId::default(),
                auto_advance: false,
                unready_load: None,
                speed: self.settings.playback_speed,
                repeat: self.settings.repeat,
                alignment: AlignmentSlot::Empty,
            }),
            settings: self.settings,
            state: Arc::new(SharedState::new()),
            generation,
            tasks: Mutex::new(Tasks::default()),
            backend: self.backend,
        });

        let event_loop = end_of_media::spawn_event_loop(&inner);
        inner.tasks().event_loop = Some(event_loop);

        AudioController { inner }
    }
}
