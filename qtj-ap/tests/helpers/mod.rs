//! Test helpers for qtj-ap integration tests
//!
//! - FakeBackend: scripted in-memory media element
//! - FixedAlignment / FixedTranslationLookup: canned data providers
//! - wait_for_state: poll the controller until a condition holds

#![allow(dead_code)]

use async_trait::async_trait;
use qtj_ap::alignment::{AlignmentProvider, AlignmentSegment, VerseAlignment};
use qtj_ap::resolver::TranslationAudioLookup;
use qtj_ap::{
    AudioController, Error, LoadId, MediaBackend, MediaErrorKind, MediaEvent, MediaEventKind,
    PlaybackState, Result,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

/// What the fake does when asked to load a URL
#[derive(Debug, Clone)]
pub enum LoadBehavior {
    /// Report metadata and readiness right away
    Ready { duration: f64 },
    /// Report a media error
    Fail(MediaErrorKind),
    /// Never report anything
    Hang,
}

/// One `load()` call as seen by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub load_id: LoadId,
    pub url: String,
    /// Playback rate in effect when the load was issued
    pub rate: f64,
}

#[derive(Debug)]
struct FakeState {
    load_id: Option<LoadId>,
    paused: bool,
    position: f64,
    rate: f64,
    script: VecDeque<LoadBehavior>,
    loads: Vec<LoadRecord>,
}

/// In-memory backend that emits its events synchronously
pub struct FakeBackend {
    state: Mutex<FakeState>,
    events: broadcast::Sender<MediaEvent>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(FakeState {
                load_id: None,
                paused: true,
                position: 0.0,
                rate: 1.0,
                script: VecDeque::new(),
                loads: Vec::new(),
            }),
            events,
        }
    }

    /// Queue behaviours for the next loads; unscripted loads are ready
    pub fn script(self, behaviors: impl IntoIterator<Item = LoadBehavior>) -> Self {
        self.lock().script.extend(behaviors);
        self
    }

    pub fn push_behavior(&self, behavior: LoadBehavior) {
        self.lock().script.push_back(behavior);
    }

    pub fn loads(&self) -> Vec<LoadRecord> {
        self.lock().loads.clone()
    }

    pub fn load_count(&self) -> usize {
        self.lock().loads.len()
    }

    pub fn current_load(&self) -> Option<LoadId> {
        self.lock().load_id
    }

    /// Play to the end of the current source
    pub fn finish(&self) {
        let load_id = {
            let mut state = self.lock();
            state.paused = true;
            state.load_id
        };
        if let Some(load_id) = load_id {
            self.emit(load_id, MediaEventKind::Pause);
            self.emit(load_id, MediaEventKind::Ended);
        }
    }

    /// Emit an event for the current source
    pub fn emit_current(&self, kind: MediaEventKind) {
        if let Some(load_id) = self.current_load() {
            self.emit(load_id, kind);
        }
    }

    pub fn emit(&self, load_id: LoadId, kind: MediaEventKind) {
        let _ = self.events.send(MediaEvent::new(load_id, kind));
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }

    fn load(&self, load_id: LoadId, url: &str) {
        let behavior = {
            let mut state = self.lock();
            state.load_id = Some(load_id);
            state.paused = true;
            state.position = 0.0;
            let rate = state.rate;
            state.loads.push(LoadRecord {
                load_id,
                url: url.to_string(),
                rate,
            });
            state
                .script
                .pop_front()
                .unwrap_or(LoadBehavior::Ready { duration: 5.0 })
        };

        match behavior {
            LoadBehavior::Ready { duration } => {
                self.emit(load_id, MediaEventKind::LoadedMetadata { duration });
                self.emit(load_id, MediaEventKind::CanPlay);
                self.emit(load_id, MediaEventKind::CanPlayThrough);
            }
            LoadBehavior::Fail(kind) => self.emit(load_id, MediaEventKind::Error(kind)),
            LoadBehavior::Hang => {}
        }
    }

    fn unload(&self) {
        let mut state = self.lock();
        state.load_id = None;
        state.paused = true;
        state.position = 0.0;
    }

    fn has_source(&self) -> bool {
        self.lock().load_id.is_some()
    }

    async fn play(&self) -> Result<()> {
        let load_id = {
            let mut state = self.lock();
            let Some(load_id) = state.load_id else {
                return Err(Error::PlayRejected("no source loaded".to_string()));
            };
            state.paused = false;
            load_id
        };
        self.emit(load_id, MediaEventKind::Play);
        Ok(())
    }

    fn pause(&self) {
        let load_id = {
            let mut state = self.lock();
            if state.paused {
                return;
            }
            state.paused = true;
            state.load_id
        };
        if let Some(load_id) = load_id {
            self.emit(load_id, MediaEventKind::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.lock().position
    }

    fn set_current_time(&self, seconds: f64) {
        self.lock().position = seconds;
    }

    fn playback_rate(&self) -> f64 {
        self.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.lock().rate = rate;
    }
}

/// Alignment provider holding one verse of one reciter
pub struct FixedAlignment {
    pub reciter: String,
    pub alignment: VerseAlignment,
}

impl FixedAlignment {
    /// `words` are `(start_ms, end_ms)` pairs for consecutive words
    pub fn new(reciter: &str, surah: u16, ayah: u16, words: &[(f64, f64)]) -> Self {
        let segments = words
            .iter()
            .enumerate()
            .map(|(index, &(start, end))| {
                AlignmentSegment(index as u32, index as u32 + 1, start, end)
            })
            .collect();
        Self {
            reciter: reciter.to_string(),
            alignment: VerseAlignment {
                surah,
                ayah,
                segments,
                stats: None,
            },
        }
    }
}

#[async_trait]
impl AlignmentProvider for FixedAlignment {
    fn has_alignment_data(&self, reciter: &str) -> bool {
        reciter == self.reciter
    }

    async fn alignment_for_verse(
        &self,
        reciter: &str,
        surah: u16,
        verse: u16,
    ) -> Result<Option<VerseAlignment>> {
        let matches = reciter == self.reciter
            && surah == self.alignment.surah
            && verse == self.alignment.ayah;
        Ok(matches.then(|| self.alignment.clone()))
    }
}

/// Wraps an alignment provider and counts verse fetches
pub struct CountingAlignment<P> {
    inner: P,
    fetches: AtomicUsize,
}

impl<P> CountingAlignment<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: AlignmentProvider> AlignmentProvider for CountingAlignment<P> {
    fn has_alignment_data(&self, reciter: &str) -> bool {
        self.inner.has_alignment_data(reciter)
    }

    async fn alignment_for_verse(
        &self,
        reciter: &str,
        surah: u16,
        verse: u16,
    ) -> Result<Option<VerseAlignment>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.alignment_for_verse(reciter, surah, verse).await
    }
}

/// Translation listing with a fixed URL per surah
pub struct FixedTranslationLookup(pub Vec<(u16, String)>);

#[async_trait]
impl TranslationAudioLookup for FixedTranslationLookup {
    async fn audio_url_for_surah(&self, surah: u16) -> Result<Option<String>> {
        Ok(self
            .0
            .iter()
            .find(|(number, _)| *number == surah)
            .map(|(_, url)| url.clone()))
    }
}

pub fn controller(backend: FakeBackend) -> AudioController<FakeBackend> {
    AudioController::new(backend)
}

/// Poll until `condition` holds, panicking after five seconds
pub async fn wait_for_state<F>(controller: &AudioController<FakeBackend>, condition: F) -> PlaybackState
where
    F: Fn(&PlaybackState) -> bool,
{
    for _ in 0..500 {
        let state = controller.state();
        if condition(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not met, last state: {:?}", controller.state());
}

/// Let spawned tasks run without advancing much time
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}
