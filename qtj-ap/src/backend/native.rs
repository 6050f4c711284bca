//! Native media backend
//!
//! Plays URLs through the local audio device:
//! - reqwest downloads the file
//! - a decoder thread runs symphonia and rubato, filling a frame queue at
//!   the device rate
//! - the cpal callback steps through the queue at the playback rate with
//!   linear interpolation
//! - a monitor task reports position, stalls and the end of the media
//!
//! Each load gets its own decoder thread and monitor task, both tied to an
//! epoch counter so an unload or newer load retires them.

use crate::audio::decoder::{DecodeStep, StreamDecoder};
use crate::audio::output::AudioOutput;
use crate::audio::resampler::StreamResampler;
use crate::audio::CHANNELS;
use crate::backend::{LoadId, MediaBackend, MediaErrorKind, MediaEvent, MediaEventKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Buffered output ahead of the playhead before the decoder waits
const HIGH_WATERMARK_SECS: f64 = 4.0;
/// Buffered output needed before the source reports it can play
const READY_SECS: f64 = 0.25;
/// Idle wait of the decoder thread when the queue is full or paused at EOF
const DECODER_IDLE: Duration = Duration::from_millis(10);
/// Period of position reports
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);
const EVENT_CAPACITY: usize = 256;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const DEVICE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Playback cursor shared by the controller side, decoder thread and
/// audio callback
struct Playhead {
    load_id: Option<LoadId>,
    /// Bumped on every load/unload; workers of older epochs exit
    epoch: u64,
    /// Interleaved stereo at the device rate
    queue: VecDeque<f32>,
    /// Fractional read offset into `queue`, in frames
    frac: f64,
    /// Media time of the front of `queue`, in seconds
    position: f64,
    duration: Option<f64>,
    paused: bool,
    rate: f64,
    decoding_done: bool,
    seek_request: Option<f64>,
    device_rate: u32,
}

impl Playhead {
    fn buffered_secs(&self) -> f64 {
        (self.queue.len() / CHANNELS) as f64 / self.device_rate as f64
    }

    fn at_end(&self) -> bool {
        self.decoding_done && self.queue.len() / CHANNELS < 2 && self.seek_request.is_none()
    }

    /// Read stepping only moves forward, so zero, negative and non-finite
    /// rates are refused and the current rate kept
    fn set_rate(&mut self, rate: f64) -> bool {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
            true
        } else {
            false
        }
    }

    fn clear_buffer(&mut self) {
        self.queue.clear();
        self.frac = 0.0;
    }

    /// Fill `out` (interleaved stereo) from the queue at the current rate
    fn render(&mut self, out: &mut [f32]) {
        if self.paused || self.load_id.is_none() || self.seek_request.is_some() {
            out.fill(0.0);
            return;
        }

        let frame_secs = 1.0 / self.device_rate as f64;
        for frame in out.chunks_exact_mut(CHANNELS) {
            let index = self.frac as usize;
            let base = index * CHANNELS;
            if base + 2 * CHANNELS > self.queue.len() {
                frame.fill(0.0);
                continue;
            }

            let t = (self.frac - index as f64) as f32;
            for (channel, sample) in frame.iter_mut().enumerate() {
                let a = self.queue[base + channel];
                let b = self.queue[base + CHANNELS + channel];
                *sample = a + (b - a) * t;
            }

            self.frac += self.rate;
            let whole = self.frac as usize;
            if whole > 0 {
                let drained = whole.min(self.queue.len() / CHANNELS);
                self.queue.drain(..drained * CHANNELS);
                self.frac -= drained as f64;
                self.position += drained as f64 * frame_secs;
            }
        }
    }
}

struct Shared {
    playhead: Mutex<Playhead>,
    events: broadcast::Sender<MediaEvent>,
    http: reqwest::Client,
}

impl Shared {
    fn playhead(&self) -> MutexGuard<'_, Playhead> {
        self.playhead.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emit for `load_id` if it is still the loaded source
    fn emit(&self, load_id: LoadId, epoch: u64, kind: MediaEventKind) -> bool {
        let current = {
            let playhead = self.playhead();
            playhead.epoch == epoch && playhead.load_id == Some(load_id)
        };
        if current {
            let _ = self.events.send(MediaEvent::new(load_id, kind));
        }
        current
    }

    /// Fail the current load after the output stream broke
    fn report_device_error(&self) {
        let (load_id, epoch) = {
            let mut playhead = self.playhead();
            playhead.paused = true;
            (playhead.load_id, playhead.epoch)
        };
        error!("Audio output stream failed");
        if let Some(load_id) = load_id {
            self.emit(
                load_id,
                epoch,
                MediaEventKind::Error(MediaErrorKind::Other("audio device error".to_string())),
            );
        }
    }
}

/// Handle to the audio thread owning the cpal stream
struct OutputThread {
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OutputThread {
    /// Open the device on a dedicated thread and return its sample rate
    fn spawn(shared: Arc<Shared>, device_name: Option<String>) -> Result<(Self, u32)> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("qtj-audio-output".to_string())
            .spawn(move || {
                let mut output = match AudioOutput::open(device_name.as_deref()) {
                    Ok(output) => output,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let rate = output.sample_rate();
                let render_shared = Arc::clone(&shared);
                if let Err(e) = output.start(move |out| render_shared.playhead().render(out)) {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));

                // Parked until the backend is dropped
                let mut device_failed = false;
                loop {
                    match shutdown_rx.recv_timeout(DEVICE_CHECK_INTERVAL) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            if !device_failed && output.has_error() {
                                device_failed = true;
                                shared.report_device_error();
                            }
                        }
                        _ => break,
                    }
                }
                if let Err(e) = output.stop() {
                    warn!("Failed to stop audio output: {}", e);
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let rate = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        Ok((
            Self {
                shutdown,
                handle: Some(handle),
            },
            rate,
        ))
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// [`MediaBackend`] playing through the system audio device
pub struct NativeBackend {
    shared: Arc<Shared>,
    _output: OutputThread,
}

impl NativeBackend {
    /// Open the default output device
    pub fn new() -> Result<Self> {
        Self::with_device(None)
    }

    /// Names of the output devices `with_device` accepts
    pub fn list_devices() -> Result<Vec<String>> {
        AudioOutput::list_devices()
    }

    /// Open a named output device, falling back to the default one
    pub fn with_device(device_name: Option<String>) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let http = reqwest::Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;

        let shared = Arc::new(Shared {
            playhead: Mutex::new(Playhead {
                load_id: None,
                epoch: 0,
                queue: VecDeque::new(),
                frac: 0.0,
                position: 0.0,
                duration: None,
                paused: true,
                rate: 1.0,
                decoding_done: false,
                seek_request: None,
                device_rate: 44100,
            }),
            events,
            http,
        });

        let (output, device_rate) = OutputThread::spawn(Arc::clone(&shared), device_name)?;
        shared.playhead().device_rate = device_rate;
        info!(device_rate, "Native audio backend ready");

        Ok(Self {
            shared,
            _output: output,
        })
    }
}

#[async_trait]
impl MediaBackend for NativeBackend {
    fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.shared.events.subscribe()
    }

    fn load(&self, load_id: LoadId, url: &str) {
        let epoch = {
            let mut playhead = self.shared.playhead();
            playhead.epoch += 1;
            playhead.load_id = Some(load_id);
            playhead.clear_buffer();
            playhead.position = 0.0;
            playhead.duration = None;
            playhead.paused = true;
            playhead.decoding_done = false;
            playhead.seek_request = None;
            playhead.epoch
        };

        debug!(%load_id, url = %url, "Loading source");
        tokio::spawn(fetch_and_decode(
            Arc::clone(&self.shared),
            load_id,
            epoch,
            url.to_string(),
        ));
    }

    fn unload(&self) {
        let mut playhead = self.shared.playhead();
        playhead.epoch += 1;
        playhead.load_id = None;
        playhead.clear_buffer();
        playhead.position = 0.0;
        playhead.duration = None;
        playhead.paused = true;
        playhead.decoding_done = false;
        playhead.seek_request = None;
    }

    fn has_source(&self) -> bool {
        self.shared.playhead().load_id.is_some()
    }

    async fn play(&self) -> Result<()> {
        let (load_id, epoch) = {
            let mut playhead = self.shared.playhead();
            let Some(load_id) = playhead.load_id else {
                return Err(Error::PlayRejected("no source loaded".to_string()));
            };
            if playhead.at_end() {
                playhead.seek_request = Some(0.0);
                playhead.position = 0.0;
                playhead.clear_buffer();
            }
            playhead.paused = false;
            (load_id, playhead.epoch)
        };
        self.shared.emit(load_id, epoch, MediaEventKind::Play);
        Ok(())
    }

    fn pause(&self) {
        let (load_id, epoch, was_playing) = {
            let mut playhead = self.shared.playhead();
            let was_playing = !playhead.paused;
            playhead.paused = true;
            (playhead.load_id, playhead.epoch, was_playing)
        };
        if let (Some(load_id), true) = (load_id, was_playing) {
            self.shared.emit(load_id, epoch, MediaEventKind::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        self.shared.playhead().paused
    }

    fn current_time(&self) -> f64 {
        self.shared.playhead().position
    }

    fn set_current_time(&self, seconds: f64) {
        let mut playhead = self.shared.playhead();
        if playhead.load_id.is_none() {
            return;
        }
        let target = match playhead.duration {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };
        playhead.seek_request = Some(target);
        playhead.position = target;
        playhead.clear_buffer();
    }

    fn playback_rate(&self) -> f64 {
        self.shared.playhead().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        if !self.shared.playhead().set_rate(rate) {
            warn!(rate, "Ignoring unsupported playback rate");
        }
    }
}

/// Download `url`, open the decoder and hand off to the decoder thread
async fn fetch_and_decode(shared: Arc<Shared>, load_id: LoadId, epoch: u64, url: String) {
    let bytes = match download(&shared.http, &url).await {
        Ok(bytes) => bytes,
        Err(kind) => {
            warn!(%load_id, url = %url, "Download failed: {}", kind);
            shared.emit(load_id, epoch, MediaEventKind::Error(kind));
            return;
        }
    };

    let extension = url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    let opened = tokio::task::spawn_blocking(move || StreamDecoder::open(bytes, extension.as_deref())).await;
    let decoder = match opened {
        Ok(Ok(decoder)) => decoder,
        Ok(Err(e)) => {
            shared.emit(load_id, epoch, MediaEventKind::Error(media_error_kind(&e)));
            return;
        }
        Err(e) => {
            error!("Decoder setup task failed: {}", e);
            shared.emit(load_id, epoch, MediaEventKind::Error(MediaErrorKind::Decode));
            return;
        }
    };

    if let Some(duration) = decoder.duration() {
        shared.playhead().duration = Some(duration);
        shared.emit(load_id, epoch, MediaEventKind::LoadedMetadata { duration });
    }

    let device_rate = shared.playhead().device_rate;
    let resampler = match StreamResampler::new(decoder.sample_rate(), device_rate) {
        Ok(resampler) => resampler,
        Err(e) => {
            error!("{}", e);
            shared.emit(load_id, epoch, MediaEventKind::Error(MediaErrorKind::Decode));
            return;
        }
    };

    let worker_shared = Arc::clone(&shared);
    let spawned = thread::Builder::new()
        .name(format!("qtj-decoder-{}", load_id.0))
        .spawn(move || decode_loop(worker_shared, load_id, epoch, decoder, resampler));
    if let Err(e) = spawned {
        error!("Failed to spawn decoder thread: {}", e);
        shared.emit(load_id, epoch, MediaEventKind::Error(MediaErrorKind::Other(e.to_string())));
        return;
    }

    monitor(shared, load_id, epoch).await;
}

async fn download(client: &reqwest::Client, url: &str) -> std::result::Result<Vec<u8>, MediaErrorKind> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|_| MediaErrorKind::Network)?;

    let status = response.status();
    if status.is_client_error() {
        return Err(MediaErrorKind::SourceNotSupported);
    }
    if !status.is_success() {
        return Err(MediaErrorKind::Network);
    }

    let bytes = response.bytes().await.map_err(|_| MediaErrorKind::Network)?;
    debug!(url = %url, bytes = bytes.len(), "Downloaded source");
    Ok(bytes.to_vec())
}

fn media_error_kind(err: &Error) -> MediaErrorKind {
    match err {
        Error::Media(kind) => kind.clone(),
        other => MediaErrorKind::Other(other.to_string()),
    }
}

/// Decoder thread body: keep the queue filled until the epoch changes
fn decode_loop(
    shared: Arc<Shared>,
    load_id: LoadId,
    epoch: u64,
    mut decoder: StreamDecoder,
    mut resampler: StreamResampler,
) {
    let mut announced_ready = false;

    loop {
        let (seek, idle) = {
            let mut playhead = shared.playhead();
            if playhead.epoch != epoch {
                break;
            }
            let seek = playhead.seek_request;
            let idle = seek.is_none()
                && (playhead.decoding_done || playhead.buffered_secs() >= HIGH_WATERMARK_SECS);
            if let Some(target) = seek {
                playhead.position = target;
                playhead.decoding_done = false;
            }
            (seek, idle)
        };

        if let Some(target) = seek {
            if let Err(e) = decoder.seek(target) {
                warn!(%load_id, "Seek to {:.2}s failed: {}", target, e);
            }
            resampler.reset();
            let mut playhead = shared.playhead();
            if playhead.epoch != epoch {
                break;
            }
            playhead.clear_buffer();
            if playhead.seek_request == Some(target) {
                playhead.seek_request = None;
            }
            continue;
        }

        if idle {
            thread::sleep(DECODER_IDLE);
            continue;
        }

        let (samples, done) = match decoder.next_chunk() {
            Ok(DecodeStep::Samples(samples)) => match resampler.process(&samples) {
                Ok(converted) => (converted, false),
                Err(e) => {
                    error!("{}", e);
                    shared.emit(load_id, epoch, MediaEventKind::Error(MediaErrorKind::Decode));
                    break;
                }
            },
            Ok(DecodeStep::EndOfStream) => (resampler.flush().unwrap_or_default(), true),
            Err(e) => {
                shared.emit(load_id, epoch, MediaEventKind::Error(media_error_kind(&e)));
                break;
            }
        };

        let ready_now = {
            let mut playhead = shared.playhead();
            if playhead.epoch != epoch {
                break;
            }
            // A seek arrived while this chunk was decoding; drop it
            if playhead.seek_request.is_some() {
                continue;
            }
            playhead.queue.extend(samples);
            if done {
                playhead.decoding_done = true;
            }
            !announced_ready && (done || playhead.buffered_secs() >= READY_SECS)
        };

        if ready_now {
            announced_ready = true;
            shared.emit(load_id, epoch, MediaEventKind::CanPlay);
            shared.emit(load_id, epoch, MediaEventKind::CanPlayThrough);
        }
    }

    debug!(%load_id, "Decoder thread finished");
}

/// Report position, stalls and end of media for one load
async fn monitor(shared: Arc<Shared>, load_id: LoadId, epoch: u64) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    let mut stalled = false;

    loop {
        ticker.tick().await;

        let (current, paused, position, at_end, starved) = {
            let playhead = shared.playhead();
            (
                playhead.epoch == epoch,
                playhead.paused,
                playhead.position,
                playhead.at_end(),
                !playhead.decoding_done && playhead.queue.len() / CHANNELS < 2,
            )
        };
        if !current {
            break;
        }
        if paused {
            continue;
        }

        shared.emit(load_id, epoch, MediaEventKind::TimeUpdate { position });

        if at_end {
            shared.playhead().paused = true;
            shared.emit(load_id, epoch, MediaEventKind::Pause);
            shared.emit(load_id, epoch, MediaEventKind::Ended);
            info!(%load_id, "Reached end of media");
            continue;
        }

        if starved && !stalled {
            stalled = true;
            shared.emit(load_id, epoch, MediaEventKind::Waiting);
        } else if !starved && stalled {
            stalled = false;
            shared.emit(load_id, epoch, MediaEventKind::CanPlay);
        }
    }
}
