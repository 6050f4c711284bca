//! Audio output using cpal
//!
//! Opens an output device (falling back to the default device) and runs a
//! stream whose callback pulls interleaved stereo f32 from a render
//! function. `cpal::Stream` is not `Send`, so an [`AudioOutput`] must stay
//! on the thread that created it.

use crate::audio::CHANNELS;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Preferred device rate; most CDN recitations are 44.1 kHz
const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Audio device plus its running stream
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open `device_name`, or the default device when absent or not found
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let requested = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().ok().as_deref() == Some(name)),
            None => None,
        };

        let device = match (requested, device_name) {
            (Some(device), Some(name)) => {
                info!("Using requested audio device: {}", name);
                device
            }
            (_, requested_name) => {
                if let Some(name) = requested_name {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                }
                let device = host
                    .default_output_device()
                    .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
                info!(
                    "Using default audio device: {}",
                    device.name().unwrap_or_else(|_| "Unknown".to_string())
                );
                device
            }
        };

        let (config, sample_format) = Self::best_config(&device)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Prefer 44.1 kHz stereo f32, otherwise take the device default
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() as usize == CHANNELS
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            let config = config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let fallback = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((fallback.config(), fallback.sample_format()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// True once the stream has reported an error
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Start the stream; `render` fills interleaved stereo frames
    ///
    /// `render` runs on the real-time audio thread and must not block.
    pub fn start<F>(&mut self, render: F) -> Result<()>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, F>(render)?,
            SampleFormat::I16 => self.build_stream::<i16, F>(render)?,
            SampleFormat::U16 => self.build_stream::<u16, F>(render)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);
        info!("Audio stream started on {}", self.device_name());
        Ok(())
    }

    fn build_stream<T, F>(&self, mut render: F) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let device_channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut scratch: Vec<f32> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / device_channels;
                    scratch.resize(frames * CHANNELS, 0.0);
                    render(&mut scratch);

                    for (out, stereo) in data
                        .chunks_mut(device_channels)
                        .zip(scratch.chunks_exact(CHANNELS))
                    {
                        for (channel, sample) in out.iter_mut().enumerate() {
                            let value = stereo[channel.min(CHANNELS - 1)].clamp(-1.0, 1.0);
                            *sample = T::from_sample(value);
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Pause and drop the stream
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            info!("Audio stream stopped");
        }
        Ok(())
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop audio stream: {}", e);
        }
    }
}
