//! Streaming decoder using symphonia
//!
//! Decodes an in-memory compressed file packet by packet into interleaved
//! stereo f32. Mono sources are duplicated to both channels; sources with
//! more than two channels keep the first two.

use crate::audio::CHANNELS;
use crate::backend::MediaErrorKind;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Consecutive packet decode failures tolerated before giving up
const MAX_DECODE_ERRORS: u32 = 16;

/// Result of decoding one packet
pub enum DecodeStep {
    /// Interleaved stereo samples (possibly empty for metadata packets)
    Samples(Vec<f32>),
    EndOfStream,
}

/// Packet-level decoder over a downloaded file
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    duration: Option<f64>,
    sample_buf: Option<SampleBuffer<f32>>,
    consecutive_errors: u32,
}

impl StreamDecoder {
    /// Probe `bytes` and prepare the default audio track
    ///
    /// `extension` is a format hint such as `"mp3"`.
    pub fn open(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| {
                warn!("Failed to probe format: {}", e);
                Error::Media(MediaErrorKind::SourceNotSupported)
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(Error::Media(MediaErrorKind::SourceNotSupported))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Media(MediaErrorKind::Other("sample rate not found".to_string())))?;
        let duration = params.n_frames.map(|frames| frames as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                warn!("Failed to create decoder: {}", e);
                Error::Media(MediaErrorKind::SourceNotSupported)
            })?;

        debug!(sample_rate, duration = ?duration, "Opened audio stream");

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            duration,
            sample_buf: None,
            consecutive_errors: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total length in seconds when the container reports it
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Decode the next packet of the selected track
    pub fn next_chunk(&mut self) -> Result<DecodeStep> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(DecodeStep::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    return Ok(DecodeStep::EndOfStream);
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.consecutive_errors = 0;
                    let spec = *decoded.spec();
                    let source_channels = spec.channels.count();

                    let needed = decoded.capacity() * source_channels;
                    if self.sample_buf.as_ref().is_some_and(|b| b.capacity() < needed) {
                        self.sample_buf = None;
                    }
                    let buf = self
                        .sample_buf
                        .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
                    buf.copy_interleaved_ref(decoded);

                    return Ok(DecodeStep::Samples(to_stereo(buf.samples(), source_channels)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    self.consecutive_errors += 1;
                    warn!("Decode error: {}", e);
                    if self.consecutive_errors > MAX_DECODE_ERRORS {
                        return Err(Error::Media(MediaErrorKind::Decode));
                    }
                }
                Err(e) => {
                    warn!("Fatal decode error: {}", e);
                    return Err(Error::Media(MediaErrorKind::Decode));
                }
            }
        }
    }

    /// Reposition to `seconds`; the next chunk starts there
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        let seconds = seconds.max(0.0);
        let time = Time::new(seconds.trunc() as u64, seconds.fract());
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Media(MediaErrorKind::Other(format!("seek failed: {}", e))))?;
        self.decoder.reset();
        Ok(())
    }
}

/// Interleaved samples with `channels` channels to interleaved stereo
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        CHANNELS => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}
