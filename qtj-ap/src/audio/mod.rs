//! Native audio pipeline: symphonia decode, rubato resample, cpal output

pub mod decoder;
pub mod output;
pub mod resampler;

/// Interleaved channel count used throughout the pipeline
pub const CHANNELS: usize = 2;
