//! Audio error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while decoding or resampling a clip
#[derive(Error, Debug)]
pub enum AudioError {
    /// Clip could not be decoded
    #[error("Could not decode audio: {0}")]
    Decode(String),

    /// Clip file could not be opened
    #[error("Failed to read audio file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sample rate of zero passed to the resampler or clip constructor
    #[error("Invalid sample rate: source={source_rate}Hz, target={target_rate}Hz")]
    InvalidRate { source_rate: u32, target_rate: u32 },

    /// Resampler construction or processing failed
    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
