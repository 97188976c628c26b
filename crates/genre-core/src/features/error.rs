//! Feature extraction error types

use thiserror::Error;

use crate::audio::AudioError;

/// Errors raised inside the extraction worker
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid feature parameters: {0}")]
    InvalidParams(String),

    #[error("Corrupt input: non-finite sample at index {index}")]
    CorruptInput { index: usize },

    #[error(transparent)]
    Resample(#[from] AudioError),

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Malformed spectrogram: {0}")]
    MalformedGrid(String),
}
