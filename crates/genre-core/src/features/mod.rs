//! Mel spectrogram feature pipeline
//!
//! Runs inside the extraction worker:
//!
//! 1. Resample to the target rate
//! 2. Short-time mel band energies, log-compressed (`10 * log10(e + eps)`)
//! 3. Pad or truncate to the classifier's fixed frame count

mod error;
mod grid;
mod mel;
mod normalize;

use serde::{Deserialize, Serialize};

use crate::audio::resample;

pub use error::ExtractionError;
pub use grid::{NormalizedGrid, SpectrogramGrid};
pub use mel::{log_compress, MelExtractor};
pub use normalize::normalize_frames;

/// Floor of the log-compressed scale for the default epsilon (`10 * log10(1e-6)`)
pub const SILENCE_FLOOR_DB: f32 = -60.0;

/// Feature pipeline constants
///
/// These must match the values the classifier was trained with; nothing is
/// negotiated with the model at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Sample rate the spectrogram is computed at (Hz)
    pub target_rate: u32,
    /// Number of mel bands (grid columns)
    pub mel_bands: usize,
    /// Fixed number of frames the classifier accepts (grid rows)
    pub frame_count: usize,
    /// STFT window length in samples
    pub frame_size: usize,
    /// STFT hop in samples
    pub hop_size: usize,
    /// Numerical floor added before the log
    pub log_epsilon: f32,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            target_rate: 22050,
            mel_bands: 64,
            frame_count: 96,
            frame_size: 2048,
            hop_size: 1024,
            log_epsilon: 1e-6,
        }
    }
}

impl FeatureParams {
    /// Reject parameter sets the extractor cannot run with
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.target_rate == 0 {
            return Err(ExtractionError::InvalidParams("target_rate must be positive".into()));
        }
        if self.mel_bands == 0 || self.frame_count == 0 {
            return Err(ExtractionError::InvalidParams(
                "mel_bands and frame_count must be positive".into(),
            ));
        }
        if self.frame_size < 2 || self.hop_size == 0 {
            return Err(ExtractionError::InvalidParams(
                "frame_size must be at least 2 and hop_size positive".into(),
            ));
        }
        if self.hop_size > self.frame_size {
            return Err(ExtractionError::InvalidParams(format!(
                "hop_size {} exceeds frame_size {}",
                self.hop_size, self.frame_size
            )));
        }
        if !(self.log_epsilon.is_finite() && self.log_epsilon > 0.0) {
            return Err(ExtractionError::InvalidParams("log_epsilon must be positive".into()));
        }
        Ok(())
    }

    /// Padding value for missing frames, identical to the log of pure silence
    pub fn padding_floor(&self) -> f32 {
        log_compress(0.0, self.log_epsilon)
    }
}

/// Run the full extraction chain on one clip
pub fn extract_normalized(
    samples: &[f32],
    source_rate: u32,
    params: &FeatureParams,
) -> Result<NormalizedGrid, ExtractionError> {
    params.validate()?;

    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(ExtractionError::CorruptInput { index });
    }

    let resampled = resample(samples, source_rate, params.target_rate)?;
    let extractor = MelExtractor::new(params)?;
    let grid = extractor.compute(&resampled)?;

    Ok(normalize_frames(grid, params.frame_count, params.padding_floor()))
}
