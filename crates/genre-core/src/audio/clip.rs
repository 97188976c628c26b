use std::sync::Arc;

use super::error::{AudioError, AudioResult};

/// A decoded mono clip
///
/// Immutable once created; cloning shares the sample buffer.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioClip {
    /// Create a clip from mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> AudioResult<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidRate {
                source_rate: sample_rate,
                target_rate: sample_rate,
            });
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
