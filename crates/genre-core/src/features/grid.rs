//! Spectrogram grid types
//!
//! Both grids are frame-major: `frames[t][band]`.

use serde::{Deserialize, Serialize};

use super::error::ExtractionError;

/// Log-compressed mel spectrogram with a variable number of frames
///
/// Every frame has exactly `n_bands` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrogramGrid {
    frames: Vec<Vec<f32>>,
    n_bands: usize,
}

impl SpectrogramGrid {
    /// Empty grid (zero frames) with the given band count
    pub fn empty(n_bands: usize) -> Self {
        Self {
            frames: Vec::new(),
            n_bands,
        }
    }

    /// Build a grid from frames, checking every frame has `n_bands` values
    pub fn from_frames(frames: Vec<Vec<f32>>, n_bands: usize) -> Result<Self, ExtractionError> {
        if let Some((idx, frame)) = frames.iter().enumerate().find(|(_, f)| f.len() != n_bands) {
            return Err(ExtractionError::MalformedGrid(format!(
                "frame {} has {} bands, expected {}",
                idx,
                frame.len(),
                n_bands
            )));
        }
        Ok(Self { frames, n_bands })
    }

    pub(crate) fn with_capacity(n_frames: usize, n_bands: usize) -> Self {
        Self {
            frames: Vec::with_capacity(n_frames),
            n_bands,
        }
    }

    pub(crate) fn push_frame(&mut self, frame: Vec<f32>) {
        debug_assert_eq!(frame.len(), self.n_bands);
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bands(&self) -> usize {
        self.n_bands
    }

    pub(crate) fn into_frames(self) -> Vec<Vec<f32>> {
        self.frames
    }
}

/// Spectrogram forced to the classifier's fixed frame count
///
/// Only produced by [`normalize_frames`](super::normalize_frames). Grids that
/// arrive from another process are re-checked by the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGrid {
    frames: Vec<Vec<f32>>,
    n_bands: usize,
    /// Real frames before padding/truncation
    source_frames: usize,
}

impl NormalizedGrid {
    pub(crate) fn from_parts(frames: Vec<Vec<f32>>, n_bands: usize, source_frames: usize) -> Self {
        Self {
            frames,
            n_bands,
            source_frames,
        }
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bands(&self) -> usize {
        self.n_bands
    }

    /// Number of frames computed from audio (the rest is padding)
    pub fn source_frames(&self) -> usize {
        self.source_frames
    }

    /// Row-major copy of all values
    pub fn to_flat(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.frames.len() * self.n_bands);
        for frame in &self.frames {
            flat.extend_from_slice(frame);
        }
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frames_rejects_ragged() {
        let result = SpectrogramGrid::from_frames(vec![vec![0.0; 4], vec![0.0; 3]], 4);
        assert!(matches!(result, Err(ExtractionError::MalformedGrid(_))));
    }

    #[test]
    fn test_to_flat_is_frame_major() {
        let grid = NormalizedGrid::from_parts(vec![vec![1.0, 2.0], vec![3.0, 4.0]], 2, 2);
        assert_eq!(grid.to_flat(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
