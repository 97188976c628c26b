//! Inference engine
//!
//! Checks the grid against the classifier's input shape, builds the
//! `[1, frames, bands, 1]` tensor, calls the classifier and checks the output
//! length against the label set. The input tensor lives in a [`TensorScope`]
//! that is released before the result is inspected, on every exit path.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use super::classifier::ClassifierSlot;
use super::error::{InferenceError, Result};
use super::ranking::LabelSet;
use crate::features::NormalizedGrid;

/// Raw classifier scores, one per label, in label order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityVector {
    scores: Vec<f32>,
}

impl ProbabilityVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Input tensor tracked for the duration of one predict call
struct TensorScope {
    tensor: Array4<f32>,
    live: Arc<AtomicUsize>,
}

impl TensorScope {
    fn new(tensor: Array4<f32>, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            tensor,
            live: Arc::clone(live),
        }
    }
}

impl Drop for TensorScope {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wraps the classifier call for a fixed input shape and label set
pub struct InferenceEngine {
    classifiers: Arc<ClassifierSlot>,
    labels: LabelSet,
    frame_count: usize,
    n_bands: usize,
    live_tensors: Arc<AtomicUsize>,
}

impl InferenceEngine {
    pub fn new(
        classifiers: Arc<ClassifierSlot>,
        labels: LabelSet,
        frame_count: usize,
        n_bands: usize,
    ) -> Self {
        Self {
            classifiers,
            labels,
            frame_count,
            n_bands,
            live_tensors: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Whether a classifier has been installed
    pub fn is_ready(&self) -> bool {
        self.classifiers.is_loaded()
    }

    /// Input tensors currently alive (0 whenever no predict call is running)
    pub fn live_tensors(&self) -> usize {
        self.live_tensors.load(Ordering::SeqCst)
    }

    /// Run the classifier on a normalized grid
    pub fn predict(&self, grid: &NormalizedGrid) -> Result<ProbabilityVector> {
        let classifier = self.classifiers.get()?;
        self.check_shape(grid)?;

        let tensor = Array4::from_shape_vec(
            (1, self.frame_count, self.n_bands, 1),
            grid.to_flat(),
        )
        .map_err(|e| InferenceError::Inference(format!("Input shape error: {}", e)))?;
        let scope = TensorScope::new(tensor, &self.live_tensors);

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| classifier.predict(&scope.tensor)));
        drop(scope);

        let scores = match outcome {
            Ok(Ok(scores)) => scores,
            Ok(Err(message)) => return Err(InferenceError::Inference(message)),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return Err(InferenceError::Inference(format!(
                    "Classifier '{}' panicked: {}",
                    classifier.name(),
                    message
                )));
            }
        };

        log::debug!(
            "Classifier '{}' returned {} scores in {:.1}ms",
            classifier.name(),
            scores.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        if scores.len() != self.labels.len() {
            return Err(InferenceError::LabelMismatch {
                expected: self.labels.len(),
                actual: scores.len(),
            });
        }

        if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
            return Err(InferenceError::Inference(format!(
                "Classifier '{}' returned a non-finite score at index {}",
                classifier.name(),
                index
            )));
        }

        Ok(ProbabilityVector::new(scores))
    }

    fn check_shape(&self, grid: &NormalizedGrid) -> Result<()> {
        let ragged = grid.frames().iter().find(|f| f.len() != self.n_bands);
        if grid.frame_count() != self.frame_count || grid.n_bands() != self.n_bands || ragged.is_some() {
            return Err(InferenceError::ShapeMismatch {
                expected_frames: self.frame_count,
                expected_bands: self.n_bands,
                actual_frames: grid.frame_count(),
                actual_bands: ragged.map_or(grid.n_bands(), |f| f.len()),
            });
        }
        Ok(())
    }
}
