//! Inference error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur around the classifier call
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Classify requested before a classifier was loaded
    #[error("Classifier not loaded")]
    ClassifierUnavailable,

    /// Classifier could not be loaded
    #[error("Failed to load classifier from {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// A classifier is already installed
    #[error("Classifier already loaded")]
    AlreadyLoaded,

    /// Predict call failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Grid dimensions differ from the classifier input shape
    #[error("Grid shape {actual_frames}x{actual_bands} does not match expected {expected_frames}x{expected_bands}")]
    ShapeMismatch {
        expected_frames: usize,
        expected_bands: usize,
        actual_frames: usize,
        actual_bands: usize,
    },

    /// Classifier output length differs from the label set
    #[error("Classifier returned {actual} scores for {expected} labels")]
    LabelMismatch { expected: usize, actual: usize },

    /// Label list is empty or has duplicates
    #[error("Invalid label set: {0}")]
    InvalidLabels(String),

    /// Classifier artifact could not be located or downloaded
    #[error("Model unavailable: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
