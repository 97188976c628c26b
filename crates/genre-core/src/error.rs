//! Pipeline-level error taxonomy
//!
//! Stage errors are converted into a [`PipelineError`] at the stage boundary so
//! the orchestrator can report a status instead of crashing. Nothing is retried.

use thiserror::Error;

use crate::audio::AudioError;
use crate::features::ExtractionError;
use crate::inference::InferenceError;

/// Errors surfaced by a classification attempt
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Clip could not be decoded or had an invalid sample rate
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Feature extraction failed inside the worker
    #[error("Feature extraction failed: {0}")]
    Extraction(String),

    /// Classifier missing, predict failure or malformed input/output
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Classify was requested before any clip was loaded
    #[error("No audio clip loaded")]
    NoClip,

    /// A newer clip or classify request replaced this attempt
    #[error("Classification superseded by a newer request")]
    Superseded,

    /// The caller dropped the attempt before it finished
    #[error("Classification cancelled")]
    Cancelled,

    /// The extraction worker is not running
    #[error("Extraction worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// Configuration rejected before the pipeline started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        PipelineError::Extraction(err.to_string())
    }
}

impl PipelineError {
    /// Short failure category for status display
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Audio(AudioError::InvalidRate { .. }) => "invalid-rate",
            PipelineError::Audio(_) => "decode",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::Inference(InferenceError::ClassifierUnavailable) => "classifier-unavailable",
            PipelineError::Inference(_) => "inference",
            PipelineError::NoClip => "no-clip",
            PipelineError::Superseded => "superseded",
            PipelineError::Cancelled => "cancelled",
            PipelineError::WorkerUnavailable(_) => "worker",
            PipelineError::InvalidConfig(_) => "config",
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
