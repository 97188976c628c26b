//! Genre Core - audio-to-feature pipeline and genre inference
//!
//! Turns a decoded mono clip into a ranked probability distribution over a
//! fixed, ordered set of genre labels:
//!
//! ```text
//! samples → resample → mel spectrogram → pad/truncate → classifier → ranking
//! └──────────── extraction worker ─────────────┘   └──── caller context ───┘
//! ```
//!
//! The classifier is an opaque function from a `[1, frames, bands, 1]` tensor to
//! one score per label. Every pipeline constant must match the values the
//! classifier was trained with.

pub mod audio;
pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod pipeline;

pub use audio::AudioClip;
pub use config::Config;
pub use error::PipelineError;
pub use features::{FeatureParams, NormalizedGrid, SpectrogramGrid};
pub use inference::{Classifier, ClassifierSlot, InferenceEngine, LabelSet, ProbabilityVector, Ranking};
pub use pipeline::{ClassificationOutcome, Orchestrator, PipelineState};
