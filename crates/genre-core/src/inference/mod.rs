//! Classifier inference and result ranking
//!
//! - **Classifier** (`classifier.rs`): the opaque tensor → scores boundary, its
//!   ONNX Runtime implementation and the load-once handle
//! - **Engine** (`engine.rs`): shape checks, tensor construction and release
//! - **Ranking** (`ranking.rs`): label set, sorted ranking, top-K view
//! - **Models** (`models.rs`): locate or download the classifier artifact

mod classifier;
mod engine;
mod error;
pub mod models;
mod ranking;

pub use classifier::{Classifier, ClassifierSlot, OrtClassifier};
pub use engine::{InferenceEngine, ProbabilityVector};
pub use error::InferenceError;
pub use models::ModelStore;
pub use ranking::{rank, LabelSet, RankedEntry, Ranking, TopEntry, GTZAN_GENRES};
