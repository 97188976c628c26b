//! Classifier boundary
//!
//! The classifier is a pure function from a `[1, frames, bands, 1]` f32 tensor
//! to one score per label. [`OrtClassifier`] runs an ONNX model through ort;
//! tests plug in stubs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use super::error::{InferenceError, Result};

/// Pretrained genre classifier
pub trait Classifier: Send + Sync {
    /// Score a `[1, frames, bands, 1]` input, one value per label
    fn predict(&self, input: &Array4<f32>) -> std::result::Result<Vec<f32>, String>;

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "classifier"
    }
}

/// ONNX Runtime classifier
///
/// `Session::run` needs `&mut self`, so the session sits behind a mutex.
pub struct OrtClassifier {
    session: Mutex<Session>,
    input_name: String,
    path: PathBuf,
}

impl OrtClassifier {
    /// Load an ONNX classifier from disk
    pub fn load(path: &Path, input_name: &str) -> Result<Self> {
        if !path.exists() {
            return Err(InferenceError::Load {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| InferenceError::Load {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        log::info!("Loaded classifier {:?} (input '{}')", path, input_name);

        Ok(Self {
            session: Mutex::new(session),
            input_name: input_name.to_string(),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Classifier for OrtClassifier {
    fn predict(&self, input: &Array4<f32>) -> std::result::Result<Vec<f32>, String> {
        let input_tensor = Tensor::from_array(input.clone())
            .map_err(|e| format!("Tensor creation error: {}", e))?;

        let mut session = lock_session(&self.session);

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| format!("Classifier run error: {}", e))?;

        let (_, scores_value) = outputs
            .iter()
            .next()
            .ok_or("Classifier produced no output")?;

        let (_shape, scores) = scores_value
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("Score extraction error: {}", e))?;

        Ok(scores.to_vec())
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Lock the session even if a previous run panicked while holding it
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide classifier handle, loaded at most once
///
/// A failed load leaves the slot empty so a later load can still succeed.
/// Once installed the classifier is never replaced.
#[derive(Default)]
pub struct ClassifierSlot {
    classifier: OnceLock<Arc<dyn Classifier>>,
}

impl ClassifierSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an already-constructed classifier
    pub fn install(&self, classifier: Arc<dyn Classifier>) -> Result<()> {
        let name = classifier.name().to_string();
        self.classifier
            .set(classifier)
            .map_err(|_| InferenceError::AlreadyLoaded)?;
        log::info!("Classifier '{}' installed", name);
        Ok(())
    }

    /// Load through `loader` unless a classifier is already present
    pub fn load_with<F>(&self, loader: F) -> Result<Arc<dyn Classifier>>
    where
        F: FnOnce() -> Result<Arc<dyn Classifier>>,
    {
        if let Some(existing) = self.classifier.get() {
            return Ok(Arc::clone(existing));
        }

        let loaded = loader().inspect_err(|e| log::error!("Classifier load failed: {}", e))?;
        // A concurrent load may have won; keep whichever landed first
        let _ = self.classifier.set(loaded);
        self.get()
    }

    /// The loaded classifier, or [`InferenceError::ClassifierUnavailable`]
    pub fn get(&self) -> Result<Arc<dyn Classifier>> {
        self.classifier
            .get()
            .cloned()
            .ok_or(InferenceError::ClassifierUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.get().is_some()
    }
}
