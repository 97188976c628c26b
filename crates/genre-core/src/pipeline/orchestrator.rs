//! Classification state machine
//!
//! ```text
//! Idle ─load─► AudioReady ─classify─► Extracting ─grid─► Classifying ─► ResultsReady
//!                  ▲                      │                   │
//!                  └──────load──── Error ◄┴───────────────────┘
//! ```
//!
//! The orchestrator never holds its lock across an await. Each `load_clip` and
//! each `classify` takes a new generation; a classify attempt that finds a newer
//! generation when it resumes returns [`PipelineError::Superseded`] and leaves
//! the state alone (last request wins). Dropping a `classify` future before it
//! completes ends the attempt in `Error` with [`PipelineError::Cancelled`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use super::protocol::{ExtractionRequest, ExtractionResponse};
use super::worker::{ExtractionHandle, ExtractionService};
use crate::audio::{decode_file, AudioClip, AudioError};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::features::FeatureParams;
use crate::inference::{rank, ClassifierSlot, InferenceEngine, InferenceError, Ranking, TopEntry};

/// Pipeline state as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// No clip loaded
    Idle,
    /// Clip loaded, nothing classified yet
    AudioReady,
    /// Worker is computing the grid
    Extracting,
    /// Classifier is running
    Classifying,
    /// Last attempt succeeded; see [`Orchestrator::outcome`]
    ResultsReady,
    /// Last attempt failed with this status message
    Error(String),
}

impl PipelineState {
    pub fn is_busy(&self) -> bool {
        matches!(self, PipelineState::Extracting | PipelineState::Classifying)
    }
}

/// Result of one successful classification attempt
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationOutcome {
    /// Highest-scoring label
    pub predicted: String,
    /// Score of the predicted label as a percentage
    pub confidence: f32,
    /// First K entries for display
    pub top: Vec<TopEntry>,
    pub ranking: Ranking,
    /// Spectrogram frames computed from audio before padding/truncation
    pub source_frames: usize,
    pub extraction_ms: f64,
    pub inference_ms: f64,
}

struct Inner {
    state: PipelineState,
    clip: Option<AudioClip>,
    generation: u64,
    outcome: Option<ClassificationOutcome>,
}

/// Sequences extraction (worker) and inference (caller context)
pub struct Orchestrator {
    params: FeatureParams,
    top_k: usize,
    engine: InferenceEngine,
    worker: ExtractionHandle,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    /// Validate configuration and start the extraction worker
    pub fn new(config: &Config, classifiers: Arc<ClassifierSlot>) -> Result<Self> {
        config
            .pipeline
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        let labels = config
            .label_set()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let params = config.pipeline.clone();
        let engine = InferenceEngine::new(classifiers, labels, params.frame_count, params.mel_bands);
        let worker = ExtractionService::spawn(config.worker.isolation);

        Ok(Self {
            params,
            top_k: config.display.top_k,
            engine,
            worker,
            inner: Mutex::new(Inner {
                state: PipelineState::Idle,
                clip: None,
                generation: 0,
                outcome: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PipelineState {
        self.lock().state.clone()
    }

    /// Outcome of the last successful attempt, cleared by a new clip or attempt
    pub fn outcome(&self) -> Option<ClassificationOutcome> {
        self.lock().outcome.clone()
    }

    pub fn clip(&self) -> Option<AudioClip> {
        self.lock().clip.clone()
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Make `clip` current, superseding any attempt in flight
    pub fn load_clip(&self, clip: AudioClip) {
        log::info!(
            "Clip loaded: {} samples at {} Hz ({:.2}s)",
            clip.len(),
            clip.sample_rate(),
            clip.duration_secs()
        );
        let mut inner = self.lock();
        inner.generation += 1;
        inner.clip = Some(clip);
        inner.outcome = None;
        inner.state = PipelineState::AudioReady;
    }

    /// Decode a file off the async runtime and load it
    ///
    /// On failure the current state and clip are left untouched.
    pub async fn open(&self, path: &Path) -> Result<AudioClip> {
        let owned = path.to_path_buf();
        let clip = tokio::task::spawn_blocking(move || decode_file(&owned))
            .await
            .map_err(|e| AudioError::Decode(format!("decode task failed: {}", e)))?
            .inspect_err(|e| log::warn!("Failed to open {:?}: {}", path, e))?;

        self.load_clip(clip.clone());
        Ok(clip)
    }

    /// Classify the current clip
    pub async fn classify(&self) -> Result<ClassificationOutcome> {
        if !self.engine.is_ready() {
            log::warn!("Classify requested before a classifier was loaded");
            return Err(InferenceError::ClassifierUnavailable.into());
        }

        let (clip, generation) = {
            let mut inner = self.lock();
            let clip = inner.clip.clone().ok_or(PipelineError::NoClip)?;
            inner.generation += 1;
            inner.outcome = None;
            inner.state = PipelineState::Extracting;
            (clip, inner.generation)
        };
        let _attempt = AttemptGuard {
            orchestrator: self,
            generation,
        };

        let extraction_start = Instant::now();
        let request = ExtractionRequest::new(clip.samples().to_vec(), clip.sample_rate(), self.params.clone());
        let response = self.worker.extract(request).await;
        let extraction_ms = extraction_start.elapsed().as_secs_f64() * 1000.0;

        let grid = {
            let mut inner = self.lock();
            if inner.generation != generation {
                log::info!("Classification attempt {} superseded during extraction", generation);
                return Err(PipelineError::Superseded);
            }
            let grid = match response {
                Ok(ExtractionResponse::Ok { grid }) => Ok(grid),
                Ok(ExtractionResponse::Error { message }) => Err(PipelineError::Extraction(message)),
                Err(e) => Err(e),
            };
            match grid {
                Ok(grid) => {
                    inner.state = PipelineState::Classifying;
                    grid
                }
                Err(e) => return Err(Self::fail(&mut inner, e)),
            }
        };

        if grid.source_frames() < self.params.frame_count {
            log::debug!(
                "Padded {} frames to {} at {} dB",
                grid.source_frames(),
                self.params.frame_count,
                self.params.padding_floor()
            );
        } else if grid.source_frames() > self.params.frame_count {
            log::debug!("Truncated {} frames to {}", grid.source_frames(), self.params.frame_count);
        }

        let inference_start = Instant::now();
        let ranking = self
            .engine
            .predict(&grid)
            .and_then(|probs| rank(&probs, self.engine.labels()));
        let inference_ms = inference_start.elapsed().as_secs_f64() * 1000.0;

        let mut inner = self.lock();
        if inner.generation != generation {
            log::info!("Classification attempt {} superseded during inference", generation);
            return Err(PipelineError::Superseded);
        }
        let ranking = match ranking {
            Ok(ranking) => ranking,
            Err(e) => return Err(Self::fail(&mut inner, e.into())),
        };

        let Some(best) = ranking.predicted() else {
            let err = InferenceError::InvalidLabels("empty ranking".into());
            return Err(Self::fail(&mut inner, err.into()));
        };
        let outcome = ClassificationOutcome {
            predicted: best.label.clone(),
            confidence: best.score * 100.0,
            top: ranking.top_k(self.top_k),
            source_frames: grid.source_frames(),
            ranking,
            extraction_ms,
            inference_ms,
        };

        log::info!(
            "Predicted '{}' ({:.1}%) - extraction {:.1}ms, inference {:.1}ms",
            outcome.predicted,
            outcome.confidence,
            extraction_ms,
            inference_ms
        );

        inner.outcome = Some(outcome.clone());
        inner.state = PipelineState::ResultsReady;
        Ok(outcome)
    }

    fn fail(inner: &mut Inner, err: PipelineError) -> PipelineError {
        log::warn!("Classification failed ({}): {}", err.category(), err);
        inner.outcome = None;
        inner.state = PipelineState::Error(err.to_string());
        err
    }
}

/// Ends an abandoned attempt so the state never stays busy
///
/// Normal exits leave the state terminal or the generation stale before the
/// guard drops, which makes it a no-op.
struct AttemptGuard<'a> {
    orchestrator: &'a Orchestrator,
    generation: u64,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.orchestrator.lock();
        if inner.generation == self.generation && inner.state.is_busy() {
            log::info!("Classification attempt {} cancelled", self.generation);
            inner.outcome = None;
            inner.state = PipelineState::Error(PipelineError::Cancelled.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::SILENCE_FLOOR_DB;
    use crate::inference::Classifier;
    use ndarray::Array4;
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    /// Returns fixed scores and remembers whether every input value was at the floor
    struct Stub {
        scores: Vec<f32>,
        saw_only_floor: Mutex<Option<bool>>,
    }

    impl Stub {
        fn rock() -> Arc<Self> {
            let mut scores = vec![0.1; 9];
            scores.push(0.9);
            Arc::new(Self {
                scores,
                saw_only_floor: Mutex::new(None),
            })
        }
    }

    impl Classifier for Stub {
        fn predict(&self, input: &Array4<f32>) -> std::result::Result<Vec<f32>, String> {
            *self.saw_only_floor.lock().unwrap() = Some(input.iter().all(|&v| v == SILENCE_FLOOR_DB));
            Ok(self.scores.clone())
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn predict(&self, _input: &Array4<f32>) -> std::result::Result<Vec<f32>, String> {
            Err("session closed".into())
        }
    }

    /// Loads a new clip while it is being asked to predict
    struct Interrupting {
        orchestrator: OnceLock<Weak<Orchestrator>>,
        replacement: AudioClip,
    }

    impl Classifier for Interrupting {
        fn predict(&self, _input: &Array4<f32>) -> std::result::Result<Vec<f32>, String> {
            if let Some(orchestrator) = self.orchestrator.get().and_then(Weak::upgrade) {
                orchestrator.load_clip(self.replacement.clone());
            }
            Ok(vec![0.1; 10])
        }
    }

    fn orchestrator_with(classifier: Option<Arc<dyn Classifier>>) -> Orchestrator {
        let slot = Arc::new(ClassifierSlot::new());
        if let Some(c) = classifier {
            slot.install(c).unwrap();
        }
        Orchestrator::new(&Config::default(), slot).unwrap()
    }

    fn sine_clip(rate: u32, len: usize) -> AudioClip {
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        AudioClip::new(samples, rate).unwrap()
    }

    #[tokio::test]
    async fn test_three_second_sine_classified_as_last_label() {
        let stub = Stub::rock();
        let orchestrator = orchestrator_with(Some(stub.clone()));
        orchestrator.load_clip(sine_clip(44100, 44100 * 3));
        assert_eq!(orchestrator.state(), PipelineState::AudioReady);

        let outcome = orchestrator.classify().await.unwrap();
        assert_eq!(outcome.predicted, "rock");
        assert!((outcome.confidence - 90.0).abs() < 1e-4);
        assert_eq!(outcome.top.len(), 5);
        assert_eq!(outcome.ranking.len(), 10);
        assert_eq!(outcome.source_frames, 63);
        assert_eq!(*stub.saw_only_floor.lock().unwrap(), Some(false));

        assert_eq!(orchestrator.state(), PipelineState::ResultsReady);
        assert!(orchestrator.outcome().is_some());
        assert_eq!(orchestrator.engine().live_tensors(), 0);
    }

    #[tokio::test]
    async fn test_clip_shorter_than_one_frame_is_all_floor() {
        let stub = Stub::rock();
        let orchestrator = orchestrator_with(Some(stub.clone()));
        // 80ms at 44100 Hz resamples to 1764 samples, less than one 2048 frame
        orchestrator.load_clip(sine_clip(44100, 3528));

        let outcome = orchestrator.classify().await.unwrap();
        assert_eq!(outcome.source_frames, 0);
        assert_eq!(*stub.saw_only_floor.lock().unwrap(), Some(true));
        assert_eq!(orchestrator.state(), PipelineState::ResultsReady);
    }

    #[tokio::test]
    async fn test_classify_without_classifier_leaves_state() {
        let slot = Arc::new(ClassifierSlot::new());
        let orchestrator = Orchestrator::new(&Config::default(), slot.clone()).unwrap();
        orchestrator.load_clip(sine_clip(22050, 22050));

        let err = orchestrator.classify().await.unwrap_err();
        assert!(matches!(err, PipelineError::Inference(InferenceError::ClassifierUnavailable)));
        assert_eq!(err.category(), "classifier-unavailable");
        assert_eq!(orchestrator.state(), PipelineState::AudioReady);

        slot.install(Stub::rock()).unwrap();
        let outcome = orchestrator.classify().await.unwrap();
        assert_eq!(outcome.predicted, "rock");
    }

    #[tokio::test]
    async fn test_classify_without_clip() {
        let orchestrator = orchestrator_with(Some(Stub::rock()));
        assert!(matches!(orchestrator.classify().await, Err(PipelineError::NoClip)));
        assert_eq!(orchestrator.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_extraction_failure_then_new_clip() {
        let orchestrator = orchestrator_with(Some(Stub::rock()));
        orchestrator.load_clip(AudioClip::new(vec![0.0, f32::NAN, 0.0], 22050).unwrap());

        let err = orchestrator.classify().await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert!(matches!(orchestrator.state(), PipelineState::Error(_)));
        assert!(orchestrator.outcome().is_none());

        orchestrator.load_clip(sine_clip(22050, 22050));
        assert_eq!(orchestrator.state(), PipelineState::AudioReady);
        assert!(orchestrator.classify().await.is_ok());
    }

    #[tokio::test]
    async fn test_inference_failure_resets_results() {
        let orchestrator = orchestrator_with(Some(Arc::new(Broken)));
        orchestrator.load_clip(sine_clip(22050, 22050));

        let err = orchestrator.classify().await.unwrap_err();
        assert_eq!(err.category(), "inference");
        assert!(matches!(orchestrator.state(), PipelineState::Error(ref m) if m.contains("session closed")));
        assert!(orchestrator.outcome().is_none());
        assert_eq!(orchestrator.engine().live_tensors(), 0);
    }

    #[tokio::test]
    async fn test_new_clip_supersedes_attempt_in_flight() {
        let classifier = Arc::new(Interrupting {
            orchestrator: OnceLock::new(),
            replacement: sine_clip(22050, 11025),
        });
        let orchestrator = Arc::new(orchestrator_with(Some(classifier.clone())));
        classifier.orchestrator.set(Arc::downgrade(&orchestrator)).unwrap();

        orchestrator.load_clip(sine_clip(22050, 22050));
        assert!(matches!(orchestrator.classify().await, Err(PipelineError::Superseded)));

        assert_eq!(orchestrator.state(), PipelineState::AudioReady);
        assert!(orchestrator.outcome().is_none());
        assert_eq!(orchestrator.clip().unwrap().len(), 11025);
    }

    #[tokio::test]
    async fn test_dropped_classify_is_cancelled() {
        let orchestrator = orchestrator_with(Some(Stub::rock()));
        orchestrator.load_clip(sine_clip(44100, 44100 * 30));

        let result = tokio::time::timeout(Duration::from_millis(1), orchestrator.classify()).await;
        assert!(result.is_err(), "30s clip should not finish in 1ms");

        let state = orchestrator.state();
        assert!(!state.is_busy());
        assert_eq!(state, PipelineState::Error("Classification cancelled".to_string()));
        assert!(orchestrator.outcome().is_none());

        // The abandoned request must not block the next one
        orchestrator.load_clip(sine_clip(22050, 22050));
        assert_eq!(orchestrator.classify().await.unwrap().predicted, "rock");
    }

    #[tokio::test]
    async fn test_open_decodes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..22050 {
            writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
        }
        writer.finalize().unwrap();

        let orchestrator = orchestrator_with(Some(Stub::rock()));
        let clip = orchestrator.open(&path).await.unwrap();
        assert_eq!(clip.sample_rate(), 22050);
        assert_eq!(clip.len(), 22050);
        assert_eq!(orchestrator.state(), PipelineState::AudioReady);
    }

    #[tokio::test]
    async fn test_open_failure_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_with(Some(Stub::rock()));

        let err = orchestrator.open(&dir.path().join("missing.mp3")).await.unwrap_err();
        assert_eq!(err.category(), "decode");
        assert_eq!(orchestrator.state(), PipelineState::Idle);
        assert!(orchestrator.clip().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.labels.clear();
        let result = Orchestrator::new(&config, Arc::new(ClassifierSlot::new()));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
