//! Extraction worker
//!
//! Resampling, mel extraction and frame normalization run off the caller's
//! context, on a dedicated thread fed through a command channel.
//!
//! ```text
//! ┌──────────────┐  ExtractionCommand  ┌──────────────────┐
//! │ Orchestrator │ ──────────────────► │ extraction-worker│
//! │   (async)    │ ◄────────────────── │    (thread)      │
//! └──────────────┘  oneshot response   └──────────────────┘
//!                                               │ subprocess mode
//!                                               ▼
//!                                      ┌──────────────────┐
//!                                      │ procspawn child  │
//!                                      └──────────────────┘
//! ```
//!
//! In subprocess mode each request runs in a fresh child process; samples are
//! handed over through a temp file, not through IPC.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use tokio::sync::oneshot;

use super::protocol::{ExtractionRequest, ExtractionResponse};
use crate::config::WorkerIsolation;
use crate::error::{PipelineError, Result};
use crate::features::{extract_normalized, FeatureParams, NormalizedGrid};

/// Commands accepted by the extraction worker
pub enum ExtractionCommand {
    /// Extract a normalized grid for one clip
    Extract {
        request: ExtractionRequest,
        reply: oneshot::Sender<ExtractionResponse>,
    },

    /// Stop the worker loop
    Shutdown,
}

/// Background feature extraction service
pub struct ExtractionService;

impl ExtractionService {
    /// Spawn the worker thread
    pub fn spawn(isolation: WorkerIsolation) -> ExtractionHandle {
        let (command_tx, command_rx) = channel::unbounded();

        let thread_handle = thread::Builder::new()
            .name("extraction-worker".to_string())
            .spawn(move || Self::run(isolation, command_rx))
            .expect("Failed to spawn extraction worker");

        ExtractionHandle {
            command_tx,
            thread_handle: Some(thread_handle),
        }
    }

    /// Main worker loop
    fn run(isolation: WorkerIsolation, command_rx: Receiver<ExtractionCommand>) {
        log::info!("Extraction worker started ({} mode)", isolation.display_name());

        while let Ok(cmd) = command_rx.recv() {
            match cmd {
                ExtractionCommand::Extract { request, reply } => {
                    let start = Instant::now();
                    let response = match isolation {
                        WorkerIsolation::Thread => Self::extract_in_thread(&request),
                        WorkerIsolation::Subprocess => Self::extract_in_subprocess(request).into(),
                    };
                    match &response {
                        ExtractionResponse::Ok { grid } => log::debug!(
                            "Extracted {} frames ({} from audio) in {:.1}ms",
                            grid.frame_count(),
                            grid.source_frames(),
                            start.elapsed().as_secs_f64() * 1000.0
                        ),
                        ExtractionResponse::Error { message } => {
                            log::warn!("Extraction failed: {}", message)
                        }
                    }
                    // Receiver may be gone if the request was superseded
                    let _ = reply.send(response);
                }

                ExtractionCommand::Shutdown => {
                    log::info!("Extraction worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run the chain on the worker thread; a panic becomes an error response
    fn extract_in_thread(request: &ExtractionRequest) -> ExtractionResponse {
        panic::catch_unwind(AssertUnwindSafe(|| request.run())).unwrap_or_else(|_| {
            ExtractionResponse::error("extraction panicked")
        })
    }

    /// Run the chain in a child process
    fn extract_in_subprocess(request: ExtractionRequest) -> std::result::Result<NormalizedGrid, String> {
        use std::io::{Read, Write};

        let temp_path = std::env::temp_dir().join(format!(
            "genre_clip_{}_{}.bin",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let _temp_guard = TempFileGuard::new(temp_path.clone());

        {
            let mut file = std::fs::File::create(&temp_path)
                .map_err(|e| format!("Failed to create temp file {:?}: {}", temp_path, e))?;
            let bytes: Vec<u8> = request.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            file.write_all(&bytes)
                .map_err(|e| format!("Failed to write samples to temp file: {}", e))?;
        }

        let ExtractionRequest {
            samples,
            source_rate,
            params,
        } = request;
        let sample_count = samples.len();
        drop(samples);

        let temp_path_str = temp_path.to_string_lossy().to_string();
        let handle = procspawn::spawn(
            (temp_path_str, sample_count, source_rate, params),
            |(path, count, rate, params): (String, usize, u32, FeatureParams)| {
                let samples = (|| -> std::result::Result<Vec<f32>, String> {
                    let mut file = std::fs::File::open(&path).map_err(|e| e.to_string())?;
                    let mut bytes = vec![0u8; count * std::mem::size_of::<f32>()];
                    file.read_exact(&mut bytes).map_err(|e| e.to_string())?;
                    Ok(bytes
                        .chunks_exact(4)
                        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                        .collect())
                })()?;

                extract_normalized(&samples, rate, &params).map_err(|e| e.to_string())
            },
        );

        handle
            .join()
            .map_err(|e| format!("Extraction subprocess failed: {:?}", e))?
    }
}

/// Removes a temp file when dropped
struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Handle to a running extraction worker
///
/// Dropping the handle stops the worker and joins its thread.
pub struct ExtractionHandle {
    command_tx: Sender<ExtractionCommand>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl ExtractionHandle {
    /// Send a request and wait for the worker's reply without blocking the runtime
    pub async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(ExtractionCommand::Extract {
                request,
                reply: reply_tx,
            })
            .map_err(|_| PipelineError::WorkerUnavailable("worker has stopped".into()))?;

        reply_rx
            .await
            .map_err(|_| PipelineError::WorkerUnavailable("worker dropped the request".into()))
    }

    /// Check if the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(ExtractionCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Extraction worker panicked during shutdown");
            }
        }
    }
}

impl Drop for ExtractionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    procspawn::enable_test_support!();

    #[tokio::test]
    async fn test_thread_worker_extracts() {
        let worker = ExtractionService::spawn(WorkerIsolation::Thread);
        assert!(worker.is_running());

        let request = ExtractionRequest::new(vec![0.1; 44100], 44100, FeatureParams::default());
        let grid = worker.extract(request).await.unwrap().into_result().unwrap();
        assert_eq!(grid.frame_count(), 96);
        assert_eq!(grid.n_bands(), 64);
        // 22050 resampled samples
        assert_eq!(grid.source_frames(), 20);
    }

    #[tokio::test]
    async fn test_worker_reports_errors_and_keeps_running() {
        let worker = ExtractionService::spawn(WorkerIsolation::Thread);

        let bad = ExtractionRequest::new(vec![f32::INFINITY; 8], 22050, FeatureParams::default());
        let response = worker.extract(bad).await.unwrap();
        assert!(matches!(response, ExtractionResponse::Error { .. }));

        let good = ExtractionRequest::new(vec![0.0; 8], 22050, FeatureParams::default());
        assert!(worker.extract(good).await.unwrap().into_result().is_ok());
    }

    #[tokio::test]
    async fn test_stopped_worker_is_unavailable() {
        let mut worker = ExtractionService::spawn(WorkerIsolation::Thread);
        worker.shutdown();
        assert!(!worker.is_running());

        let request = ExtractionRequest::new(vec![0.0; 8], 22050, FeatureParams::default());
        assert!(matches!(
            worker.extract(request).await,
            Err(PipelineError::WorkerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_subprocess_worker_extracts() {
        let worker = ExtractionService::spawn(WorkerIsolation::Subprocess);

        let request = ExtractionRequest::new(vec![0.1; 44100], 44100, FeatureParams::default());
        let grid = worker.extract(request).await.unwrap().into_result().unwrap();
        assert_eq!(grid.frame_count(), 96);
        assert_eq!(grid.n_bands(), 64);
        assert_eq!(grid.source_frames(), 20);
    }

    #[tokio::test]
    async fn test_subprocess_worker_reports_errors() {
        let worker = ExtractionService::spawn(WorkerIsolation::Subprocess);

        let bad = ExtractionRequest::new(vec![0.0, f32::NAN, 0.0], 22050, FeatureParams::default());
        let message = worker.extract(bad).await.unwrap().into_result().unwrap_err();
        assert!(message.contains("index 1"), "unexpected message: {}", message);

        let good = ExtractionRequest::new(vec![0.0; 8], 22050, FeatureParams::default());
        assert!(worker.extract(good).await.unwrap().into_result().is_ok());
    }

    #[test]
    fn test_temp_file_guard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.bin");
        std::fs::write(&path, [0u8; 4]).unwrap();
        {
            let _guard = TempFileGuard::new(path.clone());
        }
        assert!(!path.exists());
    }
}
