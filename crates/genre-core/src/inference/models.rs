//! Classifier artifact location
//!
//! The classifier is either a local ONNX file or a URL. Downloaded files are
//! cached in `~/.cache/genre-classifier/models/` and reused on later runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{InferenceError, Result};
use crate::config::ModelConfig;

/// File name used when a URL has no usable last segment
const DEFAULT_MODEL_FILE: &str = "genre-classifier.onnx";

/// Locates, downloads and caches the classifier model
pub struct ModelStore {
    cache_dir: PathBuf,
}

impl ModelStore {
    /// Create with default cache directory: `~/.cache/genre-classifier/models/`
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir()
            .ok_or_else(|| InferenceError::Model("Could not determine cache directory".into()))?;
        Ok(Self {
            cache_dir: base.join("genre-classifier").join("models"),
        })
    }

    /// Create with a custom cache directory (for testing)
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local cache path for a model file
    pub fn model_path(&self, file_name: &str) -> PathBuf {
        self.cache_dir.join(file_name)
    }

    /// Find the classifier file for a model configuration
    ///
    /// An existing local path wins. Otherwise the URL is served from the cache,
    /// downloading it first if needed.
    pub fn resolve(&self, config: &ModelConfig) -> Result<PathBuf> {
        if let Some(path) = &config.path {
            if path.is_file() {
                log::info!("Classifier model found at {:?}", path);
                return Ok(path.clone());
            }
            if config.url.is_none() {
                return Err(InferenceError::Model(format!("{} does not exist", path.display())));
            }
            log::warn!("Configured model path {:?} missing, falling back to URL", path);
        }

        let url = config
            .url
            .as_deref()
            .ok_or_else(|| InferenceError::Model("no model path or URL configured".into()))?;

        let target = self.model_path(&file_name_from_url(url));
        if target.is_file() {
            log::info!("Classifier model cached at {:?}", target);
            return Ok(target);
        }

        log::info!("Downloading classifier model from {}", url);
        self.download_file(url, &target)?;
        Ok(target)
    }

    /// Download `url` into `target_path`
    ///
    /// The body lands in a `.part` file that is renamed over the target only
    /// once its size matches `Content-Length`; any failure removes it.
    fn download_file(&self, url: &str, target_path: &Path) -> Result<()> {
        let model_err = |what: &str, e: &dyn std::fmt::Display| {
            InferenceError::Model(format!("{} ({}): {}", what, url, e))
        };

        fs::create_dir_all(&self.cache_dir).map_err(|e| model_err("cache dir", &e))?;

        let response = ureq::get(url).call().map_err(|e| model_err("request failed", &e))?;
        let expected_len: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let part = PartialDownload::new(target_path.with_extension("part"));
        let mut file = fs::File::create(part.path()).map_err(|e| model_err("create", &e))?;
        let written = io::copy(&mut response.into_reader(), &mut file)
            .map_err(|e| model_err("transfer interrupted", &e))?;
        file.sync_all().map_err(|e| model_err("sync", &e))?;
        drop(file);

        if let Some(expected) = expected_len.filter(|&n| n != written) {
            return Err(InferenceError::Model(format!(
                "truncated download from {}: {} of {} bytes",
                url, written, expected
            )));
        }

        part.commit(target_path).map_err(|e| model_err("rename", &e))?;
        log::info!("Cached classifier model {:?} ({} bytes)", target_path, written);
        Ok(())
    }
}

/// Download in progress; the file is deleted unless committed
struct PartialDownload {
    path: PathBuf,
    committed: bool,
}

impl PartialDownload {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Move the finished file into place
    fn commit(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Cache file name for a model URL (last path segment, query stripped)
fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    match path.split_once('/') {
        Some((_, rest)) => match rest.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => DEFAULT_MODEL_FILE.to_string(),
        },
        None => DEFAULT_MODEL_FILE.to_string(),
    }
}
