//! Global configuration for the genre classifier
//!
//! Configuration is stored as YAML.
//! Default location: ~/.config/genre-classifier/config.yaml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::features::FeatureParams;
use crate::inference::{LabelSet, GTZAN_GENRES};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feature pipeline constants (must match the trained classifier)
    pub pipeline: FeatureParams,
    /// Result display settings
    pub display: DisplayConfig,
    /// Classifier artifact location
    pub model: ModelConfig,
    /// Extraction worker settings
    pub worker: WorkerConfig,
    /// Ordered genre labels, one per classifier output
    pub labels: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: FeatureParams::default(),
            display: DisplayConfig::default(),
            model: ModelConfig::default(),
            worker: WorkerConfig::default(),
            labels: GTZAN_GENRES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Build the label set from the configured label list
    pub fn label_set(&self) -> std::result::Result<LabelSet, crate::inference::InferenceError> {
        LabelSet::new(self.labels.clone())
    }
}

/// Display configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Number of ranked genres shown (top-K)
    pub top_k: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Classifier model configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Local path to the ONNX classifier
    pub path: Option<PathBuf>,
    /// Download URL used when no local path is available
    pub url: Option<String>,
    /// Name of the classifier's input tensor
    pub input_name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            input_name: String::from("input"),
        }
    }
}

/// Where feature extraction runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerIsolation {
    /// Dedicated background thread
    #[default]
    Thread,
    /// Background thread that runs each request in a child process
    Subprocess,
}

impl WorkerIsolation {
    /// Display name for logs
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Subprocess => "subprocess",
        }
    }
}

/// Extraction worker configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Isolation mode for the extraction worker
    pub isolation: WorkerIsolation,
}

/// Get the default config file path
///
/// Returns: ~/.config/genre-classifier/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genre-classifier")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> Config {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
            Ok(config) => {
                if let Err(e) = config.pipeline.validate() {
                    log::warn!("load_config: Invalid pipeline section: {}, using defaults", e);
                    return Config::default();
                }
                log::info!(
                    "load_config: Loaded config - {} Hz, {} bands x {} frames, {} labels",
                    config.pipeline.target_rate,
                    config.pipeline.mel_bands,
                    config.pipeline.frame_count,
                    config.labels.len()
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                Config::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}, using defaults", e);
            Config::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config)
        .context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.target_rate, 22050);
        assert_eq!(config.pipeline.mel_bands, 64);
        assert_eq!(config.pipeline.frame_count, 96);
        assert_eq!(config.pipeline.frame_size, 2048);
        assert_eq!(config.pipeline.hop_size, 1024);
        assert_eq!(config.display.top_k, 5);
        assert_eq!(config.labels.len(), 10);
        assert_eq!(config.worker.isolation, WorkerIsolation::Thread);
    }

    #[test]
    fn test_padding_floor_derived_from_epsilon() {
        let config = Config::default();
        assert_eq!(config.pipeline.padding_floor(), -60.0);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.display.top_k = 3;
        config.worker.isolation = WorkerIsolation::Subprocess;
        config.labels = vec!["ambient".into(), "techno".into()];

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("isolation: subprocess"));
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.display.top_k, 3);
        assert_eq!(parsed.worker.isolation, WorkerIsolation::Subprocess);
        assert_eq!(parsed.labels, vec!["ambient".to_string(), "techno".to_string()]);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("display:\n  top_k: 2\n").unwrap();
        assert_eq!(parsed.display.top_k, 2);
        assert_eq!(parsed.pipeline.mel_bands, 64);
        assert_eq!(parsed.model.input_name, "input");
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml"));
        assert_eq!(config.pipeline.frame_count, 96);
    }

    #[test]
    fn test_load_rejects_invalid_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pipeline:\n  hop_size: 4096\n  frame_size: 1024\n").unwrap();
        let config = load_config(&path);
        assert_eq!(config.pipeline.hop_size, 1024);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.model.input_name = String::from("melspectrogram");
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path);
        assert_eq!(loaded.model.input_name, "melspectrogram");
    }
}
