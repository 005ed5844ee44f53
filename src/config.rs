//! Configuration system for the voice detector

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub audio: AudioConfig,
    pub model: ModelConfig,
    pub explain: ExplainConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            audio: AudioConfig::default(),
            model: ModelConfig::default(),
            explain: ExplainConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Audio decoding and validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Every decoded waveform is resampled to this rate
    pub target_sample_rate: u32,
    pub min_duration_sec: f32,
    pub max_duration_sec: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 22050,
            min_duration_sec: 0.5,
            max_duration_sec: 30.0,
        }
    }
}

/// Model artifact locations and placeholder-model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub bootstrap: BootstrapConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/ai_voice_classifier.json"),
            scaler_path: PathBuf::from("model/feature_scaler.json"),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

/// Synthetic training set and forest shape for the bootstrap model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub samples_per_class: usize,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            samples_per_class: 200,
            seed: 42,
        }
    }
}

/// Explanation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Number of globally important features reported with each result
    pub top_features: usize,
    /// Maximum number of cue phrases in the narrative
    pub max_phrases: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_features: 5,
            max_phrases: 3,
        }
    }
}

/// Pipeline execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> Result<()> {
    if config.audio.target_sample_rate < 8000 {
        return Err(VoiceError::Config(format!(
            "target_sample_rate must be >= 8000 Hz (got {})",
            config.audio.target_sample_rate
        )));
    }

    let (min, max) = (config.audio.min_duration_sec, config.audio.max_duration_sec);
    if !(min > 0.0 && min < max) {
        return Err(VoiceError::Config(format!(
            "duration bounds must satisfy 0 < min < max (got {} .. {})",
            min, max
        )));
    }

    let bootstrap = &config.model.bootstrap;
    if bootstrap.n_estimators == 0 || bootstrap.max_depth == 0 || bootstrap.samples_per_class == 0
    {
        return Err(VoiceError::Config(
            "bootstrap n_estimators, max_depth and samples_per_class must be non-zero".to_string(),
        ));
    }

    if config.explain.top_features > crate::features::N_FEATURES {
        return Err(VoiceError::Config(format!(
            "top_features must be <= {}",
            crate::features::N_FEATURES
        )));
    }

    if config.explain.max_phrases == 0 {
        return Err(VoiceError::Config(
            "max_phrases must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
