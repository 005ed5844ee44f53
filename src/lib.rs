//! Synthetic Voice Detection
//!
//! Classifies a short speech recording as AI-generated or human. Audio bytes
//! are decoded and normalized, reduced to a fixed 39-element acoustic feature
//! vector, scored by a binary classifier, and explained with rule-based cues.

pub mod audio;
pub mod config;
pub mod error;
pub mod explain;
pub mod features;
pub mod model;
pub mod spectral;

pub use audio::Waveform;
pub use config::Config;
pub use error::{Result, VoiceError};
pub use explain::{DetailedAnalysis, Explainer, Explanation};
pub use features::{FeatureVector, FEATURE_NAMES, N_FEATURES};
pub use model::{Classification, Classifier, FeatureContribution, Label, ModelSource, Probabilities};

use crate::config::AudioConfig;
use serde::{Deserialize, Serialize};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of one detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: Label,
    pub confidence: f64,
    pub probabilities: Probabilities,
    pub explanation: String,
    pub top_features: Vec<FeatureContribution>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detailed_analysis: Option<DetailedAnalysis>,
}

/// Decode, normalize, validate and extract without classifying
pub fn extract_features(bytes: &[u8], config: &AudioConfig) -> Result<FeatureVector> {
    let waveform = audio::decode(bytes, config.target_sample_rate)?;
    waveform_features(waveform, config)
}

fn waveform_features(waveform: Waveform, config: &AudioConfig) -> Result<FeatureVector> {
    let waveform = audio::resample(waveform, config.target_sample_rate)?;
    let waveform = audio::normalize(waveform);
    audio::validate_duration(&waveform, config.min_duration_sec, config.max_duration_sec)?;
    features::extract(&waveform)
}

/// Detection service: owns the classifier and runs the full pipeline
#[derive(Debug)]
pub struct VoiceDetector {
    config: Config,
    classifier: Classifier,
    explainer: Explainer,
}

impl VoiceDetector {
    /// Validate the configuration and load (or bootstrap) the classifier
    pub fn new(config: Config) -> Result<Self> {
        config::validate_config(&config)?;
        let classifier = Classifier::load(&config.model)?;
        info!("Classifier ready ({:?})", classifier.source());
        Ok(Self::with_classifier(config, classifier))
    }

    pub fn with_classifier(config: Config, classifier: Classifier) -> Self {
        let explainer = Explainer::new(&config.explain);
        Self {
            config,
            classifier,
            explainer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run the pipeline on encoded audio
    pub fn detect(&self, bytes: &[u8]) -> Result<DetectionResult> {
        self.run(bytes, false)
    }

    /// Like [`detect`](Self::detect), with the grouped feature analysis attached
    pub fn detect_detailed(&self, bytes: &[u8]) -> Result<DetectionResult> {
        self.run(bytes, true)
    }

    /// Classify an already-decoded waveform
    ///
    /// Waveforms at another rate are resampled to the configured target first.
    pub fn analyze_waveform(&self, waveform: Waveform, detailed: bool) -> Result<DetectionResult> {
        let start = Instant::now();
        let features = waveform_features(waveform, &self.config.audio)?;
        debug!("Feature extraction took {:?}", start.elapsed());

        let classification = self.classifier.predict(&features)?;
        let top_features = self
            .classifier
            .top_features(&features, self.config.explain.top_features);
        let explanation = self.explainer.explain(
            classification.label,
            classification.confidence,
            &features,
            &top_features,
        );

        info!(
            "Classified as {} ({:.1}% confidence) in {:?}",
            classification.label,
            classification.confidence * 100.0,
            start.elapsed()
        );

        Ok(DetectionResult {
            label: classification.label,
            confidence: classification.confidence,
            probabilities: classification.probabilities,
            explanation: explanation.text,
            detailed_analysis: detailed.then(|| explain::detailed_analysis(&features, &explanation.evidence)),
            top_features: explanation.evidence,
        })
    }

    fn run(&self, bytes: &[u8], detailed: bool) -> Result<DetectionResult> {
        let waveform = audio::decode(bytes, self.config.audio.target_sample_rate)?;
        self.analyze_waveform(waveform, detailed)
    }

    /// Run [`detect`](Self::detect) on a worker thread, giving up after `timeout`
    ///
    /// A run that misses the deadline keeps going in the background and its
    /// result is dropped.
    pub fn detect_with_timeout(
        self: Arc<Self>,
        bytes: Vec<u8>,
        timeout: Duration,
    ) -> Result<DetectionResult> {
        self.run_with_timeout(bytes, timeout, false)
    }

    pub fn detect_detailed_with_timeout(
        self: Arc<Self>,
        bytes: Vec<u8>,
        timeout: Duration,
    ) -> Result<DetectionResult> {
        self.run_with_timeout(bytes, timeout, true)
    }

    fn run_with_timeout(
        self: Arc<Self>,
        bytes: Vec<u8>,
        timeout: Duration,
        detailed: bool,
    ) -> Result<DetectionResult> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("voicedetect-worker".to_string())
            .spawn(move || {
                // The receiver is gone once the caller has timed out
                let _ = tx.send(self.run(&bytes, detailed));
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(VoiceError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(VoiceError::Prediction(
                "detection worker exited without a result".to_string(),
            )),
        }
    }
}
