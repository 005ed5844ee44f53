//! Binary voice classifier
//!
//! [`Classifier`] owns the probability model behind the [`VoiceModel`] trait,
//! an optional [`StandardScaler`], and the global feature importances. It is
//! built once by [`Classifier::load`] and read concurrently afterwards.
//!
//! Class 0 is human speech and class 1 is synthetic speech throughout.

pub mod bootstrap;
pub mod forest;
pub mod scaler;

pub use bootstrap::BootstrapModel;
pub use forest::{ForestParams, RandomForest};
pub use scaler::StandardScaler;

use crate::config::ModelConfig;
use crate::error::{Result, VoiceError};
use crate::features::{FeatureVector, FEATURE_NAMES, N_FEATURES};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "AI_GENERATED")]
    AiGenerated,
    #[serde(rename = "HUMAN")]
    Human,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::AiGenerated => "AI_GENERATED",
            Label::Human => "HUMAN",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class probabilities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub human: f64,
    pub ai: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    pub confidence: f64,
    pub probabilities: Probabilities,
}

impl Classification {
    /// Synthetic only when its probability strictly exceeds the human one
    pub fn from_probabilities(probabilities: Probabilities) -> Self {
        let (label, confidence) = if probabilities.ai > probabilities.human {
            (Label::AiGenerated, probabilities.ai)
        } else {
            (Label::Human, probabilities.human)
        };
        Self {
            label,
            confidence,
            probabilities,
        }
    }
}

/// One feature's value in a sample together with its global importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub index: usize,
    pub name: String,
    pub value: f64,
    pub importance: f64,
}

/// Probability model capability shared by every model source
pub trait VoiceModel: Send + Sync {
    /// `[human, ai]` probabilities for one (already scaled) feature row
    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]>;

    fn feature_importances(&self) -> &[f64];

    fn n_features(&self) -> usize;
}

/// Forest deserialized from a trained artifact
#[derive(Debug, Clone)]
pub struct LoadedModel {
    forest: RandomForest,
}

impl LoadedModel {
    pub fn new(forest: RandomForest) -> Self {
        Self { forest }
    }
}

impl VoiceModel for LoadedModel {
    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        self.forest.predict_proba(features)
    }

    fn feature_importances(&self) -> &[f64] {
        &self.forest.feature_importances
    }

    fn n_features(&self) -> usize {
        self.forest.n_features
    }
}

/// Which path produced the active model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Loaded,
    Bootstrapped,
}

/// Read the model artifact and optional scaler, checking dimensionality
fn load_artifacts(config: &ModelConfig) -> Result<(LoadedModel, Option<StandardScaler>)> {
    if !config.model_path.exists() {
        return Err(VoiceError::ModelUnavailable(format!(
            "model file not found: {}",
            config.model_path.display()
        )));
    }

    let forest = RandomForest::load(&config.model_path).map_err(|e| {
        VoiceError::ModelUnavailable(format!("{}: {}", config.model_path.display(), e))
    })?;
    if forest.n_features != N_FEATURES {
        return Err(VoiceError::ModelUnavailable(format!(
            "model expects {} features, pipeline produces {}",
            forest.n_features, N_FEATURES
        )));
    }

    let scaler = if config.scaler_path.exists() {
        let scaler = StandardScaler::load(&config.scaler_path).map_err(|e| {
            VoiceError::ModelUnavailable(format!("{}: {}", config.scaler_path.display(), e))
        })?;
        if scaler.n_features() != N_FEATURES {
            return Err(VoiceError::ModelUnavailable(format!(
                "scaler expects {} features, pipeline produces {}",
                scaler.n_features(),
                N_FEATURES
            )));
        }
        Some(scaler)
    } else {
        debug!("No scaler at {}, using raw features", config.scaler_path.display());
        None
    };

    Ok((LoadedModel::new(forest), scaler))
}

/// Pick the model source: trained artifact when usable, bootstrap otherwise
pub fn load_model(
    config: &ModelConfig,
) -> Result<(Box<dyn VoiceModel>, Option<StandardScaler>, ModelSource)> {
    match load_artifacts(config) {
        Ok((model, scaler)) => {
            info!("Loaded model from {}", config.model_path.display());
            Ok((Box::new(model), scaler, ModelSource::Loaded))
        }
        Err(e) => {
            warn!("{}; falling back to bootstrap model", e);
            let model = BootstrapModel::train(&config.bootstrap, N_FEATURES)?;
            Ok((Box::new(model), None, ModelSource::Bootstrapped))
        }
    }
}

/// Scaler + model + importances, immutable after construction
pub struct Classifier {
    model: Box<dyn VoiceModel>,
    scaler: Option<StandardScaler>,
    importances: Vec<f64>,
    source: ModelSource,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("source", &self.source)
            .field("n_features", &self.model.n_features())
            .field("scaled", &self.scaler.is_some())
            .finish()
    }
}

impl Classifier {
    /// Load the configured artifacts, bootstrapping a placeholder when they are unusable
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let (model, scaler, source) = load_model(config)?;
        Ok(Self::new(model, scaler, source))
    }

    pub fn new(model: Box<dyn VoiceModel>, scaler: Option<StandardScaler>, source: ModelSource) -> Self {
        let importances = model.feature_importances().to_vec();
        Self {
            model,
            scaler,
            importances,
            source,
        }
    }

    pub fn source(&self) -> ModelSource {
        self.source
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Classification> {
        self.predict_values(features.as_slice())
    }

    /// Classify a raw feature row
    pub fn predict_values(&self, values: &[f64]) -> Result<Classification> {
        if values.len() != self.model.n_features() {
            return Err(VoiceError::Prediction(format!(
                "model expects {} features, got {}",
                self.model.n_features(),
                values.len()
            )));
        }

        let scaled;
        let input = match &self.scaler {
            Some(scaler) => {
                scaled = scaler.transform(values)?;
                &scaled[..]
            }
            None => values,
        };

        let [human, ai] = self.model.predict_proba(input)?;
        if !human.is_finite() || !ai.is_finite() {
            return Err(VoiceError::Prediction(format!(
                "model returned non-finite probabilities ({}, {})",
                human, ai
            )));
        }

        let classification = Classification::from_probabilities(Probabilities { human, ai });
        debug!(
            "Probabilities: human={:.4} ai={:.4} -> {}",
            human, ai, classification.label
        );
        Ok(classification)
    }

    /// The `n` globally most important features with this sample's values
    pub fn top_features(&self, features: &FeatureVector, n: usize) -> Vec<FeatureContribution> {
        let mut order: Vec<usize> = (0..self.importances.len().min(features.len())).collect();
        // Stable sort keeps lower indices first among equal importances
        order.sort_by(|&a, &b| self.importances[b].total_cmp(&self.importances[a]));

        order
            .into_iter()
            .take(n)
            .map(|index| FeatureContribution {
                index,
                name: FEATURE_NAMES[index].to_string(),
                value: features[index],
                importance: self.importances[index],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel {
        proba: [f64; 2],
        importances: Vec<f64>,
    }

    impl VoiceModel for FixedModel {
        fn predict_proba(&self, _features: &[f64]) -> Result<[f64; 2]> {
            Ok(self.proba)
        }

        fn feature_importances(&self) -> &[f64] {
            &self.importances
        }

        fn n_features(&self) -> usize {
            N_FEATURES
        }
    }

    fn classifier(proba: [f64; 2], importances: Vec<f64>) -> Classifier {
        Classifier::new(
            Box::new(FixedModel { proba, importances }),
            None,
            ModelSource::Loaded,
        )
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&Label::AiGenerated).unwrap(), "\"AI_GENERATED\"");
        assert_eq!(serde_json::to_string(&Label::Human).unwrap(), "\"HUMAN\"");
    }

    #[test]
    fn test_tie_is_human() {
        let c = classifier([0.5, 0.5], vec![0.0; N_FEATURES]);
        let result = c.predict(&FeatureVector::from_slice(&[0.0; N_FEATURES]).unwrap()).unwrap();
        assert_eq!(result.label, Label::Human);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_confidence_is_winning_probability() {
        let c = classifier([0.2, 0.8], vec![0.0; N_FEATURES]);
        let result = c.predict_values(&[1.0; N_FEATURES]).unwrap();
        assert_eq!(result.label, Label::AiGenerated);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_non_finite_probabilities_rejected() {
        let c = classifier([f64::NAN, 0.5], vec![0.0; N_FEATURES]);
        assert!(matches!(
            c.predict_values(&[0.0; N_FEATURES]),
            Err(VoiceError::Prediction(_))
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let c = classifier([0.5, 0.5], vec![0.0; N_FEATURES]);
        assert!(matches!(
            c.predict_values(&[0.0; 12]),
            Err(VoiceError::Prediction(_))
        ));
    }

    #[test]
    fn test_top_features_order_and_ties() {
        let mut importances = vec![0.0; N_FEATURES];
        importances[20] = 0.3;
        importances[5] = 0.3;
        importances[13] = 0.4;
        let c = classifier([0.5, 0.5], importances);

        let mut values = [0.0; N_FEATURES];
        values[13] = 210.0;
        let top = c.top_features(&FeatureVector::from_slice(&values).unwrap(), 3);
        let indices: Vec<usize> = top.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![13, 5, 20]);
        assert_eq!(top[0].name, "Pitch Mean");
        assert_eq!(top[0].value, 210.0);
    }

    #[test]
    fn test_top_features_empty_without_importances() {
        let c = classifier([0.5, 0.5], Vec::new());
        let v = FeatureVector::from_slice(&[0.0; N_FEATURES]).unwrap();
        assert!(c.top_features(&v, 5).is_empty());
    }
}
