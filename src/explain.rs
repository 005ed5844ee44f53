//! Natural-language explanations for classification results
//!
//! Cues are read from two ordered rule tables, one per label. Each rule
//! names a feature, a predicate on its value and the phrase emitted when
//! the predicate holds. Only the first `max_phrases` matches are used.

use crate::config::ExplainConfig;
use crate::features::{idx, FeatureVector};
use crate::model::{FeatureContribution, Label};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Condition on a single feature value (bounds are exclusive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    Below(f64),
    Above(f64),
    Between(f64, f64),
}

impl Predicate {
    pub fn holds(&self, value: f64) -> bool {
        match *self {
            Predicate::Below(limit) => value < limit,
            Predicate::Above(limit) => value > limit,
            Predicate::Between(low, high) => low < value && value < high,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExplanationRule {
    pub feature: usize,
    pub predicate: Predicate,
    pub phrase: &'static str,
}

const fn rule(feature: usize, predicate: Predicate, phrase: &'static str) -> ExplanationRule {
    ExplanationRule {
        feature,
        predicate,
        phrase,
    }
}

pub const AI_RULES: [ExplanationRule; 5] = [
    rule(idx::PITCH_STD, Predicate::Below(20.0), "unnatural pitch consistency"),
    rule(idx::FLATNESS_MEAN, Predicate::Below(0.1), "minimal spectral variations"),
    rule(idx::RMS_STD, Predicate::Below(0.05), "uniform energy distribution"),
    rule(idx::TEMPO, Predicate::Between(100.0, 140.0), "mechanical speech rhythm"),
    rule(idx::HARMONIC_RATIO, Predicate::Above(0.7), "overly smooth harmonic structure"),
];

pub const HUMAN_RULES: [ExplanationRule; 5] = [
    rule(idx::PITCH_STD, Predicate::Above(30.0), "natural pitch variations"),
    rule(idx::FLATNESS_MEAN, Predicate::Above(0.15), "rich spectral complexity"),
    rule(idx::RMS_STD, Predicate::Above(0.08), "natural energy fluctuations"),
    rule(idx::ONSET_STD, Predicate::Above(0.5), "organic speech rhythm"),
    rule(idx::AUTOCORR_STD, Predicate::Above(100.0), "natural micro-variations"),
];

/// Narrative plus the evidence it was produced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub text: String,
    pub evidence: Vec<FeatureContribution>,
}

/// Explanation generator
#[derive(Debug, Clone)]
pub struct Explainer {
    max_phrases: usize,
}

impl Default for Explainer {
    fn default() -> Self {
        Self::new(&ExplainConfig::default())
    }
}

impl Explainer {
    pub fn new(config: &ExplainConfig) -> Self {
        Self {
            max_phrases: config.max_phrases.max(1),
        }
    }

    /// Build the explanation; never fails and never returns empty text
    pub fn explain(
        &self,
        label: Label,
        confidence: f64,
        features: &FeatureVector,
        evidence: &[FeatureContribution],
    ) -> Explanation {
        let text = match self.narrative(label, confidence, features) {
            Ok(text) => text,
            Err(reason) => {
                error!("Explanation generation failed: {}", reason);
                fallback_text(label, confidence)
            }
        };
        debug!("Explanation: {}", text);

        Explanation {
            text,
            evidence: evidence.to_vec(),
        }
    }

    fn narrative(&self, label: Label, confidence: f64, features: &FeatureVector) -> Result<String, String> {
        if !confidence.is_finite() {
            return Err(format!("non-finite confidence {}", confidence));
        }

        let (rules, subject, generic) = match label {
            Label::AiGenerated => (&AI_RULES, "AI generation", "synthetic voice characteristics detected"),
            Label::Human => (&HUMAN_RULES, "human voice", "human voice characteristics detected"),
        };

        let mut phrases = Vec::with_capacity(self.max_phrases);
        for rule in rules.iter() {
            let value = features
                .get(rule.feature)
                .ok_or_else(|| format!("rule references missing feature {}", rule.feature))?;
            if !value.is_finite() {
                return Err(format!("non-finite value for feature {}", rule.feature));
            }
            if rule.predicate.holds(value) {
                phrases.push(rule.phrase);
                if phrases.len() == self.max_phrases {
                    break;
                }
            }
        }
        if phrases.is_empty() {
            phrases.push(generic);
        }

        Ok(format!(
            "{} indicators of {}: {}",
            strength(confidence),
            subject,
            phrases.join(", ")
        ))
    }
}

/// Strength word for a confidence value
pub fn strength(confidence: f64) -> &'static str {
    if confidence > 0.9 {
        "Strong"
    } else if confidence > 0.7 {
        "Clear"
    } else {
        "Moderate"
    }
}

fn fallback_text(label: Label, confidence: f64) -> String {
    format!(
        "Voice classified as {} with {:.2}% confidence",
        label,
        confidence * 100.0
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchAnalysis {
    pub mean: f64,
    pub std: f64,
    pub range: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAnalysis {
    pub rms_mean: f64,
    pub rms_std: f64,
    pub zcr_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralAnalysis {
    pub centroid_mean: f64,
    pub flatness_mean: f64,
    pub contrast_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProsodyAnalysis {
    pub tempo: f64,
    pub harmonic_ratio: f64,
}

/// Grouped view of the most telling features of one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub pitch_analysis: PitchAnalysis,
    pub energy_analysis: EnergyAnalysis,
    pub spectral_analysis: SpectralAnalysis,
    pub prosody_analysis: ProsodyAnalysis,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub top_contributing_features: Vec<FeatureContribution>,
}

pub fn detailed_analysis(features: &FeatureVector, top_features: &[FeatureContribution]) -> DetailedAnalysis {
    DetailedAnalysis {
        pitch_analysis: PitchAnalysis {
            mean: features[idx::PITCH_MEAN],
            std: features[idx::PITCH_STD],
            range: features[idx::PITCH_RANGE],
        },
        energy_analysis: EnergyAnalysis {
            rms_mean: features[idx::RMS_MEAN],
            rms_std: features[idx::RMS_STD],
            zcr_mean: features[idx::ZCR_MEAN],
        },
        spectral_analysis: SpectralAnalysis {
            centroid_mean: features[idx::CENTROID_MEAN],
            flatness_mean: features[idx::FLATNESS_MEAN],
            contrast_mean: features[idx::CONTRAST_MEAN],
        },
        prosody_analysis: ProsodyAnalysis {
            tempo: features[idx::TEMPO],
            harmonic_ratio: features[idx::HARMONIC_RATIO],
        },
        top_contributing_features: top_features.to_vec(),
    }
}
