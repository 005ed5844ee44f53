//! Per-feature standardization

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Zero-mean, unit-variance transform stored per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.n_features() {
            return Err(VoiceError::Prediction(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                x.len()
            )));
        }
        Ok(x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect())
    }

    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(VoiceError::ModelUnavailable(format!(
                "scaler has {} means and {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite())
            || self.scale.iter().any(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(VoiceError::ModelUnavailable(
                "scaler contains non-finite or zero entries".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scaler: StandardScaler = serde_json::from_str(&content)?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
