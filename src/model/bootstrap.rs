//! Deterministic placeholder model used when no trained artifact is available
//!
//! Both classes are centred on 0.5 in every dimension and differ only in
//! spread: synthetic voices are drawn with a low standard deviation, human
//! voices with a high one. The result is only good enough to keep the
//! service answering until a real model is deployed.

use super::forest::{ForestParams, RandomForest};
use super::VoiceModel;
use crate::config::BootstrapConfig;
use crate::error::Result;
use ndarray::Array2;
use rand::prelude::*;
use tracing::info;

pub const CLASS_CENTER: f64 = 0.5;
pub const AI_STD: f64 = 0.1;
pub const HUMAN_STD: f64 = 0.3;

pub const HUMAN_CLASS: usize = 0;
pub const AI_CLASS: usize = 1;

/// Standard normal draw by the Box-Muller transform
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // 1 - u keeps the logarithm argument in (0, 1]
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Shuffled synthetic training set: `samples_per_class` rows of each class
pub fn synthetic_training_set(
    samples_per_class: usize,
    n_features: usize,
    seed: u64,
) -> (Array2<f64>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut rows: Vec<(Vec<f64>, usize)> = Vec::with_capacity(2 * samples_per_class);
    for (class, std) in [(AI_CLASS, AI_STD), (HUMAN_CLASS, HUMAN_STD)] {
        for _ in 0..samples_per_class {
            let row = (0..n_features)
                .map(|_| CLASS_CENTER + std * standard_normal(&mut rng))
                .collect();
            rows.push((row, class));
        }
    }
    rows.shuffle(&mut rng);

    let mut x = Array2::<f64>::zeros((rows.len(), n_features));
    let mut y = Vec::with_capacity(rows.len());
    for (i, (row, class)) in rows.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            x[[i, j]] = v;
        }
        y.push(class);
    }
    (x, y)
}

/// Forest trained in memory on the synthetic set
#[derive(Debug, Clone)]
pub struct BootstrapModel {
    forest: RandomForest,
}

impl BootstrapModel {
    pub fn train(config: &BootstrapConfig, n_features: usize) -> Result<Self> {
        let (x, y) = synthetic_training_set(config.samples_per_class, n_features, config.seed);
        let params = ForestParams {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            seed: config.seed,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, &params)?;
        info!(
            "Bootstrapped placeholder forest: {} trees, {} samples",
            forest.trees.len(),
            x.nrows()
        );
        Ok(Self { forest })
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn into_forest(self) -> RandomForest {
        self.forest
    }
}

impl VoiceModel for BootstrapModel {
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
