//! Random forest of Gini CART trees for binary classification

use crate::error::{Result, VoiceError};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of classes every tree predicts over (0 = human, 1 = AI)
pub const N_CLASSES: usize = 2;
/// Allowed deviation of a leaf's class probabilities from a total of 1
const PROBA_TOLERANCE: f64 = 1e-6;

/// Forest training parameters
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Smallest node that may still be split
    pub min_samples_split: usize,
    /// Features considered per split; `None` means `sqrt(n_features)`
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

/// Tree node; children are indices into the owning tree's node list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        proba: [f64; N_CLASSES],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Single decision tree, root at node 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_proba(&self, x: &[f64]) -> [f64; N_CLASSES] {
        let mut index = 0;
        // Bounded by node count so a malformed tree cannot loop forever
        for _ in 0..=self.nodes.len() {
            match &self.nodes[index] {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
        [0.5, 0.5]
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { proba } => {
                    if proba.iter().any(|p| !p.is_finite() || *p < 0.0) {
                        return Err(format!("node {} has invalid probabilities", i));
                    }
                    if (proba.iter().sum::<f64>() - 1.0).abs() > PROBA_TOLERANCE {
                        return Err(format!("node {} probabilities do not sum to 1", i));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {} splits on feature {} of {}", i, feature, n_features));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", i));
                    }
                    // Children always follow their parent, which rules out cycles
                    if *left <= i || *right <= i || *left >= self.nodes.len() || *right >= self.nodes.len() {
                        return Err(format!("node {} has out-of-order children", i));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
    /// Normalized mean impurity decrease per feature
    pub feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit on rows of `x` with class labels `y` in `{0, 1}`
    pub fn fit(x: &Array2<f64>, y: &[usize], params: &ForestParams) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(VoiceError::ModelUnavailable(
                "cannot fit a forest on an empty training set".to_string(),
            ));
        }
        if y.len() != n_samples {
            return Err(VoiceError::ModelUnavailable(format!(
                "{} labels for {} samples",
                y.len(),
                n_samples
            )));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= N_CLASSES) {
            return Err(VoiceError::ModelUnavailable(format!("class label {} out of range", bad)));
        }

        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0f64; n_features];

        for _ in 0..params.n_estimators {
            let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

            let mut builder = TreeBuilder {
                x,
                y,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split.max(2),
                max_features,
                n_total: sample.len() as f64,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
                rng: &mut rng,
            };
            builder.grow(sample, 0);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&builder.importances) {
                    *acc += v / tree_total;
                }
            }
            trees.push(DecisionTree { nodes: builder.nodes });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            n_features,
            trees,
            feature_importances: importances,
        })
    }

    /// Class probabilities `[human, ai]` averaged over all trees
    pub fn predict_proba(&self, x: &[f64]) -> Result<[f64; N_CLASSES]> {
        if x.len() != self.n_features {
            return Err(VoiceError::Prediction(format!(
                "expected {} features, got {}",
                self.n_features,
                x.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(VoiceError::Prediction("forest has no trees".to_string()));
        }

        let mut sum = [0.0f64; N_CLASSES];
        for tree in &self.trees {
            let p = tree.predict_proba(x);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len() as f64;
        Ok([sum[0] / n, sum[1] / n])
    }

    /// Structural checks run on every deserialized forest
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(VoiceError::ModelUnavailable("forest has no trees".to_string()));
        }
        if self.feature_importances.len() != self.n_features {
            return Err(VoiceError::ModelUnavailable(format!(
                "{} importances for {} features",
                self.feature_importances.len(),
                self.n_features
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| VoiceError::ModelUnavailable(format!("tree {}: {}", i, e)))?;
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let forest: RandomForest = serde_json::from_str(&content)?;
        forest.validate()?;
        Ok(forest)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Best split found for one node
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity, lower is better
    child_impurity: f64,
}

struct TreeBuilder<'a, R: Rng> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
    n_total: f64,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    rng: &'a mut R,
}

impl<R: Rng> TreeBuilder<'_, R> {
    /// Grow the subtree for `sample` and return its node index
    fn grow(&mut self, sample: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&sample);
        let n = sample.len() as f64;
        let impurity = gini(counts);

        let index = self.nodes.len();
        self.nodes.push(leaf(counts));

        if depth >= self.max_depth || sample.len() < self.min_samples_split || impurity <= 0.0 {
            return index;
        }

        let Some(split) = self.best_split(&sample, counts) else {
            return index;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&s| self.x[[s, split.feature]] <= split.threshold);

        self.importances[split.feature] += n / self.n_total * (impurity - split.child_impurity);

        let left_index = self.grow(left, depth + 1);
        let right_index = self.grow(right, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_index,
            right: right_index,
        };
        index
    }

    fn class_counts(&self, sample: &[usize]) -> [usize; N_CLASSES] {
        let mut counts = [0usize; N_CLASSES];
        for &s in sample {
            counts[self.y[s]] += 1;
        }
        counts
    }

    fn best_split(&mut self, sample: &[usize], counts: [usize; N_CLASSES]) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let candidates = rand::seq::index::sample(&mut *self.rng, n_features, self.max_features);
        let n = sample.len();
        let mut best: Option<SplitCandidate> = None;

        for feature in candidates.iter() {
            let column: ArrayView1<f64> = self.x.column(feature);
            let mut order: Vec<(f64, usize)> = sample.iter().map(|&s| (column[s], self.y[s])).collect();
            order.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = [0usize; N_CLASSES];
            for i in 0..n - 1 {
                left[order[i].1] += 1;
                let (value, next) = (order[i].0, order[i + 1].0);
                if next <= value {
                    continue;
                }

                let right = [counts[0] - left[0], counts[1] - left[1]];
                let n_left = (i + 1) as f64;
                let n_right = (n - i - 1) as f64;
                let child_impurity = (n_left * gini(left) + n_right * gini(right)) / n as f64;

                if best.as_ref().map_or(true, |b| child_impurity < b.child_impurity) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        child_impurity,
                    });
                }
            }
        }

        best
    }
}

fn gini(counts: [usize; N_CLASSES]) -> f64 {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

fn leaf(counts: [usize; N_CLASSES]) -> Node {
    let n: usize = counts.iter().sum();
    let proba = if n == 0 {
        [0.5, 0.5]
    } else {
        [counts[0] as f64 / n as f64, counts[1] as f64 / n as f64]
    };
    Node::Leaf { proba }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Class 1 iff feature 0 exceeds 0.5; feature 1 is noise
    fn separable_set(n: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::<f64>::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let signal: f64 = rng.gen();
            x[[i, 0]] = signal;
            x[[i, 1]] = rng.gen();
            y.push(usize::from(signal > 0.5));
        }
        (x, y)
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini([10, 0]), 0.0);
        assert!((gini([5, 5]) - 0.5).abs() < 1e-12);
        assert_eq!(gini([0, 0]), 0.0);
    }

    #[test]
    fn test_learns_threshold_and_importance() {
        let (x, y) = separable_set(300, 1);
        let params = ForestParams {
            n_estimators: 20,
            max_features: Some(2),
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();

        assert!(forest.predict_proba(&[0.9, 0.5]).unwrap()[1] > 0.9);
        assert!(forest.predict_proba(&[0.1, 0.5]).unwrap()[0] > 0.9);
        assert!(forest.feature_importances[0] > forest.feature_importances[1]);
        let total: f64 = forest.feature_importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let (x, y) = separable_set(100, 2);
        let params = ForestParams {
            n_estimators: 5,
            ..ForestParams::default()
        };
        let a = RandomForest::fit(&x, &y, &params).unwrap();
        let b = RandomForest::fit(&x, &y, &params).unwrap();
        assert_eq!(a.feature_importances, b.feature_importances);
        assert_eq!(
            a.predict_proba(&[0.3, 0.7]).unwrap(),
            b.predict_proba(&[0.3, 0.7]).unwrap()
        );
    }

    #[test]
    fn test_depth_limit() {
        let (x, y) = separable_set(200, 3);
        let params = ForestParams {
            n_estimators: 3,
            max_depth: 2,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        assert!(forest.trees.iter().all(|t| t.depth() <= 2));
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn test_rejects_wrong_input_length() {
        let (x, y) = separable_set(50, 4);
        let forest = RandomForest::fit(&x, &y, &ForestParams { n_estimators: 2, ..Default::default() }).unwrap();
        assert!(matches!(
            forest.predict_proba(&[0.1]),
            Err(VoiceError::Prediction(_))
        ));
    }

    #[test]
    fn test_validate_catches_bad_child_index() {
        let forest = RandomForest {
            n_features: 1,
            trees: vec![DecisionTree {
                nodes: vec![Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 0,
                    right: 7,
                }],
            }],
            feature_importances: vec![1.0],
        };
        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_validate_catches_unnormalized_leaf() {
        let forest = |proba| RandomForest {
            n_features: 1,
            trees: vec![DecisionTree {
                nodes: vec![Node::Leaf { proba }],
            }],
            feature_importances: vec![1.0],
        };
        assert!(forest([0.3, 0.3]).validate().is_err());
        assert!(forest([0.9, 0.6]).validate().is_err());
        assert!(forest([0.25, 0.75]).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_labels() {
        let x = Array2::<f64>::zeros((2, 1));
        assert!(RandomForest::fit(&x, &[0, 2], &ForestParams::default()).is_err());
        assert!(RandomForest::fit(&x, &[0], &ForestParams::default()).is_err());
    }
}
