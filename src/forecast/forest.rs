//! Random forest regression
//!
//! Bootstrap-bagged CART trees split on variance reduction. Predictions are
//! the mean of the trees' leaf values. Training is fully determined by the
//! seed, so identical inputs always yield identical models.

use super::Regressor;
use crate::error::{CalculationError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees
    pub n_trees: usize,
    /// Maximum depth per tree
    pub max_depth: usize,
    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
    /// Seed for bootstrap sampling
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Single regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
    /// Total impurity decrease per feature
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Sum of squared errors of both children
    children_sse: f64,
}

impl RegressionTree {
    /// Fit a tree on the rows of `x` selected by `indices`
    pub fn fit(x: &[Vec<f64>], y: &[f64], indices: &[usize], config: &ForestConfig) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut importances = vec![0.0; n_features];
        let root = Self::grow(x, y, indices.to_vec(), 0, config, &mut importances);
        Self { root, importances }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features.get(*feature).copied().unwrap_or(f64::NAN);
                    node = if v <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }

    fn grow(
        x: &[Vec<f64>],
        y: &[f64],
        indices: Vec<usize>,
        depth: usize,
        config: &ForestConfig,
        importances: &mut [f64],
    ) -> TreeNode {
        let (mean, sse) = mean_and_sse(y, &indices);

        if depth >= config.max_depth
            || indices.len() < config.min_samples_split.max(2)
            || sse <= f64::EPSILON
        {
            return TreeNode::Leaf { value: mean };
        }

        let Some(split) = Self::best_split(x, y, &indices, config.min_samples_leaf.max(1)) else {
            return TreeNode::Leaf { value: mean };
        };

        let gain = sse - split.children_sse;
        if gain <= 0.0 {
            return TreeNode::Leaf { value: mean };
        }
        importances[split.feature] += gain;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[i][split.feature] <= split.threshold);

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(Self::grow(x, y, left, depth + 1, config, importances)),
            right: Box::new(Self::grow(x, y, right, depth + 1, config, importances)),
        }
    }

    fn best_split(
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        min_leaf: usize,
    ) -> Option<SplitCandidate> {
        let n_features = x.first().map_or(0, Vec::len);
        let n = indices.len();
        let mut best: Option<SplitCandidate> = None;

        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();

        let mut order = indices.to_vec();
        for feature in 0..n_features {
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let i = order[pos];
                left_sum += y[i];
                left_sq += y[i] * y[i];

                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let current = x[i][feature];
                let next = x[order[pos + 1]][feature];
                if current == next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let children_sse = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);

                if best.as_ref().map_or(true, |b| children_sse < b.children_sse) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (current + next) / 2.0,
                        children_sse,
                    });
                }
            }
        }

        best
    }
}

fn mean_and_sse(y: &[f64], indices: &[usize]) -> (f64, f64) {
    if indices.is_empty() {
        return (0.0, 0.0);
    }
    let n = indices.len() as f64;
    let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n;
    let sse = indices.iter().map(|&i| (y[i] - mean).powi(2)).sum();
    (mean, sse)
}

/// Random forest ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForestRegressor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.is_empty() || x.len() != y.len() {
            return Err(CalculationError::InvalidParameter {
                calculation: "random_forest".to_string(),
                parameter: "samples".to_string(),
                value: format!("{} rows, {} labels", x.len(), y.len()),
            }
            .into());
        }
        if self.config.n_trees == 0 {
            return Err(CalculationError::InvalidParameter {
                calculation: "random_forest".to_string(),
                parameter: "n_trees".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let n = x.len();
        self.n_features = x[0].len();
        self.trees.clear();

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        for _ in 0..self.config.n_trees {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            self.trees
                .push(RegressionTree::fit(x, y, &bootstrap, &self.config));
        }

        tracing::debug!(
            trees = self.trees.len(),
            samples = n,
            features = self.n_features,
            "Random forest fitted"
        );
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }

    fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            let total: f64 = tree.importances().iter().sum();
            if total <= 0.0 {
                continue;
            }
            for (acc, imp) in importances.iter_mut().zip(tree.importances()) {
                *acc += imp / total;
            }
        }

        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }
        importances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 10.0 } else { 30.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_tree_learns_step_function() {
        let (x, y) = step_data();
        let indices: Vec<usize> = (0..x.len()).collect();
        let tree = RegressionTree::fit(&x, &y, &indices, &ForestConfig::default());

        assert_eq!(tree.predict(&[5.0, 0.0]), 10.0);
        assert_eq!(tree.predict(&[35.0, 2.0]), 30.0);
        assert_eq!(tree.depth(), 1);
        assert!(tree.importances()[0] > 0.0);
        assert_eq!(tree.importances()[1], 0.0);
    }

    #[test]
    fn test_max_depth_zero_is_mean() {
        let (x, y) = step_data();
        let indices: Vec<usize> = (0..x.len()).collect();
        let config = ForestConfig {
            max_depth: 0,
            ..ForestConfig::default()
        };
        let tree = RegressionTree::fit(&x, &y, &indices, &config);
        assert_eq!(tree.predict(&[0.0, 0.0]), 20.0);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 15,
            ..ForestConfig::default()
        };

        let mut a = RandomForestRegressor::new(config.clone());
        let mut b = RandomForestRegressor::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.predict(&[3.0, 1.0]), b.predict(&[3.0, 1.0]));
        assert_eq!(a.n_trees(), 15);
    }

    #[test]
    fn test_forest_predictions_track_target() {
        let (x, y) = step_data();
        let mut forest = RandomForestRegressor::new(ForestConfig {
            n_trees: 25,
            ..ForestConfig::default()
        });
        forest.fit(&x, &y).unwrap();

        assert!(forest.predict(&[2.0, 2.0]) < 15.0);
        assert!(forest.predict(&[38.0, 2.0]) > 25.0);

        let importances = forest.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_fit_rejects_mismatched_input() {
        let mut forest = RandomForestRegressor::default();
        assert!(forest.fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(!forest.is_fitted());
        assert!(forest.predict(&[1.0]).is_nan());
    }
}
