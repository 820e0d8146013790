//! Bagged regression forest
//!
//! Each tree is grown on a bootstrap resample of the training rows and split
//! on the threshold that minimises the children's summed squared error.
//! Predictions average the trees. Tree `i` is seeded with `seed + i`, so a
//! fit is fully determined by its inputs and the config.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineResult, ForecastError};

/// Forest hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees (default: 100)
    pub n_trees: usize,
    /// Depth limit; grown until pure when None
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs to be split (default: 2)
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split (default: 1)
    pub min_samples_leaf: usize,
    /// Features tried per split; all when None
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

// ============================================================================
// Regression tree
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    children_sse: f64,
}

/// Borrowed training data plus the growth limits for one tree
struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [f64],
    config: &'a ForestConfig,
    n_features: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &[usize], depth: usize, rng: &mut StdRng) -> Node {
        let n = indices.len();
        let mean = indices.iter().map(|&i| self.labels[i]).sum::<f64>() / n as f64;
        let sse: f64 = indices
            .iter()
            .map(|&i| (self.labels[i] - mean).powi(2))
            .sum();

        let depth_reached = self.config.max_depth.is_some_and(|max| depth >= max);
        if depth_reached || n < self.config.min_samples_split || sse < 1e-12 {
            return Node::Leaf { value: mean };
        }

        let Some(best) = self.best_split(indices, mean, rng) else {
            return Node::Leaf { value: mean };
        };
        if best.children_sse >= sse {
            return Node::Leaf { value: mean };
        }

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.features[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(&left, depth + 1, rng)),
            right: Box::new(self.build(&right, depth + 1, rng)),
        }
    }

    fn best_split(
        &self,
        indices: &[usize],
        mean: f64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let mut candidates: Vec<usize> = (0..self.n_features).collect();
        if let Some(max) = self.config.max_features {
            if max < self.n_features {
                candidates.shuffle(rng);
                candidates.truncate(max.max(1));
            }
        }

        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;
        // (feature value, centred label)
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

        for &feature in &candidates {
            column.clear();
            column.extend(
                indices
                    .iter()
                    .map(|&i| (self.features[i][feature], self.labels[i] - mean)),
            );
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = column.iter().map(|c| c.1).sum();
            let total_sq: f64 = column.iter().map(|c| c.1 * c.1).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for k in 1..n {
                let y = column[k - 1].1;
                left_sum += y;
                left_sq += y * y;

                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let (lo, hi) = (column[k - 1].0, column[k].0);
                if lo == hi {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / k as f64;
                let right_sse = right_sq - right_sum * right_sum / (n - k) as f64;
                let children_sse = left_sse + right_sse;

                if best.as_ref().map_or(true, |b| children_sse < b.children_sse) {
                    let mid = lo + (hi - lo) / 2.0;
                    // Adjacent floats can round the midpoint up onto `hi`
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        children_sse,
                    });
                }
            }
        }

        best
    }
}

/// A single fitted regression tree
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    pub fn predict_one(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }
}

// ============================================================================
// Forest
// ============================================================================

/// Random forest regressor
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Fit on a feature matrix. `feature_names` is only used to label
    /// validation errors and may be shorter than the row width.
    pub fn fit(
        &mut self,
        features: &[Vec<f64>],
        labels: &[f64],
        feature_names: &[String],
    ) -> EngineResult<()> {
        if self.config.n_trees == 0 {
            return Err(ForecastError::InvalidConfig(
                "forest needs at least one tree".to_string(),
            ));
        }
        let n_features = validate_training_data(features, labels, feature_names)?;
        let n_samples = features.len();

        let builder = TreeBuilder {
            features,
            labels,
            config: &self.config,
            n_features,
        };

        self.trees = (0..self.config.n_trees)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                let indices: Vec<usize> = if self.config.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                RegressionTree {
                    root: builder.build(&indices, 0, &mut rng),
                }
            })
            .collect();
        self.n_features = n_features;

        debug!(
            trees = self.trees.len(),
            samples = n_samples,
            features = n_features,
            max_depth = self.trees.iter().map(|t| t.depth()).max().unwrap_or(0),
            "Fitted random forest"
        );

        Ok(())
    }

    /// Mean prediction across trees for a single row
    pub fn predict_one(&self, x: &[f64]) -> EngineResult<f64> {
        if self.trees.is_empty() {
            return Err(ForecastError::ModelFit(
                "predict called before fit".to_string(),
            ));
        }
        if x.len() != self.n_features {
            return Err(ForecastError::ModelFit(format!(
                "inference row has {} features, model was fitted on {}",
                x.len(),
                self.n_features
            )));
        }
        if let Some(col) = x.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::ModelFit(format!(
                "non-finite value {} in inference row, column {}",
                x[col], col
            )));
        }

        let sum: f64 = self.trees.iter().map(|t| t.predict_one(x)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Check shape and finiteness of a training set; returns the row width
fn validate_training_data(
    features: &[Vec<f64>],
    labels: &[f64],
    feature_names: &[String],
) -> EngineResult<usize> {
    if features.is_empty() {
        return Err(ForecastError::ModelFit("empty feature matrix".to_string()));
    }
    if features.len() != labels.len() {
        return Err(ForecastError::ModelFit(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }

    let width = features[0].len();
    if width == 0 {
        return Err(ForecastError::ModelFit("feature rows are empty".to_string()));
    }

    for (row, values) in features.iter().enumerate() {
        if values.len() != width {
            return Err(ForecastError::ModelFit(format!(
                "row {} has {} features, expected {}",
                row,
                values.len(),
                width
            )));
        }
        if let Some(col) = values.iter().position(|v| !v.is_finite()) {
            let name = feature_names
                .get(col)
                .cloned()
                .unwrap_or_else(|| format!("column {}", col));
            return Err(ForecastError::ModelFit(format!(
                "non-finite value {} at row {}, {}",
                values[col], row, name
            )));
        }
    }

    if let Some(row) = labels.iter().position(|v| !v.is_finite()) {
        return Err(ForecastError::ModelFit(format!(
            "non-finite label {} at row {}",
            labels[row], row
        )));
    }

    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        let features: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels: Vec<f64> = (0..100).map(|i| if i < 50 { 10.0 } else { 20.0 }).collect();
        (features, labels)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_trees: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_step_function() {
        let (features, labels) = step_dataset();
        let mut forest = RandomForest::new(small_config());
        forest.fit(&features, &labels, &[]).unwrap();

        assert_eq!(forest.n_trees(), 10);
        assert!((forest.predict_one(&[10.0, 1.0]).unwrap() - 10.0).abs() < 1e-9);
        assert!((forest.predict_one(&[90.0, 0.0]).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_tree_without_bootstrap_fits_exactly() {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let labels: Vec<f64> = (0..40).map(|i| (i * i) as f64).collect();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..Default::default()
        });
        forest.fit(&features, &labels, &[]).unwrap();

        for (x, y) in features.iter().zip(&labels) {
            assert_eq!(forest.predict_one(x).unwrap(), *y);
        }
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let (features, labels) = step_dataset();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 3,
            max_depth: Some(2),
            ..Default::default()
        });
        forest.fit(&features, &labels, &[]).unwrap();
        assert!(forest.trees.iter().all(|t| t.depth() <= 3));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let features: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![(i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()])
            .collect();
        let labels: Vec<f64> = features.iter().map(|r| r[0] * 3.0 - r[1]).collect();

        let mut a = RandomForest::new(small_config());
        let mut b = RandomForest::new(small_config());
        a.fit(&features, &labels, &[]).unwrap();
        b.fit(&features, &labels, &[]).unwrap();

        let x = [0.2, -0.4];
        assert_eq!(a.predict_one(&x).unwrap(), b.predict_one(&x).unwrap());
    }

    #[test]
    fn test_rejects_non_finite_features() {
        let (mut features, labels) = step_dataset();
        features[7][1] = f64::NAN;
        let names = vec!["a".to_string(), "b".to_string()];

        let err = RandomForest::new(small_config())
            .fit(&features, &labels, &names)
            .unwrap_err();
        assert_eq!(err.kind(), "model_fit_failure");
        assert!(err.to_string().contains("row 7, b"), "{}", err);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let mut forest = RandomForest::new(small_config());
        assert!(forest.fit(&[], &[], &[]).is_err());
        assert!(forest
            .fit(&[vec![1.0], vec![2.0]], &[1.0], &[])
            .is_err());
        assert!(forest
            .fit(&[vec![1.0], vec![2.0, 3.0]], &[1.0, 2.0], &[])
            .is_err());
        assert!(forest
            .fit(&[vec![1.0], vec![2.0]], &[1.0, f64::INFINITY], &[])
            .is_err());
    }

    #[test]
    fn test_predict_checks_input() {
        let mut forest = RandomForest::new(small_config());
        assert!(forest.predict_one(&[1.0, 2.0]).is_err());

        let (features, labels) = step_dataset();
        forest.fit(&features, &labels, &[]).unwrap();
        assert!(forest.predict_one(&[1.0]).is_err());
        assert!(forest.predict_one(&[f64::NAN, 1.0]).is_err());
    }
}
