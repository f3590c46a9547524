use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{Tree, TreeParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub rounds: usize,
    pub tree: TreeParams,
    /// Weight applied to the gradient and hessian of positive rows.
    pub scale_pos_weight: f64,
    /// Initial probability before any tree.
    pub base_score: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            rounds: 100,
            tree: TreeParams {
                max_depth: 6,
                lambda: 1.0,
                min_child_weight: 1.0,
                learning_rate: 0.3,
            },
            scale_pos_weight: 1.0,
            base_score: 0.5,
        }
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

/// An additive ensemble of trees over a logistic link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    params: BoosterParams,
    base_margin: f64,
    trees: Vec<Tree>,
}

impl Booster {
    /// Fit on the rows of `x` selected by `rows`. Every row of `x` must have
    /// the same width.
    pub fn fit(x: &[Vec<f64>], y: &[bool], rows: &[usize], params: BoosterParams) -> Self {
        let base_margin = logit(params.base_score);
        let mut margins = vec![base_margin; x.len()];
        let mut grad = vec![0.0; x.len()];
        let mut hess = vec![0.0; x.len()];
        let mut trees = Vec::with_capacity(params.rounds);

        for round in 0..params.rounds {
            for &r in rows {
                let p = sigmoid(margins[r]);
                let (target, weight) = if y[r] {
                    (1.0, params.scale_pos_weight)
                } else {
                    (0.0, 1.0)
                };
                grad[r] = (p - target) * weight;
                hess[r] = (p * (1.0 - p)).max(1e-16) * weight;
            }

            let tree = Tree::fit(x, &grad, &hess, rows, &params.tree);
            for &r in rows {
                margins[r] += tree.predict(&x[r]);
            }
            debug!(round, depth = tree.depth(), "Boosting round");
            trees.push(tree);
        }

        Self {
            params,
            base_margin,
            trees,
        }
    }

    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.predict_margin(row))
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
