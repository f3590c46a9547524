//! Gradient-boosted regression trees for binary classification.
//!
//! Second-order boosting on logistic loss: each round fits one tree to the
//! gradient and hessian of the current margins, with L2-regularised leaf
//! weights scaled by the learning rate.

mod booster;
mod tree;

pub use booster::{sigmoid, Booster, BoosterParams};
pub use tree::{Node, Tree, TreeParams};
