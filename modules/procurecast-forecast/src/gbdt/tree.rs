use serde::{Deserialize, Serialize};

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    /// Minimum hessian sum on each side of a split.
    pub min_child_weight: f64,
    /// Shrinkage applied to leaf weights.
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Rows with `x[feature] < threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: f64 },
}

/// Nodes stored flat; index 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

const MIN_GAIN: f64 = 1e-12;

impl Tree {
    /// Fit one tree to per-row gradients and hessians over `rows`.
    pub fn fit(x: &[Vec<f64>], grad: &[f64], hess: &[f64], rows: &[usize], params: &TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let mut rows = rows.to_vec();
        tree.grow(x, grad, hess, &mut rows, 0, params);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v < *threshold { *left } else { *right };
                }
                // malformed artifact
                None => return 0.0,
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
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

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        grad: &[f64],
        hess: &[f64],
        rows: &mut [usize],
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let g: f64 = rows.iter().map(|&r| grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| hess[r]).sum();
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: leaf_weight(g, h, params),
        });

        if depth >= params.max_depth {
            return idx;
        }
        let Some(best) = best_split(x, grad, hess, rows, g, h, params) else {
            return idx;
        };

        rows.sort_by(|&a, &b| x[a][best.feature].total_cmp(&x[b][best.feature]));
        let mid = rows.partition_point(|&r| x[r][best.feature] < best.threshold);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(x, grad, hess, left_rows, depth + 1, params);
        let right = self.grow(x, grad, hess, right_rows, depth + 1, params);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }
}

fn leaf_weight(g: f64, h: f64, params: &TreeParams) -> f64 {
    -g / (h + params.lambda) * params.learning_rate
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

/// Exact greedy search over every feature and every gap between distinct values.
fn best_split(
    x: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    rows: &[usize],
    g: f64,
    h: f64,
    params: &TreeParams,
) -> Option<BestSplit> {
    let n_features = rows.first().map(|&r| x[r].len())?;
    let parent = score(g, h, params.lambda);
    let mut best: Option<BestSplit> = None;
    let mut order = rows.to_vec();

    for feature in 0..n_features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let (mut gl, mut hl) = (0.0, 0.0);

        for pair in order.windows(2) {
            let (cur, next) = (pair[0], pair[1]);
            gl += grad[cur];
            hl += hess[cur];
            let (v, v_next) = (x[cur][feature], x[next][feature]);
            if v == v_next {
                continue;
            }
            let (gr, hr) = (g - gl, h - hl);
            if hl < params.min_child_weight || hr < params.min_child_weight {
                continue;
            }
            let gain = 0.5 * (score(gl, hl, params.lambda) + score(gr, hr, params.lambda) - parent);
            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: v + (v_next - v) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            lambda: 0.0,
            min_child_weight: 0.0,
            learning_rate: 1.0,
        }
    }

    #[test]
    fn single_split_separates_gradient_signs() {
        let x = vec![vec![0.0], vec![1.0], vec![5.0], vec![6.0]];
        let grad = [1.0, 1.0, -1.0, -1.0];
        let hess = [1.0; 4];
        let tree = Tree::fit(&x, &grad, &hess, &[0, 1, 2, 3], &params(3));

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[0.5]), -1.0);
        assert_eq!(tree.predict(&[5.5]), 1.0);
        match &tree.nodes()[0] {
            Node::Split { threshold, .. } => assert_eq!(*threshold, 3.0),
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn depth_zero_is_a_single_regularised_leaf() {
        let x = vec![vec![0.0], vec![1.0]];
        let p = TreeParams {
            lambda: 2.0,
            learning_rate: 0.5,
            ..params(0)
        };
        let tree = Tree::fit(&x, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &p);
        assert_eq!(tree.nodes().len(), 1);
        // -(2) / (2 + 2) * 0.5
        assert_eq!(tree.predict(&[0.0]), -0.25);
    }

    #[test]
    fn constant_features_do_not_split() {
        let x = vec![vec![3.0], vec![3.0], vec![3.0]];
        let tree = Tree::fit(&x, &[1.0, -1.0, 1.0], &[1.0; 3], &[0, 1, 2], &params(4));
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn min_child_weight_blocks_small_children() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let p = TreeParams {
            min_child_weight: 2.0,
            ..params(2)
        };
        // only splits leaving >= 2 rows a side qualify, and there are none
        let tree = Tree::fit(&x, &[1.0, -1.0, -1.0], &[1.0; 3], &[0, 1, 2], &p);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn serialises_with_tagged_nodes() {
        let tree = Tree::fit(&[vec![0.0], vec![1.0]], &[1.0, -1.0], &[1.0, 1.0], &[0, 1], &params(1));
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["nodes"][0]["kind"], "split");
        let back: Tree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
