use std::fmt;

use serde::{Deserialize, Serialize};

/// Held-out classification quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    /// `None` when only one class is present.
    pub auc: Option<f64>,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accuracy {:.4}, precision {:.4}, recall {:.4}, auc ",
            self.accuracy, self.precision, self.recall
        )?;
        match self.auc {
            Some(auc) => write!(f, "{auc:.4}"),
            None => f.write_str("n/a"),
        }
    }
}

/// Threshold-0.5 counts plus rank AUC. Precision and recall are zero when
/// their denominators are.
pub fn evaluate(labels: &[bool], probs: &[f64]) -> Metrics {
    let (mut tp, mut fp, mut tn, mut fneg) = (0u64, 0u64, 0u64, 0u64);
    for (&label, &p) in labels.iter().zip(probs) {
        match (label, p >= 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fneg += 1,
        }
    }
    let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    Metrics {
        accuracy: ratio(tp + tn, tp + fp + tn + fneg),
        precision: ratio(tp, tp + fp),
        recall: ratio(tp, tp + fneg),
        auc: roc_auc(labels, probs),
    }
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
pub fn roc_auc(labels: &[bool], probs: &[f64]) -> Option<f64> {
    let n = labels.len().min(probs.len());
    let n_pos = labels[..n].iter().filter(|&&l| l).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg_rank = (i + j + 2) as f64 / 2.0;
        rank_sum += avg_rank * order[i..=j].iter().filter(|&&k| labels[k]).count() as f64;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}
