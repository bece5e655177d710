//! Running-average metric tracking and binary confusion statistics.

use std::{collections::HashMap, fmt};

use burn::tensor::{backend::Backend, Tensor};

/// Running aggregate for one named metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRecord {
    /// Sum of all observed values.
    pub sum: f64,
    /// Number of observed values.
    pub count: usize,
    /// `sum / count`, recomputed from scratch on every update.
    pub avg: f64,
}

/// Accumulates running averages for named scalar metrics.
///
/// One monitor is created fresh per epoch; metric names are created on
/// first update and reported in first-insertion order.
pub struct MetricMonitor {
    float_precision: usize,
    order: Vec<String>,
    metrics: HashMap<String, MetricRecord>,
}

impl Default for MetricMonitor {
    fn default() -> Self {
        Self::new(3)
    }
}

impl MetricMonitor {
    pub fn new(float_precision: usize) -> Self {
        Self {
            float_precision,
            order: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    /// Clear all tracked metrics back to the empty state.
    pub fn reset(&mut self) {
        self.order.clear();
        self.metrics.clear();
    }

    /// Add a value to the named metric, creating it at zero when unseen.
    pub fn update(&mut self, name: &str, value: f64) {
        if !self.metrics.contains_key(name) {
            self.order.push(name.to_owned());
        }
        let record = self.metrics.entry(name.to_owned()).or_default();

        record.sum += value;
        record.count += 1;
        record.avg = record.sum / record.count as f64;
    }

    /// Per-metric averages in first-insertion order.
    pub fn averages(&self) -> Vec<f64> {
        self.order
            .iter()
            .map(|name| self.metrics[name].avg)
            .collect()
    }

    /// Average of a single metric, if it has been updated at all.
    pub fn average(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(|record| record.avg)
    }
}

impl fmt::Display for MetricMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .order
            .iter()
            .map(|name| {
                format!(
                    "{name}: {avg:.precision$}",
                    avg = self.metrics[name].avg,
                    precision = self.float_precision
                )
            })
            .collect();
        write!(f, "{}", parts.join(" | "))
    }
}

/// Per-image confusion counts at a fixed decision threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryStats {
    pub tp: Vec<f64>,
    pub fp: Vec<f64>,
    pub fn_: Vec<f64>,
    pub tn: Vec<f64>,
}

/// Reduction mode for [`f1_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F1Reduction {
    /// F1 from each image's own pooled counts, then averaged over images.
    MicroImagewise,
    /// F1 from counts pooled across the whole batch.
    Micro,
}

/// Compute per-image tp/fp/fn/tn counts for binary predictions.
///
/// Probabilities above the threshold count as positive; targets are
/// treated as positive above 0.5.
///
/// # Shapes
///
/// - probabilities: `[batch_size, 1, height, width]`
/// - targets: `[batch_size, 1, height, width]`
pub fn binary_stats<B: Backend>(
    probabilities: &Tensor<B, 4>,
    targets: &Tensor<B, 4>,
    threshold: f64,
) -> BinaryStats {
    let [batch_size, ..] = probabilities.dims();

    let pred_pos = probabilities
        .clone()
        .greater_elem(threshold)
        .float()
        .reshape([batch_size as i32, -1]);
    let target_pos = targets
        .clone()
        .greater_elem(0.5)
        .float()
        .reshape([batch_size as i32, -1]);

    let pred_neg = Tensor::ones_like(&pred_pos) - pred_pos.clone();
    let target_neg = Tensor::ones_like(&target_pos) - target_pos.clone();

    let tp = (pred_pos.clone() * target_pos.clone()).sum_dim(1);
    let fp = (pred_pos * target_neg.clone()).sum_dim(1);
    let fn_ = (pred_neg.clone() * target_pos).sum_dim(1);
    let tn = (pred_neg * target_neg).sum_dim(1);

    let to_host = |counts: Tensor<B, 2>| -> Vec<f64> {
        counts
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .expect("confusion counts convert to f64")
    };

    BinaryStats {
        tp: to_host(tp),
        fp: to_host(fp),
        fn_: to_host(fn_),
        tn: to_host(tn),
    }
}

/// F1 score from confusion counts.
///
/// A zero denominator (no positives predicted or present) scores 1.0:
/// an all-background image predicted all-background is a perfect match.
pub fn f1_score(stats: &BinaryStats, reduction: F1Reduction) -> f64 {
    let f1 = |tp: f64, fp: f64, fn_: f64| -> f64 {
        let denominator = 2.0 * tp + fp + fn_;
        if denominator == 0.0 {
            1.0
        } else {
            2.0 * tp / denominator
        }
    };

    match reduction {
        F1Reduction::MicroImagewise => {
            let images = stats.tp.len();
            if images == 0 {
                return 0.0;
            }
            let total: f64 = (0..images)
                .map(|i| f1(stats.tp[i], stats.fp[i], stats.fn_[i]))
                .sum();
            total / images as f64
        }
        F1Reduction::Micro => {
            let tp: f64 = stats.tp.iter().sum();
            let fp: f64 = stats.fp.iter().sum();
            let fn_: f64 = stats.fn_.iter().sum();
            f1(tp, fp, fn_)
        }
    }
}
