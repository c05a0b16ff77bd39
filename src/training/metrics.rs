//! Training metrics and evaluation

use std::fmt;

/// The k values reported everywhere
pub const TOP_K: [usize; 3] = [1, 3, 5];

/// Indices of the `k` highest scores, best first. Ties keep the lower index.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k.min(scores.len()));
    order
}

/// Rank of `target` among the scores (0 = best), or None if out of range
pub fn target_rank(scores: &[f32], target: usize) -> Option<usize> {
    let target_score = *scores.get(target)?;
    let better = scores
        .iter()
        .enumerate()
        .filter(|&(i, &s)| s > target_score || (s == target_score && i < target))
        .count();
    Some(better)
}

/// Top-1/3/5 hit counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopKHits {
    pub top1: usize,
    pub top3: usize,
    pub top5: usize,
}

impl TopKHits {
    /// Hits for one prediction row
    pub fn for_row(scores: &[f32], target: usize) -> Self {
        match target_rank(scores, target) {
            Some(rank) => TopKHits {
                top1: usize::from(rank < 1),
                top3: usize::from(rank < 3),
                top5: usize::from(rank < 5),
            },
            None => TopKHits::default(),
        }
    }

    /// Hits summed over a flattened [rows, vocab] block of logits
    pub fn for_batch(logits: &[f32], vocab: usize, targets: &[usize]) -> Self {
        let mut hits = TopKHits::default();
        if vocab == 0 {
            return hits;
        }
        for (row, &target) in logits.chunks(vocab).zip(targets) {
            hits += TopKHits::for_row(row, target);
        }
        hits
    }

    pub fn get(&self, k: usize) -> usize {
        match k {
            1 => self.top1,
            3 => self.top3,
            5 => self.top5,
            _ => 0,
        }
    }
}

impl std::ops::AddAssign for TopKHits {
    fn add_assign(&mut self, other: Self) {
        self.top1 += other.top1;
        self.top3 += other.top3;
        self.top5 += other.top5;
    }
}

/// Metrics accumulated during training/evaluation
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of per-batch mean loss weighted by batch size
    pub loss_sum: f64,
    pub hits: TopKHits,
    /// Total predictions
    pub total: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update metrics with a batch result
    pub fn update(&mut self, mean_loss: f32, batch_size: usize, hits: TopKHits) {
        self.loss_sum += mean_loss as f64 * batch_size as f64;
        self.total += batch_size;
        self.hits += hits;
    }

    /// Get average loss per sample
    pub fn avg_loss(&self) -> f64 {
        if self.total == 0 {
            f64::INFINITY
        } else {
            self.loss_sum / self.total as f64
        }
    }

    /// Fraction of targets found in the top `k`
    pub fn accuracy(&self, k: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits.get(k) as f64 / self.total as f64
        }
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss {:.4} acc {:.3} t3 {:.3} t5 {:.3}",
            self.avg_loss(),
            self.accuracy(1),
            self.accuracy(3),
            self.accuracy(5)
        )
    }
}

/// Training history for tracking progress
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    /// Per epoch (top1, top3, top5)
    pub train_accuracies: Vec<[f64; 3]>,
    pub val_accuracies: Vec<[f64; 3]>,
    pub best_val_loss: f64,
    /// 0-based epoch of the lowest validation loss
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Record metrics for an epoch. Returns true when validation loss improved.
    pub fn record_epoch(&mut self, epoch: usize, train: &Metrics, val: &Metrics) -> bool {
        let accuracies = |m: &Metrics| TOP_K.map(|k| m.accuracy(k));
        self.train_losses.push(train.avg_loss());
        self.val_losses.push(val.avg_loss());
        self.train_accuracies.push(accuracies(train));
        self.val_accuracies.push(accuracies(val));

        if val.avg_loss() < self.best_val_loss {
            self.best_val_loss = val.avg_loss();
            self.best_epoch = epoch;
            true
        } else {
            false
        }
    }

    pub fn epochs(&self) -> usize {
        self.val_losses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_indices() {
        let scores = [0.1, 0.9, 0.5, 0.9, -1.0];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 3, 2]);
        assert_eq!(top_k_indices(&scores, 10).len(), 5);
        assert!(top_k_indices(&[], 3).is_empty());
    }

    #[test]
    fn test_target_rank_matches_top_k() {
        let scores = [0.3, 0.1, 0.7, 0.7, 0.2, 0.0];
        let order = top_k_indices(&scores, scores.len());
        for (rank, &idx) in order.iter().enumerate() {
            assert_eq!(target_rank(&scores, idx), Some(rank));
        }
        assert_eq!(target_rank(&scores, 6), None);
    }

    #[test]
    fn test_hits_for_batch() {
        // 2 rows x 6 classes
        let logits = [
            6.0, 5.0, 4.0, 3.0, 2.0, 1.0, //
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0,
        ];
        let hits = TopKHits::for_batch(&logits, 6, &[0, 1]);
        // row 0: target rank 0; row 1: target rank 4
        assert_eq!(hits, TopKHits { top1: 1, top3: 1, top5: 2 });
    }

    #[test]
    fn test_metrics_weighted_loss() {
        let mut m = Metrics::new();
        m.update(1.0, 3, TopKHits { top1: 1, top3: 2, top5: 3 });
        m.update(2.0, 1, TopKHits { top1: 1, top3: 1, top5: 1 });
        assert!((m.avg_loss() - 1.25).abs() < 1e-9);
        assert!((m.accuracy(1) - 0.5).abs() < 1e-9);
        assert!((m.accuracy(5) - 1.0).abs() < 1e-9);
        m.reset();
        assert_eq!(m.total, 0);
        assert!(m.avg_loss().is_infinite());
    }

    #[test]
    fn test_history_tracks_best_epoch() {
        let mut history = TrainingHistory::new();
        let mut train = Metrics::new();
        train.update(1.0, 1, TopKHits::default());

        let mut val = Metrics::new();
        val.update(2.0, 1, TopKHits::default());
        assert!(history.record_epoch(0, &train, &val));

        val.reset();
        val.update(1.5, 1, TopKHits::default());
        assert!(history.record_epoch(1, &train, &val));

        val.reset();
        val.update(1.5, 1, TopKHits::default());
        assert!(!history.record_epoch(2, &train, &val));

        assert_eq!(history.best_epoch, 1);
        assert_eq!(history.epochs(), 3);
    }
}
