//! Held-out evaluation of tier models
//!
//! Each test sequence is replayed trick by trick. The model sees the true
//! history up to each position and is scored on the trick that followed.

use std::fmt;

use burn::tensor::backend::Backend;

use crate::data::dataset::{left_pad, split_indices};
use crate::data::store::TierStore;
use crate::model::checkpoint::Checkpoint;
use crate::training::metrics::{TopKHits, TOP_K};
use crate::{Config, Result, Tier, TrickSequence};

/// Held-out portion of a tier's sequences
pub fn test_split(sequences: &[TrickSequence], test_fraction: f64, seed: u64) -> Vec<TrickSequence> {
    let (_, test_idx) = split_indices(sequences.len(), test_fraction, seed);
    test_idx.into_iter().map(|i| sequences[i].clone()).collect()
}

/// Evaluation results for one tier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub tier: Option<Tier>,
    pub vocab_size: usize,
    pub total_sequences: usize,
    pub test_sequences: usize,
    /// Tricks outside the tier vocabulary
    pub oov_skipped: usize,
    pub predictions: usize,
    pub hits: TopKHits,
    /// Runs with at least one evaluable position
    pub runs: usize,
    /// Runs where every prediction hit at k
    pub perfect_runs: TopKHits,
}

impl EvaluationReport {
    pub fn accuracy(&self, k: usize) -> f64 {
        if self.predictions == 0 {
            0.0
        } else {
            self.hits.get(k) as f64 / self.predictions as f64
        }
    }

    pub fn perfect_run_rate(&self, k: usize) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.perfect_runs.get(k) as f64 / self.runs as f64
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tier) = self.tier {
            writeln!(f, "  TIER: {}", tier)?;
        }
        writeln!(
            f,
            "  Total sequences: {}  |  Test set: {}",
            self.total_sequences, self.test_sequences
        )?;
        writeln!(f, "  Vocab size: {}", self.vocab_size)?;
        writeln!(f, "  Total prediction points: {}", self.predictions)?;
        writeln!(f, "  OOV tokens skipped: {}", self.oov_skipped)?;

        if self.predictions == 0 {
            return writeln!(f, "  No valid predictions to evaluate.");
        }

        writeln!(f, "\n  --- Per-trick accuracy ---")?;
        for k in TOP_K {
            writeln!(
                f,
                "  Top-{} accuracy: {}/{} = {:.1}%",
                k,
                self.hits.get(k),
                self.predictions,
                self.accuracy(k) * 100.0
            )?;
        }
        writeln!(f, "\n  --- Perfect run accuracy (all tricks in top N) ---")?;
        for k in TOP_K {
            writeln!(
                f,
                "  Top-{} perfect runs: {}/{} = {:.1}%",
                k,
                self.perfect_runs.get(k),
                self.runs,
                self.perfect_run_rate(k) * 100.0
            )?;
        }
        Ok(())
    }
}

/// Evaluator for a loaded checkpoint
pub struct Evaluator<B: Backend> {
    checkpoint: Checkpoint<B>,
    device: B::Device,
}

impl<B: Backend> Evaluator<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(checkpoint: Checkpoint<B>, device: B::Device) -> Self {
        Evaluator { checkpoint, device }
    }

    /// Replay every sequence and accumulate a report
    pub fn evaluate(&self, sequences: &[TrickSequence]) -> Result<EvaluationReport> {
        let mut report = EvaluationReport {
            tier: Some(self.checkpoint.tier()),
            vocab_size: self.checkpoint.vocab.len(),
            test_sequences: sequences.len(),
            ..Default::default()
        };

        for sequence in sequences {
            self.evaluate_sequence(sequence, &mut report)?;
        }

        Ok(report)
    }

    fn evaluate_sequence(&self, sequence: &[String], report: &mut EvaluationReport) -> Result<()> {
        let ids = self.checkpoint.vocab.encode(sequence);
        report.oov_skipped += ids.iter().filter(|id| id.is_none()).count();

        if !ids.iter().skip(1).any(Option::is_some) {
            return Ok(());
        }

        // Positions with a known target and a non-empty known history
        let mut windows = Vec::new();
        let mut targets = Vec::new();
        for j in 1..ids.len() {
            let Some(target) = ids[j] else { continue };
            let history: Vec<usize> = ids[..j].iter().flatten().copied().collect();
            if history.is_empty() {
                continue;
            }
            windows.push(left_pad(&history, self.checkpoint.seq_len()));
            targets.push(target);
        }

        let logits = self.checkpoint.model.logits_for(&windows, &self.device)?;

        let mut run_hits = TopKHits::default();
        for (row, &target) in logits.iter().zip(&targets) {
            run_hits += TopKHits::for_row(row, target);
        }

        report.predictions += targets.len();
        report.hits += run_hits;
        report.runs += 1;
        report.perfect_runs += TopKHits {
            top1: usize::from(run_hits.top1 == targets.len()),
            top3: usize::from(run_hits.top3 == targets.len()),
            top5: usize::from(run_hits.top5 == targets.len()),
        };

        Ok(())
    }
}

/// Load a tier checkpoint and evaluate it on the held-out split
pub fn evaluate_tier<B: Backend>(config: &Config, tier: Tier, device: B::Device) -> Result<EvaluationReport>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    let checkpoint = Checkpoint::<B>::load(&config.data.model_dir, tier, &device)?;

    let all_sequences = TierStore::new(&config.data.sequence_dir).load(tier)?;
    let sequences = test_split(
        &all_sequences,
        config.evaluation.test_split,
        config.evaluation.seed,
    );
    if checkpoint.seq_len() != config.model.seq_len {
        log::warn!(
            "Tier {} was trained with seq_len {} (config has {}); using the checkpoint value",
            tier,
            checkpoint.seq_len(),
            config.model.seq_len
        );
    }

    let mut report = Evaluator::new(checkpoint, device).evaluate(&sequences)?;
    report.total_sequences = all_sequences.len();
    Ok(report)
}
