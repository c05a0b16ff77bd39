//! Burn Dataset implementation for next-trick prediction
//!
//! Each sequence is expanded into (history window, next trick) samples. Short
//! histories are left-padded with id 0.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::store::Vocabulary;
use crate::{Result, Tier, TrickError, TrickSequence};

/// Padding id. Shares its id with the first vocabulary entry.
pub const PAD_ID: usize = 0;

/// A fixed-length history window and the trick that followed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSample {
    pub history: Vec<usize>,
    pub target: usize,
}

/// Left-pad a history to `window` ids, keeping only the most recent ones
pub fn left_pad(history: &[usize], window: usize) -> Vec<usize> {
    if history.len() >= window {
        return history[history.len() - window..].to_vec();
    }
    let mut padded = vec![PAD_ID; window - history.len()];
    padded.extend_from_slice(history);
    padded
}

/// Expand one encoded sequence into training samples.
///
/// Sequences shorter than the window yield one sample per position after the
/// first, using all available history. Longer ones yield only full windows,
/// so a sequence of exactly `window` ids yields nothing.
pub fn window_samples(ids: &[usize], window: usize) -> Vec<WindowSample> {
    if ids.len() < 2 {
        return Vec::new();
    }

    if ids.len() < window {
        (1..ids.len())
            .map(|j| WindowSample {
                history: left_pad(&ids[..j], window),
                target: ids[j],
            })
            .collect()
    } else {
        (0..ids.len() - window)
            .map(|i| WindowSample {
                history: ids[i..i + window].to_vec(),
                target: ids[i + window],
            })
            .collect()
    }
}

/// Shuffle `0..len` with a fixed seed and split off the trailing
/// `held_out` fraction. Returns (kept, held out).
pub fn split_indices(len: usize, held_out: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let split = ((len as f64) * (1.0 - held_out)) as usize;
    let held = indices.split_off(split.min(len));
    (indices, held)
}

/// Windowed samples for one tier
#[derive(Debug, Clone)]
pub struct TrickDataset {
    samples: Vec<WindowSample>,
    window: usize,
}

impl TrickDataset {
    /// Build samples from sequences whose tricks are all in `vocab`
    pub fn from_sequences(
        sequences: &[TrickSequence],
        vocab: &Vocabulary,
        window: usize,
        tier: Tier,
    ) -> Result<Self> {
        let mut samples = Vec::new();

        for sequence in sequences {
            let ids = vocab
                .encode(sequence)
                .into_iter()
                .zip(sequence)
                .map(|(id, trick)| {
                    id.ok_or_else(|| TrickError::VocabMismatch {
                        tier,
                        message: format!("trick '{}' missing from vocabulary", trick),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            samples.extend(window_samples(&ids, window));
        }

        Ok(TrickDataset { samples, window })
    }

    pub fn from_samples(samples: Vec<WindowSample>, window: usize) -> Self {
        TrickDataset { samples, window }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn samples(&self) -> &[WindowSample] {
        &self.samples
    }

    /// Random train/validation split over samples
    pub fn split(self, val_fraction: f64, seed: u64) -> (TrickDataset, TrickDataset) {
        let (train_idx, val_idx) = split_indices(self.samples.len(), val_fraction, seed);
        let pick = |idx: &[usize]| -> Vec<WindowSample> {
            idx.iter().map(|&i| self.samples[i].clone()).collect()
        };
        (
            TrickDataset::from_samples(pick(&train_idx), self.window),
            TrickDataset::from_samples(pick(&val_idx), self.window),
        )
    }
}

impl Dataset<WindowSample> for TrickDataset {
    fn get(&self, index: usize) -> Option<WindowSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of windows for training
#[derive(Debug, Clone)]
pub struct TrickBatch<B: Backend> {
    /// History ids: [batch, window]
    pub inputs: Tensor<B, 2, Int>,
    /// Next-trick ids: [batch]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct TrickBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> TrickBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        TrickBatcher { device }
    }
}

/// Ids as a [rows, window] int tensor
pub fn windows_to_tensor<B: Backend>(windows: &[Vec<usize>], device: &B::Device) -> Tensor<B, 2, Int> {
    let rows = windows.len();
    let window = windows.first().map(Vec::len).unwrap_or(0);
    let data: Vec<i64> = windows.iter().flatten().map(|&id| id as i64).collect();
    Tensor::<B, 1, Int>::from_ints(data.as_slice(), device).reshape([rows, window])
}

impl<B: Backend> Batcher<B, WindowSample, TrickBatch<B>> for TrickBatcher<B> {
    fn batch(&self, items: Vec<WindowSample>, _device: &B::Device) -> TrickBatch<B> {
        let targets: Vec<i64> = items.iter().map(|s| s.target as i64).collect();
        let windows: Vec<Vec<usize>> = items.into_iter().map(|s| s.history).collect();

        TrickBatch {
            inputs: windows_to_tensor::<B>(&windows, &self.device),
            targets: Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_left_pad() {
        assert_eq!(left_pad(&[3, 4], 4), vec![0, 0, 3, 4]);
        assert_eq!(left_pad(&[1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
        assert_eq!(left_pad(&[], 2), vec![0, 0]);
    }

    #[test]
    fn test_short_sequence_uses_all_history() {
        let samples = window_samples(&[5, 6, 7], 4);
        assert_eq!(
            samples,
            vec![
                WindowSample { history: vec![0, 0, 0, 5], target: 6 },
                WindowSample { history: vec![0, 0, 5, 6], target: 7 },
            ]
        );
    }

    #[test]
    fn test_long_sequence_uses_full_windows() {
        let samples = window_samples(&[1, 2, 3, 4, 5], 3);
        assert_eq!(
            samples,
            vec![
                WindowSample { history: vec![1, 2, 3], target: 4 },
                WindowSample { history: vec![2, 3, 4], target: 5 },
            ]
        );
        assert!(window_samples(&[1, 2, 3], 3).is_empty());
        assert!(window_samples(&[9], 3).is_empty());
    }

    #[test]
    fn test_dataset_from_sequences() {
        let seqs = vec![
            vec!["S".to_string(), "B".to_string(), "F".to_string()],
            vec!["O".to_string()],
        ];
        let vocab = Vocabulary::from_sequences(&seqs);
        let dataset = TrickDataset::from_sequences(&seqs, &vocab, 30, Tier::Beginner).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().target, vocab.id("F").unwrap());
        assert!(dataset.get(2).is_none());

        let other = Vocabulary::from_tokens(["S"]);
        assert!(TrickDataset::from_sequences(&seqs, &other, 30, Tier::Beginner).is_err());
    }

    #[test]
    fn test_split_is_seeded_and_complete() {
        let (a_train, a_val) = split_indices(20, 0.1, 7);
        let (b_train, b_val) = split_indices(20, 0.1, 7);
        assert_eq!(a_train, b_train);
        assert_eq!(a_val, b_val);
        assert_eq!(a_train.len(), 18);
        assert_eq!(a_val.len(), 2);

        let mut all: Vec<usize> = a_train.into_iter().chain(a_val).collect();
        all.sort();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batcher = TrickBatcher::<TestBackend>::new(device);
        let items = vec![
            WindowSample { history: vec![0, 1, 2], target: 3 },
            WindowSample { history: vec![1, 2, 3], target: 4 },
        ];
        let batch = batcher.batch(items, &Default::default());
        assert_eq!(batch.inputs.dims(), [2, 3]);
        assert_eq!(batch.targets.dims(), [2]);

        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![3, 4]);
    }
}
