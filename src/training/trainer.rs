//! Training loop and per-tier training pipeline

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};

use crate::data::dataset::{TrickBatch, TrickBatcher, TrickDataset};
use crate::data::store::{TierStore, Vocabulary};
use crate::model::checkpoint::{Checkpoint, ModelMetadata};
use crate::model::gru::{TrickGru, TrickGruConfig};
use crate::training::metrics::{Metrics, TopKHits, TrainingHistory};
use crate::{Config, Result, Tier, TrainingConfig, TrickError};

/// Top-k hits for a batch of logits, computed on the host
pub fn batch_hits<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Result<TopKHits> {
    let [_, vocab] = logits.dims();
    let scores = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrickError::Record(format!("{:?}", e)))?;
    let targets: Vec<usize> = targets
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| TrickError::Record(format!("{:?}", e)))?
        .into_iter()
        .map(|t| t as usize)
        .collect();
    Ok(TopKHits::for_batch(&scores, vocab, &targets))
}

/// Trainer for the GRU model
pub struct TrickTrainer<B: AutodiffBackend> {
    model: TrickGru<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, TrickGru<B>, B>,
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> TrickTrainer<B> {
    /// Create a new trainer
    pub fn new(model: TrickGru<B>, config: TrainingConfig, device: B::Device) -> Self {
        let optimizer = AdamConfig::new().init();

        TrickTrainer {
            model,
            optimizer,
            config,
            device,
        }
    }

    /// Train for the configured number of epochs and return the weights with
    /// the lowest validation loss
    pub fn train(
        mut self,
        train_dataset: TrickDataset,
        val_dataset: TrickDataset,
    ) -> Result<(TrickGru<B>, TrainingHistory)> {
        let batcher_train = TrickBatcher::<B>::new(self.device.clone());
        let batcher_val = TrickBatcher::<B::InnerBackend>::new(self.device.clone());

        let train_loader = DataLoaderBuilder::new(batcher_train)
            .batch_size(self.config.batch_size)
            .shuffle(self.config.seed)
            .build(train_dataset);

        let val_loader = DataLoaderBuilder::new(batcher_val)
            .batch_size(self.config.batch_size)
            .build(val_dataset);

        let train_loss: CrossEntropyLoss<B> = CrossEntropyLossConfig::new().init(&self.device);
        let val_loss: CrossEntropyLoss<B::InnerBackend> =
            CrossEntropyLossConfig::new().init(&self.device);

        let mut history = TrainingHistory::new();
        let mut best_model = self.model.clone();

        log::info!("Starting training for {} epochs", self.config.epochs);

        for epoch in 0..self.config.epochs {
            let train_metrics = self.train_epoch(train_loader.iter(), &train_loss)?;
            let val_metrics = self.validate_epoch(val_loader.iter(), &val_loss)?;

            if history.record_epoch(epoch, &train_metrics, &val_metrics) {
                best_model = self.model.clone();
            }

            let shown = epoch + 1;
            if shown == 1 || shown % 5 == 0 {
                log::info!(
                    "  Epoch {:02} | train {} | val {}",
                    shown,
                    train_metrics,
                    val_metrics
                );
            }
        }

        log::info!(
            "  Best val loss {:.4} at epoch {}",
            history.best_val_loss,
            history.best_epoch + 1
        );

        Ok((best_model, history))
    }

    /// Train one epoch
    fn train_epoch(
        &mut self,
        loader: impl Iterator<Item = TrickBatch<B>>,
        loss_fn: &CrossEntropyLoss<B>,
    ) -> Result<Metrics> {
        let mut metrics = Metrics::new();

        for batch in loader {
            let batch_size = batch.targets.dims()[0];

            let logits = self.model.forward(batch.inputs);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            let loss_val: f32 = loss.clone().into_scalar().elem();
            let hits = batch_hits(logits, batch.targets)?;

            // Backward pass
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);

            // Update weights
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            metrics.update(loss_val, batch_size, hits);
        }

        Ok(metrics)
    }

    /// Validate one epoch (no gradient tracking)
    fn validate_epoch(
        &self,
        loader: impl Iterator<Item = TrickBatch<B::InnerBackend>>,
        loss_fn: &CrossEntropyLoss<B::InnerBackend>,
    ) -> Result<Metrics> {
        let model = self.model.valid();
        let mut metrics = Metrics::new();

        for batch in loader {
            let batch_size = batch.targets.dims()[0];

            let logits = model.forward(batch.inputs);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            let loss_val: f32 = loss.into_scalar().elem();

            metrics.update(loss_val, batch_size, batch_hits(logits, batch.targets)?);
        }

        Ok(metrics)
    }

    /// Get the current model
    pub fn model(&self) -> &TrickGru<B> {
        &self.model
    }
}

/// Outcome of training one tier
#[derive(Debug, Clone)]
pub struct TierTrainingSummary {
    pub tier: Tier,
    pub sequences: usize,
    pub vocab_size: usize,
    pub train_samples: usize,
    pub val_samples: usize,
    pub history: TrainingHistory,
}

/// Train one tier end to end and write its checkpoint
pub fn train_tier<B: AutodiffBackend>(
    config: &Config,
    tier: Tier,
    device: &B::Device,
) -> Result<TierTrainingSummary>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    let insufficient = |message: String| TrickError::InsufficientData { tier, message };

    let sequences = TierStore::new(&config.data.sequence_dir).load(tier)?;
    let vocab = Vocabulary::from_sequences(&sequences);
    log::info!("Tier {}: {} sequences, vocab {}", tier, sequences.len(), vocab.len());

    let dataset = TrickDataset::from_sequences(&sequences, &vocab, config.model.seq_len, tier)?;
    log::info!("Tier {}: {} training samples", tier, dataset.len());
    if dataset.len() < 2 {
        return Err(insufficient(format!("{} window samples, need at least 2", dataset.len())));
    }

    let (train_dataset, val_dataset) =
        dataset.split(config.training.val_split, config.training.seed);
    if train_dataset.is_empty() || val_dataset.is_empty() {
        return Err(insufficient(format!(
            "split gave {} train / {} validation samples",
            train_dataset.len(),
            val_dataset.len()
        )));
    }
    let (train_samples, val_samples) = (train_dataset.len(), val_dataset.len());

    let model_config = TrickGruConfig::from_model_config(&config.model, vocab.len());
    let model = TrickGru::<B>::new(device, &model_config);
    let trainer = TrickTrainer::new(model, config.training.clone(), device.clone());
    let (best_model, history) = trainer.train(train_dataset, val_dataset)?;
    if !history.best_val_loss.is_finite() {
        return Err(insufficient(format!(
            "no finite validation loss after {} epochs",
            history.epochs()
        )));
    }

    let mut metadata = ModelMetadata::new(tier, &model_config, config.model.seq_len);
    metadata.best_epoch = Some(history.best_epoch + 1);
    metadata.best_val_loss = Some(history.best_val_loss);

    let vocab_size = vocab.len();
    let checkpoint = Checkpoint {
        model: best_model,
        vocab,
        metadata,
    };
    checkpoint.save(&config.data.model_dir)?;

    Ok(TierTrainingSummary {
        tier,
        sequences: sequences.len(),
        vocab_size,
        train_samples,
        val_samples,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::WindowSample;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn test_config(name: &str) -> Config {
        let root = std::env::temp_dir().join(format!("tricks-train-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let mut config = Config::default();
        config.data.sequence_dir = root.join("data").to_string_lossy().into_owned();
        config.data.model_dir = root.join("model").to_string_lossy().into_owned();
        config.model.seq_len = 4;
        config.model.embed_dim = 8;
        config.model.hidden_dim = 16;
        config.training.epochs = 3;
        config.training.batch_size = 8;
        config.training.val_split = 0.25;
        config
    }

    fn seq(tricks: &[&str]) -> Vec<String> {
        tricks.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_batch_hits() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 1>::from_floats([0.1, 0.9, 0.0, 0.8, 0.1, 0.1], &device)
            .reshape([2, 3]);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, 2], &device);
        let hits = batch_hits(logits, targets).unwrap();
        assert_eq!(hits.top1, 1);
        assert_eq!(hits.top3, 2);
    }

    #[test]
    fn test_training_reduces_loss() {
        let device = Default::default();
        // A fixed cycle is trivially learnable
        let cycle = [0usize, 1, 2, 3];
        let samples: Vec<WindowSample> = (0..64)
            .map(|i| WindowSample {
                history: (0..3).map(|j| cycle[(i + j) % 4]).collect(),
                target: cycle[(i + 3) % 4],
            })
            .collect();
        let train = TrickDataset::from_samples(samples.clone(), 3);
        let val = TrickDataset::from_samples(samples, 3);

        let model_config = TrickGruConfig {
            vocab_size: 4,
            embed_dim: 8,
            hidden_dim: 16,
            num_layers: 1,
        };
        let training = TrainingConfig {
            epochs: 15,
            batch_size: 16,
            learning_rate: 1e-2,
            val_split: 0.1,
            seed: 3,
        };
        let model = TrickGru::<TestAutodiffBackend>::new(&device, &model_config);
        let (_, history) = TrickTrainer::new(model, training, device).train(train, val).unwrap();

        assert_eq!(history.epochs(), 15);
        assert!(history.train_losses.last().unwrap() < history.train_losses.first().unwrap());
        assert!(history.best_val_loss.is_finite());
    }

    /// Mean cross-entropy of a model over a set of samples
    fn mean_loss(model: &TrickGru<TestBackend>, samples: Vec<WindowSample>) -> f64 {
        let device = Default::default();
        let batch = TrickBatcher::<TestBackend>::new(device).batch(samples, &device);
        let loss_fn: CrossEntropyLoss<TestBackend> = CrossEntropyLossConfig::new().init(&device);
        let loss: f32 = loss_fn
            .forward(model.forward(batch.inputs), batch.targets)
            .into_scalar()
            .elem();
        loss as f64
    }

    #[test]
    fn test_train_returns_weights_of_best_validation_epoch() {
        let device = Default::default();
        let cycle = [0usize, 1, 2, 3];
        let window = |i: usize| -> Vec<usize> { (0..3).map(|j| cycle[(i + j) % 4]).collect() };

        // Validation wants a different successor than training teaches, so
        // validation loss climbs as the training cycle is learned
        let train: Vec<WindowSample> = (0..64)
            .map(|i| WindowSample {
                history: window(i),
                target: cycle[(i + 3) % 4],
            })
            .collect();
        let val: Vec<WindowSample> = (0..4)
            .map(|i| WindowSample {
                history: window(i),
                target: cycle[(i + 1) % 4],
            })
            .collect();

        let model_config = TrickGruConfig {
            vocab_size: 4,
            embed_dim: 8,
            hidden_dim: 16,
            num_layers: 1,
        };
        let training = TrainingConfig {
            epochs: 20,
            batch_size: 16,
            learning_rate: 1e-2,
            val_split: 0.1,
            seed: 5,
        };
        let model = TrickGru::<TestAutodiffBackend>::new(&device, &model_config);
        let (best, history) = TrickTrainer::new(model, training, device)
            .train(
                TrickDataset::from_samples(train, 3),
                TrickDataset::from_samples(val.clone(), 3),
            )
            .unwrap();

        let last = *history.val_losses.last().unwrap();
        assert!(history.best_epoch + 1 < history.epochs());
        assert!(history.best_val_loss < last);

        // The returned weights reproduce the best epoch's loss, not the last one
        let returned = mean_loss(&best.valid(), val);
        assert!((returned - history.best_val_loss).abs() < 1e-4);
        assert!(returned < last);
    }

    #[test]
    fn test_train_tier_writes_checkpoint() {
        let config = test_config("tier");
        let store = TierStore::new(&config.data.sequence_dir);
        let sequences = vec![
            seq(&["S", "B", "F", "O"]),
            seq(&["S", "B", "F", "BB"]),
            seq(&["O", "BB", "5B", "5F", "S"]),
            seq(&["B", "F"]),
            seq(&["S", "O", "B"]),
        ];
        store.save(Tier::Intermediate, &sequences).unwrap();

        let device = Default::default();
        let summary =
            train_tier::<TestAutodiffBackend>(&config, Tier::Intermediate, &device).unwrap();

        assert_eq!(summary.sequences, 5);
        assert_eq!(summary.vocab_size, 7);
        assert_eq!(summary.history.epochs(), 3);
        assert!(Checkpoint::<TestBackend>::exists(&config.data.model_dir, Tier::Intermediate));

        let loaded =
            Checkpoint::<TestBackend>::load(&config.data.model_dir, Tier::Intermediate, &device)
                .unwrap();
        assert_eq!(loaded.metadata.best_epoch, Some(summary.history.best_epoch + 1));
        assert_eq!(loaded.metadata.best_val_loss, Some(summary.history.best_val_loss));
        assert_eq!(loaded.seq_len(), 4);
    }

    #[test]
    fn test_train_tier_rejects_tiny_tier() {
        let config = test_config("tiny");
        TierStore::new(&config.data.sequence_dir)
            .save(Tier::Pro, &[seq(&["S", "B"])])
            .unwrap();

        let result = train_tier::<TestAutodiffBackend>(&config, Tier::Pro, &Default::default());
        assert!(matches!(result, Err(TrickError::InsufficientData { tier: Tier::Pro, .. })));
    }

    #[test]
    fn test_train_tier_without_epochs_writes_nothing() {
        let mut config = test_config("noepochs");
        config.training.epochs = 0;
        let sequences = vec![
            seq(&["S", "B", "F", "O"]),
            seq(&["O", "BB", "5B", "5F", "S"]),
            seq(&["S", "O", "B"]),
        ];
        TierStore::new(&config.data.sequence_dir)
            .save(Tier::Advanced, &sequences)
            .unwrap();

        let result = train_tier::<TestAutodiffBackend>(&config, Tier::Advanced, &Default::default());
        assert!(matches!(result, Err(TrickError::InsufficientData { tier: Tier::Advanced, .. })));
        assert!(!Checkpoint::<TestBackend>::exists(&config.data.model_dir, Tier::Advanced));
    }
}
