//! GRU model for next-trick prediction
//!
//! Embeds the trick history, runs it through a stack of GRU layers and projects
//! the last hidden state onto the tier's vocabulary.

use burn::module::Module;
use burn::nn::gru::{Gru, GruConfig};
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::record::{FullPrecisionSettings, PrettyJsonFileRecorder, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use crate::data::dataset::windows_to_tensor;
use crate::{ModelConfig, Result, TrickError};

/// Configuration for the GRU model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrickGruConfig {
    /// Number of distinct tricks in the tier
    pub vocab_size: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
}

impl Default for TrickGruConfig {
    fn default() -> Self {
        TrickGruConfig {
            vocab_size: 1,
            embed_dim: 64,
            hidden_dim: 128,
            num_layers: 1,
        }
    }
}

impl TrickGruConfig {
    pub fn from_model_config(config: &ModelConfig, vocab_size: usize) -> Self {
        TrickGruConfig {
            vocab_size,
            embed_dim: config.embed_dim,
            hidden_dim: config.hidden_dim,
            num_layers: config.num_layers,
        }
    }
}

/// Next-trick model
///
/// Architecture:
/// 1. Embedding of trick ids -> [batch, window, embed_dim]
/// 2. GRU layers -> [batch, window, hidden_dim]
/// 3. Linear head on the last time step -> [batch, vocab_size]
#[derive(Module, Debug)]
pub struct TrickGru<B: Backend> {
    embedding: Embedding<B>,
    layers: Vec<Gru<B>>,
    head: Linear<B>,
    hidden_dim: usize,
}

impl<B: Backend> TrickGru<B> {
    pub fn new(device: &B::Device, config: &TrickGruConfig) -> Self {
        let embedding = EmbeddingConfig::new(config.vocab_size, config.embed_dim).init(device);

        let layers = (0..config.num_layers.max(1))
            .map(|i| {
                let input = if i == 0 { config.embed_dim } else { config.hidden_dim };
                GruConfig::new(input, config.hidden_dim, true).init(device)
            })
            .collect();

        let head = LinearConfig::new(config.hidden_dim, config.vocab_size).init(device);

        TrickGru {
            embedding,
            layers,
            head,
            hidden_dim: config.hidden_dim,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `input` - Trick ids [batch, window]
    ///
    /// # Returns
    /// Logits over the vocabulary [batch, vocab_size]
    pub fn forward(&self, input: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input.dims();

        let mut x = self.embedding.forward(input);
        for gru in &self.layers {
            x = gru.forward(x, None);
        }

        let last = x
            .slice([0..batch_size, seq_len - 1..seq_len, 0..self.hidden_dim])
            .reshape([batch_size, self.hidden_dim]);

        self.head.forward(last)
    }

    /// Logits for padded id windows, one row per window
    pub fn logits_for(&self, windows: &[Vec<usize>], device: &B::Device) -> Result<Vec<Vec<f32>>> {
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let logits = self.forward(windows_to_tensor::<B>(windows, device));
        let [rows, vocab] = logits.dims();
        let values = logits
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TrickError::Record(format!("{:?}", e)))?;

        debug_assert_eq!(values.len(), rows * vocab);
        Ok(values.chunks(vocab).map(<[f32]>::to_vec).collect())
    }

    /// Save weights (Burn adds the .mpk extension)
    pub fn save(&self, path: &str) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| TrickError::Record(e.to_string()))
    }

    /// Export weights as pretty JSON for runtimes outside Burn (adds .json)
    pub fn export_json(&self, path: &str) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        PrettyJsonFileRecorder::<FullPrecisionSettings>::new()
            .record(self.clone().into_record(), path.into())
            .map_err(|e| TrickError::Record(e.to_string()))
    }

    /// Load weights saved with [`TrickGru::save`]
    pub fn load(device: &B::Device, path: &str, config: &TrickGruConfig) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.into(), device)
            .map_err(|e| TrickError::Record(e.to_string()))?;

        let model = Self::new(device, config);
        Ok(model.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config() -> TrickGruConfig {
        TrickGruConfig {
            vocab_size: 7,
            embed_dim: 8,
            hidden_dim: 16,
            num_layers: 1,
        }
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = TrickGru::<TestBackend>::new(&device, &small_config());

        let input = Tensor::<TestBackend, 2, Int>::zeros([4, 30], &device);
        let logits = model.forward(input);
        assert_eq!(logits.dims(), [4, 7]);
    }

    #[test]
    fn test_stacked_layers() {
        let device = Default::default();
        let config = TrickGruConfig {
            num_layers: 2,
            ..small_config()
        };
        let model = TrickGru::<TestBackend>::new(&device, &config);
        let rows = model
            .logits_for(&[vec![0, 1, 2], vec![3, 4, 5]], &device)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 7));
        assert!(model.logits_for(&[], &device).unwrap().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let device = Default::default();
        let config = small_config();
        let model = TrickGru::<TestBackend>::new(&device, &config);

        let dir = std::env::temp_dir().join(format!("tricks-gru-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("model");
        let base = base.to_str().unwrap();

        model.save(base).unwrap();
        let loaded = TrickGru::<TestBackend>::load(&device, base, &config).unwrap();

        let window = vec![vec![1, 2, 3, 4]];
        let a = model.logits_for(&window, &device).unwrap();
        let b = loaded.logits_for(&window, &device).unwrap();
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!((x - y).abs() < 1e-6);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
