//! Per-tier checkpoints
//!
//! A checkpoint is the trained weights plus the vocabulary and hyper-parameters
//! they were trained with. Files for tier `T` in the model directory:
//!
//! - `tricks_gru_T.mpk`   trained weights
//! - `tricks_gru_T.json`  exported weights for other runtimes
//! - `stoi_T.json`, `itos_T.json`, `vocab_T.json`
//! - `metadata_T.json`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::store::{read_json, write_json, Vocabulary};
use crate::model::gru::{TrickGru, TrickGruConfig};
use crate::{Result, Tier, TrickError};

pub const MODEL_TYPE: &str = "GRU";
pub const INPUT_NAME: &str = "input_ids";
pub const OUTPUT_NAME: &str = "logits";

/// Architecture and training summary written next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub vocab_size: usize,
    pub seq_len: usize,
    pub model_type: String,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub tier: Tier,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    /// 1-based epoch of the kept weights, unset until training has run
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ModelMetadata {
    pub fn new(tier: Tier, config: &TrickGruConfig, seq_len: usize) -> Self {
        ModelMetadata {
            vocab_size: config.vocab_size,
            seq_len,
            model_type: MODEL_TYPE.to_string(),
            embed_dim: config.embed_dim,
            hidden_dim: config.hidden_dim,
            num_layers: config.num_layers,
            tier,
            input_names: vec![INPUT_NAME.to_string()],
            output_names: vec![OUTPUT_NAME.to_string()],
            best_epoch: None,
            best_val_loss: None,
            created_at: Utc::now(),
        }
    }

    pub fn model_config(&self) -> TrickGruConfig {
        TrickGruConfig {
            vocab_size: self.vocab_size,
            embed_dim: self.embed_dim,
            hidden_dim: self.hidden_dim,
            num_layers: self.num_layers,
        }
    }
}

/// File locations for one tier
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    dir: PathBuf,
    tier: Tier,
}

impl CheckpointPaths {
    pub fn new(dir: impl Into<PathBuf>, tier: Tier) -> Self {
        CheckpointPaths {
            dir: dir.into(),
            tier,
        }
    }

    fn file(&self, stem: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{}{}", stem, self.tier.name(), ext))
    }

    /// Weights path without extension (the recorder appends it)
    pub fn weights_base(&self) -> PathBuf {
        self.file("tricks_gru", "")
    }

    pub fn weights(&self) -> PathBuf {
        self.file("tricks_gru", ".mpk")
    }

    pub fn export(&self) -> PathBuf {
        self.file("tricks_gru", ".json")
    }

    pub fn stoi(&self) -> PathBuf {
        self.file("stoi", ".json")
    }

    pub fn itos(&self) -> PathBuf {
        self.file("itos", ".json")
    }

    pub fn vocab(&self) -> PathBuf {
        self.file("vocab", ".json")
    }

    pub fn metadata(&self) -> PathBuf {
        self.file("metadata", ".json")
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| TrickError::Config(format!("Non UTF-8 path: {}", path.display())))
}

/// Trained model bound to the vocabulary it was trained on
#[derive(Debug)]
pub struct Checkpoint<B: Backend> {
    pub model: TrickGru<B>,
    pub vocab: Vocabulary,
    pub metadata: ModelMetadata,
}

impl<B: Backend> Checkpoint<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn tier(&self) -> Tier {
        self.metadata.tier
    }

    pub fn seq_len(&self) -> usize {
        self.metadata.seq_len
    }

    /// Whether all files of a tier checkpoint are present
    pub fn exists(dir: impl AsRef<Path>, tier: Tier) -> bool {
        let paths = CheckpointPaths::new(dir.as_ref(), tier);
        [paths.weights(), paths.stoi(), paths.itos(), paths.vocab(), paths.metadata()]
            .iter()
            .all(|p| p.exists())
    }

    /// Write weights, exported weights, vocabulary files and metadata
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let paths = CheckpointPaths::new(dir, self.tier());

        self.model.save(path_str(&paths.weights_base())?)?;
        self.model.export_json(path_str(&paths.weights_base())?)?;

        write_json(&paths.stoi(), &self.vocab.stoi_map())?;
        write_json(&paths.itos(), &self.vocab.itos_map())?;
        write_json(&paths.vocab(), &self.vocab.tokens())?;
        write_json(&paths.metadata(), &self.metadata)?;

        log::info!(
            "Saved tier {} checkpoint to {} (vocab {})",
            self.tier(),
            dir.display(),
            self.vocab.len()
        );
        Ok(())
    }

    /// Load a tier checkpoint, refusing files that belong to another tier or
    /// disagree on the vocabulary.
    pub fn load(dir: impl AsRef<Path>, tier: Tier, device: &B::Device) -> Result<Self> {
        let dir = dir.as_ref();
        if !Self::exists(dir, tier) {
            return Err(TrickError::NoModel(tier));
        }
        let paths = CheckpointPaths::new(dir, tier);

        let metadata: ModelMetadata = read_json(&paths.metadata())?;
        let tokens: Vec<String> = read_json(&paths.vocab())?;
        let stoi: BTreeMap<String, usize> = read_json(&paths.stoi())?;
        let itos: BTreeMap<usize, String> = read_json(&paths.itos())?;

        let vocab = Vocabulary::from_tokens(tokens.iter().cloned());
        validate(tier, &metadata, &tokens, &vocab, &stoi, &itos)?;

        let model = TrickGru::load(device, path_str(&paths.weights_base())?, &metadata.model_config())?;

        log::debug!("Loaded tier {} checkpoint (vocab {})", tier, vocab.len());
        Ok(Checkpoint {
            model,
            vocab,
            metadata,
        })
    }
}

fn validate(
    tier: Tier,
    metadata: &ModelMetadata,
    tokens: &[String],
    vocab: &Vocabulary,
    stoi: &BTreeMap<String, usize>,
    itos: &BTreeMap<usize, String>,
) -> Result<()> {
    let mismatch = |message: String| TrickError::VocabMismatch { tier, message };

    if metadata.tier != tier {
        return Err(mismatch(format!("metadata is for tier {}", metadata.tier)));
    }
    if vocab.tokens() != tokens {
        return Err(mismatch("vocab file is not sorted and unique".to_string()));
    }
    if metadata.vocab_size != vocab.len() {
        return Err(mismatch(format!(
            "metadata vocab_size {} but vocab has {} entries",
            metadata.vocab_size,
            vocab.len()
        )));
    }
    if *stoi != vocab.stoi_map() {
        return Err(mismatch("stoi does not match vocab".to_string()));
    }
    if *itos != vocab.itos_map() {
        return Err(mismatch("itos does not match vocab".to_string()));
    }
    Ok(())
}
