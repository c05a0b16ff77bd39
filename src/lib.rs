//! Water-ski trick prediction using recurrent networks
//!
//! Parses competition trick-run logs into per-pass trick sequences, buckets them
//! into skill tiers and trains one GRU per tier to predict the next trick.

pub mod data;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An ordered list of trick codes performed by one skier in one pass
pub type TrickSequence = Vec<String>;

/// Skill tier. Each tier has its own vocabulary and its own model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "0_1k")]
    Beginner,
    #[serde(rename = "1k_2k")]
    Intermediate,
    #[serde(rename = "2k_7k")]
    Advanced,
    #[serde(rename = "7k_plus")]
    Pro,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Beginner, Tier::Intermediate, Tier::Advanced, Tier::Pro];

    /// Name used in artifact file names
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Beginner => "0_1k",
            Tier::Intermediate => "1k_2k",
            Tier::Advanced => "2k_7k",
            Tier::Pro => "7k_plus",
        }
    }

    /// Skill level alias shown to users
    pub fn skill_level(&self) -> &'static str {
        match self {
            Tier::Beginner => "beginner",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
            Tier::Pro => "pro",
        }
    }

    /// Tier for a skier's best run score
    pub fn for_score(points: u32) -> Self {
        match points {
            0..=999 => Tier::Beginner,
            1000..=1999 => Tier::Intermediate,
            2000..=6999 => Tier::Advanced,
            _ => Tier::Pro,
        }
    }

    /// Look up a tier by name or skill level
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Tier::ALL
            .into_iter()
            .find(|t| t.name() == name || t.skill_level() == name)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Tier {
    type Err = TrickError;

    fn from_str(s: &str) -> Result<Self> {
        Tier::from_name(s).ok_or_else(|| TrickError::UnknownTier(s.to_string()))
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TrickError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown tier: {0} (use 0_1k, 1k_2k, 2k_7k, 7k_plus or beginner..pro)")]
    UnknownTier(String),

    #[error("No trained model for tier {0} - run `tricks train` first")]
    NoModel(Tier),

    #[error("Vocabulary mismatch for tier {tier}: {message}")]
    VocabMismatch { tier: Tier, message: String },

    #[error("Insufficient data for tier {tier}: {message}")]
    InsufficientData { tier: Tier, message: String },

    #[error("Model record error: {0}")]
    Record(String),
}

pub type Result<T> = std::result::Result<T, TrickError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Raw trick-run logs, parsed and merged in this order
    pub input_files: Vec<String>,
    /// Merged sequences + vocab JSON
    pub merged_path: String,
    /// Directory holding sequences_<tier>.json
    pub sequence_dir: String,
    /// Directory holding per-tier weights and metadata
    pub model_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub seq_len: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub val_split: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub test_split: f64,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                input_files: vec![
                    "data/TrickRunsNationals.txt".to_string(),
                    "data/TrickRunsRegionals.txt".to_string(),
                    "data/TrickRunsNationals24.txt".to_string(),
                    "data/TrickRunsRegionals24.txt".to_string(),
                ],
                merged_path: "data/formatted_sequences.json".to_string(),
                sequence_dir: "data".to_string(),
                model_dir: "model".to_string(),
            },
            model: ModelConfig {
                seq_len: 30,
                embed_dim: 64,
                hidden_dim: 128,
                num_layers: 1,
            },
            training: TrainingConfig {
                epochs: 30,
                batch_size: 32,
                learning_rate: 1e-3,
                val_split: 0.1,
                seed: 1337,
            },
            evaluation: EvaluationConfig {
                test_split: 0.2,
                seed: 42,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrickError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TrickError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrickError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model.seq_len == 0 {
            return Err(TrickError::Config("model.seq_len must be positive".into()));
        }
        if self.model.num_layers == 0 {
            return Err(TrickError::Config("model.num_layers must be positive".into()));
        }
        if self.training.epochs == 0 {
            return Err(TrickError::Config("training.epochs must be positive".into()));
        }
        if self.training.batch_size == 0 {
            return Err(TrickError::Config("training.batch_size must be positive".into()));
        }
        for (name, split) in [
            ("training.val_split", self.training.val_split),
            ("evaluation.test_split", self.evaluation.test_split),
        ] {
            if !(0.0..1.0).contains(&split) {
                return Err(TrickError::Config(format!("{} must be in [0, 1)", name)));
            }
        }
        Ok(())
    }
}
