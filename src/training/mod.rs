//! Model training
//!
//! Training loop, per-tier pipeline and metrics tracking.

pub mod metrics;
pub mod trainer;

pub use metrics::{Metrics, TopKHits, TrainingHistory};
pub use trainer::{train_tier, TierTrainingSummary, TrickTrainer};
