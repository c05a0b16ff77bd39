//! Neural network architecture
//!
//! - GRU: next-trick model over a tier's vocabulary
//! - Checkpoint: weights, vocabulary and metadata saved per tier

pub mod checkpoint;
pub mod gru;

pub use checkpoint::{Checkpoint, ModelMetadata};
pub use gru::{TrickGru, TrickGruConfig};
