//! Prediction and evaluation
//!
//! Load trained tier models, recommend next tricks and score held-out runs.

pub mod evaluate;
pub mod inference;

pub use evaluate::{evaluate_tier, EvaluationReport, Evaluator};
pub use inference::{filter_legal, LegalPrediction, Predictor, TrickPrediction};
