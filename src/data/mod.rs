//! Data ingestion and storage
//!
//! Log parsing, the trick catalogue, per-tier sequence files and windowed
//! training datasets.

pub mod dataset;
pub mod parser;
pub mod store;
pub mod tricks;

pub use dataset::TrickDataset;
pub use parser::TrickLog;
pub use store::{TierStore, Vocabulary};
pub use tricks::{Orientation, PassState, Skis, TrickCatalogue};
