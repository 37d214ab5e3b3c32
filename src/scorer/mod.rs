pub mod classifier;
pub mod engine;
pub mod listing_score;
pub mod opportunity;

pub use classifier::CategoryCatalog;
pub use engine::{EngineSettings, ScoringEngine};
