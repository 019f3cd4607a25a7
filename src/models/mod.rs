//! Data models: configuration, error taxonomy, core run types.

pub mod config;
pub mod errors;
pub mod types;

pub use config::ScanConfig;
pub use errors::{EngineError, EngineResult, ErrorCode};
pub use types::{ClassificationOutcome, DerivedRecord, HitRecord, ItemResult, RunReport};
