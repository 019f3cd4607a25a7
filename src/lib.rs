//! Batchscan Library
//!
//! Concurrent batch scan engine for "scan many items, rate-limit,
//! aggregate stats, report live" workloads:
//! - Fixed-size batches processed strictly in order
//! - Bounded concurrency within a batch, pacing delay between batches
//! - Per-item fail-soft classification via pluggable collaborators
//! - Live stats aggregation with periodic WebSocket broadcast

pub mod classify;
pub mod engine;
pub mod feed;
pub mod models;
pub mod notify;
pub mod pool;
pub mod retry;
pub mod sink;
pub mod stats;
pub mod utils;

pub use classify::{Classifier, PatternClassifier};
pub use engine::{run_batches, BatchScanner};
pub use feed::{FeedHandle, StatsFeed};
pub use models::config::ScanConfig;
pub use models::errors::{EngineError, EngineResult, ErrorCode};
pub use models::types::{ClassificationOutcome, DerivedRecord, HitRecord, ItemResult, RunReport};
pub use notify::{ConsoleNotifier, EventKind, Notifier, NotifyEvent, NullNotifier, Severity, WebhookNotifier};
pub use pool::{bounded_map, CancelFlag};
pub use retry::RetryPolicy;
pub use sink::{JsonlSink, MemorySink, ResultSink};
pub use stats::{BroadcasterHandle, RunStats, StatsBroadcaster, StatsCollector, StatsUpdate};
