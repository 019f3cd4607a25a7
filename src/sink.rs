//! Result sinks: where discovered hits get persisted.
//!
//! Sinks are fire-and-forget from the engine's perspective: a failed store
//! is retried per policy, then logged, and the hit stays in the in-memory
//! report regardless. Implementations must bound their own waits; the
//! engine additionally wraps every store in the collaborator timeout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::errors::{EngineError, EngineResult};
use crate::models::types::HitRecord;

/// Persistence target for hits.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist one hit
    async fn store(&self, hit: &HitRecord) -> EngineResult<()>;
}

/// In-memory sink backed by a concurrent map, keyed by item index.
/// Used by the CLI when no hits file is configured, and by tests.
#[derive(Default)]
pub struct MemorySink {
    hits: DashMap<usize, HitRecord>,
    store_calls: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store() invocations (including overwrites)
    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Stored hits in input-sequence order
    pub fn hits(&self) -> Vec<HitRecord> {
        let mut all: Vec<HitRecord> = self.hits.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|h| h.index);
        all
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn store(&self, hit: &HitRecord) -> EngineResult<()> {
        self.store_calls.fetch_add(1, Ordering::Relaxed);
        self.hits.insert(hit.index, hit.clone());
        Ok(())
    }
}

/// Append-only JSONL sink: one hit per line.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn store(&self, hit: &HitRecord) -> EngineResult<()> {
        let mut line = serde_json::to_string(hit)
            .map_err(|e| EngineError::sink_failed(format!("Serialize hit failed: {}", e)))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                EngineError::sink_failed(format!("Open {} failed: {}", self.path.display(), e))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            EngineError::sink_failed(format!("Write {} failed: {}", self.path.display(), e))
        })?;

        debug!("💾 Hit {} appended to {}", hit.index, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::DerivedRecord;
    use chrono::Utc;

    fn hit(index: usize) -> HitRecord {
        HitRecord {
            index,
            item: format!("item-{}", index),
            records: vec![DerivedRecord::new("primary", "ref", 1.0)],
            found_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_stores_and_orders() {
        let sink = MemorySink::new();
        sink.store(&hit(5)).await.unwrap();
        sink.store(&hit(1)).await.unwrap();
        sink.store(&hit(3)).await.unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.store_calls(), 3);
        let ordered: Vec<usize> = sink.hits().iter().map(|h| h.index).collect();
        assert_eq!(ordered, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_parseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.jsonl");
        let sink = JsonlSink::new(&path);

        sink.store(&hit(0)).await.unwrap();
        sink.store(&hit(1)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: HitRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.item, "item-0");
    }

    #[tokio::test]
    async fn test_jsonl_sink_unwritable_path_errors() {
        let sink = JsonlSink::new("/nonexistent-dir/hits.jsonl");
        let err = sink.store(&hit(0)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
