//! Live run statistics: shared collector plus periodic broadcaster.
//!
//! The collector is the single mutation path for run counters. One mutex
//! guards the whole struct, so two concurrent updates can never interleave
//! a partial write. The scheduler passes absolute running totals, never
//! deltas, so a replayed or reordered update cannot double-count.
//!
//! The broadcaster is an independent background task that publishes a
//! snapshot every interval regardless of batch cadence: a run with huge
//! batches and rare scheduler updates still produces regular heartbeats,
//! enriched with system load sampling.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::utils::sysmon;

/// Broadcast buffer depth; slow subscribers skip ahead past this many
/// snapshots instead of blocking the publish loop
const BROADCAST_CAPACITY: usize = 32;

/// Default publish interval
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

/// Point-in-time statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Items that completed classification so far. Monotonically
    /// non-decreasing within a run; reset only at run start.
    pub total_processed: u64,
    /// Items that validated
    pub total_valid: u64,
    /// Items auto-repaired before validation
    pub total_filled: u64,
    /// Hits discovered
    pub total_hits: u64,
    /// Effective throughput, items per second over wall-clock
    pub items_per_sec: f64,
    /// Seconds since the run started
    pub elapsed_secs: f64,
    /// System CPU usage percent (heartbeat-sampled, 0 when unavailable)
    pub cpu_usage: u8,
    /// System memory usage percent (heartbeat-sampled, 0 when unavailable)
    pub mem_usage: u8,
    /// Most recent log line from the scheduler
    pub log: String,
}

/// Partial update merged field-by-field into the shared stats.
///
/// Counter fields carry absolute values computed by the scheduler; the log
/// line is last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct StatsUpdate {
    pub total_processed: Option<u64>,
    pub total_valid: Option<u64>,
    pub total_filled: Option<u64>,
    pub total_hits: Option<u64>,
    pub items_per_sec: Option<f64>,
    pub log: Option<String>,
}

impl StatsUpdate {
    /// Update carrying only a log line
    pub fn log_line(message: impl Into<String>) -> Self {
        Self {
            log: Some(message.into()),
            ..Self::default()
        }
    }
}

struct Inner {
    stats: RunStats,
    run_started: Option<Instant>,
}

/// Shared statistics collector. Process-wide: created once, counters reset
/// per run without destroying the object, so external observers keep their
/// reference across runs.
pub struct StatsCollector {
    inner: Mutex<Inner>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: RunStats {
                    log: "Idle".to_string(),
                    ..RunStats::default()
                },
                run_started: None,
            }),
        }
    }

    /// Merge a partial update. Safe to call from concurrent completion
    /// callbacks; the lock serializes whole-struct writes.
    pub fn update(&self, update: StatsUpdate) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(v) = update.total_processed {
            inner.stats.total_processed = v;
        }
        if let Some(v) = update.total_valid {
            inner.stats.total_valid = v;
        }
        if let Some(v) = update.total_filled {
            inner.stats.total_filled = v;
        }
        if let Some(v) = update.total_hits {
            inner.stats.total_hits = v;
        }
        if let Some(v) = update.items_per_sec {
            inner.stats.items_per_sec = v;
        }
        if let Some(v) = update.log {
            inner.stats.log = v;
        }
    }

    /// Stamp heartbeat-sampled system load
    pub fn set_system(&self, cpu_usage: u8, mem_usage: u8) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.stats.cpu_usage = cpu_usage;
        inner.stats.mem_usage = mem_usage;
    }

    /// Immutable point-in-time copy, with elapsed seconds recomputed
    pub fn snapshot(&self) -> RunStats {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stats = inner.stats.clone();
        stats.elapsed_secs = inner
            .run_started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        stats
    }

    /// Zero the run counters and stamp a new run start. System load fields
    /// survive the reset; they describe the host, not the run.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let cpu = inner.stats.cpu_usage;
        let mem = inner.stats.mem_usage;
        inner.stats = RunStats {
            cpu_usage: cpu,
            mem_usage: mem,
            log: "Starting scanner...".to_string(),
            ..RunStats::default()
        };
        inner.run_started = Some(Instant::now());
    }
}

/// Periodic snapshot publisher with an explicit start/stop lifecycle.
pub struct StatsBroadcaster {
    collector: Arc<StatsCollector>,
    interval: Duration,
    tx: broadcast::Sender<RunStats>,
}

impl StatsBroadcaster {
    pub fn new(collector: Arc<StatsCollector>, interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            collector,
            interval,
            tx,
        }
    }

    /// Subscribe to published snapshots. Subscribers may connect and
    /// disconnect freely; a lagging receiver skips ahead, it never blocks
    /// the publish loop.
    pub fn subscribe(&self) -> broadcast::Receiver<RunStats> {
        self.tx.subscribe()
    }

    /// Sender handle for fan-out surfaces (e.g. the WebSocket feed)
    pub fn sender(&self) -> broadcast::Sender<RunStats> {
        self.tx.clone()
    }

    /// Spawn the publish loop. Each tick samples system load, folds it into
    /// the collector, recomputes throughput from the last known counters,
    /// and publishes the snapshot.
    pub fn start(&self) -> BroadcasterHandle {
        let collector = self.collector.clone();
        let tx = self.tx.clone();
        let period = self.interval;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sample = sysmon::sample();
                        collector.set_system(sample.cpu_percent, sample.mem_percent);

                        let mut snapshot = collector.snapshot();
                        if snapshot.elapsed_secs > 0.0 {
                            snapshot.items_per_sec =
                                snapshot.total_processed as f64 / snapshot.elapsed_secs;
                        }
                        // No receivers is fine; the loop keeps its cadence
                        let _ = tx.send(snapshot);
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Stats broadcaster shutting down");
                        break;
                    }
                }
            }
        });

        BroadcasterHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running broadcaster. Dropping it without `stop` leaves the
/// task running until process exit; call `stop` for deterministic teardown.
pub struct BroadcasterHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BroadcasterHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_merges_absolute_counters() {
        let collector = StatsCollector::new();
        collector.reset();

        collector.update(StatsUpdate {
            total_processed: Some(10),
            total_valid: Some(8),
            ..Default::default()
        });
        collector.update(StatsUpdate {
            total_processed: Some(20),
            total_hits: Some(1),
            ..Default::default()
        });

        let snap = collector.snapshot();
        assert_eq!(snap.total_processed, 20);
        assert_eq!(snap.total_valid, 8);
        assert_eq!(snap.total_hits, 1);
    }

    #[test]
    fn test_log_is_last_writer_wins() {
        let collector = StatsCollector::new();
        collector.update(StatsUpdate::log_line("first"));
        collector.update(StatsUpdate::log_line("second"));
        assert_eq!(collector.snapshot().log, "second");
    }

    #[test]
    fn test_reset_zeroes_counters_and_keeps_system_fields() {
        let collector = StatsCollector::new();
        collector.reset();
        collector.set_system(42, 17);
        collector.update(StatsUpdate {
            total_processed: Some(100),
            total_hits: Some(3),
            items_per_sec: Some(12.5),
            ..Default::default()
        });

        collector.reset();
        let snap = collector.snapshot();
        assert_eq!(snap.total_processed, 0);
        assert_eq!(snap.total_hits, 0);
        assert_eq!(snap.items_per_sec, 0.0);
        assert_eq!(snap.cpu_usage, 42);
        assert_eq!(snap.mem_usage, 17);
    }

    #[test]
    fn test_snapshot_before_any_run_has_zero_elapsed() {
        let collector = StatsCollector::new();
        let snap = collector.snapshot();
        assert_eq!(snap.elapsed_secs, 0.0);
        assert_eq!(snap.total_processed, 0);
    }

    #[tokio::test]
    async fn test_broadcaster_publishes_and_stops() {
        let collector = Arc::new(StatsCollector::new());
        collector.reset();
        collector.update(StatsUpdate {
            total_processed: Some(7),
            ..Default::default()
        });

        let broadcaster =
            StatsBroadcaster::new(collector.clone(), Duration::from_millis(10));
        let mut rx = broadcaster.subscribe();
        let handle = broadcaster.start();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("broadcast timed out")
            .expect("broadcast channel closed");
        assert_eq!(snapshot.total_processed, 7);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_broadcaster_survives_disconnected_subscribers() {
        let collector = Arc::new(StatsCollector::new());
        let broadcaster =
            StatsBroadcaster::new(collector.clone(), Duration::from_millis(5));

        // Subscribe and immediately drop
        drop(broadcaster.subscribe());
        let handle = broadcaster.start();

        tokio::time::sleep(Duration::from_millis(30)).await;

        // A fresh subscriber still receives heartbeats
        let mut rx = broadcaster.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("broadcast timed out");
        assert!(snapshot.is_ok());

        handle.stop().await;
    }
}
