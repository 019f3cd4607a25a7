//! Core batch scheduler.
//!
//! Orchestrates one run: partitions the input into fixed-size batches,
//! classifies each batch's items with bounded concurrency, forwards hits to
//! the sink, merges batch-level totals into the shared stats, paces between
//! batches, and assembles the final report.
//!
//! Failure discipline: a single item's classifier error is data on that
//! item's result. Sink and notifier errors are logged. Only a fault in the
//! scheduling machinery itself (worker panic, failed join, closed pool)
//! aborts the run, and even that surfaces as `success=false` on the report
//! rather than an `Err`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::models::config::ScanConfig;
use crate::models::errors::EngineError;
use crate::models::types::{HitRecord, ItemResult, RunReport};
use crate::notify::{EventKind, Notifier, NotifyEvent, Severity};
use crate::pool::{bounded_map, CancelFlag};
use crate::sink::ResultSink;
use crate::stats::{StatsCollector, StatsUpdate};

/// Batch scheduler: the single entry point for a run.
pub struct BatchScanner {
    config: ScanConfig,
    classifier: Arc<dyn Classifier>,
    sink: Arc<dyn ResultSink>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<StatsCollector>,
    cancel: CancelFlag,
}

impl BatchScanner {
    /// Build a scanner with its own stats collector.
    pub fn new(
        config: ScanConfig,
        classifier: Arc<dyn Classifier>,
        sink: Arc<dyn ResultSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_stats(config, classifier, sink, notifier, Arc::new(StatsCollector::new()))
    }

    /// Build a scanner sharing an existing collector (so a broadcaster and
    /// its subscribers keep observing across runs).
    pub fn with_stats(
        config: ScanConfig,
        classifier: Arc<dyn Classifier>,
        sink: Arc<dyn ResultSink>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            config: config.validated(),
            classifier,
            sink,
            notifier,
            stats,
            cancel: CancelFlag::new(),
        }
    }

    /// Live stats read accessor
    pub fn stats(&self) -> crate::stats::RunStats {
        self.stats.snapshot()
    }

    /// Shared stats collector, for wiring up a broadcaster
    pub fn stats_collector(&self) -> Arc<StatsCollector> {
        self.stats.clone()
    }

    /// Cancellation handle. Takes effect at the next batch boundary at the
    /// latest; in-flight items in the current batch drain.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the whole input through batched, bounded-concurrency
    /// classification and return the final report.
    pub async fn run(&self, items: Vec<String>) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        self.stats.reset();

        let total_items = items.len();
        let batch_size = self.config.batch_size;
        let batch_count = total_items.div_ceil(batch_size);

        info!(
            "🚀 Run {}: {} items in {} batches of up to {} ({} in flight)",
            run_id, total_items, batch_count, batch_size, self.config.concurrency_limit
        );
        self.stats.update(StatsUpdate::log_line(format!(
            "🚀 Starting batch run of {} items.",
            total_items
        )));

        if items.is_empty() {
            let report = self.assemble_report(run_id, started, RunTotals::default(), vec![], false, None);
            self.notify_run_complete(&report).await;
            return report;
        }

        let mut totals = RunTotals::default();
        let mut hits: Vec<HitRecord> = Vec::new();
        let mut fatal: Option<EngineError> = None;
        let mut cancelled = false;

        for (batch_idx, batch) in items.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                info!("🛑 Run {} cancelled at batch boundary {}/{}", run_id, batch_idx, batch_count);
                cancelled = true;
                break;
            }

            debug!("⏳ Batch {}/{}...", batch_idx + 1, batch_count);
            self.stats.update(StatsUpdate::log_line(format!(
                "⏳ Batch {}/{}...",
                batch_idx + 1,
                batch_count
            )));

            let results = match self.run_batch(batch_idx, batch).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("❌ Run {} aborted in batch {}: {}", run_id, batch_idx + 1, e);
                    fatal = Some(e);
                    break;
                }
            };

            for result in results.into_iter().flatten() {
                totals.processed += 1;
                self.absorb_result(&mut totals, &mut hits, result).await;
            }

            // Merge absolute totals after the batch; the collector never
            // sees deltas, so reordered updates cannot double-count.
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                totals.processed as f64 / elapsed
            } else {
                0.0
            };
            self.stats.update(StatsUpdate {
                total_processed: Some(totals.processed),
                total_valid: Some(totals.valid),
                total_filled: Some(totals.filled),
                total_hits: Some(totals.hits),
                items_per_sec: Some(rate),
                log: None,
            });

            self.notify_best_effort(
                NotifyEvent::new(
                    EventKind::BatchCompleted,
                    Severity::Info,
                    format!("Batch {}/{} complete", batch_idx + 1, batch_count),
                )
                .with_detail("processed", totals.processed.to_string())
                .with_detail("hits", totals.hits.to_string()),
            )
            .await;

            let is_last = batch_idx + 1 == batch_count;
            if !is_last && !self.cancel.is_cancelled() && !self.config.inter_batch_delay.is_zero() {
                debug!(
                    "⏱️ Waiting {}ms before next batch...",
                    self.config.inter_batch_delay.as_millis()
                );
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        let report = self.assemble_report(run_id, started, totals, hits, cancelled, fatal);
        self.stats.update(StatsUpdate::log_line(format!(
            "✅ Batch run complete: {} items processed.",
            report.total_processed
        )));
        self.notify_run_complete(&report).await;
        report
    }

    /// Dispatch one batch through the bounded parallel map. Every item's
    /// classifier call carries its own timeout; failures become data on the
    /// item result instead of unwinding.
    async fn run_batch(
        &self,
        batch_idx: usize,
        batch: &[String],
    ) -> Result<Vec<Option<ItemResult>>, EngineError> {
        let classifier = self.classifier.clone();
        let item_timeout = self.config.item_timeout;
        let base_index = batch_idx * self.config.batch_size;

        bounded_map(
            batch.to_vec(),
            self.config.concurrency_limit,
            self.cancel.clone(),
            move |offset, item| {
                let classifier = classifier.clone();
                async move {
                    let index = base_index + offset;
                    match tokio::time::timeout(item_timeout, classifier.classify(&item)).await {
                        Ok(Ok(outcome)) => ItemResult::classified(index, item, outcome),
                        Ok(Err(e)) => ItemResult::errored(index, item, &e),
                        Err(_) => {
                            ItemResult::errored(index, item, &EngineError::item_timeout(item_timeout))
                        }
                    }
                }
            },
        )
        .await
    }

    /// Fold one item result into the running totals; forward hits.
    async fn absorb_result(
        &self,
        totals: &mut RunTotals,
        hits: &mut Vec<HitRecord>,
        result: ItemResult,
    ) {
        if let Some(error) = &result.error {
            warn!("🔥 Item {} failed: {}", result.index, error);
            self.stats.update(StatsUpdate::log_line(format!(
                "Error processing item {}: {}",
                result.index, error
            )));
            return;
        }

        let Some(outcome) = &result.outcome else {
            return;
        };
        if outcome.valid {
            totals.valid += 1;
        }
        if outcome.filled {
            totals.filled += 1;
        }

        if let Some(hit) = HitRecord::from_result(&result) {
            totals.hits += 1;
            info!("💰 Hit at item {}: {}", hit.index, hit.item);
            self.forward_hit(&hit).await;
            hits.push(hit);
        }
    }

    /// Send a hit to the sink (bounded wait, retried per policy, then
    /// logged) and emit a hit-found notification.
    async fn forward_hit(&self, hit: &HitRecord) {
        let sink = self.sink.clone();
        let collab_timeout = self.config.collab_timeout;
        let stored = self
            .config
            .sink_retry
            .run(|| {
                let sink = sink.clone();
                let hit = hit.clone();
                async move {
                    match tokio::time::timeout(collab_timeout, sink.store(&hit)).await {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::sink_timeout(collab_timeout)),
                    }
                }
            })
            .await;

        if let Err(e) = stored {
            // The hit stays in the in-memory report regardless
            warn!("⚠️ Sink store failed for item {}: {}", hit.index, e);
        }

        let mut event = NotifyEvent::new(
            EventKind::HitFound,
            Severity::Critical,
            format!("💰 Hit found at item {}", hit.index),
        )
        .with_detail("index", hit.index.to_string());
        if let Some(record) = hit.records.first() {
            event = event
                .with_detail("label", record.label.clone())
                .with_detail("reading", record.reading.to_string());
        }
        self.notify_best_effort(event).await;
    }

    fn assemble_report(
        &self,
        run_id: String,
        started: Instant,
        totals: RunTotals,
        mut hits: Vec<HitRecord>,
        cancelled: bool,
        fatal: Option<EngineError>,
    ) -> RunReport {
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 && totals.processed > 0 {
            totals.processed as f64 / elapsed
        } else {
            0.0
        };

        // The cap applies to the report's embedded list only; the sink
        // already received every hit.
        let hits_truncated = match self.config.output_limit {
            Some(cap) if hits.len() > cap => {
                let dropped = hits.len() - cap;
                hits.truncate(cap);
                dropped
            }
            _ => 0,
        };

        RunReport {
            run_id,
            success: fatal.is_none(),
            total_processed: totals.processed,
            total_valid: totals.valid,
            total_filled: totals.filled,
            total_hits: totals.hits,
            elapsed_secs: elapsed,
            items_per_sec: rate,
            hits,
            hits_truncated,
            cancelled,
            error: fatal.map(|e| e.to_string()),
        }
    }

    async fn notify_run_complete(&self, report: &RunReport) {
        let (severity, message) = if !report.success {
            (
                Severity::Error,
                format!(
                    "❌ Run failed: {}",
                    report.error.as_deref().unwrap_or("unknown error")
                ),
            )
        } else if report.total_hits > 0 {
            (
                Severity::Success,
                format!("💰 Run finished! Hits found: {}", report.total_hits),
            )
        } else {
            (
                Severity::Info,
                "⚡ Run finished. No hits found.".to_string(),
            )
        };

        self.notify_best_effort(
            NotifyEvent::new(EventKind::RunCompleted, severity, message)
                .with_detail("run_id", report.run_id.clone())
                .with_detail("processed", report.total_processed.to_string())
                .with_detail("elapsed_secs", format!("{:.2}", report.elapsed_secs)),
        )
        .await;
    }

    /// Deliver a notification without letting a slow or broken notifier
    /// affect the run. Never retried within the same run.
    async fn notify_best_effort(&self, event: NotifyEvent) {
        match tokio::time::timeout(self.config.collab_timeout, self.notifier.notify(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("⚠️ Notifier failed: {}", e),
            Err(_) => warn!(
                "⚠️ Notifier exceeded {}ms budget",
                self.config.collab_timeout.as_millis()
            ),
        }
    }
}

/// One-shot entry point: build a scanner around the collaborators and run
/// a single batch job.
pub async fn run_batches(
    items: Vec<String>,
    config: ScanConfig,
    classifier: Arc<dyn Classifier>,
    sink: Arc<dyn ResultSink>,
    notifier: Arc<dyn Notifier>,
) -> RunReport {
    BatchScanner::new(config, classifier, sink, notifier)
        .run(items)
        .await
}

/// Running totals for one run, owned by the scheduler loop.
#[derive(Debug, Default, Clone, Copy)]
struct RunTotals {
    processed: u64,
    valid: u64,
    filled: u64,
    hits: u64,
}
