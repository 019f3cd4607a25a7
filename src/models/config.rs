//! Engine configuration.
//!
//! All tunables live in one struct with centrally-defined defaults and a
//! single validation pass at the scheduler's entry point. A bad option never
//! fails a run: invalid values are clamped or substituted with the default
//! and logged under CFG_INVALID_VALUE.

use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;

/// Default number of items per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between consecutive batches, a backpressure valve against
/// rate-limited downstreams
pub const DEFAULT_INTER_BATCH_DELAY_MS: u64 = 500;

/// Default per-item classification budget
pub const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 5;

/// Default budget for sink/notifier calls
pub const DEFAULT_COLLAB_TIMEOUT_SECS: u64 = 5;

/// Configuration for one batch run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Items grouped per batch
    pub batch_size: usize,
    /// Max simultaneous in-flight classifications within a batch
    pub concurrency_limit: usize,
    /// Pause inserted between consecutive batches
    pub inter_batch_delay: Duration,
    /// Cap on the hit list embedded in the report (the sink still receives
    /// every hit)
    pub output_limit: Option<usize>,
    /// Per-item classification budget; a stuck classification becomes an
    /// ITEM_TIMEOUT result instead of stalling the batch
    pub item_timeout: Duration,
    /// Budget for a single sink store or notifier delivery
    pub collab_timeout: Duration,
    /// Retry policy for transient sink failures
    pub sink_retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency_limit: num_cpus::get().max(1),
            inter_batch_delay: Duration::from_millis(DEFAULT_INTER_BATCH_DELAY_MS),
            output_limit: None,
            item_timeout: Duration::from_secs(DEFAULT_ITEM_TIMEOUT_SECS),
            collab_timeout: Duration::from_secs(DEFAULT_COLLAB_TIMEOUT_SECS),
            sink_retry: RetryPolicy::default(),
        }
    }
}

impl ScanConfig {
    /// Clamp invalid fields back to their defaults. Called once at the
    /// scheduler's entry point; never fails.
    pub fn validated(mut self) -> Self {
        if self.batch_size == 0 {
            warn!(
                "⚠️ [CFG_INVALID_VALUE] batch_size 0, using default {}",
                DEFAULT_BATCH_SIZE
            );
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.concurrency_limit == 0 {
            let fallback = num_cpus::get().max(1);
            warn!(
                "⚠️ [CFG_INVALID_VALUE] concurrency_limit 0, using {} (available cores)",
                fallback
            );
            self.concurrency_limit = fallback;
        }
        if self.item_timeout.is_zero() {
            warn!(
                "⚠️ [CFG_INVALID_VALUE] item_timeout 0, using default {}s",
                DEFAULT_ITEM_TIMEOUT_SECS
            );
            self.item_timeout = Duration::from_secs(DEFAULT_ITEM_TIMEOUT_SECS);
        }
        if self.collab_timeout.is_zero() {
            warn!(
                "⚠️ [CFG_INVALID_VALUE] collab_timeout 0, using default {}s",
                DEFAULT_COLLAB_TIMEOUT_SECS
            );
            self.collab_timeout = Duration::from_secs(DEFAULT_COLLAB_TIMEOUT_SECS);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.concurrency_limit >= 1);
        assert_eq!(
            config.inter_batch_delay,
            Duration::from_millis(DEFAULT_INTER_BATCH_DELAY_MS)
        );
        assert!(config.output_limit.is_none());
    }

    #[test]
    fn test_zero_fields_clamp_to_defaults() {
        let config = ScanConfig {
            batch_size: 0,
            concurrency_limit: 0,
            item_timeout: Duration::ZERO,
            collab_timeout: Duration::ZERO,
            ..Default::default()
        }
        .validated();

        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.concurrency_limit >= 1);
        assert_eq!(
            config.item_timeout,
            Duration::from_secs(DEFAULT_ITEM_TIMEOUT_SECS)
        );
        assert_eq!(
            config.collab_timeout,
            Duration::from_secs(DEFAULT_COLLAB_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_valid_fields_pass_through() {
        let config = ScanConfig {
            batch_size: 100,
            concurrency_limit: 4,
            inter_batch_delay: Duration::ZERO,
            output_limit: Some(5),
            ..Default::default()
        }
        .validated();

        assert_eq!(config.batch_size, 100);
        assert_eq!(config.concurrency_limit, 4);
        // A zero inter-batch delay is a legitimate "no pacing" choice
        assert_eq!(config.inter_batch_delay, Duration::ZERO);
        assert_eq!(config.output_limit, Some(5));
    }
}
