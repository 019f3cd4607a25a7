//! Core data structures for batch classification runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::errors::EngineError;

/// One derived reading produced by a classifier: a labelled reference with
/// a numeric reading (the generic shape of "address X holds balance Y").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    /// Which derivation produced this record (e.g. a backend or rule name)
    pub label: String,
    /// Derived reference (address, key, path, ...)
    pub reference: String,
    /// Numeric reading; a non-zero reading makes the result a hit
    pub reading: f64,
}

impl DerivedRecord {
    pub fn new(label: impl Into<String>, reference: impl Into<String>, reading: f64) -> Self {
        Self {
            label: label.into(),
            reference: reference.into(),
            reading,
        }
    }
}

/// Outcome of classifying a single item. Immutable once produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    /// Item passed validation
    pub valid: bool,
    /// Item was auto-repaired before validation succeeded
    pub filled: bool,
    /// Repaired form of the item, when `filled` is set
    pub normalized: Option<String>,
    /// Derived records; any non-zero reading marks the outcome as a hit
    pub records: Vec<DerivedRecord>,
}

impl ClassificationOutcome {
    /// An invalid item with no derived data
    pub fn invalid() -> Self {
        Self::default()
    }

    /// A valid item with no derived data
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    /// Attach a derived record
    pub fn with_record(mut self, record: DerivedRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Mark the item as auto-repaired into `normalized`
    pub fn repaired(mut self, normalized: impl Into<String>) -> Self {
        self.filled = true;
        self.normalized = Some(normalized.into());
        self
    }

    /// Hit criterion: at least one derived record with a non-zero reading
    pub fn is_hit(&self) -> bool {
        self.records.iter().any(|r| r.reading != 0.0)
    }
}

/// Per-item result: either an outcome or a captured error, never both.
/// A single item's failure is data here, not an exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// Position in the input sequence
    pub index: usize,
    /// Source item as submitted
    pub item: String,
    /// Classification outcome, if classification completed
    pub outcome: Option<ClassificationOutcome>,
    /// Captured error description, if classification failed
    pub error: Option<String>,
}

impl ItemResult {
    /// Successful classification
    pub fn classified(index: usize, item: String, outcome: ClassificationOutcome) -> Self {
        Self {
            index,
            item,
            outcome: Some(outcome),
            error: None,
        }
    }

    /// Failed classification, error captured as data
    pub fn errored(index: usize, item: String, error: &EngineError) -> Self {
        Self {
            index,
            item,
            outcome: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_hit(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.is_hit())
    }
}

/// A persisted-worthy hit: the item (repaired form if it was filled), its
/// position, and the derived records that made it interesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitRecord {
    /// Position in the input sequence
    pub index: usize,
    /// Item text; the repaired form when the classifier filled it
    pub item: String,
    /// Derived records with non-zero readings
    pub records: Vec<DerivedRecord>,
    /// Discovery timestamp
    pub found_at: DateTime<Utc>,
}

impl HitRecord {
    /// Build from a hit item result. Returns None when the result is not a
    /// hit (no outcome, or no non-zero reading).
    pub fn from_result(result: &ItemResult) -> Option<Self> {
        let outcome = result.outcome.as_ref()?;
        if !outcome.is_hit() {
            return None;
        }
        let item = outcome
            .normalized
            .clone()
            .unwrap_or_else(|| result.item.clone());
        Some(Self {
            index: result.index,
            item,
            records: outcome.records.clone(),
            found_at: Utc::now(),
        })
    }
}

/// Final report for one run. Produced exactly once, owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id for this run
    pub run_id: String,
    /// True when the run executed to completion (even with zero hits);
    /// false only when the scheduling machinery itself faulted
    pub success: bool,
    /// Items that went through classification
    pub total_processed: u64,
    /// Items that validated
    pub total_valid: u64,
    /// Items that were auto-repaired
    pub total_filled: u64,
    /// Hits discovered
    pub total_hits: u64,
    /// Wall-clock seconds from run start, inter-batch delays included
    pub elapsed_secs: f64,
    /// Effective end-to-end rate (items per second)
    pub items_per_sec: f64,
    /// Hits in first-discovered order, possibly truncated by output_limit
    pub hits: Vec<HitRecord>,
    /// Number of hits dropped from this list by output_limit
    pub hits_truncated: usize,
    /// Run was cancelled before all batches completed
    pub cancelled: bool,
    /// Error description when success is false
    pub error: Option<String>,
}

impl RunReport {
    /// Human-readable summary block for CLI output
    pub fn summary(&self) -> String {
        let mut out = format!(
            "\n✅ Scan completed{}\n\
             📊 Summary:\n\
             \x20 - Processed: {} items\n\
             \x20 - Valid: {}\n\
             \x20 - Filled: {}\n\
             \x20 - Hits: {}\n\
             \x20 - Time: {:.2} seconds\n\
             \x20 - Rate: {:.2} items/second\n",
            if self.cancelled { " (cancelled early)" } else { "" },
            self.total_processed,
            self.total_valid,
            self.total_filled,
            self.total_hits,
            self.elapsed_secs,
            self.items_per_sec,
        );
        if self.hits_truncated > 0 {
            out.push_str(&format!(
                "  - ({} hits omitted from this report by output limit)\n",
                self.hits_truncated
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_criterion_requires_nonzero_reading() {
        let no_records = ClassificationOutcome::valid();
        assert!(!no_records.is_hit());

        let zero_reading = ClassificationOutcome::valid()
            .with_record(DerivedRecord::new("primary", "ref-1", 0.0));
        assert!(!zero_reading.is_hit());

        let hit = ClassificationOutcome::valid()
            .with_record(DerivedRecord::new("primary", "ref-1", 0.0))
            .with_record(DerivedRecord::new("secondary", "ref-2", 2.5));
        assert!(hit.is_hit());
    }

    #[test]
    fn test_hit_record_prefers_normalized_item() {
        let outcome = ClassificationOutcome::valid()
            .repaired("fixed item")
            .with_record(DerivedRecord::new("primary", "ref", 1.0));
        let result = ItemResult::classified(7, "raw  item".to_string(), outcome);

        let hit = HitRecord::from_result(&result).unwrap();
        assert_eq!(hit.index, 7);
        assert_eq!(hit.item, "fixed item");
        assert_eq!(hit.records.len(), 1);
    }

    #[test]
    fn test_hit_record_none_for_non_hit() {
        let result = ItemResult::classified(0, "plain".to_string(), ClassificationOutcome::valid());
        assert!(HitRecord::from_result(&result).is_none());

        let errored = ItemResult::errored(
            1,
            "bad".to_string(),
            &EngineError::classify_failed("boom"),
        );
        assert!(HitRecord::from_result(&errored).is_none());
        assert!(errored.error.as_deref().unwrap().contains("ITEM_CLASSIFY_FAILED"));
    }

    #[test]
    fn test_report_serializes_round_trip() {
        let report = RunReport {
            run_id: "test-run".to_string(),
            success: true,
            total_processed: 23,
            total_valid: 20,
            total_filled: 2,
            total_hits: 1,
            elapsed_secs: 4.2,
            items_per_sec: 5.47,
            hits: vec![],
            hits_truncated: 0,
            cancelled: false,
            error: None,
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_processed, 23);
        assert!(parsed.success);
    }
}
