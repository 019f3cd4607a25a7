//! Item classifier interface and the built-in pattern classifier.
//!
//! The engine treats classification as an opaque collaborator: one async
//! call per item, any failure wrapped into the item's result. Real
//! deployments plug in classifiers that call out to network services; the
//! bundled [`PatternClassifier`] covers validation-pipeline and keyword-scan
//! workloads without external dependencies.

use async_trait::async_trait;

use crate::models::errors::EngineResult;
use crate::models::types::{ClassificationOutcome, DerivedRecord};

/// Async classifier for a single item.
///
/// Implementations must be safe for concurrent invocation; the engine calls
/// `classify` from many in-flight tasks at once, bounded by the configured
/// concurrency limit. Errors are caught at the call site and recorded on
/// the item's result; they never abort a batch.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one item
    async fn classify(&self, item: &str) -> EngineResult<ClassificationOutcome>;

    /// Classifier name for logs
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Substring-matching classifier.
///
/// Validation: an item is valid when it is non-empty after trimming. Items
/// whose whitespace needed collapsing are reported as filled, with the
/// normalized form attached. When a pattern is configured, every occurrence
/// in the normalized item produces a derived record whose reading is the
/// match count, so any match is a hit.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    pattern: Option<String>,
}

impl PatternClassifier {
    /// Classifier that flags items containing `pattern` as hits
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
        }
    }

    /// Validation-only classifier: counts valid/filled, never hits
    pub fn validate_only() -> Self {
        Self { pattern: None }
    }

    /// Collapse runs of whitespace into single spaces and trim
    fn normalize(item: &str) -> String {
        item.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl Classifier for PatternClassifier {
    async fn classify(&self, item: &str) -> EngineResult<ClassificationOutcome> {
        let normalized = Self::normalize(item);
        if normalized.is_empty() {
            return Ok(ClassificationOutcome::invalid());
        }

        let mut outcome = ClassificationOutcome::valid();
        if normalized != item {
            outcome = outcome.repaired(normalized.clone());
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.is_empty() {
                let matches = normalized.matches(pattern.as_str()).count();
                if matches > 0 {
                    outcome = outcome.with_record(DerivedRecord::new(
                        "pattern",
                        pattern.clone(),
                        matches as f64,
                    ));
                }
            }
        }

        Ok(outcome)
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_item_is_invalid() {
        let classifier = PatternClassifier::validate_only();
        let outcome = classifier.classify("   ").await.unwrap();
        assert!(!outcome.valid);
        assert!(!outcome.is_hit());
    }

    #[tokio::test]
    async fn test_clean_item_is_valid_not_filled() {
        let classifier = PatternClassifier::validate_only();
        let outcome = classifier.classify("hello world").await.unwrap();
        assert!(outcome.valid);
        assert!(!outcome.filled);
        assert!(outcome.normalized.is_none());
    }

    #[tokio::test]
    async fn test_messy_whitespace_is_repaired() {
        let classifier = PatternClassifier::validate_only();
        let outcome = classifier.classify("  hello   world ").await.unwrap();
        assert!(outcome.valid);
        assert!(outcome.filled);
        assert_eq!(outcome.normalized.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn test_pattern_match_is_hit_with_count() {
        let classifier = PatternClassifier::new("X");
        let outcome = classifier.classify("aXbXc").await.unwrap();
        assert!(outcome.is_hit());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].reading, 2.0);

        let miss = classifier.classify("abc").await.unwrap();
        assert!(!miss.is_hit());
        assert!(miss.records.is_empty());
    }

    #[tokio::test]
    async fn test_validate_only_never_hits() {
        let classifier = PatternClassifier::validate_only();
        let outcome = classifier.classify("anything at all").await.unwrap();
        assert!(!outcome.is_hit());
    }
}
