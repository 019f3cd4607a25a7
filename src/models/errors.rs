//! Centralized error handling for the batch engine.
//!
//! Every failure carries a unique string code so log lines and reports can
//! be grepped and monitored without parsing free-form messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - ITEM_xxx: per-item classification errors (recorded as data, never fatal)
//! - SINK_xxx: result sink errors (retried, then logged)
//! - NOTIFY_xxx: notifier errors (logged and swallowed)
//! - CFG_xxx: configuration errors (clamped to defaults)
//! - SCHED_xxx: scheduler faults (the only fatal category)

use std::fmt;

/// Engine-wide error type. All collaborator and scheduler failures flow
/// through this type before they reach a log line or a report field.
#[derive(Debug)]
pub struct EngineError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Create a new EngineError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create EngineError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// True for errors worth another attempt under a retry policy
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// True for faults in the scheduling machinery itself
    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Item Errors
    // ============================================
    /// Classification of a single item failed
    ItemClassifyFailed,
    /// Classification exceeded the per-item timeout
    ItemTimeout,

    // ============================================
    // Sink Errors
    // ============================================
    /// Result sink write failed
    SinkWriteFailed,
    /// Result sink exceeded the collaborator timeout
    SinkTimeout,

    // ============================================
    // Notifier Errors
    // ============================================
    /// Notification delivery failed
    NotifyFailed,
    /// Notifier exceeded the collaborator timeout
    NotifyTimeout,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Invalid configuration value (clamped, never fatal)
    ConfigInvalidValue,

    // ============================================
    // Scheduler Errors (fatal)
    // ============================================
    /// A worker task panicked
    SchedulerWorkerPanic,
    /// Joining a worker task failed
    SchedulerJoinFailed,
    /// The concurrency-limit pool was closed mid-run
    SchedulerPoolClosed,

    // ============================================
    // Feed / External Service Errors
    // ============================================
    /// Stats feed could not bind its listener
    FeedBindFailed,
    /// Outbound HTTP request failed
    HttpRequestFailed,
    /// External service timeout
    ExternalTimeout,

    // ============================================
    // Generic
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            // Item Errors
            Self::ItemClassifyFailed => "ITEM_CLASSIFY_FAILED",
            Self::ItemTimeout => "ITEM_TIMEOUT",

            // Sink Errors
            Self::SinkWriteFailed => "SINK_WRITE_FAILED",
            Self::SinkTimeout => "SINK_TIMEOUT",

            // Notifier Errors
            Self::NotifyFailed => "NOTIFY_FAILED",
            Self::NotifyTimeout => "NOTIFY_TIMEOUT",

            // Configuration Errors
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            // Scheduler Errors
            Self::SchedulerWorkerPanic => "SCHED_WORKER_PANIC",
            Self::SchedulerJoinFailed => "SCHED_JOIN_FAILED",
            Self::SchedulerPoolClosed => "SCHED_POOL_CLOSED",

            // Feed / External Service Errors
            Self::FeedBindFailed => "FEED_BIND_FAILED",
            Self::HttpRequestFailed => "HTTP_REQUEST_FAILED",
            Self::ExternalTimeout => "EXTERNAL_TIMEOUT",

            // Generic
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SinkWriteFailed
                | Self::SinkTimeout
                | Self::HttpRequestFailed
                | Self::ExternalTimeout
        )
    }

    /// Check if error aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SchedulerWorkerPanic | Self::SchedulerJoinFailed | Self::SchedulerPoolClosed
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl EngineError {
    /// Classification failed
    pub fn classify_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ItemClassifyFailed, msg)
    }

    /// Classification timed out
    pub fn item_timeout(timeout: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::ItemTimeout,
            format!("Classification exceeded {}ms budget", timeout.as_millis()),
        )
    }

    /// Sink write failed
    pub fn sink_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SinkWriteFailed, msg)
    }

    /// Sink timed out
    pub fn sink_timeout(timeout: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::SinkTimeout,
            format!("Sink store exceeded {}ms budget", timeout.as_millis()),
        )
    }

    /// Notification failed
    pub fn notify_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotifyFailed, msg)
    }

    /// Worker task panicked
    pub fn worker_panic(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchedulerWorkerPanic, msg)
    }

    /// Worker join failed
    pub fn join_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::with_source(ErrorCode::SchedulerJoinFailed, "Worker join failed", source)
    }

    /// Concurrency pool closed mid-run
    pub fn pool_closed() -> Self {
        Self::new(ErrorCode::SchedulerPoolClosed, "Concurrency pool closed")
    }

    /// Stats feed bind failed
    pub fn feed_bind_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FeedBindFailed, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Engine Result type
pub type EngineResult<T> = Result<T, EngineError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ExternalTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::HttpRequestFailed, "Connection failed")
        } else {
            Self::new(ErrorCode::HttpRequestFailed, err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "JSON serialization error", err)
    }
}

impl From<eyre::Report> for EngineError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}
