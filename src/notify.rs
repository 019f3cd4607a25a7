//! Event notification: discrete run-level events for external reporting.
//!
//! Notifiers are best-effort collaborators. Delivery failures are logged
//! and swallowed, never retried within the same run, and never affect the
//! run outcome.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::errors::{EngineError, EngineResult};

const USER_AGENT_STR: &str = "batchscan/0.1";
const WEBHOOK_TIMEOUT_SECS: u64 = 5;

/// Notification severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Success => "✅",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
            Severity::Critical => "🔥",
        }
    }
}

/// Discrete event kinds emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    BatchCompleted,
    HitFound,
    RunCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BatchCompleted => "batch_completed",
            EventKind::HitFound => "hit_found",
            EventKind::RunCompleted => "run_completed",
        }
    }
}

/// One notification: kind, severity, message, structured details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub kind: EventKind,
    pub severity: Severity,
    pub message: String,
    pub details: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl NotifyEvent {
    pub fn new(kind: EventKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Best-effort event receiver.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent) -> EngineResult<()>;
}

/// Notifier that drops every event. Default for embedded use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _event: NotifyEvent) -> EngineResult<()> {
        Ok(())
    }
}

/// Notifier that renders events as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, event: NotifyEvent) -> EngineResult<()> {
        let details = if event.details.is_empty() {
            String::new()
        } else {
            let joined: Vec<String> = event
                .details
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!(" | {}", joined.join(" "))
        };

        match event.severity {
            Severity::Info | Severity::Success => info!(
                "{} [{}] {}{}",
                event.severity.emoji(),
                event.kind.as_str(),
                event.message,
                details
            ),
            Severity::Warning => warn!(
                "{} [{}] {}{}",
                event.severity.emoji(),
                event.kind.as_str(),
                event.message,
                details
            ),
            Severity::Error | Severity::Critical => error!(
                "{} [{}] {}{}",
                event.severity.emoji(),
                event.kind.as_str(),
                event.message,
                details
            ),
        }
        Ok(())
    }
}

/// Notifier that POSTs each event as JSON to a configured webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> EngineResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STR));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .map_err(|e| EngineError::notify_failed(format!("Build HTTP client failed: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotifyEvent) -> EngineResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(EngineError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::notify_failed(format!(
                "Webhook returned HTTP {}",
                status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_strings() {
        assert_eq!(Severity::Info.as_str(), "INFO");
        assert_eq!(Severity::Critical.as_str(), "CRITICAL");
        assert_eq!(Severity::Success.emoji(), "✅");
    }

    #[test]
    fn test_event_serializes_with_details() {
        let event = NotifyEvent::new(EventKind::HitFound, Severity::Critical, "Hit at item 3")
            .with_detail("index", "3")
            .with_detail("reading", "2.5");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"HitFound\""));
        assert!(json.contains("\"index\":\"3\""));

        let parsed: NotifyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, EventKind::HitFound);
        assert_eq!(parsed.details.len(), 2);
    }

    #[tokio::test]
    async fn test_console_notifier_accepts_all_severities() {
        let notifier = ConsoleNotifier;
        for severity in [
            Severity::Info,
            Severity::Success,
            Severity::Warning,
            Severity::Error,
            Severity::Critical,
        ] {
            notifier
                .notify(NotifyEvent::new(EventKind::RunCompleted, severity, "test"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_webhook_notifier_unreachable_host_errors() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook").unwrap();
        let err = notifier
            .notify(NotifyEvent::new(EventKind::RunCompleted, Severity::Info, "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.code,
            crate::models::errors::ErrorCode::HttpRequestFailed
                | crate::models::errors::ErrorCode::ExternalTimeout
        ));
    }
}
