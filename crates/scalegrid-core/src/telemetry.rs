//! Telemetry events, alerts, and the event bus seam.
//!
//! The pipeline reports what it did — per-predictor predictions, the
//! aggregate, the bounded decision, which limit was in effect — as named
//! numeric events, and failures as alerts. Both are posted to an
//! `EventBus`, the seam where the external recording/alerting
//! collaborator plugs in.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named numeric observation with a timestamp and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

/// An operator-facing notification about pipeline behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    /// Short human-readable summary.
    pub message: String,
    /// Full error detail.
    pub detail: String,
}

impl Alert {
    pub fn error(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Error,
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// The external event bus collaborator.
///
/// Implementations must not block for long — the pipeline posts from its
/// hot path. Delivery is fire-and-forget; the pipeline never depends on
/// an event having been recorded.
pub trait EventBus: Send + Sync {
    fn post_metric(&self, event: TelemetryEvent);
    fn post_alert(&self, alert: Alert);
}

/// Discards everything. Useful when no recording collaborator is wired.
#[derive(Debug, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn post_metric(&self, _event: TelemetryEvent) {}
    fn post_alert(&self, _alert: Alert) {}
}

/// Captures everything in memory. The test-side counterpart of a real
/// bus, analogous to opening a state store in memory.
#[derive(Debug, Default)]
pub struct RecordingBus {
    metrics: Mutex<Vec<TelemetryEvent>>,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all metric events posted so far.
    pub fn metrics(&self) -> Vec<TelemetryEvent> {
        self.metrics.lock().expect("recording bus poisoned").clone()
    }

    /// Snapshot of all alerts posted so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().expect("recording bus poisoned").clone()
    }

    /// Metric events with the given name.
    pub fn metrics_named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.metrics()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }
}

impl EventBus for RecordingBus {
    fn post_metric(&self, event: TelemetryEvent) {
        self.metrics
            .lock()
            .expect("recording bus poisoned")
            .push(event);
    }

    fn post_alert(&self, alert: Alert) {
        self.alerts
            .lock()
            .expect("recording bus poisoned")
            .push(alert);
    }
}
