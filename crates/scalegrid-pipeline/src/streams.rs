//! Metric stream intake.
//!
//! The seam where the external metric-streaming collaborator delivers
//! observed values. Each named stream holds a bounded window of samples;
//! predictors subscribed to a stream read its window when the pipeline
//! runs. Streams must be registered before samples are recorded against
//! them, and configuration validation rejects predictors that reference
//! an unregistered stream.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Default per-stream window size.
const DEFAULT_WINDOW: usize = 512;

/// Errors raised while recording metric samples.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("unknown metric stream `{0}`")]
    Unknown(String),
}

/// A single observed metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Registry of named metric streams, each a bounded sample window.
///
/// Shared (`Arc`) between the intake collaborator, which records, and
/// the predictors, which read. Windows evict oldest-first once full.
pub struct MetricStreamHub {
    windows: RwLock<HashMap<String, VecDeque<MetricSample>>>,
    capacity: usize,
}

impl MetricStreamHub {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Hub with a custom per-stream window size.
    pub fn with_window(capacity: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Declare a stream. Idempotent; existing samples are kept.
    pub fn register(&self, stream: impl Into<String>) {
        let stream = stream.into();
        let mut windows = self.windows.write().expect("metric stream hub poisoned");
        windows.entry(stream).or_default();
    }

    pub fn is_registered(&self, stream: &str) -> bool {
        self.windows
            .read()
            .expect("metric stream hub poisoned")
            .contains_key(stream)
    }

    /// Append a sample to a registered stream.
    pub fn record(
        &self,
        stream: &str,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(), StreamError> {
        let mut windows = self.windows.write().expect("metric stream hub poisoned");
        let window = windows
            .get_mut(stream)
            .ok_or_else(|| StreamError::Unknown(stream.to_string()))?;

        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(MetricSample {
            value,
            timestamp: at,
        });
        debug!(stream, value, "metric sample recorded");
        Ok(())
    }

    /// The most recent sample of a stream, if any.
    pub fn latest(&self, stream: &str) -> Option<MetricSample> {
        self.windows
            .read()
            .expect("metric stream hub poisoned")
            .get(stream)
            .and_then(|w| w.back().copied())
    }

    /// The full sample window of a stream, oldest first.
    pub fn window(&self, stream: &str) -> Vec<MetricSample> {
        self.windows
            .read()
            .expect("metric stream hub poisoned")
            .get(stream)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for MetricStreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_requires_registration() {
        let hub = MetricStreamHub::new();
        let err = hub.record("rps", 1.0, Utc::now()).unwrap_err();
        assert_eq!(err, StreamError::Unknown("rps".to_string()));

        hub.register("rps");
        hub.record("rps", 1.0, Utc::now()).unwrap();
        assert_eq!(hub.latest("rps").map(|s| s.value), Some(1.0));
    }

    #[test]
    fn register_is_idempotent() {
        let hub = MetricStreamHub::new();
        hub.register("rps");
        hub.record("rps", 1.0, Utc::now()).unwrap();
        hub.register("rps");
        assert_eq!(hub.window("rps").len(), 1);
    }

    #[test]
    fn window_evicts_oldest_first() {
        let hub = MetricStreamHub::with_window(3);
        hub.register("rps");
        for i in 0..5 {
            hub.record("rps", i as f64, Utc::now()).unwrap();
        }

        let window = hub.window("rps");
        let values: Vec<f64> = window.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(hub.latest("rps").map(|s| s.value), Some(4.0));
    }

    #[test]
    fn unknown_stream_reads_are_empty() {
        let hub = MetricStreamHub::new();
        assert!(hub.latest("nope").is_none());
        assert!(hub.window("nope").is_empty());
        assert!(!hub.is_registered("nope"));
    }
}
