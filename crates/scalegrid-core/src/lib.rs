//! scalegrid-core — shared types for the ScaleGrid prediction pipeline.
//!
//! Holds the domain types that flow through the pipeline (`Prediction`,
//! `PoolSizeSummary`), the configuration document (`PipelineConfig` and
//! its sub-sections), and the telemetry seam (`EventBus`, `TelemetryEvent`,
//! `Alert`) that the pipeline posts to.
//!
//! All configuration types are serde-serializable so a config document can
//! be deserialized from JSON as a unit and compared for equality after a
//! failed reconfiguration attempt.

pub mod telemetry;
pub mod types;

pub use telemetry::{Alert, AlertSeverity, EventBus, NullBus, RecordingBus, TelemetryEvent};
pub use types::*;
