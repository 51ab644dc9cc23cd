//! Pipeline error types.
//!
//! Two families: `ConfigError` is raised synchronously from
//! `validate`/`configure` and always names the offending field or
//! sub-component; `PredictionError` is raised from `predict()` after a
//! stage failed at run time. Absent values (no prediction, unknown pool
//! size) are never errors.

use thiserror::Error;

use scalegrid_schedule::ScheduleError;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while validating or applying a pipeline configuration.
///
/// A configuration that produces any of these is never partially
/// applied; the previously active configuration stays in force.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("predictor `{0}`: duplicate id")]
    DuplicatePredictorId(String),

    #[error("predictor `{0}`: id is not a valid expression identifier")]
    InvalidPredictorId(String),

    #[error("predictor `{id}`: unknown type `{kind}`")]
    UnknownPredictorKind { id: String, kind: String },

    #[error("predictor `{id}`: unknown metric stream `{stream}`")]
    UnknownMetricStream { id: String, stream: String },

    #[error("predictor `{id}`: invalid parameters: {detail}")]
    Parameters { id: String, detail: String },

    #[error("no capacity mapping for metric `{metric}` used by predictor `{id}`")]
    UnmappedMetric { id: String, metric: String },

    #[error("capacity mapping `{0}`: duplicate metric")]
    DuplicateMapping(String),

    #[error("capacity mapping `{0}`: amount_per_compute_unit must be finite and > 0")]
    NonPositiveMapping(String),

    #[error("aggregator expression: {0}")]
    Expression(String),

    #[error("scaling policies: machine_delta_tolerance must be finite and >= 0")]
    InvalidTolerance,

    #[error("scaling policies: overprovisioning_grace_secs is out of range")]
    InvalidGracePeriod,

    #[error("capacity limit `{0}`: duplicate id")]
    DuplicateLimitId(String),

    #[error("capacity limit `{id}`: bad schedule: {source}")]
    Schedule {
        id: String,
        #[source]
        source: ScheduleError,
    },

    #[error("capacity limit `{id}`: max {max} < min {min}")]
    LimitBounds { id: String, min: u32, max: u32 },
}

/// Errors raised from a `predict()` run.
///
/// Any of these aborts the whole run — no partial result is ever used
/// and no bounded-prediction telemetry is emitted.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("predictor `{id}` failed: {source}")]
    Predictor {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("predictor task panicked or was cancelled: {0}")]
    Join(String),

    #[error("no capacity mapping for metric `{0}`")]
    UnmappedMetric(String),
}
