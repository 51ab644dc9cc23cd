//! Domain and configuration types for the prediction pipeline.
//!
//! The pipeline turns metric observations into a bounded pool-size
//! decision. These types describe both the values that flow through it
//! per run (`Prediction`, `PoolSizeSummary`) and the configuration that
//! is validated and applied as a unit (`PipelineConfig`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a configured predictor.
pub type PredictorId = String;

/// Unique identifier for a capacity limit rule.
pub type LimitId = String;

// ── Predictions ───────────────────────────────────────────────────

/// Unit of a prediction's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionUnit {
    /// In units of the raw subscribed metric (requests/s, jobs, bytes).
    Raw,
    /// In the pipeline's normalized capacity unit.
    ComputeUnits,
}

/// A single capacity estimate produced by one predictor for one run.
///
/// Produced fresh on every pipeline run and discarded after consumption;
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Name of the metric this estimate is expressed in.
    pub metric: String,
    pub value: f64,
    pub unit: PredictionUnit,
    /// When the estimate was produced.
    pub timestamp: DateTime<Utc>,
}

/// Current size of the managed resource pool, as reported by the pool
/// collaborator.
///
/// The whole summary may be unknown (the collaborator failed or timed
/// out); callers pass `Option<PoolSizeSummary>` and the pipeline treats
/// absence as a first-class state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizeSummary {
    /// The size the pool is converging towards.
    pub desired: u32,
    /// Machines currently allocated (may still be starting).
    pub allocated: u32,
    /// Machines currently serving work.
    pub active: u32,
}

// ── Configuration ─────────────────────────────────────────────────

/// Configuration for one predictor instance.
///
/// Predictors are instantiated as a unit when the pipeline is
/// (re)configured and replaced wholesale on reconfiguration, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Unique id; also the aggregator binding name, so it must be a
    /// valid scripting identifier.
    pub id: PredictorId,
    /// Discriminant resolved against the predictor registry
    /// ("last_value", "linear_trend", "constant", ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The metric stream this predictor subscribes to.
    pub metric_stream: String,
    /// Kind-specific parameters, deserialized by the factory.
    #[serde(default)]
    pub parameters: Value,
}

fn default_true() -> bool {
    true
}

/// Conversion ratio from one raw metric to compute units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityMapping {
    pub metric: String,
    /// How much of the raw metric one compute unit absorbs. Must be > 0.
    pub amount_per_compute_unit: f64,
}

/// Oscillation-damping policy parameters.
///
/// A zero value disables the corresponding policy — it is omitted from
/// the chain, not installed as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScalingPolicyConfig {
    /// Relative pool-size change below which a prediction is suppressed.
    pub machine_delta_tolerance: f64,
    /// How long an uninterrupted scale-down streak must last before a
    /// scale-down is allowed through, in seconds.
    pub overprovisioning_grace_secs: u64,
}

/// A rank-ordered, time-scheduled `[min, max]` bound on the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityLimit {
    pub id: LimitId,
    /// Among limits in effect at the same instant, the highest rank wins
    /// (ties broken by ascending id).
    pub rank: i64,
    /// 7-field cron expression: seconds minutes hours day-of-month month
    /// day-of-week [year], evaluated against UTC.
    pub schedule: String,
    pub min: u32,
    /// Must be >= `min`.
    pub max: u32,
}

/// The whole pipeline configuration, validated and applied as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub predictors: Vec<PredictorConfig>,
    pub capacity_mappings: Vec<CapacityMapping>,
    /// Single scripting expression combining the predictor outputs. An
    /// empty string means "no aggregation configured" (the aggregate is
    /// always absent).
    pub aggregator: String,
    pub scaling_policies: ScalingPolicyConfig,
    pub capacity_limits: Vec<CapacityLimit>,
}

impl PipelineConfig {
    /// Iterate the enabled predictor configs.
    pub fn enabled_predictors(&self) -> impl Iterator<Item = &PredictorConfig> {
        self.predictors.iter().filter(|p| p.enabled)
    }

    /// Look up the conversion ratio for a raw metric.
    pub fn mapping_for(&self, metric: &str) -> Option<&CapacityMapping> {
        self.capacity_mappings.iter().find(|m| m.metric == metric)
    }
}
