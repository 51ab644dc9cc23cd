//! Pipeline orchestrator.
//!
//! `AutoscalePipeline` drives one run end to end: concurrent predictor
//! fan-out, unit mapping, aggregation, policy damping, and the scheduled
//! capacity clamp. It also owns the two-phase `validate`/`configure`
//! contract — a configuration is applied only when every sub-component
//! builds, by swapping in a complete replacement pipeline; any failure
//! leaves the previous configuration untouched.
//!
//! Overlapping `predict()` calls are not serialized here; the trigger
//! collaborator is expected to invoke the pipeline at most once at a
//! time. A reconfiguration during a run is safe: the run completes
//! against the pipeline instance it started with.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use scalegrid_core::{
    Alert, PipelineConfig, PoolSizeSummary, Prediction, PredictorId, TelemetryEvent,
};

use crate::aggregator::Aggregator;
use crate::context::PipelineContext;
use crate::error::{ConfigError, ConfigResult, PredictionError};
use crate::limits::CapacityLimitRegistry;
use crate::mapper::CapacityMapper;
use crate::policy::PolicyChain;
use crate::predictor::{self, Predictor, PredictorRegistry};

/// Telemetry event names posted by the pipeline.
pub mod events {
    pub const PREDICTION: &str = "prediction";
    pub const COMPUTE_UNIT_PREDICTION: &str = "compute_unit_prediction";
    pub const AGGREGATE_PREDICTION: &str = "aggregate_prediction";
    pub const BOUNDED_PREDICTION: &str = "bounded_prediction";
    pub const MIN_CAPACITY_LIMIT: &str = "min_capacity_limit";
    pub const MAX_CAPACITY_LIMIT: &str = "max_capacity_limit";
}

/// Health surface of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// Most recent run failure, if any run has failed.
    pub last_fault: Option<String>,
    /// Ids of the active (enabled) predictors.
    pub predictors: Vec<PredictorId>,
    pub policies: usize,
    pub capacity_limits: usize,
}

/// One fully built configuration: every sub-component constructed from
/// the same `PipelineConfig`. Replaced wholesale on reconfiguration.
struct BuiltPipeline {
    config: PipelineConfig,
    predictors: Vec<Arc<dyn Predictor>>,
    mapper: CapacityMapper,
    aggregator: Aggregator,
    /// Policies carry per-run state (the grace-period streak), so the
    /// chain sits behind a lock; it is never held across an await.
    policies: Mutex<PolicyChain>,
    limits: CapacityLimitRegistry,
}

impl BuiltPipeline {
    /// The empty pipeline: no predictors, no policies, no limits.
    fn empty() -> Self {
        Self {
            config: PipelineConfig::default(),
            predictors: Vec::new(),
            mapper: CapacityMapper::from_mappings(&[])
                .unwrap_or_else(|_| unreachable!("empty mapping table always builds")),
            aggregator: Aggregator::compile("", &[])
                .unwrap_or_else(|_| unreachable!("empty expression always compiles")),
            policies: Mutex::new(
                PolicyChain::from_config(&Default::default())
                    .unwrap_or_else(|_| unreachable!("default policy config always builds")),
            ),
            limits: CapacityLimitRegistry::from_limits(&[])
                .unwrap_or_else(|_| unreachable!("empty limit set always builds")),
        }
    }
}

/// The prediction pipeline orchestrator.
pub struct AutoscalePipeline {
    ctx: PipelineContext,
    registry: PredictorRegistry,
    active: RwLock<Arc<BuiltPipeline>>,
    last_fault: Mutex<Option<String>>,
}

impl AutoscalePipeline {
    /// A pipeline with no configuration applied yet (every run decides
    /// "hold" until `configure` succeeds).
    pub fn new(registry: PredictorRegistry, ctx: PipelineContext) -> Self {
        Self {
            ctx,
            registry,
            active: RwLock::new(Arc::new(BuiltPipeline::empty())),
            last_fault: Mutex::new(None),
        }
    }

    /// Check a configuration without applying it.
    ///
    /// Performs the structural checks and dry-run constructs every
    /// sub-component; has no effect on the active pipeline.
    pub fn validate(&self, config: &PipelineConfig) -> ConfigResult<()> {
        self.build(config).map(|_| ())
    }

    /// Apply a configuration atomically.
    ///
    /// A complete replacement pipeline is built first; only if every
    /// sub-component constructs is it swapped in. On any error the
    /// previously active configuration remains in force unchanged.
    pub fn configure(&self, config: &PipelineConfig) -> ConfigResult<()> {
        let built = self.build(config)?;
        let predictors = built.predictors.len();
        let limits = built.limits.len();
        *self.active.write().expect("pipeline lock poisoned") = Arc::new(built);
        info!(predictors, limits, "pipeline reconfigured");
        Ok(())
    }

    /// The configuration currently in force.
    pub fn effective_config(&self) -> PipelineConfig {
        self.active
            .read()
            .expect("pipeline lock poisoned")
            .config
            .clone()
    }

    pub fn status(&self) -> PipelineStatus {
        let active = self.active.read().expect("pipeline lock poisoned").clone();
        PipelineStatus {
            last_fault: self
                .last_fault
                .lock()
                .expect("pipeline lock poisoned")
                .clone(),
            predictors: active
                .predictors
                .iter()
                .map(|p| p.id().to_string())
                .collect(),
            policies: active.policies.lock().expect("pipeline lock poisoned").len(),
            capacity_limits: active.limits.len(),
        }
    }

    /// Compute a bounded pool-size decision for the target time.
    ///
    /// `Ok(None)` means "hold the pool at its current size" — nothing to
    /// predict and no baseline to substitute. Any stage failure aborts
    /// the whole run, is recorded as the last fault, and is announced as
    /// an error alert before being returned.
    pub async fn predict(
        &self,
        pool: Option<PoolSizeSummary>,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>, PredictionError> {
        // Snapshot the active pipeline; a concurrent reconfigure swaps
        // the Arc and this run finishes against the old instance.
        let built = self.active.read().expect("pipeline lock poisoned").clone();

        match Self::run(&self.ctx, &built, pool, at).await {
            Ok(decision) => Ok(decision),
            Err(e) => {
                let detail = e.to_string();
                *self.last_fault.lock().expect("pipeline lock poisoned") = Some(detail.clone());
                error!(error = %detail, "prediction pipeline run failed");
                self.ctx
                    .events
                    .post_alert(Alert::error("capacity prediction failed", detail));
                Err(e)
            }
        }
    }

    async fn run(
        ctx: &PipelineContext,
        built: &BuiltPipeline,
        pool: Option<PoolSizeSummary>,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>, PredictionError> {
        // Fan out: one task per enabled predictor.
        let mut handles = Vec::with_capacity(built.predictors.len());
        for p in &built.predictors {
            let p = p.clone();
            let id = p.id().to_string();
            handles.push((id, tokio::spawn(async move { p.predict(pool, at).await })));
        }

        // Await all tasks before acting on any failure: no task is left
        // running into the next pipeline run.
        let mut outputs: BTreeMap<PredictorId, Option<Prediction>> = BTreeMap::new();
        let mut failure: Option<PredictionError> = None;
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(prediction)) => {
                    outputs.insert(id, prediction);
                }
                Ok(Err(e)) => {
                    if failure.is_none() {
                        failure = Some(PredictionError::Predictor { id, source: e });
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(PredictionError::Join(e.to_string()));
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        // Map to compute units, keyed by predictor id so downstream
        // stages see a deterministic order regardless of completion.
        let mut mapped: BTreeMap<PredictorId, Option<Prediction>> = BTreeMap::new();
        for (id, output) in outputs {
            if let Some(p) = &output {
                ctx.events.post_metric(
                    TelemetryEvent::new(events::PREDICTION, p.value, at)
                        .with_tag("predictor", &id)
                        .with_tag("metric", &p.metric),
                );
            }
            let compute_units = built.mapper.to_compute_units(output)?;
            if let Some(p) = &compute_units {
                ctx.events.post_metric(
                    TelemetryEvent::new(events::COMPUTE_UNIT_PREDICTION, p.value, at)
                        .with_tag("predictor", &id)
                        .with_tag("metric", &p.metric),
                );
            }
            mapped.insert(id, compute_units);
        }

        let aggregate = built.aggregator.aggregate(&mapped);
        if let Some(value) = aggregate {
            ctx.events
                .post_metric(TelemetryEvent::new(events::AGGREGATE_PREDICTION, value, at));
        }

        let candidate = match (aggregate, pool) {
            (None, None) => {
                // Nothing predicted and no baseline: hold the pool at
                // its current (unknown) size.
                debug!("no aggregate and pool size unknown; holding");
                return Ok(None);
            }
            (None, Some(pool)) => {
                // Bound the status quo. The policy chain acts on a
                // predicted change, so it is skipped.
                debug!(desired = pool.desired, "no aggregate; bounding current desired size");
                pool.desired as f64
            }
            (Some(aggregate), _) => {
                let adjusted = built
                    .policies
                    .lock()
                    .expect("pipeline lock poisoned")
                    .apply(pool.as_ref(), Some(aggregate), at);
                // Policies never drop a present input.
                adjusted.unwrap_or(aggregate)
            }
        };

        let Some(bounded) = built.limits.limit(Some(candidate), at) else {
            return Ok(None);
        };

        if let Some(selected) = &bounded.limit {
            ctx.events.post_metric(
                TelemetryEvent::new(events::MIN_CAPACITY_LIMIT, selected.min as f64, at)
                    .with_tag("limit", &selected.id),
            );
            ctx.events.post_metric(
                TelemetryEvent::new(events::MAX_CAPACITY_LIMIT, selected.max as f64, at)
                    .with_tag("limit", &selected.id),
            );
        }
        let mut event = TelemetryEvent::new(events::BOUNDED_PREDICTION, bounded.value as f64, at);
        if let Some(selected) = &bounded.limit {
            event = event.with_tag("limit", &selected.id);
        }
        ctx.events.post_metric(event);

        info!(decision = bounded.value, candidate, "pipeline decision");
        Ok(Some(bounded.value))
    }

    /// Build a complete pipeline from a configuration, or fail with the
    /// first offending field. Pure with respect to the active pipeline.
    fn build(&self, config: &PipelineConfig) -> ConfigResult<BuiltPipeline> {
        // Predictor ids: unique, usable as expression bindings.
        let mut seen = std::collections::HashSet::new();
        for p in &config.predictors {
            if !predictor::is_valid_identifier(&p.id) {
                return Err(ConfigError::InvalidPredictorId(p.id.clone()));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(ConfigError::DuplicatePredictorId(p.id.clone()));
            }
            if !self.registry.contains(&p.kind) {
                return Err(ConfigError::UnknownPredictorKind {
                    id: p.id.clone(),
                    kind: p.kind.clone(),
                });
            }
        }

        let mapper = CapacityMapper::from_mappings(&config.capacity_mappings)?;

        // Enabled predictors must reference a registered stream and a
        // mapped metric; a lookup miss at run time is thereby ruled out
        // at configure time.
        for p in config.enabled_predictors() {
            if !self.ctx.streams.is_registered(&p.metric_stream) {
                return Err(ConfigError::UnknownMetricStream {
                    id: p.id.clone(),
                    stream: p.metric_stream.clone(),
                });
            }
            if !mapper.covers(&p.metric_stream) {
                return Err(ConfigError::UnmappedMetric {
                    id: p.id.clone(),
                    metric: p.metric_stream.clone(),
                });
            }
        }

        // Every configured predictor id is a binding, enabled or not,
        // so an expression can reference a temporarily disabled one.
        let bindings: Vec<PredictorId> = config.predictors.iter().map(|p| p.id.clone()).collect();
        let aggregator = Aggregator::compile(&config.aggregator, &bindings)?;
        let policies = PolicyChain::from_config(&config.scaling_policies)?;
        let limits = CapacityLimitRegistry::from_limits(&config.capacity_limits)?;

        let mut predictors = Vec::new();
        for p in config.enabled_predictors() {
            predictors.push(self.registry.build(p, &self.ctx)?);
        }

        Ok(BuiltPipeline {
            config: config.clone(),
            predictors,
            mapper,
            aggregator,
            policies: Mutex::new(policies),
            limits,
        })
    }
}
