//! scalegrid-pipeline — the autoscaling prediction pipeline.
//!
//! Turns metric observations into one bounded integer pool-size decision
//! per run:
//!
//! ```text
//! pool size + target time
//!     → predictors (concurrent fan-out, fail-fast)
//!     → capacity mapper (raw metric → compute units)
//!     → aggregator (operator expression → one scalar)
//!     → scaling policy chain (oscillation damping)
//!     → capacity limit registry (cron-scheduled [min,max] clamp + ceil)
//!     → Option<u32>
//! ```
//!
//! The [`AutoscalePipeline`] orchestrator owns the stages and the
//! two-phase `validate`/`configure` contract: a new configuration is
//! applied only if every sub-component builds, otherwise the previous
//! configuration stays in force untouched.
//!
//! Telemetry (per-predictor predictions, the aggregate, the bounded
//! decision, limits in effect) is posted to the [`EventBus`] seam from
//! `scalegrid-core`; metric samples arrive through the
//! [`MetricStreamHub`].
//!
//! [`EventBus`]: scalegrid_core::EventBus

pub mod aggregator;
pub mod builtins;
pub mod context;
pub mod error;
pub mod limits;
pub mod mapper;
pub mod pipeline;
pub mod policy;
pub mod predictor;
pub mod streams;

pub use aggregator::Aggregator;
pub use context::PipelineContext;
pub use error::{ConfigError, ConfigResult, PredictionError};
pub use limits::{BoundedPrediction, CapacityLimitRegistry, SelectedLimit};
pub use mapper::CapacityMapper;
pub use pipeline::{events, AutoscalePipeline, PipelineStatus};
pub use policy::{
    MachineDeltaTolerancePolicy, OverprovisioningGracePeriodPolicy, PolicyChain, ScalingPolicy,
};
pub use predictor::{PredictFuture, Predictor, PredictorFactory, PredictorRegistry};
pub use streams::{MetricSample, MetricStreamHub, StreamError};
