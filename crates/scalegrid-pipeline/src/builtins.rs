//! Built-in predictor kinds.
//!
//! Each reads its subscribed metric stream from the hub and emits a
//! raw-unit prediction tagged with the stream name (the capacity mapper
//! converts it downstream). `constant` is the exception: it ignores the
//! hub and defaults to compute units, which makes it useful as an
//! operator override.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use scalegrid_core::{PoolSizeSummary, Prediction, PredictionUnit, PredictorConfig};

use crate::context::PipelineContext;
use crate::error::{ConfigError, ConfigResult};
use crate::predictor::{PredictFuture, Predictor};
use crate::streams::MetricStreamHub;

fn parse_params<T: DeserializeOwned + Default>(cfg: &PredictorConfig) -> ConfigResult<T> {
    if cfg.parameters.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(cfg.parameters.clone()).map_err(|e| ConfigError::Parameters {
        id: cfg.id.clone(),
        detail: e.to_string(),
    })
}

// ── constant ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConstantParams {
    value: f64,
    #[serde(default)]
    unit: Option<PredictionUnit>,
}

/// Always predicts a fixed value.
struct ConstantPredictor {
    id: String,
    metric: String,
    value: f64,
    unit: PredictionUnit,
}

impl Predictor for ConstantPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, _pool: Option<PoolSizeSummary>, at: DateTime<Utc>) -> PredictFuture<'_> {
        Box::pin(async move {
            Ok(Some(Prediction {
                metric: self.metric.clone(),
                value: self.value,
                unit: self.unit,
                timestamp: at,
            }))
        })
    }
}

pub(crate) fn build_constant(
    cfg: &PredictorConfig,
    _ctx: &PipelineContext,
) -> ConfigResult<Arc<dyn Predictor>> {
    let params: ConstantParams =
        serde_json::from_value(cfg.parameters.clone()).map_err(|e| ConfigError::Parameters {
            id: cfg.id.clone(),
            detail: e.to_string(),
        })?;
    Ok(Arc::new(ConstantPredictor {
        id: cfg.id.clone(),
        metric: cfg.metric_stream.clone(),
        value: params.value,
        unit: params.unit.unwrap_or(PredictionUnit::ComputeUnits),
    }))
}

// ── last_value ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LastValueParams {
    /// Samples older than this are treated as no data.
    max_age_secs: Option<u64>,
}

/// Predicts the latest observed sample of its stream.
struct LastValuePredictor {
    id: String,
    stream: String,
    streams: Arc<MetricStreamHub>,
    max_age: Option<Duration>,
}

impl Predictor for LastValuePredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, _pool: Option<PoolSizeSummary>, at: DateTime<Utc>) -> PredictFuture<'_> {
        Box::pin(async move {
            let Some(sample) = self.streams.latest(&self.stream) else {
                debug!(predictor = %self.id, stream = %self.stream, "no samples yet");
                return Ok(None);
            };

            if let Some(max_age) = self.max_age
                && at.signed_duration_since(sample.timestamp) > max_age
            {
                debug!(predictor = %self.id, stream = %self.stream, "latest sample is stale");
                return Ok(None);
            }

            Ok(Some(Prediction {
                metric: self.stream.clone(),
                value: sample.value,
                unit: PredictionUnit::Raw,
                timestamp: at,
            }))
        })
    }
}

pub(crate) fn build_last_value(
    cfg: &PredictorConfig,
    ctx: &PipelineContext,
) -> ConfigResult<Arc<dyn Predictor>> {
    let params: LastValueParams = parse_params(cfg)?;
    let max_age = params
        .max_age_secs
        .map(|s| {
            i64::try_from(s)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| ConfigError::Parameters {
                    id: cfg.id.clone(),
                    detail: format!("max_age_secs {s} is out of range"),
                })
        })
        .transpose()?;
    Ok(Arc::new(LastValuePredictor {
        id: cfg.id.clone(),
        stream: cfg.metric_stream.clone(),
        streams: ctx.streams.clone(),
        max_age,
    }))
}

// ── linear_trend ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LinearTrendParams {
    /// Minimum samples before a trend is extrapolated.
    min_samples: usize,
}

impl Default for LinearTrendParams {
    fn default() -> Self {
        Self { min_samples: 2 }
    }
}

/// Least-squares fit over the sample window, extrapolated to the target
/// time. The extrapolation is floored at zero.
struct LinearTrendPredictor {
    id: String,
    stream: String,
    streams: Arc<MetricStreamHub>,
    min_samples: usize,
}

impl Predictor for LinearTrendPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, _pool: Option<PoolSizeSummary>, at: DateTime<Utc>) -> PredictFuture<'_> {
        Box::pin(async move {
            let window = self.streams.window(&self.stream);
            if window.len() < self.min_samples {
                debug!(
                    predictor = %self.id,
                    stream = %self.stream,
                    samples = window.len(),
                    needed = self.min_samples,
                    "not enough samples for a trend"
                );
                return Ok(None);
            }

            let origin = window[0].timestamp;
            let xs: Vec<f64> = window
                .iter()
                .map(|s| s.timestamp.signed_duration_since(origin).num_milliseconds() as f64 / 1000.0)
                .collect();
            let ys: Vec<f64> = window.iter().map(|s| s.value).collect();

            let n = xs.len() as f64;
            let mean_x = xs.iter().sum::<f64>() / n;
            let mean_y = ys.iter().sum::<f64>() / n;

            let denom: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
            let slope = if denom == 0.0 {
                0.0
            } else {
                xs.iter()
                    .zip(&ys)
                    .map(|(x, y)| (x - mean_x) * (y - mean_y))
                    .sum::<f64>()
                    / denom
            };
            let intercept = mean_y - slope * mean_x;

            let target_x =
                at.signed_duration_since(origin).num_milliseconds() as f64 / 1000.0;
            let value = (intercept + slope * target_x).max(0.0);

            Ok(Some(Prediction {
                metric: self.stream.clone(),
                value,
                unit: PredictionUnit::Raw,
                timestamp: at,
            }))
        })
    }
}

pub(crate) fn build_linear_trend(
    cfg: &PredictorConfig,
    ctx: &PipelineContext,
) -> ConfigResult<Arc<dyn Predictor>> {
    let params: LinearTrendParams = parse_params(cfg)?;
    Ok(Arc::new(LinearTrendPredictor {
        id: cfg.id.clone(),
        stream: cfg.metric_stream.clone(),
        streams: ctx.streams.clone(),
        min_samples: params.min_samples.max(2),
    }))
}
