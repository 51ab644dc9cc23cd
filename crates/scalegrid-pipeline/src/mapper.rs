//! Capacity mapper — raw metric values to compute units.

use std::collections::HashMap;

use tracing::debug;

use scalegrid_core::{CapacityMapping, Prediction, PredictionUnit};

use crate::error::{ConfigError, ConfigResult, PredictionError};

/// Converts raw-metric predictions into compute units using the
/// per-metric conversion table. Compute-unit predictions pass through
/// unchanged.
///
/// Validation guarantees every metric an enabled predictor can emit has
/// a mapping, so a lookup miss at evaluation time indicates the pipeline
/// was not built through `configure`.
#[derive(Debug, Clone)]
pub struct CapacityMapper {
    amount_per_unit: HashMap<String, f64>,
}

impl CapacityMapper {
    pub(crate) fn from_mappings(mappings: &[CapacityMapping]) -> ConfigResult<Self> {
        let mut amount_per_unit = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            if !(mapping.amount_per_compute_unit.is_finite()
                && mapping.amount_per_compute_unit > 0.0)
            {
                return Err(ConfigError::NonPositiveMapping(mapping.metric.clone()));
            }
            if amount_per_unit
                .insert(mapping.metric.clone(), mapping.amount_per_compute_unit)
                .is_some()
            {
                return Err(ConfigError::DuplicateMapping(mapping.metric.clone()));
            }
        }
        Ok(Self { amount_per_unit })
    }

    /// Whether a mapping exists for the given metric.
    pub fn covers(&self, metric: &str) -> bool {
        self.amount_per_unit.contains_key(metric)
    }

    /// Convert a prediction to compute units.
    pub fn to_compute_units(
        &self,
        prediction: Option<Prediction>,
    ) -> Result<Option<Prediction>, PredictionError> {
        let Some(prediction) = prediction else {
            return Ok(None);
        };
        if prediction.unit == PredictionUnit::ComputeUnits {
            return Ok(Some(prediction));
        }

        let amount = self
            .amount_per_unit
            .get(&prediction.metric)
            .copied()
            .ok_or_else(|| PredictionError::UnmappedMetric(prediction.metric.clone()))?;

        let value = prediction.value / amount;
        debug!(
            metric = %prediction.metric,
            raw = prediction.value,
            compute_units = value,
            "converted to compute units"
        );
        Ok(Some(Prediction {
            value,
            unit: PredictionUnit::ComputeUnits,
            ..prediction
        }))
    }
}
