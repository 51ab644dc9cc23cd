//! Capacity limit registry — rank-ordered, time-scheduled bounds.
//!
//! Each limit carries a cron schedule and a `[min, max]` range. At
//! decision time the registry selects, among the limits whose schedule
//! matches, the one with the highest rank (ties broken by ascending id),
//! clamps the prediction into its range, and rounds up. With no match,
//! the prediction is only rounded up — a fractional compute-unit count
//! always rounds towards more capacity, never less.

use chrono::{DateTime, Utc};
use tracing::debug;

use scalegrid_core::{CapacityLimit, LimitId};
use scalegrid_schedule::Schedule;

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug)]
struct CompiledLimit {
    id: LimitId,
    rank: i64,
    min: u32,
    max: u32,
    schedule: Schedule,
}

/// The limit that bounded a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedLimit {
    pub id: LimitId,
    pub min: u32,
    pub max: u32,
}

/// A bounded integer decision, with the limit that produced it (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedPrediction {
    pub value: u32,
    pub limit: Option<SelectedLimit>,
}

/// The configured set of capacity limits, pre-sorted for deterministic
/// selection.
#[derive(Debug)]
pub struct CapacityLimitRegistry {
    /// Sorted by rank descending, then id ascending; selection is the
    /// first entry whose schedule matches.
    limits: Vec<CompiledLimit>,
}

impl CapacityLimitRegistry {
    pub(crate) fn from_limits(limits: &[CapacityLimit]) -> ConfigResult<Self> {
        let mut compiled = Vec::with_capacity(limits.len());
        for limit in limits {
            if limit.max < limit.min {
                return Err(ConfigError::LimitBounds {
                    id: limit.id.clone(),
                    min: limit.min,
                    max: limit.max,
                });
            }
            if compiled.iter().any(|c: &CompiledLimit| c.id == limit.id) {
                return Err(ConfigError::DuplicateLimitId(limit.id.clone()));
            }
            let schedule =
                Schedule::parse(&limit.schedule).map_err(|source| ConfigError::Schedule {
                    id: limit.id.clone(),
                    source,
                })?;
            compiled.push(CompiledLimit {
                id: limit.id.clone(),
                rank: limit.rank,
                min: limit.min,
                max: limit.max,
                schedule,
            });
        }
        compiled.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.id.cmp(&b.id)));
        Ok(Self { limits: compiled })
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Bound a prediction at the given instant. Absent in, absent out;
    /// a non-finite value cannot be clamped and is treated as absent.
    pub fn limit(
        &self,
        prediction: Option<f64>,
        at: DateTime<Utc>,
    ) -> Option<BoundedPrediction> {
        let prediction = prediction.filter(|v| v.is_finite())?;

        let selected = self.limits.iter().find(|l| l.schedule.matches(at));
        let bounded = match selected {
            Some(l) => {
                let clamped = prediction.clamp(l.min as f64, l.max as f64);
                debug!(
                    limit = %l.id,
                    rank = l.rank,
                    min = l.min,
                    max = l.max,
                    prediction,
                    clamped,
                    "capacity limit in effect"
                );
                BoundedPrediction {
                    value: clamped.ceil().max(0.0) as u32,
                    limit: Some(SelectedLimit {
                        id: l.id.clone(),
                        min: l.min,
                        max: l.max,
                    }),
                }
            }
            None => BoundedPrediction {
                value: prediction.ceil().max(0.0) as u32,
                limit: None,
            },
        };
        Some(bounded)
    }
}
