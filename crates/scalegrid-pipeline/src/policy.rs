//! Scaling policy chain — oscillation damping.
//!
//! Policies adjust the aggregate prediction relative to the current pool
//! size before it is bounded. They run in a fixed order, each feeding
//! the next; with none configured the chain is the identity function.
//! A zero-valued parameter omits its policy from the chain entirely.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use scalegrid_core::{PoolSizeSummary, ScalingPolicyConfig};

use crate::error::{ConfigError, ConfigResult};

/// One damping policy.
///
/// `apply` is total: an absent pool size or input passes through rather
/// than failing. Policies may keep state across calls (the grace-period
/// streak); that state is discarded when the pipeline is reconfigured.
pub trait ScalingPolicy: Send {
    fn name(&self) -> &'static str;

    fn apply(
        &mut self,
        pool: Option<&PoolSizeSummary>,
        input: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<f64>;
}

/// Suppresses pool-size changes smaller than a relative tolerance.
pub struct MachineDeltaTolerancePolicy {
    tolerance: f64,
}

impl MachineDeltaTolerancePolicy {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl ScalingPolicy for MachineDeltaTolerancePolicy {
    fn name(&self) -> &'static str {
        "machine_delta_tolerance"
    }

    fn apply(
        &mut self,
        pool: Option<&PoolSizeSummary>,
        input: Option<f64>,
        _now: DateTime<Utc>,
    ) -> Option<f64> {
        let input = input?;
        // No baseline to compute a relative delta against.
        let Some(pool) = pool else {
            return Some(input);
        };

        let desired = pool.desired as f64;
        if desired == 0.0 {
            // Any non-zero input exceeds the tolerance; a zero input
            // equals desired either way.
            return Some(input);
        }

        if ((input - desired).abs() / desired) < self.tolerance {
            debug!(
                input,
                desired,
                tolerance = self.tolerance,
                "change within tolerance; holding pool size"
            );
            Some(desired)
        } else {
            Some(input)
        }
    }
}

/// Delays scale-downs until they have been suggested without
/// interruption for a grace period.
pub struct OverprovisioningGracePeriodPolicy {
    grace: Duration,
    /// Start of the current uninterrupted scale-down streak.
    streak_start: Option<DateTime<Utc>>,
}

impl OverprovisioningGracePeriodPolicy {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            streak_start: None,
        }
    }
}

impl ScalingPolicy for OverprovisioningGracePeriodPolicy {
    fn name(&self) -> &'static str {
        "overprovisioning_grace_period"
    }

    fn apply(
        &mut self,
        pool: Option<&PoolSizeSummary>,
        input: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let input = input?;
        // Unknown pool size: pass through without touching the streak.
        let Some(pool) = pool else {
            return Some(input);
        };

        let desired = pool.desired as f64;
        if input >= desired {
            // Not a scale-down; the streak is interrupted.
            self.streak_start = None;
            return Some(input);
        }

        let start = *self.streak_start.get_or_insert(now);
        let elapsed = now.signed_duration_since(start);
        if elapsed < self.grace {
            debug!(
                input,
                desired,
                elapsed_secs = elapsed.num_seconds(),
                grace_secs = self.grace.num_seconds(),
                "scale-down within grace period; holding pool size"
            );
            Some(desired)
        } else {
            // Streak start is preserved until a non-scale-down
            // observation clears it.
            Some(input)
        }
    }
}

/// The ordered policy chain built from configuration.
pub struct PolicyChain {
    policies: Vec<Box<dyn ScalingPolicy>>,
}

impl PolicyChain {
    pub(crate) fn from_config(cfg: &ScalingPolicyConfig) -> ConfigResult<Self> {
        if !(cfg.machine_delta_tolerance.is_finite() && cfg.machine_delta_tolerance >= 0.0) {
            return Err(ConfigError::InvalidTolerance);
        }

        let mut policies: Vec<Box<dyn ScalingPolicy>> = Vec::new();
        if cfg.machine_delta_tolerance > 0.0 {
            policies.push(Box::new(MachineDeltaTolerancePolicy::new(
                cfg.machine_delta_tolerance,
            )));
        }
        if cfg.overprovisioning_grace_secs > 0 {
            // chrono durations are millisecond-bounded; a value past
            // that is a config mistake, not a usable grace period.
            let grace = i64::try_from(cfg.overprovisioning_grace_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or(ConfigError::InvalidGracePeriod)?;
            policies.push(Box::new(OverprovisioningGracePeriodPolicy::new(grace)));
        }
        Ok(Self { policies })
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Run the input through every policy in order.
    pub fn apply(
        &mut self,
        pool: Option<&PoolSizeSummary>,
        input: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let mut value = input;
        for policy in &mut self.policies {
            value = policy.apply(pool, value, now);
        }
        value
    }
}

impl fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.policies.iter().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pool(desired: u32) -> PoolSizeSummary {
        PoolSizeSummary {
            desired,
            allocated: desired,
            active: desired,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn tolerance_suppresses_small_changes() {
        let mut policy = MachineDeltaTolerancePolicy::new(0.10);
        let p = pool(1);

        assert_eq!(policy.apply(Some(&p), Some(1.05), at(0)), Some(1.0));
        assert_eq!(policy.apply(Some(&p), Some(1.15), at(0)), Some(1.15));
    }

    #[test]
    fn tolerance_passes_through_without_pool_size() {
        let mut policy = MachineDeltaTolerancePolicy::new(0.10);
        assert_eq!(policy.apply(None, Some(1.05), at(0)), Some(1.05));
        assert_eq!(policy.apply(None, Some(42.0), at(0)), Some(42.0));
    }

    #[test]
    fn tolerance_with_zero_desired_passes_nonzero_through() {
        let mut policy = MachineDeltaTolerancePolicy::new(0.10);
        let p = pool(0);
        assert_eq!(policy.apply(Some(&p), Some(3.0), at(0)), Some(3.0));
        assert_eq!(policy.apply(Some(&p), Some(0.0), at(0)), Some(0.0));
    }

    #[test]
    fn tolerance_absent_input_stays_absent() {
        let mut policy = MachineDeltaTolerancePolicy::new(0.10);
        assert_eq!(policy.apply(Some(&pool(2)), None, at(0)), None);
    }

    #[test]
    fn grace_period_suppresses_until_streak_matures() {
        let mut policy = OverprovisioningGracePeriodPolicy::new(Duration::seconds(600));
        let p = pool(2);

        // Streak starts at t=0; held while younger than the grace.
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(0)), Some(2.0));
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(300)), Some(2.0));
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(599)), Some(2.0));
        // At the grace boundary the scale-down is allowed through.
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(600)), Some(1.0));
        // And keeps flowing while the streak continues.
        assert_eq!(policy.apply(Some(&p), Some(1.2), at(700)), Some(1.2));
    }

    #[test]
    fn grace_period_streak_resets_on_non_scale_down() {
        let mut policy = OverprovisioningGracePeriodPolicy::new(Duration::seconds(600));
        let p = pool(2);

        assert_eq!(policy.apply(Some(&p), Some(1.0), at(0)), Some(2.0));
        // Not a scale-down (>= desired): passes through, clears streak.
        assert_eq!(policy.apply(Some(&p), Some(2.03), at(300)), Some(2.03));
        // New streak starts here, so the old start no longer counts.
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(650)), Some(2.0));
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(1250)), Some(1.0));
    }

    #[test]
    fn grace_period_ignores_unknown_pool_size() {
        let mut policy = OverprovisioningGracePeriodPolicy::new(Duration::seconds(600));
        let p = pool(2);

        assert_eq!(policy.apply(Some(&p), Some(1.0), at(0)), Some(2.0));
        // Unknown pool: pass through, streak untouched.
        assert_eq!(policy.apply(None, Some(1.0), at(300)), Some(1.0));
        // The t=0 streak is still alive.
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(600)), Some(1.0));
    }

    #[test]
    fn equal_input_is_not_a_scale_down() {
        let mut policy = OverprovisioningGracePeriodPolicy::new(Duration::seconds(600));
        let p = pool(2);

        assert_eq!(policy.apply(Some(&p), Some(2.0), at(0)), Some(2.0));
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(100)), Some(2.0));
        // The streak began at t=100, not t=0.
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(650)), Some(2.0));
        assert_eq!(policy.apply(Some(&p), Some(1.0), at(700)), Some(1.0));
    }

    #[test]
    fn zero_valued_config_omits_policies() {
        let chain = PolicyChain::from_config(&ScalingPolicyConfig::default()).unwrap();
        assert!(chain.is_empty());

        let chain = PolicyChain::from_config(&ScalingPolicyConfig {
            machine_delta_tolerance: 0.1,
            overprovisioning_grace_secs: 0,
        })
        .unwrap();
        assert_eq!(chain.len(), 1);

        let chain = PolicyChain::from_config(&ScalingPolicyConfig {
            machine_delta_tolerance: 0.1,
            overprovisioning_grace_secs: 600,
        })
        .unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn invalid_tolerance_rejected() {
        for tolerance in [-0.1, f64::NAN, f64::INFINITY] {
            let err = PolicyChain::from_config(&ScalingPolicyConfig {
                machine_delta_tolerance: tolerance,
                overprovisioning_grace_secs: 0,
            })
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTolerance));
        }
    }

    #[test]
    fn oversized_grace_period_rejected() {
        // Would overflow the duration type; must come back as a config
        // error rather than abort.
        for secs in [u64::MAX, i64::MAX as u64, (i64::MAX / 1000 + 1) as u64] {
            let err = PolicyChain::from_config(&ScalingPolicyConfig {
                machine_delta_tolerance: 0.0,
                overprovisioning_grace_secs: secs,
            })
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidGracePeriod));
        }
    }

    #[test]
    fn empty_chain_is_identity() {
        let mut chain = PolicyChain::from_config(&ScalingPolicyConfig::default()).unwrap();
        assert_eq!(chain.apply(Some(&pool(2)), Some(7.5), at(0)), Some(7.5));
        assert_eq!(chain.apply(None, None, at(0)), None);
    }

    #[test]
    fn chain_runs_policies_in_order() {
        let mut chain = PolicyChain::from_config(&ScalingPolicyConfig {
            machine_delta_tolerance: 0.10,
            overprovisioning_grace_secs: 600,
        })
        .unwrap();
        let p = pool(10);

        // 9.5 is within tolerance → becomes 10.0 → no longer a
        // scale-down, so the grace policy passes it through untouched.
        assert_eq!(chain.apply(Some(&p), Some(9.5), at(0)), Some(10.0));
        // 5.0 exceeds tolerance, then the grace policy holds it.
        assert_eq!(chain.apply(Some(&p), Some(5.0), at(10)), Some(10.0));
        assert_eq!(chain.apply(Some(&p), Some(5.0), at(700)), Some(5.0));
    }
}
