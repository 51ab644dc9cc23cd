//! End-to-end pipeline scenarios: fan-out, fail-fast, policy damping,
//! scheduled limits, and atomic reconfiguration.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use scalegrid_core::{
    CapacityLimit, CapacityMapping, PipelineConfig, PoolSizeSummary, PredictorConfig,
    RecordingBus, ScalingPolicyConfig,
};
use scalegrid_pipeline::{
    events, AutoscalePipeline, ConfigResult, MetricStreamHub, PipelineContext, PredictFuture,
    PredictionError, Predictor, PredictorRegistry,
};

/// A predictor kind that always fails, for fail-fast coverage.
struct FailingPredictor {
    id: String,
}

impl Predictor for FailingPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(
        &self,
        _pool: Option<PoolSizeSummary>,
        _at: DateTime<Utc>,
    ) -> PredictFuture<'_> {
        Box::pin(async { Err(anyhow::anyhow!("metric source unreachable")) })
    }
}

fn build_failing(
    cfg: &PredictorConfig,
    _ctx: &PipelineContext,
) -> ConfigResult<Arc<dyn Predictor>> {
    Ok(Arc::new(FailingPredictor { id: cfg.id.clone() }))
}

struct Harness {
    pipeline: AutoscalePipeline,
    bus: Arc<RecordingBus>,
    hub: Arc<MetricStreamHub>,
}

fn harness() -> Harness {
    let bus = Arc::new(RecordingBus::new());
    let hub = Arc::new(MetricStreamHub::new());
    hub.register("rps");
    hub.register("queue_depth");

    let mut registry = PredictorRegistry::with_builtins();
    registry.register("failing", build_failing);

    let ctx = PipelineContext::new(bus.clone(), hub.clone());
    Harness {
        pipeline: AutoscalePipeline::new(registry, ctx),
        bus,
        hub,
    }
}

fn pool(desired: u32) -> PoolSizeSummary {
    PoolSizeSummary {
        desired,
        allocated: desired,
        active: desired,
    }
}

fn predictor(id: &str, kind: &str, stream: &str) -> PredictorConfig {
    PredictorConfig {
        id: id.into(),
        kind: kind.into(),
        enabled: true,
        metric_stream: stream.into(),
        parameters: json!(null),
    }
}

fn mapping(metric: &str, amount: f64) -> CapacityMapping {
    CapacityMapping {
        metric: metric.into(),
        amount_per_compute_unit: amount,
    }
}

fn limit(id: &str, rank: i64, schedule: &str, min: u32, max: u32) -> CapacityLimit {
    CapacityLimit {
        id: id.into(),
        rank,
        schedule: schedule.into(),
        min,
        max,
    }
}

#[tokio::test]
async fn two_predictors_aggregate_to_the_larger() {
    let h = harness();
    h.pipeline
        .configure(&PipelineConfig {
            predictors: vec![
                predictor("rps_now", "last_value", "rps"),
                predictor("queue_now", "last_value", "queue_depth"),
            ],
            capacity_mappings: vec![mapping("rps", 250.0), mapping("queue_depth", 100.0)],
            // Take whichever demand signal asks for more capacity, and
            // tolerate either being absent.
            aggregator: "if rps_now == () { queue_now } \
                         else if queue_now == () { rps_now } \
                         else if rps_now > queue_now { rps_now } else { queue_now }"
                .into(),
            scaling_policies: ScalingPolicyConfig::default(),
            capacity_limits: vec![limit("base", 0, "* * * * * *", 1, 20)],
        })
        .unwrap();

    let at = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();
    h.hub.record("rps", 1000.0, at).unwrap(); // 4.0 compute units
    h.hub.record("queue_depth", 620.0, at).unwrap(); // 6.2 compute units

    let decision = h.pipeline.predict(Some(pool(3)), at).await.unwrap();
    assert_eq!(decision, Some(7));

    // Two raw and two compute-unit predictions, one aggregate.
    assert_eq!(h.bus.metrics_named(events::PREDICTION).len(), 2);
    assert_eq!(h.bus.metrics_named(events::COMPUTE_UNIT_PREDICTION).len(), 2);
    assert_eq!(h.bus.metrics_named(events::AGGREGATE_PREDICTION).len(), 1);
}

#[tokio::test]
async fn failing_predictor_aborts_the_run() {
    let h = harness();
    h.pipeline
        .configure(&PipelineConfig {
            predictors: vec![
                predictor("good", "last_value", "rps"),
                predictor("bad", "failing", "rps"),
            ],
            capacity_mappings: vec![mapping("rps", 250.0)],
            aggregator: "good".into(),
            scaling_policies: ScalingPolicyConfig::default(),
            capacity_limits: vec![limit("base", 0, "* * * * * *", 1, 20)],
        })
        .unwrap();

    let at = Utc::now();
    h.hub.record("rps", 1000.0, at).unwrap();

    let err = h.pipeline.predict(Some(pool(3)), at).await.unwrap_err();
    assert!(matches!(err, PredictionError::Predictor { ref id, .. } if id == "bad"));

    // Fail-fast: nothing downstream of the fan-out ran.
    assert!(h.bus.metrics_named(events::BOUNDED_PREDICTION).is_empty());
    assert!(h.bus.metrics_named(events::AGGREGATE_PREDICTION).is_empty());

    // The failure is alerted and visible in the status surface.
    let alerts = h.bus.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].detail.contains("bad"));
    let fault = h.pipeline.status().last_fault.unwrap();
    assert!(fault.contains("metric source unreachable"));
}

#[tokio::test]
async fn scheduled_limits_pick_the_highest_matching_rank() {
    let h = harness();
    h.pipeline
        .configure(&PipelineConfig {
            predictors: vec![predictor("rps_now", "last_value", "rps")],
            capacity_mappings: vec![mapping("rps", 250.0)],
            aggregator: "rps_now".into(),
            scaling_policies: ScalingPolicyConfig::default(),
            capacity_limits: vec![
                limit("l1", 1, "* * * * * *", 2, 4),
                limit("l2", 2, "* * 10-21 ? * FRI", 5, 10),
                limit("l3", 3, "* * 12-13 ? * FRI", 7, 14),
            ],
        })
        .unwrap();

    // 5000 rps → 20 compute units, before clamping.
    let demand = 5000.0;

    // Monday noon: l1 clamps to [2, 4].
    let monday = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();
    h.hub.record("rps", demand, monday).unwrap();
    assert_eq!(h.pipeline.predict(Some(pool(3)), monday).await.unwrap(), Some(4));

    // Friday 20:00: l2 outranks l1.
    let friday_evening = Utc.with_ymd_and_hms(2026, 9, 4, 20, 0, 0).unwrap();
    assert_eq!(
        h.pipeline.predict(Some(pool(3)), friday_evening).await.unwrap(),
        Some(10)
    );

    // Friday 13:00: all three match, l3 wins.
    let friday_lunch = Utc.with_ymd_and_hms(2026, 9, 4, 13, 0, 0).unwrap();
    assert_eq!(
        h.pipeline.predict(Some(pool(3)), friday_lunch).await.unwrap(),
        Some(14)
    );

    // Limit telemetry names the selected rule.
    let max_events = h.bus.metrics_named(events::MAX_CAPACITY_LIMIT);
    let tags: Vec<_> = max_events
        .iter()
        .filter_map(|e| e.tags.get("limit").cloned())
        .collect();
    assert_eq!(tags, vec!["l1", "l2", "l3"]);
}

#[tokio::test]
async fn damping_policies_shape_successive_runs() {
    let h = harness();
    h.pipeline
        .configure(&PipelineConfig {
            predictors: vec![predictor("rps_now", "last_value", "rps")],
            capacity_mappings: vec![mapping("rps", 250.0)],
            aggregator: "rps_now".into(),
            scaling_policies: ScalingPolicyConfig {
                machine_delta_tolerance: 0.10,
                overprovisioning_grace_secs: 600,
            },
            capacity_limits: vec![],
        })
        .unwrap();

    let t0 = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();
    let current = pool(4);

    // 1050 rps → 4.2 compute units: within 10% of desired 4, held.
    h.hub.record("rps", 1050.0, t0).unwrap();
    assert_eq!(h.pipeline.predict(Some(current), t0).await.unwrap(), Some(4));

    // 500 rps → 2.0: a real scale-down, but the grace period holds it.
    let t1 = t0 + chrono::Duration::seconds(60);
    h.hub.record("rps", 500.0, t1).unwrap();
    assert_eq!(h.pipeline.predict(Some(current), t1).await.unwrap(), Some(4));

    // Still low 700 seconds into the streak: allowed through.
    let t2 = t1 + chrono::Duration::seconds(700);
    h.hub.record("rps", 500.0, t2).unwrap();
    assert_eq!(h.pipeline.predict(Some(current), t2).await.unwrap(), Some(2));
}

#[tokio::test]
async fn failed_reconfiguration_round_trips_the_old_config() {
    let h = harness();
    let good = PipelineConfig {
        predictors: vec![predictor("rps_now", "last_value", "rps")],
        capacity_mappings: vec![mapping("rps", 250.0)],
        aggregator: "rps_now".into(),
        scaling_policies: ScalingPolicyConfig::default(),
        capacity_limits: vec![limit("base", 0, "* * * * * *", 1, 8)],
    };
    h.pipeline.configure(&good).unwrap();

    // References a metric stream the intake never registered.
    let mut bad = good.clone();
    bad.predictors.push(predictor("ghost", "last_value", "not_a_stream"));
    bad.capacity_mappings.push(mapping("not_a_stream", 10.0));
    assert!(h.pipeline.configure(&bad).is_err());

    let effective = h.pipeline.effective_config();
    assert_eq!(effective, good);
    assert_eq!(
        serde_json::to_value(&effective).unwrap(),
        serde_json::to_value(&good).unwrap()
    );

    // Still serving decisions from the old configuration.
    let at = Utc::now();
    h.hub.record("rps", 2000.0, at).unwrap();
    assert_eq!(h.pipeline.predict(Some(pool(2)), at).await.unwrap(), Some(8));
}
