//! Shared collaborator context.
//!
//! Every component factory receives the same explicit context struct
//! instead of a variable subset of injected collaborators; components
//! use the fields they need.

use std::sync::Arc;

use scalegrid_core::EventBus;

use crate::streams::MetricStreamHub;

/// Collaborators shared by all pipeline components.
#[derive(Clone)]
pub struct PipelineContext {
    /// Where telemetry events and alerts are posted.
    pub events: Arc<dyn EventBus>,
    /// Where metric samples arrive and predictors read from.
    pub streams: Arc<MetricStreamHub>,
}

impl PipelineContext {
    pub fn new(events: Arc<dyn EventBus>, streams: Arc<MetricStreamHub>) -> Self {
        Self { events, streams }
    }
}
