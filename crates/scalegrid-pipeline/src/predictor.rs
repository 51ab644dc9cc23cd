//! The predictor contract and registry.
//!
//! A predictor is a pluggable unit that, given the current pool size and
//! a target time, produces at most one prediction. Predictor kinds are
//! resolved through an explicit string-discriminant → factory registry,
//! closed at configuration time; new kinds are added by registering new
//! factory entries.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use scalegrid_core::{PoolSizeSummary, Prediction, PredictorConfig};

use crate::builtins;
use crate::context::PipelineContext;
use crate::error::{ConfigError, ConfigResult};

/// Boxed future returned by [`Predictor::predict`].
pub type PredictFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<Option<Prediction>>> + Send + 'a>>;

/// A pluggable capacity predictor.
///
/// `Ok(None)` means "insufficient data to predict" and is not an error;
/// an `Err` aborts the entire pipeline run.
pub trait Predictor: Send + Sync {
    /// The configured predictor id (also its aggregator binding name).
    fn id(&self) -> &str;

    fn predict(
        &self,
        pool: Option<PoolSizeSummary>,
        at: DateTime<Utc>,
    ) -> PredictFuture<'_>;
}

/// Builds one predictor instance from its config and the shared context.
pub type PredictorFactory =
    fn(&PredictorConfig, &PipelineContext) -> ConfigResult<Arc<dyn Predictor>>;

/// String discriminant → factory map for predictor kinds.
pub struct PredictorRegistry {
    factories: HashMap<String, PredictorFactory>,
}

impl PredictorRegistry {
    /// An empty registry with no kinds.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in kinds (`constant`, `last_value`,
    /// `linear_trend`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("constant", builtins::build_constant);
        registry.register("last_value", builtins::build_last_value);
        registry.register("linear_trend", builtins::build_linear_trend);
        registry
    }

    /// Register (or replace) a factory for a kind.
    pub fn register(&mut self, kind: impl Into<String>, factory: PredictorFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Instantiate a predictor from its config.
    pub fn build(
        &self,
        cfg: &PredictorConfig,
        ctx: &PipelineContext,
    ) -> ConfigResult<Arc<dyn Predictor>> {
        let factory =
            self.factories
                .get(&cfg.kind)
                .ok_or_else(|| ConfigError::UnknownPredictorKind {
                    id: cfg.id.clone(),
                    kind: cfg.kind.clone(),
                })?;
        factory(cfg, ctx)
    }
}

impl Default for PredictorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Whether a predictor id can serve as an expression binding name.
pub(crate) fn is_valid_identifier(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
