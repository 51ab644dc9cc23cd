//! Aggregator — combines predictor outputs into one scalar.
//!
//! The operator supplies a single expression; it is compiled once at
//! configuration time (a parse failure is a configuration error) and
//! evaluated per run with one binding per configured predictor id.
//! Present predictions bind as floats, absent ones as unit, so an
//! expression can reference a predictor that produced nothing this run.
//! If the expression cannot produce a finite numeric value — all inputs
//! absent, an absent operand makes it unevaluable, or the arithmetic
//! degenerates to NaN/infinity — the aggregate is absent, never an
//! error.
//!
//! The engine is rhai's sandboxed evaluator: no filesystem or network
//! access, and evaluation is operation-capped so a pathological
//! expression cannot stall a run.

use std::collections::BTreeMap;
use std::fmt;

use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use tracing::{debug, warn};

use scalegrid_core::{Prediction, PredictorId};

use crate::error::{ConfigError, ConfigResult};

const MAX_OPERATIONS: u64 = 10_000;

/// A compiled aggregation expression.
pub struct Aggregator {
    engine: Engine,
    /// `None` when no expression is configured; the aggregate is then
    /// always absent.
    ast: Option<AST>,
    /// One binding per configured predictor id, in id order.
    bindings: Vec<PredictorId>,
}

impl Aggregator {
    /// Compile the operator's expression against the configured
    /// predictor ids. An empty expression is valid and yields an
    /// always-absent aggregate; a variable that is not a predictor id
    /// is a configuration error.
    pub(crate) fn compile(expression: &str, bindings: &[PredictorId]) -> ConfigResult<Self> {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);

        let ast = if expression.trim().is_empty() {
            None
        } else {
            Some(
                engine
                    .compile(expression)
                    .map_err(|e| ConfigError::Expression(e.to_string()))?,
            )
        };

        // Dry-run with every binding absent: resolves variable names
        // without depending on any prediction being present.
        if let Some(ast) = &ast {
            let mut scope = Scope::new();
            for id in bindings {
                scope.push_dynamic(id.clone(), Dynamic::UNIT);
            }
            if let Err(e) = engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast)
                && let EvalAltResult::ErrorVariableNotFound(name, _) = &*e
            {
                return Err(ConfigError::Expression(format!(
                    "unknown variable `{name}` (not a configured predictor id)"
                )));
            }
        }

        Ok(Self {
            engine,
            ast,
            bindings: bindings.to_vec(),
        })
    }

    /// Evaluate the expression against this run's predictor outputs.
    ///
    /// Predictors missing from the map (e.g. disabled ones) bind as
    /// absent.
    pub fn aggregate(
        &self,
        predictions: &BTreeMap<PredictorId, Option<Prediction>>,
    ) -> Option<f64> {
        let ast = self.ast.as_ref()?;

        let mut scope = Scope::new();
        for id in &self.bindings {
            match predictions.get(id).and_then(|p| p.as_ref()) {
                Some(p) => {
                    scope.push(id.clone(), p.value);
                }
                None => {
                    scope.push_dynamic(id.clone(), Dynamic::UNIT);
                }
            }
        }

        match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast) {
            Ok(value) if value.is_unit() => None,
            Ok(value) => {
                let numeric = if let Ok(f) = value.clone().as_float() {
                    Some(f)
                } else if let Ok(i) = value.clone().as_int() {
                    Some(i as f64)
                } else {
                    warn!(
                        produced = value.type_name(),
                        "aggregator expression produced a non-numeric value"
                    );
                    None
                };
                match numeric {
                    // A NaN or infinite aggregate cannot be bounded
                    // meaningfully; treat it as no value.
                    Some(f) if !f.is_finite() => {
                        warn!(value = f, "aggregator expression produced a non-finite value");
                        None
                    }
                    other => other,
                }
            }
            Err(e) => {
                // Typically an absent operand; the aggregate is absent.
                debug!(error = %e, "aggregator expression produced no value");
                None
            }
        }
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("configured", &self.ast.is_some())
            .field("bindings", &self.bindings)
            .finish()
    }
}
