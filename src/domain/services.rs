//! The tiered formula evaluation engine.
//!
//! This module provides the core metric evaluation service: given a formula
//! name (or literal formula text) and a parameter binding, it resolves the
//! formula through the injected [`FormulaSource`], splices in constant
//! references, and attempts evaluation through the backend chain in
//! priority order, returning the first successful scalar.
//!
//! Supported behavior:
//! - Named formulas resolved through the constants/formulas configuration
//! - Literal formula strings evaluated ad hoc
//! - Implicit constant lookup for free identifiers, with explicit
//!   parameters shadowing constants of the same name
//! - Per-entry evaluation method hints (`fast`, `symbolic`, `fallback`)
//!   that reorder the chain without disabling fallback
//! - Uniform typed errors: a tier failure is never surfaced unless every
//!   tier has failed
//!
//! Results are deterministic for a fixed backend set: repeated calls with
//! identical formula and parameters return bit-identical values within the
//! same tier. If the compiled-in backend set changes (e.g. the `symbolic`
//! feature is toggled), results may shift by floating-point rounding
//! differences between tiers; that is accepted and documented, not a bug.

use std::collections::HashMap;

use super::backends::{default_backends, EvalError, EvaluatorBackend};
use super::constants::{ConstantValue, ConstantsTree};
use super::errors::{MetricError, MetricResult};
use super::models::{EvaluationMethod, FormulaSource};
use super::notation::substitute_identifiers;

/// Identifiers the constant substitution pass must never touch: keyword
/// operators rewritten later by each backend's notation table.
const KEYWORD_OPERATORS: &[&str] = &["and", "or", "not"];

/// The tiered formula evaluation engine.
///
/// Holds only immutable state (the constants tree, the formula source, and
/// the constructed backend chain), so one engine is safe to share across
/// threads without locking.
pub struct MetricEngine {
    constants: ConstantsTree,
    formulas: Box<dyn FormulaSource>,
    backends: Vec<Box<dyn EvaluatorBackend>>,
}

impl MetricEngine {
    /// Creates an engine with the default backend chain.
    pub fn new(constants: ConstantsTree, formulas: Box<dyn FormulaSource>) -> Self {
        Self::with_backends(constants, formulas, default_backends())
    }

    /// Creates an engine with an explicit backend chain. Tests use this to
    /// force tier failures or pin a single tier.
    pub fn with_backends(
        constants: ConstantsTree,
        formulas: Box<dyn FormulaSource>,
        backends: Vec<Box<dyn EvaluatorBackend>>,
    ) -> Self {
        Self {
            constants,
            formulas,
            backends,
        }
    }

    /// Resolves a constant by dotted path; absent paths are `None`.
    pub fn get_constant(&self, path: &str) -> Option<ConstantValue> {
        self.constants.get(path)
    }

    /// Numeric constant lookup with a default for absent paths.
    pub fn get_number(&self, path: &str, default: f64) -> f64 {
        self.constants.get_number(path, default)
    }

    /// Resolves a constant that must exist.
    pub fn require_constant(&self, path: &str) -> MetricResult<ConstantValue> {
        self.constants.require(path)
    }

    /// Evaluates a formula by name, or as literal formula text when the
    /// name is unknown, against the supplied parameter binding.
    pub fn evaluate_formula(
        &self,
        name_or_formula: &str,
        params: &HashMap<String, f64>,
    ) -> MetricResult<f64> {
        let (text, method) = match self.formulas.entry(name_or_formula) {
            Some(entry) => (entry.formula.clone(), entry.evaluation_method),
            None => (name_or_formula.to_string(), EvaluationMethod::Auto),
        };

        let prepared = self.bind_constants(&text, params);

        let mut last_error: Option<EvalError> = None;
        for backend in self.tier_order(method) {
            match backend.try_evaluate(&prepared, params) {
                Ok(result) => return Ok(result),
                Err(error) => last_error = Some(error),
            }
        }

        Err(MetricError::FormulaEvaluation {
            formula: name_or_formula.to_string(),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no evaluation backends configured".to_string()),
        })
    }

    /// Splices constant values into a formula: every free identifier that
    /// is not an explicit parameter is looked up in the constants tree and,
    /// if numeric, replaced with its literal value. Unresolved identifiers
    /// stay in place for the backend to report as undefined.
    fn bind_constants(&self, formula: &str, params: &HashMap<String, f64>) -> String {
        substitute_identifiers(formula, |identifier| {
            if KEYWORD_OPERATORS.contains(&identifier) {
                return None;
            }
            if params.contains_key(identifier) {
                return None;
            }

            if let Some(value) = self.constants.get(identifier) {
                return value.as_number().map(render_literal);
            }

            match identifier {
                "pi" | "math.pi" => Some(render_literal(std::f64::consts::PI)),
                "e" | "math.e" => Some(render_literal(std::f64::consts::E)),
                _ => None,
            }
        })
    }

    /// Backend iteration order for one call: a specific method hint moves
    /// that tier to the front, everything else keeps priority order.
    fn tier_order(&self, method: EvaluationMethod) -> Vec<&dyn EvaluatorBackend> {
        let mut order: Vec<&dyn EvaluatorBackend> =
            self.backends.iter().map(|b| b.as_ref()).collect();

        if method != EvaluationMethod::Auto {
            order.sort_by_key(|backend| backend.method() != method);
        }

        order
    }
}

/// Renders a constant value as a formula literal. Debug formatting keeps a
/// decimal point or exponent, so strictly-typed backends read it as a
/// float; negative values are parenthesized to survive operator contexts.
fn render_literal(value: f64) -> String {
    if value < 0.0 {
        format!("({:?})", value)
    } else {
        format!("{:?}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backends::NativeBackend;
    use crate::domain::models::{FormulaEntry, InMemoryFormulas};
    use serde_json::json;

    fn create_test_constants() -> ConstantsTree {
        ConstantsTree::new(json!({
            "solar_panel": {
                "stc": { "irradiance": 1000.0 },
                "weather_impact": { "rain_factor": 0.7 }
            },
            "rain_factor": 0.7,
            "offset": 0.0
        }))
    }

    fn create_test_formulas() -> InMemoryFormulas {
        InMemoryFormulas::new()
            .with("test.sin_formula", "math.sin(x)")
            .with("test.combined", "math.sin(x) + math.cos(y) + sqrt(z)")
            .with("test.logical", "x > 0 and y < 0 or z == 0")
            .with("solar_irradiance.cloud_impact", "1 - (cloud_cover / 100) * 0.75")
            .with("financial.grid_purchases", "max(demand - production, 0)")
    }

    fn create_test_engine() -> MetricEngine {
        MetricEngine::new(create_test_constants(), Box::new(create_test_formulas()))
    }

    fn params(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    /// A tier that always fails, for exercising the fallback chain.
    struct FailingBackend;

    impl EvaluatorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn method(&self) -> EvaluationMethod {
            EvaluationMethod::Fast
        }

        fn try_evaluate(
            &self,
            _formula: &str,
            _params: &HashMap<String, f64>,
        ) -> Result<f64, EvalError> {
            Err(EvalError {
                backend: "failing",
                message: "unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_named_formula_evaluation() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula(
                "test.sin_formula",
                &params(&[("x", std::f64::consts::FRAC_PI_2)]),
            )
            .unwrap();
        assert!((result - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_combined_formula() {
        let engine = create_test_engine();

        let x: f64 = 0.5;
        let y: f64 = 1.25;
        let z: f64 = 9.0;
        let expected = x.sin() + y.cos() + z.sqrt();

        let result = engine
            .evaluate_formula("test.combined", &params(&[("x", x), ("y", y), ("z", z)]))
            .unwrap();
        assert!((result - expected).abs() < 1e-10);
    }

    #[test]
    fn test_logical_formula_truth_table() {
        let engine = create_test_engine();

        for (x, y, z, expected) in [
            (1.0, -1.0, 5.0, 1.0),
            (1.0, 1.0, 5.0, 0.0),
            (-1.0, -1.0, 0.0, 1.0),
            (-1.0, 1.0, 5.0, 0.0),
        ] {
            let result = engine
                .evaluate_formula("test.logical", &params(&[("x", x), ("y", y), ("z", z)]))
                .unwrap();
            assert_eq!(result, expected, "x={} y={} z={}", x, y, z);
        }
    }

    #[test]
    fn test_boolean_function_forms() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula("and(1, 0) + or(0, 1)", &params(&[]))
            .unwrap();
        assert_eq!(result, 1.0);

        let result = engine
            .evaluate_formula("not (x > 1)", &params(&[("x", 0.5)]))
            .unwrap();
        assert_eq!(result, 1.0);
    }

    #[test]
    fn test_cloud_impact_reference_scenario() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula("solar_irradiance.cloud_impact", &params(&[("cloud_cover", 50.0)]))
            .unwrap();
        assert!((result - 0.625).abs() < 0.001);
    }

    #[test]
    fn test_grid_purchases_reference_scenario() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula(
                "financial.grid_purchases",
                &params(&[("demand", 100.0), ("production", 80.0)]),
            )
            .unwrap();
        assert_eq!(result, 20.0);

        // Production exceeding demand clamps to zero.
        let result = engine
            .evaluate_formula(
                "financial.grid_purchases",
                &params(&[("demand", 80.0), ("production", 100.0)]),
            )
            .unwrap();
        assert_eq!(result, 0.0);
    }

    #[test]
    fn test_literal_formula_text() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula("x * 2 + 1", &params(&[("x", 10.0)]))
            .unwrap();
        assert_eq!(result, 21.0);
    }

    #[test]
    fn test_constant_accessors() {
        let engine = create_test_engine();

        assert_eq!(
            engine.get_constant("solar_panel.stc.irradiance"),
            Some(ConstantValue::Number(1000.0))
        );
        assert_eq!(
            engine.get_constant("solar_panel.weather_impact.rain_factor"),
            Some(ConstantValue::Number(0.7))
        );
        assert_eq!(engine.get_constant("non.existent.constant"), None);
        assert_eq!(engine.get_number("non.existent.constant", 5.0), 5.0);
        assert!(engine.require_constant("non.existent.constant").is_err());
    }

    #[test]
    fn test_implicit_constant_in_formula() {
        let engine = create_test_engine();

        // rain_factor is not a parameter, so it resolves from constants.
        let result = engine
            .evaluate_formula("irradiance * rain_factor", &params(&[("irradiance", 800.0)]))
            .unwrap();
        assert!((result - 560.0).abs() < 1e-9);

        // Dotted constant paths resolve too.
        let result = engine
            .evaluate_formula("solar_panel.stc.irradiance / 2", &params(&[]))
            .unwrap();
        assert_eq!(result, 500.0);
    }

    #[test]
    fn test_parameter_shadows_constant() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula("rain_factor * 10", &params(&[("rain_factor", 0.5)]))
            .unwrap();
        assert_eq!(result, 5.0);
    }

    #[test]
    fn test_zero_valued_constant_substitutes() {
        let engine = create_test_engine();

        let result = engine.evaluate_formula("offset + 3", &params(&[])).unwrap();
        assert_eq!(result, 3.0);
    }

    #[test]
    fn test_builtin_pi() {
        let engine = create_test_engine();

        let result = engine
            .evaluate_formula("math.sin(math.pi / 2)", &params(&[]))
            .unwrap();
        assert!((result - 1.0).abs() < 1e-10);

        let result = engine.evaluate_formula("pi", &params(&[])).unwrap();
        assert!((result - std::f64::consts::PI).abs() < 1e-15);
    }

    #[test]
    fn test_undefined_variable_fails_all_tiers() {
        let engine = create_test_engine();

        let err = engine
            .evaluate_formula("undefined_thing * 2", &params(&[]))
            .unwrap_err();
        match err {
            MetricError::FormulaEvaluation { formula, .. } => {
                assert_eq!(formula, "undefined_thing * 2");
            }
            other => panic!("Expected FormulaEvaluation, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_chain_survives_failing_tier() {
        let engine = MetricEngine::with_backends(
            create_test_constants(),
            Box::new(create_test_formulas()),
            vec![Box::new(FailingBackend), Box::new(NativeBackend::new())],
        );

        let result = engine
            .evaluate_formula(
                "test.sin_formula",
                &params(&[("x", std::f64::consts::FRAC_PI_2)]),
            )
            .unwrap();
        assert!((result - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_all_tiers_failing_reports_last_error() {
        let engine = MetricEngine::with_backends(
            create_test_constants(),
            Box::new(create_test_formulas()),
            vec![Box::new(FailingBackend)],
        );

        let err = engine.evaluate_formula("1 + 1", &params(&[])).unwrap_err();
        match err {
            MetricError::FormulaEvaluation { reason, .. } => {
                assert!(reason.contains("unavailable"));
            }
            other => panic!("Expected FormulaEvaluation, got {:?}", other),
        }
    }

    #[test]
    fn test_native_only_syntax_falls_through() {
        let engine = create_test_engine();

        // The tilde spelling is only understood by the native tier, so this
        // exercises the full chain: earlier tiers fail, the answer is still
        // correct.
        let result = engine
            .evaluate_formula("~(x > 1)", &params(&[("x", 0.5)]))
            .unwrap();
        assert_eq!(result, 1.0);
    }

    #[test]
    fn test_method_hint_reorders_chain() {
        let constants = create_test_constants();
        let mut formulas = InMemoryFormulas::new();
        let mut entry = FormulaEntry::new("x + 1");
        entry.evaluation_method = EvaluationMethod::Fallback;
        formulas.insert("test.pinned", entry);

        let engine = MetricEngine::new(constants, Box::new(formulas));
        let order = engine.tier_order(EvaluationMethod::Fallback);
        assert_eq!(order[0].name(), "fallback");

        // And the formula still evaluates.
        let result = engine
            .evaluate_formula("test.pinned", &params(&[("x", 1.0)]))
            .unwrap();
        assert_eq!(result, 2.0);
    }

    #[test]
    fn test_determinism() {
        let engine = create_test_engine();
        let binding = params(&[("x", 0.7234), ("y", 1.9), ("z", 42.0)]);

        let first = engine.evaluate_formula("test.combined", &binding).unwrap();
        let second = engine.evaluate_formula("test.combined", &binding).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }
}
