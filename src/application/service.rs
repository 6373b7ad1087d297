//! Caller-facing facade over the metric engine.
//!
//! `MetricService` is the one object downstream domain code (weather impact
//! estimation, production and financial calculations) holds. It is built
//! once at the application's composition root from a loaded [`ConfigStore`]
//! and is read-only thereafter; tests construct their own instances instead
//! of mutating a shared one.

use std::collections::HashMap;
use std::path::Path;

use crate::domain::{ConstantValue, MetricEngine, MetricResult};
use crate::infrastructure::ConfigStore;

/// Process-level metric evaluation service.
///
/// The two methods `get_constant`/`get_number` and `evaluate_formula` are
/// the entire contract the rest of the system relies on; the internal
/// backend tiering may evolve freely behind them.
///
/// # Examples
///
/// ```
/// use solarmetrics::application::MetricService;
/// use solarmetrics::infrastructure::ConfigStore;
///
/// let store = ConfigStore::from_strs(
///     r#"{ "gravity": 9.81 }"#,
///     r#"{ "test.double": { "formula": "x * 2" } }"#,
/// ).unwrap();
/// let service = MetricService::new(store);
///
/// assert_eq!(service.get_number("gravity", 0.0), 9.81);
///
/// let mut params = std::collections::HashMap::new();
/// params.insert("x".to_string(), 21.0);
/// assert_eq!(service.evaluate_formula("test.double", &params).unwrap(), 42.0);
/// ```
pub struct MetricService {
    engine: MetricEngine,
}

impl MetricService {
    /// Builds the service from loaded configuration.
    pub fn new(store: ConfigStore) -> Self {
        let (constants, formulas) = store.into_parts();
        Self {
            engine: MetricEngine::new(constants, Box::new(formulas)),
        }
    }

    /// Loads configuration eagerly and builds the service, failing fast on
    /// any configuration problem.
    pub fn from_files(
        constants_path: impl AsRef<Path>,
        formulas_path: impl AsRef<Path>,
    ) -> MetricResult<Self> {
        Ok(Self::new(ConfigStore::load(constants_path, formulas_path)?))
    }

    /// Resolves a constant by dotted path; `None` when absent.
    pub fn get_constant(&self, path: &str) -> Option<ConstantValue> {
        self.engine.get_constant(path)
    }

    /// Numeric constant lookup with a caller-supplied default.
    pub fn get_number(&self, path: &str, default: f64) -> f64 {
        self.engine.get_number(path, default)
    }

    /// Evaluates a named formula (or literal formula text) against the
    /// supplied parameters.
    pub fn evaluate_formula(
        &self,
        name_or_formula: &str,
        params: &HashMap<String, f64>,
    ) -> MetricResult<f64> {
        self.engine.evaluate_formula(name_or_formula, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> MetricService {
        let store = ConfigStore::from_strs(
            r#"{
                "solar_panel": {
                    "stc": { "irradiance": 1000.0 },
                    "weather_impact": { "rain_factor": 0.7 }
                }
            }"#,
            r#"{
                "solar_irradiance.cloud_impact": {
                    "formula": "1 - (cloud_cover / 100) * 0.75"
                },
                "financial.grid_purchases": {
                    "formula": "max(demand - production, 0)"
                }
            }"#,
        )
        .unwrap();
        MetricService::new(store)
    }

    fn params(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_facade_constants() {
        let service = create_test_service();

        assert_eq!(service.get_number("solar_panel.stc.irradiance", 0.0), 1000.0);
        assert_eq!(
            service.get_number("solar_panel.weather_impact.rain_factor", 0.0),
            0.7
        );
        assert_eq!(service.get_constant("non.existent.constant"), None);
    }

    #[test]
    fn test_facade_formula_evaluation() {
        let service = create_test_service();

        let result = service
            .evaluate_formula(
                "solar_irradiance.cloud_impact",
                &params(&[("cloud_cover", 50.0)]),
            )
            .unwrap();
        assert!((result - 0.625).abs() < 0.001);

        let result = service
            .evaluate_formula(
                "financial.grid_purchases",
                &params(&[("demand", 100.0), ("production", 80.0)]),
            )
            .unwrap();
        assert_eq!(result, 20.0);
    }

    #[test]
    fn test_shipped_reference_configuration() {
        let root = env!("CARGO_MANIFEST_DIR");
        let service = MetricService::from_files(
            format!("{}/config/constants.json", root),
            format!("{}/config/formulas.json", root),
        )
        .unwrap();

        assert_eq!(service.get_number("solar_panel.stc.irradiance", 0.0), 1000.0);
        assert_eq!(
            service.get_number("solar_panel.weather_impact.rain_factor", 0.0),
            0.7
        );

        let result = service
            .evaluate_formula(
                "solar_irradiance.rain_adjusted",
                &params(&[("irradiance", 1000.0)]),
            )
            .unwrap();
        assert!((result - 700.0).abs() < 1e-9);

        let result = service
            .evaluate_formula(
                "financial.net_cost",
                &params(&[("demand", 10.0), ("production", 4.0)]),
            )
            .unwrap();
        assert!((result - 6.0 * 0.32).abs() < 1e-9);
    }

    #[test]
    fn test_facade_error_is_typed() {
        let service = create_test_service();

        let err = service
            .evaluate_formula("no_such_param * 2", &params(&[]))
            .unwrap_err();
        // Downstream callers convert this into a degraded response; the
        // facade's job is to never return a silently wrong number.
        assert!(err.to_string().contains("no_such_param * 2"));
    }
}
