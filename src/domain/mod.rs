pub mod backends;
pub mod constants;
pub mod errors;
pub mod models;
pub mod notation;
pub mod parser;
pub mod services;

pub use backends::{default_backends, EvalError, EvaluatorBackend};
pub use constants::{ConstantValue, ConstantsTree};
pub use errors::{MetricError, MetricResult};
pub use models::{EvaluationMethod, FormulaEntry, FormulaSource, InMemoryFormulas};
pub use notation::NotationTable;
pub use services::MetricEngine;
