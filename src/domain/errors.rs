#[derive(Debug, Clone, PartialEq)]
pub enum MetricError {
    ConfigLoad(String),
    ConstantNotFound(String),
    FormulaEvaluation { formula: String, reason: String },
}

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::ConfigLoad(msg) => {
                write!(f, "Configuration load error: {}", msg)
            }
            MetricError::ConstantNotFound(path) => {
                write!(f, "Constant not found: {}", path)
            }
            MetricError::FormulaEvaluation { formula, reason } => {
                write!(f, "Formula evaluation error in '{}': {}", formula, reason)
            }
        }
    }
}

impl std::error::Error for MetricError {}

pub type MetricResult<T> = Result<T, MetricError>;
