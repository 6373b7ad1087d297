//! Constants namespace and dotted-path resolution.
//!
//! Constants are loaded once from a declarative JSON document into an
//! immutable tree. Lookups walk dotted paths such as
//! `solar_panel.stc.irradiance` and either return an `Option` (absent paths
//! are `None`, never a default number) or fail with a typed error for
//! lookups that must resolve.

use serde_json::Value;

use super::errors::{MetricError, MetricResult};

/// A leaf value in the constants tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Number(f64),
    Text(String),
}

impl ConstantValue {
    /// Returns the numeric form of this constant, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ConstantValue::Number(n) => Some(*n),
            ConstantValue::Text(_) => None,
        }
    }
}

/// Immutable-after-load tree of named constants.
///
/// The tree is built once from the parsed constants document and never
/// mutated, so it is safe to share across threads without locking.
#[derive(Debug, Clone)]
pub struct ConstantsTree {
    root: Value,
}

impl ConstantsTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Resolves a dotted path, returning `None` if any segment is missing
    /// or a leaf is reached before the path is exhausted.
    pub fn get(&self, path: &str) -> Option<ConstantValue> {
        let mut node = &self.root;

        for segment in path.split('.') {
            match node {
                Value::Object(map) => {
                    node = map.get(segment)?;
                }
                _ => return None,
            }
        }

        match node {
            Value::Number(n) => n.as_f64().map(ConstantValue::Number),
            Value::String(s) => Some(ConstantValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Resolves a dotted path that must exist.
    pub fn require(&self, path: &str) -> MetricResult<ConstantValue> {
        self.get(path)
            .ok_or_else(|| MetricError::ConstantNotFound(path.to_string()))
    }

    /// Numeric lookup with a caller-supplied default for absent paths.
    pub fn get_number(&self, path: &str, default: f64) -> f64 {
        self.get(path)
            .and_then(|v| v.as_number())
            .unwrap_or(default)
    }
}

impl Default for ConstantsTree {
    fn default() -> Self {
        Self {
            root: Value::Object(serde_json::Map::new()),
        }
    }
}
