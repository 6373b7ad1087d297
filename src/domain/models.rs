use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Preferred evaluation tier for a formula entry.
///
/// `Auto` lets the engine try tiers in its default priority order; a
/// specific tier moves that backend to the front of the chain. The chain
/// still falls back on failure, so a hint can never make a formula
/// unevaluatable that `Auto` would have handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMethod {
    #[default]
    Auto,
    Fast,
    Symbolic,
    Fallback,
}

/// A named formula loaded from the formulas document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaEntry {
    pub formula: String,
    #[serde(default)]
    pub evaluation_method: EvaluationMethod,
}

impl FormulaEntry {
    pub fn new(formula: &str) -> Self {
        Self {
            formula: formula.to_string(),
            evaluation_method: EvaluationMethod::Auto,
        }
    }
}

/// Lookup of formula entries by dotted name.
///
/// The engine takes this as a constructor-injected capability so tests can
/// substitute an in-memory fixture instead of a loaded configuration store.
pub trait FormulaSource: Send + Sync {
    fn entry(&self, name: &str) -> Option<&FormulaEntry>;
}

/// In-memory formula source, used by tests and embedders that build their
/// formula set programmatically.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFormulas {
    entries: HashMap<String, FormulaEntry>,
}

impl InMemoryFormulas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, entry: FormulaEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    pub fn with(mut self, name: &str, formula: &str) -> Self {
        self.insert(name, FormulaEntry::new(formula));
        self
    }
}

impl FormulaSource for InMemoryFormulas {
    fn entry(&self, name: &str) -> Option<&FormulaEntry> {
        self.entries.get(name)
    }
}

impl FormulaSource for HashMap<String, FormulaEntry> {
    fn entry(&self, name: &str) -> Option<&FormulaEntry> {
        self.get(name)
    }
}
