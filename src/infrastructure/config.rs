//! Configuration loading for the metric layer.
//!
//! Two declarative JSON documents feed the engine: a nested constants tree
//! and a flat map of named formula entries. Both are read and parsed
//! eagerly, exactly once per store; any failure is fatal to construction
//! since there is no sensible partial-config mode.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::domain::{ConstantsTree, FormulaEntry, MetricError, MetricResult};

/// Loaded, immutable configuration: the constants tree and formula map.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    constants: ConstantsTree,
    formulas: HashMap<String, FormulaEntry>,
}

impl ConfigStore {
    /// Reads and parses both configuration documents from the filesystem.
    pub fn load(
        constants_path: impl AsRef<Path>,
        formulas_path: impl AsRef<Path>,
    ) -> MetricResult<Self> {
        let constants_json = read_document(constants_path.as_ref())?;
        let formulas_json = read_document(formulas_path.as_ref())?;
        Self::from_strs(&constants_json, &formulas_json)
    }

    /// Builds a store from in-memory JSON strings, for tests and embedders
    /// that manage their own document storage.
    pub fn from_strs(constants_json: &str, formulas_json: &str) -> MetricResult<Self> {
        let constants: Value = serde_json::from_str(constants_json)
            .map_err(|e| MetricError::ConfigLoad(format!("constants document: {}", e)))?;

        if !constants.is_object() {
            return Err(MetricError::ConfigLoad(
                "constants document: root must be an object".to_string(),
            ));
        }

        let formulas: HashMap<String, FormulaEntry> = serde_json::from_str(formulas_json)
            .map_err(|e| MetricError::ConfigLoad(format!("formulas document: {}", e)))?;

        Ok(Self {
            constants: ConstantsTree::new(constants),
            formulas,
        })
    }

    pub fn constants(&self) -> &ConstantsTree {
        &self.constants
    }

    pub fn formulas(&self) -> &HashMap<String, FormulaEntry> {
        &self.formulas
    }

    /// Consumes the store, yielding the pieces the engine is built from.
    pub fn into_parts(self) -> (ConstantsTree, HashMap<String, FormulaEntry>) {
        (self.constants, self.formulas)
    }
}

fn read_document(path: &Path) -> MetricResult<String> {
    fs::read_to_string(path)
        .map_err(|e| MetricError::ConfigLoad(format!("{}: {}", path.display(), e)))
}
