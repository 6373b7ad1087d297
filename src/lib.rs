//! solarmetrics - Semantic Metric Layer
//!
//! A formula evaluation engine for solar production metrics: physical
//! constants and algebraic formulas load from declarative JSON
//! configuration, formulas written in common mathematical notation are
//! normalized per backend, and evaluation runs through a tiered chain of
//! backends (fast expression evaluator, optional symbolic evaluator, native
//! fallback parser) with deterministic numeric results.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
