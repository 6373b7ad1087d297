//! Evaluation backends for the tiered formula engine.
//!
//! Each backend implements [`EvaluatorBackend`]: a single attempt at
//! evaluating one formula against one parameter binding. Failure is always a
//! typed [`EvalError`], never a silent sentinel, so the engine can treat any
//! error uniformly as a "try the next tier" signal.
//!
//! Three tiers exist, in priority order:
//! 1. [`FastBackend`]: the `evalexpr` expression evaluator.
//! 2. [`SymbolicBackend`]: the `meval` evaluator, compiled in only when the
//!    `symbolic` cargo feature is enabled.
//! 3. [`NativeBackend`]: the crate's own recursive-descent parser, always
//!    available and restricted to the supplied binding plus the registry's
//!    function namespace.
//!
//! Every backend owns the [`NotationTable`] for its vocabulary and
//! normalizes internally, so callers hand all tiers the same formula text.

use std::collections::HashMap;

use super::models::EvaluationMethod;
use super::notation::{NotationTable, CANONICAL_FUNCTIONS};
use super::parser::{ExpressionEvaluator, FunctionRegistry, Parser};

/// A single tier's evaluation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub backend: &'static str,
    pub message: String,
}

impl EvalError {
    fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} backend: {}", self.backend, self.message)
    }
}

/// One evaluation tier.
pub trait EvaluatorBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// The tier this backend serves when a formula entry requests a
    /// specific evaluation method.
    fn method(&self) -> EvaluationMethod;

    /// Attempts to evaluate a formula against the binding. Backends
    /// normalize notation for their own vocabulary before evaluating.
    fn try_evaluate(
        &self,
        formula: &str,
        params: &HashMap<String, f64>,
    ) -> Result<f64, EvalError>;
}

/// Builds the default backend chain in priority order.
pub fn default_backends() -> Vec<Box<dyn EvaluatorBackend>> {
    let mut backends: Vec<Box<dyn EvaluatorBackend>> = Vec::new();
    backends.push(Box::new(FastBackend::new()));
    #[cfg(feature = "symbolic")]
    backends.push(Box::new(SymbolicBackend::new()));
    backends.push(Box::new(NativeBackend::new()));
    backends
}

/// First tier: the `evalexpr` expression evaluator.
///
/// `evalexpr` types integers and floats strictly and spells boolean
/// operators `&&`/`||`/`!`, so this backend's notation table floatifies
/// integer literals and rewrites the keyword operators accordingly. The
/// canonical math vocabulary is registered as context functions.
pub struct FastBackend {
    table: NotationTable,
}

impl FastBackend {
    pub fn new() -> Self {
        let table = NotationTable::for_vocabulary(CANONICAL_FUNCTIONS)
            .keyword("and", "&&")
            .keyword("or", "||")
            .keyword("not", "!")
            .operator("**", "^")
            .floatify_integers();
        Self { table }
    }

    fn build_context(
        params: &HashMap<String, f64>,
    ) -> Result<evalexpr::HashMapContext, evalexpr::EvalexprError> {
        use evalexpr::{ContextWithMutableFunctions, ContextWithMutableVariables, Value};

        fn unary(f: fn(f64) -> f64) -> evalexpr::Function {
            evalexpr::Function::new(move |argument| {
                let x = argument.as_number()?;
                Ok(Value::Float(f(x)))
            })
        }

        fn binary(name: &'static str, f: fn(f64, f64) -> f64) -> evalexpr::Function {
            evalexpr::Function::new(move |argument| {
                let args = argument.as_tuple()?;
                if args.len() != 2 {
                    return Err(evalexpr::EvalexprError::CustomMessage(format!(
                        "{} requires exactly 2 arguments",
                        name
                    )));
                }
                let a = args[0].as_number()?;
                let b = args[1].as_number()?;
                Ok(Value::Float(f(a, b)))
            })
        }

        let mut context = evalexpr::HashMapContext::new();

        for (name, value) in params {
            context.set_value(name.clone(), Value::Float(*value))?;
        }

        context.set_function("sin".to_string(), unary(f64::sin))?;
        context.set_function("cos".to_string(), unary(f64::cos))?;
        context.set_function("tan".to_string(), unary(f64::tan))?;
        context.set_function("sinh".to_string(), unary(f64::sinh))?;
        context.set_function("cosh".to_string(), unary(f64::cosh))?;
        context.set_function("tanh".to_string(), unary(f64::tanh))?;
        context.set_function("arcsin".to_string(), unary(f64::asin))?;
        context.set_function("arccos".to_string(), unary(f64::acos))?;
        context.set_function("arctan".to_string(), unary(f64::atan))?;
        context.set_function("sqrt".to_string(), unary(f64::sqrt))?;
        context.set_function("exp".to_string(), unary(f64::exp))?;
        context.set_function("ln".to_string(), unary(f64::ln))?;
        context.set_function("log10".to_string(), unary(f64::log10))?;
        context.set_function("abs".to_string(), unary(f64::abs))?;
        context.set_function("power".to_string(), binary("power", f64::powf))?;

        Ok(context)
    }
}

impl Default for FastBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorBackend for FastBackend {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn method(&self) -> EvaluationMethod {
        EvaluationMethod::Fast
    }

    fn try_evaluate(
        &self,
        formula: &str,
        params: &HashMap<String, f64>,
    ) -> Result<f64, EvalError> {
        use evalexpr::Value;

        let normalized = self.table.normalize(formula);
        let context =
            Self::build_context(params).map_err(|e| EvalError::new("fast", e.to_string()))?;

        match evalexpr::eval_with_context(&normalized, &context) {
            Ok(Value::Float(result)) => Ok(result),
            Ok(Value::Int(result)) => Ok(result as f64),
            Ok(Value::Boolean(result)) => Ok(if result { 1.0 } else { 0.0 }),
            Ok(other) => Err(EvalError::new(
                "fast",
                format!("non-numeric result: {:?}", other),
            )),
            Err(e) => Err(EvalError::new("fast", e.to_string())),
        }
    }
}

/// Second tier: the `meval` algebraic evaluator.
///
/// Substitutes numeric values for free symbols and evaluates to a scalar.
/// `meval` has no comparison or boolean operators, so logical formulas fail
/// here and fall through to the native tier.
#[cfg(feature = "symbolic")]
pub struct SymbolicBackend {
    table: NotationTable,
}

#[cfg(feature = "symbolic")]
impl SymbolicBackend {
    pub fn new() -> Self {
        let table = NotationTable::for_vocabulary(CANONICAL_FUNCTIONS).operator("**", "^");
        Self { table }
    }
}

#[cfg(feature = "symbolic")]
impl Default for SymbolicBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "symbolic")]
impl EvaluatorBackend for SymbolicBackend {
    fn name(&self) -> &'static str {
        "symbolic"
    }

    fn method(&self) -> EvaluationMethod {
        EvaluationMethod::Symbolic
    }

    fn try_evaluate(
        &self,
        formula: &str,
        params: &HashMap<String, f64>,
    ) -> Result<f64, EvalError> {
        let normalized = self.table.normalize(formula);

        let expr: meval::Expr = normalized
            .parse()
            .map_err(|e: meval::Error| EvalError::new("symbolic", e.to_string()))?;

        let mut context = meval::Context::new();
        for (name, value) in params {
            context.var(name.clone(), *value);
        }
        context.func("arcsin", f64::asin);
        context.func("arccos", f64::acos);
        context.func("arctan", f64::atan);
        context.func("ln", f64::ln);
        context.func("log10", f64::log10);
        context.func2("power", f64::powf);
        context.func3("if", |condition, then, otherwise| {
            if condition != 0.0 {
                then
            } else {
                otherwise
            }
        });

        expr.eval_with_context(&context)
            .map_err(|e| EvalError::new("symbolic", e.to_string()))
    }
}

/// Last tier: the crate's own parser and AST evaluator.
///
/// Always available. Speaks the canonical vocabulary directly, including
/// the `&`/`|`/`~` boolean symbols the normalizer produces from keyword
/// operators.
pub struct NativeBackend {
    table: NotationTable,
    registry: FunctionRegistry,
}

impl NativeBackend {
    pub fn new() -> Self {
        let table = NotationTable::for_vocabulary(CANONICAL_FUNCTIONS)
            .keyword("and", "&")
            .keyword("or", "|")
            .keyword("not", "~");
        Self {
            table,
            registry: FunctionRegistry::new(),
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn method(&self) -> EvaluationMethod {
        EvaluationMethod::Fallback
    }

    fn try_evaluate(
        &self,
        formula: &str,
        params: &HashMap<String, f64>,
    ) -> Result<f64, EvalError> {
        let normalized = self.table.normalize(formula);

        let mut parser =
            Parser::new(&normalized).map_err(|e| EvalError::new("fallback", e))?;
        let ast = parser.parse().map_err(|e| EvalError::new("fallback", e))?;

        let evaluator = ExpressionEvaluator::new(params, &self.registry);
        evaluator
            .evaluate(&ast)
            .map_err(|e| EvalError::new("fallback", e))
    }
}
