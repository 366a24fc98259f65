//! Dialect dispatch and script execution.

use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

/// Wall-clock budget for a single script invocation. A script that runs
/// past this is aborted and counts as a transformation error.
const WALL_CLOCK_BUDGET: Duration = Duration::from_millis(250);

/// Engine operation cap, the deterministic half of the budget.
const OPERATION_BUDGET: u64 = 100_000;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unknown transformation dialect: {0}")]
    UnknownDialect(String),

    #[error("script compile error: {0}")]
    Compile(String),

    #[error("script execution error: {0}")]
    Execution(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("unsupported path expression: {0}")]
    UnsupportedPath(String),
}

/// Transformation dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Embedded scripting; the input is bound to `input` and `data`.
    Script,
    /// JSON query; one produced value is returned bare, otherwise the
    /// ordered sequence of all produced values.
    JsonPath,
    /// Partial path-expression dialect: `$` is rewritten to the script
    /// engine's `input` binding.
    Path,
}

impl std::str::FromStr for Dialect {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "script" => Ok(Self::Script),
            "jsonpath" => Ok(Self::JsonPath),
            "path" => Ok(Self::Path),
            other => Err(TransformError::UnknownDialect(other.to_string())),
        }
    }
}

/// Execute a single transformation against an input value.
///
/// A string input that parses as JSON is handed to the script as the
/// parsed structure; any other string is passed through as text.
pub fn execute(dialect: Dialect, script: &str, input: &Value) -> Result<Value, TransformError> {
    let input = coerce_input(input);
    match dialect {
        Dialect::Script => execute_script(script, &input),
        Dialect::JsonPath => execute_jsonpath(script, &input),
        Dialect::Path => execute_path(script, &input),
    }
}

fn coerce_input(input: &Value) -> Value {
    if let Value::String(s) = input {
        if let Ok(parsed) = serde_json::from_str::<Value>(s) {
            return parsed;
        }
    }
    input.clone()
}

/// Fresh engine per invocation so globals and mutable state never leak
/// across requests.
fn fresh_engine() -> rhai::Engine {
    let mut engine = rhai::Engine::new();
    engine.set_max_operations(OPERATION_BUDGET);
    let started = Instant::now();
    engine.on_progress(move |_| {
        (started.elapsed() > WALL_CLOCK_BUDGET).then(|| "wall-clock budget exceeded".into())
    });
    engine
}

/// The user script may be a bare expression, a `fn` declaration or a
/// closure; detect which form was provided and arrange for the final
/// expression's value to be returned.
fn execute_script(script: &str, input: &Value) -> Result<Value, TransformError> {
    let engine = fresh_engine();
    let input_dyn =
        rhai::serde::to_dynamic(input).map_err(|e| TransformError::Execution(e.to_string()))?;

    let mut scope = rhai::Scope::new();
    scope.push_dynamic("input", input_dyn.clone());
    scope.push_dynamic("data", input_dyn.clone());

    let trimmed = script.trim();
    let result: rhai::Dynamic = if trimmed.starts_with("fn ") || trimmed.contains("\nfn ") {
        // Function declaration: call the first declared function, passing
        // the input when it takes a parameter.
        let ast = engine
            .compile(script)
            .map_err(|e| TransformError::Compile(e.to_string()))?;
        let (name, arity) = ast
            .iter_functions()
            .next()
            .map(|f| (f.name.to_string(), f.params.len()))
            .ok_or_else(|| TransformError::Compile("no function declared".to_string()))?;
        let call = if arity == 0 {
            engine.call_fn::<rhai::Dynamic>(&mut scope, &ast, &name, ())
        } else {
            engine.call_fn::<rhai::Dynamic>(&mut scope, &ast, &name, (input_dyn,))
        };
        call.map_err(|e| TransformError::Execution(e.to_string()))?
    } else if trimmed.starts_with('|') {
        // Closure: bind it, then call it with the input.
        let wrapped = format!("let handler = {trimmed};\nhandler.call(input)");
        engine
            .eval_with_scope(&mut scope, &wrapped)
            .map_err(|e| TransformError::Execution(e.to_string()))?
    } else {
        // Bare expression or statement list ending in an expression;
        // top-level `return` also lands here.
        engine
            .eval_with_scope(&mut scope, script)
            .map_err(|e| TransformError::Execution(e.to_string()))?
    };

    rhai::serde::from_dynamic(&result).map_err(|e| TransformError::Execution(e.to_string()))
}

/// Parse the query once, run it, and collapse a single result.
fn execute_jsonpath(query: &str, input: &Value) -> Result<Value, TransformError> {
    let compiled = jsonpath_lib::Compiled::compile(query).map_err(TransformError::Query)?;
    let found = compiled
        .select(input)
        .map_err(|e| TransformError::Query(format!("{e:?}")))?;

    let mut values: Vec<Value> = found.into_iter().cloned().collect();
    Ok(if values.len() == 1 {
        values.pop().unwrap()
    } else {
        Value::Array(values)
    })
}

/// Intentionally partial: only the `$` root sentinel is translated.
/// Expressions using the untranslated `@` context token are rejected
/// rather than left to misbehave.
fn execute_path(expression: &str, input: &Value) -> Result<Value, TransformError> {
    let expr = expression.trim();
    if expr.contains('@') {
        return Err(TransformError::UnsupportedPath(
            "the `@` context token is not supported".to_string(),
        ));
    }
    let translated = expr.replace('$', "input");
    execute_script(&translated, input)
}
