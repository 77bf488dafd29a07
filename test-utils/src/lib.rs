//! In-process evaluator driver for integration tests.
//!
//! This engine has no AOT backend to shell out to, so this helper builds an
//! [`Interpreter`] directly, evaluates a source string, and asserts on the
//! resulting `Value`/`Exception`.

use polyloft::converter::to_display_string;
use polyloft::diagnostics::{EvalResult, Exception};
use polyloft::{Interpreter, Value};

/// Evaluate `source` as a standalone program and return its last
/// expression's value or the `Exception` it raised.
pub fn eval(source: &str) -> EvalResult<Value> {
    Interpreter::new().eval_source("<test>", source)
}

/// Assert `source` evaluates successfully and return its value, panicking
/// with the rendered exception otherwise.
pub fn eval_ok(source: &str) -> Value {
    match eval(source) {
        Ok(value) => value,
        Err(exc) => panic!("expected '{source}' to evaluate, got: {exc}"),
    }
}

/// Assert `source` raises an exception and return it, panicking if it
/// evaluated successfully instead.
pub fn eval_err(source: &str) -> Exception {
    match eval(source) {
        Ok(value) => panic!("expected '{source}' to raise, got value: {}", to_display_string(&value)),
        Err(exc) => exc,
    }
}
