//! Destructuring assignment (spec.md §4.1): the `Unstructured` protocol
//! (`__pieces`/`__getPiece`) first, then `Array`/`Record` positional
//! fallback, padding with `Nil` for any name beyond what the value offers.

use crate::diagnostics::EvalResult;
use crate::environment::Environment;
use crate::value::Value;

use super::Interpreter;

impl Interpreter {
    pub(super) fn destructure(&mut self, env: &Environment, value: &Value, count: usize) -> EvalResult<Vec<Value>> {
        if let Value::ClassInstance(inst) = value {
            if inst.class.protocols.borrow().is_unstructured() {
                let pieces = self.call_on_value(env, value, "__pieces", &[])?;
                let reported = match pieces {
                    Value::Int(n) if n >= 0 => n as usize,
                    _ => 0,
                };
                let mut out = Vec::with_capacity(count);
                for i in 0..count {
                    if i < reported {
                        out.push(self.call_on_value(env, value, "__getPiece", &[Value::Int(i as i64)])?);
                    } else {
                        out.push(Value::Nil);
                    }
                }
                return Ok(out);
            }
        }
        match value {
            Value::Array(items) => {
                let items = items.borrow();
                Ok((0..count).map(|i| items.get(i).cloned().unwrap_or(Value::Nil)).collect())
            }
            Value::RecordInstance(rec) => Ok(rec
                .definition
                .fields
                .iter()
                .map(|name| rec.values.get(name).cloned().unwrap_or(Value::Nil))
                .chain(std::iter::repeat(Value::Nil))
                .take(count)
                .collect()),
            _ => Ok(vec![Value::Nil; count]),
        }
    }
}
