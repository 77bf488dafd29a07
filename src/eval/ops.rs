//! Binary/unary operator dispatch (spec.md §4.5 "Operator overloading"):
//! an instance method lookup (the operator's symbol, then its conventional
//! name) wins over the built-in primitive semantics.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::diagnostics::{type_error, value_error, EvalResult};
use crate::environment::Environment;
use crate::value::Value;

use super::Interpreter;

impl Interpreter {
    pub(super) fn eval_binary(
        &mut self,
        env: &Environment,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> EvalResult<Value> {
        if op == BinaryOp::And {
            let l = self.eval_expr(env, lhs)?;
            return if !l.is_truthy() { Ok(l) } else { self.eval_expr(env, rhs) };
        }
        if op == BinaryOp::Or {
            let l = self.eval_expr(env, lhs)?;
            return if l.is_truthy() { Ok(l) } else { self.eval_expr(env, rhs) };
        }
        let l = self.eval_expr(env, lhs)?;
        let r = self.eval_expr(env, rhs)?;
        self.eval_binary_values(env, op, l, r)
    }

    pub(super) fn eval_binary_values(&mut self, env: &Environment, op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
        if let Some(method) = self.find_operator_method(&lhs, op) {
            return self.call_on_value(env, &lhs, &method, &[rhs]);
        }
        builtin_binary(op, lhs, rhs)
    }

    fn find_operator_method(&self, receiver: &Value, op: BinaryOp) -> Option<String> {
        if self.receiver_has_method(receiver, op.symbol()) {
            return Some(op.symbol().to_owned());
        }
        if let Some(name) = op.conventional_name() {
            if self.receiver_has_method(receiver, name) {
                return Some(name.to_owned());
            }
        }
        None
    }

    pub(super) fn receiver_has_method(&self, receiver: &Value, name: &str) -> bool {
        match receiver {
            Value::ClassInstance(inst) => inst.bound_methods.borrow().contains_key(name),
            Value::EnumValueInstance(ev) => ev.bound_methods.borrow().contains_key(name),
            Value::RecordInstance(rec) => rec.definition.methods.borrow().contains_key(name),
            _ => false,
        }
    }

    pub(super) fn eval_unary(&mut self, env: &Environment, op: UnaryOp, expr: &Expr) -> EvalResult<Value> {
        let v = self.eval_expr(env, expr)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
            UnaryOp::Neg => match v {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| value_error("integer overflow negating value")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other if self.receiver_has_method(&other, op.symbol()) => self.call_on_value(env, &other, op.symbol(), &[]),
                other => Err(type_error(format!("cannot negate a value of type '{}'", other.type_name()))),
            },
        }
    }
}

fn int_arith(a: i64, b: i64, op: BinaryOp) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        _ => unreachable!("int_arith only handles Add/Sub/Mul"),
    };
    result.map(Value::Int).ok_or_else(|| value_error("integer overflow"))
}

fn apply_f64(a: f64, b: f64, op: BinaryOp) -> f64 {
    match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => unreachable!("apply_f64 only handles Sub/Mul"),
    }
}

fn numeric_op(lhs: Value, rhs: Value, op: BinaryOp, verb: &str) -> EvalResult<Value> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => int_arith(*a, *b, op),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(apply_f64(*a as f64, *b, op))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(apply_f64(*a, *b as f64, op))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(apply_f64(*a, *b, op))),
        _ => Err(type_error(format!("cannot {verb} '{}' and '{}'", lhs.type_name(), rhs.type_name()))),
    }
}

fn builtin_binary(op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => int_arith(*a, *b, op),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::array(a.borrow().iter().cloned().chain(b.borrow().iter().cloned())))
            }
            (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::string(format!(
                "{}{}",
                crate::converter::to_display_string(&lhs),
                crate::converter::to_display_string(&rhs)
            ))),
            _ => Err(type_error(format!("cannot add '{}' and '{}'", lhs.type_name(), rhs.type_name()))),
        },
        BinaryOp::Sub => numeric_op(lhs, rhs, op, "subtract"),
        BinaryOp::Mul => match (&lhs, &rhs) {
            (Value::String(s), Value::Int(n)) => Ok(Value::string(s.repeat((*n).max(0) as usize))),
            (Value::Int(n), Value::String(s)) => Ok(Value::string(s.repeat((*n).max(0) as usize))),
            _ => numeric_op(lhs, rhs, op, "multiply"),
        },
        BinaryOp::Div => match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(0)) => Err(value_error("division by zero")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.div_euclid(*b))),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            _ => Err(type_error(format!("cannot divide '{}' by '{}'", lhs.type_name(), rhs.type_name()))),
        },
        BinaryOp::Mod => match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(0)) => Err(value_error("modulo by zero")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.rem_euclid(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 % b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a % *b as f64)),
            _ => Err(type_error(format!("cannot take '{}' modulo '{}'", lhs.type_name(), rhs.type_name()))),
        },
        BinaryOp::Eq => Ok(Value::Bool(lhs.structural_eq(&rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.structural_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = lhs
                .partial_cmp_value(&rhs)
                .ok_or_else(|| type_error(format!("cannot compare '{}' and '{}'", lhs.type_name(), rhs.type_name())))?;
            let result = match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                BinaryOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited before reaching builtin_binary"),
    }
}
