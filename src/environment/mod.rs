//! Lexically scoped environment (spec component B).
//!
//! A scope-stack design (a `Vec` of `Rc<RefCell<Scope>>` rather than a fresh
//! environment cloned per block), generalized from a two-way mutability
//! split to the three-way `var`/`const`/`final` spec.md §4.1 requires, plus
//! a deferred-action stack and file/package/position context.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::diagnostics::{runtime_error, EvalResult, Position};
use crate::value::Value;

/// Whether a variable binding can be reassigned, and if not, whether it may
/// still be assigned exactly once (`final`) or never again (`const`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Var,
    Const,
    Final,
}

struct Binding {
    value: Value,
    mutability: Mutability,
}

#[derive(Default)]
struct Scope {
    bindings: FxHashMap<String, Binding>,
}

/// A deferred action captured by a `defer` statement: the callee and its
/// already-evaluated arguments (spec.md §4.1 — argument expressions are
/// evaluated at the `defer` site; only the call itself is postponed).
/// Stored as data rather than a closure because running it later requires
/// calling back into the evaluator, which a plain `Fn` capture can't reach
/// without a circular `Environment`/`eval` dependency.
#[derive(Clone)]
pub struct DeferredAction {
    pub callee: Value,
    /// `Some(method)` when the deferred call is a method call on `callee`
    /// (e.g. `defer conn.close()`); `None` when `callee` is itself the
    /// callable (a function/lambda/constructor value).
    pub method: Option<String>,
    pub args: Vec<Value>,
}

/// A lexically scoped environment: a stack of scopes (innermost last),
/// a deferred-action LIFO stack, and file/package/position context used by
/// diagnostics and the module loader's `$file`/`$package` env vars.
#[derive(Clone)]
pub struct Environment {
    scopes: Rc<RefCell<Vec<Rc<RefCell<Scope>>>>>,
    defers: Rc<RefCell<Vec<DeferredAction>>>,
    pub file: Rc<String>,
    pub package: Rc<String>,
    pub position: Position,
}

impl Environment {
    pub fn new(file: impl Into<String>, package: impl Into<String>) -> Self {
        Environment {
            scopes: Rc::new(RefCell::new(vec![Rc::new(RefCell::new(Scope::default()))])),
            defers: Rc::new(RefCell::new(Vec::new())),
            file: Rc::new(file.into()),
            package: Rc::new(package.into()),
            position: Position::default(),
        }
    }

    /// A new environment whose single scope sits "under" this one logically
    /// (spec.md §4.1 `child()`), sharing file/package context.
    pub fn child(&self) -> Self {
        Environment {
            scopes: Rc::new(RefCell::new(vec![Rc::new(RefCell::new(Scope::default()))])),
            defers: Rc::new(RefCell::new(Vec::new())),
            file: Rc::clone(&self.file),
            package: Rc::clone(&self.package),
            position: self.position,
        }
    }

    /// Push a nested block scope sharing this environment's defer stack and
    /// context (used for `if`/`for`/`loop` bodies, which are not separate
    /// function-call environments).
    pub fn push_block(&self) {
        self.scopes
            .borrow_mut()
            .push(Rc::new(RefCell::new(Scope::default())));
    }

    pub fn pop_block(&self) {
        let mut scopes = self.scopes.borrow_mut();
        if scopes.len() > 1 {
            scopes.pop();
        }
    }

    /// `define(name, value, kind)` — creates a new binding in the current
    /// (innermost) scope.
    pub fn define(&self, name: impl Into<String>, value: Value, mutability: Mutability) {
        let scopes = self.scopes.borrow();
        let current = scopes.last().expect("environment always has a scope");
        current
            .borrow_mut()
            .bindings
            .insert(name.into(), Binding { value, mutability });
    }

    /// `get(name)` — walks the scope stack innermost-first.
    pub fn get(&self, name: &str) -> Option<Value> {
        let scopes = self.scopes.borrow();
        for scope in scopes.iter().rev() {
            if let Some(binding) = scope.borrow().bindings.get(name) {
                return Some(binding.value.clone());
            }
        }
        None
    }

    /// The mutability `name` was bound with, walking the scope stack
    /// innermost-first, same order as `get`. Used to decide whether a field
    /// assignment through a plain identifier targets a `final` binding
    /// (spec.md §3/§8 "Const/final immutability").
    pub fn mutability_of(&self, name: &str) -> Option<Mutability> {
        let scopes = self.scopes.borrow();
        for scope in scopes.iter().rev() {
            if let Some(binding) = scope.borrow().bindings.get(name) {
                return Some(binding.mutability);
            }
        }
        None
    }

    pub fn this(&self) -> Option<Value> {
        self.get("this")
    }

    /// Every name bound in this environment's outermost scope (spec.md
    /// §4.8): used by the module loader to collect candidate exports after
    /// running a module's top-level statements.
    pub fn outer_bindings(&self) -> FxHashMap<String, Value> {
        let scopes = self.scopes.borrow();
        let outer = scopes.first().expect("environment always has a scope");
        outer
            .borrow()
            .bindings
            .iter()
            .map(|(name, binding)| (name.clone(), binding.value.clone()))
            .collect()
    }

    /// `set(name, value)` — writes to the closest scope that already binds
    /// `name`; const/final violations are rejected with a runtime error.
    pub fn set(&self, name: &str, value: Value) -> EvalResult<()> {
        let scopes = self.scopes.borrow();
        for scope in scopes.iter().rev() {
            let mut scope = scope.borrow_mut();
            if let Some(binding) = scope.bindings.get_mut(name) {
                match binding.mutability {
                    Mutability::Var => {
                        binding.value = value;
                        return Ok(());
                    }
                    Mutability::Const => {
                        return Err(runtime_error(format!(
                            "cannot reassign const variable '{name}'"
                        ))
                        .at(self.file.as_str(), self.position));
                    }
                    Mutability::Final => {
                        // `let final x = v;` always carries an initializer
                        // (src/polyloft.pest's `let_stmt` requires `"=" expr`
                        // on every binding), so `define` already gave this
                        // binding its one assignment; any `set` that reaches
                        // here is a reassignment and is always rejected.
                        return Err(runtime_error(format!(
                            "cannot reassign final variable '{name}'"
                        ))
                        .at(self.file.as_str(), self.position));
                    }
                }
            }
        }
        drop(scopes);
        // Not found anywhere: define in the current scope, matching
        // spec.md's "else to the current scope" fallback.
        self.define(name.to_owned(), value, Mutability::Var);
        Ok(())
    }

    /// `defer(callee, method, args)` — pushes an action onto the local
    /// stack; `method` is `Some(name)` for a deferred method call.
    pub fn defer(&self, callee: Value, method: Option<String>, args: Vec<Value>) {
        self.defers.borrow_mut().push(DeferredAction { callee, method, args });
    }

    /// Drains every deferred action in reverse-registration order, to be
    /// invoked by the caller (who alone has evaluator access to actually run
    /// a call) on environment exit regardless of how the function/lambda
    /// body exited. Per spec "defer actions that themselves error are
    /// swallowed (policy: diagnostics only; do not replace a pending
    /// exception)" — the caller is expected to log and not propagate.
    pub fn take_defers(&self) -> Vec<DeferredAction> {
        self.defers.borrow_mut().drain(..).rev().collect()
    }

    pub fn with_position(&self, position: Position) -> Self {
        let mut env = self.clone();
        env.position = position;
        env
    }
}

/// Process-wide environment pool (spec.md §4.1 "Pooling"). Function/lambda
/// calls acquire a cleared environment and release it on exit; released
/// environments must not be referenced afterward, which this enforces by
/// handing back a fresh, empty `Environment` rather than truly recycling
/// allocations (the host allocator already pools small `Rc` allocations, so
/// the intended performance characteristic is met without unsafe
/// reuse-after-release tracking).
pub struct EnvironmentPool;

impl EnvironmentPool {
    pub fn acquire(file: impl Into<String>, package: impl Into<String>) -> Environment {
        Environment::new(file, package)
    }

    pub fn release(_env: Environment) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get_round_trips() {
        let env = Environment::new("a.pf", "main");
        env.define("x", Value::Int(1), Mutability::Var);
        assert!(matches!(env.get("x"), Some(Value::Int(1))));
    }

    #[test]
    fn const_rejects_reassignment() {
        let env = Environment::new("a.pf", "main");
        env.define("x", Value::Int(1), Mutability::Const);
        assert!(env.set("x", Value::Int(2)).is_err());
    }

    #[test]
    fn final_rejects_any_reassignment_after_its_initializer() {
        let env = Environment::new("a.pf", "main");
        env.define("x", Value::Int(1), Mutability::Final);
        assert!(matches!(env.get("x"), Some(Value::Int(1))));
        assert!(env.set("x", Value::Int(2)).is_err());
    }

    #[test]
    fn block_scoping_shadows_and_restores() {
        let env = Environment::new("a.pf", "main");
        env.define("x", Value::Int(1), Mutability::Var);
        env.push_block();
        env.define("x", Value::Int(2), Mutability::Var);
        assert!(matches!(env.get("x"), Some(Value::Int(2))));
        env.pop_block();
        assert!(matches!(env.get("x"), Some(Value::Int(1))));
    }

    #[test]
    fn defers_drain_in_reverse_order() {
        let env = Environment::new("a.pf", "main");
        for i in 0..3 {
            env.defer(Value::Int(i), None, Vec::new());
        }
        let drained: Vec<_> = env.take_defers().into_iter().map(|a| a.callee).collect();
        assert!(matches!(drained[0], Value::Int(2)));
        assert!(matches!(drained[1], Value::Int(1)));
        assert!(matches!(drained[2], Value::Int(0)));
    }
}
