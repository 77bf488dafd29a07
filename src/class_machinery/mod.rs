//! Class/Interface Machinery (spec component D): builds class definitions
//! from the AST, instantiates instances, binds methods (including default
//! interface methods), resolves overloads by arity, and walks inheritance
//! for `super`.
//!
//! A recursive call-binding approach generalized into the full
//! instance-construction pipeline spec.md §4.3 lays out. The `Evaluator`
//! trait below is the seam that breaks the otherwise-circular dependency
//! between this module (which must run constructor/method bodies) and the
//! `eval` module (which must dispatch through class definitions);
//! `eval::Interpreter` is the sole implementor.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Block, Param, TypeExpr};
use crate::diagnostics::{arity_error, attribute_error, initialization_error, name_error, EvalResult};
use crate::environment::{Environment, Mutability};
use crate::registry::TypeRegistry;
use crate::typecheck;
use crate::value::{
    Access, ClassDefinition, ClassInstance, ExecSignal, FunctionDefinition, GenericBound, MethodBody,
    MethodInfo, OverloadSet, Value, Variance,
};

/// The callback surface class machinery needs back into the evaluator:
/// running a method/constructor body and evaluating a field initializer
/// expression in the constructing environment.
pub trait Evaluator {
    fn registry(&self) -> &TypeRegistry;
    fn exec_block(&mut self, env: &Environment, block: &Block) -> EvalResult<ExecSignal>;
    /// Invokes an already-resolved callee value with already-evaluated
    /// arguments; used to run a deferred action at scope exit; without this
    /// a `DeferredAction` (data, not a closure) could never be executed.
    /// `method` is `Some(name)` to call a method on `callee` (the receiver),
    /// `None` when `callee` is itself the callable.
    fn call_value(
        &mut self,
        env: &Environment,
        callee: &Value,
        method: Option<&str>,
        args: &[Value],
    ) -> EvalResult<Value>;
}

/// Runs every action `env` accumulated via `defer`, in reverse-registration
/// order, logging (never propagating) a failing one (spec.md §7).
pub fn run_deferred<E: Evaluator>(evaluator: &mut E, env: &Environment) {
    for action in env.take_defers() {
        let outcome = evaluator.call_value(env, &action.callee, action.method.as_deref(), &action.args);
        if let Err(e) = outcome {
            log::warn!("deferred action failed: {e}");
        }
    }
}

/// `select_overload(overloads, arity)` (spec.md §4.3): the first overload
/// whose fixed-parameter count equals arity wins, preferring exact matches
/// over variadic ones; a variadic overload matches when arity is at least
/// its non-variadic parameter count.
pub fn select_overload(overloads: &OverloadSet, arity: usize) -> Option<Rc<MethodInfo>> {
    for info in overloads {
        let required = required_count(&info.params);
        let has_variadic = info.params.last().map(|p| p.variadic).unwrap_or(false);
        if !has_variadic && required == arity {
            return Some(Rc::clone(info));
        }
    }
    for info in overloads {
        let required = required_count(&info.params);
        let has_variadic = info.params.last().map(|p| p.variadic).unwrap_or(false);
        if has_variadic && arity >= required {
            return Some(Rc::clone(info));
        }
    }
    None
}

/// The count of leading parameters that MUST be supplied by the caller: a
/// defaulted parameter (or the trailing variadic) is optional.
fn required_count(params: &[Param]) -> usize {
    params.iter().take_while(|p| !p.variadic && p.default.is_none()).count()
}

/// Parameter binding shared by every call site (function, lambda, method,
/// constructor) — spec.md §4.3 steps 1-6. `eval_default`, when given, is
/// used to produce a value for a defaulted parameter the caller omitted;
/// native call sites that have no defaulted parameters can pass `None`.
/// `owner_type_params` is the generic-parameter list of the
/// class/function the bound parameters belong to (empty where none apply,
/// e.g. enum/record methods), used to reject a covariant (`out`) type
/// parameter appearing in one of these input positions (spec.md §8
/// Variance) at the moment a call actually binds arguments to it.
pub fn bind_params(
    env: &Environment,
    params: &[Param],
    args: &[Value],
    registry: &TypeRegistry,
    type_args: Option<&FxHashMap<String, TypeExpr>>,
    owner_type_params: &[GenericBound],
    mut eval_default: Option<&mut dyn FnMut(&crate::ast::Expr) -> EvalResult<Value>>,
) -> EvalResult<()> {
    let required = required_count(params);
    if args.len() < required {
        return Err(arity_error(format!(
            "expected at least {required} argument(s), got {}",
            args.len()
        )));
    }
    let has_variadic = params.last().map(|p| p.variadic).unwrap_or(false);
    if !has_variadic && args.len() > params.len() {
        return Err(arity_error(format!(
            "expected at most {} argument(s), got {}",
            params.len(),
            args.len()
        )));
    }

    for (i, param) in params.iter().enumerate() {
        check_param_variance(param, owner_type_params)?;
        if param.variadic {
            let rest = &args[i.min(args.len())..];
            for arg in rest {
                check_param_type(param, arg, registry, type_args)?;
            }
            env.define(param.name.clone(), Value::array(rest.iter().cloned()), Mutability::Var);
            return Ok(());
        }
        let arg = match args.get(i) {
            Some(v) => v.clone(),
            None => match (&param.default, eval_default.as_deref_mut()) {
                (Some(expr), Some(f)) => f(expr)?,
                _ => Value::Nil,
            },
        };
        check_param_type(param, &arg, registry, type_args)?;
        env.define(param.name.clone(), arg, Mutability::Var);
    }
    Ok(())
}

fn check_param_variance(param: &Param, owner_type_params: &[GenericBound]) -> EvalResult<()> {
    let Some(name) = param.type_expr.as_ref().and_then(|t| t.base_name()) else {
        return Ok(());
    };
    if let Some(bound) = owner_type_params.iter().find(|b| b.name == name) {
        check_variance_for_input(name, bound.variance)?;
    }
    Ok(())
}

fn check_param_type(
    param: &Param,
    arg: &Value,
    registry: &TypeRegistry,
    type_args: Option<&FxHashMap<String, TypeExpr>>,
) -> EvalResult<()> {
    let Some(declared) = &param.type_expr else {
        return Ok(());
    };
    if let TypeExpr::Named(name) = declared {
        if let Some(map) = type_args {
            if let Some(resolved) = map.get(name) {
                if matches!(resolved, TypeExpr::Wildcard(_)) || matches!(resolved, TypeExpr::Any) {
                    return Ok(());
                }
                if !typecheck::is_instance_of(registry, arg, resolved) {
                    return Err(crate::diagnostics::type_error(format!(
                        "argument for '{}' does not match bound type '{resolved:?}'",
                        param.name
                    )));
                }
                return Ok(());
            }
        }
    }
    if !typecheck::is_instance_of(registry, arg, declared) {
        return Err(crate::diagnostics::type_error(format!(
            "argument for '{}' does not match declared type",
            param.name
        )));
    }
    Ok(())
}

/// Rejects binding a covariant (`out`) generic parameter in an input
/// position (spec.md §4.3 step 4, §8 Variance). Run from `bind_params` at
/// call time: a declaration that never gets called this way is fine.
fn check_variance_for_input(name: &str, variance: Variance) -> EvalResult<()> {
    if let Some(msg) = typecheck::reject_out_in_input_position(name, variance) {
        return Err(crate::diagnostics::type_error(msg));
    }
    Ok(())
}

/// Recursively initializes fields from the root ancestor down (spec.md
/// §4.3 step 3), so overriding initializers win.
pub fn init_fields<E: Evaluator>(
    evaluator: &mut E,
    class: &Rc<ClassDefinition>,
    env: &Environment,
    fields: &RefCell<FxHashMap<String, Value>>,
) -> EvalResult<()> {
    if let Some(parent) = class.parent.borrow().clone() {
        init_fields(evaluator, &parent, env, fields)?;
    }
    for (name, info) in &class.fields {
        if info.is_static {
            continue;
        }
        let value = match &info.initial {
            Some(block) => evaluator.exec_block(env, block)?.into_value(),
            None => Value::Nil,
        };
        fields.borrow_mut().insert(name.clone(), value);
    }
    Ok(())
}

/// Binds methods by walking the ancestor chain bottom-up so a descendant's
/// method with the same name overrides the ancestor's (spec.md §4.3 step
/// 4), then binds default interface methods not already present (step 5).
pub fn bind_methods(
    class: &Rc<ClassDefinition>,
) -> FxHashMap<String, OverloadSet> {
    let mut bound: FxHashMap<String, OverloadSet> = FxHashMap::default();
    let mut chain = Vec::new();
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        chain.push(Rc::clone(&c));
        current = c.parent.borrow().clone();
    }
    for c in chain.iter().rev() {
        for (name, overloads) in c.methods.borrow().iter() {
            let non_static: OverloadSet = overloads
                .iter()
                .filter(|m| !m.is_static)
                .cloned()
                .collect();
            if !non_static.is_empty() {
                bound.insert(name.clone(), non_static);
            }
        }
    }
    for iface in class.interfaces.borrow().iter() {
        bind_interface_defaults(iface, &mut bound);
    }
    if !bound.contains_key("toString") {
        bound.insert(
            "toString".to_owned(),
            vec![Rc::new(MethodInfo {
                params: Vec::new(),
                return_type: Some(TypeExpr::named("String")),
                body: MethodBody::Native(Rc::new(|env, _args| {
                    let this = env.this().unwrap_or(Value::Nil);
                    Ok(Value::string(format!("<{}>", this.type_name())))
                })),
                access: Access::Public,
                is_static: false,
            })],
        );
    }
    bound
}

/// `pub(crate)` so `eval::bind_enum_methods` can reuse it for enum values
/// implementing an interface's default methods (enums have no ancestor
/// chain of their own, so they can't go through `bind_methods`).
pub(crate) fn bind_interface_defaults(
    iface: &Rc<crate::value::InterfaceDefinition>,
    bound: &mut FxHashMap<String, OverloadSet>,
) {
    for (name, sigs) in &iface.methods {
        if bound.contains_key(name) {
            continue;
        }
        let overloads: OverloadSet = sigs
            .iter()
            .filter_map(|sig| {
                sig.default_body.clone().map(|body| {
                    Rc::new(MethodInfo {
                        params: sig.params.clone(),
                        return_type: sig.return_type.clone(),
                        body: MethodBody::User(body),
                        access: Access::Public,
                        is_static: false,
                    })
                })
            })
            .collect();
        if !overloads.is_empty() {
            bound.insert(name.clone(), overloads);
        }
    }
    for parent_iface in iface.extends.borrow().iter() {
        bind_interface_defaults(parent_iface, bound);
    }
}

/// `instantiate(class, call-env, args)` (spec.md §4.3 steps 1-9), except
/// constructor-body execution (step 9) is left to the caller via the
/// returned instance and selected constructor, since running user AST
/// requires the full evaluator.
pub fn instantiate<E: Evaluator>(
    evaluator: &mut E,
    class: &Rc<ClassDefinition>,
    call_env: &Environment,
    args: &[Value],
    type_args: Option<Vec<TypeExpr>>,
) -> EvalResult<Rc<ClassInstance>> {
    let fields = RefCell::new(FxHashMap::default());
    init_fields(evaluator, class, call_env, &fields)?;
    let bound_methods = bind_methods(class);

    let instance = Rc::new(ClassInstance {
        class: Rc::clone(class),
        parent_class: Rc::downgrade(class),
        fields,
        bound_methods: RefCell::new(bound_methods),
        type_args,
        variance_map: None,
        is_final: false,
    });

    // A class with no constructor of its own inherits the nearest ancestor's
    // (e.g. built-in exception subclasses reuse `Exception`'s constructor).
    let mut owner = Rc::clone(class);
    loop {
        if !owner.constructors.borrow().is_empty() {
            break;
        }
        let parent = owner.parent.borrow().clone();
        match parent {
            Some(p) => owner = p,
            None => break,
        }
    }
    let constructors = owner.constructors.borrow();
    if constructors.is_empty() {
        if !args.is_empty() {
            return Err(arity_error(format!(
                "'{}' has no constructor accepting {} argument(s)",
                class.name,
                args.len()
            )));
        }
        return Ok(instance);
    }
    let ctor = select_overload(&constructors, args.len()).ok_or_else(|| {
        let arities: Vec<String> = constructors
            .iter()
            .map(|c| required_count(&c.params).to_string())
            .collect();
        initialization_error(format!(
            "no constructor of '{}' accepts {} argument(s); available arities: {}",
            class.name,
            args.len(),
            arities.join(", ")
        ))
    })?;
    drop(constructors);

    let ctor_env = call_env.child();
    ctor_env.define("this", Value::ClassInstance(Rc::clone(&instance)), Mutability::Final);
    bind_params(&ctor_env, &ctor.params, args, evaluator.registry(), None, &owner.type_params, None)?;
    let result = match &ctor.body {
        MethodBody::Native(f) => f(&ctor_env, args).map(|_| ()),
        MethodBody::User(block) => evaluator.exec_block(&ctor_env, block).map(|_| ()),
    };
    run_deferred(evaluator, &ctor_env);
    result?;
    Ok(instance)
}

/// Dispatches a method call on an instance: re-selects the overload by
/// arity at call time (spec.md §4.3 step 4 "re-selects the overload by
/// arity").
pub fn call_method<E: Evaluator>(
    evaluator: &mut E,
    instance: &Rc<ClassInstance>,
    method_name: &str,
    args: &[Value],
    call_env: &Environment,
) -> EvalResult<Value> {
    let overloads = instance
        .bound_methods
        .borrow()
        .get(method_name)
        .cloned()
        .ok_or_else(|| {
            attribute_error(format!(
                "'{}' has no method '{method_name}'",
                instance.class.name
            ))
        })?;
    let info = select_overload(&overloads, args.len())
        .ok_or_else(|| arity_error(format!("no overload of '{method_name}' accepts {} argument(s)", args.len())))?;

    let method_env = call_env.child();
    method_env.define("this", Value::ClassInstance(Rc::clone(instance)), Mutability::Final);
    bind_params(&method_env, &info.params, args, evaluator.registry(), None, &instance.class.type_params, None)?;
    let result = run_method_body(evaluator, &method_env, &info, args);
    run_deferred(evaluator, &method_env);
    result
}

fn run_method_body<E: Evaluator>(
    evaluator: &mut E,
    env: &Environment,
    info: &MethodInfo,
    args: &[Value],
) -> EvalResult<Value> {
    match &info.body {
        MethodBody::Native(f) => f(env, args),
        MethodBody::User(block) => Ok(evaluator.exec_block(env, block)?.into_value()),
    }
}

/// `super` member resolution (spec.md §4.3 "Super dispatch"): walks the
/// ancestor chain from the parent upward, falling back to the parent's
/// implemented interfaces' default methods.
pub fn resolve_super_method(
    parent: &Rc<ClassDefinition>,
    method_name: &str,
) -> Option<OverloadSet> {
    let mut current = Some(Rc::clone(parent));
    while let Some(c) = current {
        if let Some(overloads) = c.methods.borrow().get(method_name) {
            if !overloads.is_empty() {
                return Some(overloads.clone());
            }
        }
        current = c.parent.borrow().clone();
    }
    let mut bound = FxHashMap::default();
    for iface in parent.interfaces.borrow().iter() {
        bind_interface_defaults(iface, &mut bound);
    }
    bound.remove(method_name)
}

/// `super(...)` as a call: invokes the parent constructor with overload
/// selection, initializing `this`'s fields in place.
pub fn call_super_constructor<E: Evaluator>(
    evaluator: &mut E,
    parent: &Rc<ClassDefinition>,
    this: &Rc<ClassInstance>,
    args: &[Value],
    call_env: &Environment,
) -> EvalResult<()> {
    let constructors = parent.constructors.borrow();
    if constructors.is_empty() {
        return Ok(());
    }
    let ctor = select_overload(&constructors, args.len()).ok_or_else(|| {
        initialization_error(format!(
            "no constructor of '{}' accepts {} argument(s)",
            parent.name,
            args.len()
        ))
    })?;
    drop(constructors);
    let ctor_env = call_env.child();
    ctor_env.define("this", Value::ClassInstance(Rc::clone(this)), Mutability::Final);
    bind_params(&ctor_env, &ctor.params, args, evaluator.registry(), None, &parent.type_params, None)?;
    let result = match &ctor.body {
        MethodBody::Native(f) => f(&ctor_env, args).map(|_| ()),
        MethodBody::User(block) => evaluator.exec_block(&ctor_env, block).map(|_| ()),
    };
    run_deferred(evaluator, &ctor_env);
    result
}

/// Binds a `FunctionDefinition`'s closure and parameters into a fresh call
/// environment, ready for the caller to execute the body.
pub fn prepare_call_env(
    func: &FunctionDefinition,
    registry: &TypeRegistry,
    args: &[Value],
) -> EvalResult<Environment> {
    let base = func
        .closure
        .clone()
        .unwrap_or_else(|| Environment::new(func.file.clone(), func.package.clone()));
    let env = base.child();
    bind_params(&env, &func.params, args, registry, None, &func.type_params, None)?;
    Ok(env)
}

pub fn unknown_member_error(type_name: &str, member: &str) -> crate::diagnostics::Exception {
    name_error(format!("'{type_name}' has no member '{member}'"))
}
