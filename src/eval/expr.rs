//! Expression evaluation (spec.md §4.5/§6): literals, member access, calls,
//! `super` dispatch, record construction, and the cooperative-task/channel
//! primitives.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Block, Expr, ExprKind, LambdaBody, StringPart, TypeArg};
use crate::class_machinery::{self, Evaluator};
use crate::diagnostics::{arity_error, attribute_error, runtime_error, type_error, EvalResult};
use crate::environment::{Environment, Mutability};
use crate::typecheck;
use crate::value::{
    Access, Channel, ClassConstructor, EnumConstructor, EnumValueInstance, FunctionDefinition,
    MethodBody, OverloadSet, RecordDefinition, RecordInstance, Task, Value,
};

use super::Interpreter;

impl Interpreter {
    pub(super) fn eval_expr(&mut self, env: &Environment, expr: &Expr) -> EvalResult<Value> {
        let env = &env.with_position(expr.pos);
        match &expr.kind {
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Bytes(b) => Ok(Value::bytes(b.clone())),
            ExprKind::Str(parts) => self.eval_string_parts(env, parts),
            ExprKind::Ident(name) => self.lookup_ident(env, name),
            ExprKind::ArrayLit(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval_expr(env, e))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::array(values))
            }
            ExprKind::MapLit(pairs) => {
                let map = Value::map_empty();
                let Value::Map(bucket_map) = &map else {
                    unreachable!("Value::map_empty always returns Value::Map")
                };
                for (k, v) in pairs {
                    let key = self.eval_expr(env, k)?;
                    let value = self.eval_expr(env, v)?;
                    bucket_map
                        .borrow_mut()
                        .buckets
                        .entry(key.bucket_key())
                        .or_default()
                        .push((key, value));
                }
                Ok(map)
            }
            ExprKind::Index { base, index } => {
                let base_val = self.eval_expr(env, base)?;
                let index_val = self.eval_expr(env, index)?;
                self.call_on_value(env, &base_val, "__get", &[index_val])
            }
            ExprKind::Slice { base, from, to } => {
                let base_val = self.eval_expr(env, base)?;
                let from_val = match from {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::Nil,
                };
                let to_val = match to {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::Nil,
                };
                self.call_on_value(env, &base_val, "__slice", &[from_val, to_val])
            }
            ExprKind::Field { base, name } => {
                if matches!(base.kind, ExprKind::Super) {
                    self.eval_super_field(env, name)
                } else {
                    let base_val = self.eval_expr(env, base)?;
                    self.get_field(&base_val, name)
                }
            }
            ExprKind::Unary { op, expr: operand } => self.eval_unary(env, *op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(env, *op, lhs, rhs),
            ExprKind::Call { callee, args } => self.eval_call(env, callee, args),
            ExprKind::GenericCall { callee, type_args, args } => self.eval_generic_call(env, callee, type_args, args),
            ExprKind::InstanceOf { expr: subject, type_expr, bind } => {
                let v = self.eval_expr(env, subject)?;
                let is_match = typecheck::is_instance_of(&self.registry, &v, type_expr);
                if is_match {
                    if let Some(name) = bind {
                        env.define(name.clone(), v, Mutability::Final);
                    }
                }
                Ok(Value::Bool(is_match))
            }
            ExprKind::TypeLit(te) => Ok(Value::Type(Rc::new(te.clone()))),
            ExprKind::ThreadSpawn(block) => self.eval_thread_spawn(env, block),
            ExprKind::ThreadJoin(target) => {
                let v = self.eval_expr(env, target)?;
                let Value::Task(task) = v else {
                    return Err(type_error("join target must be a Task"));
                };
                task.result.borrow().clone().unwrap_or(Ok(Value::Nil))
            }
            ExprKind::ChannelNew => Ok(Value::Channel(crate::concurrency::new_channel())),
            ExprKind::Range { from, to, inclusive } => self.eval_range(env, from, to, *inclusive),
            ExprKind::Ternary { cond, then_branch, else_branch } => {
                if self.eval_expr(env, cond)?.is_truthy() {
                    self.eval_expr(env, then_branch)
                } else {
                    self.eval_expr(env, else_branch)
                }
            }
            ExprKind::Lambda { params, return_type, body } => {
                let fn_body = match body {
                    LambdaBody::Block(b) => b.clone(),
                    LambdaBody::Expr(e) => super::single_expr_block((**e).clone(), expr.pos),
                };
                let func = FunctionDefinition {
                    name: "<lambda>".to_owned(),
                    params: params.clone(),
                    return_type: return_type.clone(),
                    body: fn_body,
                    access: Access::Public,
                    file: env.file.as_str().to_owned(),
                    package: env.package.as_str().to_owned(),
                    closure: Some(env.clone()),
                    type_params: Vec::new(),
                };
                Ok(Value::LambdaDefinition(Rc::new(func)))
            }
            ExprKind::Super => Err(runtime_error("'super' cannot be used as a standalone value")),
            ExprKind::This => env.this().ok_or_else(|| runtime_error("'this' is not bound in this context")),
        }
    }

    fn eval_string_parts(&mut self, env: &Environment, parts: &[StringPart]) -> EvalResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                StringPart::Literal(s) => out.push_str(s),
                StringPart::Interp(e) => {
                    let v = self.eval_expr(env, e)?;
                    out.push_str(&self.display_value(env, &v)?);
                }
            }
        }
        Ok(Value::string(out))
    }

    /// Interpolation/`toString` coercion: an overridden `toString` wins,
    /// falling back to the converter registry's structural rendering.
    fn display_value(&mut self, env: &Environment, value: &Value) -> EvalResult<String> {
        if self.receiver_has_method(value, "toString") {
            let result = self.call_on_value(env, value, "toString", &[])?;
            return Ok(crate::converter::to_display_string(&result));
        }
        Ok(crate::converter::to_display_string(value))
    }

    // --- member access -------------------------------------------------

    pub(super) fn get_field(&mut self, base: &Value, name: &str) -> EvalResult<Value> {
        match base {
            Value::ClassInstance(inst) => inst
                .fields
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| class_machinery::unknown_member_error(&inst.class.name, name)),
            Value::EnumValueInstance(ev) => {
                match name {
                    "name" => return Ok(Value::string(ev.name.clone())),
                    "ordinal" => return Ok(Value::Int(ev.ordinal as i64)),
                    _ => {}
                }
                if let Some(v) = ev.fields.borrow().get(name) {
                    return Ok(v.clone());
                }
                let type_name = ev.definition.upgrade().map(|d| d.name.clone()).unwrap_or_else(|| "<enum>".to_owned());
                Err(class_machinery::unknown_member_error(&type_name, name))
            }
            Value::RecordInstance(rec) => rec
                .values
                .get(name)
                .cloned()
                .ok_or_else(|| class_machinery::unknown_member_error(&rec.definition.name, name)),
            Value::ClassConstructor(cc) => cc
                .class
                .static_fields
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| class_machinery::unknown_member_error(&cc.class.name, name)),
            Value::EnumConstructor(ec) => ec
                .definition
                .values
                .borrow()
                .iter()
                .find(|v| v.name == name)
                .cloned()
                .map(Value::EnumValueInstance)
                .ok_or_else(|| class_machinery::unknown_member_error(&ec.definition.name, name)),
            other => Err(class_machinery::unknown_member_error(&other.type_name(), name)),
        }
    }

    pub(super) fn set_field(&mut self, base: &Value, name: &str, value: Value) -> EvalResult<()> {
        match base {
            Value::ClassInstance(inst) => {
                inst.fields.borrow_mut().insert(name.to_owned(), value);
                Ok(())
            }
            Value::RecordInstance(_) => Err(runtime_error(format!(
                "cannot assign to field '{name}' of an immutable record"
            ))),
            Value::ClassConstructor(cc) => {
                cc.class.static_fields.borrow_mut().insert(name.to_owned(), value);
                Ok(())
            }
            other => Err(class_machinery::unknown_member_error(&other.type_name(), name)),
        }
    }

    fn eval_super_field(&mut self, env: &Environment, name: &str) -> EvalResult<Value> {
        let this = env.this().ok_or_else(|| runtime_error("'super' used outside a method"))?;
        let Value::ClassInstance(inst) = this else {
            return Err(runtime_error("'super' used outside a class method"));
        };
        inst.fields
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| class_machinery::unknown_member_error(&inst.class.name, name))
    }

    // --- calls -----------------------------------------------------------

    pub(super) fn call_on_value(&mut self, env: &Environment, receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
        match receiver {
            Value::ClassInstance(inst) => class_machinery::call_method(self, inst, method, args, env),
            Value::EnumValueInstance(ev) => self.call_enum_method(env, ev, method, args),
            Value::RecordInstance(rec) => self.call_record_method(env, rec, method, args),
            Value::ClassConstructor(cc) => self.call_static_method(env, cc, method, args),
            Value::EnumConstructor(ec) => self.call_enum_static(env, ec, method, args),
            Value::Channel(ch) => self.call_channel_method(ch, method, args),
            Value::Task(task) => self.call_task_method(task, method),
            _ => self.call_builtin_method(env, receiver, method, args),
        }
    }

    fn call_enum_method(&mut self, env: &Environment, ev: &Rc<EnumValueInstance>, method: &str, args: &[Value]) -> EvalResult<Value> {
        let overloads = ev
            .bound_methods
            .borrow()
            .get(method)
            .cloned()
            .ok_or_else(|| attribute_error(format!("enum value has no method '{method}'")))?;
        let info = class_machinery::select_overload(&overloads, args.len())
            .ok_or_else(|| arity_error(format!("no overload of '{method}' accepts {} argument(s)", args.len())))?;
        let method_env = env.child();
        method_env.define("this", Value::EnumValueInstance(Rc::clone(ev)), Mutability::Final);
        class_machinery::bind_params(&method_env, &info.params, args, &self.registry, None, &[], None)?;
        let result = match &info.body {
            MethodBody::Native(f) => f(&method_env, args),
            MethodBody::User(block) => Ok(self.exec_block(&method_env, block)?.into_value()),
        };
        class_machinery::run_deferred(self, &method_env);
        result
    }

    fn call_record_method(&mut self, env: &Environment, rec: &Rc<RecordInstance>, method: &str, args: &[Value]) -> EvalResult<Value> {
        let overloads = rec
            .definition
            .methods
            .borrow()
            .get(method)
            .cloned()
            .ok_or_else(|| attribute_error(format!("'{}' has no method '{method}'", rec.definition.name)))?;
        let info = class_machinery::select_overload(&overloads, args.len())
            .ok_or_else(|| arity_error(format!("no overload of '{method}' accepts {} argument(s)", args.len())))?;
        let method_env = env.child();
        method_env.define("this", Value::RecordInstance(Rc::clone(rec)), Mutability::Final);
        class_machinery::bind_params(&method_env, &info.params, args, &self.registry, None, &rec.definition.type_params, None)?;
        let result = match &info.body {
            MethodBody::Native(f) => f(&method_env, args),
            MethodBody::User(block) => Ok(self.exec_block(&method_env, block)?.into_value()),
        };
        class_machinery::run_deferred(self, &method_env);
        result
    }

    fn call_static_method(&mut self, env: &Environment, cc: &Rc<ClassConstructor>, method: &str, args: &[Value]) -> EvalResult<Value> {
        let overloads = cc
            .class
            .methods
            .borrow()
            .get(method)
            .cloned()
            .ok_or_else(|| attribute_error(format!("'{}' has no static method '{method}'", cc.class.name)))?;
        let statics: OverloadSet = overloads.iter().filter(|m| m.is_static).cloned().collect();
        let info = class_machinery::select_overload(&statics, args.len())
            .ok_or_else(|| arity_error(format!("no static overload of '{method}' accepts {} argument(s)", args.len())))?;
        let method_env = env.child();
        class_machinery::bind_params(&method_env, &info.params, args, &self.registry, None, &cc.class.type_params, None)?;
        let result = match &info.body {
            MethodBody::Native(f) => f(&method_env, args),
            MethodBody::User(block) => Ok(self.exec_block(&method_env, block)?.into_value()),
        };
        class_machinery::run_deferred(self, &method_env);
        result
    }

    fn call_enum_static(&mut self, env: &Environment, ec: &Rc<EnumConstructor>, method: &str, args: &[Value]) -> EvalResult<Value> {
        let overloads = ec
            .definition
            .methods
            .borrow()
            .get(method)
            .cloned()
            .ok_or_else(|| attribute_error(format!("'{}' has no static method '{method}'", ec.definition.name)))?;
        let statics: OverloadSet = overloads.iter().filter(|m| m.is_static).cloned().collect();
        let info = class_machinery::select_overload(&statics, args.len())
            .ok_or_else(|| arity_error(format!("no static overload of '{method}' accepts {} argument(s)", args.len())))?;
        let method_env = env.child();
        class_machinery::bind_params(&method_env, &info.params, args, &self.registry, None, &[], None)?;
        let result = match &info.body {
            MethodBody::Native(f) => f(&method_env, args),
            MethodBody::User(block) => Ok(self.exec_block(&method_env, block)?.into_value()),
        };
        class_machinery::run_deferred(self, &method_env);
        result
    }

    /// `send`/`recv` (spec.md §5). An unbounded mailbox backs the channel
    /// (see `value::Channel`'s doc comment), so `send` never actually blocks.
    fn call_channel_method(&mut self, channel: &Rc<Channel>, method: &str, args: &[Value]) -> EvalResult<Value> {
        match method {
            "send" => {
                let value = args.first().cloned().unwrap_or(Value::Nil);
                channel
                    .sender
                    .send(value)
                    .map_err(|_| runtime_error("send on a closed channel"))?;
                Ok(Value::Nil)
            }
            "recv" => channel
                .receiver
                .borrow()
                .recv()
                .map_err(|_| runtime_error("recv on a closed channel")),
            _ => Err(attribute_error(format!("Channel has no method '{method}'"))),
        }
    }

    fn call_task_method(&mut self, task: &Rc<Task>, method: &str) -> EvalResult<Value> {
        match method {
            "join" => task.result.borrow().clone().unwrap_or(Ok(Value::Nil)),
            _ => Err(attribute_error(format!("Task has no method '{method}'"))),
        }
    }

    /// Dispatch for a method call on a primitive receiver (`Int`, `String`,
    /// `Array`, ...): looks up the built-in `ClassDefinition` registered for
    /// that type name and runs the same overload-select/bind/exec pipeline
    /// user methods go through.
    fn call_builtin_method(&mut self, env: &Environment, receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
        let type_name = receiver.type_name();
        let class = self
            .registry
            .lookup_class_any_package(&type_name)
            .ok_or_else(|| attribute_error(format!("'{type_name}' has no method '{method}'")))?;
        let overloads = class
            .methods
            .borrow()
            .get(method)
            .cloned()
            .ok_or_else(|| attribute_error(format!("'{type_name}' has no method '{method}'")))?;
        let info = class_machinery::select_overload(&overloads, args.len())
            .ok_or_else(|| arity_error(format!("no overload of '{method}' accepts {} argument(s)", args.len())))?;
        let method_env = env.child();
        method_env.define("this", receiver.clone(), Mutability::Final);
        class_machinery::bind_params(&method_env, &info.params, args, &self.registry, None, &class.type_params, None)?;
        let result = match &info.body {
            MethodBody::Native(f) => f(&method_env, args),
            MethodBody::User(block) => Ok(self.exec_block(&method_env, block)?.into_value()),
        };
        class_machinery::run_deferred(self, &method_env);
        result
    }

    fn eval_args(&mut self, env: &Environment, args: &[Expr]) -> EvalResult<Vec<Value>> {
        args.iter().map(|e| self.eval_expr(env, e)).collect()
    }

    fn eval_call(&mut self, env: &Environment, callee: &Expr, args: &[Expr]) -> EvalResult<Value> {
        if matches!(callee.kind, ExprKind::Super) {
            let arg_values = self.eval_args(env, args)?;
            return self.call_super_init(env, &arg_values);
        }
        if let ExprKind::Field { base, name } = &callee.kind {
            if matches!(base.kind, ExprKind::Super) {
                let arg_values = self.eval_args(env, args)?;
                return self.call_super_method(env, name, &arg_values);
            }
            let receiver = self.eval_expr(env, base)?;
            let arg_values = self.eval_args(env, args)?;
            return self.call_on_value(env, &receiver, name, &arg_values);
        }
        if let ExprKind::Ident(name) = &callee.kind {
            if env.get(name).is_none() {
                if let Some(def) = self.registry.lookup_record(&env.package, name) {
                    let arg_values = self.eval_args(env, args)?;
                    return self.construct_record(&def, &arg_values);
                }
            }
        }
        let callee_val = self.eval_expr(env, callee)?;
        let arg_values = self.eval_args(env, args)?;
        self.call_callable(env, &callee_val, &arg_values)
    }

    fn call_super_init(&mut self, env: &Environment, args: &[Value]) -> EvalResult<Value> {
        let this = env.this().ok_or_else(|| runtime_error("'super(...)' used outside a constructor"))?;
        let Value::ClassInstance(inst) = this else {
            return Err(runtime_error("'super(...)' used outside a class constructor"));
        };
        let parent = inst
            .class
            .parent
            .borrow()
            .clone()
            .ok_or_else(|| runtime_error(format!("'{}' has no superclass", inst.class.name)))?;
        class_machinery::call_super_constructor(self, &parent, &inst, args, env)?;
        Ok(Value::Nil)
    }

    fn call_super_method(&mut self, env: &Environment, name: &str, args: &[Value]) -> EvalResult<Value> {
        let this = env.this().ok_or_else(|| runtime_error("'super.method(...)' used outside a method"))?;
        let Value::ClassInstance(inst) = &this else {
            return Err(runtime_error("'super.method(...)' used outside a class method"));
        };
        let parent = inst
            .class
            .parent
            .borrow()
            .clone()
            .ok_or_else(|| runtime_error(format!("'{}' has no superclass", inst.class.name)))?;
        let overloads = class_machinery::resolve_super_method(&parent, name)
            .ok_or_else(|| attribute_error(format!("superclass has no method '{name}'")))?;
        let info = class_machinery::select_overload(&overloads, args.len())
            .ok_or_else(|| arity_error(format!("no overload of '{name}' accepts {} argument(s)", args.len())))?;
        let method_env = env.child();
        method_env.define("this", this.clone(), Mutability::Final);
        class_machinery::bind_params(&method_env, &info.params, args, &self.registry, None, &parent.type_params, None)?;
        let result = match &info.body {
            MethodBody::Native(f) => f(&method_env, args),
            MethodBody::User(block) => Ok(self.exec_block(&method_env, block)?.into_value()),
        };
        class_machinery::run_deferred(self, &method_env);
        result
    }

    fn construct_record(&mut self, def: &Rc<RecordDefinition>, args: &[Value]) -> EvalResult<Value> {
        if args.len() != def.fields.len() {
            return Err(arity_error(format!(
                "record '{}' expects {} argument(s), got {}",
                def.name,
                def.fields.len(),
                args.len()
            )));
        }
        let mut values = FxHashMap::default();
        for (name, arg) in def.fields.iter().zip(args.iter()) {
            if let Some(Some(type_expr)) = def.field_types.get(name) {
                if !typecheck::is_instance_of(&self.registry, arg, type_expr) {
                    return Err(type_error(format!(
                        "argument for record field '{name}' does not match declared type"
                    )));
                }
            }
            values.insert(name.clone(), arg.clone());
        }
        Ok(Value::RecordInstance(Rc::new(RecordInstance {
            definition: Rc::clone(def),
            values,
        })))
    }

    fn eval_generic_call(&mut self, env: &Environment, callee: &Expr, type_args: &[TypeArg], args: &[Expr]) -> EvalResult<Value> {
        let callee_val = self.eval_expr(env, callee)?;
        let arg_values = self.eval_args(env, args)?;
        if let Value::ClassConstructor(cc) = &callee_val {
            let instance = class_machinery::instantiate(self, &cc.class, env, &arg_values, Some(type_args.to_vec()))?;
            return Ok(Value::ClassInstance(instance));
        }
        self.call_callable(env, &callee_val, &arg_values)
    }

    pub(super) fn call_callable(&mut self, env: &Environment, callee: &Value, args: &[Value]) -> EvalResult<Value> {
        match callee {
            Value::FunctionDefinition(func) | Value::LambdaDefinition(func) => {
                let call_env = class_machinery::prepare_call_env(func, &self.registry, args)?;
                let result = self.exec_block(&call_env, &func.body).map(|s| s.into_value());
                class_machinery::run_deferred(self, &call_env);
                result
            }
            Value::NativeFunction(nf) => (nf.func)(env, args),
            Value::ClassConstructor(cc) => {
                let instance = class_machinery::instantiate(self, &cc.class, env, args, None)?;
                Ok(Value::ClassInstance(instance))
            }
            other => Err(type_error(format!("'{}' is not callable", other.type_name()))),
        }
    }

    fn eval_thread_spawn(&mut self, env: &Environment, block: &Block) -> EvalResult<Value> {
        let task_env = env.child();
        let result = self.exec_block(&task_env, block).map(|s| s.into_value());
        class_machinery::run_deferred(self, &task_env);
        Ok(Value::Task(crate::concurrency::finished_task(result)))
    }

    fn eval_range(&mut self, env: &Environment, from: &Expr, to: &Expr, inclusive: bool) -> EvalResult<Value> {
        let from_val = self.eval_expr(env, from)?;
        let to_val = self.eval_expr(env, to)?;
        let (Value::Int(a), Value::Int(b)) = (&from_val, &to_val) else {
            return Err(type_error("range bounds must be Int"));
        };
        let end = if inclusive { *b + 1 } else { *b };
        Ok(Value::array((*a..end).map(Value::Int)))
    }

    /// Iterable coercion for `for-in` (spec.md §4.1): built-in containers
    /// directly, a user class via its `__length`/`__get` protocol otherwise.
    pub(super) fn iterate(&mut self, env: &Environment, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().iter().cloned().collect()),
            Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            Value::Bytes(b) => Ok(b.iter().map(|byte| Value::Int(*byte as i64)).collect()),
            Value::Map(m) => Ok(m
                .borrow()
                .buckets
                .values()
                .flatten()
                .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                .collect()),
            Value::ClassInstance(inst) => {
                if !inst.class.protocols.borrow().is_iterable() {
                    return Err(type_error(format!("'{}' is not iterable", inst.class.name)));
                }
                let len = match self.call_on_value(env, value, "__length", &[])? {
                    Value::Int(n) if n >= 0 => n as usize,
                    _ => 0,
                };
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    out.push(self.call_on_value(env, value, "__get", &[Value::Int(i as i64)])?);
                }
                Ok(out)
            }
            other => Err(type_error(format!("'{}' is not iterable", other.type_name()))),
        }
    }
}
