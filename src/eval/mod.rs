//! The tree-walking evaluator (spec component G): ties the type registry,
//! converters, class machinery, and built-ins together into a single
//! `Interpreter` that runs a parsed program.
//!
//! A recursive tree-walk generalized to the full statement/expression/
//! declaration surface spec.md §4/§6 requires. Declaration building
//! (`build_class`, `build_enum`, ...) follows a two-pass idiom: collect
//! signatures, then bind bodies.

mod destructure;
mod expr;
mod ops;

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{
    Access as AstAccess, AssignOp, AssignTarget, Ast, BindingTarget, BinaryOp, Block, CatchClause,
    ClassDecl, EnumDecl, GenericBound as AstGenericBound, InterfaceDecl, LetKind, RecordDecl,
    SelectArm, SelectOp, Stmt, StmtKind, SwitchCase, TypeExpr,
};
use crate::builtins;
use crate::class_machinery::{self, Evaluator};
use crate::converter::ConverterRegistry;
use crate::diagnostics::{
    arity_error, attribute_error, initialization_error, name_error, runtime_error, type_error,
    ErrorKind, EvalResult, Exception,
};
use crate::environment::{Environment, Mutability};
use crate::registry::{TypeAlias, TypeRegistry};
use crate::typecheck;
use crate::value::{
    Access, ClassConstructor, ClassDefinition, ClassInstance, EnumConstructor, EnumDefinition,
    EnumValueInstance, ExecSignal, FieldInfo, FunctionDefinition, GenericBound, InterfaceDefinition,
    InterfaceMethodSig, MethodBody, MethodInfo, OverloadSet, RecordDefinition, RecordInstance, Value,
};

/// The evaluator: owns the process-wide type registry and converter table,
/// and runs statements/expressions against caller-supplied environments.
pub struct Interpreter {
    registry: TypeRegistry,
    converters: ConverterRegistry,
    /// Module results keyed by resolved module path (spec.md §4.8 "Results
    /// are cached by module key"). Lives here rather than in the module
    /// loader itself since `Interpreter::new` is every caller's single
    /// entry point for process-wide state.
    module_cache: RefCell<FxHashMap<String, Rc<crate::module_loader::ModuleExports>>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut registry = TypeRegistry::new();
        let mut converters = ConverterRegistry::new();
        builtins::install(&mut registry, &mut converters);
        Interpreter {
            registry,
            converters,
            module_cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub(crate) fn cached_module(&self, key: &str) -> Option<Rc<crate::module_loader::ModuleExports>> {
        self.module_cache.borrow().get(key).cloned()
    }

    pub(crate) fn cache_module(&self, key: String, exports: Rc<crate::module_loader::ModuleExports>) {
        self.module_cache.borrow_mut().insert(key, exports);
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Runs a parsed program's top-level statements in `env`, returning the
    /// last expression statement's value (the REPL/`--run` convention).
    pub fn run(&mut self, env: &Environment, ast: &Ast) -> EvalResult<Value> {
        Ok(self.exec_stmts(env, &ast.stmts)?.into_value())
    }

    /// Parses `source` as `file` and runs it top-level in package `"main"`
    /// (the entry point the CLI driver and the in-process test helper both
    /// funnel through, since neither needs a bare `Ast` once parsed).
    pub fn eval_source(&mut self, file: &str, source: &str) -> EvalResult<Value> {
        let ast = crate::ast::parser::parse_program(file, source)?;
        let env = Environment::new(file, "main");
        self.run(&env, &ast)
    }

    /// Runs a module's top-level statements directly in `env`'s own scope,
    /// without `exec_stmts`'s extra push/pop wrapping, so declarations and
    /// `let` bindings survive in `env` for the module loader to collect as
    /// exports afterward (spec.md §4.8).
    pub(crate) fn run_module_body(&mut self, env: &Environment, stmts: &[Stmt]) -> EvalResult<()> {
        self.exec_stmts_inner(env, stmts)?;
        Ok(())
    }

    /// Two-pass block execution (spec.md §4.1 "hoisting"): every
    /// declaration statement (`fn`/`class`/`interface`/`enum`/`record`) is
    /// registered before any statement runs, so forward references and
    /// mutual recursion between top-level declarations work regardless of
    /// source order.
    fn exec_stmts(&mut self, env: &Environment, stmts: &[Stmt]) -> EvalResult<ExecSignal> {
        env.push_block();
        let result = self.exec_stmts_inner(env, stmts);
        env.pop_block();
        result
    }

    fn exec_stmts_inner(&mut self, env: &Environment, stmts: &[Stmt]) -> EvalResult<ExecSignal> {
        for stmt in stmts {
            self.hoist_decl(env, stmt)?;
        }
        let mut last = Value::Nil;
        for stmt in stmts {
            if is_decl(&stmt.kind) {
                continue;
            }
            match self.exec_stmt(env, stmt)? {
                ExecSignal::Normal(v) => last = v,
                other => return Ok(other),
            }
        }
        Ok(ExecSignal::Normal(last))
    }

    fn hoist_decl(&mut self, env: &Environment, stmt: &Stmt) -> EvalResult<()> {
        match &stmt.kind {
            StmtKind::FnDecl(decl) => {
                let func = FunctionDefinition {
                    name: decl.name.clone(),
                    params: decl.params.clone(),
                    return_type: decl.return_type.clone(),
                    body: decl.body.clone(),
                    access: decl.access.into(),
                    file: env.file.as_str().to_owned(),
                    package: env.package.as_str().to_owned(),
                    closure: Some(env.clone()),
                    type_params: convert_generic_bounds(&decl.type_params),
                };
                env.define(decl.name.clone(), Value::FunctionDefinition(Rc::new(func)), Mutability::Final);
                Ok(())
            }
            StmtKind::ClassDecl(decl) => self.build_class(env, decl),
            StmtKind::InterfaceDecl(decl) => self.build_interface(env, decl),
            StmtKind::EnumDecl(decl) => self.build_enum(env, decl),
            StmtKind::RecordDecl(decl) => self.build_record(env, decl),
            _ => Ok(()),
        }
    }

    // --- declaration building -------------------------------------------

    fn resolve_class_type(&self, env: &Environment, te: &TypeExpr) -> EvalResult<Rc<ClassDefinition>> {
        let name = te.base_name().ok_or_else(|| type_error("expected a class type"))?;
        self.registry
            .lookup_class(&env.package, name)
            .ok_or_else(|| name_error(format!("unknown class '{name}'")))
    }

    fn resolve_interface_type(&self, env: &Environment, te: &TypeExpr) -> EvalResult<Rc<InterfaceDefinition>> {
        let name = te.base_name().ok_or_else(|| type_error("expected an interface type"))?;
        self.registry
            .lookup_interface(&env.package, name)
            .ok_or_else(|| name_error(format!("unknown interface '{name}'")))
    }

    fn build_class(&mut self, env: &Environment, decl: &ClassDecl) -> EvalResult<()> {
        let superclass = match &decl.superclass {
            Some(te) => Some(self.resolve_class_type(env, te)?),
            None => None,
        };
        let interfaces = decl
            .interfaces
            .iter()
            .map(|te| self.resolve_interface_type(env, te))
            .collect::<EvalResult<Vec<_>>>()?;

        let mut fields = FxHashMap::default();
        for f in &decl.fields {
            fields.insert(f.name.clone(), field_info(f));
        }

        let mut methods: FxHashMap<String, OverloadSet> = FxHashMap::default();
        for m in &decl.methods {
            validate_return_variance(&decl.type_params, &m.return_type)?;
            methods.entry(m.name.clone()).or_default().push(Rc::new(MethodInfo {
                params: m.params.clone(),
                return_type: m.return_type.clone(),
                body: MethodBody::User(m.body.clone()),
                access: m.access.into(),
                is_static: m.is_static,
            }));
        }

        let mut constructors = Vec::new();
        if let Some(ctor) = &decl.constructor {
            constructors.push(Rc::new(MethodInfo {
                params: ctor.params.clone(),
                return_type: None,
                body: MethodBody::User(ctor.body.clone()),
                access: ctor.access.into(),
                is_static: false,
            }));
        }

        let protocol_names: Vec<String> = decl.methods.iter().map(|m| m.name.clone()).collect();
        let class = Rc::new(ClassDefinition {
            name: decl.name.clone(),
            parent: RefCell::new(superclass),
            interfaces: RefCell::new(interfaces),
            fields,
            methods: RefCell::new(methods),
            constructors: RefCell::new(constructors),
            static_fields: RefCell::new(FxHashMap::default()),
            type_params: convert_generic_bounds(&decl.type_params),
            access: Access::Public,
            sealed: decl.sealed,
            permits: decl.permits.clone(),
            file: env.file.as_str().to_owned(),
            package: env.package.as_str().to_owned(),
            protocols: RefCell::new(crate::value::protocol::ProtocolTable::populate(&decl.name, &protocol_names)),
        });

        self.registry.register_class(&env.package, Rc::clone(&class))?;

        for f in &decl.fields {
            if f.is_static {
                let value = match &f.default {
                    Some(expr) => self.eval_expr(env, expr)?,
                    None => Value::Nil,
                };
                class.static_fields.borrow_mut().insert(f.name.clone(), value);
            }
        }

        env.define(
            decl.name.clone(),
            Value::ClassConstructor(Rc::new(ClassConstructor { class })),
            Mutability::Final,
        );
        Ok(())
    }

    fn build_interface(&mut self, env: &Environment, decl: &InterfaceDecl) -> EvalResult<()> {
        let extends = decl
            .extends
            .iter()
            .map(|te| self.resolve_interface_type(env, te))
            .collect::<EvalResult<Vec<_>>>()?;
        let mut methods: FxHashMap<String, Vec<InterfaceMethodSig>> = FxHashMap::default();
        for m in &decl.methods {
            methods.entry(m.name.clone()).or_default().push(InterfaceMethodSig {
                params: m.params.clone(),
                return_type: m.return_type.clone(),
                default_body: m.default_body.clone(),
            });
        }
        let iface = Rc::new(InterfaceDefinition {
            name: decl.name.clone(),
            extends: RefCell::new(extends),
            methods,
            static_fields: RefCell::new(FxHashMap::default()),
            type_params: convert_generic_bounds(&decl.type_params),
            sealed: false,
            permits: Vec::new(),
            file: env.file.as_str().to_owned(),
            package: env.package.as_str().to_owned(),
        });
        self.registry.register_interface(&env.package, iface);
        Ok(())
    }

    /// Builds the enum definition first (with an empty value list, since
    /// each value's native `toString` and field initializers must be able to
    /// reach it) then builds each value, writing the completed list back.
    fn build_enum(&mut self, env: &Environment, decl: &EnumDecl) -> EvalResult<()> {
        let interfaces = decl
            .interfaces
            .iter()
            .map(|te| self.resolve_interface_type(env, te))
            .collect::<EvalResult<Vec<_>>>()?;

        let mut fields = FxHashMap::default();
        for f in &decl.fields {
            fields.insert(f.name.clone(), field_info(f));
        }

        let mut methods: FxHashMap<String, OverloadSet> = FxHashMap::default();
        for m in &decl.methods {
            methods.entry(m.name.clone()).or_default().push(Rc::new(MethodInfo {
                params: m.params.clone(),
                return_type: m.return_type.clone(),
                body: MethodBody::User(m.body.clone()),
                access: m.access.into(),
                is_static: m.is_static,
            }));
        }

        let mut constructors = Vec::new();
        if let Some(ctor) = &decl.constructor {
            constructors.push(Rc::new(MethodInfo {
                params: ctor.params.clone(),
                return_type: None,
                body: MethodBody::User(ctor.body.clone()),
                access: ctor.access.into(),
                is_static: false,
            }));
        }

        let def = Rc::new(EnumDefinition {
            name: decl.name.clone(),
            constructors: RefCell::new(constructors),
            methods: RefCell::new(methods),
            fields,
            interfaces: RefCell::new(interfaces),
            values: RefCell::new(Vec::new()),
            sealed: decl.sealed,
            permits: decl.permits.clone(),
            access: Access::Public,
            file: env.file.as_str().to_owned(),
            package: env.package.as_str().to_owned(),
        });

        let mut built = Vec::with_capacity(decl.values.len());
        for (idx, vd) in decl.values.iter().enumerate() {
            built.push(self.build_enum_value(env, &def, vd, idx)?);
        }
        *def.values.borrow_mut() = built;

        self.registry.register_enum(&env.package, Rc::clone(&def));
        env.define(
            decl.name.clone(),
            Value::EnumConstructor(Rc::new(EnumConstructor { definition: def })),
            Mutability::Final,
        );
        Ok(())
    }

    fn build_enum_value(
        &mut self,
        env: &Environment,
        def: &Rc<EnumDefinition>,
        vd: &crate::ast::EnumValueDecl,
        idx: usize,
    ) -> EvalResult<Rc<EnumValueInstance>> {
        let value_env = env.child();
        let mut field_values = FxHashMap::default();
        for (name, info) in &def.fields {
            if info.is_static {
                continue;
            }
            let v = match &info.initial {
                Some(block) => self.exec_block(&value_env, block)?.into_value(),
                None => Value::Nil,
            };
            field_values.insert(name.clone(), v);
        }

        let instance = Rc::new(EnumValueInstance {
            definition: Rc::downgrade(def),
            name: vd.name.clone(),
            ordinal: idx,
            fields: RefCell::new(field_values),
            bound_methods: RefCell::new(FxHashMap::default()),
        });
        *instance.bound_methods.borrow_mut() = bind_enum_methods(def);

        let args = vd
            .args
            .iter()
            .map(|e| self.eval_expr(&value_env, e))
            .collect::<EvalResult<Vec<_>>>()?;

        let ctor = {
            let constructors = def.constructors.borrow();
            if constructors.is_empty() {
                None
            } else {
                Some(class_machinery::select_overload(&constructors, args.len()).ok_or_else(|| {
                    initialization_error(format!(
                        "no constructor of enum '{}' accepts {} argument(s)",
                        def.name,
                        args.len()
                    ))
                })?)
            }
        };

        match ctor {
            Some(ctor) => {
                let ctor_env = value_env.child();
                ctor_env.define("this", Value::EnumValueInstance(Rc::clone(&instance)), Mutability::Final);
                class_machinery::bind_params(&ctor_env, &ctor.params, &args, &self.registry, None, &[], None)?;
                match &ctor.body {
                    MethodBody::Native(f) => {
                        f(&ctor_env, &args)?;
                    }
                    MethodBody::User(block) => {
                        self.exec_block(&ctor_env, block)?;
                    }
                }
                class_machinery::run_deferred(self, &ctor_env);
            }
            None if !args.is_empty() => {
                return Err(arity_error(format!(
                    "enum value '{}' has no constructor accepting {} argument(s)",
                    vd.name,
                    args.len()
                )));
            }
            None => {}
        }

        Ok(instance)
    }

    fn build_record(&mut self, env: &Environment, decl: &RecordDecl) -> EvalResult<()> {
        let interfaces = decl
            .interfaces
            .iter()
            .map(|te| self.resolve_interface_type(env, te))
            .collect::<EvalResult<Vec<_>>>()?;
        let field_names: Vec<String> = decl.fields.iter().map(|f| f.name.clone()).collect();
        let mut field_types = FxHashMap::default();
        for f in &decl.fields {
            field_types.insert(f.name.clone(), f.type_expr.clone());
        }
        let mut methods: FxHashMap<String, OverloadSet> = FxHashMap::default();
        for m in &decl.methods {
            methods.entry(m.name.clone()).or_default().push(Rc::new(MethodInfo {
                params: m.params.clone(),
                return_type: m.return_type.clone(),
                body: MethodBody::User(m.body.clone()),
                access: m.access.into(),
                is_static: m.is_static,
            }));
        }
        let def = Rc::new(RecordDefinition {
            name: decl.name.clone(),
            fields: field_names,
            field_types,
            interfaces: RefCell::new(interfaces),
            methods: RefCell::new(methods),
            type_params: convert_generic_bounds(&decl.type_params),
            file: env.file.as_str().to_owned(),
            package: env.package.as_str().to_owned(),
        });
        self.registry.register_record(&env.package, def);
        Ok(())
    }

    // --- identifiers -------------------------------------------------------

    pub(super) fn lookup_ident(&mut self, env: &Environment, name: &str) -> EvalResult<Value> {
        if let Some(v) = env.get(name) {
            return Ok(v);
        }
        if let Some(class) = self.registry.lookup_class(&env.package, name) {
            return Ok(Value::ClassConstructor(Rc::new(ClassConstructor { class })));
        }
        if let Some(def) = self.registry.lookup_enum(&env.package, name) {
            return Ok(Value::EnumConstructor(Rc::new(EnumConstructor { definition: def })));
        }
        Err(name_error(format!("undefined name '{name}'")))
    }

    // --- statements --------------------------------------------------------

    fn exec_stmt(&mut self, env: &Environment, stmt: &Stmt) -> EvalResult<ExecSignal> {
        let env = &env.with_position(stmt.pos);
        match &stmt.kind {
            StmtKind::Let { kind, target, type_expr, value } => self.exec_let(env, *kind, target, type_expr, value),
            StmtKind::Assign { target, op, value } => self.exec_assign(env, target, *op, value),
            StmtKind::ExprStmt(expr) => Ok(ExecSignal::Normal(self.eval_expr(env, expr)?)),
            StmtKind::Import { path, alias, names } => self.exec_import(env, path, alias, names),
            StmtKind::If { cond, then_branch, else_branch } => {
                if self.eval_expr(env, cond)?.is_truthy() {
                    self.exec_block(env, then_branch)
                } else if let Some(block) = else_branch {
                    self.exec_block(env, block)
                } else {
                    Ok(ExecSignal::Normal(Value::Nil))
                }
            }
            StmtKind::ForIn { target, iterable, guard, body } => self.exec_for_in(env, target, iterable, guard, body),
            StmtKind::Loop { body } => self.exec_loop(env, body),
            StmtKind::DoLoop { body, cond } => self.exec_do_loop(env, body, cond),
            StmtKind::Break => Ok(ExecSignal::Break),
            StmtKind::Continue => Ok(ExecSignal::Continue),
            StmtKind::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::Nil,
                };
                Ok(ExecSignal::Return(v))
            }
            StmtKind::TypeAlias { name, target } => {
                let base = target.base_name().unwrap_or("Any").to_owned();
                self.registry.register_alias(name.clone(), TypeAlias { target: base, transparent: true });
                Ok(ExecSignal::Normal(Value::Nil))
            }
            StmtKind::Try { body, catches, finally } => self.exec_try(env, body, catches, finally),
            StmtKind::Throw(expr) => self.exec_throw(env, expr),
            StmtKind::Defer(expr) => self.exec_defer(env, expr),
            StmtKind::Select { arms, default } => self.exec_select(env, arms, default),
            StmtKind::Switch { scrutinee, cases, default } => self.exec_switch(env, scrutinee, cases, default),
            StmtKind::FnDecl(_)
            | StmtKind::ClassDecl(_)
            | StmtKind::InterfaceDecl(_)
            | StmtKind::EnumDecl(_)
            | StmtKind::RecordDecl(_) => Ok(ExecSignal::Normal(Value::Nil)),
        }
    }

    fn exec_loop(&mut self, env: &Environment, body: &Block) -> EvalResult<ExecSignal> {
        loop {
            match self.exec_block(env, body)? {
                ExecSignal::Break => break,
                ExecSignal::Return(v) => return Ok(ExecSignal::Return(v)),
                ExecSignal::Continue | ExecSignal::Normal(_) => {}
            }
        }
        Ok(ExecSignal::Normal(Value::Nil))
    }

    fn exec_do_loop(&mut self, env: &Environment, body: &Block, cond: &crate::ast::Expr) -> EvalResult<ExecSignal> {
        loop {
            match self.exec_block(env, body)? {
                ExecSignal::Break => break,
                ExecSignal::Return(v) => return Ok(ExecSignal::Return(v)),
                ExecSignal::Continue | ExecSignal::Normal(_) => {}
            }
            if !self.eval_expr(env, cond)?.is_truthy() {
                break;
            }
        }
        Ok(ExecSignal::Normal(Value::Nil))
    }

    fn exec_let(
        &mut self,
        env: &Environment,
        kind: LetKind,
        target: &BindingTarget,
        type_expr: &Option<TypeExpr>,
        value: &crate::ast::Expr,
    ) -> EvalResult<ExecSignal> {
        let v = self.eval_expr(env, value)?;
        if let Some(declared) = type_expr {
            if !typecheck::is_instance_of(&self.registry, &v, declared) {
                return Err(type_error("value does not match declared type"));
            }
        }
        let mutability = match kind {
            LetKind::Var => Mutability::Var,
            LetKind::Const => Mutability::Const,
            LetKind::Final => Mutability::Final,
        };
        self.bind_binding_target(env, target, v, mutability)?;
        Ok(ExecSignal::Normal(Value::Nil))
    }

    fn bind_binding_target(
        &mut self,
        env: &Environment,
        target: &BindingTarget,
        value: Value,
        mutability: Mutability,
    ) -> EvalResult<()> {
        match target {
            BindingTarget::Name(name) => {
                env.define(name.clone(), value, mutability);
                Ok(())
            }
            BindingTarget::Destructure(names) => {
                let pieces = self.destructure(env, &value, names.len())?;
                for (name, piece) in names.iter().zip(pieces) {
                    env.define(name.clone(), piece, mutability);
                }
                Ok(())
            }
        }
    }

    /// Rejects `base.name = ...` when `base` is a plain identifier bound
    /// `final` and the instance field being written already holds a
    /// non-`Nil` value (spec.md §3/§8: a final binding to a `ClassInstance`
    /// allows exactly one non-nil assignment per field, same as the binding
    /// itself). Only identifiers are checked: a field reached through a
    /// longer path (`a.b.c = v`) is rooted at whatever `a` evaluates to, not
    /// at a name this environment binds, so there is no mutability to read.
    fn check_final_field_mutation(
        &mut self,
        env: &Environment,
        base: &crate::ast::Expr,
        base_val: &Value,
        name: &str,
    ) -> EvalResult<()> {
        use crate::ast::ExprKind;
        let ExprKind::Ident(ident_name) = &base.kind else {
            return Ok(());
        };
        if env.mutability_of(ident_name) != Some(Mutability::Final) {
            return Ok(());
        }
        if let Value::ClassInstance(inst) = base_val {
            let current = inst.fields.borrow().get(name).cloned();
            if !matches!(current, None | Some(Value::Nil)) {
                return Err(runtime_error(format!(
                    "cannot assign to field '{name}' of final variable '{ident_name}'"
                ))
                .at(env.file.as_str(), env.position));
            }
        }
        Ok(())
    }

    fn exec_assign(
        &mut self,
        env: &Environment,
        target: &AssignTarget,
        op: AssignOp,
        value: &crate::ast::Expr,
    ) -> EvalResult<ExecSignal> {
        let new_val = self.eval_expr(env, value)?;
        match target {
            AssignTarget::Ident(name) => {
                let final_val = if op == AssignOp::Assign {
                    new_val
                } else {
                    let old = env
                        .get(name)
                        .ok_or_else(|| name_error(format!("undefined name '{name}'")))?;
                    self.apply_compound(env, op, old, new_val)?
                };
                env.set(name, final_val)?;
            }
            AssignTarget::Field { base, name } => {
                let base_val = self.eval_expr(env, base)?;
                let final_val = if op == AssignOp::Assign {
                    new_val
                } else {
                    let old = self.get_field(&base_val, name)?;
                    self.apply_compound(env, op, old, new_val)?
                };
                self.check_final_field_mutation(env, base, &base_val, name)?;
                self.set_field(&base_val, name, final_val)?;
            }
            AssignTarget::Index { base, index } => {
                let base_val = self.eval_expr(env, base)?;
                let index_val = self.eval_expr(env, index)?;
                let final_val = if op == AssignOp::Assign {
                    new_val
                } else {
                    let old = self.call_on_value(env, &base_val, "__get", &[index_val.clone()])?;
                    self.apply_compound(env, op, old, new_val)?
                };
                self.call_on_value(env, &base_val, "__set", &[index_val, final_val])?;
            }
        }
        Ok(ExecSignal::Normal(Value::Nil))
    }

    fn apply_compound(&mut self, env: &Environment, op: AssignOp, old: Value, new: Value) -> EvalResult<Value> {
        let bin_op = match op {
            AssignOp::AddAssign => BinaryOp::Add,
            AssignOp::SubAssign => BinaryOp::Sub,
            AssignOp::MulAssign => BinaryOp::Mul,
            AssignOp::DivAssign => BinaryOp::Div,
            AssignOp::ModAssign => BinaryOp::Mod,
            AssignOp::Assign => unreachable!("Assign has no compound operator"),
        };
        self.eval_binary_values(env, bin_op, old, new)
    }

    fn exec_for_in(
        &mut self,
        env: &Environment,
        target: &BindingTarget,
        iterable: &crate::ast::Expr,
        guard: &Option<crate::ast::Expr>,
        body: &Block,
    ) -> EvalResult<ExecSignal> {
        let iterable_val = self.eval_expr(env, iterable)?;
        let items = self.iterate(env, &iterable_val)?;
        for item in items {
            let loop_env = env.child();
            self.bind_binding_target(&loop_env, target, item, Mutability::Var)?;
            if let Some(guard_expr) = guard {
                if !self.eval_expr(&loop_env, guard_expr)?.is_truthy() {
                    continue;
                }
            }
            match self.exec_block(&loop_env, body)? {
                ExecSignal::Break => break,
                ExecSignal::Return(v) => return Ok(ExecSignal::Return(v)),
                ExecSignal::Continue | ExecSignal::Normal(_) => {}
            }
        }
        Ok(ExecSignal::Normal(Value::Nil))
    }

    fn exec_switch(
        &mut self,
        env: &Environment,
        scrutinee: &crate::ast::Expr,
        cases: &[SwitchCase],
        default: &Option<Block>,
    ) -> EvalResult<ExecSignal> {
        let value = self.eval_expr(env, scrutinee)?;
        for case in cases {
            match case {
                SwitchCase::Values(exprs, block) => {
                    for e in exprs {
                        let candidate = self.eval_expr(env, e)?;
                        if self
                            .eval_binary_values(env, BinaryOp::Eq, value.clone(), candidate)?
                            .is_truthy()
                        {
                            return self.exec_block(env, block);
                        }
                    }
                }
                SwitchCase::TypeBound(type_expr, binding, block) => {
                    if typecheck::is_instance_of(&self.registry, &value, type_expr) {
                        let case_env = env.child();
                        if let Some(name) = binding {
                            case_env.define(name.clone(), value.clone(), Mutability::Final);
                        }
                        return self.exec_block(&case_env, block);
                    }
                }
            }
        }
        match default {
            Some(block) => self.exec_block(env, block),
            None => Ok(ExecSignal::Normal(Value::Nil)),
        }
    }

    fn exec_defer(&mut self, env: &Environment, expr: &crate::ast::Expr) -> EvalResult<ExecSignal> {
        let (callee, method, args) = self.resolve_defer_target(env, expr)?;
        env.defer(callee, method, args);
        Ok(ExecSignal::Normal(Value::Nil))
    }

    fn resolve_defer_target(
        &mut self,
        env: &Environment,
        expr: &crate::ast::Expr,
    ) -> EvalResult<(Value, Option<String>, Vec<Value>)> {
        use crate::ast::ExprKind;
        if let ExprKind::Call { callee, args } = &expr.kind {
            let arg_values = args
                .iter()
                .map(|e| self.eval_expr(env, e))
                .collect::<EvalResult<Vec<_>>>()?;
            if let ExprKind::Field { base, name } = &callee.kind {
                let receiver = self.eval_expr(env, base)?;
                return Ok((receiver, Some(name.clone()), arg_values));
            }
            let callee_val = self.eval_expr(env, callee)?;
            return Ok((callee_val, None, arg_values));
        }
        let value = self.eval_expr(env, expr)?;
        Ok((value, None, Vec::new()))
    }

    fn exec_throw(&mut self, env: &Environment, expr: &crate::ast::Expr) -> EvalResult<ExecSignal> {
        let value = self.eval_expr(env, expr)?;
        Err(self.value_to_exception(env, value))
    }

    fn value_to_exception(&mut self, env: &Environment, value: Value) -> Exception {
        let type_name = value.type_name();
        let kind = ErrorKind::from_class_name(&type_name).unwrap_or(ErrorKind::RuntimeError);
        let message = match &value {
            Value::ClassInstance(inst) => inst
                .fields
                .borrow()
                .get("message")
                .map(crate::converter::to_display_string)
                .unwrap_or_else(|| type_name.clone()),
            other => crate::converter::to_display_string(other),
        };
        Exception::new(kind, message)
            .at(env.file.as_str(), env.position)
            .with_wrapped(value)
    }

    /// The reverse of [`value_to_exception`](Self::value_to_exception),
    /// used by `catch` clauses to match a caught exception against a
    /// declared exception type.
    fn exception_as_value(&mut self, exc: &Exception) -> Value {
        if let Some(wrapped) = &exc.wrapped {
            return (**wrapped).clone();
        }
        let class_name = exc.kind.class_name();
        match self.registry.lookup_class_any_package(class_name) {
            Some(class) => {
                let mut fields = FxHashMap::default();
                fields.insert("message".to_owned(), Value::string(exc.message.clone()));
                let bound_methods = class_machinery::bind_methods(&class);
                Value::ClassInstance(Rc::new(ClassInstance {
                    class: Rc::clone(&class),
                    parent_class: Rc::downgrade(&class),
                    fields: RefCell::new(fields),
                    bound_methods: RefCell::new(bound_methods),
                    type_args: None,
                    variance_map: None,
                    is_final: false,
                }))
            }
            None => Value::string(exc.message.clone()),
        }
    }

    fn exec_try(
        &mut self,
        env: &Environment,
        body: &Block,
        catches: &[CatchClause],
        finally: &Option<Block>,
    ) -> EvalResult<ExecSignal> {
        let result = match self.exec_block(env, body) {
            Ok(signal) => Ok(signal),
            Err(exc) => {
                let value = self.exception_as_value(&exc);
                let mut handled = None;
                for catch in catches {
                    let matches = catch
                        .exception_types
                        .iter()
                        .any(|t| typecheck::is_instance_of(&self.registry, &value, t));
                    if matches {
                        let catch_env = env.child();
                        if let Some(binding) = &catch.binding {
                            catch_env.define(binding.clone(), value.clone(), Mutability::Var);
                        }
                        handled = Some(self.exec_block(&catch_env, &catch.body));
                        break;
                    }
                }
                handled.unwrap_or(Err(exc))
            }
        };
        // A `finally` block's own control flow (return/break/continue) does
        // not override the try/catch outcome (documented simplification,
        // see DESIGN.md); only an error raised from within `finally` does.
        if let Some(fin) = finally {
            self.exec_block(env, fin)?;
        }
        result
    }

    fn exec_select(&mut self, env: &Environment, arms: &[SelectArm], default: &Option<Block>) -> EvalResult<ExecSignal> {
        struct Prepared<'a> {
            arm: &'a SelectArm,
            channel: Rc<crate::value::Channel>,
            value: Option<Value>,
        }
        let mut prepared = Vec::with_capacity(arms.len());
        for arm in arms {
            let channel_val = self.eval_expr(env, &arm.channel)?;
            let Value::Channel(channel) = channel_val else {
                return Err(type_error("select arm channel expression must be a Channel"));
            };
            let value = match &arm.value {
                Some(e) => Some(self.eval_expr(env, e)?),
                None => None,
            };
            prepared.push(Prepared { arm, channel, value });
        }
        loop {
            for p in &prepared {
                match p.arm.op {
                    SelectOp::Recv => {
                        let received = p.channel.receiver.borrow().try_recv();
                        if let Ok(received) = received {
                            let arm_env = env.child();
                            if let Some(name) = &p.arm.binding {
                                arm_env.define(name.clone(), received, Mutability::Var);
                            }
                            return self.exec_block(&arm_env, &p.arm.body);
                        }
                    }
                    SelectOp::Send => {
                        let value = p.value.clone().unwrap_or(Value::Nil);
                        if p.channel.sender.send(value).is_ok() {
                            return self.exec_block(env, &p.arm.body);
                        }
                    }
                }
            }
            if let Some(block) = default {
                return self.exec_block(env, block);
            }
            std::thread::yield_now();
        }
    }

    fn exec_import(
        &mut self,
        env: &Environment,
        path: &str,
        alias: &Option<String>,
        names: &[String],
    ) -> EvalResult<ExecSignal> {
        let exports = crate::module_loader::load_module(self, env, path)?;
        if let Some(alias) = alias {
            let ns = Value::map_empty();
            let Value::Map(m) = &ns else { unreachable!() };
            for (name, value) in exports.bindings.iter() {
                let key = Value::string(name.clone());
                m.borrow_mut().buckets.entry(key.bucket_key()).or_default().push((key, value.clone()));
            }
            env.define(alias.clone(), ns, Mutability::Final);
        } else if names.is_empty() {
            for (name, value) in exports.bindings.iter() {
                env.define(name.clone(), value.clone(), Mutability::Final);
            }
        } else {
            for name in names {
                let value = exports
                    .bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| name_error(format!("module '{path}' has no export '{name}'")))?;
                env.define(name.clone(), value, Mutability::Final);
            }
        }
        Ok(ExecSignal::Normal(Value::Nil))
    }
}

impl Evaluator for Interpreter {
    fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn exec_block(&mut self, env: &Environment, block: &Block) -> EvalResult<ExecSignal> {
        self.exec_stmts(env, &block.stmts)
    }

    fn call_value(
        &mut self,
        env: &Environment,
        callee: &Value,
        method: Option<&str>,
        args: &[Value],
    ) -> EvalResult<Value> {
        match method {
            Some(name) => self.call_on_value(env, callee, name, args),
            None => self.call_callable(env, callee, args),
        }
    }
}

fn is_decl(kind: &StmtKind) -> bool {
    matches!(
        kind,
        StmtKind::FnDecl(_)
            | StmtKind::ClassDecl(_)
            | StmtKind::InterfaceDecl(_)
            | StmtKind::EnumDecl(_)
            | StmtKind::RecordDecl(_)
    )
}

fn field_info(f: &crate::ast::FieldDecl) -> FieldInfo {
    FieldInfo {
        type_expr: f.type_expr.clone(),
        is_static: f.is_static,
        is_private: matches!(f.access, AstAccess::Private),
        is_final: f.is_final,
        initial: f.default.as_ref().map(|e| single_expr_block(e.clone(), f.pos)),
    }
}

fn single_expr_block(expr: crate::ast::Expr, pos: crate::diagnostics::Position) -> Block {
    Block {
        stmts: vec![Stmt::new(StmtKind::ExprStmt(expr), pos)],
    }
}

fn convert_generic_bounds(bounds: &[AstGenericBound]) -> Vec<GenericBound> {
    bounds
        .iter()
        .map(|b| GenericBound {
            name: b.name.clone(),
            variance: b.variance.into(),
            extends: b.extends.clone(),
            implements: b.implements.clone(),
            variadic: b.variadic,
        })
        .collect()
}

/// Rejects a contravariant (`in`) type parameter used as a method's return
/// type (spec.md §8 Variance). The symmetric covariant (`out`)-in-input-
/// position half is checked later, at parameter-binding time
/// (`class_machinery::bind_params`), since it depends on an actual call;
/// a return type is fixed by the declaration, so this half is checked once,
/// here.
fn validate_return_variance(type_params: &[AstGenericBound], return_type: &Option<TypeExpr>) -> EvalResult<()> {
    let Some(name) = return_type.as_ref().and_then(|t| t.base_name()) else {
        return Ok(());
    };
    if let Some(bound) = type_params.iter().find(|b| b.name == name) {
        if let Some(msg) = typecheck::reject_in_in_output_position(name, bound.variance.into()) {
            return Err(type_error(msg));
        }
    }
    Ok(())
}

/// Flat (non-ancestor, enums can't extend another enum) method binding plus
/// a guaranteed default `toString` formatted as `"{EnumName}.{valueName}"`.
fn bind_enum_methods(def: &Rc<EnumDefinition>) -> FxHashMap<String, OverloadSet> {
    let mut bound: FxHashMap<String, OverloadSet> = FxHashMap::default();
    for (name, overloads) in def.methods.borrow().iter() {
        let non_static: OverloadSet = overloads.iter().filter(|m| !m.is_static).cloned().collect();
        if !non_static.is_empty() {
            bound.insert(name.clone(), non_static);
        }
    }
    for iface in def.interfaces.borrow().iter() {
        class_machinery::bind_interface_defaults(iface, &mut bound);
    }
    if !bound.contains_key("toString") {
        bound.insert(
            "toString".to_owned(),
            vec![Rc::new(MethodInfo {
                params: Vec::new(),
                return_type: Some(TypeExpr::named("String")),
                body: MethodBody::Native(Rc::new(|env, _args| {
                    let this = env.this().unwrap_or(Value::Nil);
                    let Value::EnumValueInstance(ev) = this else {
                        return Ok(Value::string("<enum>"));
                    };
                    let def_name = ev
                        .definition
                        .upgrade()
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| "<enum>".to_owned());
                    Ok(Value::string(format!("{def_name}.{}", ev.name)))
                })),
                access: Access::Public,
                is_static: false,
            }],
        );
    }
    bound
}
