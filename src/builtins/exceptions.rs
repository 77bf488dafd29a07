//! The built-in exception hierarchy: a base `Exception` class plus one
//! subclass per [`ErrorKind`] (spec.md §4.6), so a user `catch Exception`
//! clause matches everything and `catch TypeError` narrows to one kind.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Param, TypeExpr};
use crate::diagnostics::ErrorKind;
use crate::registry::TypeRegistry;
use crate::value::protocol::ProtocolTable;
use crate::value::{Access, ClassDefinition, FieldInfo, MethodBody, MethodInfo, NativeFn, Value};

const KINDS: [ErrorKind; 11] = [
    ErrorKind::TypeError,
    ErrorKind::ValueError,
    ErrorKind::NameError,
    ErrorKind::ArityError,
    ErrorKind::IndexError,
    ErrorKind::AttributeError,
    ErrorKind::RuntimeError,
    ErrorKind::NotImplementedError,
    ErrorKind::InitializationError,
    ErrorKind::ConversionError,
    ErrorKind::AccessError,
];

pub fn install_exceptions(registry: &mut TypeRegistry) {
    let base = build_base_exception();
    registry.register_builtin_class(Rc::clone(&base));
    registry.mark_exception_class("Exception");

    for kind in KINDS {
        let class = build_subclass(kind, &base);
        registry.mark_exception_class(class.name.clone());
        registry.register_builtin_class(class);
    }
}

fn message_field() -> (String, FieldInfo) {
    (
        "message".to_owned(),
        FieldInfo {
            type_expr: Some(TypeExpr::named("String")),
            is_static: false,
            is_private: false,
            is_final: false,
            initial: None,
        },
    )
}

fn to_string_method() -> MethodInfo {
    let body: NativeFn = Rc::new(|env, _args| {
        let this = env.this().ok_or_else(|| crate::diagnostics::type_error("Exception.toString called without a receiver"))?;
        let Value::ClassInstance(inst) = this else {
            return Err(crate::diagnostics::type_error("Exception.toString called on a non-instance receiver"));
        };
        let message = inst
            .fields
            .borrow()
            .get("message")
            .cloned()
            .unwrap_or(Value::Nil);
        Ok(Value::string(format!(
            "{}: {}",
            inst.class.name,
            crate::converter::to_display_string(&message)
        )))
    });
    MethodInfo {
        params: Vec::new(),
        return_type: Some(TypeExpr::named("String")),
        body: MethodBody::Native(body),
        access: Access::Public,
        is_static: false,
    }
}

/// Two constructor overloads (0-arity and 1-arity) stand in for a single
/// defaulted `message` parameter, since native bodies bind arguments
/// directly rather than through AST default-expression evaluation.
fn constructors() -> Vec<MethodInfo> {
    fn set_message(env: &crate::environment::Environment, message: Value) -> crate::diagnostics::EvalResult<Value> {
        let this = env.this().ok_or_else(|| crate::diagnostics::type_error("Exception constructor called without a receiver"))?;
        let Value::ClassInstance(inst) = this else {
            return Err(crate::diagnostics::type_error("Exception constructor called on a non-instance receiver"));
        };
        inst.fields.borrow_mut().insert("message".to_owned(), message);
        Ok(Value::Nil)
    }

    let no_args: NativeFn = Rc::new(|env, _args| set_message(env, Value::string("")));
    let with_message: NativeFn = Rc::new(|env, args| set_message(env, args[0].clone()));

    vec![
        MethodInfo {
            params: Vec::new(),
            return_type: None,
            body: MethodBody::Native(no_args),
            access: Access::Public,
            is_static: false,
        },
        MethodInfo {
            params: vec![Param {
                name: "message".to_owned(),
                type_expr: Some(TypeExpr::named("String")),
                variadic: false,
                default: None,
            }],
            return_type: None,
            body: MethodBody::Native(with_message),
            access: Access::Public,
            is_static: false,
        },
    ]
}

fn build_base_exception() -> Rc<ClassDefinition> {
    let mut fields = FxHashMap::default();
    let (name, info) = message_field();
    fields.insert(name, info);

    let mut methods = FxHashMap::default();
    methods.insert("toString".to_owned(), vec![Rc::new(to_string_method())]);

    Rc::new(ClassDefinition {
        name: "Exception".to_owned(),
        parent: RefCell::new(None),
        interfaces: RefCell::new(Vec::new()),
        fields,
        methods: RefCell::new(methods),
        constructors: RefCell::new(constructors().into_iter().map(Rc::new).collect()),
        static_fields: RefCell::new(FxHashMap::default()),
        type_params: Vec::new(),
        access: Access::Public,
        sealed: false,
        permits: Vec::new(),
        file: "<builtin>".to_owned(),
        package: "builtin".to_owned(),
        protocols: RefCell::new(ProtocolTable::default()),
    })
}

fn build_subclass(kind: ErrorKind, base: &Rc<ClassDefinition>) -> Rc<ClassDefinition> {
    Rc::new(ClassDefinition {
        name: kind.class_name().to_owned(),
        parent: RefCell::new(Some(Rc::clone(base))),
        interfaces: RefCell::new(Vec::new()),
        fields: FxHashMap::default(),
        methods: RefCell::new(FxHashMap::default()),
        constructors: RefCell::new(Vec::new()),
        static_fields: RefCell::new(FxHashMap::default()),
        type_params: Vec::new(),
        access: Access::Public,
        sealed: false,
        permits: Vec::new(),
        file: "<builtin>".to_owned(),
        package: "builtin".to_owned(),
        protocols: RefCell::new(ProtocolTable::default()),
    })
}
