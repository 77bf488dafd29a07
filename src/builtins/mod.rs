//! Built-in classes: Bool, Int, Float, String, Bytes, Array, Map, and the
//! exception hierarchy, plus the builder used to wire native methods onto
//! each (spec.md §4.6).
//!
//! Starts from a flat name->fn native-function table, generalized into
//! per-class `ClassDefinition`s carrying their own method/constructor
//! overload sets so the same `class_machinery::call_method` dispatch path
//! handles both user-defined and built-in instances.

mod exceptions;

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::TypeExpr;
use crate::converter::ConverterRegistry;
use crate::diagnostics::{arity_error, index_error, type_error, value_error, EvalResult};
use crate::registry::TypeRegistry;
use crate::value::protocol::ProtocolTable;
use crate::value::{Access, ClassDefinition, MethodBody, MethodInfo, NativeFn, Value};

pub use exceptions::install_exceptions;

/// Builds a `ClassDefinition` for a built-in type: methods keyed by name,
/// each carrying one or more native overloads distinguished by arity.
struct ClassBuilder {
    name: String,
    methods: FxHashMap<String, Vec<Rc<MethodInfo>>>,
    protocol_methods: Vec<String>,
}

impl ClassBuilder {
    fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_owned(),
            methods: FxHashMap::default(),
            protocol_methods: Vec::new(),
        }
    }

    fn method(mut self, name: &str, arity: usize, variadic: bool, f: NativeFn) -> Self {
        let params = native_params(arity, variadic);
        self.protocol_methods.push(name.to_owned());
        self.methods.entry(name.to_owned()).or_default().push(Rc::new(MethodInfo {
            params,
            return_type: None,
            body: MethodBody::Native(f),
            access: Access::Public,
            is_static: false,
        }));
        self
    }

    fn build(self, file: &str) -> Rc<ClassDefinition> {
        let protocols = RefCell::new(ProtocolTable::populate(&self.name, &self.protocol_methods));
        Rc::new(ClassDefinition {
            name: self.name.clone(),
            parent: RefCell::new(None),
            interfaces: RefCell::new(Vec::new()),
            fields: FxHashMap::default(),
            methods: RefCell::new(self.methods),
            constructors: RefCell::new(Vec::new()),
            static_fields: RefCell::new(FxHashMap::default()),
            type_params: Vec::new(),
            access: Access::Public,
            sealed: false,
            permits: Vec::new(),
            file: file.to_owned(),
            package: "builtin".to_owned(),
            protocols,
        })
    }
}

/// Synthesizes an anonymous, unchecked parameter list of the given arity for
/// native methods (native bodies validate argument shapes themselves).
fn native_params(arity: usize, variadic: bool) -> Vec<crate::ast::Param> {
    let count = arity.max(if variadic { 1 } else { 0 });
    (0..count)
        .map(|i| crate::ast::Param {
            name: format!("arg{i}"),
            type_expr: Some(TypeExpr::Any),
            variadic: variadic && i == count - 1,
            default: None,
        })
        .collect()
}

fn this_of(env: &crate::environment::Environment) -> EvalResult<Value> {
    env.this().ok_or_else(|| type_error("native method called without a receiver"))
}

/// Installs every built-in class into `registry`, then the built-in
/// converters, in the order spec.md §4.6 fixes: primitives and collections
/// first (so their method tables exist when exception classes reference
/// `String` for `toString`), exceptions second, converters last.
pub fn install(registry: &mut TypeRegistry, converters: &mut ConverterRegistry) {
    registry.register_builtin_class(build_bool());
    registry.register_builtin_class(build_int());
    registry.register_builtin_class(build_float());
    registry.register_builtin_class(build_string());
    registry.register_builtin_class(build_bytes());
    registry.register_builtin_class(build_array());
    registry.register_builtin_class(build_map());
    install_exceptions(registry);
    converters.install_builtin_converters();
}

fn build_bool() -> Rc<ClassDefinition> {
    ClassBuilder::new("Bool")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| Ok(Value::string(this_of(env)?.is_truthy().to_string()))),
        )
        .build("<builtin>")
}

fn build_int() -> Rc<ClassDefinition> {
    ClassBuilder::new("Int")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Int(i) = this_of(env)? else {
                    return Err(type_error("Int.toString called on non-Int receiver"));
                };
                Ok(Value::string(i.to_string()))
            }),
        )
        .method(
            "abs",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Int(i) = this_of(env)? else {
                    return Err(type_error("Int.abs called on non-Int receiver"));
                };
                Ok(Value::Int(i.abs()))
            }),
        )
        .build("<builtin>")
}

fn build_float() -> Rc<ClassDefinition> {
    ClassBuilder::new("Float")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Float(f) = this_of(env)? else {
                    return Err(type_error("Float.toString called on non-Float receiver"));
                };
                Ok(Value::string(f.to_string()))
            }),
        )
        .method(
            "isNaN",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Float(f) = this_of(env)? else {
                    return Err(type_error("Float.isNaN called on non-Float receiver"));
                };
                Ok(Value::Bool(f.is_nan()))
            }),
        )
        .build("<builtin>")
}

fn build_string() -> Rc<ClassDefinition> {
    ClassBuilder::new("String")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| this_of(env)),
        )
        .method(
            "length",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String.length called on non-String receiver"));
                };
                Ok(Value::Int(s.chars().count() as i64))
            }),
        )
        .method(
            "__get",
            1,
            false,
            Rc::new(|env, args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String indexing called on non-String receiver"));
                };
                let Value::Int(i) = args.first().cloned().unwrap_or(Value::Nil) else {
                    return Err(type_error("String index must be an Int"));
                };
                s.chars()
                    .nth(i as usize)
                    .map(|c| Value::string(c.to_string()))
                    .ok_or_else(|| index_error(format!("string index {i} out of range")))
            }),
        )
        .method(
            "__slice",
            2,
            false,
            Rc::new(|env, args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String slicing called on non-String receiver"));
                };
                let chars: Vec<char> = s.chars().collect();
                let from = as_index(&args[0], 0);
                let to = as_index(&args[1], chars.len());
                let to = to.min(chars.len());
                let from = from.min(to);
                Ok(Value::string(chars[from..to].iter().collect::<String>()))
            }),
        )
        .method(
            "contains",
            1,
            false,
            Rc::new(|env, args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String.contains called on non-String receiver"));
                };
                let Value::String(needle) = &args[0] else {
                    return Err(type_error("String.contains argument must be a String"));
                };
                Ok(Value::Bool(s.contains(needle.as_str())))
            }),
        )
        .method(
            "split",
            1,
            false,
            Rc::new(|env, args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String.split called on non-String receiver"));
                };
                let Value::String(sep) = &args[0] else {
                    return Err(type_error("String.split argument must be a String"));
                };
                Ok(Value::array(s.split(sep.as_str()).map(Value::string)))
            }),
        )
        .method(
            "toUpper",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String.toUpper called on non-String receiver"));
                };
                Ok(Value::string(s.to_uppercase()))
            }),
        )
        .method(
            "toLower",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String.toLower called on non-String receiver"));
                };
                Ok(Value::string(s.to_lowercase()))
            }),
        )
        .method(
            "+",
            1,
            false,
            Rc::new(|env, args| {
                let Value::String(s) = this_of(env)? else {
                    return Err(type_error("String.+ called on non-String receiver"));
                };
                Ok(Value::string(format!("{s}{}", crate::converter::to_display_string(&args[0]))))
            }),
        )
        .build("<builtin>")
}

fn as_index(v: &Value, default: usize) -> usize {
    match v {
        Value::Int(i) if *i >= 0 => *i as usize,
        Value::Nil => default,
        _ => default,
    }
}

fn build_bytes() -> Rc<ClassDefinition> {
    ClassBuilder::new("Bytes")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| Ok(Value::string(crate::converter::to_display_string(&this_of(env)?)))),
        )
        .method(
            "length",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Bytes(b) = this_of(env)? else {
                    return Err(type_error("Bytes.length called on non-Bytes receiver"));
                };
                Ok(Value::Int(b.len() as i64))
            }),
        )
        .method(
            "__get",
            1,
            false,
            Rc::new(|env, args| {
                let Value::Bytes(b) = this_of(env)? else {
                    return Err(type_error("Bytes indexing called on non-Bytes receiver"));
                };
                let Value::Int(i) = args[0] else {
                    return Err(type_error("Bytes index must be an Int"));
                };
                b.get(i as usize)
                    .map(|byte| Value::Int(*byte as i64))
                    .ok_or_else(|| index_error(format!("byte index {i} out of range")))
            }),
        )
        .build("<builtin>")
}

fn build_array() -> Rc<ClassDefinition> {
    ClassBuilder::new("Array")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| Ok(Value::string(crate::converter::to_display_string(&this_of(env)?)))),
        )
        .method(
            "length",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array.length called on non-Array receiver"));
                };
                Ok(Value::Int(a.borrow().len() as i64))
            }),
        )
        .method(
            "__get",
            1,
            false,
            Rc::new(|env, args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array indexing called on non-Array receiver"));
                };
                let Value::Int(i) = args[0] else {
                    return Err(type_error("Array index must be an Int"));
                };
                let a = a.borrow();
                let idx = if i < 0 { a.len() as i64 + i } else { i };
                if idx < 0 || idx as usize >= a.len() {
                    return Err(index_error(format!("array index {i} out of range")));
                }
                Ok(a[idx as usize].clone())
            }),
        )
        .method(
            "__set",
            2,
            false,
            Rc::new(|env, args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array indexing called on non-Array receiver"));
                };
                let Value::Int(i) = args[0] else {
                    return Err(type_error("Array index must be an Int"));
                };
                let mut a = a.borrow_mut();
                let idx = if i < 0 { a.len() as i64 + i } else { i };
                if idx < 0 || idx as usize >= a.len() {
                    return Err(index_error(format!("array index {i} out of range")));
                }
                a[idx as usize] = args[1].clone();
                Ok(Value::Nil)
            }),
        )
        .method(
            "__contains",
            1,
            false,
            Rc::new(|env, args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array.contains called on non-Array receiver"));
                };
                Ok(Value::Bool(a.borrow().iter().any(|v| v.structural_eq(&args[0]))))
            }),
        )
        .method(
            "__slice",
            2,
            false,
            Rc::new(|env, args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array slicing called on non-Array receiver"));
                };
                let a = a.borrow();
                let from = as_index(&args[0], 0).min(a.len());
                let to = as_index(&args[1], a.len()).min(a.len()).max(from);
                Ok(Value::array(a.iter().skip(from).take(to - from).cloned()))
            }),
        )
        .method(
            "push",
            1,
            false,
            Rc::new(|env, args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array.push called on non-Array receiver"));
                };
                a.borrow_mut().push_back(args[0].clone());
                Ok(Value::Nil)
            }),
        )
        .method(
            "pop",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array.pop called on non-Array receiver"));
                };
                a.borrow_mut()
                    .pop_back()
                    .ok_or_else(|| value_error("pop from an empty array"))
            }),
        )
        .method(
            "__length",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Array(a) = this_of(env)? else {
                    return Err(type_error("Array iteration called on non-Array receiver"));
                };
                Ok(Value::Int(a.borrow().len() as i64))
            }),
        )
        .build("<builtin>")
}

fn build_map() -> Rc<ClassDefinition> {
    ClassBuilder::new("Map")
        .method(
            "toString",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Map(m) = this_of(env)? else {
                    return Err(type_error("Map.toString called on non-Map receiver"));
                };
                let parts: Vec<String> = m
                    .borrow()
                    .buckets
                    .values()
                    .flatten()
                    .map(|(k, v)| {
                        format!(
                            "{}: {}",
                            crate::converter::to_display_string(k),
                            crate::converter::to_display_string(v)
                        )
                    })
                    .collect();
                Ok(Value::string(format!("{{{}}}", parts.join(", "))))
            }),
        )
        .method(
            "length",
            0,
            false,
            Rc::new(|env, _args| {
                let Value::Map(m) = this_of(env)? else {
                    return Err(type_error("Map.length called on non-Map receiver"));
                };
                Ok(Value::Int(m.borrow().buckets.values().map(|b| b.len()).sum::<usize>() as i64))
            }),
        )
        .method(
            "__get",
            1,
            false,
            Rc::new(|env, args| {
                let Value::Map(m) = this_of(env)? else {
                    return Err(type_error("Map indexing called on non-Map receiver"));
                };
                let key = &args[0];
                let m = m.borrow();
                m.buckets
                    .get(&key.bucket_key())
                    .and_then(|bucket| bucket.iter().find(|(k, _)| k.structural_eq(key)))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| index_error("key not found in map"))
            }),
        )
        .method(
            "__set",
            2,
            false,
            Rc::new(|env, args| {
                let Value::Map(m) = this_of(env)? else {
                    return Err(type_error("Map indexing called on non-Map receiver"));
                };
                let key = args[0].clone();
                let value = args[1].clone();
                let mut m = m.borrow_mut();
                let bucket = m.buckets.entry(key.bucket_key()).or_default();
                if let Some(entry) = bucket.iter_mut().find(|(k, _)| k.structural_eq(&key)) {
                    entry.1 = value;
                } else {
                    bucket.push((key, value));
                }
                Ok(Value::Nil)
            }),
        )
        .method(
            "__contains",
            1,
            false,
            Rc::new(|env, args| {
                let Value::Map(m) = this_of(env)? else {
                    return Err(type_error("Map.contains called on non-Map receiver"));
                };
                let key = &args[0];
                let m = m.borrow();
                Ok(Value::Bool(
                    m.buckets
                        .get(&key.bucket_key())
                        .is_some_and(|bucket| bucket.iter().any(|(k, _)| k.structural_eq(key))),
                ))
            }),
        )
        .build("<builtin>")
}

pub fn arity_mismatch(name: &str, expected: usize, got: usize) -> crate::diagnostics::Exception {
    arity_error(format!("'{name}' expects {expected} argument(s), got {got}"))
}
