//! The Type Converter Registry (spec component F): `convert_to`/
//! `create_instance_for`, dispatching to a pluggable per-type converter.
//!
//! Built on a native-callable-registration idiom (callables keyed by name)
//! generalized into a converter table that is populated only after every
//! built-in `ClassDefinition` is installed (spec.md §3 invariant).

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::diagnostics::{conversion_error, Exception};
use crate::value::{ClassInstance, Value};

pub type ConverterFn = Rc<dyn Fn(&Value) -> Result<Value, Exception>>;

/// Distinguishes "no converter registered for this type" (recoverable —
/// callers can fall back to another strategy) from "a converter ran and
/// failed" (spec.md §4.7).
pub enum ConvertError {
    NotFound,
    Failed(Exception),
}

#[derive(Default)]
pub struct ConverterRegistry {
    converters: FxHashMap<String, ConverterFn>,
    instance_creators: FxHashMap<String, ConverterFn>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        ConverterRegistry::default()
    }

    pub fn register_converter(&mut self, name: impl Into<String>, f: ConverterFn) {
        self.converters.insert(name.into(), f);
    }

    pub fn register_instance_creator(&mut self, name: impl Into<String>, f: ConverterFn) {
        self.instance_creators.insert(name.into(), f);
    }

    pub fn convert_to(&self, name: &str, value: &Value) -> Result<Value, ConvertError> {
        match self.converters.get(name) {
            Some(f) => f(value).map_err(ConvertError::Failed),
            None => Err(ConvertError::NotFound),
        }
    }

    pub fn create_instance_for(&self, name: &str, value: &Value) -> Result<Value, ConvertError> {
        match self.instance_creators.get(name) {
            Some(f) => f(value).map_err(ConvertError::Failed),
            None => Err(ConvertError::NotFound),
        }
    }

    /// Registers the built-in coverage spec.md §4.7 lists: Bytes, Array,
    /// String, Int, Float, Bool, Map. Called once, after every built-in
    /// `ClassDefinition` has been installed.
    pub fn install_builtin_converters(&mut self) {
        self.register_converter("String", Rc::new(|v| Ok(Value::string(to_display_string(v)))));
        self.register_converter("Int", Rc::new(|v| to_int(v)));
        self.register_converter("Float", Rc::new(|v| to_float(v)));
        self.register_converter("Bool", Rc::new(|v| Ok(Value::Bool(v.is_truthy()))));
        self.register_converter("Bytes", Rc::new(|v| to_bytes(v)));
        self.register_converter("Array", Rc::new(|v| to_array(v)));
        self.register_converter("Map", Rc::new(|v| to_map(v)));
    }
}

pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.as_str().to_owned(),
        Value::Bytes(b) => format!("0x{}", hex_encode(b)),
        Value::Array(items) => {
            let parts: Vec<_> = items.borrow().iter().map(to_display_string).collect();
            format!("[{}]", parts.join(", "))
        }
        other => format!("<{}>", other.type_name()),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn to_int(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| conversion_error(format!("cannot convert '{s}' to Int"))),
        other => Err(conversion_error(format!(
            "cannot convert {} to Int",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| conversion_error(format!("cannot convert '{s}' to Float"))),
        other => Err(conversion_error(format!(
            "cannot convert {} to Float",
            other.type_name()
        ))),
    }
}

/// Bytes conversion handles `0x…` hex and `0b…` binary string prefixes,
/// primitive integers (byte of LSB), bools (`0x00`/`0x01`), and every
/// container by recursively converting elements and concatenating
/// (spec.md §4.7).
fn to_bytes(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Bytes(b) => Ok(Value::Bytes(Rc::clone(b))),
        Value::Int(i) => Ok(Value::bytes(vec![*i as u8])),
        Value::Bool(b) => Ok(Value::bytes(vec![if *b { 1 } else { 0 }])),
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                decode_hex(hex)
            } else if let Some(bin) = s.strip_prefix("0b") {
                decode_bin(bin)
            } else {
                Ok(Value::bytes(s.as_bytes().to_vec()))
            }
        }
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items.borrow().iter() {
                let Value::Bytes(b) = to_bytes(item)? else {
                    unreachable!("to_bytes always returns Bytes");
                };
                out.extend_from_slice(&b);
            }
            Ok(Value::bytes(out))
        }
        other => Err(conversion_error(format!(
            "cannot convert {} to Bytes",
            other.type_name()
        ))),
    }
}

fn decode_hex(hex: &str) -> Result<Value, Exception> {
    if hex.len() % 2 != 0 {
        return Err(conversion_error("hex literal must have an even number of digits"));
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| conversion_error(format!("invalid hex byte '{}'", &hex[i..i + 2])))?;
        out.push(byte);
    }
    Ok(Value::bytes(out))
}

fn decode_bin(bin: &str) -> Result<Value, Exception> {
    if bin.len() % 8 != 0 {
        return Err(conversion_error("binary literal must be a multiple of 8 bits"));
    }
    let mut out = Vec::with_capacity(bin.len() / 8);
    for chunk in bin.as_bytes().chunks(8) {
        let s = std::str::from_utf8(chunk).unwrap_or("0");
        let byte = u8::from_str_radix(s, 2)
            .map_err(|_| conversion_error(format!("invalid binary byte '{s}'")))?;
        out.push(byte);
    }
    Ok(Value::bytes(out))
}

fn to_array(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Array(items) => Ok(Value::Array(Rc::clone(items))),
        Value::Bytes(b) => Ok(Value::array(b.iter().map(|byte| Value::Int(*byte as i64)))),
        Value::String(s) => Ok(Value::array(s.chars().map(|c| Value::string(c.to_string())))),
        Value::Map(m) => Ok(Value::array(
            m.borrow()
                .buckets
                .values()
                .flatten()
                .map(|(k, v)| Value::array(vec![k.clone(), v.clone()])),
        )),
        other => Err(conversion_error(format!(
            "cannot convert {} to Array",
            other.type_name()
        ))),
    }
}

fn to_map(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Map(m) => Ok(Value::Map(Rc::clone(m))),
        Value::Array(items) => {
            let map = Value::map_empty();
            let Value::Map(m) = &map else {
                unreachable!()
            };
            for (i, item) in items.borrow().iter().enumerate() {
                let key = Value::Int(i as i64);
                m.borrow_mut()
                    .buckets
                    .entry(key.bucket_key())
                    .or_default()
                    .push((key, item.clone()));
            }
            Ok(map)
        }
        other => Err(conversion_error(format!(
            "cannot convert {} to Map",
            other.type_name()
        ))),
    }
}

/// `create_instance_for(name, value)` wraps `value` in a fresh built-in
/// `ClassInstance` of the given type name (used by the "primitive value also
/// wrapped as a class instance" path in §3).
pub fn wrap_primitive_instance(
    class: std::rc::Rc<crate::value::ClassDefinition>,
    value: Value,
) -> Value {
    let mut fields = FxHashMap::default();
    fields.insert("_value".to_owned(), value);
    Value::ClassInstance(Rc::new(ClassInstance {
        class: std::rc::Rc::clone(&class),
        parent_class: std::rc::Rc::downgrade(&class),
        fields: std::cell::RefCell::new(fields),
        bound_methods: std::cell::RefCell::new(FxHashMap::default()),
        type_args: None,
        variance_map: None,
        is_final: false,
    }))
}
