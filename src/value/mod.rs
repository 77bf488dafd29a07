//! The runtime value universe (spec component A).
//!
//! A tagged union generalized to the richer value surface spec.md §3 names,
//! with a mutable-sharing idiom (`Rc<RefCell<_>>`) so class instances,
//! arrays, and maps can be mutated in place while multiple bindings hold the
//! same value.

pub mod protocol;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::ast::{Access as AstAccess, Block, FnDecl, Param, TypeExpr, Variance as AstVariance};
use crate::diagnostics::EvalResult;
use crate::environment::Environment;

use protocol::ProtocolTable;

/// Member/class access level (spec.md §3 `access level ∈ {public, protected,
/// private}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
    Private,
}

impl From<AstAccess> for Access {
    fn from(a: AstAccess) -> Self {
        match a {
            AstAccess::Public => Access::Public,
            AstAccess::Private => Access::Private,
        }
    }
}

/// Declaration-site variance, carried on a runtime [`GenericBound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variance {
    Invariant,
    In,
    Out,
}

impl From<AstVariance> for Variance {
    fn from(v: AstVariance) -> Self {
        match v {
            AstVariance::Invariant => Variance::Invariant,
            AstVariance::In => Variance::In,
            AstVariance::Out => Variance::Out,
        }
    }
}

/// One bound in a [`GenericType`] parameter list (spec.md §3).
#[derive(Debug, Clone)]
pub struct GenericBound {
    pub name: String,
    pub variance: Variance,
    pub extends: Option<TypeExpr>,
    pub implements: Option<TypeExpr>,
    pub variadic: bool,
}

/// A class/interface/function's full generic-parameter list.
pub type GenericType = Vec<GenericBound>;

/// A resolved generic type argument bound to a concrete [`TypeExpr`] at
/// instantiation time, keyed by parameter name.
pub type TypeArgMap = FxHashMap<String, TypeExpr>;

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub type_expr: Option<TypeExpr>,
    pub is_static: bool,
    pub is_private: bool,
    pub is_final: bool,
    pub initial: Option<Block>,
}

/// A single method overload: parameter list, return type, and body.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: MethodBody,
    pub access: Access,
    pub is_static: bool,
}

#[derive(Clone)]
pub enum MethodBody {
    User(Block),
    Native(NativeFn),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::User(_) => f.write_str("MethodBody::User"),
            MethodBody::Native(_) => f.write_str("MethodBody::Native"),
        }
    }
}

/// Overloads of one method name, matched by arity in `select_overload`
/// (spec.md §4.3).
pub type OverloadSet = Vec<Rc<MethodInfo>>;

/// A native implementation: receives the calling environment (from which
/// `this` is retrieved per spec.md §4.6) and the argument slice.
pub type NativeFn = Rc<dyn Fn(&Environment, &[Value]) -> EvalResult<Value>>;

/// A class definition (spec.md §3 `ClassDefinition`).
pub struct ClassDefinition {
    pub name: String,
    pub parent: RefCell<Option<Rc<ClassDefinition>>>,
    pub interfaces: RefCell<Vec<Rc<InterfaceDefinition>>>,
    pub fields: FxHashMap<String, FieldInfo>,
    pub methods: RefCell<FxHashMap<String, OverloadSet>>,
    pub constructors: RefCell<OverloadSet>,
    pub static_fields: RefCell<FxHashMap<String, Value>>,
    pub type_params: GenericType,
    pub access: Access,
    pub sealed: bool,
    pub permits: Vec<String>,
    pub file: String,
    pub package: String,
    pub protocols: RefCell<ProtocolTable>,
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDefinition").field("name", &self.name).finish()
    }
}

/// An interface definition: like `ClassDefinition` but method signatures may
/// carry a default body instead of a required implementation.
pub struct InterfaceDefinition {
    pub name: String,
    pub extends: RefCell<Vec<Rc<InterfaceDefinition>>>,
    pub methods: FxHashMap<String, Vec<InterfaceMethodSig>>,
    pub static_fields: RefCell<FxHashMap<String, Value>>,
    pub type_params: GenericType,
    pub sealed: bool,
    pub permits: Vec<String>,
    pub file: String,
    pub package: String,
}

impl fmt::Debug for InterfaceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceDefinition").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceMethodSig {
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub default_body: Option<Block>,
}

/// An enum definition (spec.md §3 `EnumDefinition`).
pub struct EnumDefinition {
    pub name: String,
    pub constructors: RefCell<OverloadSet>,
    pub methods: RefCell<FxHashMap<String, OverloadSet>>,
    pub fields: FxHashMap<String, FieldInfo>,
    pub interfaces: RefCell<Vec<Rc<InterfaceDefinition>>>,
    /// Built via `Rc::new_cyclic` (each value holds a `Weak` back to this
    /// definition), so this has to stay mutable until every value is built.
    pub values: RefCell<Vec<Rc<EnumValueInstance>>>,
    pub sealed: bool,
    pub permits: Vec<String>,
    pub access: Access,
    pub file: String,
    pub package: String,
}

impl fmt::Debug for EnumDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumDefinition").field("name", &self.name).finish()
    }
}

/// A record definition: an immutable nominal tuple of named fields.
pub struct RecordDefinition {
    pub name: String,
    pub fields: Vec<String>,
    pub field_types: FxHashMap<String, Option<TypeExpr>>,
    pub interfaces: RefCell<Vec<Rc<InterfaceDefinition>>>,
    pub methods: RefCell<FxHashMap<String, OverloadSet>>,
    pub type_params: GenericType,
    pub file: String,
    pub package: String,
}

impl fmt::Debug for RecordDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordDefinition").field("name", &self.name).finish()
    }
}

/// A live class instance. `class` is the most-derived `ClassDefinition`;
/// `parent_class` mirrors spec.md's invariant
/// `ClassInstance.class-name == ClassInstance.parent-class.name` by pointing
/// back at the same definition the instance was constructed from (kept as a
/// `Weak` per the Design Note that definitions outlive instances, not the
/// reverse).
#[derive(Debug)]
pub struct ClassInstance {
    pub class: Rc<ClassDefinition>,
    pub parent_class: Weak<ClassDefinition>,
    pub fields: RefCell<FxHashMap<String, Value>>,
    pub bound_methods: RefCell<FxHashMap<String, OverloadSet>>,
    pub type_args: Option<Vec<TypeExpr>>,
    pub variance_map: Option<TypeArgMap>,
    pub is_final: bool,
}

#[derive(Debug)]
pub struct EnumValueInstance {
    pub definition: Weak<EnumDefinition>,
    pub name: String,
    pub ordinal: usize,
    pub fields: RefCell<FxHashMap<String, Value>>,
    pub bound_methods: RefCell<FxHashMap<String, OverloadSet>>,
}

#[derive(Debug)]
pub struct RecordInstance {
    pub definition: Rc<RecordDefinition>,
    pub values: FxHashMap<String, Value>,
}

#[derive(Debug)]
pub struct ClassConstructor {
    pub class: Rc<ClassDefinition>,
}

#[derive(Debug)]
pub struct EnumConstructor {
    pub definition: Rc<EnumDefinition>,
}

/// A user-defined function or lambda. Lambdas additionally carry a captured
/// environment: a live parent environment rather than a flat map snapshot,
/// so mutations inside the captured scope remain visible.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub access: Access,
    pub file: String,
    pub package: String,
    pub closure: Option<Environment>,
    pub type_params: GenericType,
}

pub type TaskSlot = Rc<RefCell<Option<EvalResult<Value>>>>;

/// A spawned cooperative task: a join handle backed by a single-slot result
/// cell filled once the task body finishes (spec.md §5).
pub struct Task {
    pub handle: RefCell<Option<std::thread::JoinHandle<()>>>,
    pub result: TaskSlot,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

/// A channel mailbox (spec.md §5). Tasks run synchronously to completion at
/// spawn time rather than on a real OS thread (`Value`'s `Rc`/`RefCell`
/// internals are not `Send`, so nothing can genuinely run concurrently with
/// this tree-walking evaluator); an unbounded `std::sync::mpsc` pair avoids
/// the deadlock a zero-capacity rendezvous channel would cause once `send`
/// and `recv` can no longer interleave across real threads.
pub struct Channel {
    pub sender: std::sync::mpsc::Sender<Value>,
    pub receiver: RefCell<std::sync::mpsc::Receiver<Value>>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Channel")
    }
}

/// A map entry bucket: spec.md §3 stores each bucket as a small list of
/// `{key, value}` pairs to disambiguate hash collisions without requiring a
/// `Hash`/`Eq` impl for every `Value` variant.
pub type MapBucket = Vec<(Value, Value)>;

#[derive(Debug, Clone, Default)]
pub struct MapValue {
    pub buckets: FxHashMap<u64, MapBucket>,
}

/// The tagged runtime value union (spec.md §3).
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<String>),
    Bytes(Rc<Vec<u8>>),
    Array(Rc<RefCell<VecDeque<Value>>>),
    Map(Rc<RefCell<MapValue>>),
    ClassInstance(Rc<ClassInstance>),
    EnumValueInstance(Rc<EnumValueInstance>),
    RecordInstance(Rc<RecordInstance>),
    ClassConstructor(Rc<ClassConstructor>),
    EnumConstructor(Rc<EnumConstructor>),
    FunctionDefinition(Rc<FunctionDefinition>),
    LambdaDefinition(Rc<FunctionDefinition>),
    NativeFunction(Rc<NativeFunctionValue>),
    Task(Rc<Task>),
    Channel(Rc<Channel>),
    /// A bare type reference, produced by a type-literal expression or
    /// `instanceof`'s right-hand side reified as a value.
    Type(Rc<TypeExpr>),
    /// Internal control-flow marker that never escapes a loop/block.
    BreakSentinel,
    /// Internal control-flow marker that never escapes a loop/block.
    ContinueSentinel,
}

#[derive(Clone)]
pub struct NativeFunctionValue {
    pub name: String,
    pub min_arity: usize,
    pub variadic: bool,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunctionValue").field("name", &self.name).finish()
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn bytes(b: Vec<u8>) -> Self {
        Value::Bytes(Rc::new(b))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn map_empty() -> Self {
        Value::Map(Rc::new(RefCell::new(MapValue::default())))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Map(m) => !m.borrow().buckets.is_empty(),
            _ => true,
        }
    }

    /// The built-in type name this value presents as for type-checking and
    /// `toString`/diagnostics purposes.
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "Nil".to_owned(),
            Value::Bool(_) => "Bool".to_owned(),
            Value::Int(_) => "Int".to_owned(),
            Value::Float(_) => "Float".to_owned(),
            Value::String(_) => "String".to_owned(),
            Value::Bytes(_) => "Bytes".to_owned(),
            Value::Array(_) => "Array".to_owned(),
            Value::Map(_) => "Map".to_owned(),
            Value::ClassInstance(inst) => inst.class.name.clone(),
            Value::EnumValueInstance(ev) => ev
                .definition
                .upgrade()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "<enum>".to_owned()),
            Value::RecordInstance(rec) => rec.definition.name.clone(),
            Value::ClassConstructor(c) => c.class.name.clone(),
            Value::EnumConstructor(c) => c.definition.name.clone(),
            Value::FunctionDefinition(_) => "Function".to_owned(),
            Value::LambdaDefinition(_) => "Function".to_owned(),
            Value::NativeFunction(_) => "Function".to_owned(),
            Value::Task(_) => "Task".to_owned(),
            Value::Channel(_) => "Channel".to_owned(),
            Value::Type(_) => "Type".to_owned(),
            Value::BreakSentinel | Value::ContinueSentinel => "<sentinel>".to_owned(),
        }
    }

    /// Structural equality for `MapEntry` keys and `==` fallback when no
    /// operator overload applies. Per the Design Note "MapEntry key equality
    /// must be structural (not sometimes-reference)", class instances
    /// compare by identity only as a last resort when no `equals` method is
    /// registered — that dispatch happens in the evaluator, this is the
    /// primitive/container structural layer.
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::ClassInstance(a), Value::ClassInstance(b)) => Rc::ptr_eq(a, b),
            (Value::EnumValueInstance(a), Value::EnumValueInstance(b)) => Rc::ptr_eq(a, b),
            (Value::RecordInstance(a), Value::RecordInstance(b)) => {
                a.definition.name == b.definition.name
                    && a.values.len() == b.values.len()
                    && a.values
                        .iter()
                        .all(|(k, v)| b.values.get(k).is_some_and(|bv| v.structural_eq(bv)))
            }
            _ => false,
        }
    }

    /// A stable hash bucket key for `Map`, consistent with `structural_eq`
    /// on the same pair of values.
    pub fn bucket_key(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        match self {
            Value::Nil => 0u8.hash(&mut hasher),
            Value::Bool(b) => b.hash(&mut hasher),
            Value::Int(i) => i.hash(&mut hasher),
            Value::Float(f) => f.to_bits().hash(&mut hasher),
            Value::String(s) => s.hash(&mut hasher),
            Value::Bytes(b) => b.hash(&mut hasher),
            _ => 0xFFu8.hash(&mut hasher),
        }
        hasher.finish()
    }

    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value::{}", self.type_name())
    }
}

/// How a statement/block finished: fell through with a value, hit `return`,
/// or propagated a loop `break`/`continue`. Modeled as a plain Rust enum
/// rather than threading sentinel `Value` variants through every statement
/// result; the evaluator's internal control flow uses this richer,
/// exhaustively-matched type instead.
#[derive(Debug, Clone)]
pub enum ExecSignal {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

impl ExecSignal {
    pub fn into_value(self) -> Value {
        match self {
            ExecSignal::Normal(v) | ExecSignal::Return(v) => v,
            ExecSignal::Break => Value::BreakSentinel,
            ExecSignal::Continue => Value::ContinueSentinel,
        }
    }
}
