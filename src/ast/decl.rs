//! Top-level and member declarations: functions, classes, interfaces, enums,
//! records, covering the class/interface/enum/record surface spec.md
//! §3/§4.2-4.3 requires.

use crate::diagnostics::Position;

use super::expr::{Expr, Param};
use super::stmt::Block;
use super::types::{GenericBound, TypeExpr};

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

impl Default for Access {
    fn default() -> Self {
        Access::Public
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub type_params: Vec<GenericBound>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub access: Access,
    /// `true` for a class member overriding a superclass/interface method.
    pub is_override: bool,
    pub is_static: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub type_expr: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub access: Access,
    pub is_static: bool,
    /// `final` fields may only be assigned once, from the constructor.
    pub is_final: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<GenericBound>,
    pub superclass: Option<TypeExpr>,
    pub interfaces: Vec<TypeExpr>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FnDecl>,
    pub constructor: Option<FnDecl>,
    /// A sealed class restricts subclassing to `permits`.
    pub sealed: bool,
    pub permits: Vec<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceMethodSig {
    pub name: String,
    pub type_params: Vec<GenericBound>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// A default-implemented interface method carries a body.
    pub default_body: Option<Block>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub type_params: Vec<GenericBound>,
    pub extends: Vec<TypeExpr>,
    pub methods: Vec<InterfaceMethodSig>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    pub name: String,
    pub args: Vec<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub interfaces: Vec<TypeExpr>,
    pub values: Vec<EnumValueDecl>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FnDecl>,
    pub constructor: Option<FnDecl>,
    /// A sealed enum restricts importing its values to `permits` (spec.md
    /// §4.2's sealed-permission rule, extended to enums).
    pub sealed: bool,
    pub permits: Vec<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFieldDecl {
    pub name: String,
    pub type_expr: Option<TypeExpr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecl {
    pub name: String,
    pub type_params: Vec<GenericBound>,
    pub fields: Vec<RecordFieldDecl>,
    pub interfaces: Vec<TypeExpr>,
    pub methods: Vec<FnDecl>,
    pub pos: Position,
}
