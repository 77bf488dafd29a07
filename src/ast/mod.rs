//! The Polyloft abstract syntax tree.
//!
//! One file per concern, re-exported from `mod.rs`: a handful of files
//! grouped by AST layer (expressions, statements, declarations, types,
//! operators) rather than one file per node type.

pub mod decl;
pub mod expr;
pub mod operators;
pub mod parser;
pub mod stmt;
pub mod types;

pub use decl::{
    Access, ClassDecl, EnumDecl, EnumValueDecl, FieldDecl, FnDecl, InterfaceDecl,
    InterfaceMethodSig, RecordDecl, RecordFieldDecl,
};
pub use expr::{Expr, ExprKind, LambdaBody, Param, StringPart, TypeArg};
pub use operators::{BinaryOp, UnaryOp};
pub use stmt::{
    AssignOp, AssignTarget, BindingTarget, Block, CatchClause, LetKind, SelectArm, SelectOp, Stmt,
    StmtKind, SwitchCase,
};
pub use types::{GenericBound, TypeExpr, Variance, WildcardKind};

/// A parsed source file: its top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ast {
    pub stmts: Vec<Stmt>,
}
