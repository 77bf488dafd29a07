//! Pest-derived parser turning source text into the AST.
//!
//! `polyloft.pest` is scoped to exactly the statement and expression surface
//! spec.md §4/§6 enumerate.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::diagnostics::{EvalResult, Exception, HostError, Position};

use super::decl::{
    Access, ClassDecl, EnumDecl, EnumValueDecl, FieldDecl, FnDecl, InterfaceDecl,
    InterfaceMethodSig, RecordDecl, RecordFieldDecl,
};
use super::expr::{Expr, ExprKind, LambdaBody, Param, StringPart};
use super::operators::{BinaryOp, UnaryOp};
use super::stmt::{
    AssignOp, AssignTarget, BindingTarget, Block, CatchClause, LetKind, SelectArm, SelectOp, Stmt,
    StmtKind, SwitchCase,
};
use super::types::{GenericBound, TypeExpr, Variance, WildcardKind};
use super::Ast;

#[derive(Parser)]
#[grammar = "polyloft.pest"]
struct Grammar;

/// Parse a complete source file into an [`Ast`].
///
/// Parse failures are host-level faults; per the "Exception as value vs host
/// error" design note they are wrapped into a `RuntimeError` at this
/// boundary rather than propagated as a distinct Rust error type.
pub fn parse_program(file: &str, source: &str) -> EvalResult<Ast> {
    let mut pairs = Grammar::parse(Rule::program, source)
        .map_err(|e| HostError::Parse(e.to_string()))
        .map_err(|e| Exception::from(e).at(file, Position::default()))?;
    let program = pairs.next().expect("program pair");
    let mut stmts = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        stmts.push(parse_stmt(pair));
    }
    Ok(Ast { stmts })
}

fn pos(pair: &Pair<Rule>) -> Position {
    let (line, col) = pair.line_col();
    Position::new(line, col)
}

fn parse_stmt(pair: Pair<Rule>) -> Stmt {
    debug_assert_eq!(pair.as_rule(), Rule::stmt);
    let p = pos(&pair);
    let inner = pair.into_inner().next().expect("stmt inner");
    let kind = match inner.as_rule() {
        Rule::import_stmt => parse_import(inner),
        Rule::class_decl => StmtKind::ClassDecl(parse_class_decl(inner)),
        Rule::interface_decl => StmtKind::InterfaceDecl(parse_interface_decl(inner)),
        Rule::enum_decl => StmtKind::EnumDecl(parse_enum_decl(inner)),
        Rule::record_decl => StmtKind::RecordDecl(parse_record_decl(inner)),
        Rule::fn_decl => StmtKind::FnDecl(parse_fn_decl(inner)),
        Rule::if_stmt => parse_if(inner),
        Rule::for_stmt => parse_for(inner),
        Rule::do_loop_stmt => parse_do_loop(inner),
        Rule::loop_stmt => StmtKind::Loop {
            body: parse_block(inner.into_inner().next().expect("loop body")),
        },
        Rule::try_stmt => parse_try(inner),
        Rule::switch_stmt => parse_switch(inner),
        Rule::select_stmt => parse_select(inner),
        Rule::break_stmt => StmtKind::Break,
        Rule::continue_stmt => StmtKind::Continue,
        Rule::return_stmt => {
            let value = inner.into_inner().next().map(parse_expr_pair);
            StmtKind::Return(value)
        }
        Rule::throw_stmt => {
            StmtKind::Throw(parse_expr_pair(inner.into_inner().next().expect("throw value")))
        }
        Rule::defer_stmt => {
            StmtKind::Defer(parse_expr_pair(inner.into_inner().next().expect("defer value")))
        }
        Rule::type_alias_stmt => parse_type_alias(inner),
        Rule::let_stmt => parse_let(inner),
        Rule::assign_stmt => parse_assign(inner),
        Rule::expr_stmt => {
            StmtKind::ExprStmt(parse_expr_pair(inner.into_inner().next().expect("expr")))
        }
        other => unreachable!("unexpected stmt alternative: {other:?}"),
    };
    Stmt::new(kind, p)
}

fn parse_block(pair: Pair<Rule>) -> Block {
    debug_assert_eq!(pair.as_rule(), Rule::block);
    Block {
        stmts: pair.into_inner().map(parse_stmt).collect(),
    }
}

// --- imports, aliases -------------------------------------------------------

fn parse_import(pair: Pair<Rule>) -> StmtKind {
    let mut names = Vec::new();
    let mut path = String::new();
    let mut alias = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::ident => {
                if path.is_empty() {
                    names.push(p.as_str().to_owned());
                } else {
                    alias = Some(p.as_str().to_owned());
                }
            }
            Rule::string_lit => path = string_literal_raw(p),
            _ => {}
        }
    }
    StmtKind::Import { path, alias, names }
}

fn parse_type_alias(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let name = inner.next().expect("alias name").as_str().to_owned();
    let target = parse_type_expr(inner.next().expect("alias target"));
    StmtKind::TypeAlias { name, target }
}

// --- let / assign ------------------------------------------------------------

fn parse_let(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let kind = match inner.next().expect("let kind").as_str() {
        "const" => LetKind::Const,
        "final" => LetKind::Final,
        _ => LetKind::Var,
    };
    let target = parse_bind_target(inner.next().expect("bind target"));
    let mut next = inner.next().expect("type or value");
    let type_expr = if next.as_rule() == Rule::type_expr {
        let t = parse_type_expr(next);
        next = inner.next().expect("let value");
        Some(t)
    } else {
        None
    };
    let value = parse_expr_pair(next);
    StmtKind::Let {
        kind,
        target,
        type_expr,
        value,
    }
}

fn parse_bind_target(pair: Pair<Rule>) -> BindingTarget {
    let inner = pair.into_inner().next().expect("bind target inner");
    match inner.as_rule() {
        Rule::ident => BindingTarget::Name(inner.as_str().to_owned()),
        Rule::destructure_target => BindingTarget::Destructure(
            inner.into_inner().map(|i| i.as_str().to_owned()).collect(),
        ),
        other => unreachable!("unexpected bind target: {other:?}"),
    }
}

fn parse_assign(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let target_expr = parse_expr_pair(inner.next().expect("assign target"));
    let op = match inner.next().expect("assign op").as_str() {
        "+=" => AssignOp::AddAssign,
        "-=" => AssignOp::SubAssign,
        "*=" => AssignOp::MulAssign,
        "/=" => AssignOp::DivAssign,
        "%=" => AssignOp::ModAssign,
        _ => AssignOp::Assign,
    };
    let value = parse_expr_pair(inner.next().expect("assign value"));
    let target = expr_to_assign_target(target_expr);
    StmtKind::Assign { target, op, value }
}

fn expr_to_assign_target(expr: Expr) -> AssignTarget {
    match expr.kind {
        ExprKind::Ident(name) => AssignTarget::Ident(name),
        ExprKind::Field { base, name } => AssignTarget::Field { base: *base, name },
        ExprKind::Index { base, index } => AssignTarget::Index {
            base: *base,
            index: *index,
        },
        _ => AssignTarget::Ident(String::new()),
    }
}

// --- control flow -------------------------------------------------------------

fn parse_if(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let cond = parse_expr_pair(inner.next().expect("if cond"));
    let then_branch = parse_block(inner.next().expect("if then"));
    let else_branch = inner.next().map(|p| match p.as_rule() {
        Rule::block => parse_block(p),
        Rule::if_stmt => Block {
            stmts: vec![Stmt::new(parse_if(p.clone()), pos(&p))],
        },
        other => unreachable!("unexpected else branch: {other:?}"),
    });
    StmtKind::If {
        cond,
        then_branch,
        else_branch,
    }
}

fn parse_for(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let target = parse_bind_target(inner.next().expect("for target"));
    let iterable = parse_expr_pair(inner.next().expect("for iterable"));
    let mut next = inner.next();
    let mut guard = None;
    let body = loop {
        match next {
            Some(p) if p.as_rule() == Rule::expr => {
                guard = Some(parse_expr_pair(p));
                next = inner.next();
            }
            Some(p) if p.as_rule() == Rule::block => break parse_block(p),
            _ => unreachable!("for-in missing body"),
        }
    };
    StmtKind::ForIn {
        target,
        iterable,
        guard,
        body,
    }
}

fn parse_do_loop(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let body = parse_block(inner.next().expect("do body"));
    let cond = parse_expr_pair(inner.next().expect("do cond"));
    StmtKind::DoLoop { body, cond }
}

fn parse_try(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner().peekable();
    let body = parse_block(inner.next().expect("try body"));
    let mut catches = Vec::new();
    let mut finally = None;
    for p in inner {
        match p.as_rule() {
            Rule::catch_clause => catches.push(parse_catch(p)),
            Rule::block => finally = Some(parse_block(p)),
            other => unreachable!("unexpected try clause: {other:?}"),
        }
    }
    StmtKind::Try {
        body,
        catches,
        finally,
    }
}

fn parse_catch(pair: Pair<Rule>) -> CatchClause {
    let mut exception_types = Vec::new();
    let mut binding = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::type_expr => exception_types.push(parse_type_expr(p)),
            Rule::ident => binding = Some(p.as_str().to_owned()),
            Rule::block => {
                return CatchClause {
                    exception_types,
                    binding,
                    body: parse_block(p),
                }
            }
            other => unreachable!("unexpected catch part: {other:?}"),
        }
    }
    unreachable!("catch clause missing body")
}

fn parse_switch(pair: Pair<Rule>) -> StmtKind {
    let mut inner = pair.into_inner();
    let scrutinee = parse_expr_pair(inner.next().expect("switch scrutinee"));
    let mut cases = Vec::new();
    let mut default = None;
    for p in inner {
        match p.as_rule() {
            Rule::switch_values_case => {
                let mut parts = p.into_inner();
                let mut exprs = Vec::new();
                let mut stmts = Vec::new();
                for part in parts.by_ref() {
                    match part.as_rule() {
                        Rule::expr => exprs.push(parse_expr_pair(part)),
                        Rule::stmt => stmts.push(parse_stmt(part)),
                        _ => {}
                    }
                }
                cases.push(SwitchCase::Values(exprs, Block { stmts }));
            }
            Rule::switch_type_case => {
                let mut binding = None;
                let mut type_expr = None;
                let mut stmts = Vec::new();
                for part in p.into_inner() {
                    match part.as_rule() {
                        Rule::ident => binding = Some(part.as_str().to_owned()),
                        Rule::type_expr => type_expr = Some(parse_type_expr(part)),
                        Rule::stmt => stmts.push(parse_stmt(part)),
                        _ => {}
                    }
                }
                cases.push(SwitchCase::TypeBound(
                    type_expr.expect("type-bound case missing type"),
                    binding,
                    Block { stmts },
                ));
            }
            Rule::switch_default => {
                let stmts = p.into_inner().map(parse_stmt).collect();
                default = Some(Block { stmts });
            }
            other => unreachable!("unexpected switch part: {other:?}"),
        }
    }
    StmtKind::Switch {
        scrutinee,
        cases,
        default,
    }
}

fn parse_select(pair: Pair<Rule>) -> StmtKind {
    let mut arms = Vec::new();
    let mut default = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::select_arm => arms.push(parse_select_arm(p)),
            Rule::select_default => {
                default = Some(parse_block(p.into_inner().next().expect("default body")));
            }
            other => unreachable!("unexpected select part: {other:?}"),
        }
    }
    StmtKind::Select { arms, default }
}

fn parse_select_arm(pair: Pair<Rule>) -> SelectArm {
    let inner = pair.into_inner().next().expect("select arm kind");
    match inner.as_rule() {
        Rule::select_send => {
            let mut parts = inner.into_inner();
            let channel = parse_expr_pair(parts.next().expect("send channel"));
            let value = parse_expr_pair(parts.next().expect("send value"));
            let body = parse_block(parts.next().expect("send body"));
            SelectArm {
                op: SelectOp::Send,
                channel,
                binding: None,
                value: Some(value),
                body,
            }
        }
        Rule::select_recv => {
            let mut channel = None;
            let mut binding = None;
            let mut body = None;
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::expr => channel = Some(parse_expr_pair(p)),
                    Rule::ident => binding = Some(p.as_str().to_owned()),
                    Rule::block => body = Some(parse_block(p)),
                    _ => {}
                }
            }
            SelectArm {
                op: SelectOp::Recv,
                channel: channel.expect("recv missing channel"),
                binding,
                value: None,
                body: body.expect("recv missing body"),
            }
        }
        other => unreachable!("unexpected select arm: {other:?}"),
    }
}

// --- declarations --------------------------------------------------------------

fn parse_access(pair: &mut std::iter::Peekable<pest::iterators::Pairs<Rule>>) -> Access {
    if pair
        .peek()
        .map(|p| p.as_rule() == Rule::access_mod)
        .unwrap_or(false)
    {
        let p = pair.next().unwrap();
        if p.as_str() == "private" {
            return Access::Private;
        }
    }
    Access::Public
}

fn parse_fn_decl(pair: Pair<Rule>) -> FnDecl {
    let p = pos(&pair);
    let mut inner = pair.into_inner().peekable();
    let access = parse_access(&mut inner);
    let name = inner.next().expect("fn name").as_str().to_owned();
    let type_params = if inner
        .peek()
        .map(|p| p.as_rule() == Rule::type_params)
        .unwrap_or(false)
    {
        parse_type_params(inner.next().unwrap())
    } else {
        Vec::new()
    };
    let params = parse_param_list(inner.next().expect("fn params"));
    let mut next = inner.next().expect("fn return type or body");
    let return_type = if next.as_rule() == Rule::type_expr {
        let t = parse_type_expr(next);
        next = inner.next().expect("fn body");
        Some(t)
    } else {
        None
    };
    let body = parse_block(next);
    FnDecl {
        name,
        type_params,
        params,
        return_type,
        body,
        access,
        is_override: false,
        is_static: false,
        pos: p,
    }
}

fn parse_type_params(pair: Pair<Rule>) -> Vec<GenericBound> {
    pair.into_inner().map(parse_generic_bound).collect()
}

fn parse_generic_bound(pair: Pair<Rule>) -> GenericBound {
    let mut variance = Variance::Invariant;
    let mut name = String::new();
    let mut extends = None;
    let mut implements = None;
    let mut saw_extends_kw = false;
    let mut saw_implements_kw = false;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::variance => {
                variance = if p.as_str() == "out" {
                    Variance::Out
                } else {
                    Variance::In
                };
            }
            Rule::ident => name = p.as_str().to_owned(),
            Rule::kw_extends => saw_extends_kw = true,
            Rule::kw_implements => saw_implements_kw = true,
            Rule::type_expr => {
                if saw_implements_kw {
                    implements = Some(parse_type_expr(p));
                } else if saw_extends_kw {
                    extends = Some(parse_type_expr(p));
                }
            }
            _ => {}
        }
    }
    GenericBound {
        name,
        variance,
        extends,
        implements,
        variadic: false,
    }
}

fn parse_param_list(pair: Pair<Rule>) -> Vec<Param> {
    pair.into_inner().map(parse_param).collect()
}

fn parse_param(pair: Pair<Rule>) -> Param {
    let mut variadic = false;
    let mut name = String::new();
    let mut type_expr = None;
    let mut default = None;
    let mut seen_name = false;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::ident if !seen_name => {
                name = p.as_str().to_owned();
                seen_name = true;
            }
            Rule::type_expr => type_expr = Some(parse_type_expr(p)),
            Rule::expr => default = Some(Box::new(parse_expr_pair(p))),
            _ => {}
        }
    }
    if name.is_empty() {
        variadic = true;
    }
    Param {
        name,
        type_expr,
        variadic,
        default,
    }
}

fn parse_class_decl(pair: Pair<Rule>) -> ClassDecl {
    let p = pos(&pair);
    let mut name = String::new();
    let mut type_params = Vec::new();
    let mut superclass = None;
    let mut interfaces = Vec::new();
    let mut permits = Vec::new();
    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut constructor = None;
    let mut sealed = false;
    let mut saw_extends_kw = false;
    let mut saw_implements_kw = false;
    let raw = pair.as_str();
    if raw.trim_start().starts_with("sealed") {
        sealed = true;
    }
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::ident if name.is_empty() => name = item.as_str().to_owned(),
            // Any bare `ident` after the class name (not nested inside a
            // `type_expr`) is a `permits` entry — `extends`/`implements`
            // targets are always wrapped in `type_expr`.
            Rule::ident => permits.push(item.as_str().to_owned()),
            Rule::type_params => type_params = parse_type_params(item),
            Rule::kw_extends => saw_extends_kw = true,
            Rule::kw_implements => saw_implements_kw = true,
            Rule::type_expr => {
                if saw_extends_kw && superclass.is_none() {
                    superclass = Some(parse_type_expr(item));
                } else if saw_implements_kw {
                    interfaces.push(parse_type_expr(item));
                }
            }
            Rule::class_member => {
                let member = item.into_inner().next().expect("class member inner");
                match member.as_rule() {
                    Rule::fn_decl => {
                        let f = parse_fn_decl(member);
                        if f.name == name {
                            constructor = Some(f);
                        } else {
                            methods.push(f);
                        }
                    }
                    Rule::field_decl => fields.push(parse_field_decl(member)),
                    other => unreachable!("unexpected class member: {other:?}"),
                }
            }
            _ => {}
        }
    }
    ClassDecl {
        name,
        type_params,
        superclass,
        interfaces,
        fields,
        methods,
        constructor,
        sealed,
        permits,
        pos: p,
    }
}

fn parse_field_decl(pair: Pair<Rule>) -> FieldDecl {
    let p = pos(&pair);
    let raw = pair.as_str();
    let header = raw.split('=').next().unwrap_or(raw);
    let is_final = header.split_whitespace().any(|w| w == "final");
    let is_static = header.split_whitespace().any(|w| w == "static");
    let mut inner = pair.into_inner().peekable();
    let access = parse_access(&mut inner);
    let name = inner.next().expect("field name").as_str().to_owned();
    let mut next = inner.next();
    let type_expr = if next
        .as_ref()
        .map(|p| p.as_rule() == Rule::type_expr)
        .unwrap_or(false)
    {
        let t = parse_type_expr(next.take().unwrap());
        next = inner.next();
        Some(t)
    } else {
        None
    };
    let default = next.map(parse_expr_pair);
    FieldDecl {
        name,
        type_expr,
        default,
        access,
        is_static,
        is_final,
        pos: p,
    }
}

fn parse_interface_decl(pair: Pair<Rule>) -> InterfaceDecl {
    let p = pos(&pair);
    let mut name = String::new();
    let mut type_params = Vec::new();
    let mut extends = Vec::new();
    let mut methods = Vec::new();
    let mut saw_extends_kw = false;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::ident if name.is_empty() => name = item.as_str().to_owned(),
            Rule::type_params => type_params = parse_type_params(item),
            Rule::kw_extends => saw_extends_kw = true,
            Rule::type_expr if saw_extends_kw => extends.push(parse_type_expr(item)),
            Rule::interface_method => methods.push(parse_interface_method(item)),
            _ => {}
        }
    }
    InterfaceDecl {
        name,
        type_params,
        extends,
        methods,
        pos: p,
    }
}

fn parse_interface_method(pair: Pair<Rule>) -> InterfaceMethodSig {
    let p = pos(&pair);
    let mut inner = pair.into_inner().peekable();
    let name = inner.next().expect("method name").as_str().to_owned();
    let type_params = if inner
        .peek()
        .map(|p| p.as_rule() == Rule::type_params)
        .unwrap_or(false)
    {
        parse_type_params(inner.next().unwrap())
    } else {
        Vec::new()
    };
    let params = parse_param_list(inner.next().expect("method params"));
    let mut next = inner.next();
    let return_type = if next
        .as_ref()
        .map(|p| p.as_rule() == Rule::type_expr)
        .unwrap_or(false)
    {
        let t = parse_type_expr(next.take().unwrap());
        next = inner.next();
        Some(t)
    } else {
        None
    };
    let default_body = next.map(parse_block);
    InterfaceMethodSig {
        name,
        type_params,
        params,
        return_type,
        default_body,
        pos: p,
    }
}

fn parse_enum_decl(pair: Pair<Rule>) -> EnumDecl {
    let p = pos(&pair);
    let mut name = String::new();
    let mut interfaces = Vec::new();
    let mut values = Vec::new();
    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut constructor = None;
    let mut permits = Vec::new();
    let mut sealed = false;
    let mut saw_implements_kw = false;
    let raw = pair.as_str();
    if raw.trim_start().starts_with("sealed") {
        sealed = true;
    }
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::ident if name.is_empty() => name = item.as_str().to_owned(),
            // A bare `ident` after the enum name (not nested inside a
            // `type_expr` or `enum_value`) is a `permits` entry.
            Rule::ident => permits.push(item.as_str().to_owned()),
            Rule::kw_implements => saw_implements_kw = true,
            Rule::type_expr if saw_implements_kw => interfaces.push(parse_type_expr(item)),
            Rule::enum_value => values.push(parse_enum_value(item)),
            Rule::class_member => {
                let member = item.into_inner().next().expect("enum member inner");
                match member.as_rule() {
                    Rule::fn_decl => {
                        let f = parse_fn_decl(member);
                        if f.name == name {
                            constructor = Some(f);
                        } else {
                            methods.push(f);
                        }
                    }
                    Rule::field_decl => fields.push(parse_field_decl(member)),
                    other => unreachable!("unexpected enum member: {other:?}"),
                }
            }
            _ => {}
        }
    }
    EnumDecl {
        name,
        interfaces,
        values,
        fields,
        methods,
        constructor,
        sealed,
        permits,
        pos: p,
    }
}

fn parse_enum_value(pair: Pair<Rule>) -> EnumValueDecl {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().expect("enum value name").as_str().to_owned();
    let args = inner.map(parse_expr_pair).collect();
    EnumValueDecl { name, args, pos: p }
}

fn parse_record_decl(pair: Pair<Rule>) -> RecordDecl {
    let p = pos(&pair);
    let mut name = String::new();
    let mut type_params = Vec::new();
    let mut fields = Vec::new();
    let mut interfaces = Vec::new();
    let mut methods = Vec::new();
    let mut saw_implements_kw = false;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::ident if name.is_empty() => name = item.as_str().to_owned(),
            Rule::type_params => type_params = parse_type_params(item),
            Rule::record_field => fields.push(parse_record_field(item)),
            Rule::kw_implements => saw_implements_kw = true,
            Rule::type_expr if saw_implements_kw => interfaces.push(parse_type_expr(item)),
            Rule::fn_decl => methods.push(parse_fn_decl(item)),
            _ => {}
        }
    }
    RecordDecl {
        name,
        type_params,
        fields,
        interfaces,
        methods,
        pos: p,
    }
}

fn parse_record_field(pair: Pair<Rule>) -> RecordFieldDecl {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().expect("record field name").as_str().to_owned();
    let type_expr = inner.next().map(parse_type_expr);
    RecordFieldDecl {
        name,
        type_expr,
        pos: p,
    }
}

// --- type expressions -------------------------------------------------------

fn parse_type_expr(pair: Pair<Rule>) -> TypeExpr {
    debug_assert_eq!(pair.as_rule(), Rule::type_expr);
    let union = pair.into_inner().next().expect("union_type");
    let mut atoms: Vec<TypeExpr> = union.into_inner().map(parse_type_atom).collect();
    if atoms.len() == 1 {
        atoms.pop().unwrap()
    } else {
        TypeExpr::Union(atoms)
    }
}

fn parse_type_atom(pair: Pair<Rule>) -> TypeExpr {
    debug_assert_eq!(pair.as_rule(), Rule::type_atom);
    let text = pair.as_str();
    if text == "Any" {
        return TypeExpr::Any;
    }
    let inner = pair.into_inner().next();
    match inner {
        Some(p) if p.as_rule() == Rule::wildcard_type => parse_wildcard(p),
        Some(p) if p.as_rule() == Rule::generic_type => parse_generic_type(p),
        Some(p) if p.as_rule() == Rule::ident => TypeExpr::Named(p.as_str().to_owned()),
        _ => TypeExpr::Named(text.to_owned()),
    }
}

fn parse_generic_type(pair: Pair<Rule>) -> TypeExpr {
    let mut inner = pair.into_inner();
    let base = inner.next().expect("generic base").as_str().to_owned();
    let args: Vec<TypeExpr> = inner.map(parse_type_expr).collect();
    if args.is_empty() {
        TypeExpr::Named(base)
    } else {
        TypeExpr::Generic { base, args }
    }
}

fn parse_wildcard(pair: Pair<Rule>) -> TypeExpr {
    let mut saw_extends_kw = false;
    let mut saw_super_kw = false;
    let mut saw_implements_kw = false;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::kw_extends => saw_extends_kw = true,
            Rule::kw_super => saw_super_kw = true,
            Rule::kw_implements => saw_implements_kw = true,
            Rule::type_expr => {
                let t = Box::new(parse_type_expr(p));
                return TypeExpr::Wildcard(if saw_extends_kw {
                    WildcardKind::Extends(t)
                } else if saw_super_kw {
                    WildcardKind::Super(t)
                } else if saw_implements_kw {
                    WildcardKind::Implements(t)
                } else {
                    WildcardKind::Unbounded
                });
            }
            _ => {}
        }
    }
    TypeExpr::Wildcard(WildcardKind::Unbounded)
}

// --- expressions -------------------------------------------------------------

fn parse_expr_pair(pair: Pair<Rule>) -> Expr {
    match pair.as_rule() {
        Rule::expr => parse_expr_pair(pair.into_inner().next().expect("ternary_expr")),
        Rule::ternary_expr => parse_ternary(pair),
        Rule::or_expr => parse_or(pair),
        Rule::and_expr => parse_and(pair),
        Rule::eq_expr => parse_left_assoc_op(pair, parse_expr_pair),
        Rule::rel_expr => parse_left_assoc_op(pair, parse_expr_pair),
        Rule::range_expr => parse_range(pair),
        Rule::add_expr => parse_left_assoc_op(pair, parse_expr_pair),
        Rule::mul_expr => parse_left_assoc_op(pair, parse_expr_pair),
        Rule::instanceof_expr => parse_instanceof(pair),
        Rule::unary_expr => parse_unary(pair),
        Rule::postfix_expr => parse_postfix(pair),
        Rule::primary_expr => parse_primary(pair),
        other => unreachable!("unexpected expr rule: {other:?}"),
    }
}

fn parse_ternary(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let cond = parse_expr_pair(inner.next().expect("ternary cond"));
    match (inner.next(), inner.next()) {
        (Some(then_p), Some(else_p)) => Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(parse_expr_pair(then_p)),
                else_branch: Box::new(parse_expr_pair(else_p)),
            },
            p,
        ),
        _ => cond,
    }
}

fn parse_or(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let mut expr = parse_expr_pair(inner.next().expect("or lhs"));
    for rhs in inner {
        let rhs = parse_expr_pair(rhs);
        expr = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            },
            p,
        );
    }
    expr
}

fn parse_and(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let mut expr = parse_expr_pair(inner.next().expect("and lhs"));
    for rhs in inner {
        let rhs = parse_expr_pair(rhs);
        expr = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            },
            p,
        );
    }
    expr
}

fn op_for(text: &str) -> BinaryOp {
    match text {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        other => unreachable!("unknown operator token: {other}"),
    }
}

fn parse_left_assoc_op(pair: Pair<Rule>, next: impl Fn(Pair<Rule>) -> Expr) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let mut expr = next(inner.next().expect("left-assoc lhs"));
    let mut pending: Option<Pair<Rule>> = None;
    for item in inner {
        match pending.take() {
            None => pending = Some(item),
            Some(op_pair) => {
                let op = op_for(op_pair.as_str());
                let rhs = next(item);
                expr = Expr::new(
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(expr),
                        rhs: Box::new(rhs),
                    },
                    p,
                );
            }
        }
    }
    expr
}

fn parse_range(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let from = parse_expr_pair(inner.next().expect("range from"));
    match (inner.next(), inner.next()) {
        (Some(op_pair), Some(to_pair)) => {
            let inclusive = op_pair.as_str() == "..";
            Expr::new(
                ExprKind::Range {
                    from: Box::new(from),
                    to: Box::new(parse_expr_pair(to_pair)),
                    inclusive,
                },
                p,
            )
        }
        _ => from,
    }
}

fn parse_instanceof(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let expr = parse_expr_pair(inner.next().expect("instanceof lhs"));
    let rest: Vec<_> = inner.collect();
    if rest.is_empty() {
        return expr;
    }
    let mut type_expr = None;
    let mut bind = None;
    for p2 in rest {
        match p2.as_rule() {
            Rule::type_expr => type_expr = Some(parse_type_expr(p2)),
            Rule::ident => bind = Some(p2.as_str().to_owned()),
            _ => {}
        }
    }
    Expr::new(
        ExprKind::InstanceOf {
            expr: Box::new(expr),
            type_expr: type_expr.expect("instanceof missing type"),
            bind,
        },
        p,
    )
}

fn parse_unary(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let first = inner.next().expect("unary inner");
    if first.as_rule() == Rule::unary_op {
        let op = if first.as_str() == "-" {
            UnaryOp::Neg
        } else {
            UnaryOp::Not
        };
        let operand = parse_expr_pair(inner.next().expect("unary operand"));
        Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
            p,
        )
    } else {
        parse_expr_pair(first)
    }
}

fn parse_postfix(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let mut expr = parse_expr_pair(inner.next().expect("postfix primary"));
    for op in inner {
        let op_inner = op.into_inner().next().expect("postfix op inner");
        expr = match op_inner.as_rule() {
            Rule::call_op => Expr::new(
                ExprKind::Call {
                    callee: Box::new(expr),
                    args: op_inner.into_inner().map(parse_expr_pair).collect(),
                },
                p,
            ),
            Rule::generic_call_op => {
                let mut type_args = Vec::new();
                let mut args = Vec::new();
                let mut in_args = false;
                for part in op_inner.into_inner() {
                    match part.as_rule() {
                        Rule::type_expr if !in_args => type_args.push(parse_type_expr(part)),
                        Rule::expr => {
                            in_args = true;
                            args.push(parse_expr_pair(part));
                        }
                        _ => {}
                    }
                }
                Expr::new(
                    ExprKind::GenericCall {
                        callee: Box::new(expr),
                        type_args,
                        args,
                    },
                    p,
                )
            }
            Rule::index_op => Expr::new(
                ExprKind::Index {
                    base: Box::new(expr),
                    index: Box::new(parse_expr_pair(
                        op_inner.into_inner().next().expect("index expr"),
                    )),
                },
                p,
            ),
            Rule::slice_op => {
                let mut from = None;
                let mut to = None;
                let mut seen_first = false;
                for part in op_inner.into_inner() {
                    if part.as_rule() == Rule::expr {
                        if !seen_first {
                            from = Some(Box::new(parse_expr_pair(part)));
                            seen_first = true;
                        } else {
                            to = Some(Box::new(parse_expr_pair(part)));
                        }
                    }
                }
                Expr::new(
                    ExprKind::Slice {
                        base: Box::new(expr),
                        from,
                        to,
                    },
                    p,
                )
            }
            Rule::field_op => Expr::new(
                ExprKind::Field {
                    base: Box::new(expr),
                    name: op_inner
                        .into_inner()
                        .next()
                        .expect("field name")
                        .as_str()
                        .to_owned(),
                },
                p,
            ),
            other => unreachable!("unexpected postfix op: {other:?}"),
        };
    }
    expr
}

fn parse_primary(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let text = pair.as_str();
    if let Some(inner) = pair.clone().into_inner().next() {
        return match inner.as_rule() {
            Rule::lambda_expr => parse_lambda(inner),
            Rule::thread_spawn => Expr::new(
                ExprKind::ThreadSpawn(parse_block(
                    inner.into_inner().next().expect("spawn body"),
                )),
                p,
            ),
            Rule::thread_join => Expr::new(
                ExprKind::ThreadJoin(Box::new(parse_expr_pair(
                    inner.into_inner().next().expect("join arg"),
                ))),
                p,
            ),
            Rule::channel_new => Expr::new(ExprKind::ChannelNew, p),
            Rule::float_lit => Expr::new(
                ExprKind::Float(inner.as_str().parse().unwrap_or(0.0)),
                p,
            ),
            Rule::int_lit => Expr::new(ExprKind::Int(inner.as_str().parse().unwrap_or(0)), p),
            Rule::bytes_lit => Expr::new(ExprKind::Bytes(parse_bytes_literal(inner.as_str())), p),
            Rule::bool_lit => Expr::new(ExprKind::Bool(inner.as_str() == "true"), p),
            Rule::nil_lit => Expr::new(ExprKind::Nil, p),
            Rule::string_lit => Expr::new(ExprKind::Str(parse_string_parts(inner)), p),
            Rule::array_lit => Expr::new(
                ExprKind::ArrayLit(inner.into_inner().map(parse_expr_pair).collect()),
                p,
            ),
            Rule::map_lit => Expr::new(
                ExprKind::MapLit(
                    inner
                        .into_inner()
                        .map(|entry| {
                            let mut parts = entry.into_inner();
                            let key = parse_expr_pair(parts.next().expect("map key"));
                            let value = parse_expr_pair(parts.next().expect("map value"));
                            (key, value)
                        })
                        .collect(),
                ),
                p,
            ),
            Rule::expr => parse_expr_pair(inner),
            Rule::ident => Expr::new(ExprKind::Ident(inner.as_str().to_owned()), p),
            other => unreachable!("unexpected primary alternative: {other:?}"),
        };
    }
    match text {
        "this" => Expr::new(ExprKind::This, p),
        "super" => Expr::new(ExprKind::Super, p),
        other => Expr::new(ExprKind::Ident(other.to_owned()), p),
    }
}

fn parse_bytes_literal(text: &str) -> Vec<u8> {
    if let Some(hex) = text.strip_prefix("0x") {
        (0..hex.len())
            .step_by(2)
            .filter_map(|i| hex.get(i..i + 2))
            .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
            .collect()
    } else if let Some(bin) = text.strip_prefix("0b") {
        bin.as_bytes()
            .chunks(8)
            .map(|chunk| {
                let s = std::str::from_utf8(chunk).unwrap_or("0");
                u8::from_str_radix(s, 2).unwrap_or(0)
            })
            .collect()
    } else {
        Vec::new()
    }
}

fn parse_string_parts(pair: Pair<Rule>) -> Vec<StringPart> {
    pair.into_inner()
        .map(|part| {
            let inner = part.into_inner().next().expect("string part inner");
            match inner.as_rule() {
                Rule::plain_part => StringPart::Literal(unescape::unescape(inner.as_str()).unwrap_or_else(|| inner.as_str().to_owned())),
                Rule::interp_part => {
                    let e = inner.into_inner().next().expect("interp expr");
                    StringPart::Interp(Box::new(parse_expr_pair(e)))
                }
                other => unreachable!("unexpected string part: {other:?}"),
            }
        })
        .collect()
}

fn string_literal_raw(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .map(|part| {
            part.into_inner()
                .next()
                .map(|inner| inner.as_str().to_owned())
                .unwrap_or_default()
        })
        .collect()
}

fn parse_lambda(pair: Pair<Rule>) -> Expr {
    let p = pos(&pair);
    let mut inner = pair.into_inner();
    let params_pair = inner.next().expect("lambda params");
    let params = parse_lambda_params(params_pair);
    let mut next = inner.next().expect("lambda return type or body");
    let return_type = if next.as_rule() == Rule::type_expr {
        let t = parse_type_expr(next);
        next = inner.next().expect("lambda body");
        Some(t)
    } else {
        None
    };
    let body = match next.as_rule() {
        Rule::block => LambdaBody::Block(parse_block(next)),
        _ => LambdaBody::Expr(Box::new(parse_expr_pair(next))),
    };
    Expr::new(
        ExprKind::Lambda {
            params,
            return_type,
            body,
        },
        p,
    )
}

fn parse_lambda_params(pair: Pair<Rule>) -> Vec<Param> {
    pair.into_inner()
        .map(|p| match p.as_rule() {
            Rule::ident => Param {
                name: p.as_str().to_owned(),
                type_expr: None,
                variadic: false,
                default: None,
            },
            Rule::param => parse_param(p),
            other => unreachable!("unexpected lambda param: {other:?}"),
        })
        .collect()
}
