//! The Type Checker (spec component E): `is_instance_of`, wildcard and union
//! matching, generic-argument compatibility, and function-type
//! compatibility.
//!
//! Starts from basic nominal-equality checks, generalized to the
//! alias/union/wildcard/variance surface spec.md §4.4 requires.

use crate::ast::TypeExpr;
use crate::registry::TypeRegistry;
use crate::value::{Value, Variance};

/// `compat(stored, requested)` — per-position argument compatibility
/// (spec.md §4.4). `Any` on either side is always compatible; the only
/// hard-coded supertype relation is `{Int, Integer, Float} <: Number`.
pub fn compat(registry: &TypeRegistry, stored: &TypeExpr, requested: &TypeExpr) -> bool {
    if matches!(stored, TypeExpr::Any) || matches!(requested, TypeExpr::Any) {
        return true;
    }
    if let TypeExpr::Wildcard(kind) = requested {
        return wildcard_type_compat(registry, stored, kind);
    }
    if let TypeExpr::Union(branches) = requested {
        return branches.iter().any(|b| compat(registry, stored, b));
    }
    normalized_type_eq(registry, stored, requested) || subtype_type(registry, stored, requested)
}

fn wildcard_type_compat(registry: &TypeRegistry, actual: &TypeExpr, kind: &crate::ast::WildcardKind) -> bool {
    use crate::ast::WildcardKind as W;
    match kind {
        W::Unbounded => true,
        W::Extends(bound) => {
            matches!(bound.as_ref(), TypeExpr::Any) || subtype_type(registry, actual, bound) || normalized_type_eq(registry, actual, bound)
        }
        W::Super(bound) => {
            matches!(bound.as_ref(), TypeExpr::Any) || subtype_type(registry, bound, actual) || normalized_type_eq(registry, actual, bound)
        }
        W::Implements(bound) => normalized_type_eq(registry, actual, bound),
    }
}

fn normalized_name(name: &str) -> &str {
    match name {
        "string" => "String",
        "int" => "Int",
        "float" => "Float",
        "bool" => "Bool",
        "integer" => "Int",
        other => other,
    }
}

fn normalized_type_eq(registry: &TypeRegistry, a: &TypeExpr, b: &TypeExpr) -> bool {
    match (a.base_name(), b.base_name()) {
        (Some(a), Some(b)) => {
            let a = registry.resolve_alias(a).unwrap_or_else(|_| a.to_owned());
            let b = registry.resolve_alias(b).unwrap_or_else(|_| b.to_owned());
            normalized_name(&a) == normalized_name(&b)
        }
        _ => a == b,
    }
}

fn subtype_type(registry: &TypeRegistry, sub: &TypeExpr, sup: &TypeExpr) -> bool {
    let (Some(sub_name), Some(sup_name)) = (sub.base_name(), sup.base_name()) else {
        return false;
    };
    let sub_name = normalized_name(&registry.resolve_alias(sub_name).unwrap_or_else(|_| sub_name.to_owned())).to_owned();
    let sup_name = normalized_name(&registry.resolve_alias(sup_name).unwrap_or_else(|_| sup_name.to_owned())).to_owned();
    if sup_name == "Number" && matches!(sub_name.as_str(), "Int" | "Float") {
        return true;
    }
    // Walk the class's ancestor chain and implemented interfaces, including
    // declared aliases, per spec.md §4.4 "Class inheritance".
    if let Some(class) = registry.lookup_class_any_package(&sub_name) {
        let mut current = Some(class);
        while let Some(c) = current {
            if c.name == sup_name {
                return true;
            }
            if c.interfaces.borrow().iter().any(|i| interface_satisfies(i, &sup_name)) {
                return true;
            }
            current = c.parent.borrow().clone();
        }
    }
    false
}

fn interface_satisfies(iface: &std::rc::Rc<crate::value::InterfaceDefinition>, target: &str) -> bool {
    if iface.name == target {
        return true;
    }
    iface.extends.borrow().iter().any(|e| interface_satisfies(e, target))
}

/// `is_instance_of(value, type-expr)` (spec.md §4.4).
pub fn is_instance_of(registry: &TypeRegistry, value: &Value, type_expr: &TypeExpr) -> bool {
    match type_expr {
        TypeExpr::Any => true,
        TypeExpr::Union(branches) => branches.iter().any(|b| is_instance_of(registry, value, b)),
        TypeExpr::Wildcard(kind) => wildcard_matches_value(registry, value, kind),
        TypeExpr::Function { .. } => matches!(
            value,
            Value::FunctionDefinition(_) | Value::LambdaDefinition(_) | Value::NativeFunction(_)
        ),
        TypeExpr::Named(name) => is_instance_of_named(registry, value, name, &[]),
        TypeExpr::Generic { base, args } => is_instance_of_named(registry, value, base, args),
    }
}

fn wildcard_matches_value(registry: &TypeRegistry, value: &Value, kind: &crate::ast::WildcardKind) -> bool {
    use crate::ast::WildcardKind as W;
    match kind {
        W::Unbounded => true,
        W::Extends(bound) if matches!(bound.as_ref(), TypeExpr::Any) => true,
        W::Extends(bound) => is_instance_of(registry, value, bound),
        W::Super(_) => true,
        W::Implements(bound) => is_instance_of(registry, value, bound),
    }
}

fn is_instance_of_named(registry: &TypeRegistry, value: &Value, name: &str, type_args: &[TypeExpr]) -> bool {
    let resolved = registry.resolve_alias(name).unwrap_or_else(|_| name.to_owned());
    let resolved = normalized_name(&resolved);
    let actual = normalized_name(&value.type_name());
    if resolved == actual {
        return generic_args_compat(registry, value, type_args);
    }
    if resolved == "Number" && matches!(value, Value::Int(_) | Value::Float(_)) {
        return true;
    }
    match value {
        Value::ClassInstance(inst) => {
            let mut current = Some(std::rc::Rc::clone(&inst.class));
            while let Some(c) = current {
                if c.name == resolved {
                    return generic_args_compat(registry, value, type_args);
                }
                if c.interfaces.borrow().iter().any(|i| interface_satisfies(i, resolved)) {
                    return true;
                }
                current = c.parent.borrow().clone();
            }
            false
        }
        Value::RecordInstance(rec) => {
            rec.definition.name == resolved
                || rec
                    .definition
                    .interfaces
                    .borrow()
                    .iter()
                    .any(|i| interface_satisfies(i, resolved))
        }
        Value::EnumValueInstance(ev) => ev.definition.upgrade().is_some_and(|d| {
            d.name == resolved
                || d.interfaces.borrow().iter().any(|i| interface_satisfies(i, resolved))
        }),
        _ => false,
    }
}

/// Compare stored generic type arguments pairwise against the requested
/// arguments, or fall back to inspecting the concrete element collection
/// when the instance carries no (or all-`Any`) stored arguments.
fn generic_args_compat(registry: &TypeRegistry, value: &Value, requested: &[TypeExpr]) -> bool {
    if requested.is_empty() {
        return true;
    }
    if let Value::ClassInstance(inst) = value {
        if let Some(stored) = &inst.type_args {
            if stored.iter().any(|t| !matches!(t, TypeExpr::Any)) {
                return stored
                    .iter()
                    .zip(requested.iter())
                    .all(|(s, r)| compat(registry, s, r));
            }
        }
    }
    match value {
        Value::Array(items) => items
            .borrow()
            .iter()
            .all(|item| requested.iter().all(|r| is_instance_of(registry, item, r))),
        Value::Map(map) => map.borrow().buckets.values().flatten().all(|(k, v)| {
            requested
                .first()
                .map(|r| is_instance_of(registry, k, r))
                .unwrap_or(true)
                && requested
                    .get(1)
                    .map(|r| is_instance_of(registry, v, r))
                    .unwrap_or(true)
        }),
        _ => true,
    }
}

/// Call-time variance check run while binding arguments to parameters
/// (spec.md §4.3 step 4, §8 Variance): a type parameter declared `out` may
/// not be used in an input (parameter) position. Checked per call, not per
/// declaration, so a class that merely declares such a method without ever
/// calling it is accepted.
pub fn reject_out_in_input_position(name: &str, variance: Variance) -> Option<String> {
    match variance {
        Variance::Out => Some(format!(
            "covariant type parameter '{name}' cannot be used in an input position"
        )),
        _ => None,
    }
}

/// Declaration-site variance check: a type parameter declared `in` may not
/// be used as a method's return type (spec.md §8 Variance). Unlike the
/// `out` half, this has no call-time argument to bind against — the return
/// type is fixed by the signature — so it is checked once, at declaration.
pub fn reject_in_in_output_position(name: &str, variance: Variance) -> Option<String> {
    match variance {
        Variance::In => Some(format!(
            "contravariant type parameter '{name}' cannot be used in an output position"
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    #[test]
    fn any_matches_everything() {
        let reg = TypeRegistry::new();
        assert!(is_instance_of(&reg, &Value::Int(1), &TypeExpr::Any));
    }

    #[test]
    fn int_and_float_satisfy_number() {
        let reg = TypeRegistry::new();
        assert!(is_instance_of(&reg, &Value::Int(1), &TypeExpr::named("Number")));
        assert!(is_instance_of(&reg, &Value::Float(1.0), &TypeExpr::named("Number")));
    }

    #[test]
    fn lowercase_primitive_aliases_match() {
        let reg = TypeRegistry::new();
        assert!(is_instance_of(&reg, &Value::string("hi"), &TypeExpr::named("string")));
    }

    #[test]
    fn union_matches_any_branch() {
        let reg = TypeRegistry::new();
        let t = TypeExpr::Union(vec![TypeExpr::named("Int"), TypeExpr::named("String")]);
        assert!(is_instance_of(&reg, &Value::string("hi"), &t));
        assert!(!is_instance_of(&reg, &Value::Bool(true), &t));
    }
}
