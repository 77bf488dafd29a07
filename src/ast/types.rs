//! Type-expression AST: named types, generics, unions, wildcards, function
//! types, generalized to the richer surface `spec.md` §3/§4.4 requires
//! (generics, unions, wildcards, variance).

/// Declaration-site variance annotation on a type parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variance {
    /// Unannotated — invariant.
    Invariant,
    /// `out T` — covariant, output-only.
    Out,
    /// `in T` — contravariant, input-only.
    In,
}

/// What kind of wildcard (`?`, `? extends T`, `? super T`, `? implements I`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardKind {
    Unbounded,
    Extends(Box<TypeExpr>),
    Super(Box<TypeExpr>),
    Implements(Box<TypeExpr>),
}

/// A type expression as written in source: a named type, possibly
/// parameterized, a union, a wildcard, or a function type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// The literal `Any` pass-through type (Design Note: kept distinct from
    /// "unresolved generic placeholder" rather than conflating the two).
    Any,
    /// A plain name: `Int`, `MyClass`, a type parameter, or `?` read bare.
    Named(String),
    /// `Base<T1, T2, ...>`.
    Generic {
        base: String,
        args: Vec<TypeExpr>,
    },
    /// `A | B | ...`.
    Union(Vec<TypeExpr>),
    /// An anonymous wildcard type argument.
    Wildcard(WildcardKind),
    /// `Function<P1, ..., Pn, R>` as a type expression.
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }

    /// The bare name for a `Named`/`Generic` type, if it has one.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Named(name) => Some(name),
            TypeExpr::Generic { base, .. } => Some(base),
            _ => None,
        }
    }
}

/// A bound on a class/interface/function type parameter, per spec.md §3
/// `GenericBound`: a name, a variance, an optional `extends`/`implements`
/// constraint, and whether it is the trailing variadic parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericBound {
    pub name: String,
    pub variance: Variance,
    pub extends: Option<TypeExpr>,
    pub implements: Option<TypeExpr>,
    pub variadic: bool,
}

impl GenericBound {
    pub fn unbounded(name: impl Into<String>) -> Self {
        GenericBound {
            name: name.into(),
            variance: Variance::Invariant,
            extends: None,
            implements: None,
            variadic: false,
        }
    }
}
