//! The Type Registry (spec component C): built-in/per-package class,
//! interface, enum, record, and type-alias tables, plus access-control and
//! sealed-permission checks.
//!
//! Starts from a flat, process-wide symbol table idiom, generalized to
//! per-package partitioning and the access-modifier and sealed-permission
//! rules spec.md §4.2 requires.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::diagnostics::{access_error, name_error, runtime_error, EvalResult};
use crate::value::{Access, ClassDefinition, EnumDefinition, InterfaceDefinition, RecordDefinition};

/// A type alias: a name mapped to a base type name, tagged transparent
/// (subtype-equivalent to the base) or nominal (distinct identity).
#[derive(Debug, Clone)]
pub struct TypeAlias {
    pub target: String,
    pub transparent: bool,
}

#[derive(Default)]
struct PackageTables {
    classes: FxHashMap<String, Rc<ClassDefinition>>,
    interfaces: FxHashMap<String, Rc<InterfaceDefinition>>,
    enums: FxHashMap<String, Rc<EnumDefinition>>,
    records: FxHashMap<String, Rc<RecordDefinition>>,
}

/// The global type registry. `built_in_*` tables are populated once at
/// startup and read-only afterward (spec.md §3 invariant); per-package
/// tables grow as modules are loaded.
#[derive(Default)]
pub struct TypeRegistry {
    built_in_classes: FxHashMap<String, Rc<ClassDefinition>>,
    packages: FxHashMap<String, PackageTables>,
    aliases: FxHashMap<String, TypeAlias>,
    /// Names of classes that are (transitively) subclasses of the built-in
    /// `Exception` class, consulted by `catch` clause type matching.
    exception_classes: std::cell::RefCell<std::collections::HashSet<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    fn package_mut(&mut self, package: &str) -> &mut PackageTables {
        self.packages.entry(package.to_owned()).or_default()
    }

    // --- registration --------------------------------------------------

    pub fn register_builtin_class(&mut self, class: Rc<ClassDefinition>) {
        self.built_in_classes.insert(class.name.clone(), class);
    }

    pub fn register_class(&mut self, package: &str, class: Rc<ClassDefinition>) -> EvalResult<()> {
        self.check_sealed_parent(&class)?;
        self.package_mut(package).classes.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn register_interface(&mut self, package: &str, iface: Rc<InterfaceDefinition>) {
        self.package_mut(package)
            .interfaces
            .insert(iface.name.clone(), iface);
    }

    pub fn register_enum(&mut self, package: &str, def: Rc<EnumDefinition>) {
        self.package_mut(package).enums.insert(def.name.clone(), def);
    }

    pub fn register_record(&mut self, package: &str, def: Rc<RecordDefinition>) {
        self.package_mut(package).records.insert(def.name.clone(), def);
    }

    pub fn register_alias(&mut self, name: impl Into<String>, alias: TypeAlias) {
        self.aliases.insert(name.into(), alias);
    }

    pub fn mark_exception_class(&self, name: impl Into<String>) {
        self.exception_classes.borrow_mut().insert(name.into());
    }

    pub fn is_exception_class(&self, name: &str) -> bool {
        self.exception_classes.borrow().contains(name)
    }

    // --- lookup ----------------------------------------------------------

    /// Looks up built-ins first, then the caller's package, per spec.md
    /// §4.2.
    pub fn lookup_class(&self, package: &str, name: &str) -> Option<Rc<ClassDefinition>> {
        if let Some(c) = self.built_in_classes.get(name) {
            return Some(Rc::clone(c));
        }
        self.packages.get(package)?.classes.get(name).cloned()
    }

    pub fn lookup_interface(&self, package: &str, name: &str) -> Option<Rc<InterfaceDefinition>> {
        self.packages.get(package)?.interfaces.get(name).cloned()
    }

    pub fn lookup_enum(&self, package: &str, name: &str) -> Option<Rc<EnumDefinition>> {
        self.packages.get(package)?.enums.get(name).cloned()
    }

    pub fn lookup_record(&self, package: &str, name: &str) -> Option<Rc<RecordDefinition>> {
        self.packages.get(package)?.records.get(name).cloned()
    }

    pub fn lookup_class_any_package(&self, name: &str) -> Option<Rc<ClassDefinition>> {
        if let Some(c) = self.built_in_classes.get(name) {
            return Some(Rc::clone(c));
        }
        self.packages.values().find_map(|p| p.classes.get(name).cloned())
    }

    /// `resolve_alias(name)` — expands transitively, guarding against alias
    /// cycles (an Open Question the source left ambiguous: this target
    /// treats a cycle as a `RuntimeError` rather than looping forever).
    pub fn resolve_alias(&self, name: &str) -> EvalResult<String> {
        let mut seen = std::collections::HashSet::new();
        let mut current = name.to_owned();
        while let Some(alias) = self.aliases.get(&current) {
            if !seen.insert(current.clone()) {
                return Err(runtime_error(format!(
                    "type alias cycle detected starting at '{name}'"
                )));
            }
            current = alias.target.clone();
        }
        Ok(current)
    }

    pub fn alias_is_transparent(&self, name: &str) -> bool {
        self.aliases.get(name).map(|a| a.transparent).unwrap_or(true)
    }

    // --- access control ----------------------------------------------------

    /// Whether `accessor_package`/`accessor_file` may see a member declared
    /// with `access` in `owner_package`/`owner_file` (spec.md §4.2: "public
    /// everywhere; protected within same package or file; private within
    /// same file").
    pub fn is_visible(
        &self,
        access: Access,
        owner_package: &str,
        owner_file: &str,
        accessor_package: &str,
        accessor_file: &str,
    ) -> bool {
        match access {
            Access::Public => true,
            Access::Protected => owner_package == accessor_package || owner_file == accessor_file,
            Access::Private => owner_file == accessor_file,
        }
    }

    pub fn check_visible(
        &self,
        name: &str,
        access: Access,
        owner_package: &str,
        owner_file: &str,
        accessor_package: &str,
        accessor_file: &str,
    ) -> EvalResult<()> {
        if self.is_visible(access, owner_package, owner_file, accessor_package, accessor_file) {
            Ok(())
        } else {
            Err(access_error(format!("'{name}' is not accessible from here")))
        }
    }

    /// Sealed enforcement for a class naming a sealed parent (spec.md
    /// §4.2): the declaring class must be in the parent's permits list, or
    /// no permits list was given and both are in the same package.
    fn check_sealed_parent(&self, class: &ClassDefinition) -> EvalResult<()> {
        if let Some(parent) = class.parent.borrow().as_ref() {
            self.check_sealed(&class.name, &class.package, parent.sealed, &parent.permits, &parent.package, &parent.name)?;
        }
        for iface in class.interfaces.borrow().iter() {
            self.check_sealed(
                &class.name,
                &class.package,
                iface.sealed,
                &iface.permits,
                &iface.package,
                &iface.name,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_sealed(
        &self,
        subtype_name: &str,
        subtype_package: &str,
        sealed: bool,
        permits: &[String],
        owner_package: &str,
        owner_name: &str,
    ) -> EvalResult<()> {
        if !sealed {
            return Ok(());
        }
        let permitted = if permits.is_empty() {
            subtype_package == owner_package
        } else {
            permits.iter().any(|p| p == subtype_name)
        };
        if permitted {
            Ok(())
        } else {
            Err(access_error(format!(
                "'{subtype_name}' is not permitted to extend sealed type '{owner_name}'"
            )))
        }
    }

    /// Analogous sealed check for importing an enum into a foreign package
    /// (spec.md §4.2).
    pub fn check_enum_import(&self, def: &EnumDefinition, importing_package: &str) -> EvalResult<()> {
        if !def.sealed {
            return Ok(());
        }
        let permitted = if def.permits.is_empty() {
            def.package == importing_package
        } else {
            def.permits.iter().any(|p| p == importing_package)
        };
        if permitted {
            Ok(())
        } else {
            Err(access_error(format!(
                "cannot import sealed enum {} into package '{}'",
                def.name, importing_package
            )))
        }
    }

    pub fn require_class(&self, package: &str, name: &str) -> EvalResult<Rc<ClassDefinition>> {
        self.lookup_class(package, name)
            .ok_or_else(|| name_error(format!("unknown class '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_transitively() {
        let mut reg = TypeRegistry::new();
        reg.register_alias(
            "A",
            TypeAlias {
                target: "B".into(),
                transparent: true,
            },
        );
        reg.register_alias(
            "B",
            TypeAlias {
                target: "C".into(),
                transparent: true,
            },
        );
        assert_eq!(reg.resolve_alias("A").unwrap(), "C");
    }

    #[test]
    fn alias_cycle_is_rejected() {
        let mut reg = TypeRegistry::new();
        reg.register_alias(
            "A",
            TypeAlias {
                target: "B".into(),
                transparent: true,
            },
        );
        reg.register_alias(
            "B",
            TypeAlias {
                target: "A".into(),
                transparent: true,
            },
        );
        assert!(reg.resolve_alias("A").is_err());
    }

    #[test]
    fn protected_visible_within_same_package() {
        let reg = TypeRegistry::new();
        assert!(reg.is_visible(Access::Protected, "pkg", "a.pf", "pkg", "b.pf"));
        assert!(!reg.is_visible(Access::Protected, "pkg", "a.pf", "other", "b.pf"));
    }

    #[test]
    fn private_visible_only_within_same_file() {
        let reg = TypeRegistry::new();
        assert!(reg.is_visible(Access::Private, "pkg", "a.pf", "pkg", "a.pf"));
        assert!(!reg.is_visible(Access::Private, "pkg", "a.pf", "pkg", "b.pf"));
    }
}
