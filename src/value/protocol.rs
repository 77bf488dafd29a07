//! Fixed-size per-class protocol capability table.
//!
//! Per the Design Note "Interface-capability dispatch": the source tests
//! capability with a dynamic map lookup (`instance.Methods["__get"]`); this
//! target models it as a small fixed-size table of resolved method keys
//! populated once at class-construction time, so a runtime capability check
//! becomes an `Option::is_some` test instead of a hash lookup.

/// A resolved reference to a method overload set on a class, used as the
/// table's slot value so dispatch never re-does name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodKey {
    pub owner_class: String,
    pub method_name: String,
}

impl MethodKey {
    pub fn new(owner_class: impl Into<String>, method_name: impl Into<String>) -> Self {
        MethodKey {
            owner_class: owner_class.into(),
            method_name: method_name.into(),
        }
    }
}

/// The built-in protocols spec.md §4.5/§4.3 names: Iterable, Indexable,
/// Sliceable, Unstructured, Collection.
#[derive(Debug, Clone, Default)]
pub struct ProtocolTable {
    /// `__length` / `__get` — iteration support.
    pub iterable_length: Option<MethodKey>,
    pub iterable_get: Option<MethodKey>,
    /// `__contains` / `__get` / `__set` — indexing support.
    pub indexable_contains: Option<MethodKey>,
    pub indexable_get: Option<MethodKey>,
    pub indexable_set: Option<MethodKey>,
    /// `__slice` — range-slicing support.
    pub sliceable_slice: Option<MethodKey>,
    /// `__pieces` / `__getPiece` — destructuring support.
    pub unstructured_pieces: Option<MethodKey>,
    pub unstructured_get_piece: Option<MethodKey>,
    /// Marker that the class implements the `Collection` built-in
    /// interface (adds no extra slots beyond Iterable/Indexable today).
    pub is_collection: bool,
}

impl ProtocolTable {
    pub fn is_iterable(&self) -> bool {
        self.iterable_length.is_some() && self.iterable_get.is_some()
    }

    pub fn is_indexable(&self) -> bool {
        self.indexable_get.is_some()
    }

    pub fn is_sliceable(&self) -> bool {
        self.sliceable_slice.is_some()
    }

    pub fn is_unstructured(&self) -> bool {
        self.unstructured_pieces.is_some() && self.unstructured_get_piece.is_some()
    }

    /// Populate iterable/indexable/sliceable/unstructured slots by checking
    /// which of the fixed protocol method names this class's (and its
    /// ancestors') method table resolves, called once at class-construction
    /// time (spec.md Design Note).
    pub fn populate(class_name: &str, method_names: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut table = ProtocolTable::default();
        for name in method_names {
            let name = name.as_ref();
            let key = || MethodKey::new(class_name, name);
            match name {
                "__length" => table.iterable_length = Some(key()),
                "__get" => {
                    table.iterable_get = Some(key());
                    table.indexable_get = Some(key());
                }
                "__contains" => table.indexable_contains = Some(key()),
                "__set" => table.indexable_set = Some(key()),
                "__slice" => table.sliceable_slice = Some(key()),
                "__pieces" => table.unstructured_pieces = Some(key()),
                "__getPiece" => table.unstructured_get_piece = Some(key()),
                _ => {}
            }
        }
        table
    }
}
