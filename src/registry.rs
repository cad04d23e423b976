//! Binding registry.
//!
//! Bound methods accumulate per class while units are matched; the
//! registry is then frozen into a [`Catalog`], the only form the resolver
//! and renderer accept. Writing and reading are separate phases by type.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::frontend::SourceLocation;
use crate::types::BoundType;

/// What happens when a class registered under its raw spelling later shows
/// up with a display-name literal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DisplayNamePolicy {
    /// The display name is fixed by the first registration seen.
    #[default]
    FirstSeen,
    /// A literal replaces a raw-spelling fallback; never another literal.
    PreferLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParam {
    /// Declared parameter name, empty when unnamed.
    pub name: String,
    pub ty: BoundType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundMethod {
    /// Name visible to scripts.
    pub exposed_name: String,
    /// Name of the C++ member function.
    pub cpp_name: String,
    pub return_type: BoundType,
    pub params: Vec<BoundParam>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySource {
    /// From the `class_<T>("Name")` literal.
    Literal,
    /// Raw spelling of `T`.
    Spelling,
}

#[derive(Debug, Clone)]
pub struct BoundClass {
    ty: BoundType,
    display_name: String,
    display_source: DisplaySource,
    methods: Vec<BoundMethod>,
}

impl BoundClass {
    pub fn ty(&self) -> &BoundType {
        &self.ty
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn display_source(&self) -> DisplaySource {
        self.display_source
    }

    /// Methods in registration order.
    pub fn methods(&self) -> &[BoundMethod] {
        &self.methods
    }
}

/// Mutable accumulation of bindings, keyed by the bound class's identity.
#[derive(Debug, Default)]
pub struct Registry {
    classes: IndexMap<BoundType, BoundClass>,
    policy: DisplayNamePolicy,
}

impl Registry {
    pub fn new(policy: DisplayNamePolicy) -> Self {
        Self {
            classes: IndexMap::new(),
            policy,
        }
    }

    /// Append a method to `class`, creating the entry on first sight.
    /// Duplicate exposed names are kept as separate entries.
    pub fn record(&mut self, class: BoundType, display_name: Option<String>, method: BoundMethod) {
        let policy = self.policy;
        let entry = self.classes.entry(class).or_insert_with_key(|ty| {
            let (display_name, display_source) = match &display_name {
                Some(name) => (name.clone(), DisplaySource::Literal),
                None => (ty.spelling(), DisplaySource::Spelling),
            };
            tracing::debug!(class = %ty, display = %display_name, "registered class");
            BoundClass {
                ty: ty.clone(),
                display_name,
                display_source,
                methods: Vec::new(),
            }
        });

        if let Some(name) = display_name {
            if policy == DisplayNamePolicy::PreferLiteral && entry.display_source == DisplaySource::Spelling {
                tracing::debug!(class = %entry.ty, display = %name, "upgraded display name");
                entry.display_name = name;
                entry.display_source = DisplaySource::Literal;
            } else if name != entry.display_name {
                tracing::debug!(
                    class = %entry.ty,
                    kept = %entry.display_name,
                    ignored = %name,
                    "conflicting display name"
                );
            }
        }

        entry.methods.push(method);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// End the write phase.
    pub fn freeze(self) -> Catalog {
        Catalog {
            classes: self.classes,
        }
    }
}

/// Read-only registry contents, available once matching has finished.
#[derive(Debug, Default)]
pub struct Catalog {
    classes: IndexMap<BoundType, BoundClass>,
}

impl Catalog {
    pub fn get(&self, ty: &BoundType) -> Option<&BoundClass> {
        self.classes.get(ty)
    }

    /// Classes in registration order.
    pub fn classes(&self) -> impl Iterator<Item = &BoundClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn method_count(&self) -> usize {
        self.classes.values().map(|c| c.methods.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{normalize, CppType};
    use std::path::PathBuf;

    fn method(exposed: &str) -> BoundMethod {
        BoundMethod {
            exposed_name: exposed.to_string(),
            cpp_name: exposed.to_string(),
            return_type: normalize(&CppType::named("void")),
            params: Vec::new(),
            location: SourceLocation {
                file: PathBuf::from("t.cpp"),
                line: 1,
            },
        }
    }

    fn class(name: &str) -> BoundType {
        normalize(&CppType::named(name))
    }

    #[test]
    fn test_same_class_accumulates() {
        let mut registry = Registry::new(DisplayNamePolicy::FirstSeen);
        registry.record(class("Player"), Some("Player".into()), method("a"));
        registry.record(
            normalize(&CppType::lvalue_ref(CppType::named("Player"))),
            Some("Player".into()),
            method("b"),
        );
        registry.record(class("Item"), None, method("c"));

        let catalog = registry.freeze();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.method_count(), 3);
        assert_eq!(catalog.get(&class("Player")).unwrap().methods().len(), 2);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut registry = Registry::new(DisplayNamePolicy::FirstSeen);
        registry.record(class("A"), None, method("run"));
        registry.record(class("A"), None, method("run"));
        assert_eq!(registry.freeze().get(&class("A")).unwrap().methods().len(), 2);
    }

    #[test]
    fn test_fallback_display_is_raw_spelling() {
        let mut registry = Registry::new(DisplayNamePolicy::FirstSeen);
        registry.record(class("CPlayer"), None, method("a"));
        let catalog = registry.freeze();
        let entry = catalog.get(&class("CPlayer")).unwrap();
        assert_eq!(entry.display_name(), "CPlayer");
        assert_eq!(entry.display_source(), DisplaySource::Spelling);
    }

    #[test]
    fn test_first_seen_wins() {
        let mut registry = Registry::new(DisplayNamePolicy::FirstSeen);
        registry.record(class("CPlayer"), None, method("a"));
        registry.record(class("CPlayer"), Some("Player".into()), method("b"));
        registry.record(class("CPlayer"), Some("Hero".into()), method("c"));
        assert_eq!(
            registry.freeze().get(&class("CPlayer")).unwrap().display_name(),
            "CPlayer"
        );
    }

    #[test]
    fn test_prefer_literal_upgrades_fallback_once() {
        let mut registry = Registry::new(DisplayNamePolicy::PreferLiteral);
        registry.record(class("CPlayer"), None, method("a"));
        registry.record(class("CPlayer"), Some("Player".into()), method("b"));
        registry.record(class("CPlayer"), Some("Hero".into()), method("c"));
        let catalog = registry.freeze();
        let entry = catalog.get(&class("CPlayer")).unwrap();
        assert_eq!(entry.display_name(), "Player");
        assert_eq!(entry.display_source(), DisplaySource::Literal);
    }

    #[test]
    fn test_class_order_is_registration_order() {
        let mut registry = Registry::new(DisplayNamePolicy::FirstSeen);
        registry.record(class("Zeta"), None, method("a"));
        registry.record(class("Alpha"), None, method("a"));
        let catalog = registry.freeze();
        let names: Vec<&str> = catalog.classes().map(|c| c.display_name()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }
}
