//! C++ type model and the normalizer that reduces types to registry keys.
//!
//! The front end lowers declarator syntax into [`CppType`], a closed tree of
//! named types, pointers, references and cv-qualified wrappers. Name lookup
//! (alias expansion, scope qualification) already happened by then, so the
//! normalizer is a pure function over that tree:
//!
//! 1. smart-pointer templates (any template whose name contains `_ptr`) are
//!    replaced by their first type argument,
//! 2. references collapse to the referenced type,
//! 3. top-level cv-qualifiers are dropped,
//! 4. raw pointers keep their pointer-ness, only the pointee is normalized,
//! 5. what remains is put in canonical spelling (builtin spellings unified,
//!    template arguments canonicalized).
//!
//! The `_ptr` test is a naming heuristic, not a trait check: any template
//! whose name happens to contain the marker is treated as transparent.

use std::fmt;

/// Substring of a template name that marks a smart-pointer wrapper.
pub const SMART_POINTER_MARKER: &str = "_ptr";

/// A C++ type as written, after the front end resolved names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CppType {
    /// Builtin, class, or template instantiation.
    Named(NamedType),
    Pointer(Box<CppType>),
    Reference(Box<CppType>, RefKind),
    Qualified(Box<CppType>, Qualifiers),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    LValue,
    RValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        !self.is_const && !self.is_volatile
    }

    pub fn merge(self, other: Qualifiers) -> Qualifiers {
        Qualifiers {
            is_const: self.is_const || other.is_const,
            is_volatile: self.is_volatile || other.is_volatile,
        }
    }
}

/// A (possibly namespace-qualified, possibly templated) type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Enclosing namespaces/classes, outermost first.
    pub scope: Vec<String>,
    pub name: String,
    pub args: Vec<TemplateArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateArg {
    Type(CppType),
    /// Non-type argument, kept as its source text.
    Value(String),
}

impl NamedType {
    pub fn new(scope: Vec<String>, name: impl Into<String>, args: Vec<TemplateArg>) -> Self {
        Self {
            scope,
            name: name.into(),
            args,
        }
    }

    /// Scope segments followed by the name.
    pub fn path(&self) -> Vec<String> {
        let mut path = self.scope.clone();
        path.push(self.name.clone());
        path
    }

    /// Fully-qualified spelling without template arguments (`game::Player`).
    pub fn qualified_name(&self) -> String {
        self.path().join("::")
    }

    fn first_type_arg(&self) -> Option<&CppType> {
        match self.args.first() {
            Some(TemplateArg::Type(ty)) => Some(ty),
            _ => None,
        }
    }
}

impl CppType {
    /// Shorthand for an unscoped, non-template name.
    pub fn named(name: impl Into<String>) -> Self {
        CppType::Named(NamedType::new(Vec::new(), name, Vec::new()))
    }

    pub fn pointer(pointee: CppType) -> Self {
        CppType::Pointer(Box::new(pointee))
    }

    pub fn lvalue_ref(referent: CppType) -> Self {
        CppType::Reference(Box::new(referent), RefKind::LValue)
    }

    pub fn rvalue_ref(referent: CppType) -> Self {
        CppType::Reference(Box::new(referent), RefKind::RValue)
    }

    /// Wraps in cv-qualifiers, folding into an existing qualified wrapper.
    pub fn qualified(self, quals: Qualifiers) -> Self {
        if quals.is_empty() {
            return self;
        }
        match self {
            CppType::Qualified(inner, existing) => CppType::Qualified(inner, existing.merge(quals)),
            other => CppType::Qualified(Box::new(other), quals),
        }
    }

    pub fn as_named(&self) -> Option<&NamedType> {
        match self {
            CppType::Named(named) => Some(named),
            _ => None,
        }
    }
}

/// The outermost shape of a type, as seen by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape<'a> {
    Plain,
    /// Smart-pointer template; carries the wrapped type.
    SmartPointer(&'a CppType),
    /// Raw pointer; carries the pointee.
    Pointer(&'a CppType),
    /// Lvalue or rvalue reference; carries the referent.
    Reference(&'a CppType),
    /// cv-qualified type; carries the unqualified type.
    Qualified(&'a CppType),
}

pub fn classify(ty: &CppType) -> TypeShape<'_> {
    match ty {
        CppType::Named(named) if named.name.contains(SMART_POINTER_MARKER) => {
            match named.first_type_arg() {
                Some(inner) => TypeShape::SmartPointer(inner),
                None => TypeShape::Plain,
            }
        }
        CppType::Named(_) => TypeShape::Plain,
        CppType::Pointer(pointee) => TypeShape::Pointer(pointee),
        CppType::Reference(referent, _) => TypeShape::Reference(referent),
        CppType::Qualified(inner, _) => TypeShape::Qualified(inner),
    }
}

/// A normalized type: the identity used as a registry key.
///
/// Only [`normalize`] constructs one, so two equal `BoundType`s always
/// denote the same underlying class however it was spelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundType(CppType);

impl BoundType {
    pub fn as_type(&self) -> &CppType {
        &self.0
    }

    /// Raw spelling used when no friendly name is registered.
    pub fn spelling(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for BoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub fn normalize(ty: &CppType) -> BoundType {
    BoundType(reduce(ty))
}

fn reduce(ty: &CppType) -> CppType {
    match classify(ty) {
        TypeShape::SmartPointer(inner) | TypeShape::Reference(inner) | TypeShape::Qualified(inner) => {
            reduce(inner)
        }
        TypeShape::Pointer(pointee) => CppType::pointer(reduce(pointee)),
        TypeShape::Plain => canonicalize(ty),
    }
}

/// Canonical spelling without stripping anything: builtin names are
/// unified and template arguments are canonicalized recursively.
fn canonicalize(ty: &CppType) -> CppType {
    match ty {
        CppType::Named(named) => {
            let name = if named.scope.is_empty() {
                canonical_builtin(&named.name)
            } else {
                named.name.clone()
            };
            let args = named
                .args
                .iter()
                .map(|arg| match arg {
                    TemplateArg::Type(t) => TemplateArg::Type(canonicalize(t)),
                    TemplateArg::Value(v) => TemplateArg::Value(collapse_whitespace(v)),
                })
                .collect();
            CppType::Named(NamedType::new(named.scope.clone(), name, args))
        }
        CppType::Pointer(pointee) => CppType::pointer(canonicalize(pointee)),
        CppType::Reference(referent, kind) => CppType::Reference(Box::new(canonicalize(referent)), *kind),
        CppType::Qualified(inner, quals) => CppType::Qualified(Box::new(canonicalize(inner)), *quals),
    }
}

/// Maps equivalent spellings of builtin types onto one form.
fn canonical_builtin(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let is_builtin_word = |w: &&str| {
        matches!(
            *w,
            "signed" | "unsigned" | "short" | "long" | "int" | "char" | "double"
        )
    };
    if !words.iter().all(is_builtin_word) {
        return words.join(" ");
    }

    let unsigned = words.contains(&"unsigned");
    let longs = words.iter().filter(|w| **w == "long").count();
    let base = if words.contains(&"char") {
        "char"
    } else if words.contains(&"double") {
        "double"
    } else if words.contains(&"short") {
        "short"
    } else if longs >= 2 {
        "long long"
    } else if longs == 1 {
        "long"
    } else {
        "int"
    };

    match (base, unsigned) {
        // `signed char` is a distinct type from `char`.
        ("char", false) if words.contains(&"signed") => "signed char".to_string(),
        ("double", _) if longs > 0 => "long double".to_string(),
        ("double", _) => "double".to_string(),
        ("int", true) => "unsigned int".to_string(),
        (base, true) => format!("unsigned {}", base),
        (base, false) => base.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for CppType {
    /// Scope-suppressed spelling: `std::shared_ptr<game::Item>` prints as
    /// `shared_ptr<Item>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CppType::Named(named) => named.fmt(f),
            CppType::Pointer(pointee) => write!(f, "{}*", pointee),
            CppType::Reference(referent, RefKind::LValue) => write!(f, "{}&", referent),
            CppType::Reference(referent, RefKind::RValue) => write!(f, "{}&&", referent),
            CppType::Qualified(inner, quals) => {
                let mut words = Vec::new();
                if quals.is_const {
                    words.push("const");
                }
                if quals.is_volatile {
                    words.push("volatile");
                }
                match inner.as_ref() {
                    CppType::Named(_) => write!(f, "{} {}", words.join(" "), inner),
                    _ => write!(f, "{} {}", inner, words.join(" ")),
                }
            }
        }
    }
}

impl fmt::Display for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|arg| match arg {
                    TemplateArg::Type(t) => t.to_string(),
                    TemplateArg::Value(v) => v.clone(),
                })
                .collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}
