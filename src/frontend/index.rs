//! Declaration index: classes, their member functions, and type aliases
//! collected from every parsed file, plus scoped name lookup over them.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use rayon::prelude::*;
use tree_sitter::Node;

use super::syntax::{
    apply_declarator, declaration_base_type, lower_descriptor, lower_specifier, named_children,
    split_scope,
};
use super::TranslationUnit;
use crate::types::{CppType, NamedType, TemplateArg};

/// Alias chains longer than this are treated as unresolvable.
const MAX_ALIAS_DEPTH: usize = 16;

/// Where a declaration was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    /// Empty when the parameter is unnamed.
    pub name: String,
    pub ty: CppType,
}

/// A member function declaration, types as written.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub return_type: CppType,
    pub params: Vec<ParamDecl>,
    pub is_static: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    /// Qualified path, outermost first.
    pub path: Vec<String>,
    /// Base class specifiers as written; resolved in the class's scope.
    pub bases: Vec<CppType>,
    pub methods: Vec<MethodDecl>,
    pub location: SourceLocation,
}

impl ClassDecl {
    pub fn qualified_name(&self) -> String {
        self.path.join("::")
    }

    /// Scope in which the class's member types are looked up.
    pub fn scope(&self) -> &[String] {
        &self.path
    }

    /// First declared method with this name.
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct AliasDecl {
    pub target: CppType,
    /// Scope the target was written in.
    pub scope: Vec<String>,
}

enum Symbol<'a> {
    Class(&'a ClassDecl),
    Alias(&'a AliasDecl),
}

/// Declarations from all files of a run, keyed by qualified name.
#[derive(Debug, Default)]
pub struct SourceIndex {
    classes: IndexMap<String, ClassDecl>,
    aliases: IndexMap<String, AliasDecl>,
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index units in parallel and merge in the given order; the first
    /// definition of a class or alias wins.
    pub fn build<'u, I>(units: I) -> Self
    where
        I: IntoIterator<Item = &'u TranslationUnit>,
    {
        let units: Vec<&TranslationUnit> = units.into_iter().collect();
        let fragments: Vec<SourceIndex> = units.par_iter().map(|unit| Self::from_unit(unit)).collect();

        let mut index = SourceIndex::new();
        for fragment in fragments {
            index.merge(fragment);
        }
        tracing::debug!(
            classes = index.classes.len(),
            aliases = index.aliases.len(),
            "built declaration index"
        );
        index
    }

    /// Index a single unit.
    pub fn from_unit(unit: &TranslationUnit) -> Self {
        let mut index = SourceIndex::new();
        let mut scope = Vec::new();
        index.walk(unit, unit.root(), &mut scope);
        index
    }

    pub fn merge(&mut self, other: SourceIndex) {
        for (key, class) in other.classes {
            self.classes.entry(key).or_insert(class);
        }
        for (key, alias) in other.aliases {
            self.aliases.entry(key).or_insert(alias);
        }
    }

    pub fn class(&self, qualified_name: &str) -> Option<&ClassDecl> {
        self.classes.get(qualified_name)
    }

    fn walk(&mut self, unit: &TranslationUnit, node: Node, scope: &mut Vec<String>) {
        match node.kind() {
            "translation_unit" | "declaration_list" | "preproc_if" | "preproc_ifdef" | "preproc_else"
            | "preproc_elif" | "preproc_elifdef" | "linkage_specification" | "template_declaration" => {
                for child in named_children(node) {
                    self.walk(unit, child, scope);
                }
            }
            "namespace_definition" => {
                let pushed = match node.child_by_field_name("name") {
                    Some(name) => {
                        let segments = split_scope(unit.node_text(name));
                        let count = segments.len();
                        scope.extend(segments);
                        count
                    }
                    None => 0,
                };
                if let Some(body) = node.child_by_field_name("body") {
                    self.walk(unit, body, scope);
                }
                scope.truncate(scope.len() - pushed);
            }
            "class_specifier" | "struct_specifier" => self.index_class(unit, node, scope),
            "declaration" | "field_declaration" => {
                if let Some(specifier) = node.child_by_field_name("type") {
                    if matches!(specifier.kind(), "class_specifier" | "struct_specifier") {
                        self.index_class(unit, specifier, scope);
                    }
                }
            }
            "type_definition" => self.index_typedef(unit, node, scope),
            "alias_declaration" => self.index_alias(unit, node, scope),
            _ => {}
        }
    }

    fn index_class(&mut self, unit: &TranslationUnit, node: Node, scope: &mut Vec<String>) {
        let (Some(name), Some(body)) = (node.child_by_field_name("name"), node.child_by_field_name("body"))
        else {
            return;
        };
        // Explicit specializations (`class Foo<int>`) are not indexed.
        if name.kind() != "type_identifier" {
            return;
        }

        scope.push(unit.node_text(name).to_string());
        let mut class = ClassDecl {
            path: scope.clone(),
            bases: base_classes(unit, node),
            methods: Vec::new(),
            location: SourceLocation {
                file: unit.path().to_path_buf(),
                line: unit.line(node),
            },
        };

        for member in named_children(body) {
            self.index_member(unit, member, scope, &mut class);
        }

        let key = class.qualified_name();
        tracing::trace!(class = %key, methods = class.methods.len(), "indexed class");
        self.classes.entry(key).or_insert(class);
        scope.pop();
    }

    fn index_member(
        &mut self,
        unit: &TranslationUnit,
        member: Node,
        scope: &mut Vec<String>,
        class: &mut ClassDecl,
    ) {
        match member.kind() {
            "field_declaration" | "function_definition" | "declaration" => {
                if let Some(specifier) = member.child_by_field_name("type") {
                    if matches!(specifier.kind(), "class_specifier" | "struct_specifier") {
                        self.index_class(unit, specifier, scope);
                    }
                }
                if let Some(method) = method_decl(unit, member) {
                    class.methods.push(method);
                }
            }
            "class_specifier" | "struct_specifier" => self.index_class(unit, member, scope),
            "type_definition" => self.index_typedef(unit, member, scope),
            "alias_declaration" => self.index_alias(unit, member, scope),
            "preproc_if" | "preproc_ifdef" | "preproc_else" | "preproc_elif" => {
                for child in named_children(member) {
                    self.index_member(unit, child, scope, class);
                }
            }
            _ => {}
        }
    }

    fn index_typedef(&mut self, unit: &TranslationUnit, node: Node, scope: &[String]) {
        let Some(base) = declaration_base_type(unit, node) else {
            return;
        };
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            let declared = apply_declarator(unit, base.clone(), Some(declarator));
            if declared.parameters.is_some() {
                continue;
            }
            if let Some(name) = declared.name {
                self.insert_alias(scope, name, declared.ty);
            }
        }
    }

    fn index_alias(&mut self, unit: &TranslationUnit, node: Node, scope: &[String]) {
        let (Some(name), Some(target)) = (node.child_by_field_name("name"), node.child_by_field_name("type"))
        else {
            return;
        };
        let target = lower_descriptor(unit, target);
        self.insert_alias(scope, unit.node_text(name).to_string(), target);
    }

    fn insert_alias(&mut self, scope: &[String], name: String, target: CppType) {
        let mut path = scope.to_vec();
        path.push(name);
        self.aliases.entry(path.join("::")).or_insert(AliasDecl {
            target,
            scope: scope.to_vec(),
        });
    }

    fn lookup(&self, path: &[String], scope: &[String]) -> Option<Symbol<'_>> {
        if path.is_empty() {
            return None;
        }
        let written = path.join("::");

        for depth in (0..=scope.len()).rev() {
            let key = if depth == 0 {
                written.clone()
            } else {
                format!("{}::{}", scope[..depth].join("::"), written)
            };
            if let Some(class) = self.classes.get(&key) {
                return Some(Symbol::Class(class));
            }
            if let Some(alias) = self.aliases.get(&key) {
                return Some(Symbol::Alias(alias));
            }
        }

        // Names made visible by using-directives: accept a unique suffix match.
        let suffix = format!("::{}", written);
        let classes: Vec<&ClassDecl> = self
            .classes
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .map(|(_, class)| class)
            .take(2)
            .collect();
        let aliases: Vec<&AliasDecl> = self
            .aliases
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .map(|(_, alias)| alias)
            .take(2)
            .collect();
        match (classes.as_slice(), aliases.as_slice()) {
            ([class], []) => Some(Symbol::Class(class)),
            ([], [alias]) => Some(Symbol::Alias(alias)),
            _ => None,
        }
    }

    /// Resolves a written class name to its declaration, following aliases.
    pub fn resolve_class(&self, path: &[String], scope: &[String]) -> Option<&ClassDecl> {
        match self.lookup(path, scope)? {
            Symbol::Class(class) => Some(class),
            Symbol::Alias(_) => {
                let named = NamedType::new(path[..path.len() - 1].to_vec(), path[path.len() - 1].clone(), Vec::new());
                match self.resolve_type(&CppType::Named(named), scope) {
                    CppType::Named(resolved) => self.classes.get(&resolved.qualified_name()),
                    _ => None,
                }
            }
        }
    }

    /// Expands aliases and qualifies class names throughout a type. Names
    /// the index does not know (builtins, library types) stay as written.
    pub fn resolve_type(&self, ty: &CppType, scope: &[String]) -> CppType {
        self.resolve_depth(ty, scope, 0)
    }

    fn resolve_depth(&self, ty: &CppType, scope: &[String], depth: usize) -> CppType {
        match ty {
            CppType::Named(named) => {
                let args: Vec<TemplateArg> = named
                    .args
                    .iter()
                    .map(|arg| match arg {
                        TemplateArg::Type(t) => TemplateArg::Type(self.resolve_depth(t, scope, depth)),
                        TemplateArg::Value(v) => TemplateArg::Value(v.clone()),
                    })
                    .collect();

                match self.lookup(&named.path(), scope) {
                    Some(Symbol::Class(class)) => {
                        let mut path = class.path.clone();
                        let name = path.pop().unwrap_or_default();
                        CppType::Named(NamedType::new(path, name, args))
                    }
                    Some(Symbol::Alias(alias)) if args.is_empty() && depth < MAX_ALIAS_DEPTH => {
                        self.resolve_depth(&alias.target, &alias.scope, depth + 1)
                    }
                    _ => CppType::Named(NamedType::new(named.scope.clone(), named.name.clone(), args)),
                }
            }
            CppType::Pointer(pointee) => CppType::pointer(self.resolve_depth(pointee, scope, depth)),
            CppType::Reference(referent, kind) => {
                CppType::Reference(Box::new(self.resolve_depth(referent, scope, depth)), *kind)
            }
            CppType::Qualified(inner, quals) => self.resolve_depth(inner, scope, depth).qualified(*quals),
        }
    }

    /// Finds `method` on `class` or, failing that, on its bases
    /// (depth-first, declaration order). Returns the declaring class too.
    pub fn find_method<'a>(&'a self, class: &'a ClassDecl, method: &str) -> Option<(&'a ClassDecl, &'a MethodDecl)> {
        let mut visited = HashSet::new();
        self.find_method_in(class, method, &mut visited)
    }

    fn find_method_in<'a>(
        &'a self,
        class: &'a ClassDecl,
        method: &str,
        visited: &mut HashSet<String>,
    ) -> Option<(&'a ClassDecl, &'a MethodDecl)> {
        if !visited.insert(class.qualified_name()) {
            return None;
        }
        if let Some(found) = class.method(method) {
            return Some((class, found));
        }
        // Bases are looked up from the scope enclosing the class.
        let outer = &class.path[..class.path.len().saturating_sub(1)];
        for base in &class.bases {
            let Some(named) = base.as_named() else {
                continue;
            };
            if let Some(base_class) = self.resolve_class(&named.path(), outer) {
                if let Some(found) = self.find_method_in(base_class, method, visited) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Base class specifiers of a class (`: public Base, private ns::Other`).
fn base_classes(unit: &TranslationUnit, class: Node) -> Vec<CppType> {
    let Some(clause) = named_children(class)
        .into_iter()
        .find(|c| c.kind() == "base_class_clause")
    else {
        return Vec::new();
    };
    named_children(clause)
        .into_iter()
        .filter(|c| matches!(c.kind(), "type_identifier" | "qualified_identifier" | "template_type"))
        .map(|c| lower_specifier(unit, c))
        .collect()
}

/// A member function from a class-body declaration or inline definition.
/// Constructors, destructors and data members yield `None`.
fn method_decl(unit: &TranslationUnit, member: Node) -> Option<MethodDecl> {
    let base = declaration_base_type(unit, member)?;
    let declared = apply_declarator(unit, base, member.child_by_field_name("declarator"));
    let parameters = declared.parameters?;
    let name = declared.name?;
    if name.starts_with('~') {
        return None;
    }

    let return_type = match declared.trailing_return {
        Some(trailing) => named_children(trailing)
            .into_iter()
            .next()
            .map(|descriptor| lower_descriptor(unit, descriptor))
            .unwrap_or(declared.ty),
        None => declared.ty,
    };

    let is_static = named_children(member)
        .into_iter()
        .any(|c| c.kind() == "storage_class_specifier" && unit.node_text(c) == "static");

    Some(MethodDecl {
        name,
        return_type,
        params: parameters_of(unit, parameters),
        is_static,
        location: SourceLocation {
            file: unit.path().to_path_buf(),
            line: unit.line(member),
        },
    })
}

fn parameters_of(unit: &TranslationUnit, list: Node) -> Vec<ParamDecl> {
    let mut params = Vec::new();
    for param in named_children(list) {
        if !matches!(param.kind(), "parameter_declaration" | "optional_parameter_declaration") {
            continue;
        }
        let Some(base) = declaration_base_type(unit, param) else {
            continue;
        };
        let declared = apply_declarator(unit, base, param.child_by_field_name("declarator"));
        params.push(ParamDecl {
            name: declared.name.unwrap_or_default(),
            ty: declared.ty,
        });
    }

    // `f(void)` declares no parameters.
    if params.len() == 1 && params[0].name.is_empty() && params[0].ty == CppType::named("void") {
        params.clear();
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(src: &str) -> SourceIndex {
        let unit = TranslationUnit::parse("test.h", src).unwrap();
        SourceIndex::from_unit(&unit)
    }

    #[test]
    fn test_indexes_methods_with_parameters() {
        let index = index_of(
            r#"
namespace game {
class Player {
public:
    Player();
    ~Player();
    std::string GetName(lua_State* L, bool verbose) const;
    void SetLevel(int level) { level_ = level; }
    static Player* Create(void);
private:
    int level_;
};
}
"#,
        );

        let player = index.class("game::Player").expect("Player should be indexed");
        let names: Vec<&str> = player.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["GetName", "SetLevel", "Create"]);

        assert_eq!(player.location.to_string(), "test.h:3");

        let get_name = player.method("GetName").unwrap();
        assert_eq!(get_name.location.to_string(), "test.h:7");
        assert!(!get_name.is_static);
        assert_eq!(get_name.params.len(), 2);
        assert_eq!(get_name.params[0].name, "L");
        assert_eq!(get_name.params[1].name, "verbose");
        assert_eq!(get_name.return_type.to_string(), "string");

        let create = player.method("Create").unwrap();
        assert!(create.is_static);
        assert!(create.params.is_empty());
        assert_eq!(create.return_type, CppType::pointer(CppType::named("Player")));
    }

    #[test]
    fn test_resolves_aliases_in_scope() {
        let index = index_of(
            r#"
namespace game {
class Item {};
typedef std::shared_ptr<Item> ItemPtr;
using ItemRef = const ItemPtr&;
}
"#,
        );

        let written = CppType::named("ItemRef");
        let resolved = index.resolve_type(&written, &["game".to_string()]);
        assert_eq!(resolved.to_string(), "const shared_ptr<Item>&");

        let item = match resolved {
            CppType::Reference(inner, _) => match *inner {
                CppType::Qualified(inner, _) => inner,
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        };
        let pointee = match &item.as_named().unwrap().args[0] {
            TemplateArg::Type(CppType::Named(named)) => named.qualified_name(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(pointee, "game::Item");
    }

    #[test]
    fn test_unknown_names_stay_as_written() {
        let index = index_of("class A {};");
        let ty = CppType::Named(NamedType::new(vec!["std".into()], "string", vec![]));
        assert_eq!(index.resolve_type(&ty, &[]), ty);
    }

    #[test]
    fn test_unique_suffix_match() {
        let index = index_of("namespace game { class Item {}; }");
        let resolved = index.resolve_type(&CppType::named("Item"), &[]);
        assert_eq!(resolved.as_named().unwrap().qualified_name(), "game::Item");
    }

    #[test]
    fn test_ambiguous_suffix_stays_unresolved() {
        let index = index_of("namespace a { class Item {}; } namespace b { class Item {}; }");
        let resolved = index.resolve_type(&CppType::named("Item"), &[]);
        assert_eq!(resolved, CppType::named("Item"));
    }

    #[test]
    fn test_alias_cycle_terminates() {
        let index = index_of("typedef B A; typedef A B;");
        let resolved = index.resolve_type(&CppType::named("A"), &[]);
        assert!(resolved.as_named().is_some());
    }

    #[test]
    fn test_find_method_through_base() {
        let index = index_of(
            r#"
class Entity { public: int GetId() const; };
class Player : public Entity { public: void Jump(); };
"#,
        );

        let player = index.class("Player").unwrap();
        let (owner, method) = index.find_method(player, "GetId").unwrap();
        assert_eq!(owner.qualified_name(), "Entity");
        assert_eq!(method.name, "GetId");
        assert!(index.find_method(player, "Missing").is_none());
    }

    #[test]
    fn test_nested_classes_are_qualified() {
        let index = index_of("struct Outer { struct Inner { void Go(); }; };");
        assert!(index.class("Outer::Inner").is_some());
    }

    #[test]
    fn test_first_definition_wins_on_merge() {
        let mut first = index_of("class A { void One(); };");
        let second = index_of("class A { void Two(); };");
        first.merge(second);
        assert!(first.class("A").unwrap().method("One").is_some());
        assert!(first.class("A").unwrap().method("Two").is_none());
    }
}
