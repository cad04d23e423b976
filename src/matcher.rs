//! Binding pattern matcher.
//!
//! Recognizes `class_<T>("Name").def("exposed", &C::method)` in a
//! translation unit. A `def` call matches when all of these hold:
//!
//! - the receiver's static type is a `class_` instantiation (a construction
//!   expression, a member call chained on one, or a local `class_<T>`
//!   variable),
//! - argument 0 is a string literal: the exposed name,
//! - argument 1 is `&C::m` and `m` resolves to a member function
//!   declaration of `C` or one of its bases.
//!
//! Anything else is silently skipped. The bound class is the `T` of the
//! `class_` instantiation, not the class that declares the method.

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

use crate::frontend::syntax::{
    enclosing_scope, lower_descriptor, lower_specifier, named_children, qualified_path, string_literal,
    strip_parens, template_instance,
};
use crate::frontend::{cpp_language, FrontendError, SourceIndex, SourceLocation, TranslationUnit};
use crate::registry::{BoundMethod, BoundParam};
use crate::types::{normalize, BoundType, CppType};

/// Name of the registration builder template.
pub const CLASS_TEMPLATE: &str = "class_";

/// Member of the builder that binds a method.
pub const DEF_METHOD: &str = "def";

/// Member calls named `def`; the remaining conditions are checked in code.
const DEF_CALL_QUERY: &str = r#"
((call_expression
   function: (field_expression
     field: (field_identifier) @member)
   arguments: (argument_list)) @call
 (#eq? @member "def"))
"#;

/// One recognized registration, types resolved but not yet normalized.
#[derive(Debug, Clone)]
pub struct RawBinding {
    pub exposed_name: String,
    /// `T` of the enclosing `class_<T>`.
    pub class_type: CppType,
    /// Display-name literal of the `class_` construction, when found.
    pub class_display: Option<String>,
    pub method: ResolvedMethod,
    pub location: SourceLocation,
}

/// The bound method declaration with types resolved in its class scope.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    /// C++ name, which may differ from the exposed name.
    pub cpp_name: String,
    /// Qualified name of the declaring class (may be a base of `T`).
    pub declaring_class: String,
    pub return_type: CppType,
    pub params: Vec<(String, CppType)>,
}

impl RawBinding {
    /// Normalizes every type, producing the registry key for the class and
    /// the method entry.
    pub fn normalize(self) -> (BoundType, Option<String>, BoundMethod) {
        let class = normalize(&self.class_type);
        let method = BoundMethod {
            exposed_name: self.exposed_name,
            cpp_name: self.method.cpp_name,
            return_type: normalize(&self.method.return_type),
            params: self
                .method
                .params
                .iter()
                .map(|(name, ty)| BoundParam {
                    name: name.clone(),
                    ty: normalize(ty),
                })
                .collect(),
            location: self.location,
        };
        (class, self.class_display, method)
    }
}

/// The `class_<T>` a `def` receiver refers to.
struct ClassSite<'t> {
    template_args: Node<'t>,
    display: Option<String>,
}

pub struct BindingMatcher<'w> {
    index: &'w SourceIndex,
    query: Query,
    call_capture: u32,
}

impl<'w> BindingMatcher<'w> {
    pub fn new(index: &'w SourceIndex) -> Result<Self, FrontendError> {
        let query = Query::new(&cpp_language(), DEF_CALL_QUERY)?;
        let call_capture = query
            .capture_index_for_name("call")
            .unwrap_or_default();
        Ok(Self {
            index,
            query,
            call_capture,
        })
    }

    /// Bindings in `unit`, in source order. Candidate `def` calls are found
    /// up front; recognizing each one happens lazily.
    pub fn matches<'a>(&'a self, unit: &'a TranslationUnit) -> impl Iterator<Item = RawBinding> + 'a {
        let mut candidates = Vec::new();
        {
            let mut cursor = QueryCursor::new();
            let mut matches = cursor.matches(&self.query, unit.root(), unit.source());
            while let Some(m) = matches.next() {
                for capture in m.captures {
                    if capture.index == self.call_capture {
                        candidates.push(capture.node);
                    }
                }
            }
        }
        // Chained calls share a start byte; the inner `.def` ends first.
        candidates.sort_by_key(|node| (node.end_byte(), node.start_byte()));

        candidates
            .into_iter()
            .filter_map(move |call| self.recognize(unit, call))
    }

    /// Check one `x.def(...)` call against the binding shape.
    pub fn recognize(&self, unit: &TranslationUnit, call: Node) -> Option<RawBinding> {
        let function = call.child_by_field_name("function")?;
        let field = function.child_by_field_name("field")?;
        if unit.node_text(field) != DEF_METHOD {
            return None;
        }

        let line = unit.line(field);
        let reject = |reason: &str| {
            tracing::trace!(file = %unit.path().display(), line, reason, "def call skipped");
        };

        let Some(site) = function
            .child_by_field_name("argument")
            .and_then(|receiver| self.class_site(unit, receiver))
        else {
            reject("receiver is not a class_ instantiation");
            return None;
        };

        let args = named_children(call.child_by_field_name("arguments")?);
        let Some(exposed_name) = args.first().and_then(|arg| string_literal(unit, strip_parens(*arg))) else {
            reject("first argument is not a string literal");
            return None;
        };
        let Some(member_path) = args.get(1).and_then(|arg| member_pointer(unit, *arg)) else {
            reject("second argument is not &Class::method");
            return None;
        };

        let scope = enclosing_scope(unit, call);
        let (owner_path, method_name) = member_path.split_at(member_path.len() - 1);
        let Some(owner) = self.index.resolve_class(owner_path, &scope) else {
            reject("member pointer names an unknown class");
            return None;
        };
        let Some((declaring, method)) = self.index.find_method(owner, &method_name[0]) else {
            tracing::trace!(
                file = %unit.path().display(),
                line,
                class = %owner.qualified_name(),
                class_at = %owner.location,
                method = %method_name[0],
                "def call skipped: member pointer names an unknown method"
            );
            return None;
        };

        let class_type = named_children(site.template_args)
            .first()
            .map(|arg| self.index.resolve_type(&lower_template_arg(unit, *arg), &scope))?;

        let method_scope = declaring.scope();
        let resolved = ResolvedMethod {
            cpp_name: method.name.clone(),
            declaring_class: declaring.qualified_name(),
            return_type: self.index.resolve_type(&method.return_type, method_scope),
            params: method
                .params
                .iter()
                .map(|p| (p.name.clone(), self.index.resolve_type(&p.ty, method_scope)))
                .collect(),
        };

        tracing::debug!(
            file = %unit.path().display(),
            line,
            exposed = %exposed_name,
            method = %format!("{}::{}", resolved.declaring_class, resolved.cpp_name),
            declared_at = %method.location,
            is_static = method.is_static,
            "matched binding"
        );

        Some(RawBinding {
            exposed_name,
            class_type,
            class_display: site.display,
            method: resolved,
            location: SourceLocation {
                file: unit.path().to_path_buf(),
                line,
            },
        })
    }

    /// Walks a receiver expression back to the `class_<T>` it refers to.
    fn class_site<'t>(&self, unit: &TranslationUnit, receiver: Node<'t>) -> Option<ClassSite<'t>> {
        let receiver = strip_parens(receiver);
        match receiver.kind() {
            "call_expression" => {
                let function = receiver.child_by_field_name("function")?;
                if let Some(template_args) = template_instance(unit, function, CLASS_TEMPLATE) {
                    return Some(ClassSite {
                        template_args,
                        display: first_string_argument(unit, receiver.child_by_field_name("arguments")),
                    });
                }
                // Builder members return the builder, so chained calls keep
                // the receiver's type.
                if function.kind() == "field_expression" {
                    return self.class_site(unit, function.child_by_field_name("argument")?);
                }
                None
            }
            "identifier" => variable_site(unit, receiver),
            _ => None,
        }
    }
}

/// `&C::m` as a path (`["C", "m"]`); `None` for anything else.
fn member_pointer(unit: &TranslationUnit, node: Node) -> Option<Vec<String>> {
    let node = strip_parens(node);
    if node.kind() != "pointer_expression" {
        return None;
    }
    let operator = node.child_by_field_name("operator")?;
    if unit.node_text(operator) != "&" {
        return None;
    }
    let target = node.child_by_field_name("argument")?;
    if target.kind() != "qualified_identifier" {
        return None;
    }
    let path = qualified_path(unit, target)?;
    (path.len() >= 2).then_some(path)
}

fn lower_template_arg(unit: &TranslationUnit, arg: Node) -> CppType {
    match arg.kind() {
        "type_descriptor" => lower_descriptor(unit, arg),
        _ => lower_specifier(unit, arg),
    }
}

/// First string literal among construction arguments (`("Player")` or
/// `{"Player"}`).
fn first_string_argument(unit: &TranslationUnit, arguments: Option<Node>) -> Option<String> {
    named_children(arguments?)
        .into_iter()
        .find_map(|arg| string_literal(unit, strip_parens(arg)))
}

/// Finds the nearest preceding `class_<T> name(...)` declaration of the
/// identifier in an enclosing block.
fn variable_site<'t>(unit: &TranslationUnit, ident: Node<'t>) -> Option<ClassSite<'t>> {
    let name = unit.node_text(ident);
    let mut current = ident.parent();

    while let Some(block) = current {
        let preceding = named_children(block)
            .into_iter()
            .filter(|child| child.end_byte() <= ident.start_byte())
            .filter(|child| child.kind() == "declaration");
        let mut found = None;
        for declaration in preceding {
            if let Some(site) = declared_class_site(unit, declaration, name) {
                found = Some(site);
            }
        }
        if found.is_some() {
            return found;
        }
        current = block.parent();
    }
    None
}

fn declared_class_site<'t>(unit: &TranslationUnit, declaration: Node<'t>, name: &str) -> Option<ClassSite<'t>> {
    let template_args = template_instance(unit, declaration.child_by_field_name("type")?, CLASS_TEMPLATE)?;

    let mut cursor = declaration.walk();
    let declarators: Vec<Node> = declaration
        .children_by_field_name("declarator", &mut cursor)
        .collect();
    for declarator in declarators {
        match declarator.kind() {
            "identifier" if unit.node_text(declarator) == name => {
                return Some(ClassSite {
                    template_args,
                    display: None,
                });
            }
            "init_declarator" => {
                let declared = declarator.child_by_field_name("declarator")?;
                if unit.node_text(declared) != name {
                    continue;
                }
                let value = declarator.child_by_field_name("value").map(strip_parens);
                let display = match value {
                    Some(v) if matches!(v.kind(), "argument_list" | "initializer_list") => {
                        first_string_argument(unit, Some(v))
                    }
                    Some(v) if v.kind() == "call_expression" => construction_literal(unit, v),
                    Some(v) => string_literal(unit, v),
                    None => None,
                };
                return Some(ClassSite {
                    template_args,
                    display,
                });
            }
            _ => {}
        }
    }
    None
}

/// Literal of a `class_<T>("Name")` construction used as an initializer,
/// looking through builder calls chained on it.
fn construction_literal(unit: &TranslationUnit, call: Node) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    if template_instance(unit, function, CLASS_TEMPLATE).is_some() {
        return first_string_argument(unit, call.child_by_field_name("arguments"));
    }
    if function.kind() != "field_expression" {
        return None;
    }
    let receiver = strip_parens(function.child_by_field_name("argument")?);
    if receiver.kind() != "call_expression" {
        return None;
    }
    construction_literal(unit, receiver)
}
