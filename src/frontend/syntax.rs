//! Syntax helpers: lowering tree-sitter type syntax into [`CppType`] and
//! reading literals, qualified names and enclosing scopes.
//!
//! Lowering is purely syntactic; names are kept as written and resolved
//! later against the [`SourceIndex`](super::SourceIndex).

use tree_sitter::Node;

use super::TranslationUnit;
use crate::types::{CppType, NamedType, Qualifiers, TemplateArg};

/// Named children of a node, comments excluded.
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Peel redundant parentheses off an expression.
pub fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Result of walking a declarator.
pub struct Declared<'t> {
    /// Declared type; for functions, the return type.
    pub ty: CppType,
    pub name: Option<String>,
    /// Parameter list when the declarator names a function.
    pub parameters: Option<Node<'t>>,
    /// `-> T` of a function declarator, if present.
    pub trailing_return: Option<Node<'t>>,
}

/// Lowers the type of a declaration-like node (declaration, field or
/// parameter declaration, typedef): its `type` field plus any cv-qualifier
/// children.
pub fn declaration_base_type(unit: &TranslationUnit, node: Node) -> Option<CppType> {
    let specifier = node.child_by_field_name("type")?;
    let quals = qualifiers_of(unit, node);
    Some(lower_specifier(unit, specifier).qualified(quals))
}

/// Lowers a `type_descriptor` (template arguments, alias targets, casts).
pub fn lower_descriptor(unit: &TranslationUnit, node: Node) -> CppType {
    if node.kind() != "type_descriptor" {
        return lower_specifier(unit, node);
    }
    let base = match declaration_base_type(unit, node) {
        Some(ty) => ty,
        None => return CppType::named(collapse(unit.node_text(node))),
    };
    apply_declarator(unit, base, node.child_by_field_name("declarator")).ty
}

/// Applies a (possibly abstract) declarator to a base type, outermost
/// first, stopping at a function declarator.
pub fn apply_declarator<'t>(
    unit: &TranslationUnit,
    base: CppType,
    declarator: Option<Node<'t>>,
) -> Declared<'t> {
    let mut ty = base;
    let mut current = declarator;

    while let Some(node) = current {
        match node.kind() {
            "pointer_declarator" | "abstract_pointer_declarator" => {
                ty = CppType::pointer(ty).qualified(qualifiers_of(unit, node));
                current = inner_declarator(node);
            }
            "reference_declarator" | "abstract_reference_declarator" => {
                let rvalue = node
                    .child(0)
                    .map(|token| token.kind() == "&&")
                    .unwrap_or(false);
                ty = if rvalue {
                    CppType::rvalue_ref(ty)
                } else {
                    CppType::lvalue_ref(ty)
                };
                current = inner_declarator(node);
            }
            "function_declarator" => {
                let name = node
                    .child_by_field_name("declarator")
                    .and_then(|d| declarator_name(unit, d));
                let trailing_return = named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "trailing_return_type");
                return Declared {
                    ty,
                    name,
                    parameters: node.child_by_field_name("parameters"),
                    trailing_return,
                };
            }
            "array_declarator" => {
                ty = CppType::pointer(ty);
                current = node.child_by_field_name("declarator");
            }
            "parenthesized_declarator" => {
                current = named_children(node).into_iter().next();
            }
            "init_declarator" => {
                current = node.child_by_field_name("declarator");
            }
            _ => {
                return Declared {
                    ty,
                    name: declarator_name(unit, node),
                    parameters: None,
                    trailing_return: None,
                };
            }
        }
    }

    Declared {
        ty,
        name: None,
        parameters: None,
        trailing_return: None,
    }
}

/// Reference declarators carry their inner declarator without a field name.
fn inner_declarator(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("declarator").or_else(|| {
        named_children(node)
            .into_iter()
            .find(|c| c.kind() != "type_qualifier" && c.kind() != "ms_pointer_modifier")
    })
}

/// Name introduced by a terminal declarator.
fn declarator_name(unit: &TranslationUnit, node: Node) -> Option<String> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "operator_name" => {
            Some(unit.node_text(node).to_string())
        }
        "qualified_identifier" => node
            .child_by_field_name("name")
            .and_then(|name| declarator_name(unit, name)),
        "destructor_name" => Some(unit.node_text(node).to_string()),
        _ => None,
    }
}

/// cv-qualifiers that are direct children of a node.
fn qualifiers_of(unit: &TranslationUnit, node: Node) -> Qualifiers {
    let mut quals = Qualifiers::default();
    for child in named_children(node) {
        if child.kind() == "type_qualifier" {
            match unit.node_text(child) {
                "const" => quals.is_const = true,
                "volatile" => quals.is_volatile = true,
                _ => {}
            }
        }
    }
    quals
}

/// Lowers a type specifier node (the `type` field of a declaration).
pub fn lower_specifier(unit: &TranslationUnit, node: Node) -> CppType {
    match node.kind() {
        "primitive_type" | "sized_type_specifier" | "auto" | "placeholder_type_specifier" => {
            CppType::named(collapse(unit.node_text(node)))
        }
        "type_identifier" | "identifier" | "namespace_identifier" => {
            CppType::named(unit.node_text(node))
        }
        "type_descriptor" => lower_descriptor(unit, node),
        "qualified_identifier" | "template_type" | "template_function" => match named_type(unit, node) {
            Some(named) => CppType::Named(named),
            None => CppType::named(collapse(unit.node_text(node))),
        },
        "class_specifier" | "struct_specifier" | "union_specifier" | "enum_specifier" => {
            match node.child_by_field_name("name") {
                Some(name) => lower_specifier(unit, name),
                None => CppType::named(collapse(unit.node_text(node))),
            }
        }
        _ => CppType::named(collapse(unit.node_text(node))),
    }
}

/// Builds a [`NamedType`] from a possibly qualified, possibly templated
/// name (`a::b::C<T, 3>`).
pub fn named_type(unit: &TranslationUnit, node: Node) -> Option<NamedType> {
    let mut scope = Vec::new();
    let mut current = node;

    loop {
        match current.kind() {
            "qualified_identifier" => {
                if let Some(segment) = current.child_by_field_name("scope") {
                    scope.push(scope_segment(unit, segment));
                }
                current = current.child_by_field_name("name")?;
            }
            "template_type" | "template_function" => {
                let name = unit.node_text(current.child_by_field_name("name")?).to_string();
                let args = current
                    .child_by_field_name("arguments")
                    .map(|list| template_args(unit, list))
                    .unwrap_or_default();
                return Some(NamedType::new(scope, name, args));
            }
            "type_identifier" | "identifier" | "namespace_identifier" | "field_identifier" => {
                return Some(NamedType::new(scope, unit.node_text(current), Vec::new()));
            }
            _ => return None,
        }
    }
}

/// A scope segment; template scopes (`vector<int>::iterator`) keep their
/// written arguments.
fn scope_segment(unit: &TranslationUnit, node: Node) -> String {
    collapse(unit.node_text(node))
}

/// Lowers the children of a `template_argument_list`.
pub fn template_args(unit: &TranslationUnit, list: Node) -> Vec<TemplateArg> {
    named_children(list)
        .into_iter()
        .map(|arg| match arg.kind() {
            "type_descriptor" => TemplateArg::Type(lower_descriptor(unit, arg)),
            "identifier" | "qualified_identifier" | "template_function" => {
                TemplateArg::Type(lower_specifier(unit, arg))
            }
            _ => TemplateArg::Value(collapse(unit.node_text(arg))),
        })
        .collect()
}

/// If `node` names a template instantiation called `template` (optionally
/// namespace-qualified), returns its argument list.
pub fn template_instance<'t>(unit: &TranslationUnit, node: Node<'t>, template: &str) -> Option<Node<'t>> {
    let mut current = node;
    while current.kind() == "qualified_identifier" {
        current = current.child_by_field_name("name")?;
    }
    if !matches!(current.kind(), "template_function" | "template_type") {
        return None;
    }
    let name = current.child_by_field_name("name")?;
    if unit.node_text(name) != template {
        return None;
    }
    current.child_by_field_name("arguments")
}

/// Splits `a::b::c` into its segments; used for qualified member
/// references such as `&game::Player::GetName`.
pub fn qualified_path(unit: &TranslationUnit, node: Node) -> Option<Vec<String>> {
    match node.kind() {
        "qualified_identifier" => {
            let mut path = Vec::new();
            if let Some(scope) = node.child_by_field_name("scope") {
                path.push(scope_segment(unit, scope));
            }
            let mut rest = qualified_path(unit, node.child_by_field_name("name")?)?;
            path.append(&mut rest);
            Some(path)
        }
        "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" | "operator_name" => {
            Some(vec![unit.node_text(node).to_string()])
        }
        "template_function" | "template_type" => {
            let name = node.child_by_field_name("name")?;
            Some(vec![unit.node_text(name).to_string()])
        }
        _ => None,
    }
}

/// Value of a string literal expression, unescaped. Adjacent literals are
/// concatenated. Returns `None` for anything that is not a string literal.
pub fn string_literal(unit: &TranslationUnit, node: Node) -> Option<String> {
    match node.kind() {
        "string_literal" => {
            let text = unit.node_text(node);
            let start = text.find('"')?;
            let end = text.rfind('"')?;
            if end <= start {
                return None;
            }
            Some(unescape(&text[start + 1..end]))
        }
        "raw_string_literal" => {
            let text = unit.node_text(node);
            let open = text.find('(')?;
            let close = text.rfind(')')?;
            if close < open {
                return None;
            }
            Some(text[open + 1..close].to_string())
        }
        "concatenated_string" => {
            let mut value = String::new();
            for part in named_children(node) {
                value.push_str(&string_literal(unit, part)?);
            }
            Some(value)
        }
        _ => None,
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        let decoded = match escape {
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0C}',
            'v' => '\u{0B}',
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'x' => code_point(&mut chars, 16, usize::MAX, 0),
            'u' => code_point(&mut chars, 16, 4, 0),
            'U' => code_point(&mut chars, 16, 8, 0),
            digit @ '0'..='7' => code_point(&mut chars, 8, 2, digit.to_digit(8).unwrap_or(0)),
            other => other,
        };
        out.push(decoded);
    }
    out
}

/// Reads up to `max_digits` digits in `radix` after an escape and maps the
/// value to a char, U+FFFD when it is not a valid scalar value.
fn code_point(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    radix: u32,
    max_digits: usize,
    initial: u32,
) -> char {
    let mut value = initial;
    let mut taken = 0;
    while taken < max_digits {
        let Some(digit) = chars.peek().and_then(|c| c.to_digit(radix)) else {
            break;
        };
        value = value.saturating_mul(radix).saturating_add(digit);
        chars.next();
        taken += 1;
    }
    char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Namespaces and classes enclosing a node, outermost first. A function
/// defined out of line (`void game::Binder::Bind()`) contributes its
/// qualifier.
pub fn enclosing_scope(unit: &TranslationUnit, node: Node) -> Vec<String> {
    let mut reversed: Vec<Vec<String>> = Vec::new();
    let mut current = node.parent();

    while let Some(ancestor) = current {
        match ancestor.kind() {
            "namespace_definition" => {
                if let Some(name) = ancestor.child_by_field_name("name") {
                    reversed.push(split_scope(unit.node_text(name)));
                }
            }
            "class_specifier" | "struct_specifier" => {
                if let Some(name) = ancestor.child_by_field_name("name") {
                    reversed.push(vec![unit.node_text(name).to_string()]);
                }
            }
            "function_definition" => {
                let declarator = ancestor.child_by_field_name("declarator");
                let function = declarator.and_then(|d| find_function_declarator(d));
                if let Some(path) = function
                    .and_then(|f| f.child_by_field_name("declarator"))
                    .and_then(|d| qualified_path(unit, d))
                {
                    if path.len() > 1 {
                        reversed.push(path[..path.len() - 1].to_vec());
                    }
                }
            }
            _ => {}
        }
        current = ancestor.parent();
    }

    reversed.into_iter().rev().flatten().collect()
}

/// The function declarator inside pointer/reference declarator wrappers.
pub fn find_function_declarator(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "function_declarator" {
            return Some(n);
        }
        current = match n.kind() {
            "pointer_declarator" | "reference_declarator" | "parenthesized_declarator" => inner_declarator(n),
            _ => None,
        };
    }
    None
}

pub fn split_scope(text: &str) -> Vec<String> {
    text.split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
