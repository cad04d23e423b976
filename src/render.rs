//! Report rendering.
//!
//! ```text
//! <ClassDisplayName>
//! \t<ReturnDisplay> <ExposedName>(<ParamDisplay> <ParamName>, ...)
//! ```
//!
//! Methods are sorted by exposed name (stable, so equal names keep their
//! registration order). Parameters whose resolved display contains the
//! context marker are left out.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::registry::{BoundClass, BoundMethod, Catalog};
use crate::resolver::NameResolver;

/// Default marker for the interpreter state parameter.
pub const DEFAULT_CONTEXT_MARKER: &str = "lua_State";

/// Order in which classes are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClassOrder {
    /// Order of first registration across the run.
    #[default]
    Registration,
    /// By display name; equal names keep registration order.
    Alphabetical,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub class_order: ClassOrder,
    /// Substring identifying implicit context parameters; empty disables
    /// elision.
    pub context_marker: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            class_order: ClassOrder::default(),
            context_marker: DEFAULT_CONTEXT_MARKER.to_string(),
        }
    }
}

/// Write the report for a finished catalog.
pub fn render<W: Write>(catalog: &Catalog, options: &RenderOptions, out: &mut W) -> io::Result<()> {
    let resolver = NameResolver::new(catalog);

    for class in ordered_classes(catalog, options.class_order) {
        writeln!(out, "{}", class.display_name())?;

        let mut methods: Vec<&BoundMethod> = class.methods().iter().collect();
        methods.sort_by(|a, b| a.exposed_name.cmp(&b.exposed_name));

        for method in methods {
            writeln!(out, "\t{}", signature(&resolver, method, &options.context_marker))?;
        }
    }
    Ok(())
}

/// Render into a string.
pub fn render_to_string(catalog: &Catalog, options: &RenderOptions) -> String {
    let mut buf = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = render(catalog, options, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn ordered_classes(catalog: &Catalog, order: ClassOrder) -> Vec<&BoundClass> {
    let mut classes: Vec<&BoundClass> = catalog.classes().collect();
    if order == ClassOrder::Alphabetical {
        classes.sort_by(|a, b| a.display_name().cmp(b.display_name()));
    }
    classes
}

/// `<return> <name>(<params>)` for one method.
pub fn signature(resolver: &NameResolver, method: &BoundMethod, context_marker: &str) -> String {
    let params: Vec<String> = method
        .params
        .iter()
        .filter_map(|param| {
            let display = resolver.display(&param.ty);
            if !context_marker.is_empty() && display.contains(context_marker) {
                return None;
            }
            Some(if param.name.is_empty() {
                display
            } else {
                format!("{} {}", display, param.name)
            })
        })
        .collect();

    format!(
        "{} {}({})",
        resolver.display(&method.return_type),
        method.exposed_name,
        params.join(", ")
    )
}
