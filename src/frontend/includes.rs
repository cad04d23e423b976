//! `#include` discovery and resolution.

use std::path::{Path, PathBuf};

use streaming_iterator::StreamingIterator;
use tree_sitter::{Query, QueryCursor};

use super::{cpp_language, FrontendError, TranslationUnit};

const INCLUDE_QUERY: &str = r#"
(preproc_include path: (_) @path)
"#;

/// One `#include` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub target: String,
    /// `<...>` form: searched in include directories only.
    pub system: bool,
    pub line: usize,
}

/// Extracts include directives with tree-sitter.
pub struct IncludeScanner {
    query: Query,
}

impl IncludeScanner {
    pub fn new() -> Result<Self, FrontendError> {
        Ok(Self {
            query: Query::new(&cpp_language(), INCLUDE_QUERY)?,
        })
    }

    pub fn scan(&self, unit: &TranslationUnit) -> Vec<Include> {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, unit.root(), unit.source());

        let mut includes = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                let include = match node.kind() {
                    "system_lib_string" => {
                        let text = unit.node_text(node);
                        Some(Include {
                            target: text.trim_start_matches('<').trim_end_matches('>').to_string(),
                            system: true,
                            line: unit.line(node),
                        })
                    }
                    // Header names are not string literals: backslashes
                    // are kept as written.
                    "string_literal" => quoted_target(unit.node_text(node)).map(|target| Include {
                        target: target.to_string(),
                        system: false,
                        line: unit.line(node),
                    }),
                    _ => None,
                };
                // Macro includes (`#include HEADER`) cannot be resolved here.
                if let Some(include) = include {
                    includes.push(include);
                }
            }
        }
        includes
    }
}

fn quoted_target(text: &str) -> Option<&str> {
    text.strip_prefix('"')?.strip_suffix('"')
}

/// Resolves an include against the including file's directory (quoted form
/// only) and then the include directories, in order.
pub fn resolve(include: &Include, including_file: &Path, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    let local = if include.system {
        None
    } else {
        including_file
            .parent()
            .map(|dir| dir.join(&include.target))
    };

    local
        .into_iter()
        .chain(include_dirs.iter().map(|dir| dir.join(&include.target)))
        .find(|candidate| candidate.is_file())
}
