//! Source analysis front end.
//!
//! Turns a set of C++ source files into parsed translation units plus a
//! declaration index the binding matcher can query:
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ SourceFiles  │────▶│ parse (parallel) │────▶│ TranslationUnit │
//! │ (+ -I dirs)  │     │ follow #includes │     │  main + headers │
//! └──────────────┘     └──────────────────┘     └─────────────────┘
//!                                                        │
//!                                                        ▼
//!                                               ┌─────────────────┐
//!                                               │  SourceIndex    │
//!                                               │ classes/aliases │
//!                                               └─────────────────┘
//! ```
//!
//! Main units and headers both contribute declarations and are both
//! searched for bindings; a header is parsed once however often it is
//! included.

mod compile_db;
mod includes;
mod index;
pub mod syntax;
mod unit;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

pub use compile_db::{CompileDatabase, SourceFile, COMPILE_DB_FILE};
pub use includes::{resolve as resolve_include, Include, IncludeScanner};
pub use index::{AliasDecl, ClassDecl, MethodDecl, ParamDecl, SourceIndex, SourceLocation};
pub use unit::{cpp_language, TranslationUnit};

/// Errors raised while loading sources.
#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse { path: PathBuf },
    #[error("C++ grammar unavailable: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("invalid tree-sitter query: {0}")]
    Query(#[from] tree_sitter::QueryError),
    #[error("no compilation database at {path}")]
    MissingCompileDatabase { path: PathBuf },
    #[error("malformed compilation database {path}: {source}")]
    CompileDatabase {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads sources and builds the declaration index.
#[derive(Debug, Clone)]
pub struct Frontend {
    follow_includes: bool,
}

impl Default for Frontend {
    fn default() -> Self {
        Self {
            follow_includes: true,
        }
    }
}

impl Frontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether `#include` directives are followed.
    pub fn follow_includes(mut self, follow: bool) -> Self {
        self.follow_includes = follow;
        self
    }

    /// Parse every source (each file once), transitively parse the headers
    /// they include, and index all of it.
    pub fn load(&self, sources: &[SourceFile]) -> Result<Workspace, FrontendError> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for source in sources {
            if seen.insert(canonical(&source.path)) {
                unique.push(source);
            } else {
                tracing::debug!(path = %source.path.display(), "skipping duplicate input");
            }
        }

        let units = unique
            .par_iter()
            .map(|source| TranslationUnit::load(&source.path))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(units = units.len(), "parsed translation units");

        let headers = if self.follow_includes {
            let roots: Vec<(&TranslationUnit, Arc<Vec<PathBuf>>)> = units
                .iter()
                .zip(&unique)
                .map(|(unit, source)| (unit, Arc::new(source.include_dirs.clone())))
                .collect();
            load_headers(&roots, &mut seen)?
        } else {
            Vec::new()
        };
        tracing::debug!(headers = headers.len(), "parsed included headers");

        let index = SourceIndex::build(units.iter().chain(headers.iter()));
        Ok(Workspace {
            units,
            headers,
            index,
        })
    }
}

/// Breadth-first include following; each wave is parsed in parallel.
fn load_headers(
    roots: &[(&TranslationUnit, Arc<Vec<PathBuf>>)],
    seen: &mut HashSet<PathBuf>,
) -> Result<Vec<TranslationUnit>, FrontendError> {
    let scanner = IncludeScanner::new()?;
    let mut headers: Vec<TranslationUnit> = Vec::new();

    let mut frontier = discover(&scanner, roots.iter().map(|(u, d)| (*u, d.clone())), seen);
    while !frontier.is_empty() {
        let wave = frontier
            .par_iter()
            .map(|(path, _)| TranslationUnit::load(path))
            .collect::<Result<Vec<_>, _>>()?;
        let parents: Vec<(&TranslationUnit, Arc<Vec<PathBuf>>)> = wave
            .iter()
            .zip(frontier.iter().map(|(_, dirs)| dirs.clone()))
            .collect();
        let next = discover(&scanner, parents.into_iter(), seen);
        headers.extend(wave);
        frontier = next;
    }

    headers.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(headers)
}

/// Resolves the includes of `units`, returning headers not yet seen along
/// with the include directories they inherit.
fn discover<'u>(
    scanner: &IncludeScanner,
    units: impl Iterator<Item = (&'u TranslationUnit, Arc<Vec<PathBuf>>)>,
    seen: &mut HashSet<PathBuf>,
) -> Vec<(PathBuf, Arc<Vec<PathBuf>>)> {
    let mut found = Vec::new();
    for (unit, dirs) in units {
        for include in scanner.scan(unit) {
            match resolve_include(&include, unit.path(), &dirs) {
                Some(path) => {
                    let path = canonical(&path);
                    if seen.insert(path.clone()) {
                        found.push((path, dirs.clone()));
                    }
                }
                None => {
                    tracing::debug!(
                        file = %unit.path().display(),
                        line = include.line,
                        target = %include.target,
                        "include not found, skipping"
                    );
                }
            }
        }
    }
    found
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Everything the front end produced for one run.
#[derive(Debug)]
pub struct Workspace {
    units: Vec<TranslationUnit>,
    headers: Vec<TranslationUnit>,
    index: SourceIndex,
}

impl Workspace {
    /// Build a workspace from already-parsed units, with no include
    /// following. Useful for in-memory sources.
    pub fn from_units(units: Vec<TranslationUnit>) -> Self {
        let index = SourceIndex::build(units.iter());
        Self {
            units,
            headers: Vec::new(),
            index,
        }
    }

    /// Main units, in input order.
    pub fn units(&self) -> &[TranslationUnit] {
        &self.units
    }

    /// Included headers, sorted by path.
    pub fn headers(&self) -> &[TranslationUnit] {
        &self.headers
    }

    pub fn index(&self) -> &SourceIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_follows_includes_once() {
        let temp = TempDir::new().unwrap();
        let inc = temp.path().join("include");
        std::fs::create_dir_all(&inc).unwrap();
        std::fs::write(inc.join("item.h"), "#pragma once\nclass Item { public: int Weight(); };\n").unwrap();
        std::fs::write(
            inc.join("player.h"),
            "#pragma once\n#include \"item.h\"\nclass Player { public: Item* Held(); };\n",
        )
        .unwrap();
        let a = temp.path().join("a.cpp");
        let b = temp.path().join("b.cpp");
        std::fs::write(&a, "#include <player.h>\n#include <vector>\n").unwrap();
        std::fs::write(&b, "#include \"include/item.h\"\n").unwrap();

        let sources = vec![
            SourceFile::new(&a, vec![inc.clone()]),
            SourceFile::new(&b, vec![]),
            SourceFile::new(&a, vec![inc.clone()]),
        ];
        let workspace = Frontend::new().load(&sources).unwrap();

        assert_eq!(workspace.units().len(), 2);
        assert_eq!(workspace.headers().len(), 2);
        assert!(workspace.index().class("Item").is_some());
        assert!(workspace.index().class("Player").is_some());
    }

    #[test]
    fn test_load_without_include_following() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("x.h"), "class X {};").unwrap();
        let main = temp.path().join("main.cpp");
        std::fs::write(&main, "#include \"x.h\"\n").unwrap();

        let workspace = Frontend::new()
            .follow_includes(false)
            .load(&[SourceFile::new(&main, vec![])])
            .unwrap();
        assert!(workspace.headers().is_empty());
        assert!(workspace.index().class("X").is_none());
    }

    #[test]
    fn test_missing_source_is_error() {
        let err = Frontend::new()
            .load(&[SourceFile::new("/nonexistent/bindref/main.cpp", vec![])])
            .unwrap_err();
        assert!(matches!(err, FrontendError::Read { .. }));
    }
}
