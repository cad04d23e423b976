//! Parsed translation units.

use std::fs;
use std::path::{Path, PathBuf};

use tree_sitter::{Language, Node, Parser, Tree};

use super::FrontendError;

/// Returns the C++ grammar used for every unit.
pub fn cpp_language() -> Language {
    tree_sitter_cpp::LANGUAGE.into()
}

/// A parsed source file: the tree-sitter tree plus the bytes it was built
/// from, kept together so node text can be sliced out later.
pub struct TranslationUnit {
    path: PathBuf,
    source: Vec<u8>,
    tree: Tree,
}

impl TranslationUnit {
    /// Read and parse a file.
    pub fn load(path: &Path) -> Result<Self, FrontendError> {
        let source = fs::read(path).map_err(|source| FrontendError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, source)
    }

    /// Parse in-memory source. Syntax errors leave ERROR nodes in the tree
    /// but are not failures.
    pub fn parse(path: impl Into<PathBuf>, source: impl Into<Vec<u8>>) -> Result<Self, FrontendError> {
        let path = path.into();
        let source = source.into();

        let mut parser = Parser::new();
        parser.set_language(&cpp_language())?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| FrontendError::Parse { path: path.clone() })?;

        Ok(Self { path, source, tree })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Get text for a node of this unit's tree.
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    /// 1-indexed line of a node.
    pub fn line(&self, node: Node) -> usize {
        node.start_position().row + 1
    }
}

impl std::fmt::Debug for TranslationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationUnit")
            .field("path", &self.path)
            .field("bytes", &self.source.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_source() {
        let unit = TranslationUnit::parse("a.cpp", "int x = 1;").unwrap();
        assert_eq!(unit.path(), Path::new("a.cpp"));
        assert_eq!(unit.node_text(unit.root()), "int x = 1;");
        assert_eq!(unit.line(unit.root()), 1);
    }

    #[test]
    fn test_broken_source_still_parses() {
        let unit = TranslationUnit::parse("broken.cpp", "class { void (;").unwrap();
        assert!(unit.root().has_error());
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = TranslationUnit::load(Path::new("/nonexistent/bindref/x.cpp")).unwrap_err();
        assert!(matches!(err, FrontendError::Read { .. }));
    }
}
