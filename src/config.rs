//! Configuration file schema.
//!
//! Every key is optional; a missing file means defaults.

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::DisplayNamePolicy;
use crate::render::{ClassOrder, RenderOptions, DEFAULT_CONTEXT_MARKER};

/// File names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["bindref.yaml", ".bindref.yaml"];

/// Commented default configuration written by `bindref init`.
pub const DEFAULT_CONFIG: &str = include_str!("templates/default.yaml");

const DEFAULT_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++", "h", "hh", "hpp", "hxx"];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Parameters whose type contains this are left out of signatures.
    pub context_marker: String,
    pub class_order: ClassOrder,
    pub display_name_policy: DisplayNamePolicy,
    /// Extra include directories, relative to the config file.
    pub include_dirs: Vec<PathBuf>,
    pub follow_includes: bool,
    /// Source extensions picked up when walking directories.
    pub extensions: Vec<String>,
    /// Glob patterns for paths to skip when walking directories.
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_marker: DEFAULT_CONTEXT_MARKER.to_string(),
            class_order: ClassOrder::default(),
            display_name_policy: DisplayNamePolicy::default(),
            include_dirs: Vec::new(),
            follow_includes: true,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            exclude: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a config from a YAML file. Relative include directories are
    /// anchored at the file's directory.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse_str(&content)?;
        if let Some(base) = path.parent() {
            config.include_dirs = config
                .include_dirs
                .into_iter()
                .map(|dir| if dir.is_relative() { base.join(dir) } else { dir })
                .collect();
        }
        Ok(config)
    }

    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        // A document holding only comments is null, not an empty mapping.
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_value(value)?;
        Ok(config)
    }

    /// First default config file present in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Compile the extension list and exclude globs for walking
    /// directories. Fails on an invalid glob pattern.
    pub fn source_filter(&self) -> anyhow::Result<SourceFilter> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).with_context(|| format!("invalid exclude pattern {:?}", pattern))?;
            builder.add(glob);
        }
        Ok(SourceFilter {
            extensions: self
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
            exclude: builder.build()?,
        })
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            class_order: self.class_order,
            context_marker: self.context_marker.clone(),
        }
    }
}

/// Which walked files are analyzed.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    extensions: Vec<String>,
    exclude: GlobSet,
}

impl SourceFilter {
    /// Whether `path` carries one of the configured source extensions.
    pub fn has_source_extension(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.extensions.iter().any(|e| e == ext)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.is_match(path)
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.has_source_extension(path) && !self.is_excluded(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.context_marker, "lua_State");
        assert_eq!(config.class_order, ClassOrder::Registration);
        assert_eq!(config.display_name_policy, DisplayNamePolicy::FirstSeen);
        assert!(config.follow_includes);

        let filter = config.source_filter().unwrap();
        assert!(filter.has_source_extension(Path::new("a/b.hpp")));
        assert!(filter.has_source_extension(Path::new("x.c++")));
        assert!(!filter.has_source_extension(Path::new("notes.txt")));
        assert!(!filter.is_excluded(Path::new("a/b.hpp")));
    }

    #[test]
    fn test_parse_partial() {
        let config = Config::parse_str(
            "class_order: alphabetical\ndisplay_name_policy: prefer_literal\ncontext_marker: \"\"\n",
        )
        .unwrap();
        assert_eq!(config.class_order, ClassOrder::Alphabetical);
        assert_eq!(config.display_name_policy, DisplayNamePolicy::PreferLiteral);
        assert_eq!(config.render_options().context_marker, "");
        assert!(config.follow_includes);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::parse_str("# nothing here\n").unwrap();
        assert_eq!(config.context_marker, "lua_State");
    }

    #[test]
    fn test_unknown_enum_value_is_error() {
        assert!(Config::parse_str("class_order: random\n").is_err());
    }

    #[test]
    fn test_default_template_parses() {
        let config = Config::parse_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.context_marker, "lua_State");
        assert_eq!(config.extensions, Config::default().extensions);
    }

    #[test]
    fn test_path_exclusion() {
        let config = Config::parse_str(
            "extensions: [\".cpp\", h]\nexclude:\n  - \"**/third_party/**\"\n  - \"*_generated.cpp\"\n",
        )
        .unwrap();
        let filter = config.source_filter().unwrap();
        assert!(filter.is_excluded(Path::new("src/third_party/lua/lapi.c")));
        assert!(!filter.accepts(Path::new("src/third_party/lua/lapi.h")));
        assert!(!filter.accepts(Path::new("src/bind_generated.cpp")));
        assert!(filter.accepts(Path::new("src/game/player.cpp")));
        assert!(filter.accepts(Path::new("src/game/player.h")));
        assert!(!filter.accepts(Path::new("src/game/player.hpp")));
    }

    #[test]
    fn test_invalid_exclude_pattern_is_error() {
        let config = Config::parse_str("exclude: [\"src/[broken\"]\n").unwrap();
        let err = config.source_filter().unwrap_err();
        assert!(err.to_string().contains("src/[broken"));
    }

    #[test]
    fn test_include_dirs_relative_to_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bindref.yaml");
        fs::write(&path, "include_dirs: [include, /abs]\n").unwrap();

        let config = Config::parse_file(&path).unwrap();
        assert_eq!(
            config.include_dirs,
            vec![temp.path().join("include"), PathBuf::from("/abs")]
        );
        assert_eq!(Config::discover(temp.path()), Some(path));
    }
}
