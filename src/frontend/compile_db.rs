//! `compile_commands.json` loading.
//!
//! Only what the front end needs is extracted from each entry: the source
//! path and its include directories.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::FrontendError;

pub const COMPILE_DB_FILE: &str = "compile_commands.json";

/// Raw database entry as produced by CMake, Bear, etc.
#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// A source file with the include directories it is compiled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub include_dirs: Vec<PathBuf>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, include_dirs: Vec<PathBuf>) -> Self {
        Self {
            path: path.into(),
            include_dirs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileDatabase {
    entries: Vec<SourceFile>,
}

impl CompileDatabase {
    /// Load `<build_dir>/compile_commands.json`.
    pub fn load(build_dir: &Path) -> Result<Self, FrontendError> {
        let path = build_dir.join(COMPILE_DB_FILE);
        if !path.is_file() {
            return Err(FrontendError::MissingCompileDatabase { path });
        }
        let content = fs::read_to_string(&path).map_err(|source| FrontendError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|source| FrontendError::CompileDatabase { path, source })
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let raw: Vec<RawEntry> = serde_json::from_str(content)?;
        let entries = raw.into_iter().map(SourceFile::from).collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SourceFile] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a source path; both sides are compared canonicalized when
    /// possible.
    pub fn find(&self, path: &Path) -> Option<&SourceFile> {
        let wanted = canonical(path);
        self.entries.iter().find(|entry| canonical(&entry.path) == wanted)
    }
}

impl From<RawEntry> for SourceFile {
    fn from(raw: RawEntry) -> Self {
        let args = match (raw.arguments, raw.command) {
            (Some(arguments), _) => arguments,
            (None, Some(command)) => split_command(&command),
            (None, None) => Vec::new(),
        };
        let path = absolutize(&raw.directory, &raw.file);
        let include_dirs = include_dirs(&args)
            .into_iter()
            .map(|dir| absolutize(&raw.directory, Path::new(&dir)))
            .collect();
        SourceFile { path, include_dirs }
    }
}

fn absolutize(directory: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

const INCLUDE_FLAGS: &[&str] = &["-I", "-isystem", "-iquote", "/I"];

/// Include directories named by compiler flags, in command-line order.
fn include_dirs(args: &[String]) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        for flag in INCLUDE_FLAGS {
            if arg == flag {
                if let Some(dir) = iter.next() {
                    dirs.push(dir.clone());
                }
                break;
            }
            if let Some(dir) = arg.strip_prefix(flag) {
                if !dir.is_empty() {
                    dirs.push(dir.to_string());
                }
                break;
            }
        }
    }
    dirs
}

/// Splits a shell command line on whitespace, honouring single quotes,
/// double quotes and backslash escapes.
fn split_command(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_arg = true;
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}
