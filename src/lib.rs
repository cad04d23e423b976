//! bindref - reference generator for luabind-style script bindings.
//!
//! bindref reads C++ sources, finds method registrations of the form
//! `class_<T>("Name").def("exposed", &T::Method)` and prints, per exposed
//! class, the signatures of its bound methods. Wherever a bound class
//! appears in a signature it is shown under its script-visible name.
//!
//! # Architecture
//!
//! - `frontend`: tree-sitter parsing, include following, compilation
//!   databases and the declaration index
//! - `matcher`: recognizes `.def(...)` registrations in a unit
//! - `types`: C++ type model and normalization to binding identities
//! - `registry`: accumulates bindings, then freezes into a `Catalog`
//! - `resolver`: maps types to display names
//! - `render`: text report
//! - `runner`: parallel matching with ordered registration
//! - `config`: YAML configuration
//! - `cli`: command-line surface
//!
//! Matching must finish across every unit before anything is rendered,
//! which the `Registry` to `Catalog` hand-off enforces.

pub mod cli;
pub mod config;
pub mod frontend;
pub mod matcher;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod runner;
pub mod types;

pub use config::Config;
pub use frontend::{Frontend, FrontendError, SourceFile, Workspace};
pub use matcher::{BindingMatcher, RawBinding};
pub use registry::{BoundClass, BoundMethod, BoundParam, Catalog, DisplayNamePolicy, Registry};
pub use render::{render, render_to_string, ClassOrder, RenderOptions};
pub use resolver::NameResolver;
pub use runner::Runner;
pub use types::{normalize, BoundType, CppType};
