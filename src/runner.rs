//! Matching runner: drives the matcher over every unit and fills the
//! registry.

use rayon::prelude::*;

use crate::frontend::{FrontendError, TranslationUnit, Workspace};
use crate::matcher::{BindingMatcher, RawBinding};
use crate::registry::{Catalog, DisplayNamePolicy, Registry};

/// Runs the matching phase over a loaded workspace.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    policy: DisplayNamePolicy,
}

impl Runner {
    pub fn new(policy: DisplayNamePolicy) -> Self {
        Self { policy }
    }

    /// Match every parsed file and return the frozen catalog.
    ///
    /// Main units come first in input order, then included headers sorted
    /// by path; each header is matched once however many units include it.
    /// Matching runs in parallel; registration happens afterwards on this
    /// thread, in that file order and source order within a file.
    pub fn collect(&self, workspace: &Workspace) -> Result<Catalog, FrontendError> {
        let matcher = BindingMatcher::new(workspace.index())?;

        let files: Vec<&TranslationUnit> = workspace.units().iter().chain(workspace.headers()).collect();
        let per_file: Vec<Vec<RawBinding>> = files
            .par_iter()
            .map(|unit| matcher.matches(unit).collect())
            .collect();

        let mut registry = Registry::new(self.policy);
        let mut bindings = 0usize;
        for raw in per_file.into_iter().flatten() {
            let (class, display_name, method) = raw.normalize();
            registry.record(class, display_name, method);
            bindings += 1;
        }

        let catalog = registry.freeze();
        tracing::info!(
            units = workspace.units().len(),
            headers = workspace.headers().len(),
            bindings,
            classes = catalog.len(),
            "matching finished"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render_to_string, RenderOptions};
    use pretty_assertions::assert_eq;

    const PLAYER: &str = r#"
#include <string>
struct lua_State;
class CPlayer {
public:
    std::string GetName(bool verbose);
    int Level(lua_State* L) const;
};
"#;

    #[test]
    fn test_collect_across_units() {
        let decls = TranslationUnit::parse("player.h", PLAYER).unwrap();
        let bind = TranslationUnit::parse(
            "bind.cpp",
            r#"
void Register(lua_State* L) {
    module(L)[
        class_<CPlayer>("Player")
            .def("getName", &CPlayer::GetName)
            .def("level", &CPlayer::Level)
    ];
}
"#,
        )
        .unwrap();
        let workspace = Workspace::from_units(vec![decls, bind]);

        let catalog = Runner::default().collect(&workspace).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            render_to_string(&catalog, &RenderOptions::default()),
            "Player\n\tstring getName(bool verbose)\n\tint level()\n"
        );
    }

    #[test]
    fn test_no_bindings_is_empty_catalog() {
        let unit = TranslationUnit::parse("plain.cpp", "int main() { return 0; }").unwrap();
        let catalog = Runner::default()
            .collect(&Workspace::from_units(vec![unit]))
            .unwrap();
        assert!(catalog.is_empty());
    }
}
