//! Name resolution for rendered signatures.

use crate::registry::Catalog;
use crate::types::BoundType;

/// Maps bound types to the names scripts know them by.
///
/// Built from a [`Catalog`], so every registration of the run is visible
/// and a class registered after (or in another file than) the method that
/// mentions it still resolves.
pub struct NameResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> NameResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Friendly display name of a registered class, else the raw spelling.
    pub fn display(&self, ty: &BoundType) -> String {
        match self.catalog.get(ty) {
            Some(class) => class.display_name().to_string(),
            None => ty.spelling(),
        }
    }
}
