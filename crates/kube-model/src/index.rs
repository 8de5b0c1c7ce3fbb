//! Type-level backlinks from child types to the container types that can hold
//! them. Only introspection reads the index, validation and rendering never do.
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::schema::Catalog;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParentIndex {
    parents: BTreeMap<String, BTreeSet<String>>,
}

impl ParentIndex {
    /// Registers, for every field of every type that holds objects of some type
    /// `T`, a backlink from `T` and from every subtype of `T` to the container.
    pub fn build(catalog: &Catalog) -> Self {
        let mut parents = BTreeMap::<String, BTreeSet<String>>::new();
        for container in catalog.types() {
            for ty in container.fields.values() {
                let Some(original) = ty.original_type() else {
                    continue;
                };
                let children = std::iter::once(original.type_name.as_str())
                    .chain(catalog.subtypes(&original.type_name));
                for child in children {
                    parents
                        .entry(child.to_owned())
                        .or_default()
                        .insert(container.name.clone());
                }
            }
        }

        debug!(child_types = parents.len(), "built parent index");
        Self { parents }
    }

    /// The container types that can embed `type_name`, sorted by name.
    pub fn parents_of(&self, type_name: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(type_name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::TypeDef, types::TypeDescriptor as T, value::Value};

    #[test]
    fn backlinks_cover_subtypes() {
        let mut builder = Catalog::builder();
        builder
            .register_all([
                TypeDef::new("Widget").field("size", T::Integer, 1),
                TypeDef::new("Button").parent("Widget"),
                TypeDef::new("Panel")
                    .field("widgets", T::list(T::object("Widget")), Value::empty_seq()),
                TypeDef::new("Frame").default_object("main", "Button"),
                TypeDef::new("Label").field("text", T::String, ""),
            ])
            .expect("types are unique");
        let catalog = builder.build().expect("catalog is consistent");

        let index = catalog.parent_index();
        assert_eq!(index.parents_of("Widget").collect::<Vec<_>>(), ["Panel"]);
        assert_eq!(index.parents_of("Button").collect::<Vec<_>>(), ["Frame", "Panel"]);
        assert_eq!(index.parents_of("Label").count(), 0);
        assert!(!index.is_empty());
    }
}
