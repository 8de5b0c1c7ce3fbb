//! Terminal help for the types of a catalog.
use std::fmt;

use snafu::{OptionExt, Snafu};

use crate::{
    schema::{Catalog, ResolvedType},
    types::TypeDescriptor,
};

const IDENTIFIER_WIDTH: usize = 7;
const FIELD_WIDTH: usize = 20;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no matching object for type {type_name}"))]
    NoMatchingType { type_name: String },
}

/// Looks `type_name` up case-insensitively and returns its help text.
pub fn describe<'a>(catalog: &'a Catalog, type_name: &str) -> Result<TypeHelp<'a>, Error> {
    let ty = catalog
        .find(type_name)
        .context(NoMatchingTypeSnafu { type_name })?;
    Ok(TypeHelp { catalog, ty })
}

/// The help text of a single type, rendered through [`fmt::Display`].
pub struct TypeHelp<'a> {
    catalog: &'a Catalog,
    ty: &'a ResolvedType,
}

impl fmt::Display for TypeHelp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.ty;
        let abstract_marker = if ty.is_abstract { " (abstract type)" } else { "" };
        writeln!(f, "{}{abstract_marker}:", ty.name)?;
        if let Some(doc) = &ty.doc {
            writeln!(f, "  {doc}")?;
        }

        if !ty.ancestors.is_empty() {
            writeln!(f, "  parents: {}", ty.ancestors.join(", "))?;
        }
        let children = self.catalog.direct_subtypes(&ty.name);
        if !children.is_empty() {
            writeln!(f, "  children: {}", children.join(", "))?;
        }
        let parent_types = self
            .catalog
            .parent_index()
            .parents_of(&ty.name)
            .collect::<Vec<_>>();
        if !parent_types.is_empty() {
            writeln!(f, "  parent types: {}", parent_types.join(", "))?;
        }

        if ty.has_metadata {
            let metadata_type = TypeDescriptor::string_map().name();
            writeln!(f, "  metadata:")?;
            writeln!(f, "    {:<FIELD_WIDTH$}  {metadata_type}", "annotations:")?;
            writeln!(f, "    {:<FIELD_WIDTH$}  {metadata_type}", "labels:")?;
        }

        writeln!(f, "  properties:")?;
        if let Some(identifier) = &ty.identifier {
            if let Some(id_type) = ty.fields.get(identifier) {
                writeln!(
                    f,
                    "    {identifier} (identifier): {:pad$}{}",
                    "",
                    id_type.name(),
                    pad = IDENTIFIER_WIDTH.saturating_sub(identifier.len())
                )?;
            }
        }

        let mut fields = ty
            .fields
            .iter()
            .filter(|(field, _)| Some(*field) != ty.identifier.as_ref())
            .collect::<Vec<_>>();
        fields.sort_by_key(|(field, _)| *field);
        for (field, field_type) in fields {
            let marker = if ty.has_transform(field) { '*' } else { ' ' };
            writeln!(
                f,
                "   {marker}{field}: {:pad$}{}",
                "",
                field_type.name(),
                pad = FIELD_WIDTH.saturating_sub(field.len())
            )?;
            let aliases = ty.aliases_of(field);
            if !aliases.is_empty() {
                writeln!(f, "      ({})", aliases.join(", "))?;
            }
        }
        Ok(())
    }
}

/// One line per type: `* Kind` or `* Name (Kind)` for top-level kinds and, with
/// `all`, `- Name` for sub-objects and `- (Name)` for abstract types. Sorted by
/// type name.
pub fn list(catalog: &Catalog, all: bool) -> Vec<String> {
    let mut types = catalog.types().collect::<Vec<_>>();
    types.sort_by(|a, b| a.name.cmp(&b.name));
    types
        .into_iter()
        .filter_map(|ty| match &ty.kind {
            Some(kind) if !ty.is_abstract => Some(if kind.kind == ty.name {
                format!("* {}", ty.name)
            } else {
                format!("* {} ({})", ty.name, kind.kind)
            }),
            _ if !all => None,
            _ if ty.is_abstract => Some(format!("- ({})", ty.name)),
            _ => Some(format!("- {}", ty.name)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{schema::TypeDef, transform::TransformContext, types::TypeDescriptor as T, value::Value};

    fn keep(_: &TransformContext<'_>, value: &Value) -> crate::instance::Result<Value> {
        Ok(value.clone())
    }

    fn catalog() -> Catalog {
        let mut builder = Catalog::builder();
        builder
            .register_all([
                TypeDef::new("Port").field("port", T::count(), 80),
                TypeDef::new("Base").abstract_type(),
                TypeDef::new("Exposed")
                    .parent("Base")
                    .kind("v1", "Service", "service")
                    .field("ports", T::list(T::object("Port")), Value::empty_seq())
                    .field("selector", T::string_map(), Value::empty_map())
                    .alias("select", "selector")
                    .transform("selector", keep),
            ])
            .expect("types are unique");
        builder.build().expect("catalog is consistent")
    }

    #[test]
    fn describes_top_level_kinds() {
        let catalog = catalog();
        let help = describe(&catalog, "exposed").unwrap().to_string();
        assert_eq!(
            help,
            indoc! {"
                Exposed:
                  parents: Base
                  metadata:
                    annotations:          Map<String, String>
                    labels:               Map<String, String>
                  properties:
                    name (identifier):    Identifier
                    ports:                List<Port>
                   *selector:             Map<String, String>
                      (select)
            "}
        );
    }

    #[test]
    fn describes_abstract_and_nested_types() {
        let catalog = catalog();
        let help = describe(&catalog, "Base").unwrap().to_string();
        assert!(help.starts_with("Base (abstract type):\n  children: Exposed\n"));

        let help = describe(&catalog, "Port").unwrap().to_string();
        assert!(help.contains("  parent types: Exposed\n"));
        assert!(!help.contains("metadata:"));

        assert!(matches!(
            describe(&catalog, "Nope"),
            Err(Error::NoMatchingType { .. })
        ));
    }

    #[test]
    fn lists_types() {
        let catalog = catalog();
        assert_eq!(list(&catalog, false), ["* Exposed (Service)"]);
        assert_eq!(
            list(&catalog, true),
            ["- (Base)", "* Exposed (Service)", "- Port"]
        );
    }
}
