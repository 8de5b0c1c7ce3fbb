//! The transformed view of an instance's field store.
//!
//! Validation and rendering never look at the stored fields directly. They work
//! on a [`View`], in which every field with a transform hook holds the hook's
//! output. The stored fields are borrowed, never modified.
use std::borrow::Cow;

use indexmap::IndexMap;
use snafu::ResultExt;
use tracing::trace;

use crate::{
    instance::{self, Args, Binding, Error, Instance, TransformSnafu},
    value::Value,
};

static NULL: Value = Value::Null;

/// Field values as seen by validation and rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct View<'a> {
    fields: IndexMap<String, Cow<'a, Value>>,
}

impl View<'_> {
    /// The value of `field`, absent fields read as [`Value::Null`].
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).map_or(&NULL, |value| value.as_ref())
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).as_str()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a view directly from values, bypassing any instance.
    pub fn from_values(fields: impl IntoIterator<Item = (String, Value)>) -> View<'static> {
        View {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k, Cow::Owned(v)))
                .collect(),
        }
    }
}

/// What a transform hook gets to see besides the value it normalizes.
pub struct TransformContext<'a> {
    instance: &'a Instance,
    field: &'a str,
}

impl TransformContext<'_> {
    /// The instance whose field is being transformed.
    pub fn instance(&self) -> &Instance {
        self.instance
    }

    /// The field being transformed.
    pub fn field(&self) -> &str {
        self.field
    }

    /// Builds a new nested object, attributed to the transformed instance.
    pub fn create(&self, type_name: &str, args: Args) -> instance::Result<Instance> {
        Instance::construct(
            self.instance.catalog(),
            type_name,
            args,
            self.instance.provenance().cloned(),
            Binding::default(),
        )
    }

    /// An object-level validation error for values the hook can't normalize.
    pub fn reject(&self, reason: impl Into<String>) -> Error {
        Error::ObjectValidation {
            type_name: self.instance.type_name().to_owned(),
            reason: format!("field {:?}: {}", self.field, reason.into()),
            origin: self.instance.origin(),
        }
    }
}

/// Computes the transformed view of `instance`.
pub fn view(instance: &Instance) -> instance::Result<View<'_>> {
    let ty = instance.resolved();
    let mut fields = IndexMap::with_capacity(instance.field_store().len());
    for (key, value) in instance.field_store() {
        let value = match ty.transform_for(key) {
            Some(hook) => {
                let context = TransformContext {
                    instance,
                    field: key,
                };
                let transformed = hook(&context, value).context(TransformSnafu {
                    type_name: instance.type_name(),
                    field: key.clone(),
                    origin: instance.origin(),
                })?;
                trace!(type_name = instance.type_name(), field = key.as_str(), "transformed field");
                Cow::Owned(transformed)
            }
            None => Cow::Borrowed(value),
        };
        fields.insert(key.clone(), value);
    }

    Ok(View { fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{Catalog, TypeDef},
        types::TypeDescriptor as T,
    };

    fn upper(_: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
        Ok(match value {
            Value::Text(text) => Value::Text(text.to_uppercase()),
            other => other.clone(),
        })
    }

    fn refuse(context: &TransformContext<'_>, _: &Value) -> instance::Result<Value> {
        Err(context.reject("never valid"))
    }

    fn catalog() -> Catalog {
        let mut builder = Catalog::builder();
        builder
            .register_all([
                TypeDef::new("Env")
                    .field("env", T::nullable(T::String), Value::Null)
                    .field("vars", T::string_map(), [("PATH", "/bin")])
                    .alias("environment", "env")
                    .alias("variables", "vars")
                    .transform("environment", upper),
                TypeDef::new("Broken")
                    .field("x", T::nullable(T::String), Value::Null)
                    .transform("x", refuse),
            ])
            .expect("types are unique");
        builder.build().expect("catalog is consistent")
    }

    #[test]
    fn aliased_values_are_transformed_under_the_canonical_field() {
        let catalog = catalog();
        let instance = catalog
            .create("Env", Args::new().set("environment", "prod"))
            .unwrap();

        let view = view(&instance).unwrap();
        assert_eq!(view.get("env"), &Value::from("PROD"));
        assert!(!view.contains("environment"));

        // stored state is untouched
        assert_eq!(instance.get("env").unwrap(), &Value::from("prod"));
        assert_eq!(instance.get("environment").unwrap(), &Value::from("prod"));
    }

    #[test]
    fn alias_hooks_fire_for_the_canonical_field() {
        let catalog = catalog();
        let instance = catalog
            .create("Env", Args::new().set("env", "dev"))
            .unwrap();
        assert_eq!(view(&instance).unwrap().get("env"), &Value::from("DEV"));
    }

    #[test]
    fn aliased_values_merge_over_non_null_defaults() {
        let catalog = catalog();
        let instance = catalog
            .create("Env", Args::new().set("variables", [("HOME", "/root")]))
            .unwrap();

        let view = view(&instance).unwrap();
        assert_eq!(
            view.get("vars"),
            &Value::from([("PATH", "/bin"), ("HOME", "/root")])
        );
        assert!(!view.contains("variables"));
    }

    #[test]
    fn the_later_of_alias_and_canonical_wins() {
        let catalog = catalog();
        let instance = catalog
            .create(
                "Env",
                Args::new().set("env", "dev").set("environment", "prod"),
            )
            .unwrap();

        let view = view(&instance).unwrap();
        assert_eq!(view.get("env"), &Value::from("PROD"));
        assert!(!view.contains("environment"));
    }

    #[test]
    fn hook_errors_name_the_field() {
        let catalog = catalog();
        let instance = catalog.create("Broken", Args::new()).unwrap();
        let err = view(&instance).unwrap_err();
        assert!(matches!(err, Error::Transform { ref field, .. } if field == "x"));
    }
}
