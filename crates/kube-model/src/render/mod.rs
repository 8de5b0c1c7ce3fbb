//! Turns instances into ordered resource documents.
//!
//! Rendering an instance runs the same pipeline every time:
//!
//! 1. compute the transformed [`View`] of the instance,
//! 2. validate the view,
//! 3. shape the view into a document fragment with the type's [`RenderFn`]
//!    (or a plain [`FieldRenderer`] when the type has none),
//! 4. post-process the fragment: merge labels and annotations into
//!    `metadata`, order the identifier and namespace first within it, order
//!    the identifier and `metadata` first at the top level and finally
//!    prepend `apiVersion` and `kind`.
//!
//! The view is computed once and shared by validation and shaping. Key order
//! in the output is deterministic and part of the contract: rendering the
//! same instance twice produces identical documents.
//!
//! [`RenderFn`]: crate::schema::RenderFn
use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, instrument};

pub use self::fields::FieldRenderer;
use crate::{
    instance::{self, Instance, Origin},
    transform::{self, View},
    types::FieldPath,
    value::Value,
};

mod fields;

/// A rendered, ordered document (or document fragment).
pub type Document = serde_json::Map<String, JsonValue>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to prepare {type_name} for rendering"))]
    Prepare {
        type_name: String,
        source: instance::Error,
    },

    #[snafu(display("failed to render {type_name} ({origin}): {reason}"))]
    Shape {
        type_name: String,
        reason: String,
        origin: Origin,
    },

    #[snafu(display("the number {value} has no JSON representation"))]
    NonFiniteNumber { value: f64 },

    #[snafu(display("mapping keys collide on {key:?} once written as JSON keys"))]
    DuplicateKey { key: String },

    #[snafu(display("failed to serialize embedded JSON for {type_name}"))]
    EmbedJson {
        type_name: String,
        source: serde_json::Error,
    },
}

/// Validates and renders `instance`. Returns [`None`] if the instance
/// produces no document.
#[instrument(level = "debug", skip(instance), fields(type_name = instance.type_name(), uid = %instance.uid()))]
pub fn render_document(instance: &Instance) -> Result<Option<Document>> {
    let view = transform::view(instance).context(PrepareSnafu {
        type_name: instance.type_name(),
    })?;
    instance
        .validate_view(&view, &FieldPath::root())
        .context(PrepareSnafu {
            type_name: instance.type_name(),
        })?;

    let document = shape(instance, &view)?;
    debug!(produced = document.is_some(), "rendered instance");
    Ok(document)
}

/// Renders an instance nested in another one. The outer instance's validation
/// already covered it.
fn render_nested(instance: &Instance) -> Result<Option<JsonValue>> {
    let view = transform::view(instance).context(PrepareSnafu {
        type_name: instance.type_name(),
    })?;
    Ok(shape(instance, &view)?.map(JsonValue::Object))
}

fn shape(instance: &Instance, view: &View<'_>) -> Result<Option<Document>> {
    let mut context = RenderContext {
        instance,
        view,
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
    };
    let fragment = match instance.resolved().render {
        Some(render) => render(&mut context)?,
        None => context.fields().render()?,
    };
    let RenderContext {
        labels,
        annotations,
        ..
    } = context;
    Ok(fragment.map(|fragment| finish(instance, fragment, &labels, &annotations)))
}

fn finish(
    instance: &Instance,
    mut fragment: Document,
    extra_labels: &BTreeMap<String, String>,
    extra_annotations: &BTreeMap<String, String>,
) -> Document {
    let ty = instance.resolved();
    let identifier = ty.identifier.as_deref();

    if ty.has_metadata {
        if let Some(JsonValue::Object(metadata)) = fragment.get_mut("metadata") {
            merge_metadata(metadata, "labels", extra_labels, instance.labels());
            merge_metadata(metadata, "annotations", extra_annotations, instance.annotations());
            if let (true, Some(namespace)) = (ty.namespaced, instance.namespace()) {
                metadata.insert("namespace".to_owned(), namespace.into());
            }
            let first = identifier.into_iter().chain(["namespace"]).collect::<Vec<_>>();
            *metadata = reorder(std::mem::take(metadata), &first);
        }
    }

    let first = identifier.into_iter().chain(["metadata"]).collect::<Vec<_>>();
    let fragment = reorder(fragment, &first);
    match &ty.kind {
        Some(kind) => {
            let mut document = Document::new();
            document.insert("apiVersion".to_owned(), kind.api_version.clone().into());
            document.insert("kind".to_owned(), kind.kind.clone().into());
            document.extend(fragment);
            document
        }
        None => fragment,
    }
}

/// Merges the fragment's own entries, then the render-time extras and finally
/// the instance-level entries, later ones winning. Keys end up sorted.
fn merge_metadata(
    metadata: &mut Document,
    key: &str,
    extra: &BTreeMap<String, String>,
    instance: &BTreeMap<String, String>,
) {
    let mut merged = BTreeMap::<String, JsonValue>::new();
    if let Some(JsonValue::Object(existing)) = metadata.get(key) {
        merged.extend(existing.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    for (k, v) in extra.iter().chain(instance) {
        merged.insert(k.clone(), v.clone().into());
    }
    if !merged.is_empty() {
        metadata.insert(key.to_owned(), JsonValue::Object(merged.into_iter().collect()));
    }
}

/// Moves the listed keys to the front, in the listed order, keeping the order
/// of everything else.
pub fn reorder(document: Document, first: &[&str]) -> Document {
    let mut entries = document.into_iter().collect::<Vec<_>>();
    entries.sort_by_key(|(key, _)| {
        first
            .iter()
            .position(|f| *f == key.as_str())
            .unwrap_or(usize::MAX)
    });
    entries.into_iter().collect()
}

/// Converts a field value into JSON. Absent values (and nested instances
/// that produce nothing) yield [`None`], mapping keys come out sorted.
///
/// Non-finite numbers and mappings whose keys collide as strings (`1` and
/// `"1"`) are rejected.
pub fn to_json(value: &Value) -> Result<Option<JsonValue>> {
    let json = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Number(n) => JsonValue::Number(
            serde_json::Number::from_f64(*n).context(NonFiniteNumberSnafu { value: *n })?,
        ),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Seq(items) => JsonValue::Array(
            items
                .iter()
                .map(to_json)
                .filter_map(Result::transpose)
                .collect::<Result<_>>()?,
        ),
        Value::Map(map) => {
            let mut entries = map
                .iter()
                .map(|(k, v)| Ok((k.to_string(), to_json(v)?.unwrap_or(JsonValue::Null))))
                .collect::<Result<Vec<_>>>()?;
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                return DuplicateKeySnafu { key: pair[0].0.clone() }.fail();
            }
            JsonValue::Object(entries.into_iter().collect())
        }
        Value::Object(instance) => return render_nested(instance),
    };
    Ok(Some(json))
}

/// Everything a shaping step has access to.
pub struct RenderContext<'a> {
    instance: &'a Instance,
    view: &'a View<'a>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl RenderContext<'_> {
    pub fn instance(&self) -> &Instance {
        self.instance
    }

    pub fn view(&self) -> &View<'_> {
        self.view
    }

    /// The transformed value of `field`.
    pub fn get(&self, field: &str) -> &Value {
        self.view.get(field)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.view.str(field)
    }

    /// The identifier of the rendered instance, as text.
    pub fn name(&self) -> Option<&str> {
        self.instance
            .resolved()
            .identifier
            .as_deref()
            .and_then(|field| self.view.str(field))
    }

    pub fn render_field(&self, field: &str) -> Result<Option<JsonValue>> {
        to_json(self.get(field))
    }

    /// Renders the transformed fields, see [`FieldRenderer`].
    pub fn fields(&self) -> FieldRenderer<'_> {
        FieldRenderer::new(self)
    }

    /// Adds a label to this render only, below instance-level labels.
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    /// Adds an annotation to this render only, below instance-level annotations.
    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn fail(&self, reason: impl Into<String>) -> Error {
        Error::Shape {
            type_name: self.instance.type_name().to_owned(),
            reason: reason.into(),
            origin: self.instance.origin(),
        }
    }

    /// Serializes `value` into a JSON string, for documents that embed JSON.
    pub fn embed_json(&self, value: &impl serde::Serialize) -> Result<String> {
        serde_json::to_string(value).context(EmbedJsonSnafu {
            type_name: self.instance.type_name(),
        })
    }
}

/// Creates a one-entry document, for fragments built by hand.
pub fn document(key: &str, value: impl Into<JsonValue>) -> Document {
    let mut document = Document::new();
    document.insert(key.to_owned(), value.into());
    document
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        instance::Args,
        schema::{Catalog, TypeDef},
        types::TypeDescriptor as T,
        value::{MapKey, Mapping},
    };

    fn shape_item(context: &mut RenderContext<'_>) -> Result<Option<Document>> {
        let name = context.name().unwrap_or_default().to_owned();
        context.add_label("from-render", "yes");
        context.add_label("team", "render");
        let mut metadata = document("name", name);
        metadata.insert("labels".to_owned(), serde_json::json!({"zone": "a"}));
        let mut fragment = context.fields().skip(["name"]).render()?.unwrap_or_default();
        fragment.insert("metadata".to_owned(), metadata.into());
        Ok(Some(fragment))
    }

    fn shape_crate(context: &mut RenderContext<'_>) -> Result<Option<Document>> {
        if context.get("size").as_i64() > Some(3) {
            return Err(context.fail("crates hold at most 3 items"));
        }
        context.fields().render()
    }

    fn catalog() -> Catalog {
        let mut builder = Catalog::builder();
        builder
            .register_all([
                TypeDef::new("Crate")
                    .field("size", T::count(), 1)
                    .render(shape_crate),
                TypeDef::new("Item")
                    .kind("v1", "Item", "item")
                    .field("size", T::count(), 1)
                    .field("tags", T::string_map(), Value::empty_map())
                    .render(shape_item),
                TypeDef::new("Part").field("weight", T::Number, 1.5),
            ])
            .expect("types are unique");
        builder.build().expect("catalog is consistent")
    }

    #[test]
    fn documents_are_ordered() {
        let catalog = catalog();
        let mut item = catalog
            .create("Item", Args::with_id("x").set("tags", [("b", "2"), ("a", "1")]))
            .unwrap();
        item.label("team", "a");

        let document = item.render().unwrap().unwrap();
        let keys = document.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, ["apiVersion", "kind", "metadata", "size", "tags"]);

        let metadata = document["metadata"].as_object().unwrap();
        let keys = metadata.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, ["name", "labels"]);
        assert_eq!(
            metadata["labels"],
            serde_json::json!({"from-render": "yes", "team": "a", "zone": "a"})
        );

        let tags = document["tags"].as_object().unwrap();
        assert_eq!(tags.keys().collect::<Vec<_>>(), ["a", "b"]);

        // rendering doesn't change stored state
        assert_eq!(item.render().unwrap(), Some(document));
        assert_eq!(item.labels().len(), 1);
    }

    #[test]
    fn namespace_is_injected_after_the_identifier() {
        let catalog = catalog();
        let mut scope = crate::scope::Scope::new(&catalog, crate::scope::ScopeOptions::default());
        let item = {
            let mut ns = scope.enter_namespace("team-a");
            ns.create("Item", Args::with_id("x")).unwrap()
        };
        let document = item.render().unwrap().unwrap();
        let metadata = document["metadata"].as_object().unwrap();
        let keys = metadata.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, ["name", "namespace", "labels"]);
        assert_eq!(metadata["namespace"], "team-a");
    }

    #[test]
    fn invalid_instances_do_not_render() {
        let catalog = catalog();
        let mut item = catalog.create("Item", Args::with_id("x")).unwrap();
        item.set("size", 0).unwrap();
        assert!(matches!(item.render(), Err(Error::Prepare { .. })));
    }

    #[test]
    fn shaping_failures_carry_the_origin() {
        let catalog = catalog();
        let small = catalog.create("Crate", Args::new().set("size", 2)).unwrap();
        assert_eq!(small.render().unwrap(), Some(document("size", 2)));

        let large = catalog.create("Crate", Args::new().set("size", 4)).unwrap();
        let err = large.render().unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
        let message = err.to_string();
        assert!(message.contains("crates hold at most 3 items"), "{message}");
        assert!(message.contains("mod.rs"), "{message}");
    }

    #[test]
    fn values_convert_to_json() {
        let catalog = catalog();
        let part = catalog.create("Part", Args::new()).unwrap();
        let value = Value::Seq(vec![
            Value::Null,
            Value::Number(0.25),
            Value::from(part),
            Value::from([("b", 1), ("a", 2)]),
        ]);
        assert_eq!(
            to_json(&value).unwrap(),
            Some(serde_json::json!([0.25, {"weight": 1.5}, {"a": 2, "b": 1}]))
        );
        assert_eq!(to_json(&Value::Null).unwrap(), None);
    }

    #[rstest]
    #[case::nan(f64::NAN)]
    #[case::infinity(f64::INFINITY)]
    #[case::negative_infinity(f64::NEG_INFINITY)]
    fn non_finite_numbers_are_rejected(#[case] number: f64) {
        let value = Value::Seq(vec![Value::Int(1), Value::Number(number)]);
        let err = to_json(&value).unwrap_err();
        assert!(matches!(err, Error::NonFiniteNumber { .. }), "{err}");
    }

    #[test]
    fn colliding_mapping_keys_are_rejected() {
        let value = Value::Map(Mapping::from_iter([
            (MapKey::Int(1), Value::from("number")),
            (MapKey::Text("1".to_owned()), Value::from("text")),
        ]));
        let err = to_json(&value).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key } if key == "1"), "{err}");

        let value = Value::Map(Mapping::from_iter([
            (MapKey::Int(1), Value::from("number")),
            (MapKey::Bool(true), Value::from("flag")),
        ]));
        assert_eq!(
            to_json(&value).unwrap(),
            Some(serde_json::json!({"1": "number", "true": "flag"}))
        );
    }
}
