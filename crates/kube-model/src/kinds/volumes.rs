//! Persistent volumes, their claims and the volumes a pod can mount.
use serde_json::{Map, Value as JsonValue, json};

use super::name_metadata;
use crate::{
    instance,
    render::{self, Document, RenderContext},
    schema::TypeDef,
    transform::{TransformContext, View},
    types::TypeDescriptor as T,
    value::Value,
};

const ACCESS_MODES: [&str; 3] = ["ReadWriteOnce", "ReadOnlyMany", "ReadWriteMany"];

/// Fields of a persistent volume naming where its storage lives.
const VOLUME_SOURCES: [&str; 1] = ["awsElasticBlockStore"];

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("AWSElasticBlockStore")
            .field("volumeID", T::AwsVolumeId, Value::Null)
            .field("fsType", T::enumeration(["ext4"]), "ext4")
            .render(render_ebs_store),
        TypeDef::new("PersistentVolumeRef")
            .field("apiVersion", T::nullable(T::String), Value::Null)
            .field("kind", T::nullable(T::CaseIdentifier), "PersistentVolumeClaim")
            .field("name", T::nullable(T::Identifier), Value::Null)
            .field("ns", T::nullable(T::Identifier), Value::Null)
            .alias("namespace", "ns")
            .render(render_volume_ref),
        TypeDef::new("PersistentVolume")
            .kind("v1", "PersistentVolume", "persistentvolume")
            .cluster_scoped()
            .output_order(35)
            .field("accessModes", T::list(T::enumeration(ACCESS_MODES)), vec!["ReadWriteOnce"])
            .field("capacity", T::Memory, Value::Null)
            .field(
                "awsElasticBlockStore",
                T::nullable(T::object("AWSElasticBlockStore")),
                Value::Null,
            )
            .field(
                "persistentVolumeReclaimPolicy",
                T::nullable(T::enumeration(["Retain", "Recycle", "Delete"])),
                Value::Null,
            )
            .field(
                "claimRef",
                T::nullable(T::object("PersistentVolumeRef")),
                Value::Null,
            )
            .validate(check_single_source)
            .render(render_persistent_volume),
        TypeDef::new("PersistentVolumeClaim")
            .kind("v1", "PersistentVolumeClaim", "persistentvolumeclaim")
            .output_order(40)
            .field("accessModes", T::list(T::enumeration(ACCESS_MODES)), vec!["ReadWriteOnce"])
            .field("request", T::Memory, Value::Null)
            .field(
                "selector",
                T::nullable(T::object("BaseSelector")),
                Value::Null,
            )
            .field("volumeName", T::nullable(T::Identifier), Value::Null)
            .transform("volumeName", volume_name)
            .render(render_persistent_volume_claim),
        TypeDef::new("ContainerVolumeMountSpec")
            .field("name", T::Identifier, "")
            .field("path", T::non_empty(T::Path), "")
            .field("readOnly", T::nullable(T::Boolean), Value::Null)
            .render(render_volume_mount),
        TypeDef::new("PodVolumeBaseSpec")
            .abstract_type()
            .field("name", T::Identifier, ""),
        TypeDef::new("PodVolumeHostSpec")
            .parent("PodVolumeBaseSpec")
            .field("path", T::non_empty(T::Path), "")
            .render(render_host_volume),
        TypeDef::new("PodVolumeConfigMapSpec")
            .parent("PodVolumeBaseSpec")
            .field("defaultMode", T::nullable(T::positive(T::Integer)), Value::Null)
            .field("map_name", T::Identifier, "")
            .field("item_map", T::nullable(T::string_map()), Value::empty_map())
            .render(render_config_map_volume),
        TypeDef::new("PodVolumeSecretSpec")
            .parent("PodVolumeBaseSpec")
            .field("defaultMode", T::nullable(T::positive(T::Integer)), Value::Null)
            .field("secret_name", T::Identifier, "")
            .field("item_map", T::nullable(T::string_map()), Value::empty_map())
            .render(render_secret_volume),
        TypeDef::new("PodVolumePVCSpec")
            .parent("PodVolumeBaseSpec")
            .field("claim_name", T::Identifier, "")
            .field("readOnly", T::nullable(T::Boolean), Value::Null)
            .transform("claim_name", claim_name)
            .render(render_claim_volume),
    ]
}

/// A claim can be bound to a volume object instead of its name.
fn volume_name(context: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
    object_name(context, value, "PersistentVolume")
}

fn claim_name(context: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
    object_name(context, value, "PersistentVolumeClaim")
}

fn object_name(
    context: &TransformContext<'_>,
    value: &Value,
    type_name: &str,
) -> instance::Result<Value> {
    match value {
        Value::Object(object) if object.is_a(type_name) => object
            .name()
            .map(Value::from)
            .ok_or_else(|| context.reject(format!("the referenced {type_name} has no name"))),
        value => Ok(value.clone()),
    }
}

/// Exactly one storage backend has to be configured.
fn check_single_source(view: &View<'_>) -> Result<(), String> {
    let configured = VOLUME_SOURCES
        .iter()
        .filter(|source| !view.get(source).is_null())
        .count();
    if configured != 1 {
        return Err(format!(
            "exactly one of {} must be set, found {configured}",
            VOLUME_SOURCES.join(", ")
        ));
    }
    Ok(())
}

fn render_ebs_store(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context.fields().order(["volumeID", "fsType"]).render()
}

fn render_volume_ref(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["apiVersion", "name", "kind", "ns"])
        .rename("ns", "namespace")
        .render()
}

/// The capacity is nested as `capacity.storage`.
fn render_persistent_volume(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut spec = context
        .fields()
        .order(["accessModes", "capacity"])
        .skip(["name"])
        .render()?
        .unwrap_or_default();
    if let Some(capacity) = spec.get_mut("capacity") {
        *capacity = json!({ "storage": capacity.take() });
    }
    let mut document = render::document("metadata", name_metadata(context));
    document.insert("spec".to_owned(), JsonValue::Object(spec));
    Ok(Some(document))
}

/// The request is nested as `resources.requests.storage`.
fn render_persistent_volume_claim(
    context: &mut RenderContext<'_>,
) -> render::Result<Option<Document>> {
    let mut spec = Map::new();
    if let Some(modes) = context.render_field("accessModes")? {
        spec.insert("accessModes".to_owned(), modes);
    }
    if let Some(request) = context.render_field("request")? {
        spec.insert(
            "resources".to_owned(),
            json!({ "requests": { "storage": request } }),
        );
    }
    for field in ["selector", "volumeName"] {
        if let Some(value) = context.render_field(field)? {
            spec.insert(field.to_owned(), value);
        }
    }
    let mut document = render::document("metadata", name_metadata(context));
    document.insert("spec".to_owned(), JsonValue::Object(spec));
    Ok(Some(document))
}

fn render_volume_mount(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["name", "path", "readOnly"])
        .rename("path", "mountPath")
        .render()
}

fn render_host_volume(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut document = render::document("name", context.str("name").unwrap_or_default());
    document.insert("hostPath".to_owned(), json!({ "path": context.str("path") }));
    Ok(Some(document))
}

fn render_config_map_volume(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    Ok(Some(projected_volume(context, "configMap", "name", "map_name")))
}

fn render_secret_volume(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    Ok(Some(projected_volume(context, "secret", "secretName", "secret_name")))
}

/// Config map and secret volumes: the source name, the optional default file
/// mode and the `item_map` of keys to paths, sorted by key.
fn projected_volume(
    context: &RenderContext<'_>,
    source: &str,
    name_key: &str,
    name_field: &str,
) -> Document {
    let mut projection = render::document(name_key, context.str(name_field).unwrap_or_default());
    if let Some(mode) = context.get("defaultMode").as_i64() {
        projection.insert("defaultMode".to_owned(), mode.into());
    }
    if let Some(item_map) = context.get("item_map").as_map().filter(|map| !map.is_empty()) {
        let mut items = item_map
            .iter()
            .map(|(key, path)| (key.to_string(), path.as_str().unwrap_or_default()))
            .collect::<Vec<_>>();
        items.sort();
        projection.insert(
            "items".to_owned(),
            items
                .into_iter()
                .map(|(key, path)| json!({ "key": key, "path": path }))
                .collect(),
        );
    }

    let mut document = render::document("name", context.str("name").unwrap_or_default());
    document.insert(source.to_owned(), JsonValue::Object(projection));
    document
}

fn render_claim_volume(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut claim = render::document("claimName", context.str("claim_name").unwrap_or_default());
    if let Some(read_only) = context.get("readOnly").as_bool() {
        claim.insert("readOnly".to_owned(), read_only.into());
    }
    let mut document = render::document("name", context.str("name").unwrap_or_default());
    document.insert("persistentVolumeClaim".to_owned(), JsonValue::Object(claim));
    Ok(Some(document))
}
