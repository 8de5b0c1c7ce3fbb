//! Containers and pod templates.
use serde_json::{Value as JsonValue, json};

use crate::{
    instance::{self, Args},
    render::{self, Document, RenderContext},
    schema::TypeDef,
    transform::TransformContext,
    types::TypeDescriptor as T,
    value::{MapKey, Value},
};

const PROTOCOLS: [&str; 2] = ["TCP", "UDP"];

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("ContainerPort")
            .infer("containerPort", 80)
            .field("name", T::nullable(T::String), Value::Null)
            .field("protocol", T::enumeration(PROTOCOLS), "TCP")
            .render(render_container_port),
        TypeDef::new("SecurityContext").field("privileged", T::nullable(T::Boolean), Value::Null),
        TypeDef::new("ContainerResourceEachSpec")
            .field("cpu", T::nullable(T::positive(T::non_zero(T::Number))), Value::Null)
            .field("memory", T::nullable(T::Memory), Value::Null)
            .render(render_resources),
        TypeDef::new("ContainerResourceSpec")
            .typed("requests", T::nullable(T::object("ContainerResourceEachSpec")))
            .default_object("requests", "ContainerResourceEachSpec")
            .typed("limits", T::nullable(T::object("ContainerResourceEachSpec")))
            .default_object("limits", "ContainerResourceEachSpec")
            .render(render_resources),
        TypeDef::new("ContainerEnvBaseSpec")
            .abstract_type()
            .field("name", T::non_empty(T::String), ""),
        TypeDef::new("ContainerEnvSpec")
            .parent("ContainerEnvBaseSpec")
            .field("value", T::String, "")
            .render(render_env_value),
        TypeDef::new("ContainerEnvSecretSpec")
            .parent("ContainerEnvBaseSpec")
            .field("key", T::non_empty(T::String), "")
            .field("secret_name", T::Identifier, "")
            .render(render_env_secret),
        TypeDef::new("ContainerEnvConfigMapSpec")
            .parent("ContainerEnvBaseSpec")
            .field("key", T::non_empty(T::String), "")
            .field("map_name", T::Identifier, "")
            .render(render_env_config_map),
        TypeDef::new("ContainerSpec")
            .identifier("name")
            .field("image", T::non_empty(T::String), "")
            .field("command", T::nullable(T::list(T::String)), Value::Null)
            .field(
                "env",
                T::nullable(T::list(T::object("ContainerEnvBaseSpec"))),
                Value::empty_seq(),
            )
            .alias("environment", "env")
            .transform("env", environment)
            .field(
                "imagePullPolicy",
                T::nullable(T::enumeration(["Always", "IfNotPresent", "Never"])),
                Value::Null,
            )
            .field(
                "ports",
                T::nullable(T::list(T::object("ContainerPort"))),
                Value::empty_seq(),
            )
            .typed("resources", T::nullable(T::object("ContainerResourceSpec")))
            .default_object("resources", "ContainerResourceSpec")
            .field(
                "securityContext",
                T::nullable(T::object("SecurityContext")),
                Value::Null,
            )
            .field(
                "terminationMessagePath",
                T::nullable(T::non_empty(T::Path)),
                Value::Null,
            )
            .field(
                "volumeMounts",
                T::nullable(T::list(T::object("ContainerVolumeMountSpec"))),
                Value::empty_seq(),
            )
            .render(render_container),
        TypeDef::new("PodImagePullSecret").field("name", T::Identifier, ""),
        TypeDef::new("PodTemplateSpec")
            .metadata(true)
            .field("name", T::nullable(T::Identifier), Value::Null)
            .field(
                "containers",
                T::non_empty(T::list(T::object("ContainerSpec"))),
                Value::empty_seq(),
            )
            .field(
                "dnsPolicy",
                T::nullable(T::enumeration(["ClusterFirst", "Default"])),
                Value::Null,
            )
            .field(
                "imagePullSecrets",
                T::nullable(T::list(T::object("PodImagePullSecret"))),
                Value::empty_seq(),
            )
            .field(
                "restartPolicy",
                T::nullable(T::enumeration(["Always", "OnFailure", "Never"])),
                Value::Null,
            )
            .field(
                "securityContext",
                T::nullable(T::object("SecurityContext")),
                Value::Null,
            )
            .field(
                "terminationGracePeriodSeconds",
                T::nullable(T::positive(T::Integer)),
                Value::Null,
            )
            .field(
                "volumes",
                T::nullable(T::list(T::object("PodVolumeBaseSpec"))),
                Value::empty_seq(),
            )
            .render(render_pod_template),
    ]
}

fn render_container_port(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["name", "containerPort", "protocol"])
        .render()
}

/// Requests and limits, each with `cpu` before `memory`. Nothing is rendered
/// when no value is set.
fn render_resources(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["requests", "limits", "cpu", "memory"])
        .none_if_empty()
        .render()
}

/// Empty values are dropped, as for every other field.
fn render_env_value(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context.fields().order(["name", "value"]).render()
}

fn render_env_secret(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    Ok(Some(env_reference(context, "secretKeyRef", "secret_name")))
}

fn render_env_config_map(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    Ok(Some(env_reference(context, "configMapKeyRef", "map_name")))
}

fn env_reference(context: &RenderContext<'_>, reference: &str, source_field: &str) -> Document {
    let mut document = render::document("name", context.str("name").unwrap_or_default());
    document.insert(
        "valueFrom".to_owned(),
        json!({
            reference: {
                "name": context.str(source_field),
                "key": context.str("key"),
            }
        }),
    );
    document
}

/// A non-empty command is split into the executable and its arguments.
fn render_container(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut container = context
        .fields()
        .keep_empty(["securityContext"])
        .skip(["command"])
        .render()?
        .unwrap_or_default();

    if let Some(JsonValue::Array(mut command)) = context.render_field("command")? {
        if !command.is_empty() {
            let executable = command.remove(0);
            container.insert("command".to_owned(), executable);
            container.insert("args".to_owned(), JsonValue::Array(command));
        }
    }

    Ok(Some(render::reorder(
        container,
        &["name", "image", "command", "args", "env", "ports"],
    )))
}

fn render_pod_template(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let spec = context
        .fields()
        .keep_empty(["securityContext"])
        .order(["containers"])
        .skip(["name"])
        .render()?
        .unwrap_or_default();

    let mut document = Document::new();
    if let Some(name) = context.str("name") {
        document.insert("metadata".to_owned(), json!({ "labels": { "name": name } }));
    }
    document.insert("spec".to_owned(), JsonValue::Object(spec));
    Ok(Some(document))
}

/// Normalizes an environment given as a mapping of names to values (sorted by
/// name) or as a list of `{name, value}` pairs into env spec objects. Env
/// spec objects given as values are cloned under the entry's name. An empty
/// environment becomes null.
fn environment(context: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
    let entries = match value {
        Value::Map(env) => {
            let mut pairs = env.iter().collect::<Vec<_>>();
            pairs.sort_by_key(|(name, _)| name.to_string());
            pairs
                .into_iter()
                .map(|(name, value)| env_entry(context, name.to_value(), value))
                .collect::<instance::Result<Vec<_>>>()?
        }
        Value::Seq(items) => items
            .iter()
            .map(|item| match as_name_value_pair(item) {
                Some((name, value)) => env_entry(context, name.clone(), value),
                None => Ok(item.clone()),
            })
            .collect::<instance::Result<Vec<_>>>()?,
        other => return Ok(other.clone()),
    };

    Ok(if entries.is_empty() {
        Value::Null
    } else {
        Value::Seq(entries)
    })
}

fn as_name_value_pair(item: &Value) -> Option<(&Value, &Value)> {
    let pair = item.as_map().filter(|pair| pair.len() == 2)?;
    Some((
        pair.get(&MapKey::from("name"))?,
        pair.get(&MapKey::from("value"))?,
    ))
}

fn env_entry(context: &TransformContext<'_>, name: Value, value: &Value) -> instance::Result<Value> {
    match value {
        Value::Object(spec) if spec.is_a("ContainerEnvBaseSpec") => spec
            .clone_with(Args::new().set("name", name))
            .map(Value::from),
        value => context
            .create(
                "ContainerEnvSpec",
                Args::new().set("name", name).set("value", value.clone()),
            )
            .map(Value::from),
    }
}
