//! ConfigMaps and Secrets.
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value as JsonValue};

use super::name_metadata;
use crate::{
    instance::Args,
    render::{self, Document, RenderContext},
    schema::{ResolvedType, TypeDef},
    types::TypeDescriptor as T,
    value::{MapKey, Mapping, Value},
};

const DOCKERCFG_KEY: &str = ".dockercfg";
const DOCKER_FIELDS: [&str; 3] = ["username", "password", "email"];

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("ConfigMap")
            .kind("v1", "ConfigMap", "configmap")
            .output_order(40)
            .field("files", T::string_map(), Value::empty_map())
            .render(render_config_map),
        TypeDef::new("Secret")
            .kind("v1", "Secret", "secret")
            .output_order(40)
            .field("type", T::non_empty(T::String), "Opaque")
            .field("secrets", T::string_map(), Value::empty_map())
            .render(render_secret),
        TypeDef::new("DockerCredentials")
            .parent("Secret")
            .doc("A dockercfg secret, built from per-registry credentials.")
            .default("type", "kubernetes.io/dockercfg")
            .default("secrets", [(DOCKERCFG_KEY, "")])
            .field(
                "dockers",
                T::map(T::String, T::string_map()),
                Value::empty_map(),
            )
            .on_construct(reject_explicit_secrets)
            .render(render_docker_credentials),
    ]
}

fn render_config_map(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let Some(files) = context.render_field("files")? else {
        return Ok(None);
    };
    if files.as_object().is_some_and(Map::is_empty) {
        return Ok(None);
    }

    let mut document = render::document("metadata", name_metadata(context));
    document.insert("data".to_owned(), files);
    Ok(Some(document))
}

fn render_secret(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let secrets = context.get("secrets").as_map().cloned().unwrap_or_default();
    Ok(secret_document(context, &secrets))
}

fn secret_document(context: &RenderContext<'_>, secrets: &Mapping) -> Option<Document> {
    if secrets.is_empty() {
        return None;
    }

    let mut data = secrets
        .iter()
        .map(|(key, value)| {
            let encoded = STANDARD.encode(value.as_str().unwrap_or_default());
            (key.to_string(), JsonValue::String(encoded))
        })
        .collect::<Vec<_>>();
    data.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut document = render::document("metadata", name_metadata(context));
    document.insert(
        "type".to_owned(),
        context.str("type").unwrap_or_default().into(),
    );
    document.insert("data".to_owned(), JsonValue::Object(data.into_iter().collect()));
    Some(document)
}

/// The dockercfg payload is derived from `dockers`, it can't be supplied directly.
fn reject_explicit_secrets(_: &ResolvedType, args: &Args) -> Result<(), String> {
    match args.get("secrets") {
        Some(_) => Err("secrets are generated from dockers and can't be set".to_owned()),
        None => Ok(()),
    }
}

fn render_docker_credentials(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let Some(dockers) = context.get("dockers").as_map().filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    let mut registries = dockers.iter().collect::<Vec<_>>();
    registries.sort_by_key(|(registry, _)| registry.to_string());

    let mut dockercfg = Map::new();
    for (registry, credentials) in registries {
        let Some(credentials) = credentials.as_map() else {
            continue;
        };
        let lookup = |field: &str| credentials.get(&MapKey::from(field)).and_then(Value::as_str);
        let [Some(username), Some(password), Some(email)] = DOCKER_FIELDS.map(lookup) else {
            continue;
        };

        let mut entry = Map::new();
        entry.insert("username".to_owned(), username.into());
        entry.insert("password".to_owned(), password.into());
        entry.insert("email".to_owned(), email.into());
        entry.insert(
            "auth".to_owned(),
            STANDARD.encode(format!("{username}:{password}")).into(),
        );
        dockercfg.insert(registry.to_string(), JsonValue::Object(entry));
    }

    let mut secrets = context.get("secrets").as_map().cloned().unwrap_or_default();
    secrets.insert(
        DOCKERCFG_KEY.into(),
        context.embed_json(&JsonValue::Object(dockercfg))?.into(),
    );
    Ok(secret_document(context, &secrets))
}
