//! Deployments and their update strategies.
use serde_json::Value as JsonValue;

use super::name_metadata;
use crate::{
    instance::{self, Args},
    render::{self, Document, RenderContext},
    schema::TypeDef,
    transform::{TransformContext, View},
    types::{FieldPath, TypeDescriptor as T},
    value::Value,
};

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("BaseUpdateStrategy").abstract_type(),
        TypeDef::new("RollingUpdateStrategy")
            .parent("BaseUpdateStrategy")
            .field("maxSurge", T::positive(T::Integer), 1)
            .field("maxUnavailable", T::positive(T::Integer), 50)
            .validate(check_rolling_update)
            .render(render_rolling_update),
        TypeDef::new("Deployment")
            .kind("extensions/v1beta1", "Deployment", "deployment")
            .output_order(80)
            .infer("replicas", 1)
            .field(
                "revisionHistoryLimit",
                T::nullable(T::count()),
                Value::Null,
            )
            .field(
                "selector",
                T::nullable(T::object("BaseSelector")),
                Value::Null,
            )
            .transform("selector", selector)
            .field(
                "strategy",
                T::nullable(T::object("BaseUpdateStrategy")),
                Value::Null,
            )
            .field("minReadySeconds", T::nullable(T::count()), Value::Null)
            .default_object("pod_template", "PodTemplateSpec")
            .render(render_deployment),
    ]
}

/// A rolling update has to make progress in at least one direction.
fn check_rolling_update(view: &View<'_>) -> Result<(), String> {
    let surge = view.get("maxSurge").as_i64();
    let unavailable = view.get("maxUnavailable").as_i64();
    if surge == Some(0) && unavailable == Some(0) {
        return Err("maxSurge and maxUnavailable can't both be 0".to_owned());
    }
    Ok(())
}

fn render_rolling_update(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let rolling_update = context.fields().render()?.unwrap_or_default();
    let mut document = render::document("rollingUpdate", JsonValue::Object(rolling_update));
    document.insert("type".to_owned(), "RollingUpdate".into());
    Ok(Some(document))
}

/// A plain label mapping is shorthand for a match-labels selector.
fn selector(context: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
    let is_label_map = matches!(value, Value::Map(_))
        && T::string_map().check(value, &FieldPath::root()).is_ok();
    if !is_label_map {
        return Ok(value.clone());
    }
    context
        .create(
            "MatchLabelsSelector",
            Args::new().set("matchLabels", value.clone()),
        )
        .map(Value::from)
}

/// Match-labels selectors also label the deployment itself.
fn render_deployment(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let selector_labels = match context.get("selector") {
        Value::Object(selector) if selector.is_a("MatchLabelsSelector") => selector
            .get("matchLabels")
            .ok()
            .and_then(Value::as_map)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| Some((k.to_string(), v.as_str()?.to_owned())))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    for (key, value) in selector_labels {
        context.add_label(key, value);
    }

    let spec = context
        .fields()
        .rename("pod_template", "template")
        .order(["replicas"])
        .skip(["name"])
        .render()?
        .unwrap_or_default();
    let mut document = render::document("metadata", name_metadata(context));
    document.insert("spec".to_owned(), JsonValue::Object(spec));
    Ok(Some(document))
}
